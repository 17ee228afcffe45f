//! Long-format to wide-format pivoting.
//!
//! Input rows carry `(dimension..., name, value)`. Every distinct tuple of
//! dimension values becomes one row of the wide table and every distinct
//! `name` becomes one column. Columns are discovered while folding, in
//! first-seen order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

use crate::logging::{log, obj, v_num, Domain, Level};
use crate::sets::OrderedSet;

pub type DatasetId = u64;

/// Ordered tuple of dimension values identifying one wide row.
pub type Key = Vec<String>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PivotError {
    #[error("header must end with name and value columns, got {0:?}")]
    Header(Vec<String>),
    #[error("record {row} is missing field `{field}`: {record:?}")]
    MalformedRecord {
        row: usize,
        field: String,
        record: Vec<String>,
    },
    #[error("stored table is inconsistent: {0}")]
    Corrupt(String),
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    Num(f64),
    Text(String),
}

impl Datum {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Datum::Num(v),
            _ => Datum::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Num(v) => Some(*v),
            Datum::Text(_) => None,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Num(v) => write!(f, "{}", v),
            Datum::Text(s) => f.write_str(s),
        }
    }
}

/// One long-format row after zipping it against its header.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRecord {
    pub dataset_id: DatasetId,
    /// Dimension cells present in the raw row, in header order.
    pub dimensions: Vec<(String, String)>,
    pub name: String,
    pub value: String,
}

impl LongRecord {
    /// Zips `row` against `header`. The last two header columns are the
    /// reserved name/value pair; a row too short to carry them is malformed.
    pub fn from_row(
        dataset_id: DatasetId,
        header: &[String],
        row: &[String],
        row_index: usize,
    ) -> Result<Self, PivotError> {
        if header.len() < 2 {
            return Err(PivotError::Header(header.to_vec()));
        }
        let split = header.len() - 2;
        let missing = |field: &str| PivotError::MalformedRecord {
            row: row_index,
            field: field.to_string(),
            record: row.to_vec(),
        };
        let name = row.get(split).ok_or_else(|| missing(&header[split]))?;
        let value = row.get(split + 1).ok_or_else(|| missing(&header[split + 1]))?;

        let dimensions = header[..split]
            .iter()
            .zip(row.iter())
            .filter(|(field, _)| !field.is_empty())
            .map(|(field, cell)| (field.clone(), cell.clone()))
            .collect();

        Ok(Self {
            dataset_id,
            dimensions,
            name: name.clone(),
            value: value.clone(),
        })
    }

    pub fn dimension(&self, field: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }
}

/// Values written for one key, by column name.
pub type PivotRow = BTreeMap<String, Datum>;

/// Wide table built from long-format records. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredTable", into = "StoredTable")]
pub struct PivotTable {
    dataset_id: DatasetId,
    header: Vec<String>,
    key_fields: Vec<String>,
    value_names: OrderedSet<String>,
    rows: Vec<(Key, PivotRow)>,
    index: HashMap<Key, usize>,
}

/// Inert form of a [`PivotTable`] as written to durable storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTable {
    pub dataset_id: DatasetId,
    pub header: Vec<String>,
    pub value_names: Vec<String>,
    pub rows: Vec<(Key, PivotRow)>,
}

impl From<PivotTable> for StoredTable {
    fn from(t: PivotTable) -> Self {
        Self {
            dataset_id: t.dataset_id,
            header: t.header,
            value_names: t.value_names.into_vec(),
            rows: t.rows,
        }
    }
}

impl TryFrom<StoredTable> for PivotTable {
    type Error = PivotError;

    fn try_from(stored: StoredTable) -> Result<Self, Self::Error> {
        PivotTable::restore(stored)
    }
}

impl PivotTable {
    fn empty(dataset_id: DatasetId, header: Vec<String>) -> Result<Self, PivotError> {
        if header.len() < 2 {
            return Err(PivotError::Header(header));
        }
        // Unnamed columns never make it into a record, so they are not keys.
        let key_fields = header[..header.len() - 2]
            .iter()
            .filter(|f| !f.is_empty())
            .cloned()
            .collect();
        Ok(Self {
            dataset_id,
            header,
            key_fields,
            value_names: OrderedSet::new(),
            rows: Vec::new(),
            index: HashMap::new(),
        })
    }

    /// Rebuilds a fully functional table from its stored form, including the
    /// key index, and checks the table invariants on the way.
    pub fn restore(stored: StoredTable) -> Result<Self, PivotError> {
        let mut table = Self::empty(stored.dataset_id, stored.header)?;
        let registry: OrderedSet<String> = stored.value_names.into_iter().collect();

        for (key, row) in stored.rows {
            if key.len() != table.key_fields.len() {
                return Err(PivotError::Corrupt(format!(
                    "key {:?} does not match schema {:?}",
                    key, table.key_fields
                )));
            }
            if let Some(name) = row.keys().find(|n| !registry.contains(*n)) {
                return Err(PivotError::Corrupt(format!("unregistered column `{}`", name)));
            }
            if table.index.contains_key(&key) {
                return Err(PivotError::Corrupt(format!("duplicate key {:?}", key)));
            }
            table.index.insert(key.clone(), table.rows.len());
            table.rows.push((key, row));
        }

        for name in registry.iter() {
            if !table.rows.iter().any(|(_, row)| row.contains_key(name)) {
                return Err(PivotError::Corrupt(format!("column `{}` has no values", name)));
            }
        }
        table.value_names = registry;
        Ok(table)
    }

    pub fn dataset_id(&self) -> DatasetId {
        self.dataset_id
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Dimension field names, in header order.
    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }

    /// Every column name ever folded in, in first-seen order.
    pub fn value_names(&self) -> &[String] {
        self.value_names.as_slice()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &[String]) -> Option<&PivotRow> {
        self.index.get(key).map(|&i| &self.rows[i].1)
    }

    /// Flattened rows in first-seen key order. Each call starts over.
    pub fn rows(&self) -> Rows<'_> {
        Rows { table: self, next: 0 }
    }

    pub fn map<T, F>(&self, mut f: F) -> Vec<T>
    where
        F: FnMut(FlatRow<'_>, usize) -> T,
    {
        self.rows().enumerate().map(|(i, row)| f(row, i)).collect()
    }

    /// Values of one column across all rows; `None` where the row never wrote it.
    pub fn column(&self, name: &str) -> Vec<Option<&Datum>> {
        self.rows.iter().map(|(_, row)| row.get(name)).collect()
    }

    /// Distinct rule labels in first-seen order.
    pub fn rule_list(&self) -> Vec<String> {
        let rules: OrderedSet<String> = self
            .rows()
            .filter_map(|row| row.rule().map(str::to_string))
            .collect();
        rules.into_vec()
    }
}

/// View of one wide row: its dimension fields plus the values written for it.
#[derive(Debug, Clone, Copy)]
pub struct FlatRow<'a> {
    key_fields: &'a [String],
    value_names: &'a [String],
    key: &'a Key,
    values: &'a PivotRow,
}

impl<'a> FlatRow<'a> {
    pub fn key(&self) -> &'a Key {
        self.key
    }

    pub fn dimension(&self, field: &str) -> Option<&'a str> {
        let key: &'a Key = self.key;
        self.key_fields
            .iter()
            .position(|f| f == field)
            .and_then(|i| key.get(i))
            .map(String::as_str)
    }

    /// Rule label of the row: `rule`, or `rule_name` when `rule` is absent
    /// or empty.
    pub fn rule(&self) -> Option<&'a str> {
        self.dimension("rule")
            .filter(|r| !r.is_empty())
            .or_else(|| self.dimension("rule_name"))
            .filter(|r| !r.is_empty())
    }

    pub fn value(&self, name: &str) -> Option<&'a Datum> {
        self.values.get(name)
    }

    /// Dimension fields in key order.
    pub fn dimensions(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        let fields: &'a [String] = self.key_fields;
        let key: &'a Key = self.key;
        fields
            .iter()
            .zip(key.iter())
            .map(|(f, v)| (f.as_str(), v.as_str()))
    }

    /// Written values in registry order; unwritten columns are skipped.
    pub fn values(&self) -> impl Iterator<Item = (&'a str, &'a Datum)> + 'a {
        let values: &'a PivotRow = self.values;
        let names: &'a [String] = self.value_names;
        names
            .iter()
            .filter_map(move |n| values.get(n).map(|v| (n.as_str(), v)))
    }
}

pub struct Rows<'a> {
    table: &'a PivotTable,
    next: usize,
}

impl<'a> Iterator for Rows<'a> {
    type Item = FlatRow<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, values) = self.table.rows.get(self.next)?;
        self.next += 1;
        Some(FlatRow {
            key_fields: &self.table.key_fields,
            value_names: self.table.value_names.as_slice(),
            key,
            values,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.table.rows.len() - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Rows<'_> {}

/// Incremental fold of long records into a [`PivotTable`].
pub struct PivotBuilder {
    table: PivotTable,
    seen: usize,
    skipped: usize,
    overwrites: usize,
}

impl PivotBuilder {
    pub fn new(dataset_id: DatasetId, header: Vec<String>) -> Result<Self, PivotError> {
        Ok(Self {
            table: PivotTable::empty(dataset_id, header)?,
            seen: 0,
            skipped: 0,
            overwrites: 0,
        })
    }

    pub fn add_row(&mut self, row: &[String]) -> Result<(), PivotError> {
        let record = LongRecord::from_row(self.table.dataset_id, &self.table.header, row, self.seen)?;
        self.add_record(&record)
    }

    pub fn add_rows<R: AsRef<[String]>>(&mut self, rows: &[R]) -> Result<(), PivotError> {
        for row in rows {
            self.add_row(row.as_ref())?;
        }
        Ok(())
    }

    pub fn add_record(&mut self, record: &LongRecord) -> Result<(), PivotError> {
        let row_index = self.seen;
        self.seen += 1;

        let key = self
            .table
            .key_fields
            .iter()
            .map(|field| {
                record
                    .dimension(field)
                    .map(str::to_string)
                    .ok_or_else(|| PivotError::MalformedRecord {
                        row: row_index,
                        field: field.clone(),
                        record: record_cells(record),
                    })
            })
            .collect::<Result<Key, _>>()?;

        // A record without a name carries nothing to pivot. An empty value
        // still registers its column and is stored as empty text.
        if record.name.is_empty() {
            self.skipped += 1;
            return Ok(());
        }

        self.table.value_names.insert(record.name.clone());
        let value = Datum::parse(&record.value);
        match self.table.index.get(&key) {
            Some(&i) => {
                if self.table.rows[i].1.insert(record.name.clone(), value).is_some() {
                    self.overwrites += 1;
                }
            }
            None => {
                let mut row = PivotRow::new();
                row.insert(record.name.clone(), value);
                self.table.index.insert(key.clone(), self.table.rows.len());
                self.table.rows.push((key, row));
            }
        }
        Ok(())
    }

    /// Number of `(key, name)` pairs written more than once so far.
    pub fn overwrites(&self) -> usize {
        self.overwrites
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn finish(self) -> PivotTable {
        self.table
    }
}

fn record_cells(record: &LongRecord) -> Vec<String> {
    record
        .dimensions
        .iter()
        .map(|(_, v)| v.clone())
        .chain([record.name.clone(), record.value.clone()])
        .collect()
}

/// Builds a table from a header and its raw rows in one go.
pub fn build<R: AsRef<[String]>>(
    dataset_id: DatasetId,
    header: Vec<String>,
    rows: &[R],
) -> Result<PivotTable, PivotError> {
    let mut builder = PivotBuilder::new(dataset_id, header)?;
    builder.add_rows(rows)?;
    if builder.overwrites() > 0 || builder.skipped() > 0 {
        log(
            Level::Debug,
            Domain::Pivot,
            "pivot.duplicates",
            obj(&[
                ("dataset_id", v_num(dataset_id as f64)),
                ("overwrites", v_num(builder.overwrites() as f64)),
                ("skipped", v_num(builder.skipped() as f64)),
            ]),
        );
    }
    Ok(builder.finish())
}
