//! Chart series extracted from pivot tables.

use serde::{Deserialize, Serialize};

use crate::options::XY;
use crate::pivot::{DatasetId, FlatRow, PivotTable};
use crate::scale::Scale;

/// Column name that selects the row position instead of a value.
pub const INDEX_COLUMN: &str = "index";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Anything drawn at a position.
pub trait Positioned {
    fn position(&self) -> Point;
}

impl Positioned for Point {
    fn position(&self) -> Point {
        *self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub pt: Point,
    pub rule: Option<String>,
    pub dataset_id: DatasetId,
}

impl Positioned for DataPoint {
    fn position(&self) -> Point {
        self.pt
    }
}

impl DataPoint {
    /// Same point mapped through a pair of scales into pixel space.
    pub fn scaled(&self, scales: &XY<Scale>) -> Self {
        Self {
            pt: Point::new(scales.x.forward(self.pt.x), scales.y.forward(self.pt.y)),
            ..self.clone()
        }
    }
}

fn select(row: &FlatRow<'_>, index: usize, column: &str) -> f64 {
    if column == INDEX_COLUMN {
        return index as f64;
    }
    row.value(column)
        .and_then(|d| d.as_f64())
        .unwrap_or(f64::NAN)
}

/// One point per pivot row. Missing or non-numeric cells become NaN so the
/// series keeps one entry per row.
pub fn points(table: &PivotTable, x_col: &str, y_col: &str) -> Vec<DataPoint> {
    table.map(|row, i| DataPoint {
        pt: Point::new(select(&row, i, x_col), select(&row, i, y_col)),
        rule: row.rule().map(str::to_string),
        dataset_id: table.dataset_id(),
    })
}

/// Maximum finite x and y of a series; `None` when nothing is finite.
pub fn series_max(points: &[DataPoint]) -> Option<Point> {
    let finite = |v: f64| v.is_finite().then_some(v);
    let max_x = points.iter().filter_map(|p| finite(p.pt.x)).reduce(f64::max)?;
    let max_y = points.iter().filter_map(|p| finite(p.pt.y)).reduce(f64::max)?;
    Some(Point::new(max_x, max_y))
}

/// Points mapped to pixels, dropping anything the scales cannot place.
pub fn to_pixels(points: &[DataPoint], scales: &XY<Scale>) -> Vec<DataPoint> {
    points
        .iter()
        .map(|p| p.scaled(scales))
        .filter(|p| p.pt.is_finite())
        .collect()
}
