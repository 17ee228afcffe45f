//! Fan-out loading of every known dataset.
//!
//! Each dataset id owns one slot (`Pending`, `Success` or `Error`). One tokio
//! task per slot fetches raw rows, retries transient failures a bounded
//! number of times and pivots the result. Completions come back over a
//! channel tagged with the slot generation they were started for; anything
//! for an id that is no longer known, or for an older generation, is dropped.
//! Every applied transition publishes a fresh immutable [`Snapshot`], and the
//! combine functions are pure functions of a snapshot.

use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::cache::{self, CacheError, TableCache};
use crate::logging::{log, log_discarded, log_slot_transition, obj, v_str, Domain, Level, ProfileScope};
use crate::pivot::{self, DatasetId, PivotError, PivotTable};
use crate::retry::{retry_async, RetryConfig};
use crate::series::{points, Point};
use crate::sets::intersect_all;
use crate::source::{DataSource, DatasetEntry, FetchError};

#[derive(Debug, Error)]
pub enum SlotError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Pivot(#[from] PivotError),
    #[error("load task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Pending,
    Success,
    Error,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::Pending => "pending",
            SlotKind::Success => "success",
            SlotKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub enum SlotState {
    Pending,
    Success(Arc<PivotTable>),
    Error(Arc<SlotError>),
}

impl SlotState {
    pub fn kind(&self) -> SlotKind {
        match self {
            SlotState::Pending => SlotKind::Pending,
            SlotState::Success(_) => SlotKind::Success,
            SlotState::Error(_) => SlotKind::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.kind().as_str()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, SlotState::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SlotState::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SlotState::Error(_))
    }
}

#[derive(Debug, Clone)]
pub struct Slot {
    pub path: String,
    pub generation: u64,
    pub state: SlotState,
}

/// Column-wise bounds of the selected series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min: Point,
    pub max: Point,
}

impl Extent {
    fn of(p: Point) -> Self {
        Self { min: p, max: p }
    }

    fn merge(self, other: Extent) -> Self {
        Self {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }
}

/// Immutable view of every slot at one moment.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    version: u64,
    slots: BTreeMap<DatasetId, Slot>,
}

impl Snapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Known ids, ascending.
    pub fn ids(&self) -> Vec<DatasetId> {
        self.slots.keys().copied().collect()
    }

    pub fn slot(&self, id: DatasetId) -> Option<&Slot> {
        self.slots.get(&id)
    }

    pub fn table(&self, id: DatasetId) -> Option<&Arc<PivotTable>> {
        match self.slots.get(&id).map(|s| &s.state) {
            Some(SlotState::Success(t)) => Some(t),
            _ => None,
        }
    }

    /// Successfully loaded tables in id order. Pending and failed slots are
    /// simply absent.
    pub fn tables(&self) -> impl Iterator<Item = &Arc<PivotTable>> {
        self.slots.values().filter_map(|s| match &s.state {
            SlotState::Success(t) => Some(t),
            _ => None,
        })
    }

    pub fn is_settled(&self) -> bool {
        !self.slots.values().any(|s| s.state.is_pending())
    }

    pub fn count(&self, kind: SlotKind) -> usize {
        self.slots.values().filter(|s| s.state.kind() == kind).count()
    }

    /// Runs `select` over every loaded table and folds the results.
    pub fn combine<T, U, S, F>(&self, select: S, fold: F) -> U
    where
        S: Fn(&PivotTable) -> T,
        F: FnOnce(Vec<(DatasetId, T)>) -> U,
    {
        fold(self
            .tables()
            .map(|t| (t.dataset_id(), select(t)))
            .collect())
    }

    /// Value names present in every loaded table. `None` while nothing has
    /// loaded, which consumers treat as "no constraint yet".
    pub fn shared_columns(&self) -> Option<Vec<String>> {
        self.combine(
            |t| t.value_names().to_vec(),
            |names| intersect_all(names.iter().map(|(_, n)| n.as_slice())),
        )
    }

    /// Min/max of the `(x_col, y_col)` series over the selected datasets.
    pub fn global_extent(&self, selected: &HashSet<DatasetId>, x_col: &str, y_col: &str) -> Option<Extent> {
        self.combine(
            |t| {
                if !selected.contains(&t.dataset_id()) {
                    return None;
                }
                points(t, x_col, y_col)
                    .into_iter()
                    .map(|p| p.pt)
                    .filter(Point::is_finite)
                    .map(Extent::of)
                    .reduce(Extent::merge)
            },
            |extents| extents.into_iter().filter_map(|(_, e)| e).reduce(Extent::merge),
        )
    }

    /// Distinct rules of one loaded dataset.
    pub fn rules(&self, id: DatasetId) -> Vec<String> {
        self.table(id).map(|t| t.rule_list()).unwrap_or_default()
    }
}

struct Completion {
    id: DatasetId,
    generation: u64,
    result: Result<Loaded, SlotError>,
}

struct Loaded {
    table: Arc<PivotTable>,
    from_cache: bool,
}

pub struct Aggregator {
    source: Arc<dyn DataSource>,
    cache: Option<Arc<TableCache>>,
    retry: RetryConfig,
    slots: BTreeMap<DatasetId, Slot>,
    next_generation: u64,
    version: u64,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
    publish: watch::Sender<Arc<Snapshot>>,
}

impl Aggregator {
    pub fn new(source: Arc<dyn DataSource>, retry: RetryConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (publish, _) = watch::channel(Arc::new(Snapshot::default()));
        Self {
            source,
            cache: None,
            retry,
            slots: BTreeMap::new(),
            next_generation: 0,
            version: 0,
            tx,
            rx,
            publish,
        }
    }

    pub fn with_cache(mut self, cache: Arc<TableCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.publish.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.publish.borrow().clone()
    }

    fn publish(&mut self) {
        self.version += 1;
        let snapshot = Snapshot {
            version: self.version,
            slots: self.slots.clone(),
        };
        self.publish.send_replace(Arc::new(snapshot));
    }

    /// Fetches the listing (with retries) and reconciles the known ids.
    pub async fn refresh_listing(&mut self) -> Result<Vec<DatasetEntry>, FetchError> {
        let source = self.source.clone();
        let entries = retry_async(&self.retry, "available", || source.list()).await?;
        self.sync_known(&entries);
        Ok(entries)
    }

    /// Starts a load for every new id and drops slots whose id disappeared.
    /// Results still in flight for dropped ids are discarded when they land.
    pub fn sync_known(&mut self, entries: &[DatasetEntry]) {
        let known: HashSet<DatasetId> = entries.iter().map(|e| e.id).collect();
        let removed: Vec<DatasetId> = self.slots.keys().copied().filter(|id| !known.contains(id)).collect();
        for id in &removed {
            self.slots.remove(id);
            log(
                Level::Info,
                Domain::Aggregate,
                "slot_removed",
                obj(&[("dataset_id", json!(id))]),
            );
        }

        let mut started = 0;
        for entry in entries {
            match self.slots.get_mut(&entry.id) {
                Some(slot) => slot.path = entry.path.clone(),
                None => {
                    self.start(entry.id, entry.path.clone(), false);
                    started += 1;
                }
            }
        }

        if started > 0 || !removed.is_empty() {
            self.publish();
        }
    }

    /// Re-arms one dataset: drops its cached table and loads it again.
    /// Returns false if the id is not known.
    pub fn refetch(&mut self, id: DatasetId) -> bool {
        let Some(path) = self.slots.get(&id).map(|s| s.path.clone()) else {
            return false;
        };
        self.start(id, path, true);
        self.publish();
        true
    }

    /// Arms a new generation for `id` and spawns its load. The load runs in
    /// its own task; a second task waits on it so that even a panicking load
    /// reports back and the slot settles.
    fn start(&mut self, id: DatasetId, path: String, invalidate: bool) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.slots.insert(
            id,
            Slot {
                path,
                generation,
                state: SlotState::Pending,
            },
        );
        log_slot_transition(id, generation, "pending", None);

        let source = self.source.clone();
        let cache = self.cache.clone();
        let retry = self.retry.clone();
        let tx = self.tx.clone();
        let worker = tokio::spawn(async move { load(source.as_ref(), cache, &retry, id, invalidate).await });
        tokio::spawn(async move {
            let result = worker
                .await
                .unwrap_or_else(|e| Err(SlotError::Task(e.to_string())));
            // The aggregator may be gone already; nothing left to tell.
            let _ = tx.send(Completion { id, generation, result });
        });
    }

    fn apply(&mut self, completion: Completion) -> bool {
        let Completion { id, generation, result } = completion;
        let Some(slot) = self.slots.get_mut(&id) else {
            log_discarded(id, generation, "unknown_id");
            return false;
        };
        if slot.generation != generation {
            log_discarded(id, generation, "stale_generation");
            return false;
        }

        slot.state = match result {
            Ok(loaded) => {
                log(
                    Level::Info,
                    Domain::Aggregate,
                    "table_ready",
                    obj(&[
                        ("dataset_id", json!(id)),
                        ("rows", json!(loaded.table.len())),
                        ("columns", json!(loaded.table.value_names().len())),
                        ("from_cache", json!(loaded.from_cache)),
                    ]),
                );
                SlotState::Success(loaded.table)
            }
            Err(e) => SlotState::Error(Arc::new(e)),
        };
        let detail = match &slot.state {
            SlotState::Error(e) => Some(e.to_string()),
            _ => None,
        };
        log_slot_transition(id, generation, slot.state.as_str(), detail.as_deref());
        self.publish();
        true
    }

    /// Waits for the next applied transition. Returns `None` right away when
    /// nothing is pending.
    pub async fn next_update(&mut self) -> Option<Arc<Snapshot>> {
        loop {
            if !self.slots.values().any(|s| s.state.is_pending()) {
                return None;
            }
            let completion = self.rx.recv().await?;
            if self.apply(completion) {
                return Some(self.snapshot());
            }
        }
    }

    /// Applies completions until no slot is pending.
    pub async fn wait_settled(&mut self) -> Arc<Snapshot> {
        while self.next_update().await.is_some() {}
        self.snapshot()
    }
}

fn warn_cache(event: &str, id: DatasetId, err: &dyn std::fmt::Display) {
    log(
        Level::Warn,
        Domain::Cache,
        event,
        obj(&[("dataset_id", json!(id)), ("error", v_str(&err.to_string()))]),
    );
}

async fn load(
    source: &dyn DataSource,
    cache: Option<Arc<TableCache>>,
    retry: &RetryConfig,
    id: DatasetId,
    invalidate: bool,
) -> Result<Loaded, SlotError> {
    let _scope = ProfileScope::with_context("load_dataset", &[("dataset_id", json!(id))]);

    let Some(db) = cache else {
        let raw = retry_async(retry, &format!("download/{}", id), || source.fetch_rows(id)).await?;
        let table = pivot::build(id, raw.headers, &raw.rows)?;
        return Ok(Loaded { table: Arc::new(table), from_cache: false });
    };

    if invalidate {
        if let Err(e) = cache::blocking(&db, move |c| c.invalidate(id)).await {
            warn_cache("invalidate_failed", id, &e);
        }
    }

    let token = match retry_async(retry, "cache_token", || source.cache_token(id)).await {
        Ok(token) => Some(token),
        Err(e) => {
            warn_cache("token_failed", id, &e);
            None
        }
    };

    if let Some(token) = token.clone() {
        let hit: Result<Option<PivotTable>, CacheError> =
            cache::blocking(&db, move |c| c.load(id, &token)).await;
        match hit {
            Ok(Some(table)) => return Ok(Loaded { table: Arc::new(table), from_cache: true }),
            Ok(None) => {}
            Err(e) => warn_cache("load_failed", id, &e),
        }
    }

    let raw = retry_async(retry, &format!("download/{}", id), || source.fetch_rows(id)).await?;
    let table = Arc::new(pivot::build(id, raw.headers, &raw.rows)?);

    if let Some(token) = token {
        let stored = Arc::clone(&table);
        if let Err(e) = cache::blocking(&db, move |c| c.store(&token, &stored)).await {
            warn_cache("store_failed", id, &e);
        }
    }

    Ok(Loaded { table, from_cache: false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RawRows;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    fn strs(items: &[&str]) -> Vec<String> {
        items.iter().map(|x| x.to_string()).collect()
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter_factor: 0.0,
        }
    }

    fn entries(ids: &[DatasetId]) -> Vec<DatasetEntry> {
        ids.iter()
            .map(|&id| DatasetEntry { id, path: format!("{}.csv", id) })
            .collect()
    }

    /// In-memory source; ids listed in `gated` wait for a `release` permit
    /// before answering.
    struct FakeSource {
        tables: HashMap<DatasetId, RawRows>,
        failing: HashSet<DatasetId>,
        panicking: HashSet<DatasetId>,
        gated: HashSet<DatasetId>,
        release: Semaphore,
        calls: Mutex<HashMap<DatasetId, u32>>,
        tokens: AtomicU32,
    }

    impl Default for FakeSource {
        fn default() -> Self {
            Self {
                tables: HashMap::new(),
                failing: HashSet::new(),
                panicking: HashSet::new(),
                gated: HashSet::new(),
                release: Semaphore::new(0),
                calls: Mutex::new(HashMap::new()),
                tokens: AtomicU32::new(0),
            }
        }
    }

    impl FakeSource {
        fn with_table(mut self, id: DatasetId, names: &[&str]) -> Self {
            let rows = names
                .iter()
                .enumerate()
                .map(|(i, n)| strs(&[&i.to_string(), "comm", n, &(10 * (i + 1)).to_string()]))
                .collect();
            self.tables.insert(
                id,
                RawRows {
                    path: format!("{}.csv", id),
                    headers: strs(&["iteration", "rule_name", "name", "value"]),
                    rows,
                },
            );
            self
        }

        fn calls(&self, id: DatasetId) -> u32 {
            self.calls.lock().unwrap().get(&id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl DataSource for FakeSource {
        async fn list(&self) -> Result<Vec<DatasetEntry>, FetchError> {
            let mut ids: Vec<_> = self.tables.keys().copied().collect();
            ids.sort();
            Ok(entries(&ids))
        }

        async fn fetch_rows(&self, id: DatasetId) -> Result<RawRows, FetchError> {
            *self.calls.lock().unwrap().entry(id).or_insert(0) += 1;
            if self.gated.contains(&id) {
                self.release.acquire().await.unwrap().forget();
            }
            if self.panicking.contains(&id) {
                panic!("source blew up on {}", id);
            }
            if self.failing.contains(&id) {
                return Err(FetchError::Status { status: 503, url: format!("download/{}", id) });
            }
            self.tables.get(&id).cloned().ok_or(FetchError::UnknownDataset(id))
        }

        async fn cache_token(&self, _id: DatasetId) -> Result<String, FetchError> {
            self.tokens.fetch_add(1, Ordering::SeqCst);
            Ok("v1".to_string())
        }
    }

    #[tokio::test]
    async fn test_shared_columns_after_all_load() {
        let source = FakeSource::default()
            .with_table(1, &["cost", "size"])
            .with_table(2, &["cost", "depth"]);
        let mut agg = Aggregator::new(Arc::new(source), fast_retry());
        agg.refresh_listing().await.unwrap();
        let snap = agg.wait_settled().await;

        assert_eq!(snap.count(SlotKind::Success), 2);
        assert_eq!(snap.shared_columns(), Some(strs(&["cost"])));
    }

    #[tokio::test]
    async fn test_first_result_is_not_intersected_with_empty() {
        let source = FakeSource::default()
            .with_table(1, &["cost", "size"])
            .with_table(2, &["cost", "depth"]);
        let mut agg = Aggregator::new(Arc::new(source), fast_retry());

        assert_eq!(agg.snapshot().shared_columns(), None);
        agg.sync_known(&entries(&[1, 2]));
        let first = agg.next_update().await.unwrap();
        let cols = first.shared_columns().unwrap();
        assert!(cols == strs(&["cost", "size"]) || cols == strs(&["cost", "depth"]));
    }

    #[tokio::test]
    async fn test_failing_dataset_is_excluded_and_bounded() {
        let mut source = FakeSource::default()
            .with_table(1, &["cost", "size"])
            .with_table(2, &["depth"]);
        source.failing.insert(2);
        let source = Arc::new(source);
        let mut agg = Aggregator::new(source.clone(), fast_retry());
        agg.sync_known(&entries(&[1, 2]));
        let snap = agg.wait_settled().await;

        assert!(matches!(snap.slot(2).unwrap().state, SlotState::Error(_)));
        assert_eq!(source.calls(2), 3);
        // the failed dataset does not empty the intersection
        assert_eq!(snap.shared_columns(), Some(strs(&["cost", "size"])));
        // but it stays listed
        assert_eq!(snap.ids(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_malformed_rows_settle_without_retry() {
        let mut source = FakeSource::default().with_table(1, &["cost"]);
        source.tables.get_mut(&1).unwrap().rows.push(strs(&["9"]));
        let source = Arc::new(source);
        let mut agg = Aggregator::new(source.clone(), fast_retry());
        agg.sync_known(&entries(&[1]));
        let snap = agg.wait_settled().await;

        match &snap.slot(1).unwrap().state {
            SlotState::Error(e) => assert!(matches!(**e, SlotError::Pivot(PivotError::MalformedRecord { .. }))),
            other => panic!("unexpected state {:?}", other.as_str()),
        }
        assert_eq!(source.calls(1), 1);
    }

    #[tokio::test]
    async fn test_removed_id_result_is_discarded() {
        let mut source = FakeSource::default()
            .with_table(1, &["cost"])
            .with_table(2, &["cost", "size"]);
        source.gated.insert(2);
        let source = Arc::new(source);
        let mut agg = Aggregator::new(source.clone(), fast_retry());
        agg.sync_known(&entries(&[1, 2]));
        agg.sync_known(&entries(&[1]));
        source.release.add_permits(1);

        let snap = agg.wait_settled().await;
        assert_eq!(snap.ids(), vec![1]);
        assert!(snap.slot(2).is_none());
        assert_eq!(snap.shared_columns(), Some(strs(&["cost"])));
    }

    #[tokio::test]
    async fn test_readded_id_ignores_stale_generation() {
        let mut source = FakeSource::default().with_table(2, &["cost"]);
        source.gated.insert(2);
        let source = Arc::new(source);
        let mut agg = Aggregator::new(source.clone(), fast_retry());
        agg.sync_known(&entries(&[2]));
        let first_gen = agg.snapshot().slot(2).unwrap().generation;
        agg.sync_known(&entries(&[]));
        agg.sync_known(&entries(&[2]));
        let second_gen = agg.snapshot().slot(2).unwrap().generation;
        assert_ne!(first_gen, second_gen);

        source.release.add_permits(2);
        let snap = agg.wait_settled().await;
        let slot = snap.slot(2).unwrap();
        assert_eq!(slot.generation, second_gen);
        assert!(matches!(slot.state, SlotState::Success(_)));
    }

    #[tokio::test]
    async fn test_every_transition_is_published() {
        let source = FakeSource::default()
            .with_table(1, &["cost"])
            .with_table(2, &["cost"]);
        let mut agg = Aggregator::new(Arc::new(source), fast_retry());
        let rx = agg.subscribe();
        agg.sync_known(&entries(&[1, 2]));
        let v0 = rx.borrow().version();
        agg.wait_settled().await;
        assert_eq!(rx.borrow().version(), v0 + 2);
    }

    #[tokio::test]
    async fn test_refetch_rearms_error_slot() {
        let mut source = FakeSource::default().with_table(1, &["cost"]);
        source.failing.insert(1);
        let source = Arc::new(source);
        let mut agg = Aggregator::new(source.clone(), fast_retry());
        agg.sync_known(&entries(&[1]));
        agg.wait_settled().await;
        assert_eq!(source.calls(1), 3);

        assert!(agg.refetch(1));
        assert!(matches!(agg.snapshot().slot(1).unwrap().state, SlotState::Pending));
        agg.wait_settled().await;
        assert_eq!(source.calls(1), 6);
        assert!(!agg.refetch(42));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_fetch() {
        let source = Arc::new(FakeSource::default().with_table(1, &["cost", "size"]));
        let cache = Arc::new(TableCache::in_memory().unwrap());

        let mut agg = Aggregator::new(source.clone(), fast_retry()).with_cache(cache.clone());
        agg.sync_known(&entries(&[1]));
        agg.wait_settled().await;
        assert_eq!(source.calls(1), 1);

        let mut again = Aggregator::new(source.clone(), fast_retry()).with_cache(cache.clone());
        again.sync_known(&entries(&[1]));
        let snap = again.wait_settled().await;
        assert_eq!(source.calls(1), 1);
        assert_eq!(source.tokens.load(Ordering::SeqCst), 2);
        let table = snap.table(1).unwrap();
        assert_eq!(table.value_names(), &strs(&["cost", "size"])[..]);
        assert!(table.get(&strs(&["0", "comm"])).is_some());
    }

    #[tokio::test]
    async fn test_global_extent_respects_selection() {
        let source = FakeSource::default()
            .with_table(1, &["cost", "cost", "cost"])
            .with_table(2, &["cost"]);
        let mut agg = Aggregator::new(Arc::new(source), fast_retry());
        agg.sync_known(&entries(&[1, 2]));
        let snap = agg.wait_settled().await;

        let only_two: HashSet<DatasetId> = [2].into_iter().collect();
        let extent = snap.global_extent(&only_two, "index", "cost").unwrap();
        assert_eq!(extent.max, Point::new(0.0, 10.0));

        let both: HashSet<DatasetId> = [1, 2].into_iter().collect();
        let extent = snap.global_extent(&both, "index", "cost").unwrap();
        assert_eq!(extent.min, Point::new(0.0, 10.0));
        assert_eq!(extent.max, Point::new(2.0, 30.0));

        assert!(snap.global_extent(&HashSet::new(), "index", "cost").is_none());
    }

    #[tokio::test]
    async fn test_panicking_load_settles_as_error() {
        let mut source = FakeSource::default()
            .with_table(1, &["cost"])
            .with_table(2, &["cost"]);
        source.panicking.insert(2);
        let mut agg = Aggregator::new(Arc::new(source), fast_retry());
        agg.sync_known(&entries(&[1, 2]));

        let snap = tokio::time::timeout(std::time::Duration::from_secs(5), agg.wait_settled())
            .await
            .expect("aggregator never settled");
        assert!(snap.is_settled());
        assert_eq!(snap.count(SlotKind::Success), 1);
        match &snap.slot(2).unwrap().state {
            SlotState::Error(e) => assert!(matches!(**e, SlotError::Task(_))),
            other => panic!("unexpected state {}", other.as_str()),
        }
    }

    #[tokio::test]
    async fn test_refetch_bypasses_cached_table() {
        let source = Arc::new(FakeSource::default().with_table(1, &["cost"]));
        let cache = Arc::new(TableCache::in_memory().unwrap());
        let mut agg = Aggregator::new(source.clone(), fast_retry()).with_cache(cache.clone());
        agg.sync_known(&entries(&[1]));
        agg.wait_settled().await;
        assert_eq!(source.calls(1), 1);
        assert_eq!(cache.len().unwrap(), 1);

        assert!(agg.refetch(1));
        let snap = agg.wait_settled().await;
        assert_eq!(source.calls(1), 2);
        assert!(snap.slot(1).unwrap().state.is_success());
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_by_kind() {
        let mut source = FakeSource::default()
            .with_table(1, &["cost"])
            .with_table(2, &["cost"]);
        source.failing.insert(2);
        let mut agg = Aggregator::new(Arc::new(source), fast_retry());
        agg.sync_known(&entries(&[1, 2]));
        assert_eq!(agg.snapshot().count(SlotKind::Pending), 2);
        let snap = agg.wait_settled().await;
        assert_eq!(snap.count(SlotKind::Pending), 0);
        assert_eq!(snap.count(SlotKind::Success), 1);
        assert_eq!(snap.count(SlotKind::Error), 1);
        assert!(snap.slot(2).unwrap().state.is_error());
    }

    #[tokio::test]
    async fn test_next_update_without_pending_returns_none() {
        let mut agg = Aggregator::new(Arc::new(FakeSource::default()), fast_retry());
        assert!(agg.next_update().await.is_none());
    }
}
