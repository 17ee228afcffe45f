use anyhow::Result;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use eggviz::aggregator::{Aggregator, SlotKind};
use eggviz::cache::TableCache;
use eggviz::chart::{frame, observe_extent};
use eggviz::config::Config;
use eggviz::logging::{log, obj, v_num, v_str, Domain, Level, ProfileScope};
use eggviz::options::{Axis, ChartChange, ChartOptions};
use eggviz::pivot::DatasetId;
use eggviz::source::{self, DataSource};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let _scope = ProfileScope::new("eggviz_run");

    let source: Arc<dyn DataSource> = Arc::from(source::from_config(&cfg)?);
    let mut aggregator = Aggregator::new(source, cfg.retry());
    if cfg.cache_enabled() {
        match TableCache::open(&cfg.cache_path) {
            Ok(cache) => aggregator = aggregator.with_cache(Arc::new(cache)),
            // Run uncached rather than not at all.
            Err(e) => log(
                Level::Warn,
                Domain::Cache,
                "cache_unavailable",
                obj(&[("path", v_str(&cfg.cache_path)), ("error", v_str(&e.to_string()))]),
            ),
        }
    }

    let entries = aggregator.refresh_listing().await?;
    log(
        Level::Info,
        Domain::System,
        "listing",
        obj(&[
            ("datasets", json!(entries.len())),
            ("paths", json!(entries.iter().map(|e| e.path.as_str()).collect::<Vec<_>>())),
        ]),
    );

    let snapshot = aggregator.wait_settled().await;
    log(
        Level::Info,
        Domain::System,
        "settled",
        obj(&[
            ("success", json!(snapshot.count(SlotKind::Success))),
            ("error", json!(snapshot.count(SlotKind::Error))),
            ("shared_columns", json!(snapshot.shared_columns())),
        ]),
    );

    let selected: HashSet<DatasetId> = snapshot.tables().map(|t| t.dataset_id()).collect();
    let base = ChartOptions::default()
        .apply(ChartChange::Column(Axis::X, cfg.x_column.clone()))
        .apply(ChartChange::Column(Axis::Y, cfg.y_column.clone()))
        .apply(ChartChange::MinDist(cfg.min_dist));
    let extent = snapshot.global_extent(&selected, &cfg.x_column, &cfg.y_column);
    let options = observe_extent(&base, extent);

    let chart = frame(
        snapshot.tables().map(|t| &**t),
        &options,
        &HashMap::new(),
        cfg.chart_width,
        cfg.chart_height,
    );

    for axis in [Axis::X, Axis::Y] {
        let ticks = chart.ticks.get(axis);
        log(
            Level::Info,
            Domain::Scale,
            "axis",
            obj(&[
                ("axis", json!(axis)),
                ("kind", v_str(options.scale_kind.get(axis).as_str())),
                ("column", v_str(options.columns.get(axis))),
                ("domain", json!(options.domain(axis))),
                ("ticks", json!(ticks.iter().map(|t| t.label.as_str()).collect::<Vec<_>>())),
            ]),
        );
    }

    for series in &chart.series {
        let rules = snapshot.rules(series.dataset_id);
        log(
            Level::Info,
            Domain::System,
            "series",
            obj(&[
                ("dataset_id", json!(series.dataset_id)),
                ("points", v_num(series.total as f64)),
                ("drawn", v_num(series.drawn() as f64)),
                ("rules", json!(rules)),
            ]),
        );
    }

    Ok(())
}
