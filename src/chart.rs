//! Drawable chart frame: scaled, decimated and rule-partitioned series plus
//! axis ticks, computed from loaded tables and the current options.

use serde::Serialize;
use std::collections::HashMap;

use crate::aggregator::Extent;
use crate::decimate::decimate;
use crate::highlight::{partition, Partition};
use crate::options::{Axis, ChartChange, ChartOptions, XY};
use crate::pivot::{DatasetId, PivotTable};
use crate::scale::{format_tick, Scale};
use crate::series::{points, to_pixels};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tick {
    pub value: f64,
    pub label: String,
    /// Pixel offset along the axis.
    pub px: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFrame {
    pub dataset_id: DatasetId,
    /// Points in the raw series before decimation.
    pub total: usize,
    pub points: Partition,
}

impl SeriesFrame {
    pub fn drawn(&self) -> usize {
        self.points.highlighted.len() + self.points.dimmed.len()
    }
}

#[derive(Debug, Clone)]
pub struct ChartFrame {
    pub scales: XY<Scale>,
    pub ticks: XY<Vec<Tick>>,
    pub series: Vec<SeriesFrame>,
}

pub fn axis_ticks(scale: &Scale, spacing: f64) -> Vec<Tick> {
    scale
        .compute_ticks(spacing, false)
        .into_iter()
        .map(|value| Tick {
            value,
            label: format_tick(value),
            px: scale.forward(value),
        })
        .collect()
}

/// Builds the frame for `tables`, which the caller has already narrowed to
/// the selected datasets. `selected_rules` holds the highlighted rule of each
/// dataset; datasets without an entry are fully highlighted. Decimation runs
/// before highlighting so selecting a rule never changes which points are
/// drawn.
pub fn frame<'a, I>(
    tables: I,
    options: &ChartOptions,
    selected_rules: &HashMap<DatasetId, String>,
    width: f64,
    height: f64,
) -> ChartFrame
where
    I: IntoIterator<Item = &'a PivotTable>,
{
    let scales = options.scales(width, height);
    let ticks = XY::new(
        axis_ticks(&scales.x, options.tick_spacing.x),
        axis_ticks(&scales.y, options.tick_spacing.y),
    );

    let series = tables
        .into_iter()
        .map(|table| {
            let raw = points(table, &options.columns.x, &options.columns.y);
            let kept = decimate(&to_pixels(&raw, &scales), options.min_dist);
            let rule = selected_rules.get(&table.dataset_id()).map(String::as_str);
            SeriesFrame {
                dataset_id: table.dataset_id(),
                total: raw.len(),
                points: partition(&kept, rule),
            }
        })
        .collect();

    ChartFrame { scales, ticks, series }
}

/// Feeds the observed data maximum of each axis back into the options.
pub fn observe_extent(options: &ChartOptions, extent: Option<Extent>) -> ChartOptions {
    match extent {
        Some(e) => options
            .apply(ChartChange::Observed(Axis::X, e.max.x))
            .apply(ChartChange::Observed(Axis::Y, e.max.y)),
        None => options.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::build;
    use crate::scale::ScaleKind;
    use crate::series::Point;

    fn strs(items: &[&str]) -> Vec<String> {
        items.iter().map(|x| x.to_string()).collect()
    }

    /// 50 iterations of `cost`, alternating between two rules.
    fn table(id: DatasetId) -> PivotTable {
        let rows: Vec<Vec<String>> = (0..50)
            .map(|i| {
                let rule = if i % 2 == 0 { "comm" } else { "assoc" };
                strs(&[&i.to_string(), rule, "cost", &(i * 2).to_string()])
            })
            .collect();
        build(id, strs(&["iteration", "rule_name", "name", "value"]), &rows).unwrap()
    }

    fn rules(pairs: &[(DatasetId, &str)]) -> HashMap<DatasetId, String> {
        pairs.iter().map(|&(id, r)| (id, r.to_string())).collect()
    }

    fn observed_options() -> ChartOptions {
        let extent = Extent {
            min: Point::new(0.0, 0.0),
            max: Point::new(49.0, 98.0),
        };
        observe_extent(&ChartOptions::default(), Some(extent))
    }

    #[test]
    fn test_observe_extent_rounds_bounds() {
        let opts = observed_options();
        assert_eq!(opts.range.x.effective(), [0.0, 50.0]);
        assert_eq!(opts.range.y.effective(), [0.0, 100.0]);
        assert_eq!(observe_extent(&opts, None), opts);
    }

    #[test]
    fn test_frame_decimates_in_pixel_space() {
        let t = table(1);
        let opts = observed_options();
        let f = frame([&t], &opts, &HashMap::new(), 100.0, 100.0);
        assert_eq!(f.series.len(), 1);
        let s = &f.series[0];
        assert_eq!(s.total, 50);
        assert!(s.drawn() < 50);
        assert!(s.drawn() > 1);
        for pair in s.points.highlighted.windows(2) {
            assert!(pair[0].pt.distance(&pair[1].pt) > opts.min_dist);
        }
    }

    #[test]
    fn test_selecting_rule_keeps_drawn_points() {
        let t = table(1);
        let opts = observed_options();
        let all = frame([&t], &opts, &HashMap::new(), 100.0, 100.0);
        let picked = frame([&t], &opts, &rules(&[(1, "comm")]), 100.0, 100.0);
        assert_eq!(all.series[0].drawn(), picked.series[0].drawn());
        assert_eq!(all.scales, picked.scales);
        assert!(picked.series[0]
            .points
            .highlighted
            .iter()
            .all(|p| p.rule.as_deref() == Some("comm")));
    }

    #[test]
    fn test_rule_selection_is_per_dataset() {
        let one = table(1);
        let two = table(2);
        let opts = observed_options();
        let f = frame([&one, &two], &opts, &rules(&[(2, "assoc")]), 500.0, 500.0);

        let first = &f.series[0];
        assert_eq!(first.dataset_id, 1);
        assert!(first.points.dimmed.is_empty());

        let second = &f.series[1];
        assert_eq!(second.dataset_id, 2);
        assert!(!second.points.highlighted.is_empty());
        assert!(!second.points.dimmed.is_empty());
        assert!(second
            .points
            .highlighted
            .iter()
            .all(|p| p.rule.as_deref() == Some("assoc")));
    }

    #[test]
    fn test_ticks_are_labelled_and_placed() {
        let opts = observed_options().apply(ChartChange::ScaleKind(Axis::Y, ScaleKind::Log));
        let f = frame(Vec::<&PivotTable>::new(), &opts, &HashMap::new(), 400.0, 300.0);
        assert!(f.series.is_empty());
        assert!(f.ticks.x.iter().any(|t| t.value == 0.0 && t.px == 0.0));
        let top = f.ticks.y.iter().find(|t| t.value == 100.0).unwrap();
        assert_eq!(top.label, "100");
        assert!(top.px.abs() < 1e-9);
    }
}
