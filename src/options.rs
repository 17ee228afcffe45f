//! Chart configuration as immutable values.
//!
//! Every change goes through [`ChartOptions::apply`], which returns a new
//! value and leaves the old one untouched.

use serde::{Deserialize, Serialize};

use crate::scale::{lower_bound, round_upper_bound, Scale, ScaleKind};

/// A value per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XY<T> {
    pub x: T,
    pub y: T,
}

impl<T> XY<T> {
    pub fn new(x: T, y: T) -> Self {
        Self { x, y }
    }

    pub fn get(&self, axis: Axis) -> &T {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
        }
    }

    fn with(mut self, axis: Axis, value: T) -> Self {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bound {
    Min,
    Max,
}

/// Automatic-versus-pinned range for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeLock {
    pub locked: bool,
    pub user: [Option<f64>; 2],
    pub computed: [f64; 2],
}

impl Default for RangeLock {
    fn default() -> Self {
        Self {
            locked: false,
            user: [None, None],
            computed: [0.0, 100.0],
        }
    }
}

impl RangeLock {
    /// The range actually displayed.
    pub fn effective(&self) -> [f64; 2] {
        if self.locked {
            [
                self.user[0].unwrap_or(self.computed[0]),
                self.user[1].unwrap_or(self.computed[1]),
            ]
        } else {
            self.computed
        }
    }

    /// Locking pins both bounds to the current automatic range, so the
    /// displayed range does not jump. Unlocking keeps the pinned values but
    /// shows the automatic range again.
    pub fn toggled(self, locked: bool) -> Self {
        if locked && !self.locked {
            Self {
                locked: true,
                user: [Some(self.computed[0]), Some(self.computed[1])],
                ..self
            }
        } else {
            Self { locked, ..self }
        }
    }

    pub fn pinned(self, bound: Bound, value: Option<f64>) -> Self {
        let mut user = self.user;
        user[bound as usize] = value.filter(|v| v.is_finite());
        Self { user, ..self }
    }

    /// Tracks the observed data maximum, rounded to a nice bound.
    pub fn observed(self, max: f64) -> Self {
        Self {
            computed: [self.computed[0], round_upper_bound(max)],
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartOptions {
    pub scale_kind: XY<ScaleKind>,
    /// Pixels between ticks.
    pub tick_spacing: XY<f64>,
    pub draw_line: bool,
    pub columns: XY<String>,
    pub range: XY<RangeLock>,
    pub min_dist: f64,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            scale_kind: XY::new(ScaleKind::Linear, ScaleKind::Linear),
            tick_spacing: XY::new(200.0, 100.0),
            draw_line: true,
            columns: XY::new("index".to_string(), "cost".to_string()),
            range: XY::new(RangeLock::default(), RangeLock::default()),
            min_dist: 5.0,
        }
    }
}

/// One user or data-driven change to the chart configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartChange {
    ScaleKind(Axis, ScaleKind),
    TickSpacing(Axis, f64),
    DrawLine(bool),
    Column(Axis, String),
    Lock(Axis, bool),
    Pin(Axis, Bound, Option<f64>),
    Observed(Axis, f64),
    MinDist(f64),
}

impl ChartOptions {
    pub fn apply(&self, change: ChartChange) -> Self {
        let mut next = self.clone();
        match change {
            ChartChange::ScaleKind(axis, kind) => next.scale_kind = next.scale_kind.with(axis, kind),
            ChartChange::TickSpacing(axis, px) => {
                next.tick_spacing = next.tick_spacing.with(axis, px.max(1.0))
            }
            ChartChange::DrawLine(on) => next.draw_line = on,
            ChartChange::Column(axis, name) => next.columns = next.columns.clone().with(axis, name),
            ChartChange::Lock(axis, locked) => {
                next.range = next.range.with(axis, self.range.get(axis).toggled(locked))
            }
            ChartChange::Pin(axis, bound, value) => {
                next.range = next.range.with(axis, self.range.get(axis).pinned(bound, value))
            }
            ChartChange::Observed(axis, max) => {
                next.range = next.range.with(axis, self.range.get(axis).observed(max))
            }
            ChartChange::MinDist(d) => next.min_dist = d.max(0.0),
        }
        next
    }

    /// Domain shown on `axis`, with the lower bound floored for the scale kind.
    pub fn domain(&self, axis: Axis) -> [f64; 2] {
        let kind = *self.scale_kind.get(axis);
        let [lo, hi] = self.range.get(axis).effective();
        [lower_bound(kind, lo), hi]
    }

    /// Scales for a plot area of `width` x `height` pixels. The y axis grows
    /// upwards, so its domain is reversed onto the pixel range.
    pub fn scales(&self, width: f64, height: f64) -> XY<Scale> {
        let [x_lo, x_hi] = self.domain(Axis::X);
        let [y_lo, y_hi] = self.domain(Axis::Y);
        XY::new(
            Scale::new(self.scale_kind.x, [x_lo, x_hi], [0.0, width]),
            Scale::new(self.scale_kind.y, [y_hi, y_lo], [0.0, height]),
        )
    }
}
