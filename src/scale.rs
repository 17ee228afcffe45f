//! Numeric domain to pixel range mapping, with nice-number ticks.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleKind {
    #[default]
    Linear,
    Log,
}

impl ScaleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScaleKind::Linear => "linear",
            ScaleKind::Log => "log",
        }
    }
}

/// Rounds `v` up to the next integer multiple of its own order of magnitude:
/// 83 -> 90, 7500 -> 8000, 5 -> 10. Inputs without a magnitude (non-positive
/// or non-finite) round to 10.
pub fn round_upper_bound(v: f64) -> f64 {
    if !v.is_finite() || v <= 0.0 {
        return 10.0;
    }
    let z = v.log10().floor();
    if z == 0.0 {
        return 10.0;
    }
    let unit = 10f64.powf(z);
    ((v / unit).floor() + 1.0) * unit
}

/// Smallest value an axis of `kind` may start at.
pub fn lower_bound(kind: ScaleKind, v: f64) -> f64 {
    let v = if v.is_finite() { v } else { 0.0 };
    match kind {
        ScaleKind::Linear => v.max(0.0),
        ScaleKind::Log => v.max(1.0),
    }
}

/// A continuous scale from a numeric domain onto a pixel range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    kind: ScaleKind,
    domain: [f64; 2],
    range: [f64; 2],
}

impl Scale {
    /// Degenerate domains are clamped rather than rejected: a log domain
    /// never goes below 1 and an empty domain is widened.
    pub fn new(kind: ScaleKind, domain: [f64; 2], range: [f64; 2]) -> Self {
        let clean = |v: f64| match kind {
            ScaleKind::Linear if v.is_finite() => v,
            ScaleKind::Linear => 0.0,
            ScaleKind::Log => lower_bound(kind, v),
        };
        let mut d = [clean(domain[0]), clean(domain[1])];
        if d[0] == d[1] {
            d[1] = match kind {
                ScaleKind::Linear => d[0] + 1.0,
                ScaleKind::Log => d[0] * 10.0,
            };
        }
        Self { kind, domain: d, range }
    }

    pub fn kind(&self) -> ScaleKind {
        self.kind
    }

    pub fn domain(&self) -> [f64; 2] {
        self.domain
    }

    pub fn range(&self) -> [f64; 2] {
        self.range
    }

    pub fn pixel_span(&self) -> f64 {
        (self.range[1] - self.range[0]).abs()
    }

    fn transform(&self, v: f64) -> f64 {
        match self.kind {
            ScaleKind::Linear => v,
            ScaleKind::Log if v > 0.0 => v.ln(),
            ScaleKind::Log => f64::NAN,
        }
    }

    fn untransform(&self, t: f64) -> f64 {
        match self.kind {
            ScaleKind::Linear => t,
            ScaleKind::Log => t.exp(),
        }
    }

    /// Maps a domain value to pixels. Values a log scale cannot represent map to NaN.
    pub fn forward(&self, v: f64) -> f64 {
        let t0 = self.transform(self.domain[0]);
        let t1 = self.transform(self.domain[1]);
        let t = self.transform(v);
        self.range[0] + (t - t0) / (t1 - t0) * (self.range[1] - self.range[0])
    }

    pub fn invert(&self, px: f64) -> f64 {
        let t0 = self.transform(self.domain[0]);
        let t1 = self.transform(self.domain[1]);
        let frac = (px - self.range[0]) / (self.range[1] - self.range[0]);
        self.untransform(t0 + frac * (t1 - t0))
    }

    /// Roughly `count` nice tick values inside the domain, ascending.
    pub fn ticks(&self, count: f64) -> Vec<f64> {
        let lo = self.domain[0].min(self.domain[1]);
        let hi = self.domain[0].max(self.domain[1]);
        match self.kind {
            ScaleKind::Linear => linear_ticks(lo, hi, count),
            ScaleKind::Log => log_ticks(lo, hi, count),
        }
    }

    /// Ticks spaced about `spacing` pixels apart, never fewer than two
    /// requested. On a log scale `powers_of_ten` keeps only exact decades.
    pub fn compute_ticks(&self, spacing: f64, powers_of_ten: bool) -> Vec<f64> {
        let count = if spacing > 0.0 {
            (self.pixel_span() / spacing).max(2.0)
        } else {
            2.0
        };
        let ticks = self.ticks(count);
        if powers_of_ten && self.kind == ScaleKind::Log {
            ticks.into_iter().filter(|t| is_power_of_ten(*t)).collect()
        } else {
            ticks
        }
    }
}

pub fn is_power_of_ten(v: f64) -> bool {
    if v <= 0.0 || !v.is_finite() {
        return false;
    }
    let l = v.log10();
    (l - l.round()).abs() < 1e-9
}

fn linear_ticks(lo: f64, hi: f64, count: f64) -> Vec<f64> {
    if !(lo.is_finite() && hi.is_finite()) || count <= 0.0 {
        return Vec::new();
    }
    if lo == hi {
        return vec![lo];
    }
    let raw = (hi - lo) / count;
    let power = raw.log10().floor();
    let err = raw / 10f64.powf(power);
    let factor = if err >= 50f64.sqrt() {
        10.0
    } else if err >= 10f64.sqrt() {
        5.0
    } else if err >= 2f64.sqrt() {
        2.0
    } else {
        1.0
    };

    // Negative powers divide by an integer increment to keep values exact.
    if power >= 0.0 {
        let step = factor * 10f64.powf(power);
        let start = (lo / step).ceil() as i64;
        let end = (hi / step).floor() as i64;
        (start..=end).map(|i| i as f64 * step).collect()
    } else {
        let inc = 10f64.powf(-power) / factor;
        let start = (lo * inc).ceil() as i64;
        let end = (hi * inc).floor() as i64;
        (start..=end).map(|i| i as f64 / inc).collect()
    }
}

fn log_ticks(lo: f64, hi: f64, count: f64) -> Vec<f64> {
    if lo <= 0.0 || !(lo.is_finite() && hi.is_finite()) {
        return Vec::new();
    }
    let i = lo.log10();
    let j = hi.log10();
    if j - i < count {
        let mut out = Vec::new();
        for k in (i.floor() as i32)..=(j.ceil() as i32) {
            for m in 1..10 {
                let t = if k < 0 {
                    m as f64 / 10f64.powi(-k)
                } else {
                    m as f64 * 10f64.powi(k)
                };
                if t >= lo && t <= hi {
                    out.push(t);
                }
            }
        }
        out
    } else {
        linear_ticks(i, j, (j - i).min(count))
            .into_iter()
            .map(|e| 10f64.powf(e))
            .collect()
    }
}

/// Axis label for a tick: small or short values as-is, exact decades as
/// `10^k`, everything else as `m×10^e`.
pub fn format_tick(v: f64) -> String {
    let plain = format!("{}", v);
    if v < 10.0 || plain.len() <= 4 {
        return plain;
    }
    if is_power_of_ten(v) {
        return format!("10^{}", v.log10().round() as i32);
    }
    let exp = format!("{:e}", v);
    match exp.split_once('e') {
        Some((mantissa, e)) => format!("{}×10^{}", mantissa, e.trim_start_matches('+')),
        None => plain,
    }
}
