//! Data-to-pixel scales
//!
//! A [`Scale`] maps a cell value to a pixel coordinate along one axis and,
//! for continuous axes, back. Numeric axes of columns that contain special
//! values (NaN, inf, null) reserve a band of [`OUTLIER_BAND_PX`] pixels at the
//! far end of the range where those values are drawn.

use crate::infer::ParamDef;
use crate::model::{ParamType, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Size of the band reserved for special values.
pub const OUTLIER_BAND_PX: f64 = 30.0;

const OUTLIER_TICK_LABEL: &str = "nan/inf/null";

#[derive(Debug, Clone, PartialEq)]
enum Domain {
    Linear { min: f64, max: f64 },
    Log { min: f64, max: f64 },
    /// Milliseconds since the epoch.
    Timestamp { min: f64, max: f64 },
    /// Rank among sorted distinct values, restricted to `values[lo..=hi]`.
    Percentile {
        values: Arc<Vec<f64>>,
        lo: usize,
        hi: usize,
    },
    Point { values: Vec<Value> },
}

/// A labelled axis tick at a pixel position.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub position: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scale {
    domain: Domain,
    range: (f64, f64),
    outliers: bool,
    param_type: ParamType,
    num_values: usize,
}

fn normalize(x: f64, a: f64, b: f64) -> f64 {
    if b == a {
        0.5
    } else {
        (x - a) / (b - a)
    }
}

impl Scale {
    /// Scale for a column, with an outlier band when the column has special
    /// values and a numeric axis type.
    pub fn new(pd: &ParamDef) -> Scale {
        let mut scale = Scale::without_outliers(pd);
        scale.outliers = !pd.special_values.is_empty() && pd.param_type.has_outlier_band();
        scale
    }

    /// Scale for a column that ignores special values altogether.
    pub fn without_outliers(pd: &ParamDef) -> Scale {
        let (min, max) = pd.value_range().unwrap_or((0.0, 1.0));
        let domain = match pd.param_type {
            ParamType::Categorical => Domain::Point {
                values: pd.distinct_values.clone(),
            },
            ParamType::NumericPercentile => {
                let values = pd.numeric_values();
                if values.len() >= 2 {
                    let hi = values.len() - 1;
                    Domain::Percentile {
                        values: Arc::new(values),
                        lo: 0,
                        hi,
                    }
                } else {
                    tracing::warn!("Column '{}' has too few values for a percentile axis", pd.name);
                    Domain::Linear { min, max }
                }
            }
            ParamType::Timestamp => Domain::Timestamp { min, max },
            ParamType::NumericLog if min > 0.0 && max > 0.0 => Domain::Log { min, max },
            ParamType::NumericLog => {
                tracing::warn!("Column '{}' has non-positive values, log axis drawn linear", pd.name);
                Domain::Linear { min, max }
            }
            ParamType::Numeric => Domain::Linear { min, max },
        };
        Scale {
            domain,
            range: (0.0, 1.0),
            outliers: false,
            param_type: pd.param_type,
            num_values: pd.distinct_values.len(),
        }
    }

    /// Point scale over explicit values (categorical axes, reordered bins).
    pub fn point(values: Vec<Value>) -> Scale {
        let num_values = values.len();
        Scale {
            domain: Domain::Point { values },
            range: (0.0, 1.0),
            outliers: false,
            param_type: ParamType::Categorical,
            num_values,
        }
    }

    /// Plain linear scale (density axes).
    pub fn linear(min: f64, max: f64) -> Scale {
        Scale {
            domain: Domain::Linear { min, max },
            range: (0.0, 1.0),
            outliers: false,
            param_type: ParamType::Numeric,
            num_values: 0,
        }
    }

    pub fn with_range(mut self, r0: f64, r1: f64) -> Scale {
        self.range = (r0, r1);
        self
    }

    pub fn set_range(&mut self, r0: f64, r1: f64) {
        self.range = (r0, r1);
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    pub fn param_type(&self) -> ParamType {
        self.param_type
    }

    pub fn num_values(&self) -> usize {
        self.num_values
    }

    pub fn has_outliers(&self) -> bool {
        self.outliers
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.domain, Domain::Point { .. })
    }

    /// Ordered values of a categorical axis.
    pub fn point_domain(&self) -> Option<&[Value]> {
        match &self.domain {
            Domain::Point { values } => Some(values),
            _ => None,
        }
    }

    /// Replace the value order of a categorical axis.
    pub fn set_point_domain(&mut self, values: Vec<Value>) {
        if let Domain::Point { values: current } = &mut self.domain {
            *current = values;
        }
    }

    /// Current numeric domain of a continuous axis.
    pub fn domain_bounds(&self) -> Option<(f64, f64)> {
        match &self.domain {
            Domain::Linear { min, max }
            | Domain::Log { min, max }
            | Domain::Timestamp { min, max } => Some((*min, *max)),
            Domain::Percentile { values, lo, hi } => Some((values[*lo], values[*hi])),
            Domain::Point { .. } => None,
        }
    }

    /// Restrict a continuous axis to `[a, b]`.
    pub fn set_domain(&mut self, a: f64, b: f64) {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        match &mut self.domain {
            Domain::Linear { min, max } | Domain::Timestamp { min, max } => {
                *min = a;
                *max = b;
            }
            Domain::Log { min, max } => {
                if a > 0.0 {
                    *min = a;
                    *max = b;
                }
            }
            Domain::Percentile { values, lo, hi } => {
                let last = values.len() - 1;
                let mut new_lo = values.partition_point(|v| *v < a).min(last);
                let mut new_hi = values.partition_point(|v| *v <= b).saturating_sub(1);
                if new_hi <= new_lo {
                    new_lo = new_lo.saturating_sub(1);
                    new_hi = (new_hi.max(new_lo) + 1).min(last);
                }
                *lo = new_lo;
                *hi = new_hi;
            }
            Domain::Point { .. } => {}
        }
    }

    /// Position of `x` in the domain as a fraction (continuous axes).
    fn unit(&self, x: f64) -> f64 {
        match &self.domain {
            Domain::Linear { min, max } | Domain::Timestamp { min, max } => normalize(x, *min, *max),
            Domain::Log { min, max } => {
                if x <= 0.0 {
                    return f64::NAN;
                }
                normalize(x.ln(), min.ln(), max.ln())
            }
            Domain::Percentile { values, lo, hi } => {
                if hi == lo {
                    return 0.5;
                }
                let (lo, hi) = (*lo, *hi);
                let rank = if x <= values[lo] {
                    lo as f64
                } else if x >= values[hi] {
                    hi as f64
                } else {
                    let j = values[lo..=hi].partition_point(|v| *v < x) + lo;
                    let (a, b) = (values[j - 1], values[j]);
                    (j - 1) as f64 + normalize(x, a, b)
                };
                (rank - lo as f64) / (hi - lo) as f64
            }
            Domain::Point { .. } => f64::NAN,
        }
    }

    fn unit_inverse(&self, t: f64) -> f64 {
        match &self.domain {
            Domain::Linear { min, max } | Domain::Timestamp { min, max } => min + t * (max - min),
            Domain::Log { min, max } => (min.ln() + t * (max.ln() - min.ln())).exp(),
            Domain::Percentile { values, lo, hi } => {
                let rank = (*lo as f64 + t * (*hi - *lo) as f64).clamp(*lo as f64, *hi as f64);
                let i = rank.floor() as usize;
                if i >= *hi {
                    return values[*hi];
                }
                let frac = rank - i as f64;
                values[i] + frac * (values[i + 1] - values[i])
            }
            Domain::Point { .. } => f64::NAN,
        }
    }

    /// Length of the range used by regular values.
    fn value_span(&self) -> f64 {
        let full = (self.range.1 - self.range.0).abs();
        if self.outliers {
            (full - OUTLIER_BAND_PX).max(0.0)
        } else {
            full
        }
    }

    fn ascending(&self) -> bool {
        self.range.0 <= self.range.1
    }

    fn place(&self, t: f64) -> f64 {
        if !self.outliers {
            return self.range.0 + t * (self.range.1 - self.range.0);
        }
        let offset = t * self.value_span();
        if self.ascending() {
            self.range.0 + offset
        } else {
            self.range.0 - offset
        }
    }

    /// Pixel position of a number on a continuous axis.
    pub fn apply_f64(&self, x: f64) -> Option<f64> {
        if !x.is_finite() {
            return if self.outliers { Some(self.range.1) } else { None };
        }
        let t = self.unit(x);
        if t.is_finite() {
            Some(self.place(t))
        } else {
            None
        }
    }

    /// Pixel position of a cell value; `None` when the value cannot be drawn.
    pub fn apply(&self, v: &Value) -> Option<f64> {
        if let Domain::Point { values } = &self.domain {
            let i = values
                .iter()
                .position(|d| d == v)
                .or_else(|| {
                    let text = v.to_string();
                    values.iter().position(|d| d.to_string() == text)
                })?;
            let t = if values.len() <= 1 {
                0.5
            } else {
                i as f64 / (values.len() - 1) as f64
            };
            return Some(self.range.0 + t * (self.range.1 - self.range.0));
        }
        if self.outliers && v.is_special_numeric() {
            return Some(self.range.1);
        }
        self.apply_f64(v.as_f64()?)
    }

    /// Pixel position where special values are drawn, if this axis has a band.
    pub fn special_position(&self) -> Option<f64> {
        self.outliers.then_some(self.range.1)
    }

    /// Value at a pixel position (continuous axes). Positions inside the
    /// outlier band map to the end of the domain.
    pub fn invert(&self, px: f64) -> Option<f64> {
        if self.is_categorical() {
            return None;
        }
        let t = if self.outliers {
            let span = self.value_span();
            let offset = if self.ascending() {
                px - self.range.0
            } else {
                self.range.0 - px
            };
            if offset > span {
                return Some(self.unit_inverse(1.0));
            }
            if span == 0.0 {
                0.0
            } else {
                offset / span
            }
        } else {
            let width = self.range.1 - self.range.0;
            if width == 0.0 {
                0.0
            } else {
                (px - self.range.0) / width
            }
        };
        Some(self.unit_inverse(t))
    }

    /// Zoom to the pixel interval `[px0, px1]`. Returns false when the
    /// interval selects nothing and the scale is left unchanged.
    pub fn zoom(&mut self, px0: f64, px1: f64) -> bool {
        if let Domain::Point { values } = &self.domain {
            let picked = categorical_slice(values, self.range, (px0, px1));
            if picked.is_empty() {
                return false;
            }
            self.domain = Domain::Point { values: picked };
            return true;
        }
        match (self.invert(px0), self.invert(px1)) {
            (Some(a), Some(b)) if a != b => {
                self.set_domain(a, b);
                true
            }
            _ => false,
        }
    }

    /// About `count` ticks along the axis.
    pub fn ticks(&self, count: usize) -> Vec<Tick> {
        let count = count.max(2);
        let values_count = if self.outliers { count - 1 } else { count };
        let mut ticks: Vec<Tick> = match &self.domain {
            Domain::Point { values } => values
                .iter()
                .filter_map(|v| {
                    self.apply(v).map(|position| Tick {
                        position,
                        label: v.to_string(),
                    })
                })
                .collect(),
            Domain::Linear { min, max } => {
                let step = nice_step(*min, *max, values_count);
                self.numeric_ticks(linear_ticks(*min, *max, values_count), |v| format_number(v, step))
            }
            Domain::Timestamp { min, max } => {
                self.numeric_ticks(linear_ticks(*min, *max, values_count), format_timestamp)
            }
            Domain::Log { min, max } => {
                self.numeric_ticks(log_ticks(*min, *max, values_count), |v| format!("{:e}", v))
            }
            Domain::Percentile { values, lo, hi } => self.numeric_ticks(
                percentile_ticks(values, *lo, *hi, values_count),
                |v| Value::Number(v).to_string(),
            ),
        };
        if let Some(position) = self.special_position() {
            ticks.push(Tick {
                position,
                label: OUTLIER_TICK_LABEL.to_string(),
            });
        }
        ticks
    }

    fn numeric_ticks(&self, values: Vec<f64>, label: impl Fn(f64) -> String) -> Vec<Tick> {
        values
            .into_iter()
            .filter_map(|v| {
                self.apply_f64(v).map(|position| Tick {
                    position,
                    label: label(v),
                })
            })
            .collect()
    }
}

fn nice_step(a: f64, b: f64, count: usize) -> f64 {
    let span = (b - a).abs();
    if span == 0.0 || !span.is_finite() {
        return 1.0;
    }
    let raw = span / count.max(1) as f64;
    let power = 10f64.powf(raw.log10().floor());
    let error = raw / power;
    let factor = if error >= 50f64.sqrt() {
        10.0
    } else if error >= 10f64.sqrt() {
        5.0
    } else if error >= 2f64.sqrt() {
        2.0
    } else {
        1.0
    };
    factor * power
}

/// Round-number ticks inside `[a, b]`.
fn linear_ticks(a: f64, b: f64, count: usize) -> Vec<f64> {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo == hi {
        return vec![lo];
    }
    let step = nice_step(lo, hi, count);
    let start = (lo / step).ceil() as i64;
    let stop = (hi / step).floor() as i64;
    (start..=stop).map(|i| i as f64 * step).collect()
}

fn log_ticks(a: f64, b: f64, count: usize) -> Vec<f64> {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let p0 = lo.log10().floor() as i32;
    let p1 = hi.log10().ceil() as i32;
    let decades = (p1 - p0).max(1) as usize;
    let multiples: &[f64] = if decades < 3 { &[1.0, 2.0, 5.0] } else { &[1.0] };
    let stride = (decades / count.max(1)).max(1);
    let mut out = Vec::new();
    for (k, p) in (p0..=p1).enumerate() {
        if k % stride != 0 {
            continue;
        }
        for m in multiples {
            let v = m * 10f64.powi(p);
            if v >= lo && v <= hi {
                out.push(v);
            }
        }
    }
    out
}

fn precision_floor(v: f64, p: i32) -> f64 {
    if v < 0.0 {
        return -precision_floor(-v, p);
    }
    if v == 0.0 {
        return 0.0;
    }
    let pow = 10f64.powi(p - 1 - v.log10().floor() as i32);
    (v * pow).floor() / pow
}

fn to_precision(v: f64, p: i32) -> f64 {
    let digits = (p - 1).max(0) as usize;
    format!("{:.*e}", digits, v).parse().unwrap_or(v)
}

/// One tick per quantile interval, at the roundest number inside it.
fn percentile_ticks(values: &[f64], lo: usize, hi: usize, n: usize) -> Vec<f64> {
    let span = (hi - lo) as f64;
    let mut ticks: Vec<f64> = Vec::with_capacity(n);
    for i in 0..n {
        let start_idx = lo + (i as f64 / n as f64 * span).floor() as usize;
        let end_idx = lo + ((i + 1) as f64 / n as f64 * span).floor() as usize;
        let start = values[start_idx.min(hi)];
        let end = values[end_idx.min(hi)];
        let val = if start == end {
            start
        } else {
            let prev = ticks.last().copied().unwrap_or(start);
            let mut precision = 1;
            while precision < 20 && precision_floor(prev, precision) == precision_floor(end, precision) {
                precision += 1;
            }
            to_precision((prev + end) / 2.0, precision)
        };
        if ticks.last() == Some(&val) {
            continue;
        }
        ticks.push(val);
    }
    ticks
}

fn format_number(v: f64, step: f64) -> String {
    let abs = v.abs();
    if abs != 0.0 && !(1e-4..1e7).contains(&abs) {
        return format!("{:.2e}", v);
    }
    let decimals = if step >= 1.0 {
        0
    } else {
        (-step.log10().floor()) as usize
    };
    format!("{:.*}", decimals, v)
}

fn format_timestamp(ms: f64) -> String {
    match chrono::DateTime::from_timestamp_millis(ms as i64) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => format!("{}", ms),
    }
}

fn categorical_slice(values: &[Value], range: (f64, f64), extents: (f64, f64)) -> Vec<Value> {
    if values.is_empty() {
        return Vec::new();
    }
    let n0 = normalize(extents.0, range.0, range.1);
    let n1 = normalize(extents.1, range.0, range.1);
    let last = (values.len() - 1) as f64;
    let first = (n0.min(n1) * last).ceil().max(0.0) as usize;
    let end = ((n0.max(n1) * last + 1.0).floor().max(0.0) as usize).min(values.len());
    if first >= end {
        return Vec::new();
    }
    values[first..end].to_vec()
}

/// A pixel brush converted back into data space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleDomainRange {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub brush_extents_normalized: (f64, f64),
    /// Categorical axes: the values covered by the brush.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
    /// Continuous axes: `(min, max)` covered by the brush.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,
    pub include_infnans: bool,
}

/// Invert a pixel brush `extents` on `scale`.
pub fn scale_pixels_range(scale: &Scale, extents: (f64, f64)) -> ScaleDomainRange {
    let (r0, r1) = scale.range();
    let normalized = (normalize(extents.0, r0, r1), normalize(extents.1, r0, r1));
    if let Some(values) = scale.point_domain() {
        return ScaleDomainRange {
            param_type: scale.param_type(),
            brush_extents_normalized: normalized,
            values: Some(categorical_slice(values, (r0, r1), extents)),
            range: None,
            include_infnans: false,
        };
    }
    // Widen brushes touching the ends so the extreme values stay selectable.
    let (lo_px, hi_px) = (r0.min(r1), r0.max(r1));
    let mut ext = [extents.0, extents.1];
    for e in ext.iter_mut() {
        if *e == lo_px {
            *e -= 1.0;
        }
        if *e == hi_px {
            *e += 1.0;
        }
    }
    let a = scale.invert(ext[0]).unwrap_or(f64::NAN);
    let b = scale.invert(ext[1]).unwrap_or(f64::NAN);
    let include_infnans = scale
        .special_position()
        .map(|p| ext[0].min(ext[1]) <= p && p <= ext[0].max(ext[1]))
        .unwrap_or(false);
    ScaleDomainRange {
        param_type: scale.param_type(),
        brush_extents_normalized: normalized,
        values: None,
        range: Some((a.min(b), a.max(b))),
        include_infnans,
    }
}

/// Per-column scale cache. A scale is rebuilt only when the column's
/// definition or its pixel range changes.
#[derive(Debug, Default)]
pub struct ScaleCache {
    entries: HashMap<String, (ParamDef, (f64, f64), Scale)>,
    rebuilds: usize,
}

impl ScaleCache {
    pub fn get_or_build(&mut self, pd: &ParamDef, range: (f64, f64)) -> &Scale {
        let stale = match self.entries.get(&pd.name) {
            Some((cached_pd, cached_range, _)) => cached_pd != pd || *cached_range != range,
            None => true,
        };
        if stale {
            self.rebuilds += 1;
            let scale = Scale::new(pd).with_range(range.0, range.1);
            self.entries.insert(pd.name.clone(), (pd.clone(), range, scale));
        }
        &self.entries[&pd.name].2
    }

    /// Mutable access to an already built scale (zoom, reorder).
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Scale> {
        self.entries.get_mut(name).map(|(_, _, s)| s)
    }

    pub fn get(&self, name: &str) -> Option<&Scale> {
        self.entries.get(name).map(|(_, _, s)| s)
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.remove(name);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// How many scales have been (re)built, for change tracking.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pd(name: &str, t: ParamType, values: &[f64], specials: bool) -> ParamDef {
        ParamDef {
            name: name.into(),
            optional: false,
            numeric: true,
            distinct_values: values.iter().map(|v| Value::Number(*v)).collect(),
            special_values: if specials { vec![Value::from("inf")] } else { vec![] },
            type_options: ParamType::ALL.to_vec(),
            param_type: t,
            colors: None,
            colormap: None,
            force_value_min: None,
            force_value_max: None,
        }
    }

    #[test]
    fn test_linear_apply_invert() {
        let s = Scale::new(&pd("x", ParamType::Numeric, &[0.0, 5.0, 10.0], false)).with_range(100.0, 0.0);
        assert_relative_eq!(s.apply(&Value::Number(0.0)).unwrap(), 100.0);
        assert_relative_eq!(s.apply(&Value::Number(2.5)).unwrap(), 75.0);
        assert_relative_eq!(s.invert(25.0).unwrap(), 7.5);
        assert_eq!(s.apply(&Value::from("inf")), None);
        assert_eq!(s.apply(&Value::from("abc")), None);
    }

    #[test]
    fn test_log_scale() {
        let s = Scale::new(&pd("lr", ParamType::NumericLog, &[0.001, 0.01, 0.1], false)).with_range(0.0, 200.0);
        assert_relative_eq!(s.apply(&Value::Number(0.01)).unwrap(), 100.0, epsilon = 1e-9);
        assert_relative_eq!(s.invert(100.0).unwrap(), 0.01, epsilon = 1e-12);
        assert_eq!(s.apply(&Value::Number(-1.0)), None);
    }

    #[test]
    fn test_outlier_band() {
        let s = Scale::new(&pd("loss", ParamType::Numeric, &[0.0, 1.0], true)).with_range(130.0, 0.0);
        assert!(s.has_outliers());
        // Regular values use 100 px, special values sit at the far end.
        assert_relative_eq!(s.apply(&Value::Number(1.0)).unwrap(), 30.0);
        assert_relative_eq!(s.apply(&Value::Number(0.0)).unwrap(), 130.0);
        assert_eq!(s.apply(&Value::Null), Some(0.0));
        assert_eq!(s.apply(&Value::from("inf")), Some(0.0));
        assert_relative_eq!(s.invert(80.0).unwrap(), 0.5);
        assert_relative_eq!(s.invert(10.0).unwrap(), 1.0);
        assert_eq!(s.ticks(5).last().unwrap().label, "nan/inf/null");
    }

    #[test]
    fn test_percentile_scale() {
        let s = Scale::new(&pd("x", ParamType::NumericPercentile, &[1.0, 2.0, 100.0, 1000.0, 1e6], false))
            .with_range(0.0, 4.0);
        assert_relative_eq!(s.apply(&Value::Number(100.0)).unwrap(), 2.0);
        assert_relative_eq!(s.apply(&Value::Number(1e6)).unwrap(), 4.0);
        assert_relative_eq!(s.apply(&Value::Number(550.0)).unwrap(), 2.5);
        assert_relative_eq!(s.invert(3.0).unwrap(), 1000.0);
        assert!(!s.ticks(4).is_empty());
    }

    #[test]
    fn test_percentile_set_domain() {
        let mut s = Scale::new(&pd("x", ParamType::NumericPercentile, &[1.0, 2.0, 3.0, 4.0, 5.0], false))
            .with_range(0.0, 1.0);
        s.set_domain(2.0, 4.0);
        assert_eq!(s.domain_bounds(), Some((2.0, 4.0)));
        s.set_domain(3.0, 3.0);
        let (a, b) = s.domain_bounds().unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_point_scale() {
        let s = Scale::point(vec!["a".into(), "b".into(), "c".into()]).with_range(0.0, 100.0);
        assert_eq!(s.apply(&Value::from("b")), Some(50.0));
        assert_eq!(s.apply(&Value::from("z")), None);
        assert_eq!(s.invert(10.0), None);
        let single = Scale::point(vec!["a".into()]).with_range(0.0, 100.0);
        assert_eq!(single.apply(&Value::from("a")), Some(50.0));
    }

    #[test]
    fn test_pixels_range_categorical() {
        let s = Scale::point(vec!["a".into(), "b".into(), "c".into(), "d".into()]).with_range(0.0, 300.0);
        let r = scale_pixels_range(&s, (90.0, 210.0));
        assert_eq!(r.values, Some(vec![Value::from("b"), Value::from("c")]));
        let r = scale_pixels_range(&s, (110.0, 190.0));
        assert_eq!(r.values, Some(vec![]));
    }

    #[test]
    fn test_pixels_range_numeric_extrema() {
        let s = Scale::new(&pd("x", ParamType::Numeric, &[0.0, 10.0], false)).with_range(100.0, 0.0);
        let r = scale_pixels_range(&s, (0.0, 100.0));
        let (lo, hi) = r.range.unwrap();
        assert!(lo < 0.0 && hi > 10.0);
        assert!(!r.include_infnans);
        let r = scale_pixels_range(&s, (25.0, 50.0));
        let (lo, hi) = r.range.unwrap();
        assert_relative_eq!(lo, 5.0);
        assert_relative_eq!(hi, 7.5);
    }

    #[test]
    fn test_pixels_range_covers_outlier_band() {
        let s = Scale::new(&pd("x", ParamType::Numeric, &[0.0, 10.0], true)).with_range(130.0, 0.0);
        assert!(scale_pixels_range(&s, (0.0, 50.0)).include_infnans);
        assert!(!scale_pixels_range(&s, (40.0, 130.0)).include_infnans);
    }

    #[test]
    fn test_zoom() {
        let mut s = Scale::new(&pd("x", ParamType::Numeric, &[0.0, 10.0], false)).with_range(0.0, 100.0);
        assert!(s.zoom(20.0, 40.0));
        let (a, b) = s.domain_bounds().unwrap();
        assert_relative_eq!(a, 2.0);
        assert_relative_eq!(b, 4.0);
        assert!(!s.zoom(50.0, 50.0));
    }

    #[test]
    fn test_linear_ticks_are_round() {
        let t = linear_ticks(0.0, 1.0, 5);
        assert_eq!(t.len(), 6);
        assert_relative_eq!(t[3], 0.6, epsilon = 1e-12);
        assert_eq!(linear_ticks(3.0, 3.0, 5), vec![3.0]);
        let s = Scale::linear(0.0, 100.0).with_range(0.0, 1.0);
        let labels: Vec<String> = s.ticks(5).into_iter().map(|t| t.label).collect();
        assert_eq!(labels, vec!["0", "20", "40", "60", "80", "100"]);
    }

    #[test]
    fn test_log_ticks() {
        let t = log_ticks(0.001, 1.0, 5);
        assert_eq!(t.len(), 4);
        assert_relative_eq!(t[1], 0.01, epsilon = 1e-15);
    }

    #[test]
    fn test_percentile_ticks_roundest() {
        let values = [1.0, 1.234, 1.9, 2.5, 10.0];
        let t = percentile_ticks(&values, 0, 4, 2);
        assert_eq!(t, vec![1.4, 6.0]);
    }

    #[test]
    fn test_timestamp_ticks_use_milliseconds() {
        assert!(format_timestamp(1_600_000_000_000.0).starts_with("2020-09-13"));
        let day = 86_400_000.0;
        let s = Scale::new(&pd(
            "t",
            ParamType::Timestamp,
            &[1_600_000_000_000.0, 1_600_000_000_000.0 + 10.0 * day],
            false,
        ))
        .with_range(0.0, 500.0);
        let ticks = s.ticks(5);
        assert!(!ticks.is_empty());
        assert!(ticks.iter().all(|t| t.label.starts_with("2020-09")));
    }

    #[test]
    fn test_cache_rebuilds_only_on_change() {
        let mut cache = ScaleCache::default();
        let def = pd("x", ParamType::Numeric, &[0.0, 1.0], false);
        cache.get_or_build(&def, (0.0, 100.0));
        cache.get_or_build(&def, (0.0, 100.0));
        assert_eq!(cache.rebuilds(), 1);
        cache.get_or_build(&def, (0.0, 120.0));
        assert_eq!(cache.rebuilds(), 2);
        let mut other = def.clone();
        other.param_type = ParamType::NumericPercentile;
        cache.get_or_build(&other, (0.0, 120.0));
        assert_eq!(cache.rebuilds(), 3);
    }
}
