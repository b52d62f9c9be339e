//! Distribution (histogram) of one column
//!
//! Two series share the density axis: the working set ("all", drawn as
//! outlines) and the selection (filled bars). Numeric columns are binned on
//! their normalized axis position; categorical columns get one bin per
//! value and are drawn horizontally, most selected value on top, once they
//! have three values or more.

use super::{horizontal_axis, vertical_axis, PropsDiff, View, ViewProps, ViewRequest};
use crate::color::Rgba;
use crate::config::{DistributionConfig, Timings};
use crate::infer::ParamDef;
use crate::model::{Row, Value};
use crate::persist::StateScope;
use crate::render::{halo_text, Anchor, DrawCommand, LayerId, Point, Surface};
use crate::scale::Scale;
use crate::schedule::Debouncer;
use std::time::{Duration, Instant};

/// Top, right, bottom, left.
pub const MARGINS: [f64; 4] = [20.0, 20.0, 50.0, 60.0];

const SELECTED_FILL: Rgba = Rgba::rgb(70, 130, 180);
const ALL_STROKE: Rgba = Rgba::rgb(0, 0, 0);

/// One histogram bin over the normalized axis `[x0, x1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    pub x0: f64,
    pub x1: f64,
    pub count: usize,
    /// Category of a categorical bin.
    pub label: Option<Value>,
}

pub fn is_vertical(pd: &ParamDef) -> bool {
    !pd.is_categorical() || pd.distinct_values.len() < 3
}

/// Bin `rows` on column `pd`. Numeric bins split `[0, 1]` evenly; a value
/// equal to a threshold goes to the upper bin and values outside the axis
/// are dropped.
pub fn histogram(pd: &ParamDef, rows: &[Row], nbins: usize) -> Vec<Bin> {
    if pd.is_categorical() {
        let n = pd.distinct_values.len().max(1) as f64;
        let mut bins: Vec<Bin> = pd
            .distinct_values
            .iter()
            .enumerate()
            .map(|(i, v)| Bin {
                x0: i as f64 / n,
                x1: (i + 1) as f64 / n,
                count: 0,
                label: Some(v.clone()),
            })
            .collect();
        for row in rows {
            let Some(v) = row.get(&pd.name) else {
                continue;
            };
            let text = v.to_string();
            if let Some(bin) = bins
                .iter_mut()
                .find(|b| b.label.as_ref().map(|l| l == v || l.to_string() == text).unwrap_or(false))
            {
                bin.count += 1;
            }
        }
        return bins;
    }

    let nbins = nbins.max(1);
    let scale = Scale::without_outliers(pd).with_range(0.0, 1.0);
    let mut bins: Vec<Bin> = (0..nbins)
        .map(|i| Bin {
            x0: i as f64 / nbins as f64,
            x1: (i + 1) as f64 / nbins as f64,
            count: 0,
            label: None,
        })
        .collect();
    for row in rows {
        let Some(t) = row.get(&pd.name).and_then(|v| scale.apply(v)) else {
            continue;
        };
        if !(0.0..=1.0).contains(&t) {
            continue;
        }
        // Number of thresholds i/nbins (0 < i < nbins) that are <= t.
        let idx = ((1..nbins).take_while(|i| *i as f64 / nbins as f64 <= t).count()).min(nbins - 1);
        bins[idx].count += 1;
    }
    bins
}

/// Share of the series in each bin; all zeros for an empty series.
pub fn densities(bins: &[Bin]) -> Vec<f64> {
    let total: usize = bins.iter().map(|b| b.count).sum();
    bins.iter()
        .map(|b| if total == 0 { 0.0 } else { b.count as f64 / total as f64 })
        .collect()
}

/// Display slot of each bin for horizontal plots: ascending by selected
/// count, so the largest bar ends up on top.
pub fn bins_ordering(selected: &[Bin]) -> Vec<usize> {
    let mut ordered: Vec<usize> = (0..selected.len()).collect();
    ordered.sort_by_key(|i| selected[*i].count);
    let mut slots = vec![0; selected.len()];
    for (slot, bin) in ordered.into_iter().enumerate() {
        slots[bin] = slot;
    }
    slots
}

/// Rectangle of a bar, or the two ends of an outline segment.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BarGeom {
    pub min: Point,
    pub max: Point,
}

impl BarGeom {
    fn lerp(&self, to: &BarGeom, t: f64) -> BarGeom {
        let mix = |a: f64, b: f64| a + (b - a) * t;
        BarGeom {
            min: (mix(self.min.0, to.min.0), mix(self.min.1, to.min.1)),
            max: (mix(self.max.0, to.max.0), mix(self.max.1, to.max.1)),
        }
    }

    /// Same bar with zero density, the starting point of new bars.
    fn collapsed(&self, vertical: bool, fh: f64) -> BarGeom {
        let mut g = *self;
        if vertical {
            g.min.1 = fh;
            g.max.1 = fh;
        } else {
            g.min.0 = 0.0;
            g.max.0 = 0.0;
        }
        g
    }
}

/// Geometry of both series in figure coordinates (`fw` x `fh`, origin at
/// the top-left of the plotting area).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistLayout {
    pub outlines: Vec<BarGeom>,
    pub bars: Vec<BarGeom>,
    pub max_density: f64,
    /// Display slot of each bin (identity when vertical).
    pub ordering: Vec<usize>,
}

pub fn layout(all: &[Bin], selected: &[Bin], vertical: bool, fw: f64, fh: f64) -> HistLayout {
    let d_all = densities(all);
    let d_sel = densities(selected);
    let max_density = d_all.iter().chain(d_sel.iter()).copied().fold(0.0, f64::max);
    let dmax = if max_density > 0.0 { max_density } else { 1.0 };
    let ordering = if vertical {
        (0..selected.len()).collect()
    } else {
        bins_ordering(selected)
    };
    let slot = |i: usize| &all[ordering.get(i).copied().unwrap_or(i).min(all.len().saturating_sub(1))];

    let mut outlines = Vec::with_capacity(all.len());
    let mut bars = Vec::with_capacity(selected.len());
    if vertical {
        let x = |t: f64| t * fw;
        let y = |d: f64| fh - fh * d / dmax;
        for (b, d) in all.iter().zip(&d_all) {
            outlines.push(BarGeom {
                min: (x(b.x0) + 1.0, y(*d)),
                max: (x(b.x1), y(*d)),
            });
        }
        for (b, d) in selected.iter().zip(&d_sel) {
            bars.push(BarGeom {
                min: (x(b.x0) + 1.0, y(*d)),
                max: (x(b.x1), fh),
            });
        }
    } else {
        let pos = |t: f64| fh - fh * t;
        let dx = |d: f64| fw * d / dmax;
        for (i, d) in d_all.iter().enumerate() {
            let b = slot(i);
            outlines.push(BarGeom {
                min: (dx(*d), pos(b.x0) + 1.0),
                max: (dx(*d), pos(b.x1)),
            });
        }
        for (i, d) in d_sel.iter().enumerate() {
            let b = slot(i);
            let top = pos(b.x1);
            let delta = (pos(b.x1) - pos(b.x0)).abs();
            let h = if delta > 2.0 { delta - 1.0 } else { delta };
            bars.push(BarGeom {
                min: (0.0, top),
                max: (dx(*d), top + h),
            });
        }
    }
    HistLayout {
        outlines,
        bars,
        max_density,
        ordering,
    }
}

/// Cubic ease-in-out on `[0, 1]`.
pub fn ease_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0) * 2.0;
    if t <= 1.0 {
        t * t * t / 2.0
    } else {
        let t = t - 2.0;
        (t * t * t + 2.0) / 2.0
    }
}

/// Animated move between two geometries.
#[derive(Debug, Clone, Default)]
struct Transition {
    from: Vec<BarGeom>,
    to: Vec<BarGeom>,
    start: Option<Instant>,
    duration: Duration,
}

impl Transition {
    fn retarget(&mut self, to: Vec<BarGeom>, now: Instant, duration: Duration, vertical: bool, fh: f64) {
        let current = self.current(now);
        self.from = to
            .iter()
            .enumerate()
            .map(|(i, g)| current.get(i).copied().unwrap_or_else(|| g.collapsed(vertical, fh)))
            .collect();
        self.to = to;
        self.start = if duration.is_zero() { None } else { Some(now) };
        self.duration = duration;
    }

    fn progress(&self, now: Instant) -> f64 {
        match self.start {
            Some(start) if !self.duration.is_zero() => {
                now.duration_since(start).as_secs_f64() / self.duration.as_secs_f64()
            }
            _ => 1.0,
        }
    }

    fn current(&self, now: Instant) -> Vec<BarGeom> {
        let t = self.progress(now);
        if t >= 1.0 {
            return self.to.clone();
        }
        let e = ease_cubic(t);
        self.from.iter().zip(&self.to).map(|(a, b)| a.lerp(b, e)).collect()
    }

    fn is_running(&self, now: Instant) -> bool {
        self.start.is_some() && self.progress(now) < 1.0
    }
}

pub struct DistributionPlot {
    state: StateScope,
    config: DistributionConfig,
    width: f64,
    height: f64,
    axis: Option<String>,
    nbins: usize,
    all: Vec<Bin>,
    selected: Vec<Bin>,
    hist: HistLayout,
    outlines: Transition,
    bars: Transition,
    hovered: Option<usize>,
    resize: Debouncer,
    surface: Surface,
    mounted: bool,
}

impl DistributionPlot {
    pub fn new(state: StateScope, config: DistributionConfig, timings: &Timings) -> Self {
        let height = state.get_or("height", config.height);
        let nbins = config.nbins;
        Self {
            state,
            config,
            width: 0.0,
            height,
            axis: None,
            nbins,
            all: Vec::new(),
            selected: Vec::new(),
            hist: HistLayout::default(),
            outlines: Transition::default(),
            bars: Transition::default(),
            hovered: None,
            resize: Debouncer::from_millis(timings.distribution_resize_ms),
            surface: Surface::new(0.0, height),
            mounted: false,
        }
    }

    pub fn axis(&self) -> Option<&str> {
        self.axis.as_deref()
    }

    pub fn nbins(&self) -> usize {
        self.nbins
    }

    pub fn bins(&self) -> (&[Bin], &[Bin]) {
        (&self.all, &self.selected)
    }

    fn figure(&self) -> (f64, f64) {
        (
            (self.width - MARGINS[1] - MARGINS[3]).max(0.0),
            (self.height - MARGINS[0] - MARGINS[2]).max(0.0),
        )
    }

    /// "View distribution" is offered for every column but the shown one.
    pub fn can_view(&self, col: &str) -> bool {
        self.axis.as_deref() != Some(col)
    }

    pub fn set_axis(&mut self, col: &str, props: &ViewProps, now: Instant) {
        if !self.can_view(col) || !props.params_def.contains(col) {
            return;
        }
        self.axis = Some(col.to_string());
        self.state.set("axis", &self.axis);
        crate::log_view_event!("distribution", "axis", column = %col);
        self.recompute(props, now, false);
    }

    pub fn set_nbins(&mut self, nbins: usize, props: &ViewProps, now: Instant) {
        let nbins = nbins.max(1);
        if nbins != self.nbins {
            self.nbins = nbins;
            self.recompute(props, now, true);
        }
    }

    pub fn set_height(&mut self, height: f64, now: Instant) {
        if height != self.height {
            self.state.set("height", &height);
            self.resize(self.width, height, now);
        }
    }

    fn pd<'a>(&self, props: &'a ViewProps) -> Option<&'a ParamDef> {
        props.params_def.get(self.axis.as_deref()?)
    }

    fn recompute(&mut self, props: &ViewProps, now: Instant, animate: bool) {
        let Some(pd) = self.pd(props) else {
            self.all.clear();
            self.selected.clear();
            self.hist = HistLayout::default();
            self.surface.clear_all();
            return;
        };
        self.all = histogram(pd, &props.rows_filtered, self.nbins);
        self.selected = histogram(pd, &props.rows_selected, self.nbins);
        let vertical = is_vertical(pd);
        let (fw, fh) = self.figure();
        self.hist = layout(&self.all, &self.selected, vertical, fw, fh);
        let duration = if animate {
            Duration::from_millis(self.config.animate_ms)
        } else {
            Duration::ZERO
        };
        self.outlines.retarget(self.hist.outlines.clone(), now, duration, vertical, fh);
        self.bars.retarget(self.hist.bars.clone(), now, duration, vertical, fh);
        self.draw_overlay(pd);
        self.draw_data(now);
    }

    fn draw_data(&mut self, now: Instant) {
        self.surface.clear(LayerId::Data);
        let (left, top) = (MARGINS[3], MARGINS[0]);
        let shift = |p: Point| (p.0 + left, p.1 + top);
        let mut cmds = Vec::new();
        for (i, g) in self.bars.current(now).iter().enumerate() {
            let alpha = if self.hovered == Some(i) { 0.5 } else { 1.0 };
            cmds.push(DrawCommand::Rect {
                min: shift(g.min),
                max: shift(g.max),
                fill: Some(SELECTED_FILL.with_alpha(alpha)),
                stroke: None,
            });
        }
        for g in self.outlines.current(now) {
            cmds.push(DrawCommand::Line {
                from: shift(g.min),
                to: shift(g.max),
                color: ALL_STROKE,
                width: 1.5,
            });
        }
        self.surface.draw_all(LayerId::Data, cmds);
    }

    fn draw_overlay(&mut self, pd: &ParamDef) {
        self.surface.clear(LayerId::Overlay);
        let (fw, fh) = self.figure();
        let (left, top) = (MARGINS[3], MARGINS[0]);
        let vertical = is_vertical(pd);
        let dmax = if self.hist.max_density > 0.0 { self.hist.max_density } else { 1.0 };
        let mut cmds = Vec::new();
        if vertical {
            let density = Scale::linear(0.0, dmax).with_range(top + fh, top);
            cmds.extend(vertical_axis(&density, left, 1 + (self.height / 50.0) as usize, Anchor::End));
            if pd.is_categorical() {
                cmds.extend(self.category_labels(pd, true, fw, fh));
            } else {
                let data = Scale::without_outliers(pd).with_range(left, left + fw);
                cmds.extend(horizontal_axis(&data, top + fh, 1 + (self.width / 50.0) as usize));
            }
            cmds.extend(halo_text((left + fw, self.height - 8.0), pd.name.clone(), Anchor::End, 12.0));
            cmds.extend(halo_text((left, 15.0), "Density", Anchor::Start, 12.0));
        } else {
            let density = Scale::linear(0.0, dmax).with_range(left, left + fw);
            cmds.extend(horizontal_axis(&density, top + fh, 1 + (self.width / 50.0) as usize));
            cmds.extend(self.category_labels(pd, false, fw, fh));
            cmds.extend(halo_text((left, 15.0), pd.name.clone(), Anchor::Start, 12.0));
        }
        self.surface.draw_all(LayerId::Overlay, cmds);
    }

    /// Category names at the middle of their bars.
    fn category_labels(&self, pd: &ParamDef, vertical: bool, fw: f64, fh: f64) -> Vec<DrawCommand> {
        let (left, top) = (MARGINS[3], MARGINS[0]);
        let color = Rgba::rgb(0, 0, 0);
        pd.distinct_values
            .iter()
            .zip(&self.all)
            .enumerate()
            .map(|(i, (v, _))| {
                if vertical {
                    let b = &self.all[i];
                    DrawCommand::Text {
                        pos: (left + fw * (b.x0 + b.x1) / 2.0, top + fh + 16.0),
                        text: v.to_string(),
                        color,
                        anchor: Anchor::Middle,
                        size: 10.0,
                    }
                } else {
                    let slot = self.hist.ordering.get(i).copied().unwrap_or(i);
                    let b = &self.all[slot.min(self.all.len() - 1)];
                    DrawCommand::Text {
                        pos: (left - 6.0, top + fh - fh * (b.x0 + b.x1) / 2.0),
                        text: v.to_string(),
                        color,
                        anchor: Anchor::End,
                        size: 10.0,
                    }
                }
            })
            .collect()
    }

    /// Fade the bar under the pointer.
    pub fn hover(&mut self, pos: Option<Point>, now: Instant) {
        let (left, top) = (MARGINS[3], MARGINS[0]);
        let hit = pos.and_then(|(x, y)| {
            let (x, y) = (x - left, y - top);
            self.hist
                .bars
                .iter()
                .position(|g| g.min.0 <= x && x <= g.max.0 && g.min.1 <= y && y <= g.max.1)
        });
        if hit != self.hovered {
            self.hovered = hit;
            self.draw_data(now);
        }
    }
}

impl View for DistributionPlot {
    fn name(&self) -> &'static str {
        "distribution"
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn on_mount(&mut self, props: &ViewProps, now: Instant) -> Vec<ViewRequest> {
        self.mounted = true;
        let persisted: Option<String> = self.state.get("axis");
        self.axis = persisted
            .or_else(|| self.config.axis.clone())
            .filter(|col| props.params_def.contains(col));
        self.recompute(props, now, false);
        Vec::new()
    }

    fn on_props_changed(&mut self, props: &ViewProps, diff: &PropsDiff, now: Instant) -> Vec<ViewRequest> {
        if !self.mounted {
            return Vec::new();
        }
        if diff.experiment {
            return self.on_mount(props, now);
        }
        if diff.params && self.pd(props).is_none() {
            self.axis = None;
        }
        if diff.params || diff.filtered || diff.selected {
            self.recompute(props, now, diff.filtered || diff.selected);
        }
        Vec::new()
    }

    fn on_unmount(&mut self) {
        self.mounted = false;
        self.resize.cancel();
        self.outlines = Transition::default();
        self.bars = Transition::default();
        self.surface.clear_all();
    }

    fn resize(&mut self, width: f64, height: f64, now: Instant) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.surface.resize(width, height);
        self.resize.trigger(now);
    }

    fn tick(&mut self, props: &ViewProps, now: Instant) -> Vec<ViewRequest> {
        if !self.mounted {
            return Vec::new();
        }
        if self.resize.poll(now) {
            self.recompute(props, now, false);
        } else if self.bars.start.is_some() || self.outlines.start.is_some() {
            let running = self.bars.is_running(now) || self.outlines.is_running(now);
            self.draw_data(now);
            if !running {
                self.bars.start = None;
                self.outlines.start = None;
            }
        }
        Vec::new()
    }

    fn surface(&self) -> Option<&Surface> {
        Some(&self.surface)
    }

    fn is_enabled(&self) -> bool {
        self.axis.is_some()
    }

    fn is_busy(&self) -> bool {
        self.resize.is_pending() || self.bars.start.is_some() || self.outlines.start.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::row;
    use crate::views::tests::props_for;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn rows() -> Vec<Row> {
        (0..100)
            .map(|i| {
                let opt = ["adam", "sgd", "sgd", "rmsprop"][i % 4];
                row(
                    &i.to_string(),
                    None,
                    &[("x", Value::from(i as f64)), ("opt", Value::from(opt))],
                )
            })
            .collect()
    }

    #[test]
    fn test_numeric_bins_cover_every_value() {
        let props = props_for(rows());
        let pd = props.params_def.get("x").unwrap();
        let bins = histogram(pd, &props.rows_filtered, 10);
        assert_eq!(bins.len(), 10);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 100);
        // The maximum lands in the last bin.
        assert_eq!(bins[9].count, 10);
        assert_relative_eq!(densities(&bins).iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_series_has_zero_density() {
        let props = props_for(rows());
        let pd = props.params_def.get("x").unwrap();
        let bins = histogram(pd, &[], 5);
        assert!(densities(&bins).iter().all(|d| *d == 0.0));
        let l = layout(&bins, &bins, true, 100.0, 50.0);
        assert_eq!(l.max_density, 0.0);
        assert!(l.bars.iter().all(|g| g.min.1 == 50.0));
    }

    #[test]
    fn test_categorical_orientation_and_ordering() {
        let props = props_for(rows());
        let pd = props.params_def.get("opt").unwrap();
        assert!(!is_vertical(pd));
        assert!(is_vertical(props.params_def.get("x").unwrap()));

        let bins = histogram(pd, &props.rows_selected, 10);
        // adam, rmsprop, sgd
        assert_eq!(bins.iter().map(|b| b.count).collect::<Vec<_>>(), vec![25, 25, 50]);
        let slots = bins_ordering(&bins);
        assert_eq!(slots[2], 2);

        let l = layout(&bins, &bins, false, 200.0, 90.0);
        // sgd gets the top slot: smallest y.
        let top = l.bars.iter().enumerate().min_by(|a, b| a.1.min.1.total_cmp(&b.1.min.1)).unwrap().0;
        assert_eq!(top, 2);
        assert_relative_eq!(l.bars[2].max.0, 200.0);
    }

    #[test]
    fn test_selection_change_animates() {
        let mut props = props_for(rows());
        let now = Instant::now();
        let config = DistributionConfig {
            axis: Some("x".into()),
            animate_ms: 100,
            ..Default::default()
        };
        let mut plot = DistributionPlot::new(StateScope::in_memory(), config, &Timings::default());
        plot.resize(400.0, 300.0, now);
        plot.on_mount(&props, now);
        plot.tick(&props, now + Duration::from_millis(200));
        assert!(!plot.is_busy());

        props.rows_selected = Arc::new(props.rows_all[..10].to_vec());
        props.generations.selected += 1;
        let t0 = now + Duration::from_millis(300);
        let diff = PropsDiff {
            selected: true,
            ..Default::default()
        };
        plot.on_props_changed(&props, &diff, t0);
        assert!(plot.is_busy());
        let mid = plot.bars.current(t0 + Duration::from_millis(50));
        assert_ne!(mid, plot.hist.bars);
        plot.tick(&props, t0 + Duration::from_millis(150));
        assert!(!plot.is_busy());
        assert_eq!(plot.bars.current(t0 + Duration::from_millis(150)), plot.hist.bars);
        assert_eq!(plot.bins().1[0].count, 10);
    }

    #[test]
    fn test_axis_is_persisted() {
        let props = props_for(rows());
        let state = StateScope::in_memory();
        let mut plot = DistributionPlot::new(state.clone(), DistributionConfig::default(), &Timings::default());
        plot.on_mount(&props, Instant::now());
        assert!(!plot.is_enabled());
        plot.set_axis("opt", &props, Instant::now());
        assert!(!plot.can_view("opt"));
        assert_eq!(state.get::<Option<String>>("axis"), Some(Some("opt".to_string())));

        let mut again = DistributionPlot::new(state, DistributionConfig::default(), &Timings::default());
        again.on_mount(&props, Instant::now());
        assert_eq!(again.axis(), Some("opt"));
    }

    #[test]
    fn test_ease_endpoints() {
        assert_eq!(ease_cubic(0.0), 0.0);
        assert_eq!(ease_cubic(1.0), 1.0);
        assert_relative_eq!(ease_cubic(0.5), 0.5);
    }
}
