//! Parallel-coordinates plot
//!
//! One vertical axis per column. Axes can be dragged to reorder, dropped at
//! the plot edge to hide, clicked to invert, and brushed to filter. Rows
//! are drawn as Bezier polylines by an incremental render loop so large
//! tables never block a frame.

use super::{vertical_axis, PropsDiff, View, ViewProps, ViewRequest};
use crate::color::Rgba;
use crate::config::{ParallelConfig, Timings};
use crate::filter::{apply_filters, Filter};
use crate::infer::ParamDef;
use crate::model::{Row, Value};
use crate::persist::StateScope;
use crate::render::{halo_text, Anchor, CompositeMode, DrawCommand, LayerId, PathSegment, Surface};
use crate::scale::{scale_pixels_range, Scale, ScaleCache, ScaleDomainRange};
use crate::schedule::{Debouncer, LoopGuard, Throttler};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// Top, right, bottom, left.
pub const MARGINS: [f64; 4] = [75.0, 0.0, 10.0, 0.0];
/// Dropping an axis this close to an edge hides it.
pub const EDGE_REMOVE_PX: f64 = 12.0;
const AXIS_PADDING: f64 = 40.0;
const LEAD_PX: f64 = 15.0;
/// Brush hit area around an axis.
const BRUSH_LEFT: f64 = 23.0;
const BRUSH_RIGHT: f64 = 15.0;
const MIN_BATCH: usize = 8;
const MAX_BATCH: usize = 300;
const FRAME_BUDGET_MS: f64 = 30.0;

#[derive(Debug, Clone, PartialEq)]
struct AxisDrag {
    col: String,
    pos: f64,
    origin: f64,
    moved: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum BrushGesture {
    Create { col: String, start: f64, moved: bool },
    Move { col: String, last: f64, moved: bool },
}

/// Incremental polyline rendering state.
#[derive(Debug, Default)]
struct RenderLoop {
    guard: LoopGuard,
    generation: u64,
    queue: Vec<Row>,
    cursor: usize,
    opacity: f32,
    batch: usize,
    last_tick: Option<Instant>,
}

/// Position and scale of one drawn axis.
pub struct AxisLayout<'a> {
    pub x: f64,
    pub scale: &'a Scale,
    pub numeric: bool,
    pub name: &'a str,
}

/// Opacity of polylines so dense plots stay readable.
pub fn line_opacity(n: usize) -> f32 {
    if n == 0 {
        return 1.0;
    }
    (2.0 / (n as f64).powf(0.3)).min(1.0) as f32
}

/// Next batch size given how long the last batch took.
pub fn adapt_batch(current: usize, elapsed_ms: f64) -> usize {
    let elapsed_ms = elapsed_ms.max(1.0);
    let next = (current as f64 * FRAME_BUDGET_MS / elapsed_ms).ceil() as usize;
    next.clamp(MIN_BATCH, MAX_BATCH)
}

/// Polyline of one row across the axes, split wherever a value is missing
/// or cannot be placed. Each part has a short flat lead-in and lead-out.
pub fn polyline(row: &Row, axes: &[AxisLayout<'_>], top: f64) -> Vec<Vec<PathSegment>> {
    let mut parts = Vec::new();
    let mut current: Vec<PathSegment> = Vec::new();
    let mut last: Option<(f64, f64)> = None;
    for axis in axes {
        let y = row.get(axis.name).and_then(|v| {
            let infinite_text = matches!(v, Value::Text(t) if t == "inf" || t == "-inf");
            if infinite_text && axis.numeric {
                None
            } else {
                axis.scale.apply(v)
            }
        });
        let Some(y) = y.filter(|y| y.is_finite()) else {
            if let Some((x0, y0)) = last.take() {
                current.push(PathSegment::LineTo((x0 + LEAD_PX, y0)));
                parts.push(std::mem::take(&mut current));
            }
            continue;
        };
        let (x, y) = (axis.x, y + top);
        let (x0, y0) = match last {
            Some(p) => p,
            None => {
                current.push(PathSegment::MoveTo((x - LEAD_PX, y)));
                (x - LEAD_PX, y)
            }
        };
        current.push(PathSegment::CubicTo(
            (x - 0.88 * (x - x0), y0),
            (x - 0.12 * (x - x0), y),
            (x, y),
        ));
        last = Some((x, y));
    }
    if let Some((x0, y0)) = last {
        current.push(PathSegment::LineTo((x0 + LEAD_PX, y0)));
        parts.push(current);
    }
    parts
}

/// Filter equivalent to a brush on one axis.
pub fn brush_filter(pd: &ParamDef, range: &ScaleDomainRange) -> Filter {
    if let Some(values) = &range.values {
        return categorical_brush_filter(pd, values);
    }
    match range.range {
        Some((min, max)) => Filter::range(&pd.name, pd.param_type, min, max, range.include_infnans),
        None => Filter::None,
    }
}

fn categorical_brush_filter(pd: &ParamDef, values: &[Value]) -> Filter {
    if values.is_empty() {
        return Filter::None;
    }
    let mut sorted: Vec<&Value> = values.iter().collect();
    sorted.sort_by(|a, b| a.cmp_categorical(b));
    let first = sorted[0];
    let last = sorted[sorted.len() - 1];
    let between = pd
        .distinct_values
        .iter()
        .filter(|v| v.cmp_categorical(first).is_ge() && v.cmp_categorical(last).is_le())
        .count();
    if between == values.len() {
        Filter::range(&pd.name, pd.param_type, first.clone(), last.clone(), false)
    } else {
        // Reordered categories: the brushed values are not a contiguous run.
        Filter::any_of(
            values
                .iter()
                .map(|v| Filter::range(&pd.name, pd.param_type, v.clone(), v.clone(), false))
                .collect(),
        )
    }
}

pub struct ParallelPlot {
    state: StateScope,
    config: ParallelConfig,
    width: f64,
    height: f64,
    order: Vec<String>,
    hide: BTreeSet<String>,
    invert: BTreeSet<String>,
    category_order: BTreeMap<String, Vec<Value>>,
    dimensions: Vec<String>,
    scales: ScaleCache,
    brushes: BTreeMap<String, (f64, f64)>,
    drag: Option<AxisDrag>,
    gesture: Option<BrushGesture>,
    brush_throttle: Throttler,
    brush_extents: Debouncer,
    resize: Debouncer,
    render: RenderLoop,
    surface: Surface,
    mounted: bool,
}

impl ParallelPlot {
    pub fn new(state: StateScope, config: ParallelConfig, timings: &Timings) -> Self {
        let order = state.get_or("order", config.order.clone());
        let hide = state.get_or("hide", config.hide.clone()).into_iter().collect();
        let invert = state.get_or("invert", config.invert.clone()).into_iter().collect();
        let category_order = state.get_or("category_order", BTreeMap::new());
        let height = state.get_or("height", config.height);
        let mut surface = Surface::new(0.0, height);
        surface.set_composite(LayerId::Data, CompositeMode::DestinationOver);
        Self {
            state,
            config,
            width: 0.0,
            height,
            order,
            hide,
            invert,
            category_order,
            dimensions: Vec::new(),
            scales: ScaleCache::default(),
            brushes: BTreeMap::new(),
            drag: None,
            gesture: None,
            brush_throttle: Throttler::new(Duration::from_millis(timings.brush_throttle_ms)),
            brush_extents: Debouncer::from_millis(timings.brush_extents_ms),
            resize: Debouncer::from_millis(timings.parallel_resize_ms),
            render: RenderLoop {
                batch: 10,
                ..Default::default()
            },
            surface,
            mounted: false,
        }
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn hidden(&self) -> &BTreeSet<String> {
        &self.hide
    }

    pub fn is_inverted(&self, col: &str) -> bool {
        self.invert.contains(col)
    }

    pub fn brushes(&self) -> &BTreeMap<String, (f64, f64)> {
        &self.brushes
    }

    fn inner_width(&self) -> f64 {
        (self.width - MARGINS[1] - MARGINS[3]).max(0.0)
    }

    fn inner_height(&self) -> f64 {
        (self.height - MARGINS[0] - MARGINS[2]).max(0.0)
    }

    fn force_hidden(&self, pd: Option<&ParamDef>) -> bool {
        match pd {
            None => true,
            Some(pd) => {
                pd.value_count() <= 1
                    || (pd.is_categorical()
                        && pd.distinct_values.len() > self.config.categorical_maximum_values)
            }
        }
    }

    /// Resting x position of an axis.
    fn axis_x(&self, col: &str) -> Option<f64> {
        let i = self.dimensions.iter().position(|d| d == col)?;
        let n = self.dimensions.len();
        let (start, stop) = (MARGINS[3] + AXIS_PADDING, MARGINS[3] + self.inner_width() - AXIS_PADDING);
        Some(if n <= 1 {
            (start + stop) / 2.0
        } else {
            start + i as f64 * (stop - start) / (n - 1) as f64
        })
    }

    /// Drawn x position, following the pointer while dragged.
    fn position(&self, col: &str) -> Option<f64> {
        match &self.drag {
            Some(d) if d.col == col => Some(d.pos),
            _ => self.axis_x(col),
        }
    }

    fn axis_range(&self, col: &str) -> (f64, f64) {
        let h = self.inner_height();
        if self.invert.contains(col) {
            (0.0, h)
        } else {
            (h, 0.0)
        }
    }

    /// Rebuild scales whose column definition or pixel range changed.
    fn refresh_scales(&mut self, props: &ViewProps) {
        let mut dropped = Vec::new();
        for col in self.dimensions.clone() {
            let Some(pd) = props.params_def.get(&col) else {
                dropped.push(col);
                continue;
            };
            let range = self.axis_range(&col);
            self.scales.get_or_build(pd, range);
            if let (Some(order), Some(scale)) = (self.category_order.get(&col), self.scales.get_mut(&col)) {
                if scale.is_categorical() {
                    scale.set_point_domain(ordered_categories(&pd.distinct_values, order));
                }
            }
        }
        for col in dropped {
            tracing::warn!("Column '{}' has no definition anymore, dropping its axis", col);
            self.dimensions.retain(|d| d != &col);
            self.brushes.remove(&col);
            self.scales.remove(&col);
        }
    }

    fn axes<'a>(&'a self, props: &'a ViewProps) -> Vec<AxisLayout<'a>> {
        self.dimensions
            .iter()
            .filter_map(|d| {
                Some(AxisLayout {
                    x: self.position(d)?,
                    scale: self.scales.get(d)?,
                    numeric: props.params_def.get(d).map(|pd| pd.numeric).unwrap_or(false),
                    name: d,
                })
            })
            .collect()
    }

    fn mount_dimensions(&mut self, props: &ViewProps) {
        let order = &self.order;
        let mut dims: Vec<String> = props
            .params_def
            .names()
            .iter()
            .filter(|k| !self.force_hidden(props.params_def_unfiltered.get(k)) && !self.hide.contains(*k))
            .cloned()
            .collect();
        let rank = |k: &String| order.iter().position(|o| o == k).unwrap_or(order.len());
        dims.sort_by_key(rank);
        self.dimensions = dims;
        self.order = self.dimensions.clone();
        self.state.set("order", &self.order);
        tracing::debug!("Parallel plot axes: {:?}", self.dimensions);
    }

    /// Selection implied by the current brushes.
    fn brush(&mut self, props: &ViewProps, now: Instant) -> ViewRequest {
        let mut filters = Vec::new();
        for col in &self.dimensions {
            let (Some(extent), Some(scale), Some(pd)) =
                (self.brushes.get(col), self.scales.get(col), props.params_def.get(col))
            else {
                continue;
            };
            filters.push(brush_filter(pd, &scale_pixels_range(scale, *extent)));
        }
        let selected = apply_filters(&props.rows_filtered, &filters);
        if props.asserts {
            self.check_pixel_selection(props, &selected);
        }
        self.brush_extents.trigger(now);
        crate::log_view_event!("parallel", "brush", filters = filters.len(), selected = selected.len());
        ViewRequest::SetSelected {
            rows: selected,
            filter: Some(Filter::All(filters)),
        }
    }

    /// Compare filter-based selection with a pixel test of the brushes.
    fn check_pixel_selection(&self, props: &ViewProps, selected: &[Row]) {
        let pixel_count = props
            .rows_filtered
            .iter()
            .filter(|row| {
                self.brushes.iter().all(|(col, (a, b))| {
                    let Some(scale) = self.scales.get(col) else {
                        return true;
                    };
                    row.get(col)
                        .and_then(|v| scale.apply(v))
                        .map(|y| a.min(*b) - 1.0 <= y && y <= a.max(*b) + 1.0)
                        .unwrap_or(false)
                })
            })
            .count();
        if pixel_count != selected.len() {
            tracing::warn!(
                "Brush selection mismatch: {} rows by filter, {} by pixel position",
                selected.len(),
                pixel_count
            );
        }
    }

    fn brush_extents_map(&self) -> BTreeMap<String, ScaleDomainRange> {
        self.brushes
            .iter()
            .filter_map(|(col, ext)| Some((col.clone(), scale_pixels_range(self.scales.get(col)?, *ext))))
            .collect()
    }

    /// Clear every brush and select the whole working set.
    fn brush_clear_all(&mut self, props: &ViewProps, now: Instant) -> ViewRequest {
        self.brushes.clear();
        self.gesture = None;
        self.brush(props, now)
    }

    fn start_render(&mut self, props: &ViewProps) {
        self.surface.clear(LayerId::Data);
        self.render.guard.cancel();
        if !self.surface.is_drawable() || props.rows_selected.is_empty() {
            return;
        }
        let mut queue: Vec<Row> = props.rows_selected.iter().cloned().collect();
        fastrand::shuffle(&mut queue);
        self.render.opacity = line_opacity(queue.len());
        self.render.queue = queue;
        self.render.cursor = 0;
        self.render.last_tick = None;
        self.render.generation = self.render.guard.start();
    }

    fn render_batch(&mut self, props: &ViewProps, now: Instant) {
        let generation = self.render.generation;
        if !self.render.guard.is_current(generation) {
            return;
        }
        if let Some(last) = self.render.last_tick {
            let elapsed = now.duration_since(last).as_secs_f64() * 1000.0;
            self.render.batch = adapt_batch(self.render.batch, elapsed);
        }
        self.render.last_tick = Some(now);
        let end = (self.render.cursor + self.render.batch).min(self.render.queue.len());
        let top = MARGINS[0];
        let mut cmds = Vec::new();
        {
            let axes = self.axes(props);
            for row in &self.render.queue[self.render.cursor..end] {
                let color = props.row_color(row, self.render.opacity);
                for segments in polyline(row, &axes, top) {
                    cmds.push(DrawCommand::Path {
                        segments,
                        color,
                        width: 1.0,
                    });
                }
            }
        }
        self.surface.draw_all(LayerId::Data, cmds);
        self.render.cursor = end;
        if self.render.cursor >= self.render.queue.len() {
            self.render.guard.finish(generation);
            self.render.queue.clear();
        }
    }

    fn draw_highlighted(&mut self, props: &ViewProps) {
        self.surface.clear(LayerId::Highlight);
        if props.rows_highlighted.is_empty() {
            let opacity = if self.drag.is_some() { 0.35 } else { 1.0 };
            self.surface.set_opacity(LayerId::Data, opacity);
            return;
        }
        self.surface.set_opacity(LayerId::Data, 0.25);
        let mut cmds = Vec::new();
        {
            let axes = self.axes(props);
            for row in props.rows_highlighted.iter() {
                let color = props.row_color(row, 1.0);
                for segments in polyline(row, &axes, MARGINS[0]) {
                    cmds.push(DrawCommand::Path {
                        segments,
                        color,
                        width: 4.0,
                    });
                }
            }
        }
        self.surface.draw_all(LayerId::Highlight, cmds);
    }

    /// Axes, labels and brushes.
    fn draw_overlay(&mut self, props: &ViewProps) {
        self.surface.clear(LayerId::Overlay);
        if !self.surface.is_drawable() {
            return;
        }
        let ticks = 1 + (self.height / 50.0) as usize;
        let top = MARGINS[0];
        let mut cmds = Vec::new();
        for (i, col) in self.dimensions.iter().enumerate() {
            let (Some(x), Some(scale)) = (self.position(col), self.scales.get(col)) else {
                continue;
            };
            let shifted = scale.clone().with_range(scale.range().0 + top, scale.range().1 + top);
            cmds.extend(vertical_axis(&shifted, x, ticks, Anchor::End));
            let label_y = top - 21.0 - 16.0 * (i % 3) as f64;
            let label = match props.params_def.get(col) {
                Some(pd) if self.invert.contains(col) => format!("{} ({}, inverted)", col, pd.param_type.label()),
                _ => col.clone(),
            };
            cmds.extend(halo_text((x, label_y), label, Anchor::Middle, 12.0));
            if let Some((a, b)) = self.brushes.get(col) {
                let near_edge = self.drag.as_ref().map(|d| &d.col == col && self.near_edge(d.pos)).unwrap_or(false);
                let fill = if near_edge {
                    Rgba::rgb(255, 0, 0).with_alpha(0.3)
                } else {
                    Rgba::rgb(119, 119, 119).with_alpha(0.3)
                };
                cmds.push(DrawCommand::Rect {
                    min: (x - BRUSH_LEFT, a.min(*b) + top),
                    max: (x + BRUSH_RIGHT, a.max(*b) + top),
                    fill: Some(fill),
                    stroke: Some((Rgba::rgb(255, 255, 255), 1.0)),
                });
            }
        }
        self.surface.draw_all(LayerId::Overlay, cmds);
    }

    fn near_edge(&self, pos: f64) -> bool {
        pos < EDGE_REMOVE_PX || pos > self.inner_width() - EDGE_REMOVE_PX
    }

    fn redraw_all(&mut self, props: &ViewProps) {
        self.draw_overlay(props);
        self.draw_highlighted(props);
        self.start_render(props);
    }

    /// Axis under a pointer position, and whether it hit the label area.
    fn hit_axis(&self, pos: (f64, f64)) -> Option<(String, bool)> {
        let (x, y) = pos;
        let top = MARGINS[0];
        self.dimensions
            .iter()
            .filter_map(|d| Some((d, self.axis_x(d)?)))
            .filter(|(_, ax)| x >= ax - BRUSH_LEFT.max(AXIS_PADDING / 2.0) && x <= ax + BRUSH_RIGHT.max(AXIS_PADDING / 2.0))
            .min_by(|a, b| (a.1 - x).abs().total_cmp(&(b.1 - x).abs()))
            .and_then(|(d, ax)| {
                if y < top {
                    Some((d.clone(), true))
                } else if y <= top + self.inner_height() && x >= ax - BRUSH_LEFT && x <= ax + BRUSH_RIGHT {
                    Some((d.clone(), false))
                } else {
                    None
                }
            })
    }

    /// Column whose axis or label is under `pos`.
    pub fn column_at(&self, pos: (f64, f64)) -> Option<String> {
        self.hit_axis(pos).map(|(col, _)| col)
    }

    /// Pointer pressed at `pos` (surface coordinates).
    pub fn pointer_down(&mut self, pos: (f64, f64)) {
        let Some((col, on_label)) = self.hit_axis(pos) else {
            return;
        };
        if on_label {
            let x = self.axis_x(&col).unwrap_or(pos.0);
            self.drag = Some(AxisDrag {
                col,
                pos: x,
                origin: x,
                moved: false,
            });
            self.surface.set_opacity(LayerId::Data, 0.35);
            return;
        }
        let y = (pos.1 - MARGINS[0]).clamp(0.0, self.inner_height());
        let inside = self.brushes.get(&col).map(|(a, b)| a.min(*b) <= y && y <= a.max(*b)).unwrap_or(false);
        self.gesture = Some(if inside {
            BrushGesture::Move { col, last: y, moved: false }
        } else {
            BrushGesture::Create { col, start: y, moved: false }
        });
    }

    /// Pointer moved while pressed.
    pub fn pointer_drag(&mut self, pos: (f64, f64), delta_x: f64, props: &ViewProps, now: Instant) -> Vec<ViewRequest> {
        let mut out = Vec::new();
        if let Some(mut drag) = self.drag.take() {
            drag.pos = (drag.pos + delta_x).clamp(0.0, self.inner_width());
            drag.moved = true;
            self.drag = Some(drag);
            let mut dims = self.dimensions.clone();
            dims.sort_by(|a, b| {
                let pa = self.position(a).unwrap_or(0.0);
                let pb = self.position(b).unwrap_or(0.0);
                pa.total_cmp(&pb)
            });
            self.dimensions = dims;
            self.draw_overlay(props);
            return out;
        }
        let h = self.inner_height();
        let y = (pos.1 - MARGINS[0]).clamp(0.0, h);
        match &mut self.gesture {
            Some(BrushGesture::Create { col, start, moved }) => {
                *moved = true;
                self.brushes.insert(col.clone(), (start.min(y), start.max(y)));
            }
            Some(BrushGesture::Move { col, last, moved }) => {
                *moved = true;
                if let Some((a, b)) = self.brushes.get(col.as_str()).copied() {
                    let dy = (y - *last).clamp(-a.min(b), h - a.max(b));
                    self.brushes.insert(col.clone(), (a + dy, b + dy));
                }
                *last = y;
            }
            None => return out,
        }
        if self.brush_throttle.call(now) {
            out.push(self.brush(props, now));
        }
        self.draw_overlay(props);
        out
    }

    /// Pointer released.
    pub fn pointer_up(&mut self, props: &ViewProps, now: Instant) -> Vec<ViewRequest> {
        if let Some(drag) = self.drag.take() {
            return self.finish_drag(drag, props, now);
        }
        let Some(gesture) = self.gesture.take() else {
            return Vec::new();
        };
        self.brush_throttle.cancel();
        match gesture {
            BrushGesture::Create { col, moved: false, .. } | BrushGesture::Move { col, moved: false, .. } => {
                // A click without movement clears the axis brush.
                if self.brushes.remove(&col).is_none() {
                    return Vec::new();
                }
            }
            _ => {}
        }
        let req = self.brush(props, now);
        self.draw_overlay(props);
        vec![req]
    }

    fn finish_drag(&mut self, drag: AxisDrag, props: &ViewProps, now: Instant) -> Vec<ViewRequest> {
        self.surface.set_opacity(LayerId::Data, 1.0);
        let mut out = Vec::new();
        if !drag.moved {
            self.invert_axis(&drag.col, props);
            crate::log_view_event!("parallel", "invert", column = %drag.col);
        } else if self.near_edge(drag.pos) {
            crate::log_view_event!("parallel", "remove", column = %drag.col);
            if self.remove_axis(&drag.col, props) {
                out.push(self.brush(props, now));
            }
        } else {
            crate::log_view_event!("parallel", "reorder", column = %drag.col, origin = drag.origin, pos = drag.pos);
            self.order = self.dimensions.clone();
            self.state.set("order", &self.order);
        }
        self.refresh_scales(props);
        self.redraw_all(props);
        out
    }

    /// Flip an axis. The brush keeps covering the same values.
    pub fn invert_axis(&mut self, col: &str, props: &ViewProps) {
        let h = self.inner_height();
        if let Some((a, b)) = self.brushes.get(col).copied() {
            self.brushes.insert(col.to_string(), (h - b, h - a));
        }
        if !self.invert.remove(col) {
            self.invert.insert(col.to_string());
        }
        self.state.set("invert", &self.invert);
        self.refresh_scales(props);
        self.redraw_all(props);
    }

    /// Hide an axis. Returns true when it carried a brush, which changes
    /// the selection.
    pub fn remove_axis(&mut self, col: &str, props: &ViewProps) -> bool {
        if props.params_def.contains(col) {
            self.hide.insert(col.to_string());
            self.state.set("hide", &self.hide);
        }
        self.dimensions.retain(|d| d != col);
        self.order = self.dimensions.clone();
        self.state.set("order", &self.order);
        self.scales.remove(col);
        self.brushes.remove(col).is_some()
    }

    /// Hide an axis from a menu action; re-brushes when it carried a brush.
    pub fn hide_axis(&mut self, col: &str, props: &ViewProps, now: Instant) -> Vec<ViewRequest> {
        let mut out = Vec::new();
        if self.remove_axis(col, props) {
            out.push(self.brush(props, now));
        }
        self.refresh_scales(props);
        self.redraw_all(props);
        out
    }

    pub fn can_restore_axis(&self, col: &str, props: &ViewProps) -> bool {
        let pd = props.params_def_unfiltered.get(col);
        pd.is_some() && !self.dimensions.iter().any(|d| d == col) && !self.force_hidden(pd)
    }

    pub fn restore_axis(&mut self, col: &str, props: &ViewProps) -> bool {
        if !self.can_restore_axis(col, props) {
            return false;
        }
        self.hide.remove(col);
        self.state.set("hide", &self.hide);
        self.dimensions.push(col.to_string());
        self.order = self.dimensions.clone();
        self.state.set("order", &self.order);
        self.refresh_scales(props);
        self.redraw_all(props);
        true
    }

    /// Move a category of a categorical axis to a new position.
    pub fn move_category(&mut self, col: &str, value: &Value, to: usize, props: &ViewProps) {
        let Some(pd) = props.params_def.get(col).filter(|pd| pd.is_categorical()) else {
            return;
        };
        let current = self
            .category_order
            .get(col)
            .map(|o| ordered_categories(&pd.distinct_values, o))
            .unwrap_or_else(|| pd.distinct_values.clone());
        let mut order: Vec<Value> = current.into_iter().filter(|v| v != value).collect();
        if order.len() == pd.distinct_values.len() {
            return;
        }
        order.insert(to.min(order.len()), value.clone());
        self.category_order.insert(col.to_string(), order);
        self.state.set("category_order", &self.category_order);
        self.brushes.remove(col);
        self.refresh_scales(props);
        self.redraw_all(props);
    }

    /// Change the plot height (the width follows the window).
    pub fn set_height(&mut self, height: f64, now: Instant) {
        if height != self.height {
            self.state.set("height", &height);
            self.resize(self.width, height, now);
        }
    }
}

/// `distinct` in the user's order; values missing from the order go last.
fn ordered_categories(distinct: &[Value], order: &[Value]) -> Vec<Value> {
    let mut out: Vec<Value> = order.iter().filter(|v| distinct.contains(v)).cloned().collect();
    out.extend(distinct.iter().filter(|v| !order.contains(v)).cloned());
    out
}

impl View for ParallelPlot {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn on_mount(&mut self, props: &ViewProps, now: Instant) -> Vec<ViewRequest> {
        self.mounted = true;
        self.brushes.clear();
        self.scales.clear();
        self.mount_dimensions(props);
        self.refresh_scales(props);
        self.redraw_all(props);
        vec![self.brush(props, now)]
    }

    fn on_props_changed(&mut self, props: &ViewProps, diff: &PropsDiff, now: Instant) -> Vec<ViewRequest> {
        if !self.mounted {
            return Vec::new();
        }
        if diff.experiment {
            return self.on_mount(props, now);
        }
        let mut out = Vec::new();
        if diff.params {
            // New domains make pixel brushes meaningless.
            self.render.guard.cancel();
            self.refresh_scales(props);
            out.push(self.brush_clear_all(props, now));
            self.draw_overlay(props);
        }
        if diff.selected || diff.color || diff.params {
            self.start_render(props);
        }
        if diff.highlighted || diff.params || diff.color {
            self.draw_highlighted(props);
        }
        out
    }

    fn on_unmount(&mut self) {
        self.mounted = false;
        self.render.guard.cancel();
        self.render.queue.clear();
        self.brush_extents.cancel();
        self.brush_throttle.cancel();
        self.resize.cancel();
        self.surface.clear_all();
    }

    fn resize(&mut self, width: f64, height: f64, now: Instant) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        let old_h = self.inner_height();
        self.width = width;
        self.height = height;
        self.render.guard.cancel();
        self.surface.resize(width, height);
        let new_h = self.inner_height();
        if old_h > 0.0 && new_h > 0.0 {
            for ext in self.brushes.values_mut() {
                *ext = (ext.0 * new_h / old_h, ext.1 * new_h / old_h);
            }
        }
        self.resize.trigger(now);
    }

    fn tick(&mut self, props: &ViewProps, now: Instant) -> Vec<ViewRequest> {
        let mut out = Vec::new();
        if !self.mounted {
            return out;
        }
        if self.resize.poll(now) {
            self.refresh_scales(props);
            self.redraw_all(props);
        }
        if self.brush_throttle.poll(now) {
            out.push(self.brush(props, now));
        }
        if self.brush_extents.poll(now) {
            out.push(ViewRequest::BrushExtents(self.brush_extents_map()));
        }
        self.render_batch(props, now);
        out
    }

    fn surface(&self) -> Option<&Surface> {
        Some(&self.surface)
    }

    fn is_busy(&self) -> bool {
        self.render.guard.is_running()
            || self.resize.is_pending()
            || self.brush_extents.is_pending()
            || self.brush_throttle.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::apply_filter;
    use crate::model::tests::row;
    use crate::views::tests::props_for;

    fn rows() -> Vec<Row> {
        (0..20)
            .map(|i| {
                row(
                    &i.to_string(),
                    None,
                    &[
                        ("lr", Value::from(i as f64 / 10.0)),
                        ("loss", Value::from(100.0 - i as f64)),
                        ("opt", Value::from(if i % 2 == 0 { "adam" } else { "sgd" })),
                        ("constant", Value::from(1.0)),
                    ],
                )
            })
            .collect()
    }

    fn mounted(props: &ViewProps) -> (ParallelPlot, Instant) {
        let now = Instant::now();
        let mut plot = ParallelPlot::new(StateScope::in_memory(), ParallelConfig::default(), &Timings::default());
        plot.resize(800.0, 600.0, now);
        plot.on_mount(props, now);
        (plot, now)
    }

    fn selected(reqs: &[ViewRequest]) -> Option<(usize, Filter)> {
        reqs.iter().rev().find_map(|r| match r {
            ViewRequest::SetSelected { rows, filter } => Some((rows.len(), filter.clone()?)),
            _ => None,
        })
    }

    #[test]
    fn test_force_hidden_columns() {
        let props = props_for(rows());
        let (plot, _) = mounted(&props);
        // `constant` has a single value; `uid` has 20 categories (<= 80).
        assert!(!plot.dimensions().iter().any(|d| d == "constant"));
        assert!(plot.dimensions().iter().any(|d| d == "lr"));

        let config = ParallelConfig {
            categorical_maximum_values: 10,
            ..Default::default()
        };
        let mut plot = ParallelPlot::new(StateScope::in_memory(), config, &Timings::default());
        plot.on_mount(&props, Instant::now());
        assert!(!plot.dimensions().iter().any(|d| d == "uid"));
    }

    #[test]
    fn test_persisted_order_is_applied() {
        let props = props_for(rows());
        let state = StateScope::in_memory();
        state.set("order", &vec!["opt", "lr"]);
        let mut plot = ParallelPlot::new(state.clone(), ParallelConfig::default(), &Timings::default());
        plot.on_mount(&props, Instant::now());
        assert_eq!(&plot.dimensions()[..2], &["opt".to_string(), "lr".to_string()]);
        let saved: Vec<String> = state.get("order").unwrap();
        assert_eq!(saved, plot.dimensions());
    }

    #[test]
    fn test_brush_selects_same_rows_as_filter() {
        let props = props_for(rows());
        let (mut plot, now) = mounted(&props);
        let x = plot.axis_x("lr").unwrap();
        let h = plot.inner_height();
        // Brush the lower half of the lr axis (small values, axis not inverted).
        plot.pointer_down((x, MARGINS[0] + h / 2.0));
        plot.pointer_drag((x, MARGINS[0] + h), 0.0, &props, now);
        let reqs = plot.pointer_up(&props, now + Duration::from_millis(500));
        let (count, filter) = selected(&reqs).unwrap();
        assert!(count > 0 && count < 20);
        assert_eq!(apply_filter(&props.rows_filtered, &filter).len(), count);
        assert_eq!(plot.brushes().len(), 1);
    }

    #[test]
    fn test_click_on_label_inverts_and_keeps_brush_values() {
        let props = props_for(rows());
        let (mut plot, now) = mounted(&props);
        let x = plot.axis_x("lr").unwrap();
        let h = plot.inner_height();
        plot.pointer_down((x, MARGINS[0] + 10.0));
        plot.pointer_drag((x, MARGINS[0] + h / 3.0), 0.0, &props, now);
        let (before, _) = selected(&plot.pointer_up(&props, now)).unwrap();

        plot.pointer_down((x, MARGINS[0] - 30.0));
        plot.pointer_up(&props, now);
        assert!(plot.is_inverted("lr"));
        let ViewRequest::SetSelected { rows, .. } = plot.brush(&props, now) else {
            panic!("expected a selection");
        };
        assert_eq!(rows.len(), before);
    }

    #[test]
    fn test_drop_at_edge_hides_axis() {
        let props = props_for(rows());
        let (mut plot, now) = mounted(&props);
        let x = plot.axis_x("lr").unwrap();
        plot.pointer_down((x, 10.0));
        plot.pointer_drag((0.0, 10.0), -x, &props, now);
        plot.pointer_up(&props, now);
        assert!(!plot.dimensions().iter().any(|d| d == "lr"));
        assert!(plot.hidden().contains("lr"));
        assert!(plot.can_restore_axis("lr", &props));
        assert!(plot.restore_axis("lr", &props));
        assert_eq!(plot.dimensions().last().map(String::as_str), Some("lr"));
        assert!(!plot.can_restore_axis("constant", &props));
    }

    #[test]
    fn test_drag_reorders_axes() {
        let props = props_for(rows());
        let (mut plot, now) = mounted(&props);
        let first = plot.dimensions()[0].clone();
        let second_x = plot.axis_x(&plot.dimensions()[1].clone()).unwrap();
        let first_x = plot.axis_x(&first).unwrap();
        plot.pointer_down((first_x, 10.0));
        plot.pointer_drag((second_x + 5.0, 10.0), second_x + 5.0 - first_x, &props, now);
        plot.pointer_up(&props, now);
        assert_eq!(plot.dimensions()[1], first);
    }

    #[test]
    fn test_categorical_brush_filters() {
        let props = props_for(rows());
        let pd = props.params_def.get("opt").unwrap();
        let range = ScaleDomainRange {
            param_type: pd.param_type,
            brush_extents_normalized: (0.0, 0.5),
            values: Some(vec![Value::from("sgd")]),
            range: None,
            include_infnans: false,
        };
        let f = brush_filter(pd, &range);
        assert_eq!(apply_filter(&props.rows_filtered, &f).len(), 10);

        let empty = ScaleDomainRange {
            values: Some(vec![]),
            ..range
        };
        assert_eq!(brush_filter(pd, &empty), Filter::None);
    }

    #[test]
    fn test_reordered_categories_use_disjunction() {
        let rs: Vec<Row> = ["a", "b", "c", "a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, v)| row(&i.to_string(), None, &[("k", Value::from(*v))]))
            .collect();
        let props = props_for(rs);
        let pd = props.params_def.get("k").unwrap();
        let f = categorical_brush_filter(pd, &[Value::from("c"), Value::from("a")]);
        assert!(matches!(f, Filter::Not(_)));
        assert_eq!(apply_filter(&props.rows_filtered, &f).len(), 4);
    }

    #[test]
    fn test_render_loop_draws_everything_in_batches() {
        let props = props_for(rows());
        let (mut plot, now) = mounted(&props);
        let mut t = now;
        for _ in 0..100 {
            t += Duration::from_millis(16);
            plot.tick(&props, t);
            if !plot.render.guard.is_running() {
                break;
            }
        }
        assert!(!plot.render.guard.is_running());
        let drawn = plot.surface().unwrap().layer(LayerId::Data).unwrap().len();
        assert!(drawn >= 20);
    }

    #[test]
    fn test_zero_width_draws_nothing() {
        let props = props_for(rows());
        let now = Instant::now();
        let mut plot = ParallelPlot::new(StateScope::in_memory(), ParallelConfig::default(), &Timings::default());
        plot.resize(0.0, 600.0, now);
        plot.on_mount(&props, now);
        plot.tick(&props, now + Duration::from_millis(200));
        assert_eq!(plot.surface().unwrap().draw_calls(), 0);

        plot.resize(500.0, 600.0, now);
        plot.tick(&props, now + Duration::from_millis(400));
        plot.tick(&props, now + Duration::from_millis(420));
        assert!(plot.surface().unwrap().draw_calls() > 0);
    }

    #[test]
    fn test_polyline_breaks_on_missing_values() {
        let r = row("x", None, &[("a", Value::from(0.0)), ("c", Value::from(1.0))]);
        let scale = Scale::linear(0.0, 1.0).with_range(100.0, 0.0);
        let axes = [
            AxisLayout { x: 0.0, scale: &scale, numeric: true, name: "a" },
            AxisLayout { x: 50.0, scale: &scale, numeric: true, name: "b" },
            AxisLayout { x: 100.0, scale: &scale, numeric: true, name: "c" },
        ];
        let parts = polyline(&r, &axes, 0.0);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0][0], PathSegment::MoveTo((-15.0, 100.0)));
        assert_eq!(parts[0].last(), Some(&PathSegment::LineTo((15.0, 100.0))));
    }

    #[test]
    fn test_opacity_and_batch_bounds() {
        assert_eq!(line_opacity(1), 1.0);
        assert!(line_opacity(10_000) < 0.2);
        assert_eq!(adapt_batch(10, 1000.0), MIN_BATCH);
        assert_eq!(adapt_batch(200, 1.0), MAX_BATCH);
        assert_eq!(adapt_batch(10, 30.0), 10);
    }

    #[test]
    fn test_move_category_is_persisted() {
        let props = props_for(rows());
        let state = StateScope::in_memory();
        let mut plot = ParallelPlot::new(state.clone(), ParallelConfig::default(), &Timings::default());
        plot.resize(800.0, 600.0, Instant::now());
        plot.on_mount(&props, Instant::now());
        plot.move_category("opt", &Value::from("sgd"), 0, &props);
        let saved: BTreeMap<String, Vec<Value>> = state.get("category_order").unwrap();
        assert_eq!(saved["opt"], vec![Value::from("sgd"), Value::from("adam")]);
        assert_eq!(
            plot.scales.get("opt").unwrap().point_domain().unwrap(),
            &[Value::from("sgd"), Value::from("adam")]
        );
    }
}
