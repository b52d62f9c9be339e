//! XY scatter plot with lineage lines and rectangle zoom

use super::{horizontal_axis, squared_distance, vertical_axis, PropsDiff, View, ViewProps, ViewRequest};
use crate::config::{Timings, XyConfig};
use crate::infer::ParamDefMap;
use crate::lineage::{HighlightMode, Lineage};
use crate::model::{Row, Value};
use crate::persist::StateScope;
use crate::render::{halo_text, Anchor, CompositeMode, DrawCommand, LayerId, Point, Surface};
use crate::scale::Scale;
use crate::schedule::{Debouncer, Throttler};
use std::time::{Duration, Instant};

const MARGIN_TOP: f64 = 40.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_BOTTOM: f64 = 70.0;
const MARGIN_LEFT: f64 = 60.0;
/// Plot area (in px²) at which default opacities reach their nominal value.
const REFERENCE_AREA: f64 = 400_000.0;

/// Axis column persisted under `key`, else the configured one, else none.
/// A column missing from the definitions is never used.
fn pick_axis(state: &StateScope, key: &str, configured: Option<&String>, defs: &ParamDefMap) -> Option<String> {
    let persisted: Option<String> = state.get(key);
    persisted
        .or_else(|| configured.cloned())
        .filter(|col| defs.contains(col))
}

fn place(value: Option<&Value>, numeric: bool, scale: &Scale) -> Option<f64> {
    let value = value.filter(|v| !matches!(v, Value::Null))?;
    if numeric && matches!(value, Value::Text(t) if t == "inf" || t == "-inf") {
        return None;
    }
    scale.apply(value).filter(|p| p.is_finite())
}

/// Default line and dot opacities for `n` rows on a `width` x `height` plot.
pub fn default_opacities(n: usize, width: f64, height: f64) -> (f32, f32) {
    if n == 0 {
        return (1.0, 1.0);
    }
    let area = width * height / REFERENCE_AREA;
    let k = (n as f64).powf(0.3);
    ((3.0 * area / k).min(1.0) as f32, (4.0 * area / k).min(1.0) as f32)
}

#[derive(Debug, Clone)]
struct Axes {
    x: Scale,
    y: Scale,
    x_numeric: bool,
    y_numeric: bool,
}

impl Axes {
    fn position(&self, row: &Row, x_col: &str, y_col: &str) -> Option<Point> {
        let x = place(row.get(x_col), self.x_numeric, &self.x)?;
        let y = place(row.get(y_col), self.y_numeric, &self.y)?;
        Some((x, y))
    }
}

pub struct PlotXy {
    state: StateScope,
    config: XyConfig,
    width: f64,
    height: f64,
    axis_x: Option<String>,
    axis_y: Option<String>,
    highlight_mode: HighlightMode,
    lineage: Lineage,
    original: Option<Axes>,
    zoomed: Option<Axes>,
    zoom_brush: Option<(Point, Point)>,
    displayed: Vec<(Row, Point)>,
    hovered: Option<String>,
    resize: Debouncer,
    redraw: Throttler,
    surface: Surface,
    mounted: bool,
}

impl PlotXy {
    pub fn new(state: StateScope, config: XyConfig, timings: &Timings) -> Self {
        let highlight_mode = state.get_or("highlight_type", HighlightMode::default());
        let height = state.get_or("height", config.height);
        let mut surface = Surface::new(0.0, height);
        surface.set_composite(LayerId::Data, CompositeMode::DestinationOver);
        surface.set_visible(LayerId::Highlight, false);
        Self {
            state,
            config,
            width: 0.0,
            height,
            axis_x: None,
            axis_y: None,
            highlight_mode,
            lineage: Lineage::default(),
            original: None,
            zoomed: None,
            zoom_brush: None,
            displayed: Vec::new(),
            hovered: None,
            resize: Debouncer::from_millis(timings.xy_resize_ms),
            redraw: Throttler::new(Duration::from_millis(timings.xy_redraw_throttle_ms)),
            surface,
            mounted: false,
        }
    }

    pub fn axis_x(&self) -> Option<&str> {
        self.axis_x.as_deref()
    }

    pub fn axis_y(&self) -> Option<&str> {
        self.axis_y.as_deref()
    }

    pub fn highlight_mode(&self) -> HighlightMode {
        self.highlight_mode
    }

    pub fn is_zoomed(&self) -> bool {
        self.zoomed.is_some()
    }

    fn inside_margin(&self) -> f64 {
        self.config.dots_thickness.max(self.config.dots_highlighted_thickness).max(0.0)
    }

    fn axes(&self) -> Option<&Axes> {
        self.zoomed.as_ref().or(self.original.as_ref())
    }

    fn build_scales(&mut self, props: &ViewProps) {
        self.zoomed = None;
        self.original = None;
        let (Some(x_col), Some(y_col)) = (&self.axis_x, &self.axis_y) else {
            return;
        };
        let (Some(x_pd), Some(y_pd)) = (props.params_def.get(x_col), props.params_def.get(y_col)) else {
            return;
        };
        let im = self.inside_margin();
        self.original = Some(Axes {
            x: Scale::new(x_pd).with_range(MARGIN_LEFT + im, self.width - MARGIN_RIGHT - im),
            y: Scale::new(y_pd).with_range(self.height - MARGIN_BOTTOM - im, MARGIN_TOP + im),
            x_numeric: x_pd.numeric,
            y_numeric: y_pd.numeric,
        });
    }

    fn line_opacity(&self, n: usize) -> f32 {
        match self.config.lines_opacity {
            Some(o) => o as f32,
            None => default_opacities(n, self.width, self.height).0,
        }
    }

    fn dot_opacity(&self, n: usize) -> f32 {
        match self.config.dots_opacity {
            Some(o) => o as f32,
            None => default_opacities(n, self.width, self.height).1,
        }
    }

    /// Parent-to-child segment, if both ends can be placed.
    fn lineage_segment(&self, row: &Row, props: &ViewProps, axes: &Axes, x: &str, y: &str) -> Option<(Point, Point)> {
        let parent_uid = row.from_uid.as_ref()?;
        let to = axes.position(row, x, y)?;
        let Some(parent) = props.lookup.get(parent_uid) else {
            tracing::debug!("Parent '{}' of '{}' is not loaded", parent_uid, row.uid);
            return None;
        };
        Some((axes.position(parent, x, y)?, to))
    }

    fn draw_selected(&mut self, props: &ViewProps) {
        self.surface.clear(LayerId::Data);
        self.displayed.clear();
        let (Some(x), Some(y)) = (self.axis_x.clone(), self.axis_y.clone()) else {
            return;
        };
        let Some(axes) = self.axes().cloned() else {
            return;
        };
        let n = props.rows_selected.len();
        let (line_alpha, dot_alpha) = (self.line_opacity(n), self.dot_opacity(n));
        let mut lines = Vec::new();
        let mut dots = Vec::new();
        for row in props.rows_selected.iter() {
            let Some(p) = axes.position(row, &x, &y).filter(|p| self.in_plot(*p)) else {
                continue;
            };
            if self.config.lines_thickness > 0.0 {
                if let Some((from, to)) = self.lineage_segment(row, props, &axes, &x, &y) {
                    lines.push(DrawCommand::Line {
                        from,
                        to,
                        color: props.row_color(row, line_alpha),
                        width: self.config.lines_thickness,
                    });
                }
            }
            dots.push(DrawCommand::Circle {
                center: p,
                radius: self.config.dots_thickness,
                fill: props.row_color(row, dot_alpha),
            });
            self.displayed.push((row.clone(), p));
        }
        // Newer commands go underneath: dots first keeps them above the lines.
        self.surface.draw_all(LayerId::Data, dots);
        self.surface.draw_all(LayerId::Data, lines);
        crate::log_view_event!("xy", "draw", rows = self.displayed.len());
    }

    fn draw_highlighted(&mut self, props: &ViewProps) {
        self.surface.clear(LayerId::Highlight);
        let active = !props.rows_highlighted.is_empty();
        self.surface.set_visible(LayerId::Highlight, active);
        self.surface.set_opacity(LayerId::Data, if active { 0.5 } else { 1.0 });
        if !active {
            return;
        }
        let (Some(x), Some(y)) = (self.axis_x.clone(), self.axis_y.clone()) else {
            return;
        };
        let Some(axes) = self.axes().cloned() else {
            return;
        };
        let closure = self.lineage.closure(
            &props.rows_highlighted,
            self.highlight_mode,
            &props.rows_filtered,
            props.generations.filtered,
        );
        let mut lines = Vec::new();
        let mut dots = Vec::new();
        for row in &closure {
            let Some(p) = axes.position(row, &x, &y).filter(|p| self.in_plot(*p)) else {
                continue;
            };
            if let Some((from, to)) = self.lineage_segment(row, props, &axes, &x, &y) {
                lines.push(DrawCommand::Line {
                    from,
                    to,
                    color: props.row_color(row, 1.0),
                    width: 4.0,
                });
            }
            dots.push(DrawCommand::Circle {
                center: p,
                radius: self.config.dots_highlighted_thickness,
                fill: props.row_color(row, 0.8),
            });
        }
        self.surface.draw_all(LayerId::Highlight, lines);
        self.surface.draw_all(LayerId::Highlight, dots);
    }

    fn draw_overlay(&mut self) {
        self.surface.clear(LayerId::Overlay);
        let (Some(x_col), Some(y_col)) = (self.axis_x.clone(), self.axis_y.clone()) else {
            return;
        };
        let Some(axes) = self.axes() else {
            return;
        };
        let mut cmds = horizontal_axis(&axes.x, self.height - MARGIN_BOTTOM, 1 + (self.width / 80.0) as usize);
        cmds.extend(vertical_axis(&axes.y, MARGIN_LEFT, 1 + (self.height / 40.0) as usize, Anchor::End));
        cmds.extend(halo_text(
            (self.width / 2.0, self.height - MARGIN_BOTTOM + 40.0),
            x_col,
            Anchor::Middle,
            12.0,
        ));
        cmds.extend(halo_text((MARGIN_LEFT, MARGIN_TOP - 15.0), y_col, Anchor::Middle, 12.0));
        if let Some((a, b)) = self.zoom_brush {
            cmds.push(DrawCommand::Rect {
                min: (a.0.min(b.0), a.1.min(b.1)),
                max: (a.0.max(b.0), a.1.max(b.1)),
                fill: Some(crate::color::Rgba::rgb(119, 119, 119).with_alpha(0.3)),
                stroke: Some((crate::color::Rgba::rgb(255, 255, 255), 1.0)),
            });
        }
        self.surface.draw_all(LayerId::Overlay, cmds);
    }

    fn redraw_all(&mut self, props: &ViewProps) {
        self.draw_overlay();
        self.draw_selected(props);
        self.draw_highlighted(props);
    }

    fn in_plot(&self, p: Point) -> bool {
        p.0 >= MARGIN_LEFT
            && p.0 <= self.width - MARGIN_RIGHT
            && p.1 >= MARGIN_TOP
            && p.1 <= self.height - MARGIN_BOTTOM
    }

    /// Zoom to a pixel rectangle. An empty rectangle resets the zoom.
    pub fn zoom_to(&mut self, a: Point, b: Point) {
        let Some(current) = self.axes().cloned() else {
            return;
        };
        if a.0 == b.0 || a.1 == b.1 {
            if self.zoomed.take().is_some() {
                crate::log_view_event!("xy", "zoom_reset");
            }
            return;
        }
        let mut next = current;
        if !next.x.zoom(a.0.min(b.0), a.0.max(b.0)) || !next.y.zoom(a.1.max(b.1), a.1.min(b.1)) {
            return;
        }
        next.x.set_range(MARGIN_LEFT, self.width - MARGIN_RIGHT);
        next.y.set_range(self.height - MARGIN_BOTTOM, MARGIN_TOP);
        crate::log_view_event!("xy", "zoom");
        self.zoomed = Some(next);
    }

    pub fn pointer_down(&mut self, pos: Point) {
        if self.in_plot(pos) {
            self.zoom_brush = Some((pos, pos));
        }
    }

    pub fn pointer_drag(&mut self, pos: Point) {
        if let Some((start, _)) = self.zoom_brush {
            let clamped = (
                pos.0.clamp(MARGIN_LEFT, self.width - MARGIN_RIGHT),
                pos.1.clamp(MARGIN_TOP, self.height - MARGIN_BOTTOM),
            );
            self.zoom_brush = Some((start, clamped));
            self.draw_overlay();
        }
    }

    pub fn pointer_up(&mut self, props: &ViewProps) {
        if let Some((a, b)) = self.zoom_brush.take() {
            self.zoom_to(a, b);
            self.redraw_all(props);
        }
    }

    /// Highlight the displayed row closest to the pointer.
    pub fn hover(&mut self, pos: Option<Point>) -> Vec<ViewRequest> {
        let picked = pos
            .filter(|p| self.in_plot(*p))
            .and_then(|p| {
                self.displayed
                    .iter()
                    .min_by(|a, b| squared_distance(a.1, p).total_cmp(&squared_distance(b.1, p)))
            })
            .map(|(row, _)| row.clone());
        let uid = picked.as_ref().map(|r| r.uid.clone());
        if uid == self.hovered {
            return Vec::new();
        }
        self.hovered = uid;
        vec![ViewRequest::SetHighlighted(picked.into_iter().collect())]
    }

    pub fn set_axis_x(&mut self, col: Option<String>, props: &ViewProps) {
        self.state.set("axis_x", &col);
        self.axis_x = col.filter(|c| props.params_def.contains(c));
        self.build_scales(props);
        self.redraw_all(props);
    }

    pub fn set_axis_y(&mut self, col: Option<String>, props: &ViewProps) {
        self.state.set("axis_y", &col);
        self.axis_y = col.filter(|c| props.params_def.contains(c));
        self.build_scales(props);
        self.redraw_all(props);
    }

    pub fn set_highlight_mode(&mut self, mode: HighlightMode, props: &ViewProps) {
        self.highlight_mode = mode;
        self.state.set("highlight_type", &mode);
        self.draw_highlighted(props);
    }

    pub fn set_height(&mut self, height: f64, now: Instant) {
        if height != self.height {
            self.state.set("height", &height);
            self.resize(self.width, height, now);
        }
    }
}

impl View for PlotXy {
    fn name(&self) -> &'static str {
        "xy"
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn on_mount(&mut self, props: &ViewProps, _now: Instant) -> Vec<ViewRequest> {
        self.mounted = true;
        self.lineage = Lineage::new(props.lookup.clone());
        self.axis_x = pick_axis(&self.state, "axis_x", self.config.axis_x.as_ref(), &props.params_def);
        self.axis_y = pick_axis(&self.state, "axis_y", self.config.axis_y.as_ref(), &props.params_def);
        self.build_scales(props);
        self.redraw_all(props);
        Vec::new()
    }

    fn on_props_changed(&mut self, props: &ViewProps, diff: &PropsDiff, now: Instant) -> Vec<ViewRequest> {
        if !self.mounted {
            return Vec::new();
        }
        if diff.experiment {
            return self.on_mount(props, now);
        }
        if diff.params {
            self.axis_x = self.axis_x.take().filter(|c| props.params_def.contains(c));
            self.axis_y = self.axis_y.take().filter(|c| props.params_def.contains(c));
            self.build_scales(props);
            self.redraw_all(props);
            return Vec::new();
        }
        if diff.selected || diff.color {
            self.redraw.cancel();
            if self.redraw.call(now) {
                self.draw_selected(props);
            }
        }
        if diff.highlighted || diff.color || diff.filtered {
            self.draw_highlighted(props);
        }
        Vec::new()
    }

    fn on_unmount(&mut self) {
        self.mounted = false;
        self.resize.cancel();
        self.redraw.cancel();
        self.displayed.clear();
        self.surface.clear_all();
    }

    fn resize(&mut self, width: f64, height: f64, now: Instant) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.surface.resize(width, height);
        // Old positions are stale until the scales are rebuilt.
        self.displayed.clear();
        self.redraw.cancel();
        self.resize.trigger(now);
    }

    fn tick(&mut self, props: &ViewProps, now: Instant) -> Vec<ViewRequest> {
        if !self.mounted {
            return Vec::new();
        }
        if self.resize.poll(now) {
            self.build_scales(props);
            self.redraw_all(props);
        }
        if self.redraw.poll(now) {
            self.draw_selected(props);
        }
        Vec::new()
    }

    fn surface(&self) -> Option<&Surface> {
        Some(&self.surface)
    }

    fn is_enabled(&self) -> bool {
        self.axis_x.is_some() && self.axis_y.is_some()
    }

    fn is_busy(&self) -> bool {
        self.resize.is_pending() || self.redraw.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::row;
    use crate::views::tests::props_for;
    use std::sync::Arc;

    fn rows() -> Vec<Row> {
        let mut out = vec![row("0", None, &[("x", Value::from(0.0)), ("y", Value::from(0.0))])];
        for i in 1..10 {
            let parent = (i - 1).to_string();
            out.push(row(
                &i.to_string(),
                Some(parent.as_str()),
                &[("x", Value::from(i as f64)), ("y", Value::from((i * i) as f64))],
            ));
        }
        out.push(row("bad", None, &[("x", Value::from("inf")), ("y", Value::from(1.0))]));
        out
    }

    fn plot(props: &ViewProps) -> (PlotXy, Instant) {
        let now = Instant::now();
        let config = XyConfig {
            axis_x: Some("x".into()),
            axis_y: Some("y".into()),
            ..Default::default()
        };
        let mut plot = PlotXy::new(StateScope::in_memory(), config, &Timings::default());
        plot.resize(600.0, 400.0, now);
        plot.on_mount(props, now);
        plot.tick(props, now + Duration::from_millis(200));
        (plot, now)
    }

    #[test]
    fn test_axes_fall_back_and_disable() {
        let props = props_for(rows());
        let state = StateScope::in_memory();
        state.set("axis_x", &"y");
        let config = XyConfig {
            axis_x: Some("x".into()),
            axis_y: Some("missing".into()),
            ..Default::default()
        };
        let mut plot = PlotXy::new(state, config, &Timings::default());
        plot.on_mount(&props, Instant::now());
        assert_eq!(plot.axis_x(), Some("y"));
        assert_eq!(plot.axis_y(), None);
        assert!(!plot.is_enabled());
    }

    #[test]
    fn test_invalid_points_are_skipped() {
        let props = props_for(rows());
        let (plot, _) = plot(&props);
        // "bad" has a text infinity on a numeric axis.
        assert_eq!(plot.displayed.len(), 10);
        let layer = plot.surface().unwrap().layer(LayerId::Data).unwrap();
        let lines = layer.commands().iter().filter(|c| matches!(c, DrawCommand::Line { .. })).count();
        assert_eq!(lines, 9);
    }

    #[test]
    fn test_hover_highlights_nearest_point() {
        let props = props_for(rows());
        let (mut plot, _) = plot(&props);
        let target = plot.displayed.iter().find(|(r, _)| r.uid == "5").unwrap().1;
        let reqs = plot.hover(Some((target.0 + 1.0, target.1)));
        match reqs.as_slice() {
            [ViewRequest::SetHighlighted(rows)] => assert_eq!(rows[0].uid, "5"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(plot.hover(Some((target.0 + 1.0, target.1))).is_empty());
        match plot.hover(None).as_slice() {
            [ViewRequest::SetHighlighted(rows)] => assert!(rows.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_highlight_follows_lineage_mode() {
        let mut props = props_for(rows());
        let (mut plot, _) = plot(&props);
        let seed = props.lookup.get("5").unwrap().clone();
        props.rows_highlighted = Arc::new(vec![seed]);
        plot.draw_highlighted(&props);
        let dots = |plot: &PlotXy| {
            plot.surface()
                .unwrap()
                .layer(LayerId::Highlight)
                .unwrap()
                .commands()
                .iter()
                .filter(|c| matches!(c, DrawCommand::Circle { .. }))
                .count()
        };
        // 5, 4, 3, 2, 1, 0
        assert_eq!(dots(&plot), 6);
        assert_eq!(plot.surface().unwrap().layer(LayerId::Data).unwrap().opacity(), 0.5);

        plot.set_highlight_mode(HighlightMode::Children, &props);
        // 5, 6, 7, 8, 9
        assert_eq!(dots(&plot), 5);
        assert_eq!(plot.state.get::<HighlightMode>("highlight_type"), Some(HighlightMode::Children));
    }

    #[test]
    fn test_zoom_and_reset() {
        let props = props_for(rows());
        let (mut plot, _) = plot(&props);
        let before = plot.displayed.len();
        plot.pointer_down((MARGIN_LEFT + 1.0, MARGIN_TOP + 1.0));
        plot.pointer_drag((300.0, 200.0));
        plot.pointer_up(&props);
        assert!(plot.is_zoomed());
        let (x0, x1) = plot.axes().unwrap().x.range();
        assert_eq!((x0, x1), (MARGIN_LEFT, 600.0 - MARGIN_RIGHT));

        // A click without a rectangle resets.
        plot.pointer_down((100.0, 100.0));
        plot.pointer_up(&props);
        assert!(!plot.is_zoomed());
        assert_eq!(plot.displayed.len(), before);

        // Resetting when not zoomed is a no-op.
        plot.zoom_to((100.0, 100.0), (100.0, 100.0));
        assert!(!plot.is_zoomed());
    }

    #[test]
    fn test_highlight_layer_shown_only_while_highlighting() {
        let mut props = props_for(rows());
        let (mut plot, now) = plot(&props);
        let layer = |plot: &PlotXy, id| plot.surface().unwrap().layer(id).unwrap().clone();
        assert_eq!(layer(&plot, LayerId::Data).composite(), CompositeMode::DestinationOver);
        assert!(!layer(&plot, LayerId::Highlight).is_visible());

        let diff = PropsDiff {
            highlighted: true,
            ..Default::default()
        };
        props.rows_highlighted = Arc::new(vec![props.lookup.get("5").unwrap().clone()]);
        plot.on_props_changed(&props, &diff, now);
        assert!(layer(&plot, LayerId::Highlight).is_visible());

        props.rows_highlighted = Arc::new(Vec::new());
        plot.on_props_changed(&props, &diff, now);
        assert!(!layer(&plot, LayerId::Highlight).is_visible());
        assert_eq!(layer(&plot, LayerId::Data).opacity(), 1.0);
    }

    #[test]
    fn test_zoom_drops_points_outside_plot() {
        let props = props_for(rows());
        let (mut plot, _) = plot(&props);
        let target = plot.displayed.iter().find(|(r, _)| r.uid == "5").unwrap().1;
        plot.pointer_down((target.0 - 20.0, target.1 - 20.0));
        plot.pointer_drag((target.0 + 20.0, target.1 + 20.0));
        plot.pointer_up(&props);
        assert!(plot.is_zoomed());
        let shown: Vec<&str> = plot.displayed.iter().map(|(r, _)| r.uid.as_str()).collect();
        assert_eq!(shown, vec!["5"]);
        assert!(plot.displayed.iter().all(|(_, p)| plot.in_plot(*p)));

        // Any pointer position resolves to a visible row.
        match plot.hover(Some((MARGIN_LEFT + 1.0, MARGIN_TOP + 1.0))).as_slice() {
            [ViewRequest::SetHighlighted(rows)] => assert_eq!(rows[0].uid, "5"),
            other => panic!("unexpected {:?}", other),
        }

        // Zoomed into an empty corner, nothing can be hovered.
        plot.zoom_to((MARGIN_LEFT, MARGIN_TOP), (MARGIN_LEFT + 10.0, MARGIN_TOP + 10.0));
        plot.redraw_all(&props);
        assert!(plot.displayed.is_empty());
        match plot.hover(Some((MARGIN_LEFT + 5.0, MARGIN_TOP + 5.0))).as_slice() {
            [ViewRequest::SetHighlighted(rows)] => assert!(rows.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_zero_size_draws_nothing_until_resized() {
        let props = props_for(rows());
        let now = Instant::now();
        let config = XyConfig {
            axis_x: Some("x".into()),
            axis_y: Some("y".into()),
            ..Default::default()
        };
        let mut plot = PlotXy::new(StateScope::in_memory(), config, &Timings::default());
        plot.resize(0.0, 400.0, now);
        plot.on_mount(&props, now);
        plot.tick(&props, now + Duration::from_millis(200));
        assert_eq!(plot.surface().unwrap().draw_calls(), 0);
        assert!(plot.surface().unwrap().suppressed_calls() > 0);

        plot.resize(600.0, 400.0, now + Duration::from_millis(300));
        plot.tick(&props, now + Duration::from_millis(500));
        assert!(plot.surface().unwrap().draw_calls() > 0);
        assert_eq!(plot.displayed.len(), 10);
    }

    #[test]
    fn test_resize_rebuilds_scales_before_redraw() {
        let mut props = props_for(rows());
        let (mut plot, now) = plot(&props);

        // A throttled redraw is left pending.
        let diff = PropsDiff {
            selected: true,
            ..Default::default()
        };
        props.rows_selected = Arc::new(props.rows_all[..6].to_vec());
        plot.on_props_changed(&props, &diff, now + Duration::from_millis(210));
        assert_eq!(plot.displayed.len(), 6);
        props.rows_selected = Arc::new(props.rows_all[..5].to_vec());
        plot.on_props_changed(&props, &diff, now + Duration::from_millis(220));
        assert!(plot.is_busy());

        let t = now + Duration::from_millis(230);
        plot.resize(300.0, 400.0, t);
        assert!(plot.displayed.is_empty());
        assert!(plot.surface().unwrap().layer(LayerId::Data).unwrap().is_empty());
        // Only the debounced resize remains, so nothing draws with the old scales.
        plot.tick(&props, t + Duration::from_millis(100));
        assert!(plot.displayed.is_empty());

        plot.tick(&props, t + Duration::from_millis(200));
        assert_eq!(plot.displayed.len(), 5);
        assert!(plot.displayed.iter().all(|(_, p)| p.0 <= 300.0 - MARGIN_RIGHT));
    }

    #[test]
    fn test_default_opacities() {
        let (lines, dots) = default_opacities(1, 1000.0, 400.0);
        assert_eq!((lines, dots), (1.0, 1.0));
        let (lines, dots) = default_opacities(100_000, 500.0, 400.0);
        assert!(lines < dots && dots < 1.0);
    }
}
