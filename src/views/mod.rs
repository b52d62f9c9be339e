//! Linked views
//!
//! Each view receives an immutable [`ViewProps`] snapshot per update pass and
//! answers with [`ViewRequest`]s; only the orchestrator mutates the shared
//! row sets.

pub mod distribution;
pub mod parallel;
pub mod table;
pub mod xy;

use crate::color::{ColorBy, ColorFn, Rgba};
use crate::filter::Filter;
use crate::infer::ParamDefMap;
use crate::model::{DatapointLookup, Row, FROM_UID, UID};
use crate::render::{Anchor, DrawCommand, Point, Surface};
use crate::scale::{Scale, ScaleDomainRange, Tick};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Change counters, bumped by the orchestrator whenever the matching piece
/// of shared state is replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Generations {
    pub experiment: u64,
    pub filtered: u64,
    pub selected: u64,
    pub highlighted: u64,
    pub params: u64,
    pub color: u64,
}

/// Read-only snapshot handed to views.
#[derive(Clone)]
pub struct ViewProps {
    pub rows_all: Arc<Vec<Row>>,
    pub rows_filtered: Arc<Vec<Row>>,
    pub rows_selected: Arc<Vec<Row>>,
    pub rows_highlighted: Arc<Vec<Row>>,
    pub selected_filter: Option<Filter>,
    pub params_def: Arc<ParamDefMap>,
    pub params_def_unfiltered: Arc<ParamDefMap>,
    pub lookup: Arc<DatapointLookup>,
    pub color: Arc<ColorBy>,
    pub generations: Generations,
    /// Cross-check view-side computations and log mismatches.
    pub asserts: bool,
}

impl Default for ViewProps {
    fn default() -> Self {
        Self {
            rows_all: Arc::default(),
            rows_filtered: Arc::default(),
            rows_selected: Arc::default(),
            rows_highlighted: Arc::default(),
            selected_filter: None,
            params_def: Arc::default(),
            params_def_unfiltered: Arc::default(),
            lookup: Arc::default(),
            color: Arc::new(ColorBy::none()),
            generations: Generations::default(),
            asserts: false,
        }
    }
}

impl ViewProps {
    pub fn row_color(&self, row: &Row, opacity: f32) -> Rgba {
        self.color.color(row, opacity)
    }

    pub fn colorby(&self) -> Option<&str> {
        self.color.column()
    }

    /// Hover text: the row identity, then `column: value` per defined column.
    pub fn row_text(&self, row: &Row) -> String {
        let mut text = match &row.from_uid {
            Some(parent) => format!("{} (from {})", row.uid, parent),
            None => row.uid.clone(),
        };
        for name in self.params_def.names() {
            if name == UID || name == FROM_UID {
                continue;
            }
            if let Some(v) = row.get(name) {
                text.push_str(&format!("\n{}: {}", name, v));
            }
        }
        text
    }
}

impl std::fmt::Debug for ViewProps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewProps")
            .field("rows_all", &self.rows_all.len())
            .field("rows_filtered", &self.rows_filtered.len())
            .field("rows_selected", &self.rows_selected.len())
            .field("rows_highlighted", &self.rows_highlighted.len())
            .field("generations", &self.generations)
            .finish()
    }
}

/// What changed between two snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropsDiff {
    pub experiment: bool,
    pub filtered: bool,
    pub selected: bool,
    pub highlighted: bool,
    pub params: bool,
    pub color: bool,
}

impl PropsDiff {
    pub fn between(prev: &Generations, next: &Generations) -> Self {
        Self {
            experiment: prev.experiment != next.experiment,
            filtered: prev.filtered != next.filtered,
            selected: prev.selected != next.selected,
            highlighted: prev.highlighted != next.highlighted,
            params: prev.params != next.params,
            color: prev.color != next.color,
        }
    }

    pub fn all() -> Self {
        Self {
            experiment: true,
            filtered: true,
            selected: true,
            highlighted: true,
            params: true,
            color: true,
        }
    }

    pub fn any(&self) -> bool {
        self.experiment || self.filtered || self.selected || self.highlighted || self.params || self.color
    }
}

/// Changes a view asks the orchestrator to make.
#[derive(Debug, Clone)]
pub enum ViewRequest {
    SetSelected {
        rows: Vec<Row>,
        filter: Option<Filter>,
    },
    SetHighlighted(Vec<Row>),
    BrushExtents(BTreeMap<String, ScaleDomainRange>),
}

/// Lifecycle every view implements. Hooks are driven by the orchestrator's
/// update loop.
pub trait View {
    fn name(&self) -> &'static str;

    fn on_mount(&mut self, props: &ViewProps, now: Instant) -> Vec<ViewRequest>;

    fn on_props_changed(&mut self, props: &ViewProps, diff: &PropsDiff, now: Instant) -> Vec<ViewRequest>;

    /// Cancel every timer and loop and drop retained drawings.
    fn on_unmount(&mut self);

    fn resize(&mut self, width: f64, height: f64, now: Instant);

    /// Preferred height; the width follows the window.
    fn height(&self) -> f64 {
        0.0
    }

    /// Advance timers and animation loops.
    fn tick(&mut self, props: &ViewProps, now: Instant) -> Vec<ViewRequest>;

    fn surface(&self) -> Option<&Surface>;

    fn is_enabled(&self) -> bool {
        true
    }

    /// True while the view wants to be ticked again soon.
    fn is_busy(&self) -> bool {
        false
    }
}

/// Tick marks and labels along a vertical axis at `x`.
pub(crate) fn vertical_axis(scale: &Scale, x: f64, ticks: usize, label_side: Anchor) -> Vec<DrawCommand> {
    let (r0, r1) = scale.range();
    let axis_color = Rgba::rgb(0, 0, 0);
    let mut cmds = vec![DrawCommand::Line {
        from: (x, r0),
        to: (x, r1),
        color: axis_color,
        width: 1.0,
    }];
    let dx = if label_side == Anchor::End { -6.0 } else { 6.0 };
    for Tick { position, label } in scale.ticks(ticks) {
        cmds.push(DrawCommand::Line {
            from: (x, position),
            to: (x + dx, position),
            color: axis_color,
            width: 1.0,
        });
        cmds.push(DrawCommand::Text {
            pos: (x + dx * 1.5, position),
            text: label,
            color: axis_color,
            anchor: label_side,
            size: 10.0,
        });
    }
    cmds
}

/// Tick marks and labels along a horizontal axis at `y`.
pub(crate) fn horizontal_axis(scale: &Scale, y: f64, ticks: usize) -> Vec<DrawCommand> {
    let (r0, r1) = scale.range();
    let axis_color = Rgba::rgb(0, 0, 0);
    let mut cmds = vec![DrawCommand::Line {
        from: (r0, y),
        to: (r1, y),
        color: axis_color,
        width: 1.0,
    }];
    for Tick { position, label } in scale.ticks(ticks) {
        cmds.push(DrawCommand::Line {
            from: (position, y),
            to: (position, y + 6.0),
            color: axis_color,
            width: 1.0,
        });
        cmds.push(DrawCommand::Text {
            pos: (position, y + 16.0),
            text: label,
            color: axis_color,
            anchor: Anchor::Middle,
            size: 10.0,
        });
    }
    cmds
}

pub(crate) fn squared_distance(a: Point, b: Point) -> f64 {
    (a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infer::infer_types;
    use crate::persist::StateScope;
    use std::collections::HashMap;

    /// Props where every row is selected, for view tests.
    pub(crate) fn props_for(rows: Vec<Row>) -> ViewProps {
        let state = StateScope::in_memory();
        let defs = Arc::new(infer_types(&state, &rows, &HashMap::new(), &[]));
        let rows = Arc::new(rows);
        ViewProps {
            rows_all: rows.clone(),
            rows_filtered: rows.clone(),
            rows_selected: rows.clone(),
            rows_highlighted: Arc::default(),
            selected_filter: None,
            params_def: defs.clone(),
            params_def_unfiltered: defs,
            lookup: Arc::new(DatapointLookup::build(&rows)),
            color: Arc::new(ColorBy::none()),
            generations: Generations {
                experiment: 1,
                filtered: 1,
                selected: 1,
                params: 1,
                ..Default::default()
            },
            asserts: true,
        }
    }

    #[test]
    fn test_props_diff_flags() {
        let a = Generations::default();
        let b = Generations {
            selected: 1,
            ..a
        };
        let diff = PropsDiff::between(&a, &b);
        assert!(diff.selected);
        assert!(!diff.params);
        assert!(diff.any());
        assert!(!PropsDiff::between(&b, &b).any());
    }

    #[test]
    fn test_row_text_lists_values() {
        use crate::model::tests::row;
        use crate::model::Value;
        let rows = vec![
            row("a", None, &[("lr", Value::from(0.1))]),
            row("b", Some("a"), &[("lr", Value::from(0.2)), ("opt", Value::from("adam"))]),
        ];
        let props = props_for(rows);
        assert_eq!(props.row_text(&props.rows_all[0]), "a\nlr: 0.1");
        assert_eq!(props.row_text(&props.rows_all[1]), "b (from a)\nlr: 0.2\nopt: adam");
    }
}
