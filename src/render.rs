//! Retained draw-command surfaces
//!
//! Views never paint directly. They push [`DrawCommand`]s into named layers
//! of a [`Surface`]; the viewer replays the layers every frame. A layer in
//! [`CompositeMode::DestinationOver`] paints newer commands underneath older
//! ones, which lets animation loops add rows batch by batch without the
//! latest batch covering what is already there.

use crate::color::Rgba;
use std::collections::BTreeMap;

pub type Point = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeMode {
    #[default]
    SourceOver,
    DestinationOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    #[default]
    Start,
    Middle,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    MoveTo(Point),
    LineTo(Point),
    CubicTo(Point, Point, Point),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Line {
        from: Point,
        to: Point,
        color: Rgba,
        width: f64,
    },
    /// Stroked open path.
    Path {
        segments: Vec<PathSegment>,
        color: Rgba,
        width: f64,
    },
    Circle {
        center: Point,
        radius: f64,
        fill: Rgba,
    },
    Rect {
        min: Point,
        max: Point,
        fill: Option<Rgba>,
        stroke: Option<(Rgba, f64)>,
    },
    Text {
        pos: Point,
        text: String,
        color: Rgba,
        anchor: Anchor,
        size: f64,
    },
}

impl DrawCommand {
    pub fn color(&self) -> Option<Rgba> {
        match self {
            DrawCommand::Line { color, .. }
            | DrawCommand::Path { color, .. }
            | DrawCommand::Text { color, .. } => Some(*color),
            DrawCommand::Circle { fill, .. } => Some(*fill),
            DrawCommand::Rect { fill, stroke, .. } => fill.or(stroke.map(|(c, _)| c)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerId {
    /// Main data layer (polylines, dots, bars).
    Data,
    /// Transient highlight overlay.
    Highlight,
    /// Axes, ticks, labels, brushes. Rebuilt every frame.
    Overlay,
}

#[derive(Debug, Clone)]
pub struct Layer {
    commands: Vec<DrawCommand>,
    composite: CompositeMode,
    opacity: f32,
    visible: bool,
}

impl Default for Layer {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            composite: CompositeMode::SourceOver,
            opacity: 1.0,
            visible: true,
        }
    }
}

impl Layer {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn composite(&self) -> CompositeMode {
        self.composite
    }

    /// Commands in the order they must be painted (bottom first).
    pub fn paint_order(&self) -> Box<dyn Iterator<Item = &DrawCommand> + '_> {
        match self.composite {
            CompositeMode::SourceOver => Box::new(self.commands.iter()),
            CompositeMode::DestinationOver => Box::new(self.commands.iter().rev()),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }
}

/// A sized set of layers owned by one view.
#[derive(Debug, Clone, Default)]
pub struct Surface {
    width: f64,
    height: f64,
    layers: BTreeMap<LayerId, Layer>,
    draw_calls: u64,
    suppressed: u64,
}

impl Surface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    /// False for a zero-sized surface, which must never be drawn to.
    pub fn is_drawable(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Resizing drops every retained command.
    pub fn resize(&mut self, width: f64, height: f64) {
        if (width, height) != (self.width, self.height) {
            self.width = width.max(0.0);
            self.height = height.max(0.0);
            self.clear_all();
        }
    }

    pub fn set_composite(&mut self, id: LayerId, mode: CompositeMode) {
        let layer = self.layers.entry(id).or_default();
        if layer.composite != mode {
            layer.commands.clear();
            layer.composite = mode;
        }
    }

    pub fn set_opacity(&mut self, id: LayerId, opacity: f32) {
        self.layers.entry(id).or_default().opacity = opacity.clamp(0.0, 1.0);
    }

    pub fn set_visible(&mut self, id: LayerId, visible: bool) {
        self.layers.entry(id).or_default().visible = visible;
    }

    pub fn draw(&mut self, id: LayerId, cmd: DrawCommand) {
        if !self.is_drawable() {
            self.suppressed += 1;
            return;
        }
        self.draw_calls += 1;
        self.layers.entry(id).or_default().commands.push(cmd);
    }

    pub fn draw_all(&mut self, id: LayerId, cmds: impl IntoIterator<Item = DrawCommand>) {
        for cmd in cmds {
            self.draw(id, cmd);
        }
    }

    pub fn clear(&mut self, id: LayerId) {
        if let Some(layer) = self.layers.get_mut(&id) {
            layer.commands.clear();
        }
    }

    pub fn clear_all(&mut self) {
        for layer in self.layers.values_mut() {
            layer.commands.clear();
        }
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }

    /// Layers bottom to top.
    pub fn layers(&self) -> impl Iterator<Item = (LayerId, &Layer)> {
        self.layers.iter().map(|(id, l)| (*id, l))
    }

    /// Accepted draw calls since creation.
    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    /// Draw calls rejected because the surface had no area.
    pub fn suppressed_calls(&self) -> u64 {
        self.suppressed
    }
}

/// Text with a white halo, the way axis labels stay readable over lines.
pub fn halo_text(pos: Point, text: impl Into<String>, anchor: Anchor, size: f64) -> [DrawCommand; 2] {
    let text = text.into();
    [
        DrawCommand::Text {
            pos: (pos.0 + 1.0, pos.1 + 1.0),
            text: text.clone(),
            color: Rgba::rgb(255, 255, 255).with_alpha(0.8),
            anchor,
            size,
        },
        DrawCommand::Text {
            pos,
            text,
            color: Rgba::rgb(0, 0, 0),
            anchor,
            size,
        },
    ]
}
