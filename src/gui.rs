//! Native GUI viewer using egui
//!
//! Header bar, the four linked views stacked in a scroll area and the column
//! context menu. Views draw into retained surfaces; this module replays them
//! with the egui painter every frame and routes pointer input back.

use eframe::egui;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::color::Rgba;
use crate::config::{Config, Env};
use crate::persist::{FileState, StateScope};
use crate::provider::provider_for;
use crate::render::{Anchor, DrawCommand, PathSegment, Point, Surface};
use crate::schedule::InputEvent;
use crate::state::Orchestrator;
use crate::views::table::{Cell, SortOrder};
use crate::views::View;

const SECTION_GAP: f32 = 12.0;
const RESIZER_HEIGHT: f32 = 6.0;
const MIN_PLOT_HEIGHT: f64 = 150.0;

/// Run the native GUI viewer, optionally loading `source` right away.
pub fn run_viewer(config: Config, env: Env, source: Option<String>, runtime: tokio::runtime::Handle) -> anyhow::Result<()> {
    let state = match &env.state_file {
        Some(path) => StateScope::new(Arc::new(FileState::open(path)?)),
        None => StateScope::in_memory(),
    };
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 900.0])
            .with_title("HyperView")
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "HyperView",
        options,
        Box::new(|cc| Ok(Box::new(ViewerApp::new(cc, config, env, state, source, runtime)))),
    )
    .map_err(|e| anyhow::anyhow!("GUI error: {}", e))
}

struct ViewerApp {
    orch: Orchestrator,
    env: Env,
    runtime: tokio::runtime::Handle,
    uri_input: String,
    search_input: String,
    status: Option<String>,
    menu_pos: egui::Pos2,
    menu_opened_frame: u64,
    last_width: f32,
}

impl ViewerApp {
    fn new(
        cc: &eframe::CreationContext<'_>,
        config: Config,
        env: Env,
        state: StateScope,
        source: Option<String>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::light());

        let orch = Orchestrator::new(config, state);
        let uri = source.or_else(|| orch.last_uri()).unwrap_or_default();
        let mut app = Self {
            orch,
            env,
            runtime,
            uri_input: uri.clone(),
            search_input: String::new(),
            status: None,
            menu_pos: egui::Pos2::ZERO,
            menu_opened_frame: 0,
            last_width: 0.0,
        };
        if !uri.is_empty() {
            app.load(&uri);
        }
        app
    }

    fn load(&mut self, uri: &str) {
        match provider_for(uri, &self.env.data_dir, self.env.server.as_deref()) {
            Ok(provider) => {
                info!("Loading '{}' with the {} provider", uri, provider.name());
                self.orch.begin_load(&self.runtime, provider, uri);
            }
            Err(e) => {
                let result = Err(e);
                self.orch.apply_load_result(uri, result, Instant::now());
            }
        }
    }

    fn open_menu(&mut self, ctx: &egui::Context, col: &str, pos: egui::Pos2) {
        self.orch.open_context_menu(col);
        self.menu_pos = pos;
        self.menu_opened_frame = ctx.cumulative_pass_nr();
    }

    fn export(&mut self) {
        let path = std::path::PathBuf::from(crate::export::export_file_name(chrono::Local::now()));
        let result = std::fs::File::create(&path)
            .map_err(crate::error::ExportError::from)
            .and_then(|file| self.orch.export_selected(file));
        self.status = Some(match result {
            Ok(n) => format!("Exported {} rows to {}", n, path.display()),
            Err(e) => {
                crate::log_error!(e, path = %path.display());
                format!("Export failed: {}", e)
            }
        });
    }

    fn header(&mut self, ui: &mut egui::Ui, now: Instant) {
        let header = self.orch.header();
        ui.horizontal(|ui| {
            ui.label("Data:");
            let edit = ui.add(egui::TextEdit::singleline(&mut self.uri_input).desired_width(320.0));
            let enter = edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if ui.button("Load").clicked() || enter {
                let uri = self.uri_input.trim().to_string();
                if !uri.is_empty() {
                    self.load(&uri);
                }
            }
            if let Some(uri) = &header.loading {
                ui.spinner();
                ui.label(format!("Loading {}", uri));
            }
        });
        if let Some(error) = &header.error {
            ui.horizontal(|ui| {
                ui.colored_label(egui::Color32::from_rgb(200, 40, 40), error);
                if ui.small_button("✕").clicked() {
                    self.orch.dismiss_error();
                }
            });
        }
        ui.horizontal(|ui| {
            if ui.add_enabled(header.can_keep, egui::Button::new("Keep")).clicked() {
                self.orch.keep(now);
            }
            if ui.add_enabled(header.can_exclude, egui::Button::new("Exclude")).clicked() {
                self.orch.exclude(now);
            }
            if ui.add_enabled(header.can_restore, egui::Button::new("Restore")).clicked() {
                self.orch.restore(now);
            }
            if ui.add_enabled(header.can_export, egui::Button::new("Export CSV")).clicked() {
                self.export();
            }
            ui.separator();

            ui.label("Search:");
            let props = self.orch.props();
            let edit = ui.add(egui::TextEdit::singleline(&mut self.search_input).desired_width(200.0));
            if edit.changed() {
                self.orch.views_mut().table.set_search(&self.search_input, &props);
            }
            let enter = edit.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if ui.add_enabled(!self.search_input.is_empty(), egui::Button::new("Select results")).clicked() || enter {
                let requests = self.orch.views_mut().table.promote_search(&props);
                self.search_input.clear();
                self.orch.dispatch(requests, now);
            }
            ui.separator();

            if let Some(stats) = &header.stats {
                let mut text = format!("Selected: {} / {} ({}%)", stats.selected, stats.filtered, stats.percentage);
                if let Some(weighted) = &stats.weighted_percentage {
                    text.push_str(&format!(", weighted {}%", weighted));
                }
                if stats.filtered != stats.total {
                    text.push_str(&format!(", {} total", stats.total));
                }
                ui.label(text);
            }
            if let Some(status) = &self.status {
                ui.separator();
                ui.weak(status);
            }
        });
    }

    /// Drag handle under a plot; returns the new height while dragged.
    fn resizer(ui: &mut egui::Ui, id: &str, height: f64) -> Option<f64> {
        let (rect, response) = ui.allocate_exact_size(
            egui::vec2(ui.available_width(), RESIZER_HEIGHT),
            egui::Sense::drag(),
        );
        let color = if response.hovered() || response.dragged() {
            egui::Color32::GRAY
        } else {
            egui::Color32::LIGHT_GRAY
        };
        ui.painter().rect_filled(rect.shrink2(egui::vec2(0.0, 2.0)), 1.0, color);
        let response = response.on_hover_cursor(egui::CursorIcon::ResizeVertical);
        if response.dragged() {
            tracing::trace!("Resizing {}", id);
            return Some((height + f64::from(response.drag_delta().y)).max(MIN_PLOT_HEIGHT));
        }
        None
    }

    fn parallel(&mut self, ctx: &egui::Context, ui: &mut egui::Ui, now: Instant) {
        let width = ui.available_width();
        let height = self.orch.views().parallel.height() as f32;
        let (response, painter) = ui.allocate_painter(egui::vec2(width, height), egui::Sense::click_and_drag());
        let origin = response.rect.min;
        if let Some(surface) = self.orch.views().parallel.surface() {
            paint_surface(&painter, origin, surface);
        }

        let props = self.orch.props();
        let local = |p: egui::Pos2| -> Point { (f64::from(p.x - origin.x), f64::from(p.y - origin.y)) };
        let mut requests = Vec::new();
        let parallel = &mut self.orch.views_mut().parallel;
        if response.drag_started() {
            if let Some(p) = response.interact_pointer_pos() {
                parallel.pointer_down(local(p));
            }
        }
        if response.dragged() {
            if let Some(p) = response.interact_pointer_pos() {
                let dx = f64::from(response.drag_delta().x);
                requests.extend(parallel.pointer_drag(local(p), dx, &props, now));
            }
        }
        if response.drag_stopped() {
            requests.extend(parallel.pointer_up(&props, now));
        }
        if response.clicked() {
            if let Some(p) = response.interact_pointer_pos() {
                parallel.pointer_down(local(p));
                requests.extend(parallel.pointer_up(&props, now));
            }
        }
        let menu_col = if response.secondary_clicked() {
            response
                .interact_pointer_pos()
                .and_then(|p| parallel.column_at(local(p)).map(|c| (c, p)))
        } else {
            None
        };
        self.orch.dispatch(requests, now);
        if let Some((col, p)) = menu_col {
            self.open_menu(ctx, &col, p);
        }

        let current = self.orch.views().parallel.height();
        if let Some(h) = Self::resizer(ui, "parallel", current) {
            self.orch.views_mut().parallel.set_height(h, now);
        }
    }

    fn xy(&mut self, ui: &mut egui::Ui, now: Instant) {
        let props = self.orch.props();
        let names: Vec<String> = props.params_def.names().to_vec();
        let mut axis_x = self.orch.views().xy.axis_x().map(str::to_string);
        let mut axis_y = self.orch.views().xy.axis_y().map(str::to_string);
        ui.horizontal(|ui| {
            axis_combo(ui, "xy_axis_x", "X", &mut axis_x, &names);
            axis_combo(ui, "xy_axis_y", "Y", &mut axis_y, &names);
            if self.orch.views().xy.is_zoomed() {
                ui.weak("Double-click to reset zoom");
            }
        });
        if axis_x.as_deref() != self.orch.views().xy.axis_x() {
            self.orch.views_mut().xy.set_axis_x(axis_x, &props);
        }
        if axis_y.as_deref() != self.orch.views().xy.axis_y() {
            self.orch.views_mut().xy.set_axis_y(axis_y, &props);
        }
        if !self.orch.views().xy.is_enabled() {
            ui.weak("Pick two columns to draw the XY graph.");
            return;
        }

        let width = ui.available_width();
        let height = self.orch.views().xy.height() as f32;
        let (response, painter) = ui.allocate_painter(egui::vec2(width, height), egui::Sense::click_and_drag());
        let origin = response.rect.min;
        if let Some(surface) = self.orch.views().xy.surface() {
            paint_surface(&painter, origin, surface);
        }
        let local = |p: egui::Pos2| -> Point { (f64::from(p.x - origin.x), f64::from(p.y - origin.y)) };
        let xy = &mut self.orch.views_mut().xy;
        if response.drag_started() {
            if let Some(p) = response.interact_pointer_pos() {
                xy.pointer_down(local(p));
            }
        }
        if response.dragged() {
            if let Some(p) = response.interact_pointer_pos() {
                xy.pointer_drag(local(p));
            }
        }
        if response.drag_stopped() {
            xy.pointer_up(&props);
        }
        if response.double_clicked() {
            xy.zoom_to((0.0, 0.0), (0.0, 0.0));
        }
        let requests = xy.hover(response.hover_pos().map(local));
        self.orch.dispatch(requests, now);
        if response.hovered() {
            if let Some(row) = self.orch.selection().rows_highlighted().first() {
                response.on_hover_text(self.orch.render_row_text(row));
            }
        }

        let current = self.orch.views().xy.height();
        if let Some(h) = Self::resizer(ui, "xy", current) {
            self.orch.views_mut().xy.set_height(h, now);
        }
    }

    fn distribution(&mut self, ui: &mut egui::Ui, now: Instant) {
        let props = self.orch.props();
        let names: Vec<String> = props
            .params_def
            .names()
            .iter()
            .filter(|n| self.orch.views().distribution.can_view(n))
            .cloned()
            .collect();
        let mut axis = self.orch.views().distribution.axis().map(str::to_string);
        let mut nbins = self.orch.views().distribution.nbins();
        ui.horizontal(|ui| {
            axis_combo(ui, "distribution_axis", "Column", &mut axis, &names);
            ui.add(egui::Slider::new(&mut nbins, 2..=100).text("Bins"));
        });
        if let Some(col) = axis.filter(|c| Some(c.as_str()) != self.orch.views().distribution.axis()) {
            self.orch.views_mut().distribution.set_axis(&col, &props, now);
        }
        if nbins != self.orch.views().distribution.nbins() {
            self.orch.views_mut().distribution.set_nbins(nbins, &props, now);
        }
        if !self.orch.views().distribution.is_enabled() {
            ui.weak("Pick a column to see its distribution.");
            return;
        }

        let width = ui.available_width();
        let height = self.orch.views().distribution.height() as f32;
        let (response, painter) = ui.allocate_painter(egui::vec2(width, height), egui::Sense::hover());
        let origin = response.rect.min;
        if let Some(surface) = self.orch.views().distribution.surface() {
            paint_surface(&painter, origin, surface);
        }
        let hover = response
            .hover_pos()
            .map(|p| (f64::from(p.x - origin.x), f64::from(p.y - origin.y)));
        self.orch.views_mut().distribution.hover(hover, now);

        let current = self.orch.views().distribution.height();
        if let Some(h) = Self::resizer(ui, "distribution", current) {
            self.orch.views_mut().distribution.set_height(h, now);
        }
    }

    fn table(&mut self, ctx: &egui::Context, ui: &mut egui::Ui, now: Instant) {
        let props = self.orch.props();
        let table = &self.orch.views().table;
        let columns = table.columns().to_vec();
        let cells = table.page_cells(&props);
        let page_rows = table.page_rows().to_vec();
        let (page, page_count, total) = (table.page(), table.page_count(), table.rows().len());
        let sort = table.sort().cloned();

        let mut sort_by = None;
        let mut menu = None;
        let mut hovered = None;
        egui::ScrollArea::horizontal().id_salt("table_scroll").show(ui, |ui| {
            egui::Grid::new("rows_table").striped(true).show(ui, |ui| {
                for col in &columns {
                    let arrow = match &sort {
                        Some((c, SortOrder::Ascending)) if c == col => " ▲",
                        Some((c, SortOrder::Descending)) if c == col => " ▼",
                        _ => "",
                    };
                    let response = ui.add(egui::Button::new(egui::RichText::new(format!("{}{}", col, arrow)).strong()).frame(false));
                    if response.clicked() {
                        sort_by = Some(col.clone());
                    }
                    if response.secondary_clicked() {
                        menu = response.interact_pointer_pos().map(|p| (col.clone(), p));
                    }
                }
                ui.end_row();
                for (i, row) in cells.iter().enumerate() {
                    let mut row_hovered = false;
                    for cell in row {
                        let response = match cell {
                            Cell::Swatch(c) => {
                                let (rect, response) = ui.allocate_exact_size(egui::vec2(12.0, 12.0), egui::Sense::hover());
                                ui.painter().rect_filled(rect, 2.0, color32(*c, 1.0));
                                response
                            }
                            Cell::Number(n) => ui.label(n.to_string()),
                            Cell::Text(t) => ui.label(t),
                            Cell::Null => ui.weak("-"),
                        };
                        row_hovered |= response.hovered();
                    }
                    if row_hovered {
                        hovered = Some(i);
                    }
                    ui.end_row();
                }
            });
        });

        let mut new_page = page;
        ui.horizontal(|ui| {
            if ui.add_enabled(page > 0, egui::Button::new("◀")).clicked() {
                new_page = page - 1;
            }
            ui.label(format!("Page {} of {} ({} rows)", page + 1, page_count, total));
            if ui.add_enabled(page + 1 < page_count, egui::Button::new("▶")).clicked() {
                new_page = page + 1;
            }
        });

        let table = &mut self.orch.views_mut().table;
        if new_page != page {
            table.set_page(new_page);
        }
        if let Some(col) = sort_by {
            table.sort_by(&col, &props);
        }
        let requests = table.hover(hovered.and_then(|i| page_rows.get(i)));
        self.orch.dispatch(requests, now);
        if let Some((col, p)) = menu {
            self.open_menu(ctx, &col, p);
        }
    }

    fn context_menu(&mut self, ctx: &egui::Context, now: Instant) {
        let Some(col) = self.orch.context_menu_column().map(str::to_string) else {
            return;
        };
        let items = self.orch.context_menu(&col);
        let mut action = None;
        let area = egui::Area::new(egui::Id::new("column_context_menu"))
            .order(egui::Order::Foreground)
            .fixed_pos(self.menu_pos)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.label(egui::RichText::new(&col).strong());
                    ui.separator();
                    for item in &items {
                        let text = if item.checked {
                            format!("✔ {}", item.label)
                        } else {
                            item.label.clone()
                        };
                        if ui.add_enabled(item.enabled, egui::Button::new(text).frame(false)).clicked() {
                            action = Some(item.action);
                        }
                    }
                });
            });
        if let Some(action) = action {
            self.orch.apply_context(&col, action, now);
        } else if ctx.cumulative_pass_nr() > self.menu_opened_frame
            && ctx.input(|i| i.pointer.any_click())
            && !area.response.contains_pointer()
        {
            self.orch.publish_input(InputEvent::ClickOutside);
        }
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();

        // Dropped files load like typed paths.
        let dropped: Vec<String> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|f| f.path.as_ref().map(|p| p.display().to_string()))
                .collect()
        });
        if let Some(path) = dropped.into_iter().next() {
            self.uri_input = path.clone();
            self.load(&path);
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.orch.publish_input(InputEvent::KeyPressed("Escape".to_string()));
        }

        self.orch.tick(now);

        egui::TopBottomPanel::top("header_panel").show(ctx, |ui| {
            ui.add_space(4.0);
            self.header(ui, now);
            ui.add_space(4.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let width = ui.available_width();
            if width != self.last_width {
                self.last_width = width;
                let height = ui.available_height();
                self.orch.publish_input(InputEvent::Resize { width, height });
            }
            if self.orch.experiment().is_none() {
                ui.centered_and_justified(|ui| {
                    ui.label("Load a CSV or JSON file, or drop one here.");
                });
                return;
            }
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.heading("Parallel plot");
                self.parallel(ctx, ui, now);
                ui.add_space(SECTION_GAP);
                ui.heading("XY graph");
                self.xy(ui, now);
                ui.add_space(SECTION_GAP);
                ui.heading("Distribution");
                self.distribution(ui, now);
                ui.add_space(SECTION_GAP);
                ui.heading("Rows");
                self.table(ctx, ui, now);
            });
        });

        self.context_menu(ctx, now);

        if self.orch.is_busy() {
            ctx.request_repaint();
        } else {
            ctx.request_repaint_after(Duration::from_millis(250));
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("Viewer closing");
        self.orch.teardown();
    }
}

fn axis_combo(ui: &mut egui::Ui, id: &str, label: &str, value: &mut Option<String>, names: &[String]) {
    ui.label(format!("{}:", label));
    egui::ComboBox::from_id_salt(id)
        .selected_text(value.as_deref().unwrap_or("(none)"))
        .show_ui(ui, |ui| {
            for name in names {
                ui.selectable_value(value, Some(name.clone()), name);
            }
        });
}

fn color32(c: Rgba, opacity: f32) -> egui::Color32 {
    let alpha = (c.a * opacity * 255.0).round().clamp(0.0, 255.0) as u8;
    egui::Color32::from_rgba_unmultiplied(c.r, c.g, c.b, alpha)
}

/// Replay every visible layer of `surface` at `origin`.
fn paint_surface(painter: &egui::Painter, origin: egui::Pos2, surface: &Surface) {
    if !surface.is_drawable() {
        return;
    }
    for (_, layer) in surface.layers() {
        if !layer.is_visible() {
            continue;
        }
        let opacity = layer.opacity();
        for cmd in layer.paint_order() {
            paint_command(painter, origin, cmd, opacity);
        }
    }
}

fn paint_command(painter: &egui::Painter, origin: egui::Pos2, cmd: &DrawCommand, opacity: f32) {
    let pos = |p: Point| origin + egui::vec2(p.0 as f32, p.1 as f32);
    match cmd {
        DrawCommand::Line { from, to, color, width } => {
            painter.line_segment([pos(*from), pos(*to)], egui::Stroke::new(*width as f32, color32(*color, opacity)));
        }
        DrawCommand::Path { segments, color, width } => {
            let stroke = egui::Stroke::new(*width as f32, color32(*color, opacity));
            let mut points: Vec<egui::Pos2> = Vec::new();
            for segment in segments {
                match segment {
                    PathSegment::MoveTo(p) => {
                        if points.len() > 1 {
                            painter.add(egui::Shape::line(std::mem::take(&mut points), stroke));
                        }
                        points.clear();
                        points.push(pos(*p));
                    }
                    PathSegment::LineTo(p) => points.push(pos(*p)),
                    PathSegment::CubicTo(c1, c2, end) => {
                        let Some(start) = points.last().copied() else {
                            warn!("Cubic segment without a start point");
                            continue;
                        };
                        let curve = egui::epaint::CubicBezierShape::from_points_stroke(
                            [start, pos(*c1), pos(*c2), pos(*end)],
                            false,
                            egui::Color32::TRANSPARENT,
                            stroke,
                        );
                        points.extend(curve.flatten(Some(0.5)).into_iter().skip(1));
                    }
                }
            }
            if points.len() > 1 {
                painter.add(egui::Shape::line(points, stroke));
            }
        }
        DrawCommand::Circle { center, radius, fill } => {
            painter.circle_filled(pos(*center), *radius as f32, color32(*fill, opacity));
        }
        DrawCommand::Rect { min, max, fill, stroke } => {
            let rect = egui::Rect::from_two_pos(pos(*min), pos(*max));
            if let Some(fill) = fill {
                painter.rect_filled(rect, 0.0, color32(*fill, opacity));
            }
            if let Some((color, width)) = stroke {
                painter.rect_stroke(rect, 0.0, egui::Stroke::new(*width as f32, color32(*color, opacity)));
            }
        }
        DrawCommand::Text { pos: p, text, color, anchor, size } => {
            let align = match anchor {
                Anchor::Start => egui::Align2::LEFT_CENTER,
                Anchor::Middle => egui::Align2::CENTER_CENTER,
                Anchor::End => egui::Align2::RIGHT_CENTER,
            };
            painter.text(pos(*p), align, text, egui::FontId::proportional(*size as f32), color32(*color, opacity));
        }
    }
}
