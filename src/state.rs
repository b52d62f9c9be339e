//! Orchestrator - Single Source of Truth (SSOT)
//!
//! Owns the loaded experiment, the row sets, the column definitions and the
//! coloring, and runs the update loop that keeps the linked views in sync.
//! Views only ever see [`ViewProps`] snapshots and answer with requests.

use crate::color::{default_colorby, ColorBy, ColorFn, Rgba};
use crate::config::Config;
use crate::error::{ExportError, LoadError};
use crate::export::{export_columns, write_csv};
use crate::filter::Filter;
use crate::infer::{infer_types, normalize_numeric_columns, ParamDefMap};
use crate::lineage::HighlightMode;
use crate::model::{DatapointLookup, Experiment, ParamType, Row, ValueDef};
use crate::persist::StateScope;
use crate::provider::{DataProvider, LoadTask};
use crate::scale::ScaleDomainRange;
use crate::schedule::{Debounced, EventBus, InputEvent, SubscriberId};
use crate::selection::{Selection, SelectionStats};
use crate::views::distribution::DistributionPlot;
use crate::views::parallel::ParallelPlot;
use crate::views::table::RowsTable;
use crate::views::xy::PlotXy;
use crate::views::{Generations, PropsDiff, View, ViewProps, ViewRequest};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Views answering each other's requests must settle within this many passes.
const MAX_UPDATE_PASSES: usize = 8;

/// Notifications for code embedding the viewer.
#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    SelectedUids(Vec<String>),
    FilteredUids(Vec<String>),
    BrushExtents(BTreeMap<String, ScaleDomainRange>),
}

pub type HookFn = Box<dyn FnMut(&HookEvent) + Send>;

/// Column context menu actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextAction {
    SetType(ParamType),
    ColorBy,
    SetXAxis,
    SetYAxis,
    ViewDistribution,
    RemoveAxis,
    RestoreAxis,
    HighlightMode(HighlightMode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextItem {
    pub action: ContextAction,
    pub label: String,
    pub enabled: bool,
    pub checked: bool,
}

/// What the header bar shows.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub stats: Option<SelectionStats>,
    pub can_keep: bool,
    pub can_exclude: bool,
    pub can_restore: bool,
    pub can_export: bool,
    pub loading: Option<String>,
    pub error: Option<String>,
}

/// The linked views, each with its own persisted state scope.
pub struct Views {
    pub parallel: ParallelPlot,
    pub xy: PlotXy,
    pub distribution: DistributionPlot,
    pub table: RowsTable,
}

impl Views {
    fn new(state: &StateScope, config: &Config) -> Self {
        Self {
            parallel: ParallelPlot::new(state.children("parallel"), config.parallel.clone(), &config.timings),
            xy: PlotXy::new(state.children("xy"), config.xy.clone(), &config.timings),
            distribution: DistributionPlot::new(
                state.children("distribution"),
                config.distribution.clone(),
                &config.timings,
            ),
            table: RowsTable::new(config.table.clone(), &config.timings),
        }
    }

    pub fn all(&self) -> [&dyn View; 4] {
        [&self.parallel, &self.xy, &self.distribution, &self.table]
    }

    pub fn all_mut(&mut self) -> [&mut dyn View; 4] {
        [&mut self.parallel, &mut self.xy, &mut self.distribution, &mut self.table]
    }
}

fn uids(rows: &[Row]) -> Vec<String> {
    rows.iter().map(|r| r.uid.clone()).collect()
}

pub struct Orchestrator {
    base_config: Config,
    config: Config,
    state: StateScope,
    experiment: Option<Arc<Experiment>>,
    selection: Selection,
    params_def: Arc<ParamDefMap>,
    params_def_unfiltered: Arc<ParamDefMap>,
    lookup: Arc<DatapointLookup>,
    color: Arc<ColorBy>,
    experiment_generation: u64,
    params_generation: u64,
    color_generation: u64,
    /// Generations the views last saw.
    published: Generations,
    views: Views,
    width: f64,
    bus: EventBus,
    bus_id: Option<SubscriberId>,
    context_menu: Option<String>,
    selected_hook: Debounced<Vec<String>>,
    filtered_hook: Debounced<Vec<String>>,
    hooks: Vec<HookFn>,
    loading: Option<LoadTask>,
    load_seq: u64,
    last_error: Option<String>,
}

impl Orchestrator {
    pub fn new(config: Config, state: StateScope) -> Self {
        let mut bus = EventBus::new();
        let bus_id = Some(bus.subscribe("context_menu"));
        let views = Views::new(&state, &config);
        let timings = config.timings.clone();
        Self {
            base_config: config.clone(),
            config,
            state,
            experiment: None,
            selection: Selection::default(),
            params_def: Arc::default(),
            params_def_unfiltered: Arc::default(),
            lookup: Arc::default(),
            color: Arc::new(ColorBy::none()),
            experiment_generation: 0,
            params_generation: 0,
            color_generation: 0,
            published: Generations::default(),
            views,
            width: 0.0,
            bus,
            bus_id,
            context_menu: None,
            selected_hook: Debounced::new(Duration::from_millis(timings.selected_hook_ms)),
            filtered_hook: Debounced::new(Duration::from_millis(timings.filtered_hook_ms)),
            hooks: Vec::new(),
            loading: None,
            load_seq: 0,
            last_error: None,
        }
    }

    pub fn experiment(&self) -> Option<&Arc<Experiment>> {
        self.experiment.as_ref()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn params_def(&self) -> &Arc<ParamDefMap> {
        &self.params_def
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn views(&self) -> &Views {
        &self.views
    }

    /// Views for direct pointer input; pass their requests to [`Self::dispatch`].
    pub fn views_mut(&mut self) -> &mut Views {
        &mut self.views
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    /// Uri of the last successful load, if any.
    pub fn last_uri(&self) -> Option<String> {
        self.state.get("load_uri")
    }

    pub fn generations(&self) -> Generations {
        Generations {
            experiment: self.experiment_generation,
            filtered: self.selection.filtered_generation(),
            selected: self.selection.selected_generation(),
            highlighted: self.selection.highlighted_generation(),
            params: self.params_generation,
            color: self.color_generation,
        }
    }

    pub fn props(&self) -> ViewProps {
        ViewProps {
            rows_all: self.selection.rows_all().clone(),
            rows_filtered: self.selection.rows_filtered().clone(),
            rows_selected: self.selection.rows_selected().clone(),
            rows_highlighted: self.selection.rows_highlighted().clone(),
            selected_filter: self.selection.selected_filter().cloned(),
            params_def: self.params_def.clone(),
            params_def_unfiltered: self.params_def_unfiltered.clone(),
            lookup: self.lookup.clone(),
            color: self.color.clone(),
            generations: self.generations(),
            asserts: self.config.asserts,
        }
    }

    /// Display color of a row under the current coloring.
    pub fn row_color(&self, row: &Row, opacity: f32) -> Rgba {
        self.color.color(row, opacity)
    }

    pub fn render_row_text(&self, row: &Row) -> String {
        self.props().row_text(row)
    }

    pub fn on_change(&mut self, hook: HookFn) {
        self.hooks.push(hook);
    }

    fn emit(&mut self, event: HookEvent) {
        for hook in &mut self.hooks {
            hook(&event);
        }
    }

    /// Replace the active experiment. Every view is rebuilt from scratch.
    pub fn install_experiment(&mut self, mut experiment: Experiment, now: Instant) {
        let params_state = self.state.children("params");
        let order = experiment.column_names();
        let hints = experiment.parameters_definition.clone();
        let defs = infer_types(&params_state, &experiment.to_rows(), &hints, &order);
        normalize_numeric_columns(&mut experiment, &defs);

        self.config = self.base_config.with_display_data(&experiment);
        let filters: Vec<Filter> = self.state.get("filters").unwrap_or_default();
        self.selection = Selection::new(experiment.to_rows(), filters, self.config.asserts);
        self.lookup = Arc::new(DatapointLookup::build(self.selection.rows_all()));
        self.params_def_unfiltered = Arc::new(defs);
        self.params_def = if self.selection.rows_filtered().len() == self.selection.rows_all().len() {
            self.params_def_unfiltered.clone()
        } else {
            Arc::new(infer_types(&params_state, self.selection.rows_filtered(), &hints, &order))
        };
        tracing::info!(
            "Installed experiment: {} rows, {} columns",
            self.selection.rows_all().len(),
            self.params_def_unfiltered.len()
        );
        self.experiment = Some(Arc::new(experiment));
        self.experiment_generation += 1;
        self.params_generation += 1;
        self.context_menu = None;
        self.rebuild_color();
        self.remount_views(now);

        let selected = uids(self.selection.rows_selected());
        let filtered = uids(self.selection.rows_filtered());
        self.selected_hook.push(selected, now);
        self.filtered_hook.push(filtered, now);
    }

    fn remount_views(&mut self, now: Instant) {
        for view in self.views.all_mut() {
            view.on_unmount();
        }
        self.views = Views::new(&self.state, &self.config);
        let props = self.props();
        let width = self.width;
        let mut requests = Vec::new();
        for view in self.views.all_mut() {
            let height = view.height();
            view.resize(width, height, now);
            requests.extend(view.on_mount(&props, now));
        }
        self.published = props.generations;
        self.dispatch(requests, now);
    }

    /// Column to color by: the user's choice, then the experiment's, then
    /// the configured one, then the best scoring column.
    fn rebuild_color(&mut self) {
        let defs = self.params_def.clone();
        let valid = |c: Option<String>| c.filter(|c| defs.contains(c));
        let experiment_colorby = self.experiment.as_ref().and_then(|e| e.colorby.clone());
        let column = valid(self.state.get("colorby"))
            .or_else(|| valid(experiment_colorby))
            .or_else(|| valid(self.config.colors.colorby.clone()))
            .or_else(|| default_colorby(&defs));
        let colormap = self
            .experiment
            .as_ref()
            .and_then(|e| e.colormap.clone())
            .or_else(|| self.config.colors.colormap.clone())
            .unwrap_or_else(|| "turbo".to_string());
        self.color = Arc::new(match column.as_deref().and_then(|c| defs.get(c)) {
            Some(pd) => ColorBy::new(pd, &colormap),
            None => ColorBy::none(),
        });
        self.color_generation += 1;
    }

    /// Apply view requests, then let every view catch up.
    pub fn dispatch(&mut self, requests: Vec<ViewRequest>, now: Instant) {
        self.apply_requests(requests);
        self.propagate(now);
    }

    fn apply_requests(&mut self, requests: Vec<ViewRequest>) {
        for request in requests {
            match request {
                ViewRequest::SetSelected { rows, filter } => {
                    self.selection.set_selected(rows, filter);
                }
                ViewRequest::SetHighlighted(rows) => {
                    self.selection.set_highlighted(rows);
                }
                ViewRequest::BrushExtents(extents) => self.emit(HookEvent::BrushExtents(extents)),
            }
        }
    }

    fn propagate(&mut self, now: Instant) {
        for _ in 0..MAX_UPDATE_PASSES {
            let props = self.props();
            let diff = PropsDiff::between(&self.published, &props.generations);
            if !diff.any() {
                return;
            }
            self.published = props.generations;
            if diff.selected {
                self.selected_hook.push(uids(&props.rows_selected), now);
            }
            if diff.filtered {
                self.filtered_hook.push(uids(&props.rows_filtered), now);
            }
            let mut requests = Vec::new();
            for view in self.views.all_mut() {
                requests.extend(view.on_props_changed(&props, &diff, now));
            }
            self.apply_requests(requests);
        }
        tracing::warn!("View updates did not settle after {} passes", MAX_UPDATE_PASSES);
    }

    /// Advance loads, input, view timers and debounced hooks.
    pub fn tick(&mut self, now: Instant) {
        self.poll_load(now);
        self.handle_input(now);
        if self.experiment.is_some() {
            let props = self.props();
            let mut requests = Vec::new();
            for view in self.views.all_mut() {
                requests.extend(view.tick(&props, now));
            }
            self.dispatch(requests, now);
        }
        if let Some(selected) = self.selected_hook.poll(now) {
            self.emit(HookEvent::SelectedUids(selected));
        }
        if let Some(filtered) = self.filtered_hook.poll(now) {
            self.emit(HookEvent::FilteredUids(filtered));
        }
    }

    pub fn is_busy(&self) -> bool {
        self.loading.is_some()
            || self.selected_hook.is_pending()
            || self.filtered_hook.is_pending()
            || self.views.all().iter().any(|v| v.is_busy())
    }

    pub fn publish_input(&mut self, event: InputEvent) {
        self.bus.publish(event);
    }

    fn handle_input(&mut self, now: Instant) {
        let Some(id) = self.bus_id else {
            return;
        };
        for event in self.bus.drain(id) {
            match event {
                InputEvent::Resize { width, .. } => self.resize(f64::from(width), now),
                InputEvent::ClickOutside => self.close_context_menu(),
                InputEvent::KeyPressed(key) if key == "Escape" => self.close_context_menu(),
                InputEvent::KeyPressed(_) => {}
            }
        }
    }

    /// New window width; every view keeps its own height.
    pub fn resize(&mut self, width: f64, now: Instant) {
        if width == self.width {
            return;
        }
        self.width = width;
        for view in self.views.all_mut() {
            let height = view.height();
            view.resize(width, height, now);
        }
    }

    // Loading

    /// Start loading `uri`; a load still running is cancelled.
    pub fn begin_load(&mut self, runtime: &tokio::runtime::Handle, provider: Arc<dyn DataProvider>, uri: &str) {
        if let Some(task) = self.loading.take() {
            task.cancel();
        }
        self.load_seq += 1;
        self.loading = Some(LoadTask::spawn(runtime, provider, uri.to_string(), self.load_seq));
    }

    pub fn loading_uri(&self) -> Option<&str> {
        self.loading.as_ref().map(LoadTask::uri)
    }

    fn poll_load(&mut self, now: Instant) {
        let Some(task) = self.loading.as_mut() else {
            return;
        };
        let Some(result) = task.try_take() else {
            return;
        };
        let uri = task.uri().to_string();
        self.loading = None;
        self.apply_load_result(&uri, result, now);
    }

    /// A failed load keeps the previous experiment and reports the error.
    pub fn apply_load_result(&mut self, uri: &str, result: Result<Experiment, LoadError>, now: Instant) {
        match result {
            Ok(experiment) => {
                tracing::info!("Loaded '{}' ({} datapoints)", uri, experiment.datapoints.len());
                self.last_error = None;
                self.state.set("load_uri", &uri);
                self.install_experiment(experiment, now);
            }
            Err(LoadError::Cancelled) => tracing::debug!("Load of '{}' was superseded", uri),
            Err(e) => {
                crate::log_error!(e, uri = %uri);
                self.last_error = Some(format!("Could not load '{}': {}", uri, e));
            }
        }
    }

    // Working set

    pub fn keep(&mut self, now: Instant) -> bool {
        let changed = self.selection.keep();
        if changed {
            crate::log_view_event!("header", "keep", rows = self.selection.rows_filtered().len());
            self.working_set_changed(now);
        }
        changed
    }

    pub fn exclude(&mut self, now: Instant) -> bool {
        let changed = self.selection.exclude();
        if changed {
            crate::log_view_event!("header", "exclude", rows = self.selection.rows_filtered().len());
            self.working_set_changed(now);
        }
        changed
    }

    pub fn restore(&mut self, now: Instant) -> bool {
        let changed = self.selection.restore();
        if changed {
            crate::log_view_event!("header", "restore", rows = self.selection.rows_filtered().len());
            self.working_set_changed(now);
        }
        changed
    }

    fn working_set_changed(&mut self, now: Instant) {
        self.state.set("filters", &self.selection.filtered_filters().to_vec());
        self.recompute_params();
        self.rebuild_color();
        self.propagate(now);
    }

    /// Experiment hints with the current axis types, so re-inference over
    /// a new working set keeps what the user chose.
    fn type_hints(&self) -> HashMap<String, ValueDef> {
        let mut hints = self
            .experiment
            .as_ref()
            .map(|e| e.parameters_definition.clone())
            .unwrap_or_default();
        for pd in self.params_def.iter() {
            hints.entry(pd.name.clone()).or_default().param_type = Some(pd.param_type);
        }
        hints
    }

    fn recompute_params(&mut self) {
        let hints = self.type_hints();
        let order = self.params_def_unfiltered.names().to_vec();
        let defs = infer_types(
            &self.state.children("params"),
            self.selection.rows_filtered(),
            &hints,
            &order,
        );
        self.params_def = Arc::new(defs);
        self.params_generation += 1;
    }

    // Column actions

    pub fn set_column_type(&mut self, col: &str, param_type: ParamType, now: Instant) -> bool {
        let mut defs = (*self.params_def).clone();
        if !defs.set_type(col, param_type) {
            tracing::warn!("Column {} cannot be drawn as {}", col, param_type.label());
            return false;
        }
        self.state.children("params").children(col).set("type", &param_type);
        let mut unfiltered = (*self.params_def_unfiltered).clone();
        unfiltered.set_type(col, param_type);
        self.params_def = Arc::new(defs);
        self.params_def_unfiltered = Arc::new(unfiltered);
        self.params_generation += 1;
        if self.color.column() == Some(col) {
            self.rebuild_color();
        }
        self.propagate(now);
        true
    }

    pub fn set_colorby(&mut self, col: &str, now: Instant) -> bool {
        if !self.params_def.contains(col) {
            return false;
        }
        self.state.set("colorby", &col);
        self.rebuild_color();
        self.propagate(now);
        true
    }

    pub fn open_context_menu(&mut self, col: &str) {
        self.context_menu = Some(col.to_string());
    }

    pub fn close_context_menu(&mut self) {
        self.context_menu = None;
    }

    pub fn context_menu_column(&self) -> Option<&str> {
        self.context_menu.as_deref()
    }

    /// Items of the column context menu.
    pub fn context_menu(&self, col: &str) -> Vec<ContextItem> {
        let item = |action, label: &str, enabled, checked| ContextItem {
            action,
            label: label.to_string(),
            enabled,
            checked,
        };
        let mut items = Vec::new();
        let known = self.params_def.get(col);
        if let Some(pd) = known {
            for t in &pd.type_options {
                items.push(item(ContextAction::SetType(*t), t.label(), true, pd.param_type == *t));
            }
        }
        items.push(item(
            ContextAction::ColorBy,
            "Use for coloring",
            known.is_some(),
            self.color.column() == Some(col),
        ));
        let xy = &self.views.xy;
        items.push(item(ContextAction::SetXAxis, "Set as X axis", known.is_some(), xy.axis_x() == Some(col)));
        items.push(item(ContextAction::SetYAxis, "Set as Y axis", known.is_some(), xy.axis_y() == Some(col)));
        let dist = &self.views.distribution;
        items.push(item(
            ContextAction::ViewDistribution,
            "View distribution",
            dist.can_view(col),
            dist.axis() == Some(col),
        ));
        let props = self.props();
        let parallel = &self.views.parallel;
        if parallel.dimensions().iter().any(|d| d == col) {
            items.push(item(ContextAction::RemoveAxis, "Remove from parallel plot", true, false));
        } else if parallel.can_restore_axis(col, &props) {
            items.push(item(ContextAction::RestoreAxis, "Restore in parallel plot", true, false));
        }
        for mode in [HighlightMode::Parent, HighlightMode::Children] {
            items.push(item(
                ContextAction::HighlightMode(mode),
                mode.label(),
                true,
                xy.highlight_mode() == mode,
            ));
        }
        items
    }

    pub fn apply_context(&mut self, col: &str, action: ContextAction, now: Instant) {
        crate::log_view_event!("context_menu", "action", column = %col, action = ?action);
        self.close_context_menu();
        let props = self.props();
        match action {
            ContextAction::SetType(t) => {
                self.set_column_type(col, t, now);
            }
            ContextAction::ColorBy => {
                self.set_colorby(col, now);
            }
            ContextAction::SetXAxis => self.views.xy.set_axis_x(Some(col.to_string()), &props),
            ContextAction::SetYAxis => self.views.xy.set_axis_y(Some(col.to_string()), &props),
            ContextAction::ViewDistribution => self.views.distribution.set_axis(col, &props, now),
            ContextAction::RemoveAxis => {
                let requests = self.views.parallel.hide_axis(col, &props, now);
                self.dispatch(requests, now);
            }
            ContextAction::RestoreAxis => {
                self.views.parallel.restore_axis(col, &props);
            }
            ContextAction::HighlightMode(mode) => self.views.xy.set_highlight_mode(mode, &props),
        }
    }

    // Header

    pub fn header(&self) -> Header {
        let loaded = self.experiment.is_some();
        let can_narrow = loaded && self.selection.can_keep_or_exclude();
        Header {
            stats: loaded.then(|| self.selection.stats(self.config.colors.weight_column.as_deref())),
            can_keep: can_narrow,
            can_exclude: can_narrow,
            can_restore: loaded && self.selection.can_restore(),
            can_export: loaded && !self.selection.rows_selected().is_empty(),
            loading: self.loading_uri().map(str::to_string),
            error: self.last_error.clone(),
        }
    }

    /// Write the selected rows as CSV.
    pub fn export_selected<W: Write>(&self, writer: W) -> Result<usize, ExportError> {
        let columns = export_columns(&self.params_def_unfiltered);
        write_csv(self.selection.rows_selected(), &columns, self.config.export.delimiter, writer)
    }

    /// Cancel every pending load, timer and subscription. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(task) = self.loading.take() {
            task.cancel();
        }
        for view in self.views.all_mut() {
            view.on_unmount();
        }
        if let Some(id) = self.bus_id.take() {
            self.bus.unsubscribe(id);
        }
        self.selected_hook.cancel();
        self.filtered_hook.cancel();
        self.context_menu = None;
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Datapoint, Value};
    use std::sync::Mutex;

    fn experiment() -> Experiment {
        let dps = (0..20)
            .map(|i| {
                let parent = (i > 0).then(|| format!("{}", i - 1));
                Datapoint::new(
                    i.to_string(),
                    parent.as_deref(),
                    [
                        ("loss", Value::from(i as f64 / 10.0)),
                        ("lr", Value::from(if i % 2 == 0 { 0.1 } else { 0.01 })),
                        ("optimizer", Value::from(if i % 3 == 0 { "adam" } else { "sgd" })),
                    ],
                )
            })
            .collect();
        Experiment::from_datapoints(dps)
    }

    fn loaded(state: StateScope) -> (Orchestrator, Instant) {
        let now = Instant::now();
        let mut orch = Orchestrator::new(Config::default(), state);
        orch.resize(800.0, now);
        orch.install_experiment(experiment(), now);
        (orch, now)
    }

    fn select_low_loss(orch: &mut Orchestrator, now: Instant) {
        let filter = Filter::range("loss", ParamType::Numeric, 0.0, 0.45, false);
        let rows = crate::filter::apply_filter(orch.selection().rows_filtered(), &filter);
        orch.dispatch(vec![ViewRequest::SetSelected { rows, filter: Some(filter) }], now);
    }

    #[test]
    fn test_install_mounts_views() {
        let (orch, _) = loaded(StateScope::in_memory());
        assert_eq!(orch.selection().rows_all().len(), 20);
        assert_eq!(orch.selection().rows_selected().len(), 20);
        // The parallel plot's initial brush: every filtered row.
        assert!(orch.selection().selected_filter().is_some());
        assert!(!orch.views().parallel.dimensions().is_empty());
        assert_eq!(orch.views().table.rows().len(), 20);
        assert_eq!(orch.published, orch.generations());
    }

    #[test]
    fn test_failed_load_keeps_experiment() {
        let (mut orch, now) = loaded(StateScope::in_memory());
        let before = orch.generations();
        orch.apply_load_result("broken.csv", Err(LoadError::Empty), now);
        assert_eq!(orch.generations(), before);
        assert_eq!(orch.selection().rows_all().len(), 20);
        assert!(orch.header().error.unwrap().contains("broken.csv"));
        orch.dismiss_error();
        assert!(orch.last_error().is_none());

        orch.apply_load_result("ok.json", Ok(experiment()), now);
        assert_eq!(orch.last_uri().as_deref(), Some("ok.json"));
    }

    #[test]
    fn test_keep_persists_filters_across_reload() {
        let state = StateScope::in_memory();
        let (mut orch, now) = loaded(state.clone());
        select_low_loss(&mut orch, now);
        assert_eq!(orch.selection().rows_selected().len(), 5);
        assert!(orch.header().can_keep);
        assert!(orch.keep(now));
        assert_eq!(orch.selection().rows_filtered().len(), 5);
        // Definitions follow the working set.
        assert_eq!(orch.params_def().get("loss").unwrap().distinct_values.len(), 5);

        let saved: Vec<Filter> = state.get("filters").unwrap();
        assert_eq!(saved.len(), 1);
        let (reloaded, _) = loaded(state.clone());
        assert_eq!(reloaded.selection().rows_filtered().len(), 5);

        assert!(orch.restore(now));
        assert_eq!(orch.selection().rows_filtered().len(), 20);
        assert_eq!(state.get::<Vec<Filter>>("filters").unwrap().len(), 0);
    }

    #[test]
    fn test_exclude_drops_selection() {
        let (mut orch, now) = loaded(StateScope::in_memory());
        select_low_loss(&mut orch, now);
        assert!(orch.exclude(now));
        assert_eq!(orch.selection().rows_filtered().len(), 15);
        assert!(orch.header().can_restore);
    }

    #[test]
    fn test_colorby_default_and_persisted() {
        let state = StateScope::in_memory();
        let (mut orch, now) = loaded(state.clone());
        let default = orch.props().colorby().map(str::to_string);
        assert!(default.is_some());
        assert!(orch.set_colorby("optimizer", now));
        assert_eq!(orch.props().colorby(), Some("optimizer"));
        assert!(!orch.set_colorby("missing", now));

        let (reloaded, _) = loaded(state);
        assert_eq!(reloaded.props().colorby(), Some("optimizer"));
    }

    #[test]
    fn test_set_type_persists() {
        let state = StateScope::in_memory();
        let (mut orch, now) = loaded(state.clone());
        let params = orch.generations().params;
        assert!(orch.set_column_type("loss", ParamType::NumericPercentile, now));
        assert_eq!(orch.generations().params, params + 1);
        assert_eq!(orch.params_def().get("loss").unwrap().param_type, ParamType::NumericPercentile);
        assert!(!orch.set_column_type("optimizer", ParamType::NumericLog, now));

        let (reloaded, _) = loaded(state);
        assert_eq!(
            reloaded.params_def().get("loss").unwrap().param_type,
            ParamType::NumericPercentile
        );
    }

    #[test]
    fn test_context_menu_actions() {
        let (mut orch, now) = loaded(StateScope::in_memory());
        orch.open_context_menu("lr");
        let items = orch.context_menu("lr");
        assert!(items.iter().any(|i| i.action == ContextAction::SetType(ParamType::Numeric)));
        assert!(items.iter().any(|i| i.action == ContextAction::RemoveAxis));

        orch.apply_context("lr", ContextAction::SetXAxis, now);
        assert_eq!(orch.views().xy.axis_x(), Some("lr"));
        assert!(orch.context_menu_column().is_none());

        orch.apply_context("lr", ContextAction::RemoveAxis, now);
        assert!(!orch.views().parallel.dimensions().iter().any(|d| d == "lr"));
        assert!(orch
            .context_menu("lr")
            .iter()
            .any(|i| i.action == ContextAction::RestoreAxis));
        orch.apply_context("lr", ContextAction::RestoreAxis, now);
        assert!(orch.views().parallel.dimensions().iter().any(|d| d == "lr"));
    }

    #[test]
    fn test_escape_closes_context_menu() {
        let (mut orch, now) = loaded(StateScope::in_memory());
        orch.open_context_menu("loss");
        orch.publish_input(InputEvent::KeyPressed("a".into()));
        orch.tick(now);
        assert_eq!(orch.context_menu_column(), Some("loss"));
        orch.publish_input(InputEvent::KeyPressed("Escape".into()));
        orch.tick(now);
        assert!(orch.context_menu_column().is_none());
    }

    #[test]
    fn test_hooks_are_debounced() {
        let (mut orch, now) = loaded(StateScope::in_memory());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        orch.on_change(Box::new(move |e| sink.lock().unwrap().push(e.clone())));

        select_low_loss(&mut orch, now + Duration::from_millis(10));
        let rows = orch.selection().rows_filtered()[..3].to_vec();
        orch.dispatch(vec![ViewRequest::SetSelected { rows, filter: None }], now + Duration::from_millis(50));
        orch.tick(now + Duration::from_millis(100));
        assert!(!events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, HookEvent::SelectedUids(_))));

        orch.tick(now + Duration::from_millis(300));
        let selected: Vec<Vec<String>> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                HookEvent::SelectedUids(u) => Some(u.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(selected, vec![vec!["0".to_string(), "1".to_string(), "2".to_string()]]);
    }

    #[test]
    fn test_export_selected_rows() {
        let (mut orch, now) = loaded(StateScope::in_memory());
        select_low_loss(&mut orch, now);
        let mut buf = Vec::new();
        assert_eq!(orch.export_selected(&mut buf).unwrap(), 5);
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("uid,from_uid,"));
        assert_eq!(text.lines().count(), 6);
    }

    #[test]
    fn test_teardown_cancels_everything() {
        let (mut orch, now) = loaded(StateScope::in_memory());
        select_low_loss(&mut orch, now);
        assert!(orch.is_busy());
        orch.teardown();
        assert!(!orch.is_busy());
        assert_eq!(orch.bus.subscriber_count(), 0);
        orch.teardown();
    }
}
