//! Rows table: a projection of the selected rows onto display cells

use super::{PropsDiff, View, ViewProps, ViewRequest};
use crate::color::Rgba;
use crate::config::{TableConfig, Timings};
use crate::filter::{apply_filter, Filter};
use crate::infer::ParamDefMap;
use crate::model::{Row, Value, UID};
use crate::render::Surface;
use crate::schedule::Debouncer;
use std::cmp::Ordering;
use std::time::Instant;

/// Title of the color swatch column.
pub const SWATCH_COLUMN: &str = "";

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Swatch(Rgba),
    Number(f64),
    Text(String),
    Null,
}

impl Cell {
    fn of(value: Option<&Value>, numeric: bool) -> Cell {
        match value {
            None | Some(Value::Null) => Cell::Null,
            Some(v) if numeric => match v.as_f64() {
                Some(n) => Cell::Number(n),
                None => Cell::Text(v.to_string()),
            },
            Some(v) => Cell::Text(v.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Swatch, `uid`, then every other column in definition order.
pub fn table_columns(defs: &ParamDefMap) -> Vec<String> {
    let mut cols = vec![SWATCH_COLUMN.to_string(), UID.to_string()];
    cols.extend(defs.names().iter().filter(|c| c.as_str() != UID).cloned());
    cols
}

/// One display row per input row, cells in `columns` order.
pub fn project(rows: &[Row], columns: &[String], defs: &ParamDefMap, color: impl Fn(&Row) -> Rgba) -> Vec<Vec<Cell>> {
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .map(|col| {
                    if col == SWATCH_COLUMN {
                        Cell::Swatch(color(row))
                    } else {
                        let numeric = defs.get(col).map(|pd| pd.numeric).unwrap_or(false);
                        Cell::of(row.get(col), numeric)
                    }
                })
                .collect()
        })
        .collect()
}

fn compare(a: Option<&Value>, b: Option<&Value>, numeric: bool) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) if numeric => a.parse_float().total_cmp(&b.parse_float()),
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}

pub struct RowsTable {
    config: TableConfig,
    columns: Vec<String>,
    rows: Vec<Row>,
    search: String,
    sort: Option<(String, SortOrder)>,
    page: usize,
    sync: Debouncer,
    hovered: Option<String>,
    mounted: bool,
}

impl RowsTable {
    pub fn new(config: TableConfig, timings: &Timings) -> Self {
        Self {
            config,
            columns: Vec::new(),
            rows: Vec::new(),
            search: String::new(),
            sort: None,
            page: 0,
            sync: Debouncer::from_millis(timings.table_sync_ms),
            hovered: None,
            mounted: false,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows after search and sorting, before paging.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        let size = self.config.page_size.max(1);
        self.rows.len().div_ceil(size).max(1)
    }

    pub fn sort(&self) -> Option<&(String, SortOrder)> {
        self.sort.as_ref()
    }

    fn sync_rows(&mut self, props: &ViewProps) {
        let mut rows = if self.search.is_empty() {
            props.rows_selected.to_vec()
        } else {
            apply_filter(&props.rows_selected, &Filter::search(self.search.as_str()))
        };
        if let Some((col, order)) = &self.sort {
            let numeric = props.params_def.get(col).map(|pd| pd.numeric).unwrap_or(false);
            rows.sort_by(|a, b| {
                let o = compare(a.get(col), b.get(col), numeric);
                match order {
                    SortOrder::Ascending => o,
                    SortOrder::Descending => o.reverse(),
                }
            });
        }
        self.rows = rows;
        self.page = self.page.min(self.page_count() - 1);
    }

    /// Rows of the current page.
    pub fn page_rows(&self) -> &[Row] {
        let size = self.config.page_size.max(1);
        let start = (self.page * size).min(self.rows.len());
        let end = (start + size).min(self.rows.len());
        &self.rows[start..end]
    }

    /// Cells of the current page.
    pub fn page_cells(&self, props: &ViewProps) -> Vec<Vec<Cell>> {
        project(self.page_rows(), &self.columns, &props.params_def, |row| props.row_color(row, 1.0))
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.min(self.page_count() - 1);
    }

    /// Sort by `col`; sorting again by the same column flips the order.
    pub fn sort_by(&mut self, col: &str, props: &ViewProps) {
        if col == SWATCH_COLUMN {
            return;
        }
        let order = match &self.sort {
            Some((c, SortOrder::Ascending)) if c == col => SortOrder::Descending,
            _ => SortOrder::Ascending,
        };
        self.sort = Some((col.to_string(), order));
        self.sync_rows(props);
    }

    pub fn set_search(&mut self, text: &str, props: &ViewProps) {
        if text != self.search {
            self.search = text.to_string();
            self.page = 0;
            self.sync_rows(props);
        }
    }

    /// Turn the search results into the selection, intersected with the
    /// current selection filter. A selection no filter describes (set by
    /// direct manipulation) stays filter-less.
    pub fn promote_search(&mut self, props: &ViewProps) -> Vec<ViewRequest> {
        if self.search.is_empty() {
            return Vec::new();
        }
        let search = Filter::search(self.search.as_str());
        let rows = apply_filter(&props.rows_selected, &search);
        let filter = match &props.selected_filter {
            Some(current) => Some(current.clone().and(search)),
            None if props.rows_selected.len() == props.rows_filtered.len() => Some(search),
            None => None,
        };
        crate::log_view_event!("table", "promote_search", rows = rows.len());
        self.search.clear();
        vec![ViewRequest::SetSelected { rows, filter }]
    }

    /// Highlight the row under the pointer, or clear with `None`.
    pub fn hover(&mut self, row: Option<&Row>) -> Vec<ViewRequest> {
        let uid = row.map(|r| r.uid.clone());
        if uid == self.hovered {
            return Vec::new();
        }
        self.hovered = uid;
        vec![ViewRequest::SetHighlighted(row.cloned().into_iter().collect())]
    }
}

impl View for RowsTable {
    fn name(&self) -> &'static str {
        "table"
    }

    fn on_mount(&mut self, props: &ViewProps, _now: Instant) -> Vec<ViewRequest> {
        self.mounted = true;
        self.columns = table_columns(&props.params_def);
        self.sync_rows(props);
        Vec::new()
    }

    fn on_props_changed(&mut self, props: &ViewProps, diff: &PropsDiff, now: Instant) -> Vec<ViewRequest> {
        if !self.mounted {
            return Vec::new();
        }
        if diff.experiment || diff.params {
            self.columns = table_columns(&props.params_def);
            if let Some((col, _)) = &self.sort {
                if !props.params_def.contains(col) {
                    self.sort = None;
                }
            }
        }
        if diff.experiment {
            self.sync.cancel();
            self.sync_rows(props);
        } else if diff.selected {
            self.sync.trigger(now);
        }
        Vec::new()
    }

    fn on_unmount(&mut self) {
        self.mounted = false;
        self.sync.cancel();
        self.rows.clear();
    }

    fn resize(&mut self, _width: f64, _height: f64, _now: Instant) {}

    fn tick(&mut self, props: &ViewProps, now: Instant) -> Vec<ViewRequest> {
        if self.mounted && self.sync.poll(now) {
            self.sync_rows(props);
        }
        Vec::new()
    }

    /// Drawn as a native grid, not a surface.
    fn surface(&self) -> Option<&Surface> {
        None
    }

    fn is_busy(&self) -> bool {
        self.sync.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::row;
    use crate::views::tests::props_for;
    use std::sync::Arc;
    use std::time::Duration;

    fn rows() -> Vec<Row> {
        (0..30)
            .map(|i| {
                let name = if i % 3 == 0 { "alpha" } else { "beta" };
                row(
                    &format!("r{}", i),
                    None,
                    &[("loss", Value::from(30.0 - i as f64)), ("name", Value::from(name))],
                )
            })
            .collect()
    }

    fn mounted(props: &ViewProps) -> RowsTable {
        let mut table = RowsTable::new(TableConfig { page_size: 10 }, &Timings::default());
        table.on_mount(props, Instant::now());
        table
    }

    #[test]
    fn test_columns_and_cells() {
        let props = props_for(rows());
        let table = mounted(&props);
        assert_eq!(&table.columns()[..2], &[SWATCH_COLUMN.to_string(), UID.to_string()]);
        assert!(!table.columns()[2..].iter().any(|c| c == UID));
        let cells = table.page_cells(&props);
        assert_eq!(cells.len(), 10);
        let loss = table.columns().iter().position(|c| c == "loss").unwrap();
        assert_eq!(cells[0][loss], Cell::Number(30.0));
        assert!(matches!(cells[0][0], Cell::Swatch(_)));
        assert_eq!(table.page_count(), 3);
    }

    #[test]
    fn test_sort_toggles_order() {
        let props = props_for(rows());
        let mut table = mounted(&props);
        table.sort_by("loss", &props);
        assert_eq!(table.rows()[0].uid, "r29");
        table.sort_by("loss", &props);
        assert_eq!(table.rows()[0].uid, "r0");
    }

    #[test]
    fn test_search_and_promotion() {
        let mut props = props_for(rows());
        let existing = Filter::range("loss", crate::model::ParamType::Numeric, 0.0, 20.0, false);
        props.rows_selected = Arc::new(apply_filter(&props.rows_all, &existing));
        props.selected_filter = Some(existing.clone());
        let mut table = mounted(&props);
        table.set_search("ALPHA", &props);
        let shown = table.rows().len();
        assert!(shown > 0 && shown < props.rows_selected.len());

        let reqs = table.promote_search(&props);
        let [ViewRequest::SetSelected { rows, filter: Some(filter) }] = reqs.as_slice() else {
            panic!("expected a selection");
        };
        assert_eq!(rows.len(), shown);
        assert_eq!(apply_filter(&props.rows_all, filter).len(), shown);
        assert!(matches!(filter, Filter::All(parts) if parts.len() == 2));
        assert!(table.search().is_empty());
    }

    #[test]
    fn test_promoting_unfiltered_subset_keeps_no_filter() {
        let mut props = props_for(rows());
        props.rows_selected = Arc::new(props.rows_all[..12].to_vec());
        props.selected_filter = None;
        let mut table = mounted(&props);
        table.set_search("alpha", &props);
        let reqs = table.promote_search(&props);
        let [ViewRequest::SetSelected { rows: picked, filter }] = reqs.as_slice() else {
            panic!("expected a selection");
        };
        // r0, r3, r6, r9
        assert_eq!(picked.len(), 4);
        assert!(filter.is_none());

        // Over the whole working set the search alone describes the result.
        let props = props_for(rows());
        let mut table = mounted(&props);
        table.set_search("alpha", &props);
        let reqs = table.promote_search(&props);
        let [ViewRequest::SetSelected { rows: picked, filter: Some(filter) }] = reqs.as_slice() else {
            panic!("expected a filtered selection");
        };
        assert_eq!(apply_filter(&props.rows_filtered, filter).len(), picked.len());
    }

    #[test]
    fn test_selection_sync_is_debounced() {
        let mut props = props_for(rows());
        let mut table = mounted(&props);
        let now = Instant::now();
        let diff = PropsDiff {
            selected: true,
            ..Default::default()
        };
        for (i, n) in [20, 10, 5].into_iter().enumerate() {
            props.rows_selected = Arc::new(props.rows_all[..n].to_vec());
            table.on_props_changed(&props, &diff, now + Duration::from_millis(10 * i as u64));
        }
        table.tick(&props, now + Duration::from_millis(100));
        assert_eq!(table.rows().len(), 30);
        table.tick(&props, now + Duration::from_millis(300));
        assert_eq!(table.rows().len(), 5);
    }

    #[test]
    fn test_hover_highlights_single_row() {
        let props = props_for(rows());
        let mut table = mounted(&props);
        let r = props.rows_all[3].clone();
        assert!(matches!(table.hover(Some(&r)).as_slice(), [ViewRequest::SetHighlighted(v)] if v.len() == 1));
        assert!(table.hover(Some(&r)).is_empty());
        assert!(matches!(table.hover(None).as_slice(), [ViewRequest::SetHighlighted(v)] if v.is_empty()));
    }
}
