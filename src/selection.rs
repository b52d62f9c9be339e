//! Selection and highlight coordinator
//!
//! Owns the authoritative row sets. `rows_filtered` is the working set
//! (all rows narrowed by Keep / Exclude), `rows_selected` the image of the
//! active filter over it, and `rows_highlighted` the transient hover seeds.

use crate::filter::{apply_filter, apply_filters, Filter};
use crate::model::Row;
use std::collections::HashSet;
use std::sync::Arc;

/// Header metrics derived from the row sets.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionStats {
    pub selected: usize,
    pub filtered: usize,
    pub total: usize,
    /// Selected share of the working set, 3 significant digits.
    pub percentage: String,
    /// Same share weighted by a column, when one is configured.
    pub weighted_percentage: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    rows_all: Arc<Vec<Row>>,
    rows_filtered: Arc<Vec<Row>>,
    rows_selected: Arc<Vec<Row>>,
    rows_highlighted: Arc<Vec<Row>>,
    selected_filter: Option<Filter>,
    filtered_filters: Vec<Filter>,
    filtered_generation: u64,
    selected_generation: u64,
    highlighted_generation: u64,
    asserts: bool,
}

fn uid_set(rows: &[Row]) -> HashSet<&str> {
    rows.iter().map(|r| r.uid.as_str()).collect()
}

fn same_rows(a: &[Row], b: &[Row]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y) || x.uid == y.uid)
}

impl Selection {
    /// Start a new experiment generation. Persisted working-set filters are
    /// re-applied unless they would leave no rows.
    pub fn new(rows_all: Vec<Row>, initial_filters: Vec<Filter>, asserts: bool) -> Self {
        let rows_all = Arc::new(rows_all);
        let mut filtered_filters = initial_filters;
        let mut rows_filtered = rows_all.clone();
        if !filtered_filters.is_empty() {
            let narrowed = apply_filters(&rows_all, &filtered_filters);
            if narrowed.is_empty() {
                tracing::warn!(
                    "Not reapplying {} saved filters (would filter out all rows)",
                    filtered_filters.len()
                );
                filtered_filters.clear();
            } else {
                tracing::info!(
                    "Reapplied {} saved filters: {} of {} rows kept",
                    filtered_filters.len(),
                    narrowed.len(),
                    rows_all.len()
                );
                rows_filtered = Arc::new(narrowed);
            }
        }
        Self {
            rows_selected: rows_filtered.clone(),
            rows_all,
            rows_filtered,
            rows_highlighted: Arc::default(),
            selected_filter: None,
            filtered_filters,
            filtered_generation: 1,
            selected_generation: 1,
            highlighted_generation: 1,
            asserts,
        }
    }

    pub fn rows_all(&self) -> &Arc<Vec<Row>> {
        &self.rows_all
    }

    pub fn rows_filtered(&self) -> &Arc<Vec<Row>> {
        &self.rows_filtered
    }

    pub fn rows_selected(&self) -> &Arc<Vec<Row>> {
        &self.rows_selected
    }

    pub fn rows_highlighted(&self) -> &Arc<Vec<Row>> {
        &self.rows_highlighted
    }

    pub fn selected_filter(&self) -> Option<&Filter> {
        self.selected_filter.as_ref()
    }

    /// Filters that turned all rows into the working set.
    pub fn filtered_filters(&self) -> &[Filter] {
        &self.filtered_filters
    }

    pub fn filtered_generation(&self) -> u64 {
        self.filtered_generation
    }

    pub fn selected_generation(&self) -> u64 {
        self.selected_generation
    }

    pub fn highlighted_generation(&self) -> u64 {
        self.highlighted_generation
    }

    /// Replace the selection. `filter` is what produced `rows`, or `None`
    /// for direct manipulation. Returns false when nothing changed.
    pub fn set_selected(&mut self, rows: Vec<Row>, filter: Option<Filter>) -> bool {
        if filter.is_some() && filter == self.selected_filter {
            return false;
        }
        if let (Some(f), true) = (&filter, self.asserts) {
            self.check_filter_matches(f, &rows);
        }
        tracing::debug!("Selection: {} of {} rows", rows.len(), self.rows_filtered.len());
        self.rows_selected = Arc::new(rows);
        self.selected_filter = filter;
        self.selected_generation += 1;
        true
    }

    fn check_filter_matches(&self, filter: &Filter, rows: &[Row]) {
        let expected = apply_filter(&self.rows_filtered, filter);
        let got = uid_set(rows);
        let mismatch = expected.len() != rows.len()
            || expected.iter().any(|r| !got.contains(r.uid.as_str()));
        if mismatch {
            crate::log_error!(
                format!("filter {} does not match the given rows", filter),
                given = rows.len(),
                computed = expected.len()
            );
        }
    }

    /// Returns false when the highlighted rows are unchanged.
    pub fn set_highlighted(&mut self, rows: Vec<Row>) -> bool {
        if same_rows(&rows, &self.rows_highlighted) {
            return false;
        }
        self.rows_highlighted = Arc::new(rows);
        self.highlighted_generation += 1;
        true
    }

    pub fn can_keep_or_exclude(&self) -> bool {
        !self.rows_selected.is_empty() && self.rows_selected.len() < self.rows_filtered.len()
    }

    pub fn can_restore(&self) -> bool {
        self.rows_filtered.len() != self.rows_all.len() || !self.filtered_filters.is_empty()
    }

    /// Narrow the working set to the selection.
    pub fn keep(&mut self) -> bool {
        if !self.can_keep_or_exclude() {
            return false;
        }
        let kept = self.rows_selected.clone();
        let filter = self.selected_filter.take();
        self.narrow(kept, filter)
    }

    /// Drop the selection from the working set.
    pub fn exclude(&mut self) -> bool {
        if !self.can_keep_or_exclude() {
            return false;
        }
        let selected = uid_set(&self.rows_selected);
        let remaining: Vec<Row> = self
            .rows_filtered
            .iter()
            .filter(|r| !selected.contains(r.uid.as_str()))
            .cloned()
            .collect();
        let filter = self.selected_filter.take().map(Filter::not);
        self.narrow(Arc::new(remaining), filter)
    }

    fn narrow(&mut self, rows: Arc<Vec<Row>>, filter: Option<Filter>) -> bool {
        match filter {
            Some(f) => self.filtered_filters.push(f),
            None => tracing::warn!(
                "Selection has no filter; the narrowed rows will not be restored on reload"
            ),
        }
        tracing::info!("Working set narrowed to {} rows", rows.len());
        self.rows_selected = rows.clone();
        self.rows_filtered = rows;
        self.selected_filter = None;
        self.filtered_generation += 1;
        self.selected_generation += 1;
        true
    }

    /// Reset the working set to every row.
    pub fn restore(&mut self) -> bool {
        if !self.can_restore() {
            return false;
        }
        tracing::info!("Working set restored to all {} rows", self.rows_all.len());
        self.rows_filtered = self.rows_all.clone();
        self.rows_selected = self.rows_all.clone();
        self.selected_filter = None;
        self.filtered_filters.clear();
        self.filtered_generation += 1;
        self.selected_generation += 1;
        true
    }

    pub fn stats(&self, weight_column: Option<&str>) -> SelectionStats {
        let selected = self.rows_selected.len();
        let filtered = self.rows_filtered.len();
        let weighted_percentage = weight_column.map(|col| {
            let weight = |r: &Row| {
                let w = r.get(col).map(|v| v.parse_float()).unwrap_or(f64::NAN);
                if w.is_finite() && w > 0.0 {
                    w
                } else {
                    1.0
                }
            };
            let total: f64 = self.rows_filtered.iter().map(weight).sum();
            let sel: f64 = self.rows_selected.iter().map(weight).sum();
            to_precision(100.0 * sel / total, 3)
        });
        SelectionStats {
            selected,
            filtered,
            total: self.rows_all.len(),
            percentage: to_precision(100.0 * selected as f64 / filtered as f64, 3),
            weighted_percentage,
        }
    }
}

/// Format with `digits` significant digits, switching to exponent notation
/// for very large or small magnitudes.
pub fn to_precision(x: f64, digits: usize) -> String {
    if !x.is_finite() {
        return if x.is_nan() {
            "NaN".to_string()
        } else if x > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };
    }
    let digits = digits.max(1);
    if x == 0.0 {
        return format!("{:.*}", digits - 1, 0.0);
    }
    let mut exp = x.abs().log10().floor() as i32;
    let scale = 10f64.powi(digits as i32 - 1 - exp);
    let rounded = (x * scale).round() / scale;
    if rounded != 0.0 {
        exp = rounded.abs().log10().floor() as i32;
    }
    if exp < -6 || exp >= digits as i32 {
        return format!("{:.*e}", digits - 1, rounded);
    }
    let decimals = (digits as i32 - 1 - exp).max(0) as usize;
    format!("{:.*}", decimals, rounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::row;
    use crate::model::Value;

    fn rows() -> Vec<Row> {
        (0..4)
            .map(|i| row(&i.to_string(), None, &[("x", Value::from(i as f64))]))
            .collect()
    }

    fn uids(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|r| r.uid.as_str()).collect()
    }

    fn x_at_least(min: f64) -> Filter {
        Filter::range("x", crate::model::ParamType::Numeric, min, 10.0, false)
    }

    #[test]
    fn test_equal_filter_is_noop() {
        let mut s = Selection::new(rows(), vec![], true);
        let f = x_at_least(2.0);
        let picked = apply_filter(s.rows_filtered(), &f);
        assert!(s.set_selected(picked.clone(), Some(f.clone())));
        let gen = s.selected_generation();
        assert!(!s.set_selected(picked, Some(f)));
        assert_eq!(s.selected_generation(), gen);
    }

    #[test]
    fn test_keep_then_restore() {
        let mut s = Selection::new(rows(), vec![], false);
        let f = x_at_least(2.0);
        let picked = apply_filter(s.rows_filtered(), &f);
        s.set_selected(picked, Some(f.clone()));
        assert!(s.can_keep_or_exclude());
        assert!(s.keep());
        assert_eq!(uids(s.rows_filtered()), vec!["2", "3"]);
        assert_eq!(s.filtered_filters(), &[f]);
        assert!(!s.can_keep_or_exclude());
        assert!(s.can_restore());

        assert!(s.restore());
        assert_eq!(s.rows_filtered().len(), 4);
        assert!(s.filtered_filters().is_empty());
        assert!(!s.can_restore());
    }

    #[test]
    fn test_exclude_records_negation() {
        let mut s = Selection::new(rows(), vec![], false);
        let f = x_at_least(3.0);
        let picked = apply_filter(s.rows_filtered(), &f);
        s.set_selected(picked, Some(f.clone()));
        assert!(s.exclude());
        assert_eq!(uids(s.rows_filtered()), vec!["0", "1", "2"]);
        assert_eq!(s.filtered_filters(), &[Filter::not(f)]);

        // Reloading with the saved filters reproduces the working set.
        let reloaded = Selection::new(rows(), s.filtered_filters().to_vec(), false);
        assert_eq!(uids(reloaded.rows_filtered()), vec!["0", "1", "2"]);
    }

    #[test]
    fn test_saved_filters_skipped_when_empty() {
        let s = Selection::new(rows(), vec![x_at_least(100.0)], false);
        assert_eq!(s.rows_filtered().len(), 4);
        assert!(s.filtered_filters().is_empty());
    }

    #[test]
    fn test_highlight_change_detection() {
        let all = rows();
        let mut s = Selection::new(all.clone(), vec![], false);
        assert!(s.set_highlighted(vec![all[1].clone()]));
        assert!(!s.set_highlighted(vec![all[1].clone()]));
        assert!(s.set_highlighted(vec![]));
    }

    #[test]
    fn test_stats() {
        let all = rows();
        let mut s = Selection::new(all.clone(), vec![], false);
        s.set_selected(all[..1].to_vec(), None);
        let stats = s.stats(None);
        assert_eq!((stats.selected, stats.filtered, stats.total), (1, 4, 4));
        assert_eq!(stats.percentage, "25.0");
        // Weights 0 and negatives count as 1: x=0 -> 1, total 1+1+2+3.
        assert_eq!(s.stats(Some("x")).weighted_percentage.as_deref(), Some("14.3"));
    }

    #[test]
    fn test_to_precision() {
        assert_eq!(to_precision(100.0, 3), "100");
        assert_eq!(to_precision(33.3333, 3), "33.3");
        assert_eq!(to_precision(5.0, 3), "5.00");
        assert_eq!(to_precision(99.99, 3), "100");
        assert_eq!(to_precision(0.0, 3), "0.00");
        assert_eq!(to_precision(0.012345, 3), "0.0123");
        assert_eq!(to_precision(f64::NAN, 3), "NaN");
    }
}
