//! Lineage traversal for linked highlighting
//!
//! Rows point to their parent through `from_uid`. Highlighting a row can
//! extend to all its ancestors (parent mode) or all its descendants
//! (children mode).

use crate::model::{DatapointLookup, Row};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightMode {
    #[default]
    Parent,
    Children,
}

impl HighlightMode {
    pub fn label(self) -> &'static str {
        match self {
            HighlightMode::Parent => "Show parents",
            HighlightMode::Children => "Show children",
        }
    }
}

/// Reverse of the `from_uid` edges over a row set.
#[derive(Debug, Clone, Default)]
pub struct ChildrenIndex {
    children: HashMap<String, Vec<Row>>,
}

impl ChildrenIndex {
    pub fn build(rows: &[Row]) -> Self {
        let mut children: HashMap<String, Vec<Row>> = HashMap::new();
        for row in rows {
            if let Some(parent) = &row.from_uid {
                children.entry(parent.clone()).or_default().push(row.clone());
            }
        }
        Self { children }
    }

    pub fn children(&self, uid: &str) -> &[Row] {
        self.children.get(uid).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Closure computation with a children index cached per filtered generation.
#[derive(Debug, Default)]
pub struct Lineage {
    lookup: Arc<DatapointLookup>,
    children: Option<(u64, ChildrenIndex)>,
}

impl Lineage {
    pub fn new(lookup: Arc<DatapointLookup>) -> Self {
        Self {
            lookup,
            children: None,
        }
    }

    fn children_index(&mut self, rows_filtered: &[Row], generation: u64) -> &ChildrenIndex {
        let stale = !matches!(&self.children, Some((g, _)) if *g == generation);
        if stale {
            tracing::debug!("Rebuilding children index over {} rows", rows_filtered.len());
            self.children = None;
        }
        &self
            .children
            .get_or_insert_with(|| (generation, ChildrenIndex::build(rows_filtered)))
            .1
    }

    /// Every row reachable from `seeds` in `mode`, seeds included, in
    /// breadth-first order. Cycles and dangling parents are tolerated.
    pub fn closure(
        &mut self,
        seeds: &[Row],
        mode: HighlightMode,
        rows_filtered: &[Row],
        filtered_generation: u64,
    ) -> Vec<Row> {
        if seeds.is_empty() {
            return Vec::new();
        }
        let lookup = self.lookup.clone();
        let index = match mode {
            HighlightMode::Children => Some(self.children_index(rows_filtered, filtered_generation)),
            HighlightMode::Parent => None,
        };

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<Row> = seeds.iter().cloned().collect();
        let mut out = Vec::new();
        while let Some(row) = queue.pop_front() {
            if !visited.insert(row.uid.clone()) {
                continue;
            }
            match &index {
                Some(index) => queue.extend(index.children(&row.uid).iter().cloned()),
                None => {
                    if let Some(parent_uid) = &row.from_uid {
                        match lookup.get(parent_uid) {
                            Some(parent) => queue.push_back(parent.clone()),
                            None => tracing::warn!(
                                "Parent '{}' of '{}' not found, lineage stops here",
                                parent_uid,
                                row.uid
                            ),
                        }
                    }
                }
            }
            out.push(row);
        }
        out
    }
}
