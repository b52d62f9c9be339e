//! Filter algebra
//!
//! Filters are immutable values serialised as `{"type": ..., "data": ...}`.
//! They are compiled to a [`Predicate`] once and then applied over rows,
//! keeping the input order.

use crate::model::{ParamType, Row, Value};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Interval test on one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter {
    pub col: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub min: Value,
    pub max: Value,
    /// Let NaN / infinite values through even though they are out of range.
    #[serde(default)]
    pub include_infnans: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Filter {
    /// Conjunction; empty matches everything.
    All(Vec<Filter>),
    Range(RangeFilter),
    Not(Box<Filter>),
    /// Case-insensitive literal search over a row's values.
    Search(String),
    /// Matches nothing.
    None,
}

impl Filter {
    pub fn range(
        col: impl Into<String>,
        param_type: ParamType,
        min: impl Into<Value>,
        max: impl Into<Value>,
        include_infnans: bool,
    ) -> Self {
        Filter::Range(RangeFilter {
            col: col.into(),
            param_type,
            min: min.into(),
            max: max.into(),
            include_infnans,
        })
    }

    pub fn search(text: impl Into<String>) -> Self {
        Filter::Search(text.into())
    }

    pub fn not(inner: Filter) -> Self {
        Filter::Not(Box::new(inner))
    }

    /// Disjunction expressed with the closed algebra: `Not(All(Not(f)...))`.
    pub fn any_of(filters: Vec<Filter>) -> Self {
        Filter::not(Filter::All(filters.into_iter().map(Filter::not).collect()))
    }

    /// Intersect with another filter, flattening nested conjunctions.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All(mut a), Filter::All(b)) => {
                a.extend(b);
                Filter::All(a)
            }
            (Filter::All(mut a), f) => {
                a.push(f);
                Filter::All(a)
            }
            (f, g) => Filter::All(vec![f, g]),
        }
    }

    pub fn compile(&self) -> Predicate {
        Predicate {
            node: Node::compile(self),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All(inner) if inner.is_empty() => write!(f, "everything"),
            Filter::All(inner) => {
                let parts: Vec<String> = inner.iter().map(|i| i.to_string()).collect();
                write!(f, "({})", parts.join(" and "))
            }
            Filter::Range(r) if r.include_infnans => {
                write!(f, "{} in [{}, {}] or inf/nan", r.col, r.min, r.max)
            }
            Filter::Range(r) => write!(f, "{} in [{}, {}]", r.col, r.min, r.max),
            Filter::Not(inner) => write!(f, "not {}", inner),
            Filter::Search(s) => write!(f, "contains \"{}\"", s),
            Filter::None => write!(f, "nothing"),
        }
    }
}

/// Compiled form of a [`Filter`].
#[derive(Debug, Clone)]
pub struct Predicate {
    node: Node,
}

impl Predicate {
    pub fn matches(&self, row: &Row) -> bool {
        self.node.matches(row)
    }
}

#[derive(Debug, Clone)]
enum Node {
    All(Vec<Node>),
    Not(Box<Node>),
    Never,
    Search(Regex),
    Contains(String),
    Categorical {
        col: String,
        min: Value,
        max: Value,
    },
    Numeric {
        col: String,
        min: f64,
        max: f64,
        include_infnans: bool,
    },
}

impl Node {
    fn compile(filter: &Filter) -> Node {
        match filter {
            Filter::All(inner) => Node::All(inner.iter().map(Node::compile).collect()),
            Filter::Not(inner) => Node::Not(Box::new(Node::compile(inner))),
            Filter::None => Node::Never,
            Filter::Search(text) => {
                match RegexBuilder::new(&regex::escape(text))
                    .case_insensitive(true)
                    .build()
                {
                    Ok(re) => Node::Search(re),
                    Err(e) => {
                        tracing::warn!("Search pattern rejected ({}), using plain match", e);
                        Node::Contains(text.to_lowercase())
                    }
                }
            }
            Filter::Range(r) if r.param_type == ParamType::Categorical => Node::Categorical {
                col: r.col.clone(),
                min: r.min.clone(),
                max: r.max.clone(),
            },
            Filter::Range(r) => Node::Numeric {
                col: r.col.clone(),
                min: r.min.parse_float(),
                max: r.max.parse_float(),
                include_infnans: r.include_infnans,
            },
        }
    }

    fn matches(&self, row: &Row) -> bool {
        match self {
            Node::All(inner) => inner.iter().all(|n| n.matches(row)),
            Node::Not(inner) => !inner.matches(row),
            Node::Never => false,
            Node::Search(re) => re.is_match(&row.search_text()),
            Node::Contains(text) => row.search_text().to_lowercase().contains(text),
            Node::Categorical { col, min, max } => match row.get(col) {
                Some(v) => {
                    v.cmp_categorical(min) != std::cmp::Ordering::Less
                        && v.cmp_categorical(max) != std::cmp::Ordering::Greater
                }
                None => false,
            },
            Node::Numeric {
                col,
                min,
                max,
                include_infnans,
            } => match row.get(col) {
                Some(v) => {
                    let x = v.parse_float();
                    if *min <= x && x <= *max {
                        return true;
                    }
                    *include_infnans && !x.is_finite()
                }
                None => false,
            },
        }
    }
}

/// Ordered subsequence of `rows` matching `filter`.
pub fn apply_filter(rows: &[Row], filter: &Filter) -> Vec<Row> {
    let predicate = filter.compile();
    rows.iter().filter(|r| predicate.matches(r)).cloned().collect()
}

/// Fold [`apply_filter`] left to right.
pub fn apply_filters(rows: &[Row], filters: &[Filter]) -> Vec<Row> {
    let mut out = rows.to_vec();
    for f in filters {
        out = apply_filter(&out, f);
    }
    out
}
