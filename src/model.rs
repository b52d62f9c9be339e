//! Row / column data model
//!
//! An [`Experiment`] is the unit loaded by a data provider. Once installed it
//! is turned into shared, read-only [`Row`]s: each row carries its own `uid`
//! and `from_uid` as ordinary columns so every consumer (filters, inference,
//! export) can treat them uniformly.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Column name holding the row identifier.
pub const UID: &str = "uid";
/// Column name holding the lineage pointer.
pub const FROM_UID: &str = "from_uid";

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Parse a raw CSV cell. Empty cells are missing values.
    pub fn from_csv_field(field: &str) -> Option<Value> {
        let field = field.trim();
        if field.is_empty() {
            return None;
        }
        match field {
            "inf" | "-inf" => return Some(Value::Text(field.to_string())),
            "nan" | "NaN" => return Some(Value::Number(f64::NAN)),
            _ => {}
        }
        match field.parse::<f64>() {
            Ok(n) if n.is_finite() => Some(Value::Number(n)),
            _ => Some(Value::Text(field.to_string())),
        }
    }

    /// Floating point reading of the value; NaN when it does not parse.
    pub fn parse_float(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Text(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
            Value::Null | Value::Bool(_) => f64::NAN,
        }
    }

    /// Numeric reading when the value parses to a number (including inf).
    pub fn as_f64(&self) -> Option<f64> {
        let v = self.parse_float();
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    /// `inf`, `-inf`, NaN and null: values a numeric axis shows in its
    /// outlier band instead of on the scale.
    pub fn is_special_numeric(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Number(n) => !n.is_finite(),
            Value::Text(s) => matches!(s.as_str(), "inf" | "-inf" | "Infinity" | "-Infinity"),
            Value::Bool(_) => false,
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True when the value is a number (or numeric text) and not special.
    pub fn looks_numeric(&self) -> bool {
        match self {
            Value::Number(n) => n.is_finite(),
            Value::Text(s) => s.trim().parse::<f64>().map(|n| n.is_finite()).unwrap_or(false),
            _ => false,
        }
    }

    /// Ordering used for categorical columns: numbers numerically, anything
    /// else by its display string.
    pub fn cmp_categorical(&self, other: &Value) -> std::cmp::Ordering {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            _ => self.to_string().cmp(&other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) if n.is_nan() => write!(f, "NaN"),
            Value::Number(n) if n.is_infinite() => {
                write!(f, "{}", if *n > 0.0 { "inf" } else { "-inf" })
            }
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// How a column is rendered on an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Categorical,
    Numeric,
    NumericLog,
    NumericPercentile,
    Timestamp,
}

impl ParamType {
    pub const ALL: [ParamType; 5] = [
        ParamType::Categorical,
        ParamType::Numeric,
        ParamType::NumericLog,
        ParamType::NumericPercentile,
        ParamType::Timestamp,
    ];

    /// Types that get an outlier band for special values.
    pub fn has_outlier_band(self) -> bool {
        matches!(
            self,
            ParamType::Numeric | ParamType::NumericLog | ParamType::NumericPercentile
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            ParamType::Categorical => "Categorical",
            ParamType::Numeric => "Number",
            ParamType::NumericLog => "Number (log-scale)",
            ParamType::NumericPercentile => "Number (percentile-scale)",
            ParamType::Timestamp => "Timestamp",
        }
    }
}

/// Column hint supplied with an experiment (`parameters_definition`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueDef {
    #[serde(default, rename = "type")]
    pub param_type: Option<ParamType>,
    #[serde(default)]
    pub colors: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub colormap: Option<String>,
    #[serde(default)]
    pub force_value_min: Option<f64>,
    #[serde(default)]
    pub force_value_max: Option<f64>,
}

/// One row of the experiment table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub uid: String,
    #[serde(default)]
    pub from_uid: Option<String>,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl Datapoint {
    pub fn new<I, K>(uid: impl Into<String>, from_uid: Option<&str>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            uid: uid.into(),
            from_uid: from_uid.map(str::to_string),
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Value of a column; `uid` and `from_uid` resolve to the identity fields.
    pub fn get(&self, col: &str) -> Option<&Value> {
        self.values.get(col)
    }

    /// Copy `uid` / `from_uid` into the value map so they behave as columns.
    fn with_identity_columns(mut self) -> Self {
        self.values.insert(UID.to_string(), Value::Text(self.uid.clone()));
        let parent = match &self.from_uid {
            Some(p) => Value::Text(p.clone()),
            None => Value::Null,
        };
        self.values.insert(FROM_UID.to_string(), parent);
        self
    }

    /// Text matched by free-text search: `uid`, `from_uid`, then every other
    /// value in column-name order, separated by two spaces.
    pub fn search_text(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.values.len() + 2);
        parts.push(self.uid.clone());
        parts.push(self.from_uid.clone().unwrap_or_default());
        for (k, v) in &self.values {
            if k == UID || k == FROM_UID {
                continue;
            }
            parts.push(v.to_string());
        }
        parts.join("  ")
    }
}

/// Shared, immutable row handle.
pub type Row = Arc<Datapoint>;

/// A loaded experiment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Experiment {
    pub datapoints: Vec<Datapoint>,
    #[serde(default)]
    pub parameters_definition: HashMap<String, ValueDef>,
    #[serde(default)]
    pub display_data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub colormap: Option<String>,
    #[serde(default)]
    pub colorby: Option<String>,
    /// Preferred column order (CSV header order); other columns follow.
    #[serde(default)]
    pub columns: Vec<String>,
}

impl Experiment {
    pub fn from_datapoints(datapoints: Vec<Datapoint>) -> Self {
        Self {
            datapoints,
            ..Default::default()
        }
    }

    /// Every column name: identity columns, the preferred order, then the
    /// rest alphabetically.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec![UID.to_string(), FROM_UID.to_string()];
        for c in &self.columns {
            if !names.contains(c) {
                names.push(c.clone());
            }
        }
        let mut rest: Vec<&String> = self
            .datapoints
            .iter()
            .flat_map(|dp| dp.values.keys())
            .filter(|k| !names.contains(k))
            .collect();
        rest.sort();
        rest.dedup();
        names.extend(rest.into_iter().cloned());
        names
    }

    /// Display data block for a view, if the experiment carries one.
    pub fn display_data(&self, view: &str) -> Option<&serde_json::Value> {
        self.display_data.get(view)
    }

    /// Turn the datapoints into shared rows with identity columns.
    pub fn to_rows(&self) -> Vec<Row> {
        self.datapoints
            .iter()
            .cloned()
            .map(|dp| Arc::new(dp.with_identity_columns()))
            .collect()
    }
}

/// O(1) `uid -> row` index shared by all views for one experiment generation.
#[derive(Debug, Clone, Default)]
pub struct DatapointLookup {
    by_uid: HashMap<String, Row>,
}

impl DatapointLookup {
    pub fn build(rows: &[Row]) -> Self {
        let mut by_uid = HashMap::with_capacity(rows.len());
        for row in rows {
            if by_uid.insert(row.uid.clone(), row.clone()).is_some() {
                tracing::warn!("Duplicate uid '{}' in experiment", row.uid);
            }
        }
        Self { by_uid }
    }

    pub fn get(&self, uid: &str) -> Option<&Row> {
        self.by_uid.get(uid)
    }

    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a row with identity columns, for tests across the crate.
    pub(crate) fn row(uid: &str, from_uid: Option<&str>, values: &[(&str, Value)]) -> Row {
        let dp = Datapoint::new(uid, from_uid, values.iter().map(|(k, v)| (*k, v.clone())));
        Arc::new(dp.with_identity_columns())
    }

    #[test]
    fn test_csv_field_parsing() {
        assert_eq!(Value::from_csv_field(""), None);
        assert_eq!(Value::from_csv_field("1.5"), Some(Value::Number(1.5)));
        assert_eq!(Value::from_csv_field("inf"), Some(Value::Text("inf".into())));
        assert_eq!(Value::from_csv_field("adam"), Some(Value::Text("adam".into())));
    }

    #[test]
    fn test_special_numerics() {
        assert!(Value::Null.is_special_numeric());
        assert!(Value::Number(f64::NAN).is_special_numeric());
        assert!(Value::Number(f64::NEG_INFINITY).is_special_numeric());
        assert!(Value::from("-inf").is_special_numeric());
        assert!(!Value::from("abc").is_special_numeric());
        assert!(!Value::Number(3.0).is_special_numeric());
    }

    #[test]
    fn test_display_keeps_precision() {
        assert_eq!(Value::Number(0.1).to_string(), "0.1");
        assert_eq!(Value::Number(1.0).to_string(), "1");
        assert_eq!(Value::Number(0.123456789012345).to_string(), "0.123456789012345");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn test_identity_columns_and_search_text() {
        let r = row("2", Some("1"), &[("opt", "adam".into()), ("lr", 0.1.into())]);
        assert_eq!(r.get(UID), Some(&Value::from("2")));
        assert_eq!(r.get(FROM_UID), Some(&Value::from("1")));
        // Values follow column names, not insertion order.
        assert_eq!(r.search_text(), "2  1  0.1  adam");

        let root = row("1", None, &[]);
        assert_eq!(root.get(FROM_UID), Some(&Value::Null));
        assert_eq!(root.search_text(), "1  ");
    }

    #[test]
    fn test_column_names_order() {
        let mut exp = Experiment::from_datapoints(vec![
            Datapoint::new("a", None, [("z", Value::from(1.0)), ("b", Value::from(2.0))]),
            Datapoint::new("b", None, [("c", Value::from(1.0))]),
        ]);
        exp.columns = vec!["z".into()];
        assert_eq!(exp.column_names(), vec!["uid", "from_uid", "z", "b", "c"]);
    }

    #[test]
    fn test_experiment_json() {
        let json = r#"{"datapoints":[{"uid":"1","from_uid":null,"values":{"lr":0.01,"opt":"sgd"}}]}"#;
        let exp: Experiment = serde_json::from_str(json).unwrap();
        assert_eq!(exp.datapoints.len(), 1);
        assert_eq!(exp.datapoints[0].values["lr"], Value::Number(0.01));
        let rows = exp.to_rows();
        let lookup = DatapointLookup::build(&rows);
        assert!(lookup.get("1").is_some());
        assert!(lookup.get("2").is_none());
    }
}
