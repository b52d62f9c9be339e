//! Column type inference
//!
//! Derives a [`ParamDef`] for every column of a row set: whether it is
//! numeric, optional, its distinct and special values, and the axis type it
//! should be drawn with.

use crate::model::{Experiment, ParamType, Row, Value, ValueDef, FROM_UID, UID};
use crate::persist::StateScope;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Inferred metadata for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDef {
    pub name: String,
    pub optional: bool,
    pub numeric: bool,
    /// Sorted: numerically for numeric columns, as text otherwise.
    pub distinct_values: Vec<Value>,
    /// `inf`, `-inf`, NaN, null seen in the column.
    pub special_values: Vec<Value>,
    pub type_options: Vec<ParamType>,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub colors: Option<BTreeMap<String, String>>,
    pub colormap: Option<String>,
    pub force_value_min: Option<f64>,
    pub force_value_max: Option<f64>,
}

impl ParamDef {
    /// Distinct values as floats (numeric columns only).
    pub fn numeric_values(&self) -> Vec<f64> {
        self.distinct_values
            .iter()
            .filter_map(Value::as_f64)
            .collect()
    }

    /// Numeric domain, honouring forced bounds.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let values = self.numeric_values();
        let min = self.force_value_min.or_else(|| values.first().copied())?;
        let max = self.force_value_max.or_else(|| values.last().copied())?;
        Some((min, max))
    }

    pub fn is_categorical(&self) -> bool {
        self.param_type == ParamType::Categorical
    }

    /// Number of values an axis would show, specials included.
    pub fn value_count(&self) -> usize {
        self.distinct_values.len() + self.special_values.len()
    }
}

/// Column definitions in display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamDefMap {
    order: Vec<String>,
    defs: HashMap<String, ParamDef>,
}

impl ParamDefMap {
    pub fn get(&self, name: &str) -> Option<&ParamDef> {
        self.defs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamDef> {
        self.order.iter().filter_map(|n| self.defs.get(n))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn insert(&mut self, def: ParamDef) {
        if !self.defs.contains_key(&def.name) {
            self.order.push(def.name.clone());
        }
        self.defs.insert(def.name.clone(), def);
    }

    /// Change the axis type of a column. Returns false for unknown columns
    /// or types the column cannot be drawn as.
    pub fn set_type(&mut self, name: &str, param_type: ParamType) -> bool {
        match self.defs.get_mut(name) {
            Some(def) if def.type_options.contains(&param_type) => {
                def.param_type = param_type;
                true
            }
            _ => false,
        }
    }
}

#[derive(Default)]
struct ColumnStats {
    optional: bool,
    numeric: bool,
    can_be_timestamp: bool,
    values: Vec<Value>,
    special_values: Vec<Value>,
}

impl ColumnStats {
    fn new(name: &str) -> Self {
        let numeric = name != UID && name != FROM_UID;
        Self {
            numeric,
            can_be_timestamp: numeric,
            ..Default::default()
        }
    }

    fn add(&mut self, v: Option<&Value>) {
        let v = match v {
            Some(v) => v,
            None => {
                self.optional = true;
                return;
            }
        };
        let special = v.is_special_numeric();
        if special {
            if !self
                .special_values
                .iter()
                .any(|s| s.to_string() == v.to_string())
            {
                self.special_values.push(v.clone());
            }
        } else {
            self.values.push(v.clone());
        }
        if (!special && !v.looks_numeric()) || v.is_bool() {
            self.numeric = false;
            self.can_be_timestamp = false;
        }
        let safe_non_negative_int = match v {
            Value::Number(n) => n.fract() == 0.0 && *n >= 0.0 && *n <= 9_007_199_254_740_991.0,
            _ => false,
        };
        if !safe_non_negative_int {
            self.can_be_timestamp = false;
        }
    }
}

fn distinct_numeric(values: &[Value]) -> Vec<Value> {
    let mut nums: Vec<f64> = values.iter().map(Value::parse_float).collect();
    nums.sort_by(|a, b| a.total_cmp(b));
    nums.dedup_by(|a, b| a == b);
    nums.into_iter().map(Value::Number).collect()
}

fn distinct_text(values: &[Value]) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut out: Vec<Value> = values
        .iter()
        .filter(|v| seen.insert(format!("{:?}", v)))
        .cloned()
        .collect();
    out.sort_by_key(|v| v.to_string());
    out
}

/// A log axis fits when the 95th percentile is 100x the 5th.
fn wants_log_scale(values: &[Value], min_distinct: f64) -> bool {
    if values.len() <= 10 || min_distinct <= 0.0 {
        return false;
    }
    let mut sorted: Vec<f64> = values.iter().map(Value::parse_float).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let top5pct = sorted[(19 * n / 20).min(n - 1)];
    let bot5pct = sorted[n / 20];
    top5pct / bot5pct > 100.0
}

fn infer_column(name: &str, rows: &[Row], hint: Option<&ValueDef>, state: &StateScope) -> ParamDef {
    let mut stats = ColumnStats::new(name);
    for row in rows {
        stats.add(row.get(name));
    }
    if let Some(max) = hint.and_then(|h| h.force_value_max) {
        stats.add(Some(&Value::Number(max)));
    }
    if let Some(min) = hint.and_then(|h| h.force_value_min) {
        stats.add(Some(&Value::Number(min)));
    }

    let distinct_values = if stats.numeric {
        distinct_numeric(&stats.values)
    } else {
        distinct_text(&stats.values)
    };
    let min_distinct = distinct_values.first().map(Value::parse_float);
    let logscale = stats.numeric && wants_log_scale(&stats.values, min_distinct.unwrap_or(0.0));

    let n_values = stats.values.len().max(10) as f64;
    let n_distinct = distinct_values.len();
    let categorical = !stats.numeric || (n_values / n_distinct as f64 > 10.0 && n_distinct < 6);

    let mut param_type = ParamType::Categorical;
    if stats.numeric && !categorical {
        param_type = ParamType::Numeric;
        if logscale {
            param_type = if min_distinct.unwrap_or(0.0) > 0.0 {
                ParamType::NumericLog
            } else {
                ParamType::NumericPercentile
            };
        }
    }
    param_type = match hint.and_then(|h| h.param_type) {
        Some(forced) => forced,
        None => state.children(name).get("type").unwrap_or(param_type),
    };

    let mut type_options = vec![ParamType::Categorical];
    if stats.numeric {
        type_options.push(ParamType::Numeric);
        if min_distinct.map(|m| m > 0.0).unwrap_or(false) {
            type_options.push(ParamType::NumericLog);
        }
        type_options.push(ParamType::NumericPercentile);
        if stats.can_be_timestamp {
            type_options.push(ParamType::Timestamp);
        }
    }

    ParamDef {
        name: name.to_string(),
        optional: stats.optional,
        numeric: stats.numeric,
        distinct_values,
        special_values: stats.special_values,
        type_options,
        param_type,
        colors: hint.and_then(|h| h.colors.clone()),
        colormap: hint.and_then(|h| h.colormap.clone()),
        force_value_min: hint.and_then(|h| h.force_value_min),
        force_value_max: hint.and_then(|h| h.force_value_max),
    }
}

/// Infer every column present in `rows`, in `preferred_order` first.
pub fn infer_types(
    state: &StateScope,
    rows: &[Row],
    hints: &HashMap<String, ValueDef>,
    preferred_order: &[String],
) -> ParamDefMap {
    let mut present: HashSet<&str> = HashSet::new();
    for row in rows {
        present.extend(row.values.keys().map(String::as_str));
    }
    let mut names: Vec<String> = preferred_order
        .iter()
        .filter(|n| present.contains(n.as_str()))
        .cloned()
        .collect();
    let mut extra: Vec<String> = present
        .iter()
        .filter(|n| !preferred_order.iter().any(|p| p == *n))
        .map(|n| n.to_string())
        .collect();
    extra.sort();
    names.extend(extra);

    let mut map = ParamDefMap::default();
    for name in names {
        map.insert(infer_column(&name, rows, hints.get(&name), state));
    }
    tracing::debug!("Inferred {} columns over {} rows", map.len(), rows.len());
    map
}

/// Store numeric columns as numbers so filters and scales never re-parse text.
pub fn normalize_numeric_columns(experiment: &mut Experiment, defs: &ParamDefMap) {
    let numeric: Vec<&str> = defs
        .iter()
        .filter(|d| d.numeric)
        .map(|d| d.name.as_str())
        .collect();
    for dp in &mut experiment.datapoints {
        for col in &numeric {
            if let Some(v) = dp.values.get_mut(*col) {
                if matches!(v, Value::Text(_)) && !v.is_special_numeric() {
                    *v = Value::Number(v.parse_float());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::row;

    fn infer(rows: &[Row]) -> ParamDefMap {
        infer_types(&StateScope::in_memory(), rows, &HashMap::new(), &[])
    }

    fn column(name: &str, values: Vec<Value>) -> Vec<Row> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| row(&i.to_string(), None, &[(name, v)]))
            .collect()
    }

    #[test]
    fn test_identity_columns_never_numeric() {
        let rows = column("x", vec![1.0.into(), 2.0.into()]);
        let defs = infer(&rows);
        assert!(!defs.get(UID).unwrap().numeric);
        assert!(!defs.get(FROM_UID).unwrap().numeric);
        assert!(defs.get(FROM_UID).unwrap().is_categorical());
    }

    #[test]
    fn test_numeric_column() {
        let rows = column("lr", (0..20).map(|i| Value::Number(i as f64 * 0.5)).collect());
        let def = infer(&rows).get("lr").cloned().unwrap();
        assert!(def.numeric);
        assert_eq!(def.param_type, ParamType::Numeric);
        assert_eq!(def.distinct_values.len(), 20);
        assert_eq!(def.value_range(), Some((0.0, 9.5)));
        // Zero rules out log, half steps rule out timestamps.
        assert_eq!(
            def.type_options,
            vec![ParamType::Categorical, ParamType::Numeric, ParamType::NumericPercentile]
        );
    }

    #[test]
    fn test_few_distinct_numbers_are_categorical() {
        let rows = column("bs", (0..60).map(|i| Value::Number((i % 3) as f64 * 32.0)).collect());
        let def = infer(&rows).get("bs").cloned().unwrap();
        assert!(def.numeric);
        assert_eq!(def.param_type, ParamType::Categorical);
        assert!(def.type_options.contains(&ParamType::Timestamp));
    }

    #[test]
    fn test_log_scale_detection() {
        let rows = column(
            "lr",
            (0..40).map(|i| Value::Number(10f64.powf(-6.0 + i as f64 * 0.15))).collect(),
        );
        let def = infer(&rows).get("lr").cloned().unwrap();
        assert_eq!(def.param_type, ParamType::NumericLog);
        assert!(def.type_options.contains(&ParamType::NumericLog));
    }

    #[test]
    fn test_text_and_specials() {
        let rows = column(
            "loss",
            vec![
                "0.5".into(),
                Value::Number(0.25),
                "inf".into(),
                Value::Null,
                Value::Number(f64::NAN),
                "inf".into(),
            ],
        );
        let def = infer(&rows).get("loss").cloned().unwrap();
        assert!(def.numeric);
        assert_eq!(def.distinct_values, vec![Value::Number(0.25), Value::Number(0.5)]);
        assert_eq!(def.special_values.len(), 3);

        let opt = column("opt", vec!["sgd".into(), "adam".into(), "sgd".into()]);
        let def = infer(&opt).get("opt").cloned().unwrap();
        assert!(!def.numeric);
        assert_eq!(def.distinct_values, vec![Value::from("adam"), Value::from("sgd")]);
        assert_eq!(def.type_options, vec![ParamType::Categorical]);
    }

    #[test]
    fn test_optional_and_bool() {
        let rows = vec![
            row("1", None, &[("flag", true.into())]),
            row("2", None, &[]),
        ];
        let def = infer(&rows).get("flag").cloned().unwrap();
        assert!(def.optional);
        assert!(!def.numeric);
    }

    #[test]
    fn test_hint_and_persisted_type() {
        let rows = column("lr", (1..30).map(|i| Value::Number(i as f64)).collect());
        let state = StateScope::in_memory();
        state.children("lr").set("type", &ParamType::NumericPercentile);
        let defs = infer_types(&state, &rows, &HashMap::new(), &[]);
        assert_eq!(defs.get("lr").unwrap().param_type, ParamType::NumericPercentile);

        let mut hints = HashMap::new();
        hints.insert(
            "lr".to_string(),
            ValueDef {
                param_type: Some(ParamType::Categorical),
                force_value_max: Some(100.0),
                ..Default::default()
            },
        );
        let defs = infer_types(&state, &rows, &hints, &[]);
        let def = defs.get("lr").unwrap();
        assert_eq!(def.param_type, ParamType::Categorical);
        assert_eq!(def.value_range(), Some((1.0, 100.0)));
    }

    #[test]
    fn test_order_and_set_type() {
        let rows = vec![row("1", None, &[("b", 1.0.into()), ("a", 2.0.into())])];
        let mut defs = infer_types(
            &StateScope::in_memory(),
            &rows,
            &HashMap::new(),
            &["uid".to_string(), "b".to_string(), "missing".to_string()],
        );
        assert_eq!(defs.names(), &["uid", "b", "a", "from_uid"]);
        assert!(defs.set_type("a", ParamType::Numeric));
        assert!(!defs.set_type("uid", ParamType::Numeric));
    }

    #[test]
    fn test_normalize_numeric_columns() {
        let mut exp = Experiment::from_datapoints(vec![crate::model::Datapoint::new(
            "1",
            None,
            [("lr", Value::from("0.5")), ("loss", Value::from("inf"))],
        )]);
        let defs = infer(&exp.to_rows());
        normalize_numeric_columns(&mut exp, &defs);
        assert_eq!(exp.datapoints[0].values["lr"], Value::Number(0.5));
        assert_eq!(exp.datapoints[0].values["loss"], Value::from("inf"));
    }
}
