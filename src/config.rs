//! Configuration loader - YAML view settings + .env environment

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration loaded from hyperview.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub parallel: ParallelConfig,
    pub xy: XyConfig,
    pub distribution: DistributionConfig,
    pub table: TableConfig,
    pub export: ExportConfig,
    pub timings: Timings,
    pub colors: ColorConfig,
    /// Cross-check selections against their filters and log mismatches.
    pub asserts: bool,
}

/// Parallel-coordinates display settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub order: Vec<String>,
    pub hide: Vec<String>,
    pub invert: Vec<String>,
    /// Categorical columns with more distinct values are not drawn
    #[serde(alias = "categoricalMaximumValues")]
    pub categorical_maximum_values: usize,
    pub height: f64,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            hide: Vec::new(),
            invert: Vec::new(),
            categorical_maximum_values: 80,
            height: 600.0,
        }
    }
}

/// XY scatter display settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XyConfig {
    pub axis_x: Option<String>,
    pub axis_y: Option<String>,
    pub lines_thickness: f64,
    /// Fixed opacity; derived from the plot area and row count when unset
    pub lines_opacity: Option<f64>,
    pub dots_thickness: f64,
    #[serde(alias = "dots_highlighed_thickness")]
    pub dots_highlighted_thickness: f64,
    pub dots_opacity: Option<f64>,
    pub height: f64,
}

impl Default for XyConfig {
    fn default() -> Self {
        Self {
            axis_x: None,
            axis_y: None,
            lines_thickness: 1.2,
            lines_opacity: None,
            dots_thickness: 1.4,
            dots_highlighted_thickness: 5.0,
            dots_opacity: None,
            height: 400.0,
        }
    }
}

/// Distribution plot settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub nbins: usize,
    #[serde(alias = "animateMs")]
    pub animate_ms: u64,
    pub axis: Option<String>,
    pub height: f64,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            nbins: 10,
            animate_ms: 750,
            axis: None,
            height: 300.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub page_size: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self { page_size: 25 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub delimiter: char,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Color map for numeric columns without their own (`turbo` when unset)
    pub colormap: Option<String>,
    pub colorby: Option<String>,
    /// Column weighting the header's selected percentage
    pub weight_column: Option<String>,
}

/// Debounce / throttle windows in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub selected_hook_ms: u64,
    pub filtered_hook_ms: u64,
    pub brush_extents_ms: u64,
    pub brush_throttle_ms: u64,
    pub parallel_resize_ms: u64,
    pub xy_resize_ms: u64,
    pub xy_redraw_throttle_ms: u64,
    pub distribution_resize_ms: u64,
    pub table_sync_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            selected_hook_ms: 200,
            filtered_hook_ms: 200,
            brush_extents_ms: 400,
            brush_throttle_ms: 75,
            parallel_resize_ms: 100,
            xy_resize_ms: 150,
            xy_redraw_throttle_ms: 100,
            distribution_resize_ms: 150,
            table_sync_ms: 150,
        }
    }
}

/// Environment settings loaded from .env
#[derive(Debug, Clone, Default)]
pub struct Env {
    pub data_dir: String,
    pub server: Option<String>,
    pub state_file: Option<PathBuf>,
    pub log_dir: String,
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load the file when it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            tracing::info!("Loading config from {}", path.display());
            Self::load(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Overlay per-view display data shipped with an experiment
    pub fn with_display_data(&self, experiment: &crate::model::Experiment) -> Config {
        let mut merged = self.clone();
        merge_display(&mut merged.parallel, experiment.display_data("parallel_plot"));
        merge_display(&mut merged.xy, experiment.display_data("xy_graph"));
        merge_display(&mut merged.distribution, experiment.display_data("distribution"));
        merged
    }
}

/// Replace fields of `target` with the ones present in `display`.
fn merge_display<T>(target: &mut T, display: Option<&serde_json::Value>)
where
    T: Serialize + serde::de::DeserializeOwned,
{
    let Some(serde_json::Value::Object(overrides)) = display else {
        return;
    };
    let mut base = match serde_json::to_value(&*target) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => return,
    };
    for (k, v) in overrides {
        base.insert(field_name(k), v.clone());
    }
    match serde_json::from_value(serde_json::Value::Object(base)) {
        Ok(merged) => *target = merged,
        Err(e) => tracing::warn!("Ignoring invalid display data: {}", e),
    }
}

/// Display data uses camelCase keys (`animateMs`) and one legacy typo.
fn field_name(key: &str) -> String {
    if key == "dots_highlighed_thickness" {
        return "dots_highlighted_thickness".to_string();
    }
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

impl Env {
    /// Load environment from .env file
    pub fn load() -> Self {
        dotenvy::dotenv().ok();

        Env {
            data_dir: std::env::var("HYPERVIEW_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            server: std::env::var("HYPERVIEW_SERVER").ok(),
            state_file: std::env::var("HYPERVIEW_STATE_FILE").ok().map(PathBuf::from),
            log_dir: std::env::var("HYPERVIEW_LOG_DIR").unwrap_or_else(|_| "./logs".to_string()),
        }
    }
}
