//! Library error types

use thiserror::Error;

/// Failure while loading or parsing an experiment.
///
/// These are data errors: the orchestrator reports them and keeps the
/// previous experiment active.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Network error")]
    Network(#[source] reqwest::Error),

    #[error("Server returned status {0}")]
    HttpStatus(u16),

    #[error("{0}")]
    Provider(String),

    #[error("Experiment has no datapoints")]
    Empty,

    #[error("Load was cancelled")]
    Cancelled,
}

/// Failure reading or writing persisted view state.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("I/O error on state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid state file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for '{key}': {source}")]
    Value {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure writing a CSV export.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Delimiter '{0}' is not a single ASCII character")]
    InvalidDelimiter(char),
}
