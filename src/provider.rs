//! Data providers - where experiments come from
//!
//! Providers:
//! - Static: an experiment already in memory
//! - CSV file: one datapoint per line, `uid` / `from_uid` columns optional
//! - JSON file: a serialized experiment
//! - Webserver: `GET <server>/data?uri=<uri>` answering `{experiment}` or `{error}`
//!
//! Loads run on the tokio runtime. A [`LoadTask`] hands the result back to
//! the UI thread, which polls it; aborting the task drops the result.

use crate::error::LoadError;
use crate::model::{Datapoint, Experiment, Value, FROM_UID, UID};
use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::oneshot;

pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<Experiment, LoadError>> + Send + 'a>>;

pub trait DataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn load<'a>(&'a self, uri: &'a str) -> LoadFuture<'a>;
}

/// Serves a fixed experiment, whatever the uri.
pub struct StaticProvider {
    experiment: Experiment,
}

impl StaticProvider {
    pub fn new(experiment: Experiment) -> Self {
        Self { experiment }
    }
}

impl DataProvider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    fn load<'a>(&'a self, _uri: &'a str) -> LoadFuture<'a> {
        Box::pin(async move { Ok(self.experiment.clone()) })
    }
}

/// Parse CSV text into an experiment. Rows without a `uid` use their line
/// index; empty cells are missing values.
pub fn parse_csv(text: &str, delimiter: u8) -> Result<Experiment, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let uid_idx = headers.iter().position(|h| h == UID);
    let from_idx = headers.iter().position(|h| h == FROM_UID);

    let mut datapoints = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };
        let uid = field(uid_idx).map(str::to_string).unwrap_or_else(|| line.to_string());
        let from_uid = field(from_idx);
        let values: Vec<(String, Value)> = headers
            .iter()
            .zip(record.iter())
            .filter(|(h, _)| h.as_str() != UID && h.as_str() != FROM_UID)
            .filter_map(|(h, cell)| Value::from_csv_field(cell).map(|v| (h.clone(), v)))
            .collect();
        datapoints.push(Datapoint::new(uid, from_uid, values));
    }
    if datapoints.is_empty() {
        return Err(LoadError::Empty);
    }
    tracing::info!("Parsed {} datapoints with {} columns", datapoints.len(), headers.len());
    let mut experiment = Experiment::from_datapoints(datapoints);
    experiment.columns = headers;
    Ok(experiment)
}

/// Loads `<data_dir>/<uri>` (or an absolute path) as CSV.
pub struct CsvFileProvider {
    data_dir: PathBuf,
    delimiter: u8,
}

impl CsvFileProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

fn resolve(data_dir: &std::path::Path, uri: &str) -> PathBuf {
    let path = PathBuf::from(uri);
    if path.is_absolute() || path.exists() {
        path
    } else {
        data_dir.join(path)
    }
}

impl DataProvider for CsvFileProvider {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn load<'a>(&'a self, uri: &'a str) -> LoadFuture<'a> {
        Box::pin(async move {
            let path = resolve(&self.data_dir, uri);
            tracing::info!("Reading CSV from {:?}", path);
            let text = tokio::fs::read_to_string(&path).await?;
            parse_csv(&text, self.delimiter)
        })
    }
}

/// Loads a serialized [`Experiment`].
pub struct JsonFileProvider {
    data_dir: PathBuf,
}

impl JsonFileProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

impl DataProvider for JsonFileProvider {
    fn name(&self) -> &'static str {
        "json"
    }

    fn load<'a>(&'a self, uri: &'a str) -> LoadFuture<'a> {
        Box::pin(async move {
            let path = resolve(&self.data_dir, uri);
            tracing::info!("Reading experiment from {:?}", path);
            let text = tokio::fs::read_to_string(&path).await?;
            let experiment: Experiment = serde_json::from_str(&text)?;
            if experiment.datapoints.is_empty() {
                return Err(LoadError::Empty);
            }
            Ok(experiment)
        })
    }
}

#[derive(Deserialize)]
struct ServerReply {
    #[serde(default)]
    experiment: Option<Experiment>,
    #[serde(default)]
    error: Option<String>,
}

/// Asks a HiPlot-compatible server to load `uri`.
pub struct WebserverProvider {
    server: String,
    client: reqwest::Client,
}

impl WebserverProvider {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn data_url(&self, uri: &str) -> String {
        format!("{}/data?uri={}", self.server, urlencoding::encode(uri))
    }
}

impl DataProvider for WebserverProvider {
    fn name(&self) -> &'static str {
        "webserver"
    }

    fn load<'a>(&'a self, uri: &'a str) -> LoadFuture<'a> {
        Box::pin(async move {
            let url = self.data_url(uri);
            tracing::debug!("Fetching from: {}", url);

            let response = self
                .client
                .get(&url)
                .header("User-Agent", "hyperview/0.1")
                .send()
                .await
                .map_err(LoadError::Network)?;
            if !response.status().is_success() {
                return Err(LoadError::HttpStatus(response.status().as_u16()));
            }
            let reply: ServerReply = response.json().await.map_err(LoadError::Network)?;
            match (reply.experiment, reply.error) {
                (_, Some(error)) => Err(LoadError::Provider(error)),
                (Some(experiment), None) => {
                    tracing::info!("Server returned {} datapoints", experiment.datapoints.len());
                    Ok(experiment)
                }
                (None, None) => Err(LoadError::Provider("Server reply has no experiment".to_string())),
            }
        })
    }
}

/// Pick a provider for `uri`: local `.csv` / `.json` files, else the
/// configured server.
pub fn provider_for(uri: &str, data_dir: &str, server: Option<&str>) -> Result<Arc<dyn DataProvider>, LoadError> {
    let lower = uri.to_ascii_lowercase();
    if lower.ends_with(".csv") {
        return Ok(Arc::new(CsvFileProvider::new(data_dir)));
    }
    if lower.ends_with(".json") {
        return Ok(Arc::new(JsonFileProvider::new(data_dir)));
    }
    match server {
        Some(server) => Ok(Arc::new(WebserverProvider::new(server))),
        None => Err(LoadError::Provider(format!(
            "Don't know how to load '{}' (no server configured)",
            uri
        ))),
    }
}

/// An in-flight load, polled from the UI thread.
pub struct LoadTask {
    id: u64,
    uri: String,
    handle: tokio::task::JoinHandle<()>,
    rx: oneshot::Receiver<Result<Experiment, LoadError>>,
}

impl LoadTask {
    pub fn spawn(runtime: &tokio::runtime::Handle, provider: Arc<dyn DataProvider>, uri: String, id: u64) -> Self {
        let (tx, rx) = oneshot::channel();
        let task_uri = uri.clone();
        let handle = runtime.spawn(async move {
            let result = provider.load(&task_uri).await;
            // The receiver is gone when the load was superseded.
            let _ = tx.send(result);
        });
        tracing::info!("Load #{} of '{}' started", id, uri);
        Self { id, uri, handle, rx }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The result once the load finished, `None` while it runs.
    pub fn try_take(&mut self) -> Option<Result<Experiment, LoadError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(LoadError::Cancelled)),
        }
    }

    pub fn cancel(self) {
        tracing::info!("Load #{} of '{}' cancelled", self.id, self.uri);
        self.handle.abort();
    }
}
