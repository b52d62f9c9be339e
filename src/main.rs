//! HyperView - command line entry point
//!
//! CLI commands:
//! - gui: Launch the native viewer
//! - infer: Print the inferred column definitions of a data file
//! - export: Write the rows matching a filter as CSV

use clap::{Parser, Subcommand};
use hyperview::config::{Config, Env};
use hyperview::filter::{apply_filter, Filter};
use hyperview::infer::{infer_types, normalize_numeric_columns, ParamDefMap};
use hyperview::model::Experiment;
use hyperview::persist::{FileState, StateScope};
use hyperview::{export, gui, logging, provider};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "hyperview")]
#[command(about = "Explore high-dimensional experiment tables")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to hyperview.yaml config
    #[arg(short, long, default_value = "hyperview.yaml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch native GUI viewer
    Gui {
        /// CSV / JSON file or server uri to load on start
        source: Option<String>,
    },

    /// Print inferred column types
    Infer {
        file: String,

        /// Print the definitions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export rows as CSV
    Export {
        file: String,

        /// Filter as JSON, e.g. '{"type":"Search","data":"adam"}'
        #[arg(short, long)]
        filter: Option<String>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = Env::load();
    let _log_guard = logging::init_logging(&env.log_dir)?;
    tracing::info!("HyperView starting up");

    let cli = Cli::parse();
    tracing::debug!("CLI args parsed: config={:?}", cli.config);

    let config = Config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Gui { source } => {
            tracing::info!("Launching native GUI viewer");
            gui::run_viewer(config, env, source, tokio::runtime::Handle::current())?;
        }

        Commands::Infer { file, json } => {
            let state = open_state(&env)?;
            let (_, defs) = load(&env, &state, &file).await?;
            if json {
                let defs: Vec<_> = defs.iter().collect();
                println!("{}", serde_json::to_string_pretty(&defs)?);
            } else {
                print_defs(&defs);
            }
        }

        Commands::Export { file, filter, output } => {
            let state = open_state(&env)?;
            let (experiment, defs) = load(&env, &state, &file).await?;
            let mut rows = experiment.to_rows();
            if let Some(text) = filter {
                let filter: Filter = serde_json::from_str(&text)?;
                rows = apply_filter(&rows, &filter);
            }
            let columns = export::export_columns(&defs);
            let delimiter = config.export.delimiter;
            let n = match &output {
                Some(path) => export::write_csv(&rows, &columns, delimiter, std::fs::File::create(path)?)?,
                None => export::write_csv(&rows, &columns, delimiter, std::io::stdout().lock())?,
            };
            if let Some(path) = output {
                println!("Exported {} rows to {}", n, path.display());
            }
        }
    }

    Ok(())
}

fn open_state(env: &Env) -> anyhow::Result<StateScope> {
    Ok(match &env.state_file {
        Some(path) => StateScope::new(Arc::new(FileState::open(path)?)),
        None => StateScope::in_memory(),
    })
}

/// Load a data file and infer its columns the way the viewer does.
async fn load(env: &Env, state: &StateScope, uri: &str) -> anyhow::Result<(Experiment, ParamDefMap)> {
    let provider = provider::provider_for(uri, &env.data_dir, env.server.as_deref())?;
    let mut experiment = provider.load(uri).await?;
    let defs = infer_types(
        &state.children("params"),
        &experiment.to_rows(),
        &experiment.parameters_definition,
        &experiment.column_names(),
    );
    normalize_numeric_columns(&mut experiment, &defs);
    tracing::info!("Loaded {} rows from {}", experiment.datapoints.len(), uri);
    Ok((experiment, defs))
}

fn print_defs(defs: &ParamDefMap) {
    println!("{:<30} {:<28} {:>9} {:>8}  options", "column", "type", "distinct", "optional");
    println!("{}", "-".repeat(90));
    for pd in defs.iter() {
        let options: Vec<&str> = pd.type_options.iter().map(|t| t.label()).collect();
        println!(
            "{:<30} {:<28} {:>9} {:>8}  {}",
            pd.name,
            pd.param_type.label(),
            pd.distinct_values.len(),
            if pd.optional { "yes" } else { "" },
            options.join(", ")
        );
    }
    println!("\n{} columns", defs.len());
}
