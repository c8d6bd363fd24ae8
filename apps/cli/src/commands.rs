//! CLI command definitions, routing, and tracing setup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use govdata_core::{Orchestrator, PipelineStage, ProgressReporter};
use govdata_extract::DataGovClient;
use govdata_schema::schema_for;
use govdata_shared::{
    AppConfig, FetchConfig, PipelineRunResult, SchemeKind, config_file_path, init_config,
    load_config, load_config_from, load_mapping_file, load_population_file, scheme_mapping,
};
use govdata_storage::Storage;
use govdata_transform::{PopulationMap, TransformContext};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// govdata: public-scheme statistics ETL.
#[derive(Parser)]
#[command(
    name = "govdata",
    version,
    about = "Fetch public-scheme statistics, validate and enrich them, and load them into a local store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.govdata/govdata.toml).
    #[arg(long, global = true, env = "GOVDATA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database path (overrides [database].path).
    #[arg(long, global = true, env = "GOVDATA_DB")]
    pub db: Option<PathBuf>,

    /// JSON file mapping state_code to population.
    #[arg(long, global = true)]
    pub population: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline for one scheme.
    Run {
        /// Scheme key: pmay, mnrega, startup_india, saubhagya.
        #[arg(short, long)]
        scheme: SchemeKind,

        /// Source resource identifier.
        #[arg(short, long)]
        resource_id: String,

        /// Extra query parameter (key=value), repeatable.
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Run the pipeline for every configured scheme.
    RunAll {
        /// JSON object mapping scheme key to resource identifier.
        #[arg(short, long)]
        mapping_file: Option<PathBuf>,
    },

    /// Create the database and scheme tables, then list the tables.
    InitDb,

    /// Load deterministic sample data for every scheme.
    Seed,

    /// Show recent pipeline runs.
    Runs {
        /// Number of runs to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Describe the scheme registry.
    Schemes,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "govdata=info",
        1 => "govdata=debug",
        _ => "govdata=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    // Neither needs a readable config file.
    match &cli.command {
        Command::Schemes => return cmd_schemes(),
        Command::Config {
            action: ConfigAction::Init,
        } => return cmd_config_init(),
        _ => {}
    }

    let config = resolve_config(cli.config.as_deref())?;

    match &cli.command {
        Command::Run {
            scheme,
            resource_id,
            params,
        } => {
            let params: BTreeMap<String, String> = params.iter().cloned().collect();
            cmd_run(&cli, &config, *scheme, resource_id, &params).await
        }
        Command::RunAll { mapping_file } => {
            cmd_run_all(&cli, &config, mapping_file.as_deref()).await
        }
        Command::InitDb => cmd_init_db(&cli, &config).await,
        Command::Seed => cmd_seed(&cli, &config).await,
        Command::Runs { limit } => cmd_runs(&cli, &config, *limit).await,
        Command::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&cli, &config),
        Command::Schemes
        | Command::Config {
            action: ConfigAction::Init,
        } => Ok(()),
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

fn db_path(cli: &Cli, config: &AppConfig) -> PathBuf {
    cli.db
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.database.path))
}

async fn open_storage(cli: &Cli, config: &AppConfig) -> Result<Arc<Storage>> {
    let path = db_path(cli, config);
    info!(path = %path.display(), "opening database");
    Ok(Arc::new(Storage::open(&path).await?))
}

/// Config populations, overridden per state by `--population`.
fn population(cli: &Cli, config: &AppConfig) -> Result<PopulationMap> {
    let mut merged = config.population.clone();
    if let Some(path) = &cli.population {
        merged.extend(load_population_file(path)?);
    }
    Ok(PopulationMap::from(&merged))
}

async fn orchestrator(cli: &Cli, config: &AppConfig) -> Result<Orchestrator> {
    let storage = open_storage(cli, config).await?;
    let client = DataGovClient::new(FetchConfig::from_app(config)?)?;
    let ctx = TransformContext::new(population(cli, config)?);
    Ok(Orchestrator::new(storage, client, ctx)
        .with_concurrency(config.pipeline.concurrency as usize))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    cli: &Cli,
    config: &AppConfig,
    kind: SchemeKind,
    resource_id: &str,
    params: &BTreeMap<String, String>,
) -> Result<()> {
    let orch = orchestrator(cli, config).await?;
    info!(%kind, resource_id, "running pipeline");

    let reporter = CliProgress::new();
    let result = orch
        .run_pipeline_with(kind, resource_id, params, &reporter)
        .await;
    reporter.finish();

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_run_all(cli: &Cli, config: &AppConfig, mapping_file: Option<&Path>) -> Result<()> {
    let mapping = match mapping_file {
        Some(path) => load_mapping_file(path)?,
        None => scheme_mapping(config)?,
    };
    if mapping.is_empty() {
        return Err(eyre!(
            "no schemes to run: pass --mapping-file or fill [schemes] in the config"
        ));
    }

    let orch = orchestrator(cli, config).await?;
    info!(schemes = mapping.len(), "running all pipelines");

    let reporter = Arc::new(CliProgress::new());
    let results = orch.run_all(&mapping, reporter.clone()).await;
    reporter.finish();

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

async fn cmd_init_db(cli: &Cli, config: &AppConfig) -> Result<()> {
    let storage = open_storage(cli, config).await?;
    storage.init_schemes().await?;

    println!("Database ready at: {}", db_path(cli, config).display());
    for table in storage.table_names().await? {
        println!("  {table}");
    }
    Ok(())
}

async fn cmd_seed(cli: &Cli, config: &AppConfig) -> Result<()> {
    let orch = orchestrator(cli, config).await?;

    let reporter = CliProgress::new();
    let results = orch.seed(&reporter).await;
    reporter.finish();

    println!();
    println!("  Sample data loaded:");
    for (kind, result) in &results {
        println!("  {:<14} {:>4} rows", kind.key(), result.ingested);
    }
    println!();
    Ok(())
}

async fn cmd_runs(cli: &Cli, config: &AppConfig, limit: u32) -> Result<()> {
    let storage = open_storage(cli, config).await?;
    let runs = storage.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    println!(
        "{:<26} {:<14} {:<10} {:>9} {:>9} {:>9}  {}",
        "STARTED", "SCHEME", "STATUS", "EXTRACTED", "VALIDATED", "INGESTED", "RESOURCE"
    );
    for run in runs {
        println!(
            "{:<26} {:<14} {:<10} {:>9} {:>9} {:>9}  {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.kind.key(),
            run.status.map_or("running", |s| s.as_str()),
            run.extracted,
            run.validated,
            run.ingested,
            run.resource_id,
        );
        if let Some(error) = run.error {
            println!("    {error}");
        }
    }
    Ok(())
}

fn cmd_schemes() -> Result<()> {
    for kind in SchemeKind::ALL {
        let schema = schema_for(kind);
        println!("{} ({})", kind.key(), kind.category());
        println!("  table:   {}", schema.table());
        let fields: Vec<String> = schema
            .fields
            .iter()
            .map(|f| format!("{}:{}", f.name, f.ty.name()))
            .collect();
        println!("  fields:  {}", fields.join(", "));
        if schema.derived.is_empty() {
            println!("  derived: -");
        } else {
            println!("  derived: {}", schema.derived.join(", "));
        }
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(cli: &Cli, config: &AppConfig) -> Result<()> {
    let source = match &cli.config {
        Some(path) => path.clone(),
        None => config_file_path()?,
    };
    println!("# {}", source.display());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, kind: SchemeKind, stage: PipelineStage, count: usize) {
        self.spinner.set_message(format!("[{kind}] {stage} ({count})"));
    }

    fn finished(&self, result: &PipelineRunResult) {
        self.spinner.println(format!(
            "  {:<14} {:<10} ingested {}",
            result.kind.key(),
            result.status,
            result.ingested
        ));
    }
}
