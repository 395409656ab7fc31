//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use politdocs_core::{Pipeline, ProgressReporter, RunReport};
use politdocs_shared::{
    AppConfig, EnrichedItem, ItemStatus, MISSING_VERSION, PipelineConfig, init_config, load_config,
    load_config_from,
};
use tracing::{info, warn};

/// Log file written into the data directory, truncated every run.
const LOG_FILE_NAME: &str = "politdocs.log";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// politdocs: council business records, enriched and summarized.
#[derive(Parser)]
#[command(
    name = "politdocs",
    version,
    about = "Scrape, link and summarize municipal council business records.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.politdocs/politdocs.toml).
    #[arg(long, global = true, env = "POLITDOCS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full enrichment job.
    Run {
        /// Durable data directory (result file, backup, log).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Directory receiving the slim frontend projection.
        #[arg(long)]
        frontend_dir: Option<PathBuf>,

        /// Skip the OCR pass and extract embedded text only.
        #[arg(long)]
        no_ocr: bool,

        /// Version tag written into the result (overrides $VERSION).
        #[arg(long)]
        version_tag: Option<String>,
    },

    /// Re-derive the slim projection from an existing result file.
    Slim {
        /// Result file to read.
        input: PathBuf,

        /// Slim file to write.
        output: PathBuf,
    },

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

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing on stderr, optionally mirrored into `log_file`.
pub(crate) fn init_tracing(format: &LogFormat, verbose: u8, log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::{
        EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
    };

    let filter = match verbose {
        0 => "politdocs=info",
        1 => "politdocs=debug",
        _ => "politdocs=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    match format {
        LogFormat::Text => layers.push(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed(),
        ),
        LogFormat::Json => layers.push(fmt::layer().json().with_writer(std::io::stderr).boxed()),
    }

    if let Some(path) = log_file {
        let file = std::fs::File::create(path)
            .wrap_err_with(|| format!("failed to create log file {}", path.display()))?;
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            data_dir,
            frontend_dir,
            no_ocr,
            version_tag,
        } => {
            let config = resolve_config(cli.config.as_deref())?;
            let overrides = RunOverrides {
                data_dir,
                frontend_dir,
                no_ocr,
                version_tag,
            };
            cmd_run(config, overrides, &cli.log_format, cli.verbose).await
        }
        Command::Slim { input, output } => {
            init_tracing(&cli.log_format, cli.verbose, None)?;
            cmd_slim(&input, &output)
        }
        Command::Config { action } => {
            init_tracing(&cli.log_format, cli.verbose, None)?;
            match action {
                ConfigAction::Init => cmd_config_init(),
                ConfigAction::Show => cmd_config_show(&resolve_config(cli.config.as_deref())?),
            }
        }
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Flags of `politdocs run` that override the config file.
#[derive(Debug, Default)]
struct RunOverrides {
    data_dir: Option<PathBuf>,
    frontend_dir: Option<PathBuf>,
    no_ocr: bool,
    version_tag: Option<String>,
}

impl RunOverrides {
    fn apply(self, mut config: AppConfig) -> (AppConfig, Option<String>) {
        if let Some(dir) = self.data_dir {
            config.paths.data_dir = dir;
        }
        if let Some(dir) = self.frontend_dir {
            config.paths.frontend_dir = dir;
        }
        if self.no_ocr {
            config.ocr.enabled = false;
        }
        (config, self.version_tag)
    }
}

fn pipeline_config(config: &AppConfig, version_tag: Option<String>) -> PipelineConfig {
    let mut pipeline = PipelineConfig::from(config);
    if let Some(tag) = version_tag {
        pipeline.version = tag;
    }
    pipeline
}

async fn cmd_run(
    config: AppConfig,
    overrides: RunOverrides,
    log_format: &LogFormat,
    verbose: u8,
) -> Result<()> {
    let (config, version_tag) = overrides.apply(config);
    let pipeline_config = pipeline_config(&config, version_tag);

    std::fs::create_dir_all(&pipeline_config.data_dir).wrap_err_with(|| {
        format!(
            "failed to create data directory {}",
            pipeline_config.data_dir.display()
        )
    })?;
    init_tracing(
        log_format,
        verbose,
        Some(&pipeline_config.data_dir.join(LOG_FILE_NAME)),
    )?;

    if pipeline_config.version == MISSING_VERSION {
        warn!("VERSION is not set, the result will carry a placeholder version");
    }

    info!(
        table_url = %pipeline_config.table_url,
        output = %pipeline_config.output_file.display(),
        ocr = config.ocr.enabled,
        "starting enrichment run"
    );

    let pipeline = Pipeline::from_config(&config, pipeline_config)?;
    let reporter = CliProgress::new();
    let report = pipeline.run(&reporter).await?;

    println!();
    println!("  Enrichment run finished!");
    println!("  Items:    {}", report.total);
    println!("  Reused:   {}", report.reused);
    println!("  Enriched: {}", report.enriched);
    println!("  Failed:   {}", report.failed);
    println!("  Result:   {}", report.output_file.display());
    println!("  Slim:     {}", report.slim_file.display());
    if let Some(backup) = &report.backup {
        println!("  Backup:   {}", backup.display());
    }
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn cmd_slim(input: &Path, output: &Path) -> Result<()> {
    let count = politdocs_artifacts::slim_file(input, output)?;
    info!(count, output = %output.display(), "slim projection written");
    println!("Wrote {count} items to {}", output.display());
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_finished(&self, item: &EnrichedItem, current: usize, total: usize) {
        let marker = match item.status {
            ItemStatus::Ok => "ok",
            ItemStatus::Error => "error",
            ItemStatus::Pending => "pending",
        };
        self.spinner
            .set_message(format!("[{current}/{total}] {marker} {}", item.title));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
