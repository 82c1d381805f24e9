//! Monitoring CLI - run health sensors and report their status.
//!
//! Output goes to stdout; logs go to stderr so `--format json` and
//! `--format sensu` stay machine readable. The process exit code is the
//! aggregate severity of the batch (0 OK, 1 WARNING, 2 CRITICAL, 3 UNKNOWN),
//! which makes `monitoring run` usable directly as a cron or Nagios-style
//! check.

#![allow(clippy::disallowed_macros)]

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use monitoring::report::{self, SensuOptions};
use monitoring::{
    BatchOutcome, DefinitionSource, EscalationDetector, MonitoringConfig, ResultCache,
    RunOptions, SensorRegistry, SensorRunner, SensorStatus, ShellExecutor, SkipReason,
};
use notify::Notifier;

/// Number of cached results shown by `info`.
const INFO_HISTORY: usize = 5;

/// Monitoring CLI - run sensors and report their status.
#[derive(Parser)]
#[command(name = "monitoring")]
#[command(about = "Run health monitoring sensors")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging and verbose sensor output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $MONITORING_CONFIG, then ./monitoring.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run sensors; exits with the aggregate severity
    Run {
        /// Sensor ids to run (all enabled sensors when omitted)
        ids: Vec<String>,

        /// Re-run sensors even if a cached result is still fresh
        #[arg(long)]
        force: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Run independent sensors concurrently
        #[arg(long)]
        concurrent: bool,

        /// Sensu source (defaults to the host name)
        #[arg(long)]
        sensu_source: Option<String>,

        /// Sensu time to live in seconds
        #[arg(long, default_value = "0")]
        sensu_ttl: u64,

        /// Comma separated Sensu handlers
        #[arg(long, value_delimiter = ',')]
        sensu_handlers: Vec<String>,

        /// Comma separated Sensu metric handlers (defaults to the handlers)
        #[arg(long, value_delimiter = ',')]
        sensu_metric_handlers: Vec<String>,

        /// Don't expose numeric sensors as Sensu metrics
        #[arg(long)]
        no_sensu_metrics: bool,
    },

    /// List configured sensors
    List,

    /// Show a sensor's configuration and recent results
    Info {
        /// Sensor id
        id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Sensu,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("monitoring=debug,notify=debug,info")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            SensorStatus::Unknown.code()
        }
    };
    std::process::exit(code);
}

async fn execute(cli: Cli) -> Result<i32> {
    let config =
        MonitoringConfig::load(cli.config.as_deref()).context("Failed to load monitoring config")?;

    match cli.command {
        Commands::Run {
            ids,
            force,
            format,
            concurrent,
            sensu_source,
            sensu_ttl,
            sensu_handlers,
            sensu_metric_handlers,
            no_sensu_metrics,
        } => {
            let options = RunOptions {
                force,
                verbose: cli.verbose,
                concurrent,
            };
            let outcome = run_sensors(&config, &ids, options).await?;

            let catalog = config.catalog()?;
            match format {
                OutputFormat::Table => {
                    println!("{}", report::render_table(&outcome.results, &catalog, Utc::now()));
                }
                OutputFormat::Json => println!("{}", report::render_json(&outcome.results)?),
                OutputFormat::Sensu => {
                    let sensu = SensuOptions {
                        source: sensu_source.unwrap_or_else(host_name),
                        ttl: sensu_ttl,
                        handlers: non_empty(sensu_handlers),
                        metric_handlers: non_empty(sensu_metric_handlers),
                        metrics: !no_sensu_metrics,
                    };
                    for line in report::sensu_lines(&outcome.results, &catalog, &sensu)? {
                        println!("{line}");
                    }
                }
            }

            Ok(batch_exit_code(&outcome))
        }
        Commands::List => {
            let catalog = config.catalog()?;
            if catalog.is_empty() {
                println!("No sensors configured.");
            } else {
                println!("{}", report::render_definitions(&catalog.all()));
            }
            Ok(0)
        }
        Commands::Info { id } => show_info(&config, &id),
    }
}

/// Run a batch against the persisted cache and escalation state.
async fn run_sensors(
    config: &MonitoringConfig,
    ids: &[String],
    options: RunOptions,
) -> Result<BatchOutcome> {
    let settings = &config.runner;
    let catalog = Arc::new(config.catalog()?);

    let executor = Arc::new(ShellExecutor::new(settings.shell.clone()));
    let registry = Arc::new(SensorRegistry::with_builtins(executor));

    let cache_path = settings.cache_path();
    let cache = ResultCache::load(&cache_path, settings.history_size)
        .with_context(|| format!("Failed to load cache state {}", cache_path.display()))?;

    let escalation_path = settings.escalation_path();
    let notifier = Notifier::from_env().with_severities(config.notify.severities.clone());
    let escalation = EscalationDetector::load(&escalation_path, Arc::new(notifier))
        .with_context(|| format!("Failed to load escalation state {}", escalation_path.display()))?;

    let runner = SensorRunner::new(catalog, registry, Arc::new(cache), Arc::new(escalation))
        .with_config(settings.runner_config());

    tracing::info!(
        requested = ids.len(),
        force = options.force,
        concurrent = options.concurrent,
        "Running sensors"
    );
    let outcome = runner.run_ids(ids, options).await;

    // Results are still reported when the state directory is read-only.
    if let Err(e) = runner.cache().save(&cache_path) {
        tracing::warn!(error = %e, "Failed to save cache state");
    }
    if let Err(e) = runner.escalation().save(&escalation_path) {
        tracing::warn!(error = %e, "Failed to save escalation state");
    }

    for skipped in &outcome.skipped {
        eprintln!(
            "{} {}: {}",
            "Skipped".yellow(),
            skipped.sensor_id,
            skipped.reason.as_str()
        );
    }

    Ok(outcome)
}

/// Aggregate severity, raised to UNKNOWN when a requested id does not exist.
/// CRITICAL still wins.
fn batch_exit_code(outcome: &BatchOutcome) -> i32 {
    let status = outcome.status();
    let missing = outcome
        .skipped
        .iter()
        .any(|s| s.reason == SkipReason::NotFound);
    if missing && status != SensorStatus::Critical {
        SensorStatus::Unknown.code()
    } else {
        status.code()
    }
}

fn show_info(config: &MonitoringConfig, id: &str) -> Result<i32> {
    let catalog = config.catalog()?;
    let Some(definition) = catalog.get(id) else {
        eprintln!("{} sensor '{id}' not found", "Error:".red().bold());
        return Ok(SensorStatus::Unknown.code());
    };

    println!("{}", definition.label().bold());
    println!("{}", serde_json::to_string_pretty(&definition)?);

    let cache = ResultCache::load(&config.runner.cache_path(), config.runner.history_size)?;
    let recent = cache.recent(id, INFO_HISTORY);
    if recent.is_empty() {
        println!("\nNo results recorded yet.");
    } else {
        println!("\n{}", "Recent results".bold());
        println!("{}", report::render_table(&recent, &catalog, Utc::now()));
    }
    Ok(0)
}

fn non_empty(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| read_trimmed(Path::new("/etc/hostname")))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
}
