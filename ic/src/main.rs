//! Interceptor CLI
//!
//! Runs interception scenarios through the coordinator and reports outcomes.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use interceptor::cli::{Cli, Command, OutputFormat, get_log_path};
use interceptor::config::Config;
use interceptor::coordinator::Disposition;
use interceptor::scenario::{Scenario, ScenarioRun, run_scenario};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Can't log here yet, the subscriber isn't installed
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Simulate {
            file,
            format,
            deferred_timeout_ms,
        } => cmd_simulate(config, &file, format, deferred_timeout_ms).await,
        Command::ShowConfig => cmd_show_config(&config, cli.config.as_ref()),
    }
}

async fn cmd_simulate(
    mut config: Config,
    file: &Path,
    format: OutputFormat,
    deferred_timeout_ms: Option<u64>,
) -> Result<()> {
    debug!(file = %file.display(), %format, ?deferred_timeout_ms, "cmd_simulate: called");
    if deferred_timeout_ms.is_some() {
        config.coordinator.deferred_timeout_ms = deferred_timeout_ms;
    }

    let scenario = Scenario::load(file)?;
    let run = run_scenario(&scenario, config.coordinator).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&run)?),
        OutputFormat::Text => print_run(&run),
    }
    Ok(())
}

fn print_run(run: &ScenarioRun) {
    for outcome in &run.outcomes {
        let report = &outcome.report;
        let disposition = match report.disposition {
            Disposition::Abort => format!("{:<8}", "abort").red().bold(),
            Disposition::Respond => format!("{:<8}", "respond").yellow().bold(),
            Disposition::Continue => format!("{:<8}", "continue").green().bold(),
        };
        println!(
            "{} {} {}",
            disposition,
            outcome.url,
            format!("({}, {}ms)", report.event_id, report.elapsed_ms).dimmed()
        );
        for fault in &report.handler_faults {
            println!("         {} {}", "handler fault:".yellow(), fault);
        }
        if let Some(ref fault) = report.sink_fault {
            println!("         {} {}", "sink fault:".red(), fault);
        }
        if report.timed_out {
            println!("         {}", "deferred work timed out".yellow());
        }
    }

    let m = &run.metrics;
    println!();
    println!(
        "{} {} finalized: {} continued, {} responded, {} aborted ({} handler faults, {} sink faults)",
        "Summary:".bright_cyan().bold(),
        m.finalized,
        m.continued,
        m.responded,
        m.aborted,
        m.handler_faults,
        m.sink_faults
    );
}

fn cmd_show_config(config: &Config, path: Option<&PathBuf>) -> Result<()> {
    debug!(?path, "cmd_show_config: called");
    if let Some(path) = path {
        println!("# {}", path.display());
    }
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}
