//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Interceptor - cooperative request interception simulator
#[derive(Parser)]
#[command(
    name = "ic",
    about = "Run request-interception scenarios through the coordinator",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a YAML scenario and print one outcome per request
    Simulate {
        /// Scenario file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Override the deferred-work deadline (ms)
        #[arg(short = 't', long)]
        deferred_timeout_ms: Option<u64>,
    },

    /// Print the effective configuration as YAML
    ShowConfig,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("interceptor")
        .join("logs")
        .join("interceptor.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Output format for simulate results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from([
            "ic",
            "--log-level",
            "debug",
            "simulate",
            "scenario.yml",
            "--format",
            "json",
            "-t",
            "100",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Simulate {
                file,
                format,
                deferred_timeout_ms,
            } => {
                assert_eq!(file, PathBuf::from("scenario.yml"));
                assert_eq!(format, OutputFormat::Json);
                assert_eq!(deferred_timeout_ms, Some(100));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("TEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("plain".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_log_path_location() {
        let path = get_log_path();
        assert!(path.ends_with("interceptor/logs/interceptor.log"));
    }
}
