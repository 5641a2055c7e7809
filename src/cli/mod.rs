//! CLI module for rustible-elastic
//!
//! Argument parsing and subcommand definitions. Each invocation runs one
//! module with a JSON or YAML parameter document.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Run Rustible modules against Elastic Cloud Enterprise, Elasticsearch,
/// Kibana and Endgame.
#[derive(Parser, Debug, Clone)]
#[command(name = "rustible-elastic")]
#[command(author = "Rustible Contributors")]
#[command(version)]
#[command(about = "Elastic stack modules for Rustible", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format (overrides `logging.format`)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,
}

/// Format of log lines on stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    /// Parse a `logging.format` config value.
    pub fn from_config(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(value, true).ok()
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a module
    Run(commands::RunArgs),

    /// List the available modules
    List,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "rustible-elastic",
            "run",
            "kibana_space",
            "-a",
            r#"{"space_id": "soc"}"#,
            "--check",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.module, "kibana_space");
                assert!(args.check);
                assert!(!args.diff);
            }
            Commands::List => panic!("expected run"),
        }
    }

    #[test]
    fn test_verbosity_and_log_format() {
        let cli =
            Cli::try_parse_from(["rustible-elastic", "-vvvv", "--log-format", "json", "list"])
                .unwrap();
        assert_eq!(cli.verbosity(), 3);
        assert_eq!(cli.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn test_args_conflict_with_args_file() {
        let result = Cli::try_parse_from([
            "rustible-elastic",
            "run",
            "kibana_space",
            "-a",
            "{}",
            "--args-file",
            "params.yml",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_format_from_config() {
        assert_eq!(LogFormat::from_config("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::from_config("text"), Some(LogFormat::Text));
        assert_eq!(LogFormat::from_config("xml"), None);
    }
}
