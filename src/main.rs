//! rustible-elastic - Rustible modules for the Elastic stack
//!
//! This is the main entry point for the rustible-elastic CLI.

mod cli;

use anyhow::Result;
use cli::{Cli, Commands, LogFormat};
use rustible_elastic::config::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    let cli = Cli::parse_args();

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            println!(
                "{}",
                serde_json::json!({ "failed": true, "msg": format!("{:#}", e) })
            );
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<i32> {
    let config = Config::load(cli.config.as_deref())?;

    let format = cli
        .log_format
        .or_else(|| config.logging.format.as_deref().and_then(LogFormat::from_config))
        .unwrap_or_default();
    init_logging(cli.verbosity(), config.logging.level.as_deref(), format);

    match &cli.command {
        Commands::Run(args) => args.execute(&config),
        Commands::List => cli::commands::list(),
    }
}

/// Initialize logging to stderr based on verbosity level
fn init_logging(verbosity: u8, configured: Option<&str>, format: LogFormat) {
    let filter = match verbosity {
        0 => configured.unwrap_or("warn"),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbosity >= 3),
            )
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
