//! Exposes the command line application.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lamports_service::config::Config;
use lamports_service::metrics;

use crate::healthcheck;
use crate::logging;
use crate::server;

/// Lamports commands.
#[derive(Subcommand)]
enum Command {
    /// Run the web server.
    #[command(name = "run")]
    Run,

    /// Check the health of a running server.
    #[command(name = "healthcheck")]
    Healthcheck {
        /// The address of the server. Defaults to the configured bind address.
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Request timeout in seconds.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

/// Command line interface parser.
#[derive(Parser)]
#[command(version, bin_name = "lamports")]
struct Cli {
    /// Path to your configuration file.
    #[arg(long = "config", short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    // The healthcheck runs next to a live server and must not report anything itself.
    if let Command::Healthcheck { addr, timeout } = cli.command {
        return healthcheck::healthcheck(config, addr, timeout);
    }

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: Some(env!("CARGO_PKG_VERSION").into()),
        session_mode: sentry::SessionMode::Request,
        auto_session_tracking: false,
        ..Default::default()
    });

    // SAFETY: No other threads have been spawned at this point.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd,
            config.metrics.custom_tags.clone(),
        )
        .context("failed to set up metrics")?;
    }

    server::run(config).context("failed to start the server")
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_healthcheck() {
        let cli = Cli::try_parse_from([
            "lamports",
            "-c",
            "lamports.yml",
            "healthcheck",
            "--addr",
            "127.0.0.1:3021",
        ])
        .unwrap();
        assert_eq!(cli.config(), Some(Path::new("lamports.yml")));
        match cli.command {
            Command::Healthcheck { addr, timeout } => {
                assert_eq!(addr, Some("127.0.0.1:3021".parse().unwrap()));
                assert_eq!(timeout, 5);
            }
            Command::Run => panic!("expected healthcheck"),
        }
    }
}
