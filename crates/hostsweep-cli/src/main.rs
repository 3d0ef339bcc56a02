//! hostsweep CLI
//!
//! Resolves a set of machines, optionally checks which are up, runs one
//! collection against each and reports the rows.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::{Config, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "hostsweep", version, about = "Fleet inventory and remote collection")]
struct Cli {
    /// Config file (defaults to $HOSTSWEEP_CONFIG or the standard locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resolved host list
    Resolve(TargetArgs),

    /// Report which hosts answer a liveness probe
    Ping {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        report: ReportArgs,
        /// Probes per host before it counts as offline
        #[arg(long)]
        probe_count: Option<u32>,
    },

    /// OS, hardware and uptime, one row per host (osquery)
    Asset(CollectArgs),

    /// Installed packages, one row per package (osquery)
    Software(CollectArgs),

    /// Run a shell command, one row per output line
    Exec {
        #[command(flatten)]
        collect: CollectArgs,
        /// Command to run on every host
        #[arg(short = 'x', long = "command")]
        command: String,
        /// Report column for the output lines
        #[arg(long, default_value = "Output")]
        column: String,
    },
}

/// Which hosts to target
#[derive(Args, Debug, Clone)]
struct TargetArgs {
    /// Hostname, comma-separated name prefixes, or a host-list file.
    /// Empty, `localhost` or `127.0.0.1` targets this machine.
    #[arg(default_value = "")]
    target: String,

    /// Directory search base DN
    #[arg(long)]
    search_base: Option<String>,

    /// DNS domain used to derive the search base
    #[arg(long)]
    domain: Option<String>,
}

/// Where results go and how many hosts run at once
#[derive(Args, Debug, Clone)]
struct ReportArgs {
    /// Path stem for CSV output; `n` or empty shows a table
    #[arg(short, long, default_value = "")]
    output: String,

    /// Hosts collected at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-host timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
struct CollectArgs {
    #[command(flatten)]
    target: TargetArgs,

    #[command(flatten)]
    report: ReportArgs,

    /// Drop hosts that do not answer a liveness probe first
    #[arg(long)]
    probe: bool,

    /// Probes per host before it counts as offline
    #[arg(long)]
    probe_count: Option<u32>,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let (config, source) = Config::locate(cli.config.as_deref())?;
    init_tracing(&config);

    match &source {
        Some(path) => tracing::debug!(path = %path.display(), "loaded config"),
        None => tracing::warn!("no config file found, using defaults"),
    }

    let sweep = commands::Sweep::new(config);
    match cli.command {
        Command::Resolve(target) => sweep.resolve(&target).await,
        Command::Ping {
            target,
            report,
            probe_count,
        } => sweep.ping(&target, &report, probe_count).await,
        Command::Asset(args) => sweep.asset(&args).await,
        Command::Software(args) => sweep.software(&args).await,
        Command::Exec {
            collect,
            command,
            column,
        } => sweep.exec(&collect, &command, &column).await,
    }
}
