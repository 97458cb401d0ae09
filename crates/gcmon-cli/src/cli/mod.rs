//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gcmon_core::interrupt;
use gcmon_core::logging::{self, LogConfig};
use gcmon_core::source::ProcessSelector;

mod commands;

#[derive(Parser)]
#[command(name = "gcmon")]
#[command(version)]
#[command(about = "Live monitor for .NET garbage collections")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    monitor: MonitorArgs,
}

/// Arguments of the default monitoring mode.
#[derive(clap::Args, Debug, Clone)]
pub(crate) struct MonitorArgs {
    /// Id of the process to monitor
    #[arg(short, long, value_name = "PID", conflicts_with = "name")]
    pub pid: Option<u32>,

    /// Name of the process to monitor; the first matching pid is used
    #[arg(short, long, value_name = "NAME")]
    pub name: Option<String>,

    /// Only show GCs that paused longer than this (milliseconds)
    #[arg(short = 'm', long = "min-duration", value_name = "MSEC")]
    pub min_duration: Option<f64>,

    /// Config file to use instead of $GCMON_HOME/config.yaml
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Newline-delimited JSON trace feed; `-` reads stdin
    #[arg(long, value_name = "PATH", default_value = "-")]
    pub feed: String,

    /// Print heap stats periodically, e.g. 30s or 5m
    #[arg(long, value_name = "PERIOD")]
    pub stats_timer: Option<String>,

    /// Do not listen for key presses
    #[arg(long = "no-keys")]
    pub no_keys: bool,

    /// Write diagnostic logs to this file (level from GCMON_LOG)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl MonitorArgs {
    fn selector(&self) -> Result<ProcessSelector> {
        match (self.pid, &self.name) {
            (Some(pid), _) => Ok(ProcessSelector::Id(pid)),
            (None, Some(name)) => Ok(ProcessSelector::Name(name.clone())),
            (None, None) => {
                anyhow::bail!("Specify a process id using -p or a process name using -n.")
            }
        }
    }
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Generate a fresh config from Rust defaults (for xtask)
    Generate,
    /// List every column that can be displayed
    Columns,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Config { command }) = cli.command {
        return match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Generate => commands::config::generate(),
            ConfigCommands::Columns => {
                commands::config::columns();
                Ok(())
            }
        };
    }

    let selector = cli.monitor.selector()?;
    let _log_guard = logging::init_logging(&LogConfig {
        level: None,
        file: cli.monitor.log_file.clone(),
    })
    .context("initialize logging")?;
    interrupt::init().context("install Ctrl+C handler")?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(commands::monitor::run(cli.monitor, selector))
}
