//! Default mode: monitor one process from a trace feed.

use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal};

use anyhow::{Context, Result};
use gcmon_core::config::{ConfigOverrides, Configuration};
use gcmon_core::console::{self, LineEnding};
use gcmon_core::interrupt::InterruptedError;
use gcmon_core::source::{FeedSource, ProcessSelector};
use gcmon_core::terminal::RawModeGuard;
use gcmon_core::{Monitor, MonitorOptions, StopReason};

use crate::cli::MonitorArgs;

fn open_feed(feed: &str) -> Result<Box<dyn BufRead + Send>> {
    if feed == "-" {
        if io::stdin().is_terminal() {
            anyhow::bail!(
                "Refusing to read the trace feed from an interactive terminal. \
                 Pipe a feed into gcmon or pass --feed PATH."
            );
        }
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(feed).with_context(|| format!("open trace feed {feed}"))?;
    Ok(Box::new(BufReader::new(file)))
}

pub async fn run(args: MonitorArgs, selector: ProcessSelector) -> Result<()> {
    let (mut config, config_source) =
        Configuration::load(args.config.as_deref()).context("load config")?;
    tracing::info!(source = ?config_source, "configuration loaded");
    config
        .apply(&ConfigOverrides {
            min_duration_msec: args.min_duration,
            stats_timer: args.stats_timer.clone(),
        })
        .context("apply command-line options")?;
    let theme = config.theme().context("load theme")?;

    let feed = open_feed(&args.feed)?;
    let keys = !args.no_keys && io::stdout().is_terminal();
    let raw_mode = if keys {
        Some(RawModeGuard::enable()?)
    } else {
        None
    };
    let newline = if raw_mode.is_some() {
        LineEnding::CrLf
    } else {
        LineEnding::Lf
    };
    let console = console::for_stdout(theme, config.theme.use_plain_text, newline);

    let mut monitor = Monitor::initialize(
        &config,
        FeedSource::new(feed, selector),
        console,
        MonitorOptions {
            keys,
            watch_interrupt: true,
            stats_interval: None,
        },
    )?;
    let summary = monitor.run_until_stopped().await?;
    drop(raw_mode);

    if summary.stop == StopReason::Interrupted {
        return Err(InterruptedError.into());
    }
    Ok(())
}
