//! `dockwatch`: collect GBFS station availability and report on it.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `once` | Run one collection cycle (cron-friendly) |
//! | `run` | Collect continuously until interrupted |
//! | `report` | Daily report from stored statistics |
//! | `aggregate` | Compute daily statistics |
//! | `history` | Recent daily statistics for a station |
//! | `export` | Dump snapshots as CSV |
//! | `status` | Database row counts |
//! | `config` | Show, locate or create the configuration file |

mod cli;
mod commands;
mod format;
mod logging;
mod util;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cli::{Cli, Commands};
use commands::{
    ExportArgs, ReportArgs, cmd_aggregate, cmd_config, cmd_export, cmd_history, cmd_once,
    cmd_report, cmd_run, cmd_status,
};
use format::FormatOptions;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Config management works even when the current file is invalid
    if let Commands::Config { action } = cli.command {
        return cmd_config(action, cli.config.as_deref(), cli.db.as_deref());
    }

    let config = util::load_config(cli.config.as_deref(), cli.db.as_deref())?;
    let _log_guard = logging::init(cli.verbose, cli.quiet, cli.no_color, &config.logging);
    let opts = FormatOptions::new(cli.no_color, cli.compact);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async {
        match cli.command {
            Commands::Once {
                calculate_stats,
                stats_date,
            } => {
                let cancel = shutdown_token();
                cmd_once(&config, calculate_stats, stats_date.as_deref(), cancel).await
            }
            Commands::Run {
                interval,
                duration_hours,
            } => {
                let cancel = shutdown_token();
                cmd_run(&config, interval, duration_hours, cancel).await
            }
            Commands::Report {
                date,
                calculate_stats,
                top,
                output,
            } => cmd_report(
                &config,
                ReportArgs {
                    date,
                    calculate_stats,
                    top,
                    format: output.format,
                    output: output.output,
                },
                &opts,
            ),
            Commands::Aggregate { date, station } => {
                cmd_aggregate(&config, date.as_deref(), station.as_deref())
            }
            Commands::History {
                station,
                days,
                output,
            } => cmd_history(
                &config,
                &station,
                days,
                output.format,
                output.output.as_ref(),
                &opts,
            ),
            Commands::Export {
                station,
                since,
                until,
                output,
            } => cmd_export(
                &config,
                ExportArgs {
                    station,
                    since,
                    until,
                    output,
                },
            ),
            Commands::Status => cmd_status(&config),
            Commands::Config { .. } => unreachable!("handled before config loading"),
        }
    })
}

/// A token cancelled on Ctrl+C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping collection");
            child.cancel();
        }
    });
    token
}
