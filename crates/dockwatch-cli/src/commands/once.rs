//! Once command - a single collection cycle.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use dockwatch_core::GbfsClient;
use dockwatch_service::{Collector, CollectorOptions, Config};

use crate::format::format_cycle_text;
use crate::util::{date_or_today, open_store};

/// Build a collector for the configured feed and database.
pub fn build_collector(config: &Config) -> Result<Collector<GbfsClient>> {
    let store = open_store(config)?;
    let feed = GbfsClient::new(config.feed.to_options()).context("Failed to create feed client")?;
    let options = CollectorOptions::from_config(config)?;
    Collector::new(store, feed, options).context("Failed to restore tracker state")
}

/// Execute the once command.
pub async fn cmd_once(
    config: &Config,
    calculate_stats: bool,
    stats_date: Option<&str>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut collector = build_collector(config)?;

    let report = collector
        .run_once(&cancel)
        .await
        .context("Data collection failed")?;
    print!("{}", format_cycle_text(&report));

    if calculate_stats {
        let date = date_or_today(stats_date, collector.today())?;
        let summary = collector.aggregate(date)?;
        println!(
            "Statistics calculated for {}/{} stations on {}",
            summary.stations_processed, summary.total_stations, summary.date
        );
    }

    println!("Data collection completed successfully");
    Ok(())
}
