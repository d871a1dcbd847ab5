//! Aggregate command - compute daily statistics.

use anyhow::{Context, Result};

use dockwatch_core::DailyAggregator;
use dockwatch_service::Config;

use crate::util::{date_or_today, open_store};

/// Execute the aggregate command.
pub fn cmd_aggregate(config: &Config, date: Option<&str>, station: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    let aggregator = DailyAggregator::new(&store, config.collector.aggregator_options()?);
    let date = date_or_today(date, aggregator.today())?;

    match station {
        Some(station_id) => match aggregator.aggregate(station_id, date) {
            Ok(stat) => println!("{stat}"),
            Err(e) if e.is_no_data() => println!("{e}"),
            Err(e) => return Err(e).context("Failed to aggregate station"),
        },
        None => {
            let summary = aggregator
                .aggregate_all(date)
                .context("Failed to aggregate stations")?;
            println!(
                "Statistics calculated for {}/{} stations on {}",
                summary.stations_processed, summary.total_stations, summary.date
            );
        }
    }
    Ok(())
}
