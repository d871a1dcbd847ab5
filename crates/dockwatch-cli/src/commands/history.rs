//! History command - recent daily statistics for one station.

use std::path::PathBuf;

use anyhow::{Context, Result};
use time::OffsetDateTime;

use dockwatch_core::{DailyAggregator, station_history};
use dockwatch_service::Config;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_history_text};
use crate::util::{open_store, write_output};

/// Execute the history command.
pub fn cmd_history(
    config: &Config,
    station_id: &str,
    days: u32,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let store = open_store(config)?;
    let aggregator = DailyAggregator::new(&store, config.collector.aggregator_options()?);

    let stats = station_history(&aggregator, station_id, days, OffsetDateTime::now_utc())
        .with_context(|| format!("Failed to compute history for {station_id}"))?;

    let content = match format {
        OutputFormat::Text => format_history_text(station_id, &stats, opts),
        OutputFormat::Json => opts.as_json(&stats)?,
    };
    write_output(output, &content)
}
