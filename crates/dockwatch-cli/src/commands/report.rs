//! Report command - daily report from stored statistics.

use std::path::PathBuf;

use anyhow::{Context, Result};

use dockwatch_core::{DailyAggregator, build_report};
use dockwatch_service::Config;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_report_text};
use crate::util::{date_or_today, open_store, write_output};

/// Arguments for the report command.
pub struct ReportArgs {
    pub date: Option<String>,
    pub calculate_stats: bool,
    pub top: usize,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
}

/// Execute the report command.
pub fn cmd_report(config: &Config, args: ReportArgs, opts: &FormatOptions) -> Result<()> {
    let store = open_store(config)?;
    let aggregator = DailyAggregator::new(&store, config.collector.aggregator_options()?);
    let date = date_or_today(args.date.as_deref(), aggregator.today())?;

    if args.calculate_stats {
        let summary = aggregator
            .aggregate_all(date)
            .context("Failed to calculate statistics")?;
        eprintln!(
            "Calculated stats for {}/{} stations",
            summary.stations_processed, summary.total_stations
        );
    }

    let report = build_report(&store, date, args.top).context("Failed to build report")?;
    let content = match args.format {
        OutputFormat::Text => format_report_text(&report, opts),
        OutputFormat::Json => opts.as_json(&report)?,
    };
    write_output(args.output.as_ref(), &content)?;

    if let Some(path) = &args.output {
        eprintln!("Report saved to {}", path.display());
    }
    Ok(())
}
