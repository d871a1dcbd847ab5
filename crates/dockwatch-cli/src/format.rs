//! Output formatting utilities for text and JSON output.

use anyhow::Result;
use owo_colors::OwoColorize;
use tabled::builder::Builder;
use tabled::settings::Style;

use dockwatch_core::{DailyReport, DailyStat};
use dockwatch_service::CycleReport;
use dockwatch_store::StoreCounts;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool, compact: bool) -> Self {
        Self { no_color, compact }
    }

    /// Serialize value to JSON string, respecting compact option.
    pub fn as_json<T: serde::Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }

    fn heading(&self, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            text.bold().to_string()
        }
    }

    /// Color an availability percentage by severity.
    fn availability(&self, pct: f64) -> String {
        let text = format!("{pct:.1}");
        if self.no_color {
            text
        } else if pct >= 90.0 {
            text.green().to_string()
        } else if pct >= 75.0 {
            text.yellow().to_string()
        } else {
            text.red().to_string()
        }
    }
}

/// Render seconds as minutes with one decimal.
#[must_use]
pub fn minutes(seconds: i64) -> String {
    format!("{:.1}", seconds as f64 / 60.0)
}

fn table(builder: Builder) -> String {
    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

// ============================================================================
// Report formatting
// ============================================================================

pub fn format_report_text(report: &DailyReport, opts: &FormatOptions) -> String {
    let rule = "=".repeat(60);
    let mut output = format!(
        "{rule}\n{}\n{rule}\n\n",
        opts.heading(&format!("BIKE STATION REPORT - {}", report.date))
    );

    let Some(summary) = &report.summary else {
        output.push_str("No data available for this date.\n");
        output.push_str("Run 'dockwatch aggregate' or pass --calculate-stats first.\n");
        return output;
    };

    output.push_str(&format!("{}\n", opts.heading("SUMMARY")));
    output.push_str(&format!("Total Stations:        {}\n", summary.total_stations));
    output.push_str(&format!(
        "Average Availability:  {}%\n",
        opts.availability(summary.average_availability_percentage)
    ));
    output.push_str(&format!(
        "Total Zero-Bike Hours: {:.2}\n",
        summary.total_zero_bike_hours
    ));
    output.push_str(&format!(
        "Stations with Outages: {}\n",
        summary.stations_with_zero_periods
    ));

    output.push_str(&format!(
        "\n{}\n",
        opts.heading(&format!("WORST AVAILABILITY (Bottom {})", report.worst_availability.len()))
    ));
    let mut builder = Builder::default();
    builder.push_record(["Station ID", "Availability %", "Zero Minutes"]);
    for stat in &report.worst_availability {
        builder.push_record([
            stat.station_id.clone(),
            opts.availability(stat.availability_percentage),
            minutes(stat.zero_bike_seconds),
        ]);
    }
    output.push_str(&table(builder));
    output.push('\n');

    output.push_str(&format!(
        "\n{}\n",
        opts.heading(&format!("BEST AVAILABILITY (Top {})", report.best_availability.len()))
    ));
    let mut builder = Builder::default();
    builder.push_record(["Station ID", "Availability %", "Avg Bikes"]);
    for stat in &report.best_availability {
        builder.push_record([
            stat.station_id.clone(),
            opts.availability(stat.availability_percentage),
            format!("{:.1}", stat.avg_bikes),
        ]);
    }
    output.push_str(&table(builder));
    output.push('\n');

    output.push_str(&format!("\n{}\n", opts.heading("MOST FREQUENT OUTAGES")));
    let mut builder = Builder::default();
    builder.push_record(["Station ID", "# Outages", "Total Minutes", "Longest Minutes"]);
    for stat in &report.most_zero_periods {
        builder.push_record([
            stat.station_id.clone(),
            stat.num_zero_periods.to_string(),
            minutes(stat.zero_bike_seconds),
            minutes(stat.longest_zero_period_seconds),
        ]);
    }
    output.push_str(&table(builder));
    output.push('\n');

    output
}

// ============================================================================
// Station history formatting
// ============================================================================

pub fn format_history_text(station_id: &str, stats: &[DailyStat], opts: &FormatOptions) -> String {
    if stats.is_empty() {
        return format!("No data recorded for station {station_id}.\n");
    }

    let mut output = format!(
        "{}\n\n",
        opts.heading(&format!("Station {station_id} ({} days)", stats.len()))
    );

    let mut builder = Builder::default();
    builder.push_record([
        "Date",
        "Snapshots",
        "Min",
        "Max",
        "Avg",
        "Zero Min",
        "Longest Min",
        "Outages",
        "Low Min",
        "Availability %",
    ]);
    for stat in stats {
        builder.push_record([
            stat.date.to_string(),
            stat.snapshot_count.to_string(),
            stat.min_bikes.to_string(),
            stat.max_bikes.to_string(),
            format!("{:.2}", stat.avg_bikes),
            minutes(stat.zero_bike_seconds),
            minutes(stat.longest_zero_period_seconds),
            stat.num_zero_periods.to_string(),
            minutes(stat.low_bike_seconds),
            opts.availability(stat.availability_percentage),
        ]);
    }
    output.push_str(&table(builder));
    output.push('\n');
    output
}

// ============================================================================
// Collection and status formatting
// ============================================================================

#[must_use]
pub fn format_cycle_text(report: &CycleReport) -> String {
    let summary = &report.summary;
    format!(
        "Stations: {} ({} with bikes, {} empty)\n\
         Bikes available: {} (avg {:.1} per station)\n\
         Snapshots stored: {} ({} already recorded, {} skipped)\n\
         Zero-bike periods: {} opened, {} closed\n",
        summary.total_stations,
        summary.stations_with_bikes,
        summary.empty_stations,
        summary.total_bikes,
        summary.average_bikes_per_station,
        report.stored,
        report.duplicates,
        report.skipped,
        report.opened,
        report.closed
    )
}

#[must_use]
pub fn format_counts_text(counts: &StoreCounts) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Table", "Rows"]);
    builder.push_record(["stations".to_string(), counts.stations.to_string()]);
    builder.push_record(["station_snapshots".to_string(), counts.snapshots.to_string()]);
    builder.push_record([
        "zero_bike_periods (open)".to_string(),
        counts.open_periods.to_string(),
    ]);
    builder.push_record([
        "zero_bike_periods (closed)".to_string(),
        counts.closed_periods.to_string(),
    ]);
    builder.push_record(["daily_stats".to_string(), counts.daily_stats.to_string()]);
    table(builder) + "\n"
}
