//! Export command - dump snapshots as CSV.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use time::UtcOffset;

use dockwatch_service::Config;
use dockwatch_store::{SnapshotQuery, Store};
use dockwatch_types::DayWindow;

use crate::util::{open_store, parse_date_arg};

/// Arguments for the export command.
pub struct ExportArgs {
    pub station: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub output: Option<PathBuf>,
}

/// Execute the export command.
pub fn cmd_export(config: &Config, args: ExportArgs) -> Result<()> {
    let store = open_store(config)?;
    let query = build_query(&args, config.collector.offset()?)?;

    let count = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            export(&store, &query, BufWriter::new(file))?
        }
        None => export(&store, &query, io::stdout().lock())?,
    };

    eprintln!("Exported {count} snapshots");
    Ok(())
}

fn export<W: io::Write>(store: &Store, query: &SnapshotQuery, writer: W) -> Result<usize> {
    store
        .export_snapshots_csv(query, writer)
        .context("Failed to export snapshots")
}

/// Dates are local calendar days; `until` is inclusive.
fn build_query(args: &ExportArgs, offset: UtcOffset) -> Result<SnapshotQuery> {
    let mut query = SnapshotQuery::new().oldest_first();

    if let Some(station) = &args.station {
        query = query.station(station);
    }
    if let Some(since) = &args.since {
        query = query.since(DayWindow::new(parse_date_arg(since)?, offset).start());
    }
    if let Some(until) = &args.until {
        query = query.until(DayWindow::new(parse_date_arg(until)?, offset).end());
    }
    Ok(query)
}
