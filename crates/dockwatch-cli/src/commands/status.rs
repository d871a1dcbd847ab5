//! Status command - database overview.

use anyhow::Result;

use dockwatch_service::Config;

use crate::format::format_counts_text;
use crate::util::open_store;

/// Execute the status command.
pub fn cmd_status(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let counts = store.counts()?;

    println!("Database: {}", config.storage.path.display());
    println!("Feed:     {}\n", config.feed.station_status_url);
    print!("{}", format_counts_text(&counts));

    let stations = store.list_stations()?;
    if let Some(latest) = stations.iter().map(|s| s.last_seen).max() {
        println!("Last poll: {latest}");
    }
    Ok(())
}
