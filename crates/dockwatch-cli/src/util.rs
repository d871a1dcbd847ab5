//! Utility functions for CLI operations.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::Date;

use dockwatch_service::{Config, default_config_path};
use dockwatch_store::Store;

/// Resolve the configuration file path.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map(Path::to_path_buf).unwrap_or_else(default_config_path)
}

/// Load the effective configuration: file, then environment, then `--db`.
pub fn load_config(explicit: Option<&Path>, db: Option<&Path>) -> Result<Config> {
    let path = config_path(explicit);
    let mut config = if path.exists() {
        Config::load(&path)?
    } else if explicit.is_some() {
        anyhow::bail!("Config file not found: {}", path.display());
    } else {
        Config::default()
    };

    config.apply_env()?;
    if let Some(db) = db {
        config.storage.path = db.to_path_buf();
    }
    config.validate()?;
    Ok(config)
}

/// Open the configured database.
pub fn open_store(config: &Config) -> Result<Store> {
    Store::open(&config.storage.path)
        .with_context(|| format!("Failed to open database {}", config.storage.path.display()))
}

/// Parse a `YYYY-MM-DD` argument.
pub fn parse_date_arg(value: &str) -> Result<Date> {
    dockwatch_types::parse_date(value)
        .with_context(|| format!("Invalid date '{value}': expected YYYY-MM-DD"))
}

/// Parse an optional date argument, defaulting to `today`.
pub fn date_or_today(value: Option<&str>, today: Date) -> Result<Date> {
    value.map_or(Ok(today), parse_date_arg)
}

/// Write output to file or stdout
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}
