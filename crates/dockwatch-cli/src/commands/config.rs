//! Config command - inspect and create the configuration file.

use std::path::Path;

use anyhow::{Context, Result, bail};

use dockwatch_service::Config;

use crate::cli::ConfigAction;
use crate::util::{config_path, load_config};

/// Execute the config command.
pub fn cmd_config(action: ConfigAction, explicit: Option<&Path>, db: Option<&Path>) -> Result<()> {
    let path = config_path(explicit);

    match action {
        ConfigAction::Path => {
            println!("{}", path.display());
        }
        ConfigAction::Show => {
            let config = load_config(explicit, db)?;
            let content =
                toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
            print!("{content}");
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "Config file already exists at {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");

        cmd_config(ConfigAction::Init { force: false }, Some(&path), None).unwrap();
        assert!(Config::load_validated(&path).is_ok());

        let err = cmd_config(ConfigAction::Init { force: false }, Some(&path), None).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        cmd_config(ConfigAction::Init { force: true }, Some(&path), None).unwrap();
    }
}
