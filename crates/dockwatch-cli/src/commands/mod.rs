//! Command implementations for the CLI.

mod aggregate;
mod config;
mod export;
mod history;
mod once;
mod report;
mod run;
mod status;

pub use aggregate::cmd_aggregate;
pub use config::cmd_config;
pub use export::{ExportArgs, cmd_export};
pub use history::cmd_history;
pub use once::cmd_once;
pub use report::{ReportArgs, cmd_report};
pub use run::cmd_run;
pub use status::cmd_status;
