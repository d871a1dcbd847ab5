//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Reusable output arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser)]
#[command(name = "dockwatch")]
#[command(author, version, about = "Track bikeshare station availability from a GBFS feed", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Output compact JSON (no pretty-printing)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Configuration file (default: platform config dir)
    #[arg(short, long, global = true, env = "DOCKWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database path (overrides config and DB_PATH)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single collection cycle
    Once {
        /// Calculate daily statistics after collection
        #[arg(long)]
        calculate_stats: bool,

        /// Date for statistics calculation (YYYY-MM-DD), default is today
        #[arg(long, requires = "calculate_stats")]
        stats_date: Option<String>,
    },

    /// Collect continuously until interrupted
    Run {
        /// Seconds between cycles (default from config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many hours
        #[arg(long)]
        duration_hours: Option<f64>,
    },

    /// Show the daily report for a date
    Report {
        /// Report date (YYYY-MM-DD), default is today
        #[arg(short, long)]
        date: Option<String>,

        /// Calculate statistics before generating the report
        #[arg(long)]
        calculate_stats: bool,

        /// Stations per ranking
        #[arg(long, default_value = "5")]
        top: usize,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Calculate daily statistics without reporting
    Aggregate {
        /// Date to aggregate (YYYY-MM-DD), default is today
        #[arg(short, long)]
        date: Option<String>,

        /// Only aggregate this station
        #[arg(short, long)]
        station: Option<String>,
    },

    /// Show recent daily statistics for a station
    History {
        /// Station identifier
        station: String,

        /// Number of days to include, ending today
        #[arg(long, default_value = "7")]
        days: u32,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Export stored snapshots as CSV
    Export {
        /// Only export this station
        #[arg(short, long)]
        station: Option<String>,

        /// First date to include (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Last date to include (YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,

        /// Write CSV to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show database row counts
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
