//! Run command - continuous collection.

use std::time::Duration;

use anyhow::{Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::info;

use dockwatch_service::Config;
use dockwatch_service::config::MIN_POLL_INTERVAL;

use super::once::build_collector;

/// Execute the run command.
pub async fn cmd_run(
    config: &Config,
    interval: Option<u64>,
    duration_hours: Option<f64>,
    cancel: CancellationToken,
) -> Result<()> {
    let interval_secs = interval.unwrap_or(config.collector.interval_secs);
    if interval_secs < MIN_POLL_INTERVAL {
        bail!("Interval must be at least {MIN_POLL_INTERVAL} seconds, got {interval_secs}");
    }
    let duration = duration_hours.map(hours_to_duration).transpose()?;

    match duration {
        Some(d) => info!("Will run for {:.2} hours", d.as_secs_f64() / 3600.0),
        None => info!("Running continuously (press Ctrl+C to stop)"),
    }

    let mut collector = build_collector(config)?;
    let summary = collector
        .run_continuous(Duration::from_secs(interval_secs), duration, cancel)
        .await;

    println!(
        "Collection stopped after {} cycle(s), {} failed",
        summary.cycles, summary.failures
    );
    Ok(())
}

fn hours_to_duration(hours: f64) -> Result<Duration> {
    if !hours.is_finite() || hours <= 0.0 {
        bail!("Duration must be a positive number of hours, got {hours}");
    }
    Ok(Duration::from_secs_f64(hours * 3600.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hours_to_duration() {
        assert_eq!(hours_to_duration(1.5).unwrap(), Duration::from_secs(5400));
        assert!(hours_to_duration(0.0).is_err());
        assert!(hours_to_duration(-2.0).is_err());
        assert!(hours_to_duration(f64::NAN).is_err());
    }
}
