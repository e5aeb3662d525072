use std::time::Duration;

use derive_builder::Builder;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::MonitorError;
use crate::config::{DEFAULT_MAX_CYCLES, DEFAULT_POLL_INTERVAL};
use crate::portal::{PortalApi, RunStatus};
use crate::telemetry::PollEvent;

/// Interval and cycle budget for waiting on a run
#[derive(Debug, Clone, Builder)]
pub struct PollConfig {
    #[builder(default = "DEFAULT_POLL_INTERVAL")]
    pub interval: Duration,
    #[builder(default = "DEFAULT_MAX_CYCLES")]
    pub max_cycles: u32,
    /// Log every observed status
    #[builder(default)]
    pub show: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_cycles: DEFAULT_MAX_CYCLES,
            show: false,
        }
    }
}

/// Last observed status and the number of cycles spent waiting
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub status: RunStatus,
    pub cycles: u32,
}

impl PollOutcome {
    /// Approximate time spent waiting
    pub fn waited(&self, interval: Duration) -> Duration {
        interval * self.cycles
    }
}

/// Wait for a run to leave `Running`, `NotStarted` and `Pending`
///
/// Each cycle sleeps `interval` and then queries the run once. Returns as soon
/// as a terminal status is seen, or after `max_cycles` with whatever status was
/// seen last. A failed query ends the wait immediately; nothing is retried.
pub async fn wait_for_run(
    api: &dyn PortalApi,
    run_id: i64,
    config: &PollConfig,
    events: Option<&mpsc::UnboundedSender<PollEvent>>,
) -> Result<PollOutcome, MonitorError> {
    if config.max_cycles == 0 {
        return Err(MonitorError::NoCycles);
    }

    let mut last_status = RunStatus::unknown();
    for cycle in 1..=config.max_cycles {
        tokio::time::sleep(config.interval).await;

        let run = api.get_run(run_id).await.map_err(|source| {
            warn!("Error checking run status: {:#}", source);
            MonitorError::StatusUnavailable {
                run_id,
                cycle,
                source,
            }
        })?;

        if config.show {
            info!("Status for cycle {}: {}", cycle, run.status);
        }
        if let Some(tx) = events {
            let _ = tx.send(PollEvent::StatusObserved {
                cycle,
                status: run.status.clone(),
                message: run.status_message.clone(),
            });
        }

        last_status = run.status;
        if last_status.is_terminal() {
            return Ok(finish(last_status, cycle, config.show, events));
        }
    }

    Ok(finish(last_status, config.max_cycles, config.show, events))
}

fn finish(
    status: RunStatus,
    cycles: u32,
    show: bool,
    events: Option<&mpsc::UnboundedSender<PollEvent>>,
) -> PollOutcome {
    if show {
        info!("Exiting after {} cycles with status {}", cycles, status);
    }
    if let Some(tx) = events {
        let _ = tx.send(PollEvent::Finished {
            cycle: cycles,
            status: status.clone(),
        });
    }
    PollOutcome { status, cycles }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::PollStats;
    use crate::testing::ScriptedPortal;
    use tokio::time::Instant;

    fn config(interval_secs: u64, max_cycles: u32) -> PollConfig {
        PollConfigBuilder::default()
            .interval(Duration::from_secs(interval_secs))
            .max_cycles(max_cycles)
            .show(true)
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_terminal_status() {
        let portal =
            ScriptedPortal::default().with_statuses(["NotStarted", "Running", "Running", "Completed"]);
        let start = Instant::now();

        let outcome = wait_for_run(&portal, 11, &config(10, 2000), None)
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Other("Completed".into()));
        assert_eq!(outcome.cycles, 4);
        assert_eq!(portal.get_run_calls(), 4);
        // one sleep per cycle
        assert_eq!(start.elapsed(), Duration::from_secs(40));
        assert_eq!(outcome.waited(Duration::from_secs(10)), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_returns_last_status() {
        let portal = ScriptedPortal::default().with_statuses(["Running"; 10]);

        let outcome = wait_for_run(&portal, 11, &config(5, 3), None)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome {
            status: RunStatus::Running,
            cycles: 3,
        });
        assert_eq!(portal.get_run_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_is_not_terminal() {
        let portal = ScriptedPortal::default().with_statuses(["Pending", "Failed"]);
        let outcome = wait_for_run(&portal, 1, &config(1, 10), None)
            .await
            .unwrap();
        assert_eq!(outcome.status.as_str(), "Failed");
        assert_eq!(outcome.cycles, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_error_aborts_without_retry() {
        let portal = ScriptedPortal::default()
            .with_statuses(["Running"])
            .with_status_error("connection reset")
            .with_statuses(["Completed"]);

        let err = wait_for_run(&portal, 3, &config(1, 10), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MonitorError::StatusUnavailable { run_id: 3, cycle: 2, .. }
        ));
        assert_eq!(portal.get_run_calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_cycles_rejected() {
        let portal = ScriptedPortal::default().with_statuses(["Completed"]);
        let err = wait_for_run(&portal, 3, &config(1, 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::NoCycles));
        assert_eq!(portal.get_run_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_events() {
        let portal = ScriptedPortal::default().with_statuses(["Running", "Completed"]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        wait_for_run(&portal, 1, &config(1, 10), Some(&tx))
            .await
            .unwrap();
        drop(tx);

        let mut stats = PollStats::new();
        while let Some(event) = rx.recv().await {
            stats.update(&event);
        }
        assert!(stats.finished);
        assert_eq!(stats.cycles_observed, 2);
        assert_eq!(stats.transitions.len(), 2);
    }

    #[test]
    fn test_builder_defaults() {
        let config = PollConfigBuilder::default().build().unwrap();
        assert_eq!(config.interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.max_cycles, DEFAULT_MAX_CYCLES);
        assert!(!config.show);
    }
}
