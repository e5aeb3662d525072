//! Bounded, fixed-interval monitoring of portal runs

pub mod poller;
pub mod watcher;

pub use poller::{PollConfig, PollConfigBuilder, PollOutcome, wait_for_run};
pub use watcher::{WatchOutcome, watch_run};

/// Reasons a monitor stops without a usable status
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("the cycle budget must allow at least one status check")]
    NoCycles,
    #[error("could not determine status of run {run_id} (cycle {cycle})")]
    StatusUnavailable {
        run_id: i64,
        cycle: u32,
        #[source]
        source: anyhow::Error,
    },
    #[error("run {run_id} not found in experiment {experiment_id}")]
    RunNotFound { run_id: i64, experiment_id: i64 },
}
