use anyhow::Result;
use async_trait::async_trait;

use super::models::{RunDetail, RunSummary, ScenarioResult};
use crate::design::ExperimentPayload;

/// Operations the runner needs from the simulation portal
#[async_trait]
pub trait PortalApi: Send + Sync {
    /// Exchange the personal access token for a session credential
    ///
    /// Calling this again re-issues the credential; later calls use the newest.
    async fn authenticate(&self, access_token: &str) -> Result<()>;

    /// Create and start a run for the experiment, returning its run id
    async fn start_run(&self, payload: &ExperimentPayload) -> Result<i64>;

    async fn get_run(&self, run_id: i64) -> Result<RunDetail>;

    /// List runs, optionally restricted to one experiment
    async fn get_runs(&self, experiment_id: Option<i64>) -> Result<Vec<RunSummary>>;

    async fn get_scenario_results(&self, run_id: i64) -> Result<Vec<ScenarioResult>>;

    async fn delete_run(&self, run_id: i64) -> Result<()>;
}
