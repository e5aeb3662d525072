//! In-memory portal used by unit and integration tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::design::ExperimentPayload;
use crate::portal::{
    ControlValue, PortalApi, ResponseValue, RunDetail, RunStatus, RunSummary, ScenarioResult,
};

/// Run id handed out by [`ScriptedPortal::start_run`]
pub const SCRIPTED_RUN_ID: i64 = 4242;

/// Portal that replays scripted statuses and listings
///
/// `get_run` pops one scripted status per call and fails once the script is
/// exhausted. Run listings are consumed in order, repeating the final one.
/// Scenario results are simulated from the last submitted payload unless
/// explicit results were provided.
#[derive(Default)]
pub struct ScriptedPortal {
    statuses: Mutex<VecDeque<Result<String, String>>>,
    listings: Mutex<VecDeque<Result<Vec<RunSummary>, String>>>,
    results: Option<Vec<ScenarioResult>>,
    submitted: Mutex<Option<ExperimentPayload>>,
    deleted: Mutex<Vec<i64>>,
    listing_requests: Mutex<Vec<Option<i64>>>,
    fail_delete: Option<i64>,
    fail_auth: bool,
    auth_calls: AtomicUsize,
    get_run_calls: AtomicUsize,
}

impl ScriptedPortal {
    pub fn with_statuses<S: Into<String>>(self, statuses: impl IntoIterator<Item = S>) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .extend(statuses.into_iter().map(|s| Ok(s.into())));
        self
    }

    pub fn with_status_error(self, message: &str) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn with_runs(self, runs: Vec<RunSummary>) -> Self {
        self.listings.lock().unwrap().push_back(Ok(runs));
        self
    }

    pub fn with_listing_error(self, message: &str) -> Self {
        self.listings
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn with_results(mut self, results: Vec<ScenarioResult>) -> Self {
        self.results = Some(results);
        self
    }

    pub fn failing_delete(mut self, run_id: i64) -> Self {
        self.fail_delete = Some(run_id);
        self
    }

    pub fn failing_auth(mut self) -> Self {
        self.fail_auth = true;
        self
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn get_run_calls(&self) -> usize {
        self.get_run_calls.load(Ordering::SeqCst)
    }

    pub fn deleted_runs(&self) -> Vec<i64> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn listing_requests(&self) -> Vec<Option<i64>> {
        self.listing_requests.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Option<ExperimentPayload> {
        self.submitted.lock().unwrap().clone()
    }

    /// One result per submitted scenario: throughput rises with the
    /// scenario's position, half-width is a tenth of it
    fn simulate_results(payload: &ExperimentPayload) -> Vec<ScenarioResult> {
        payload
            .scenarios
            .iter()
            .enumerate()
            .map(|(i, scenario)| {
                let average = 10.0 * (i + 1) as f64;
                ScenarioResult {
                    scenario_name: scenario.name.clone(),
                    control_values: scenario
                        .control_values
                        .iter()
                        .map(|c| ControlValue {
                            name: c.name.clone(),
                            value: c.value.clone(),
                        })
                        .collect(),
                    response_values: vec![ResponseValue {
                        name: "Throughput".to_string(),
                        average,
                        half_width: average / 10.0,
                    }],
                }
            })
            .collect()
    }
}

#[async_trait]
impl PortalApi for ScriptedPortal {
    async fn authenticate(&self, _access_token: &str) -> Result<()> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_auth {
            return Err(anyhow!("401 Unauthorized"));
        }
        Ok(())
    }

    async fn start_run(&self, payload: &ExperimentPayload) -> Result<i64> {
        *self.submitted.lock().unwrap() = Some(payload.clone());
        Ok(SCRIPTED_RUN_ID)
    }

    async fn get_run(&self, run_id: i64) -> Result<RunDetail> {
        self.get_run_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("status script exhausted"))?;
        let status = next.map_err(|e| anyhow!(e))?;

        let total = self
            .submitted
            .lock()
            .unwrap()
            .as_ref()
            .map(ExperimentPayload::total_replications)
            .unwrap_or(0);
        let status = RunStatus::from(status);
        let completed = if status.is_terminal() { total } else { 0 };

        Ok(RunDetail {
            id: run_id,
            status,
            status_message: None,
            completed_replications: completed,
            total_replications: total,
        })
    }

    async fn get_runs(&self, experiment_id: Option<i64>) -> Result<Vec<RunSummary>> {
        self.listing_requests.lock().unwrap().push(experiment_id);
        let mut listings = self.listings.lock().unwrap();
        let next = if listings.len() > 1 {
            listings.pop_front()
        } else {
            listings.front().cloned()
        };
        match next {
            Some(Ok(runs)) => Ok(runs),
            Some(Err(e)) => Err(anyhow!(e)),
            None => Ok(Vec::new()),
        }
    }

    async fn get_scenario_results(&self, _run_id: i64) -> Result<Vec<ScenarioResult>> {
        if let Some(results) = &self.results {
            return Ok(results.clone());
        }
        let submitted = self.submitted.lock().unwrap();
        let payload = submitted
            .as_ref()
            .ok_or_else(|| anyhow!("no run has been submitted"))?;
        Ok(Self::simulate_results(payload))
    }

    async fn delete_run(&self, run_id: i64) -> Result<()> {
        if self.fail_delete == Some(run_id) {
            return Err(anyhow!("404 Not Found"));
        }
        self.deleted.lock().unwrap().push(run_id);
        Ok(())
    }
}
