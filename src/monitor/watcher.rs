use tokio::sync::mpsc;
use tracing::{info, warn};

use super::MonitorError;
use super::poller::PollConfig;
use crate::portal::{PortalApi, RunStatus};
use crate::telemetry::PollEvent;

/// Final state seen while watching a run through the run listing
#[derive(Debug, Clone, PartialEq)]
pub struct WatchOutcome {
    pub status: RunStatus,
    pub message: Option<String>,
    pub cycles: u32,
}

/// Watch a run via the experiment's run listing
///
/// Unlike [`super::wait_for_run`], this honours follow-up runs nested under
/// the listed run: the sub-run with the highest id decides the status. Stops
/// on a terminal status, when the run disappears from the listing, when the
/// listing cannot be fetched, or when the cycle budget runs out.
pub async fn watch_run(
    api: &dyn PortalApi,
    experiment_id: i64,
    run_id: i64,
    config: &PollConfig,
    events: Option<&mpsc::UnboundedSender<PollEvent>>,
) -> Result<WatchOutcome, MonitorError> {
    if config.max_cycles == 0 {
        return Err(MonitorError::NoCycles);
    }

    let mut last = WatchOutcome {
        status: RunStatus::unknown(),
        message: None,
        cycles: 0,
    };

    for cycle in 1..=config.max_cycles {
        tokio::time::sleep(config.interval).await;

        let runs = api.get_runs(Some(experiment_id)).await.map_err(|source| {
            warn!("Error checking run status: {:#}", source);
            MonitorError::StatusUnavailable {
                run_id,
                cycle,
                source,
            }
        })?;

        let Some(run) = runs.iter().find(|run| run.id == run_id) else {
            warn!(
                "Run ID {} not found in the experiment {}.",
                run_id, experiment_id
            );
            return Err(MonitorError::RunNotFound {
                run_id,
                experiment_id,
            });
        };

        let (status, message) = run.effective_status();
        let message = message.filter(|m| !m.is_empty()).map(str::to_string);

        match &message {
            Some(m) => info!("Status = {}, Message = {}", status, m),
            None => info!("Status = {}", status),
        }
        if let Some(tx) = events {
            let _ = tx.send(PollEvent::StatusObserved {
                cycle,
                status: status.clone(),
                message: message.clone(),
            });
        }

        last = WatchOutcome {
            status: status.clone(),
            message,
            cycles: cycle,
        };
        if last.status.is_terminal() {
            info!("{}", completion_line(&last));
            break;
        }
    }

    if let Some(tx) = events {
        let _ = tx.send(PollEvent::Finished {
            cycle: last.cycles,
            status: last.status.clone(),
        });
    }
    Ok(last)
}

/// Closing line for a run that reached a terminal status
fn completion_line(outcome: &WatchOutcome) -> String {
    match &outcome.message {
        Some(m) => format!("Status: {}, Message = {}", outcome.status, m),
        None => "Done".to_string(),
    }
}
