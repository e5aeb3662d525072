//! Run lookup and cleanup helpers built on [`PortalApi`]

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{info, warn};

use super::api::PortalApi;
use super::models::{RunDetail, RunSummary};

/// Ids of every listed run that belongs to `experiment_id`
pub async fn runs_for_experiment(api: &dyn PortalApi, experiment_id: i64) -> Result<Vec<i64>> {
    let runs = api.get_runs(None).await?;
    Ok(runs
        .iter()
        .filter(|run| run.experiment_id == Some(experiment_id))
        .map(|run| run.id)
        .collect())
}

/// Delete runs in order, stopping at the first failure
pub async fn delete_runs(api: &dyn PortalApi, run_ids: &[i64]) -> Result<usize> {
    for (deleted, run_id) in run_ids.iter().enumerate() {
        api.delete_run(*run_id)
            .await
            .with_context(|| format!("Deleted {} of {} runs", deleted, run_ids.len()))?;
        info!(run_id, "deleted run");
    }
    Ok(run_ids.len())
}

/// Id of the run named `name` within `experiment_id`
pub fn find_run_id(runs: &[RunSummary], experiment_id: i64, name: &str) -> Option<i64> {
    runs.iter()
        .find(|run| run.experiment_id == Some(experiment_id) && run.name.as_deref() == Some(name))
        .map(|run| run.id)
}

/// Experiment id of the first run under `project_name`, optionally also
/// matching the run name
pub fn find_experiment_id(
    runs: &[RunSummary],
    project_name: &str,
    run_name: Option<&str>,
) -> Option<i64> {
    runs.iter()
        .filter(|run| run.project_name.as_deref() == Some(project_name))
        .find(|run| run_name.is_none() || run.name.as_deref() == run_name)
        .and_then(|run| run.experiment_id)
}

/// Fetch a run and log its replication progress; errors are logged, not raised
pub async fn show_run(api: &dyn PortalApi, run_id: i64, show_status: bool) -> Option<RunDetail> {
    match api.get_run(run_id).await {
        Ok(run) => {
            if show_status {
                info!(
                    "Status of run {} at {}: {} ({}/{})",
                    run_id,
                    Local::now().format("%Y-%m-%d %H:%M"),
                    run.status,
                    run.completed_replications,
                    run.total_replications
                );
            }
            Some(run)
        }
        Err(e) => {
            warn!("Error checking run status: {:#}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPortal;

    fn summary(id: i64, experiment_id: i64, name: &str, project: &str) -> RunSummary {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "experimentId": experiment_id,
            "name": name,
            "projectName": project,
            "status": "Completed"
        }))
        .unwrap()
    }

    #[test]
    fn test_find_run_id() {
        let runs = vec![
            summary(1, 206, "API01", "Line"),
            summary(2, 207, "API01", "Line"),
            summary(3, 206, "API02", "Line"),
        ];
        assert_eq!(find_run_id(&runs, 206, "API02"), Some(3));
        assert_eq!(find_run_id(&runs, 207, "API01"), Some(2));
        assert_eq!(find_run_id(&runs, 208, "API01"), None);
    }

    #[test]
    fn test_find_experiment_id() {
        let runs = vec![
            summary(1, 206, "API01", "Line"),
            summary(2, 300, "Base", "Clinic"),
            summary(3, 301, "Alt", "Clinic"),
        ];
        assert_eq!(find_experiment_id(&runs, "Clinic", None), Some(300));
        assert_eq!(find_experiment_id(&runs, "Clinic", Some("Alt")), Some(301));
        assert_eq!(find_experiment_id(&runs, "Clinic", Some("Nope")), None);
        assert_eq!(find_experiment_id(&runs, "Nowhere", None), None);
    }

    #[tokio::test]
    async fn test_runs_for_experiment_and_delete() {
        let portal = ScriptedPortal::default().with_runs(vec![
            summary(1, 206, "A", "Line"),
            summary(2, 207, "B", "Line"),
            summary(3, 206, "C", "Line"),
        ]);

        let ids = runs_for_experiment(&portal, 206).await.unwrap();
        assert_eq!(ids, vec![1, 3]);

        let deleted = delete_runs(&portal, &ids).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(portal.deleted_runs(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_delete_stops_at_first_failure() {
        let portal = ScriptedPortal::default().failing_delete(2);
        let result = delete_runs(&portal, &[1, 2, 3]).await;
        assert!(result.is_err());
        assert_eq!(portal.deleted_runs(), vec![1]);
    }

    #[tokio::test]
    async fn test_show_run_swallows_errors() {
        let portal = ScriptedPortal::default().with_statuses(["Running"]);
        let run = show_run(&portal, 5, true).await.unwrap();
        assert_eq!(run.status.as_str(), "Running");

        // Script exhausted: the query fails and the helper returns None
        assert!(show_run(&portal, 5, false).await.is_none());
    }
}
