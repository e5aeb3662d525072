//! High-level runner API for the experiment runner.
//!
//! This module wraps portal authentication, credential refresh, run
//! submission, status polling and result reporting behind a few entry points.
//!
//! This is the primary API for external users and for the CLI.

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use derive_builder::Builder;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ACCESS_TOKEN_ENV, AUTH_REFRESH_INTERVAL, DEFAULT_ROWS_TO_SHOW, PORTAL_URL_ENV};
use crate::design::{ExperimentPayload, VariableLevels};
use crate::monitor::{self, MonitorError, PollConfig, PollOutcome, WatchOutcome};
use crate::portal::{HttpPortal, PortalApi, RefreshTask, ScenarioResult, housekeeping};
use crate::results::{FlattenedResults, Report, SortDirection, flatten, top_rows};
use crate::telemetry::{PollEvent, PollStats};

pub use crate::monitor::PollConfigBuilder;
pub use crate::portal::{RunDetail, RunStatus};

/// Ensure a personal access token is present before any network call
pub fn require_token(token: Option<&str>) -> Result<&str> {
    match token.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(anyhow!(
            "Personal access token not found. Set {} or pass --token.",
            ACCESS_TOKEN_ENV
        )),
    }
}

/// Ensure a portal URL is present
pub fn require_portal_url(url: Option<&str>) -> Result<&str> {
    match url.map(str::trim) {
        Some(u) if !u.is_empty() => Ok(u),
        _ => Err(anyhow!(
            "Portal URL not found. Set {} or pass --portal-url.",
            PORTAL_URL_ENV
        )),
    }
}

/// An authenticated portal connection with an optional background refresh
pub struct Session {
    api: Arc<dyn PortalApi>,
    refresh: Option<RefreshTask>,
}

impl Session {
    /// Connect to the portal over HTTPS and authenticate
    pub async fn connect(
        portal_url: Option<&str>,
        access_token: Option<&str>,
        refresh_every: Option<Duration>,
    ) -> Result<Self> {
        let token = require_token(access_token)?;
        let url = require_portal_url(portal_url)?;
        info!("Connecting to portal on: {}", url);
        let api: Arc<dyn PortalApi> = Arc::new(HttpPortal::new(url)?);
        Self::open(api, token, refresh_every).await
    }

    /// Authenticate against an existing API handle
    pub async fn open(
        api: Arc<dyn PortalApi>,
        access_token: &str,
        refresh_every: Option<Duration>,
    ) -> Result<Self> {
        let token = require_token(Some(access_token))?;
        api.authenticate(token)
            .await
            .context("Failed to authenticate with the portal")?;

        let refresh =
            refresh_every.map(|period| RefreshTask::spawn(Arc::clone(&api), token.to_string(), period));

        Ok(Self { api, refresh })
    }

    pub fn api(&self) -> &dyn PortalApi {
        self.api.as_ref()
    }

    /// Stop the refresh task, if any
    pub async fn close(mut self) {
        if let Some(refresh) = self.refresh.take() {
            refresh.shutdown().await;
        }
    }
}

/// Configuration for submitting and following one experiment run
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct RunConfig {
    pub experiment_id: i64,
    pub run_name: String,
    pub replications: NonZeroU32,
    pub levels: VariableLevels,
    #[builder(default)]
    pub poll: PollConfig,
    #[builder(default = "Some(AUTH_REFRESH_INTERVAL)")]
    pub auth_refresh: Option<Duration>,
    /// Response to rank scenarios by; no report without it
    #[builder(default)]
    pub sort_by: Option<String>,
    #[builder(default = "SortDirection::Descending")]
    pub direction: SortDirection,
    #[builder(default = "DEFAULT_ROWS_TO_SHOW")]
    pub rows_to_show: usize,
    #[builder(default)]
    pub quiet: bool,
}

/// Result of a submitted and monitored run
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: i64,
    pub scenario_count: usize,
    pub total_replications: u64,
    pub poll: PollOutcome,
    pub final_run: Option<RunDetail>,
    /// Present once the run reached a terminal status
    pub results: Option<FlattenedResults>,
    pub report: Option<Report>,
}

/// Build the design, submit it, wait for the run and report its results
///
/// A missing token fails before anything is sent. A failed status query ends
/// the wait with an error.
///
/// # Example
///
/// ```no_run
/// use simio_runner::design::VariableLevels;
/// use simio_runner::runner::{RunConfigBuilder, Session, run_experiment};
/// use std::num::NonZeroU32;
///
/// # async fn example() -> anyhow::Result<()> {
/// let levels = VariableLevels::new().with("Buff1", [3i64])?.with("CapA", [2i64, 4])?;
/// let config = RunConfigBuilder::default()
///     .experiment_id(206)
///     .run_name("API01")
///     .replications(NonZeroU32::new(6).unwrap())
///     .levels(levels)
///     .sort_by(Some("Throughput".to_string()))
///     .build()?;
///
/// let session = Session::connect(
///     Some("https://portal.example.com"),
///     Some("my-token"),
///     config.auth_refresh,
/// )
/// .await?;
/// let outcome = run_experiment(&session, &config).await?;
/// println!("Run {} finished with {}", outcome.run_id, outcome.poll.status);
/// session.close().await;
/// # Ok(())
/// # }
/// ```
pub async fn run_experiment(session: &Session, config: &RunConfig) -> Result<RunOutcome> {
    let api = session.api();

    let payload = ExperimentPayload::full_factorial(
        config.experiment_id,
        config.run_name.clone(),
        config.replications,
        &config.levels,
    )
    .context("Failed to build the experiment design")?;
    info!(
        "Experiment {} has {} scenarios and {} total replications.",
        payload.name,
        payload.scenario_count(),
        payload.total_replications()
    );

    let run_id = api
        .start_run(&payload)
        .await
        .with_context(|| format!("Failed to start run '{}'", config.run_name))?;
    info!(
        "Started run {} ({}) with {} scenarios at {}.",
        config.run_name,
        run_id,
        payload.scenario_count(),
        Local::now().format("%Y-%m-%d %H:%M")
    );
    housekeeping::show_run(api, run_id, !config.quiet).await;

    let poll = wait_with_progress(api, run_id, config).await?;

    let final_run = housekeeping::show_run(api, run_id, !config.quiet).await;
    let waited = poll.waited(config.poll.interval);
    info!(
        "Final run status after approx. {:.2} minutes ({} cycles): {}",
        waited.as_secs_f64() / 60.0,
        poll.cycles,
        poll.status
    );

    let (results, report) = if poll.status.is_terminal() {
        let scenario_results = api
            .get_scenario_results(run_id)
            .await
            .with_context(|| format!("Failed to fetch results for run {}", run_id))?;
        let (flattened, report) = summarize_results(
            &scenario_results,
            config.sort_by.as_deref(),
            config.direction,
            config.rows_to_show,
        );
        (Some(flattened), report)
    } else {
        warn!(
            "Run {} still {} after {} cycles; skipping results",
            run_id, poll.status, poll.cycles
        );
        (None, None)
    };

    Ok(RunOutcome {
        run_id,
        scenario_count: payload.scenario_count(),
        total_replications: payload.total_replications(),
        poll,
        final_run,
        results,
        report,
    })
}

/// Flatten results and, when a sort column is given, rank the top rows
pub fn summarize_results(
    results: &[ScenarioResult],
    sort_by: Option<&str>,
    direction: SortDirection,
    rows_to_show: usize,
) -> (FlattenedResults, Option<Report>) {
    rank_results(flatten(results), sort_by, direction, rows_to_show)
}

/// Load saved scenario results JSON and summarize it like a fetched run
pub async fn results_from_file(
    path: impl AsRef<Path>,
    sort_by: Option<&str>,
    direction: SortDirection,
    rows_to_show: usize,
) -> Result<(FlattenedResults, Option<Report>)> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read results file '{}'", path.display()))?;
    let flattened = FlattenedResults::from_json(&content)
        .with_context(|| format!("Invalid results file '{}'", path.display()))?;
    info!(
        "Loaded {} scenario results from {}",
        flattened.rows.len(),
        path.display()
    );
    Ok(rank_results(flattened, sort_by, direction, rows_to_show))
}

fn rank_results(
    flattened: FlattenedResults,
    sort_by: Option<&str>,
    direction: SortDirection,
    rows_to_show: usize,
) -> (FlattenedResults, Option<Report>) {
    let report = sort_by.map(|column| {
        if !flattened.responses.contains(column) && !flattened.controls.contains(column) {
            warn!("Sort column '{}' not present in results", column);
        }
        let report = top_rows(&flattened.rows, column, direction, rows_to_show);
        if report.dropped > 0 {
            warn!(
                "Dropped {} rows with non-numeric '{}' values",
                report.dropped, column
            );
        }
        report
    });
    (flattened, report)
}

/// Fetch and summarize the results of an existing run
pub async fn fetch_results(
    session: &Session,
    run_id: i64,
    sort_by: Option<&str>,
    direction: SortDirection,
    rows_to_show: usize,
) -> Result<(FlattenedResults, Option<Report>)> {
    let results = session
        .api()
        .get_scenario_results(run_id)
        .await
        .with_context(|| format!("Failed to fetch results for run {}", run_id))?;
    info!("Fetched {} scenario results for run {}", results.len(), run_id);
    Ok(summarize_results(&results, sort_by, direction, rows_to_show))
}

/// Follow a run through its experiment's run listing
pub async fn watch(
    session: &Session,
    experiment_id: i64,
    run_id: i64,
    poll: &PollConfig,
) -> Result<WatchOutcome, MonitorError> {
    monitor::watch_run(session.api(), experiment_id, run_id, poll, None).await
}

/// Delete every run of an experiment; with `dry_run` only list them
pub async fn cleanup_experiment(
    session: &Session,
    experiment_id: i64,
    dry_run: bool,
) -> Result<Vec<i64>> {
    let run_ids = housekeeping::runs_for_experiment(session.api(), experiment_id).await?;
    info!(
        "Found {} runs for experiment {}",
        run_ids.len(),
        experiment_id
    );
    if !dry_run {
        housekeeping::delete_runs(session.api(), &run_ids).await?;
    }
    Ok(run_ids)
}

async fn wait_with_progress(
    api: &dyn PortalApi,
    run_id: i64,
    config: &RunConfig,
) -> Result<PollOutcome> {
    let (events_tx, progress) = if config.quiet {
        (None, None)
    } else {
        let (tx, rx) = mpsc::unbounded_channel::<PollEvent>();
        (Some(tx), Some(setup_progress_tracking(rx)))
    };

    let outcome = monitor::wait_for_run(api, run_id, &config.poll, events_tx.as_ref()).await;

    // Close the channel so the progress task can finish
    drop(events_tx);
    if let Some(jh) = progress
        && let Ok(stats) = jh.await
    {
        info!(
            "Observed {} status changes over {} cycles",
            stats.transitions.len(),
            stats.cycles_observed
        );
    }

    outcome.with_context(|| format!("Stopped waiting for run {}", run_id))
}

/// Spinner fed by poll events until the sender side closes
fn setup_progress_tracking(
    mut events_rx: mpsc::UnboundedReceiver<PollEvent>,
) -> JoinHandle<PollStats> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("[{elapsed_precise}] {spinner} Run {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(250));

    tokio::spawn(async move {
        let mut stats = PollStats::new();
        spinner.set_message(stats.describe());

        while let Some(event) = events_rx.recv().await {
            stats.update(&event);
            spinner.set_message(stats.describe());
        }

        spinner.finish_with_message(stats.describe());
        stats
    })
}
