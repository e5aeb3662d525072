//! Wire types returned by the portal

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Run status as reported by the portal
///
/// Only `Running`, `NotStarted` and `Pending` mean the run is still in flight.
/// Every other value, including ones this crate has never seen, is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Running,
    NotStarted,
    Pending,
    Other(String),
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Other(_))
    }

    /// Placeholder used when a listing entry carries no status
    pub fn unknown() -> Self {
        RunStatus::Other("Unknown".to_string())
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Running => "Running",
            RunStatus::NotStarted => "NotStarted",
            RunStatus::Pending => "Pending",
            RunStatus::Other(s) => s,
        }
    }
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Running" => RunStatus::Running,
            "NotStarted" => RunStatus::NotStarted,
            "Pending" => RunStatus::Pending,
            _ => RunStatus::Other(value),
        }
    }
}

impl From<&str> for RunStatus {
    fn from(value: &str) -> Self {
        RunStatus::from(value.to_string())
    }
}

impl From<RunStatus> for String {
    fn from(value: RunStatus) -> Self {
        match value {
            RunStatus::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn unknown_status() -> RunStatus {
    RunStatus::unknown()
}

/// Single run as returned by the run detail endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetail {
    pub id: i64,
    #[serde(default = "unknown_status", deserialize_with = "nullable_status")]
    pub status: RunStatus,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default, deserialize_with = "nullable_u64")]
    pub completed_replications: u64,
    #[serde(default, deserialize_with = "nullable_u64")]
    pub total_replications: u64,
}

/// Status of a follow-up run nested under a listed run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRunStatus {
    pub id: i64,
    #[serde(default = "unknown_status", deserialize_with = "nullable_status")]
    pub status: RunStatus,
    #[serde(default)]
    pub status_message: Option<String>,
}

/// Entry of the run listing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub experiment_id: Option<i64>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default = "unknown_status", deserialize_with = "nullable_status")]
    pub status: RunStatus,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub additional_runs_status: Option<Vec<SubRunStatus>>,
}

impl RunSummary {
    /// Status that speaks for this run
    ///
    /// When follow-up runs are listed, the one with the highest id wins over
    /// the run's own status. This assumes the portal assigns ids in creation
    /// order; sub-runs created out of order would report a stale status.
    pub fn effective_status(&self) -> (&RunStatus, Option<&str>) {
        let latest = self
            .additional_runs_status
            .iter()
            .flatten()
            // first of equal ids wins
            .reduce(|best, sub| if sub.id > best.id { sub } else { best });

        match latest {
            Some(sub) => (&sub.status, sub.status_message.as_deref()),
            None => (&self.status, self.status_message.as_deref()),
        }
    }
}

/// Control value echoed back with a scenario's results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlValue {
    pub name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
}

/// Summary statistics for one response of a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseValue {
    pub name: String,
    #[serde(deserialize_with = "nullable_f64")]
    pub average: f64,
    #[serde(deserialize_with = "nullable_f64")]
    pub half_width: f64,
}

/// Results for one scenario of a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub scenario_name: String,
    #[serde(default)]
    pub control_values: Vec<ControlValue>,
    #[serde(default)]
    pub response_values: Vec<ResponseValue>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

/// Missing statistics arrive as `null` and are kept as NaN
fn nullable_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

fn nullable_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_status<'de, D>(deserializer: D) -> Result<RunStatus, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(RunStatus::from)
        .unwrap_or_else(RunStatus::unknown))
}
