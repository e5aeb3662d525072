use std::num::NonZeroU32;

use serde::{Serialize, Serializer};

use super::DesignError;
use super::generator::{Scenario, full_factorial};
use super::levels::VariableLevels;

/// Experiment run definition in the shape the portal expects
///
/// Serializes as
/// `{"ExperimentID": .., "Name": .., "CreateInfo": {"Scenarios": [..]}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentPayload {
    pub experiment_id: i64,
    pub name: String,
    pub scenarios: Vec<Scenario>,
}

impl ExperimentPayload {
    pub fn new(experiment_id: i64, name: impl Into<String>, scenarios: Vec<Scenario>) -> Self {
        Self {
            experiment_id,
            name: name.into(),
            scenarios,
        }
    }

    /// Build a payload holding the full factorial design of `levels`
    pub fn full_factorial(
        experiment_id: i64,
        name: impl Into<String>,
        replications: NonZeroU32,
        levels: &VariableLevels,
    ) -> Result<Self, DesignError> {
        Ok(Self::new(
            experiment_id,
            name,
            full_factorial(levels, replications)?,
        ))
    }

    pub fn scenario_count(&self) -> usize {
        self.scenarios.len()
    }

    /// Total replications requested across every scenario
    pub fn total_replications(&self) -> u64 {
        self.scenarios
            .iter()
            .map(|s| u64::from(s.replications_required))
            .sum()
    }
}

impl Serialize for ExperimentPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;

        #[derive(Serialize)]
        struct CreateInfo<'a> {
            #[serde(rename = "Scenarios")]
            scenarios: &'a [Scenario],
        }

        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("ExperimentID", &self.experiment_id)?;
        map.serialize_entry("Name", &self.name)?;
        map.serialize_entry(
            "CreateInfo",
            &CreateInfo {
                scenarios: &self.scenarios,
            },
        )?;
        map.end()
    }
}
