use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use super::DesignError;
use super::levels::VariableLevels;

/// A named control value assignment inside a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ControlAssignment {
    pub name: String,
    pub value: String,
}

/// One concrete combination of control values plus a replication count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Scenario {
    pub name: String,
    pub replications_required: u32,
    pub control_values: Vec<ControlAssignment>,
}

/// Name given to the scenario at 1-based position `index` in a design
pub fn scenario_name(index: usize) -> String {
    format!("Scenario{index}")
}

/// Expand variable levels into the full factorial design
///
/// Combinations follow Cartesian-product order over the variables as supplied,
/// with the last variable varying fastest. Scenarios are named by generation
/// position, not by their values. A variable with no levels yields an empty
/// design; no variables at all yields a single scenario without controls.
/// Fails when the design is too large to enumerate.
pub fn full_factorial(
    levels: &VariableLevels,
    replications: NonZeroU32,
) -> Result<Vec<Scenario>, DesignError> {
    let count = levels
        .combination_count()
        .ok_or(DesignError::TooManyCombinations)?;
    if count == 0 {
        return Ok(Vec::new());
    }

    let variables = levels.variables();
    let mut scenarios = Vec::new();
    scenarios
        .try_reserve_exact(count)
        .map_err(|_| DesignError::TooManyCombinations)?;
    let mut odometer = vec![0usize; variables.len()];

    loop {
        let control_values = variables
            .iter()
            .zip(&odometer)
            .map(|(variable, &idx)| ControlAssignment {
                name: variable.name.clone(),
                value: variable.levels[idx].to_string(),
            })
            .collect();

        scenarios.push(Scenario {
            name: scenario_name(scenarios.len() + 1),
            replications_required: replications.get(),
            control_values,
        });

        if !advance(&mut odometer, variables.iter().map(|v| v.levels.len())) {
            break;
        }
    }

    Ok(scenarios)
}

/// Step the odometer one position; returns false once every digit wrapped
fn advance(odometer: &mut [usize], radices: impl DoubleEndedIterator<Item = usize>) -> bool {
    for (digit, radix) in odometer.iter_mut().rev().zip(radices.rev()) {
        *digit += 1;
        if *digit < radix {
            return true;
        }
        *digit = 0;
    }
    false
}
