use crate::results::{Cell, FlatRow};

use super::generator::Scenario;

/// Column holding each scenario's replication count in the preview table
pub const REPS_COLUMN: &str = "Reps";

/// Tabulate a design before submission: one row per scenario with its
/// replication count and each control value cast back to a number when it
/// parses
pub fn scenario_rows(scenarios: &[Scenario]) -> Vec<FlatRow> {
    scenarios
        .iter()
        .map(|scenario| {
            let mut row = FlatRow::new(&scenario.name)
                .with(REPS_COLUMN, f64::from(scenario.replications_required));
            for control in &scenario.control_values {
                row.cells
                    .insert(control.name.clone(), Cell::coerce(&control.value));
            }
            row
        })
        .collect()
}

/// Column order for [`scenario_rows`]: scenario name, reps, then controls in
/// design order
pub fn scenario_columns(scenarios: &[Scenario]) -> Vec<String> {
    let mut columns = vec![
        crate::results::flatten::SCENARIO_COLUMN.to_string(),
        REPS_COLUMN.to_string(),
    ];
    for scenario in scenarios {
        for control in &scenario.control_values {
            if !columns.contains(&control.name) {
                columns.push(control.name.clone());
            }
        }
    }
    columns
}
