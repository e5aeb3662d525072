use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use anyhow::{Context, Result};

use crate::config::TABLE_PRECISION;
use crate::portal::ScenarioResult;

/// Suffix of the column holding a response's confidence-interval half-width
pub const HALF_WIDTH_SUFFIX: &str = "-h";

/// Name of the leading column in every flattened table
pub const SCENARIO_COLUMN: &str = "scenarioName";

/// A single table cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    /// Numeric when `raw` parses as a float, otherwise the original text
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(x) => Cell::Number(x),
            Err(_) => Cell::Text(raw.to_string()),
        }
    }

    /// Numeric view of the cell; NaN counts as missing
    pub fn as_number(&self) -> Option<f64> {
        let x = match self {
            Cell::Number(x) => *x,
            Cell::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        (!x.is_nan()).then_some(x)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(x) if x.fract() == 0.0 && x.abs() < 1e15 => write!(f, "{x:.0}"),
            Cell::Number(x) => write!(f, "{x:.prec$}", prec = TABLE_PRECISION),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

/// One scenario's results as a flat row of named cells
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRow {
    pub scenario_name: String,
    pub cells: BTreeMap<String, Cell>,
}

impl FlatRow {
    pub fn new(scenario_name: impl Into<String>) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            cells: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, cell: impl Into<Cell>) -> Self {
        self.cells.insert(column.into(), cell.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.get(column)
    }
}

/// Flattened rows plus the response and control names seen across the batch
#[derive(Debug, Clone, Default)]
pub struct FlattenedResults {
    pub rows: Vec<FlatRow>,
    pub responses: BTreeSet<String>,
    pub controls: BTreeSet<String>,
}

impl FlattenedResults {
    /// Parse a JSON array of scenario results and flatten it
    pub fn from_json(json: &str) -> Result<Self> {
        let results: Vec<ScenarioResult> =
            serde_json::from_str(json).context("Failed to parse scenario results JSON")?;
        Ok(flatten(&results))
    }

    /// Display order: scenario name, controls, then each response followed by
    /// its half-width
    pub fn column_order(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(1 + self.controls.len() + 2 * self.responses.len());
        columns.push(SCENARIO_COLUMN.to_string());
        columns.extend(self.controls.iter().cloned());
        for response in &self.responses {
            columns.push(response.clone());
            columns.push(half_width_column(response));
        }
        columns
    }
}

pub fn half_width_column(response: &str) -> String {
    format!("{response}{HALF_WIDTH_SUFFIX}")
}

/// Flatten scenario results into one row per record
///
/// Control values are coerced per value, so a column may mix numbers and
/// text across rows. Duplicate scenario names are kept as separate rows.
pub fn flatten(results: &[ScenarioResult]) -> FlattenedResults {
    let mut flattened = FlattenedResults {
        rows: Vec::with_capacity(results.len()),
        ..Default::default()
    };

    for result in results {
        let mut row = FlatRow::new(&result.scenario_name);

        for response in &result.response_values {
            flattened.responses.insert(response.name.clone());
            row.cells
                .insert(response.name.clone(), Cell::Number(response.average));
            row.cells.insert(
                half_width_column(&response.name),
                Cell::Number(response.half_width),
            );
        }

        // Controls after responses: a control sharing a response's name wins
        for control in &result.control_values {
            flattened.controls.insert(control.name.clone());
            row.cells
                .insert(control.name.clone(), Cell::coerce(&control.value));
        }

        flattened.rows.push(row);
    }

    flattened
}
