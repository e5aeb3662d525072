//! Full factorial experiment design and the run payload built from it

pub mod generator;
pub mod levels;
pub mod payload;
pub mod preview;

pub use generator::{ControlAssignment, Scenario, full_factorial, scenario_name};
pub use levels::{LevelValue, Variable, VariableLevels};
pub use payload::ExperimentPayload;

/// Errors raised while assembling variable levels
#[derive(Debug, thiserror::Error)]
pub enum DesignError {
    #[error("variable '{0}' is defined more than once")]
    DuplicateVariable(String),
    #[error("variable names cannot be empty")]
    EmptyVariableName,
    #[error("invalid variable specification '{0}'. Expected format: 'name=level1,level2'")]
    InvalidVarSpec(String),
    #[error("design has more combinations than can be enumerated")]
    TooManyCombinations,
}
