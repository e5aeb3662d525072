// Public API - the runner is the main entry point, the rest is exposed for
// callers that drive the steps themselves
pub mod runner;

pub mod config;
pub mod design;
pub mod monitor;
pub mod portal;
pub mod results;
pub mod telemetry;

#[cfg(test)]
mod testing;
