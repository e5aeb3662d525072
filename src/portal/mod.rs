//! Portal access layer - typed API, HTTP client, and credential refresh

pub mod api;
pub mod credential;
pub mod housekeeping;
pub mod http;
pub mod models;

pub use api::PortalApi;
pub use credential::{CredentialHolder, RefreshTask};
pub use http::HttpPortal;
pub use models::{
    ControlValue, ResponseValue, RunDetail, RunStatus, RunSummary, ScenarioResult, SubRunStatus,
};
