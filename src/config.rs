//! Configuration constants for the experiment runner
//!
//! This module centralizes all tunable parameters and constants used throughout
//! the application.

use std::time::Duration;

// ============================================================================
// Portal Connection Configuration
// ============================================================================

/// Environment variable holding the portal base URL
pub const PORTAL_URL_ENV: &str = "SIMIO_PORTAL_URL";

/// Environment variable holding the personal access token
pub const ACCESS_TOKEN_ENV: &str = "PERSONAL_ACCESS_TOKEN";

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How often the bearer token is re-issued from the personal access token
///
/// Portal bearer tokens outlive this interval, so a request racing a refresh
/// still carries a token the service accepts.
pub const AUTH_REFRESH_INTERVAL: Duration = Duration::from_secs(500);

/// Purpose string sent with the personal access token when authenticating
pub const AUTH_PURPOSE: &str = "PublicApi";

// ============================================================================
// API Paths (relative to the portal base URL)
// ============================================================================

pub const AUTH_PATH: &str = "api/auth";
pub const RUNS_PATH: &str = "api/v1/runs";
pub const CREATE_RUN_PATH: &str = "api/v1/runs/create-from-experiment";

// ============================================================================
// Polling Configuration
// ============================================================================

/// Default wait between run status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default cycle budget for the run poller
///
/// 2000 cycles at the default interval covers a run of roughly five and a half
/// hours.
pub const DEFAULT_MAX_CYCLES: u32 = 2000;

// ============================================================================
// Report Configuration
// ============================================================================

pub const DEFAULT_ROWS_TO_SHOW: usize = 10;

/// Decimal places used for numeric cells in rendered tables
pub const TABLE_PRECISION: usize = 4;
