use thiserror::Error;

use common::config::ConfigError;

use crate::planner::PlannerError;

/// Errors raised while setting up rotation.
///
/// Per-tick failures are reported as [`crate::store::ReadError`] and
/// [`crate::executor::ApplyReport`] instead, since a tick never aborts
/// the service.
#[derive(Debug, Error)]
pub enum RotatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error("Failed to connect to database")]
    Connect(#[source] sqlx::Error),
}
