//! Errors that stop the agent before or during startup.

use cobuild_core::{ConfigError, PlannerError, StartupError};
use thiserror::Error;

use crate::config::AgentConfigError;
use crate::hub_client::HubClientError;

#[derive(Debug, Error)]
pub enum AgentRunError {
    #[error(transparent)]
    Config(#[from] AgentConfigError),
    #[error("Invalid identity: {0}")]
    Identity(#[from] ConfigError),
    #[error("Logging setup failed: {0}")]
    Telemetry(#[from] cobuild_hub::ApiError),
    #[error("Hub client setup failed: {0}")]
    HubClient(#[from] HubClientError),
    #[error("Planner setup failed: {0}")]
    Planner(#[from] PlannerError),
    #[error(transparent)]
    Startup(#[from] StartupError),
}

pub type AgentRunResult<T> = Result<T, AgentRunError>;
