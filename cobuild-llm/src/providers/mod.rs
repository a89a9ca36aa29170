//! Planner provider implementations

pub mod ollama;

pub use ollama::{OllamaConfig, OllamaPlanner};

use cobuild_core::PlannerError;

/// Map a transport-level reqwest failure onto the planner taxonomy.
pub(crate) fn transport_error(
    provider: &str,
    timeout: std::time::Duration,
    err: reqwest::Error,
) -> PlannerError {
    if err.is_timeout() {
        PlannerError::Timeout {
            provider: provider.to_string(),
            elapsed: timeout,
        }
    } else if err.is_connect() || err.is_request() {
        PlannerError::Unreachable {
            provider: provider.to_string(),
            reason: err.to_string(),
        }
    } else {
        PlannerError::InvalidResponse {
            provider: provider.to_string(),
            reason: err.to_string(),
        }
    }
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> PlannerError {
    PlannerError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}
