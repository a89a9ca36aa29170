//! COBUILD LLM - Planner capability
//!
//! An agent hands a rendered prompt to a [`Planner`] and gets raw text back.
//! Turning that text into an action is the job of `cobuild_core::decode`;
//! nothing here interprets the answer.

use async_trait::async_trait;
use cobuild_core::PlannerError;

pub mod prompt;
pub mod providers;

pub use prompt::DecisionContext;
pub use providers::{OllamaConfig, OllamaPlanner};

// ============================================================================
// PLANNER TRAIT
// ============================================================================

/// External reasoning service that proposes the next action.
///
/// Implementations must bound every call with a timeout; failures are
/// recovered per cycle by the caller and never abort the agent.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Send `prompt` and return the service's raw answer.
    async fn propose(&self, prompt: &str) -> Result<String, PlannerError>;

    /// Short provider name used in errors and logs.
    fn provider(&self) -> &str;
}

