//! Error types for COBUILD operations

use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid pair id {pair_id}: must be a positive integer")]
    InvalidPair { pair_id: i64 },

    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Planner output that could not be turned into an action plan.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed plan: {reason}")]
    Malformed { reason: String },
}

impl DecodeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Hub request validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Bad input for {field}: {reason}")]
    BadInput { field: String, reason: String },
}

/// Agent startup errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StartupError {
    #[error("Hub at {url} unreachable after {attempts} attempts: {last_error}")]
    HubUnreachable {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

/// Agent runtime errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("World session lost for {agent}: {reason}")]
    SessionLost { agent: String, reason: String },
}

/// Planner (external reasoning service) errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlannerError {
    #[error("Planner {provider} timed out after {elapsed:?}")]
    Timeout { provider: String, elapsed: Duration },

    #[error("Planner {provider} unreachable: {reason}")]
    Unreachable { provider: String, reason: String },

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Archival errors. Always recovered by the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("Archive save failed for {key}: {reason}")]
    SaveFailed { key: String, reason: String },
}

/// Checkpoint storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Corrupt checkpoint at {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Master error type for all COBUILD errors.
#[derive(Debug, Clone, Error)]
pub enum CobuildError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Startup error: {0}")]
    Startup(#[from] StartupError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Planner error: {0}")]
    Planner(#[from] PlannerError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for COBUILD operations.
pub type CobuildResult<T> = Result<T, CobuildError>;

// =============================================================================
// TESTS
// =============================================================================
