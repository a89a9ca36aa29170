//! COBUILD Core - Entity Types
//!
//! Pure data structures shared by the hub and the agents. Everything here is
//! deterministic and free of I/O: pair identity, roles, workspace regions,
//! action plans, chat buffers and the error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod chat;
pub mod entities;
pub mod error;
pub mod plan;
pub mod region;

pub use chat::{ChatRing, ChatSnapshot, DEFAULT_CHAT_CAPACITY, MAX_CHAT_CAPACITY};
pub use entities::{ChatMessage, Checkpoint, ProgressReport, TaskConfig, NOT_STARTED_MEMO};
pub use error::{
    AgentError, ArchiveError, CobuildError, CobuildResult, ConfigError, DecodeError,
    PlannerError, RequestError, StartupError, StorageError,
};
pub use plan::{decode, validate_within, ActionPlan};
pub use region::{region_for, BlockPos, PartitionConfig, WorkspaceRegion};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Identifier of a cooperating pair of agents. Always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(try_from = "i64", into = "u32")]
pub struct PairId(u32);

impl PairId {
    /// Validate a raw pair number.
    pub fn new(raw: i64) -> Result<Self, ConfigError> {
        if raw < 1 || raw > i64::from(u32::MAX) {
            return Err(ConfigError::InvalidPair { pair_id: raw });
        }
        Ok(Self(raw as u32))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Zero-based slot used by the partition function.
    pub fn slot(self) -> u32 {
        self.0 - 1
    }
}

impl TryFrom<i64> for PairId {
    type Error = ConfigError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<PairId> for u32 {
    fn from(pair: PairId) -> Self {
        pair.0
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PairId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s
            .trim()
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidValue {
                field: "pair_id".to_string(),
                value: s.to_string(),
                reason: "must be a positive integer".to_string(),
            })?;
        Self::new(raw)
    }
}

/// Role of an agent inside its pair.
///
/// Role A owns the checkpoint for the pair; role B only builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum Role {
    A,
    B,
}

impl Role {
    /// The role held by the partner agent.
    pub fn partner(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Whether this role is responsible for persisting the pair's checkpoint.
    pub fn owns_checkpoint(self) -> bool {
        matches!(self, Self::A)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(Self::A),
            "B" | "b" => Ok(Self::B),
            other => Err(ConfigError::InvalidValue {
                field: "role".to_string(),
                value: other.to_string(),
                reason: "must be A or B".to_string(),
            }),
        }
    }
}

/// Conventional in-world name of the agent holding `role` in `pair`.
///
/// Partner identity is derived from this convention rather than
/// authenticated; any session may claim any name.
pub fn agent_name(pair: PairId, role: Role) -> String {
    format!("Bot-{}-{}", pair, role)
}

// ============================================================================
// TESTS
// ============================================================================
