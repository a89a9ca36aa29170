//! Wire-level entities exchanged between agents, the hub and storage.

use crate::{PairId, Timestamp, WorkspaceRegion};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Memo reported for a pair that has never checkpointed.
pub const NOT_STARTED_MEMO: &str = "not started";

/// Per-request task configuration handed to an agent.
///
/// Recomputed on every fetch from the persisted memo and the pair's region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaskConfig {
    /// Natural-language description of what the pair should build
    pub task: String,
    /// Memo from the pair's last checkpoint
    pub last_memo: String,
    /// Region both agents of the pair build inside
    pub range: WorkspaceRegion,
}

/// One relayed chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatMessage {
    /// Sender's agent name
    pub from: String,
    pub text: String,
    /// When the hub accepted the message
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub time: Timestamp,
}

impl ChatMessage {
    pub fn new(from: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            text: text.into(),
            time: Utc::now(),
        }
    }
}

/// Latest progress line from an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProgressReport {
    /// Reporting agent's name
    pub name: String,
    #[serde(rename = "pairId")]
    #[cfg_attr(feature = "openapi", schema(value_type = u32, minimum = 1))]
    pub pair_id: PairId,
    pub msg: String,
}

/// Pair-scoped durable progress marker, written once per run by role A.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "pair")]
    pub pair_id: PairId,
    pub memo: String,
    #[serde(rename = "date")]
    pub timestamp: Timestamp,
}

impl Checkpoint {
    pub fn new(pair_id: PairId, memo: impl Into<String>) -> Self {
        Self {
            pair_id,
            memo: memo.into(),
            timestamp: Utc::now(),
        }
    }

    /// Stable storage key for a pair's checkpoint.
    pub fn key_for(pair_id: PairId) -> String {
        format!("progress_p{}", pair_id)
    }

    pub fn key(&self) -> String {
        Self::key_for(self.pair_id)
    }
}
