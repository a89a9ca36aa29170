//! One-shot checkpoint at the run deadline.
//!
//! Only the role-A agent of a pair writes and archives; role B's deadline
//! passes without touching storage. Nothing here can fail the process:
//! storage and archive errors are logged and the agent still exits cleanly.

use cobuild_core::{Checkpoint, PairId, Role};
use cobuild_storage::{Archiver, CheckpointStore};
use std::sync::Arc;

/// What happened at the deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// This role does not checkpoint.
    Skipped,
    Archived { key: String },
    /// Checkpoint was attempted but archival (or the local write) failed.
    ArchiveFailed { key: String, error: String },
}

pub struct CheckpointCoordinator {
    role: Role,
    pair: PairId,
    store: CheckpointStore,
    archiver: Arc<dyn Archiver>,
}

impl std::fmt::Debug for CheckpointCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointCoordinator")
            .field("role", &self.role)
            .field("pair", &self.pair)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl CheckpointCoordinator {
    pub fn new(role: Role, pair: PairId, store: CheckpointStore, archiver: Arc<dyn Archiver>) -> Self {
        Self {
            role,
            pair,
            store,
            archiver,
        }
    }

    /// Persist `memo` for the pair and archive it, exactly once, if this
    /// agent holds role A.
    pub async fn on_deadline(&self, memo: &str) -> CheckpointOutcome {
        if !self.role.owns_checkpoint() {
            tracing::info!(pair_id = %self.pair, role = %self.role, "Deadline reached, partner owns the checkpoint");
            return CheckpointOutcome::Skipped;
        }

        let checkpoint = Checkpoint::new(self.pair, memo);
        let key = checkpoint.key();
        let mut local_error = None;
        let blob = match self.store.write(&checkpoint).await {
            Ok(stored) => {
                tracing::info!(pair_id = %self.pair, path = %stored.path.display(), memo, "Checkpoint written");
                stored.blob
            }
            Err(e) => {
                tracing::error!(pair_id = %self.pair, error = %e, "Checkpoint write failed, archiving anyway");
                local_error = Some(e.to_string());
                match serde_json::to_vec(&checkpoint) {
                    Ok(blob) => blob,
                    Err(e) => {
                        return CheckpointOutcome::ArchiveFailed {
                            key,
                            error: e.to_string(),
                        }
                    }
                }
            }
        };

        match self.archiver.save(&key, &blob).await {
            Ok(()) if local_error.is_none() => {
                tracing::info!(pair_id = %self.pair, key = %key, "Checkpoint archived");
                CheckpointOutcome::Archived { key }
            }
            Ok(()) => CheckpointOutcome::ArchiveFailed {
                key,
                error: local_error.unwrap_or_default(),
            },
            Err(e) => {
                tracing::error!(pair_id = %self.pair, key = %key, error = %e, "Archive failed, exiting without it");
                CheckpointOutcome::ArchiveFailed {
                    key,
                    error: e.to_string(),
                }
            }
        }
    }
}
