//! File-backed checkpoint store.
//!
//! One JSON file per pair, named after [`Checkpoint::key_for`]:
//!
//! ```text
//! {data_dir}/progress_p{pair}.json  ->  {"pair": 1, "memo": "...", "date": "..."}
//! ```

use cobuild_core::{Checkpoint, PairId, StorageError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A checkpoint as written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCheckpoint {
    pub key: String,
    pub path: PathBuf,
    /// Exact bytes written, handed on to the archiver.
    pub blob: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, pair: PairId) -> PathBuf {
        self.dir.join(format!("{}.json", Checkpoint::key_for(pair)))
    }

    /// Load a pair's checkpoint. A missing file is `Ok(None)`.
    pub async fn load(&self, pair: PairId) -> Result<Option<Checkpoint>, StorageError> {
        let path = self.path_for(pair);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StorageError::ReadFailed {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                })
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    /// Write (or overwrite) a pair's checkpoint.
    pub async fn write(&self, checkpoint: &Checkpoint) -> Result<StoredCheckpoint, StorageError> {
        let path = self.path_for(checkpoint.pair_id);
        let write_failed = |reason: String| StorageError::WriteFailed {
            path: path.display().to_string(),
            reason,
        };

        let blob = serde_json::to_vec(checkpoint).map_err(|e| write_failed(e.to_string()))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| write_failed(e.to_string()))?;
        tokio::fs::write(&path, &blob)
            .await
            .map_err(|e| write_failed(e.to_string()))?;

        tracing::debug!(pair_id = %checkpoint.pair_id, path = %path.display(), "Checkpoint written");

        Ok(StoredCheckpoint {
            key: checkpoint.key(),
            path,
            blob,
        })
    }
}
