//! COBUILD Storage - Checkpoint Persistence
//!
//! Pair-scoped checkpoint files read by the hub and written by the role-A
//! agent, plus the `Archiver` capability that carries a checkpoint into
//! durable, version-controlled storage.

pub mod archiver;
pub mod checkpoint;

pub use archiver::{Archiver, GitArchiver, GitArchiverConfig, NoopArchiver};
pub use checkpoint::{CheckpointStore, StoredCheckpoint};
