//! World session capability.
//!
//! The control loop drives the shared world through three actions and
//! learns about it through a stream of [`WorldEvent`]s. Liveness is not
//! verified independently: a lost session surfaces as an event and the
//! loop keeps going. A session that never came up is a [`DetachedSession`],
//! whose every action fails with [`AgentError::SessionLost`].

use async_trait::async_trait;
use cobuild_core::{AgentError, BlockPos};
use std::sync::Arc;
use tokio::sync::mpsc;

pub mod rcon;

pub use rcon::{RconConfig, RconSession};

/// Capacity of the event channel handed to the control loop.
pub const EVENT_BUFFER: usize = 64;

/// Something the world told this agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    Spawned,
    ChatReceived { sender: String, text: String },
    Error(String),
    Disconnected { reason: String },
}

#[async_trait]
pub trait WorldSession: Send + Sync {
    async fn say(&self, text: &str) -> Result<(), AgentError>;

    async fn place_block(&self, pos: BlockPos, block: &str) -> Result<(), AgentError>;

    async fn move_to(&self, pos: BlockPos) -> Result<(), AgentError>;
}

/// Opens the world session once the agent knows where it will build.
#[async_trait]
pub trait WorldConnector: Send + Sync {
    async fn connect(&self) -> Result<WorldConnection, AgentError>;
}

/// A connected session plus the events it emits.
pub struct WorldConnection {
    pub session: Arc<dyn WorldSession>,
    pub events: mpsc::Receiver<WorldEvent>,
}

impl std::fmt::Debug for WorldConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldConnection").finish_non_exhaustive()
    }
}

impl WorldConnection {
    /// A connection whose session refuses every action and emits nothing.
    pub fn detached(agent: &str, reason: impl Into<String>) -> Self {
        let (_tx, rx) = mpsc::channel(1);
        Self {
            session: Arc::new(DetachedSession {
                agent: agent.to_string(),
                reason: reason.into(),
            }),
            events: rx,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetachedSession {
    agent: String,
    reason: String,
}

impl DetachedSession {
    fn refuse(&self) -> Result<(), AgentError> {
        Err(AgentError::SessionLost {
            agent: self.agent.clone(),
            reason: self.reason.clone(),
        })
    }
}

#[async_trait]
impl WorldSession for DetachedSession {
    async fn say(&self, _text: &str) -> Result<(), AgentError> {
        self.refuse()
    }

    async fn place_block(&self, _pos: BlockPos, _block: &str) -> Result<(), AgentError> {
        self.refuse()
    }

    async fn move_to(&self, _pos: BlockPos) -> Result<(), AgentError> {
        self.refuse()
    }
}
