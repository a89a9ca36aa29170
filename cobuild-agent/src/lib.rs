//! COBUILD Agent - one half of a building pair
//!
//! Resolves its pair's configuration from the hub, then alternates between
//! asking a planner for the next step, acting in the world and reporting
//! back, until its deadline fires and (for role A) the pair is checkpointed.

pub mod checkpoint;
pub mod config;
pub mod control;
pub mod error;
pub mod hub_client;
pub mod telemetry;
pub mod world;

pub use checkpoint::{CheckpointCoordinator, CheckpointOutcome};
pub use config::{AgentConfig, AgentConfigError, AgentIdentity, ArchiveMode, Cli};
pub use control::{
    ControlLoop, LoopPhase, LoopSettings, RetryPolicy, RunSummary, TerminationReason,
    TerminationSignal, TerminationWatch,
};
pub use error::{AgentRunError, AgentRunResult};
pub use hub_client::{HubApi, HubClient, HubClientError};
pub use telemetry::CycleOutcome;
pub use world::{
    DetachedSession, RconConfig, RconSession, WorldConnection, WorldConnector, WorldEvent,
    WorldSession,
};
