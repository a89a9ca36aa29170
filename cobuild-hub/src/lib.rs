//! COBUILD Hub - coordination service for agent pairs
//!
//! One process serves every pair. It hands out task configuration and
//! workspace regions, relays a bounded chat buffer between partners and
//! keeps the latest progress report per pair and per agent. State is
//! in-memory; only checkpoints written by agents survive a restart.

pub mod config;
pub mod error;
pub mod expose;
pub mod extractors;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

pub use config::{ExposeMode, HubConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use expose::{exposer_for, Exposer, LocaltunnelExposer, StaticExposer};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_hub_router;
pub use state::HubState;
pub use types::{Ack, PostChatRequest, PostReportRequest};
