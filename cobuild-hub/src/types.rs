//! Request and response bodies for the hub's HTTP surface.
//!
//! Request fields are optional at the serde level so that an absent field
//! is reported as a named 400 by the state layer instead of a generic
//! deserialization failure.

use serde::{Deserialize, Serialize};

/// Body of `POST /chat/{pairId}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PostChatRequest {
    /// Sender's agent name
    pub from: Option<String>,
    pub text: Option<String>,
}

/// Body of `POST /report`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PostReportRequest {
    pub name: Option<String>,
    #[serde(rename = "pairId")]
    pub pair_id: Option<i64>,
    pub msg: Option<String>,
}

/// Acknowledgement returned by mutating endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub const OK: Ack = Ack { ok: true };
}
