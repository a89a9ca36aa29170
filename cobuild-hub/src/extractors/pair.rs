//! Path extractor for pair ids.
//!
//! `Path<u32>` would accept `0` and answer a bad number with a plain-text
//! rejection; `PairPath` validates the id and fails with a structured 400.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use cobuild_core::PairId;

use crate::error::ApiError;
use crate::telemetry::metrics::record;

/// Validated `{pairId}` path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairPath(pub PairId);

#[async_trait]
impl<S> FromRequestParts<S> for PairPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::invalid_format("pairId", &format!("a path segment ({})", e)))?;

        raw.parse::<PairId>().map(PairPath).map_err(|e| {
            record(|m| m.bad_request("path"));
            ApiError::invalid_input(e.to_string()).with_details(serde_json::json!({
                "field": "pairId",
                "path": parts.uri.path(),
            }))
        })
    }
}
