//! Config REST API Routes
//!
//! `GET /config/{pairId}` hands an agent its task, last memo and region.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;

#[cfg(feature = "openapi")]
use cobuild_core::TaskConfig;

use crate::{error::ApiResult, extractors::PairPath, state::HubState};
#[cfg(feature = "openapi")]
use crate::error::ApiError;

/// GET /config/{pairId} - Task configuration for a pair
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/config/{pair_id}",
    tag = "Config",
    params(("pair_id" = u32, Path, description = "Pair id, starting at 1")),
    responses(
        (status = 200, description = "Task configuration", body = TaskConfig),
        (status = 400, description = "Invalid pair id", body = ApiError),
    ),
))]
pub async fn get_config(
    State(state): State<Arc<HubState>>,
    PairPath(pair): PairPath,
) -> ApiResult<impl IntoResponse> {
    let config = state.task_config(pair).await?;
    tracing::debug!(pair_id = %pair, memo = %config.last_memo, "Served task config");
    Ok(Json(config))
}

pub fn create_router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/:pair_id", get(get_config))
        .with_state(state)
}
