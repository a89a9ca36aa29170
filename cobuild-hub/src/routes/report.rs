//! Progress report routes
//!
//! Reports are last-write-wins: the hub keeps only the newest line per pair
//! and per agent.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use cobuild_core::ProgressReport;
use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult},
    extractors::PairPath,
    state::HubState,
    telemetry::metrics::record,
    types::{Ack, PostReportRequest},
};

/// POST /report - Record an agent's latest progress
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/report",
    tag = "Reports",
    request_body = PostReportRequest,
    responses(
        (status = 200, description = "Report accepted", body = Ack),
        (status = 400, description = "Missing or invalid field", body = ApiError),
    ),
))]
pub async fn post_report(
    State(state): State<Arc<HubState>>,
    payload: Result<Json<PostReportRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let result = payload.map_err(ApiError::from).and_then(|Json(req)| {
        state
            .post_report(req.name, req.pair_id, req.msg)
            .map_err(ApiError::from)
    });
    match result {
        Ok(_) => Ok(Json(Ack::OK)),
        Err(e) => {
            record(|m| m.bad_request("report"));
            Err(e)
        }
    }
}

/// GET /report - Latest report of every pair
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/report",
    tag = "Reports",
    responses((status = 200, description = "Latest report per pair", body = Vec<ProgressReport>)),
))]
pub async fn list_reports(State(state): State<Arc<HubState>>) -> impl IntoResponse {
    Json(state.reports())
}

/// GET /report/agents - Latest report of every agent
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/report/agents",
    tag = "Reports",
    responses((status = 200, description = "Latest report per agent", body = Vec<ProgressReport>)),
))]
pub async fn list_agent_reports(State(state): State<Arc<HubState>>) -> impl IntoResponse {
    Json(state.agent_reports())
}

/// GET /report/{pairId} - Latest report of one pair
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/report/{pair_id}",
    tag = "Reports",
    params(("pair_id" = u32, Path, description = "Pair id, starting at 1")),
    responses(
        (status = 200, description = "Latest report", body = ProgressReport),
        (status = 400, description = "Invalid pair id", body = ApiError),
        (status = 404, description = "No report yet", body = ApiError),
    ),
))]
pub async fn get_report(
    State(state): State<Arc<HubState>>,
    PairPath(pair): PairPath,
) -> ApiResult<impl IntoResponse> {
    state
        .latest_report(pair)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No report for pair {}", pair)))
}

pub fn create_router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/", get(list_reports).post(post_report))
        .route("/agents", get(list_agent_reports))
        .route("/:pair_id", get(get_report))
        .with_state(state)
}
