//! Chat relay routes
//!
//! - `POST /chat/{pairId}` appends `{from, text}` to the pair's ring
//! - `GET /chat/{pairId}` returns `[{from, text, time}]`, oldest first

use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use cobuild_core::ChatMessage;
use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult},
    extractors::PairPath,
    state::HubState,
    telemetry::metrics::record,
    types::{Ack, PostChatRequest},
};

/// POST /chat/{pairId} - Relay a chat line to the pair
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/chat/{pair_id}",
    tag = "Chat",
    params(("pair_id" = u32, Path, description = "Pair id, starting at 1")),
    request_body = PostChatRequest,
    responses(
        (status = 200, description = "Message accepted", body = Ack),
        (status = 400, description = "Missing sender or text", body = ApiError),
    ),
))]
pub async fn post_chat(
    State(state): State<Arc<HubState>>,
    PairPath(pair): PairPath,
    payload: Result<Json<PostChatRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let result = payload
        .map_err(ApiError::from)
        .and_then(|Json(req)| state.post_chat(pair, req.from, req.text).map_err(ApiError::from));
    match result {
        Ok(message) => {
            tracing::debug!(pair_id = %pair, from = %message.from, "Chat relayed");
            Ok(Json(Ack::OK))
        }
        Err(e) => {
            record(|m| m.bad_request("chat"));
            Err(e)
        }
    }
}

/// GET /chat/{pairId} - Current chat buffer of the pair
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/chat/{pair_id}",
    tag = "Chat",
    params(("pair_id" = u32, Path, description = "Pair id, starting at 1")),
    responses(
        (status = 200, description = "Buffered messages, oldest first", body = Vec<ChatMessage>),
        (status = 400, description = "Invalid pair id", body = ApiError),
    ),
))]
pub async fn get_chat(
    State(state): State<Arc<HubState>>,
    PairPath(pair): PairPath,
) -> impl IntoResponse {
    let messages: Vec<ChatMessage> = state.chat(pair).collect();
    Json(messages)
}

pub fn create_router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/:pair_id", get(get_chat).post(post_chat))
        .with_state(state)
}
