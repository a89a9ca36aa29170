//! Hub route assembly.

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::HubState;
use crate::telemetry::metrics_handler;

pub mod chat;
pub mod config;
pub mod health;
pub mod report;

/// Build the complete hub router around a shared state.
pub fn create_hub_router(state: Arc<HubState>) -> Router {
    let router = Router::new()
        .nest("/config", config::create_router(state.clone()))
        .nest("/chat", chat::create_router(state.clone()))
        .nest("/report", report::create_router(state.clone()))
        .nest("/health", health::create_router(state))
        .route("/metrics", get(metrics_handler));

    #[cfg(feature = "openapi")]
    let router = router.route("/openapi.json", get(openapi_json));

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Handler for /openapi.json endpoint.
#[cfg(feature = "openapi")]
async fn openapi_json() -> impl axum::response::IntoResponse {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use cobuild_core::{PartitionConfig, NOT_STARTED_MEMO};
    use cobuild_storage::CheckpointStore;
    use serde_json::{json, Value};
    use tower::ServiceExt; // for `oneshot`

    struct TestHub {
        _dir: tempfile::TempDir,
        state: Arc<HubState>,
    }

    impl TestHub {
        fn new(capacity: usize) -> Result<Self, String> {
            let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
            let state = Arc::new(HubState::new(
                "Build a castle gate",
                PartitionConfig::default(),
                capacity,
                CheckpointStore::new(dir.path()),
            ));
            Ok(Self { _dir: dir, state })
        }

        async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Value), String> {
            let response = create_hub_router(self.state.clone())
                .oneshot(request)
                .await
                .map_err(|e| format!("Request failed: {:?}", e))?;
            let status = response.status();
            let bytes = to_bytes(response.into_body(), 1024 * 1024)
                .await
                .map_err(|e| e.to_string())?;
            let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            Ok((status, body))
        }

        async fn get(&self, uri: &str) -> Result<(StatusCode, Value), String> {
            let request = Request::builder()
                .uri(uri)
                .body(Body::empty())
                .map_err(|e| e.to_string())?;
            self.send(request).await
        }

        async fn post(&self, uri: &str, body: Value) -> Result<(StatusCode, Value), String> {
            self.post_raw(uri, body.to_string()).await
        }

        async fn post_raw(&self, uri: &str, body: String) -> Result<(StatusCode, Value), String> {
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .map_err(|e| e.to_string())?;
            self.send(request).await
        }
    }

    #[tokio::test]
    async fn test_config_for_unseen_pair() -> Result<(), String> {
        let hub = TestHub::new(10)?;
        let (status, body) = hub.get("/config/1").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task"], "Build a castle gate");
        assert_eq!(body["last_memo"], NOT_STARTED_MEMO);
        assert_eq!(body["range"]["min"], json!([100, 64, 100]));
        assert_eq!(body["range"]["max"], json!([120, 90, 120]));
        Ok(())
    }

    #[tokio::test]
    async fn test_config_is_keyed_by_pair_only() -> Result<(), String> {
        let hub = TestHub::new(10)?;
        let (_, a) = hub.get("/config/1").await?;
        let (_, b) = hub.get("/config/1").await?;
        let (_, other) = hub.get("/config/2").await?;
        assert_eq!(a["range"], b["range"]);
        assert_ne!(a["range"], other["range"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_config_rejects_pair_zero() -> Result<(), String> {
        let hub = TestHub::new(10)?;
        let (status, body) = hub.get("/config/0").await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
        Ok(())
    }

    #[tokio::test]
    async fn test_chat_round_trip_keeps_capacity() -> Result<(), String> {
        let hub = TestHub::new(5)?;
        for i in 1..=7 {
            let (status, body) = hub
                .post("/chat/1", json!({"from": "Bot-1-A", "text": format!("m{i}")}))
                .await?;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({"ok": true}));
        }
        let (status, body) = hub.get("/chat/1").await?;
        assert_eq!(status, StatusCode::OK);
        let texts: Vec<&str> = body
            .as_array()
            .map(|msgs| msgs.iter().filter_map(|m| m["text"].as_str()).collect())
            .unwrap_or_default();
        assert_eq!(texts, vec!["m3", "m4", "m5", "m6", "m7"]);
        assert_eq!(body[0]["from"], "Bot-1-A");
        assert!(body[0]["time"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn test_chat_for_unseen_pair_is_empty() -> Result<(), String> {
        let hub = TestHub::new(10)?;
        let (status, body) = hub.get("/chat/42").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
        Ok(())
    }

    #[tokio::test]
    async fn test_chat_bad_input_is_400() -> Result<(), String> {
        let hub = TestHub::new(10)?;
        let (status, body) = hub.post("/chat/1", json!({"text": "no sender"})).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MISSING_FIELD");
        assert_eq!(body["details"]["field"], "from");

        let (status, _) = hub.post_raw("/chat/1", "{not json".to_string()).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = hub.post("/chat/1", json!({"from": 7, "text": "x"})).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = hub.get("/chat/1").await?;
        assert_eq!(body, json!([]));
        Ok(())
    }

    #[tokio::test]
    async fn test_report_last_write_wins() -> Result<(), String> {
        let hub = TestHub::new(10)?;
        let (status, _) = hub
            .post("/report", json!({"name": "Bot-1-A", "pairId": 1, "msg": "placed stone"}))
            .await?;
        assert_eq!(status, StatusCode::OK);
        hub.post("/report", json!({"name": "Bot-1-A", "pairId": 1, "msg": "placed dirt"}))
            .await?;

        let (status, body) = hub.get("/report/1").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["msg"], "placed dirt");
        assert_eq!(body["pairId"], 1);

        let (_, all) = hub.get("/report").await?;
        assert_eq!(all.as_array().map(Vec::len), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_report_listing_by_agent() -> Result<(), String> {
        let hub = TestHub::new(10)?;
        hub.post("/report", json!({"name": "Bot-2-B", "pairId": 2, "msg": "roof"}))
            .await?;
        hub.post("/report", json!({"name": "Bot-2-A", "pairId": 2, "msg": "walls"}))
            .await?;
        let (status, body) = hub.get("/report/agents").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "Bot-2-A");
        assert_eq!(body[1]["name"], "Bot-2-B");
        Ok(())
    }

    #[tokio::test]
    async fn test_report_missing_pair_is_404() -> Result<(), String> {
        let hub = TestHub::new(10)?;
        let (status, body) = hub.get("/report/9").await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "ENTITY_NOT_FOUND");
        Ok(())
    }

    #[tokio::test]
    async fn test_report_bad_input_is_400() -> Result<(), String> {
        let hub = TestHub::new(10)?;
        let (status, _) = hub.post("/report", json!({"name": "Bot-1-A", "msg": "x"})).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = hub
            .post("/report", json!({"name": "Bot-1-A", "pairId": 0, "msg": "x"}))
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn test_health_and_metrics() -> Result<(), String> {
        let hub = TestHub::new(10)?;
        let (status, body) = hub.get("/health/live").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = hub.get("/health/ready").await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let response = create_hub_router(hub.state.clone())
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .map_err(|e| e.to_string())?,
            )
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .map_err(|e| e.to_string())?;
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("cobuild_hub_chat_posts_total"));
        Ok(())
    }

    #[tokio::test]
    async fn test_ready_fails_without_checkpoint_dir() -> Result<(), String> {
        let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
        let hub = TestHub {
            state: Arc::new(HubState::new(
                "Build a castle gate",
                PartitionConfig::default(),
                10,
                CheckpointStore::new(dir.path().join("missing")),
            )),
            _dir: dir,
        };
        let (status, body) = hub.get("/health/ready").await?;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
        assert!(body["message"].as_str().is_some_and(|m| m.contains("missing")));
        Ok(())
    }

    #[cfg(feature = "openapi")]
    #[tokio::test]
    async fn test_openapi_document_lists_routes() -> Result<(), String> {
        let hub = TestHub::new(10)?;
        let (status, body) = hub.get("/openapi.json").await?;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"].get("/config/{pair_id}").is_some());
        assert!(body["paths"].get("/report").is_some());
        Ok(())
    }
}
