//! OpenAPI document for the hub, generated from route annotations.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::{chat, config, health, report};
use crate::telemetry::metrics;
use crate::types::{Ack, PostChatRequest, PostReportRequest};
use cobuild_core::{ChatMessage, ProgressReport, TaskConfig, WorkspaceRegion};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "COBUILD Hub",
        version = "0.1.0",
        description = "Coordination hub for paired building agents: task config, chat relay and progress reports",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8080", description = "Local hub")),
    tags(
        (name = "Config", description = "Per-pair task configuration"),
        (name = "Chat", description = "Bounded chat relay between partners"),
        (name = "Reports", description = "Latest progress per pair and agent"),
        (name = "Health", description = "Liveness checks"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        config::get_config,
        chat::post_chat,
        chat::get_chat,
        report::post_report,
        report::list_reports,
        report::list_agent_reports,
        report::get_report,
        health::ping,
        health::liveness,
        health::readiness,
        metrics::metrics_handler,
    ),
    components(schemas(
        TaskConfig,
        WorkspaceRegion,
        ChatMessage,
        ProgressReport,
        PostChatRequest,
        PostReportRequest,
        Ack,
        ApiError,
        ErrorCode,
        health::HealthResponse,
        health::HealthStatus,
    ))
)]
pub struct ApiDoc;
