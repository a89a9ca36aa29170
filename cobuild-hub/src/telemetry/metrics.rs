//! Prometheus Metrics Definitions
//!
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, TextEncoder};

use crate::error::{ApiError, ApiResult};

/// Global metrics instance - initialized on first use
pub static METRICS: Lazy<ApiResult<HubMetrics>> = Lazy::new(HubMetrics::new);

/// Counters for hub traffic.
#[derive(Clone)]
pub struct HubMetrics {
    /// Config fetches served
    pub config_fetches_total: IntCounter,

    /// Chat messages accepted
    pub chat_posts_total: IntCounter,

    /// Chat messages dropped from a full ring
    pub chat_evictions_total: IntCounter,

    /// Progress reports accepted
    pub reports_total: IntCounter,

    /// Rejected requests - labels: endpoint
    pub bad_requests_total: IntCounterVec,
}

impl HubMetrics {
    /// Create and register all metrics with the default registry.
    pub fn new() -> ApiResult<Self> {
        let failed = |name: &str, e: prometheus::Error| {
            ApiError::internal_error(format!("Failed to register {}: {}", name, e))
        };

        Ok(Self {
            config_fetches_total: register_int_counter!(
                "cobuild_hub_config_fetches_total",
                "Total number of task config fetches"
            )
            .map_err(|e| failed("config_fetches_total", e))?,

            chat_posts_total: register_int_counter!(
                "cobuild_hub_chat_posts_total",
                "Total number of relayed chat messages"
            )
            .map_err(|e| failed("chat_posts_total", e))?,

            chat_evictions_total: register_int_counter!(
                "cobuild_hub_chat_evictions_total",
                "Chat messages evicted from full buffers"
            )
            .map_err(|e| failed("chat_evictions_total", e))?,

            reports_total: register_int_counter!(
                "cobuild_hub_reports_total",
                "Total number of progress reports"
            )
            .map_err(|e| failed("reports_total", e))?,

            bad_requests_total: register_int_counter_vec!(
                "cobuild_hub_bad_requests_total",
                "Requests rejected for bad input",
                &["endpoint"]
            )
            .map_err(|e| failed("bad_requests_total", e))?,
        })
    }

    pub fn config_fetched(&self) {
        self.config_fetches_total.inc();
    }

    pub fn chat_posted(&self, evicted: bool) {
        self.chat_posts_total.inc();
        if evicted {
            self.chat_evictions_total.inc();
        }
    }

    pub fn report_received(&self) {
        self.reports_total.inc();
    }

    pub fn bad_request(&self, endpoint: &str) {
        self.bad_requests_total.with_label_values(&[endpoint]).inc();
    }
}

/// Run `f` against the global metrics, if registration succeeded.
pub(crate) fn record(f: impl FnOnce(&HubMetrics)) {
    match METRICS.as_ref() {
        Ok(metrics) => f(metrics),
        Err(e) => tracing::trace!(error = %e, "Metrics unavailable"),
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
))]
pub async fn metrics_handler() -> impl IntoResponse {
    // Touch the registry so the hub's counters appear even before traffic.
    record(|_| {});

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
