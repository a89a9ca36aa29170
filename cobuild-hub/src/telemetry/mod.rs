//! COBUILD Hub Telemetry
//!
//! Structured logging through `tracing` and Prometheus counters for the
//! relay's traffic.

pub mod metrics;
pub mod tracer;

pub use metrics::{metrics_handler, HubMetrics, METRICS};
pub use tracer::{init_tracer, TelemetryConfig};
