//! Agent counters.
//!
//! Nothing scrapes an agent, so the counters are rendered in Prometheus text
//! format and logged once when the loop terminates.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, TextEncoder};

pub use cobuild_hub::telemetry::{init_tracer, TelemetryConfig};

pub static METRICS: Lazy<Result<AgentMetrics, prometheus::Error>> = Lazy::new(AgentMetrics::new);

/// How a decide-act-report cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Acted,
    OutOfBounds,
    PlannerFailed,
    DecodeFailed,
}

impl CycleOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acted => "acted",
            Self::OutOfBounds => "out_of_bounds",
            Self::PlannerFailed => "planner_failed",
            Self::DecodeFailed => "decode_failed",
        }
    }
}

#[derive(Clone)]
pub struct AgentMetrics {
    /// Cycles by outcome - labels: outcome
    pub cycles_total: IntCounterVec,
    /// Hub calls that failed inside the acting loop
    pub hub_failures_total: IntCounter,
    /// World session losses observed
    pub session_lost_total: IntCounter,
}

impl AgentMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            cycles_total: register_int_counter_vec!(
                "cobuild_agent_cycles_total",
                "Decide-act-report cycles by outcome",
                &["outcome"]
            )?,
            hub_failures_total: register_int_counter!(
                "cobuild_agent_hub_failures_total",
                "Hub requests that failed during the acting loop"
            )?,
            session_lost_total: register_int_counter!(
                "cobuild_agent_session_lost_total",
                "World session losses"
            )?,
        })
    }

    pub fn cycle(&self, outcome: CycleOutcome) {
        self.cycles_total.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn hub_failed(&self) {
        self.hub_failures_total.inc();
    }

    pub fn session_lost(&self) {
        self.session_lost_total.inc();
    }
}

pub(crate) fn record(f: impl FnOnce(&AgentMetrics)) {
    match METRICS.as_ref() {
        Ok(metrics) => f(metrics),
        Err(e) => tracing::trace!(error = %e, "Metrics unavailable"),
    }
}

/// Agent counters in Prometheus text format.
pub fn snapshot() -> String {
    record(|_| {});
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode agent metrics");
    }
    String::from_utf8_lossy(&buffer)
        .lines()
        .filter(|line| line.contains("cobuild_agent_"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Log the counters at `info`.
pub fn log_snapshot() {
    tracing::info!(metrics = %snapshot(), "Agent counters");
}

pub fn telemetry_config(json: bool) -> TelemetryConfig {
    TelemetryConfig {
        service_name: "cobuild-agent".to_string(),
        json,
        default_filter: "cobuild_agent=debug,cobuild_llm=debug,info".to_string(),
    }
}
