//! Telemetry: tracing/OTLP setup and Prometheus metrics.

pub mod metrics;
pub mod tracing;

pub use metrics::{
    record_auth_attempt, record_invoice_validation, record_permission_check,
    record_request_latency, AuthOutcome, MetricsState,
};
pub use tracing::{init_telemetry, shutdown_telemetry};
