//! HTTP middleware: bearer auth, request ids, rate limiting, metrics.

pub mod auth;
pub mod metrics;
pub mod rate_limit;
pub mod request_id;
