//! HTTP surface for vidtune: batch submission, polling, health, config
//! and Prometheus metrics.

pub mod api;
pub mod metrics;
pub mod state;
