//! NextGCore Metrics Collection Library
//!
//! Counter and gauge registry with a Prometheus text exporter.

pub mod context;
pub mod server;
pub mod types;

pub use context::{Metric, MetricsContext};
pub use server::MetricsServer;
pub use types::*;
