//! Telemetry Module

mod logging;
pub mod metrics;

pub use logging::{init_logging, LogGuard};
pub use metrics::init_metrics;
