//! Observability utilities (metrics + tracing).

mod metrics;
mod tracing;

pub use metrics::Metrics;
pub use tracing::init_tracing;
