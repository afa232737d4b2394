pub mod collector;
pub mod metrics;
pub mod monitor;

pub use collector::{Metrics, MetricsReport, CAPTURED, PREVIEW, RECORD};
pub use metrics::{StreamMetrics, StreamReport};
pub use monitor::MetricsMonitor;
