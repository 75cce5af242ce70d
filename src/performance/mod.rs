pub mod metrics;
pub mod store;
pub mod tracker;
pub mod window;

pub use metrics::{DriftReport, DriftSeverity, LatencyPercentiles, PerformanceMetrics};
pub use store::{MetricsStore, SqliteMetricsStore};
pub use tracker::PerformanceTracker;
pub use window::{OutcomeRecord, PerformanceWindow, RingBuffer};
