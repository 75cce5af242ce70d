pub mod event_bus;
pub mod reporter;
pub mod telemetry;

pub use event_bus::{EnsembleEvent, EventBus};
pub use reporter::{PerformanceReporter, ReportSummary};
pub use telemetry::EnsembleTelemetry;
