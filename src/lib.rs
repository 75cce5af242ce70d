pub mod core;
pub mod ensemble;
pub mod monitoring;
pub mod performance;
pub mod prediction;
pub mod weighting;

pub use crate::core::{Config, EnsembleError, EnsembleResult};
pub use ensemble::{AggregationMethod, EnsembleOrchestrator, EnsemblePrediction, EnsembleRequest, Signal};
pub use performance::PerformanceTracker;
pub use weighting::{WeightCalculator, WeightStrategy};
