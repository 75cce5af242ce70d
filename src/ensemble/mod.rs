pub mod aggregation;
pub mod cache;
pub mod consensus;
pub mod orchestrator;
pub mod types;

pub use aggregation::{Aggregate, AggregationStrategy, StackingAggregation, VotingAggregation, WeightedAggregation};
pub use cache::{EnsembleCache, MemoryCache, RedisCache};
pub use consensus::consensus_strength;
pub use orchestrator::EnsembleOrchestrator;
pub use types::{
    AggregationMethod, EnsemblePrediction, EnsembleRequest, ModelContribution, Signal,
};
