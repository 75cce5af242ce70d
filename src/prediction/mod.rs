pub mod engine;
pub mod http;
pub mod types;

pub use engine::{ModelRegistry, PredictionEngine};
pub use http::HttpModelService;
pub use types::{Direction, PredictionRequest, SingleModelPrediction};

#[cfg(test)]
pub use engine::{MockModelRegistry, MockPredictionEngine};
