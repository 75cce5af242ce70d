use anyhow::Result;
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use super::types::{PredictionRequest, SingleModelPrediction};

/// Single-model prediction contract. Latency is not bounded by implementors;
/// callers wrap every call in their own timeout.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PredictionEngine: Send + Sync {
    async fn predict(&self, request: &PredictionRequest) -> Result<SingleModelPrediction>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    async fn get_deployed_models(&self, horizon: &str) -> Result<Vec<String>>;
}
