use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::prediction::Direction;
use crate::weighting::{WeightBounds, WeightStrategy};

/// Final call of an ensemble.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl From<Direction> for Signal {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Up => Signal::Buy,
            Direction::Down => Signal::Sell,
            Direction::Neutral => Signal::Hold,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    #[default]
    Weighted,
    Voting,
    Stacking,
}

impl AggregationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::Weighted => "weighted",
            AggregationMethod::Voting => "voting",
            AggregationMethod::Stacking => "stacking",
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AggregationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weighted" => Ok(AggregationMethod::Weighted),
            "voting" => Ok(AggregationMethod::Voting),
            "stacking" => Ok(AggregationMethod::Stacking),
            other => Err(format!("unknown aggregation method '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleRequest {
    pub symbol: String,
    pub horizon: String,
    /// Explicit model set; `None` asks the registry for the horizon's deployed models.
    pub model_ids: Option<Vec<String>>,
    pub method: AggregationMethod,
    pub weight_strategy: WeightStrategy,
    pub min_models_required: usize,
    pub confidence_scores: Option<HashMap<String, f64>>,
    pub bounds: Option<WeightBounds>,
}

impl EnsembleRequest {
    pub fn new(symbol: impl Into<String>, horizon: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            horizon: horizon.into(),
            model_ids: None,
            method: AggregationMethod::Weighted,
            weight_strategy: WeightStrategy::Hybrid,
            min_models_required: 3,
            confidence_scores: None,
            bounds: None,
        }
    }

    pub fn with_models<I, S>(mut self, model_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.model_ids = Some(model_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_method(mut self, method: AggregationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_weight_strategy(mut self, strategy: WeightStrategy) -> Self {
        self.weight_strategy = strategy;
        self
    }

    pub fn with_min_models(mut self, min_models_required: usize) -> Self {
        self.min_models_required = min_models_required;
        self
    }

    pub fn with_confidence_scores(mut self, scores: HashMap<String, f64>) -> Self {
        self.confidence_scores = Some(scores);
        self
    }

    pub fn with_bounds(mut self, bounds: WeightBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn cache_key(&self) -> String {
        cache_key(self.method, self.weight_strategy, &self.symbol, &self.horizon)
    }
}

pub fn cache_key(
    method: AggregationMethod,
    weight_strategy: WeightStrategy,
    symbol: &str,
    horizon: &str,
) -> String {
    format!("ensemble_{}_{}_{}_{}", method, weight_strategy, symbol, horizon)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelContribution {
    pub model_id: String,
    pub predicted_value: f64,
    pub direction: Direction,
    pub confidence: f64,
    pub weight: f64,
    pub latency_ms: f64,
    /// The model's own prediction time; pass it to `record_actual` with the outcome.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnsemblePrediction {
    pub request_id: String,
    pub symbol: String,
    pub horizon: String,
    pub aggregation_method: AggregationMethod,
    pub weight_strategy: WeightStrategy,
    pub final_direction: Signal,
    pub final_confidence: f64,
    pub expected_value: f64,
    pub contributions: Vec<ModelContribution>,
    pub consensus_strength: f64,
    pub diversity_score: f64,
    /// Set when quorum was missed and a single model's raw prediction is served.
    pub fallback_model: Option<String>,
    pub failed_models: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl EnsemblePrediction {
    pub fn is_fallback(&self) -> bool {
        self.fallback_model.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn model_count(&self) -> usize {
        self.contributions.len()
    }
}
