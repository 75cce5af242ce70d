use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction called by a single model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

impl Direction {
    pub fn from_value(value: f64) -> Self {
        if value > 0.0 {
            Direction::Up
        } else if value < 0.0 {
            Direction::Down
        } else {
            Direction::Neutral
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
            Direction::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SingleModelPrediction {
    pub model_id: String,
    pub symbol: String,
    pub predicted_value: f64,
    pub direction: Direction,
    pub confidence: f64,
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl SingleModelPrediction {
    pub fn new(
        model_id: impl Into<String>,
        symbol: impl Into<String>,
        predicted_value: f64,
        confidence: f64,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            symbol: symbol.into(),
            predicted_value,
            direction: Direction::from_value(predicted_value),
            confidence,
            latency_ms: 0.0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Reason the prediction is unusable, if any.
    pub fn sanity_issue(&self) -> Option<String> {
        if !self.predicted_value.is_finite() {
            return Some(format!("non-finite predicted value {}", self.predicted_value));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Some(format!("confidence {} outside [0, 1]", self.confidence));
        }
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    pub symbol: String,
    pub model_id: String,
    pub horizon: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_value() {
        assert_eq!(Direction::from_value(0.4), Direction::Up);
        assert_eq!(Direction::from_value(-0.01), Direction::Down);
        assert_eq!(Direction::from_value(0.0), Direction::Neutral);
    }

    #[test]
    fn test_sanity_issue() {
        assert!(SingleModelPrediction::new("m", "AAPL", 0.2, 0.7).sanity_issue().is_none());
        assert!(SingleModelPrediction::new("m", "AAPL", f64::NAN, 0.7).sanity_issue().is_some());
        assert!(SingleModelPrediction::new("m", "AAPL", 0.2, 1.3).sanity_issue().is_some());
    }

    #[test]
    fn test_wire_format() {
        let prediction = SingleModelPrediction::new("xgb", "MSFT", -0.3, 0.6);
        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json["modelId"], "xgb");
        assert_eq!(json["direction"], "DOWN");
    }
}
