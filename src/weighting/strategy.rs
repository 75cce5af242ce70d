use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::core::error::{EnsembleError, EnsembleResult};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WeightStrategy {
    Equal,
    Performance,
    Recency,
    Confidence,
    RiskAdjusted,
    #[default]
    Hybrid,
}

impl WeightStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightStrategy::Equal => "equal",
            WeightStrategy::Performance => "performance",
            WeightStrategy::Recency => "recency",
            WeightStrategy::Confidence => "confidence",
            WeightStrategy::RiskAdjusted => "risk_adjusted",
            WeightStrategy::Hybrid => "hybrid",
        }
    }

    /// Whether scoring reads per-model performance metrics.
    pub fn needs_metrics(&self) -> bool {
        matches!(
            self,
            WeightStrategy::Performance
                | WeightStrategy::Recency
                | WeightStrategy::RiskAdjusted
                | WeightStrategy::Hybrid
        )
    }
}

impl fmt::Display for WeightStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WeightStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equal" => Ok(WeightStrategy::Equal),
            "performance" => Ok(WeightStrategy::Performance),
            "recency" => Ok(WeightStrategy::Recency),
            "confidence" => Ok(WeightStrategy::Confidence),
            "risk_adjusted" | "sharpe" => Ok(WeightStrategy::RiskAdjusted),
            "hybrid" => Ok(WeightStrategy::Hybrid),
            other => Err(format!("unknown weight strategy '{}'", other)),
        }
    }
}

/// Per-model bounds applied to raw scores before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBounds {
    pub min: f64,
    pub max: f64,
}

impl WeightBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn validate(&self) -> EnsembleResult<()> {
        let in_range = (0.0..=1.0).contains(&self.min) && (0.0..=1.0).contains(&self.max);
        if !in_range || self.min > self.max {
            return Err(EnsembleError::InvalidWeightBounds {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

impl Default for WeightBounds {
    fn default() -> Self {
        Self { min: 0.05, max: 0.6 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelWeight {
    pub model_id: String,
    pub weight: f64,
    pub raw_score: f64,
    pub strategy: WeightStrategy,
    pub confidence: f64,
    /// Sub-scores and inputs that produced `raw_score`.
    pub metadata: HashMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Hybrid".parse::<WeightStrategy>().unwrap(), WeightStrategy::Hybrid);
        assert_eq!("sharpe".parse::<WeightStrategy>().unwrap(), WeightStrategy::RiskAdjusted);
        assert!("magic".parse::<WeightStrategy>().is_err());
        assert_eq!(WeightStrategy::default(), WeightStrategy::Hybrid);
    }

    #[test]
    fn test_bounds_validation() {
        assert!(WeightBounds::default().validate().is_ok());
        assert!(WeightBounds::new(0.7, 0.2).validate().is_err());
        assert!(WeightBounds::new(-0.1, 0.5).validate().is_err());
        assert!(WeightBounds::new(0.0, 1.0).validate().is_ok());
    }
}
