use std::collections::HashMap;

use super::consensus::direction_counts;
use super::types::{AggregationMethod, Signal};
use crate::core::error::{EnsembleError, EnsembleResult};
use crate::prediction::SingleModelPrediction;
use crate::weighting::{ModelWeight, WeightStrategy};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub direction: Signal,
    pub confidence: f64,
    pub expected_value: f64,
}

/// Combines the successful predictions of one request into a single call.
pub trait AggregationStrategy: Send + Sync {
    fn method(&self) -> AggregationMethod;

    /// Weight strategy actually used, given the one the caller asked for.
    fn weight_strategy(&self, requested: WeightStrategy) -> WeightStrategy {
        requested
    }

    fn aggregate(
        &self,
        predictions: &[SingleModelPrediction],
        weights: &HashMap<String, ModelWeight>,
    ) -> EnsembleResult<Aggregate>;
}

pub fn for_method(method: AggregationMethod, direction_threshold: f64) -> Box<dyn AggregationStrategy> {
    match method {
        AggregationMethod::Weighted => Box::new(WeightedAggregation::new(direction_threshold)),
        AggregationMethod::Voting => Box::new(VotingAggregation),
        AggregationMethod::Stacking => Box::new(StackingAggregation::new(direction_threshold)),
    }
}

pub struct WeightedAggregation {
    threshold: f64,
}

impl WeightedAggregation {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl AggregationStrategy for WeightedAggregation {
    fn method(&self) -> AggregationMethod {
        AggregationMethod::Weighted
    }

    fn aggregate(
        &self,
        predictions: &[SingleModelPrediction],
        weights: &HashMap<String, ModelWeight>,
    ) -> EnsembleResult<Aggregate> {
        if predictions.is_empty() {
            return Err(EnsembleError::EmptyModelSet);
        }

        let mut expected_value = 0.0;
        let mut confidence = 0.0;
        for p in predictions {
            let weight = weights.get(&p.model_id).map(|w| w.weight).ok_or_else(|| {
                EnsembleError::WeightCalculationFailed(format!("no weight for {}", p.model_id))
            })?;
            expected_value += weight * p.predicted_value;
            confidence += weight * p.confidence;
        }

        if !expected_value.is_finite() {
            return Err(EnsembleError::Internal(format!(
                "weighted value is not finite: {}",
                expected_value
            )));
        }

        let direction = if expected_value > self.threshold {
            Signal::Buy
        } else if expected_value < -self.threshold {
            Signal::Sell
        } else {
            Signal::Hold
        };

        Ok(Aggregate {
            direction,
            confidence: confidence.clamp(0.0, 1.0),
            expected_value,
        })
    }
}

/// Majority vote on direction. Ties between the leading directions resolve to HOLD.
pub struct VotingAggregation;

impl AggregationStrategy for VotingAggregation {
    fn method(&self) -> AggregationMethod {
        AggregationMethod::Voting
    }

    // Every vote counts the same, so diversity is reported over equal weights.
    fn weight_strategy(&self, _requested: WeightStrategy) -> WeightStrategy {
        WeightStrategy::Equal
    }

    fn aggregate(
        &self,
        predictions: &[SingleModelPrediction],
        _weights: &HashMap<String, ModelWeight>,
    ) -> EnsembleResult<Aggregate> {
        if predictions.is_empty() {
            return Err(EnsembleError::EmptyModelSet);
        }

        let [up, down, neutral] = direction_counts(predictions);
        let top = up.max(down).max(neutral);
        let leaders = [up, down, neutral].iter().filter(|c| **c == top).count();

        let direction = if leaders > 1 {
            Signal::Hold
        } else if top == up {
            Signal::Buy
        } else if top == down {
            Signal::Sell
        } else {
            Signal::Hold
        };

        let total = predictions.len() as f64;
        let expected_value = predictions.iter().map(|p| p.predicted_value).sum::<f64>() / total;

        Ok(Aggregate {
            direction,
            confidence: top as f64 / total,
            expected_value,
        })
    }
}

/// No meta-learner is trained yet; stacking currently combines like `Weighted`.
pub struct StackingAggregation {
    inner: WeightedAggregation,
}

impl StackingAggregation {
    pub fn new(threshold: f64) -> Self {
        Self {
            inner: WeightedAggregation::new(threshold),
        }
    }
}

impl AggregationStrategy for StackingAggregation {
    fn method(&self) -> AggregationMethod {
        AggregationMethod::Stacking
    }

    fn aggregate(
        &self,
        predictions: &[SingleModelPrediction],
        weights: &HashMap<String, ModelWeight>,
    ) -> EnsembleResult<Aggregate> {
        tracing::debug!("Stacking falls back to weighted aggregation");
        self.inner.aggregate(predictions, weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::Direction;

    fn prediction(model_id: &str, value: f64, confidence: f64) -> SingleModelPrediction {
        SingleModelPrediction::new(model_id, "AAPL", value, confidence)
    }

    fn weights(pairs: &[(&str, f64)]) -> HashMap<String, ModelWeight> {
        pairs
            .iter()
            .map(|(id, w)| {
                (
                    id.to_string(),
                    ModelWeight {
                        model_id: id.to_string(),
                        weight: *w,
                        raw_score: *w,
                        strategy: WeightStrategy::Equal,
                        confidence: 1.0,
                        metadata: HashMap::new(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_voting_majority() {
        let predictions = vec![
            prediction("a", 0.4, 0.8),
            prediction("b", 0.2, 0.6),
            prediction("c", -0.3, 0.5),
        ];
        let result = VotingAggregation.aggregate(&predictions, &HashMap::new()).unwrap();
        assert_eq!(result.direction, Signal::Buy);
        assert!((result.confidence - 2.0 / 3.0).abs() < 1e-12);
        assert!((result.expected_value - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_voting_tie_holds() {
        let predictions = vec![prediction("a", 0.4, 0.8), prediction("b", -0.2, 0.6)];
        let result = VotingAggregation.aggregate(&predictions, &HashMap::new()).unwrap();
        assert_eq!(result.direction, Signal::Hold);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_voting_uses_reported_direction() {
        let predictions = vec![
            prediction("a", 0.4, 0.8).with_direction(Direction::Neutral),
            prediction("b", 0.1, 0.6).with_direction(Direction::Neutral),
            prediction("c", 0.3, 0.5),
        ];
        let result = VotingAggregation.aggregate(&predictions, &HashMap::new()).unwrap();
        assert_eq!(result.direction, Signal::Hold);
        assert!((result.confidence - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_thresholds() {
        let strategy = WeightedAggregation::new(0.1);
        let w = weights(&[("a", 0.5), ("b", 0.5)]);

        let buy = strategy
            .aggregate(&[prediction("a", 0.4, 0.8), prediction("b", 0.2, 0.6)], &w)
            .unwrap();
        assert_eq!(buy.direction, Signal::Buy);
        assert!((buy.expected_value - 0.3).abs() < 1e-12);
        assert!((buy.confidence - 0.7).abs() < 1e-12);

        let hold = strategy
            .aggregate(&[prediction("a", 0.1, 0.8), prediction("b", -0.05, 0.6)], &w)
            .unwrap();
        assert_eq!(hold.direction, Signal::Hold);

        let sell = strategy
            .aggregate(&[prediction("a", -0.4, 0.8), prediction("b", -0.2, 0.6)], &w)
            .unwrap();
        assert_eq!(sell.direction, Signal::Sell);
    }

    #[test]
    fn test_weighted_missing_weight() {
        let strategy = WeightedAggregation::new(0.1);
        let result = strategy.aggregate(&[prediction("ghost", 0.4, 0.8)], &weights(&[("a", 1.0)]));
        assert!(matches!(result, Err(EnsembleError::WeightCalculationFailed(_))));
    }

    #[test]
    fn test_stacking_matches_weighted() {
        let predictions = vec![prediction("a", 0.6, 0.9), prediction("b", -0.1, 0.4)];
        let w = weights(&[("a", 0.7), ("b", 0.3)]);

        let stacked = for_method(AggregationMethod::Stacking, 0.1)
            .aggregate(&predictions, &w)
            .unwrap();
        let weighted = for_method(AggregationMethod::Weighted, 0.1)
            .aggregate(&predictions, &w)
            .unwrap();
        assert_eq!(stacked, weighted);
        assert_eq!(
            for_method(AggregationMethod::Voting, 0.1).weight_strategy(WeightStrategy::Hybrid),
            WeightStrategy::Equal
        );
    }
}
