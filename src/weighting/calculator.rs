use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::strategy::{ModelWeight, WeightBounds, WeightStrategy};
use crate::core::config::WeightConfig;
use crate::core::error::{EnsembleError, EnsembleResult};
use crate::performance::{PerformanceMetrics, PerformanceTracker};

/// Raw score and confidence assigned to models without enough history.
pub const LOW_SCORE: f64 = 0.1;
pub const LOW_CONFIDENCE: f64 = 0.3;

const HYBRID_PERFORMANCE: f64 = 0.5;
const HYBRID_RECENCY: f64 = 0.3;
const HYBRID_CONFIDENCE: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
struct Score {
    raw: f64,
    confidence: f64,
    metadata: HashMap<String, f64>,
}

impl Score {
    fn new(raw: f64, confidence: f64) -> Self {
        Self {
            raw,
            confidence,
            metadata: HashMap::new(),
        }
    }

    fn fallback() -> Self {
        let mut score = Self::new(LOW_SCORE, LOW_CONFIDENCE);
        score.metadata.insert("fallback".to_string(), 1.0);
        score
    }

    fn with(mut self, key: &str, value: f64) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

pub struct WeightCalculator {
    tracker: Arc<PerformanceTracker>,
    config: WeightConfig,
}

impl WeightCalculator {
    pub fn new(tracker: Arc<PerformanceTracker>, config: WeightConfig) -> Self {
        Self { tracker, config }
    }

    pub fn default_bounds(&self) -> WeightBounds {
        WeightBounds::new(self.config.min_weight, self.config.max_weight)
    }

    pub fn default_strategy(&self) -> WeightStrategy {
        self.config.default_strategy
    }

    /// Normalized weights for `model_ids`. Only an empty model list (or
    /// malformed bounds) is an error; thin history degrades to low scores.
    pub async fn calculate_weights(
        &self,
        model_ids: &[String],
        strategy: WeightStrategy,
        confidence_scores: Option<&HashMap<String, f64>>,
        bounds: WeightBounds,
    ) -> EnsembleResult<HashMap<String, ModelWeight>> {
        self.calculate_weights_at(model_ids, strategy, confidence_scores, bounds, Utc::now())
            .await
    }

    pub async fn calculate_weights_at(
        &self,
        model_ids: &[String],
        strategy: WeightStrategy,
        confidence_scores: Option<&HashMap<String, f64>>,
        bounds: WeightBounds,
        now: DateTime<Utc>,
    ) -> EnsembleResult<HashMap<String, ModelWeight>> {
        if model_ids.is_empty() {
            return Err(EnsembleError::EmptyModelSet);
        }
        bounds.validate()?;

        let mut ids: Vec<&String> = Vec::with_capacity(model_ids.len());
        for id in model_ids {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let mut metrics: HashMap<&str, Option<PerformanceMetrics>> = HashMap::new();
        if strategy.needs_metrics() {
            for id in &ids {
                let found = match self.tracker.get_metrics(id).await {
                    Ok(m) => Some(m),
                    Err(e) => {
                        tracing::debug!("Using fallback score for {}: {}", id, e);
                        None
                    }
                };
                metrics.insert(id.as_str(), found);
            }
        }

        // Metrics over unvalidated predictions carry latency but no accuracy.
        let min_validated = self.tracker.min_samples();
        let n = ids.len();
        let scores: Vec<Score> = ids
            .iter()
            .map(|id| {
                let m = metrics.get(id.as_str()).and_then(|m| m.as_ref());
                let m = m.filter(|m| m.validated_samples >= min_validated);
                self.score(strategy, id, m, confidence_scores, n, now)
            })
            .collect();

        let raw: Vec<f64> = scores.iter().map(|s| s.raw).collect();
        let normalized = normalize_weights(&raw, bounds);

        let weights: HashMap<String, ModelWeight> = ids
            .iter()
            .zip(scores)
            .zip(normalized)
            .map(|((id, score), weight)| {
                (
                    (*id).clone(),
                    ModelWeight {
                        model_id: (*id).clone(),
                        weight,
                        raw_score: score.raw,
                        strategy,
                        confidence: score.confidence,
                        metadata: score.metadata,
                    },
                )
            })
            .collect();

        tracing::debug!(
            "⚖️  {} weights for {} models (diversity {:.3})",
            strategy,
            n,
            diversity_score(weights.values().map(|w| w.weight))
        );

        Ok(weights)
    }

    fn score(
        &self,
        strategy: WeightStrategy,
        model_id: &str,
        metrics: Option<&PerformanceMetrics>,
        confidence_scores: Option<&HashMap<String, f64>>,
        n: usize,
        now: DateTime<Utc>,
    ) -> Score {
        match strategy {
            WeightStrategy::Equal => Score::new(1.0 / n as f64, 1.0),
            WeightStrategy::Performance => performance_score(metrics),
            WeightStrategy::Recency => recency_score(
                metrics,
                now,
                self.config.decay_factor,
                self.config.recency_horizon_secs,
            ),
            WeightStrategy::Confidence => match confidence_scores.filter(|s| !s.is_empty()) {
                Some(scores) => supplied_confidence_score(model_id, scores),
                None => Score::new(1.0 / n as f64, 1.0).with("equal_fallback", 1.0),
            },
            WeightStrategy::RiskAdjusted => risk_adjusted_score(metrics),
            WeightStrategy::Hybrid => {
                let performance = performance_score(metrics);
                let recency = recency_score(
                    metrics,
                    now,
                    self.config.decay_factor,
                    self.config.recency_horizon_secs,
                );
                let confidence = match confidence_scores.filter(|s| !s.is_empty()) {
                    Some(scores) => supplied_confidence_score(model_id, scores),
                    None => Score::fallback(),
                };

                let raw = HYBRID_PERFORMANCE * performance.raw
                    + HYBRID_RECENCY * recency.raw
                    + HYBRID_CONFIDENCE * confidence.raw;
                let blended_confidence = HYBRID_PERFORMANCE * performance.confidence
                    + HYBRID_RECENCY * recency.confidence
                    + HYBRID_CONFIDENCE * confidence.confidence;

                Score::new(raw, blended_confidence)
                    .with("performance", performance.raw)
                    .with("recency", recency.raw)
                    .with("confidence", confidence.raw)
            }
        }
    }
}

fn data_confidence(metrics: &PerformanceMetrics) -> f64 {
    (metrics.validated_samples as f64 / 100.0).clamp(LOW_CONFIDENCE, 1.0)
}

fn performance_score(metrics: Option<&PerformanceMetrics>) -> Score {
    match metrics {
        Some(m) => Score::new(0.5 * m.accuracy + 0.5 * m.reliability_score, data_confidence(m))
            .with("accuracy", m.accuracy)
            .with("reliability", m.reliability_score),
        None => Score::fallback(),
    }
}

/// `decay^(normalized_age * 100) * reliability`, age measured from the newest record.
fn recency_score(
    metrics: Option<&PerformanceMetrics>,
    now: DateTime<Utc>,
    decay_factor: f64,
    horizon_secs: u64,
) -> Score {
    let Some(m) = metrics else {
        return Score::fallback();
    };

    let age_secs = (now - m.last_updated).num_milliseconds().max(0) as f64 / 1000.0;
    let normalized_age = if horizon_secs == 0 {
        1.0
    } else {
        (age_secs / horizon_secs as f64).min(1.0)
    };
    let raw = decay_factor.powf(normalized_age * 100.0) * m.reliability_score;

    Score::new(raw, data_confidence(m)).with("normalized_age", normalized_age)
}

fn risk_adjusted_score(metrics: Option<&PerformanceMetrics>) -> Score {
    match metrics {
        Some(m) => Score::new(m.normalized_risk_adjusted_return(), data_confidence(m))
            .with("risk_adjusted_return", m.risk_adjusted_return),
        None => Score::fallback(),
    }
}

fn supplied_confidence_score(model_id: &str, scores: &HashMap<String, f64>) -> Score {
    match scores.get(model_id) {
        Some(c) if c.is_finite() => Score::new(c.clamp(0.0, 1.0), 1.0),
        _ => Score::fallback(),
    }
}

/// Clamp each raw score into the bounds, then scale so the set sums to one.
/// A zero (or non-finite) total falls back to equal weights.
pub fn normalize_weights(raw: &[f64], bounds: WeightBounds) -> Vec<f64> {
    let n = raw.len();
    if n == 0 {
        return Vec::new();
    }

    let clamped: Vec<f64> = raw
        .iter()
        .map(|r| {
            if r.is_finite() {
                r.clamp(bounds.min, bounds.max)
            } else {
                bounds.min
            }
        })
        .collect();

    let total: f64 = clamped.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return vec![1.0 / n as f64; n];
    }

    clamped.iter().map(|w| w / total).collect()
}

/// Shannon entropy of the distribution over `log2(N)`: 1.0 when uniform,
/// tending to 0 as weight concentrates. A single model has no diversity.
pub fn diversity_score(weights: impl IntoIterator<Item = f64>) -> f64 {
    let weights: Vec<f64> = weights.into_iter().collect();
    let n = weights.len();
    if n < 2 {
        return 0.0;
    }

    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if total <= 0.0 {
        return 0.0;
    }

    let entropy: f64 = weights
        .iter()
        .filter(|w| **w > 0.0)
        .map(|w| {
            let p = w / total;
            -p * p.log2()
        })
        .sum();

    (entropy / (n as f64).log2()).clamp(0.0, 1.0)
}
