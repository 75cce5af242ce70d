//! Point-in-time performance metrics derived from a model's rolling window.
//!
//! Everything here is a pure function of the window contents, so metrics can be
//! recomputed on every read or materialized periodically without drifting apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::window::{OutcomeRecord, PerformanceWindow};
use crate::core::config::TrackerConfig;

/// Lower and upper end of the assumed risk-adjusted return range.
const RAR_FLOOR: f64 = -1.0;
const RAR_CEILING: f64 = 2.0;

/// Share of validated records treated as "historical" in drift detection.
const DRIFT_SPLIT: f64 = 0.7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DriftSeverity {
    None,
    Low,
    Medium,
    High,
}

impl fmt::Display for DriftSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftSeverity::None => write!(f, "none"),
            DriftSeverity::Low => write!(f, "low"),
            DriftSeverity::Medium => write!(f, "medium"),
            DriftSeverity::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriftReport {
    pub detected: bool,
    pub severity: DriftSeverity,
    pub concept_drift: f64,
    pub feature_drift: f64,
    pub historical_samples: usize,
    pub recent_samples: usize,
}

impl DriftReport {
    fn not_detected(historical_samples: usize, recent_samples: usize) -> Self {
        Self {
            detected: false,
            severity: DriftSeverity::None,
            concept_drift: 0.0,
            feature_drift: 0.0,
            historical_samples,
            recent_samples,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceMetrics {
    pub model_id: String,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub risk_adjusted_return: f64,
    pub mean_absolute_error: f64,
    pub latency_p50: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub reliability_score: f64,
    pub feature_drift: f64,
    pub concept_drift: f64,
    pub drift_severity: DriftSeverity,
    pub window_size: usize,
    pub validated_samples: usize,
    pub last_updated: DateTime<Utc>,
}

impl PerformanceMetrics {
    pub fn compute(model_id: &str, window: &PerformanceWindow, config: &TrackerConfig) -> Self {
        let validated = window.validated();
        let classification = ClassificationStats::from_records(&validated);
        let risk_adjusted_return = risk_adjusted_return(&validated);
        let latency = LatencyPercentiles::from_samples(window.latency_samples());
        let drift = detect_drift(&validated, config);

        let reliability_score = reliability_score(
            classification.accuracy,
            classification.precision,
            classification.recall,
            risk_adjusted_return,
            latency.p95,
            config.latency_ceiling_ms,
        );

        Self {
            model_id: model_id.to_string(),
            accuracy: classification.accuracy,
            precision: classification.precision,
            recall: classification.recall,
            risk_adjusted_return,
            mean_absolute_error: mean_absolute_error(&validated),
            latency_p50: latency.p50,
            latency_p95: latency.p95,
            latency_p99: latency.p99,
            reliability_score,
            feature_drift: drift.feature_drift,
            concept_drift: drift.concept_drift,
            drift_severity: drift.severity,
            window_size: window.len(),
            validated_samples: validated.len(),
            last_updated: window.last_timestamp().unwrap_or_else(Utc::now),
        }
    }

    /// Risk-adjusted return mapped from the assumed [-1, 2] range into [0, 1].
    pub fn normalized_risk_adjusted_return(&self) -> f64 {
        normalize_risk_adjusted_return(self.risk_adjusted_return)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassificationStats {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
}

impl ClassificationStats {
    /// Sign agreement between prediction and outcome; "positive" is an upward call.
    pub fn from_records(records: &[&OutcomeRecord]) -> Self {
        let mut correct = 0usize;
        let mut total = 0usize;
        let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);

        for record in records {
            let Some(actual) = record.actual_outcome else {
                continue;
            };
            total += 1;

            let predicted_sign = sign(record.predicted_value);
            let actual_sign = sign(actual);
            if predicted_sign == actual_sign {
                correct += 1;
            }

            match (predicted_sign > 0, actual_sign > 0) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, true) => fn_ += 1,
                (false, false) => {}
            }
        }

        Self {
            accuracy: ratio(correct, total),
            precision: ratio(tp, tp + fp),
            recall: ratio(tp, tp + fn_),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencyPercentiles {
    pub fn from_samples(mut samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_by(|a, b| a.total_cmp(b));

        Self {
            p50: percentile_of_sorted(&samples, 0.50),
            p95: percentile_of_sorted(&samples, 0.95),
            p99: percentile_of_sorted(&samples, 0.99),
        }
    }
}

/// Value at index `floor(len * p)` of an ascending slice, clamped to the last element.
pub fn percentile_of_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Mean residual (actual - predicted) over its sample standard deviation.
pub fn risk_adjusted_return(records: &[&OutcomeRecord]) -> f64 {
    let residuals: Vec<f64> = records
        .iter()
        .filter_map(|r| r.actual_outcome.map(|a| a - r.predicted_value))
        .collect();

    if residuals.len() < 2 {
        return 0.0;
    }

    let n = residuals.len() as f64;
    let mean = residuals.iter().sum::<f64>() / n;
    let variance = residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();

    if std_dev > 0.0 {
        mean / std_dev
    } else {
        0.0
    }
}

pub fn mean_absolute_error(records: &[&OutcomeRecord]) -> f64 {
    let errors: Vec<f64> = records
        .iter()
        .filter_map(|r| r.actual_outcome.map(|a| (a - r.predicted_value).abs()))
        .collect();

    if errors.is_empty() {
        0.0
    } else {
        errors.iter().sum::<f64>() / errors.len() as f64
    }
}

pub fn normalize_risk_adjusted_return(rar: f64) -> f64 {
    ((rar - RAR_FLOOR) / (RAR_CEILING - RAR_FLOOR)).clamp(0.0, 1.0)
}

pub fn reliability_score(
    accuracy: f64,
    precision: f64,
    recall: f64,
    risk_adjusted_return: f64,
    latency_p95: f64,
    latency_ceiling_ms: f64,
) -> f64 {
    let latency_penalty = if latency_ceiling_ms > 0.0 {
        (1.0 - latency_p95 / latency_ceiling_ms).max(0.0)
    } else {
        0.0
    };

    let score = accuracy * 0.3
        + precision * 0.2
        + recall * 0.2
        + normalize_risk_adjusted_return(risk_adjusted_return) * 0.2
        + latency_penalty * 0.1;

    score.clamp(0.0, 1.0)
}

/// Compare the oldest 70% of validated records against the newest 30%.
///
/// Concept drift is the accuracy gap; feature drift is approximated by the gap in
/// mean confidence, not by a distance over the model's actual inputs.
pub fn detect_drift(validated: &[&OutcomeRecord], config: &TrackerConfig) -> DriftReport {
    let split = (validated.len() as f64 * DRIFT_SPLIT) as usize;
    let (historical, recent) = validated.split_at(split);

    if historical.len() < config.min_historical_samples || recent.len() < config.min_recent_samples
    {
        return DriftReport::not_detected(historical.len(), recent.len());
    }

    let concept_drift = (ClassificationStats::from_records(historical).accuracy
        - ClassificationStats::from_records(recent).accuracy)
        .abs();
    let feature_drift = (mean_confidence(historical) - mean_confidence(recent)).abs();

    let threshold = config.drift_threshold;
    let worst = concept_drift.max(feature_drift);
    let detected = worst > threshold;

    let severity = if !detected {
        DriftSeverity::None
    } else if worst > threshold * 2.0 {
        DriftSeverity::High
    } else if worst > threshold * 1.5 {
        DriftSeverity::Medium
    } else {
        DriftSeverity::Low
    };

    DriftReport {
        detected,
        severity,
        concept_drift,
        feature_drift,
        historical_samples: historical.len(),
        recent_samples: recent.len(),
    }
}

fn mean_confidence(records: &[&OutcomeRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.confidence).sum::<f64>() / records.len() as f64
}

fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
