use crate::prediction::{Direction, SingleModelPrediction};

/// Population variance over the mean of squares. Always within [0, 1]:
/// 0 when every value is equal, 1 when the values cancel out around zero.
pub fn normalized_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let mean_square = values.iter().map(|v| v * v).sum::<f64>() / n;
    if mean_square <= 0.0 {
        return 0.0;
    }

    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (variance / mean_square).clamp(0.0, 1.0)
}

/// Vote counts per direction in `[up, down, neutral]` order.
pub fn direction_counts(predictions: &[SingleModelPrediction]) -> [usize; 3] {
    let mut counts = [0usize; 3];
    for p in predictions {
        match p.direction {
            Direction::Up => counts[0] += 1,
            Direction::Down => counts[1] += 1,
            Direction::Neutral => counts[2] += 1,
        }
    }
    counts
}

/// Share of models siding with the most common direction.
pub fn agreement_ratio(predictions: &[SingleModelPrediction]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    let top = direction_counts(predictions).into_iter().max().unwrap_or(0);
    top as f64 / predictions.len() as f64
}

pub fn consensus_strength(predictions: &[SingleModelPrediction]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    let values: Vec<f64> = predictions.iter().map(|p| p.predicted_value).collect();
    let strength = 0.5 * (1.0 - normalized_variance(&values)) + 0.5 * agreement_ratio(predictions);
    strength.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(value: f64) -> SingleModelPrediction {
        SingleModelPrediction::new("m", "AAPL", value, 0.6)
    }

    #[test]
    fn test_unanimous_identical_predictions() {
        let predictions = vec![p(0.3), p(0.3), p(0.3)];
        assert_eq!(normalized_variance(&[0.3, 0.3, 0.3]), 0.0);
        assert!((consensus_strength(&predictions) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric_split_has_no_consensus_on_value() {
        assert!((normalized_variance(&[0.5, -0.5]) - 1.0).abs() < 1e-12);
        // Variance term 0, agreement 1/2.
        let strength = consensus_strength(&[p(0.5), p(-0.5)]);
        assert!((strength - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_agreement_ratio() {
        let predictions = vec![p(0.8), p(0.6), p(-0.5)];
        assert!((agreement_ratio(&predictions) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(direction_counts(&predictions), [2, 1, 0]);
        assert_eq!(agreement_ratio(&[]), 0.0);
    }

    #[test]
    fn test_all_zero_values() {
        assert_eq!(normalized_variance(&[0.0, 0.0]), 0.0);
    }
}
