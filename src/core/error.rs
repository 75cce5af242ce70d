use std::fmt;

/// Coarse classification used for propagation decisions and telemetry labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    DataQuality,
    Timeout,
    ServiceUnavailable,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::DataQuality => write!(f, "data_quality"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::ServiceUnavailable => write!(f, "service_unavailable"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnsembleError {
    #[error("model set is empty")]
    EmptyModelSet,

    #[error("invalid weight bounds: min {min} max {max}")]
    InvalidWeightBounds { min: f64, max: f64 },

    #[error("not enough data for {model_id}: {samples} samples, need {required}")]
    NotEnoughData {
        model_id: String,
        samples: usize,
        required: usize,
    },

    #[error("insufficient models: {succeeded} succeeded, need {required}")]
    InsufficientModels { succeeded: usize, required: usize },

    #[error("all {attempted} model predictions failed")]
    AllModelsFailed { attempted: usize },

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("weight calculation failed: {0}")]
    WeightCalculationFailed(String),

    #[error("model registry unavailable: {0}")]
    ModelRegistryUnavailable(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EnsembleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnsembleError::EmptyModelSet | EnsembleError::InvalidWeightBounds { .. } => {
                ErrorKind::Validation
            }
            EnsembleError::NotEnoughData { .. } | EnsembleError::InsufficientModels { .. } => {
                ErrorKind::DataQuality
            }
            EnsembleError::AllModelsFailed { .. }
            | EnsembleError::CacheUnavailable(_)
            | EnsembleError::ModelRegistryUnavailable(_)
            | EnsembleError::Storage(_) => ErrorKind::ServiceUnavailable,
            EnsembleError::WeightCalculationFailed(_) | EnsembleError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the same request may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::DataQuality | ErrorKind::Timeout | ErrorKind::ServiceUnavailable
        )
    }
}

pub type EnsembleResult<T> = std::result::Result<T, EnsembleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_taxonomy() {
        assert_eq!(EnsembleError::EmptyModelSet.kind(), ErrorKind::Validation);
        assert!(!EnsembleError::EmptyModelSet.is_retryable());

        let quorum = EnsembleError::InsufficientModels {
            succeeded: 0,
            required: 3,
        };
        assert_eq!(quorum.kind(), ErrorKind::DataQuality);
        assert!(quorum.is_retryable());

        let failed = EnsembleError::AllModelsFailed { attempted: 4 };
        assert_eq!(failed.kind(), ErrorKind::ServiceUnavailable);
        assert!(failed.is_retryable());

        assert!(!EnsembleError::Internal("boom".into()).is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = EnsembleError::NotEnoughData {
            model_id: "lstm".into(),
            samples: 12,
            required: 30,
        };
        assert_eq!(err.to_string(), "not enough data for lstm: 12 samples, need 30");
    }
}
