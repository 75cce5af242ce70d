use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::ensemble::AggregationMethod;
use crate::weighting::WeightStrategy;

/// Longest time an ensemble result may stay cached.
pub const MAX_CACHE_TTL_SECS: u64 = 7 * 24 * 3600;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub weights: WeightConfig,
    pub orchestrator: OrchestratorConfig,
    pub storage: StorageConfig,
    pub service: ServiceConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub window_capacity: usize,
    pub latency_buffer_capacity: usize,
    pub min_samples_for_metrics: usize,
    pub drift_threshold: f64,
    pub latency_ceiling_ms: f64,
    pub min_historical_samples: usize,
    pub min_recent_samples: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window_capacity: 1000,
            latency_buffer_capacity: 1000,
            min_samples_for_metrics: 30,
            drift_threshold: 0.15,
            latency_ceiling_ms: 1000.0,
            min_historical_samples: 30,
            min_recent_samples: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    pub min_weight: f64,
    pub max_weight: f64,
    pub decay_factor: f64,
    pub recency_horizon_secs: u64,
    pub default_strategy: WeightStrategy,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            min_weight: 0.05,
            max_weight: 0.6,
            decay_factor: 0.95,
            recency_horizon_secs: 7 * 24 * 3600,
            default_strategy: WeightStrategy::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub model_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub min_models_required: usize,
    pub cache_ttl_secs: u64,
    pub direction_threshold: f64,
    pub default_method: AggregationMethod,
}

impl OrchestratorConfig {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_ttl_secs(&self) -> u64 {
        self.cache_ttl_secs.min(MAX_CACHE_TTL_SECS)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model_timeout_ms: 150,
            request_timeout_ms: 1000,
            min_models_required: 3,
            cache_ttl_secs: 300,
            direction_threshold: 0.1,
            default_method: AggregationMethod::Weighted,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub redis_url: Option<String>,
    pub metrics_db_path: Option<String>,
    pub persist_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            metrics_db_path: None,
            persist_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub model_service_url: String,
    pub symbols: Vec<String>,
    pub horizon: String,
    pub refresh_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_service_url: "http://localhost:8500".to_string(),
            symbols: Vec::new(),
            horizon: "1w".to_string(),
            refresh_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub port: u16,
    pub log_level: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            port: 9100,
            log_level: "info".to_string(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let defaults = Config::default();

        let config = Config {
            tracker: TrackerConfig {
                window_capacity: env_or("ENSEMBLE_WINDOW_CAPACITY", defaults.tracker.window_capacity),
                latency_buffer_capacity: env_or(
                    "ENSEMBLE_LATENCY_BUFFER_CAPACITY",
                    defaults.tracker.latency_buffer_capacity,
                ),
                min_samples_for_metrics: env_or(
                    "ENSEMBLE_MIN_SAMPLES",
                    defaults.tracker.min_samples_for_metrics,
                ),
                drift_threshold: env_or("ENSEMBLE_DRIFT_THRESHOLD", defaults.tracker.drift_threshold),
                latency_ceiling_ms: env_or(
                    "ENSEMBLE_LATENCY_CEILING_MS",
                    defaults.tracker.latency_ceiling_ms,
                ),
                ..defaults.tracker
            },
            weights: WeightConfig {
                min_weight: env_or("ENSEMBLE_MIN_WEIGHT", defaults.weights.min_weight),
                max_weight: env_or("ENSEMBLE_MAX_WEIGHT", defaults.weights.max_weight),
                decay_factor: env_or("ENSEMBLE_DECAY_FACTOR", defaults.weights.decay_factor),
                default_strategy: env_or(
                    "ENSEMBLE_WEIGHT_STRATEGY",
                    defaults.weights.default_strategy,
                ),
                ..defaults.weights
            },
            orchestrator: OrchestratorConfig {
                model_timeout_ms: env_or(
                    "ENSEMBLE_MODEL_TIMEOUT_MS",
                    defaults.orchestrator.model_timeout_ms,
                ),
                request_timeout_ms: env_or(
                    "ENSEMBLE_REQUEST_TIMEOUT_MS",
                    defaults.orchestrator.request_timeout_ms,
                ),
                min_models_required: env_or(
                    "ENSEMBLE_MIN_MODELS",
                    defaults.orchestrator.min_models_required,
                ),
                cache_ttl_secs: env_or("ENSEMBLE_CACHE_TTL_SECS", defaults.orchestrator.cache_ttl_secs),
                default_method: env_or("ENSEMBLE_METHOD", defaults.orchestrator.default_method),
                ..defaults.orchestrator
            },
            storage: StorageConfig {
                redis_url: env::var("REDIS_URL").ok(),
                metrics_db_path: env::var("ENSEMBLE_METRICS_DB").ok(),
                persist_interval_secs: env_or(
                    "ENSEMBLE_PERSIST_INTERVAL_SECS",
                    defaults.storage.persist_interval_secs,
                ),
            },
            service: ServiceConfig {
                model_service_url: env::var("MODEL_SERVICE_URL")
                    .unwrap_or(defaults.service.model_service_url),
                symbols: env::var("ENSEMBLE_SYMBOLS")
                    .map(|s| {
                        s.split(',')
                            .map(|sym| sym.trim().to_string())
                            .filter(|sym| !sym.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                horizon: env::var("ENSEMBLE_HORIZON").unwrap_or(defaults.service.horizon),
                refresh_interval_secs: env_or(
                    "ENSEMBLE_REFRESH_INTERVAL_SECS",
                    defaults.service.refresh_interval_secs,
                ),
            },
            monitoring: MonitoringConfig {
                port: env_or("MONITORING_PORT", defaults.monitoring.port),
                log_level: env::var("LOG_LEVEL").unwrap_or(defaults.monitoring.log_level),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Load from a config file, with `ENSEMBLE__SECTION__KEY` environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("ENSEMBLE").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config file {}", path))?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        if !(0.0..=1.0).contains(&w.min_weight)
            || !(0.0..=1.0).contains(&w.max_weight)
            || w.min_weight > w.max_weight
        {
            anyhow::bail!(
                "Invalid weight bounds: min {} max {}",
                w.min_weight,
                w.max_weight
            );
        }
        if self.tracker.window_capacity == 0 || self.tracker.latency_buffer_capacity == 0 {
            anyhow::bail!("Window capacities must be positive");
        }
        if self.tracker.window_capacity < self.tracker.min_samples_for_metrics {
            anyhow::bail!(
                "Window capacity {} cannot hold the {} samples metrics require",
                self.tracker.window_capacity,
                self.tracker.min_samples_for_metrics
            );
        }

        let o = &self.orchestrator;
        if o.model_timeout_ms == 0 || o.request_timeout_ms == 0 {
            anyhow::bail!("Timeouts must be positive");
        }
        if o.request_timeout_ms < o.model_timeout_ms {
            anyhow::bail!(
                "Request timeout {}ms is shorter than the per-model timeout {}ms",
                o.request_timeout_ms,
                o.model_timeout_ms
            );
        }
        if o.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            anyhow::bail!(
                "Cache TTL {}s exceeds the {}s maximum",
                o.cache_ttl_secs,
                MAX_CACHE_TTL_SECS
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tracker.window_capacity, 1000);
        assert_eq!(config.tracker.min_samples_for_metrics, 30);
        assert_eq!(config.orchestrator.model_timeout(), Duration::from_millis(150));
        assert_eq!(config.orchestrator.min_models_required, 3);
        assert_eq!(config.orchestrator.cache_ttl_secs, 300);
        assert_eq!(config.weights.default_strategy, WeightStrategy::Hybrid);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut config = Config::default();
        config.weights.min_weight = 0.7;
        config.weights.max_weight = 0.3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_request_timeout_below_model_timeout() {
        let mut config = Config::default();
        config.orchestrator.model_timeout_ms = 500;
        config.orchestrator.request_timeout_ms = 200;
        assert!(config.validate().is_err());

        config.orchestrator.request_timeout_ms = 500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unbounded_cache_ttl() {
        let mut config = Config::default();
        config.orchestrator.cache_ttl_secs = u64::MAX;
        assert!(config.validate().is_err());
        assert_eq!(config.orchestrator.cache_ttl_secs(), MAX_CACHE_TTL_SECS);

        config.orchestrator.cache_ttl_secs = MAX_CACHE_TTL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_window_smaller_than_sample_bar() {
        let mut config = Config::default();
        config.tracker.window_capacity = 20;
        assert!(config.validate().is_err());

        config.tracker.min_samples_for_metrics = 20;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.orchestrator.model_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
