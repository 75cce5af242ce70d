use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::aggregation;
use super::cache::EnsembleCache;
use super::consensus::consensus_strength;
use super::types::{EnsemblePrediction, EnsembleRequest, ModelContribution, Signal};
use crate::core::config::OrchestratorConfig;
use crate::core::error::{EnsembleError, EnsembleResult};
use crate::core::health::HealthChecker;
use crate::monitoring::{EnsembleEvent, EnsembleTelemetry, EventBus};
use crate::performance::PerformanceTracker;
use crate::prediction::{ModelRegistry, PredictionEngine, PredictionRequest, SingleModelPrediction};
use crate::weighting::{diversity_score, WeightCalculator};

#[derive(Debug, Clone, PartialEq)]
enum ModelFailure {
    Timeout,
    Error(String),
    Invalid(String),
}

impl ModelFailure {
    fn label(&self) -> &'static str {
        match self {
            ModelFailure::Timeout => "timeout",
            ModelFailure::Error(_) => "error",
            ModelFailure::Invalid(_) => "invalid",
        }
    }

    fn describe(&self) -> String {
        match self {
            ModelFailure::Timeout => "timed out".to_string(),
            ModelFailure::Error(e) => e.clone(),
            ModelFailure::Invalid(reason) => reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Served {
    Cache,
    Ensemble,
    Fallback,
}

impl Served {
    fn label(&self) -> &'static str {
        match self {
            Served::Cache => "cache_hit",
            Served::Ensemble => "ok",
            Served::Fallback => "fallback",
        }
    }
}

struct FanOut {
    successes: Vec<SingleModelPrediction>,
    failures: Vec<(String, ModelFailure)>,
}

/// Fans a request out to every selected model, then weighs, aggregates and
/// caches the survivors. Collaborators are injected so tests can swap them.
pub struct EnsembleOrchestrator {
    engine: Arc<dyn PredictionEngine>,
    registry: Arc<dyn ModelRegistry>,
    tracker: Arc<PerformanceTracker>,
    calculator: Arc<WeightCalculator>,
    cache: Arc<dyn EnsembleCache>,
    config: OrchestratorConfig,
    events: Option<Arc<EventBus>>,
    health: Option<HealthChecker>,
    telemetry: Option<EnsembleTelemetry>,
}

impl EnsembleOrchestrator {
    pub fn new(
        engine: Arc<dyn PredictionEngine>,
        registry: Arc<dyn ModelRegistry>,
        tracker: Arc<PerformanceTracker>,
        calculator: Arc<WeightCalculator>,
        cache: Arc<dyn EnsembleCache>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            engine,
            registry,
            tracker,
            calculator,
            cache,
            config,
            events: None,
            health: None,
            telemetry: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_health(mut self, health: HealthChecker) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_telemetry(mut self, telemetry: EnsembleTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    /// A request pre-filled with the configured method, strategy and quorum.
    pub fn request(&self, symbol: impl Into<String>, horizon: impl Into<String>) -> EnsembleRequest {
        EnsembleRequest::new(symbol, horizon)
            .with_method(self.config.default_method)
            .with_weight_strategy(self.calculator.default_strategy())
            .with_min_models(self.config.min_models_required)
    }

    pub async fn predict(&self, request: EnsembleRequest) -> EnsembleResult<EnsemblePrediction> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();

        tracing::debug!(
            "[{}] 🎯 Ensemble {} {} via {}/{}",
            request_id,
            request.symbol,
            request.horizon,
            request.method,
            request.weight_strategy
        );

        let result = self.run(&request_id, &request).await;

        let outcome = match &result {
            Ok((prediction, served)) => {
                tracing::info!(
                    "[{}] ✅ {} {} -> {} (confidence {:.2}, {} models, {})",
                    request_id,
                    prediction.symbol,
                    prediction.horizon,
                    prediction.final_direction,
                    prediction.final_confidence,
                    prediction.model_count(),
                    served.label()
                );
                served.label().to_string()
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!("[{}] ⚠️  Ensemble {} failed: {}", request_id, request.symbol, e);
                } else {
                    tracing::error!("[{}] ❌ Ensemble {} failed: {}", request_id, request.symbol, e);
                }
                e.kind().to_string()
            }
        };

        if let Some(telemetry) = &self.telemetry {
            telemetry.record_request(request.method.as_str(), &outcome, started.elapsed());
        }

        result.map(|(prediction, _)| prediction)
    }

    async fn run(
        &self,
        request_id: &str,
        request: &EnsembleRequest,
    ) -> EnsembleResult<(EnsemblePrediction, Served)> {
        let bounds = request
            .bounds
            .unwrap_or_else(|| self.calculator.default_bounds());
        bounds.validate()?;
        let min_required = request.min_models_required.max(1);
        let cache_key = request.cache_key();

        if let Some(hit) = self.cache_lookup(request_id, &cache_key).await {
            return Ok((hit, Served::Cache));
        }

        let model_ids = self.select_models(request).await?;
        let fan_out = self
            .fan_out(request_id, &request.symbol, &request.horizon, &model_ids)
            .await?;

        for (model_id, failure) in &fan_out.failures {
            self.report_failure(request_id, model_id, failure);
        }
        let failed_models: Vec<String> = fan_out.failures.iter().map(|(id, _)| id.clone()).collect();
        let successes = fan_out.successes;

        if successes.len() < min_required {
            let Some(prediction) =
                self.fallback(request_id, request, &successes, failed_models, min_required)
            else {
                return Err(EnsembleError::InsufficientModels {
                    succeeded: 0,
                    required: min_required,
                });
            };
            self.record_outcomes(&successes).await;
            return Ok((prediction, Served::Fallback));
        }

        let aggregator = aggregation::for_method(request.method, self.config.direction_threshold);
        let weight_strategy = aggregator.weight_strategy(request.weight_strategy);
        let model_ids: Vec<String> = successes.iter().map(|p| p.model_id.clone()).collect();

        let weights = self
            .calculator
            .calculate_weights(
                &model_ids,
                weight_strategy,
                request.confidence_scores.as_ref(),
                bounds,
            )
            .await
            .map_err(|e| match e {
                EnsembleError::InvalidWeightBounds { .. } => e,
                other => EnsembleError::WeightCalculationFailed(other.to_string()),
            })?;

        let aggregate = aggregator.aggregate(&successes, &weights)?;
        let consensus = consensus_strength(&successes);
        let diversity = diversity_score(
            model_ids
                .iter()
                .filter_map(|id| weights.get(id))
                .map(|w| w.weight),
        );

        let contributions = successes
            .iter()
            .map(|p| ModelContribution {
                model_id: p.model_id.clone(),
                predicted_value: p.predicted_value,
                direction: p.direction,
                confidence: p.confidence,
                weight: weights.get(&p.model_id).map_or(0.0, |w| w.weight),
                latency_ms: p.latency_ms,
                timestamp: p.timestamp,
            })
            .collect();

        self.record_outcomes(&successes).await;

        let now = Utc::now();
        let prediction = EnsemblePrediction {
            request_id: request_id.to_string(),
            symbol: request.symbol.clone(),
            horizon: request.horizon.clone(),
            aggregation_method: aggregator.method(),
            weight_strategy,
            final_direction: aggregate.direction,
            final_confidence: aggregate.confidence,
            expected_value: aggregate.expected_value,
            contributions,
            consensus_strength: consensus,
            diversity_score: diversity,
            fallback_model: None,
            failed_models,
            timestamp: now,
            expires_at: now + chrono::Duration::seconds(self.config.cache_ttl_secs() as i64),
        };

        self.cache_store(request_id, &cache_key, &prediction).await;

        Ok((prediction, Served::Ensemble))
    }

    async fn cache_lookup(&self, request_id: &str, key: &str) -> Option<EnsemblePrediction> {
        match self.cache.get(key).await {
            Ok(Some(hit)) => {
                tracing::debug!("[{}] Cache hit {}", request_id, key);
                self.record_cache("hit");
                self.set_health("cache", true).await;
                Some(hit)
            }
            Ok(None) => {
                self.record_cache("miss");
                self.set_health("cache", true).await;
                None
            }
            Err(e) => {
                self.cache_unavailable(request_id, key, &e).await;
                None
            }
        }
    }

    async fn cache_store(&self, request_id: &str, key: &str, prediction: &EnsemblePrediction) {
        match self.cache.set(key, prediction, self.config.cache_ttl_secs()).await {
            Ok(()) => self.record_cache("write"),
            Err(e) => self.cache_unavailable(request_id, key, &e).await,
        }
    }

    async fn cache_unavailable(&self, request_id: &str, key: &str, error: &EnsembleError) {
        tracing::warn!("[{}] ⚠️  Cache unavailable, continuing without it: {}", request_id, error);
        self.record_cache("error");
        self.set_health("cache", false).await;
        self.publish(EnsembleEvent::CacheUnavailable {
            key: key.to_string(),
            reason: error.to_string(),
        });
    }

    async fn select_models(&self, request: &EnsembleRequest) -> EnsembleResult<Vec<String>> {
        let candidates = match &request.model_ids {
            Some(ids) => ids.clone(),
            None => match self.registry.get_deployed_models(&request.horizon).await {
                Ok(ids) => {
                    self.set_health("model_registry", true).await;
                    ids
                }
                Err(e) => {
                    self.set_health("model_registry", false).await;
                    return Err(EnsembleError::ModelRegistryUnavailable(e.to_string()));
                }
            },
        };

        let mut model_ids: Vec<String> = Vec::with_capacity(candidates.len());
        for id in candidates {
            if !model_ids.contains(&id) {
                model_ids.push(id);
            }
        }

        if model_ids.is_empty() {
            return Err(EnsembleError::EmptyModelSet);
        }
        Ok(model_ids)
    }

    /// One spawned task per model, each racing its own timeout; the join over
    /// the handles is the barrier and keeps the order of `model_ids`. Hitting the
    /// request deadline aborts whatever is still running.
    async fn fan_out(
        &self,
        request_id: &str,
        symbol: &str,
        horizon: &str,
        model_ids: &[String],
    ) -> EnsembleResult<FanOut> {
        let model_timeout = self.config.model_timeout();

        let mut handles: Vec<JoinHandle<Result<SingleModelPrediction, ModelFailure>>> = model_ids
            .iter()
            .map(|model_id| {
                let engine = self.engine.clone();
                let request = PredictionRequest {
                    symbol: symbol.to_string(),
                    model_id: model_id.clone(),
                    horizon: horizon.to_string(),
                };

                tokio::spawn(async move {
                    let started = Instant::now();
                    let outcome =
                        match tokio::time::timeout(model_timeout, engine.predict(&request)).await {
                            Ok(Ok(prediction)) => accept(prediction, &request.model_id, started),
                            Ok(Err(e)) => Err(ModelFailure::Error(e.to_string())),
                            Err(_) => Err(ModelFailure::Timeout),
                        };
                    outcome
                })
            })
            .collect();

        let joined =
            tokio::time::timeout(self.config.request_timeout(), join_all(handles.iter_mut())).await;
        let settled = match joined {
            Ok(settled) => settled,
            Err(_) => {
                for handle in &handles {
                    handle.abort();
                }
                tracing::warn!(
                    "[{}] ⏱️  Request deadline of {}ms hit before the fan-out settled",
                    request_id,
                    self.config.request_timeout_ms
                );
                self.set_health("prediction_engine", false).await;
                return Err(EnsembleError::AllModelsFailed {
                    attempted: model_ids.len(),
                });
            }
        };

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for (model_id, joined) in model_ids.iter().zip(settled) {
            let outcome = joined
                .unwrap_or_else(|e| Err(ModelFailure::Error(format!("prediction task failed: {}", e))));
            match outcome {
                Ok(prediction) => successes.push(prediction),
                Err(failure) => failures.push((model_id.clone(), failure)),
            }
        }

        self.set_health("prediction_engine", !successes.is_empty()).await;

        tracing::debug!(
            "[{}] Fan-out settled: {} ok, {} failed",
            request_id,
            successes.len(),
            failures.len()
        );

        Ok(FanOut {
            successes,
            failures,
        })
    }

    /// Newest successful prediction served on its own, clearly labeled.
    fn fallback(
        &self,
        request_id: &str,
        request: &EnsembleRequest,
        successes: &[SingleModelPrediction],
        failed_models: Vec<String>,
        required: usize,
    ) -> Option<EnsemblePrediction> {
        let chosen = successes
            .iter()
            .fold(None::<&SingleModelPrediction>, |best, p| match best {
                Some(b) if b.timestamp >= p.timestamp => Some(b),
                _ => Some(p),
            })?;

        tracing::warn!(
            "[{}] ⚠️  Quorum missed for {} ({} of {}), falling back to {}",
            request_id,
            request.symbol,
            successes.len(),
            required,
            chosen.model_id
        );
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_fallback();
        }
        self.publish(EnsembleEvent::QuorumFallback {
            request_id: request_id.to_string(),
            symbol: request.symbol.clone(),
            model_id: chosen.model_id.clone(),
            succeeded: successes.len(),
            required,
        });

        let now = Utc::now();
        Some(EnsemblePrediction {
            request_id: request_id.to_string(),
            symbol: request.symbol.clone(),
            horizon: request.horizon.clone(),
            aggregation_method: request.method,
            weight_strategy: request.weight_strategy,
            final_direction: Signal::from(chosen.direction),
            final_confidence: chosen.confidence,
            expected_value: chosen.predicted_value,
            contributions: vec![ModelContribution {
                model_id: chosen.model_id.clone(),
                predicted_value: chosen.predicted_value,
                direction: chosen.direction,
                confidence: chosen.confidence,
                weight: 1.0,
                latency_ms: chosen.latency_ms,
                timestamp: chosen.timestamp,
            }],
            consensus_strength: 1.0,
            diversity_score: 0.0,
            fallback_model: Some(chosen.model_id.clone()),
            failed_models,
            timestamp: now,
            expires_at: now + chrono::Duration::seconds(self.config.cache_ttl_secs() as i64),
        })
    }

    async fn record_outcomes(&self, successes: &[SingleModelPrediction]) {
        for prediction in successes {
            self.tracker.record_outcome(prediction, None).await;
        }
    }

    fn report_failure(&self, request_id: &str, model_id: &str, failure: &ModelFailure) {
        tracing::debug!(
            "[{}] Model {} failed ({}): {}",
            request_id,
            model_id,
            failure.label(),
            failure.describe()
        );
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_model_failure(model_id, failure.label());
        }
        self.publish(EnsembleEvent::ModelFailed {
            request_id: request_id.to_string(),
            model_id: model_id.to_string(),
            reason: failure.describe(),
        });
    }

    fn record_cache(&self, result: &str) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_cache(result);
        }
    }

    fn publish(&self, event: EnsembleEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }

    async fn set_health(&self, component: &str, healthy: bool) {
        if let Some(health) = &self.health {
            health.update_component(component, healthy).await;
        }
    }
}

/// Sanity-check a returned prediction and pin it to the model that was asked.
fn accept(
    mut prediction: SingleModelPrediction,
    model_id: &str,
    started: Instant,
) -> Result<SingleModelPrediction, ModelFailure> {
    if let Some(issue) = prediction.sanity_issue() {
        return Err(ModelFailure::Invalid(issue));
    }
    if prediction.model_id != model_id {
        tracing::debug!(
            "Engine answered for {} when asked for {}",
            prediction.model_id,
            model_id
        );
        prediction.model_id = model_id.to_string();
    }
    if prediction.latency_ms <= 0.0 {
        prediction.latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    }
    Ok(prediction)
}
