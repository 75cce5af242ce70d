use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::metrics::{detect_drift, DriftReport, PerformanceMetrics};
use super::store::MetricsStore;
use super::window::{OutcomeRecord, PerformanceWindow};
use crate::core::config::TrackerConfig;
use crate::core::error::{EnsembleError, EnsembleResult};
use crate::prediction::SingleModelPrediction;

type SharedWindow = Arc<Mutex<PerformanceWindow>>;

/// Owns every model's rolling window. One mutex per model keeps appends to the
/// same window serialized while different models proceed in parallel.
pub struct PerformanceTracker {
    config: TrackerConfig,
    windows: RwLock<HashMap<String, SharedWindow>>,
    restored: RwLock<HashMap<String, PerformanceMetrics>>,
    store: Option<Arc<dyn MetricsStore>>,
}

impl PerformanceTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
            restored: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn min_samples(&self) -> usize {
        self.config.min_samples_for_metrics
    }

    async fn window(&self, model_id: &str) -> Option<SharedWindow> {
        self.windows.read().await.get(model_id).cloned()
    }

    async fn window_or_create(&self, model_id: &str) -> SharedWindow {
        if let Some(window) = self.window(model_id).await {
            return window;
        }

        let mut windows = self.windows.write().await;
        windows
            .entry(model_id.to_string())
            .or_insert_with(|| {
                tracing::debug!("📈 Tracking new model {}", model_id);
                Arc::new(Mutex::new(PerformanceWindow::new(
                    self.config.window_capacity,
                    self.config.latency_buffer_capacity,
                )))
            })
            .clone()
    }

    pub async fn record_outcome(&self, prediction: &SingleModelPrediction, actual: Option<f64>) {
        let window = self.window_or_create(&prediction.model_id).await;
        window
            .lock()
            .await
            .push(OutcomeRecord::from_prediction(prediction, actual));
    }

    /// Attach ground truth to an earlier prediction. Returns false when the
    /// record is unknown or has already been evicted from the window.
    pub async fn record_actual(
        &self,
        model_id: &str,
        symbol: &str,
        timestamp: DateTime<Utc>,
        actual: f64,
    ) -> bool {
        let Some(window) = self.window(model_id).await else {
            return false;
        };

        let filled = window.lock().await.backfill(symbol, timestamp, actual);
        if !filled {
            tracing::debug!(
                "No pending record for {} {} @ {} (evicted or already validated)",
                model_id,
                symbol,
                timestamp
            );
        }
        filled
    }

    pub async fn get_metrics(&self, model_id: &str) -> EnsembleResult<PerformanceMetrics> {
        let samples = match self.window(model_id).await {
            Some(window) => {
                let window = window.lock().await;
                if window.len() >= self.config.min_samples_for_metrics {
                    return Ok(PerformanceMetrics::compute(model_id, &window, &self.config));
                }
                window.len()
            }
            None => 0,
        };

        // A restored snapshot only bridges the gap until the live window qualifies.
        if let Some(snapshot) = self.restored.read().await.get(model_id) {
            return Ok(snapshot.clone());
        }

        Err(EnsembleError::NotEnoughData {
            model_id: model_id.to_string(),
            samples,
            required: self.config.min_samples_for_metrics,
        })
    }

    pub async fn get_all_metrics(&self) -> HashMap<String, PerformanceMetrics> {
        let mut model_ids = self.tracked_models().await;
        for id in self.restored.read().await.keys() {
            if !model_ids.contains(id) {
                model_ids.push(id.clone());
            }
        }

        let mut all = HashMap::new();
        for model_id in model_ids {
            if let Ok(metrics) = self.get_metrics(&model_id).await {
                all.insert(model_id, metrics);
            }
        }
        all
    }

    /// Drift is an observability signal; an unknown or thin window reports no drift.
    pub async fn detect_drift(&self, model_id: &str) -> DriftReport {
        match self.window(model_id).await {
            Some(window) => {
                let window = window.lock().await;
                detect_drift(&window.validated(), &self.config)
            }
            None => detect_drift(&[], &self.config),
        }
    }

    pub async fn tracked_models(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.windows.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn window_size(&self, model_id: &str) -> usize {
        match self.window(model_id).await {
            Some(window) => window.lock().await.len(),
            None => 0,
        }
    }

    /// Materialize live metrics into the durable store. Failures are logged
    /// and skipped; the in-memory windows stay authoritative.
    pub async fn persist_all(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        let mut persisted = 0;
        for model_id in self.tracked_models().await {
            let metrics = match self.live_metrics(&model_id).await {
                Some(metrics) => metrics,
                None => continue,
            };

            match store.upsert(&model_id, &metrics).await {
                Ok(()) => persisted += 1,
                Err(e) => {
                    tracing::error!("❌ Failed to persist metrics for {}: {}", model_id, e);
                }
            }
        }

        tracing::debug!("💾 Persisted metrics for {} models", persisted);
        persisted
    }

    /// Load persisted snapshots for the given models.
    pub async fn restore(&self, model_ids: &[String]) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        let mut restored = 0;
        for model_id in model_ids {
            match store.load(model_id).await {
                Ok(Some(metrics)) => {
                    self.restored.write().await.insert(model_id.clone(), metrics);
                    restored += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("⚠️  Failed to restore metrics for {}: {}", model_id, e);
                }
            }
        }

        if restored > 0 {
            tracing::info!("♻️  Restored metrics snapshots for {} models", restored);
        }
        restored
    }

    async fn live_metrics(&self, model_id: &str) -> Option<PerformanceMetrics> {
        let window = self.window(model_id).await?;
        let window = window.lock().await;
        if window.len() < self.config.min_samples_for_metrics {
            return None;
        }
        Some(PerformanceMetrics::compute(model_id, &window, &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::store::MockMetricsStore;
    use chrono::Duration;

    fn prediction(model_id: &str, value: f64, offset_secs: i64) -> SingleModelPrediction {
        SingleModelPrediction::new(model_id, "AAPL", value, 0.7)
            .with_latency(25.0)
            .with_timestamp(Utc::now() - Duration::seconds(offset_secs))
    }

    fn small_config() -> TrackerConfig {
        TrackerConfig {
            window_capacity: 50,
            min_samples_for_metrics: 5,
            ..TrackerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_not_enough_data() {
        let tracker = PerformanceTracker::new(small_config());
        for i in 0..4 {
            tracker.record_outcome(&prediction("lstm", 0.2, i), Some(0.1)).await;
        }

        match tracker.get_metrics("lstm").await {
            Err(EnsembleError::NotEnoughData { samples, required, .. }) => {
                assert_eq!(samples, 4);
                assert_eq!(required, 5);
            }
            other => panic!("expected NotEnoughData, got {:?}", other),
        }
        assert!(tracker.get_metrics("unknown").await.is_err());
    }

    #[tokio::test]
    async fn test_window_bounded_by_capacity() {
        let tracker = PerformanceTracker::new(small_config());
        for i in 0..120 {
            tracker.record_outcome(&prediction("lstm", 0.2, i), None).await;
        }
        assert_eq!(tracker.window_size("lstm").await, 50);
    }

    #[tokio::test]
    async fn test_metrics_exclude_unvalidated_records() {
        let tracker = PerformanceTracker::new(small_config());
        for i in 0..6 {
            tracker.record_outcome(&prediction("lstm", 0.2, i), Some(0.3)).await;
        }
        for i in 6..10 {
            tracker.record_outcome(&prediction("lstm", 0.2, i), None).await;
        }

        let metrics = tracker.get_metrics("lstm").await.unwrap();
        assert_eq!(metrics.window_size, 10);
        assert_eq!(metrics.validated_samples, 6);
        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.latency_p50, 25.0);
    }

    #[tokio::test]
    async fn test_record_actual_backfills() {
        let tracker = PerformanceTracker::new(small_config());
        let p = prediction("xgb", -0.4, 0);
        tracker.record_outcome(&p, None).await;

        assert!(tracker.record_actual("xgb", "AAPL", p.timestamp, -0.1).await);
        assert!(!tracker.record_actual("xgb", "AAPL", p.timestamp, -0.1).await);
        assert!(!tracker.record_actual("nope", "AAPL", p.timestamp, -0.1).await);
    }

    #[tokio::test]
    async fn test_restored_snapshot_bridges_cold_start() {
        let warm = PerformanceTracker::new(small_config());
        for i in 0..10 {
            warm.record_outcome(&prediction("lstm", 0.2, i), Some(0.3)).await;
        }
        let snapshot = warm.get_metrics("lstm").await.unwrap();

        let mut store = MockMetricsStore::new();
        let stored = snapshot.clone();
        store
            .expect_load()
            .returning(move |_| Ok(Some(stored.clone())));

        let cold = PerformanceTracker::new(small_config()).with_store(Arc::new(store));
        assert_eq!(cold.restore(&["lstm".to_string()]).await, 1);
        assert_eq!(cold.get_metrics("lstm").await.unwrap(), snapshot);

        // Live window takes over once it qualifies.
        for i in 0..5 {
            cold.record_outcome(&prediction("lstm", 0.2, i), Some(-0.3)).await;
        }
        assert_eq!(cold.get_metrics("lstm").await.unwrap().accuracy, 0.0);
    }

    #[tokio::test]
    async fn test_persist_all_swallows_store_errors() {
        let mut store = MockMetricsStore::new();
        store
            .expect_upsert()
            .returning(|model_id, _| {
                if model_id == "bad" {
                    Err(anyhow::anyhow!("disk full"))
                } else {
                    Ok(())
                }
            });

        let tracker = PerformanceTracker::new(small_config()).with_store(Arc::new(store));
        for i in 0..6 {
            tracker.record_outcome(&prediction("good", 0.2, i), Some(0.3)).await;
            tracker.record_outcome(&prediction("bad", 0.2, i), Some(0.3)).await;
        }
        tracker.record_outcome(&prediction("thin", 0.2, 0), Some(0.3)).await;

        assert_eq!(tracker.persist_all().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_across_models() {
        let tracker = Arc::new(PerformanceTracker::new(TrackerConfig::default()));
        let mut handles = Vec::new();
        for m in 0..8 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                let model_id = format!("model-{}", m);
                for i in 0..200 {
                    tracker.record_outcome(&prediction(&model_id, 0.1, i), None).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(tracker.tracked_models().await.len(), 8);
        for m in 0..8 {
            assert_eq!(tracker.window_size(&format!("model-{}", m)).await, 200);
        }
    }
}
