use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::event_bus::{EnsembleEvent, EventBus};
use super::telemetry::EnsembleTelemetry;
use crate::performance::{DriftSeverity, PerformanceTracker};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportSummary {
    pub tracked_models: usize,
    pub persisted: usize,
    pub drifting: Vec<(String, DriftSeverity)>,
}

/// Periodically materializes tracker metrics and raises drift alerts.
pub struct PerformanceReporter {
    tracker: Arc<PerformanceTracker>,
    events: Option<Arc<EventBus>>,
    telemetry: Option<EnsembleTelemetry>,
    interval_secs: u64,
    // Last severity announced per model, so a steady drift is reported once.
    announced: RwLock<HashMap<String, DriftSeverity>>,
}

impl PerformanceReporter {
    pub fn new(tracker: Arc<PerformanceTracker>, interval_secs: u64) -> Self {
        Self {
            tracker,
            events: None,
            telemetry: None,
            interval_secs: interval_secs.max(1),
            announced: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_telemetry(mut self, telemetry: EnsembleTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tracing::info!("✅ Performance reporter started (every {}s)", self.interval_secs);

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(self.interval_secs));
            // The first tick fires immediately; skip it so startup restores settle first.
            interval.tick().await;

            loop {
                interval.tick().await;
                let summary = self.run_once().await;
                tracing::debug!(
                    "📊 Report: {} models tracked, {} persisted, {} drifting",
                    summary.tracked_models,
                    summary.persisted,
                    summary.drifting.len()
                );
            }
        })
    }

    pub async fn run_once(&self) -> ReportSummary {
        let models = self.tracker.tracked_models().await;
        let persisted = self.tracker.persist_all().await;

        let mut drifting = Vec::new();
        for model_id in &models {
            let report = self.tracker.detect_drift(model_id).await;
            let previous = self
                .announced
                .read()
                .await
                .get(model_id)
                .copied()
                .unwrap_or(DriftSeverity::None);

            if !report.detected {
                if previous != DriftSeverity::None {
                    tracing::info!("✅ Drift cleared for {}", model_id);
                    self.announced.write().await.remove(model_id);
                }
                continue;
            }

            drifting.push((model_id.clone(), report.severity));
            if report.severity == previous {
                continue;
            }

            tracing::warn!(
                "⚠️  Drift detected for {}: severity {} (concept {:.3}, feature {:.3})",
                model_id,
                report.severity,
                report.concept_drift,
                report.feature_drift
            );
            if let Some(telemetry) = &self.telemetry {
                telemetry.record_drift(model_id, &report.severity.to_string());
            }
            if let Some(events) = &self.events {
                events.publish(EnsembleEvent::DriftDetected {
                    model_id: model_id.clone(),
                    severity: report.severity,
                    concept_drift: report.concept_drift,
                    feature_drift: report.feature_drift,
                    timestamp: Utc::now(),
                });
            }
            self.announced
                .write()
                .await
                .insert(model_id.clone(), report.severity);
        }

        ReportSummary {
            tracked_models: models.len(),
            persisted,
            drifting,
        }
    }
}
