use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Prometheus instruments for the ensemble path, on a private registry.
#[derive(Clone)]
pub struct EnsembleTelemetry {
    registry: Registry,
    requests: IntCounterVec,
    model_failures: IntCounterVec,
    fallbacks: IntCounter,
    cache_events: IntCounterVec,
    drift_alerts: IntCounterVec,
    request_duration: HistogramVec,
}

impl EnsembleTelemetry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("ensemble_requests_total", "Ensemble requests by method and outcome"),
            &["method", "outcome"],
        )?;
        let model_failures = IntCounterVec::new(
            Opts::new("ensemble_model_failures_total", "Per-model prediction failures"),
            &["model_id", "reason"],
        )?;
        let fallbacks = IntCounter::new(
            "ensemble_fallbacks_total",
            "Requests served by a single-model fallback",
        )?;
        let cache_events = IntCounterVec::new(
            Opts::new("ensemble_cache_events_total", "Cache lookups and writes by result"),
            &["result"],
        )?;
        let drift_alerts = IntCounterVec::new(
            Opts::new("ensemble_drift_alerts_total", "Drift detections by severity"),
            &["model_id", "severity"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "ensemble_request_duration_seconds",
                "End-to-end ensemble latency",
            )
            .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.15, 0.25, 0.5, 1.0, 2.5]),
            &["method"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(model_failures.clone()))?;
        registry.register(Box::new(fallbacks.clone()))?;
        registry.register(Box::new(cache_events.clone()))?;
        registry.register(Box::new(drift_alerts.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            requests,
            model_failures,
            fallbacks,
            cache_events,
            drift_alerts,
            request_duration,
        })
    }

    pub fn record_request(&self, method: &str, outcome: &str, elapsed: Duration) {
        self.requests.with_label_values(&[method, outcome]).inc();
        self.request_duration
            .with_label_values(&[method])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_model_failure(&self, model_id: &str, reason: &str) {
        self.model_failures.with_label_values(&[model_id, reason]).inc();
    }

    pub fn record_fallback(&self) {
        self.fallbacks.inc();
    }

    pub fn record_cache(&self, result: &str) {
        self.cache_events.with_label_values(&[result]).inc();
    }

    pub fn record_drift(&self, model_id: &str, severity: &str) {
        self.drift_alerts.with_label_values(&[model_id, severity]).inc();
    }

    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.get()
    }

    pub fn request_count(&self, method: &str, outcome: &str) -> u64 {
        self.requests.with_label_values(&[method, outcome]).get()
    }

    pub fn cache_count(&self, result: &str) -> u64 {
        self.cache_events.with_label_values(&[result]).get()
    }

    /// Text exposition format for a `/metrics` endpoint.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_exposes_counters() {
        let telemetry = EnsembleTelemetry::new().unwrap();
        telemetry.record_request("weighted", "ok", Duration::from_millis(40));
        telemetry.record_model_failure("lstm", "timeout");
        telemetry.record_fallback();
        telemetry.record_cache("miss");

        let text = telemetry.render().unwrap();
        assert!(text.contains("ensemble_requests_total{method=\"weighted\",outcome=\"ok\"} 1"));
        assert!(text.contains("ensemble_model_failures_total{model_id=\"lstm\",reason=\"timeout\"} 1"));
        assert!(text.contains("ensemble_fallbacks_total 1"));
        assert!(text.contains("ensemble_request_duration_seconds_count{method=\"weighted\"} 1"));
        assert_eq!(telemetry.cache_count("miss"), 1);
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let a = EnsembleTelemetry::new().unwrap();
        let b = EnsembleTelemetry::new().unwrap();
        a.record_fallback();
        assert_eq!(a.fallback_count(), 1);
        assert_eq!(b.fallback_count(), 0);
    }
}
