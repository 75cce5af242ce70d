use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub cache: bool,
    pub metrics_store: bool,
    pub prediction_engine: bool,
    pub model_registry: bool,
    #[serde(flatten)]
    pub extra: HashMap<String, bool>,
}

impl ComponentHealth {
    pub fn get(&self, key: &str) -> Option<bool> {
        match key {
            "cache" => Some(self.cache),
            "metrics_store" => Some(self.metrics_store),
            "prediction_engine" => Some(self.prediction_engine),
            "model_registry" => Some(self.model_registry),
            _ => self.extra.get(key).copied(),
        }
    }
}

#[derive(Clone)]
pub struct HealthChecker {
    start_time: std::time::Instant,
    status: Arc<RwLock<ComponentHealth>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
            status: Arc::new(RwLock::new(ComponentHealth {
                cache: false,
                metrics_store: false,
                prediction_engine: false,
                model_registry: false,
                extra: HashMap::new(),
            })),
        }
    }

    pub async fn get_status(&self) -> HealthStatus {
        let components = self.status.read().await.clone();

        // Cache and store outages degrade durability, not predictions.
        let healthy = components.prediction_engine && components.model_registry;

        HealthStatus {
            status: if healthy {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            components,
        }
    }

    pub async fn update_component(&self, component: &str, healthy: bool) {
        let mut status = self.status.write().await;
        match component {
            "cache" => status.cache = healthy,
            "metrics_store" => status.metrics_store = healthy,
            "prediction_engine" => status.prediction_engine = healthy,
            "model_registry" => status.model_registry = healthy,
            _ => {
                status.extra.insert(component.to_string(), healthy);
            }
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_degraded_until_engine_and_registry_up() {
        let checker = HealthChecker::new();
        assert_eq!(checker.get_status().await.status, "degraded");

        checker.update_component("prediction_engine", true).await;
        checker.update_component("model_registry", true).await;
        let status = checker.get_status().await;
        assert_eq!(status.status, "healthy");
        assert!(!status.components.cache);
    }

    #[tokio::test]
    async fn test_extra_components() {
        let checker = HealthChecker::new();
        checker.update_component("reporter", true).await;
        let status = checker.get_status().await;
        assert_eq!(status.components.get("reporter"), Some(true));
        assert_eq!(status.components.get("unknown"), None);
    }
}
