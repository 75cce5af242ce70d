use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

#[cfg(test)]
use mockall::automock;

use super::metrics::PerformanceMetrics;

/// Durable snapshot storage, used only to survive restarts.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn upsert(&self, model_id: &str, metrics: &PerformanceMetrics) -> Result<()>;
    async fn load(&self, model_id: &str) -> Result<Option<PerformanceMetrics>>;
}

#[derive(Debug, sqlx::FromRow)]
struct MetricsRow {
    payload: String,
}

pub struct SqliteMetricsStore {
    pool: SqlitePool,
}

impl SqliteMetricsStore {
    pub async fn new(database_path: &str) -> Result<Self> {
        if database_path != ":memory:" && !database_path.starts_with("sqlite:") {
            if let Some(parent) = Path::new(database_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let (connection_string, max_connections) = if database_path == ":memory:" {
            // Every in-memory connection is its own database.
            ("sqlite::memory:".to_string(), 1)
        } else if database_path.starts_with("sqlite:") {
            (database_path.to_string(), 5)
        } else {
            (format!("sqlite://{}?mode=rwc", database_path), 5)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&connection_string)
            .await
            .with_context(|| format!("Failed to open metrics store {}", database_path))?;

        let store = Self { pool };
        store.initialize_schema().await?;

        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS model_performance (
                model_id TEXT PRIMARY KEY,
                accuracy REAL NOT NULL,
                reliability_score REAL NOT NULL,
                window_size INTEGER NOT NULL,
                drift_severity TEXT NOT NULL,
                last_updated DATETIME NOT NULL,
                persisted_at DATETIME NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_model_performance_reliability
            ON model_performance(reliability_score DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("✅ Metrics store schema initialized");

        Ok(())
    }

    /// Model ids with a persisted snapshot, most reliable first.
    pub async fn model_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT model_id FROM model_performance ORDER BY reliability_score DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait]
impl MetricsStore for SqliteMetricsStore {
    async fn upsert(&self, model_id: &str, metrics: &PerformanceMetrics) -> Result<()> {
        let payload = serde_json::to_string(metrics)?;
        let persisted_at: DateTime<Utc> = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO model_performance (
                model_id, accuracy, reliability_score, window_size,
                drift_severity, last_updated, persisted_at, payload
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(model_id) DO UPDATE SET
                accuracy = excluded.accuracy,
                reliability_score = excluded.reliability_score,
                window_size = excluded.window_size,
                drift_severity = excluded.drift_severity,
                last_updated = excluded.last_updated,
                persisted_at = excluded.persisted_at,
                payload = excluded.payload
            "#,
        )
        .bind(model_id)
        .bind(metrics.accuracy)
        .bind(metrics.reliability_score)
        .bind(metrics.window_size as i64)
        .bind(metrics.drift_severity.to_string())
        .bind(metrics.last_updated)
        .bind(persisted_at)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self, model_id: &str) -> Result<Option<PerformanceMetrics>> {
        let row = sqlx::query_as::<_, MetricsRow>(
            r#"
            SELECT payload FROM model_performance WHERE model_id = ?
            "#,
        )
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let metrics = serde_json::from_str(&row.payload)
                    .with_context(|| format!("Corrupt metrics snapshot for {}", model_id))?;
                Ok(Some(metrics))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::metrics::DriftSeverity;

    fn sample_metrics(model_id: &str, reliability: f64) -> PerformanceMetrics {
        PerformanceMetrics {
            model_id: model_id.to_string(),
            accuracy: 0.71,
            precision: 0.65,
            recall: 0.6,
            risk_adjusted_return: 0.4,
            mean_absolute_error: 0.02,
            latency_p50: 35.0,
            latency_p95: 80.0,
            latency_p99: 120.0,
            reliability_score: reliability,
            feature_drift: 0.01,
            concept_drift: 0.03,
            drift_severity: DriftSeverity::None,
            window_size: 400,
            validated_samples: 350,
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_load() {
        let store = SqliteMetricsStore::new(":memory:").await.unwrap();
        assert!(store.load("lstm").await.unwrap().is_none());

        let metrics = sample_metrics("lstm", 0.62);
        store.upsert("lstm", &metrics).await.unwrap();
        assert_eq!(store.load("lstm").await.unwrap(), Some(metrics.clone()));

        let mut updated = metrics;
        updated.reliability_score = 0.8;
        store.upsert("lstm", &updated).await.unwrap();
        assert_eq!(store.load("lstm").await.unwrap().unwrap().reliability_score, 0.8);
    }

    #[tokio::test]
    async fn test_model_ids_ordered_by_reliability() {
        let store = SqliteMetricsStore::new(":memory:").await.unwrap();
        store.upsert("xgb", &sample_metrics("xgb", 0.4)).await.unwrap();
        store.upsert("lstm", &sample_metrics("lstm", 0.9)).await.unwrap();

        assert_eq!(store.model_ids().await.unwrap(), vec!["lstm", "xgb"]);
    }
}
