use anyhow::Result;
use std::sync::Arc;

use ensemble_orchestrator::core::logging::init_logging;
use ensemble_orchestrator::core::{Config, HealthChecker};
use ensemble_orchestrator::ensemble::{EnsembleCache, EnsembleOrchestrator, MemoryCache, RedisCache};
use ensemble_orchestrator::monitoring::{EnsembleTelemetry, EventBus, PerformanceReporter};
use ensemble_orchestrator::performance::{MetricsStore, PerformanceTracker, SqliteMetricsStore};
use ensemble_orchestrator::prediction::{HttpModelService, ModelRegistry, PredictionEngine};
use ensemble_orchestrator::weighting::WeightCalculator;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = match std::env::var("ENSEMBLE_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::from_env()?,
    };

    init_logging(&config.monitoring.log_level);

    tracing::info!("🚀 Ensemble orchestrator starting...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let health = HealthChecker::new();
    let telemetry = EnsembleTelemetry::new()?;
    let events = Arc::new(EventBus::default());

    // Durable metrics store is optional; without it the tracker starts cold.
    let store = match &config.storage.metrics_db_path {
        Some(path) => match SqliteMetricsStore::new(path).await {
            Ok(store) => {
                health.update_component("metrics_store", true).await;
                Some(Arc::new(store))
            }
            Err(e) => {
                tracing::warn!("⚠️  Metrics store unavailable, running without persistence: {}", e);
                None
            }
        },
        None => None,
    };

    let mut tracker = PerformanceTracker::new(config.tracker.clone());
    if let Some(store) = &store {
        tracker = tracker.with_store(store.clone() as Arc<dyn MetricsStore>);
    }
    let tracker = Arc::new(tracker);

    if let Some(store) = &store {
        match store.model_ids().await {
            Ok(model_ids) => {
                tracker.restore(&model_ids).await;
            }
            Err(e) => tracing::warn!("⚠️  Could not list persisted models: {}", e),
        }
    }

    let calculator = Arc::new(WeightCalculator::new(tracker.clone(), config.weights.clone()));
    let cache = connect_cache(&config, &health).await;

    let service = Arc::new(HttpModelService::new(
        config.service.model_service_url.clone(),
        config.orchestrator.request_timeout(),
    )?);
    let reachable = service.ping().await.unwrap_or(false);
    health.update_component("prediction_engine", reachable).await;
    health.update_component("model_registry", reachable).await;
    if reachable {
        tracing::info!("✅ Model service reachable at {}", config.service.model_service_url);
    } else {
        tracing::warn!("⚠️  Model service not reachable at {}", config.service.model_service_url);
    }

    let engine: Arc<dyn PredictionEngine> = service.clone();
    let registry: Arc<dyn ModelRegistry> = service;

    let orchestrator = Arc::new(
        EnsembleOrchestrator::new(
            engine,
            registry,
            tracker.clone(),
            calculator,
            cache,
            config.orchestrator.clone(),
        )
        .with_events(events.clone())
        .with_health(health.clone())
        .with_telemetry(telemetry.clone()),
    );

    let reporter = Arc::new(
        PerformanceReporter::new(tracker.clone(), config.storage.persist_interval_secs)
            .with_events(events.clone())
            .with_telemetry(telemetry.clone()),
    );
    reporter.start();

    start_refresh_loop(orchestrator.clone(), &config);

    let port = config.monitoring.port;
    let server_health = health.clone();
    let server_telemetry = telemetry.clone();
    tokio::spawn(async move { start_monitoring_server(server_health, server_telemetry, port).await });
    tracing::info!("✅ Health and metrics endpoints running on port {}", port);

    let mut status_interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = status_interval.tick() => {
                let status = health.get_status().await;
                tracing::info!(
                    "Service status: {} (uptime: {}s, {} models tracked)",
                    status.status,
                    status.uptime_seconds,
                    tracker.tracked_models().await.len()
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 Shutdown requested, persisting metrics...");
                tracker.persist_all().await;
                break;
            }
        }
    }

    Ok(())
}

/// Redis when configured and reachable, otherwise an in-process cache.
async fn connect_cache(config: &Config, health: &HealthChecker) -> Arc<dyn EnsembleCache> {
    if let Some(url) = &config.storage.redis_url {
        match RedisCache::connect(url).await {
            Ok(cache) => {
                let reachable = cache.ping().await.is_ok();
                health.update_component("cache", reachable).await;
                return Arc::new(cache);
            }
            Err(e) => {
                tracing::warn!("⚠️  Redis unavailable, falling back to in-memory cache: {}", e);
            }
        }
    }

    let cache = Arc::new(MemoryCache::new());
    health.update_component("cache", true).await;

    let purge = cache.clone();
    let ttl = config.orchestrator.cache_ttl_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(ttl));
        loop {
            interval.tick().await;
            purge.purge_expired().await;
        }
    });

    cache
}

/// Keep ensembles for the watchlist warm in the shared cache.
fn start_refresh_loop(orchestrator: Arc<EnsembleOrchestrator>, config: &Config) {
    let symbols = config.service.symbols.clone();
    if symbols.is_empty() {
        tracing::info!("No watchlist configured, cache warming disabled");
        return;
    }

    let horizon = config.service.horizon.clone();
    let interval_secs = config.service.refresh_interval_secs.max(1);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));

        loop {
            interval.tick().await;

            for symbol in &symbols {
                let request = orchestrator.request(symbol.clone(), horizon.clone());
                if let Err(e) = orchestrator.predict(request).await {
                    tracing::debug!("Refresh for {} failed: {}", symbol, e);
                }
            }
        }
    });

    tracing::info!("✅ Watchlist refresh started (every {}s)", interval_secs);
}

async fn start_monitoring_server(health: HealthChecker, telemetry: EnsembleTelemetry, port: u16) {
    use warp::Filter;

    let health_route = warp::path("health")
        .and(warp::any().map(move || health.clone()))
        .and_then(|checker: HealthChecker| async move {
            let status = checker.get_status().await;
            Ok::<_, warp::Rejection>(warp::reply::json(&status))
        });

    let metrics_route = warp::path("metrics")
        .and(warp::any().map(move || telemetry.clone()))
        .map(|telemetry: EnsembleTelemetry| match telemetry.render() {
            Ok(body) => warp::reply::with_status(body, warp::http::StatusCode::OK),
            Err(e) => warp::reply::with_status(
                format!("failed to render metrics: {}", e),
                warp::http::StatusCode::INTERNAL_SERVER_ERROR,
            ),
        });

    warp::serve(health_route.or(metrics_route))
        .run(([0, 0, 0, 0], port))
        .await;
}
