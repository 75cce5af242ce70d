use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `RUST_LOG` takes precedence over `log_level`.
pub fn init_logging(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init();

    match installed {
        Ok(()) => tracing::info!("Logging initialized at level: {}", log_level),
        Err(e) => tracing::debug!("Logging already initialized: {}", e),
    }
}
