use std::sync::Arc;

use monitoring_pipeline::alerts::AlertDispatcher;
use monitoring_pipeline::config::Settings;
use monitoring_pipeline::health::{HealthRegistry, ProbeOutcome, StoreProbe};
use monitoring_pipeline::logger::{init_logging, HttpLogSink, LogConfig, LogFormat, LogSink, Logger};
use monitoring_pipeline::metrics::init_metrics;
use monitoring_pipeline::models::{LogCategory, LogLevel};
use monitoring_pipeline::store::{RedisStore, SharedStore};
use monitoring_pipeline::tracker::ErrorTracker;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;

    // Initialize logging and metrics
    init_logging(&LogConfig {
        level: settings.application.log_level.clone(),
        format: LogFormat::from(settings.application.log_format.as_str()),
        ..LogConfig::default()
    });
    let _metrics_handle = init_metrics();
    info!("Configuration loaded");

    // Connect to the shared store
    let store: Option<Arc<dyn SharedStore>> = if settings.redis.enabled {
        info!("Connecting to Redis at {}...", settings.redis.url);
        match RedisStore::connect(&settings.redis).await {
            Ok(store) => {
                info!("Redis connection established");
                Some(Arc::new(store))
            }
            Err(e) => {
                warn!("Redis unavailable, pipeline degrades to local-only: {}", e);
                None
            }
        }
    } else {
        info!("Shared store disabled by configuration");
        None
    };

    // Compose the pipeline at the root; components receive their
    // dependencies explicitly instead of reaching for globals.
    let sink =
        HttpLogSink::from_settings(&settings.logger)?.map(|s| Arc::new(s) as Arc<dyn LogSink>);
    let logger = Arc::new(Logger::new(settings.logger.clone(), store.clone(), sink));

    let tracker = ErrorTracker::new(
        settings.tracker.clone(),
        store.clone(),
        settings.application.environment.clone(),
    );

    let dispatcher = AlertDispatcher::from_settings(
        settings.alerts.clone(),
        Some(logger.clone()),
        store.clone(),
    )?;

    let mut health = HealthRegistry::new(&settings.health);
    if let Some(store) = store.clone() {
        health.register(
            "redis",
            Arc::new(StoreProbe::new(store, settings.health.degraded_latency_ms)),
        );
    }
    health.register_fn("pipeline", || async { ProbeOutcome::healthy() });

    // Startup verification pass
    let report = health.run_all().await;
    info!(
        status = report.status.as_str(),
        checks = report.checks.len(),
        "Startup health check complete"
    );

    logger.log(
        LogLevel::Info,
        LogCategory::System,
        "Monitoring pipeline started",
        Some(serde_json::json!({
            "environment": settings.application.environment,
            "health": report.status.as_str(),
            "alert_stats": dispatcher.alert_stats(),
            "error_stats": tracker.get_stats(None).await,
        })),
        None,
    );

    info!("System startup verification complete.");

    logger.shutdown().await;

    Ok(())
}
