use std::sync::Arc;

use tracing::info;

use frontdesk::config::Config;
use frontdesk::engine::EngineOptions;
use frontdesk::property::PropertyManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    frontdesk::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;

    let options = EngineOptions {
        cancellation_policy: config.cancellation_policy.clone(),
        ..EngineOptions::default()
    };
    let properties = Arc::new(PropertyManager::new(
        config.data_dir.clone(),
        options,
        config.compact_threshold,
        config.compact_interval,
    ));

    info!("frontdesk starting");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  compaction: every {:?} after {} appends", config.compact_interval, config.compact_threshold);
    let tiers: Vec<String> = config
        .cancellation_policy
        .tiers()
        .iter()
        .map(|t| format!("{}d:{}%", t.min_days, t.fee_percent))
        .collect();
    info!("  cancellation tiers: {}", tiers.join(", "));
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    for name in &config.properties {
        let engine = properties.open(name)?;
        let summary = engine.inventory_summary().await;
        info!(
            "property {name}: {} categories, {} rooms, {} live bookings, {} extras",
            summary.categories,
            summary.rooms,
            summary.live_bookings,
            engine.list_extras().len()
        );
    }

    shutdown_signal().await?;
    info!("shutdown signal received, compacting WALs");
    properties.shutdown().await;
    info!("frontdesk stopped");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        sigterm.recv().await;
        Ok::<(), std::io::Error>(())
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    tokio::select! {
        r = tokio::signal::ctrl_c() => r,
        r = terminate => r,
    }
}
