use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::engine::Engine;

/// Compact the property's WAL once at least `threshold` events have been
/// appended since the last compaction. Returns whether it compacted.
pub async fn compact_if_due(engine: &Engine, property: &str, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        debug!("{property}: {appends} WAL appends since compaction, below {threshold}");
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("{property}: compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            error!("{property}: WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task that checks the WAL every `every` and compacts it when
/// due. Runs until the task is aborted.
pub async fn run_compactor(engine: Arc<Engine>, property: String, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        compact_if_due(&engine, &property, threshold).await;
    }
}
