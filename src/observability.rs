use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations executed. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "frontdesk_operations_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "frontdesk_operation_duration_seconds";

// ── Booking lifecycle ───────────────────────────────────────────

/// Counter: bookings accepted.
pub const BOOKINGS_CREATED_TOTAL: &str = "frontdesk_bookings_created_total";

/// Counter: create/edit requests turned away for lack of a free room. Labels: op.
pub const NO_AVAILABILITY_TOTAL: &str = "frontdesk_no_availability_total";

/// Counter: cancellations. Labels: fee_percent.
pub const CANCELLATIONS_TOTAL: &str = "frontdesk_cancellations_total";

/// Counter: audit records written by edits.
pub const MODIFICATION_RECORDS_TOTAL: &str = "frontdesk_modification_records_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: open hotel properties (loaded engines).
pub const PROPERTIES_ACTIVE: &str = "frontdesk_properties_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "frontdesk_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "frontdesk_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "frontdesk_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Run an engine operation, recording its outcome and latency.
pub async fn observe<T, F>(op: &'static str, fut: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    let start = Instant::now();
    let result = fut.await;
    let status = match &result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    };
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op).record(start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        match e {
            EngineError::Precondition(_) | EngineError::WalError(_) => {
                tracing::error!(op, "operation failed: {e}");
            }
            _ => tracing::warn!(op, "operation rejected: {e}"),
        }
    }
    result
}
