use std::net::SocketAddr;
use std::time::Instant;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking/room commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "huddle_commands_total";

/// Histogram: command latency in seconds, lock wait and journal commit included. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "huddle_command_duration_seconds";

/// Counter: bookings refused because the slot was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "huddle_booking_conflicts_total";

// ── Side effects ────────────────────────────────────────────────

/// Counter: side effects that errored, panicked or timed out. Labels: effect.
pub const EFFECTS_FAILED_TOTAL: &str = "huddle_effects_failed_total";

/// Counter: side effects dropped because the queue was full. Labels: effect.
pub const EFFECTS_DROPPED_TOTAL: &str = "huddle_effects_dropped_total";

/// Counter: reminder notifications issued.
pub const REMINDERS_SENT_TOTAL: &str = "huddle_reminders_sent_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms currently loaded.
pub const ROOMS_ACTIVE: &str = "huddle_rooms_active";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "huddle_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (records per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "huddle_journal_flush_batch_size";

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

/// Run one command, recording its outcome and latency.
pub async fn observe<T>(
    command: &'static str,
    fut: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    let started = Instant::now();
    let result = fut.await;
    let status = match &result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    metrics::counter!(COMMANDS_TOTAL, "command" => command, "status" => status).increment(1);
    metrics::histogram!(COMMAND_DURATION_SECONDS, "command" => command)
        .record(started.elapsed().as_secs_f64());
    result
}
