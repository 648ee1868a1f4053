use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ReminderConfig;
use crate::engine::{now_ms, Engine};
use crate::model::Ms;

/// Remind every due booking once. Returns how many reminders went out.
pub async fn send_due_reminders(engine: &Engine, now: Ms, lead: Ms, tolerance: Ms) -> usize {
    let mut sent = 0;
    for id in engine.due_reminders(now, lead, tolerance).await {
        match engine.mark_reminded(id, now).await {
            Ok(Some(_)) => sent += 1,
            Ok(None) => debug!("reminder skip {id}: no longer due"),
            // May have been deleted since the scan.
            Err(e) => debug!("reminder skip {id}: {e}"),
        }
    }
    sent
}

/// Background task that sends booking reminders.
pub async fn run_reminders(engine: Arc<Engine>, config: ReminderConfig) {
    let lead = config.lead.as_millis() as Ms;
    let tolerance = config.tolerance.as_millis() as Ms;
    let mut interval = tokio::time::interval(config.interval);
    loop {
        interval.tick().await;
        let sent = send_due_reminders(&engine, now_ms(), lead, tolerance).await;
        if sent > 0 {
            info!("sent {sent} booking reminders");
        }
    }
}

/// Background task that compacts the journal once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let appends = engine.journal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_journal().await {
            Ok(()) => info!("journal compacted after {appends} appends"),
            Err(e) => warn!("journal compaction failed: {e}"),
        }
    }
}
