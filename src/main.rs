use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use ulid::Ulid;

use huddle::audit::MemoryAuditLog;
use huddle::config::Config;
use huddle::effects::Dispatcher;
use huddle::engine::Engine;
use huddle::model::{Actor, RoomSpec};
use huddle::notify::NotifyHub;
use huddle::reminder;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    huddle::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let hub = Arc::new(NotifyHub::new());
    let audit = Arc::new(MemoryAuditLog::default());
    let effects = Dispatcher::spawn(hub.clone(), audit, config.effect_queue, config.effect_timeout);
    let engine = Arc::new(Engine::new(config.journal_path(), effects)?);

    if let Some(path) = &config.seed_rooms
        && engine.list_rooms(true).await.is_empty()
    {
        let specs: Vec<RoomSpec> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let system = Actor::admin(Ulid::nil());
        for spec in specs {
            let name = spec.name.clone();
            match engine.create_room(&system, spec).await {
                Ok(room) => info!(room_id = %room.id, "seeded room {name}"),
                Err(e) => warn!("seed room {name} skipped: {e}"),
            }
        }
    }

    info!("huddle started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  rooms: {}", engine.list_rooms(true).await.len());
    info!("  reminders: {}", if config.reminders.enabled { "enabled" } else { "disabled" });
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    if config.reminders.enabled {
        tokio::spawn(reminder::run_reminders(engine.clone(), config.reminders.clone()));
    }
    tokio::spawn(reminder::run_compactor(
        engine.clone(),
        config.compact_threshold,
        config.compact_interval,
    ));

    // Mail/SMS transports plug in here; until then deliveries are logged.
    let mut firehose = hub.subscribe_all();
    tokio::spawn(async move {
        loop {
            match firehose.recv().await {
                Ok(n) => {
                    let b = n.booking();
                    info!(kind = n.kind(), booking_id = %b.id, to = %b.requester, "{}", n.subject());
                }
                Err(RecvError::Lagged(missed)) => warn!("notification log lagged, {missed} skipped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Graceful shutdown on SIGTERM/ctrl-c. Every commit is already fsynced.
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received");
    if let Err(e) = engine.compact_journal().await {
        warn!("final compaction failed: {e}");
    }
    info!("huddle stopped");
    Ok(())
}
