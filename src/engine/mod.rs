mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::{first_conflict, free_slots, is_available, merge_overlapping, subtract_intervals};
pub use conflict::now_ms;
pub use error::EngineError;

use std::collections::HashMap;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::effects::Dispatcher;
use crate::journal::Journal;
use crate::model::*;

use store::RoomStore;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let JournalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut journal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(JournalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut journal, &batch);
        metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!("journal flush failed for {} records: {e}", batch.len());
        }
        for (_, tx) in batch {
            let _ = tx.send(match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            });
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut journal, cmd);
        }
    }
}

/// All or nothing: a failed batch leaves no bytes behind for the next one to sync.
fn flush_batch(journal: &mut Journal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| journal.append_buffered(event))
        .and_then(|()| journal.flush_sync());
    if result.is_err()
        && let Err(e) = journal.discard_unsynced()
    {
        tracing::error!("journal rollback failed, refusing further appends: {e}");
    }
    result
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Exclusive access to one room for the duration of a command.
///
/// Also holds a shared commit permit so compaction can quiesce all writers.
pub struct RoomWriteGuard {
    _permit: OwnedRwLockReadGuard<()>,
    state: OwnedRwLockWriteGuard<RoomState>,
}

impl Deref for RoomWriteGuard {
    type Target = RoomState;

    fn deref(&self) -> &RoomState {
        &self.state
    }
}

impl DerefMut for RoomWriteGuard {
    fn deref_mut(&mut self) -> &mut RoomState {
        &mut self.state
    }
}

/// Booking admission engine: rooms, bookings, and their journal.
pub struct Engine {
    pub(super) store: RoomStore,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub(super) effects: Dispatcher,
    /// Writers hold a read permit from lock to commit; compaction takes the write side.
    pub(super) commit_gate: Arc<RwLock<()>>,
}

impl Engine {
    /// Replay the journal at `journal_path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn new(journal_path: PathBuf, effects: Dispatcher) -> io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let store = RoomStore::new();
        // Rebuild rooms unshared first so replay needs no locking.
        let mut rooms: HashMap<Ulid, RoomState> = HashMap::new();
        for event in events {
            match event {
                Event::RoomCreated { room } => {
                    rooms.insert(room.id, RoomState::new(room));
                }
                Event::RoomDeleted { id } => {
                    if let Some(rs) = rooms.remove(&id) {
                        for b in &rs.bookings {
                            store.unmap_booking(&b.id);
                        }
                    }
                }
                other => {
                    if let Some(rs) = rooms.get_mut(&other.room_id()) {
                        store.apply_event(rs, &other);
                    }
                }
            }
        }
        let booking_count: usize = rooms.values().map(|rs| rs.bookings.len()).sum();
        tracing::info!(
            "journal replayed: {} rooms, {booking_count} bookings from {}",
            rooms.len(),
            journal_path.display()
        );
        for (id, rs) in rooms {
            store.insert_room(id, Arc::new(RwLock::new(rs)));
        }
        metrics::gauge!(crate::observability::ROOMS_ACTIVE).set(store.room_count() as f64);

        Ok(Self {
            store,
            journal_tx,
            effects,
            commit_gate: Arc::new(RwLock::new(())),
        })
    }

    /// Write a record via the background group-commit writer.
    async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Store("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Store("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Store(e.to_string()))
    }

    pub(super) fn get_room_state(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.store.get_room(id)
    }

    /// Journal + apply in one call. Memory only changes after the journal ack.
    pub(super) async fn persist_and_apply(&self, rs: &mut RoomState, event: &Event) -> Result<(), EngineError> {
        self.journal_append(event).await?;
        self.store.apply_event(rs, event);
        Ok(())
    }

    /// Acquire the room's write lock. Fails with NotFound if the room was
    /// deleted while we waited.
    pub(super) async fn lock_room(&self, room_id: Ulid) -> Result<RoomWriteGuard, EngineError> {
        let permit = self.commit_gate.clone().read_owned().await;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let state = rs.clone().write_owned().await;
        let still_current = self
            .get_room_state(&room_id)
            .is_some_and(|cur| Arc::ptr_eq(&cur, &rs));
        if !still_current {
            return Err(EngineError::NotFound(room_id));
        }
        Ok(RoomWriteGuard {
            _permit: permit,
            state,
        })
    }

    /// Lookup booking → room, lock the room, and return a copy of the booking.
    pub(super) async fn lock_booking(&self, booking_id: Ulid) -> Result<(RoomWriteGuard, Booking), EngineError> {
        let room_id = self
            .store
            .room_for_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let guard = self.lock_room(room_id).await?;
        // Deleted between index lookup and lock.
        let booking = guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))?;
        Ok((guard, booking))
    }
}
