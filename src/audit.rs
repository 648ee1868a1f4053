use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::effects::EffectError;
use crate::limits::MAX_ACTIVITY_RECORDS;
use crate::model::Ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    RoomCreate,
    RoomUpdate,
    RoomDelete,
    BookingCreate,
    BookingReschedule,
    BookingStatusChange,
    BookingDelete,
    BookingReminder,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::RoomCreate => "room_create",
            ActivityKind::RoomUpdate => "room_update",
            ActivityKind::RoomDelete => "room_delete",
            ActivityKind::BookingCreate => "booking_create",
            ActivityKind::BookingReschedule => "booking_reschedule",
            ActivityKind::BookingStatusChange => "booking_status_change",
            ActivityKind::BookingDelete => "booking_delete",
            ActivityKind::BookingReminder => "booking_reminder",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit entry. `actor` is `None` for system activity (reminders).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRecord {
    pub actor: Option<Ulid>,
    pub kind: ActivityKind,
    pub details: serde_json::Value,
    pub at: Ms,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: ActivityRecord) -> Result<(), EffectError>;
}

/// Bounded in-memory audit log; the oldest entries fall off first.
pub struct MemoryAuditLog {
    records: RwLock<VecDeque<ActivityRecord>>,
    capacity: usize,
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new(MAX_ACTIVITY_RECORDS)
    }
}

impl MemoryAuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Newest first, optionally only one actor's records.
    pub async fn recent(&self, limit: usize, actor: Option<Ulid>) -> Vec<ActivityRecord> {
        self.records
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| actor.is_none() || r.actor == actor)
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn record(&self, record: ActivityRecord) -> Result<(), EffectError> {
        let mut records = self.records.write().await;
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }
}
