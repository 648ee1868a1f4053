use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::effects::EffectError;
use crate::model::{Booking, BookingStatus};

const CHANNEL_CAPACITY: usize = 256;

/// What a requester gets told about their booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Created(Booking),
    Rescheduled(Booking),
    StatusChanged { booking: Booking, status: BookingStatus },
    Reminder(Booking),
}

impl Notification {
    pub fn booking(&self) -> &Booking {
        match self {
            Notification::Created(b)
            | Notification::Rescheduled(b)
            | Notification::Reminder(b)
            | Notification::StatusChanged { booking: b, .. } => b,
        }
    }

    pub fn subject(&self) -> String {
        let b = self.booking();
        match self {
            Notification::Created(_) => format!("Booking request received ({})", b.status),
            Notification::Rescheduled(_) => format!("Booking rescheduled to {}", b.span),
            Notification::StatusChanged { status, .. } => format!("Booking {status}"),
            Notification::Reminder(_) => format!("Reminder: booking starts at {}", b.span.start),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Created(_) => "created",
            Notification::Rescheduled(_) => "rescheduled",
            Notification::StatusChanged { .. } => "status_changed",
            Notification::Reminder(_) => "reminder",
        }
    }
}

/// Outbound notification channel. Delivery is best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), EffectError>;

    /// The room is gone; nothing more will be sent for it.
    async fn room_closed(&self, _room_id: Ulid) -> Result<(), EffectError> {
        Ok(())
    }
}

/// Broadcast hub: one firehose plus one channel per room.
pub struct NotifyHub {
    all: broadcast::Sender<Notification>,
    rooms: DashMap<Ulid, broadcast::Sender<Notification>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            all: broadcast::channel(CHANNEL_CAPACITY).0,
            rooms: DashMap::new(),
        }
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<Notification> {
        self.all.subscribe()
    }

    /// Subscribe to one room. Creates the channel if needed.
    pub fn subscribe(&self, room_id: Ulid) -> broadcast::Receiver<Notification> {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send to the firehose and the room channel. No-op without listeners.
    pub fn send(&self, notification: &Notification) {
        let _ = self.all.send(notification.clone());
        let room_id = notification.booking().room_id;
        if let Some(sender) = self.rooms.get(&room_id) {
            let _ = sender.send(notification.clone());
        }
    }

    /// Drop a room's channel. Its subscribers see the channel close.
    pub fn remove(&self, room_id: &Ulid) {
        self.rooms.remove(room_id);
    }
}

#[async_trait]
impl Notifier for NotifyHub {
    async fn notify(&self, notification: Notification) -> Result<(), EffectError> {
        self.send(&notification);
        Ok(())
    }

    async fn room_closed(&self, room_id: Ulid) -> Result<(), EffectError> {
        self.remove(&room_id);
        Ok(())
    }
}
