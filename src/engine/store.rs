use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::SharedRoomState;

/// Rooms keyed by id plus the booking → room index.
pub struct RoomStore {
    rooms: DashMap<Ulid, SharedRoomState>,
    booking_to_room: DashMap<Ulid, Ulid>,
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            booking_to_room: DashMap::new(),
        }
    }

    // ── Rooms ────────────────────────────────────────────────

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn insert_room(&self, id: Ulid, state: SharedRoomState) {
        self.rooms.insert(id, state);
    }

    pub fn remove_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.remove(id).map(|(_, rs)| rs)
    }

    /// Snapshot of every room handle. Never hold DashMap refs across an await.
    pub fn rooms(&self) -> Vec<SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    // ── Booking index ────────────────────────────────────────

    pub fn room_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    pub fn map_booking(&self, booking_id: Ulid, room_id: Ulid) {
        self.booking_to_room.insert(booking_id, room_id);
    }

    pub fn unmap_booking(&self, booking_id: &Ulid) {
        self.booking_to_room.remove(booking_id);
    }

    // ── Event application ────────────────────────────────────

    /// Apply a room-scoped record. The caller holds the room's write lock.
    /// RoomCreated/RoomDeleted act on the map itself and are no-ops here.
    pub fn apply_event(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::RoomUpdated {
                name,
                location,
                capacity,
                amenities,
                active,
                ..
            } => {
                rs.room.name = name.clone();
                rs.room.location = location.clone();
                rs.room.capacity = *capacity;
                rs.room.amenities = amenities.clone();
                rs.room.active = *active;
            }
            Event::BookingCreated { booking } => {
                self.map_booking(booking.id, booking.room_id);
                rs.insert_booking(booking.clone());
            }
            Event::BookingRescheduled {
                id,
                span,
                purpose,
                at,
                ..
            } => {
                // Re-insert to keep start order.
                if let Some(mut b) = rs.remove_booking(*id) {
                    b.span = *span;
                    b.purpose = purpose.clone();
                    b.updated_at = *at;
                    rs.insert_booking(b);
                }
            }
            Event::BookingStatusChanged {
                id,
                status,
                approval,
                cancellation_reason,
                at,
                ..
            } => {
                if let Some(b) = rs.booking_mut(*id) {
                    b.status = *status;
                    b.approval = *approval;
                    b.cancellation_reason = cancellation_reason.clone();
                    b.updated_at = *at;
                }
            }
            Event::BookingDeleted { id, .. } => {
                rs.remove_booking(*id);
                self.unmap_booking(id);
            }
            Event::ReminderSent { id, at, .. } => {
                if let Some(b) = rs.booking_mut(*id) {
                    b.reminded_at = Some(*at);
                }
            }
            Event::RoomCreated { .. } | Event::RoomDeleted { .. } => {}
        }
    }
}
