use std::sync::Arc;

use serde_json::json;
use tokio::sync::{oneshot, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::audit::{ActivityKind, ActivityRecord};
use crate::lifecycle::{authorize, authorize_delete, Transition};
use crate::limits::*;
use crate::model::*;
use crate::notify::Notification;
use crate::observability::observe;
use crate::validate::*;

use super::conflict::{check_no_conflict, now_ms};
use super::{Engine, EngineError, JournalCommand};

fn require_admin(actor: &Actor) -> Result<(), EngineError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(EngineError::Forbidden("only admins may manage rooms"))
    }
}

fn reject(violations: Vec<Violation>) -> Result<(), EngineError> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Validation(violations))
    }
}

impl Engine {
    fn audit(&self, actor: Option<Ulid>, kind: ActivityKind, details: serde_json::Value, at: Ms) {
        self.effects.audit(ActivityRecord {
            actor,
            kind,
            details,
            at,
        });
    }

    // ── Rooms ────────────────────────────────────────────────

    pub async fn create_room(&self, actor: &Actor, spec: RoomSpec) -> Result<Room, EngineError> {
        observe("create_room", self.try_create_room(actor, spec)).await
    }

    async fn try_create_room(&self, actor: &Actor, spec: RoomSpec) -> Result<Room, EngineError> {
        reject(validate_room(&spec))?;
        require_admin(actor)?;
        if self.store.room_count() >= MAX_ROOMS {
            return Err(EngineError::invalid("room", "too many rooms"));
        }

        let _permit = self.commit_gate.read().await;
        let room = Room {
            id: Ulid::new(),
            name: spec.name.trim().to_string(),
            location: spec.location.trim().to_string(),
            capacity: spec.capacity,
            amenities: normalize_amenities(&spec.amenities),
            active: spec.active,
            owner: actor.id,
            created_at: now_ms(),
        };
        let event = Event::RoomCreated { room: room.clone() };
        self.journal_append(&event).await?;
        self.store
            .insert_room(room.id, Arc::new(RwLock::new(RoomState::new(room.clone()))));
        metrics::gauge!(crate::observability::ROOMS_ACTIVE).set(self.store.room_count() as f64);

        info!(room_id = %room.id, "room created: {}", room.name);
        self.audit(
            Some(actor.id),
            ActivityKind::RoomCreate,
            json!({ "room_id": room.id.to_string(), "name": room.name }),
            room.created_at,
        );
        Ok(room)
    }

    pub async fn update_room(&self, actor: &Actor, room_id: Ulid, patch: RoomPatch) -> Result<Room, EngineError> {
        observe("update_room", self.try_update_room(actor, room_id, patch)).await
    }

    async fn try_update_room(&self, actor: &Actor, room_id: Ulid, patch: RoomPatch) -> Result<Room, EngineError> {
        if patch == RoomPatch::default() {
            return Err(EngineError::invalid("request", "nothing to update"));
        }
        reject(validate_room_patch(&patch))?;
        require_admin(actor)?;

        let mut guard = self.lock_room(room_id).await?;
        let current = &guard.room;
        let event = Event::RoomUpdated {
            id: room_id,
            name: patch.name.map_or_else(|| current.name.clone(), |n| n.trim().to_string()),
            location: patch
                .location
                .map_or_else(|| current.location.clone(), |l| l.trim().to_string()),
            capacity: patch.capacity.unwrap_or(current.capacity),
            amenities: patch
                .amenities
                .map_or_else(|| current.amenities.clone(), |a| normalize_amenities(&a)),
            active: patch.active.unwrap_or(current.active),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        let room = guard.room.clone();
        drop(guard);

        info!(room_id = %room_id, active = room.active, "room updated");
        self.audit(
            Some(actor.id),
            ActivityKind::RoomUpdate,
            json!({
                "room_id": room_id.to_string(),
                "name": room.name,
                "capacity": room.capacity,
                "active": room.active,
            }),
            now_ms(),
        );
        Ok(room)
    }

    /// Remove a room and every booking left on it. Refused while a
    /// pending/approved booking still ends in the future.
    pub async fn delete_room(&self, actor: &Actor, room_id: Ulid) -> Result<(), EngineError> {
        observe("delete_room", self.try_delete_room(actor, room_id)).await
    }

    async fn try_delete_room(&self, actor: &Actor, room_id: Ulid) -> Result<(), EngineError> {
        require_admin(actor)?;
        let guard = self.lock_room(room_id).await?;
        let now = now_ms();
        if let Some(live) = guard
            .bookings
            .iter()
            .find(|b| b.status.holds_slot() && b.span.end > now)
        {
            return Err(EngineError::Conflict(live.id));
        }

        let event = Event::RoomDeleted { id: room_id };
        self.journal_append(&event).await?;
        for b in &guard.bookings {
            self.store.unmap_booking(&b.id);
        }
        self.store.remove_room(&room_id);
        let name = guard.room.name.clone();
        let dropped = guard.bookings.len();
        drop(guard);
        metrics::gauge!(crate::observability::ROOMS_ACTIVE).set(self.store.room_count() as f64);

        info!(room_id = %room_id, "room deleted with {dropped} past bookings");
        self.effects.room_closed(room_id);
        self.audit(
            Some(actor.id),
            ActivityKind::RoomDelete,
            json!({ "room_id": room_id.to_string(), "name": name }),
            now,
        );
        Ok(())
    }

    // ── Bookings ─────────────────────────────────────────────

    pub async fn create_booking(&self, actor: &Actor, req: NewBooking) -> Result<Booking, EngineError> {
        observe("create_booking", self.try_create_booking(actor, req)).await
    }

    async fn try_create_booking(&self, actor: &Actor, req: NewBooking) -> Result<Booking, EngineError> {
        let now = now_ms();
        reject(validate_new_booking(&req, now))?;
        let span = Span::new(req.start, req.end);

        // Held through commit so racing creates on this room serialize.
        let mut guard = self.lock_room(req.room_id).await?;
        if !guard.room.active {
            return Err(EngineError::invalid("room_id", "room is not accepting bookings"));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::invalid("room_id", "room has too many bookings"));
        }
        check_no_conflict(&guard, &span, None)?;

        let booking = Booking {
            id: Ulid::new(),
            room_id: req.room_id,
            requester: actor.id,
            span,
            purpose: req.purpose.trim().to_string(),
            status: BookingStatus::Pending,
            approval: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            reminded_at: None,
        };
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);

        info!(booking_id = %booking.id, room_id = %booking.room_id, "booking requested for {span}");
        self.effects.notify(Notification::Created(booking.clone()));
        self.audit(
            Some(actor.id),
            ActivityKind::BookingCreate,
            json!({
                "booking_id": booking.id.to_string(),
                "room_id": booking.room_id.to_string(),
                "start": span.start,
                "end": span.end,
            }),
            now,
        );
        Ok(booking)
    }

    /// Move a booking and/or change its purpose. Status and approval are kept.
    pub async fn reschedule_booking(&self, actor: &Actor, id: Ulid, req: Reschedule) -> Result<Booking, EngineError> {
        observe("reschedule_booking", self.try_reschedule_booking(actor, id, req)).await
    }

    async fn try_reschedule_booking(&self, actor: &Actor, id: Ulid, req: Reschedule) -> Result<Booking, EngineError> {
        let (mut guard, current) = self.lock_booking(id).await?;
        let now = now_ms();
        let span = validate_reschedule(&current, &req, now).map_err(EngineError::Validation)?;
        authorize(actor, &current, Transition::Reschedule)?;
        if span != current.span {
            check_no_conflict(&guard, &span, Some(id))?;
        }

        let event = Event::BookingRescheduled {
            id,
            room_id: current.room_id,
            span,
            purpose: req
                .purpose
                .map_or_else(|| current.purpose.clone(), |p| p.trim().to_string()),
            at: now,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        let updated = guard.booking(id).cloned().ok_or(EngineError::NotFound(id))?;
        drop(guard);

        info!(booking_id = %id, "booking rescheduled from {} to {span}", current.span);
        self.effects.notify(Notification::Rescheduled(updated.clone()));
        self.audit(
            Some(actor.id),
            ActivityKind::BookingReschedule,
            json!({
                "booking_id": id.to_string(),
                "from": [current.span.start, current.span.end],
                "to": [span.start, span.end],
            }),
            now,
        );
        Ok(updated)
    }

    pub async fn change_status(&self, actor: &Actor, id: Ulid, req: StatusChange) -> Result<Booking, EngineError> {
        observe("change_status", self.try_change_status(actor, id, req)).await
    }

    async fn try_change_status(&self, actor: &Actor, id: Ulid, req: StatusChange) -> Result<Booking, EngineError> {
        reject(validate_status_change(&req))?;
        let transition = Transition::for_target(req.status)
            .ok_or_else(|| EngineError::invalid("status", "bookings cannot return to pending"))?;

        let (mut guard, current) = self.lock_booking(id).await?;
        authorize(actor, &current, transition)?;

        let now = now_ms();
        let approval = match transition {
            Transition::Approve | Transition::Reject => Some(Approval { by: actor.id, at: now }),
            _ => current.approval,
        };
        let cancellation_reason = match transition {
            Transition::Cancel => req
                .reason
                .as_deref()
                .map(sanitize_text)
                .filter(|r| !r.is_empty()),
            _ => current.cancellation_reason.clone(),
        };
        let event = Event::BookingStatusChanged {
            id,
            room_id: current.room_id,
            status: req.status,
            approval,
            cancellation_reason,
            at: now,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        let updated = guard.booking(id).cloned().ok_or(EngineError::NotFound(id))?;
        drop(guard);

        info!(booking_id = %id, "booking {} -> {}", current.status, updated.status);
        self.effects.notify(Notification::StatusChanged {
            booking: updated.clone(),
            status: updated.status,
        });
        self.audit(
            Some(actor.id),
            ActivityKind::BookingStatusChange,
            json!({
                "booking_id": id.to_string(),
                "from": current.status.as_str(),
                "to": updated.status.as_str(),
                "reason": updated.cancellation_reason,
            }),
            now,
        );
        Ok(updated)
    }

    /// Hard delete, whatever the status. Returns the removed booking.
    pub async fn delete_booking(&self, actor: &Actor, id: Ulid) -> Result<Booking, EngineError> {
        observe("delete_booking", self.try_delete_booking(actor, id)).await
    }

    async fn try_delete_booking(&self, actor: &Actor, id: Ulid) -> Result<Booking, EngineError> {
        let (mut guard, current) = self.lock_booking(id).await?;
        authorize_delete(actor, &current)?;

        let event = Event::BookingDeleted {
            id,
            room_id: current.room_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);

        info!(booking_id = %id, room_id = %current.room_id, "booking deleted ({})", current.status);
        self.audit(
            Some(actor.id),
            ActivityKind::BookingDelete,
            json!({
                "booking_id": id.to_string(),
                "room_id": current.room_id.to_string(),
                "status": current.status.as_str(),
            }),
            now_ms(),
        );
        Ok(current)
    }

    /// Record that a reminder went out. `None` if the booking is no longer
    /// approved or was already reminded.
    pub async fn mark_reminded(&self, id: Ulid, at: Ms) -> Result<Option<Booking>, EngineError> {
        observe("mark_reminded", self.try_mark_reminded(id, at)).await
    }

    async fn try_mark_reminded(&self, id: Ulid, at: Ms) -> Result<Option<Booking>, EngineError> {
        let (mut guard, current) = self.lock_booking(id).await?;
        if current.status != BookingStatus::Approved || current.reminded_at.is_some() {
            return Ok(None);
        }

        let event = Event::ReminderSent {
            id,
            room_id: current.room_id,
            at,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        let updated = guard.booking(id).cloned().ok_or(EngineError::NotFound(id))?;
        drop(guard);

        metrics::counter!(crate::observability::REMINDERS_SENT_TOTAL).increment(1);
        self.effects.notify(Notification::Reminder(updated.clone()));
        self.audit(
            None,
            ActivityKind::BookingReminder,
            json!({ "booking_id": id.to_string(), "start": updated.span.start }),
            at,
        );
        Ok(Some(updated))
    }

    // ── Journal maintenance ──────────────────────────────────

    /// Rewrite the journal with only the records needed to recreate the current state.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        // No command holds a room lock while we own the gate, so reads don't wait on writers.
        let _quiesced = self.commit_gate.write().await;
        let mut events = Vec::new();
        for rs in self.store.rooms() {
            let guard = rs.read().await;
            events.push(Event::RoomCreated {
                room: guard.room.clone(),
            });
            events.extend(guard.bookings.iter().map(|b| Event::BookingCreated { booking: b.clone() }));
        }
        let records = events.len();

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Store("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Store("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Store(e.to_string()))?;
        info!("journal compacted to {records} records");
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
