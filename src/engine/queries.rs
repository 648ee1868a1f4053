use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability;
use super::{Engine, EngineError};

fn check_window(window: &Span) -> Result<(), EngineError> {
    if window.start >= window.end {
        return Err(EngineError::invalid("window", "window end must be after its start"));
    }
    if window.end.checked_sub(window.start).is_none_or(|d| d > MAX_QUERY_WINDOW_MS) {
        return Err(EngineError::invalid("window", "query window too wide"));
    }
    Ok(())
}

impl Engine {
    // ── Rooms ────────────────────────────────────────────────

    pub async fn get_room(&self, id: Ulid) -> Result<Room, EngineError> {
        let rs = self.get_room_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        Ok(guard.room.clone())
    }

    /// Rooms sorted by name.
    pub async fn list_rooms(&self, include_inactive: bool) -> Vec<Room> {
        let mut rooms = Vec::new();
        for rs in self.store.rooms() {
            let guard = rs.read().await;
            if include_inactive || guard.room.active {
                rooms.push(guard.room.clone());
            }
        }
        rooms.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        rooms
    }

    // ── Bookings ─────────────────────────────────────────────

    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let room_id = self
            .store
            .room_for_booking(&id)
            .ok_or(EngineError::NotFound(id))?;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }

    pub async fn bookings_for_room(&self, room_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard.bookings.clone())
    }

    /// Every booking matching `keep` across all rooms, sorted by start.
    async fn collect_bookings(&self, keep: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        let mut out = Vec::new();
        for rs in self.store.rooms() {
            let guard = rs.read().await;
            out.extend(guard.bookings.iter().filter(|&b| keep(b)).cloned());
        }
        out.sort_by_key(|b| (b.span.start, b.id));
        out
    }

    pub async fn bookings_for_user(&self, user_id: Ulid) -> Vec<Booking> {
        self.collect_bookings(|b| b.requester == user_id).await
    }

    pub async fn list_bookings(&self, status: Option<BookingStatus>) -> Vec<Booking> {
        self.collect_bookings(|b| status.is_none_or(|s| b.status == s)).await
    }

    // ── Availability ─────────────────────────────────────────

    /// Pure read. The answer is only as good as the moment it was taken;
    /// commands re-check under the room lock.
    pub async fn is_available(
        &self,
        room_id: Ulid,
        start: Ms,
        end: Ms,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        let span = Span::try_new(start, end)
            .ok_or_else(|| EngineError::invalid("end", "end time must be after start time"))?;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(availability::is_available(&guard, &span, exclude))
    }

    /// Free gaps in `window` at least `min_duration` long.
    pub async fn free_slots(&self, room_id: Ulid, window: Span, min_duration: Ms) -> Result<Vec<Span>, EngineError> {
        check_window(&window)?;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        let mut free = availability::free_slots(&guard, &window);
        free.retain(|s| s.duration_ms() >= min_duration);
        Ok(free)
    }

    // ── Reports ──────────────────────────────────────────────

    /// Per-room usage inside `window`, sorted by room name. Admin only.
    pub async fn room_utilization(&self, actor: &Actor, window: Span) -> Result<Vec<RoomUsage>, EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::Forbidden("only admins may view reports"));
        }
        check_window(&window)?;

        let mut report = Vec::new();
        for rs in self.store.rooms() {
            let guard = rs.read().await;
            let mut usage = RoomUsage {
                room_id: guard.room.id,
                name: guard.room.name.clone(),
                booked_ms: 0,
                approved: 0,
                pending: 0,
                rejected: 0,
                cancelled: 0,
                utilization: 0.0,
            };
            for b in guard.overlapping(window) {
                match b.status {
                    BookingStatus::Approved => {
                        usage.approved += 1;
                        usage.booked_ms += b.span.clamp_to(&window).map_or(0, |s| s.duration_ms());
                    }
                    BookingStatus::Pending => usage.pending += 1,
                    BookingStatus::Rejected => usage.rejected += 1,
                    BookingStatus::Cancelled => usage.cancelled += 1,
                }
            }
            usage.utilization = usage.booked_ms as f64 / window.duration_ms() as f64;
            report.push(usage);
        }
        report.sort_by(|a, b| a.name.cmp(&b.name).then(a.room_id.cmp(&b.room_id)));
        Ok(report)
    }

    /// Booking counts per status across all rooms. Admin only.
    pub async fn status_summary(&self, actor: &Actor) -> Result<StatusSummary, EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::Forbidden("only admins may view reports"));
        }
        let mut summary = StatusSummary::default();
        for rs in self.store.rooms() {
            let guard = rs.read().await;
            for b in &guard.bookings {
                summary.add(b.status);
            }
        }
        Ok(summary)
    }

    // ── Reminders ────────────────────────────────────────────

    /// Approved, not yet reminded bookings starting within
    /// `[now + lead - tolerance, now + lead + tolerance]`.
    pub async fn due_reminders(&self, now: Ms, lead: Ms, tolerance: Ms) -> Vec<Ulid> {
        let from = now + lead - tolerance;
        let to = now + lead + tolerance;
        let mut due = Vec::new();
        for rs in self.store.rooms() {
            let guard = rs.read().await;
            let upper = guard.bookings.partition_point(|b| b.span.start <= to);
            due.extend(
                guard.bookings[..upper]
                    .iter()
                    .filter(|b| b.span.start >= from)
                    .filter(|b| b.status == BookingStatus::Approved && b.reminded_at.is_none())
                    .map(|b| b.id),
            );
        }
        due
    }
}
