use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for untrusted input.
    pub fn try_new(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// The one overlap predicate. Adjacent spans (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Intersection of two spans, `None` when they don't overlap.
    pub fn clamp_to(&self, window: &Span) -> Option<Span> {
        Span::try_new(self.start.max(window.start), self.end.min(window.end))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ── Actors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    User,
    Admin,
}

/// Authenticated caller, supplied verbatim by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn user(id: Ulid) -> Self {
        Self { id, role: Role::User }
    }

    pub fn admin(id: Ulid) -> Self {
        Self { id, role: Role::Admin }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ── Rooms ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub location: String,
    pub capacity: u32,
    pub amenities: BTreeSet<String>,
    /// Inactive rooms keep their bookings but accept no new ones.
    pub active: bool,
    pub owner: Ulid,
    pub created_at: Ms,
}

/// Input for room creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSpec {
    pub name: String,
    pub location: String,
    pub capacity: u32,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial room update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomPatch {
    pub name: Option<String>,
    pub location: Option<String>,
    pub capacity: Option<u32>,
    pub amenities: Option<Vec<String>>,
    pub active: Option<bool>,
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Approved,
        BookingStatus::Rejected,
        BookingStatus::Cancelled,
    ];

    /// Pending and approved bookings both occupy their slot.
    pub fn holds_slot(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Approved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "approved" => Ok(BookingStatus::Approved),
            "rejected" => Ok(BookingStatus::Rejected),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

/// Who decided a booking and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub by: Ulid,
    pub at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub room_id: Ulid,
    pub requester: Ulid,
    pub span: Span,
    pub purpose: String,
    pub status: BookingStatus,
    pub approval: Option<Approval>,
    pub cancellation_reason: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
    pub reminded_at: Option<Ms>,
}

/// Input for booking creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub room_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub purpose: String,
}

/// Reschedule input. Missing times keep the booking's current ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reschedule {
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: BookingStatus,
    pub reason: Option<String>,
}

impl StatusChange {
    pub fn to(status: BookingStatus) -> Self {
        Self { status, reason: None }
    }

    pub fn cancel(reason: impl Into<String>) -> Self {
        Self {
            status: BookingStatus::Cancelled,
            reason: Some(reason.into()),
        }
    }
}

// ── Per-room state ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// All bookings on the room regardless of status, sorted by `span.start`.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.span.start <= booking.span.start);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings of any status whose span overlaps the query window.
    /// Binary search skips bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: Span) -> impl Iterator<Item = &Booking> + '_ {
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.overlaps(&query))
    }
}

// ── Journal records ──────────────────────────────────────────────

/// Flat journal record. Replaying the sequence rebuilds every room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        room: Room,
    },
    RoomUpdated {
        id: Ulid,
        name: String,
        location: String,
        capacity: u32,
        amenities: BTreeSet<String>,
        active: bool,
    },
    RoomDeleted {
        id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingRescheduled {
        id: Ulid,
        room_id: Ulid,
        span: Span,
        purpose: String,
        at: Ms,
    },
    BookingStatusChanged {
        id: Ulid,
        room_id: Ulid,
        status: BookingStatus,
        approval: Option<Approval>,
        cancellation_reason: Option<String>,
        at: Ms,
    },
    BookingDeleted {
        id: Ulid,
        room_id: Ulid,
    },
    ReminderSent {
        id: Ulid,
        room_id: Ulid,
        at: Ms,
    },
}

impl Event {
    pub fn room_id(&self) -> Ulid {
        match self {
            Event::RoomCreated { room } => room.id,
            Event::BookingCreated { booking } => booking.room_id,
            Event::RoomUpdated { id, .. } | Event::RoomDeleted { id } => *id,
            Event::BookingRescheduled { room_id, .. }
            | Event::BookingStatusChanged { room_id, .. }
            | Event::BookingDeleted { room_id, .. }
            | Event::ReminderSent { room_id, .. } => *room_id,
        }
    }
}

// ── Report types ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RoomUsage {
    pub room_id: Ulid,
    pub name: String,
    /// Approved booked time inside the report window.
    pub booked_ms: Ms,
    pub approved: usize,
    pub pending: usize,
    pub rejected: usize,
    pub cancelled: usize,
    /// `booked_ms` as a fraction of the window length.
    pub utilization: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub cancelled: usize,
}

impl StatusSummary {
    pub fn add(&mut self, status: BookingStatus) {
        match status {
            BookingStatus::Pending => self.pending += 1,
            BookingStatus::Approved => self.approved += 1,
            BookingStatus::Rejected => self.rejected += 1,
            BookingStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.approved + self.rejected + self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> Room {
        Room {
            id: Ulid::new(),
            name: "Atlas".into(),
            location: "2F".into(),
            capacity: 4,
            amenities: BTreeSet::new(),
            active: true,
            owner: Ulid::new(),
            created_at: 0,
        }
    }

    fn booking(start: Ms, end: Ms, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            room_id: Ulid::new(),
            requester: Ulid::new(),
            span: Span::new(start, end),
            purpose: "sync".into(),
            status,
            approval: None,
            cancellation_reason: None,
            created_at: 0,
            updated_at: 0,
            reminded_at: None,
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert_eq!(s.to_string(), "[100, 200)");
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_overlap_covers_starts_ends_and_contains() {
        let existing = Span::new(100, 200);
        // starts during
        assert!(existing.overlaps(&Span::new(150, 300)));
        // ends during
        assert!(existing.overlaps(&Span::new(50, 150)));
        // contains
        assert!(existing.overlaps(&Span::new(50, 300)));
        // contained
        assert!(existing.overlaps(&Span::new(120, 130)));
        // identical
        assert!(existing.overlaps(&existing));
    }

    #[test]
    fn span_try_new_rejects_empty_and_inverted() {
        assert!(Span::try_new(100, 100).is_none());
        assert!(Span::try_new(200, 100).is_none());
        assert_eq!(Span::try_new(100, 101), Some(Span::new(100, 101)));
    }

    #[test]
    fn span_clamp() {
        let window = Span::new(100, 200);
        assert_eq!(Span::new(50, 150).clamp_to(&window), Some(Span::new(100, 150)));
        assert_eq!(Span::new(0, 100).clamp_to(&window), None);
    }

    #[test]
    fn status_parse_and_display() {
        for s in BookingStatus::ALL {
            assert_eq!(s.as_str().parse::<BookingStatus>().unwrap(), s);
        }
        assert_eq!("Canceled".parse::<BookingStatus>().unwrap(), BookingStatus::Cancelled);
        assert!("confirmed".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn only_pending_and_approved_hold_slots() {
        assert!(BookingStatus::Pending.holds_slot());
        assert!(BookingStatus::Approved.holds_slot());
        assert!(!BookingStatus::Rejected.holds_slot());
        assert!(!BookingStatus::Cancelled.holds_slot());
    }

    #[test]
    fn bookings_stay_sorted() {
        let mut rs = RoomState::new(room());
        rs.insert_booking(booking(300, 400, BookingStatus::Pending));
        rs.insert_booking(booking(100, 200, BookingStatus::Approved));
        rs.insert_booking(booking(200, 300, BookingStatus::Rejected));
        let starts: Vec<Ms> = rs.bookings.iter().map(|b| b.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn remove_nonexistent_returns_none() {
        let mut rs = RoomState::new(room());
        rs.insert_booking(booking(100, 200, BookingStatus::Pending));
        assert!(rs.remove_booking(Ulid::new()).is_none());
        assert_eq!(rs.bookings.len(), 1);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut rs = RoomState::new(room());
        rs.insert_booking(booking(100, 200, BookingStatus::Pending));
        rs.insert_booking(booking(450, 600, BookingStatus::Approved));
        rs.insert_booking(booking(1000, 1100, BookingStatus::Pending));

        let query = Span::new(500, 800);
        let hits: Vec<_> = rs.overlapping(query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut rs = RoomState::new(room());
        rs.insert_booking(booking(100, 200, BookingStatus::Approved));
        let query = Span::new(200, 300);
        assert_eq!(rs.overlapping(query).count(), 0);
    }

    #[test]
    fn overlapping_long_booking_spanning_query() {
        let mut rs = RoomState::new(room());
        rs.insert_booking(booking(0, 10_000, BookingStatus::Pending));
        let query = Span::new(500, 600);
        assert_eq!(rs.overlapping(query).count(), 1);
    }

    #[test]
    fn event_room_id() {
        let b = booking(0, 10, BookingStatus::Pending);
        let rid = b.room_id;
        assert_eq!(Event::BookingCreated { booking: b }.room_id(), rid);
        assert_eq!(Event::RoomDeleted { id: rid }.room_id(), rid);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::RoomCreated { room: room() };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn room_spec_defaults_from_json() {
        let spec: RoomSpec =
            serde_json::from_str(r#"{"name":"Atlas","location":"2F","capacity":4}"#).unwrap();
        assert!(spec.active);
        assert!(spec.amenities.is_empty());
    }
}
