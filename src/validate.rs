//! One validator per input type. Each returns every violation it finds so the
//! caller can report them together.

use std::collections::BTreeSet;
use std::fmt;

use crate::limits::*;
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: &'static str,
    pub message: String,
}

impl Violation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Strip tags and anything outside ASCII word characters, whitespace and `@ . - _`.
pub fn sanitize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            c if c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '@' | '.' | '-') => {
                out.push(c)
            }
            _ => {}
        }
    }
    out.trim().to_string()
}

fn check_span(start: Ms, end: Ms, now: Ms, violations: &mut Vec<Violation>) {
    let in_range = (MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&start)
        && (MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&end);
    if !in_range {
        violations.push(Violation::new("time", "timestamp out of range"));
    }
    if end <= start {
        violations.push(Violation::new("end", "end time must be after start time"));
    } else if end.checked_sub(start).is_none_or(|d| d > MAX_BOOKING_DURATION_MS) {
        violations.push(Violation::new("end", "booking is too long"));
    }
    if start < now {
        violations.push(Violation::new("start", "start time cannot be in the past"));
    }
}

fn check_purpose(purpose: &str, violations: &mut Vec<Violation>) {
    if purpose.trim().is_empty() {
        violations.push(Violation::new("purpose", "booking purpose is required"));
    } else if purpose.len() > MAX_PURPOSE_LEN {
        violations.push(Violation::new("purpose", "booking purpose is too long"));
    }
}

pub fn validate_new_booking(req: &NewBooking, now: Ms) -> Vec<Violation> {
    let mut violations = Vec::new();
    check_span(req.start, req.end, now, &mut violations);
    check_purpose(&req.purpose, &mut violations);
    violations
}

/// Resolve a reschedule against the booking's current interval.
/// Returns the new span, or the violations that prevent it.
pub fn validate_reschedule(current: &Booking, req: &Reschedule, now: Ms) -> Result<Span, Vec<Violation>> {
    let mut violations = Vec::new();
    if req.start.is_none() && req.end.is_none() && req.purpose.is_none() {
        violations.push(Violation::new("request", "nothing to update"));
    }
    let start = req.start.unwrap_or(current.span.start);
    let end = req.end.unwrap_or(current.span.end);
    let moved = start != current.span.start || end != current.span.end;
    if moved {
        check_span(start, end, now, &mut violations);
    }
    if let Some(purpose) = &req.purpose {
        check_purpose(purpose, &mut violations);
    }
    match Span::try_new(start, end) {
        Some(span) if violations.is_empty() => Ok(span),
        _ => Err(violations),
    }
}

pub fn validate_status_change(req: &StatusChange) -> Vec<Violation> {
    let mut violations = Vec::new();
    if req.status == BookingStatus::Pending {
        violations.push(Violation::new(
            "status",
            "status must be one of approved, rejected, cancelled",
        ));
    }
    if let Some(reason) = &req.reason {
        if reason.len() > MAX_REASON_LEN {
            violations.push(Violation::new("reason", "cancellation reason is too long"));
        }
        if req.status != BookingStatus::Cancelled {
            violations.push(Violation::new("reason", "a reason only applies to cancellation"));
        }
    }
    violations
}

fn check_name(field: &'static str, value: &str, max: usize, violations: &mut Vec<Violation>) {
    if value.trim().is_empty() {
        violations.push(Violation::new(field, format!("room {field} is required")));
    } else if value.len() > max {
        violations.push(Violation::new(field, format!("room {field} is too long")));
    }
}

fn check_capacity(capacity: u32, violations: &mut Vec<Violation>) {
    if capacity == 0 || capacity > MAX_ROOM_CAPACITY {
        violations.push(Violation::new("capacity", "room capacity must be a positive number"));
    }
}

fn check_amenities(amenities: &[String], violations: &mut Vec<Violation>) {
    if amenities.len() > MAX_AMENITIES {
        violations.push(Violation::new("amenities", "too many amenities"));
    }
    if amenities.iter().any(|a| a.len() > MAX_AMENITY_LEN) {
        violations.push(Violation::new("amenities", "amenity name is too long"));
    }
}

pub fn validate_room(spec: &RoomSpec) -> Vec<Violation> {
    let mut violations = Vec::new();
    check_name("name", &spec.name, MAX_NAME_LEN, &mut violations);
    check_name("location", &spec.location, MAX_LOCATION_LEN, &mut violations);
    check_capacity(spec.capacity, &mut violations);
    check_amenities(&spec.amenities, &mut violations);
    violations
}

pub fn validate_room_patch(patch: &RoomPatch) -> Vec<Violation> {
    let mut violations = Vec::new();
    if let Some(name) = &patch.name {
        check_name("name", name, MAX_NAME_LEN, &mut violations);
    }
    if let Some(location) = &patch.location {
        check_name("location", location, MAX_LOCATION_LEN, &mut violations);
    }
    if let Some(capacity) = patch.capacity {
        check_capacity(capacity, &mut violations);
    }
    if let Some(amenities) = &patch.amenities {
        check_amenities(amenities, &mut violations);
    }
    violations
}

/// Trimmed, de-duplicated, empty entries dropped.
pub fn normalize_amenities(amenities: &[String]) -> BTreeSet<String> {
    amenities
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const NOW: Ms = 1_700_000_000_000;
    const H: Ms = 3_600_000;

    fn new_booking(start: Ms, end: Ms, purpose: &str) -> NewBooking {
        NewBooking {
            room_id: Ulid::new(),
            start,
            end,
            purpose: purpose.into(),
        }
    }

    fn existing(start: Ms, end: Ms) -> Booking {
        Booking {
            id: Ulid::new(),
            room_id: Ulid::new(),
            requester: Ulid::new(),
            span: Span::new(start, end),
            purpose: "planning".into(),
            status: BookingStatus::Pending,
            approval: None,
            cancellation_reason: None,
            created_at: 0,
            updated_at: 0,
            reminded_at: None,
        }
    }

    fn fields(v: &[Violation]) -> Vec<&'static str> {
        v.iter().map(|v| v.field).collect()
    }

    #[test]
    fn valid_booking_has_no_violations() {
        assert!(validate_new_booking(&new_booking(NOW + H, NOW + 2 * H, "retro"), NOW).is_empty());
    }

    #[test]
    fn booking_collects_all_violations() {
        let v = validate_new_booking(&new_booking(NOW - 2 * H, NOW - 3 * H, "  "), NOW);
        assert_eq!(fields(&v), vec!["end", "start", "purpose"]);
    }

    #[test]
    fn zero_length_booking_rejected() {
        let v = validate_new_booking(&new_booking(NOW + H, NOW + H, "x"), NOW);
        assert_eq!(fields(&v), vec!["end"]);
    }

    #[test]
    fn overly_long_booking_rejected() {
        let v = validate_new_booking(
            &new_booking(NOW + H, NOW + H + MAX_BOOKING_DURATION_MS + 1, "offsite"),
            NOW,
        );
        assert_eq!(fields(&v), vec!["end"]);
    }

    #[test]
    fn extreme_timestamps_are_violations_not_overflow() {
        let v = validate_new_booking(&new_booking(-1, Ms::MAX, "x"), NOW);
        assert_eq!(fields(&v), vec!["time", "end", "start"]);
        let v = validate_new_booking(&new_booking(Ms::MIN, Ms::MAX, "x"), NOW);
        assert_eq!(fields(&v), vec!["time", "end", "start"]);
    }

    #[test]
    fn reschedule_fills_missing_bound_from_current() {
        let b = existing(NOW + H, NOW + 2 * H);
        let req = Reschedule {
            end: Some(NOW + 3 * H),
            ..Default::default()
        };
        assert_eq!(validate_reschedule(&b, &req, NOW), Ok(Span::new(NOW + H, NOW + 3 * H)));
    }

    #[test]
    fn reschedule_single_bound_can_invert_span() {
        let b = existing(NOW + H, NOW + 2 * H);
        let req = Reschedule {
            start: Some(NOW + 5 * H),
            ..Default::default()
        };
        let err = validate_reschedule(&b, &req, NOW).unwrap_err();
        assert_eq!(fields(&err), vec!["end"]);
    }

    #[test]
    fn reschedule_purpose_only_skips_time_checks() {
        // Current start already passed: a purpose-only edit is still fine.
        let b = existing(NOW - H, NOW + H);
        let req = Reschedule {
            purpose: Some("renamed".into()),
            ..Default::default()
        };
        assert_eq!(validate_reschedule(&b, &req, NOW), Ok(b.span));
    }

    #[test]
    fn empty_reschedule_rejected() {
        let b = existing(NOW + H, NOW + 2 * H);
        let err = validate_reschedule(&b, &Reschedule::default(), NOW).unwrap_err();
        assert_eq!(fields(&err), vec!["request"]);
    }

    #[test]
    fn status_change_rejects_pending_target_and_stray_reason() {
        assert_eq!(
            fields(&validate_status_change(&StatusChange::to(BookingStatus::Pending))),
            vec!["status"]
        );
        let approve_with_reason = StatusChange {
            status: BookingStatus::Approved,
            reason: Some("why".into()),
        };
        assert_eq!(fields(&validate_status_change(&approve_with_reason)), vec!["reason"]);
        assert!(validate_status_change(&StatusChange::cancel("moved")).is_empty());
    }

    #[test]
    fn room_validation() {
        let good = RoomSpec {
            name: "Atlas".into(),
            location: "2F east".into(),
            capacity: 4,
            amenities: vec!["tv".into()],
            active: true,
        };
        assert!(validate_room(&good).is_empty());

        let bad = RoomSpec {
            name: " ".into(),
            location: String::new(),
            capacity: 0,
            amenities: vec!["x".repeat(MAX_AMENITY_LEN + 1)],
            active: true,
        };
        assert_eq!(fields(&validate_room(&bad)), vec!["name", "location", "capacity", "amenities"]);
    }

    #[test]
    fn room_patch_checks_only_present_fields() {
        assert!(validate_room_patch(&RoomPatch::default()).is_empty());
        let patch = RoomPatch {
            capacity: Some(0),
            ..Default::default()
        };
        assert_eq!(fields(&validate_room_patch(&patch)), vec!["capacity"]);
    }

    #[test]
    fn sanitize_strips_tags_and_symbols() {
        assert_eq!(sanitize_text("  <b>meeting</b> moved!  "), "meeting moved");
        assert_eq!(sanitize_text("<script>alert(1)</script>"), "alert1");
        assert_eq!(sanitize_text("ping ops@corp.io re: q3-plan"), "ping ops@corp.io re q3-plan");
        assert_eq!(sanitize_text("<<>>"), "");
    }

    #[test]
    fn sanitize_keeps_ascii_word_characters_only() {
        assert_eq!(sanitize_text("café réunion"), "caf runion");
        assert_eq!(sanitize_text("über_team 2"), "ber_team 2");
    }

    #[test]
    fn amenities_normalized() {
        let set = normalize_amenities(&[" tv ".into(), "tv".into(), "".into(), "whiteboard".into()]);
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec!["tv", "whiteboard"]);
    }
}
