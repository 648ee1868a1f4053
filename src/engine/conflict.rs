use ulid::Ulid;

use crate::model::*;

use super::availability::first_conflict;
use super::EngineError;

/// Wall clock in Unix ms. A clock before the epoch reads as 0.
pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Fail with `Conflict` if a slot-holding booking other than `exclude` overlaps.
/// Caller holds the room's write lock through commit.
pub(crate) fn check_no_conflict(rs: &RoomState, span: &Span, exclude: Option<Ulid>) -> Result<(), EngineError> {
    match first_conflict(rs, span, exclude) {
        None => Ok(()),
        Some(existing) => {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            tracing::debug!(
                room_id = %rs.room.id,
                conflicting = %existing.id,
                "requested {span} overlaps {}",
                existing.span
            );
            Err(EngineError::Conflict(existing.id))
        }
    }
}
