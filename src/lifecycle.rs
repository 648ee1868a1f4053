//! Booking status lifecycle.
//!
//! ```text
//!            approve (admin)
//!   pending ─────────────────▶ approved ──┐
//!      │  └── reject (admin) ─▶ rejected   │ cancel (admin | requester)
//!      └──── cancel (admin | requester) ───┴──▶ cancelled
//! ```
//!
//! `approved`, `rejected` and `cancelled` have no outgoing status edges except
//! `approved → cancelled`. Rescheduling is not a status edge but follows the same
//! permission check: requesters may move their own pending/approved bookings,
//! admins any booking that is not cancelled.

use std::fmt;

use crate::engine::EngineError;
use crate::model::{Actor, Booking, BookingStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Approve,
    Reject,
    Cancel,
    Reschedule,
}

impl Transition {
    /// The status edge that lands on `target`. `Pending` is initial-only.
    pub fn for_target(target: BookingStatus) -> Option<Transition> {
        match target {
            BookingStatus::Approved => Some(Transition::Approve),
            BookingStatus::Rejected => Some(Transition::Reject),
            BookingStatus::Cancelled => Some(Transition::Cancel),
            BookingStatus::Pending => None,
        }
    }

    /// Whether the actor may attempt this transition on the booking at all.
    pub fn permitted(self, actor: &Actor, booking: &Booking) -> bool {
        match self {
            Transition::Approve | Transition::Reject => actor.is_admin(),
            Transition::Cancel | Transition::Reschedule => {
                actor.is_admin() || booking.requester == actor.id
            }
        }
    }

    /// Whether the edge exists from `from` for this actor.
    pub fn allowed_from(self, from: BookingStatus, actor: &Actor) -> bool {
        use BookingStatus::*;
        match self {
            Transition::Approve | Transition::Reject => from == Pending,
            Transition::Cancel => matches!(from, Pending | Approved),
            Transition::Reschedule if actor.is_admin() => from != Cancelled,
            Transition::Reschedule => matches!(from, Pending | Approved),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Transition::Approve => "approve",
            Transition::Reject => "reject",
            Transition::Cancel => "cancel",
            Transition::Reschedule => "reschedule",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorize first, then consult the edge table. Mutates nothing.
pub fn authorize(actor: &Actor, booking: &Booking, transition: Transition) -> Result<(), EngineError> {
    if !transition.permitted(actor, booking) {
        return Err(EngineError::Forbidden(match transition {
            Transition::Approve | Transition::Reject => "only admins may decide bookings",
            Transition::Cancel => "only the requester or an admin may cancel",
            Transition::Reschedule => "only the requester or an admin may reschedule",
        }));
    }
    if !transition.allowed_from(booking.status, actor) {
        return Err(EngineError::InvalidTransition {
            from: booking.status,
            transition,
        });
    }
    Ok(())
}

/// Owner-or-admin check for hard deletion, which ignores status.
pub fn authorize_delete(actor: &Actor, booking: &Booking) -> Result<(), EngineError> {
    if actor.is_admin() || booking.requester == actor.id {
        Ok(())
    } else {
        Err(EngineError::Forbidden("only the requester or an admin may delete"))
    }
}
