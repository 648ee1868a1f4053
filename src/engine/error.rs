use ulid::Ulid;

use crate::lifecycle::Transition;
use crate::model::BookingStatus;
use crate::validate::Violation;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed or missing input; the caller can fix and resubmit.
    Validation(Vec<Violation>),
    NotFound(Ulid),
    Forbidden(&'static str),
    /// Interval overlaps the given pending/approved booking.
    Conflict(Ulid),
    InvalidTransition {
        from: BookingStatus,
        transition: Transition,
    },
    Store(String),
}

impl EngineError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::Validation(vec![Violation::new(field, message)])
    }

    /// Stable short label for metrics and logs.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::NotFound(_) => "not_found",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::Conflict(_) => "conflict",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::Store(_) => "store",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(violations) => {
                write!(f, "validation failed: ")?;
                for (i, v) in violations.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{v}")?;
                }
                Ok(())
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::Conflict(id) => write!(f, "conflict with booking: {id}"),
            EngineError::InvalidTransition { from, transition } => {
                write!(f, "cannot {transition} a booking that is {from}")
            }
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
