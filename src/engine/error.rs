use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{BookingStatus, RoomStatus};

/// Input the caller can correct. Reported before any side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    CheckOutNotAfterCheckIn {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    CheckInInPast {
        check_in: NaiveDate,
        today: NaiveDate,
    },
    NoGuests,
    TooManyGuests {
        requested: u32,
        max: u32,
    },
    CategoryInactive(Ulid),
    UnknownExtra(Ulid),
    ExtraInactive(Ulid),
    RoomNotInCategory {
        room: Ulid,
        category: Ulid,
    },
    RoomNotBookable {
        room: Ulid,
        status: RoomStatus,
    },
    NegativeAmount(&'static str),
    EmptyName,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::CheckOutNotAfterCheckIn { check_in, check_out } => {
                write!(f, "check-out {check_out} must be after check-in {check_in}")
            }
            ValidationError::CheckInInPast { check_in, today } => {
                write!(f, "check-in {check_in} is before today ({today})")
            }
            ValidationError::NoGuests => write!(f, "a booking needs at least one guest"),
            ValidationError::TooManyGuests { requested, max } => {
                write!(f, "{requested} guests exceed the maximum occupancy of {max}")
            }
            ValidationError::CategoryInactive(id) => write!(f, "room category {id} is inactive"),
            ValidationError::UnknownExtra(id) => write!(f, "unknown extra service: {id}"),
            ValidationError::ExtraInactive(id) => write!(f, "extra service {id} is no longer offered"),
            ValidationError::RoomNotInCategory { room, category } => {
                write!(f, "room {room} does not belong to category {category}")
            }
            ValidationError::RoomNotBookable { room, status } => {
                write!(f, "room {room} cannot be booked while {status}")
            }
            ValidationError::NegativeAmount(what) => write!(f, "{what} must not be negative"),
            ValidationError::EmptyName => write!(f, "name must not be empty"),
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    Validation(ValidationError),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    /// A field the engine relies on was missing or out of range. Indicates a
    /// broken invariant upstream, not bad user input.
    Precondition(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(e) => write!(f, "invalid request: {e}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot move booking from {from} to {to}")
            }
            EngineError::Precondition(msg) => write!(f, "precondition violated: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        EngineError::Validation(e)
    }
}

impl EngineError {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::Precondition(_) => "precondition",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal",
        }
    }
}
