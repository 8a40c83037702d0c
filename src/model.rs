use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::ValidationError;

/// Staff or guest account acting on a booking. `None` at call sites means
/// guest self-service.
pub type UserId = Ulid;

/// A stay occupies the nights from `check_in` up to `check_out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StayRange {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

impl StayRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, ValidationError> {
        if check_out <= check_in {
            return Err(ValidationError::CheckOutNotAfterCheckIn { check_in, check_out });
        }
        Ok(Self { check_in, check_out })
    }

    pub fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    pub fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    /// Whole nights; always >= 1.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Inclusive on both ends: a stay that checks out on the day another
    /// checks in still conflicts (no same-day turnover).
    pub fn conflicts_with(&self, other: &StayRange) -> bool {
        other.check_in <= self.check_out && other.check_out >= self.check_in
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCategory {
    pub id: Ulid,
    pub name: String,
    pub nightly_rate: Decimal,
    pub max_occupancy: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomStatus {
    Available,
    Occupied,
    Cleaning,
    Maintenance,
    OutOfService,
    Inactive,
}

impl RoomStatus {
    /// Whether future stays may be assigned to the room. Occupied, cleaning
    /// and maintenance describe the room today, not the requested nights.
    pub fn is_bookable(self) -> bool {
        !matches!(self, RoomStatus::OutOfService | RoomStatus::Inactive)
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoomStatus::Available => "available",
            RoomStatus::Occupied => "occupied",
            RoomStatus::Cleaning => "cleaning",
            RoomStatus::Maintenance => "maintenance",
            RoomStatus::OutOfService => "out of service",
            RoomStatus::Inactive => "inactive",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub category_id: Ulid,
    pub number: String,
    pub status: RoomStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraService {
    pub id: Ulid,
    pub name: String,
    pub price: Decimal,
    pub tag: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    CheckedIn,
    Cancelled,
    Completed,
    /// Marker for a committed edit. Never stored as a booking's lifecycle
    /// status; see [`Booking::modified`].
    Modified,
}

impl BookingStatus {
    /// The transition table. Anything not listed is rejected. `self` is the
    /// lifecycle status, so `Modified` is never a source.
    pub fn can_transition_to(self, to: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed | Cancelled | Modified)
                | (Confirmed, CheckedIn | Cancelled | Modified)
                | (CheckedIn, Completed | Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn label(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::CheckedIn => "checked_in",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
            BookingStatus::Modified => "modified",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub number: String,
    pub category_id: Ulid,
    pub room_id: Ulid,
    pub guest_id: UserId,
    pub stay: StayRange,
    pub guests: u32,
    /// `None` only for records that were never priced.
    pub total_price: Option<Decimal>,
    /// Lifecycle status: pending, confirmed, checked in, cancelled or
    /// completed. Edits leave it alone.
    pub status: BookingStatus,
    /// Set by a committed edit, cleared by the next lifecycle transition.
    pub modified: bool,
    pub extras: BTreeSet<Ulid>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Status as shown to guests and staff: `Modified` while an edit is the
    /// latest thing that happened to a pending or confirmed booking.
    pub fn display_status(&self) -> BookingStatus {
        match self.status {
            BookingStatus::Pending | BookingStatus::Confirmed if self.modified => BookingStatus::Modified,
            status => status,
        }
    }

    /// Cancelled bookings release their room.
    pub fn holds_room(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }
}

/// What an availability question is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingTarget {
    Category(Ulid),
    Room(Ulid),
}

/// A guest's request for a new booking.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub category_id: Ulid,
    /// Specific room; otherwise the first free room of the category.
    pub room_id: Option<Ulid>,
    pub guest_id: UserId,
    pub stay: StayRange,
    pub guests: u32,
    pub extras: BTreeSet<Ulid>,
}

/// Proposed edit. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct BookingChanges {
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub guests: Option<u32>,
    pub extras: Option<BTreeSet<Ulid>>,
    pub reason: Option<String>,
}

/// Result of a create or edit. Running out of rooms is an ordinary answer,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome<T> {
    Accepted(T),
    NoAvailability,
}

impl<T> BookingOutcome<T> {
    pub fn accepted(self) -> Option<T> {
        match self {
            BookingOutcome::Accepted(t) => Some(t),
            BookingOutcome::NoAvailability => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationRecord {
    pub booking_id: Ulid,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
    pub fee: Decimal,
    pub refund: Decimal,
    pub days_before_check_in: i64,
    pub fee_percent: Decimal,
    pub actor: Option<UserId>,
}

/// One changed field of one edit. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationRecord {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub at: DateTime<Utc>,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
    pub reason: Option<String>,
    pub actor: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct CategoryState {
    pub category: RoomCategory,
    /// Sorted by room number.
    pub rooms: Vec<Room>,
    /// All bookings of the category, sorted by check-in.
    pub bookings: Vec<Booking>,
}

impl CategoryState {
    pub fn new(category: RoomCategory) -> Self {
        Self {
            category,
            rooms: Vec::new(),
            bookings: Vec::new(),
        }
    }

    pub fn insert_room(&mut self, room: Room) {
        let pos = self
            .rooms
            .binary_search_by(|r| r.number.as_str().cmp(room.number.as_str()))
            .unwrap_or_else(|e| e);
        self.rooms.insert(pos, room);
    }

    pub fn room(&self, id: Ulid) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    pub fn room_mut(&mut self, id: Ulid) -> Option<&mut Room> {
        self.rooms.iter_mut().find(|r| r.id == id)
    }

    /// Insert booking maintaining sort order by check-in.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.stay.check_in(), |b| b.stay.check_in())
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// In-place access for changes that keep the check-in date.
    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Replace a booking whose dates may have moved.
    pub fn replace_booking(&mut self, booking: Booking) {
        self.remove_booking(booking.id);
        self.insert_booking(booking);
    }

    /// Bookings whose stay conflicts with `query` under the inclusive rule,
    /// regardless of status. Skips everything checking in after
    /// `query.check_out` via binary search.
    pub fn conflicting<'a>(&'a self, query: &'a StayRange) -> impl Iterator<Item = &'a Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.stay.check_in() <= query.check_out());
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.check_out() >= query.check_in())
    }
}

/// WAL record format. One event per committed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CategoryCreated {
        category: RoomCategory,
    },
    CategoryUpdated {
        category: RoomCategory,
    },
    RoomAdded {
        room: Room,
    },
    RoomStatusChanged {
        room_id: Ulid,
        category_id: Ulid,
        status: RoomStatus,
    },
    ExtraServiceSaved {
        extra: ExtraService,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingModified {
        booking: Booking,
        records: Vec<ModificationRecord>,
    },
    BookingStatusChanged {
        booking_id: Ulid,
        category_id: Ulid,
        status: BookingStatus,
    },
    BookingCancelled {
        category_id: Ulid,
        record: CancellationRecord,
    },
    /// Written by compaction: a booking with its full audit history.
    BookingRestored {
        booking: Booking,
        modifications: Vec<ModificationRecord>,
        cancellation: Option<CancellationRecord>,
    },
}

impl Event {
    /// The category whose state this event touches, if any.
    pub fn category_id(&self) -> Option<Ulid> {
        match self {
            Event::CategoryCreated { category } | Event::CategoryUpdated { category } => {
                Some(category.id)
            }
            Event::RoomAdded { room } => Some(room.category_id),
            Event::RoomStatusChanged { category_id, .. }
            | Event::BookingStatusChanged { category_id, .. }
            | Event::BookingCancelled { category_id, .. } => Some(*category_id),
            Event::BookingCreated { booking }
            | Event::BookingModified { booking, .. }
            | Event::BookingRestored { booking, .. } => Some(booking.category_id),
            Event::ExtraServiceSaved { .. } => None,
        }
    }
}
