//! Hard caps on input sizes and inventory, enforced at the engine boundary.

/// Max room categories per property.
pub const MAX_CATEGORIES: usize = 1_000;

/// Max rooms in a single category.
pub const MAX_ROOMS_PER_CATEGORY: usize = 2_000;

/// Max bookings held by a single category (all statuses).
pub const MAX_BOOKINGS_PER_CATEGORY: usize = 500_000;

/// Max extra services in the catalog.
pub const MAX_EXTRA_SERVICES: usize = 10_000;

/// Max extras selected on one booking.
pub const MAX_EXTRAS_PER_BOOKING: usize = 64;

/// Max length of category, room, and extra names.
pub const MAX_NAME_LEN: usize = 256;

/// Max length of a modification or cancellation reason.
pub const MAX_REASON_LEN: usize = 4_096;

/// Max nights in a single stay.
pub const MAX_STAY_NIGHTS: i64 = 365;

/// Max guests on one booking, regardless of category occupancy.
pub const MAX_GUESTS: u32 = 64;

/// How far ahead a check-in may be placed, in days.
pub const MAX_ADVANCE_DAYS: i64 = 3 * 365;

/// Max hotel properties per process.
pub const MAX_PROPERTIES: usize = 1_024;

/// Max property name length.
pub const MAX_PROPERTY_NAME_LEN: usize = 128;
