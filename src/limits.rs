use crate::model::Ms;

pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

/// A single booking may not exceed one week.
pub const MAX_BOOKING_DURATION_MS: Ms = 7 * 24 * 3_600_000;
/// Report and free-slot windows are capped at one year.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_LOCATION_LEN: usize = 256;
pub const MAX_PURPOSE_LEN: usize = 1024;
pub const MAX_REASON_LEN: usize = 1024;
pub const MAX_AMENITIES: usize = 64;
pub const MAX_AMENITY_LEN: usize = 64;
pub const MAX_ROOM_CAPACITY: u32 = 10_000;

pub const MAX_ROOMS: usize = 100_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 1_000_000;

pub const MAX_ACTIVITY_RECORDS: usize = 100_000;
