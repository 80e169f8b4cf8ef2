use crate::model::Ms;

pub const DAY_MS: Ms = 86_400_000;

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

/// Longest single reservation (long-term driver assignments included).
pub const MAX_RESERVATION_DURATION_MS: Ms = 366 * DAY_MS;

/// Widest window accepted by listing and free-window queries.
pub const MAX_QUERY_WINDOW_MS: Ms = 3 * 366 * DAY_MS;

/// Cap on Scheduled + Active reservations per vehicle.
pub const MAX_RESERVATIONS_PER_RESOURCE: usize = 100_000;

/// How long Canceled and Completed reservations survive compaction after
/// they end.
pub const TERMINAL_RETENTION_MS: Ms = 366 * DAY_MS;
pub const MAX_HOLDER_LEN: usize = 256;
pub const MAX_PURPOSE_LEN: usize = 256;

/// Upper bound for the advisor's rolling maintenance window.
pub const MAX_WINDOW_DAYS: u32 = 3_660;
