use crate::model::Ms;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 86_400_000;

/// Rows per page for booking listings. Process-wide.
pub const PAGE_SIZE: i64 = 10;

pub const MAX_USER_ID_LEN: usize = 256;
pub const MAX_UNIQUE_TAG_LEN: usize = 256;

/// 2000-01-01T00:00:00Z .. 2100-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
