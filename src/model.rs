use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unix milliseconds. The only time type on the wire and in the core.
pub type Ms = i64;

pub type BookingId = i64;
pub type ResourceId = i64;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }
}

/// The closed set of bookable resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingType {
    Workplace,
    Parking,
}

impl BookingType {
    pub const ALL: [BookingType; 2] = [BookingType::Workplace, BookingType::Parking];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingType::Workplace => "workplace",
            BookingType::Parking => "parking",
        }
    }
}

impl fmt::Display for BookingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "workplace" => Ok(BookingType::Workplace),
            "parking" => Ok(BookingType::Parking),
            _ => Err(s.to_string()),
        }
    }
}

/// Lifecycle of a booking row. Cancellation hard-deletes the row, so there is
/// no terminal variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Working,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Working => "working",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "working" => Ok(BookingStatus::Working),
            _ => Err(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: String,
    pub resource_id: ResourceId,
    pub start_time: Ms,
    pub end_time: Ms,
    pub status: BookingStatus,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Booking {
    pub fn span(&self) -> Span {
        Span::new(self.start_time, self.end_time)
    }
}

/// A booking row before the store has assigned an id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub user_id: String,
    pub resource_id: ResourceId,
    pub start_time: Ms,
    pub end_time: Ms,
    pub status: BookingStatus,
}

/// Partial update. `None` means "leave unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingPatch {
    pub status: Option<BookingStatus>,
    pub start_time: Option<Ms>,
    pub end_time: Option<Ms>,
}

impl BookingPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.start_time.is_none() && self.end_time.is_none()
    }
}

/// Optional filters for listing bookings of one type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingQuery {
    pub user_id: Option<String>,
    pub resource_id: Option<ResourceId>,
    pub start_time: Option<Ms>,
    pub end_time: Option<Ms>,
    /// 1-based; `None` or `<= 0` means the first page.
    pub page: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingPage {
    pub bookings: Vec<Booking>,
    pub total_count: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// A contiguous interval on a resource. Busy slots come from the store,
/// free slots are derived; both share this shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: Ms,
    pub end: Ms,
    pub busy: bool,
}

impl TimeSlot {
    pub fn busy(start: Ms, end: Ms) -> Self {
        Self { start, end, busy: true }
    }

    pub fn free(start: Ms, end: Ms) -> Self {
        Self { start, end, busy: false }
    }
}

/// What the resource service reports about one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceInfo {
    pub id: ResourceId,
    pub is_available: bool,
    pub address: Option<String>,
    pub zone: Option<String>,
    pub floor: Option<i64>,
    pub number: Option<i64>,
}
