//! Booking type → table, resource column, column whitelist and remote
//! operations. All type-keyed behaviour goes through [`route`].

use std::fmt;

use thiserror::Error;

use crate::model::{BookingType, ResourceId, ResourceInfo};
use crate::resources::{RemoteError, ResourceService};
use crate::store::{SearchField, Whitelist};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported booking type: {0}")]
pub struct UnsupportedType(pub String);

/// Remote read used to check availability before booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOp {
    WorkplaceById,
    ParkingSpaceById,
}

impl LookupOp {
    pub async fn call(
        self,
        svc: &dyn ResourceService,
        id: ResourceId,
    ) -> Result<ResourceInfo, RemoteError> {
        match self {
            LookupOp::WorkplaceById => svc.get_workplace_by_id(id).await,
            LookupOp::ParkingSpaceById => svc.get_parking_space_by_id(id).await,
        }
    }
}

/// Remote writes that flip a resource's availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipOp {
    Workplace,
    ParkingSpace,
}

impl FlipOp {
    pub async fn set_available(
        self,
        svc: &dyn ResourceService,
        id: ResourceId,
        is_available: bool,
    ) -> Result<(), RemoteError> {
        match self {
            FlipOp::Workplace => svc.update_workplace(id, is_available).await,
            FlipOp::ParkingSpace => svc.update_parking_space(id, is_available).await,
        }
    }

    /// `Ok(false)` when the resource was already taken.
    pub async fn try_reserve(
        self,
        svc: &dyn ResourceService,
        id: ResourceId,
    ) -> Result<bool, RemoteError> {
        match self {
            FlipOp::Workplace => svc.try_reserve_workplace(id).await,
            FlipOp::ParkingSpace => svc.try_reserve_parking_space(id).await,
        }
    }
}

pub struct Route {
    pub kind: BookingType,
    pub table: &'static str,
    pub resource_column: &'static str,
    pub columns: &'static Whitelist,
    pub lookup: LookupOp,
    pub flip: FlipOp,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("kind", &self.kind)
            .field("table", &self.table)
            .field("resource_column", &self.resource_column)
            .finish()
    }
}

// ── Whitelists ───────────────────────────────────────────

pub static WORKPLACE_COLUMNS: Whitelist = Whitelist::new(&[
    ("id", SearchField::same("id")),
    ("user_id", SearchField::same("user_id")),
    ("resource_id", SearchField::same("workplace_id")),
    ("start_date", SearchField::same("start_date")),
    ("end_date", SearchField::same("end_date")),
    ("status", SearchField::same("status")),
    ("created_at", SearchField::same("created_at")),
    ("updated_at", SearchField::same("updated_at")),
]);

pub static PARKING_COLUMNS: Whitelist = Whitelist::new(&[
    ("id", SearchField::same("id")),
    ("user_id", SearchField::same("user_id")),
    ("resource_id", SearchField::same("parking_space_id")),
    ("start_date", SearchField::same("start_date")),
    ("end_date", SearchField::same("end_date")),
    ("status", SearchField::same("status")),
    ("created_at", SearchField::same("created_at")),
    ("updated_at", SearchField::same("updated_at")),
]);

// ── Routes ───────────────────────────────────────────────

static WORKPLACE_ROUTE: Route = Route {
    kind: BookingType::Workplace,
    table: "booking_service.booking",
    resource_column: "workplace_id",
    columns: &WORKPLACE_COLUMNS,
    lookup: LookupOp::WorkplaceById,
    flip: FlipOp::Workplace,
};

static PARKING_ROUTE: Route = Route {
    kind: BookingType::Parking,
    table: "booking_service.parking_bookings",
    resource_column: "parking_space_id",
    columns: &PARKING_COLUMNS,
    lookup: LookupOp::ParkingSpaceById,
    flip: FlipOp::ParkingSpace,
};

pub fn route(kind: BookingType) -> &'static Route {
    match kind {
        BookingType::Workplace => &WORKPLACE_ROUTE,
        BookingType::Parking => &PARKING_ROUTE,
    }
}

pub fn resolve(tag: &str) -> Result<&'static Route, UnsupportedType> {
    tag.parse::<BookingType>()
        .map(route)
        .map_err(UnsupportedType)
}

impl BookingType {
    pub fn route(self) -> &'static Route {
        route(self)
    }
}
