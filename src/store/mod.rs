//! Booking row persistence. Every statement is assembled from a resolver
//! [`Route`] and the clause builder; nothing else contributes SQL text.

pub mod clause;
mod memory;
pub mod pagination;
mod postgres;

pub use clause::{
    Clause, ClauseError, Cmp, Field, Filter, SearchField, SqlValue, Whitelist, build_set,
    build_where, order_by,
};
pub use memory::InMemoryBookingStore;
pub use pagination::Limits;
pub use postgres::PgBookingStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Booking, BookingId, NewBooking, ResourceId, Span, TimeSlot};
use crate::resolver::Route;

/// Logical field names understood by every booking whitelist.
pub mod fields {
    pub const ID: &str = "id";
    pub const USER_ID: &str = "user_id";
    pub const RESOURCE_ID: &str = "resource_id";
    pub const START_DATE: &str = "start_date";
    pub const END_DATE: &str = "end_date";
    pub const STATUS: &str = "status";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Clause(#[from] ClauseError),
    #[error("database error: {0}")]
    Database(String),
    #[error("unexpected row: {0}")]
    Decode(String),
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, route: &Route, booking: &NewBooking) -> Result<Booking, StoreError>;

    async fn get(&self, route: &Route, id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// One page of rows matching every filter, ordered by id, plus the
    /// unpaginated match count.
    async fn list(
        &self,
        route: &Route,
        filters: &[Filter],
        window: Limits,
    ) -> Result<(Vec<Booking>, i64), StoreError>;

    /// Apply `fields` to one row. `None` when the row does not exist.
    async fn update(
        &self,
        route: &Route,
        id: BookingId,
        fields: &[Field],
    ) -> Result<Option<Booking>, StoreError>;

    /// `false` when no row matched.
    async fn delete(&self, route: &Route, id: BookingId) -> Result<bool, StoreError>;

    /// Apply `fields` to every booking of a resource; returns rows touched.
    async fn update_by_resource(
        &self,
        route: &Route,
        resource_id: ResourceId,
        fields: &[Field],
    ) -> Result<u64, StoreError>;

    /// Bookings of a resource lying inside `window`, as busy slots ordered by start.
    async fn busy_slots(
        &self,
        route: &Route,
        resource_id: ResourceId,
        window: Span,
    ) -> Result<Vec<TimeSlot>, StoreError>;
}

/// Predicates selecting bookings of `resource_id` that lie inside `window`.
pub(crate) fn busy_filters(resource_id: ResourceId, window: Span) -> [Filter; 3] {
    [
        Filter::eq(fields::RESOURCE_ID, SqlValue::Int(resource_id)),
        Filter::gte(fields::START_DATE, SqlValue::Time(window.start)),
        Filter::lte(fields::END_DATE, SqlValue::Time(window.end)),
    ]
}
