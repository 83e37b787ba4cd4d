use crate::limits::{DAY_MS, MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS};
use crate::model::*;
use crate::store::pagination::{limits, normalize_page, total_pages};
use crate::store::{Filter, SqlValue, fields};

use super::{BookingError, Bookings, derive_free_slots};

impl Bookings {
    pub async fn get_by_id(&self, kind: BookingType, id: BookingId) -> Result<Booking, BookingError> {
        self.store
            .get(kind.route(), id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("{kind} booking {id}")))
    }

    /// One page of bookings matching every present filter, ordered by id.
    pub async fn get_bookings(
        &self,
        kind: BookingType,
        query: BookingQuery,
    ) -> Result<BookingPage, BookingError> {
        if let (Some(start), Some(end)) = (query.start_time, query.end_time)
            && start > end
        {
            return Err(BookingError::Validation(
                "start_time filter is after end_time filter".into(),
            ));
        }

        let mut filters = Vec::with_capacity(4);
        if let Some(user_id) = query.user_id {
            filters.push(Filter::eq(fields::USER_ID, SqlValue::Text(user_id)));
        }
        if let Some(resource_id) = query.resource_id {
            filters.push(Filter::eq(fields::RESOURCE_ID, SqlValue::Int(resource_id)));
        }
        if let Some(start) = query.start_time {
            filters.push(Filter::gte(fields::START_DATE, SqlValue::Time(start)));
        }
        if let Some(end) = query.end_time {
            filters.push(Filter::lte(fields::END_DATE, SqlValue::Time(end)));
        }

        let page = normalize_page(query.page);
        let window = limits(page, self.page_size)
            .ok_or_else(|| BookingError::Validation(format!("page {page} is out of range")))?;
        let (bookings, total_count) = self.store.list(kind.route(), &filters, window).await?;

        Ok(BookingPage {
            bookings,
            total_count,
            page,
            page_size: self.page_size,
            total_pages: total_pages(total_count, self.page_size),
        })
    }

    /// Bookings of one resource within `[date, date + 24h)`, followed by the
    /// free gaps between them.
    pub async fn time_slots(
        &self,
        kind: BookingType,
        resource_id: ResourceId,
        date: Ms,
    ) -> Result<Vec<TimeSlot>, BookingError> {
        if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&date) {
            return Err(BookingError::Validation(format!("date {date} out of range")));
        }
        let window = Span::new(date, date + DAY_MS);
        let busy = self.store.busy_slots(kind.route(), resource_id, window).await?;
        Ok(derive_free_slots(&busy))
    }
}
