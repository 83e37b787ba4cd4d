use tracing::{error, info, warn};

use crate::analytics::{BookingAction, BookingEvent};
use crate::limits::*;
use crate::model::*;
use crate::observability::{BOOKINGS_CREATED_TOTAL, COMPENSATIONS_TOTAL, RESERVATIONS_REJECTED_TOTAL};
use crate::resolver::Route;
use crate::store::{Field, Filter, Limits, SqlValue, fields};

use super::{BookingError, Bookings, FlipStrategy};

fn validate_span(span: Span) -> Result<(), BookingError> {
    if !span.is_valid() {
        return Err(BookingError::Validation(format!(
            "start_time {} must be before end_time {}",
            span.start, span.end
        )));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(BookingError::Validation("timestamp out of range".into()));
    }
    Ok(())
}

fn validate_new(req: &NewBooking) -> Result<(), BookingError> {
    if req.user_id.is_empty() {
        return Err(BookingError::Validation("user_id is required".into()));
    }
    if req.user_id.len() > MAX_USER_ID_LEN {
        return Err(BookingError::Validation("user_id too long".into()));
    }
    validate_span(Span::new(req.start_time, req.end_time))
}

fn not_found(kind: BookingType, id: BookingId) -> BookingError {
    BookingError::NotFound(format!("{kind} booking {id}"))
}

impl Bookings {
    /// Check availability, insert the row, then flip the resource. A failed or
    /// lost flip deletes the row again before the error is returned.
    pub async fn create(&self, kind: BookingType, req: NewBooking) -> Result<Booking, BookingError> {
        validate_new(&req)?;
        let route = kind.route();

        let info = route
            .lookup
            .call(self.resources.as_ref(), req.resource_id)
            .await
            .inspect_err(|e| warn!("create: lookup of {kind} {} failed: {e}", req.resource_id))?;
        if !info.is_available {
            warn!("create: {kind} {} is not available", req.resource_id);
            metrics::counter!(RESERVATIONS_REJECTED_TOTAL, "type" => kind.as_str()).increment(1);
            return Err(BookingError::ResourceUnavailable(req.resource_id));
        }

        let booking = self.store.insert(route, &req).await?;

        if let Err(e) = self.flip_taken(route, req.resource_id).await {
            if matches!(e, BookingError::ResourceUnavailable(_)) {
                metrics::counter!(RESERVATIONS_REJECTED_TOTAL, "type" => kind.as_str())
                    .increment(1);
            }
            self.compensate(route, &booking).await;
            return Err(e);
        }

        info!(
            "created {kind} booking {} on resource {} for {}",
            booking.id, booking.resource_id, booking.user_id
        );
        metrics::counter!(BOOKINGS_CREATED_TOTAL, "type" => kind.as_str()).increment(1);
        self.emit(BookingEvent::new(BookingAction::Created, kind, &booking, Some(&info)))
            .await;
        Ok(booking)
    }

    async fn flip_taken(&self, route: &Route, resource_id: ResourceId) -> Result<(), BookingError> {
        let svc = self.resources.as_ref();
        match self.strategy {
            FlipStrategy::Conditional => match route.flip.try_reserve(svc, resource_id).await {
                Ok(true) => Ok(()),
                Ok(false) => {
                    warn!("create: {} {resource_id} taken concurrently", route.kind);
                    Err(BookingError::ResourceUnavailable(resource_id))
                }
                Err(e) => {
                    warn!("create: reserving {} {resource_id} failed: {e}", route.kind);
                    Err(BookingError::RemoteUnavailable(e))
                }
            },
            FlipStrategy::Blind => route
                .flip
                .set_available(svc, resource_id, false)
                .await
                .map_err(|e| {
                    warn!("create: flipping {} {resource_id} failed: {e}", route.kind);
                    BookingError::RemoteUnavailable(e)
                }),
        }
    }

    /// Undo an insert whose flip did not go through. Failure here leaves an
    /// orphaned row; it is logged and counted but does not replace the
    /// caller's error.
    async fn compensate(&self, route: &Route, booking: &Booking) {
        let kind = route.kind.as_str();
        match self.store.delete(route, booking.id).await {
            Ok(_) => {
                info!("compensated: removed {kind} booking {}", booking.id);
                metrics::counter!(COMPENSATIONS_TOTAL, "type" => kind, "outcome" => "ok")
                    .increment(1);
            }
            Err(e) => {
                error!(
                    "orphaned {kind} booking {} on resource {}: compensating delete failed: {e}",
                    booking.id, booking.resource_id
                );
                metrics::counter!(COMPENSATIONS_TOTAL, "type" => kind, "outcome" => "failed")
                    .increment(1);
            }
        }
    }

    /// Release the resource, then hard-delete the row. Returns the removed row.
    pub async fn cancel(&self, kind: BookingType, id: BookingId) -> Result<Booking, BookingError> {
        let route = kind.route();
        let booking = self
            .store
            .get(route, id)
            .await?
            .ok_or_else(|| not_found(kind, id))?;

        route
            .flip
            .set_available(self.resources.as_ref(), booking.resource_id, true)
            .await
            .inspect_err(|e| {
                warn!("cancel: releasing {kind} {} failed: {e}", booking.resource_id)
            })?;

        // A concurrent cancel may have removed the row in between.
        if !self.store.delete(route, id).await? {
            return Err(not_found(kind, id));
        }

        info!("cancelled {kind} booking {id}");
        self.emit(BookingEvent::new(BookingAction::Cancelled, kind, &booking, None))
            .await;
        Ok(booking)
    }

    /// Partial update. Only present fields are written, plus `updated_at`.
    pub async fn update(
        &self,
        kind: BookingType,
        id: BookingId,
        patch: BookingPatch,
    ) -> Result<Booking, BookingError> {
        let route = kind.route();
        let current = self
            .store
            .get(route, id)
            .await?
            .ok_or_else(|| not_found(kind, id))?;
        if patch.is_empty() {
            return Ok(current);
        }

        validate_span(Span::new(
            patch.start_time.unwrap_or(current.start_time),
            patch.end_time.unwrap_or(current.end_time),
        ))?;

        let mut set = Vec::with_capacity(4);
        if let Some(status) = patch.status {
            set.push(Field::new(fields::STATUS, SqlValue::Text(status.as_str().into())));
        }
        if let Some(start) = patch.start_time {
            set.push(Field::new(fields::START_DATE, SqlValue::Time(start)));
        }
        if let Some(end) = patch.end_time {
            set.push(Field::new(fields::END_DATE, SqlValue::Time(end)));
        }
        set.push(Field::new(fields::UPDATED_AT, SqlValue::Time(now_ms())));

        let updated = self
            .store
            .update(route, id, &set)
            .await?
            .ok_or_else(|| not_found(kind, id))?;
        info!("updated {kind} booking {id}");
        Ok(updated)
    }

    /// Mark every booking of the tagged workplace as `working`. Returns how
    /// many rows were approved.
    ///
    /// The tag lookup and the status write are separate calls; a concurrent
    /// create or cancel on the same workplace between them is not excluded.
    pub async fn approve(&self, unique_tag: &str) -> Result<u64, BookingError> {
        if unique_tag.is_empty() {
            return Err(BookingError::Validation("unique_tag is required".into()));
        }
        if unique_tag.len() > MAX_UNIQUE_TAG_LEN {
            return Err(BookingError::Validation("unique_tag too long".into()));
        }

        let info = self
            .resources
            .get_workplace_by_unique_tag(unique_tag)
            .await
            .inspect_err(|e| warn!("approve: lookup of tag {unique_tag} failed: {e}"))?;

        let kind = BookingType::Workplace;
        let route = kind.route();
        let working = SqlValue::Text(BookingStatus::Working.as_str().into());
        let set = [
            Field::new(fields::STATUS, working.clone()),
            Field::new(fields::UPDATED_AT, SqlValue::Time(now_ms())),
        ];
        let approved = self.store.update_by_resource(route, info.id, &set).await?;
        if approved == 0 {
            return Err(BookingError::NotFound(format!(
                "bookings for workplace {unique_tag}"
            )));
        }
        info!("approved {approved} booking(s) on workplace {unique_tag}");

        let filters = [
            Filter::eq(fields::RESOURCE_ID, SqlValue::Int(info.id)),
            Filter::eq(fields::STATUS, working),
        ];
        let window = Limits {
            offset: 0,
            limit: approved as i64,
        };
        match self.store.list(route, &filters, window).await {
            Ok((rows, _)) => {
                for booking in &rows {
                    self.emit(BookingEvent::new(
                        BookingAction::Approved,
                        kind,
                        booking,
                        Some(&info),
                    ))
                    .await;
                }
            }
            Err(e) => warn!("approve: analytics read-back failed: {e}"),
        }
        Ok(approved)
    }
}
