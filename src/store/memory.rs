use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::*;
use crate::resolver::Route;

use super::{
    BookingStore, Field, Filter, Limits, SqlValue, StoreError, build_set, build_where,
    busy_filters, fields,
};

/// Process-local booking rows, keyed by (table, id). Names go through the same
/// whitelist as the SQL store, so both backends accept and reject the same
/// requests.
pub struct InMemoryBookingStore {
    rows: DashMap<(&'static str, BookingId), Booking>,
    next_id: AtomicI64,
}

impl Default for InMemoryBookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn row_count(&self, route: &Route) -> usize {
        self.rows.iter().filter(|e| e.key().0 == route.table).count()
    }

    fn matching(&self, route: &Route, filters: &[Filter]) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .rows
            .iter()
            .filter(|e| e.key().0 == route.table)
            .filter(|e| filters.iter().all(|f| matches(e.value(), f)))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|b| b.id);
        out
    }
}

// ── Field access ─────────────────────────────────────────

fn value_of(b: &Booking, name: &str) -> Option<SqlValue> {
    Some(match name {
        fields::ID => SqlValue::Int(b.id),
        fields::USER_ID => SqlValue::Text(b.user_id.clone()),
        fields::RESOURCE_ID => SqlValue::Int(b.resource_id),
        fields::START_DATE => SqlValue::Time(b.start_time),
        fields::END_DATE => SqlValue::Time(b.end_time),
        fields::STATUS => SqlValue::Text(b.status.as_str().to_string()),
        fields::CREATED_AT => SqlValue::Time(b.created_at),
        fields::UPDATED_AT => SqlValue::Time(b.updated_at),
        _ => return None,
    })
}

fn matches(b: &Booking, filter: &Filter) -> bool {
    value_of(b, &filter.name)
        .and_then(|v| v.compare(&filter.value))
        .is_some_and(|ord| filter.op.matches(ord))
}

fn assign(b: &mut Booking, field: &Field) -> Result<(), StoreError> {
    let mismatch = || StoreError::Database(format!("column {} rejects {:?}", field.name, field.value));
    match (field.name.as_str(), &field.value) {
        (fields::USER_ID, SqlValue::Text(v)) => b.user_id = v.clone(),
        (fields::RESOURCE_ID, SqlValue::Int(v)) => b.resource_id = *v,
        (fields::START_DATE, SqlValue::Time(v)) => b.start_time = *v,
        (fields::END_DATE, SqlValue::Time(v)) => b.end_time = *v,
        (fields::STATUS, SqlValue::Text(v)) => b.status = v.parse().map_err(|_| mismatch())?,
        (fields::CREATED_AT, SqlValue::Time(v)) => b.created_at = *v,
        (fields::UPDATED_AT, SqlValue::Time(v)) => b.updated_at = *v,
        _ => return Err(mismatch()),
    }
    Ok(())
}

fn apply_all(b: &Booking, fields: &[Field]) -> Result<Booking, StoreError> {
    let mut next = b.clone();
    for field in fields {
        assign(&mut next, field)?;
    }
    Ok(next)
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert(&self, route: &Route, booking: &NewBooking) -> Result<Booking, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = now_ms();
        let row = Booking {
            id,
            user_id: booking.user_id.clone(),
            resource_id: booking.resource_id,
            start_time: booking.start_time,
            end_time: booking.end_time,
            status: booking.status,
            created_at: now,
            updated_at: now,
        };
        self.rows.insert((route.table, id), row.clone());
        Ok(row)
    }

    async fn get(&self, route: &Route, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.rows.get(&(route.table, id)).map(|e| e.value().clone()))
    }

    async fn list(
        &self,
        route: &Route,
        filters: &[Filter],
        window: Limits,
    ) -> Result<(Vec<Booking>, i64), StoreError> {
        build_where(route.columns, filters, 1)?;
        let all = self.matching(route, filters);
        let total = all.len() as i64;
        let page = all
            .into_iter()
            .skip(window.offset.max(0) as usize)
            .take(window.limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn update(
        &self,
        route: &Route,
        id: BookingId,
        fields: &[Field],
    ) -> Result<Option<Booking>, StoreError> {
        build_set(route.columns, fields, 1)?;
        let Some(mut entry) = self.rows.get_mut(&(route.table, id)) else {
            return Ok(None);
        };
        let next = apply_all(entry.value(), fields)?;
        *entry = next.clone();
        Ok(Some(next))
    }

    async fn delete(&self, route: &Route, id: BookingId) -> Result<bool, StoreError> {
        Ok(self.rows.remove(&(route.table, id)).is_some())
    }

    async fn update_by_resource(
        &self,
        route: &Route,
        resource_id: ResourceId,
        fields: &[Field],
    ) -> Result<u64, StoreError> {
        build_set(route.columns, fields, 1)?;
        let mut touched = 0;
        for mut entry in self.rows.iter_mut() {
            if entry.key().0 != route.table || entry.value().resource_id != resource_id {
                continue;
            }
            let next = apply_all(entry.value(), fields)?;
            *entry.value_mut() = next;
            touched += 1;
        }
        Ok(touched)
    }

    async fn busy_slots(
        &self,
        route: &Route,
        resource_id: ResourceId,
        window: Span,
    ) -> Result<Vec<TimeSlot>, StoreError> {
        let filters = busy_filters(resource_id, window);
        build_where(route.columns, &filters, 1)?;
        let mut rows = self.matching(route, &filters);
        rows.sort_by_key(|b| (b.start_time, b.id));
        Ok(rows
            .into_iter()
            .map(|b| TimeSlot::busy(b.start_time, b.end_time))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::route;
    use crate::store::ClauseError;

    fn new_booking(resource_id: ResourceId, start: Ms, end: Ms) -> NewBooking {
        NewBooking {
            user_id: "u1".into(),
            resource_id,
            start_time: start,
            end_time: end,
            status: BookingStatus::Pending,
        }
    }

    #[tokio::test]
    async fn tables_are_isolated() {
        let store = InMemoryBookingStore::new();
        let desk = route(BookingType::Workplace);
        let car = route(BookingType::Parking);
        let b = store.insert(desk, &new_booking(1, 10, 20)).await.unwrap();
        assert!(store.get(desk, b.id).await.unwrap().is_some());
        assert!(store.get(car, b.id).await.unwrap().is_none());
        assert!(!store.delete(car, b.id).await.unwrap());
        assert_eq!(store.row_count(desk), 1);
    }

    #[tokio::test]
    async fn list_filters_and_pages() {
        let store = InMemoryBookingStore::new();
        let desk = route(BookingType::Workplace);
        for i in 0..15 {
            store.insert(desk, &new_booking(i % 2, i * 100, i * 100 + 50)).await.unwrap();
        }
        let filters = [Filter::eq(fields::RESOURCE_ID, SqlValue::Int(0))];
        let (rows, total) = store
            .list(desk, &filters, Limits { offset: 0, limit: 5 })
            .await
            .unwrap();
        assert_eq!(total, 8);
        assert_eq!(rows.len(), 5);
        assert!(rows.windows(2).all(|w| w[0].id < w[1].id));

        let (rows, _) = store
            .list(desk, &filters, Limits { offset: 5, limit: 5 })
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn unknown_filter_rejected() {
        let store = InMemoryBookingStore::new();
        let desk = route(BookingType::Workplace);
        let filters = [Filter::eq("workplace_id", SqlValue::Int(0))];
        let err = store
            .list(desk, &filters, Limits { offset: 0, limit: 5 })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Clause(ClauseError::UnknownField(_))));
    }

    #[tokio::test]
    async fn update_applies_fields() {
        let store = InMemoryBookingStore::new();
        let desk = route(BookingType::Workplace);
        let b = store.insert(desk, &new_booking(1, 10, 20)).await.unwrap();
        let fields = [
            Field::new(fields::STATUS, SqlValue::Text("working".into())),
            Field::new(fields::END_DATE, SqlValue::Time(30)),
        ];
        let updated = store.update(desk, b.id, &fields).await.unwrap().unwrap();
        assert_eq!(updated.status, BookingStatus::Working);
        assert_eq!(updated.end_time, 30);
        assert!(store.update(desk, 999, &fields).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_by_resource_counts_rows() {
        let store = InMemoryBookingStore::new();
        let desk = route(BookingType::Workplace);
        store.insert(desk, &new_booking(1, 10, 20)).await.unwrap();
        store.insert(desk, &new_booking(1, 30, 40)).await.unwrap();
        store.insert(desk, &new_booking(2, 10, 20)).await.unwrap();
        let fields = [Field::new(fields::STATUS, SqlValue::Text("working".into()))];
        assert_eq!(store.update_by_resource(desk, 1, &fields).await.unwrap(), 2);
        assert_eq!(store.update_by_resource(desk, 7, &fields).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn busy_slots_in_window_ordered_by_start() {
        let store = InMemoryBookingStore::new();
        let desk = route(BookingType::Workplace);
        store.insert(desk, &new_booking(1, 500, 600)).await.unwrap();
        store.insert(desk, &new_booking(1, 100, 200)).await.unwrap();
        store.insert(desk, &new_booking(1, 900, 1200)).await.unwrap();
        store.insert(desk, &new_booking(2, 300, 400)).await.unwrap();
        let slots = store.busy_slots(desk, 1, Span::new(0, 1000)).await.unwrap();
        assert_eq!(slots, vec![TimeSlot::busy(100, 200), TimeSlot::busy(500, 600)]);
    }
}
