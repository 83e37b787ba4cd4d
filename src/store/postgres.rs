use async_trait::async_trait;
use tokio_postgres::{Client, Row};

use crate::model::*;
use crate::pg::{as_params, ms_to_system_time, system_time_to_ms};
use crate::resolver::Route;

use super::{
    BookingStore, Field, Filter, Limits, SqlValue, StoreError, build_set, build_where,
    busy_filters, fields, order_by,
};

/// Booking rows in Postgres. Table and column names come from the route; all
/// values are bound as `$n` parameters.
pub struct PgBookingStore {
    client: Client,
}

impl PgBookingStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(crate::pg::connect(url).await?))
    }
}

fn select_list(route: &Route) -> String {
    format!(
        "id, user_id, {}, start_date, end_date, status, created_at, updated_at",
        route.resource_column
    )
}

fn decode(row: &Row) -> Result<Booking, StoreError> {
    let shape = |e: tokio_postgres::Error| StoreError::Decode(e.to_string());
    let status: String = row.try_get(5).map_err(shape)?;
    Ok(Booking {
        id: row.try_get(0).map_err(shape)?,
        user_id: row.try_get(1).map_err(shape)?,
        resource_id: row.try_get(2).map_err(shape)?,
        start_time: system_time_to_ms(row.try_get(3).map_err(shape)?),
        end_time: system_time_to_ms(row.try_get(4).map_err(shape)?),
        status: status
            .parse()
            .map_err(|s| StoreError::Decode(format!("unknown status {s}")))?,
        created_at: system_time_to_ms(row.try_get(6).map_err(shape)?),
        updated_at: system_time_to_ms(row.try_get(7).map_err(shape)?),
    })
}

fn where_sql(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!(" WHERE {text}")
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert(&self, route: &Route, booking: &NewBooking) -> Result<Booking, StoreError> {
        let sql = format!(
            "INSERT INTO {} (user_id, {}, start_date, end_date, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, now(), now()) RETURNING {}",
            route.table,
            route.resource_column,
            select_list(route)
        );
        let start = ms_to_system_time(booking.start_time);
        let end = ms_to_system_time(booking.end_time);
        let row = self
            .client
            .query_one(
                &sql,
                &[
                    &booking.user_id,
                    &booking.resource_id,
                    &start,
                    &end,
                    &booking.status.as_str(),
                ],
            )
            .await?;
        decode(&row)
    }

    async fn get(&self, route: &Route, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let clause = build_where(route.columns, &[Filter::eq(fields::ID, SqlValue::Int(id))], 1)?;
        let sql = format!(
            "SELECT {} FROM {}{}",
            select_list(route),
            route.table,
            where_sql(&clause.text)
        );
        let row = self.client.query_opt(&sql, &as_params(&clause.params)).await?;
        row.as_ref().map(decode).transpose()
    }

    async fn list(
        &self,
        route: &Route,
        filters: &[Filter],
        window: Limits,
    ) -> Result<(Vec<Booking>, i64), StoreError> {
        let clause = build_where(route.columns, filters, 1)?;
        let predicate = where_sql(&clause.text);
        let order = order_by(route.columns, fields::ID, false)?;

        let count_sql = format!("SELECT count(*) FROM {}{}", route.table, predicate);
        let count: i64 = self
            .client
            .query_one(&count_sql, &as_params(&clause.params))
            .await?
            .try_get(0)
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        let next = clause.next_placeholder(1);
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {} LIMIT ${} OFFSET ${}",
            select_list(route),
            route.table,
            predicate,
            order,
            next,
            next + 1
        );
        let mut params = clause.params.clone();
        params.push(SqlValue::Int(window.limit));
        params.push(SqlValue::Int(window.offset));
        let rows = self.client.query(&sql, &as_params(&params)).await?;
        let bookings = rows.iter().map(decode).collect::<Result<Vec<_>, _>>()?;
        Ok((bookings, count))
    }

    async fn update(
        &self,
        route: &Route,
        id: BookingId,
        fields: &[Field],
    ) -> Result<Option<Booking>, StoreError> {
        let set = build_set(route.columns, fields, 1)?;
        let key = build_where(
            route.columns,
            &[Filter::eq(fields::ID, SqlValue::Int(id))],
            set.next_placeholder(1),
        )?;
        let sql = format!(
            "UPDATE {} SET {}{} RETURNING {}",
            route.table,
            set.text,
            where_sql(&key.text),
            select_list(route)
        );
        let params: Vec<SqlValue> = set.params.into_iter().chain(key.params).collect();
        let row = self.client.query_opt(&sql, &as_params(&params)).await?;
        row.as_ref().map(decode).transpose()
    }

    async fn delete(&self, route: &Route, id: BookingId) -> Result<bool, StoreError> {
        let clause = build_where(route.columns, &[Filter::eq(fields::ID, SqlValue::Int(id))], 1)?;
        let sql = format!("DELETE FROM {}{}", route.table, where_sql(&clause.text));
        let n = self.client.execute(&sql, &as_params(&clause.params)).await?;
        Ok(n > 0)
    }

    async fn update_by_resource(
        &self,
        route: &Route,
        resource_id: ResourceId,
        fields: &[Field],
    ) -> Result<u64, StoreError> {
        let set = build_set(route.columns, fields, 1)?;
        let key = build_where(
            route.columns,
            &[Filter::eq(fields::RESOURCE_ID, SqlValue::Int(resource_id))],
            set.next_placeholder(1),
        )?;
        let sql = format!("UPDATE {} SET {}{}", route.table, set.text, where_sql(&key.text));
        let params: Vec<SqlValue> = set.params.into_iter().chain(key.params).collect();
        Ok(self.client.execute(&sql, &as_params(&params)).await?)
    }

    async fn busy_slots(
        &self,
        route: &Route,
        resource_id: ResourceId,
        window: Span,
    ) -> Result<Vec<TimeSlot>, StoreError> {
        let clause = build_where(route.columns, &busy_filters(resource_id, window), 1)?;
        let start = order_by(route.columns, fields::START_DATE, false)?;
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {}",
            select_list(route),
            route.table,
            where_sql(&clause.text),
            start
        );
        let rows = self.client.query(&sql, &as_params(&clause.params)).await?;
        rows.iter()
            .map(|row| decode(row).map(|b| TimeSlot::busy(b.start_time, b.end_time)))
            .collect()
    }
}
