//! Best-effort booking event feed. A failed write is logged and counted; it
//! never fails the booking operation that produced it.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio_postgres::Client;

use crate::limits::MINUTE_MS;
use crate::model::*;
use crate::pg::ms_to_system_time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingAction {
    Created,
    Cancelled,
    Approved,
}

impl BookingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingAction::Created => "created",
            BookingAction::Cancelled => "cancelled",
            BookingAction::Approved => "approved",
        }
    }
}

/// One denormalised row of the analytics feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingEvent {
    pub action: BookingAction,
    pub booking_id: BookingId,
    pub booking_type: BookingType,
    pub booking_status: BookingStatus,
    pub resource_id: ResourceId,
    pub user_id: String,
    pub address: Option<String>,
    pub zone: Option<String>,
    pub floor: Option<i64>,
    pub number: Option<i64>,
    pub start_time: Ms,
    pub end_time: Ms,
    pub duration_minutes: i64,
    pub event_time: Ms,
}

impl BookingEvent {
    pub fn new(
        action: BookingAction,
        kind: BookingType,
        booking: &Booking,
        resource: Option<&ResourceInfo>,
    ) -> Self {
        Self {
            action,
            booking_id: booking.id,
            booking_type: kind,
            booking_status: booking.status,
            resource_id: booking.resource_id,
            user_id: booking.user_id.clone(),
            address: resource.and_then(|r| r.address.clone()),
            zone: resource.and_then(|r| r.zone.clone()),
            floor: resource.and_then(|r| r.floor),
            number: resource.and_then(|r| r.number),
            start_time: booking.start_time,
            end_time: booking.end_time,
            duration_minutes: booking.span().duration_ms() / MINUTE_MS,
            event_time: now_ms(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("analytics database: {0}")]
    Database(#[from] tokio_postgres::Error),
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, event: &BookingEvent) -> Result<(), AnalyticsError>;
}

/// Discards everything.
pub struct NoopSink;

#[async_trait]
impl AnalyticsSink for NoopSink {
    async fn record(&self, _event: &BookingEvent) -> Result<(), AnalyticsError> {
        Ok(())
    }
}

/// Emits each event as a JSON log line on the `analytics` target.
pub struct TracingSink;

#[async_trait]
impl AnalyticsSink for TracingSink {
    async fn record(&self, event: &BookingEvent) -> Result<(), AnalyticsError> {
        let json = serde_json::to_string(event)?;
        tracing::info!(target: "analytics", "{json}");
        Ok(())
    }
}

pub struct PgAnalyticsSink {
    client: Client,
}

impl PgAnalyticsSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(url: &str) -> Result<Self, AnalyticsError> {
        Ok(Self::new(crate::pg::connect(url).await?))
    }
}

const INSERT_EVENT: &str = "INSERT INTO booking_analytics \
    (action, booking_id, booking_type, booking_status, resource_id, user_id, \
     address, zone, floor, number, start_time, end_time, duration_minutes, \
     event_time, event_date) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, ($14::timestamptz)::date)";

#[async_trait]
impl AnalyticsSink for PgAnalyticsSink {
    async fn record(&self, e: &BookingEvent) -> Result<(), AnalyticsError> {
        let start = ms_to_system_time(e.start_time);
        let end = ms_to_system_time(e.end_time);
        let at = ms_to_system_time(e.event_time);
        self.client
            .execute(
                INSERT_EVENT,
                &[
                    &e.action.as_str(),
                    &e.booking_id,
                    &e.booking_type.as_str(),
                    &e.booking_status.as_str(),
                    &e.resource_id,
                    &e.user_id,
                    &e.address,
                    &e.zone,
                    &e.floor,
                    &e.number,
                    &start,
                    &end,
                    &e.duration_minutes,
                    &at,
                ],
            )
            .await?;
        Ok(())
    }
}
