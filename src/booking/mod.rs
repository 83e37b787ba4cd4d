//! Booking saga across the booking store and the resource service.
//!
//! The two sides share no transaction. Create reserves by inserting the row
//! first and then flipping the resource; when the flip fails or loses the race
//! the row is deleted again. Reads go straight to the store.

mod error;
mod mutations;
mod queries;
mod slots;

pub use error::{BookingError, ErrorKind};
pub use slots::derive_free_slots;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::analytics::{AnalyticsSink, BookingEvent};
use crate::limits::PAGE_SIZE;
use crate::resources::ResourceService;
use crate::store::BookingStore;

/// How Create marks a resource as taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlipStrategy {
    /// `try_reserve`: flip only if still available; a lost race is reported.
    #[default]
    Conditional,
    /// Unconditional `update(available = false)`. Two requests that both saw
    /// the resource free will both succeed.
    Blind,
}

impl FlipStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlipStrategy::Conditional => "conditional",
            FlipStrategy::Blind => "blind",
        }
    }
}

impl fmt::Display for FlipStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlipStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "conditional" => Ok(FlipStrategy::Conditional),
            "blind" => Ok(FlipStrategy::Blind),
            _ => Err(format!("unknown flip strategy: {s}")),
        }
    }
}

pub struct Bookings {
    store: Arc<dyn BookingStore>,
    resources: Arc<dyn ResourceService>,
    analytics: Arc<dyn AnalyticsSink>,
    strategy: FlipStrategy,
    page_size: i64,
}

impl Bookings {
    pub fn new(
        store: Arc<dyn BookingStore>,
        resources: Arc<dyn ResourceService>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            store,
            resources,
            analytics,
            strategy: FlipStrategy::default(),
            page_size: PAGE_SIZE,
        }
    }

    pub fn with_strategy(mut self, strategy: FlipStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> FlipStrategy {
        self.strategy
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    /// Best effort: a failed analytics write is logged and counted only.
    async fn emit(&self, event: BookingEvent) {
        if let Err(e) = self.analytics.record(&event).await {
            tracing::warn!(
                "analytics: dropped {} event for booking {}: {e}",
                event.action.as_str(),
                event.booking_id
            );
            metrics::counter!(crate::observability::ANALYTICS_FAILURES_TOTAL).increment(1);
        }
    }
}
