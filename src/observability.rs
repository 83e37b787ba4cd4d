use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "spacebook_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "spacebook_command_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "spacebook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "spacebook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "spacebook_connections_rejected_total";

/// Counter: startup/auth failures.
pub const AUTH_FAILURES_TOTAL: &str = "spacebook_auth_failures_total";

// ── Booking saga ────────────────────────────────────────────────

/// Counter: bookings created. Labels: type.
pub const BOOKINGS_CREATED_TOTAL: &str = "spacebook_bookings_created_total";

/// Counter: create attempts rejected because the resource was taken. Labels: type.
pub const RESERVATIONS_REJECTED_TOTAL: &str = "spacebook_reservations_rejected_total";

/// Counter: compensating deletes after a failed flip. Labels: type, outcome.
pub const COMPENSATIONS_TOTAL: &str = "spacebook_compensations_total";

/// Counter: analytics events that could not be recorded.
pub const ANALYTICS_FAILURES_TOTAL: &str = "spacebook_analytics_failures_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::CreateBooking { .. } => "create_booking",
        Command::CancelBooking { .. } => "cancel_booking",
        Command::UpdateBooking { .. } => "update_booking",
        Command::ApproveBookings { .. } => "approve_bookings",
        Command::GetBooking { .. } => "get_booking",
        Command::ListBookings { .. } => "list_bookings",
        Command::SelectTimeSlots { .. } => "select_time_slots",
    }
}
