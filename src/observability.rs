use std::net::SocketAddr;

use crate::sql::Command;

// ── Request metrics ─────────────────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "venuebook_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "venuebook_query_duration_seconds";

// ── Booking outcomes ────────────────────────────────────────────

/// Counter: reservations committed.
pub const RESERVATIONS_CONFIRMED_TOTAL: &str = "venuebook_reservations_confirmed_total";

/// Counter: confirmations that lost a race. Labels: stage (`snapshot` or `store`).
pub const RESERVATION_CONFLICTS_TOTAL: &str = "venuebook_reservation_conflicts_total";

/// Histogram: venues offered per availability query.
pub const AVAILABLE_VENUES: &str = "venuebook_available_venues";

// ── Resources ───────────────────────────────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "venuebook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "venuebook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "venuebook_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "venuebook_wal_flush_duration_seconds";

/// Histogram: changes per WAL flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "venuebook_wal_flush_batch_size";

/// Counter: WAL compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "venuebook_wal_compactions_total";

/// Install the Prometheus exporter on `port`. Does nothing without a port.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertVenue { .. } => "insert_venue",
        Command::InsertZone { .. } => "insert_zone",
        Command::InsertEvent { .. } => "insert_event",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::RescheduleReservation { .. } => "reschedule_reservation",
        Command::DeleteVenue { .. } => "delete_venue",
        Command::DeleteZone { .. } => "delete_zone",
        Command::DeleteEvent { .. } => "delete_event",
        Command::DeleteReservation { .. } => "delete_reservation",
        Command::SelectVenues => "select_venues",
        Command::SelectZones { .. } => "select_zones",
        Command::SelectEvents => "select_events",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectZoneAvailability { .. } => "select_zone_availability",
    }
}
