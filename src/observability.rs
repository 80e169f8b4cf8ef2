use std::net::SocketAddr;

use crate::command::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "fleetbook_operations_total";

/// Histogram: engine operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "fleetbook_operation_duration_seconds";

/// Counter: create/update requests rejected because the vehicle was taken.
pub const CONFLICTS_TOTAL: &str = "fleetbook_conflicts_total";

/// Histogram: time spent waiting for a vehicle's lock, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "fleetbook_lock_wait_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: vehicles known to the local directory.
pub const VEHICLES_REGISTERED: &str = "fleetbook_vehicles_registered";

/// Counter: reservations moved to Active by the background activator.
pub const RESERVATIONS_ACTIVATED_TOTAL: &str = "fleetbook_reservations_activated_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "fleetbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "fleetbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Record outcome and latency of one engine operation.
pub fn record_operation(op: &'static str, status: &'static str, started: std::time::Instant) {
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}

/// Map a driver command to a short label for metrics and logs.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::RegisterVehicle { .. } => "register_vehicle",
        Command::RetireVehicle { .. } => "retire_vehicle",
        Command::Create { .. } => "create",
        Command::Update { .. } => "update",
        Command::Cancel { .. } => "cancel",
        Command::Complete { .. } => "complete",
        Command::Activate { .. } => "activate",
        Command::Get { .. } => "get",
        Command::List { .. } => "list",
        Command::FreeWindows { .. } => "free_windows",
        Command::UpcomingMaintenance { .. } => "upcoming_maintenance",
        Command::OverdueMaintenance { .. } => "overdue_maintenance",
        Command::FuelSummary { .. } => "fuel_summary",
    }
}
