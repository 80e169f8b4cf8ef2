//! Read-only reporting over caller-supplied maintenance and fuel records.
//!
//! Everything here is synchronous and pure: the advisor never touches the
//! reservation store.

mod fuel;
mod maintenance;

pub use fuel::monthly_fuel_summary;
pub use maintenance::{overdue_maintenance, upcoming_maintenance};

use thiserror::Error;
use ulid::Ulid;

use crate::model::{MaintenanceStatus, Ms};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdvisorError {
    #[error("invalid window: {0}")]
    InvalidWindow(&'static str),
    #[error("timestamp out of range: {0}")]
    InvalidTimestamp(Ms),
    #[error("odometer went backwards on {resource_id} at {at}: {previous} -> {reading}")]
    OdometerRegression {
        resource_id: Ulid,
        at: Ms,
        previous: f64,
        reading: f64,
    },
    #[error("invalid maintenance transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: Ulid,
        from: MaintenanceStatus,
        to: MaintenanceStatus,
    },
}
