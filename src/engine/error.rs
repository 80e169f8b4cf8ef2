use thiserror::Error;
use ulid::Ulid;

use crate::model::{InvalidInterval, Ms, Reservation, ReservationStatus};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid interval [{start}, {end}): start must be before end")]
    InvalidInterval { start: Ms, end: Ms },
    /// Every holding reservation that overlaps the requested window.
    #[error("vehicle unavailable: overlaps {} reservation(s)", .0.len())]
    ResourceUnavailable(Vec<Reservation>),
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: Ulid,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("store failure: {0}")]
    StoreFailure(StoreError),
}

impl EngineError {
    /// Stable label for driver responses and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidInterval { .. } => "invalid_interval",
            EngineError::ResourceUnavailable(_) => "resource_unavailable",
            EngineError::NotFound(_) => "not_found",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::StoreFailure(_) => "store_failure",
        }
    }
}

impl From<InvalidInterval> for EngineError {
    fn from(e: InvalidInterval) -> Self {
        EngineError::InvalidInterval {
            start: e.start,
            end: e.end,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            StoreError::Overlap { conflicts, .. } => EngineError::ResourceUnavailable(conflicts),
            StoreError::LimitExceeded(msg) => EngineError::LimitExceeded(msg),
            other => EngineError::StoreFailure(other),
        }
    }
}
