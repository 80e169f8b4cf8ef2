//! Persistence contract for reservations and the vehicle lookup collaborator.
//!
//! The engine only ever talks to `dyn ReservationStore` and
//! `dyn ResourceDirectory`; `LocalStore` and `FleetDirectory` are the
//! implementations shipped with the crate.

mod directory;
mod journal;
mod local;

pub use directory::{FleetDirectory, ResourceDirectory};
pub use local::{LocalStore, ResourceState};

use async_trait::async_trait;
use thiserror::Error;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    DuplicateKey(Ulid),
    #[error("not found: {0}")]
    NotFound(Ulid),
    /// Storage-level constraint: two holding reservations would share an instant.
    #[error("overlapping reservation on resource {resource_id}")]
    Overlap {
        resource_id: Ulid,
        conflicts: Vec<Reservation>,
    },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    Wal(String),
    #[error("backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Scheduled/Active reservations on `resource_id` overlapping `span`,
    /// minus `exclude`. Sorted by start.
    async fn find_active_overlapping(
        &self,
        resource_id: Ulid,
        span: Span,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Fails with `DuplicateKey` if the id is taken.
    async fn insert(&self, reservation: Reservation) -> Result<Reservation, StoreError>;

    async fn update_status(
        &self,
        id: Ulid,
        status: ReservationStatus,
    ) -> Result<Reservation, StoreError>;

    /// Persist an edited reservation, possibly on a different vehicle.
    async fn replace(&self, reservation: Reservation) -> Result<Reservation, StoreError>;

    async fn get(&self, id: Ulid) -> Result<Reservation, StoreError>;

    /// Every reservation on the vehicle regardless of status, sorted by start,
    /// optionally limited to those overlapping `window`.
    async fn list_for_resource(
        &self,
        resource_id: Ulid,
        window: Option<Span>,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Scheduled reservations whose window contains `now`.
    async fn due_for_activation(&self, now: Ms) -> Result<Vec<Reservation>, StoreError>;
}
