//! Reservation lifecycle manager: the entry point external callers use to
//! create, change and close vehicle reservations.

mod availability;
mod conflict;
mod error;
mod lifecycle;
mod locks;
mod queries;

pub use availability::{merge_overlapping, subtract_intervals};
pub use conflict::{ConflictDetector, ConflictResult};
pub(crate) use conflict::now_ms;
pub use error::EngineError;
pub use locks::ResourceLocks;

use std::future::Future;
use std::sync::Arc;

use crate::notify::NotifyHub;
use crate::store::{ReservationStore, ResourceDirectory};

/// Cheap to clone; every clone shares the same store, directory, lock table
/// and notification hub.
#[derive(Clone)]
pub struct Engine {
    pub(super) store: Arc<dyn ReservationStore>,
    pub(super) directory: Arc<dyn ResourceDirectory>,
    pub(super) detector: ConflictDetector,
    pub(super) locks: Arc<ResourceLocks>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        directory: Arc<dyn ResourceDirectory>,
        notify: Arc<NotifyHub>,
    ) -> Self {
        Self {
            detector: ConflictDetector::new(store.clone()),
            store,
            directory,
            locks: Arc::new(ResourceLocks::new()),
            notify,
        }
    }

    pub fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    /// Run a check-then-write sequence on its own task so that a caller
    /// dropping its future cannot stop it halfway: it commits or fails as a
    /// whole.
    pub(super) async fn run_detached<T, F>(&self, op: &'static str, f: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, EngineError>> + Send + 'static,
    {
        let started = std::time::Instant::now();
        let result = match tokio::spawn(f).await {
            Ok(result) => result,
            Err(e) => Err(EngineError::StoreFailure(crate::store::StoreError::Backend(
                format!("{op} task failed: {e}"),
            ))),
        };
        let status = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        crate::observability::record_operation(op, status, started);
        result
    }

    /// Fail with `NotFound` unless the directory knows the vehicle.
    pub(super) async fn ensure_resource(&self, resource_id: ulid::Ulid) -> Result<(), EngineError> {
        if self.directory.contains(resource_id).await? {
            Ok(())
        } else {
            Err(EngineError::NotFound(resource_id))
        }
    }
}
