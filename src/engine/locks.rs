use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use ulid::Ulid;

/// One async mutex per vehicle. Holding a vehicle's guard serializes the
/// conflict check and the write that follows it; different vehicles never
/// contend.
#[derive(Default)]
pub struct ResourceLocks {
    locks: DashMap<Ulid, Arc<Mutex<()>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, resource_id: Ulid) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(resource_id).or_default().clone();
        let started = Instant::now();
        let guard = lock.lock_owned().await;
        metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS)
            .record(started.elapsed().as_secs_f64());
        guard
    }

    /// Acquire several vehicles in id order to prevent deadlocks.
    pub async fn acquire_many(&self, resource_ids: &[Ulid]) -> Vec<OwnedMutexGuard<()>> {
        let mut ids = resource_ids.to_vec();
        ids.sort();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.acquire(id).await);
        }
        guards
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
