use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::limits::{MAX_RESERVATIONS_PER_RESOURCE, TERMINAL_RETENTION_MS};
use crate::model::*;
use crate::wal::Wal;

use super::journal::Journal;
use super::{ReservationStore, StoreError};

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

/// One vehicle's timeline.
#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: Ulid,
    /// Reservations kept on the vehicle, sorted by `span.start`. Terminal
    /// ones stay until compaction prunes them.
    pub reservations: Vec<Reservation>,
    /// Scheduled + Active count.
    live: usize,
    /// Longest span ever inserted; bounds the backwards scan in `overlapping`.
    longest: Ms,
}

impl ResourceState {
    pub fn new(id: Ulid) -> Self {
        Self {
            id,
            reservations: Vec::new(),
            live: 0,
            longest: 0,
        }
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, reservation: Reservation) {
        if reservation.is_blocking() {
            self.live += 1;
        }
        self.longest = self.longest.max(reservation.span.duration_ms());
        let pos = self
            .reservations
            .partition_point(|r| r.span.start <= reservation.span.start);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        let removed = self.reservations.remove(pos);
        if removed.is_blocking() {
            self.live -= 1;
        }
        Some(removed)
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    fn set_status(&mut self, id: Ulid, status: ReservationStatus) {
        let Some(r) = self.reservations.iter_mut().find(|r| r.id == id) else {
            return;
        };
        match (r.is_blocking(), status.is_blocking()) {
            (true, false) => self.live -= 1,
            (false, true) => self.live += 1,
            _ => {}
        }
        r.status = status;
    }

    /// Scheduled and Active reservations on the vehicle.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Drop terminal reservations that ended at or before `cutoff`.
    /// Returns the ids removed.
    fn prune_terminal(&mut self, cutoff: Ms) -> Vec<Ulid> {
        let mut pruned = Vec::new();
        self.reservations.retain(|r| {
            let stale = r.status.is_terminal() && r.span.end <= cutoff;
            if stale {
                pruned.push(r.id);
            }
            !stale
        });
        pruned
    }

    /// Reservations (any status) whose span overlaps the query window.
    /// Binary search bounds both ends: nothing starting at or after
    /// `query.end`, nothing starting so early it must end by `query.start`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let earliest = query.start.saturating_sub(self.longest);
        let left_bound = self
            .reservations
            .partition_point(|r| r.span.start <= earliest);
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[left_bound..right_bound.max(left_bound)]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }

    /// Holding reservations overlapping `span`, other than `exclude`.
    pub fn blocking_overlaps(&self, span: &Span, exclude: Option<Ulid>) -> Vec<Reservation> {
        self.overlapping(span)
            .filter(|r| r.is_blocking() && Some(r.id) != exclude)
            .cloned()
            .collect()
    }
}

/// Apply a single-timeline event (caller holds the write lock).
fn apply_to_resource(rs: &mut ResourceState, event: &Event) {
    match event {
        Event::ReservationCreated { reservation } => rs.insert(reservation.clone()),
        Event::ReservationChanged { reservation, .. } => {
            rs.remove(reservation.id);
            rs.insert(reservation.clone());
        }
        Event::StatusChanged { id, status, .. } => rs.set_status(*id, *status),
    }
}

/// Write guards for a reservation's current timeline and, when it is being
/// moved, the destination timeline.
struct Locked {
    source: OwnedRwLockWriteGuard<ResourceState>,
    target: Option<OwnedRwLockWriteGuard<ResourceState>>,
}

/// `ReservationStore` over in-memory per-vehicle timelines, optionally backed
/// by a write-ahead log.
///
/// Every write takes the vehicle's write lock, re-checks the overlap
/// constraint, journals the event, then applies it.
pub struct LocalStore {
    resources: DashMap<Ulid, SharedResourceState>,
    /// Reverse lookup: reservation id → vehicle id.
    reservation_to_resource: DashMap<Ulid, Ulid>,
    journal: Option<Journal>,
    /// Writers hold it shared while journaling; compaction takes it exclusively.
    commit_gate: RwLock<()>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl LocalStore {
    /// Volatile store; nothing survives the process.
    pub fn in_memory() -> Self {
        Self {
            resources: DashMap::new(),
            reservation_to_resource: DashMap::new(),
            journal: None,
            commit_gate: RwLock::new(()),
        }
    }

    /// Replay the log at `path` and journal every later write to it.
    /// Must be called from within a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let mut store = Self::in_memory();
        for event in &events {
            store.replay_event(event)?;
        }
        tracing::info!(
            "replayed {} events, {} reservations from {}",
            events.len(),
            store.reservation_count(),
            path.display()
        );
        store.journal = Some(Journal::spawn(Wal::open(path)?));
        Ok(store)
    }

    pub fn is_durable(&self) -> bool {
        self.journal.is_some()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservation_to_resource.len()
    }

    pub fn resource_ids(&self) -> Vec<Ulid> {
        self.resources.iter().map(|e| *e.key()).collect()
    }

    /// Compact with the default retention: Canceled and Completed
    /// reservations that ended more than `TERMINAL_RETENTION_MS` ago are
    /// dropped.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let cutoff = chrono::Utc::now()
            .timestamp_millis()
            .saturating_sub(TERMINAL_RETENTION_MS);
        self.compact_before(cutoff).await
    }

    /// Prune terminal reservations that ended at or before `cutoff`, then
    /// rewrite the log as one `ReservationCreated` per remaining
    /// reservation. An in-memory store only prunes.
    pub async fn compact_before(&self, cutoff: Ms) -> Result<(), StoreError> {
        let _exclusive = self.commit_gate.write().await;

        let mut ids = self.resource_ids();
        ids.sort();
        let mut timelines = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(rs) = self.existing(&id) {
                timelines.push(rs.write_owned().await);
            }
        }

        if let Some(journal) = &self.journal {
            let events: Vec<Event> = timelines
                .iter()
                .flat_map(|rs| rs.reservations.iter())
                .filter(|r| !(r.status.is_terminal() && r.span.end <= cutoff))
                .map(|r| Event::ReservationCreated {
                    reservation: r.clone(),
                })
                .collect();
            let count = events.len();
            journal.compact(events).await?;
            tracing::info!("compacted WAL to {count} events");
        }

        let mut pruned = 0;
        for rs in &mut timelines {
            for id in rs.prune_terminal(cutoff) {
                self.reservation_to_resource.remove(&id);
                pruned += 1;
            }
        }
        if pruned > 0 {
            tracing::info!("pruned {pruned} finished reservations");
        }
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        match &self.journal {
            Some(journal) => journal.appends_since_compact().await,
            None => 0,
        }
    }

    fn existing(&self, resource_id: &Ulid) -> Option<SharedResourceState> {
        self.resources.get(resource_id).map(|e| e.value().clone())
    }

    fn timeline(&self, resource_id: Ulid) -> SharedResourceState {
        self.resources
            .entry(resource_id)
            .or_insert_with(|| Arc::new(RwLock::new(ResourceState::new(resource_id))))
            .clone()
    }

    fn resource_of(&self, id: &Ulid) -> Option<Ulid> {
        self.reservation_to_resource.get(id).map(|e| *e.value())
    }

    async fn persist(&self, event: &Event) -> Result<(), StoreError> {
        match &self.journal {
            Some(journal) => journal.append(event).await,
            None => Ok(()),
        }
    }

    /// Replay runs before the store is shared, so every lock is uncontended.
    fn replay_event(&mut self, event: &Event) -> io::Result<()> {
        let contended = || io::Error::other("replay: contended resource state");
        if let Event::ReservationChanged {
            previous_resource_id,
            reservation,
        } = event
            && *previous_resource_id != reservation.resource_id
        {
            if let Some(prev) = self.existing(previous_resource_id) {
                prev.try_write().map_err(|_| contended())?.remove(reservation.id);
            }
            let rs = self.timeline(reservation.resource_id);
            rs.try_write().map_err(|_| contended())?.insert(reservation.clone());
        } else {
            let rs = self.timeline(event.resource_id());
            apply_to_resource(&mut *rs.try_write().map_err(|_| contended())?, event);
        }
        self.reservation_to_resource
            .insert(event.reservation_id(), event.resource_id());
        Ok(())
    }

    /// Lock the timeline currently holding `id` (and `target`, if different),
    /// in id order. Retries if the reservation moved while we waited.
    async fn lock_reservation(&self, id: Ulid, target: Option<Ulid>) -> Result<Locked, StoreError> {
        loop {
            let source_id = self.resource_of(&id).ok_or(StoreError::NotFound(id))?;
            let source_rs = self.timeline(source_id);
            let locked = match target.filter(|t| *t != source_id) {
                None => Locked {
                    source: source_rs.write_owned().await,
                    target: None,
                },
                Some(target_id) => {
                    let target_rs = self.timeline(target_id);
                    if source_id < target_id {
                        let source = source_rs.write_owned().await;
                        let target = target_rs.write_owned().await;
                        Locked { source, target: Some(target) }
                    } else {
                        let target = target_rs.write_owned().await;
                        let source = source_rs.write_owned().await;
                        Locked { source, target: Some(target) }
                    }
                }
            };
            if locked.source.get(id).is_some() {
                return Ok(locked);
            }
            if self.resource_of(&id) == Some(source_id) {
                return Err(StoreError::NotFound(id));
            }
        }
    }

    fn check_capacity(rs: &ResourceState) -> Result<(), StoreError> {
        if rs.live_count() >= MAX_RESERVATIONS_PER_RESOURCE {
            return Err(StoreError::LimitExceeded("too many reservations on vehicle"));
        }
        Ok(())
    }

    fn check_overlap(rs: &ResourceState, reservation: &Reservation) -> Result<(), StoreError> {
        if !reservation.is_blocking() {
            return Ok(());
        }
        let conflicts = rs.blocking_overlaps(&reservation.span, Some(reservation.id));
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Overlap {
                resource_id: rs.id,
                conflicts,
            })
        }
    }
}

#[async_trait]
impl ReservationStore for LocalStore {
    async fn find_active_overlapping(
        &self,
        resource_id: Ulid,
        span: Span,
        exclude: Option<Ulid>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let Some(rs) = self.existing(&resource_id) else {
            return Ok(Vec::new());
        };
        let guard = rs.read().await;
        Ok(guard.blocking_overlaps(&span, exclude))
    }

    async fn insert(&self, reservation: Reservation) -> Result<Reservation, StoreError> {
        let _gate = self.commit_gate.read().await;
        let rs = self.timeline(reservation.resource_id);
        let mut guard = rs.write().await;
        Self::check_capacity(&guard)?;
        Self::check_overlap(&guard, &reservation)?;

        match self.reservation_to_resource.entry(reservation.id) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateKey(reservation.id)),
            Entry::Vacant(slot) => {
                slot.insert(reservation.resource_id);
            }
        }

        let event = Event::ReservationCreated {
            reservation: reservation.clone(),
        };
        if let Err(e) = self.persist(&event).await {
            self.reservation_to_resource.remove(&reservation.id);
            return Err(e);
        }
        apply_to_resource(&mut guard, &event);
        Ok(reservation)
    }

    async fn update_status(
        &self,
        id: Ulid,
        status: ReservationStatus,
    ) -> Result<Reservation, StoreError> {
        let _gate = self.commit_gate.read().await;
        let Locked { mut source, .. } = self.lock_reservation(id, None).await?;
        let mut updated = source.get(id).cloned().ok_or(StoreError::NotFound(id))?;
        let reopening = !updated.is_blocking() && status.is_blocking();
        updated.status = status;
        if reopening {
            Self::check_overlap(&source, &updated)?;
        }

        let event = Event::StatusChanged {
            id,
            resource_id: source.id,
            status,
        };
        self.persist(&event).await?;
        apply_to_resource(&mut source, &event);
        Ok(updated)
    }

    async fn replace(&self, reservation: Reservation) -> Result<Reservation, StoreError> {
        let _gate = self.commit_gate.read().await;
        let id = reservation.id;
        let Locked { mut source, target } = self
            .lock_reservation(id, Some(reservation.resource_id))
            .await?;
        let previous_resource_id = source.id;

        let event = Event::ReservationChanged {
            previous_resource_id,
            reservation: reservation.clone(),
        };
        match target {
            None => {
                Self::check_overlap(&source, &reservation)?;
                self.persist(&event).await?;
                apply_to_resource(&mut source, &event);
            }
            Some(mut target) => {
                Self::check_capacity(&target)?;
                Self::check_overlap(&target, &reservation)?;
                self.persist(&event).await?;
                source.remove(id);
                target.insert(reservation.clone());
                self.reservation_to_resource.insert(id, target.id);
            }
        }
        Ok(reservation)
    }

    async fn get(&self, id: Ulid) -> Result<Reservation, StoreError> {
        let resource_id = self.resource_of(&id).ok_or(StoreError::NotFound(id))?;
        let rs = self.existing(&resource_id).ok_or(StoreError::NotFound(id))?;
        let guard = rs.read().await;
        guard.get(id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn list_for_resource(
        &self,
        resource_id: Ulid,
        window: Option<Span>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let Some(rs) = self.existing(&resource_id) else {
            return Ok(Vec::new());
        };
        let guard = rs.read().await;
        Ok(match window {
            Some(w) => guard.overlapping(&w).cloned().collect(),
            None => guard.reservations.clone(),
        })
    }

    async fn due_for_activation(&self, now: Ms) -> Result<Vec<Reservation>, StoreError> {
        let timelines: Vec<SharedResourceState> =
            self.resources.iter().map(|e| e.value().clone()).collect();
        let mut due = Vec::new();
        for rs in timelines {
            let guard = rs.read().await;
            due.extend(
                guard
                    .reservations
                    .iter()
                    .filter(|r| {
                        r.status == ReservationStatus::Scheduled && r.span.contains_instant(now)
                    })
                    .cloned(),
            );
        }
        Ok(due)
    }
}
