use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::validate_span;
use super::{Engine, EngineError};

fn validate_holder(holder: &str) -> Result<(), EngineError> {
    if holder.len() > MAX_HOLDER_LEN {
        return Err(EngineError::LimitExceeded("holder too long"));
    }
    Ok(())
}

fn validate_purpose(purpose: &str) -> Result<(), EngineError> {
    if purpose.len() > MAX_PURPOSE_LEN {
        return Err(EngineError::LimitExceeded("purpose too long"));
    }
    Ok(())
}

impl Engine {
    /// Book a vehicle. Fails with `ResourceUnavailable` listing every
    /// overlapping reservation, in which case nothing is written.
    pub async fn create(&self, req: NewReservation) -> Result<Reservation, EngineError> {
        let this = self.clone();
        self.run_detached("create", async move {
            let span = validate_span(req.start, req.end)?;
            validate_holder(&req.holder)?;
            validate_purpose(&req.purpose)?;
            this.ensure_resource(req.resource_id).await?;

            let _guard = this.locks.acquire(req.resource_id).await;
            this.detector
                .check_conflict(req.resource_id, span, None)
                .await?
                .into_result()?;

            let reservation = Reservation {
                id: req.id.unwrap_or_else(Ulid::new),
                resource_id: req.resource_id,
                span,
                holder: req.holder,
                purpose: req.purpose,
                status: if req.activate {
                    ReservationStatus::Active
                } else {
                    ReservationStatus::Scheduled
                },
            };
            let saved = this.store.insert(reservation).await?;
            info!(
                "reservation {} on {} [{}, {}) {}",
                saved.id, saved.resource_id, saved.span.start, saved.span.end, saved.status
            );
            this.notify.publish(&Event::ReservationCreated {
                reservation: saved.clone(),
            });
            Ok(saved)
        })
        .await
    }

    /// Change the window, vehicle, holder or purpose of a live reservation.
    /// Terminal reservations are reported as `NotFound`.
    pub async fn update(&self, id: Ulid, changes: ReservationChanges) -> Result<Reservation, EngineError> {
        let this = self.clone();
        self.run_detached("update", async move {
            if let (Some(start), Some(end)) = (changes.start, changes.end) {
                validate_span(start, end)?;
            }
            if let Some(holder) = &changes.holder {
                validate_holder(holder)?;
            }
            if let Some(purpose) = &changes.purpose {
                validate_purpose(purpose)?;
            }
            if let Some(target) = changes.resource_id {
                this.ensure_resource(target).await?;
            }

            loop {
                let seen = this.store.get(id).await?;
                let target = changes.resource_id.unwrap_or(seen.resource_id);
                let _guards = this.locks.acquire_many(&[seen.resource_id, target]).await;
                let current = this.store.get(id).await?;
                if current.resource_id != seen.resource_id {
                    // moved by a concurrent update before we got the lock
                    continue;
                }
                return this.apply_changes(current, target, &changes).await;
            }
        })
        .await
    }

    /// Caller holds the locks of both `current.resource_id` and `target`.
    async fn apply_changes(
        &self,
        current: Reservation,
        target: Ulid,
        changes: &ReservationChanges,
    ) -> Result<Reservation, EngineError> {
        if current.status.is_terminal() {
            return Err(EngineError::NotFound(current.id));
        }
        let span = validate_span(
            changes.start.unwrap_or(current.span.start),
            changes.end.unwrap_or(current.span.end),
        )?;
        let moved = target != current.resource_id;
        if moved || span != current.span {
            self.detector
                .check_conflict(target, span, Some(current.id))
                .await?
                .into_result()?;
        }

        let updated = Reservation {
            id: current.id,
            resource_id: target,
            span,
            holder: changes.holder.clone().unwrap_or_else(|| current.holder.clone()),
            purpose: changes.purpose.clone().unwrap_or_else(|| current.purpose.clone()),
            status: current.status,
        };
        if updated == current {
            return Ok(current);
        }

        let saved = self.store.replace(updated).await?;
        if moved {
            info!("reservation {} moved {} -> {}", saved.id, current.resource_id, target);
        } else {
            info!("reservation {} updated", saved.id);
        }
        self.notify.publish(&Event::ReservationChanged {
            previous_resource_id: current.resource_id,
            reservation: saved.clone(),
        });
        Ok(saved)
    }

    /// Scheduled/Active → Canceled. A second call fails with `InvalidTransition`.
    pub async fn cancel(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Canceled, "cancel").await
    }

    /// Scheduled/Active → Completed.
    pub async fn complete(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Completed, "complete").await
    }

    /// Scheduled → Active.
    pub async fn activate(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Active, "activate").await
    }

    async fn transition(
        &self,
        id: Ulid,
        to: ReservationStatus,
        op: &'static str,
    ) -> Result<Reservation, EngineError> {
        let this = self.clone();
        self.run_detached(op, async move {
            loop {
                let seen = this.store.get(id).await?;
                let _guard = this.locks.acquire(seen.resource_id).await;
                let current = this.store.get(id).await?;
                if current.resource_id != seen.resource_id {
                    continue;
                }
                if !current.status.can_transition_to(to) {
                    return Err(EngineError::InvalidTransition {
                        id,
                        from: current.status,
                        to,
                    });
                }
                let saved = this.store.update_status(id, to).await?;
                info!("reservation {id} {} -> {to}", current.status);
                this.notify.publish(&Event::StatusChanged {
                    id,
                    resource_id: saved.resource_id,
                    status: to,
                });
                return Ok(saved);
            }
        })
        .await
    }
}
