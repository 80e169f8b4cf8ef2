use std::sync::Arc;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::store::ReservationStore;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// `InvalidInterval` for `start >= end`, then range and length limits.
pub(crate) fn validate_span(start: Ms, end: Ms) -> Result<Span, EngineError> {
    let span = Span::try_new(start, end)?;
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_RESERVATION_DURATION_MS {
        return Err(EngineError::LimitExceeded("reservation too long"));
    }
    Ok(span)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResult {
    NoConflict,
    /// All overlapping holding reservations, sorted by start.
    Conflict(Vec<Reservation>),
}

impl ConflictResult {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConflictResult::Conflict(_))
    }

    pub fn into_result(self) -> Result<(), EngineError> {
        match self {
            ConflictResult::NoConflict => Ok(()),
            ConflictResult::Conflict(conflicts) => {
                metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
                Err(EngineError::ResourceUnavailable(conflicts))
            }
        }
    }
}

/// Any overlap with a Scheduled/Active reservation, however small, is a conflict.
///
/// On its own the answer is advisory: it is only authoritative while the
/// caller holds the vehicle's lock through the following write.
#[derive(Clone)]
pub struct ConflictDetector {
    store: Arc<dyn ReservationStore>,
}

impl ConflictDetector {
    pub fn new(store: Arc<dyn ReservationStore>) -> Self {
        Self { store }
    }

    pub async fn check_conflict(
        &self,
        resource_id: Ulid,
        span: Span,
        exclude: Option<Ulid>,
    ) -> Result<ConflictResult, EngineError> {
        let overlapping = self
            .store
            .find_active_overlapping(resource_id, span, exclude)
            .await?;
        if overlapping.is_empty() {
            Ok(ConflictResult::NoConflict)
        } else {
            tracing::debug!(
                "conflict on {resource_id} for [{}, {}): {} overlapping",
                span.start,
                span.end,
                overlapping.len()
            );
            Ok(ConflictResult::Conflict(overlapping))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;

    const H: Ms = 3_600_000;

    fn reservation(resource_id: Ulid, start: Ms, end: Ms, status: ReservationStatus) -> Reservation {
        Reservation {
            id: Ulid::new(),
            resource_id,
            span: Span::new(start, end),
            holder: "instructor-2".into(),
            purpose: "lesson".into(),
            status,
        }
    }

    #[test]
    fn validate_span_rules() {
        assert!(matches!(
            validate_span(10, 10),
            Err(EngineError::InvalidInterval { start: 10, end: 10 })
        ));
        assert!(matches!(
            validate_span(20, 10),
            Err(EngineError::InvalidInterval { .. })
        ));
        assert!(matches!(
            validate_span(-5, 10),
            Err(EngineError::LimitExceeded(_))
        ));
        assert!(matches!(
            validate_span(0, MAX_RESERVATION_DURATION_MS + 1),
            Err(EngineError::LimitExceeded(_))
        ));
        assert_eq!(validate_span(0, H).unwrap(), Span::new(0, H));
    }

    #[tokio::test]
    async fn reports_every_overlap() {
        let store = Arc::new(LocalStore::in_memory());
        let vehicle = Ulid::new();
        let a = reservation(vehicle, 9 * H, 10 * H, ReservationStatus::Active);
        let b = reservation(vehicle, 10 * H, 11 * H, ReservationStatus::Scheduled);
        let c = reservation(vehicle, 12 * H, 13 * H, ReservationStatus::Scheduled);
        for r in [&a, &b, &c] {
            store.insert(r.clone()).await.unwrap();
        }
        let detector = ConflictDetector::new(store);

        let result = detector
            .check_conflict(vehicle, Span::new(9 * H + H / 2, 10 * H + H / 2), None)
            .await
            .unwrap();
        assert_eq!(result, ConflictResult::Conflict(vec![a.clone(), b]));

        let result = detector
            .check_conflict(vehicle, Span::new(11 * H, 12 * H), None)
            .await
            .unwrap();
        assert_eq!(result, ConflictResult::NoConflict);
    }

    #[tokio::test]
    async fn excluded_and_terminal_reservations_do_not_conflict() {
        let store = Arc::new(LocalStore::in_memory());
        let vehicle = Ulid::new();
        let own = reservation(vehicle, 0, H, ReservationStatus::Scheduled);
        let done = reservation(vehicle, H, 2 * H, ReservationStatus::Completed);
        store.insert(own.clone()).await.unwrap();
        store.insert(done).await.unwrap();
        let detector = ConflictDetector::new(store);

        let result = detector
            .check_conflict(vehicle, Span::new(0, 2 * H), Some(own.id))
            .await
            .unwrap();
        assert!(!result.is_conflict());
        assert!(result.into_result().is_ok());
    }

    #[tokio::test]
    async fn unknown_vehicle_has_no_conflicts() {
        let detector = ConflictDetector::new(Arc::new(LocalStore::in_memory()));
        let result = detector
            .check_conflict(Ulid::new(), Span::new(0, H), None)
            .await
            .unwrap();
        assert_eq!(result, ConflictResult::NoConflict);
    }
}
