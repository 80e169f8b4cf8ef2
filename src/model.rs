use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid interval [{start}, {end}): start must be before end")]
pub struct InvalidInterval {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor; degenerate and inverted spans are rejected.
    pub fn try_new(start: Ms, end: Ms) -> Result<Self, InvalidInterval> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(InvalidInterval { start, end })
        }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Intersection with `bounds`, or `None` when they don't overlap.
    pub fn clamp_to(&self, bounds: &Span) -> Option<Span> {
        let start = self.start.max(bounds.start);
        let end = self.end.min(bounds.end);
        (start < end).then_some(Span { start, end })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Scheduled,
    Active,
    Completed,
    Canceled,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }

    /// Scheduled and Active reservations hold the vehicle; terminal ones don't.
    pub fn is_blocking(self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Scheduled, Active)
                | (Scheduled, Completed)
                | (Scheduled, Canceled)
                | (Active, Completed)
                | (Active, Canceled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exclusive claim on a vehicle for `[span.start, span.end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub span: Span,
    /// Instructor, student or driver reference. Opaque to the engine.
    pub holder: String,
    /// Free-form tag such as "lesson" or "exam".
    pub purpose: String,
    pub status: ReservationStatus,
}

impl Reservation {
    pub fn is_blocking(&self) -> bool {
        self.status.is_blocking()
    }
}

/// Validated input for `Engine::create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    /// Caller-chosen id; a fresh ULID is generated when absent.
    pub id: Option<Ulid>,
    pub resource_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub holder: String,
    pub purpose: String,
    /// Create directly in `Active` instead of `Scheduled`.
    pub activate: bool,
}

/// Validated input for `Engine::update`. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationChanges {
    pub resource_id: Option<Ulid>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub holder: Option<String>,
    pub purpose: Option<String>,
}

impl ReservationChanges {
    pub fn is_empty(&self) -> bool {
        self.resource_id.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.holder.is_none()
            && self.purpose.is_none()
    }
}

/// The event types, flat with no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        reservation: Reservation,
    },
    /// Span, holder, purpose or vehicle changed. `previous_resource_id`
    /// differs from `reservation.resource_id` when the reservation moved.
    ReservationChanged {
        previous_resource_id: Ulid,
        reservation: Reservation,
    },
    StatusChanged {
        id: Ulid,
        resource_id: Ulid,
        status: ReservationStatus,
    },
}

impl Event {
    /// Resource whose timeline the event lands on.
    pub fn resource_id(&self) -> Ulid {
        match self {
            Event::ReservationCreated { reservation }
            | Event::ReservationChanged { reservation, .. } => reservation.resource_id,
            Event::StatusChanged { resource_id, .. } => *resource_id,
        }
    }

    pub fn reservation_id(&self) -> Ulid {
        match self {
            Event::ReservationCreated { reservation }
            | Event::ReservationChanged { reservation, .. } => reservation.id,
            Event::StatusChanged { id, .. } => *id,
        }
    }
}

// ── Maintenance & fuel records ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
    Scheduled,
    Completed,
    Canceled,
}

impl std::fmt::Display for MaintenanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MaintenanceStatus::Scheduled => "scheduled",
            MaintenanceStatus::Completed => "completed",
            MaintenanceStatus::Canceled => "canceled",
        })
    }
}

/// Work planned for a single point in time, not an interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceTask {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub schedule_date: Ms,
    pub status: MaintenanceStatus,
    pub completed_at: Option<Ms>,
    pub cost: Option<f64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelLogEntry {
    pub resource_id: Ulid,
    pub at: Ms,
    pub odometer: f64,
    pub fuel: f64,
    pub cost: f64,
}

/// Fuel figures for one vehicle over one calendar month (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub resource_id: Ulid,
    pub year: i32,
    pub month: u32,
    pub entries: usize,
    pub total_cost: f64,
    pub total_fuel: f64,
    pub distance: f64,
    /// Distance per unit of fuel; `None` when there is nothing to divide.
    pub efficiency: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_overlap_by_one_ms() {
        let a = Span::new(100, 201);
        let b = Span::new(200, 300);
        assert!(a.overlaps(&b));
    }

    #[test]
    fn span_try_new_rejects_degenerate() {
        assert_eq!(
            Span::try_new(100, 100),
            Err(InvalidInterval { start: 100, end: 100 })
        );
        assert!(Span::try_new(200, 100).is_err());
        assert_eq!(Span::try_new(100, 101).unwrap(), Span::new(100, 101));
    }

    #[test]
    fn span_contains_span() {
        let outer = Span::new(100, 400);
        let inner = Span::new(150, 300);
        let partial = Span::new(50, 200);
        assert!(outer.contains_span(&inner));
        assert!(outer.contains_span(&outer)); // self-containment
        assert!(!outer.contains_span(&partial));
    }

    #[test]
    fn span_clamp() {
        let bounds = Span::new(100, 200);
        assert_eq!(Span::new(50, 150).clamp_to(&bounds), Some(Span::new(100, 150)));
        assert_eq!(Span::new(0, 100).clamp_to(&bounds), None);
        assert_eq!(Span::new(0, 1000).clamp_to(&bounds), Some(bounds));
    }

    #[test]
    fn status_transitions() {
        use ReservationStatus::*;
        assert!(Scheduled.can_transition_to(Active));
        assert!(Scheduled.can_transition_to(Canceled));
        assert!(Scheduled.can_transition_to(Completed));
        assert!(Active.can_transition_to(Completed));
        assert!(Active.can_transition_to(Canceled));
        assert!(!Active.can_transition_to(Scheduled));
        assert!(!Active.can_transition_to(Active));
        for terminal in [Completed, Canceled] {
            assert!(terminal.is_terminal());
            for next in [Scheduled, Active, Completed, Canceled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn event_resource_lookup() {
        let reservation = Reservation {
            id: Ulid::new(),
            resource_id: Ulid::new(),
            span: Span::new(0, 10),
            holder: "instructor-7".into(),
            purpose: "lesson".into(),
            status: ReservationStatus::Scheduled,
        };
        let moved = Event::ReservationChanged {
            previous_resource_id: Ulid::new(),
            reservation: reservation.clone(),
        };
        assert_eq!(moved.resource_id(), reservation.resource_id);
        assert_eq!(moved.reservation_id(), reservation.id);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationCreated {
            reservation: Reservation {
                id: Ulid::new(),
                resource_id: Ulid::new(),
                span: Span::new(1_000, 2_000),
                holder: "student-12".into(),
                purpose: "exam".into(),
                status: ReservationStatus::Active,
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
