use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::free_windows;
use super::conflict::validate_span;
use super::{Engine, EngineError};

fn query_window(start: Ms, end: Ms) -> Result<Span, EngineError> {
    let window = Span::try_new(start, end)?;
    if window.start < MIN_VALID_TIMESTAMP_MS || window.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if window.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(window)
}

impl Engine {
    pub async fn get(&self, id: Ulid) -> Result<Reservation, EngineError> {
        Ok(self.store.get(id).await?)
    }

    /// Every reservation on the vehicle (any status), sorted by start,
    /// optionally restricted to those overlapping `[start, end)`.
    pub async fn reservations_for(
        &self,
        resource_id: Ulid,
        window: Option<(Ms, Ms)>,
    ) -> Result<Vec<Reservation>, EngineError> {
        let window = window
            .map(|(start, end)| query_window(start, end))
            .transpose()?;
        Ok(self.store.list_for_resource(resource_id, window).await?)
    }

    /// Parts of `[start, end)` where the vehicle is not held, optionally only
    /// those at least `min_duration_ms` long.
    pub async fn free_windows(
        &self,
        resource_id: Ulid,
        start: Ms,
        end: Ms,
        min_duration_ms: Option<Ms>,
    ) -> Result<Vec<Span>, EngineError> {
        let window = query_window(start, end)?;
        self.ensure_resource(resource_id).await?;
        let reservations = self.store.list_for_resource(resource_id, Some(window)).await?;
        let mut free = free_windows(&window, &reservations);
        if let Some(min) = min_duration_ms {
            free.retain(|span| span.duration_ms() >= min);
        }
        Ok(free)
    }

    /// Earliest `duration_ms` slot inside `[start, end)`; what to offer after
    /// a `ResourceUnavailable`.
    pub async fn suggest_slot(
        &self,
        resource_id: Ulid,
        start: Ms,
        end: Ms,
        duration_ms: Ms,
    ) -> Result<Option<Span>, EngineError> {
        if duration_ms <= 0 {
            return Err(EngineError::InvalidInterval {
                start,
                end: start.saturating_add(duration_ms),
            });
        }
        let free = self
            .free_windows(resource_id, start, end, Some(duration_ms))
            .await?;
        free.first()
            .map(|w| validate_span(w.start, w.start + duration_ms))
            .transpose()
    }
}
