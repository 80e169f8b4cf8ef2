use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use tracing::{debug, info, warn};

use crate::engine::{Engine, EngineError, now_ms};
use crate::model::Ms;
use crate::store::{LocalStore, ReservationStore};

/// Activations in flight at once; each takes its own vehicle's lock.
const ACTIVATION_CONCURRENCY: usize = 16;

/// Move every Scheduled reservation whose window contains `now` to Active.
/// Returns how many were activated.
pub async fn activate_due(engine: &Engine, store: &dyn ReservationStore, now: Ms) -> usize {
    let due = match store.due_for_activation(now).await {
        Ok(due) => due,
        Err(e) => {
            warn!("activator: cannot list due reservations: {e}");
            return 0;
        }
    };
    let outcomes: Vec<_> = stream::iter(due)
        .map(|reservation| async move { (reservation.id, engine.activate(reservation.id).await) })
        .buffer_unordered(ACTIVATION_CONCURRENCY)
        .collect()
        .await;

    let mut activated = 0;
    for (id, outcome) in outcomes {
        match outcome {
            Ok(_) => {
                activated += 1;
                metrics::counter!(crate::observability::RESERVATIONS_ACTIVATED_TOTAL).increment(1);
            }
            // Canceled or activated by someone else in the meantime.
            Err(e @ (EngineError::InvalidTransition { .. } | EngineError::NotFound(_))) => {
                debug!("activator skip {id}: {e}");
            }
            Err(e) => warn!("activator failed on {id}: {e}"),
        }
    }
    activated
}

/// Background task: activate started reservations every `period`.
pub async fn run_activator(engine: Engine, store: Arc<dyn ReservationStore>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let activated = activate_due(&engine, store.as_ref(), now_ms()).await;
        if activated > 0 {
            info!("activated {activated} reservations");
        }
    }
}

/// Background task: compact the WAL once it has grown by `threshold` appends.
pub async fn run_compactor(store: Arc<LocalStore>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        if store.appends_since_compact().await < threshold {
            continue;
        }
        if let Err(e) = store.compact().await {
            warn!("compaction failed: {e}");
        }
    }
}
