use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-vehicle broadcast of committed reservation events.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a vehicle's timeline. Creates the channel if needed.
    pub fn subscribe(&self, resource_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(resource_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, resource_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&resource_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Deliver to both timelines when a reservation moves between vehicles.
    pub fn publish(&self, event: &Event) {
        let target = event.resource_id();
        self.send(target, event);
        if let Event::ReservationChanged {
            previous_resource_id,
            ..
        } = event
            && *previous_resource_id != target
        {
            self.send(*previous_resource_id, event);
        }
    }

    /// Drop a vehicle's channel (e.g. when it is retired).
    pub fn remove(&self, resource_id: &Ulid) {
        self.channels.remove(resource_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Reservation, ReservationStatus, Span};

    fn reservation(resource_id: Ulid) -> Reservation {
        Reservation {
            id: Ulid::new(),
            resource_id,
            span: Span::new(0, 100),
            holder: "driver-3".into(),
            purpose: "delivery".into(),
            status: ReservationStatus::Scheduled,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        let mut rx = hub.subscribe(rid);

        let event = Event::ReservationCreated {
            reservation: reservation(rid),
        };
        hub.publish(&event);

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn moved_reservation_reaches_both_vehicles() {
        let hub = NotifyHub::new();
        let from = Ulid::new();
        let to = Ulid::new();
        let mut rx_from = hub.subscribe(from);
        let mut rx_to = hub.subscribe(to);

        let event = Event::ReservationChanged {
            previous_resource_id: from,
            reservation: reservation(to),
        };
        hub.publish(&event);

        assert_eq!(rx_from.recv().await.unwrap(), event);
        assert_eq!(rx_to.recv().await.unwrap(), event);
    }

    #[test]
    fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        hub.send(
            rid,
            &Event::StatusChanged {
                id: Ulid::new(),
                resource_id: rid,
                status: ReservationStatus::Canceled,
            },
        );
        hub.remove(&rid);
    }
}
