//! Process-wide broadcast of condensed change events
//!
//! Store and registry listeners forward into the bus; consumers subscribe to
//! everything or to the events of one `CC*PID` party. Slow consumers skip
//! what they missed rather than blocking publishers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::events::{Event, EventMessage};

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventMessage>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast `event`; returns how many subscribers received it
    pub fn publish(&self, event: Event) -> usize {
        let message = EventMessage::new(event);
        let event_type = message.event.event_type();
        metrics::counter!("ocpi_events_published_total", "type" => event_type).increment(1);

        let party = message.event.party().to_string();
        match self.sender.send(message) {
            Ok(delivered) => {
                debug!(event_type, party = %party, delivered, "Event published");
                delivered
            }
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
            party: None,
        }
    }

    /// Only events concerning `party` (`CC*PID`)
    pub fn subscribe_party(&self, party: impl Into<String>) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
            party: Some(party.into()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EventSubscriber {
    receiver: broadcast::Receiver<EventMessage>,
    party: Option<String>,
}

impl EventSubscriber {
    /// Next matching event, or `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if self.matches(&message) => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    metrics::counter!("ocpi_events_lagged_total").increment(missed);
                    warn!(missed, party = ?self.party, "Event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn matches(&self, message: &EventMessage) -> bool {
        self.party
            .as_deref()
            .map_or(true, |party| message.event.party() == party)
    }
}

pub type SharedEventBus = Arc<EventBus>;

pub fn create_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::notifications::events::{ChangeAction, ResourceChangedEvent};

    fn changed(party: &str, id: &str) -> Event {
        Event::ResourceChanged(ResourceChangedEvent {
            kind: "Location".to_string(),
            party: party.to_string(),
            id: id.to_string(),
            action: ChangeAction::Added,
        })
    }

    async fn next(subscriber: &mut EventSubscriber) -> EventMessage {
        tokio::time::timeout(Duration::from_millis(100), subscriber.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn party_subscribers_skip_other_parties() {
        let bus = EventBus::new();
        let mut all = bus.subscribe();
        let mut nl = bus.subscribe_party("NL*TNX");

        assert_eq!(bus.publish(changed("DE*ABC", "LOC1")), 2);
        assert_eq!(bus.publish(changed("NL*TNX", "LOC2")), 2);

        assert_eq!(next(&mut all).await.event.party(), "DE*ABC");
        let message = next(&mut nl).await;
        assert_eq!(message.event.party(), "NL*TNX");
        assert_eq!(message.event.event_type(), "resource_changed");
    }

    #[tokio::test]
    async fn lagging_subscriber_resumes_with_newest_events() {
        let bus = EventBus::with_capacity(2);
        let mut subscriber = bus.subscribe();
        for id in ["A", "B", "C", "D"] {
            bus.publish(changed("NL*TNX", id));
        }

        match next(&mut subscriber).await.event {
            Event::ResourceChanged(event) => assert_eq!(event.id, "C"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(changed("NL*TNX", "LOC1")), 0);

        let subscriber = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(subscriber);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
