//! In-process event bus.
//!
//! One broadcast channel carries every store mutation. Topic strings follow
//! the `pewpi.<noun>.<verb>` convention.
//!
//! Delivery is lossy for subscribers that fall more than the channel
//! capacity behind; there is no cross-process delivery.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Events buffered per subscriber before the slowest one starts losing.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StoreEvent {
    TokenCreated { id: String, symbol: String },
    TokenUpdated { id: String },
    TokenDeleted { id: String },
    TokenWarned { id: String, days_left: u64 },
    TokenRedistributed {
        id: String,
        from_owner: String,
        to_owner: String,
    },
    TransferRecorded { token_symbol: String, amount: u64 },
    SessionChanged { user_id: String },
    LinkIssued { email: String },
    LinkVerified { email: String },
}

impl StoreEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            StoreEvent::TokenCreated { .. } => "pewpi.token.created",
            StoreEvent::TokenUpdated { .. } => "pewpi.token.updated",
            StoreEvent::TokenDeleted { .. } => "pewpi.token.deleted",
            StoreEvent::TokenWarned { .. } => "pewpi.token.warned",
            StoreEvent::TokenRedistributed { .. } => "pewpi.token.redistributed",
            StoreEvent::TransferRecorded { .. } => "pewpi.transfer.recorded",
            StoreEvent::SessionChanged { .. } => "pewpi.session.changed",
            StoreEvent::LinkIssued { .. } => "pewpi.link.issued",
            StoreEvent::LinkVerified { .. } => "pewpi.link.verified",
        }
    }
}

pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
    published: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; returns the number of subscribers that received it.
    /// An event with no listeners is not an error.
    pub fn publish(&self, event: StoreEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let topic = event.topic();
        match self.sender.send(event) {
            Ok(n) => {
                debug!(topic, subscribers = n, "event published");
                n
            }
            Err(_) => 0,
        }
    }

    pub fn events_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        let n = bus.publish(StoreEvent::TokenDeleted {
            id: "tok_1".to_string(),
        });
        assert_eq!(n, 0);
        assert_eq!(bus.events_published(), 1);
    }

    #[test]
    fn test_subscriber_receives_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let event = StoreEvent::TokenCreated {
            id: "tok_1".to_string(),
            symbol: "BRN".to_string(),
        };
        assert_eq!(bus.publish(event.clone()), 1);
        assert_eq!(rx.try_recv().unwrap(), event);
    }

    #[test]
    fn test_all_subscribers_receive() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(StoreEvent::SessionChanged {
            user_id: "u1".to_string(),
        });
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_topics_follow_convention() {
        let events = [
            StoreEvent::TokenCreated {
                id: String::new(),
                symbol: String::new(),
            },
            StoreEvent::TokenUpdated { id: String::new() },
            StoreEvent::TokenDeleted { id: String::new() },
            StoreEvent::TokenWarned {
                id: String::new(),
                days_left: 0,
            },
            StoreEvent::TokenRedistributed {
                id: String::new(),
                from_owner: String::new(),
                to_owner: String::new(),
            },
            StoreEvent::TransferRecorded {
                token_symbol: String::new(),
                amount: 0,
            },
            StoreEvent::SessionChanged {
                user_id: String::new(),
            },
            StoreEvent::LinkIssued {
                email: String::new(),
            },
            StoreEvent::LinkVerified {
                email: String::new(),
            },
        ];
        for event in events {
            let topic = event.topic();
            let parts: Vec<&str> = topic.split('.').collect();
            assert_eq!(parts.len(), 3, "topic {topic}");
            assert_eq!(parts[0], "pewpi");
        }
    }

    #[test]
    fn test_slow_subscriber_lags() {
        let bus = EventBus::with_capacity(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(StoreEvent::TokenUpdated {
                id: format!("tok_{i}"),
            });
        }
        // Oldest events are gone; the receiver observes the lag.
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
    }
}
