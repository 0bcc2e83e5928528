//! Event definitions for the registrar
//!
//! Every change to the registration table is published on a broadcast
//! channel. Nobody has to listen; events are dropped when there are no
//! subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the event channel before slow subscribers start lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Registration-related events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrarEvent {
    /// Identity registered or refreshed its registration
    UserRegistered {
        user: String,
        contact: String,
        expires_at: Option<DateTime<Utc>>,
    },

    /// Identity unregistered
    UserUnregistered { user: String },

    /// Registration removed by the expiry sweep
    RegistrationExpired { user: String },

    /// Registration removed because the identity left the directory
    RegistrationPruned { user: String },

    /// Directory reloaded
    DirectoryReloaded { profiles: usize, aliases: usize },
}

impl RegistrarEvent {
    pub fn user(&self) -> Option<&str> {
        match self {
            RegistrarEvent::UserRegistered { user, .. }
            | RegistrarEvent::UserUnregistered { user }
            | RegistrarEvent::RegistrationExpired { user }
            | RegistrarEvent::RegistrationPruned { user } => Some(user),
            RegistrarEvent::DirectoryReloaded { .. } => None,
        }
    }
}

/// Publishing side of the event channel
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<RegistrarEvent>,
}

impl EventPublisher {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistrarEvent> {
        self.sender.subscribe()
    }

    /// Publish without waiting; an error only means nobody listens
    pub fn publish(&self, event: RegistrarEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let publisher = EventPublisher::new();
        publisher.publish(RegistrarEvent::UserUnregistered { user: "bob".to_string() });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let publisher = EventPublisher::new();
        let mut rx = publisher.subscribe();

        publisher.publish(RegistrarEvent::RegistrationExpired { user: "alice".to_string() });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.user(), Some("alice"));
        assert!(matches!(event, RegistrarEvent::RegistrationExpired { .. }));
    }
}
