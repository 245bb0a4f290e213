use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::session::SessionPhase;

/// Default capacity of the session event channel
const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Notifications published when the session changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Lifecycle phase changed
    PhaseChanged { phase: SessionPhase },

    /// A token and matching profile were applied (login, register, or refresh success)
    SessionEstablished { email: Option<String> },

    /// Token and profile were cleared (logout or refresh failure)
    SessionCleared,

    /// Profile fields were updated
    UserUpdated { username: String },

    /// UI preferences changed
    PreferencesChanged { theme: String },

    /// Persisted state finished loading at startup
    Hydrated { restored_session: bool },
}

/// Broadcast channel for observing session changes
#[derive(Debug, Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    /// Create a new event channel with the given capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to session change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        debug!("New subscriber registered for session events");
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: SessionEvent) {
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(receivers, "Session event published");
            }
            Err(_) => {
                // A send error only means there are no active receivers
                debug!("No receivers for session event");
            }
        }
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let events = SessionEvents::default();
        let mut first = events.subscribe();
        let mut second = events.subscribe();

        events.publish(SessionEvent::PreferencesChanged {
            theme: "dark".to_string(),
        });

        for receiver in [&mut first, &mut second] {
            match receiver.recv().await.unwrap() {
                SessionEvent::PreferencesChanged { theme } => assert_eq!(theme, "dark"),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let events = SessionEvents::default();
        events.publish(SessionEvent::SessionCleared);
    }

    #[tokio::test]
    async fn test_late_subscribers_miss_earlier_events() {
        let events = SessionEvents::default();
        events.publish(SessionEvent::SessionCleared);

        let mut receiver = events.subscribe();
        events.publish(SessionEvent::Hydrated {
            restored_session: false,
        });

        match receiver.recv().await.unwrap() {
            SessionEvent::Hydrated { restored_session } => assert!(!restored_session),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
