/// Engine events
///
/// Notifications of things that happened inside the engine, broadcast to
/// every subscriber. Publishing never blocks; closed subscribers are skipped.
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;

use super::category::AudioCategory;
use super::handle::HandleId;
use super::link::{OwnerEvent, OwnerId};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Output began for a handle (first start or replay)
    HandleStarted {
        handle: HandleId,
        category: AudioCategory,
        clip: Option<String>,
    },

    HandlePaused {
        handle: HandleId,
        category: AudioCategory,
    },

    /// Output ran out while playing
    HandleCompleted {
        handle: HandleId,
        category: AudioCategory,
    },

    /// Handle reached its terminal state and gave back its channel
    HandleStopped {
        handle: HandleId,
        category: AudioCategory,
    },

    /// An owner lifecycle event was applied to its linked handles
    OwnerNotified {
        owner: OwnerId,
        event: OwnerEvent,
        affected: usize,
    },

    /// The engine stopped every handle and released its channels
    Shutdown,
}

impl EngineEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            EngineEvent::HandleStarted {
                handle,
                category,
                clip,
            } => match clip {
                Some(clip) => format!("{} {} started {}", category, handle, clip),
                None => format!("{} {} started", category, handle),
            },
            EngineEvent::HandlePaused { handle, category } => {
                format!("{} {} paused", category, handle)
            }
            EngineEvent::HandleCompleted { handle, category } => {
                format!("{} {} completed", category, handle)
            }
            EngineEvent::HandleStopped { handle, category } => {
                format!("{} {} stopped", category, handle)
            }
            EngineEvent::OwnerNotified {
                owner,
                event,
                affected,
            } => format!("{} {:?} affected {} handle(s)", owner, event, affected),
            EngineEvent::Shutdown => "Engine shut down".to_string(),
        }
    }
}

/// Subscriber ID for tracking subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

struct Subscriber {
    id: SubscriberId,
    sender: Sender<EngineEvent>,
}

/// Event bus for broadcasting engine events to subscribers
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    next_id: Arc<RwLock<usize>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(RwLock::new(0)),
        }
    }

    /// Subscribe to events, returns a receiver and subscription ID
    pub fn subscribe(&self) -> (Receiver<EngineEvent>, SubscriberId) {
        let (tx, rx) = unbounded();

        let mut next_id = self.next_id.write();
        let id = SubscriberId(*next_id);
        *next_id += 1;
        drop(next_id);

        self.subscribers.write().push(Subscriber { id, sender: tx });

        (rx, id)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.write().retain(|s| s.id != id);
    }

    pub fn publish(&self, event: EngineEvent) {
        let subscribers = self.subscribers.read();
        if subscribers.is_empty() {
            return;
        }

        tracing::trace!("{}", event.description());
        for subscriber in subscribers.iter() {
            // If send fails, subscriber channel is closed - that's ok
            let _ = subscriber.sender.try_send(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
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
    fn test_event_bus_subscribe_and_unsubscribe() {
        let bus = EventBus::new();
        let (_rx, id) = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.unsubscribe(id);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_bus_multiple_subscribers() {
        let bus = EventBus::new();
        let (rx1, _id1) = bus.subscribe();
        let (rx2, _id2) = bus.subscribe();

        bus.publish(EngineEvent::Shutdown);

        assert_eq!(rx1.try_recv().unwrap(), EngineEvent::Shutdown);
        assert_eq!(rx2.try_recv().unwrap(), EngineEvent::Shutdown);
    }

    #[test]
    fn test_event_bus_clone_shares_subscribers() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();

        let (rx, _id) = bus1.subscribe();
        bus2.publish(EngineEvent::HandlePaused {
            handle: HandleId::from_raw(4),
            category: AudioCategory::Music,
        });

        match rx.try_recv().unwrap() {
            EngineEvent::HandlePaused { handle, .. } => assert_eq!(handle, HandleId::from_raw(4)),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[test]
    fn test_event_description() {
        let event = EngineEvent::HandleStopped {
            handle: HandleId::from_raw(2),
            category: AudioCategory::Effect,
        };
        assert_eq!(event.description(), "Effect handle#2 stopped");
    }
}
