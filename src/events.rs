//! Typed change notifications.
//!
//! Model mutations publish a [`ModelEvent`]; the merge pipeline publishes
//! [`GenerationEvent`](crate::pipeline::GenerationEvent)s through the same
//! [`EventBus`]. Subscribers get an `mpsc::Receiver` and the core never knows
//! who is listening. Closed receivers are pruned on the next emit.

use crate::clusters::ClusterId;
use crate::entries::EntryId;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    EntryAdded(EntryId),
    EntryRemoved(EntryId),
    EntrySelectionChanged { id: EntryId, selected: bool },
    ClusterCreated(ClusterId),
    ClusterChanged(ClusterId),
    ClusterRemoved(ClusterId),
    ClusterSelectionChanged { id: ClusterId, selected: bool },
    SessionOpened(ClusterId),
    SessionClosed(ClusterId),
    /// Emitted whenever the undo stack changes between empty and non-empty
    /// or after an undo.
    UndoAvailable(bool),
    /// The whole model was replaced (project load or undo).
    Reloaded,
}

/// Fan-out of events to any number of channel subscribers.
#[derive(Debug)]
pub struct EventBus<E> {
    subscribers: Mutex<Vec<Sender<E>>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .push(tx);
        rx
    }

    pub fn emit(&self, event: E) {
        let mut subscribers = self.subscribers.lock().expect("event bus lock poisoned");
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_receives_events() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.emit(ModelEvent::UndoAvailable(true));

        assert_eq!(first.try_recv().unwrap(), ModelEvent::UndoAvailable(true));
        assert_eq!(second.try_recv().unwrap(), ModelEvent::UndoAvailable(true));
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.emit(ModelEvent::ClusterCreated(ClusterId(1)));
        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        let bus: EventBus<ModelEvent> = EventBus::new();
        bus.emit(ModelEvent::Reloaded);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
