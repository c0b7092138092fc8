// Device -> controller event plumbing
// Listeners register with the hub and get an explicit handle back; dropping
// the handle (or calling unsubscribe) removes the listener again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tracing::debug;

use super::output::SourceId;

#[derive(Debug, Clone, PartialEq)]
pub enum OutputEventKind {
    TimeUpdate(f64),
    DurationKnown(f64),
    /// Natural completion of the source.
    Ended,
    /// Decode, network or permission failure.
    Error(String),
}

/// Every event is tagged with the source it was produced for, so listeners
/// can drop anything that belongs to a source that has since been replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputEvent {
    pub source: SourceId,
    pub kind: OutputEventKind,
}

impl OutputEvent {
    pub fn new(source: SourceId, kind: OutputEventKind) -> Self {
        Self { source, kind }
    }
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<OutputEvent>>,
}

/// Fan-out point shared between an output adapter and its device thread.
#[derive(Clone, Default)]
pub struct EventHub {
    listeners: Arc<Mutex<Listeners>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = match self.listeners.lock() {
            Ok(mut listeners) => {
                listeners.next_id += 1;
                let id = listeners.next_id;
                listeners.senders.insert(id, tx);
                id
            }
            // Poisoned hub: hand out a subscription that simply never fires
            Err(_) => 0,
        };
        debug!("Output listener {} subscribed", id);

        Subscription {
            id,
            receiver: rx,
            hub: Arc::downgrade(&self.listeners),
        }
    }

    pub fn emit(&self, event: OutputEvent) {
        if let Ok(mut listeners) = self.listeners.lock() {
            // Receivers that went away without unsubscribing get pruned here
            listeners
                .senders
                .retain(|_, tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .map(|listeners| listeners.senders.len())
            .unwrap_or(0)
    }
}

/// A registered listener. Removing it from the hub is deterministic: either
/// `unsubscribe()` or drop.
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<OutputEvent>,
    hub: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<OutputEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<OutputEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.hub.upgrade() {
            if let Ok(mut listeners) = listeners.lock() {
                listeners.senders.remove(&self.id);
            }
        }
        debug!("Output listener {} unsubscribed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_and_unsubscribe() {
        let hub = EventHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.listener_count(), 2);

        hub.emit(OutputEvent::new(SourceId(1), OutputEventKind::Ended));
        assert_eq!(a.try_recv().map(|e| e.kind), Some(OutputEventKind::Ended));
        assert_eq!(b.try_recv().map(|e| e.kind), Some(OutputEventKind::Ended));

        a.unsubscribe();
        assert_eq!(hub.listener_count(), 1);

        drop(b);
        assert_eq!(hub.listener_count(), 0);

        // Emitting with nobody listening is fine
        hub.emit(OutputEvent::new(SourceId(1), OutputEventKind::TimeUpdate(1.0)));
    }

    #[test]
    fn test_subscription_outlives_hub() {
        let hub = EventHub::new();
        let sub = hub.subscribe();
        drop(hub);
        drop(sub);
    }
}
