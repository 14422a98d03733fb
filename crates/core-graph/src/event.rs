//! Observable node lifecycle events.
//!
//! Observers subscribe through a channel; the node clones the event into
//! every live subscriber and silently forgets senders whose receiver went
//! away. Emission never blocks: subscriptions are unbounded channels and
//! the cost of an event is bounded by the (small) subscriber count.

use crate::connection::OpenMode;
use crate::error::ProcessingError;
use core_data::AnyData;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Mutex;

/// Everything a node reports to the outside world. These are the only
/// documented integration points for observers.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// Structural or parameter change (enabled flag, schedule, renames).
    ProcessingChanged,
    /// A port was added, removed or re-enabled.
    IoChanged { port: String },
    ConnectionOpened {
        port: String,
        mode: OpenMode,
        address: String,
    },
    ConnectionClosed { port: String },
    DataReceived { port: String, data: AnyData },
    DataSent { port: String, data: AnyData },
    ImageTransformChanged,
    /// Emitted after outputs are set; `nanos` is the apply duration.
    ProcessingDone { node: String, nanos: u64 },
    Error(ProcessingError),
    Destroyed { node: String },
}

/// Fan-out hub owned by each node.
#[derive(Debug, Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<Sender<NodeEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<NodeEvent> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .expect("event hub poisoned")
            .push(tx);
        rx
    }

    pub fn emit(&self, event: NodeEvent) {
        let mut subs = self.subscribers.lock().expect("event hub poisoned");
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("event hub poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_subscribers_are_pruned() {
        let hub = EventHub::new();
        let rx1 = hub.subscribe();
        let rx2 = hub.subscribe();
        drop(rx2);
        hub.emit(NodeEvent::ProcessingChanged);
        assert!(matches!(
            rx1.try_recv().unwrap(),
            NodeEvent::ProcessingChanged
        ));
        assert_eq!(hub.subscriber_count(), 1);
    }
}
