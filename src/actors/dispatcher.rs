//! NotificationDispatcher - fans hub events out to dashboard connections
//!
//! The ingest actor hands events over a bounded queue with `try_send`; this
//! actor is the queue's only consumer. Each event is serialized once and
//! published on a broadcast channel every WebSocket connection subscribes to.
//! A connection that falls behind skips events instead of slowing the others.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, instrument, trace};

use super::messages::HubEvent;

pub struct NotificationDispatcher {
    event_rx: mpsc::Receiver<HubEvent>,
    outbound_tx: broadcast::Sender<Arc<str>>,
    published: Arc<AtomicU64>,
}

impl NotificationDispatcher {
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting notification dispatcher");

        while let Some(event) = self.event_rx.recv().await {
            let text: Arc<str> = match serde_json::to_string(&event) {
                Ok(text) => text.into(),
                Err(e) => {
                    error!("failed to serialize hub event: {e}");
                    continue;
                }
            };

            self.published.fetch_add(1, Ordering::Relaxed);
            // no subscribers is not an error, the event is simply not seen
            let receivers = self.outbound_tx.send(text).unwrap_or(0);
            trace!("published event to {receivers} subscribers");
        }

        debug!("notification dispatcher stopped");
    }
}

/// Handle to the dispatcher: the producer side and the subscription point
#[derive(Clone)]
pub struct DispatcherHandle {
    event_tx: mpsc::Sender<HubEvent>,
    outbound_tx: broadcast::Sender<Arc<str>>,
    published: Arc<AtomicU64>,
}

impl DispatcherHandle {
    /// Spawn the dispatcher; both queues hold `capacity` events
    pub fn spawn(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (outbound_tx, _) = broadcast::channel(capacity);
        let published = Arc::new(AtomicU64::new(0));

        let dispatcher = NotificationDispatcher {
            event_rx,
            outbound_tx: outbound_tx.clone(),
            published: published.clone(),
        };
        tokio::spawn(dispatcher.run());

        Self {
            event_tx,
            outbound_tx,
            published,
        }
    }

    pub fn event_sender(&self) -> mpsc::Sender<HubEvent> {
        self.event_tx.clone()
    }

    /// Receive every event published from now on, as JSON text
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.outbound_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.outbound_tx.receiver_count()
    }

    /// Events published so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::graph::GraphSnapshot;

    fn empty_graph() -> HubEvent {
        HubEvent::GraphUpdate(GraphSnapshot {
            nodes: Vec::new(),
            edges: Vec::new(),
            last_updated: Utc::now(),
            first_message: false,
        })
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let dispatcher = DispatcherHandle::spawn(8);
        let mut first = dispatcher.subscribe();
        let mut second = dispatcher.subscribe();
        assert_eq!(dispatcher.subscriber_count(), 2);

        dispatcher.event_sender().send(empty_graph()).await.unwrap();

        for rx in [&mut first, &mut second] {
            let text = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("event in time")
                .expect("open channel");
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["type"], "graph_update");
            assert_eq!(value["data"]["first_message"], false);
        }
        assert_eq!(dispatcher.published(), 1);
    }

    #[tokio::test]
    async fn test_publishing_without_subscribers() {
        let dispatcher = DispatcherHandle::spawn(8);
        dispatcher.event_sender().send(empty_graph()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.published(), 1);
    }
}
