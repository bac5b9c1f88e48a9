//! Dispatch events handed to the consumer

use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// A Dispatch event, in the order its shard received it
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub shard_id: u32,
    /// Event name, e.g. `MESSAGE_CREATE`
    pub name: String,
    pub sequence: Option<u64>,
    /// Opaque event body
    pub data: Value,
}

/// Lazy sequence of events from every shard
///
/// Ordered per shard; no ordering across shards.
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::Receiver<Event>,
}

impl EventStream {
    pub(crate) fn new(receiver: mpsc::Receiver<Event>) -> Self {
        Self { receiver }
    }

    /// Channel pair for wiring sessions by hand
    #[must_use]
    pub fn channel(buffer: usize) -> (mpsc::Sender<Event>, Self) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (sender, Self::new(receiver))
    }

    /// Next event, `None` once every producer is gone
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
