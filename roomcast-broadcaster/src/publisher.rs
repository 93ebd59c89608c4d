//! Cluster publish capability and the in-process bus that links nodes.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::PublishError;
use crate::events::{DispatchMessage, PubSubEnvelope, PubSubType};

/// Sends scoped dispatch events to every other node on the shared channel.
///
/// Delivery guarantees belong to the implementation. A returned error covers
/// this one attempt only; callers decide whether to retry.
#[async_trait]
pub trait ClusterPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: PubSubType,
        message: DispatchMessage,
    ) -> Result<(), PublishError>;
}

/// In-process cluster channel. Lines are JSON-encoded envelopes, the same
/// bytes a network transport would carry.
#[derive(Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<Arc<str>>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publisher that stamps every envelope with `node_id`
    pub fn publisher(&self, node_id: impl Into<String>) -> BusPublisher {
        BusPublisher {
            node_id: node_id.into(),
            sender: self.sender.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// One node's handle onto the [`LocalBus`]
#[derive(Clone)]
pub struct BusPublisher {
    node_id: String,
    sender: broadcast::Sender<Arc<str>>,
}

impl BusPublisher {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

#[async_trait]
impl ClusterPublisher for BusPublisher {
    async fn publish(
        &self,
        topic: PubSubType,
        message: DispatchMessage,
    ) -> Result<(), PublishError> {
        let envelope = PubSubEnvelope {
            node_id: self.node_id.clone(),
            topic,
            message,
        };
        let line = envelope.to_json_line()?;

        // No receivers means no peer nodes, nothing to notify.
        match self.sender.send(Arc::from(line)) {
            Ok(receivers) => tracing::debug!(
                "Published {} for room '{}' to {} subscribers",
                topic.channel(),
                envelope.message.room,
                receivers
            ),
            Err(_) => tracing::debug!(
                "No subscribers for {} on room '{}'",
                topic.channel(),
                envelope.message.room
            ),
        }
        Ok(())
    }
}
