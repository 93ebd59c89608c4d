use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::client::ClientId;
use crate::events::{PubSubEnvelope, PubSubType};
use crate::registry::RoomRegistry;

/// Receives dispatch events from peer nodes and delivers them to this
/// node's members of the named room.
pub struct DispatchSubscriber {
    node_id: String,
    registry: Arc<dyn RoomRegistry>,
}

impl DispatchSubscriber {
    pub fn new(node_id: impl Into<String>, registry: Arc<dyn RoomRegistry>) -> Self {
        Self {
            node_id: node_id.into(),
            registry,
        }
    }

    /// Deliver one envelope locally, returning the number of clients reached.
    /// Envelopes published by this node are ignored: its own members were
    /// served directly by the broadcasting side.
    pub fn handle(&self, envelope: &PubSubEnvelope) -> usize {
        if envelope.node_id == self.node_id {
            return 0;
        }

        match envelope.topic {
            PubSubType::Dispatch => {
                let message = &envelope.message;
                // Parsed once per message; an unparseable id matches nobody
                let excluded = message.excluded().and_then(ClientId::parse);
                let mut seen = HashSet::new();
                let mut delivered = 0;

                for client in self.registry.clients_in(&message.room) {
                    let id = client.id();
                    if !seen.insert(id) {
                        continue;
                    }
                    if excluded == Some(id) {
                        continue;
                    }
                    client.send(&message.packet);
                    delivered += 1;
                }

                tracing::debug!(
                    "Dispatch from {} for room '{}' delivered to {} clients",
                    envelope.node_id,
                    message.room,
                    delivered
                );
                delivered
            }
        }
    }

    /// Consume bus lines until the channel closes
    pub async fn run(self, mut receiver: broadcast::Receiver<Arc<str>>) {
        loop {
            match receiver.recv().await {
                Ok(line) => match PubSubEnvelope::from_json_line(&line) {
                    Ok(envelope) => {
                        self.handle(&envelope);
                    }
                    Err(e) => tracing::warn!("Dropping undecodable bus message: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Node {} lagged, skipped {} dispatch events", self.node_id, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::info!("Dispatch subscriber for node {} stopped", self.node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChannelClient, ClientHandle};
    use crate::events::{DispatchMessage, Packet};
    use crate::registry::MemoryRoomRegistry;
    use serde_json::json;

    fn envelope(node: &str, room: &str, exclude: &str) -> PubSubEnvelope {
        PubSubEnvelope {
            node_id: node.to_string(),
            topic: PubSubType::Dispatch,
            message: DispatchMessage::new(room, Packet::new("chat", json!("hi")), exclude),
        }
    }

    #[test]
    fn test_delivers_only_to_named_room() {
        let registry = Arc::new(MemoryRoomRegistry::new());
        let (a, mut rx_a) = ChannelClient::new();
        let (b, mut rx_b) = ChannelClient::new();
        registry.join("A", Arc::new(a));
        registry.join("B", Arc::new(b));

        let subscriber = DispatchSubscriber::new("local", registry);
        assert_eq!(subscriber.handle(&envelope("remote", "A", "")), 1);
        assert_eq!(rx_a.try_recv().unwrap().event, "chat");
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_ignores_own_node() {
        let registry = Arc::new(MemoryRoomRegistry::new());
        let (a, mut rx_a) = ChannelClient::new();
        registry.join("A", Arc::new(a));

        let subscriber = DispatchSubscriber::new("local", registry);
        assert_eq!(subscriber.handle(&envelope("local", "A", "")), 0);
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_honours_exclude_id() {
        let registry = Arc::new(MemoryRoomRegistry::new());
        let (a, mut rx_a) = ChannelClient::new();
        let (b, mut rx_b) = ChannelClient::new();
        let excluded = a.id().to_string();
        registry.join("A", Arc::new(a));
        registry.join("A", Arc::new(b));

        let subscriber = DispatchSubscriber::new("local", registry);
        assert_eq!(subscriber.handle(&envelope("remote", "A", &excluded)), 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_malformed_exclude_id_excludes_nobody() {
        let registry = Arc::new(MemoryRoomRegistry::new());
        let (a, mut rx_a) = ChannelClient::new();
        let (b, mut rx_b) = ChannelClient::new();
        registry.join("A", Arc::new(a));
        registry.join("A", Arc::new(b));

        let subscriber = DispatchSubscriber::new("local", registry);
        assert_eq!(subscriber.handle(&envelope("remote", "A", "not-a-client")), 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_run_stops_when_bus_closes() {
        let (sender, receiver) = broadcast::channel::<Arc<str>>(4);
        let registry = Arc::new(MemoryRoomRegistry::new());
        let (a, mut rx_a) = ChannelClient::new();
        registry.join("A", Arc::new(a));

        let task = tokio::spawn(DispatchSubscriber::new("local", registry).run(receiver));
        sender.send(Arc::from("garbage")).unwrap();
        let line = envelope("remote", "A", "").to_json_line().unwrap();
        sender.send(Arc::from(line)).unwrap();
        drop(sender);

        task.await.unwrap();
        assert_eq!(rx_a.recv().await.unwrap().event, "chat");
    }
}
