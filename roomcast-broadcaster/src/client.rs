use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::Packet;

/// Identity of one connected socket endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the textual form produced by `Display`. Anything else is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A connected client that packets can be pushed to.
///
/// `send` is fire-and-forget: a failing client deals with it internally
/// and must never stop delivery to the others.
pub trait ClientHandle: Send + Sync {
    fn id(&self) -> ClientId;

    fn send(&self, packet: &Packet);
}

/// Client handle backed by an unbounded channel; whoever owns the receiver
/// writes packets to the actual connection.
#[derive(Debug, Clone)]
pub struct ChannelClient {
    id: ClientId,
    sender: mpsc::UnboundedSender<Packet>,
}

impl ChannelClient {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Packet>) {
        Self::with_id(ClientId::new())
    }

    pub fn with_id(id: ClientId) -> (Self, mpsc::UnboundedReceiver<Packet>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { id, sender }, receiver)
    }
}

impl ClientHandle for ChannelClient {
    fn id(&self) -> ClientId {
        self.id
    }

    fn send(&self, packet: &Packet) {
        if self.sender.send(packet.clone()).is_err() {
            tracing::debug!("Client {} is gone, dropping packet '{}'", self.id, packet.event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ids_are_unique() {
        assert_ne!(ClientId::new(), ClientId::new());
    }

    #[test]
    fn test_parse_accepts_display_form_only() {
        let id = ClientId::new();
        assert_eq!(ClientId::parse(&id.to_string()), Some(id));
        assert_eq!(ClientId::parse(""), None);
        assert_eq!(ClientId::parse("not-a-client"), None);
    }

    #[test]
    fn test_channel_client_forwards_packets() {
        let (client, mut rx) = ChannelClient::new();
        client.send(&Packet::new("ping", serde_json::Value::Null));
        assert_eq!(rx.try_recv().unwrap().event, "ping");
    }

    #[test]
    fn test_send_after_receiver_dropped_does_not_panic() {
        let (client, rx) = ChannelClient::new();
        drop(rx);
        client.send(&Packet::new("ping", serde_json::Value::Null));
    }
}
