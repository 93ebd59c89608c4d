use serde::{Deserialize, Serialize};

use crate::error::{BroadcasterError, Result};

/// Message payload delivered to clients. Never inspected by the dispatcher.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Packet {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Packet {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Cluster pub/sub topics
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PubSubType {
    /// Deliver a packet to the local members of one room
    Dispatch,
}

impl PubSubType {
    /// Channel name on the shared transport
    pub fn channel(&self) -> &'static str {
        match self {
            PubSubType::Dispatch => "dispatch",
        }
    }
}

/// Instructs a peer node to deliver `packet` to its own members of `room`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DispatchMessage {
    pub room: String,
    pub packet: Packet,
    /// Client id to skip on delivery; empty means exclude nobody.
    #[serde(rename = "excludeId", default)]
    pub exclude_id: String,
}

impl DispatchMessage {
    pub fn new(room: impl Into<String>, packet: Packet, exclude_id: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            packet,
            exclude_id: exclude_id.into(),
        }
    }

    /// The excluded client id, if any
    pub fn excluded(&self) -> Option<&str> {
        if self.exclude_id.is_empty() {
            None
        } else {
            Some(&self.exclude_id)
        }
    }
}

/// What travels on the cluster bus: the dispatch message tagged with the
/// publishing node so that node can skip its own events.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PubSubEnvelope {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    pub topic: PubSubType,
    pub message: DispatchMessage,
}

impl PubSubEnvelope {
    /// Convert envelope to JSON string with newline
    pub fn to_json_line(&self) -> std::result::Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }

    pub fn from_json_line(line: &str) -> Result<Self> {
        serde_json::from_str(line.trim_end()).map_err(BroadcasterError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_message_wire_shape() {
        let message = DispatchMessage::new("lobby", Packet::new("chat", json!({"text": "hi"})), "");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["room"], "lobby");
        assert_eq!(value["excludeId"], "");
        assert_eq!(value["packet"]["event"], "chat");
        assert!(message.excluded().is_none());
    }

    #[test]
    fn test_envelope_json_line() {
        let envelope = PubSubEnvelope {
            node_id: "node-a".to_string(),
            topic: PubSubType::Dispatch,
            message: DispatchMessage::new("A", Packet::new("tick", json!(1)), "abc"),
        };
        let line = envelope.to_json_line().unwrap();
        assert!(line.contains("\"nodeId\":\"node-a\""));
        assert!(line.contains("\"topic\":\"dispatch\""));
        assert!(line.ends_with('\n'));

        let decoded = PubSubEnvelope::from_json_line(&line).unwrap();
        assert_eq!(decoded.message.excluded(), Some("abc"));
    }

    #[test]
    fn test_missing_exclude_id_defaults_to_none() {
        let line = r#"{"nodeId":"n","topic":"dispatch","message":{"room":"r","packet":{"event":"e"}}}"#;
        let decoded = PubSubEnvelope::from_json_line(line).unwrap();
        assert_eq!(decoded.message.exclude_id, "");
        assert_eq!(decoded.message.packet.data, serde_json::Value::Null);
    }

    #[test]
    fn test_garbage_line_is_decode_error() {
        let err = PubSubEnvelope::from_json_line("not json").unwrap_err();
        assert!(matches!(err, BroadcasterError::Decode(_)));
    }
}
