//! Newline-delimited JSON protocol spoken with socket clients

use roomcast_broadcaster::Packet;
use serde::{Deserialize, Serialize};

/// Command sent by a client
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Join {
        room: String,
    },

    Leave {
        room: String,
    },

    /// Broadcast to the members of `rooms` on every node
    Emit {
        rooms: Vec<String>,
        event: String,
        #[serde(default)]
        data: serde_json::Value,
        /// Skip the emitting client itself
        #[serde(default)]
        exclude_self: bool,
    },
}

impl ClientCommand {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

/// Event written to a client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// First line on every connection
    Welcome {
        client_id: String,
        node_id: String,
    },

    Joined {
        room: String,
    },

    Left {
        room: String,
        was_member: bool,
    },

    Emitted {
        delivered: usize,
        published: usize,
        /// Rooms whose dispatch event could not be published
        failed: Vec<String>,
    },

    /// Broadcast payload
    Packet {
        event: String,
        data: serde_json::Value,
    },

    Error {
        message: String,
    },
}

impl From<Packet> for ServerEvent {
    fn from(packet: Packet) -> Self {
        ServerEvent::Packet {
            event: packet.event,
            data: packet.data,
        }
    }
}

impl ServerEvent {
    /// Convert event to JSON string with newline
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_emit_defaults() {
        let command = ClientCommand::parse(r#"{"type":"emit","rooms":["A","B"],"event":"chat"}"#).unwrap();
        assert_eq!(
            command,
            ClientCommand::Emit {
                rooms: vec!["A".to_string(), "B".to_string()],
                event: "chat".to_string(),
                data: serde_json::Value::Null,
                exclude_self: false,
            }
        );
    }

    #[test]
    fn test_parse_unknown_command_fails() {
        assert!(ClientCommand::parse(r#"{"type":"shout"}"#).is_err());
    }

    #[test]
    fn test_packet_event_serialization() {
        let event = ServerEvent::from(Packet::new("chat", json!({"text": "hi"})));
        let json = event.to_json_line().unwrap();
        assert!(json.contains("\"type\":\"packet\""));
        assert!(json.contains("\"event\":\"chat\""));
        assert!(json.ends_with('\n'));
    }
}
