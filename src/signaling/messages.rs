use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{ConnectionId, OutboundMessage, RoomId};

/// Messages sent from client to server
///
/// Every field is optional on the wire; missing or empty values are
/// dropped by the router rather than rejected by the decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join (or create) a room
    Join { room_id: Option<RoomId> },

    /// Relay an opaque payload to one peer or to the rest of the room
    Signal(SignalEnvelope),

    /// Leave a room
    Leave { room_id: Option<RoomId> },
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Routing wrapper around an opaque signal payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    pub room_id: Option<RoomId>,
    pub target_id: Option<ConnectionId>,
    pub data: Option<Value>,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Sent once after the WebSocket handshake with the client's own id
    Connected { socket_id: ConnectionId },

    /// Members that were already in the room when the client joined
    RoomInfo { peers: Vec<ConnectionId> },

    /// A new peer joined the room
    PeerJoined { socket_id: ConnectionId },

    /// Relayed payload from another peer
    Signal { from: ConnectionId, data: Value },

    /// A peer left the room or disconnected
    PeerLeft { socket_id: ConnectionId },
}

impl ServerMessage {
    pub fn to_outbound(&self) -> Result<OutboundMessage, serde_json::Error> {
        serde_json::to_string(self).map(OutboundMessage::from)
    }
}
