//! WebSocket signaling relay for WebRTC peers

mod actor;
mod messages;
mod registry;
mod router;
mod server;
mod types;

pub use actor::{RelayHandle, RelayStats};
pub use messages::{ClientMessage, ServerMessage, SignalEnvelope};
pub use registry::Registry;
pub use router::{Outbox, Router};
pub use server::{DEFAULT_SIGNALING_PORT, SignalingServer};
pub use types::{ConnectionId, OutboundMessage, RoomId, SignalingError};
