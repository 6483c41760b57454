use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::messages::{ServerMessage, SignalEnvelope};
use super::registry::Registry;
use super::router::{Outbox, Router};
use super::types::{ConnectionId, OutboundMessage, RoomId, SignalingError};

/// Commands sent to the relay actor
pub(crate) enum RelayCommand {
    Connect {
        conn: ConnectionId,
        tx: mpsc::UnboundedSender<OutboundMessage>,
    },
    Join {
        conn: ConnectionId,
        room: Option<RoomId>,
    },
    Signal {
        conn: ConnectionId,
        envelope: SignalEnvelope,
    },
    Leave {
        conn: ConnectionId,
        room: Option<RoomId>,
    },
    Disconnect {
        conn: ConnectionId,
    },
    Stats {
        reply: oneshot::Sender<RelayStats>,
    },
}

/// Snapshot of relay occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Live transport connections
    pub connections: usize,
    /// Rooms with at least one member
    pub rooms: usize,
    /// Total (room, connection) memberships
    pub members: usize,
}

/// Outbound channels of every live connection.
///
/// Uses OutboundMessage (Utf8Bytes) so a broadcast serializes once and
/// clones cheaply per recipient.
#[derive(Debug, Default)]
pub(crate) struct ConnectionTable {
    peers: HashMap<ConnectionId, mpsc::UnboundedSender<OutboundMessage>>,
}

impl ConnectionTable {
    pub fn register(&mut self, conn: ConnectionId, tx: mpsc::UnboundedSender<OutboundMessage>) {
        self.peers.insert(conn, tx);
    }

    pub fn unregister(&mut self, conn: &ConnectionId) {
        self.peers.remove(conn);
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    fn deliver(&self, to: &ConnectionId, msg: OutboundMessage) {
        match self.peers.get(to) {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    debug!("Peer {} channel closed, message dropped", to);
                }
            }
            None => debug!("Peer {} not connected, message dropped", to),
        }
    }
}

impl Outbox for ConnectionTable {
    fn send(&mut self, to: &ConnectionId, message: &ServerMessage) {
        match message.to_outbound() {
            Ok(msg) => self.deliver(to, msg),
            Err(e) => warn!("Failed to encode message for {}: {}", to, e),
        }
    }

    fn broadcast(
        &mut self,
        members: &[ConnectionId],
        except: Option<&ConnectionId>,
        message: &ServerMessage,
    ) {
        let msg = match message.to_outbound() {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to encode broadcast: {}", e);
                return;
            }
        };
        for member in members.iter().filter(|m| Some(*m) != except) {
            self.deliver(member, msg.clone());
        }
    }
}

pub(crate) async fn relay_actor(mut rx: mpsc::Receiver<RelayCommand>) {
    let mut router = Router::new(Registry::new(), ConnectionTable::default());

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RelayCommand::Connect { conn, tx } => {
                router.outbox_mut().register(conn, tx);
            }

            RelayCommand::Join { conn, room } => router.handle_join(&conn, room.as_ref()),

            RelayCommand::Signal { conn, envelope } => router.handle_signal(&conn, envelope),

            RelayCommand::Leave { conn, room } => router.handle_leave(&conn, room.as_ref()),

            RelayCommand::Disconnect { conn } => {
                router.handle_disconnect(&conn);
                router.outbox_mut().unregister(&conn);
            }

            RelayCommand::Stats { reply } => {
                let registry = router.registry();
                let _ = reply.send(RelayStats {
                    connections: router.outbox().len(),
                    rooms: registry.room_count(),
                    members: registry.membership_count(),
                });
            }
        }
    }

    info!("Relay actor stopped");
}

/// Handle to communicate with the relay actor
#[derive(Clone)]
pub struct RelayHandle {
    pub(crate) tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    /// Spawn a relay actor with the given command queue capacity
    pub fn spawn(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<RelayCommand>(capacity.max(1));
        tokio::spawn(relay_actor(rx));
        Self { tx }
    }

    async fn submit(&self, cmd: RelayCommand) -> Result<(), SignalingError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SignalingError::RelayClosed)
    }

    /// Register a connection's outbound channel
    pub async fn connect(
        &self,
        conn: ConnectionId,
        tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<(), SignalingError> {
        self.submit(RelayCommand::Connect { conn, tx }).await
    }

    pub async fn join(&self, conn: ConnectionId, room: Option<RoomId>) -> Result<(), SignalingError> {
        self.submit(RelayCommand::Join { conn, room }).await
    }

    pub async fn signal(
        &self,
        conn: ConnectionId,
        envelope: SignalEnvelope,
    ) -> Result<(), SignalingError> {
        self.submit(RelayCommand::Signal { conn, envelope }).await
    }

    pub async fn leave(&self, conn: ConnectionId, room: Option<RoomId>) -> Result<(), SignalingError> {
        self.submit(RelayCommand::Leave { conn, room }).await
    }

    /// Remove the connection from every room and forget its channel
    pub async fn disconnect(&self, conn: ConnectionId) -> Result<(), SignalingError> {
        self.submit(RelayCommand::Disconnect { conn }).await
    }

    pub async fn stats(&self) -> Result<RelayStats, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(RelayCommand::Stats { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| SignalingError::RelayClosed)
    }
}
