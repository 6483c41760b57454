//! Routing of join/signal/leave/disconnect events between room members.

use serde_json::Value;
use tracing::{debug, info};

use super::messages::{ServerMessage, SignalEnvelope};
use super::registry::Registry;
use super::types::{ConnectionId, RoomId};

/// Outbound delivery capability used by the router.
///
/// Both operations are fire-and-forget: an unreachable destination is
/// silently skipped and must never block the caller.
pub trait Outbox {
    fn send(&mut self, to: &ConnectionId, message: &ServerMessage);

    fn broadcast(
        &mut self,
        members: &[ConnectionId],
        except: Option<&ConnectionId>,
        message: &ServerMessage,
    ) {
        for member in members {
            if Some(member) != except {
                self.send(member, message);
            }
        }
    }
}

/// Signaling router: owns the registry and decides who receives what.
pub struct Router<O> {
    registry: Registry,
    outbox: O,
}

impl<O: Outbox> Router<O> {
    pub fn new(registry: Registry, outbox: O) -> Self {
        Self { registry, outbox }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn outbox(&self) -> &O {
        &self.outbox
    }

    pub fn outbox_mut(&mut self) -> &mut O {
        &mut self.outbox
    }

    pub fn handle_join(&mut self, conn: &ConnectionId, room: Option<&RoomId>) {
        let Some(room) = non_empty(room) else {
            debug!("Ignoring join without room from {}", conn);
            return;
        };

        let peers = self.registry.join(room, conn);
        info!("Peer {} joined room {} ({} already present)", conn, room, peers.len());

        self.outbox.send(conn, &ServerMessage::RoomInfo { peers });

        let members = self.members(room);
        self.outbox.broadcast(
            &members,
            Some(conn),
            &ServerMessage::PeerJoined {
                socket_id: conn.clone(),
            },
        );
    }

    pub fn handle_signal(&mut self, from: &ConnectionId, envelope: SignalEnvelope) {
        let SignalEnvelope {
            room_id,
            target_id,
            data,
        } = envelope;

        let Some(room) = non_empty(room_id.as_ref()) else {
            debug!("Dropping signal without room from {}", from);
            return;
        };
        let Some(data) = data.filter(|d| !is_empty_payload(d)) else {
            debug!("Dropping signal without data from {} in room {}", from, room);
            return;
        };

        let message = ServerMessage::Signal {
            from: from.clone(),
            data,
        };

        match target_id.filter(|t| !t.as_str().is_empty()) {
            Some(target) => {
                debug!("Signal {} -> {} (room {})", from, target, room);
                self.outbox.send(&target, &message);
            }
            None => {
                debug!("Signal {} -> room {}", from, room);
                let members = self.members(room);
                self.outbox.broadcast(&members, Some(from), &message);
            }
        }
    }

    pub fn handle_leave(&mut self, conn: &ConnectionId, room: Option<&RoomId>) {
        let Some(room) = non_empty(room) else {
            debug!("Ignoring leave without room from {}", conn);
            return;
        };

        if !self.registry.leave(room, conn) {
            debug!("Peer {} was not in room {}", conn, room);
            return;
        }
        info!("Peer {} left room {}", conn, room);

        let members = self.members(room);
        self.outbox.broadcast(
            &members,
            None,
            &ServerMessage::PeerLeft {
                socket_id: conn.clone(),
            },
        );
    }

    pub fn handle_disconnect(&mut self, conn: &ConnectionId) {
        let affected = self.registry.disconnect_all(conn);
        if affected.is_empty() {
            return;
        }

        let message = ServerMessage::PeerLeft {
            socket_id: conn.clone(),
        };
        for (room, remaining) in affected {
            if remaining == 0 {
                info!("Room {} closed after {} disconnected", room, conn);
                continue;
            }
            info!("Peer {} dropped from room {}", conn, room);
            let members = self.members(&room);
            self.outbox.broadcast(&members, None, &message);
        }
    }

    fn members(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.registry.members(room).cloned().collect()
    }
}

fn non_empty(room: Option<&RoomId>) -> Option<&RoomId> {
    room.filter(|r| !r.is_empty())
}

/// `null` and `""` carry nothing to relay.
fn is_empty_payload(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    /// Outbox that records every delivery
    #[derive(Debug, Default)]
    struct RecordingOutbox {
        sent: Vec<(ConnectionId, ServerMessage)>,
    }

    impl RecordingOutbox {
        fn take(&mut self) -> Vec<(ConnectionId, ServerMessage)> {
            std::mem::take(&mut self.sent)
        }
    }

    impl Outbox for RecordingOutbox {
        fn send(&mut self, to: &ConnectionId, message: &ServerMessage) {
            self.sent.push((to.clone(), message.clone()));
        }
    }

    fn conn(s: &str) -> ConnectionId {
        ConnectionId::from(s)
    }

    fn room(s: &str) -> RoomId {
        RoomId::from(s)
    }

    fn router() -> Router<RecordingOutbox> {
        Router::new(Registry::new(), RecordingOutbox::default())
    }

    fn signal(room_id: Option<&str>, target: Option<&str>, data: Option<Value>) -> SignalEnvelope {
        SignalEnvelope {
            room_id: room_id.map(RoomId::from),
            target_id: target.map(ConnectionId::from),
            data,
        }
    }

    fn sorted(mut sent: Vec<(ConnectionId, ServerMessage)>) -> Vec<(ConnectionId, ServerMessage)> {
        sent.sort_by(|a, b| a.0.cmp(&b.0));
        sent
    }

    #[test]
    fn join_sends_room_info_and_notifies_existing_members() {
        let mut router = router();
        router.handle_join(&conn("a"), Some(&room("r")));
        assert_eq!(
            router.outbox_mut().take(),
            vec![(conn("a"), ServerMessage::RoomInfo { peers: vec![] })]
        );

        router.handle_join(&conn("b"), Some(&room("r")));
        assert_eq!(
            router.outbox_mut().take(),
            vec![
                (conn("b"), ServerMessage::RoomInfo { peers: vec![conn("a")] }),
                (conn("a"), ServerMessage::PeerJoined { socket_id: conn("b") }),
            ]
        );
    }

    #[test]
    fn join_with_empty_room_is_ignored() {
        let mut router = router();
        router.handle_join(&conn("a"), Some(&room("")));
        router.handle_join(&conn("a"), None);
        assert!(router.outbox().sent.is_empty());
        assert_eq!(router.registry().room_count(), 0);
    }

    #[test]
    fn targeted_signal_reaches_only_target() {
        let mut router = router();
        for c in ["a", "b", "c"] {
            router.handle_join(&conn(c), Some(&room("r")));
        }
        router.outbox_mut().take();

        let payload = json!({"type": "offer", "sdp": "v=0"});
        router.handle_signal(&conn("a"), signal(Some("r"), Some("b"), Some(payload.clone())));

        assert_eq!(
            router.outbox_mut().take(),
            vec![(conn("b"), ServerMessage::Signal { from: conn("a"), data: payload })]
        );
    }

    #[test]
    fn targeted_signal_ignores_room_membership() {
        let mut router = router();
        router.handle_signal(&conn("a"), signal(Some("elsewhere"), Some("z"), Some(json!(1))));
        assert_eq!(
            router.outbox_mut().take(),
            vec![(conn("z"), ServerMessage::Signal { from: conn("a"), data: json!(1) })]
        );
        assert_eq!(router.registry().room_count(), 0);
    }

    #[test]
    fn untargeted_signal_broadcasts_except_sender() {
        let mut router = router();
        for c in ["a", "b", "c"] {
            router.handle_join(&conn(c), Some(&room("r")));
        }
        router.outbox_mut().take();

        let candidate = json!({"candidate": "candidate:0 1 UDP 1 10.0.0.2 9 typ host"});
        router.handle_signal(&conn("a"), signal(Some("r"), None, Some(candidate.clone())));

        let expected = ServerMessage::Signal {
            from: conn("a"),
            data: candidate,
        };
        assert_eq!(
            sorted(router.outbox_mut().take()),
            vec![(conn("b"), expected.clone()), (conn("c"), expected)]
        );
    }

    #[test]
    fn empty_target_is_treated_as_broadcast() {
        let mut router = router();
        router.handle_join(&conn("a"), Some(&room("r")));
        router.handle_join(&conn("b"), Some(&room("r")));
        router.outbox_mut().take();

        router.handle_signal(&conn("a"), signal(Some("r"), Some(""), Some(json!("x"))));
        let sent = router.outbox_mut().take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, conn("b"));
    }

    #[test]
    fn malformed_signals_are_dropped() {
        let mut router = router();
        router.handle_join(&conn("a"), Some(&room("r")));
        router.handle_join(&conn("b"), Some(&room("r")));
        router.outbox_mut().take();

        router.handle_signal(&conn("a"), signal(Some("r"), None, None));
        router.handle_signal(&conn("a"), signal(Some("r"), Some("b"), None));
        router.handle_signal(&conn("a"), signal(None, Some("b"), Some(json!(1))));
        router.handle_signal(&conn("a"), signal(Some(""), None, Some(json!(1))));
        router.handle_signal(&conn("a"), SignalEnvelope::default());

        assert!(router.outbox().sent.is_empty());
        assert_eq!(router.registry().membership_count(), 2);
    }

    #[test]
    fn empty_string_data_is_dropped() {
        let mut router = router();
        router.handle_join(&conn("a"), Some(&room("r")));
        router.handle_join(&conn("b"), Some(&room("r")));
        router.outbox_mut().take();

        router.handle_signal(&conn("a"), signal(Some("r"), None, Some(json!(""))));
        router.handle_signal(&conn("a"), signal(Some("r"), Some("b"), Some(json!(""))));
        router.handle_signal(&conn("a"), signal(Some("r"), None, Some(Value::Null)));
        assert!(router.outbox().sent.is_empty());

        // Falsy but non-empty payloads are still relayed untouched.
        router.handle_signal(&conn("a"), signal(Some("r"), Some("b"), Some(json!(0))));
        assert_eq!(
            router.outbox_mut().take(),
            vec![(conn("b"), ServerMessage::Signal { from: conn("a"), data: json!(0) })]
        );
    }

    #[test]
    fn rejoin_resends_room_info_and_peer_joined() {
        let mut router = router();
        router.handle_join(&conn("a"), Some(&room("r")));
        router.handle_join(&conn("b"), Some(&room("r")));
        router.outbox_mut().take();

        router.handle_join(&conn("a"), Some(&room("r")));
        assert_eq!(
            router.outbox_mut().take(),
            vec![
                (conn("a"), ServerMessage::RoomInfo { peers: vec![conn("b")] }),
                (conn("b"), ServerMessage::PeerJoined { socket_id: conn("a") }),
            ]
        );
        assert_eq!(router.registry().membership_count(), 2);
    }

    #[test]
    fn leave_notifies_remaining_members() {
        let mut router = router();
        router.handle_join(&conn("a"), Some(&room("r")));
        router.handle_join(&conn("b"), Some(&room("r")));
        router.outbox_mut().take();

        router.handle_leave(&conn("a"), Some(&room("r")));
        assert_eq!(
            router.outbox_mut().take(),
            vec![(conn("b"), ServerMessage::PeerLeft { socket_id: conn("a") })]
        );
    }

    #[test]
    fn leave_when_not_member_is_silent() {
        let mut router = router();
        router.handle_join(&conn("b"), Some(&room("r")));
        router.outbox_mut().take();

        router.handle_leave(&conn("a"), Some(&room("r")));
        router.handle_leave(&conn("a"), Some(&room("missing")));
        router.handle_leave(&conn("a"), None);

        assert!(router.outbox().sent.is_empty());
        assert_eq!(router.registry().membership_count(), 1);
    }

    #[test]
    fn last_leave_deletes_room() {
        let mut router = router();
        router.handle_join(&conn("a"), Some(&room("r")));
        router.outbox_mut().take();

        router.handle_leave(&conn("a"), Some(&room("r")));
        assert!(router.outbox().sent.is_empty());
        assert!(!router.registry().contains_room(&room("r")));

        router.handle_join(&conn("b"), Some(&room("r")));
        assert_eq!(
            router.outbox_mut().take(),
            vec![(conn("b"), ServerMessage::RoomInfo { peers: vec![] })]
        );
    }

    #[test]
    fn disconnect_cleans_up_every_room() {
        let mut router = router();
        router.handle_join(&conn("a"), Some(&room("r1")));
        router.handle_join(&conn("b"), Some(&room("r1")));
        router.handle_join(&conn("a"), Some(&room("r2")));
        router.handle_join(&conn("c"), Some(&room("r2")));
        router.handle_join(&conn("a"), Some(&room("r3")));
        router.outbox_mut().take();

        router.handle_disconnect(&conn("a"));

        let left = ServerMessage::PeerLeft { socket_id: conn("a") };
        assert_eq!(
            sorted(router.outbox_mut().take()),
            vec![(conn("b"), left.clone()), (conn("c"), left)]
        );
        assert!(router.registry().contains_room(&room("r1")));
        assert!(router.registry().contains_room(&room("r2")));
        assert!(!router.registry().contains_room(&room("r3")));
        assert_eq!(router.registry().rooms_of(&conn("a")).count(), 0);
    }

    #[test]
    fn disconnect_after_leave_is_silent() {
        let mut router = router();
        router.handle_join(&conn("a"), Some(&room("r")));
        router.handle_join(&conn("b"), Some(&room("r")));
        router.handle_leave(&conn("a"), Some(&room("r")));
        router.outbox_mut().take();

        router.handle_disconnect(&conn("a"));
        router.handle_disconnect(&conn("a"));
        assert!(router.outbox().sent.is_empty());
    }
}
