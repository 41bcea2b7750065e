use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info};

use super::messages::{ClientEvent, ServerEvent, join_args};
use super::registry::RoomRegistry;
use super::types::{ConnId, Password, ProtocolError, RoomName};

/// Outbound half of the transport as seen by the coordinator: deliver one
/// event to a connection, or tear a connection down. The production
/// implementation lives beside the session actor; tests substitute a
/// recording stub.
pub(crate) trait Transport {
    fn send(&mut self, conn: ConnId, event: ServerEvent);
    fn close(&mut self, conn: ConnId);
}

enum JoinOutcome {
    Created,
    Paired,
}

/// The pairing state machine. Owns the room registry and the
/// connection-to-room association map; the session actor is its only caller
/// and serializes every mutation.
pub(crate) struct Coordinator {
    registry: RoomRegistry,
    associations: HashMap<ConnId, RoomName>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            registry: RoomRegistry::default(),
            associations: HashMap::new(),
        }
    }

    pub fn handle_event(
        &mut self,
        transport: &mut impl Transport,
        conn: ConnId,
        event: ClientEvent,
    ) {
        match event {
            ClientEvent::Join(args) => self.join(transport, conn, &args),
            ClientEvent::SendSessionDescription(payload) => {
                self.relay(transport, conn, payload, ServerEvent::SessionDescription);
            }
            ClientEvent::SendIceCandidate(payload) => {
                self.relay(transport, conn, payload, ServerEvent::IceCandidate);
            }
        }
    }

    /// Disconnect cleanup. Safe to re-enter: the forced close of the peer
    /// triggers the peer's own disconnect notification, and whichever handler
    /// runs second finds nothing left to remove.
    pub fn handle_disconnect(&mut self, transport: &mut impl Transport, conn: ConnId) {
        // peer resolution must precede any mutation
        if let Some(peer) = self.resolve_peer(conn) {
            transport.close(peer);
        }

        let Some(name) = self.associations.remove(&conn) else {
            return;
        };
        self.registry.delete(&name);
        info!("room {} closed", name);
    }

    /// The paired counterpart of `conn`, recomputed from the registry on
    /// every call. Any inconsistency resolves to `None`.
    pub fn resolve_peer(&self, conn: ConnId) -> Option<ConnId> {
        let name = self.associations.get(&conn)?;
        let room = self.registry.get(name)?;
        room.peer_of(conn)
    }

    fn join(&mut self, transport: &mut impl Transport, conn: ConnId, args: &Value) {
        let reply = match join_args(args) {
            Ok((name, password)) => match self.try_join(conn, name, password) {
                Ok(JoinOutcome::Created) => ServerEvent::RoomCreated,
                Ok(JoinOutcome::Paired) => ServerEvent::RoomJoined,
                Err(err) => ServerEvent::failure(err),
            },
            Err(err) => {
                debug!("join rejected for {}: {}", conn, err);
                ServerEvent::failure(err)
            }
        };
        transport.send(conn, reply);
    }

    fn try_join(
        &mut self,
        conn: ConnId,
        name: RoomName,
        password: Password,
    ) -> Result<JoinOutcome, ProtocolError> {
        match self.registry.get_mut(&name) {
            None => {
                self.registry
                    .create(name.clone(), password, conn)
                    .expect("existence is checked before create");
                info!("room {} created by {}", name, conn);
                self.associations.insert(conn, name);
                Ok(JoinOutcome::Created)
            }
            Some(room) => {
                if room.password != password {
                    debug!("join rejected for {}: wrong password", conn);
                    return Err(ProtocolError::WrongPassword);
                }
                if room.caller.is_some() {
                    debug!("join rejected for {}: room {} is full", conn, name);
                    return Err(ProtocolError::LineBusy);
                }
                room.caller = Some(conn);
                info!("room {} paired with {}", name, conn);
                self.associations.insert(conn, name);
                Ok(JoinOutcome::Paired)
            }
        }
    }

    fn relay(
        &mut self,
        transport: &mut impl Transport,
        conn: ConnId,
        payload: Value,
        wrap: fn(Value) -> ServerEvent,
    ) {
        match self.resolve_peer(conn) {
            Some(peer) => transport.send(peer, wrap(payload)),
            None => transport.send(conn, ServerEvent::failure(ProtocolError::NoPeer)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Vec<(ConnId, ServerEvent)>,
        closed: Vec<ConnId>,
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, conn: ConnId, event: ServerEvent) {
            self.sent.push((conn, event));
        }

        fn close(&mut self, conn: ConnId) {
            self.closed.push(conn);
        }
    }

    fn conn(s: &str) -> ConnId {
        ConnId::from(s)
    }

    fn name(s: &str) -> RoomName {
        RoomName::new(s).unwrap()
    }

    fn join(
        coordinator: &mut Coordinator,
        transport: &mut RecordingTransport,
        conn: ConnId,
        room: &str,
        password: &str,
    ) {
        let args = json!({"roomName": room, "password": password});
        coordinator.handle_event(transport, conn, ClientEvent::Join(args));
    }

    #[test]
    fn first_join_creates_room() {
        let mut coordinator = Coordinator::new();
        let mut transport = RecordingTransport::default();
        let a = conn("conn_aaaaaaaa");

        join(&mut coordinator, &mut transport, a, "alpha", "pw");

        assert_eq!(transport.sent, vec![(a, ServerEvent::RoomCreated)]);
        assert_eq!(coordinator.associations.get(&a), Some(&name("alpha")));
        assert!(coordinator.registry.get(&name("alpha")).is_some());
    }

    #[test]
    fn second_join_pairs_the_room() {
        let mut coordinator = Coordinator::new();
        let mut transport = RecordingTransport::default();
        let a = conn("conn_aaaaaaaa");
        let b = conn("conn_bbbbbbbb");

        join(&mut coordinator, &mut transport, a, "alpha", "pw");
        join(&mut coordinator, &mut transport, b, "alpha", "pw");

        // each join is acknowledged to its own sender only
        assert_eq!(
            transport.sent,
            vec![(a, ServerEvent::RoomCreated), (b, ServerEvent::RoomJoined)]
        );
        assert_eq!(coordinator.resolve_peer(a), Some(b));
        assert_eq!(coordinator.resolve_peer(b), Some(a));
    }

    #[test]
    fn wrong_password_is_rejected_without_state_change() {
        let mut coordinator = Coordinator::new();
        let mut transport = RecordingTransport::default();
        let a = conn("conn_aaaaaaaa");
        let b = conn("conn_bbbbbbbb");

        join(&mut coordinator, &mut transport, a, "alpha", "pw");
        join(&mut coordinator, &mut transport, b, "alpha", "wrong");

        assert_eq!(
            transport.sent[1],
            (b, ServerEvent::OperationFailed("wrong password".into()))
        );
        let room = coordinator.registry.get(&name("alpha")).unwrap();
        assert_eq!(room.callee, a);
        assert!(room.caller.is_none());
        assert!(!coordinator.associations.contains_key(&b));
    }

    #[test]
    fn paired_room_rejects_a_third_join() {
        let mut coordinator = Coordinator::new();
        let mut transport = RecordingTransport::default();
        let a = conn("conn_aaaaaaaa");
        let b = conn("conn_bbbbbbbb");
        let c = conn("conn_cccccccc");

        join(&mut coordinator, &mut transport, a, "alpha", "pw");
        join(&mut coordinator, &mut transport, b, "alpha", "pw");
        join(&mut coordinator, &mut transport, c, "alpha", "pw");

        assert_eq!(
            transport.sent[2],
            (c, ServerEvent::OperationFailed("line busy".into()))
        );
        let room = coordinator.registry.get(&name("alpha")).unwrap();
        assert_eq!(room.callee, a);
        assert_eq!(room.caller, Some(b));
        assert!(!coordinator.associations.contains_key(&c));
    }

    #[test]
    fn invalid_join_arguments_create_nothing() {
        let mut coordinator = Coordinator::new();
        let mut transport = RecordingTransport::default();
        let a = conn("conn_aaaaaaaa");

        let oversized = json!({"roomName": "a".repeat(31), "password": "pw"});
        coordinator.handle_event(&mut transport, a, ClientEvent::Join(oversized));
        let non_string = json!({"roomName": "alpha", "password": 12});
        coordinator.handle_event(&mut transport, a, ClientEvent::Join(non_string));
        let non_object = json!("alpha");
        coordinator.handle_event(&mut transport, a, ClientEvent::Join(non_object));

        for (to, event) in &transport.sent {
            assert_eq!(*to, a);
            assert_eq!(
                *event,
                ServerEvent::OperationFailed("invalid arguments".into())
            );
        }
        assert!(coordinator.registry.is_empty());
        assert!(coordinator.associations.is_empty());
    }

    #[test]
    fn relay_reaches_only_the_peer() {
        let mut coordinator = Coordinator::new();
        let mut transport = RecordingTransport::default();
        let a = conn("conn_aaaaaaaa");
        let b = conn("conn_bbbbbbbb");

        join(&mut coordinator, &mut transport, a, "alpha", "pw");
        join(&mut coordinator, &mut transport, b, "alpha", "pw");
        transport.sent.clear();

        let payload = json!({"sdp": "x"});
        coordinator.handle_event(
            &mut transport,
            a,
            ClientEvent::SendSessionDescription(payload.clone()),
        );

        assert_eq!(
            transport.sent,
            vec![(b, ServerEvent::SessionDescription(payload))]
        );
    }

    #[test]
    fn ice_candidates_relay_both_directions() {
        let mut coordinator = Coordinator::new();
        let mut transport = RecordingTransport::default();
        let a = conn("conn_aaaaaaaa");
        let b = conn("conn_bbbbbbbb");

        join(&mut coordinator, &mut transport, a, "alpha", "pw");
        join(&mut coordinator, &mut transport, b, "alpha", "pw");
        transport.sent.clear();

        coordinator.handle_event(&mut transport, b, ClientEvent::SendIceCandidate(json!("c0")));
        coordinator.handle_event(&mut transport, a, ClientEvent::SendIceCandidate(json!("c1")));

        assert_eq!(
            transport.sent,
            vec![
                (a, ServerEvent::IceCandidate(json!("c0"))),
                (b, ServerEvent::IceCandidate(json!("c1"))),
            ]
        );
    }

    #[test]
    fn relay_without_association_fails_with_no_peer() {
        let mut coordinator = Coordinator::new();
        let mut transport = RecordingTransport::default();
        let a = conn("conn_aaaaaaaa");

        coordinator.handle_event(&mut transport, a, ClientEvent::SendIceCandidate(json!({})));

        assert_eq!(
            transport.sent,
            vec![(a, ServerEvent::OperationFailed("no peer".into()))]
        );
    }

    #[test]
    fn relay_in_an_unpaired_room_fails_with_no_peer() {
        let mut coordinator = Coordinator::new();
        let mut transport = RecordingTransport::default();
        let a = conn("conn_aaaaaaaa");

        join(&mut coordinator, &mut transport, a, "alpha", "pw");
        transport.sent.clear();

        coordinator.handle_event(
            &mut transport,
            a,
            ClientEvent::SendSessionDescription(json!({"sdp": "x"})),
        );

        assert_eq!(
            transport.sent,
            vec![(a, ServerEvent::OperationFailed("no peer".into()))]
        );
    }

    #[test]
    fn disconnect_closes_peer_and_deletes_room() {
        let mut coordinator = Coordinator::new();
        let mut transport = RecordingTransport::default();
        let a = conn("conn_aaaaaaaa");
        let b = conn("conn_bbbbbbbb");

        join(&mut coordinator, &mut transport, a, "alpha", "pw");
        join(&mut coordinator, &mut transport, b, "alpha", "pw");

        coordinator.handle_disconnect(&mut transport, a);

        assert_eq!(transport.closed, vec![b]);
        assert!(coordinator.registry.get(&name("alpha")).is_none());
        assert!(!coordinator.associations.contains_key(&a));

        // the forced close raises b's own disconnect notification
        coordinator.handle_disconnect(&mut transport, b);
        assert_eq!(transport.closed, vec![b]);
        assert!(coordinator.associations.is_empty());
    }

    #[test]
    fn room_name_is_reusable_after_teardown() {
        let mut coordinator = Coordinator::new();
        let mut transport = RecordingTransport::default();
        let a = conn("conn_aaaaaaaa");
        let b = conn("conn_bbbbbbbb");
        let c = conn("conn_cccccccc");

        join(&mut coordinator, &mut transport, a, "alpha", "pw");
        join(&mut coordinator, &mut transport, b, "alpha", "pw");
        coordinator.handle_disconnect(&mut transport, a);
        coordinator.handle_disconnect(&mut transport, b);
        transport.sent.clear();

        join(&mut coordinator, &mut transport, c, "alpha", "fresh");

        assert_eq!(transport.sent, vec![(c, ServerEvent::RoomCreated)]);
        assert_eq!(coordinator.registry.get(&name("alpha")).unwrap().callee, c);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut coordinator = Coordinator::new();
        let mut transport = RecordingTransport::default();
        let a = conn("conn_aaaaaaaa");
        let b = conn("conn_bbbbbbbb");

        join(&mut coordinator, &mut transport, a, "alpha", "pw");
        join(&mut coordinator, &mut transport, b, "alpha", "pw");

        coordinator.handle_disconnect(&mut transport, a);
        coordinator.handle_disconnect(&mut transport, a);

        assert_eq!(transport.closed, vec![b]);
        assert!(coordinator.registry.is_empty());
    }

    #[test]
    fn disconnect_of_an_unjoined_connection_is_a_noop() {
        let mut coordinator = Coordinator::new();
        let mut transport = RecordingTransport::default();

        coordinator.handle_disconnect(&mut transport, conn("conn_aaaaaaaa"));

        assert!(transport.sent.is_empty());
        assert!(transport.closed.is_empty());
    }

    #[test]
    fn full_session_scenario() {
        let mut coordinator = Coordinator::new();
        let mut transport = RecordingTransport::default();
        let a = conn("conn_aaaaaaaa");
        let b = conn("conn_bbbbbbbb");

        join(&mut coordinator, &mut transport, a, "alpha", "pw");
        assert_eq!(transport.sent.pop(), Some((a, ServerEvent::RoomCreated)));

        join(&mut coordinator, &mut transport, b, "alpha", "pw");
        assert_eq!(transport.sent.pop(), Some((b, ServerEvent::RoomJoined)));

        coordinator.handle_event(
            &mut transport,
            a,
            ClientEvent::SendSessionDescription(json!({"sdp": "x"})),
        );
        assert_eq!(
            transport.sent.pop(),
            Some((b, ServerEvent::SessionDescription(json!({"sdp": "x"}))))
        );

        coordinator.handle_disconnect(&mut transport, b);
        assert_eq!(transport.closed, vec![a]);
        assert!(coordinator.registry.get(&name("alpha")).is_none());
    }
}
