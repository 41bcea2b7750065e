use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::info;

use super::coordinator::{Coordinator, Transport};
use super::messages::{ClientEvent, ServerEvent};
use super::types::{ConnId, Outbound, OutboundMessage};

/// Notifications sent to the session actor
pub(crate) enum SessionCommand {
    Connected {
        conn: ConnId,
        tx: mpsc::UnboundedSender<Outbound>,
    },
    Event {
        conn: ConnId,
        event: ClientEvent,
    },
    Disconnected {
        conn: ConnId,
    },
}

/// Per-connection outbound channels; the production [`Transport`].
#[derive(Default)]
struct PeerLinks {
    links: HashMap<ConnId, mpsc::UnboundedSender<Outbound>>,
}

impl Transport for PeerLinks {
    fn send(&mut self, conn: ConnId, event: ServerEvent) {
        let Some(tx) = self.links.get(&conn) else {
            return;
        };
        let json =
            serde_json::to_string(&event).expect("server event serialization should never fail");
        let _ = tx.send(Outbound::Event(OutboundMessage::from(json)));
    }

    fn close(&mut self, conn: ConnId) {
        if let Some(tx) = self.links.get(&conn) {
            let _ = tx.send(Outbound::Close);
        }
    }
}

/// Single task owning the coordinator. Commands arrive over one channel, so
/// every registry and association mutation is serialized here.
pub(crate) async fn session_actor(mut rx: mpsc::Receiver<SessionCommand>) {
    let mut links = PeerLinks::default();
    let mut coordinator = Coordinator::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            SessionCommand::Connected { conn, tx } => {
                links.links.insert(conn, tx);
                info!("connected: {}", conn);
            }
            SessionCommand::Event { conn, event } => {
                coordinator.handle_event(&mut links, conn, event);
            }
            SessionCommand::Disconnected { conn } => {
                links.links.remove(&conn);
                coordinator.handle_disconnect(&mut links, conn);
                info!("disconnected: {}", conn);
            }
        }
    }
}

/// Handle to communicate with the session actor
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Register a freshly accepted connection and its outbound channel.
    pub(crate) async fn connected(&self, conn: ConnId, tx: mpsc::UnboundedSender<Outbound>) {
        let _ = self.tx.send(SessionCommand::Connected { conn, tx }).await;
    }

    /// Deliver one inbound client event.
    pub(crate) async fn event(&self, conn: ConnId, event: ClientEvent) {
        let _ = self.tx.send(SessionCommand::Event { conn, event }).await;
    }

    /// Report that the connection is gone. Sent exactly once, from the
    /// connection task's single exit path.
    pub(crate) async fn disconnected(&self, conn: ConnId) {
        let _ = self.tx.send(SessionCommand::Disconnected { conn }).await;
    }
}
