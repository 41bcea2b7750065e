//! WebSocket rendezvous and relay for two-party call signaling

mod actor;
mod coordinator;
mod messages;
mod registry;
mod server;
mod types;

pub use actor::SessionHandle;
pub use messages::{ClientEvent, ServerEvent};
pub use server::{DEFAULT_PORT, SignalingServer};
pub use types::{ConnId, MAX_FIELD_LEN, OutboundMessage, Password, ProtocolError, RoomName};
