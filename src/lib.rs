//! Switchboard: a rendezvous and relay server that pairs two clients into a
//! password-protected room and shuttles their call-setup messages between
//! them until either side hangs up.

pub mod signaling;
