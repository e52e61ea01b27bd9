//! Wire encoding shared by the handshake and traffic packet formats.
//!
//! Framing, RTT pacing, and connection migration are explicitly out of
//! scope (see the crate's top-level documentation) — this module only
//! carries the byte-level encode/decode helpers the session manager
//! needs to talk to its [`crate::core::Router`] collaborator.

pub mod wire;

pub use wire::TrafficPacket;
