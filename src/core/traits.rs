//! Interfaces for collaborators that live outside this crate's scope:
//! the switch/routing layer, the DHT, and anything else that decides how
//! an encoded packet actually reaches the wire.
//!
//! The session manager depends only on these traits, never on a concrete
//! transport, so it can be driven and tested without a real network.

use std::fmt;

use super::constants::KEY_SIZE;

/// Local, session-scoped identifier handed to admin/consumer code when a
/// new session is created (outbound, or inbound and admitted). Opaque
/// beyond equality and hashing — the manager resolves it back to session
/// state internally.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub [u8; 8]);

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionHandle({})", hex_bytes(&self.0))
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowReason {
    /// The peer may open or receive a session.
    Allowed,
    /// The peer was rejected, with a short human-readable reason.
    Denied(&'static str),
}

impl AllowReason {
    /// `true` if this is [`AllowReason::Allowed`].
    pub fn is_allowed(&self) -> bool {
        matches!(self, AllowReason::Allowed)
    }
}

/// Pluggable admission policy, evaluated before creating an outbound
/// session and before accepting an inbound ping that would create one.
pub trait AllowPolicy: Send + Sync + 'static {
    /// Decide whether `pubkey` may participate in a session.
    ///
    /// `initiator` is `true` when the local node is the one opening the
    /// session (outbound), `false` when an inbound ping is proposing one.
    fn is_allowed(&self, pubkey: &[u8; KEY_SIZE], initiator: bool) -> AllowReason;
}

/// The default policy: allow everyone. Suitable for tests and for nodes
/// that enforce admission at a layer above this crate.
pub struct AllowAll;

impl AllowPolicy for AllowAll {
    fn is_allowed(&self, _pubkey: &[u8; KEY_SIZE], _initiator: bool) -> AllowReason {
        AllowReason::Allowed
    }
}

/// Error returned by a [`Router`] when it cannot accept a packet for
/// delivery (e.g. its own outbound queue is closed).
#[derive(Debug, Clone)]
pub struct RouterError(pub String);

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "router error: {}", self.0)
    }
}

impl std::error::Error for RouterError {}

/// The switch/routing layer collaborator.
///
/// Handing a packet to a `Router` is a non-blocking enqueue: the manager
/// never awaits network I/O directly, only this call returning control.
/// Implementations that need to block internally should do so on their
/// own background task.
pub trait Router: Send + Sync + 'static {
    /// Hand an already-encoded packet addressed by `coords` to the router
    /// for delivery. `coords` may carry an appended flow-key suffix (see
    /// the send pipeline).
    fn deliver(&self, coords: &[u8], packet: Vec<u8>) -> Result<(), RouterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_allows_both_directions() {
        let policy = AllowAll;
        let key = [7u8; KEY_SIZE];
        assert!(policy.is_allowed(&key, true).is_allowed());
        assert!(policy.is_allowed(&key, false).is_allowed());
    }

    #[test]
    fn session_handle_debug_is_hex() {
        let h = SessionHandle([0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 1]);
        assert_eq!(format!("{h:?}"), "SessionHandle(deadbeef00000001)");
    }
}
