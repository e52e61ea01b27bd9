//! Error taxonomy for the session manager.
//!
//! Per the design, most of these never cross the session boundary as
//! exceptions: pipeline workers match on them, bump a counter, and keep
//! running. Only the public, boundary-crossing entry points on
//! [`crate::server::SessionManager`] return a [`MeshError`] to their caller.

use thiserror::Error;

/// Errors from the authenticated-encryption layer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// Key agreement or KDF produced unusable output.
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// AEAD seal failed (should not happen with well-formed input).
    #[error("seal failed")]
    SealFailed,

    /// AEAD open failed: wrong key, corrupted ciphertext, or forged tag.
    #[error("open failed: invalid tag")]
    OpenFailed,
}

/// Errors raised while processing a handshake (ping/pong) packet.
///
/// Every variant here is a *silent* rejection per the design: the packet is
/// dropped, a per-session counter is bumped, and no response is sent.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    /// `Tstamp` did not strictly increase; likely a replay.
    #[error("replayed or stale handshake timestamp")]
    ReplayTimestamp,

    /// The packet's permanent key does not match the session's recorded peer.
    #[error("permanent key does not match existing session")]
    HandleCollision,

    /// Inbound ping for an unknown session, but admission policy denied it.
    #[error("admission policy denied session")]
    PolicyDenied,

    /// An unsolicited pong cannot open a new session.
    #[error("pong cannot open a session")]
    PongCannotOpen,

    /// No listener is armed to accept new inbound sessions.
    #[error("no listener armed for inbound session")]
    NoListener,

    /// The packet failed to decode as a well-formed handshake message.
    #[error("malformed handshake packet: {0}")]
    Malformed(&'static str),
}

/// Errors raised while processing a decrypted traffic packet.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// The nonce window rejected this packet (replay or too old).
    #[error("invalid nonce")]
    InvalidNonce,

    /// `sharedSesKey` changed between submission and completion of the
    /// crypto job (a handshake update raced the in-flight packet).
    #[error("session updated during crypto op")]
    UpdatedDuringCrypto,

    /// The session's cancellation signal fired before the op completed.
    #[error("session cancelled")]
    Cancelled,

    /// Underlying AEAD failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Errors raised by the session table (lookup, creation, admission).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// No session exists for the requested handle or permanent key.
    #[error("no such session")]
    NotFound,

    /// Admission policy denied opening a new session.
    #[error("admission policy denied session")]
    PolicyDenied,

    /// The table is at its configured session capacity.
    #[error("session table full")]
    Full,
}

/// Top-level error type returned by boundary-crossing operations
/// (`SessionManager::open`, `SessionManager::close`, ...).
#[derive(Debug, Error)]
pub enum MeshError {
    /// Handshake-layer failure.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Session-layer failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Table-layer failure.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Crypto-layer failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The router collaborator rejected or failed to deliver a packet.
    #[error("router error: {0}")]
    Router(String),
}
