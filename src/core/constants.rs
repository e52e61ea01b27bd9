//! Fixed protocol constants.
//!
//! Values here are fixed by the design and MUST NOT be changed by callers;
//! tunables that callers are expected to configure live in
//! [`crate::core::SessionManagerConfig`] instead.

use std::time::Duration;

// =============================================================================
// KEY AND NONCE SIZES
// =============================================================================

/// X25519 public/private key size.
pub const KEY_SIZE: usize = 32;

/// Nonce size used by the traffic AEAD (XChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Local session handle size.
pub const HANDLE_SIZE: usize = 8;

// =============================================================================
// MTU
// =============================================================================

/// Minimum MTU any session will advertise or honor. Values below this (and
/// the sentinel 0, meaning "unspecified") leave the floor in effect.
pub const MTU_FLOOR: u16 = 1280;

// =============================================================================
// NONCE WINDOW (anti-replay, out-of-order tolerance)
// =============================================================================

/// Wall-clock duration a nonce is retained in the out-of-order window.
pub const NONCE_WINDOW_DURATION: Duration = Duration::from_secs(1);

/// Hard cap on the number of nonces retained in the out-of-order window.
pub const NONCE_WINDOW_CAPACITY: usize = 64;

// =============================================================================
// QUEUE DEPTHS
// =============================================================================

/// Bounded depth of a session's outbound (plaintext-to-seal) queue.
pub const SEND_QUEUE_DEPTH: usize = 32;

/// Bounded depth of a session's delivered-plaintext queue.
pub const RECV_QUEUE_DEPTH: usize = 32;

/// Bounded depth of the pre-decrypt staging queue (head-of-line throttle).
pub const RECV_STAGING_DEPTH: usize = 64;

// =============================================================================
// SHARED-KEY CACHE
// =============================================================================

/// Soft cap on entries in the protocol shared-key cache.
pub const SHARED_KEY_CACHE_CAPACITY: usize = 1024;

// =============================================================================
// TABLE MAINTENANCE
// =============================================================================

/// Minimum interval between two cleanup sweeps of the session table.
pub const CLEANUP_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// =============================================================================
// WIRE ENCODING TAGS
// =============================================================================

/// Packet kind byte: ping/pong handshake.
pub const PACKET_KIND_HANDSHAKE: u8 = 0x01;

/// Packet kind byte: sealed traffic.
pub const PACKET_KIND_TRAFFIC: u8 = 0x02;

/// Marker byte preceding an appended 8-byte big-endian flow key in coords.
pub const FLOW_KEY_MARKER: u8 = 0x00;
