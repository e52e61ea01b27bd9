//! Cryptographic primitives: X25519 key agreement, XChaCha20-Poly1305
//! sealing, the nonce/parity discipline, and the out-of-order replay
//! window.

mod aead;
mod keys;
mod nonce;
mod session;
mod window;

pub use aead::{open, seal, SharedKey};
pub use keys::{Handle, PermKeypair, SesKeypair};
pub use nonce::{my_parity, Nonce};
pub use session::SessionCrypto;
pub use window::NonceWindow;
