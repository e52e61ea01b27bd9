//! X25519 key material: long-lived identity keys, ephemeral session keys,
//! and the local session handle.

use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::core::constants::{HANDLE_SIZE, KEY_SIZE};

/// A long-lived X25519 identity keypair (`PermPub`/`PermPriv` in the data
/// model). The private half is zeroized on drop.
pub struct PermKeypair {
    private: [u8; KEY_SIZE],
    public: [u8; KEY_SIZE],
}

impl PermKeypair {
    /// Generate a new random identity keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            private: secret.to_bytes(),
            public: public.to_bytes(),
        }
    }

    /// Reconstruct a keypair from raw bytes (e.g. loaded from config).
    pub fn from_private_bytes(private: [u8; KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(private);
        let public = PublicKey::from(&secret);
        Self {
            private: secret.to_bytes(),
            public: public.to_bytes(),
        }
    }

    /// The public half (`PermPub`).
    pub fn public(&self) -> [u8; KEY_SIZE] {
        self.public
    }

    /// The private half, for persisting this identity across restarts.
    pub fn private_bytes(&self) -> [u8; KEY_SIZE] {
        self.private
    }

    /// Diffie-Hellman with a peer's permanent public key.
    pub fn diffie_hellman(&self, their_public: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
        let secret = StaticSecret::from(self.private);
        let public = PublicKey::from(*their_public);
        secret.diffie_hellman(&public).to_bytes()
    }
}

impl Drop for PermKeypair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

/// An ephemeral, per-session X25519 keypair (`SesPub`/`SesPriv`).
/// Regenerated every time a session is (re-)created or rekeyed.
pub struct SesKeypair {
    private: [u8; KEY_SIZE],
    public: [u8; KEY_SIZE],
}

impl SesKeypair {
    /// Generate a fresh ephemeral keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            private: secret.to_bytes(),
            public: public.to_bytes(),
        }
    }

    /// The public half (`SesPub`), sent in handshake packets.
    pub fn public(&self) -> [u8; KEY_SIZE] {
        self.public
    }

    /// `Box-derive(mySesPriv, theirSesPub)`: the raw DH output feeding the
    /// shared-key KDF in [`crate::crypto::aead`].
    pub fn diffie_hellman(&self, their_public: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
        let secret = StaticSecret::from(self.private);
        let public = PublicKey::from(*their_public);
        secret.diffie_hellman(&public).to_bytes()
    }
}

impl Drop for SesKeypair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

/// An 8-byte, node-local session handle. Random, not globally unique —
/// collisions are resolved by the session table at insertion time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Handle(pub [u8; HANDLE_SIZE]);

impl Handle {
    /// Generate a new random handle.
    pub fn generate() -> Self {
        let mut bytes = [0u8; HANDLE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// View as a byte slice.
    pub fn as_bytes(&self) -> &[u8; HANDLE_SIZE] {
        &self.0
    }
}

impl From<[u8; HANDLE_SIZE]> for Handle {
    fn from(bytes: [u8; HANDLE_SIZE]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_agreement_matches_both_ways() {
        let a = PermKeypair::generate();
        let b = PermKeypair::generate();
        assert_eq!(a.diffie_hellman(&b.public()), b.diffie_hellman(&a.public()));
    }

    #[test]
    fn ephemeral_keys_differ_per_session() {
        let a = SesKeypair::generate();
        let b = SesKeypair::generate();
        assert_ne!(a.public(), b.public());
    }

    #[test]
    fn handles_are_random() {
        let a = Handle::generate();
        let b = Handle::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn perm_keypair_roundtrips_from_bytes() {
        let a = PermKeypair::generate();
        let restored = PermKeypair::from_private_bytes(a.private);
        assert_eq!(a.public(), restored.public());
    }
}
