//! Per-session cryptographic state: the derived shared key plus seal/open
//! convenience methods used by the send/receive pipelines.

use crate::core::error::CryptoError;

use super::aead::{open, seal, SharedKey};
use super::nonce::Nonce;

/// The symmetric key and seal/open operations for one session.
///
/// Unlike a Noise-style transport that splits into independent send/recv
/// keys, this design uses a single `sharedSesKey` derived from the two
/// ephemeral public keys; the nonce's fixed per-endpoint parity is what
/// keeps the two directions' ciphertexts from ever using the same
/// `(key, nonce)` pair.
pub struct SessionCrypto {
    shared_key: SharedKey,
}

impl SessionCrypto {
    /// Wrap an already-derived shared key.
    pub fn new(shared_key: SharedKey) -> Self {
        Self { shared_key }
    }

    /// Re-derive from a fresh DH output (session rekey on ephemeral
    /// pubkey change).
    pub fn rekey(&mut self, dh_output: &[u8; 32]) {
        self.shared_key = SharedKey::derive(dh_output);
    }

    /// Seal a plaintext payload for transmission.
    pub fn seal(&self, nonce: &Nonce, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        seal(&self.shared_key, nonce, aad, plaintext)
    }

    /// Open a received ciphertext payload.
    pub fn open(&self, nonce: &Nonce, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        open(&self.shared_key, nonce, aad, ciphertext)
    }

    /// Clone the current shared key, for handing to a crypto worker pool
    /// job outside the session lock.
    pub fn shared_key(&self) -> SharedKey {
        self.shared_key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::KEY_SIZE;

    #[test]
    fn seal_then_open_roundtrips() {
        let crypto = SessionCrypto::new(SharedKey::derive(&[9u8; KEY_SIZE]));
        let nonce = Nonce::initial(true);
        let ct = crypto.seal(&nonce, b"hdr", b"payload").unwrap();
        assert_eq!(crypto.open(&nonce, b"hdr", &ct).unwrap(), b"payload");
    }

    #[test]
    fn rekey_invalidates_old_ciphertexts() {
        let mut crypto = SessionCrypto::new(SharedKey::derive(&[1u8; KEY_SIZE]));
        let nonce = Nonce::initial(true);
        let ct = crypto.seal(&nonce, b"", b"payload").unwrap();
        crypto.rekey(&[2u8; KEY_SIZE]);
        assert!(crypto.open(&nonce, b"", &ct).is_err());
    }
}
