//! Shared-key derivation and AEAD seal/open for traffic and handshake
//! packets.
//!
//! Key agreement is plain X25519; the raw DH output is never used
//! directly as a symmetric key. As elsewhere in this crate's key
//! schedule, it is passed through a labeled BLAKE2s hash first.

use blake2::{Blake2s256, Digest};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use zeroize::Zeroize;

use crate::core::constants::KEY_SIZE;
use crate::core::error::CryptoError;

use super::nonce::Nonce;

/// A derived symmetric key. Zeroized on drop.
#[derive(Clone)]
pub struct SharedKey([u8; KEY_SIZE]);

impl SharedKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// `Box-derive(priv, pub)`: label the raw DH output with BLAKE2s so
    /// the symmetric key is never literally the DH shared point.
    pub fn derive(dh_output: &[u8; KEY_SIZE]) -> Self {
        let mut hasher = Blake2s256::new();
        hasher.update(b"mesh session v1 box-derive");
        hasher.update(dh_output);
        let digest = hasher.finalize();
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl Drop for SharedKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Seal `plaintext` under `key` and `nonce`. `aad` is the packet header
/// bytes that travel alongside the ciphertext and are authenticated but
/// not encrypted.
pub fn seal(key: &SharedKey, nonce: &Nonce, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    key.cipher()
        .encrypt(
            XNonce::from_slice(nonce.as_bytes()),
            Payload { msg: plaintext, aad },
        )
        .map_err(|_| CryptoError::SealFailed)
}

/// Open `ciphertext` under `key` and `nonce`, verifying `aad`.
pub fn open(key: &SharedKey, nonce: &Nonce, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    key.cipher()
        .decrypt(
            XNonce::from_slice(nonce.as_bytes()),
            Payload { msg: ciphertext, aad },
        )
        .map_err(|_| CryptoError::OpenFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = SharedKey::derive(&[7u8; KEY_SIZE]);
        let nonce = Nonce::initial(true);
        let aad = b"header";
        let ct = seal(&key, &nonce, aad, b"hello mesh").unwrap();
        let pt = open(&key, &nonce, aad, &ct).unwrap();
        assert_eq!(pt, b"hello mesh");
    }

    #[test]
    fn wrong_key_fails_open() {
        let key_a = SharedKey::derive(&[1u8; KEY_SIZE]);
        let key_b = SharedKey::derive(&[2u8; KEY_SIZE]);
        let nonce = Nonce::initial(false);
        let ct = seal(&key_a, &nonce, b"", b"secret").unwrap();
        assert!(open(&key_b, &nonce, b"", &ct).is_err());
    }

    #[test]
    fn wrong_aad_fails_open() {
        let key = SharedKey::derive(&[3u8; KEY_SIZE]);
        let nonce = Nonce::initial(false);
        let ct = seal(&key, &nonce, b"aad-1", b"secret").unwrap();
        assert!(open(&key, &nonce, b"aad-2", &ct).is_err());
    }

    #[test]
    fn derive_is_deterministic() {
        let a = SharedKey::derive(&[5u8; KEY_SIZE]);
        let b = SharedKey::derive(&[5u8; KEY_SIZE]);
        let nonce = Nonce::initial(true);
        let ct_a = seal(&a, &nonce, b"", b"x").unwrap();
        assert!(open(&b, &nonce, b"", &ct_a).is_ok());
    }
}
