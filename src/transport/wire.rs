//! Wire encoding for traffic packets.
//!
//! `Coords (length-prefixed) | Handle (8) | Nonce (24) | Payload (ciphertext)`.
//! Fixed-width big-endian integer fields, mirroring the byte-oriented style
//! used throughout [`crate::crypto::nonce`]'s counter encoding.

use crate::core::constants::{HANDLE_SIZE, NONCE_SIZE};
use crate::crypto::{Handle, Nonce};

/// A decoded traffic packet (header fields plus ciphertext payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficPacket {
    /// Routing coordinates, possibly with an appended flow-key suffix.
    pub coords: Vec<u8>,
    /// Receiver's local session handle.
    pub handle: Handle,
    /// AEAD nonce under which `payload` was sealed.
    pub nonce: Nonce,
    /// Sealed ciphertext (includes the AEAD tag).
    pub payload: Vec<u8>,
}

impl TrafficPacket {
    /// Encode into wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.coords.len() + HANDLE_SIZE + NONCE_SIZE + self.payload.len());
        out.extend_from_slice(&(self.coords.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.coords);
        out.extend_from_slice(self.handle.as_bytes());
        out.extend_from_slice(self.nonce.as_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode from wire bytes. Returns `None` on any length mismatch; the
    /// receive pipeline treats a malformed packet the same as a dropped
    /// one.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 2 {
            return None;
        }
        let coords_len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        let mut pos: usize = 2;
        let coords_end = pos.checked_add(coords_len)?;
        let coords = bytes.get(pos..coords_end)?.to_vec();
        pos = coords_end;

        let handle_end = pos.checked_add(HANDLE_SIZE)?;
        let handle_bytes: [u8; HANDLE_SIZE] = bytes.get(pos..handle_end)?.try_into().ok()?;
        pos = handle_end;

        let nonce_end = pos.checked_add(NONCE_SIZE)?;
        let nonce_bytes: [u8; NONCE_SIZE] = bytes.get(pos..nonce_end)?.try_into().ok()?;
        pos = nonce_end;

        let payload = bytes.get(pos..)?.to_vec();

        Some(Self {
            coords,
            handle: Handle::from(handle_bytes),
            nonce: Nonce::from_bytes(nonce_bytes),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_exactly() {
        let pkt = TrafficPacket {
            coords: vec![1, 2, 3],
            handle: Handle::generate(),
            nonce: Nonce::initial(true),
            payload: vec![9, 9, 9, 9],
        };
        let bytes = pkt.encode();
        let decoded = TrafficPacket::decode(&bytes).unwrap();
        assert_eq!(pkt, decoded);
    }

    #[test]
    fn rejects_truncated_input() {
        let pkt = TrafficPacket {
            coords: vec![1, 2, 3],
            handle: Handle::generate(),
            nonce: Nonce::initial(false),
            payload: vec![9, 9, 9, 9],
        };
        let bytes = pkt.encode();
        assert!(TrafficPacket::decode(&bytes[..bytes.len() - 1]).is_none());
    }

    #[test]
    fn empty_coords_and_payload_roundtrip() {
        let pkt = TrafficPacket {
            coords: Vec::new(),
            handle: Handle::generate(),
            nonce: Nonce::initial(true),
            payload: Vec::new(),
        };
        let bytes = pkt.encode();
        assert_eq!(TrafficPacket::decode(&bytes).unwrap(), pkt);
    }
}
