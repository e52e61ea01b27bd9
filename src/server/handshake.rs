//! The ping/pong handshake packet: wire encoding and the envelope that
//! seals it under the permanent-key shared secret (see [`super::table`]'s
//! shared-key cache).

use crate::core::constants::KEY_SIZE;
use crate::core::error::{CryptoError, HandshakeError};
use crate::crypto::{open, seal, Handle, Nonce, SharedKey};

/// The plaintext body of a ping or pong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePacket {
    /// Sender's permanent (long-lived) public key.
    pub send_perm_pub: [u8; KEY_SIZE],
    /// Sender's local handle for this session.
    pub handle: Handle,
    /// Sender's ephemeral session public key.
    pub send_ses_pub: [u8; KEY_SIZE],
    /// Unix-second timestamp; must strictly increase across accepted
    /// handshakes from the same peer.
    pub tstamp: i64,
    /// Sender's routing coordinates.
    pub coords: Vec<u8>,
    /// `true` if this packet is a reply to an inbound ping.
    pub is_pong: bool,
    /// Sender's advertised MTU (0 means "unspecified").
    pub mtu: u16,
}

impl HandshakePacket {
    /// Encode the self-delimiting body (everything sealed under the
    /// protocol shared key).
    pub fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 8 + 32 + 8 + 2 + self.coords.len() + 1 + 2);
        out.extend_from_slice(&self.send_perm_pub);
        out.extend_from_slice(self.handle.as_bytes());
        out.extend_from_slice(&self.send_ses_pub);
        out.extend_from_slice(&self.tstamp.to_be_bytes());
        out.extend_from_slice(&(self.coords.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.coords);
        out.push(self.is_pong as u8);
        out.extend_from_slice(&self.mtu.to_be_bytes());
        out
    }

    /// Decode a body produced by [`HandshakePacket::encode_body`].
    pub fn decode_body(bytes: &[u8]) -> Result<Self, HandshakeError> {
        let mut pos = 0usize;
        let take = |pos: &mut usize, n: usize| -> Result<std::ops::Range<usize>, HandshakeError> {
            let end = pos.checked_add(n).ok_or(HandshakeError::Malformed("length overflow"))?;
            if end > bytes.len() {
                return Err(HandshakeError::Malformed("truncated"));
            }
            let range = *pos..end;
            *pos = end;
            Ok(range)
        };

        let send_perm_pub: [u8; KEY_SIZE] = bytes[take(&mut pos, KEY_SIZE)?]
            .try_into()
            .map_err(|_| HandshakeError::Malformed("perm pub"))?;
        let handle_bytes: [u8; 8] = bytes[take(&mut pos, 8)?]
            .try_into()
            .map_err(|_| HandshakeError::Malformed("handle"))?;
        let send_ses_pub: [u8; KEY_SIZE] = bytes[take(&mut pos, KEY_SIZE)?]
            .try_into()
            .map_err(|_| HandshakeError::Malformed("ses pub"))?;
        let tstamp_bytes: [u8; 8] = bytes[take(&mut pos, 8)?]
            .try_into()
            .map_err(|_| HandshakeError::Malformed("tstamp"))?;
        let tstamp = i64::from_be_bytes(tstamp_bytes);

        let coords_len_bytes: [u8; 2] = bytes[take(&mut pos, 2)?]
            .try_into()
            .map_err(|_| HandshakeError::Malformed("coords len"))?;
        let coords_len = u16::from_be_bytes(coords_len_bytes) as usize;
        let coords = bytes[take(&mut pos, coords_len)?].to_vec();

        let is_pong_byte = bytes[take(&mut pos, 1)?][0];
        let is_pong = is_pong_byte != 0;

        let mtu_bytes: [u8; 2] = bytes[take(&mut pos, 2)?]
            .try_into()
            .map_err(|_| HandshakeError::Malformed("mtu"))?;
        let mtu = u16::from_be_bytes(mtu_bytes);

        Ok(Self {
            send_perm_pub,
            handle: Handle::from(handle_bytes),
            send_ses_pub,
            tstamp,
            coords,
            is_pong,
            mtu,
        })
    }
}

/// Seal a handshake body into the wire envelope
/// `SendPermPub (32) | Nonce (24) | Ciphertext`. The sender's permanent
/// public key travels in the clear so the receiver can resolve (or
/// derive) the shared key before attempting to open.
pub fn seal_envelope(
    shared_key: &SharedKey,
    nonce: &Nonce,
    sender_perm_pub: &[u8; KEY_SIZE],
    packet: &HandshakePacket,
) -> Result<Vec<u8>, CryptoError> {
    let body = packet.encode_body();
    let ciphertext = seal(shared_key, nonce, sender_perm_pub, &body)?;
    let mut out = Vec::with_capacity(KEY_SIZE + 24 + ciphertext.len());
    out.extend_from_slice(sender_perm_pub);
    out.extend_from_slice(nonce.as_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Split a wire envelope into its sender identity, nonce, and ciphertext,
/// without attempting to open it (the caller resolves the shared key
/// first, typically via the table's shared-key cache).
pub fn split_envelope(bytes: &[u8]) -> Result<([u8; KEY_SIZE], Nonce, &[u8]), HandshakeError> {
    if bytes.len() < KEY_SIZE + 24 {
        return Err(HandshakeError::Malformed("envelope too short"));
    }
    let sender_perm_pub: [u8; KEY_SIZE] = bytes[..KEY_SIZE]
        .try_into()
        .map_err(|_| HandshakeError::Malformed("perm pub"))?;
    let nonce_bytes: [u8; 24] = bytes[KEY_SIZE..KEY_SIZE + 24]
        .try_into()
        .map_err(|_| HandshakeError::Malformed("nonce"))?;
    let ciphertext = &bytes[KEY_SIZE + 24..];
    Ok((sender_perm_pub, Nonce::from_bytes(nonce_bytes), ciphertext))
}

/// Open an envelope's ciphertext and decode its body.
pub fn open_envelope(
    shared_key: &SharedKey,
    sender_perm_pub: &[u8; KEY_SIZE],
    nonce: &Nonce,
    ciphertext: &[u8],
) -> Result<HandshakePacket, HandshakeError> {
    let body = open(shared_key, nonce, sender_perm_pub, ciphertext)
        .map_err(|_| HandshakeError::Malformed("open failed"))?;
    HandshakePacket::decode_body(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SharedKey;

    fn sample() -> HandshakePacket {
        HandshakePacket {
            send_perm_pub: [3u8; KEY_SIZE],
            handle: Handle::generate(),
            send_ses_pub: [4u8; KEY_SIZE],
            tstamp: 1_700_000_000,
            coords: vec![1, 2, 3, 4],
            is_pong: true,
            mtu: 1280,
        }
    }

    #[test]
    fn body_roundtrips_exactly() {
        let pkt = sample();
        let body = pkt.encode_body();
        let decoded = HandshakePacket::decode_body(&body).unwrap();
        assert_eq!(pkt, decoded);
    }

    #[test]
    fn envelope_seal_open_roundtrips() {
        let key = SharedKey::derive(&[1u8; KEY_SIZE]);
        let nonce = Nonce::initial(true);
        let pkt = sample();
        let envelope = seal_envelope(&key, &nonce, &pkt.send_perm_pub, &pkt).unwrap();
        let (sender, env_nonce, ciphertext) = split_envelope(&envelope).unwrap();
        assert_eq!(sender, pkt.send_perm_pub);
        assert_eq!(env_nonce, nonce);
        let opened = open_envelope(&key, &sender, &env_nonce, ciphertext).unwrap();
        assert_eq!(opened, pkt);
    }

    #[test]
    fn truncated_body_is_malformed() {
        let pkt = sample();
        let body = pkt.encode_body();
        assert!(HandshakePacket::decode_body(&body[..body.len() - 1]).is_err());
    }

    #[test]
    fn wrong_key_fails_open() {
        let key_a = SharedKey::derive(&[1u8; KEY_SIZE]);
        let key_b = SharedKey::derive(&[2u8; KEY_SIZE]);
        let nonce = Nonce::initial(false);
        let pkt = sample();
        let envelope = seal_envelope(&key_a, &nonce, &pkt.send_perm_pub, &pkt).unwrap();
        let (sender, env_nonce, ciphertext) = split_envelope(&envelope).unwrap();
        assert!(open_envelope(&key_b, &sender, &env_nonce, ciphertext).is_err());
    }
}
