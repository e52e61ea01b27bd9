//! The 24-byte AEAD nonce and the per-endpoint parity discipline that keeps
//! two peers' nonce streams disjoint under a shared key.
//!
//! The high 16 bytes are always zero; the low 8 bytes hold a big-endian
//! counter whose least-significant bit is the fixed parity. Counters
//! advance by 2 so the parity never flips for the lifetime of a session.

use std::cmp::Ordering;

use crate::core::constants::{KEY_SIZE, NONCE_SIZE};

/// A 24-byte AEAD nonce with a fixed parity bit and a monotonically
/// advancing counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// The all-zero nonce (counter 0, parity 0). Not itself a valid
    /// traffic nonce for a peer with parity 1 — use [`Nonce::initial`].
    pub fn zero() -> Self {
        Self([0u8; NONCE_SIZE])
    }

    /// The first nonce a session with the given parity will use.
    pub fn initial(parity: bool) -> Self {
        Self::from_counter(parity as u64, parity)
    }

    /// Build a nonce from a counter and parity; the counter's low bit is
    /// forced to match `parity`.
    pub fn from_counter(counter: u64, parity: bool) -> Self {
        let counter = (counter & !1) | (parity as u64);
        let mut bytes = [0u8; NONCE_SIZE];
        bytes[NONCE_SIZE - 8..].copy_from_slice(&counter.to_be_bytes());
        Self(bytes)
    }

    /// Raw wire bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// Reconstruct from wire bytes.
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// The low-64-bit counter.
    pub fn counter(&self) -> u64 {
        u64::from_be_bytes(self.0[NONCE_SIZE - 8..].try_into().expect("8-byte slice"))
    }

    /// The fixed parity bit (low bit of the counter).
    pub fn parity(&self) -> bool {
        self.counter() & 1 == 1
    }

    /// The next nonce in this endpoint's stream (counter advances by 2,
    /// parity unchanged).
    pub fn next(&self) -> Self {
        Self::from_counter(self.counter().wrapping_add(2), self.parity())
    }

    /// Signed distance `self - other`, positive when `self` is newer.
    /// Saturates rather than overflowing for pathological inputs.
    pub fn minus(&self, other: &Nonce) -> i64 {
        let (a, b) = (self.counter(), other.counter());
        if a >= b {
            i64::try_from(a - b).unwrap_or(i64::MAX)
        } else {
            -i64::try_from(b - a).unwrap_or(i64::MAX)
        }
    }
}

impl PartialOrd for Nonce {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Nonce {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter().cmp(&other.counter())
    }
}

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Nonce(counter={}, parity={})", self.counter(), self.parity() as u8)
    }
}

/// Decide which endpoint gets parity 1. The peer with the byte-lexically
/// larger permanent public key takes parity 1; the other takes parity 0.
/// This is evaluated once at session creation and never revisited.
pub fn my_parity(my_perm_pub: &[u8; KEY_SIZE], their_perm_pub: &[u8; KEY_SIZE]) -> bool {
    my_perm_pub > their_perm_pub
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_is_stable_across_increments() {
        let mut n = Nonce::initial(true);
        for _ in 0..10 {
            assert!(n.parity());
            n = n.next();
        }
        let mut n = Nonce::initial(false);
        for _ in 0..10 {
            assert!(!n.parity());
            n = n.next();
        }
    }

    #[test]
    fn minus_is_signed_distance() {
        let a = Nonce::from_counter(10, false);
        let b = Nonce::from_counter(4, false);
        assert_eq!(a.minus(&b), 6);
        assert_eq!(b.minus(&a), -6);
        assert_eq!(a.minus(&a), 0);
    }

    #[test]
    fn parity_assignment_is_disjoint_and_deterministic() {
        let low = [0u8; KEY_SIZE];
        let mut high = [0u8; KEY_SIZE];
        high[0] = 1;
        assert!(my_parity(&high, &low));
        assert!(!my_parity(&low, &high));
    }

    #[test]
    fn streams_never_collide_under_shared_key() {
        let a_parity = my_parity(&[9u8; KEY_SIZE], &[1u8; KEY_SIZE]);
        let b_parity = my_parity(&[1u8; KEY_SIZE], &[9u8; KEY_SIZE]);
        assert_ne!(a_parity, b_parity);
        let mut a = Nonce::initial(a_parity);
        let mut b = Nonce::initial(b_parity);
        for _ in 0..100 {
            assert_ne!(a.as_bytes(), b.as_bytes());
            a = a.next();
            b = b.next();
        }
    }
}
