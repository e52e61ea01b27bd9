//! A single live session: its cryptographic and handshake state guarded
//! by one mutex, plus the unguarded handles (cancellation, init latch,
//! drop counters, queues) that must never be touched while that mutex is
//! held.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex, Notify};

use crate::core::constants::KEY_SIZE;
use crate::core::error::{CryptoError, HandshakeError};
use crate::crypto::{my_parity, Handle, Nonce, NonceWindow, SesKeypair, SessionCrypto, SharedKey};

use super::pipeline::{FlowKeyMessage, StagingQueue};

/// One-shot latch that fires at most once and never misses a waiter that
/// arrives after the fire, resolving the "double-close" concern around an
/// `init` signal: callers simply await it, whether or not it has already
/// fired.
#[derive(Default)]
pub struct InitLatch {
    fired: AtomicBool,
    notify: Notify,
}

impl InitLatch {
    fn new() -> Self {
        Self::default()
    }

    /// Fire the latch. Idempotent: firing twice is a no-op.
    pub fn fire(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            self.notify.notify_waiters();
        }
    }

    /// Wait for the latch to fire, returning immediately if it already has.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        if self.fired.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }

    /// `true` if the latch has fired.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Cooperative cancellation signal shared by a session's workers and any
/// blocking sends into its queues.
#[derive(Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.notify.notify_waiters();
        }
    }

    /// Resolve once cancellation has been signalled.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }

    /// `true` if cancellation has already been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Per-session counters for failures that are dropped rather than
/// propagated (see the crate's error-handling design).
#[derive(Default)]
pub struct DropCounters {
    invalid_nonce: AtomicU64,
    rekey_race: AtomicU64,
    replay_timestamp: AtomicU64,
    handle_collision: AtomicU64,
}

impl DropCounters {
    /// Bump the invalid-nonce counter.
    pub fn invalid_nonce(&self) {
        self.invalid_nonce.fetch_add(1, Ordering::Relaxed);
    }

    /// Bump the rekey-race counter.
    pub fn rekey_race(&self) {
        self.rekey_race.fetch_add(1, Ordering::Relaxed);
    }

    /// Bump the replay-timestamp counter.
    pub fn replay_timestamp(&self) {
        self.replay_timestamp.fetch_add(1, Ordering::Relaxed);
    }

    /// Bump the handle-collision counter.
    pub fn handle_collision(&self) {
        self.handle_collision.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of (invalid_nonce, rekey_race, replay_timestamp, handle_collision).
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.invalid_nonce.load(Ordering::Relaxed),
            self.rekey_race.load(Ordering::Relaxed),
            self.replay_timestamp.load(Ordering::Relaxed),
            self.handle_collision.load(Ordering::Relaxed),
        )
    }
}

/// Mutable state guarded by a session's mutex: everything the handshake
/// update rule and the send/receive pipelines read or write.
pub struct SessionInfo {
    /// Peer's permanent public key (immutable after creation, but kept
    /// here too since the update rule needs to compare against it).
    pub their_perm_pub: [u8; KEY_SIZE],
    pub their_ses_pub: [u8; KEY_SIZE],
    pub their_handle: Handle,
    pub their_mtu: u16,
    pub coords: Vec<u8>,
    pub tstamp: i64,

    my_ses: SesKeypair,
    pub my_handle: Handle,
    my_nonce: Nonce,
    pub my_mtu: u16,

    nonce_window: NonceWindow,
    crypto: SessionCrypto,
    /// Bumped every time `sharedSesKey` is rotated; pipelines snapshot
    /// this at crypto-job submission and compare at completion to detect
    /// a re-key race (invariant 6).
    key_epoch: u64,

    pub time_opened: Instant,
    pub time: Instant,
    pub mtu_time: Instant,
    pub ping_time: Instant,
    pub ping_send: Instant,

    pub bytes_sent: u64,
    pub bytes_recvd: u64,

    pub was_mtu_fixed: bool,
    pub reset: bool,
}

impl SessionInfo {
    fn new(
        their_perm_pub: [u8; KEY_SIZE],
        their_ses_pub: [u8; KEY_SIZE],
        their_handle: Handle,
        my_perm_pub: &[u8; KEY_SIZE],
        nonce_capacity: usize,
        nonce_duration: std::time::Duration,
        coords: Vec<u8>,
    ) -> Self {
        let my_ses = SesKeypair::generate();
        let shared = SharedKey::derive(&my_ses.diffie_hellman(&their_ses_pub));
        let parity = my_parity(my_perm_pub, &their_perm_pub);
        let now = Instant::now();
        Self {
            their_perm_pub,
            their_ses_pub,
            their_handle,
            their_mtu: 0,
            coords,
            tstamp: i64::MIN,
            my_handle: Handle::generate(),
            my_nonce: Nonce::initial(parity),
            my_mtu: 0,
            nonce_window: NonceWindow::new(nonce_capacity, nonce_duration),
            crypto: SessionCrypto::new(shared),
            key_epoch: 0,
            time_opened: now,
            time: now,
            mtu_time: now,
            ping_time: now,
            ping_send: now,
            my_ses,
            bytes_sent: 0,
            bytes_recvd: 0,
            was_mtu_fixed: false,
            reset: false,
        }
    }

    /// My ephemeral session public key, sent in handshake packets.
    pub fn my_ses_pub(&self) -> [u8; KEY_SIZE] {
        self.my_ses.public()
    }

    /// The current key epoch, for re-key race detection.
    pub fn key_epoch(&self) -> u64 {
        self.key_epoch
    }

    /// Advance and return the next outbound nonce.
    pub fn next_my_nonce(&mut self) -> Nonce {
        let n = self.my_nonce;
        self.my_nonce = self.my_nonce.next();
        n
    }

    /// Whether an inbound nonce would be accepted (does not record it).
    pub fn nonce_is_ok(&self, n: &Nonce) -> bool {
        self.nonce_window.is_acceptable(*n)
    }

    /// Record an accepted inbound nonce.
    pub fn record_nonce(&mut self, n: Nonce, now: Instant) {
        self.nonce_window.record(n, now);
    }

    /// Seal a traffic payload under the current shared key.
    pub fn seal(
        &self,
        nonce: &Nonce,
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.crypto.seal(nonce, aad, plaintext)
    }

    /// Open a traffic payload under the current shared key.
    pub fn open(
        &self,
        nonce: &Nonce,
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.crypto.open(nonce, aad, ciphertext)
    }

    /// Snapshot the current shared key for a crypto-pool job submitted
    /// outside the session lock.
    pub fn shared_key_snapshot(&self) -> SharedKey {
        self.crypto.shared_key()
    }

    /// Apply the handshake update rule for an inbound packet already
    /// known to belong to this session's peer identity slot. Returns
    /// `true` if the ephemeral pubkey rotated (and the shared key with
    /// it).
    pub fn apply_update(
        &mut self,
        their_perm_pub: &[u8; KEY_SIZE],
        their_ses_pub: &[u8; KEY_SIZE],
        their_handle: Handle,
        coords: &[u8],
        tstamp: i64,
        mtu: u16,
        mtu_floor: u16,
    ) -> Result<bool, HandshakeError> {
        if tstamp <= self.tstamp {
            return Err(HandshakeError::ReplayTimestamp);
        }
        if their_perm_pub != &self.their_perm_pub {
            return Err(HandshakeError::HandleCollision);
        }

        let rotated = their_ses_pub != &self.their_ses_pub;
        if rotated {
            self.their_ses_pub = *their_ses_pub;
            self.their_handle = their_handle;
            let dh = self.my_ses.diffie_hellman(their_ses_pub);
            self.crypto.rekey(&dh);
            self.key_epoch += 1;
            self.nonce_window.reset();
        }

        if mtu == 0 || mtu >= mtu_floor {
            self.their_mtu = mtu;
        }

        if coords != self.coords.as_slice() {
            self.coords = coords.to_vec();
        }

        self.time = Instant::now();
        self.tstamp = tstamp;
        self.reset = false;

        Ok(rotated)
    }
}

/// A live session: guarded mutable state plus the handles that must stay
/// reachable without taking the session lock.
pub struct Session {
    info: Mutex<SessionInfo>,
    pub cancel: CancelToken,
    pub init: InitLatch,
    pub counters: DropCounters,
    pub send_tx: mpsc::Sender<FlowKeyMessage>,
    pub staging: Arc<StagingQueue>,
    pub delivered_tx: mpsc::Sender<Vec<u8>>,
}

impl Session {
    /// Create a new session and its queues. Returns the session plus the
    /// receive ends the caller must hand to the spawned worker tasks and
    /// to the consumer side.
    #[allow(clippy::type_complexity)]
    pub fn new(
        their_perm_pub: [u8; KEY_SIZE],
        their_ses_pub: [u8; KEY_SIZE],
        their_handle: Handle,
        my_perm_pub: &[u8; KEY_SIZE],
        nonce_capacity: usize,
        nonce_duration: std::time::Duration,
        coords: Vec<u8>,
        send_queue_depth: usize,
        recv_queue_depth: usize,
        recv_staging_depth: usize,
    ) -> (Self, mpsc::Receiver<FlowKeyMessage>, mpsc::Receiver<Vec<u8>>) {
        let info = SessionInfo::new(
            their_perm_pub,
            their_ses_pub,
            their_handle,
            my_perm_pub,
            nonce_capacity,
            nonce_duration,
            coords,
        );
        let (send_tx, send_rx) = mpsc::channel(send_queue_depth);
        let (delivered_tx, delivered_rx) = mpsc::channel(recv_queue_depth);
        let session = Self {
            info: Mutex::new(info),
            cancel: CancelToken::new(),
            init: InitLatch::new(),
            counters: DropCounters::default(),
            send_tx,
            staging: Arc::new(StagingQueue::new(recv_staging_depth)),
            delivered_tx,
        };
        (session, send_rx, delivered_rx)
    }

    /// My local handle for this session, read without locking (set once
    /// at construction and never mutated).
    pub async fn my_handle(&self) -> Handle {
        self.info.lock().await.my_handle
    }

    /// Lock, run `f` against the guarded state, unlock. Per the
    /// concurrency design, never hold this across a crypto operation or a
    /// blocking channel send.
    pub async fn do_locked<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SessionInfo) -> R,
    {
        let mut guard = self.info.lock().await;
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(byte: u8) -> [u8; KEY_SIZE] {
        [byte; KEY_SIZE]
    }

    #[tokio::test]
    async fn nonce_parity_is_fixed_at_creation() {
        let their_ses = SesKeypair::generate();
        let (session, _send_rx, _delivered_rx) = Session::new(
            perm(9),
            their_ses.public(),
            Handle::generate(),
            &perm(1),
            64,
            std::time::Duration::from_secs(1),
            Vec::new(),
            32,
            32,
            64,
        );
        let expect_parity = my_parity(&perm(1), &perm(9));
        session
            .do_locked(|info| {
                let n = info.next_my_nonce();
                assert_eq!(n.parity(), expect_parity);
            })
            .await;
    }

    #[tokio::test]
    async fn init_latch_wait_returns_immediately_after_fire() {
        let latch = InitLatch::new();
        latch.fire();
        latch.fire(); // idempotent
        latch.wait().await;
    }

    #[tokio::test]
    async fn apply_update_rejects_non_increasing_tstamp() {
        let their_ses = SesKeypair::generate();
        let (session, ..) = Session::new(
            perm(2),
            their_ses.public(),
            Handle::generate(),
            &perm(1),
            64,
            std::time::Duration::from_secs(1),
            Vec::new(),
            32,
            32,
            64,
        );
        session
            .do_locked(|info| {
                let their_handle = info.their_handle;
                info.apply_update(&perm(2), &their_ses.public(), their_handle, &[], 100, 1280, 1280)
                    .unwrap();
                let err = info
                    .apply_update(&perm(2), &their_ses.public(), their_handle, &[], 100, 1280, 1280)
                    .unwrap_err();
                assert_eq!(err, HandshakeError::ReplayTimestamp);
            })
            .await;
    }

    #[tokio::test]
    async fn apply_update_rotates_key_on_ephemeral_change() {
        let their_ses_a = SesKeypair::generate();
        let their_ses_b = SesKeypair::generate();
        let (session, ..) = Session::new(
            perm(2),
            their_ses_a.public(),
            Handle::generate(),
            &perm(1),
            64,
            std::time::Duration::from_secs(1),
            Vec::new(),
            32,
            32,
            64,
        );
        session
            .do_locked(|info| {
                let their_handle = info.their_handle;
                let epoch_before = info.key_epoch();
                let rotated = info
                    .apply_update(&perm(2), &their_ses_b.public(), their_handle, &[], 100, 1280, 1280)
                    .unwrap();
                assert!(rotated);
                assert_eq!(info.key_epoch(), epoch_before + 1);
            })
            .await;
    }

    #[tokio::test]
    async fn apply_update_rejects_permanent_key_mismatch() {
        let their_ses = SesKeypair::generate();
        let (session, ..) = Session::new(
            perm(2),
            their_ses.public(),
            Handle::generate(),
            &perm(1),
            64,
            std::time::Duration::from_secs(1),
            Vec::new(),
            32,
            32,
            64,
        );
        session
            .do_locked(|info| {
                let their_handle = info.their_handle;
                let err = info
                    .apply_update(&perm(99), &their_ses.public(), their_handle, &[], 100, 1280, 1280)
                    .unwrap_err();
                assert_eq!(err, HandshakeError::HandleCollision);
            })
            .await;
    }
}
