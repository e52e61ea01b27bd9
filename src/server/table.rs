//! The session table: indexes live sessions by handle and by peer
//! permanent key, caches protocol-traffic shared keys, and holds the
//! swappable admission policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use crate::core::constants::KEY_SIZE;
use crate::core::error::TableError;
use crate::core::traits::{AllowPolicy, AllowReason};
use crate::crypto::{Handle, PermKeypair, SharedKey};

use super::session::Session;

struct Indexes {
    sinfos: HashMap<Handle, Arc<Session>>,
    by_their_perm: HashMap<[u8; KEY_SIZE], Handle>,
    perm_shared: HashMap<[u8; KEY_SIZE], SharedKey>,
}

impl Indexes {
    fn new() -> Self {
        Self {
            sinfos: HashMap::new(),
            by_their_perm: HashMap::new(),
            perm_shared: HashMap::new(),
        }
    }

    /// Rebuild every map into a fresh one of exactly the current size,
    /// reclaiming capacity left behind by deleted entries.
    fn compact(&mut self) {
        let sinfos = std::mem::take(&mut self.sinfos);
        self.sinfos = HashMap::with_capacity(sinfos.len());
        self.sinfos.extend(sinfos);

        let by_their_perm = std::mem::take(&mut self.by_their_perm);
        self.by_their_perm = HashMap::with_capacity(by_their_perm.len());
        self.by_their_perm.extend(by_their_perm);

        let perm_shared = std::mem::take(&mut self.perm_shared);
        self.perm_shared = HashMap::with_capacity(perm_shared.len());
        self.perm_shared.extend(perm_shared);
    }
}

/// Indexes live sessions, caches handshake shared keys, and gates session
/// creation through a pluggable [`AllowPolicy`].
pub struct SessionTable {
    my_perm: PermKeypair,
    indexes: RwLock<Indexes>,
    policy: RwLock<Arc<dyn AllowPolicy>>,
    max_sessions: usize,
    shared_key_capacity: usize,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
}

impl SessionTable {
    /// Create an empty table owning `my_perm` for handshake shared-key
    /// derivation.
    pub fn new(
        my_perm: PermKeypair,
        policy: Arc<dyn AllowPolicy>,
        max_sessions: usize,
        shared_key_capacity: usize,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            my_perm,
            indexes: RwLock::new(Indexes::new()),
            policy: RwLock::new(policy),
            max_sessions,
            shared_key_capacity,
            sweep_interval,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// This node's permanent public key.
    pub fn my_perm_pub(&self) -> [u8; KEY_SIZE] {
        self.my_perm.public()
    }

    /// Evaluate the admission policy.
    pub async fn is_allowed(&self, pubkey: &[u8; KEY_SIZE], initiator: bool) -> AllowReason {
        self.policy.read().await.is_allowed(pubkey, initiator)
    }

    /// Swap the admission policy.
    pub async fn set_policy(&self, policy: Arc<dyn AllowPolicy>) {
        *self.policy.write().await = policy;
    }

    /// Resolve (or derive and cache) the protocol shared key for
    /// handshake traffic with `their_perm_pub`.
    pub async fn shared_key_for(&self, their_perm_pub: &[u8; KEY_SIZE]) -> SharedKey {
        {
            let indexes = self.indexes.read().await;
            if let Some(key) = indexes.perm_shared.get(their_perm_pub) {
                return key.clone();
            }
        }
        let dh = self.my_perm.diffie_hellman(their_perm_pub);
        let key = SharedKey::derive(&dh);
        let mut indexes = self.indexes.write().await;
        if indexes.perm_shared.len() >= self.shared_key_capacity {
            if let Some(victim) = indexes.perm_shared.keys().next().copied() {
                indexes.perm_shared.remove(&victim);
            }
        }
        indexes.perm_shared.entry(*their_perm_pub).or_insert_with(|| key.clone());
        key
    }

    /// Look up a session by local handle.
    pub async fn get_by_handle(&self, handle: &Handle) -> Option<Arc<Session>> {
        self.indexes.read().await.sinfos.get(handle).cloned()
    }

    /// Look up a session by the peer's permanent public key.
    pub async fn get_by_perm(&self, their_perm_pub: &[u8; KEY_SIZE]) -> Option<Arc<Session>> {
        let indexes = self.indexes.read().await;
        let handle = indexes.by_their_perm.get(their_perm_pub)?;
        indexes.sinfos.get(handle).cloned()
    }

    /// Insert a new session, indexed by both its local handle and the
    /// peer's permanent key.
    pub async fn insert(
        &self,
        handle: Handle,
        their_perm_pub: [u8; KEY_SIZE],
        session: Arc<Session>,
    ) -> Result<(), TableError> {
        let mut indexes = self.indexes.write().await;
        if indexes.sinfos.len() >= self.max_sessions {
            return Err(TableError::Full);
        }
        indexes.by_their_perm.insert(their_perm_pub, handle);
        indexes.sinfos.insert(handle, session);
        Ok(())
    }

    /// Remove a session by handle, cancelling it and dropping both index
    /// entries atomically with respect to other table operations.
    pub async fn remove(&self, handle: &Handle) -> Option<Arc<Session>> {
        let mut indexes = self.indexes.write().await;
        let session = indexes.sinfos.remove(handle)?;
        indexes.by_their_perm.retain(|_, h| h != handle);
        session.cancel.cancel();
        Some(session)
    }

    /// Snapshot of every live session, for periodic sweeps.
    pub async fn all_sessions(&self) -> Vec<Arc<Session>> {
        self.indexes.read().await.sinfos.values().cloned().collect()
    }

    /// Mark every live session's `reset` flag (topology change).
    pub async fn reset_all(&self) {
        for session in self.all_sessions().await {
            session.do_locked(|info| info.reset = true).await;
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.indexes.read().await.sinfos.len()
    }

    /// `true` if the table holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Compact the underlying maps if at least `sweep_interval` has
    /// elapsed since the last sweep. Takes the table's write lock only
    /// for the duration of the `HashMap` rebuild, never across I/O.
    pub async fn maybe_sweep(&self, now: Instant) {
        let mut last = self.last_sweep.lock().await;
        if now.duration_since(*last) < self.sweep_interval {
            return;
        }
        *last = now;
        drop(last);
        self.indexes.write().await.compact();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::AllowAll;
    use std::time::Duration;

    fn table() -> SessionTable {
        SessionTable::new(PermKeypair::generate(), Arc::new(AllowAll), 16, 8, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn shared_key_cache_returns_same_key_on_repeat_lookup() {
        let t = table();
        let peer = [5u8; KEY_SIZE];
        let a = t.shared_key_for(&peer).await;
        let b = t.shared_key_for(&peer).await;
        let nonce = crate::crypto::Nonce::initial(true);
        let ct = crate::crypto::seal(&a, &nonce, b"", b"x").unwrap();
        assert!(crate::crypto::open(&b, &nonce, b"", &ct).is_ok());
    }

    #[tokio::test]
    async fn insert_and_lookup_roundtrip() {
        let t = table();
        let their_ses = crate::crypto::SesKeypair::generate();
        let their_perm = [7u8; KEY_SIZE];
        let (session, ..) = Session::new(
            their_perm,
            their_ses.public(),
            Handle::generate(),
            &t.my_perm_pub(),
            64,
            Duration::from_secs(1),
            Vec::new(),
            32,
            32,
            64,
        );
        let session = Arc::new(session);
        let my_handle = session.my_handle().await;
        t.insert(my_handle, their_perm, session).await.unwrap();
        assert!(t.get_by_handle(&my_handle).await.is_some());
        assert!(t.get_by_perm(&their_perm).await.is_some());
        assert_eq!(t.len().await, 1);
    }

    #[tokio::test]
    async fn remove_drops_both_indexes_and_cancels() {
        let t = table();
        let their_ses = crate::crypto::SesKeypair::generate();
        let their_perm = [9u8; KEY_SIZE];
        let (session, ..) = Session::new(
            their_perm,
            their_ses.public(),
            Handle::generate(),
            &t.my_perm_pub(),
            64,
            Duration::from_secs(1),
            Vec::new(),
            32,
            32,
            64,
        );
        let session = Arc::new(session);
        let my_handle = session.my_handle().await;
        t.insert(my_handle, their_perm, session).await.unwrap();
        let removed = t.remove(&my_handle).await.unwrap();
        assert!(removed.cancel.is_cancelled());
        assert!(t.get_by_handle(&my_handle).await.is_none());
        assert!(t.get_by_perm(&their_perm).await.is_none());
    }

    #[tokio::test]
    async fn full_table_rejects_insert() {
        let t = SessionTable::new(PermKeypair::generate(), Arc::new(AllowAll), 1, 8, Duration::from_secs(60));
        let their_ses = crate::crypto::SesKeypair::generate();
        let (session_a, ..) = Session::new([1u8; KEY_SIZE], their_ses.public(), Handle::generate(), &t.my_perm_pub(), 64, Duration::from_secs(1), Vec::new(), 32, 32, 64);
        let session_a = Arc::new(session_a);
        let handle_a = session_a.my_handle().await;
        t.insert(handle_a, [1u8; KEY_SIZE], session_a).await.unwrap();

        let (session_b, ..) = Session::new([2u8; KEY_SIZE], their_ses.public(), Handle::generate(), &t.my_perm_pub(), 64, Duration::from_secs(1), Vec::new(), 32, 32, 64);
        let session_b = Arc::new(session_b);
        let handle_b = session_b.my_handle().await;
        assert_eq!(t.insert(handle_b, [2u8; KEY_SIZE], session_b).await, Err(TableError::Full));
    }
}
