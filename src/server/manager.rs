//! [`SessionManager`]: the public, boundary-crossing entry point tying
//! together the session table, the crypto worker pool, and the send/recv
//! pipelines.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::core::config::SessionManagerConfig;
use crate::core::constants::{HANDLE_SIZE, KEY_SIZE, PACKET_KIND_HANDSHAKE, PACKET_KIND_TRAFFIC};
use crate::core::error::{HandshakeError, MeshError, SessionError, TableError};
use crate::core::traits::{AllowPolicy, Router, SessionHandle};
use crate::crypto::{Handle, PermKeypair};
use crate::transport::wire::TrafficPacket;

use super::handshake::{open_envelope, seal_envelope, split_envelope, HandshakePacket};
use super::pipeline::{self, FlowKeyMessage};
use super::pool::CryptoWorkerPool;
use super::session::Session;
use super::table::SessionTable;

/// Ties the session table, crypto pool, and pipelines together behind the
/// admin/consumer surface an embedding connection layer talks to.
pub struct SessionManager {
    table: Arc<SessionTable>,
    pool: Arc<CryptoWorkerPool>,
    router: Arc<dyn Router>,
    config: SessionManagerConfig,
    listener: RwLock<Option<mpsc::Sender<SessionHandle>>>,
    delivered: Mutex<HashMap<Handle, mpsc::Receiver<Vec<u8>>>>,
    my_coords: Arc<RwLock<Vec<u8>>>,
    sweep_task: JoinHandle<()>,
}

impl SessionManager {
    /// Construct a manager owning `my_perm` as this node's identity
    /// keypair, delivering encoded packets to `router`, and gating new
    /// sessions through `policy`.
    pub fn new(
        my_perm: PermKeypair,
        router: Arc<dyn Router>,
        policy: Arc<dyn AllowPolicy>,
        config: SessionManagerConfig,
    ) -> Arc<Self> {
        let max_sessions = config.max_sessions.unwrap_or(usize::MAX);
        let table = Arc::new(SessionTable::new(
            my_perm,
            policy,
            max_sessions,
            config.shared_key_cache_capacity,
            config.cleanup_sweep_interval,
        ));
        let pool = Arc::new(CryptoWorkerPool::new(config.crypto_workers));
        let my_coords = Arc::new(RwLock::new(Vec::new()));

        let sweep_table = table.clone();
        let sweep_router = router.clone();
        let sweep_coords = my_coords.clone();
        let sweep_interval = config.cleanup_sweep_interval;
        let mtu_floor = config.mtu_floor;
        let sweep_task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(sweep_interval).await;
                sweep_table.maybe_sweep(Instant::now()).await;
                for session in sweep_table.all_sessions().await {
                    let needs_reping = session.do_locked(|info| info.reset).await;
                    if needs_reping {
                        let _ = send_ping_impl(&sweep_table, sweep_router.as_ref(), &sweep_coords, mtu_floor, &session, false).await;
                    }
                }
            }
        });
        Arc::new(Self {
            table,
            pool,
            router,
            config,
            listener: RwLock::new(None),
            delivered: Mutex::new(HashMap::new()),
            my_coords,
            sweep_task,
        })
    }

    /// This node's permanent public key.
    pub fn my_perm_pub(&self) -> [u8; KEY_SIZE] {
        self.table.my_perm_pub()
    }

    /// Update this node's own routing coordinates, sent in future pings.
    pub async fn set_coords(&self, coords: Vec<u8>) {
        *self.my_coords.write().await = coords;
    }

    /// Swap the admission policy.
    pub async fn set_policy(&self, policy: Arc<dyn AllowPolicy>) {
        self.table.set_policy(policy).await;
    }

    /// Arm a listener for inbound sessions. Replaces any previous
    /// listener; only one may be armed at a time.
    pub async fn subscribe(&self) -> mpsc::Receiver<SessionHandle> {
        let (tx, rx) = mpsc::channel(32);
        *self.listener.write().await = Some(tx);
        rx
    }

    /// Mark every live session `reset` (e.g. on a topology change
    /// invalidating cached coords).
    pub async fn reset_all(&self) {
        self.table.reset_all().await;
    }

    /// Open (or return the existing) session to `their_perm_pub`, sending
    /// the initial ping to `coords` — the peer's wire address, as resolved
    /// by whatever DHT or address book the embedder uses. Ignored if a
    /// session already exists.
    pub async fn open(self: &Arc<Self>, their_perm_pub: [u8; KEY_SIZE], coords: Vec<u8>) -> Result<SessionHandle, MeshError> {
        if !self.table.is_allowed(&their_perm_pub, true).await.is_allowed() {
            return Err(HandshakeError::PolicyDenied.into());
        }
        if let Some(existing) = self.table.get_by_perm(&their_perm_pub).await {
            let handle = existing.my_handle().await;
            return Ok(SessionHandle(*handle.as_bytes()));
        }

        let my_perm_pub = self.table.my_perm_pub();
        let (session, send_rx, delivered_rx) = Session::new(
            their_perm_pub,
            [0u8; KEY_SIZE],
            Handle::from([0u8; HANDLE_SIZE]),
            &my_perm_pub,
            self.config.nonce_window_capacity,
            self.config.nonce_window_duration,
            coords,
            self.config.send_queue_depth,
            self.config.recv_queue_depth,
            self.config.recv_staging_depth,
        );
        let session = Arc::new(session);
        let my_handle = session.my_handle().await;
        self.table.insert(my_handle, their_perm_pub, session.clone()).await?;
        self.spawn_workers(session.clone(), send_rx, delivered_rx).await;

        self.send_ping(&session, false).await?;
        Ok(SessionHandle(*my_handle.as_bytes()))
    }

    /// Close a session: cancel its workers and drop its table and
    /// delivered-queue entries.
    pub async fn close(&self, handle: SessionHandle) {
        let h = Handle::from(handle.0);
        self.table.remove(&h).await;
        self.delivered.lock().await.remove(&h);
    }

    /// Current negotiated MTU for `handle`, if the session exists.
    pub async fn mtu(&self, handle: SessionHandle) -> Option<u16> {
        let h = Handle::from(handle.0);
        let session = self.table.get_by_handle(&h).await?;
        Some(session.do_locked(|info| info.their_mtu).await)
    }

    /// Enqueue a plaintext message for sealing and delivery. Blocks while
    /// the session's send queue is full (bounded backpressure).
    pub async fn push_plaintext(&self, handle: SessionHandle, flow_key: u64, message: Vec<u8>) -> Result<(), MeshError> {
        let h = Handle::from(handle.0);
        let session = self.table.get_by_handle(&h).await.ok_or(TableError::NotFound)?;
        session
            .send_tx
            .send(FlowKeyMessage { flow_key, message })
            .await
            .map_err(|_| SessionError::Cancelled)?;
        Ok(())
    }

    /// Await the next delivered plaintext for `handle`. Returns `None`
    /// once the session is closed and its queue drained.
    pub async fn pull_plaintext(&self, handle: SessionHandle) -> Option<Vec<u8>> {
        let h = Handle::from(handle.0);
        let mut delivered = self.delivered.lock().await;
        let rx = delivered.get_mut(&h)?;
        rx.recv().await
    }

    /// Dispatch an inbound packet by its leading kind byte.
    pub async fn handle_inbound(self: &Arc<Self>, bytes: Vec<u8>) -> Result<(), MeshError> {
        let Some((&kind, rest)) = bytes.split_first() else {
            return Ok(());
        };
        match kind {
            PACKET_KIND_HANDSHAKE => self.handle_inbound_handshake(rest).await,
            PACKET_KIND_TRAFFIC => {
                self.handle_inbound_traffic(rest).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Route an inbound sealed traffic packet to its session's staging
    /// queue. Unknown handles are dropped silently.
    pub async fn handle_inbound_traffic(&self, bytes: &[u8]) {
        let Some(pkt) = TrafficPacket::decode(bytes) else {
            return;
        };
        if let Some(session) = self.table.get_by_handle(&pkt.handle).await {
            session.staging.push(bytes.to_vec()).await;
        }
    }

    /// Process an inbound handshake envelope: update an existing session,
    /// or create one for an admitted inbound ping.
    pub async fn handle_inbound_handshake(self: &Arc<Self>, bytes: &[u8]) -> Result<(), MeshError> {
        let (sender_perm_pub, nonce, ciphertext) = split_envelope(bytes)?;
        let shared_key = self.table.shared_key_for(&sender_perm_pub).await;
        let packet = open_envelope(&shared_key, &sender_perm_pub, &nonce, ciphertext)?;

        if let Some(session) = self.table.get_by_perm(&sender_perm_pub).await {
            session
                .do_locked(|info| {
                    info.apply_update(
                        &packet.send_perm_pub,
                        &packet.send_ses_pub,
                        packet.handle,
                        &packet.coords,
                        packet.tstamp,
                        packet.mtu,
                        self.config.mtu_floor,
                    )
                })
                .await?;
            session.init.fire();
            if !packet.is_pong {
                self.send_ping(&session, true).await?;
            }
            return Ok(());
        }

        if packet.is_pong {
            return Err(HandshakeError::PongCannotOpen.into());
        }
        if !self.table.is_allowed(&sender_perm_pub, false).await.is_allowed() {
            return Err(HandshakeError::PolicyDenied.into());
        }
        let listener = self.listener.read().await.clone();
        let Some(listener) = listener else {
            return Err(HandshakeError::NoListener.into());
        };

        let my_perm_pub = self.table.my_perm_pub();
        let (session, send_rx, delivered_rx) = Session::new(
            sender_perm_pub,
            [0u8; KEY_SIZE],
            Handle::from([0u8; HANDLE_SIZE]),
            &my_perm_pub,
            self.config.nonce_window_capacity,
            self.config.nonce_window_duration,
            Vec::new(),
            self.config.send_queue_depth,
            self.config.recv_queue_depth,
            self.config.recv_staging_depth,
        );
        let session = Arc::new(session);
        let my_handle = session.my_handle().await;
        self.table.insert(my_handle, sender_perm_pub, session.clone()).await?;
        self.spawn_workers(session.clone(), send_rx, delivered_rx).await;

        let _ = listener.send(SessionHandle(*my_handle.as_bytes())).await;

        session
            .do_locked(|info| {
                info.apply_update(
                    &packet.send_perm_pub,
                    &packet.send_ses_pub,
                    packet.handle,
                    &packet.coords,
                    packet.tstamp,
                    packet.mtu,
                    self.config.mtu_floor,
                )
            })
            .await?;
        session.init.fire();

        if !packet.is_pong {
            self.send_ping(&session, true).await?;
        }
        Ok(())
    }

    async fn spawn_workers(&self, session: Arc<Session>, send_rx: mpsc::Receiver<FlowKeyMessage>, delivered_rx: mpsc::Receiver<Vec<u8>>) {
        let my_handle = session.my_handle().await;
        self.delivered.lock().await.insert(my_handle, delivered_rx);
        tokio::spawn(pipeline::send_worker(session.clone(), send_rx, self.pool.clone(), self.router.clone()));
        tokio::spawn(pipeline::recv_worker(session.clone(), session.staging.clone(), self.pool.clone()));
    }

    async fn send_ping(&self, session: &Arc<Session>, is_pong: bool) -> Result<(), MeshError> {
        send_ping_impl(&self.table, self.router.as_ref(), &self.my_coords, self.config.mtu_floor, session, is_pong).await
    }
}

/// Build and deliver a ping/pong for `session`. A free function, rather
/// than a `SessionManager` method, so the background reset-reping sweep
/// can call it from clones of the table/router/coords without holding an
/// `Arc<SessionManager>`.
async fn send_ping_impl(
    table: &SessionTable,
    router: &dyn Router,
    my_coords: &RwLock<Vec<u8>>,
    mtu_floor: u16,
    session: &Arc<Session>,
    is_pong: bool,
) -> Result<(), MeshError> {
    let their_perm_pub = session.do_locked(|info| info.their_perm_pub).await;
    let shared_key = table.shared_key_for(&their_perm_pub).await;
    let my_coords = my_coords.read().await.clone();

    let (my_handle, my_ses_pub, nonce, dest_coords) = session
        .do_locked(|info| {
            let nonce = info.next_my_nonce();
            if info.ping_time < info.time {
                info.ping_time = Instant::now();
            }
            info.ping_send = Instant::now();
            (info.my_handle, info.my_ses_pub(), nonce, info.coords.clone())
        })
        .await;

    let my_perm_pub = table.my_perm_pub();
    let packet = HandshakePacket {
        send_perm_pub: my_perm_pub,
        handle: my_handle,
        send_ses_pub: my_ses_pub,
        tstamp: unix_now(),
        coords: my_coords,
        is_pong,
        mtu: mtu_floor,
    };

    let envelope = seal_envelope(&shared_key, &nonce, &my_perm_pub, &packet)?;
    let mut framed = Vec::with_capacity(1 + envelope.len());
    framed.push(PACKET_KIND_HANDSHAKE);
    framed.extend_from_slice(&envelope);

    router.deliver(&dest_coords, framed).map_err(|e| MeshError::Router(e.0))
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.sweep_task.abort();
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::{AllowAll, AllowReason, RouterError};
    use std::sync::Mutex as StdMutex;

    struct LoopbackRouter {
        peers: StdMutex<HashMap<Vec<u8>, Arc<SessionManager>>>,
    }

    impl LoopbackRouter {
        fn new() -> Arc<Self> {
            Arc::new(Self { peers: StdMutex::new(HashMap::new()) })
        }

        fn register(&self, coords: Vec<u8>, manager: Arc<SessionManager>) {
            self.peers.lock().unwrap().insert(coords, manager);
        }
    }

    impl Router for LoopbackRouter {
        fn deliver(&self, coords: &[u8], packet: Vec<u8>) -> Result<(), RouterError> {
            let target = self.peers.lock().unwrap().get(coords).cloned();
            let Some(target) = target else {
                return Err(RouterError("no peer at coords".into()));
            };
            tokio::spawn(async move {
                let _ = target.handle_inbound(packet).await;
            });
            Ok(())
        }
    }

    async fn build_pair() -> (Arc<SessionManager>, Arc<SessionManager>, [u8; KEY_SIZE], [u8; KEY_SIZE]) {
        let router = LoopbackRouter::new();
        let a_perm = PermKeypair::generate();
        let b_perm = PermKeypair::generate();
        let a_pub = a_perm.public();
        let b_pub = b_perm.public();

        let a = SessionManager::new(a_perm, router.clone(), Arc::new(AllowAll), SessionManagerConfig::default());
        let b = SessionManager::new(b_perm, router.clone(), Arc::new(AllowAll), SessionManagerConfig::default());

        a.set_coords(b"A".to_vec()).await;
        b.set_coords(b"B".to_vec()).await;
        router.register(b"A".to_vec(), a.clone());
        router.register(b"B".to_vec(), b.clone());

        (a, b, a_pub, b_pub)
    }

    #[tokio::test]
    async fn handshake_bring_up_establishes_matching_sessions() {
        let (a, b, _a_pub, b_pub) = build_pair().await;
        let mut listener = b.subscribe().await;

        let a_handle = a.open(b_pub, b"B".to_vec()).await.unwrap();
        let b_handle = listener.recv().await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(a.mtu(a_handle).await, Some(a.config.mtu_floor));
        assert_eq!(b.mtu(b_handle).await, Some(b.config.mtu_floor));
    }

    #[tokio::test]
    async fn traffic_roundtrips_after_bring_up() {
        let (a, b, _a_pub, b_pub) = build_pair().await;
        let mut listener = b.subscribe().await;

        let a_handle = a.open(b_pub, b"B".to_vec()).await.unwrap();
        let b_handle = listener.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        a.push_plaintext(a_handle, 0, b"hello mesh".to_vec()).await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(1), b.pull_plaintext(b_handle))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, b"hello mesh");
    }

    #[tokio::test]
    async fn policy_denial_rejects_open() {
        struct DenyAll;
        impl AllowPolicy for DenyAll {
            fn is_allowed(&self, _pubkey: &[u8; KEY_SIZE], _initiator: bool) -> AllowReason {
                AllowReason::Denied("no")
            }
        }
        let router = LoopbackRouter::new();
        let a = SessionManager::new(PermKeypair::generate(), router, Arc::new(DenyAll), SessionManagerConfig::default());
        let err = a.open([1u8; KEY_SIZE], Vec::new()).await.unwrap_err();
        assert!(matches!(err, MeshError::Handshake(HandshakeError::PolicyDenied)));
    }
}
