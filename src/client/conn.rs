//! [`Conn`]: a thin per-session handle over a [`SessionManager`],
//! grounded on the same pattern the teacher codebase uses for
//! `StateSender`/`StateReceiver` — a small wrapper around a channel
//! identifier, not an owner of any state itself.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::error::MeshError;
use crate::core::traits::SessionHandle;
use crate::server::SessionManager;

/// One established (or establishing) session, as seen by application
/// code. Cloning is cheap: every clone shares the same underlying
/// session via the manager.
#[derive(Clone)]
pub struct Conn {
    manager: Arc<SessionManager>,
    handle: SessionHandle,
}

impl Conn {
    fn new(manager: Arc<SessionManager>, handle: SessionHandle) -> Self {
        Self { manager, handle }
    }

    /// The opaque local handle identifying this session.
    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    /// Enqueue a plaintext message, optionally tagged with a flow key.
    /// `flow_key == 0` means "no flow key".
    pub async fn push(&self, flow_key: u64, message: Vec<u8>) -> Result<(), MeshError> {
        self.manager.push_plaintext(self.handle, flow_key, message).await
    }

    /// Await the next delivered plaintext. Resolves to `None` once the
    /// session is closed and its queue drained.
    pub async fn pull(&self) -> Option<Vec<u8>> {
        self.manager.pull_plaintext(self.handle).await
    }

    /// The peer's currently negotiated MTU, if the session is still live.
    pub async fn mtu(&self) -> Option<u16> {
        self.manager.mtu(self.handle).await
    }

    /// Close the session.
    pub async fn close(&self) {
        self.manager.close(self.handle).await
    }
}

/// Open a session to `their_perm_pub` at `coords` (the peer's wire
/// address, as resolved by whatever address book or DHT the embedder
/// uses) and wrap it as a [`Conn`].
pub async fn connect(manager: &Arc<SessionManager>, their_perm_pub: [u8; 32], coords: Vec<u8>) -> Result<Conn, MeshError> {
    let handle = manager.open(their_perm_pub, coords).await?;
    Ok(Conn::new(manager.clone(), handle))
}

/// Listens for inbound sessions admitted by a [`SessionManager`],
/// yielding a [`Conn`] for each.
pub struct Listener {
    manager: Arc<SessionManager>,
    rx: mpsc::Receiver<SessionHandle>,
}

impl Listener {
    /// Arm `manager` for inbound sessions and return a listener over
    /// them. Replaces any previously armed listener on the manager.
    pub async fn bind(manager: &Arc<SessionManager>) -> Self {
        let rx = manager.subscribe().await;
        Self { manager: manager.clone(), rx }
    }

    /// Await the next inbound, already-admitted session.
    pub async fn accept(&mut self) -> Option<Conn> {
        let handle = self.rx.recv().await?;
        Some(Conn::new(self.manager.clone(), handle))
    }
}
