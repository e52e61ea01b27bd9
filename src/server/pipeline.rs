//! The send and receive pipelines: per-session workers that offload
//! sealing/opening to the [`super::pool::CryptoWorkerPool`] while keeping
//! commit order equal to submission order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex, Notify};

use crate::core::constants::{FLOW_KEY_MARKER, PACKET_KIND_TRAFFIC};
use crate::core::traits::Router;
use crate::transport::wire::TrafficPacket;

use super::pool::{CryptoOp, CryptoWorkerPool};
use super::session::Session;

/// An outbound plaintext message tagged with an optional flow key.
/// `flow_key == 0` means "no flow key" (no suffix appended to coords).
pub struct FlowKeyMessage {
    /// Steers the message into a distinct downstream queue at the next
    /// hop when non-zero.
    pub flow_key: u64,
    /// Plaintext payload.
    pub message: Vec<u8>,
}

/// Bounded pre-decrypt staging queue with drop-oldest-on-overflow
/// semantics, used to head-of-line throttle inbound ciphertext before the
/// session lock and crypto pool are ever touched.
pub struct StagingQueue {
    capacity: usize,
    items: Mutex<VecDeque<Vec<u8>>>,
    len: AtomicUsize,
    notify: Notify,
}

impl StagingQueue {
    /// Create an empty queue bounded at `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            len: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    /// Push a packet, dropping the oldest queued entry if already at
    /// capacity.
    pub async fn push(&self, bytes: Vec<u8>) {
        let mut items = self.items.lock().await;
        if items.len() >= self.capacity {
            items.pop_front();
        } else {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        items.push_back(bytes);
        drop(items);
        self.notify.notify_one();
    }

    /// Pop the oldest packet, waiting if the queue is empty.
    pub async fn pop(&self) -> Vec<u8> {
        loop {
            let notified = self.notify.notified();
            {
                let mut items = self.items.lock().await;
                if let Some(item) = items.pop_front() {
                    self.len.fetch_sub(1, Ordering::Relaxed);
                    return item;
                }
            }
            notified.await;
        }
    }

    /// Current queue length.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// `true` if the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drain `send_rx`, sealing and forwarding each message to `router` in
/// the order it was dequeued.
pub async fn send_worker(
    session: Arc<Session>,
    mut send_rx: mpsc::Receiver<FlowKeyMessage>,
    pool: Arc<CryptoWorkerPool>,
    router: Arc<dyn Router>,
) {
    session.init.wait().await;
    loop {
        let msg = tokio::select! {
            _ = session.cancel.cancelled() => break,
            msg = send_rx.recv() => msg,
        };
        let Some(msg) = msg else { break };

        let (their_handle, mut coords, nonce, key) = session
            .do_locked(|info| {
                let nonce = info.next_my_nonce();
                info.bytes_sent += msg.message.len() as u64;
                (info.their_handle, info.coords.clone(), nonce, info.shared_key_snapshot())
            })
            .await;

        if msg.flow_key != 0 {
            coords.push(FLOW_KEY_MARKER);
            coords.extend_from_slice(&msg.flow_key.to_be_bytes());
        }

        let job_rx = pool
            .submit(CryptoOp::Seal {
                key,
                nonce,
                aad: Vec::new(),
                plaintext: msg.message,
            })
            .await;

        let sealed = match job_rx.await {
            Ok(Ok(ct)) => ct,
            _ => continue,
        };

        let packet = TrafficPacket {
            coords: coords.clone(),
            handle: their_handle,
            nonce,
            payload: sealed,
        }
        .encode();

        let mut framed = Vec::with_capacity(1 + packet.len());
        framed.push(PACKET_KIND_TRAFFIC);
        framed.extend_from_slice(&packet);

        let _ = router.deliver(&coords, framed);
    }
}

/// Drain the staging queue, decrypting and delivering each packet to
/// `session.delivered_tx` in the order it passed `nonceIsOK` at
/// submission.
pub async fn recv_worker(session: Arc<Session>, staging: Arc<StagingQueue>, pool: Arc<CryptoWorkerPool>) {
    session.init.wait().await;
    loop {
        let bytes = tokio::select! {
            _ = session.cancel.cancelled() => break,
            bytes = staging.pop() => bytes,
        };

        let Some(pkt) = TrafficPacket::decode(&bytes) else {
            continue;
        };

        let accepted = session
            .do_locked(|info| {
                if info.nonce_is_ok(&pkt.nonce) {
                    Some((info.key_epoch(), info.shared_key_snapshot()))
                } else {
                    None
                }
            })
            .await;

        let Some((epoch_before, key)) = accepted else {
            session.counters.invalid_nonce();
            continue;
        };

        let job_rx = pool
            .submit(CryptoOp::Open {
                key,
                nonce: pkt.nonce,
                aad: Vec::new(),
                ciphertext: pkt.payload,
            })
            .await;

        let plaintext = match job_rx.await {
            Ok(Ok(pt)) => pt,
            _ => continue,
        };

        let now = Instant::now();
        let committed = session
            .do_locked(|info| {
                if info.key_epoch() != epoch_before || !info.nonce_is_ok(&pkt.nonce) {
                    return false;
                }
                info.record_nonce(pkt.nonce, now);
                info.bytes_recvd += plaintext.len() as u64;
                info.time = now;
                true
            })
            .await;

        if !committed {
            session.counters.rekey_race();
            continue;
        }

        tokio::select! {
            _ = session.cancel.cancelled() => break,
            _ = session.delivered_tx.send(plaintext) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn staging_queue_drops_oldest_on_overflow() {
        let q = StagingQueue::new(2);
        q.push(vec![1]).await;
        q.push(vec![2]).await;
        q.push(vec![3]).await;
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop().await, vec![2]);
        assert_eq!(q.pop().await, vec![3]);
    }

    #[tokio::test]
    async fn staging_queue_pop_waits_for_push() {
        let q = Arc::new(StagingQueue::new(4));
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.pop().await });
        tokio::task::yield_now().await;
        q.push(vec![42]).await;
        assert_eq!(handle.await.unwrap(), vec![42]);
    }
}
