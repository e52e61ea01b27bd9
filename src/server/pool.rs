//! The crypto worker pool: a fixed number of tasks performing seal/open
//! operations off the async executor's cooperative scheduling path, with
//! FIFO-ordered commit left to the caller (see [`super::pipeline`]).

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::core::error::CryptoError;
use crate::crypto::{open, seal, Nonce, SharedKey};

/// Result of one crypto job.
pub type CryptoResult = Result<Vec<u8>, CryptoError>;

/// A unit of cryptographic work submitted to the pool. The job carries
/// its own key snapshot rather than a session reference: workers never
/// touch session state or locks.
pub enum CryptoOp {
    Seal {
        key: SharedKey,
        nonce: Nonce,
        aad: Vec<u8>,
        plaintext: Vec<u8>,
    },
    Open {
        key: SharedKey,
        nonce: Nonce,
        aad: Vec<u8>,
        ciphertext: Vec<u8>,
    },
}

impl CryptoOp {
    fn run(self) -> CryptoResult {
        match self {
            CryptoOp::Seal { key, nonce, aad, plaintext } => seal(&key, &nonce, &aad, &plaintext),
            CryptoOp::Open { key, nonce, aad, ciphertext } => open(&key, &nonce, &aad, &ciphertext),
        }
    }
}

struct CryptoJob {
    op: CryptoOp,
    respond_to: oneshot::Sender<CryptoResult>,
}

/// A bounded pool of workers draining a shared job queue.
///
/// Jobs may *complete* out of order; callers that need ordered commit
/// keep their `oneshot::Receiver`s in submission order and await them
/// head-first, exactly as the send/receive pipelines do.
pub struct CryptoWorkerPool {
    jobs: mpsc::Sender<CryptoJob>,
    workers: Vec<JoinHandle<()>>,
}

impl CryptoWorkerPool {
    /// Spawn `worker_count` tasks pulling from a shared job queue.
    pub fn new(worker_count: usize) -> Self {
        let (jobs, rx) = mpsc::channel::<CryptoJob>(worker_count.max(1) * 4);
        let rx = std::sync::Arc::new(tokio::sync::Mutex::new(rx));
        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count.max(1) {
            let rx = rx.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(job) = job else { break };
                    let result = job.op.run();
                    let _ = job.respond_to.send(result);
                }
            }));
        }
        Self { jobs, workers }
    }

    /// Submit a job, returning the receiver half of its single-shot
    /// completion channel. Dropping the receiver without awaiting it
    /// simply discards the result when it arrives.
    pub async fn submit(&self, op: CryptoOp) -> oneshot::Receiver<CryptoResult> {
        let (respond_to, rx) = oneshot::channel();
        // Ignore send failure: if every worker has exited, the caller's
        // await on `rx` below returns `Err` from the dropped sender.
        let _ = self.jobs.send(CryptoJob { op, respond_to }).await;
        rx
    }
}

impl Drop for CryptoWorkerPool {
    fn drop(&mut self) {
        for handle in &self.workers {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::KEY_SIZE;

    #[tokio::test]
    async fn seal_and_open_roundtrip_through_pool() {
        let pool = CryptoWorkerPool::new(2);
        let key = SharedKey::derive(&[4u8; KEY_SIZE]);
        let nonce = Nonce::initial(true);
        let rx = pool
            .submit(CryptoOp::Seal {
                key: key.clone(),
                nonce,
                aad: b"hdr".to_vec(),
                plaintext: b"payload".to_vec(),
            })
            .await;
        let ct = rx.await.unwrap().unwrap();
        let rx = pool
            .submit(CryptoOp::Open {
                key,
                nonce,
                aad: b"hdr".to_vec(),
                ciphertext: ct,
            })
            .await;
        let pt = rx.await.unwrap().unwrap();
        assert_eq!(pt, b"payload");
    }

    #[tokio::test]
    async fn fifo_commit_survives_out_of_order_completion() {
        // Two jobs submitted in order; even if the second were to finish
        // first internally, awaiting receivers head-first commits in
        // submission order since each receiver only yields its own job's
        // result.
        let pool = CryptoWorkerPool::new(4);
        let key = SharedKey::derive(&[1u8; KEY_SIZE]);
        let mut receivers = std::collections::VecDeque::new();
        for i in 0..8u64 {
            let nonce = Nonce::from_counter(i * 2, false);
            let rx = pool
                .submit(CryptoOp::Seal {
                    key: key.clone(),
                    nonce,
                    aad: Vec::new(),
                    plaintext: i.to_be_bytes().to_vec(),
                })
                .await;
            receivers.push_back((i, rx));
        }
        let mut committed = Vec::new();
        while let Some((i, rx)) = receivers.pop_front() {
            rx.await.unwrap().unwrap();
            committed.push(i);
        }
        assert_eq!(committed, (0..8).collect::<Vec<_>>());
    }
}
