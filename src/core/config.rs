//! Session manager configuration.
//!
//! Follows the same plain-struct-plus-builder shape the higher layers of
//! the codebase already use for their config types.

use std::time::Duration;

use super::constants::{
    CLEANUP_SWEEP_INTERVAL, MTU_FLOOR, NONCE_WINDOW_CAPACITY, NONCE_WINDOW_DURATION,
    RECV_QUEUE_DEPTH, RECV_STAGING_DEPTH, SEND_QUEUE_DEPTH, SHARED_KEY_CACHE_CAPACITY,
};

/// Tunables for a [`crate::server::SessionManager`] instance.
///
/// Fields here are things an embedding application reasonably wants to
/// vary; protocol-fixed values live in [`crate::core::constants`] instead.
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Number of crypto worker tasks backing the ordered seal/open pool.
    pub crypto_workers: usize,

    /// Depth of each session's outbound (pre-seal) queue.
    pub send_queue_depth: usize,

    /// Depth of each session's delivered-plaintext queue.
    pub recv_queue_depth: usize,

    /// Depth of the pre-decrypt staging queue (head-of-line throttle).
    pub recv_staging_depth: usize,

    /// Out-of-order nonce window duration.
    pub nonce_window_duration: Duration,

    /// Out-of-order nonce window capacity.
    pub nonce_window_capacity: usize,

    /// Soft cap on the protocol shared-key cache. `0` disables the cache
    /// entirely, forcing from-scratch derivation on every handshake op.
    pub shared_key_cache_capacity: usize,

    /// Minimum interval between session-table cleanup sweeps.
    pub cleanup_sweep_interval: Duration,

    /// MTU floor honored by the handshake update rule.
    pub mtu_floor: u16,

    /// Upper bound on concurrently live sessions. `None` means unbounded.
    pub max_sessions: Option<usize>,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            crypto_workers: 4,
            send_queue_depth: SEND_QUEUE_DEPTH,
            recv_queue_depth: RECV_QUEUE_DEPTH,
            recv_staging_depth: RECV_STAGING_DEPTH,
            nonce_window_duration: NONCE_WINDOW_DURATION,
            nonce_window_capacity: NONCE_WINDOW_CAPACITY,
            shared_key_cache_capacity: SHARED_KEY_CACHE_CAPACITY,
            cleanup_sweep_interval: CLEANUP_SWEEP_INTERVAL,
            mtu_floor: MTU_FLOOR,
            max_sessions: None,
        }
    }
}

/// Builder for [`SessionManagerConfig`].
#[derive(Debug, Default)]
pub struct SessionManagerConfigBuilder {
    config: SessionManagerConfig,
}

impl SessionManagerConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self {
            config: SessionManagerConfig::default(),
        }
    }

    /// Set the number of crypto worker tasks.
    pub fn crypto_workers(mut self, n: usize) -> Self {
        self.config.crypto_workers = n;
        self
    }

    /// Set the per-session send queue depth.
    pub fn send_queue_depth(mut self, depth: usize) -> Self {
        self.config.send_queue_depth = depth;
        self
    }

    /// Set the per-session receive queue depth.
    pub fn recv_queue_depth(mut self, depth: usize) -> Self {
        self.config.recv_queue_depth = depth;
        self
    }

    /// Set the pre-decrypt staging queue depth.
    pub fn recv_staging_depth(mut self, depth: usize) -> Self {
        self.config.recv_staging_depth = depth;
        self
    }

    /// Set the nonce window duration and capacity.
    pub fn nonce_window(mut self, duration: Duration, capacity: usize) -> Self {
        self.config.nonce_window_duration = duration;
        self.config.nonce_window_capacity = capacity;
        self
    }

    /// Set the shared-key cache capacity (`0` disables it).
    pub fn shared_key_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.shared_key_cache_capacity = capacity;
        self
    }

    /// Set the minimum interval between cleanup sweeps.
    pub fn cleanup_sweep_interval(mut self, interval: Duration) -> Self {
        self.config.cleanup_sweep_interval = interval;
        self
    }

    /// Set the maximum number of concurrently live sessions.
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config.max_sessions = Some(max);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SessionManagerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_protocol_constants() {
        let cfg = SessionManagerConfig::default();
        assert_eq!(cfg.mtu_floor, MTU_FLOOR);
        assert_eq!(cfg.nonce_window_capacity, NONCE_WINDOW_CAPACITY);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = SessionManagerConfigBuilder::new()
            .crypto_workers(8)
            .max_sessions(100)
            .build();
        assert_eq!(cfg.crypto_workers, 8);
        assert_eq!(cfg.max_sessions, Some(100));
    }
}
