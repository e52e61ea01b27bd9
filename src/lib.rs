//! # mesh-session
//!
//! A session manager for a mesh overlay network: a ping/pong handshake
//! that derives and rotates per-peer shared keys, a 24-byte nonce with a
//! fixed per-endpoint parity bit and an out-of-order replay window, and a
//! concurrent send/receive pipeline backed by an ordered crypto worker
//! pool.
//!
//! This crate knows nothing about sockets or routing tables: it depends
//! only on a [`core::Router`] collaborator to hand off encoded packets,
//! and an [`core::AllowPolicy`] collaborator to admit or reject peers. An
//! embedding application supplies both and drives inbound bytes into
//! [`server::SessionManager::handle_inbound`].
//!
//! ## Feature flags
//!
//! - `crypto` (default): key agreement, AEAD sealing, KDF, anti-replay window
//! - `transport` (default): wire codecs for handshake and traffic packets
//! - `server` (default): [`server::SessionManager`] and its pipelines
//! - `client` (default): [`client::Conn`] / [`client::Listener`] wrappers
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mesh_session::core::traits::AllowAll;
//! use mesh_session::core::SessionManagerConfig;
//! use mesh_session::crypto::PermKeypair;
//! use mesh_session::server::SessionManager;
//!
//! # fn router() -> Arc<dyn mesh_session::core::Router> { unimplemented!() }
//! # async fn run() {
//! let perm = PermKeypair::generate();
//! let manager = SessionManager::new(
//!     perm,
//!     router(),
//!     Arc::new(AllowAll),
//!     SessionManagerConfig::default(),
//! );
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included): traits, constants, error types, config.
pub mod core;

// Crypto layer (feature-gated): key agreement, AEAD, nonces, replay window.
#[cfg(feature = "crypto")]
#[cfg_attr(docsrs, doc(cfg(feature = "crypto")))]
pub mod crypto;

// Transport wire codecs (feature-gated): handshake and traffic framing.
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Session manager (feature-gated): table, handshake, pool, pipelines.
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

// Consumer-facing Conn/Listener wrappers (feature-gated).
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

/// Convenient imports for embedding applications.
pub mod prelude {
    pub use crate::core::{
        AllowPolicy, AllowReason, MeshError, Router, SessionHandle, SessionManagerConfig,
        SessionManagerConfigBuilder,
    };

    #[cfg(feature = "crypto")]
    pub use crate::crypto::{Handle, Nonce, PermKeypair, SesKeypair};

    #[cfg(feature = "server")]
    pub use crate::server::SessionManager;

    #[cfg(feature = "client")]
    pub use crate::client::{connect, Conn, Listener};
}

// Re-export the most commonly used items at the crate root.
pub use core::{AllowPolicy, AllowReason, MeshError, Router, SessionHandle, SessionManagerConfig};

#[cfg(feature = "server")]
pub use server::SessionManager;

#[cfg(feature = "client")]
pub use client::{connect, Conn, Listener};
