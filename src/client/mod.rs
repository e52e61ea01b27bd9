//! Consumer-facing session handles built on top of [`crate::server`].

mod conn;

pub use conn::{connect, Conn, Listener};
