//! Echo server: accepts inbound sessions and echoes every delivered
//! plaintext back to its sender.

use std::net::SocketAddr;
use std::sync::Arc;

use mesh_session::core::traits::AllowAll;
use mesh_session::core::SessionManagerConfig;
use mesh_session::crypto::PermKeypair;
use mesh_session::{Listener, SessionManager};
use tokio::net::UdpSocket;

use crate::router::{pump_inbound, encode_coords, UdpRouter};

pub struct EchoServerConfig {
    pub bind_addr: SocketAddr,
    pub keypair: PermKeypair,
}

/// Run the echo server until the process is killed.
pub async fn run(config: EchoServerConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let socket = Arc::new(UdpSocket::bind(config.bind_addr).await?);
    eprintln!("Echo server listening on {}", config.bind_addr);

    let router = Arc::new(UdpRouter::new(socket.clone()));
    let manager = SessionManager::new(
        config.keypair,
        router,
        Arc::new(AllowAll),
        SessionManagerConfig::default(),
    );
    manager.set_coords(encode_coords(config.bind_addr)).await;

    tokio::spawn(pump_inbound(socket, manager.clone()));

    let mut listener = Listener::bind(&manager).await;
    while let Some(conn) = listener.accept().await {
        tokio::spawn(async move {
            while let Some(message) = conn.pull().await {
                eprintln!("echoing {} bytes", message.len());
                if let Err(e) = conn.push(0, message).await {
                    eprintln!("echo send failed: {e}");
                    break;
                }
            }
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_defaults_to_all_interfaces() {
        let addr: SocketAddr = "0.0.0.0:19999".parse().unwrap();
        assert_eq!(addr.port(), 19999);
    }
}
