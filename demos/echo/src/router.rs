//! A [`Router`] backed by a single UDP socket. Coords are the peer's
//! `SocketAddr`, formatted as UTF-8 text, so this router needs no side
//! table: it parses the destination straight back out of the coords it's
//! handed.

use std::net::SocketAddr;
use std::sync::Arc;

use mesh_session::core::traits::RouterError;
use mesh_session::core::Router;
use tokio::net::UdpSocket;

/// Encode a socket address as the coords bytes this router expects.
pub fn encode_coords(addr: SocketAddr) -> Vec<u8> {
    addr.to_string().into_bytes()
}

fn decode_coords(coords: &[u8]) -> Result<SocketAddr, RouterError> {
    std::str::from_utf8(coords)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| RouterError("malformed coords".into()))
}

/// Delivers encoded packets over a shared UDP socket.
pub struct UdpRouter {
    socket: Arc<UdpSocket>,
}

impl UdpRouter {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

impl Router for UdpRouter {
    fn deliver(&self, coords: &[u8], packet: Vec<u8>) -> Result<(), RouterError> {
        let addr = decode_coords(coords)?;
        // try_send_to is non-blocking: a full send buffer is dropped
        // rather than stalling the caller, matching the trait's contract
        // that deliver() never awaits network I/O.
        match self.socket.try_send_to(&packet, addr) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(RouterError(e.to_string())),
        }
    }
}

/// Drive inbound datagrams into the session manager until the socket
/// errors out.
pub async fn pump_inbound(socket: Arc<UdpSocket>, manager: Arc<mesh_session::SessionManager>) {
    let mut buf = vec![0u8; 65535];
    loop {
        let (len, _from) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                eprintln!("udp recv error: {e}");
                continue;
            }
        };
        if let Err(e) = manager.handle_inbound(buf[..len].to_vec()).await {
            eprintln!("dropped inbound packet: {e}");
        }
    }
}
