//! Echo client: opens a session to the server and round-trips test
//! messages (or, in persistent mode, lines read from stdin).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mesh_session::connect;
use mesh_session::core::traits::AllowAll;
use mesh_session::core::SessionManagerConfig;
use mesh_session::crypto::PermKeypair;
use mesh_session::Conn;
use mesh_session::SessionManager;
use tokio::net::UdpSocket;

use crate::router::{pump_inbound, encode_coords, UdpRouter};

pub struct EchoClientConfig {
    pub server_addr: SocketAddr,
    pub server_public_key: [u8; 32],
    pub bind_addr: SocketAddr,
    pub persistent: bool,
}

pub async fn run(config: EchoClientConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let socket = Arc::new(UdpSocket::bind(config.bind_addr).await?);
    let local_addr = socket.local_addr()?;
    eprintln!("Client bound to {local_addr}, connecting to {}", config.server_addr);

    let router = Arc::new(UdpRouter::new(socket.clone()));
    let manager = SessionManager::new(
        PermKeypair::generate(),
        router,
        Arc::new(AllowAll),
        SessionManagerConfig::default(),
    );
    manager.set_coords(encode_coords(local_addr)).await;

    tokio::spawn(pump_inbound(socket, manager.clone()));

    let conn = connect(&manager, config.server_public_key, encode_coords(config.server_addr)).await?;

    if config.persistent {
        run_persistent(conn).await
    } else {
        run_test_messages(conn).await
    }
}

async fn echo_roundtrip(conn: &Conn, message: &[u8]) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
    conn.push(0, message.to_vec()).await?;
    for _ in 0..3 {
        match tokio::time::timeout(Duration::from_millis(500), conn.pull()).await {
            Ok(Some(reply)) => return Ok(reply),
            Ok(None) => return Err("session closed".into()),
            Err(_) => {
                eprintln!("no response yet, retrying...");
                conn.push(0, message.to_vec()).await?;
            }
        }
    }
    Err("no response from server after 3 attempts".into())
}

async fn run_test_messages(conn: Conn) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let test_messages = [
        "Hello, mesh!",
        "Echo test 1",
        "Echo test 2",
        "Goodbye!",
    ];

    for msg in &test_messages {
        match echo_roundtrip(&conn, msg.as_bytes()).await {
            Ok(reply) if reply == msg.as_bytes() => {
                eprintln!("echo matched: {:?}", String::from_utf8_lossy(&reply));
            }
            Ok(reply) => {
                eprintln!("echo mismatch: expected {msg:?}, got {:?}", String::from_utf8_lossy(&reply));
            }
            Err(e) => eprintln!("echo failed: {e}"),
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    eprintln!("Echo client test complete");
    Ok(())
}

async fn run_persistent(conn: Conn) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    eprintln!("Persistent mode: enter messages to echo (Ctrl+C to exit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await? {
            Some(text) if !text.is_empty() => match echo_roundtrip(&conn, text.as_bytes()).await {
                Ok(reply) => eprintln!("echo: {:?}", String::from_utf8_lossy(&reply)),
                Err(e) => eprintln!("echo failed: {e}"),
            },
            Some(_) => continue,
            None => {
                eprintln!("EOF received, exiting");
                break;
            }
        }
    }

    Ok(())
}
