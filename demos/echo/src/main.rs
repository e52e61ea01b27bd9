//! mesh-session echo example
//!
//! A UDP-backed echo service built on [`mesh_session::SessionManager`]:
//! the server accepts inbound sessions and echoes every delivered
//! message back; the client opens a session and round-trips test
//! messages (or, in persistent mode, stdin lines).
//!
//! # Environment variables
//!
//! - `MESH_MODE`: "server" or "client" (required)
//! - `MESH_SERVER_PUBLIC_KEY`: base64-encoded server public key (client needs this)
//! - `MESH_SERVER_HOST`: server hostname (client only, default: 127.0.0.1)
//! - `MESH_SERVER_PORT`: server port (both, default: 19999)
//! - `MESH_BIND_ADDR`: bind address (server only, default: 0.0.0.0)
//! - `MESH_HEALTH_PORT`: health check port (both, default: 8080)
//! - `MESH_PERSISTENT`: "true" for persistent client mode (client only)
//!
//! # Key management
//!
//! The server generates an identity keypair on startup and prints the
//! public key in base64. Copy it into the client's
//! `MESH_SERVER_PUBLIC_KEY` environment variable, or use the `keygen`
//! binary to generate one up front.

mod client;
mod health;
mod router;
mod server;

use std::env;
use std::net::SocketAddr;

use client::{run as run_client_loop, EchoClientConfig};
use health::{start_health_server, HealthState};
use mesh_session::crypto::PermKeypair;
use server::{run as run_server_loop, EchoServerConfig};

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn encode_base64(data: &[u8]) -> String {
    let mut output = String::with_capacity((data.len() + 2) / 3 * 4);
    for chunk in data.chunks(3) {
        let b0 = chunk[0] as usize;
        let b1 = chunk.get(1).copied().unwrap_or(0) as usize;
        let b2 = chunk.get(2).copied().unwrap_or(0) as usize;
        let combined = (b0 << 16) | (b1 << 8) | b2;
        output.push(ALPHABET[(combined >> 18) & 0x3F] as char);
        output.push(ALPHABET[(combined >> 12) & 0x3F] as char);
        output.push(if chunk.len() > 1 { ALPHABET[(combined >> 6) & 0x3F] as char } else { '=' });
        output.push(if chunk.len() > 2 { ALPHABET[combined & 0x3F] as char } else { '=' });
    }
    output
}

fn decode_base64(input: &str) -> Result<Vec<u8>, &'static str> {
    let input = input.trim().as_bytes();
    let mut output = Vec::with_capacity(input.len() * 3 / 4);
    let mut buffer = 0u32;
    let mut bits = 0u32;

    for &byte in input {
        if byte == b'=' {
            break;
        }
        let value = ALPHABET.iter().position(|&c| c == byte).ok_or("invalid base64")? as u32;
        buffer = (buffer << 6) | value;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            output.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }
    Ok(output)
}

fn parse_key(env_var: &str) -> Option<[u8; 32]> {
    let bytes = decode_base64(&env::var(env_var).ok()?).ok()?;
    if bytes.len() != 32 {
        eprintln!("Warning: {env_var} has wrong length ({}), ignoring", bytes.len());
        return None;
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Some(key)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mode = env::var("MESH_MODE").unwrap_or_else(|_| "server".to_string());
    let port: u16 = env::var("MESH_SERVER_PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(19999);
    let health_port: u16 = env::var("MESH_HEALTH_PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(8080);

    eprintln!("mesh-echo - mode: {mode}");

    match mode.as_str() {
        "server" => run_server(port, health_port).await,
        "client" => run_client(port, health_port).await,
        _ => {
            eprintln!("Unknown mode: {mode}. Use 'server' or 'client'");
            std::process::exit(1);
        }
    }
}

async fn run_server(port: u16, health_port: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let bind_addr: SocketAddr = env::var("MESH_BIND_ADDR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| format!("0.0.0.0:{port}").parse().unwrap());

    let keypair = match parse_key("MESH_SERVER_PRIVATE_KEY") {
        Some(private) => {
            eprintln!("Using provided server identity key from environment");
            PermKeypair::from_private_bytes(private)
        }
        None => PermKeypair::generate(),
    };

    eprintln!("=== Server public key (for clients) ===");
    eprintln!("{}", encode_base64(&keypair.public()));
    eprintln!("========================================");

    let health_state = HealthState::server();
    spawn_health_server(health_port, health_state).await;

    run_server_loop(EchoServerConfig { bind_addr, keypair }).await
}

async fn run_client(port: u16, health_port: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server_host = env::var("MESH_SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_addr: SocketAddr = tokio::net::lookup_host(format!("{server_host}:{port}"))
        .await?
        .next()
        .ok_or("failed to resolve server address")?;

    let server_public_key = match parse_key("MESH_SERVER_PUBLIC_KEY") {
        Some(key) => key,
        None => {
            eprintln!("Warning: no MESH_SERVER_PUBLIC_KEY provided; handshake will fail.");
            [0u8; 32]
        }
    };

    let persistent = env::var("MESH_PERSISTENT").map(|v| v == "true" || v == "1").unwrap_or(false);

    let health_state = HealthState::client();
    spawn_health_server(health_port, health_state.clone()).await;

    let config = EchoClientConfig {
        server_addr,
        server_public_key,
        bind_addr: "0.0.0.0:0".parse()?,
        persistent,
    };

    let result = run_client_loop(config).await;
    health_state.set_connected(result.is_ok()).await;
    result
}

async fn spawn_health_server(port: u16, state: HealthState) {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse().unwrap();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(addr, state).await {
            eprintln!("Health server error: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_roundtrip() {
        let original = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let encoded = encode_base64(&original);
        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn base64_32_bytes_roundtrip() {
        let key = [0xabu8; 32];
        let encoded = encode_base64(&key);
        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn parse_key_missing_env_is_none() {
        assert!(parse_key("MESH_ECHO_NONEXISTENT_KEY").is_none());
    }
}
