//! mesh-session key generation utility
//!
//! Generates an X25519 identity keypair for a mesh-echo node.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p mesh-echo --bin keygen
//! ```

use std::env;

use mesh_session::crypto::PermKeypair;

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

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("mesh-session key generation utility");
        println!();
        println!("Usage:");
        println!("  keygen    Generate a fresh random identity keypair");
        println!();
        println!("Output:");
        println!("  Base64-encoded keys ready for environment variables");
        return;
    }

    let keypair = PermKeypair::generate();
    let private_b64 = encode_base64(&keypair.private_bytes());
    let public_b64 = encode_base64(&keypair.public());

    println!("Generated fresh identity keypair");
    println!();
    println!("Private key (base64) - keep secret!");
    println!("{private_b64}");
    println!();
    println!("Public key (base64) - share with peers that should connect to you");
    println!("{public_b64}");
    println!();
    println!("# Server configuration:");
    println!("export MESH_SERVER_PRIVATE_KEY={private_b64}");
    println!("export MESH_SERVER_PUBLIC_KEY={public_b64}");
    println!("export MESH_MODE=server");
    println!();
    println!("# Client configuration:");
    println!("export MESH_MODE=client");
    println!("export MESH_SERVER_PUBLIC_KEY={public_b64}");
    println!("export MESH_SERVER_HOST=<server-ip-or-hostname>");
}
