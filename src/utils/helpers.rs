//! Helper functions

use anyhow::{Context, Result};
use solana_sdk::signature::Keypair;
use std::time::Instant;

pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Secret key as a JSON byte array or a base58 string
pub fn parse_keypair(encoded: &str) -> Result<Keypair> {
    let encoded = encoded.trim();
    let bytes: Vec<u8> = if encoded.starts_with('[') {
        serde_json::from_str(encoded).context("Failed to parse keypair JSON")?
    } else {
        bs58::decode(encoded)
            .into_vec()
            .context("Failed to decode base58 keypair")?
    };

    Keypair::from_bytes(&bytes).map_err(|e| anyhow::anyhow!("Invalid keypair: {}", e))
}
