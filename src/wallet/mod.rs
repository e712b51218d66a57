//! Wallet set
//!
//! Signing identities loaded once at campaign start. The keys file holds one
//! secret key per line, base58 or JSON byte array; blank lines and `#`
//! comments are skipped.

use anyhow::{Context, Result};
use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::utils::parse_keypair;

/// Immutable signing identity, cheap to clone
#[derive(Clone)]
pub struct WalletHandle {
    keypair: Arc<Keypair>,
    pubkey: Pubkey,
}

impl WalletHandle {
    pub fn new(keypair: Keypair) -> Self {
        let pubkey = keypair.pubkey();
        Self {
            keypair: Arc::new(keypair),
            pubkey,
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl PartialEq for WalletHandle {
    fn eq(&self, other: &Self) -> bool {
        self.pubkey == other.pubkey
    }
}

impl Eq for WalletHandle {}

// Never print key material
impl fmt::Debug for WalletHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletHandle").field("pubkey", &self.pubkey).finish()
    }
}

impl fmt::Display for WalletHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pubkey)
    }
}

pub fn parse_wallets(content: &str) -> Result<Vec<WalletHandle>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            parse_keypair(line)
                .map(WalletHandle::new)
                .with_context(|| format!("Invalid key on line {}", index + 1))
        })
        .collect()
}

pub fn load_wallets(path: &Path) -> Result<Vec<WalletHandle>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read wallet file: {:?}", path))?;
    let wallets = parse_wallets(&content)?;
    info!("Loaded {} wallets from {:?}", wallets.len(), path);
    Ok(wallets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wallets_skips_comments() {
        let a = Keypair::new();
        let b = Keypair::new();
        let content = format!(
            "# campaign wallets\n{}\n\n{}\n",
            a.to_base58_string(),
            serde_json::to_string(&b.to_bytes().to_vec()).unwrap()
        );

        let wallets = parse_wallets(&content).unwrap();
        assert_eq!(wallets.len(), 2);
        assert_eq!(wallets[0].pubkey(), a.pubkey());
        assert_eq!(wallets[1].pubkey(), b.pubkey());
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let content = format!("{}\nnot-a-key\n", Keypair::new().to_base58_string());
        let err = parse_wallets(&content).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_debug_hides_secret() {
        let wallet = WalletHandle::new(Keypair::new());
        let shown = format!("{:?}", wallet);
        assert!(shown.contains(&wallet.pubkey().to_string()));
        assert!(!shown.contains(&wallet.keypair().to_base58_string()));
    }

    #[test]
    fn test_load_wallets_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("private_keys.txt");
        std::fs::write(&path, Keypair::new().to_base58_string()).unwrap();
        assert_eq!(load_wallets(&path).unwrap().len(), 1);
    }
}
