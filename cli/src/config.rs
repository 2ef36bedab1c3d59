//! Configuration for the LUT populator

use clap::{Parser, Subcommand};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
};
use std::path::PathBuf;

/// Address Lookup Table Populator
#[derive(Parser, Debug, Clone)]
#[command(name = "lut-populator")]
#[command(about = "Populates an address lookup table from historical transactions", long_about = None)]
pub struct Config {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// RPC URL
    #[arg(long, env = "RPC_URL", default_value = "https://api.mainnet-beta.solana.com")]
    pub rpc_url: String,

    /// Payer keypair path (JSON byte array)
    #[arg(long, env = "KEYPAIR_PATH")]
    pub keypair_path: PathBuf,

    /// Commitment level for reads and confirmations
    #[arg(long, env = "COMMITMENT", default_value = "confirmed")]
    pub commitment: CommitmentConfig,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a new LUT and fill it with the addresses referenced by the given transactions
    Populate {
        /// Transaction signatures to harvest addresses from
        #[arg(required = true)]
        signatures: Vec<Signature>,

        /// Pre-existing LUT that receives every batch after the first (all batches go
        /// to the new table when omitted)
        #[arg(long, env = "EXTEND_TABLE")]
        extend_table: Option<Pubkey>,

        /// Max addresses per extend instruction (default derived from the packet size limit)
        #[arg(long)]
        max_addresses_per_extend: Option<usize>,

        /// Priority fee in microlamports per compute unit (0 = no compute budget instruction)
        #[arg(long, env = "PRIORITY_FEE", default_value = "0")]
        priority_fee: u64,

        /// Seconds to wait for each transaction to confirm before giving up
        #[arg(long, default_value = "60")]
        confirm_timeout_secs: u64,
    },
    /// Show a LUT's contents
    Show {
        /// The lookup table address
        #[arg(long, env = "LUT_ADDRESS")]
        table: Pubkey,
    },
}

impl Config {
    /// Load the payer keypair from the configured path
    pub fn load_keypair(&self) -> Result<Keypair, KeypairError> {
        let keypair_data = std::fs::read_to_string(&self.keypair_path).map_err(|source| {
            KeypairError::FileAccess { path: self.keypair_path.clone(), source }
        })?;
        let keypair_bytes: Vec<u8> = serde_json::from_str(&keypair_data)
            .map_err(|e| KeypairError::Format(e.to_string()))?;
        Keypair::from_bytes(&keypair_bytes).map_err(|e| KeypairError::Format(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeypairError {
    #[error("failed to read keypair file {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("keypair file is not a valid JSON byte array: {0}")]
    Format(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signer::Signer;

    fn config_with_keypair_path(path: &str) -> Config {
        Config::parse_from([
            "lut-populator",
            "--keypair-path",
            path,
            "show",
            "--table",
            "3ERo1t8sjp6zUfgnsyL24wfdef6vAd54Zs7PMx74xf8g",
        ])
    }

    #[test]
    fn missing_keypair_file_is_a_file_access_error() {
        let config = config_with_keypair_path("/nonexistent/keypair.json");
        match config.load_keypair() {
            Err(KeypairError::FileAccess { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/keypair.json"));
            }
            Err(other) => panic!("expected FileAccess error, got {other}"),
            Ok(_) => panic!("expected FileAccess error, got a keypair"),
        }
    }

    #[test]
    fn malformed_keypair_file_is_a_format_error() {
        let path = std::env::temp_dir().join("lut-populator-bad-keypair.json");
        std::fs::write(&path, b"{\"not\": \"an array\"}").unwrap();

        let config = config_with_keypair_path(path.to_str().unwrap());
        assert!(matches!(config.load_keypair(), Err(KeypairError::Format(_))));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn keypair_round_trips_through_json_byte_array() {
        let keypair = Keypair::new();
        let path = std::env::temp_dir().join("lut-populator-test-keypair.json");
        let bytes: Vec<u8> = keypair.to_bytes().to_vec();
        std::fs::write(&path, serde_json::to_string(&bytes).unwrap()).unwrap();

        let config = config_with_keypair_path(path.to_str().unwrap());
        let loaded = config.load_keypair().unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());

        std::fs::remove_file(&path).ok();
    }
}
