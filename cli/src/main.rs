//! Address Lookup Table Populator
//!
//! Harvests the account addresses referenced by a set of historical
//! transactions and stores them in a fresh on-chain lookup table:
//! - fetch each transaction and decompile it through the lookup tables it used
//! - deduplicate the referenced addresses and slice them into batches that
//!   fit one extend instruction each
//! - create the table and submit one transaction per batch, waiting for
//!   confirmation between dependent submissions

mod batch;
mod config;
mod extract;
mod lut;

use clap::Parser;
use config::{Command, Config};
use solana_client::nonblocking::rpc_client::RpcClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::parse();

    match config.command.clone() {
        Command::Populate {
            signatures,
            extend_table,
            max_addresses_per_extend,
            priority_fee,
            confirm_timeout_secs,
        } => {
            // Keypair problems surface before any connection is opened
            let payer = config.load_keypair()?;

            let rpc = Arc::new(RpcClient::new_with_commitment(
                config.rpc_url.clone(),
                config.commitment,
            ));
            let populator = lut::LutPopulator::new(
                rpc.clone(),
                payer,
                config.commitment,
                priority_fee,
                Duration::from_secs(confirm_timeout_secs),
            );
            info!("Payer: {}", populator.payer_pubkey());

            info!("Harvesting addresses from {} transactions...", signatures.len());
            let raw = extract::collect_addresses(&rpc, &signatures, config.commitment).await?;
            let addresses = batch::dedup_addresses(&raw)?;
            info!("Address count: {} ({} references before dedup)", addresses.len(), raw.len());

            if addresses.is_empty() {
                warn!("No addresses to store, leaving the table uncreated");
                return Ok(());
            }

            let batch_size =
                max_addresses_per_extend.unwrap_or_else(batch::default_extend_batch_size);
            let batches = batch::chunk_addresses(&addresses, batch_size)?;
            info!("Extending in {} batches of up to {} addresses", batches.len(), batch_size);

            let table_address = populator.populate(&batches, extend_table).await?;
            info!("✓ Lookup table {} populated", table_address);
        }
        Command::Show { table } => {
            let rpc = RpcClient::new_with_commitment(config.rpc_url.clone(), config.commitment);
            let state = lut::fetch_table_state(&rpc, &table).await?;

            info!("LUT Address: {}", table);
            info!("Contains {} addresses:", state.addresses.len());
            for (i, addr) in state.addresses.iter().enumerate() {
                info!("  [{}] {}", i, addr);
            }
            if state.is_active() {
                info!("Status: ACTIVE");
            } else {
                info!("Status: DEACTIVATED at slot {}", state.deactivation_slot);
            }
        }
    }

    Ok(())
}
