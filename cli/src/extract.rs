//! Address harvesting from historical transactions
//!
//! Fetches each transaction, resolves the lookup tables its message loaded
//! addresses from, and decompiles the compiled instructions back into full
//! account addresses.

use futures::future::try_join_all;
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::rpc_client::RpcClient,
    rpc_config::RpcTransactionConfig,
    rpc_request::RpcError,
};
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    commitment_config::CommitmentConfig,
    message::{
        v0::{LoadedAddresses, MessageAddressTableLookup},
        AccountKeys, VersionedMessage,
    },
    pubkey::Pubkey,
    signature::Signature,
};
use solana_transaction_status::UiTransactionEncoding;
use tracing::{debug, warn};

use crate::lut::{self, LutError};

/// Collect every account address referenced by the given transactions, in
/// transaction order, then instruction order, then per-instruction key order.
/// Duplicates are kept; deduplication happens downstream.
///
/// A signature the node doesn't know is logged and skipped rather than
/// aborting the harvest; transport and server failures abort it, so a flaky
/// RPC can't silently produce a partial address set.
pub async fn collect_addresses(
    rpc: &RpcClient,
    signatures: &[Signature],
    commitment: CommitmentConfig,
) -> Result<Vec<String>, ExtractError> {
    let config = RpcTransactionConfig {
        encoding: Some(UiTransactionEncoding::Base64),
        commitment: Some(commitment),
        max_supported_transaction_version: Some(0),
    };

    let mut addresses = Vec::new();
    for signature in signatures {
        let encoded = match rpc.get_transaction_with_config(signature, config.clone()).await {
            Ok(tx) => tx,
            Err(e) if is_not_found(&e) => {
                warn!("Transaction {} not found, skipping: {}", signature, e);
                continue;
            }
            Err(e) => {
                return Err(ExtractError::Fetch {
                    signature: signature.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let transaction = encoded
            .transaction
            .transaction
            .decode()
            .ok_or_else(|| ExtractError::Decode(signature.to_string()))?;
        let message = transaction.message;

        // Resolve the message's lookup tables concurrently. A message with no
        // lookups issues no account reads at all.
        let lookups = message.address_table_lookups().unwrap_or(&[]);
        let tables = try_join_all(
            lookups.iter().map(|lookup| lut::fetch_lookup_table(rpc, &lookup.account_key)),
        )
        .await?;

        let loaded = resolve_loaded_addresses(lookups, &tables)?;
        let flattened = message_account_addresses(&message, &loaded)?;
        debug!(
            "Transaction {}: {} lookup tables, {} account references",
            signature,
            tables.len(),
            flattened.len()
        );
        addresses.extend(flattened);
    }

    Ok(addresses)
}

/// getTransaction returns JSON null for a signature the node doesn't know,
/// which the client surfaces as a decode error rather than a typed
/// not-found; node-side lookup misses come back as user-facing RPC errors.
/// Everything else (transport, server, malformed response) is a real failure.
fn is_not_found(error: &ClientError) -> bool {
    matches!(
        error.kind(),
        ClientErrorKind::SerdeJson(_) | ClientErrorKind::RpcError(RpcError::ForUser(_))
    )
}

/// Project each lookup's writable/readonly indexes through its fetched table.
/// Table order must match lookup order.
fn resolve_loaded_addresses(
    lookups: &[MessageAddressTableLookup],
    tables: &[AddressLookupTableAccount],
) -> Result<LoadedAddresses, ExtractError> {
    let mut loaded = LoadedAddresses::default();
    for (lookup, table) in lookups.iter().zip(tables) {
        for &index in &lookup.writable_indexes {
            loaded.writable.push(table_entry(table, index)?);
        }
        for &index in &lookup.readonly_indexes {
            loaded.readonly.push(table_entry(table, index)?);
        }
    }
    Ok(loaded)
}

fn table_entry(table: &AddressLookupTableAccount, index: u8) -> Result<Pubkey, ExtractError> {
    table
        .addresses
        .get(index as usize)
        .copied()
        .ok_or(ExtractError::TableIndexOutOfBounds { table: table.key, index })
}

/// Decompile: map every compiled instruction's account indexes back to full
/// addresses through the combined static + loaded key list.
fn message_account_addresses(
    message: &VersionedMessage,
    loaded: &LoadedAddresses,
) -> Result<Vec<String>, ExtractError> {
    let keys = AccountKeys::new(message.static_account_keys(), Some(loaded));

    let mut addresses = Vec::new();
    for instruction in message.instructions() {
        for &index in &instruction.accounts {
            let key = keys
                .get(index as usize)
                .ok_or(ExtractError::AccountIndexOutOfBounds(index))?;
            addresses.push(key.to_string());
        }
    }
    Ok(addresses)
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to fetch transaction {signature}: {message}")]
    Fetch { signature: String, message: String },
    #[error("transaction {0} could not be decoded")]
    Decode(String),
    #[error(transparent)]
    Lut(#[from] LutError),
    #[error("lookup table {table} has no entry at index {index}")]
    TableIndexOutOfBounds { table: Pubkey, index: u8 },
    #[error("instruction references account index {0} past the end of the key list")]
    AccountIndexOutOfBounds(u8),
}
