//! Address Lookup Table (LUT) lifecycle driver
//!
//! Builds the create/extend instructions and submits them as versioned
//! transactions. The create instruction rides in the same transaction as the
//! first extend, because a freshly created table can't be extended from a
//! later transaction until creation has been observed on chain. Every
//! subsequent batch gets its own transaction, and each submission waits for
//! the previous one to reach the configured commitment before building
//! against a fresh blockhash.

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    address_lookup_table::{
        instruction::{create_lookup_table, extend_lookup_table},
        state::AddressLookupTable,
        AddressLookupTableAccount,
    },
    commitment_config::CommitmentConfig,
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::Instruction,
    message::{v0::Message as V0Message, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// On-chain state of a lookup table account
pub struct TableState {
    pub addresses: Vec<Pubkey>,
    pub deactivation_slot: u64,
}

impl TableState {
    pub fn is_active(&self) -> bool {
        self.deactivation_slot == u64::MAX
    }
}

/// Fetch and deserialize a lookup table account
pub async fn fetch_table_state(rpc: &RpcClient, address: &Pubkey) -> Result<TableState, LutError> {
    let account = rpc.get_account(address).await.map_err(|e| LutError::Rpc(e.to_string()))?;

    let lookup_table = AddressLookupTable::deserialize(&account.data)
        .map_err(|e| LutError::Deserialize(format!("{:?}", e)))?;

    Ok(TableState {
        deactivation_slot: lookup_table.meta.deactivation_slot,
        addresses: lookup_table.addresses.to_vec(),
    })
}

/// Fetch a lookup table in the form message decompilation consumes
pub async fn fetch_lookup_table(
    rpc: &RpcClient,
    address: &Pubkey,
) -> Result<AddressLookupTableAccount, LutError> {
    let state = fetch_table_state(rpc, address).await?;
    Ok(AddressLookupTableAccount { key: *address, addresses: state.addresses })
}

/// Creates a lookup table and fills it batch by batch
pub struct LutPopulator {
    rpc: Arc<RpcClient>,
    payer: Keypair,
    commitment: CommitmentConfig,
    priority_fee: u64,
    confirm_timeout: Duration,
}

impl LutPopulator {
    pub fn new(
        rpc: Arc<RpcClient>,
        payer: Keypair,
        commitment: CommitmentConfig,
        priority_fee: u64,
        confirm_timeout: Duration,
    ) -> Self {
        Self { rpc, payer, commitment, priority_fee, confirm_timeout }
    }

    pub fn payer_pubkey(&self) -> Pubkey {
        self.payer.pubkey()
    }

    /// Create-table instruction with the payer as authority and fee payer,
    /// derived from the given slot
    pub fn create_instruction(&self, recent_slot: u64) -> (Instruction, Pubkey) {
        create_lookup_table(self.payer.pubkey(), self.payer.pubkey(), recent_slot)
    }

    /// Extend instruction for one batch. An empty batch is rejected rather
    /// than submitted.
    pub fn extend_instruction(
        &self,
        table: Pubkey,
        addresses: Vec<Pubkey>,
    ) -> Result<Instruction, LutError> {
        if addresses.is_empty() {
            return Err(LutError::NoNewAddresses);
        }

        Ok(extend_lookup_table(
            table,
            self.payer.pubkey(),
            Some(self.payer.pubkey()),
            addresses,
        ))
    }

    /// Create a new table and extend it with every batch. When
    /// `existing_table` is given, batches after the first extend that table
    /// instead of the new one. Returns the new table's address.
    pub async fn populate(
        &self,
        batches: &[Vec<Pubkey>],
        existing_table: Option<Pubkey>,
    ) -> Result<Pubkey, LutError> {
        let first_batch = batches.first().ok_or(LutError::NoNewAddresses)?;

        let recent_slot =
            self.rpc.get_slot().await.map_err(|e| LutError::Rpc(e.to_string()))?;
        let (create_ix, table_address) = self.create_instruction(recent_slot);
        info!("Lookup table address: {}", table_address);

        let first_extend = self.extend_instruction(table_address, first_batch.clone())?;
        let signature = self.send_and_confirm(vec![create_ix, first_extend]).await?;
        info!("Signature: https://explorer.solana.com/tx/{}", signature);

        let follow_up_table = existing_table.unwrap_or(table_address);
        for batch in &batches[1..] {
            let extend_ix = self.extend_instruction(follow_up_table, batch.clone())?;
            let signature = self.send_and_confirm(vec![extend_ix]).await?;
            info!(
                "Extended {} with {} addresses. Signature: https://explorer.solana.com/tx/{}",
                follow_up_table,
                batch.len(),
                signature
            );
        }

        Ok(table_address)
    }

    /// Compile, sign, broadcast, and wait for the configured commitment
    async fn send_and_confirm(
        &self,
        mut instructions: Vec<Instruction>,
    ) -> Result<Signature, LutError> {
        if self.priority_fee > 0 {
            instructions
                .insert(0, ComputeBudgetInstruction::set_compute_unit_price(self.priority_fee));
        }

        let recent_blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| LutError::Rpc(e.to_string()))?;
        let tx = build_versioned_tx(&self.payer, &instructions, recent_blockhash)?;

        let signature = self
            .rpc
            .send_transaction(&tx)
            .await
            .map_err(|e| LutError::Send(e.to_string()))?;
        self.confirm(&tx, signature).await?;

        Ok(signature)
    }

    /// Poll signature statuses until the transaction satisfies our
    /// commitment, fails, or the timeout elapses. The transaction is
    /// re-broadcast periodically in case the first send was dropped.
    async fn confirm(
        &self,
        tx: &VersionedTransaction,
        signature: Signature,
    ) -> Result<(), LutError> {
        let deadline = Instant::now() + self.confirm_timeout;
        let mut polls = 0u32;

        while Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(500)).await;
            polls += 1;

            let statuses = self
                .rpc
                .get_signature_statuses(&[signature])
                .await
                .map_err(|e| LutError::Rpc(e.to_string()))?
                .value;

            match statuses.into_iter().next().flatten() {
                Some(status) if status.err.is_some() => {
                    return Err(LutError::TransactionFailed(signature.to_string()));
                }
                Some(status) if status.satisfies_commitment(self.commitment) => {
                    return Ok(());
                }
                _ => {
                    // Not landed yet; re-send every ~5s
                    if polls % 10 == 0 {
                        if let Err(e) = self.rpc.send_transaction(tx).await {
                            warn!("Re-send of {} failed: {}", signature, e);
                        }
                    }
                }
            }
        }

        Err(LutError::Timeout(signature.to_string()))
    }
}

/// Build a signed v0 transaction from the payer and instructions
pub fn build_versioned_tx(
    payer: &Keypair,
    instructions: &[Instruction],
    recent_blockhash: Hash,
) -> Result<VersionedTransaction, LutError> {
    let message = V0Message::try_compile(&payer.pubkey(), instructions, &[], recent_blockhash)
        .map_err(|e| LutError::Compile(e.to_string()))?;

    let versioned_message = VersionedMessage::V0(message);
    VersionedTransaction::try_new(versioned_message, &[payer])
        .map_err(|e| LutError::Sign(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum LutError {
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("Deserialize error: {0}")]
    Deserialize(String),
    #[error("No new addresses to add")]
    NoNewAddresses,
    #[error("Message compile error: {0}")]
    Compile(String),
    #[error("Sign error: {0}")]
    Sign(String),
    #[error("Send error: {0}")]
    Send(String),
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
    #[error("Timeout waiting for confirmation: {0}")]
    Timeout(String),
}
