//! Deduplication and batching of harvested addresses
//!
//! A single extend instruction can only carry as many addresses as fit in one
//! transaction packet, so the deduplicated set is sliced into fixed-size
//! batches and each batch becomes its own extend instruction.

use solana_sdk::{packet::PACKET_DATA_SIZE, pubkey::Pubkey};
use std::collections::HashSet;
use std::str::FromStr;

/// Fixed bytes of a v0 extend transaction that aren't address payload:
/// signature, message header, static account keys (payer, table, LUT program,
/// system program), recent blockhash, and instruction metadata, padded with
/// headroom for a compute budget instruction.
const EXTEND_TX_OVERHEAD_BYTES: usize = 432;

/// How many addresses one extend instruction can safely carry, derived from
/// the transaction packet limit rather than hardcoded per network.
pub fn default_extend_batch_size() -> usize {
    (PACKET_DATA_SIZE - EXTEND_TX_OVERHEAD_BYTES) / std::mem::size_of::<Pubkey>()
}

/// Parse the harvested base58 strings and drop duplicates, keeping the
/// first-seen order so batching stays deterministic across runs.
pub fn dedup_addresses(raw: &[String]) -> Result<Vec<Pubkey>, BatchError> {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut unique = Vec::new();

    for value in raw {
        if !seen.insert(value.as_str()) {
            continue;
        }
        let address = Pubkey::from_str(value)
            .map_err(|_| BatchError::InvalidAddress(value.clone()))?;
        unique.push(address);
    }

    Ok(unique)
}

/// Slice the deduplicated list into contiguous batches of at most
/// `max_per_batch` addresses. Only the final batch may be short.
pub fn chunk_addresses(
    addresses: &[Pubkey],
    max_per_batch: usize,
) -> Result<Vec<Vec<Pubkey>>, BatchError> {
    if max_per_batch == 0 {
        return Err(BatchError::ZeroBatchSize);
    }
    Ok(addresses.chunks(max_per_batch).map(<[Pubkey]>::to_vec).collect())
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("harvested address is not a valid pubkey: {0}")]
    InvalidAddress(String),
    #[error("batch size must be at least 1")]
    ZeroBatchSize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_addresses(n: usize) -> Vec<String> {
        (0..n).map(|_| Pubkey::new_unique().to_string()).collect()
    }

    #[test]
    fn default_batch_size_fits_the_reference_cap() {
        assert_eq!(default_extend_batch_size(), 25);
    }

    #[test]
    fn dedup_keeps_one_copy_of_each_address_in_first_seen_order() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let c = Pubkey::new_unique();
        let raw: Vec<String> =
            [a, b, a, c, b, a].iter().map(Pubkey::to_string).collect();

        let unique = dedup_addresses(&raw).unwrap();
        assert_eq!(unique, vec![a, b, c]);
    }

    #[test]
    fn dedup_of_a_list_seen_twice_halves_it() {
        let mut raw = unique_addresses(10);
        raw.extend(raw.clone());
        assert_eq!(raw.len(), 20);

        let unique = dedup_addresses(&raw).unwrap();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn dedup_rejects_garbage() {
        let raw = vec!["not-a-pubkey".to_string()];
        assert!(matches!(
            dedup_addresses(&raw),
            Err(BatchError::InvalidAddress(_))
        ));
    }

    #[test]
    fn thirty_addresses_with_cap_25_split_25_and_5() {
        let raw = unique_addresses(30);
        let unique = dedup_addresses(&raw).unwrap();
        assert_eq!(unique.len(), 30);

        let batches = chunk_addresses(&unique, 25).unwrap();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![25, 5]);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let unique = dedup_addresses(&unique_addresses(3)).unwrap();
        assert!(matches!(
            chunk_addresses(&unique, 0),
            Err(BatchError::ZeroBatchSize)
        ));
    }

    #[test]
    fn batches_are_disjoint_exhaustive_and_ordered() {
        let unique = dedup_addresses(&unique_addresses(83)).unwrap();
        let batches = chunk_addresses(&unique, 25).unwrap();

        // Only the final batch may be short
        for batch in &batches[..batches.len() - 1] {
            assert_eq!(batch.len(), 25);
        }
        assert!(batches.last().unwrap().len() <= 25);

        // Concatenation reproduces the deduplicated order exactly once
        let rejoined: Vec<Pubkey> = batches.into_iter().flatten().collect();
        assert_eq!(rejoined, unique);
    }

    #[test]
    fn empty_input_yields_no_batches() {
        let unique = dedup_addresses(&[]).unwrap();
        assert!(unique.is_empty());
        assert!(chunk_addresses(&unique, 25).unwrap().is_empty());
    }
}
