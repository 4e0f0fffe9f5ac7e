//! Block validation
//!
//! `valid_block` runs every check that needs no chain context, cheapest
//! first. Parent linkage, difficulty schedule, coinbase payout and spend
//! availability are the chain manager's job at attach time.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec;
use crate::constants::{BLOCK_HEADER_SIZE, MAX_BLOCK_SIZE, MAX_FUTURE_BLOCK_TIME};
use crate::crypto::sha256d;
use crate::error::{ChainError, Result};
use crate::merkle;
use crate::transaction::{self, valid_transaction};
use crate::types::{Block, Hash};

/// Seconds since the Unix epoch, saturating at zero on a clock before it.
pub fn current_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// SHA256d over the serialized header.
pub fn compute_block_hash(block: &Block) -> Hash {
    sha256d(&codec::block_header_bytes(block))
}

/// Header size plus the signed header size of every transaction. This is
/// the figure the block-size cap applies to.
pub fn block_header_size(block: &Block) -> usize {
    BLOCK_HEADER_SIZE
        + block
            .transactions
            .iter()
            .map(transaction::signing_header_size)
            .sum::<usize>()
}

pub fn valid_block_timestamp(block: &Block, now: u32) -> bool {
    block.timestamp <= now.saturating_add(MAX_FUTURE_BLOCK_TIME)
}

/// Context-free block validation.
///
/// Check order: timestamp drift, transaction count, coinbase placement,
/// pairwise id and input distinctness, per-transaction validity, size cap,
/// hash and proof-of-work, merkle root. Any failure rejects the block.
pub fn valid_block(block: &Block, now: u32) -> Result<()> {
    if !valid_block_timestamp(block, now) {
        return Err(ChainError::InvalidBlock(format!(
            "timestamp {} too far in the future",
            block.timestamp
        )));
    }

    if block.transactions.is_empty() {
        return Err(ChainError::InvalidBlock("no transactions".to_string()));
    }

    for (i, tx) in block.transactions.iter().enumerate() {
        let is_coinbase = tx.is_coinbase();
        if i == 0 && !is_coinbase {
            return Err(ChainError::InvalidBlock(
                "first transaction is not a coinbase".to_string(),
            ));
        }
        if i != 0 && is_coinbase {
            return Err(ChainError::InvalidBlock(format!(
                "extra coinbase at index {}",
                i
            )));
        }
    }

    // no two transactions may share an id, and no two inputs anywhere in
    // the block may consume the same output
    let mut ids = HashSet::with_capacity(block.transactions.len());
    let mut spent = HashSet::new();
    for tx in &block.transactions {
        if !ids.insert(tx.id) {
            return Err(ChainError::InvalidBlock(format!(
                "duplicate transaction id {}",
                hex::encode(tx.id)
            )));
        }
        for input in &tx.inputs {
            if !spent.insert(input.prev_out) {
                return Err(ChainError::InvalidBlock(format!(
                    "output {}:{} spent twice",
                    hex::encode(input.prev_out.tx_hash),
                    input.prev_out.index
                )));
            }
        }
    }

    for (i, tx) in block.transactions.iter().enumerate() {
        valid_transaction(tx).map_err(|e| {
            ChainError::InvalidBlock(format!("transaction {}: {}", i, e))
        })?;
    }

    let header_size = block_header_size(block);
    if header_size > MAX_BLOCK_SIZE {
        return Err(ChainError::InvalidBlock(format!(
            "header blob of {} bytes exceeds cap",
            header_size
        )));
    }

    if compute_block_hash(block) != block.hash {
        return Err(ChainError::InvalidBlock(
            "stored hash disagrees with header".to_string(),
        ));
    }

    if !crate::pow::check_proof_of_work(&block.hash, block.bits)? {
        return Err(ChainError::InvalidBlock(
            "hash does not meet the difficulty target".to_string(),
        ));
    }

    let ids: Vec<Hash> = block.transactions.iter().map(|tx| tx.id).collect();
    let root = merkle::merkle_root(&ids)
        .ok_or_else(|| ChainError::InvalidBlock("no transactions".to_string()))?;
    if root != block.merkle_root {
        return Err(ChainError::InvalidBlock("merkle root mismatch".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::constants::{BLOCK_VERSION, MAX_TARGET_BITS};
    use crate::crypto::generate_keypair;
    use crate::transaction::finalize_tx_id;
    use crate::types::{OutPoint, Transaction, TxIn, TxOut, ZERO_HASH};

    fn coinbase(amount: u64) -> Transaction {
        let address = Address::from_public_key(&generate_keypair().public.to_bytes());
        let mut tx = Transaction {
            id: ZERO_HASH,
            inputs: vec![TxIn {
                prev_out: OutPoint::new(ZERO_HASH, 0),
                signature: [0u8; 64],
                public_key: [0u8; 32],
            }],
            outputs: vec![TxOut { amount, address }],
        };
        finalize_tx_id(&mut tx);
        tx
    }

    fn sealed_block(transactions: Vec<Transaction>) -> Block {
        let ids: Vec<Hash> = transactions.iter().map(|tx| tx.id).collect();
        let mut block = Block {
            version: BLOCK_VERSION,
            previous_hash: [1u8; 32],
            hash: ZERO_HASH,
            timestamp: 1_650_000_000,
            nonce: 0,
            bits: MAX_TARGET_BITS,
            cumulative_emission: 100,
            merkle_root: merkle::merkle_root(&ids).unwrap(),
            transactions,
        };
        loop {
            block.hash = compute_block_hash(&block);
            if crate::pow::check_proof_of_work(&block.hash, block.bits).unwrap() {
                break;
            }
            block.nonce += 1;
        }
        block
    }

    fn now() -> u32 {
        1_650_000_000 + 60
    }

    #[test]
    fn test_valid_block_passes() {
        let block = sealed_block(vec![coinbase(50)]);
        assert!(valid_block(&block, now()).is_ok());
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let mut block = sealed_block(vec![coinbase(50)]);
        block.timestamp = now() + MAX_FUTURE_BLOCK_TIME + 1;
        assert!(matches!(
            valid_block(&block, now()),
            Err(ChainError::InvalidBlock(_))
        ));
    }

    #[test]
    fn test_empty_block_rejected() {
        let mut block = sealed_block(vec![coinbase(50)]);
        block.transactions.clear();
        assert!(valid_block(&block, now()).is_err());
    }

    #[test]
    fn test_missing_coinbase_rejected() {
        let keypair = generate_keypair();
        let address = Address::from_public_key(&keypair.public.to_bytes());
        let mut spend = Transaction {
            id: ZERO_HASH,
            inputs: vec![TxIn {
                prev_out: OutPoint::new([2u8; 32], 0),
                signature: [0u8; 64],
                public_key: [0u8; 32],
            }],
            outputs: vec![TxOut { amount: 10, address }],
        };
        finalize_tx_id(&mut spend);
        crate::transaction::sign_input(&mut spend, 0, &keypair).unwrap();
        let block = sealed_block(vec![spend]);
        assert!(matches!(
            valid_block(&block, now()),
            Err(ChainError::InvalidBlock(_))
        ));
    }

    #[test]
    fn test_second_coinbase_rejected() {
        let block = sealed_block(vec![coinbase(50), coinbase(25)]);
        assert!(matches!(
            valid_block(&block, now()),
            Err(ChainError::InvalidBlock(_))
        ));
    }

    #[test]
    fn test_duplicate_tx_id_rejected() {
        let tx = coinbase(50);
        let block = sealed_block(vec![tx.clone(), tx]);
        assert!(valid_block(&block, now()).is_err());
    }

    #[test]
    fn test_tampered_merkle_root_rejected() {
        let mut block = sealed_block(vec![coinbase(50)]);
        block.merkle_root[0] ^= 0x01;
        // reseal the hash so the merkle check is the one that fires
        loop {
            block.hash = compute_block_hash(&block);
            if crate::pow::check_proof_of_work(&block.hash, block.bits).unwrap() {
                break;
            }
            block.nonce += 1;
        }
        let err = valid_block(&block, now()).unwrap_err();
        assert!(err.to_string().contains("merkle"));
    }

    #[test]
    fn test_tampered_hash_rejected() {
        let mut block = sealed_block(vec![coinbase(50)]);
        block.hash[0] ^= 0x01;
        assert!(valid_block(&block, now()).is_err());
    }

    #[test]
    fn test_single_tx_merkle_root_is_tx_id() {
        let block = sealed_block(vec![coinbase(50)]);
        assert_eq!(block.merkle_root, block.transactions[0].id);
    }

    #[test]
    fn test_header_size_counts_transactions() {
        let block = sealed_block(vec![coinbase(50)]);
        assert_eq!(
            block_header_size(&block),
            BLOCK_HEADER_SIZE + crate::constants::TXIN_HEADER_SIZE + crate::constants::TXOUT_HEADER_SIZE
        );
    }
}
