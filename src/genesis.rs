//! The compiled-in genesis block
//!
//! The chain cannot start without it. It is trusted as a constant, written
//! verbatim at first start, and never re-validated against the consensus
//! pipeline.

use crate::address::Address;
use crate::block::compute_block_hash;
use crate::constants::{BLOCK_VERSION, MAX_TARGET_BITS};
use crate::emission;
use crate::transaction::finalize_tx_id;
use crate::types::{Block, OutPoint, Transaction, TxIn, TxOut, ZERO_HASH};

pub const GENESIS_TIMESTAMP: u32 = 1_640_995_200;

/// Build the genesis block. Deterministic, so every node agrees on its
/// hash without shipping raw bytes.
pub fn genesis_block() -> Block {
    let reward = emission::block_reward(0);
    let mut coinbase = Transaction {
        id: ZERO_HASH,
        inputs: vec![TxIn {
            prev_out: OutPoint::new(ZERO_HASH, 0),
            signature: [0u8; 64],
            public_key: [0u8; 32],
        }],
        outputs: vec![TxOut {
            amount: reward,
            address: genesis_address(),
        }],
    };
    finalize_tx_id(&mut coinbase);

    let mut block = Block {
        version: BLOCK_VERSION,
        previous_hash: ZERO_HASH,
        hash: ZERO_HASH,
        timestamp: GENESIS_TIMESTAMP,
        nonce: 0,
        bits: MAX_TARGET_BITS,
        cumulative_emission: reward,
        merkle_root: coinbase.id,
        transactions: vec![coinbase],
    };
    block.hash = compute_block_hash(&block);
    block
}

/// Address of the genesis payout. Derived from the all-zero public key, so
/// the output is provably unspendable.
pub fn genesis_address() -> Address {
    Address::from_public_key(&[0u8; 32])
}
