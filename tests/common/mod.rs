//! Shared fixtures: keys, transfers and a toy miner
//!
//! Blocks are mined for real against the permissive compact target, so the
//! nonce search terminates after a handful of attempts.
#![allow(dead_code)]

use ed25519_dalek::Keypair;

use vulkan_core::address::Address;
use vulkan_core::block::compute_block_hash;
use vulkan_core::constants::{BLOCK_VERSION, TARGET_BLOCK_TIME};
use vulkan_core::crypto::generate_keypair;
use vulkan_core::emission::block_reward;
use vulkan_core::merkle::merkle_root;
use vulkan_core::pow::check_proof_of_work;
use vulkan_core::transaction::{finalize_tx_id, sign_input};
use vulkan_core::types::{Block, Hash, OutPoint, Transaction, TxIn, TxOut, ZERO_HASH};

pub fn wallet() -> (Keypair, Address) {
    let keypair = generate_keypair();
    let address = Address::from_public_key(&keypair.public.to_bytes());
    (keypair, address)
}

/// Coinbase paying the block reward plus `fees` to `address`. The height
/// rides in the synthetic input's index so coinbase ids differ per height.
pub fn coinbase(address: Address, height: u32, fees: u64) -> Transaction {
    let mut tx = Transaction {
        id: ZERO_HASH,
        inputs: vec![TxIn {
            prev_out: OutPoint::new(ZERO_HASH, height),
            signature: [0u8; 64],
            public_key: [0u8; 32],
        }],
        outputs: vec![TxOut {
            amount: block_reward(height) + fees,
            address,
        }],
    };
    finalize_tx_id(&mut tx);
    tx
}

/// A signed single-input transfer from `keypair`'s output at `prev`.
pub fn transfer(keypair: &Keypair, prev: OutPoint, outputs: &[(Address, u64)]) -> Transaction {
    let mut tx = Transaction {
        id: ZERO_HASH,
        inputs: vec![TxIn {
            prev_out: prev,
            signature: [0u8; 64],
            public_key: [0u8; 32],
        }],
        outputs: outputs
            .iter()
            .map(|&(address, amount)| TxOut { amount, address })
            .collect(),
    };
    finalize_tx_id(&mut tx);
    sign_input(&mut tx, 0, keypair).unwrap();
    tx
}

/// Mine a block of `extra` transactions on `parent`, paying the miner the
/// reward plus `fees`.
pub fn mine_block(
    parent: &Block,
    height: u32,
    miner: Address,
    extra: Vec<Transaction>,
    fees: u64,
) -> Block {
    let mut transactions = vec![coinbase(miner, height, fees)];
    transactions.extend(extra);
    let ids: Vec<Hash> = transactions.iter().map(|tx| tx.id).collect();

    let mut block = Block {
        version: BLOCK_VERSION,
        previous_hash: parent.hash,
        hash: ZERO_HASH,
        timestamp: parent.timestamp + TARGET_BLOCK_TIME,
        nonce: 0,
        bits: parent.bits,
        cumulative_emission: parent.cumulative_emission + block_reward(height),
        merkle_root: merkle_root(&ids).unwrap(),
        transactions,
    };
    seal(&mut block);
    block
}

/// Grind the nonce until the header hash meets its target.
pub fn seal(block: &mut Block) {
    loop {
        block.hash = compute_block_hash(block);
        if check_proof_of_work(&block.hash, block.bits).unwrap() {
            return;
        }
        block.nonce += 1;
    }
}
