//! Transaction construction and validation
//!
//! Inputs pool value from earlier outputs and unlock it by signing the
//! transaction's signing header with the key whose address the referenced
//! output pays. The signing header deliberately excludes every signature
//! and public key, so it can be signed input by input.

use std::collections::HashSet;

use ed25519_dalek::Keypair;

use crate::address::Address;
use crate::codec::Writer;
use crate::constants::{TXIN_HEADER_SIZE, TXOUT_HEADER_SIZE};
use crate::crypto::{self, sha256d};
use crate::error::{ChainError, Result};
use crate::types::{Hash, OutPoint, Transaction, TxOut};

/// A read view of the unspent-output set. The chain manager provides live
/// and overlay implementations; tests inject maps.
pub trait UtxoView {
    fn utxo(&self, out: &OutPoint) -> Result<Option<TxOut>>;
}

/// The bytes every input's signature covers: all input references followed
/// by all outputs, without signatures or public keys.
pub fn signing_header(tx: &Transaction) -> Vec<u8> {
    let mut w = Writer::with_capacity(signing_header_size(tx));
    for input in &tx.inputs {
        w.put_bytes(&input.prev_out.tx_hash);
        w.put_u32(input.prev_out.index);
    }
    for output in &tx.outputs {
        w.put_u64(output.amount);
        w.put_bytes(output.address.as_bytes());
    }
    w.into_bytes()
}

pub fn signing_header_size(tx: &Transaction) -> usize {
    tx.inputs.len() * TXIN_HEADER_SIZE + tx.outputs.len() * TXOUT_HEADER_SIZE
}

/// Transaction id: SHA256d of the signing header.
pub fn compute_tx_id(tx: &Transaction) -> Hash {
    sha256d(&signing_header(tx))
}

/// Recompute and store the id after the inputs and outputs are final.
pub fn finalize_tx_id(tx: &mut Transaction) {
    tx.id = compute_tx_id(tx);
}

/// Sign one input with the given keypair, filling in its signature and
/// public key. The signing header must already be final.
pub fn sign_input(tx: &mut Transaction, index: usize, keypair: &Keypair) -> Result<()> {
    let header = signing_header(tx);
    let signature = crypto::sign(keypair, &header);
    let input = tx
        .inputs
        .get_mut(index)
        .ok_or_else(|| ChainError::InvalidTransaction(format!("no input at index {}", index)))?;
    input.signature = signature;
    input.public_key = keypair.public.to_bytes();
    Ok(())
}

/// Context-free transaction validation: shape, self-consistency and
/// signatures. Checks that need the unspent-output set live in
/// `check_tx_inputs`.
pub fn valid_transaction(tx: &Transaction) -> Result<()> {
    if tx.inputs.is_empty() {
        return Err(ChainError::InvalidTransaction("no inputs".to_string()));
    }

    if tx.outputs.is_empty() {
        return Err(ChainError::InvalidTransaction("no outputs".to_string()));
    }

    let coinbase = tx.is_coinbase();

    // coinbase payouts are pinned to the emission schedule contextually,
    // everything else must move a positive amount
    if !coinbase {
        for (i, output) in tx.outputs.iter().enumerate() {
            if output.amount == 0 {
                return Err(ChainError::InvalidTransaction(format!(
                    "zero amount at output {}",
                    i
                )));
            }
        }
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.prev_out) {
            return Err(ChainError::InvalidTransaction(format!(
                "input {}:{} referenced twice",
                hex::encode(input.prev_out.tx_hash),
                input.prev_out.index
            )));
        }
    }

    let header = signing_header(tx);
    if tx.id != sha256d(&header) {
        return Err(ChainError::InvalidTransaction(
            "stored id disagrees with signing header".to_string(),
        ));
    }

    if !coinbase {
        for (i, input) in tx.inputs.iter().enumerate() {
            if !crypto::verify(&input.public_key, &header, &input.signature) {
                return Err(ChainError::InvalidTransaction(format!(
                    "signature verification failed at input {}",
                    i
                )));
            }
        }
    }

    Ok(())
}

/// Context-sensitive checks against an unspent-output view. Every input
/// must reference a live output owned by its public key, and outputs may
/// not exceed inputs. Returns the fee. Coinbase transactions are exempt and
/// carry no fee.
pub fn check_tx_inputs(tx: &Transaction, view: &dyn UtxoView) -> Result<u64> {
    if tx.is_coinbase() {
        return Ok(0);
    }

    let mut total_in: u64 = 0;
    for (i, input) in tx.inputs.iter().enumerate() {
        let prev_out = view.utxo(&input.prev_out)?.ok_or_else(|| {
            ChainError::Context(format!(
                "input {} does not reference an unspent output",
                i
            ))
        })?;

        if Address::from_public_key(&input.public_key) != prev_out.address {
            return Err(ChainError::Context(format!(
                "input {} public key does not own the referenced output",
                i
            )));
        }

        total_in = total_in
            .checked_add(prev_out.amount)
            .ok_or_else(|| ChainError::Context("input value overflow".to_string()))?;
    }

    let mut total_out: u64 = 0;
    for output in &tx.outputs {
        total_out = total_out
            .checked_add(output.amount)
            .ok_or_else(|| ChainError::Context("output value overflow".to_string()))?;
    }

    if total_out > total_in {
        return Err(ChainError::Context(format!(
            "outputs {} exceed inputs {}",
            total_out, total_in
        )));
    }

    Ok(total_in - total_out)
}
