//! Persisted unspent-output index
//!
//! `apply_ops` stages every mutation a block causes as one write batch:
//! spent outputs leave, created outputs enter, and an undo record keyed by
//! the block hash captures what left so `undo_ops` can reverse the block
//! exactly. Outputs both created and consumed inside the same block never
//! touch the store.

use std::collections::BTreeMap;

use crate::codec::{self, Reader, Writer};
use crate::error::{ChainError, CodecError, Result};
use crate::store::{undo_key, utxo_key, KvStore, WriteOp};
use crate::types::{Block, OutPoint, TxOut};

/// The outputs a block removed from the store, in removal order. Everything
/// needed to reverse the block; created outputs are recomputed from the
/// block itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UndoRecord {
    pub spent: Vec<(OutPoint, TxOut)>,
}

pub fn encode_undo_record(record: &UndoRecord) -> Vec<u8> {
    let mut w = Writer::new();
    w.put_u32(record.spent.len() as u32);
    for (out, txout) in &record.spent {
        w.put_bytes(&out.tx_hash);
        w.put_u32(out.index);
        codec::write_txout(&mut w, txout);
    }
    w.into_bytes()
}

pub fn decode_undo_record(bytes: &[u8]) -> std::result::Result<UndoRecord, CodecError> {
    let mut r = Reader::new(bytes);
    let count = r.count(36 + 33)?;
    let mut spent = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let tx_hash = r.array::<32>()?;
        let index = r.u32()?;
        let txout = codec::read_txout(&mut r)?;
        spent.push((OutPoint::new(tx_hash, index), txout));
    }
    r.finish()?;
    Ok(UndoRecord { spent })
}

/// Read one unspent output.
pub fn utxo_get<S: KvStore>(store: &S, out: &OutPoint) -> Result<Option<TxOut>> {
    match store.get(&utxo_key(out))? {
        Some(bytes) => Ok(Some(codec::txout_from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

/// Net output set a block adds to the store: everything it creates minus
/// what it consumes itself, keyed deterministically.
fn net_created(block: &Block) -> BTreeMap<OutPoint, TxOut> {
    let mut created = BTreeMap::new();
    for tx in &block.transactions {
        if !tx.is_coinbase() {
            for input in &tx.inputs {
                created.remove(&input.prev_out);
            }
        }
        for (i, output) in tx.outputs.iter().enumerate() {
            created.insert(OutPoint::new(tx.id, i as u32), output.clone());
        }
    }
    created
}

/// Stage the UTXO mutations and undo record for connecting `block`.
///
/// Fails with a context error if any input is not unspent in the store,
/// leaving nothing written.
pub fn apply_ops<S: KvStore>(store: &S, block: &Block) -> Result<(Vec<WriteOp>, UndoRecord)> {
    let mut spent: Vec<(OutPoint, TxOut)> = Vec::new();
    let mut in_block: BTreeMap<OutPoint, TxOut> = BTreeMap::new();

    for tx in &block.transactions {
        if !tx.is_coinbase() {
            for input in &tx.inputs {
                if in_block.remove(&input.prev_out).is_some() {
                    // created earlier in this very block, never persisted
                    continue;
                }
                let txout = utxo_get(store, &input.prev_out)?.ok_or_else(|| {
                    ChainError::Context(format!(
                        "block consumes unknown output {}:{}",
                        hex::encode(input.prev_out.tx_hash),
                        input.prev_out.index
                    ))
                })?;
                spent.push((input.prev_out, txout));
            }
        }
        for (i, output) in tx.outputs.iter().enumerate() {
            in_block.insert(OutPoint::new(tx.id, i as u32), output.clone());
        }
    }

    let record = UndoRecord { spent };
    let mut ops = Vec::with_capacity(record.spent.len() + in_block.len() + 1);
    for (out, _) in &record.spent {
        ops.push(WriteOp::Delete(utxo_key(out)));
    }
    for (out, txout) in &in_block {
        ops.push(WriteOp::Put(utxo_key(out), codec::txout_to_bytes(txout)));
    }
    ops.push(WriteOp::Put(
        undo_key(&block.hash),
        encode_undo_record(&record),
    ));

    Ok((ops, record))
}

/// Stage the inverse of `apply_ops` for disconnecting `block`, using its
/// persisted undo record.
pub fn undo_ops<S: KvStore>(store: &S, block: &Block) -> Result<Vec<WriteOp>> {
    let bytes = store.get(&undo_key(&block.hash))?.ok_or_else(|| {
        ChainError::Context(format!(
            "no undo record for block {}",
            hex::encode(block.hash)
        ))
    })?;
    let record = decode_undo_record(&bytes)?;

    let created = net_created(block);
    let mut ops = Vec::with_capacity(created.len() + record.spent.len() + 1);
    for out in created.keys() {
        ops.push(WriteOp::Delete(utxo_key(out)));
    }
    for (out, txout) in &record.spent {
        ops.push(WriteOp::Put(utxo_key(out), codec::txout_to_bytes(txout)));
    }
    ops.push(WriteOp::Delete(undo_key(&block.hash)));

    Ok(ops)
}
