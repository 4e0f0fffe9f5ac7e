//! Transaction pool
//!
//! Gates what miners may pull into a block template. Admission runs the
//! context-free validation first, then collision and spendability checks
//! against the live UTXO view, then the byte budget. A claimed-outpoint
//! index guarantees no two pooled transactions ever contend for an output.

use std::collections::HashMap;

use crate::codec;
use crate::constants::MEMPOOL_MAX_BYTES;
use crate::error::{ChainError, Result};
use crate::transaction::{check_tx_inputs, valid_transaction, UtxoView};
use crate::types::{Block, Hash, OutPoint, Transaction};

/// A pooled transaction with the figures admission computed for it.
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub transaction: Transaction,
    pub fee: u64,
    pub size: usize,
}

impl PoolEntry {
    /// Cross-multiplied fee-rate comparison, no floating point.
    fn pays_less_than(&self, other: &PoolEntry) -> bool {
        (self.fee as u128) * (other.size as u128) < (other.fee as u128) * (self.size as u128)
    }
}

pub struct Mempool {
    entries: HashMap<Hash, PoolEntry>,
    claimed: HashMap<OutPoint, Hash>,
    bytes: usize,
    max_bytes: usize,
}

impl Mempool {
    pub fn new() -> Self {
        Self::with_capacity(MEMPOOL_MAX_BYTES)
    }

    pub fn with_capacity(max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            claimed: HashMap::new(),
            bytes: 0,
            max_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &Hash) -> Option<&Transaction> {
        self.entries.get(id).map(|entry| &entry.transaction)
    }

    /// Pooled transactions in descending fee-rate order, the order a miner
    /// would drain them.
    pub fn by_fee_rate(&self) -> Vec<&Transaction> {
        let mut entries: Vec<&PoolEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            ((b.fee as u128) * (a.size as u128)).cmp(&((a.fee as u128) * (b.size as u128)))
        });
        entries.into_iter().map(|entry| &entry.transaction).collect()
    }

    /// Admit a transaction to the pool.
    ///
    /// Rejections: already pooled (`DuplicateTransaction`), structurally
    /// invalid, coinbase, an input already claimed by a pooled transaction,
    /// an input not unspent in `view`, or a fee rate too low to displace
    /// enough of the pool to fit the byte budget.
    pub fn admit(&mut self, transaction: Transaction, view: &dyn UtxoView) -> Result<()> {
        if self.entries.contains_key(&transaction.id) {
            return Err(ChainError::DuplicateTransaction);
        }

        valid_transaction(&transaction)?;
        if transaction.is_coinbase() {
            return Err(ChainError::InvalidTransaction(
                "coinbase transactions are never pooled".to_string(),
            ));
        }

        for input in &transaction.inputs {
            if let Some(holder) = self.claimed.get(&input.prev_out) {
                return Err(ChainError::Context(format!(
                    "output {}:{} already claimed by pooled transaction {}",
                    hex::encode(input.prev_out.tx_hash),
                    input.prev_out.index,
                    hex::encode(holder)
                )));
            }
        }

        let fee = check_tx_inputs(&transaction, view)?;
        let size = codec::transaction_wire_size(&transaction);
        let entry = PoolEntry {
            transaction,
            fee,
            size,
        };

        if entry.size > self.max_bytes {
            return Err(ChainError::InvalidTransaction(format!(
                "transaction of {} bytes exceeds the pool budget",
                entry.size
            )));
        }

        // make room by evicting the cheapest entries, but never evict
        // anything paying at least the incoming rate
        while self.bytes + entry.size > self.max_bytes {
            let cheapest = match self.cheapest_entry() {
                Some(id) => id,
                None => break,
            };
            let incoming_pays_more = self
                .entries
                .get(&cheapest)
                .map(|current| current.pays_less_than(&entry))
                .unwrap_or(false);
            if !incoming_pays_more {
                return Err(ChainError::Context(
                    "pool is full and the fee rate does not displace anything".to_string(),
                ));
            }
            let evicted = self.take(&cheapest);
            if let Some(evicted) = evicted {
                log::debug!(
                    "evicting {} ({} bytes, fee {}) for a better paying transaction",
                    hex::encode(evicted.transaction.id),
                    evicted.size,
                    evicted.fee
                );
            }
        }

        self.insert(entry);
        Ok(())
    }

    /// Drop every pooled transaction the connected block made stale: the
    /// ones it included and the ones now conflicting with a spent output.
    /// Returns the removed ids.
    pub fn sweep_connected(&mut self, block: &Block) -> Vec<Hash> {
        let mut removed = Vec::new();
        for tx in &block.transactions {
            if self.take(&tx.id).is_some() {
                removed.push(tx.id);
            }
            if tx.is_coinbase() {
                continue;
            }
            for input in &tx.inputs {
                if let Some(conflict) = self.claimed.get(&input.prev_out).copied() {
                    if self.take(&conflict).is_some() {
                        log::debug!(
                            "dropping {} conflicting with connected block",
                            hex::encode(conflict)
                        );
                        removed.push(conflict);
                    }
                }
            }
        }
        removed
    }

    /// Offer a disconnected block's transactions back to the pool,
    /// ignoring individual failures. Returns the re-admitted ids.
    pub fn readmit_disconnected(&mut self, block: &Block, view: &dyn UtxoView) -> Vec<Hash> {
        let mut readmitted = Vec::new();
        for tx in &block.transactions {
            if tx.is_coinbase() {
                continue;
            }
            match self.admit(tx.clone(), view) {
                Ok(()) => readmitted.push(tx.id),
                Err(err) => {
                    log::debug!(
                        "not re-admitting {} after disconnect: {}",
                        hex::encode(tx.id),
                        err
                    );
                }
            }
        }
        readmitted
    }

    fn insert(&mut self, entry: PoolEntry) {
        for input in &entry.transaction.inputs {
            self.claimed.insert(input.prev_out, entry.transaction.id);
        }
        self.bytes += entry.size;
        self.entries.insert(entry.transaction.id, entry);
    }

    fn take(&mut self, id: &Hash) -> Option<PoolEntry> {
        let entry = self.entries.remove(id)?;
        for input in &entry.transaction.inputs {
            self.claimed.remove(&input.prev_out);
        }
        self.bytes -= entry.size;
        Some(entry)
    }

    fn cheapest_entry(&self) -> Option<Hash> {
        self.entries
            .values()
            .min_by(|a, b| {
                ((a.fee as u128) * (b.size as u128)).cmp(&((b.fee as u128) * (a.size as u128)))
            })
            .map(|entry| entry.transaction.id)
    }
}
