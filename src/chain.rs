//! Chain manager
//!
//! Owns the persistent state and decides, for every submitted block,
//! whether to extend the active chain, store it on a side branch,
//! reorganize onto a heavier branch, buffer it as an orphan, or reject it.
//! Branch weight is cumulative proof-of-work, never block count; equal
//! weight keeps the incumbent chain.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::block::{current_timestamp, valid_block};
use crate::codec;
use crate::constants::{DIFFICULTY_PERIOD, MAX_ORPHANS};
use crate::emission;
use crate::error::{ChainError, Result, StoreError};
use crate::genesis::genesis_block;
use crate::mempool::Mempool;
use crate::pow::{self, U256};
use crate::store::{
    block_key, height_key, invalid_key, mempool_key, KvStore, WriteOp, TIP_KEY,
};
use crate::transaction::{check_tx_inputs, UtxoView};
use crate::types::{Block, Hash, OutPoint, Transaction, TxOut};
use crate::utxo;

/// Outcome of a block submission that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Extended the active chain.
    Connected,
    /// Stored on a side branch that is not (yet) heavier.
    SideChain,
    /// Triggered a switch to a heavier branch.
    Reorganized { disconnected: usize, connected: usize },
    /// Parent unknown; buffered until the ancestry arrives.
    Orphaned,
}

/// Live unspent-output view over the store.
struct StoreView<'a, S: KvStore>(&'a S);

impl<S: KvStore> UtxoView for StoreView<'_, S> {
    fn utxo(&self, out: &OutPoint) -> Result<Option<TxOut>> {
        utxo::utxo_get(self.0, out)
    }
}

/// View that replays a block's transactions in order on top of the store,
/// so a transaction may spend an output created earlier in the same block.
struct OverlayView<'a, S: KvStore> {
    store: &'a S,
    created: HashMap<OutPoint, TxOut>,
    spent: HashSet<OutPoint>,
}

impl<'a, S: KvStore> OverlayView<'a, S> {
    fn new(store: &'a S) -> Self {
        Self {
            store,
            created: HashMap::new(),
            spent: HashSet::new(),
        }
    }

    fn apply_tx(&mut self, tx: &Transaction) {
        if !tx.is_coinbase() {
            for input in &tx.inputs {
                self.created.remove(&input.prev_out);
                self.spent.insert(input.prev_out);
            }
        }
        for (i, output) in tx.outputs.iter().enumerate() {
            self.created
                .insert(OutPoint::new(tx.id, i as u32), output.clone());
        }
    }
}

impl<S: KvStore> UtxoView for OverlayView<'_, S> {
    fn utxo(&self, out: &OutPoint) -> Result<Option<TxOut>> {
        if self.spent.contains(out) {
            return Ok(None);
        }
        if let Some(txout) = self.created.get(out) {
            return Ok(Some(txout.clone()));
        }
        utxo::utxo_get(self.store, out)
    }
}

pub struct ChainManager<S: KvStore> {
    store: S,
    mempool: Mempool,
    orphans: VecDeque<Block>,
    tip_hash: Hash,
    tip_height: u32,
}

impl<S: KvStore> ChainManager<S> {
    /// Open the chain over a store, writing the genesis block on first
    /// start and reloading the persisted mempool.
    pub fn new(mut store: S) -> Result<Self> {
        let (tip_hash, tip_height) = match store.get(TIP_KEY)? {
            Some(bytes) => {
                let hash = hash_from_slice(&bytes)?;
                let (height, _) = read_block_record(&store, &hash)?.ok_or_else(|| {
                    ChainError::Storage(StoreError::Corrupt(
                        "tip points at a missing block".to_string(),
                    ))
                })?;
                (hash, height)
            }
            None => {
                let genesis = genesis_block();
                let (mut ops, _) = utxo::apply_ops(&store, &genesis)?;
                ops.push(WriteOp::Put(
                    block_key(&genesis.hash),
                    encode_block_record(0, &genesis),
                ));
                ops.push(WriteOp::Put(height_key(0), genesis.hash.to_vec()));
                ops.push(WriteOp::Put(TIP_KEY.to_vec(), genesis.hash.to_vec()));
                store.write_batch(ops, true)?;
                log::debug!("wrote genesis block {}", hex::encode(genesis.hash));
                (genesis.hash, 0)
            }
        };

        let mut manager = Self {
            store,
            mempool: Mempool::new(),
            orphans: VecDeque::new(),
            tip_hash,
            tip_height,
        };
        manager.reload_mempool()?;
        Ok(manager)
    }

    pub fn tip(&self) -> Hash {
        self.tip_hash
    }

    pub fn height(&self) -> u32 {
        self.tip_height
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// Give the store back, e.g. to reopen the chain over it.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Look up a stored block and the height it was stored at.
    pub fn block(&self, hash: &Hash) -> Result<Option<(u32, Block)>> {
        read_block_record(&self.store, hash)
    }

    /// Block hash on the active chain at `height`.
    pub fn block_hash_at(&self, height: u32) -> Result<Option<Hash>> {
        match self.store.get(&height_key(height))? {
            Some(bytes) => Ok(Some(hash_from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn block_at_height(&self, height: u32) -> Result<Option<Block>> {
        match self.block_hash_at(height)? {
            Some(hash) => Ok(self.block(&hash)?.map(|(_, block)| block)),
            None => Ok(None),
        }
    }

    /// Unspent output on the active chain, if any.
    pub fn utxo(&self, out: &OutPoint) -> Result<Option<TxOut>> {
        utxo::utxo_get(&self.store, out)
    }

    /// Every unspent output, in key order. Full scans back balance queries
    /// and state comparisons in tests.
    pub fn utxo_entries(&self) -> Result<Vec<(OutPoint, TxOut)>> {
        let mut entries = Vec::new();
        for (key, value) in self.store.iter_prefix(&crate::store::utxo_prefix())? {
            if key.len() != 37 {
                return Err(ChainError::Storage(StoreError::Corrupt(
                    "malformed unspent-output key".to_string(),
                )));
            }
            let mut tx_hash = [0u8; 32];
            tx_hash.copy_from_slice(&key[1..33]);
            let index = u32::from_le_bytes([key[33], key[34], key[35], key[36]]);
            entries.push((
                OutPoint::new(tx_hash, index),
                codec::txout_from_bytes(&value)?,
            ));
        }
        Ok(entries)
    }

    /// Admit a transaction to the pool and persist it.
    pub fn submit_transaction(&mut self, transaction: Transaction) -> Result<()> {
        let id = transaction.id;
        let bytes = codec::transaction_to_bytes(&transaction);
        {
            let (store, mempool) = (&self.store, &mut self.mempool);
            mempool.admit(transaction, &StoreView(store))?;
        }
        self.store.put(&mempool_key(&id), &bytes)?;
        Ok(())
    }

    /// Feed a candidate block through the decision table.
    pub fn submit_block(&mut self, block: Block) -> Result<BlockStatus> {
        let hash = block.hash;

        if self.is_invalid(&hash)? {
            return Err(ChainError::InvalidBlock(
                "block was rejected before".to_string(),
            ));
        }
        if self.store.get(&block_key(&hash))?.is_some() {
            return Err(ChainError::DuplicateBlock);
        }

        if let Err(err) = valid_block(&block, current_timestamp()) {
            self.mark_invalid(&hash)?;
            log::debug!("rejecting block {}: {}", hex::encode(hash), err);
            return Err(err);
        }

        if self.is_invalid(&block.previous_hash)? {
            self.mark_invalid(&hash)?;
            return Err(ChainError::Context(
                "descends from a rejected block".to_string(),
            ));
        }

        let status = if block.previous_hash == self.tip_hash {
            self.extend_tip(block)?
        } else if self.store.get(&block_key(&block.previous_hash))?.is_some() {
            self.add_side_block(block)?
        } else {
            return Ok(self.buffer_orphan(block));
        };

        self.retry_orphans();
        Ok(status)
    }

    fn extend_tip(&mut self, block: Block) -> Result<BlockStatus> {
        let height = self.tip_height + 1;
        let tip_hash = self.tip_hash;
        let parent = self.require_block(&tip_hash)?;
        if let Err(err) = self.validate_context(&block, height, &parent) {
            self.mark_invalid(&block.hash)?;
            log::debug!("rejecting block {}: {}", hex::encode(block.hash), err);
            return Err(err);
        }
        self.connect(&block, height)?;
        Ok(BlockStatus::Connected)
    }

    fn add_side_block(&mut self, block: Block) -> Result<BlockStatus> {
        let (parent_height, _) = read_block_record(&self.store, &block.previous_hash)?
            .ok_or_else(|| ChainError::Context("side parent disappeared".to_string()))?;
        let height = parent_height + 1;

        self.store.write_batch(
            vec![WriteOp::Put(
                block_key(&block.hash),
                encode_block_record(height, &block),
            )],
            true,
        )?;

        let (fork_height, branch) = self.branch_from(block, height)?;

        let mut branch_work = U256::zero();
        for (_, branch_block) in &branch {
            branch_work = branch_work + pow::block_work(branch_block.bits)?;
        }
        let active_work = self.active_work_above(fork_height)?;

        if branch_work > active_work {
            self.reorganize(fork_height, branch)
        } else {
            log::debug!(
                "stored side-chain block at height {} (branch work {} <= active {})",
                height,
                branch_work,
                active_work
            );
            Ok(BlockStatus::SideChain)
        }
    }

    /// Walk from a side-branch head down to the active chain. Returns the
    /// fork height and the branch blocks above it, ascending.
    fn branch_from(&self, head: Block, head_height: u32) -> Result<(u32, Vec<(u32, Block)>)> {
        let mut branch: Vec<(u32, Block)> = Vec::new();
        let mut current = head;
        let mut height = head_height;

        loop {
            let parent_hash = current.previous_hash;
            let parent_height = height.checked_sub(1).ok_or_else(|| {
                ChainError::Context("side branch reaches below genesis".to_string())
            })?;
            branch.push((height, current));

            if self.block_hash_at(parent_height)? == Some(parent_hash) {
                branch.reverse();
                return Ok((parent_height, branch));
            }

            let (stored_height, parent) =
                read_block_record(&self.store, &parent_hash)?.ok_or_else(|| {
                    ChainError::Context("side branch is detached".to_string())
                })?;
            current = parent;
            height = stored_height;
        }
    }

    /// Cumulative work of the active chain strictly above `fork_height`.
    fn active_work_above(&self, fork_height: u32) -> Result<U256> {
        let mut work = U256::zero();
        for height in (fork_height + 1)..=self.tip_height {
            let hash = self.block_hash_at(height)?.ok_or_else(|| {
                ChainError::Storage(StoreError::Corrupt(format!(
                    "height index missing at {}",
                    height
                )))
            })?;
            let (_, block) = self.require_block_record(&hash)?;
            work = work + pow::block_work(block.bits)?;
        }
        Ok(work)
    }

    /// Switch the active chain onto `branch`. On a validation failure the
    /// original chain is restored and the offending block and its stored
    /// descendants are marked invalid.
    fn reorganize(&mut self, fork_height: u32, branch: Vec<(u32, Block)>) -> Result<BlockStatus> {
        log::debug!(
            "reorganizing: {} block(s) above fork height {}",
            branch.len(),
            fork_height
        );

        let mut disconnected: Vec<Block> = Vec::new();
        while self.tip_height > fork_height {
            disconnected.push(self.disconnect_tip()?);
        }

        let mut connected = 0usize;
        for (index, (height, block)) in branch.iter().enumerate() {
            let parent = self.require_block(&block.previous_hash)?;
            let outcome = self
                .validate_context(block, *height, &parent)
                .and_then(|()| self.connect(block, *height));

            if let Err(err) = outcome {
                log::warn!(
                    "reorganization aborted at block {}: {}",
                    hex::encode(block.hash),
                    err
                );
                for (_, dead) in &branch[index..] {
                    self.mark_invalid(&dead.hash)?;
                }
                for _ in 0..connected {
                    self.disconnect_tip()?;
                }
                for restored in disconnected.iter().rev() {
                    let restore_height = self.tip_height + 1;
                    self.connect(restored, restore_height)?;
                }
                return Err(err);
            }
            connected += 1;
        }

        // the blocks that fell off the chain hand their transactions back
        // to the pool, minus whatever the new branch already confirmed
        let mut persist: Vec<(Hash, Vec<u8>)> = Vec::new();
        {
            let (store, mempool) = (&self.store, &mut self.mempool);
            let view = StoreView(store);
            for old in &disconnected {
                for id in mempool.readmit_disconnected(old, &view) {
                    if let Some(tx) = mempool.get(&id) {
                        persist.push((id, codec::transaction_to_bytes(tx)));
                    }
                }
            }
        }
        for (id, bytes) in persist {
            self.store.put(&mempool_key(&id), &bytes)?;
        }

        log::debug!(
            "reorganized onto {} at height {}",
            hex::encode(self.tip_hash),
            self.tip_height
        );
        Ok(BlockStatus::Reorganized {
            disconnected: disconnected.len(),
            connected,
        })
    }

    /// Context checks at attach time: difficulty schedule, cumulative
    /// emission, spend availability and the exact coinbase payout.
    fn validate_context(&self, block: &Block, height: u32, parent: &Block) -> Result<()> {
        let expected_bits = self.expected_bits(height, parent)?;
        if block.bits != expected_bits {
            return Err(ChainError::Context(format!(
                "difficulty bits {:#010x} do not match expected {:#010x}",
                block.bits, expected_bits
            )));
        }

        let expected_emission =
            emission::expected_cumulative_emission(parent.cumulative_emission, height);
        if block.cumulative_emission != expected_emission {
            return Err(ChainError::Context(format!(
                "cumulative emission {} does not match expected {}",
                block.cumulative_emission, expected_emission
            )));
        }

        let mut view = OverlayView::new(&self.store);
        let mut fees: u64 = 0;
        for (i, tx) in block.transactions.iter().enumerate() {
            if !tx.is_coinbase() {
                let fee = check_tx_inputs(tx, &view).map_err(|err| match err {
                    ChainError::Context(reason) => {
                        ChainError::Context(format!("transaction {}: {}", i, reason))
                    }
                    other => other,
                })?;
                fees = fees
                    .checked_add(fee)
                    .ok_or_else(|| ChainError::Context("fee overflow".to_string()))?;
            }
            view.apply_tx(tx);
        }

        let coinbase = block
            .coinbase()
            .ok_or_else(|| ChainError::InvalidBlock("no transactions".to_string()))?;
        let mut payout: u64 = 0;
        for output in &coinbase.outputs {
            payout = payout
                .checked_add(output.amount)
                .ok_or_else(|| ChainError::Context("coinbase overflow".to_string()))?;
        }
        let expected_payout = emission::block_reward(height)
            .checked_add(fees)
            .ok_or_else(|| ChainError::Context("reward overflow".to_string()))?;
        if payout != expected_payout {
            return Err(ChainError::Context(format!(
                "coinbase pays {} but reward plus fees is {}",
                payout, expected_payout
            )));
        }

        Ok(())
    }

    /// Compact target the block at `height` must carry, given its parent.
    fn expected_bits(&self, height: u32, parent: &Block) -> Result<u32> {
        if height % DIFFICULTY_PERIOD != 0 {
            return Ok(parent.bits);
        }
        let period_start = height - DIFFICULTY_PERIOD;
        let first = self.block_at_height(period_start)?.ok_or_else(|| {
            ChainError::Storage(StoreError::Corrupt(format!(
                "missing period start block at height {}",
                period_start
            )))
        })?;
        pow::next_bits(parent.bits, first.timestamp, parent.timestamp)
    }

    /// Persist a block as the new tip in one durable batch.
    fn connect(&mut self, block: &Block, height: u32) -> Result<()> {
        let (mut ops, _) = utxo::apply_ops(&self.store, block)?;
        ops.push(WriteOp::Put(
            block_key(&block.hash),
            encode_block_record(height, block),
        ));
        ops.push(WriteOp::Put(height_key(height), block.hash.to_vec()));
        ops.push(WriteOp::Put(TIP_KEY.to_vec(), block.hash.to_vec()));
        self.store.write_batch(ops, true)?;

        self.tip_hash = block.hash;
        self.tip_height = height;

        for id in self.mempool.sweep_connected(block) {
            self.store.delete(&mempool_key(&id))?;
        }

        log::debug!(
            "connected block {} at height {}",
            hex::encode(block.hash),
            height
        );
        Ok(())
    }

    /// Detach the tip block, restoring its parent as tip. The block record
    /// itself stays, now describing a side-chain block.
    fn disconnect_tip(&mut self) -> Result<Block> {
        if self.tip_height == 0 {
            return Err(ChainError::Context(
                "the genesis block cannot be disconnected".to_string(),
            ));
        }
        let tip_hash = self.tip_hash;
        let (height, block) = self.require_block_record(&tip_hash)?;

        let mut ops = utxo::undo_ops(&self.store, &block)?;
        ops.push(WriteOp::Delete(height_key(height)));
        ops.push(WriteOp::Put(TIP_KEY.to_vec(), block.previous_hash.to_vec()));
        self.store.write_batch(ops, true)?;

        self.tip_hash = block.previous_hash;
        self.tip_height = height - 1;
        log::debug!(
            "disconnected block {} from height {}",
            hex::encode(block.hash),
            height
        );
        Ok(block)
    }

    fn buffer_orphan(&mut self, block: Block) -> BlockStatus {
        if self.orphans.iter().any(|orphan| orphan.hash == block.hash) {
            return BlockStatus::Orphaned;
        }
        if self.orphans.len() >= MAX_ORPHANS {
            if let Some(evicted) = self.orphans.pop_front() {
                log::debug!("orphan buffer full, dropping {}", hex::encode(evicted.hash));
            }
        }
        log::debug!("buffering orphan block {}", hex::encode(block.hash));
        self.orphans.push_back(block);
        BlockStatus::Orphaned
    }

    /// Resubmit buffered blocks whose parent has since been stored, until
    /// no orphan makes progress.
    fn retry_orphans(&mut self) {
        loop {
            let ready = self.orphans.iter().position(|orphan| {
                matches!(
                    self.store.get(&block_key(&orphan.previous_hash)),
                    Ok(Some(_))
                )
            });
            let Some(index) = ready else { break };
            let Some(orphan) = self.orphans.remove(index) else {
                break;
            };
            let hash = orphan.hash;
            if let Err(err) = self.submit_block(orphan) {
                log::debug!("buffered block {} failed on retry: {}", hex::encode(hash), err);
            }
        }
    }

    fn reload_mempool(&mut self) -> Result<()> {
        let records = self.store.iter_prefix(&crate::store::mempool_prefix())?;
        let mut stale: Vec<Vec<u8>> = Vec::new();
        {
            let (store, mempool) = (&self.store, &mut self.mempool);
            let view = StoreView(store);
            for (key, value) in &records {
                match codec::transaction_from_bytes(value) {
                    Ok(tx) => {
                        if mempool.admit(tx, &view).is_err() {
                            stale.push(key.clone());
                        }
                    }
                    Err(_) => stale.push(key.clone()),
                }
            }
        }
        for key in stale {
            self.store.delete(&key)?;
        }
        Ok(())
    }

    fn is_invalid(&self, hash: &Hash) -> Result<bool> {
        Ok(self.store.get(&invalid_key(hash))?.is_some())
    }

    fn mark_invalid(&mut self, hash: &Hash) -> Result<()> {
        self.store.put(&invalid_key(hash), &[])?;
        Ok(())
    }

    fn require_block(&self, hash: &Hash) -> Result<Block> {
        Ok(self.require_block_record(hash)?.1)
    }

    fn require_block_record(&self, hash: &Hash) -> Result<(u32, Block)> {
        read_block_record(&self.store, hash)?.ok_or_else(|| {
            ChainError::Storage(StoreError::Corrupt(format!(
                "missing block record {}",
                hex::encode(hash)
            )))
        })
    }
}

fn encode_block_record(height: u32, block: &Block) -> Vec<u8> {
    let mut bytes = height.to_le_bytes().to_vec();
    bytes.extend_from_slice(&codec::block_to_bytes(block));
    bytes
}

fn read_block_record<S: KvStore>(store: &S, hash: &Hash) -> Result<Option<(u32, Block)>> {
    let Some(bytes) = store.get(&block_key(hash))? else {
        return Ok(None);
    };
    if bytes.len() < 4 {
        return Err(ChainError::Storage(StoreError::Corrupt(
            "block record shorter than its height field".to_string(),
        )));
    }
    let height = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let block = codec::block_from_bytes(&bytes[4..])?;
    Ok(Some((height, block)))
}

fn hash_from_slice(bytes: &[u8]) -> Result<Hash> {
    if bytes.len() != 32 {
        return Err(ChainError::Storage(StoreError::Corrupt(format!(
            "expected a 32-byte hash, found {} bytes",
            bytes.len()
        ))));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(bytes);
    Ok(hash)
}
