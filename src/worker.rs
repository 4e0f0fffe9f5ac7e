//! Single-writer chain worker
//!
//! One dedicated thread owns the chain manager and therefore every mutation
//! of the UTXO set, tip and mempool. Collaborators talk to it through a
//! bounded channel of commands with one-shot reply channels; the worker
//! drains them strictly in order, so every submission is totally ordered
//! against every other mutating operation.

use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};

use crate::chain::{BlockStatus, ChainManager};
use crate::constants::INGRESS_QUEUE_DEPTH;
use crate::error::{ChainError, Result};
use crate::store::KvStore;
use crate::types::{Block, Hash, OutPoint, Transaction, TxOut};

/// Messages accepted by the worker.
pub enum ChainCommand {
    SubmitBlock {
        block: Block,
        reply: oneshot::Sender<Result<BlockStatus>>,
    },
    SubmitTransaction {
        transaction: Transaction,
        reply: oneshot::Sender<Result<()>>,
    },
    QueryTip {
        reply: oneshot::Sender<(Hash, u32)>,
    },
    QueryUtxo {
        outpoint: OutPoint,
        reply: oneshot::Sender<Result<Option<TxOut>>>,
    },
    QueryMempoolSize {
        reply: oneshot::Sender<usize>,
    },
    /// Finish the in-flight command, then exit.
    Shutdown,
}

/// Cloneable handle for submitting work to the chain worker.
#[derive(Clone)]
pub struct ChainHandle {
    sender: mpsc::Sender<ChainCommand>,
}

impl ChainHandle {
    pub fn submit_block(&self, block: Block) -> Result<BlockStatus> {
        let (reply, response) = oneshot::channel();
        self.send(ChainCommand::SubmitBlock { block, reply })?;
        response.blocking_recv().map_err(|_| ChainError::ChannelClosed)?
    }

    pub fn submit_transaction(&self, transaction: Transaction) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(ChainCommand::SubmitTransaction { transaction, reply })?;
        response.blocking_recv().map_err(|_| ChainError::ChannelClosed)?
    }

    pub fn tip(&self) -> Result<(Hash, u32)> {
        let (reply, response) = oneshot::channel();
        self.send(ChainCommand::QueryTip { reply })?;
        response.blocking_recv().map_err(|_| ChainError::ChannelClosed)
    }

    pub fn utxo(&self, outpoint: OutPoint) -> Result<Option<TxOut>> {
        let (reply, response) = oneshot::channel();
        self.send(ChainCommand::QueryUtxo { outpoint, reply })?;
        response.blocking_recv().map_err(|_| ChainError::ChannelClosed)?
    }

    pub fn mempool_size(&self) -> Result<usize> {
        let (reply, response) = oneshot::channel();
        self.send(ChainCommand::QueryMempoolSize { reply })?;
        response.blocking_recv().map_err(|_| ChainError::ChannelClosed)
    }

    /// Ask the worker to exit once the command ahead of this one finishes.
    pub fn shutdown(&self) -> Result<()> {
        self.send(ChainCommand::Shutdown)
    }

    fn send(&self, command: ChainCommand) -> Result<()> {
        self.sender
            .blocking_send(command)
            .map_err(|_| ChainError::ChannelClosed)
    }
}

/// Start the worker thread over an opened chain manager.
pub fn spawn<S: KvStore + 'static>(manager: ChainManager<S>) -> (ChainHandle, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel(INGRESS_QUEUE_DEPTH);
    let thread = thread::spawn(move || run(manager, receiver));
    (ChainHandle { sender }, thread)
}

fn run<S: KvStore>(mut manager: ChainManager<S>, mut receiver: mpsc::Receiver<ChainCommand>) {
    while let Some(command) = receiver.blocking_recv() {
        match command {
            ChainCommand::SubmitBlock { block, reply } => {
                let _ = reply.send(manager.submit_block(block));
            }
            ChainCommand::SubmitTransaction { transaction, reply } => {
                let _ = reply.send(manager.submit_transaction(transaction));
            }
            ChainCommand::QueryTip { reply } => {
                let _ = reply.send((manager.tip(), manager.height()));
            }
            ChainCommand::QueryUtxo { outpoint, reply } => {
                let _ = reply.send(manager.utxo(&outpoint));
            }
            ChainCommand::QueryMempoolSize { reply } => {
                let _ = reply.send(manager.mempool().len());
            }
            ChainCommand::Shutdown => {
                log::debug!("chain worker shutting down");
                break;
            }
        }
    }
}
