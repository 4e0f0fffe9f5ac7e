//! # Vulkan core
//!
//! Consensus and state-management core of the Vulkan proof-of-work
//! currency: the transaction and block data model with its canonical binary
//! codec, the validation pipeline, the persistent chain and UTXO state
//! machine, and the mempool that gates what miners may include next.
//!
//! Networking, the miner's nonce search, wallets and RPC live in other
//! crates; they drive this one through [`chain::ChainManager`] directly or
//! through the single-writer [`worker`].
//!
//! ## Layers
//!
//! - Primitives: [`crypto`], [`address`], [`codec`], [`merkle`], [`pow`],
//!   [`emission`]
//! - Consensus objects: [`types`], [`transaction`], [`block`], [`genesis`]
//! - State: [`store`], [`utxo`], [`mempool`], [`chain`], [`worker`]
//!
//! ## Example
//!
//! ```
//! use vulkan_core::chain::ChainManager;
//! use vulkan_core::genesis::genesis_block;
//! use vulkan_core::store::MemoryStore;
//!
//! let chain = ChainManager::new(MemoryStore::new()).unwrap();
//! assert_eq!(chain.tip(), genesis_block().hash);
//! assert_eq!(chain.height(), 0);
//! ```

pub mod address;
pub mod block;
pub mod chain;
pub mod codec;
pub mod constants;
pub mod crypto;
pub mod emission;
pub mod error;
pub mod genesis;
pub mod mempool;
pub mod merkle;
pub mod pow;
pub mod store;
pub mod transaction;
pub mod types;
pub mod utxo;
pub mod worker;

// Re-export commonly used types
pub use address::Address;
pub use chain::{BlockStatus, ChainManager};
pub use constants::*;
pub use error::{ChainError, CodecError, Result, StoreError};
pub use mempool::Mempool;
pub use store::{KvStore, MemoryStore, SledStore, WriteOp};
pub use types::{Block, Hash, OutPoint, Transaction, TxIn, TxOut, ZERO_HASH};
pub use worker::{spawn, ChainHandle};
