//! Core data model: transactions, blocks and the identifiers connecting them

use crate::address::Address;

/// Hash type: 256-bit SHA256d digest
pub type Hash = [u8; 32];

/// The all-zero hash, used as the previous-transaction reference of a
/// coinbase input and as the previous-block hash of the genesis block.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Reference to a transaction output: producing transaction id plus the
/// output's position inside it. Doubles as the UTXO key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub tx_hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(tx_hash: Hash, index: u32) -> Self {
        Self { tx_hash, index }
    }
}

/// Transaction input: consumes a previous output and proves ownership with
/// an Ed25519 signature over the transaction's signing header.
///
/// The public key must hash to the address stored in the referenced output;
/// the signature must verify against that public key. Neither field is
/// covered by the signing header, otherwise signatures would sign themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prev_out: OutPoint,
    pub signature: [u8; 64],
    pub public_key: [u8; 32],
}

/// Transaction output: an amount of atomic units locked to an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub amount: u64,
    pub address: Address,
}

/// A transfer of value: inputs are pooled and split across outputs.
///
/// `id` is `sha256d` of the signing header and must always agree with a
/// recomputation over the current field values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: Hash,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
}

impl Transaction {
    /// A coinbase transaction has exactly one input and that input
    /// references the all-zero transaction hash. Coinbase inputs carry no
    /// meaningful signature and skip signature verification.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prev_out.tx_hash == ZERO_HASH
    }
}

/// A block of transactions chained to its parent by `previous_hash`.
///
/// `hash` is `sha256d` of the serialized header and must satisfy the
/// proof-of-work target encoded in `bits`. `cumulative_emission` tracks the
/// total coin created up to and including this block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub version: u32,
    pub previous_hash: Hash,
    pub hash: Hash,
    pub timestamp: u32,
    pub nonce: u32,
    pub bits: u32,
    pub cumulative_emission: u64,
    pub merkle_root: Hash,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// First transaction of the block, which consensus requires to be the
    /// coinbase. `None` only on a structurally empty block.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }
}
