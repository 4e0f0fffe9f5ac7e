//! Error types surfaced by the consensus core

use thiserror::Error;

/// Failures while decoding wire bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("trailing bytes after decoded value")]
    TrailingBytes,

    #[error("length prefix {0} exceeds remaining input")]
    LengthOverflow(u32),
}

/// Failures raised by the persistent store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("context error: {0}")]
    Context(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Soft error: the block is already known. Not a fault.
    #[error("duplicate block")]
    DuplicateBlock,

    /// Soft error: the transaction is already pooled. Not a fault.
    #[error("duplicate transaction")]
    DuplicateTransaction,

    #[error("chain worker channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ChainError>;
