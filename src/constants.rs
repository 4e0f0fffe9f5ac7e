//! Protocol parameters

/// SHA256d digest length in bytes
pub const HASH_SIZE: usize = 32;

/// Versioned address length: version byte + 20-byte key hash + 4-byte checksum
pub const ADDRESS_SIZE: usize = 25;

/// Version byte prepended to every address
pub const ADDRESS_VERSION: u8 = 0x01;

/// Current block version
pub const BLOCK_VERSION: u32 = 1;

/// Serialized block header length:
/// version + timestamp + nonce + bits (4 each) + cumulative emission (8)
/// + previous hash + merkle root (32 each)
pub const BLOCK_HEADER_SIZE: usize = 88;

/// Signed portion of a transaction input: previous tx hash + output index
pub const TXIN_HEADER_SIZE: usize = 36;

/// Signed portion of a transaction output: amount + address
pub const TXOUT_HEADER_SIZE: usize = 33;

/// Maximum tolerated clock drift for block timestamps: 2 hours
pub const MAX_FUTURE_BLOCK_TIME: u32 = 7200;

/// Cap on the serialized header size of a block, transactions included: 1 MiB
pub const MAX_BLOCK_SIZE: usize = 1_048_576;

/// Desired spacing between blocks, in seconds
pub const TARGET_BLOCK_TIME: u32 = 60;

/// Number of blocks between difficulty retargets
pub const DIFFICULTY_PERIOD: u32 = 2016;

/// Most permissive compact target accepted by the chain; also the genesis
/// difficulty
pub const MAX_TARGET_BITS: u32 = 0x207f_ffff;

/// Atomic units per coin
pub const COIN: u64 = 100_000_000;

/// Block reward before the first halving
pub const INITIAL_REWARD: u64 = 50 * COIN;

/// Number of blocks between reward halvings
pub const HALVING_INTERVAL: u32 = 210_000;

/// Maximum number of parentless blocks buffered while their ancestry is
/// still in flight
pub const MAX_ORPHANS: usize = 128;

/// Byte budget for the transaction pool
pub const MEMPOOL_MAX_BYTES: usize = 4_194_304;

/// Depth of the chain worker's ingress queue
pub const INGRESS_QUEUE_DEPTH: usize = 256;
