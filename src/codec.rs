//! Canonical binary serialization
//!
//! Unsigned integers are little-endian. Fixed-size byte strings are written
//! verbatim; repeated records are preceded by a `u32` count. The same layout
//! serves both transport and hashing, so no two encodings of one logical
//! value may exist.

use crate::address::Address;
use crate::constants::{ADDRESS_SIZE, BLOCK_HEADER_SIZE};
use crate::error::CodecError;
use crate::types::{Block, OutPoint, Transaction, TxIn, TxOut};

/// Append-only byte sink for canonical encoding.
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor over untrusted input bytes.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn u64(&mut self) -> Result<u64, CodecError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let bytes = self.take(N)?;
        let mut raw = [0u8; N];
        raw.copy_from_slice(bytes);
        Ok(raw)
    }

    /// Read a record count and reject counts that cannot possibly fit the
    /// remaining input, before any allocation happens.
    pub fn count(&mut self, min_record_size: usize) -> Result<u32, CodecError> {
        let count = self.u32()?;
        let needed = (count as usize).checked_mul(min_record_size);
        match needed {
            Some(needed) if needed <= self.remaining() => Ok(count),
            _ => Err(CodecError::LengthOverflow(count)),
        }
    }

    /// Demand that every input byte has been consumed.
    pub fn finish(&self) -> Result<(), CodecError> {
        if self.remaining() != 0 {
            return Err(CodecError::TrailingBytes);
        }
        Ok(())
    }
}

// Fixed record sizes used for count validation.
const TXIN_WIRE_SIZE: usize = 32 + 4 + 64 + 32;
const TXOUT_WIRE_SIZE: usize = 8 + ADDRESS_SIZE;
const TX_MIN_WIRE_SIZE: usize = 32 + 4 + 4;

pub fn write_txin(w: &mut Writer, input: &TxIn) {
    w.put_bytes(&input.prev_out.tx_hash);
    w.put_u32(input.prev_out.index);
    w.put_bytes(&input.signature);
    w.put_bytes(&input.public_key);
}

pub fn read_txin(r: &mut Reader<'_>) -> Result<TxIn, CodecError> {
    let tx_hash = r.array::<32>()?;
    let index = r.u32()?;
    let signature = r.array::<64>()?;
    let public_key = r.array::<32>()?;
    Ok(TxIn {
        prev_out: OutPoint::new(tx_hash, index),
        signature,
        public_key,
    })
}

pub fn write_txout(w: &mut Writer, output: &TxOut) {
    w.put_u64(output.amount);
    w.put_bytes(output.address.as_bytes());
}

pub fn read_txout(r: &mut Reader<'_>) -> Result<TxOut, CodecError> {
    let amount = r.u64()?;
    let address = Address::from_bytes(r.array::<ADDRESS_SIZE>()?);
    Ok(TxOut { amount, address })
}

pub fn txout_to_bytes(output: &TxOut) -> Vec<u8> {
    let mut w = Writer::with_capacity(TXOUT_WIRE_SIZE);
    write_txout(&mut w, output);
    w.into_bytes()
}

pub fn txout_from_bytes(bytes: &[u8]) -> Result<TxOut, CodecError> {
    let mut r = Reader::new(bytes);
    let output = read_txout(&mut r)?;
    r.finish()?;
    Ok(output)
}

pub fn write_transaction(w: &mut Writer, tx: &Transaction) {
    w.put_bytes(&tx.id);
    w.put_u32(tx.inputs.len() as u32);
    w.put_u32(tx.outputs.len() as u32);
    for input in &tx.inputs {
        write_txin(w, input);
    }
    for output in &tx.outputs {
        write_txout(w, output);
    }
}

pub fn read_transaction(r: &mut Reader<'_>) -> Result<Transaction, CodecError> {
    let id = r.array::<32>()?;
    let input_count = r.count(TXIN_WIRE_SIZE)?;
    let output_count = r.u32()?;
    // input records sit between here and the outputs, so both record runs
    // must fit the remaining bytes together
    let needed = (input_count as usize)
        .saturating_mul(TXIN_WIRE_SIZE)
        .saturating_add((output_count as usize).saturating_mul(TXOUT_WIRE_SIZE));
    if needed > r.remaining() {
        return Err(CodecError::LengthOverflow(output_count));
    }
    let mut inputs = Vec::with_capacity(input_count as usize);
    for _ in 0..input_count {
        inputs.push(read_txin(r)?);
    }
    let mut outputs = Vec::with_capacity(output_count as usize);
    for _ in 0..output_count {
        outputs.push(read_txout(r)?);
    }
    Ok(Transaction {
        id,
        inputs,
        outputs,
    })
}

pub fn transaction_to_bytes(tx: &Transaction) -> Vec<u8> {
    let mut w = Writer::new();
    write_transaction(&mut w, tx);
    w.into_bytes()
}

pub fn transaction_from_bytes(bytes: &[u8]) -> Result<Transaction, CodecError> {
    let mut r = Reader::new(bytes);
    let tx = read_transaction(&mut r)?;
    r.finish()?;
    Ok(tx)
}

/// Serialized size of a transaction on the wire.
pub fn transaction_wire_size(tx: &Transaction) -> usize {
    32 + 4 + 4 + tx.inputs.len() * TXIN_WIRE_SIZE + tx.outputs.len() * TXOUT_WIRE_SIZE
}

/// The header bytes hashed into a block's `hash` and ground by the miner.
pub fn block_header_bytes(block: &Block) -> Vec<u8> {
    let mut w = Writer::with_capacity(BLOCK_HEADER_SIZE);
    w.put_u32(block.version);
    w.put_u32(block.timestamp);
    w.put_u32(block.nonce);
    w.put_u32(block.bits);
    w.put_u64(block.cumulative_emission);
    w.put_bytes(&block.previous_hash);
    w.put_bytes(&block.merkle_root);
    w.into_bytes()
}

pub fn write_block(w: &mut Writer, block: &Block) {
    w.put_u32(block.version);
    w.put_bytes(&block.previous_hash);
    w.put_bytes(&block.hash);
    w.put_u32(block.timestamp);
    w.put_u32(block.nonce);
    w.put_u32(block.bits);
    w.put_u64(block.cumulative_emission);
    w.put_bytes(&block.merkle_root);
    w.put_u32(block.transactions.len() as u32);
    for tx in &block.transactions {
        write_transaction(w, tx);
    }
}

pub fn read_block(r: &mut Reader<'_>) -> Result<Block, CodecError> {
    let version = r.u32()?;
    let previous_hash = r.array::<32>()?;
    let hash = r.array::<32>()?;
    let timestamp = r.u32()?;
    let nonce = r.u32()?;
    let bits = r.u32()?;
    let cumulative_emission = r.u64()?;
    let merkle_root = r.array::<32>()?;
    let transaction_count = r.count(TX_MIN_WIRE_SIZE)?;
    let mut transactions = Vec::with_capacity(transaction_count as usize);
    for _ in 0..transaction_count {
        transactions.push(read_transaction(r)?);
    }
    Ok(Block {
        version,
        previous_hash,
        hash,
        timestamp,
        nonce,
        bits,
        cumulative_emission,
        merkle_root,
        transactions,
    })
}

pub fn block_to_bytes(block: &Block) -> Vec<u8> {
    let mut w = Writer::new();
    write_block(&mut w, block);
    w.into_bytes()
}

pub fn block_from_bytes(bytes: &[u8]) -> Result<Block, CodecError> {
    let mut r = Reader::new(bytes);
    let block = read_block(&mut r)?;
    r.finish()?;
    Ok(block)
}
