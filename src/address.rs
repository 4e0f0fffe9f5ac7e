//! Versioned 25-byte addresses derived from Ed25519 public keys
//!
//! Layout: one version byte, the RIPEMD160-of-SHA256 of the public key, and
//! a 4-byte checksum equal to the first four bytes of SHA256d over the
//! preceding 21 bytes. An address validates by recomputing its checksum.

use std::fmt;

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::constants::{ADDRESS_SIZE, ADDRESS_VERSION};
use crate::crypto::sha256d;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// Derive the address owned by an Ed25519 public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let payload = hash160(public_key);
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes[0] = ADDRESS_VERSION;
        bytes[1..21].copy_from_slice(&payload);
        let check = checksum(&bytes[..21]);
        bytes[21..].copy_from_slice(&check);
        Address(bytes)
    }

    /// Wrap raw bytes without validating them. Use `is_valid` on untrusted
    /// input.
    pub fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Network identifier byte.
    pub fn version(&self) -> u8 {
        self.0[0]
    }

    /// Recompute the checksum over version and payload and compare.
    pub fn is_valid(&self) -> bool {
        self.0[21..] == checksum(&self.0[..21])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// RIPEMD160(SHA256(data)), the public-key digest inside an address.
fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripemd);
    out
}

fn checksum(data: &[u8]) -> [u8; 4] {
    let digest = sha256d(data);
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_keypair;

    #[test]
    fn test_derived_address_is_valid() {
        let keypair = generate_keypair();
        let address = Address::from_public_key(&keypair.public.to_bytes());
        assert!(address.is_valid());
        assert_eq!(address.version(), ADDRESS_VERSION);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let keypair = generate_keypair();
        let public = keypair.public.to_bytes();
        assert_eq!(
            Address::from_public_key(&public),
            Address::from_public_key(&public)
        );
    }

    #[test]
    fn test_distinct_keys_get_distinct_addresses() {
        let a = Address::from_public_key(&generate_keypair().public.to_bytes());
        let b = Address::from_public_key(&generate_keypair().public.to_bytes());
        assert_ne!(a, b);
    }

    #[test]
    fn test_corrupted_checksum_detected() {
        let keypair = generate_keypair();
        let mut bytes = *Address::from_public_key(&keypair.public.to_bytes()).as_bytes();
        bytes[24] ^= 0x01;
        assert!(!Address::from_bytes(bytes).is_valid());
    }

    #[test]
    fn test_corrupted_payload_detected() {
        let keypair = generate_keypair();
        let mut bytes = *Address::from_public_key(&keypair.public.to_bytes()).as_bytes();
        bytes[5] ^= 0x80;
        assert!(!Address::from_bytes(bytes).is_valid());
    }

    #[test]
    fn test_display_is_hex() {
        let keypair = generate_keypair();
        let address = Address::from_public_key(&keypair.public.to_bytes());
        let rendered = address.to_string();
        assert_eq!(rendered.len(), ADDRESS_SIZE * 2);
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
