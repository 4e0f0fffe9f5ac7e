//! Hashing and signature primitives

use ed25519_dalek::{Keypair, PublicKey, Signature, Signer, Verifier};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::types::Hash;

/// Single SHA256.
pub fn sha256(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Double SHA256, the protocol's hash for ids, block hashes and checksums.
pub fn sha256d(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(&first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// Generate a fresh Ed25519 keypair.
pub fn generate_keypair() -> Keypair {
    Keypair::generate(&mut OsRng)
}

/// Sign a message, returning the raw 64-byte signature.
pub fn sign(keypair: &Keypair, message: &[u8]) -> [u8; 64] {
    keypair.sign(message).to_bytes()
}

/// Verify a raw signature against a raw public key.
///
/// Malformed key or signature bytes count as verification failure; input
/// here is untrusted wire data, not an invariant violation.
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> bool {
    let public_key = match PublicKey::from_bytes(public_key) {
        Ok(pk) => pk,
        Err(_) => return false,
    };
    let signature = match Signature::from_bytes(&signature[..]) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    public_key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256d_is_double_sha256() {
        let data = b"vulkan";
        assert_eq!(sha256d(data), sha256(&sha256(data)));
    }

    #[test]
    fn test_sha256d_deterministic() {
        assert_eq!(sha256d(b"abc"), sha256d(b"abc"));
        assert_ne!(sha256d(b"abc"), sha256d(b"abd"));
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = generate_keypair();
        let message = b"spend authorization";
        let signature = sign(&keypair, message);
        assert!(verify(&keypair.public.to_bytes(), message, &signature));
    }

    #[test]
    fn test_verify_rejects_tampered_message() {
        let keypair = generate_keypair();
        let signature = sign(&keypair, b"original");
        assert!(!verify(&keypair.public.to_bytes(), b"tampered", &signature));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let keypair = generate_keypair();
        let other = generate_keypair();
        let signature = sign(&keypair, b"message");
        assert!(!verify(&other.public.to_bytes(), b"message", &signature));
    }

    #[test]
    fn test_verify_rejects_garbage_signature() {
        let keypair = generate_keypair();
        assert!(!verify(&keypair.public.to_bytes(), b"message", &[0u8; 64]));
    }
}
