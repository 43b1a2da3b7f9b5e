#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! Cryptographic primitives for the Certen validator: SHA-256/Keccak-256
//! hashing, BLS12-381 attestation aggregation, Ed25519 write-back signing,
//! and the domain-separated binary Merkle tree used by the batch pipeline
//! and the chained inclusion proof.

pub use certen_types::error::CryptoError;

/// Hash function wrappers over `dcrypt`.
pub mod hash;
/// The domain-separated binary Merkle tree (§4.8) and layer-folding helper (§3 `ChainedInclusionProof`).
pub mod merkle;
/// BLS12-381 and Ed25519 signing.
pub mod sign;

pub use hash::{keccak256, sha256};
