//! Signature schemes the protocol uses: BLS12-381 for validator attestation
//! aggregation, Ed25519 for write-back signing.

pub mod batch;
pub mod bls;
pub mod eddsa;
