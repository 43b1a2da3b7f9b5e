//! SHA-256 and Keccak-256 hashing, plus the domain separation tags the
//! protocol's wire formats are versioned under.

use certen_types::error::CryptoError;
use dcrypt::algorithms::hash::sha2::Sha256 as DcryptSha256;
use dcrypt::algorithms::hash::{HashFunction as DcryptHashFunction, Keccak256 as DcryptKeccak256};
use dcrypt::algorithms::ByteSerializable;

/// Domain tag for a sealed batch's leaf hashing (§4.8): `SHA-256(CERTEN_LEAF_V1 || tx_hash)`.
pub const CERTEN_LEAF_V1: &[u8] = b"CERTEN_LEAF_V1";
/// Domain tag for a sealed batch's internal node hashing (§4.8): `SHA-256(CERTEN_NODE_V1 || left || right)`.
pub const CERTEN_NODE_V1: &[u8] = b"CERTEN_NODE_V1";
/// Version prefix for the `ExecutionCommitment` binary encoding (§4.1).
pub const CERTEN_EXEC_COMMITMENT_V1: &[u8] = b"CERTEN_EXEC_COMMITMENT_V1";
/// Domain tag for the attestation message hash (§4.3): `SHA-256(CERTEN_RESULT_V1 || result_hash || commitment_hash)`.
pub const CERTEN_RESULT_V1: &[u8] = b"CERTEN_RESULT_V1";
/// The memo value `IntentDiscovery` filters the source-ledger block stream for (§4.7).
pub const CERTEN_INTENT_MARKER: &str = "CERTEN_INTENT";

/// SHA-256 of arbitrary bytes.
pub fn sha256<T: AsRef<[u8]>>(data: T) -> Result<[u8; 32], CryptoError> {
    let digest = DcryptSha256::digest(data.as_ref()).map_err(dcrypt::Error::from)?;
    digest
        .to_bytes()
        .try_into()
        .map_err(|v: Vec<u8>| CryptoError::InvalidHashLength {
            expected: 32,
            got: v.len(),
        })
}

/// Keccak-256 of arbitrary bytes, used for EVM function selectors, event
/// topic0 hashes, and anything else that must match Solidity's hashing.
pub fn keccak256<T: AsRef<[u8]>>(data: T) -> Result<[u8; 32], CryptoError> {
    let digest = DcryptKeccak256::digest(data.as_ref()).map_err(dcrypt::Error::from)?;
    digest
        .to_bytes()
        .try_into()
        .map_err(|v: Vec<u8>| CryptoError::InvalidHashLength {
            expected: 32,
            got: v.len(),
        })
}

/// SHA-256 over a tag-prefixed message, the pattern every domain-separated
/// hash in this protocol follows.
pub fn tagged_sha256(tag: &[u8], parts: &[&[u8]]) -> Result<[u8; 32], CryptoError> {
    let mut buf = Vec::with_capacity(tag.len() + parts.iter().map(|p| p.len()).sum::<usize>());
    buf.extend_from_slice(tag);
    for p in parts {
        buf.extend_from_slice(p);
    }
    sha256(buf)
}

/// The first 4 bytes of `keccak256(signature)`, an EVM function selector.
pub fn function_selector(signature: &str) -> Result<[u8; 4], CryptoError> {
    let digest = keccak256(signature.as_bytes())?;
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    Ok(out)
}

/// `keccak256(event_signature)`, an event's topic0.
pub fn event_topic0(signature: &str) -> Result<[u8; 32], CryptoError> {
    keccak256(signature.as_bytes())
}
