//! BLS12-381 signatures using `dcrypt`.
//!
//! Signatures live in G1, public keys in G2, hashing to the curve via
//! `Scalar::hash_to_field` under a fixed domain separation tag. This is the
//! scheme `AttestationCollector` aggregates over: one signature per
//! validator over the same message, summed in G1, with public keys summed
//! in G2 for the final pairing check.

use certen_types::error::CryptoError;
use dcrypt::algorithms::ec::bls12_381::{
    pairing, Bls12_381Scalar as Scalar, G1Affine, G1Projective, G2Affine, G2Projective,
};
use rand::rngs::OsRng;
use rand::RngCore;

const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_CERTEN_";
const KEYGEN_DST: &[u8] = b"CERTEN-BLS-KEYGEN";

#[derive(Clone)]
pub struct BlsKeyPair {
    public_key: BlsPublicKey,
    secret_key: BlsPrivateKey,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlsPublicKey(pub G2Affine);

#[derive(Clone)]
pub struct BlsPrivateKey(pub Scalar);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlsSignature(pub G1Affine);

impl BlsKeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let mut rng = OsRng;
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        let secret = Scalar::hash_to_field(&bytes, KEYGEN_DST)
            .map_err(|e| CryptoError::OperationFailed(format!("BLS keygen failed: {e:?}")))?;
        let public = G2Affine::from(G2Projective::generator() * secret);
        Ok(Self {
            public_key: BlsPublicKey(public),
            secret_key: BlsPrivateKey(secret),
        })
    }

    pub fn public_key(&self) -> BlsPublicKey {
        self.public_key.clone()
    }

    pub fn private_key(&self) -> BlsPrivateKey {
        self.secret_key.clone()
    }

    pub fn sign(&self, message: &[u8]) -> Result<BlsSignature, CryptoError> {
        self.secret_key.sign(message)
    }
}

fn hash_to_g1(message: &[u8]) -> Result<G1Affine, CryptoError> {
    let scalar = Scalar::hash_to_field(message, BLS_DST)
        .map_err(|e| CryptoError::OperationFailed(format!("hash-to-field failed: {e:?}")))?;
    Ok(G1Affine::from(G1Projective::generator() * scalar))
}

impl BlsPrivateKey {
    pub fn sign(&self, message: &[u8]) -> Result<BlsSignature, CryptoError> {
        let msg_point = hash_to_g1(message)?;
        let sig = G1Projective::from(msg_point) * self.0;
        Ok(BlsSignature(G1Affine::from(sig)))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidHashLength {
                expected: 32,
                got: bytes.len(),
            });
        }
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("malformed BLS scalar".into()))?;
        let scalar = Scalar::from_bytes(&arr)
            .into_option()
            .ok_or_else(|| CryptoError::InvalidKey("invalid BLS scalar".into()))?;
        Ok(Self(scalar))
    }
}

impl BlsPublicKey {
    pub fn verify(&self, message: &[u8], signature: &BlsSignature) -> Result<(), CryptoError> {
        let msg_point = hash_to_g1(message)?;
        let lhs = pairing(&signature.0, &G2Affine::generator());
        let rhs = pairing(&msg_point, &self.0);
        if lhs == rhs {
            Ok(())
        } else {
            Err(CryptoError::VerificationFailed)
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_compressed().as_ref().to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 96 {
            return Err(CryptoError::InvalidHashLength {
                expected: 96,
                got: bytes.len(),
            });
        }
        let arr: [u8; 96] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("malformed BLS G2 point".into()))?;
        let point = G2Affine::from_compressed(&arr)
            .into_option()
            .ok_or_else(|| CryptoError::InvalidKey("invalid BLS G2 point".into()))?;
        Ok(Self(point))
    }
}

impl BlsSignature {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_compressed().as_ref().to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 48 {
            return Err(CryptoError::InvalidHashLength {
                expected: 48,
                got: bytes.len(),
            });
        }
        let arr: [u8; 48] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature("malformed BLS G1 point".into()))?;
        let point = G1Affine::from_compressed(&arr)
            .map_err(|_| CryptoError::InvalidSignature("invalid BLS G1 point".into()))?;
        Ok(Self(point))
    }
}

/// Sums a set of G1 signatures into a single aggregate point. The
/// `AttestationCollector` calls this once signed voting power crosses
/// threshold, over the ordered set of contributing validators' signatures.
pub fn aggregate_signatures(sigs: &[BlsSignature]) -> Result<BlsSignature, CryptoError> {
    if sigs.is_empty() {
        return Err(CryptoError::OperationFailed(
            "cannot aggregate zero signatures".into(),
        ));
    }
    let mut acc = G1Projective::from(sigs[0].0);
    for sig in &sigs[1..] {
        acc += G1Projective::from(sig.0);
    }
    Ok(BlsSignature(G1Affine::from(acc)))
}

/// Sums a set of G2 public keys, for constructing the aggregate verification
/// key a caller would use to check an `AggregatedAttestation` against the
/// full set of contributing validators at once.
pub fn aggregate_public_keys(keys: &[BlsPublicKey]) -> Result<BlsPublicKey, CryptoError> {
    if keys.is_empty() {
        return Err(CryptoError::OperationFailed(
            "cannot aggregate zero public keys".into(),
        ));
    }
    let mut acc = G2Projective::from(keys[0].0);
    for key in &keys[1..] {
        acc += G2Projective::from(key.0);
    }
    Ok(BlsPublicKey(G2Affine::from(acc)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = BlsKeyPair::generate().unwrap();
        let msg = b"certen-attestation";
        let sig = kp.sign(msg).unwrap();
        assert!(kp.public_key().verify(msg, &sig).is_ok());
        assert!(kp.public_key().verify(b"other", &sig).is_err());
    }

    #[test]
    fn public_key_serialization_roundtrips() {
        let kp = BlsKeyPair::generate().unwrap();
        let bytes = kp.public_key().to_bytes();
        let restored = BlsPublicKey::from_bytes(&bytes).unwrap();
        assert_eq!(kp.public_key(), restored);
    }

    #[test]
    fn aggregate_signature_verifies_against_aggregate_key() {
        let msg = b"result-hash-binding";
        let kps: Vec<BlsKeyPair> = (0..4).map(|_| BlsKeyPair::generate().unwrap()).collect();
        let sigs: Vec<BlsSignature> = kps.iter().map(|k| k.sign(msg).unwrap()).collect();
        let pks: Vec<BlsPublicKey> = kps.iter().map(|k| k.public_key()).collect();

        let agg_sig = aggregate_signatures(&sigs).unwrap();
        let agg_pk = aggregate_public_keys(&pks).unwrap();

        assert!(agg_pk.verify(msg, &agg_sig).is_ok());
    }
}
