//! Ed25519 signing, used by `WriteBackSubmitter` to sign the synthetic
//! write-back envelope before submission to the source ledger.

use certen_types::error::CryptoError;
use dcrypt::sign::eddsa;

#[derive(Clone)]
pub struct Ed25519KeyPair {
    public_key: eddsa::Ed25519PublicKey,
    secret_key: eddsa::Ed25519SecretKey,
}

pub struct Ed25519Signature(pub eddsa::Ed25519Signature);
#[derive(Clone)]
pub struct Ed25519PublicKey(pub eddsa::Ed25519PublicKey);
#[derive(Clone)]
pub struct Ed25519PrivateKey(pub eddsa::Ed25519SecretKey);

impl Ed25519KeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let mut rng = rand::rngs::OsRng;
        let (public_key, secret_key) = eddsa::Ed25519::keypair(&mut rng)
            .map_err(|e| CryptoError::OperationFailed(format!("ed25519 keygen failed: {e:?}")))?;
        Ok(Self {
            public_key,
            secret_key,
        })
    }

    pub fn from_private_key(private_key: &Ed25519PrivateKey) -> Result<Self, CryptoError> {
        let secret_key = private_key.0.clone();
        let public_key = secret_key
            .public_key()
            .map_err(|e| CryptoError::OperationFailed(format!("derive public key failed: {e:?}")))?;
        Ok(Self {
            public_key,
            secret_key,
        })
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.public_key.clone())
    }

    pub fn private_key(&self) -> Ed25519PrivateKey {
        Ed25519PrivateKey(self.secret_key.clone())
    }

    pub fn sign(&self, message: &[u8]) -> Result<Ed25519Signature, CryptoError> {
        let sig = eddsa::Ed25519::sign(message, &self.secret_key)
            .map_err(|e| CryptoError::OperationFailed(format!("ed25519 sign failed: {e:?}")))?;
        Ok(Ed25519Signature(sig))
    }
}

impl Ed25519PublicKey {
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CryptoError> {
        eddsa::Ed25519::verify(message, &signature.0, &self.0)
            .map_err(|_| CryptoError::VerificationFailed)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }
}

impl Ed25519PrivateKey {
    /// Exports the 32-byte seed. Callers persist this encrypted at rest;
    /// this crate does not implement encryption-at-rest itself.
    pub fn seed_bytes(&self) -> Vec<u8> {
        self.0.seed().to_vec()
    }

    pub fn from_seed(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(
                "ed25519 seed must be 32 bytes".into(),
            ));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(bytes);
        eddsa::Ed25519SecretKey::from_seed(&seed)
            .map(Ed25519PrivateKey)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid ed25519 seed: {e:?}")))
    }
}

impl Ed25519Signature {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }
}
