//! Error taxonomy for the Certen proof-cycle validator.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// The five error classes from the failure-handling design: retry policy and
/// fatality differ by class, independent of which stage produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// RPC unavailable, temporary nonce collision: retried with backoff.
    Transient,
    /// Intent fails to parse, commitment field missing: skipped, logged, never retried.
    Malformed,
    /// Commitment mismatch, signature fails, Merkle proof invalid: fatal to the cycle.
    Integrity,
    /// Insufficient credits, nonce queue full: fatal to the submission.
    Resource,
    /// Threshold impossible, cycle duplicate: rejected immediately.
    Policy,
}

/// Errors from `CommitmentBuilder`.
#[derive(Debug, Error)]
pub enum CommitmentError {
    /// The intent's cross-chain leg value could not be parsed as base-10 integer or decimal float.
    #[error("intent malformed: {0}")]
    IntentMalformed(String),
    /// A required field was absent from one of the four canonical blobs.
    #[error("missing field in intent blob: {0}")]
    MissingField(String),
    /// Hashing the versioned commitment encoding failed.
    #[error("commitment hashing failed: {0}")]
    HashFailed(String),
}

impl ErrorCode for CommitmentError {
    fn code(&self) -> &'static str {
        match self {
            Self::IntentMalformed(_) => "COMMITMENT_INTENT_MALFORMED",
            Self::MissingField(_) => "COMMITMENT_MISSING_FIELD",
            Self::HashFailed(_) => "COMMITMENT_HASH_FAILED",
        }
    }
}

impl CommitmentError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Malformed
    }
}

/// Errors from `ExternalChainObserver`.
#[derive(Debug, Error)]
pub enum ObservationError {
    /// The context's observation deadline elapsed before confirmation.
    #[error("observation timed out waiting for {0}")]
    Timeout(String),
    /// The EVM RPC endpoint returned a transport-level error.
    #[error("rpc unavailable: {0}")]
    RpcUnavailable(String),
    /// The transaction receipt never appeared before the timeout.
    #[error("receipt missing for tx {0}")]
    ReceiptMissing(String),
    /// The transaction- or receipt-inclusion Merkle proof failed to verify.
    #[error("proof construction failed: {0}")]
    ProofConstructionFailed(String),
}

impl ErrorCode for ObservationError {
    fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "OBSERVATION_TIMEOUT",
            Self::RpcUnavailable(_) => "OBSERVATION_RPC_UNAVAILABLE",
            Self::ReceiptMissing(_) => "OBSERVATION_RECEIPT_MISSING",
            Self::ProofConstructionFailed(_) => "OBSERVATION_PROOF_CONSTRUCTION_FAILED",
        }
    }
}

impl ObservationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RpcUnavailable(_) => ErrorKind::Transient,
            Self::Timeout(_) | Self::ReceiptMissing(_) => ErrorKind::Integrity,
            Self::ProofConstructionFailed(_) => ErrorKind::Integrity,
        }
    }
}

/// Errors from commitment verification against an observed result (§4.1 second half).
#[derive(Debug, Error)]
pub enum VerificationError {
    /// No step's function selector matched the observed calldata.
    #[error("no commitment step matched observed result")]
    NoStepMatched,
    /// The governance step's target address did not equal the commitment's `final_target`.
    #[error("final target mismatch: expected {expected}, got {got}")]
    FinalTargetMismatch { expected: String, got: String },
    /// An expected event did not appear among the observed logs.
    #[error("expected event not observed: contract={contract} topic0={topic0}")]
    EventMissing { contract: String, topic0: String },
    /// A chained or Merkle inclusion proof failed to verify.
    #[error("inclusion proof invalid: {0}")]
    InclusionProofInvalid(String),
}

impl ErrorCode for VerificationError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoStepMatched => "VERIFICATION_NO_STEP_MATCHED",
            Self::FinalTargetMismatch { .. } => "VERIFICATION_FINAL_TARGET_MISMATCH",
            Self::EventMissing { .. } => "VERIFICATION_EVENT_MISSING",
            Self::InclusionProofInvalid(_) => "VERIFICATION_INCLUSION_PROOF_INVALID",
        }
    }
}

impl VerificationError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Integrity
    }
}

/// Errors from `AttestationCollector`.
#[derive(Debug, Error)]
pub enum AttestationError {
    /// A second attestation arrived for a validator index already recorded for this result hash.
    #[error("duplicate attestation from validator {0}")]
    DuplicateValidator(u32),
    /// The validator index is not a member of the configured validator set.
    #[error("unknown validator index {0}")]
    UnknownValidator(u32),
    /// The BLS signature is not a valid point, or does not verify against the validator's public key.
    #[error("invalid attestation signature from validator {0}")]
    InvalidSignature(u32),
    /// More validators have refused than the margin the threshold can tolerate.
    #[error("threshold impossible: signed {signed}, refused {refused}, total {total}")]
    ThresholdImpossible { signed: u64, refused: u64, total: u64 },
}

impl ErrorCode for AttestationError {
    fn code(&self) -> &'static str {
        match self {
            Self::DuplicateValidator(_) => "ATTESTATION_DUPLICATE_VALIDATOR",
            Self::UnknownValidator(_) => "ATTESTATION_UNKNOWN_VALIDATOR",
            Self::InvalidSignature(_) => "ATTESTATION_INVALID_SIGNATURE",
            Self::ThresholdImpossible { .. } => "ATTESTATION_THRESHOLD_IMPOSSIBLE",
        }
    }
}

impl AttestationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ThresholdImpossible { .. } => ErrorKind::Policy,
            _ => ErrorKind::Integrity,
        }
    }
}

/// Errors from `SyntheticTxBuilder` / `WriteBackSubmitter`.
#[derive(Debug, Error)]
pub enum WriteBackError {
    /// Signer credit balance is below the minimum required for this write-back.
    #[error("insufficient credits: have {have}, need {need}")]
    InsufficientCredits { have: u64, need: u64 },
    /// The local pending-nonce pool is at capacity.
    #[error("nonce pool exhausted: {0} pending")]
    NoncePoolFull(usize),
    /// Submission to the source ledger failed.
    #[error("write-back submission failed: {0}")]
    SubmissionFailed(String),
    /// Confirmation polling exceeded the configured timeout.
    #[error("write-back confirmation timed out for tx {0}")]
    ConfirmationTimeout(String),
    /// Signing the envelope failed.
    #[error("write-back signing failed: {0}")]
    SigningFailed(String),
}

impl ErrorCode for WriteBackError {
    fn code(&self) -> &'static str {
        match self {
            Self::InsufficientCredits { .. } => "WRITEBACK_INSUFFICIENT_CREDITS",
            Self::NoncePoolFull(_) => "WRITEBACK_NONCE_POOL_FULL",
            Self::SubmissionFailed(_) => "WRITEBACK_SUBMISSION_FAILED",
            Self::ConfirmationTimeout(_) => "WRITEBACK_CONFIRMATION_TIMEOUT",
            Self::SigningFailed(_) => "WRITEBACK_SIGNING_FAILED",
        }
    }
}

impl WriteBackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientCredits { .. } | Self::NoncePoolFull(_) => ErrorKind::Resource,
            Self::ConfirmationTimeout(_) => ErrorKind::Transient,
            Self::SubmissionFailed(_) => ErrorKind::Transient,
            Self::SigningFailed(_) => ErrorKind::Integrity,
        }
    }
}

/// Errors from `IntentDiscovery` / `ChainedProofGenerator`.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// SHA-256-prefix routing of the account URL to a BVN partition was ambiguous.
    #[error("routing undetermined for account {0}")]
    RoutingUndetermined(String),
    /// A block query against a source-ledger partition failed.
    #[error("partition query failed: {0}")]
    PartitionQueryFailed(String),
    /// An entry's payload could not be parsed under either known transaction shape.
    #[error("entry parse failed: {0}")]
    EntryParseFailed(String),
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::RoutingUndetermined(_) => "DISCOVERY_ROUTING_UNDETERMINED",
            Self::PartitionQueryFailed(_) => "DISCOVERY_PARTITION_QUERY_FAILED",
            Self::EntryParseFailed(_) => "DISCOVERY_ENTRY_PARSE_FAILED",
        }
    }
}

impl DiscoveryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RoutingUndetermined(_) => ErrorKind::Policy,
            Self::PartitionQueryFailed(_) => ErrorKind::Transient,
            Self::EntryParseFailed(_) => ErrorKind::Malformed,
        }
    }
}

/// Errors from `BatchAnchorPipeline`.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The anchor transaction reverted on-chain.
    #[error("anchor transaction reverted: {0}")]
    AnchorReverted(String),
    /// The batch could not be sealed (e.g. empty leaf set).
    #[error("batch seal failed: {0}")]
    SealFailed(String),
    /// A stored (leaf, path) pair did not fold to the batch's recorded root.
    #[error("merkle proof invalid for leaf {0}")]
    InvalidMerkleProof(String),
}

impl ErrorCode for BatchError {
    fn code(&self) -> &'static str {
        match self {
            Self::AnchorReverted(_) => "BATCH_ANCHOR_REVERTED",
            Self::SealFailed(_) => "BATCH_SEAL_FAILED",
            Self::InvalidMerkleProof(_) => "BATCH_INVALID_MERKLE_PROOF",
        }
    }
}

impl BatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AnchorReverted(_) => ErrorKind::Integrity,
            Self::SealFailed(_) => ErrorKind::Malformed,
            Self::InvalidMerkleProof(_) => ErrorKind::Integrity,
        }
    }
}

/// Errors from `ProofCycleOrchestrator`.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A cycle with this `intent_id:tx_hash` key is already active.
    #[error("cycle already active for {0}")]
    CycleAlreadyActive(String),
    /// No active cycle matches the given key.
    #[error("unknown cycle: {0}")]
    UnknownCycle(String),
    /// Observation of the mandatory create-step transaction failed.
    #[error("phase 7 (observation) failed: {0}")]
    Phase7Failed(String),
    /// Commitment verification or attestation failed.
    #[error("phase 8 (attestation) failed: {0}")]
    Phase8Failed(String),
    /// Write-back construction or submission failed.
    #[error("phase 9 (write-back) failed: {0}")]
    Phase9Failed(String),
}

impl ErrorCode for OrchestratorError {
    fn code(&self) -> &'static str {
        match self {
            Self::CycleAlreadyActive(_) => "ORCHESTRATOR_CYCLE_ALREADY_ACTIVE",
            Self::UnknownCycle(_) => "ORCHESTRATOR_UNKNOWN_CYCLE",
            Self::Phase7Failed(_) => "ORCHESTRATOR_PHASE7_FAILED",
            Self::Phase8Failed(_) => "ORCHESTRATOR_PHASE8_FAILED",
            Self::Phase9Failed(_) => "ORCHESTRATOR_PHASE9_FAILED",
        }
    }
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CycleAlreadyActive(_) => ErrorKind::Policy,
            Self::UnknownCycle(_) => ErrorKind::Malformed,
            Self::Phase7Failed(_) | Self::Phase8Failed(_) | Self::Phase9Failed(_) => {
                ErrorKind::Integrity
            }
        }
    }
}

/// Errors from cryptographic primitives (hashing, BLS, Ed25519, Merkle folding).
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("invalid hash length: expected {expected}, got {got}")]
    InvalidHashLength { expected: usize, got: usize },
    #[error("cryptographic operation failed: {0}")]
    OperationFailed(String),
    #[error("root hash mismatch")]
    RootMismatch,
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::VerificationFailed => "CRYPTO_VERIFICATION_FAILED",
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
            Self::InvalidSignature(_) => "CRYPTO_INVALID_SIGNATURE",
            Self::InvalidHashLength { .. } => "CRYPTO_INVALID_HASH_LENGTH",
            Self::OperationFailed(_) => "CRYPTO_OPERATION_FAILED",
            Self::RootMismatch => "CRYPTO_ROOT_MISMATCH",
        }
    }
}

impl From<dcrypt::Error> for CryptoError {
    fn from(e: dcrypt::Error) -> Self {
        CryptoError::OperationFailed(e.to_string())
    }
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Integrity
    }
}

/// Errors from the external collaborator clients (`LedgerClient`, `EvmClient`,
/// `ArtifactSink` — §4.10). Call sites in `certen-core` translate these into
/// the stage-specific error they're encountered from (`DiscoveryError`,
/// `ObservationError`, `WriteBackError`).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP transport returned an error, or the server returned 5xx/429
    /// past the retry budget.
    #[error("transport error calling {endpoint}: {source}")]
    Transport { endpoint: String, source: String },
    /// The response body could not be decoded into the expected shape.
    #[error("decode error from {endpoint}: {source}")]
    Decode { endpoint: String, source: String },
    /// The server responded success but the queried resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The call did not complete before its deadline.
    #[error("client call timed out: {0}")]
    Timeout(String),
}

impl ErrorCode for ClientError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "CLIENT_TRANSPORT_ERROR",
            Self::Decode { .. } => "CLIENT_DECODE_ERROR",
            Self::NotFound(_) => "CLIENT_NOT_FOUND",
            Self::Timeout(_) => "CLIENT_TIMEOUT",
        }
    }
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } | Self::Timeout(_) => ErrorKind::Transient,
            Self::Decode { .. } | Self::NotFound(_) => ErrorKind::Malformed,
        }
    }
}

/// Aggregate error type for code that must return a single error across stage
/// boundaries (the orchestrator's public API, the node binary).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Commitment(#[from] CommitmentError),
    #[error(transparent)]
    Observation(#[from] ObservationError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Attestation(#[from] AttestationError),
    #[error(transparent)]
    WriteBack(#[from] WriteBackError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl ErrorCode for CoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::Commitment(e) => e.code(),
            Self::Observation(e) => e.code(),
            Self::Verification(e) => e.code(),
            Self::Attestation(e) => e.code(),
            Self::WriteBack(e) => e.code(),
            Self::Discovery(e) => e.code(),
            Self::Batch(e) => e.code(),
            Self::Orchestrator(e) => e.code(),
            Self::Crypto(e) => e.code(),
            Self::Client(e) => e.code(),
            Self::Storage(_) => "CORE_STORAGE_ERROR",
            Self::Config(_) => "CORE_CONFIG_ERROR",
        }
    }
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Commitment(e) => e.kind(),
            Self::Observation(e) => e.kind(),
            Self::Verification(e) => e.kind(),
            Self::Attestation(e) => e.kind(),
            Self::WriteBack(e) => e.kind(),
            Self::Discovery(e) => e.kind(),
            Self::Batch(e) => e.kind(),
            Self::Orchestrator(e) => e.kind(),
            Self::Crypto(e) => e.kind(),
            Self::Client(e) => e.kind(),
            Self::Storage(_) | Self::Config(_) => ErrorKind::Integrity,
        }
    }
}
