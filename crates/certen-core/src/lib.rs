#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! The cross-chain proof cycle (spec.md §2, §4): ten components, each
//! grounded in one pipeline stage, composed bottom-up from the leaves
//! (`CommitmentBuilder`) to the root (`ProofCycleOrchestrator`). Every
//! component here depends only on the traits in `certen_client` and
//! `certen_storage`, never on a concrete transport.

pub mod attestation;
pub mod batch;
pub mod chained_proof;
pub mod commitment;
pub mod discovery;
pub mod observer;
pub mod orchestrator;
pub mod verify;
pub mod writeback;

pub use attestation::{AttestationCollector, ValidatorInfo, ValidatorSet};
pub use batch::{BatchAnchorPipeline, BatchConfig};
pub use chained_proof::{route_to_partition, ChainedProofGenerator};
pub use commitment::{verify_commitment, CommitmentBuilder, StepMatch};
pub use discovery::{IntentDiscovery, ScanRange};
pub use observer::{ExternalChainObserver, ObservationContext};
pub use orchestrator::ProofCycleOrchestrator;
pub use verify::ResultVerifier;
pub use writeback::{NonceTracker, SyntheticTxBuilder, WriteBackSubmitter};
