#![forbid(unsafe_code)]

//! Core data structures and error taxonomy for the Certen proof-cycle validator.
//!
//! This crate has minimal dependencies and is a dependency of almost every
//! other crate in the workspace. It defines the wire-level data model
//! (`Intent`, `ExecutionCommitment`, `ExternalChainResult`, ...), the error
//! enums each component raises, and nothing else — no I/O, no async.

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::CoreError> = std::result::Result<T, E>;

/// The error taxonomy shared by every component (§7 Error Handling Design).
pub mod error;
/// The data model (§3).
pub mod model;

pub use error::{CoreError, ErrorCode, ErrorKind};
pub use model::*;
