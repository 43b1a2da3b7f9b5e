#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! Persistence row shapes and the `ArtifactSink` trait (spec.md §6
//! "Persistence layer"). This crate owns no migrations or connection pool;
//! it defines what the core writes, and the one trait it writes through.

pub mod rows;
pub mod sink;

pub use rows::*;
pub use sink::{ArtifactSink, InMemoryArtifactSink, StorageError};
