// crates/starkguard-sim/src/lib.rs

//! Deterministic reference proving engine for starkguard.
//!
//! Stands in for an external STARK prover: it produces a proof-shaped object
//! list (puzzle, Merkle roots, codewords, authentication paths, transcript
//! challenges) from a BLAKE3 Fiat–Shamir transcript, verifies it by replay,
//! and knows its own layout for structural pre-checks.
//!
//! ⚠️ Not a proof system. It only exercises the pipeline end to end.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]

/// Reference engine, oracle and layout.
pub mod engine;
/// BLAKE3 Merkle tree.
pub mod merkle;
/// Fiat–Shamir transcript.
pub mod transcript;

pub use engine::{proof_digest, SimConfig, SimEngine, COLUMNS, MAX_LENGTH};
