//! starkguard-core — proof regression pipeline: capture, persist, verify, compare.
//!
//! This crate owns the engine-agnostic half of the system:
//! - canonical record types (`ProveInput`, `ProofObject`, `ProofRecord`, …),
//! - the capability traits a proving backend plugs in through,
//! - durable record stores (in-memory and filesystem),
//! - the verification runner, the comparator, and the pipeline that drives
//!   them in order.
//!
//! ```no_run
//! use starkguard_core::prelude::*;
//! # fn demo(engine: &dyn ProvingEngine, oracle: &dyn VerificationOracle, layout: &dyn ProofLayout)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let store = FsRecordStore::open(".starkguard")?;
//! let pipeline = Pipeline::new(engine, oracle, layout, &store);
//! pipeline.capture_baseline(&ProveInput::default(), "master")?;
//! let run = pipeline.capture_candidate(None, "feature/faster-fri")?;
//! if let Some(cmp) = run.comparison {
//!     println!("{}: {:+.2}%", cmp.verdict, cmp.duration_delta_percent);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::doc_markdown
)]

/// Record capture around one proving call.
pub mod capture;
/// Baseline/candidate comparison and verdicts.
pub mod compare;
/// `starkguard.toml` loading and validation.
pub mod config;
/// Capability traits implemented by proving backends.
pub mod engine;
/// Error taxonomy.
pub mod error;
/// Filesystem-backed record store.
pub mod fs_store;
/// JSON helpers.
pub mod io;
/// Run orchestration and batch verification.
pub mod pipeline;
/// Record store trait and in-memory implementation.
pub mod store;
/// Canonical data types.
pub mod types;
/// Verification runner and results.
pub mod verify;

pub use capture::CaptureRecorder;
pub use compare::{Comparator, ComparisonReport, Verdict};
pub use config::Config;
pub use engine::{
    ExpectedLayout, OracleFailure, ProofLayout, ProofOutput, ProvingEngine, ProvingFailure,
    VerificationOracle,
};
pub use error::{Error, Result};
pub use fs_store::FsRecordStore;
pub use pipeline::{BatchEntry, BatchSummary, Pipeline, RunFailure, RunReport, RunState};
pub use store::{MemoryRecordStore, RecordStore};
pub use types::{Digest, ObjectKind, ProofObject, ProofRecord, ProveInput, RecordId, Slot};
pub use verify::{ErrorDetail, VerificationResult, VerificationRunner};

/// Everything a backend or front-end usually needs.
pub mod prelude {
    pub use crate::{
        Comparator, ComparisonReport, Config, ErrorDetail, ExpectedLayout, FsRecordStore,
        MemoryRecordStore, ObjectKind, OracleFailure, Pipeline, ProofLayout, ProofObject,
        ProofOutput, ProofRecord, ProveInput, ProvingEngine, ProvingFailure, RecordId,
        RecordStore, RunFailure, RunReport, RunState, Slot, Verdict, VerificationOracle,
        VerificationResult,
    };
}
