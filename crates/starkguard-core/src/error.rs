//! Error taxonomy for the capture → persist → verify → compare pipeline.
//!
//! Nothing in this crate retries: every variant aborts the current run and is
//! surfaced to the caller with its context.

use crate::engine::{OracleFailure, ProvingFailure};
use crate::types::{ProofRecord, RecordId, Slot};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the pipeline and its stages.
#[derive(Error, Debug)]
pub enum Error {
    /// The proving engine did not produce a proof.
    #[error("proof generation failed: {0}")]
    ProofGeneration(#[from] ProvingFailure),

    /// A record with this id already exists in the slot.
    #[error("record {record_id} already exists in {slot}")]
    DuplicateRecord {
        /// Colliding id.
        record_id: RecordId,
        /// Slot written to.
        slot: Slot,
    },

    /// No record with this id is stored.
    #[error("record {0} not found")]
    NotFound(RecordId),

    /// The slot holds no records.
    #[error("{0} slot is empty")]
    EmptyStore(Slot),

    /// A cheap structural pre-check rejected the record before the oracle ran.
    #[error("structural mismatch in record {record_id}: {detail}")]
    StructuralMismatch {
        /// Record that failed.
        record_id: RecordId,
        /// Human-readable cause.
        detail: String,
    },

    /// The oracle ran to completion and judged the proof invalid.
    #[error("proof in record {0} rejected by the verification oracle")]
    ProofRejected(RecordId),

    /// The oracle could not complete (distinct from an invalid judgment).
    #[error("verification oracle unavailable for record {record_id}")]
    OracleUnavailable {
        /// Record being verified.
        record_id: RecordId,
        /// Failure reported by the oracle.
        #[source]
        source: OracleFailure,
    },

    /// A proof was generated but could not be persisted; the payload is attached.
    #[error("proof for record {} generated but not persisted", .record.record_id())]
    PersistFailed {
        /// Full record, so no computation is lost.
        record: Box<ProofRecord>,
        /// Underlying store error.
        #[source]
        source: Box<Error>,
    },

    /// Baseline and candidate were proved on different inputs.
    #[error("records {baseline} and {candidate} were proved on different inputs")]
    InputMismatch {
        /// Baseline id.
        baseline: RecordId,
        /// Candidate id.
        candidate: RecordId,
    },

    /// A candidate run asked for an input other than the baseline's.
    #[error("requested input differs from the input of baseline {baseline}")]
    CandidateInputMismatch {
        /// Current baseline id.
        baseline: RecordId,
    },

    /// A string is not a well-formed record id.
    #[error("invalid record id {0:?}")]
    InvalidRecordId(String),

    /// A stored file exists but does not hold what its name says.
    #[error("corrupt record file {}: {reason}", .path.display())]
    Corrupt {
        /// Offending file.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },

    /// Invalid configuration value or file.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Filesystem error with the path it happened on.
    #[error("I/O error on {}", .path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization error.
    #[error("JSON error on {}", .path.display())]
    Json {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Attach a path to an I/O error.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach a path to a JSON error.
    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// The record payload carried by a [`Error::PersistFailed`], if any.
    #[must_use]
    pub fn unpersisted_record(&self) -> Option<&ProofRecord> {
        match self {
            Self::PersistFailed { record, .. } => Some(record),
            _ => None,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
