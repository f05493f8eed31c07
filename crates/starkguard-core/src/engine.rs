//! Capability traits for the external proving engine and verification oracle.
//!
//! The pipeline never looks inside either collaborator. Implementors provide a
//! narrow, deterministic API and the rest of the system depends only on these
//! traits, so a fake returning canned outputs can stand in for a real prover.
//!
//! ## Contracts implementors should uphold
//! - `prove` must be a pure function of its [`ProveInput`]: no hidden state.
//! - `verify` returns `Ok(false)` for a proof it *judged* invalid and `Err`
//!   only when it could not reach a judgment.
//! - Neither function should panic for malformed inputs.

use crate::types::{ObjectKind, ProofObject, ProveInput};
use std::collections::BTreeMap;
use thiserror::Error;

/// Output of a successful proving call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofOutput {
    /// Ordered proof elements.
    pub objects: Vec<ProofObject>,
    /// Engine digest over `objects` (hex).
    pub proof_hash: String,
}

/// Non-success outcome of the proving engine, surfaced unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("proving engine failure: {diagnostic}")]
pub struct ProvingFailure {
    /// Engine diagnostic.
    pub diagnostic: String,
}

impl ProvingFailure {
    /// Wrap an engine diagnostic.
    pub fn new(diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostic: diagnostic.into(),
        }
    }
}

/// The oracle could not complete a verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("verification oracle failure: {diagnostic}")]
pub struct OracleFailure {
    /// Oracle diagnostic.
    pub diagnostic: String,
}

impl OracleFailure {
    /// Wrap an oracle diagnostic.
    pub fn new(diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostic: diagnostic.into(),
        }
    }
}

/// Deterministic proof producer.
pub trait ProvingEngine: Send + Sync {
    /// Produce a proof for `input`. Blocking; may run for a long time.
    ///
    /// # Errors
    /// Returns [`ProvingFailure`] carrying the engine's diagnostic.
    fn prove(&self, input: &ProveInput) -> Result<ProofOutput, ProvingFailure>;
}

/// Cryptographic validity judge.
pub trait VerificationOracle: Send + Sync {
    /// Judge `objects` as a proof for `input`.
    ///
    /// # Errors
    /// Returns [`OracleFailure`] when no judgment could be reached.
    fn verify(&self, input: &ProveInput, objects: &[ProofObject]) -> Result<bool, OracleFailure>;
}

/// Engine-specific knowledge of what a well-formed proof looks like.
///
/// Used for cheap structural checks ahead of the (expensive) oracle.
pub trait ProofLayout: Send + Sync {
    /// Shape a proof for `input` must have.
    fn expected_layout(&self, input: &ProveInput) -> ExpectedLayout;

    /// Recompute the proof hash from `objects`, if that is cheap for this engine.
    fn digest(&self, _objects: &[ProofObject]) -> Option<String> {
        None
    }
}

/// Expected cardinality and required substructure of a proof.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpectedLayout {
    /// Exact number of proof objects.
    pub object_count: usize,
    /// Minimum number of objects per tag that must be present.
    pub required: BTreeMap<ObjectKind, usize>,
    /// Whether the first `puzzle` object must encode the input bytes.
    pub binds_input: bool,
}

impl ExpectedLayout {
    /// Layout with an exact object count and no substructure requirements.
    #[must_use]
    pub fn with_count(object_count: usize) -> Self {
        Self {
            object_count,
            ..Self::default()
        }
    }

    /// Require at least `min` objects tagged `kind`.
    #[must_use]
    pub fn require(mut self, kind: ObjectKind, min: usize) -> Self {
        self.required.insert(kind, min);
        self
    }

    /// Require the `puzzle` object to carry the input encoding.
    #[must_use]
    pub fn binding_input(mut self) -> Self {
        self.binds_input = true;
        self.required.entry(ObjectKind::Puzzle).or_insert(1);
        self
    }
}
