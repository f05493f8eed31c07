//! Canonical data types shared across the capture, store, verify and compare stages.
//!
//! The serialized shape of [`ProofRecord`] is an interop boundary with external
//! tooling: field order and encodings are fixed so two record files produced by
//! different tool versions diff cleanly.
//!
//! ## Compatibility
//! - Do **not** add `#[serde(deny_unknown_fields)]`; newer producers may add fields.
//! - Unknown proof object tags decode as [`ObjectKind::Unknown`].
//! - The record id is *derived* (see [`RecordId::derive`]) and never stored.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of 64-bit words in a block commitment or nonce.
pub const DIGEST_WORDS: usize = 5;

/// Fixed-width digest (opaque to the pipeline).
pub type Digest = [u64; DIGEST_WORDS];

/// Inputs that fully determine the proving engine's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProveInput {
    /// Computation size/complexity knob.
    pub length: u64,
    /// Block commitment digest.
    pub block_commitment: Digest,
    /// Nonce digest.
    pub nonce: Digest,
}

impl ProveInput {
    /// Construct a new input triple.
    #[inline]
    #[must_use]
    pub const fn new(length: u64, block_commitment: Digest, nonce: Digest) -> Self {
        Self {
            length,
            block_commitment,
            nonce,
        }
    }

    /// Canonical little-endian encoding: `length || commitment words || nonce words`.
    ///
    /// This is the byte string a `puzzle` proof object must carry to be bound
    /// to this input.
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 * (1 + 2 * DIGEST_WORDS));
        out.extend_from_slice(&self.length.to_le_bytes());
        for w in self.block_commitment.iter().chain(self.nonce.iter()) {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }
}

impl Default for ProveInput {
    /// The small fixed input used for regression runs: `length = 2`, all-ones digests.
    fn default() -> Self {
        Self::new(2, [1; DIGEST_WORDS], [1; DIGEST_WORDS])
    }
}

/// Tag of a proof object.
///
/// Marked `#[non_exhaustive]`; unknown serialized tags decode as
/// [`ObjectKind::Unknown`] so older tools can still load newer records.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectKind {
    /// Binds the proof to `(length, commitment, nonce)`.
    Puzzle,
    /// Merkle root of a committed table.
    #[serde(rename = "m-root")]
    MerkleRoot,
    /// Composition polynomial commitment.
    #[serde(rename = "comp-m")]
    CompositionMerkle,
    /// Table heights.
    Heights,
    /// FRI codeword.
    Codeword,
    /// Composition terms.
    Terms,
    /// Single Merkle authentication path.
    #[serde(rename = "m-path")]
    MerklePath,
    /// Base-field Merkle path.
    #[serde(rename = "m-pathbf")]
    MerklePathBf,
    /// Bundled Merkle paths.
    #[serde(rename = "m-paths")]
    MerklePaths,
    /// Out-of-domain evaluations.
    Evals,
    /// Final FRI polynomial.
    Poly,
    /// Catch-all for tags this version does not know.
    #[serde(other)]
    Unknown,
}

impl ObjectKind {
    /// Wire tag, identical to the serialized form.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Puzzle => "puzzle",
            Self::MerkleRoot => "m-root",
            Self::CompositionMerkle => "comp-m",
            Self::Heights => "heights",
            Self::Codeword => "codeword",
            Self::Terms => "terms",
            Self::MerklePath => "m-path",
            Self::MerklePathBf => "m-pathbf",
            Self::MerklePaths => "m-paths",
            Self::Evals => "evals",
            Self::Poly => "poly",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One opaque, typed element of a proof.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProofObject {
    /// Object tag.
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    /// Engine-defined payload, hex encoded on the wire.
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
}

impl ProofObject {
    /// Construct a new proof object.
    #[inline]
    #[must_use]
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }
}

/// Identity key of a record: `<label>-<YYYYMMDDTHHMMSS.ffffffZ>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Derive the id from a source label and a creation timestamp.
    ///
    /// Characters outside `[A-Za-z0-9._]` are replaced by `_`; an empty label
    /// becomes `unlabeled`. Sub-microsecond precision is ignored.
    #[must_use]
    pub fn derive(source_label: &str, timestamp: &DateTime<Utc>) -> Self {
        let mut label: String = source_label
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if label.is_empty() {
            label.push_str("unlabeled");
        }
        Self(format!("{label}-{}", timestamp.format("%Y%m%dT%H%M%S%.6fZ")))
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RecordId {
    type Err = Error;

    /// Accepts ids made of `[A-Za-z0-9._-]` that cannot escape a directory.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ok = !s.is_empty()
            && !s.starts_with('.')
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if ok {
            Ok(Self(s.to_owned()))
        } else {
            Err(Error::InvalidRecordId(s.to_owned()))
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store partition a record is written into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    /// The single trusted reference record.
    Baseline,
    /// Unbounded, insertion-ordered candidate history.
    History,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Baseline => "baseline",
            Self::History => "history",
        })
    }
}

/// Immutable evidence bundle from one proving run.
///
/// Field order is the on-disk order; keep it stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofRecord {
    /// Inputs the engine was driven with.
    pub input: ProveInput,
    /// Wall-clock seconds spent inside the proving call.
    pub duration_secs: f64,
    /// Engine-computed digest over `proof_objects` (hex).
    pub proof_hash: String,
    /// Creation time, microsecond precision.
    #[serde(with = "rfc3339_micros")]
    pub timestamp: DateTime<Utc>,
    /// Name of the scenario that produced the record.
    pub test_name: String,
    /// Provenance label (code variant / branch).
    pub source_branch: String,
    /// Ordered proof elements.
    pub proof_objects: Vec<ProofObject>,
}

impl ProofRecord {
    /// Identity key derived from `source_branch` and `timestamp`.
    #[must_use]
    pub fn record_id(&self) -> RecordId {
        RecordId::derive(&self.source_branch, &self.timestamp)
    }

    /// Number of proof objects.
    #[inline]
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.proof_objects.len()
    }

    /// Number of proof objects with the given tag.
    #[must_use]
    pub fn count_of(&self, kind: ObjectKind) -> usize {
        self.proof_objects.iter().filter(|o| o.kind == kind).count()
    }
}

/// RFC 3339 with a fixed microsecond fraction and a `Z` suffix, so the text
/// form does not depend on the chrono version that wrote it.
pub(crate) mod rfc3339_micros {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(de::Error::custom)
    }
}
