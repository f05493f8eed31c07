//! Replay a stored record through the verification oracle.
//!
//! Cheap structural checks run first: cardinality, required substructure,
//! input binding and (when the engine can recompute it) the proof hash. Any
//! failure there short-circuits with `is_valid = false` and the oracle is
//! never called. An oracle that cannot finish is an error, never a `false`.

use crate::engine::{ProofLayout, VerificationOracle};
use crate::error::{Error, Result};
use crate::types::{rfc3339_micros, ObjectKind, ProofRecord, RecordId};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

/// Why a record was judged invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorDetail {
    /// Wrong number of proof objects for the input's `length`.
    CardinalityMismatch {
        /// Count the layout demands.
        expected: usize,
        /// Count found in the record.
        found: usize,
    },
    /// A required object kind is absent or under-represented.
    MissingObject {
        /// Object tag.
        object: ObjectKind,
        /// Minimum required.
        required: usize,
        /// Count found.
        found: usize,
    },
    /// The `puzzle` object does not encode the record's input.
    InputBindingMismatch,
    /// `proof_hash` does not match the hash recomputed from the objects.
    HashMismatch {
        /// Hash stored in the record.
        recorded: String,
        /// Hash recomputed by the engine.
        recomputed: String,
    },
    /// Structure was fine; the oracle judged the proof invalid.
    OracleRejected,
}

impl ErrorDetail {
    /// Whether the failure came from a structural pre-check.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        !matches!(self, Self::OracleRejected)
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CardinalityMismatch { expected, found } => {
                write!(f, "cardinality mismatch: expected {expected} proof objects, found {found}")
            }
            Self::MissingObject {
                object,
                required,
                found,
            } => write!(f, "missing {object} objects: need at least {required}, found {found}"),
            Self::InputBindingMismatch => f.write_str("puzzle object does not bind the record input"),
            Self::HashMismatch {
                recorded,
                recomputed,
            } => write!(f, "proof hash mismatch: recorded {recorded}, recomputed {recomputed}"),
            Self::OracleRejected => f.write_str("verification oracle rejected the proof"),
        }
    }
}

/// Outcome of verifying one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Record that was verified.
    pub record_id: RecordId,
    /// Oracle judgment (or `false` after a failed pre-check).
    pub is_valid: bool,
    /// Seconds spent verifying.
    pub duration_secs: f64,
    /// Explanation when `is_valid` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
    /// Number of proof objects examined.
    pub object_count: usize,
    /// Hash stored in the verified record.
    pub proof_hash: String,
    /// When verification finished.
    #[serde(with = "rfc3339_micros")]
    pub timestamp: DateTime<Utc>,
}

impl VerificationResult {
    /// Turn an invalid result into the matching pipeline error.
    ///
    /// # Errors
    /// [`Error::StructuralMismatch`] for pre-check failures,
    /// [`Error::ProofRejected`] for an oracle rejection.
    pub fn ensure_valid(&self) -> Result<()> {
        match (&self.error_detail, self.is_valid) {
            (None, true) => Ok(()),
            (Some(d), _) if d.is_structural() => Err(Error::StructuralMismatch {
                record_id: self.record_id.clone(),
                detail: d.to_string(),
            }),
            _ => Err(Error::ProofRejected(self.record_id.clone())),
        }
    }
}

/// Structural pre-checks plus oracle invocation.
pub struct VerificationRunner<'a> {
    oracle: &'a dyn VerificationOracle,
    layout: &'a dyn ProofLayout,
}

impl<'a> VerificationRunner<'a> {
    /// Runner over an oracle and the engine's layout knowledge.
    pub fn new(oracle: &'a dyn VerificationOracle, layout: &'a dyn ProofLayout) -> Self {
        Self { oracle, layout }
    }

    /// Run only the cheap checks. `None` means the record looks well formed.
    #[must_use]
    pub fn structural_check(&self, record: &ProofRecord) -> Option<ErrorDetail> {
        let layout = self.layout.expected_layout(&record.input);

        if record.object_count() != layout.object_count {
            return Some(ErrorDetail::CardinalityMismatch {
                expected: layout.object_count,
                found: record.object_count(),
            });
        }

        for (&object, &required) in &layout.required {
            let found = record.count_of(object);
            if found < required {
                return Some(ErrorDetail::MissingObject {
                    object,
                    required,
                    found,
                });
            }
        }

        if layout.binds_input {
            let puzzle = record
                .proof_objects
                .iter()
                .find(|o| o.kind == ObjectKind::Puzzle);
            match puzzle {
                Some(p) if p.data == record.input.to_le_bytes() => {}
                _ => return Some(ErrorDetail::InputBindingMismatch),
            }
        }

        if let Some(recomputed) = self.layout.digest(&record.proof_objects) {
            if recomputed != record.proof_hash {
                return Some(ErrorDetail::HashMismatch {
                    recorded: record.proof_hash.clone(),
                    recomputed,
                });
            }
        }

        None
    }

    /// Verify `record`: pre-checks, then exactly one oracle call.
    ///
    /// # Errors
    /// [`Error::OracleUnavailable`] when the oracle could not reach a judgment.
    pub fn verify(&self, record: &ProofRecord) -> Result<VerificationResult> {
        let record_id = record.record_id();
        let started = Instant::now();

        let detail = match self.structural_check(record) {
            Some(detail) => Some(detail),
            None => match self.oracle.verify(&record.input, &record.proof_objects) {
                Ok(true) => None,
                Ok(false) => Some(ErrorDetail::OracleRejected),
                Err(source) => {
                    warn!(record_id = %record_id, diagnostic = %source.diagnostic, "oracle unavailable");
                    return Err(Error::OracleUnavailable { record_id, source });
                }
            },
        };

        let result = VerificationResult {
            record_id,
            is_valid: detail.is_none(),
            duration_secs: started.elapsed().as_secs_f64(),
            error_detail: detail,
            object_count: record.object_count(),
            proof_hash: record.proof_hash.clone(),
            timestamp: Utc::now().trunc_subsecs(6),
        };

        match &result.error_detail {
            None => info!(record_id = %result.record_id, duration_secs = result.duration_secs, "proof valid"),
            Some(d) => warn!(record_id = %result.record_id, detail = %d, "proof invalid"),
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ExpectedLayout, OracleFailure};
    use crate::types::{ProofObject, ProveInput};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Layout: puzzle + `length` m-roots; digest = concatenated hex of payloads.
    struct ToyLayout;

    impl ProofLayout for ToyLayout {
        fn expected_layout(&self, input: &ProveInput) -> ExpectedLayout {
            let n = usize::try_from(input.length).unwrap_or(usize::MAX);
            ExpectedLayout::with_count(1 + n)
                .require(ObjectKind::MerkleRoot, n)
                .binding_input()
        }

        fn digest(&self, objects: &[ProofObject]) -> Option<String> {
            Some(objects.iter().map(|o| hex::encode(&o.data)).collect())
        }
    }

    struct CountingOracle {
        calls: AtomicUsize,
        answer: std::result::Result<bool, OracleFailure>,
    }

    impl CountingOracle {
        fn answering(answer: std::result::Result<bool, OracleFailure>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                answer,
            }
        }
    }

    impl VerificationOracle for CountingOracle {
        fn verify(
            &self,
            _input: &ProveInput,
            _objects: &[ProofObject],
        ) -> std::result::Result<bool, OracleFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn good_record() -> ProofRecord {
        let input = ProveInput::default();
        let objects = vec![
            ProofObject::new(ObjectKind::Puzzle, input.to_le_bytes()),
            ProofObject::new(ObjectKind::MerkleRoot, vec![1; 4]),
            ProofObject::new(ObjectKind::MerkleRoot, vec![2; 4]),
        ];
        ProofRecord {
            input,
            duration_secs: 135.0,
            proof_hash: ToyLayout.digest(&objects).unwrap(),
            timestamp: Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap(),
            test_name: "verify".into(),
            source_branch: "master".into(),
            proof_objects: objects,
        }
    }

    #[test]
    fn valid_record_passes_and_calls_oracle_once() {
        let oracle = CountingOracle::answering(Ok(true));
        let res = VerificationRunner::new(&oracle, &ToyLayout).verify(&good_record()).unwrap();
        assert!(res.is_valid);
        assert!(res.error_detail.is_none());
        assert_eq!(res.object_count, 3);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        res.ensure_valid().unwrap();
    }

    #[test]
    fn missing_object_fails_cardinality_without_oracle() {
        let oracle = CountingOracle::answering(Ok(true));
        let mut rec = good_record();
        rec.proof_objects.pop();
        let res = VerificationRunner::new(&oracle, &ToyLayout).verify(&rec).unwrap();
        assert!(!res.is_valid);
        assert_eq!(
            res.error_detail,
            Some(ErrorDetail::CardinalityMismatch { expected: 3, found: 2 })
        );
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(res.ensure_valid(), Err(Error::StructuralMismatch { .. })));
        assert!(res.error_detail.unwrap().to_string().contains("cardinality"));
    }

    #[test]
    fn swapped_kind_is_missing_substructure() {
        let oracle = CountingOracle::answering(Ok(true));
        let mut rec = good_record();
        rec.proof_objects[2].kind = ObjectKind::Heights;
        let res = VerificationRunner::new(&oracle, &ToyLayout).verify(&rec).unwrap();
        assert_eq!(
            res.error_detail,
            Some(ErrorDetail::MissingObject {
                object: ObjectKind::MerkleRoot,
                required: 2,
                found: 1
            })
        );
    }

    #[test]
    fn every_single_object_mutation_is_detected() {
        let oracle = CountingOracle::answering(Ok(true));
        let runner = VerificationRunner::new(&oracle, &ToyLayout);
        for i in 0..good_record().object_count() {
            let mut rec = good_record();
            rec.proof_objects[i].data[0] ^= 0x01;
            let res = runner.verify(&rec).unwrap();
            assert!(!res.is_valid, "mutation of object {i} went unnoticed");
        }
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn oracle_rejection_is_not_structural() {
        let oracle = CountingOracle::answering(Ok(false));
        let res = VerificationRunner::new(&oracle, &ToyLayout).verify(&good_record()).unwrap();
        assert_eq!(res.error_detail, Some(ErrorDetail::OracleRejected));
        assert!(matches!(res.ensure_valid(), Err(Error::ProofRejected(_))));
    }

    #[test]
    fn oracle_failure_is_an_error_not_invalid() {
        let oracle = CountingOracle::answering(Err(OracleFailure::new("verifier kernel crashed")));
        let err = VerificationRunner::new(&oracle, &ToyLayout)
            .verify(&good_record())
            .unwrap_err();
        assert!(matches!(err, Error::OracleUnavailable { .. }));
    }

    #[test]
    fn error_detail_is_tagged_json() {
        let v = serde_json::to_value(ErrorDetail::CardinalityMismatch { expected: 9, found: 8 }).unwrap();
        assert_eq!(v, serde_json::json!({"kind": "cardinality_mismatch", "expected": 9, "found": 8}));
    }
}
