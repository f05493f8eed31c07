//! Baseline vs candidate comparison.
//!
//! Pure and side-effect free. Correctness dominates: any proof hash
//! difference yields [`Verdict::HashMismatch`] whatever the timings say.

use crate::error::{Error, Result};
use crate::types::{ProofRecord, RecordId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default relative-change threshold, in percent.
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 1.0;

/// Comparison outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Same proof, faster by at least the threshold.
    Improved,
    /// Same proof, slower by at least the threshold.
    Regressed,
    /// Same proof, timing within the threshold.
    Unchanged,
    /// The proof itself changed.
    HashMismatch,
}

impl Verdict {
    /// Whether the verdict should fail a strict CI gate.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Regressed | Self::HashMismatch)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Improved => "IMPROVED",
            Self::Regressed => "REGRESSED",
            Self::Unchanged => "UNCHANGED",
            Self::HashMismatch => "HASH_MISMATCH",
        })
    }
}

/// Result of comparing a candidate against a baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Baseline record.
    pub baseline_id: RecordId,
    /// Candidate record.
    pub candidate_id: RecordId,
    /// Byte-exact proof hash equality.
    pub hashes_equal: bool,
    /// `candidate - baseline`, seconds.
    pub duration_delta_secs: f64,
    /// `delta / baseline * 100`.
    pub duration_delta_percent: f64,
    /// Classification.
    pub verdict: Verdict,
    /// Baseline proving time.
    pub baseline_duration_secs: f64,
    /// Candidate proving time.
    pub candidate_duration_secs: f64,
    /// Threshold the verdict was computed with.
    pub threshold_percent: f64,
    /// Baseline object count.
    pub baseline_objects: usize,
    /// Candidate object count.
    pub candidate_objects: usize,
    /// First proof object index where the two records differ.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_divergence: Option<usize>,
}

/// Stateless comparator parameterized by the verdict threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparator {
    threshold_percent: f64,
}

impl Default for Comparator {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
        }
    }
}

impl Comparator {
    /// Comparator with a custom threshold.
    ///
    /// # Errors
    /// [`Error::Config`] unless `threshold_percent` is finite and positive.
    pub fn new(threshold_percent: f64) -> Result<Self> {
        if !threshold_percent.is_finite() || threshold_percent <= 0.0 {
            return Err(Error::Config(format!(
                "threshold_percent must be a positive number, got {threshold_percent}"
            )));
        }
        Ok(Self { threshold_percent })
    }

    /// Compare `candidate` against `baseline`.
    #[must_use]
    pub fn compare(&self, baseline: &ProofRecord, candidate: &ProofRecord) -> ComparisonReport {
        let hashes_equal = baseline.proof_hash == candidate.proof_hash;
        let delta = candidate.duration_secs - baseline.duration_secs;
        let percent = percent_change(baseline.duration_secs, delta);

        let verdict = if !hashes_equal {
            Verdict::HashMismatch
        } else {
            self.classify(percent)
        };

        ComparisonReport {
            baseline_id: baseline.record_id(),
            candidate_id: candidate.record_id(),
            hashes_equal,
            duration_delta_secs: delta,
            duration_delta_percent: percent,
            verdict,
            baseline_duration_secs: baseline.duration_secs,
            candidate_duration_secs: candidate.duration_secs,
            threshold_percent: self.threshold_percent,
            baseline_objects: baseline.object_count(),
            candidate_objects: candidate.object_count(),
            first_divergence: first_divergence(baseline, candidate),
        }
    }

    /// Non-finite percentages classify as a regression.
    fn classify(&self, percent: f64) -> Verdict {
        let eps = self.threshold_percent;
        if percent.abs() < eps {
            Verdict::Unchanged
        } else if percent <= -eps {
            Verdict::Improved
        } else {
            Verdict::Regressed
        }
    }
}

/// Relative change in percent. A zero baseline yields `0` for no change and
/// `±100` otherwise, keeping the report finite and JSON-representable.
fn percent_change(baseline_secs: f64, delta: f64) -> f64 {
    if baseline_secs > 0.0 {
        delta / baseline_secs * 100.0
    } else if delta == 0.0 {
        0.0
    } else {
        100.0_f64.copysign(delta)
    }
}

fn first_divergence(a: &ProofRecord, b: &ProofRecord) -> Option<usize> {
    let common = a.proof_objects.len().min(b.proof_objects.len());
    (0..common)
        .find(|&i| a.proof_objects[i] != b.proof_objects[i])
        .or_else(|| (a.proof_objects.len() != b.proof_objects.len()).then_some(common))
}
