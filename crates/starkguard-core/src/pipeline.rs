//! Pipeline orchestrator: capture → persist → verify → compare.
//!
//! Each run walks `IDLE → CAPTURING → PERSISTED → VERIFYING → COMPARING → DONE`
//! and ends either in `DONE` with a [`RunReport`] or in `ABORTED` with a
//! [`RunFailure`] naming the state it failed in. A step only starts after the
//! previous one succeeded; there is no partial comparison and no retry.

use crate::capture::CaptureRecorder;
use crate::compare::{Comparator, ComparisonReport};
use crate::engine::{ProofLayout, ProvingEngine, VerificationOracle};
use crate::error::{Error, Result};
use crate::store::RecordStore;
use crate::types::{ProofRecord, ProveInput, RecordId, Slot};
use crate::verify::{VerificationResult, VerificationRunner};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{error, info};

/// Default `test_name` stamped on captured records.
pub const DEFAULT_TEST_NAME: &str = "prove_block";

/// Per-run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Nothing started.
    Idle,
    /// Proving engine running.
    Capturing,
    /// Record durable in the store.
    Persisted,
    /// Verification runner running.
    Verifying,
    /// Comparator running.
    Comparing,
    /// Run completed.
    Done,
    /// Run failed; terminal.
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "IDLE",
            Self::Capturing => "CAPTURING",
            Self::Persisted => "PERSISTED",
            Self::Verifying => "VERIFYING",
            Self::Comparing => "COMPARING",
            Self::Done => "DONE",
            Self::Aborted => "ABORTED",
        })
    }
}

/// Successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Record captured by this run.
    pub record_id: RecordId,
    /// States visited, `IDLE` through `DONE`.
    pub states: Vec<RunState>,
    /// Verification of the captured record.
    pub verification: VerificationResult,
    /// Comparison against the baseline (candidate runs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ComparisonReport>,
}

/// Aborted run: the state it failed in and the originating error.
#[derive(Error, Debug)]
#[error("run aborted in state {state}")]
pub struct RunFailure {
    /// Last state entered before the failure.
    pub state: RunState,
    /// Originating error.
    #[source]
    pub error: Error,
}

/// One entry of a batch verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Record verified.
    pub record_id: RecordId,
    /// Result when verification completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<VerificationResult>,
    /// Error when it did not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of [`Pipeline::verify_all`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Records attempted.
    pub total: usize,
    /// Valid proofs.
    pub valid: usize,
    /// Completed verifications judged invalid.
    pub invalid: usize,
    /// Verifications that could not complete.
    pub errors: usize,
    /// Per-record outcomes, in history order.
    pub entries: Vec<BatchEntry>,
}

impl BatchSummary {
    fn from_entries(entries: Vec<BatchEntry>) -> Self {
        let valid = entries
            .iter()
            .filter(|e| e.result.as_ref().is_some_and(|r| r.is_valid))
            .count();
        let errors = entries.iter().filter(|e| e.result.is_none()).count();
        Self {
            total: entries.len(),
            valid,
            invalid: entries.len() - valid - errors,
            errors,
            entries,
        }
    }

    /// Whether every record verified as valid.
    #[must_use]
    pub fn all_valid(&self) -> bool {
        self.valid == self.total
    }
}

struct Run {
    states: Vec<RunState>,
}

impl Run {
    fn new() -> Self {
        Self {
            states: vec![RunState::Idle],
        }
    }

    fn current(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Idle)
    }

    fn enter(&mut self, state: RunState) {
        info!(from = %self.current(), to = %state, "pipeline transition");
        self.states.push(state);
    }

    fn abort(&mut self, error: Error) -> RunFailure {
        let state = self.current();
        self.states.push(RunState::Aborted);
        error!(%state, error = %error, "pipeline run aborted");
        RunFailure { state, error }
    }
}

/// Wires the engine, oracle, store and comparator together.
pub struct Pipeline<'a> {
    engine: &'a dyn ProvingEngine,
    oracle: &'a dyn VerificationOracle,
    layout: &'a dyn ProofLayout,
    store: &'a dyn RecordStore,
    comparator: Comparator,
    test_name: String,
}

impl<'a> Pipeline<'a> {
    /// Pipeline with the default comparator and test name.
    pub fn new(
        engine: &'a dyn ProvingEngine,
        oracle: &'a dyn VerificationOracle,
        layout: &'a dyn ProofLayout,
        store: &'a dyn RecordStore,
    ) -> Self {
        Self {
            engine,
            oracle,
            layout,
            store,
            comparator: Comparator::default(),
            test_name: DEFAULT_TEST_NAME.to_owned(),
        }
    }

    /// Use `comparator` for verdicts.
    #[must_use]
    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Stamp captured records with `test_name`.
    #[must_use]
    pub fn with_test_name(mut self, test_name: impl Into<String>) -> Self {
        self.test_name = test_name.into();
        self
    }

    fn recorder(&self) -> CaptureRecorder<'a> {
        CaptureRecorder::new(self.engine, self.store, self.test_name.clone())
    }

    fn runner(&self) -> VerificationRunner<'a> {
        VerificationRunner::new(self.oracle, self.layout)
    }

    fn verify_valid(&self, record: &ProofRecord) -> Result<VerificationResult> {
        let result = self.runner().verify(record)?;
        result.ensure_valid()?;
        Ok(result)
    }

    /// Capture a new trusted baseline: capture → persist (history) → verify →
    /// promote.
    ///
    /// The baseline pointer only moves once the proof has verified. An aborted
    /// run keeps its record in history for investigation and leaves the
    /// previous baseline in place.
    pub fn capture_baseline(
        &self,
        input: &ProveInput,
        source_label: &str,
    ) -> std::result::Result<RunReport, RunFailure> {
        let mut run = Run::new();

        run.enter(RunState::Capturing);
        let record = self
            .recorder()
            .capture(input, source_label)
            .map_err(|e| run.abort(e))?;
        let record_id = record.record_id();
        run.enter(RunState::Persisted);

        run.enter(RunState::Verifying);
        let verification = self.verify_valid(&record).map_err(|e| run.abort(e))?;
        self.store.promote(&record_id).map_err(|e| run.abort(e))?;
        info!(record_id = %record_id, "verified record promoted to baseline");

        run.enter(RunState::Done);
        Ok(RunReport {
            record_id,
            states: run.states,
            verification,
            comparison: None,
        })
    }

    /// Capture a candidate and judge it against the current baseline.
    ///
    /// `input` defaults to the baseline's input. The baseline is read once, up
    /// front, so a missing baseline or a different input aborts before any
    /// proving work.
    pub fn capture_candidate(
        &self,
        input: Option<&ProveInput>,
        source_label: &str,
    ) -> std::result::Result<RunReport, RunFailure> {
        let mut run = Run::new();
        let baseline = self.store.baseline().map_err(|e| run.abort(e))?;
        let input = match input {
            None => baseline.input,
            Some(i) if *i == baseline.input => *i,
            Some(_) => {
                return Err(run.abort(Error::CandidateInputMismatch {
                    baseline: baseline.record_id(),
                }))
            }
        };

        run.enter(RunState::Capturing);
        let record = self
            .recorder()
            .capture(&input, source_label)
            .map_err(|e| run.abort(e))?;
        run.enter(RunState::Persisted);

        run.enter(RunState::Verifying);
        let verification = self.verify_valid(&record).map_err(|e| run.abort(e))?;

        run.enter(RunState::Comparing);
        let comparison = self
            .compare_checked(&baseline, &record)
            .map_err(|e| run.abort(e))?;
        info!(
            baseline = %comparison.baseline_id,
            candidate = %comparison.candidate_id,
            verdict = %comparison.verdict,
            delta_percent = comparison.duration_delta_percent,
            "comparison finished"
        );

        run.enter(RunState::Done);
        Ok(RunReport {
            record_id: record.record_id(),
            states: run.states,
            verification,
            comparison: Some(comparison),
        })
    }

    /// Verify a stored record. An invalid proof is a result, not an error.
    ///
    /// # Errors
    /// [`Error::NotFound`] or [`Error::OracleUnavailable`].
    pub fn verify_record(&self, id: &RecordId) -> Result<VerificationResult> {
        let record = self.store.get(id)?;
        self.runner().verify(&record)
    }

    /// Compare two stored records.
    ///
    /// # Errors
    /// [`Error::NotFound`] or [`Error::InputMismatch`].
    pub fn compare_records(
        &self,
        baseline_id: &RecordId,
        candidate_id: &RecordId,
    ) -> Result<ComparisonReport> {
        let baseline = self.store.get(baseline_id)?;
        let candidate = self.store.get(candidate_id)?;
        self.compare_checked(&baseline, &candidate)
    }

    fn compare_checked(
        &self,
        baseline: &ProofRecord,
        candidate: &ProofRecord,
    ) -> Result<ComparisonReport> {
        if baseline.input != candidate.input {
            return Err(Error::InputMismatch {
                baseline: baseline.record_id(),
                candidate: candidate.record_id(),
            });
        }
        Ok(self.comparator.compare(baseline, candidate))
    }

    /// Verify every history record, `jobs` at a time.
    ///
    /// Each record is an independent single verification; one failing record
    /// does not stop the others.
    ///
    /// # Errors
    /// Only if the history itself cannot be listed.
    pub fn verify_all(&self, jobs: usize) -> Result<BatchSummary> {
        let ids = self.store.list(Slot::History)?;
        let jobs = jobs.clamp(1, ids.len().max(1));
        let chunk = ids.len().div_ceil(jobs).max(1);
        info!(records = ids.len(), jobs, "batch verification");

        let entries: Vec<BatchEntry> = std::thread::scope(|s| {
            let handles: Vec<_> = ids
                .chunks(chunk)
                .map(|part| {
                    s.spawn(move || part.iter().map(|id| self.verify_entry(id)).collect::<Vec<_>>())
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| match h.join() {
                    Ok(v) => v,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        Ok(BatchSummary::from_entries(entries))
    }

    fn verify_entry(&self, id: &RecordId) -> BatchEntry {
        match self.verify_record(id) {
            Ok(result) => BatchEntry {
                record_id: id.clone(),
                result: Some(result),
                error: None,
            },
            Err(e) => {
                error!(record_id = %id, error = %e, "verification did not complete");
                BatchEntry {
                    record_id: id.clone(),
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::tests::{BrokenStore, CannedEngine};
    use crate::compare::Verdict;
    use crate::engine::{ExpectedLayout, OracleFailure};
    use crate::store::MemoryRecordStore;
    use crate::types::{ObjectKind, ProofObject};

    struct OneObjectLayout;

    impl ProofLayout for OneObjectLayout {
        fn expected_layout(&self, _input: &ProveInput) -> ExpectedLayout {
            ExpectedLayout::with_count(1).binding_input()
        }
    }

    struct Oracle(std::result::Result<bool, OracleFailure>);

    impl VerificationOracle for Oracle {
        fn verify(
            &self,
            _input: &ProveInput,
            _objects: &[ProofObject],
        ) -> std::result::Result<bool, OracleFailure> {
            self.0.clone()
        }
    }

    #[test]
    fn baseline_then_candidate_reaches_done() {
        let engine = CannedEngine::default();
        let oracle = Oracle(Ok(true));
        let store = MemoryRecordStore::new();
        let p = Pipeline::new(&engine, &oracle, &OneObjectLayout, &store);

        let base = p.capture_baseline(&ProveInput::default(), "master").unwrap();
        assert_eq!(
            base.states,
            vec![RunState::Idle, RunState::Capturing, RunState::Persisted, RunState::Verifying, RunState::Done]
        );
        assert!(base.comparison.is_none());

        let cand = p.capture_candidate(None, "opt").unwrap();
        assert_eq!(cand.states.last(), Some(&RunState::Done));
        assert!(cand.states.contains(&RunState::Comparing));
        let cmp = cand.comparison.unwrap();
        assert!(cmp.hashes_equal);
        assert_ne!(cmp.verdict, Verdict::HashMismatch);
        assert_eq!(cmp.baseline_id, base.record_id);
        assert_eq!(store.list(Slot::History).unwrap().len(), 2);
    }

    #[test]
    fn candidate_without_baseline_aborts_before_proving() {
        let engine = CannedEngine::default();
        let oracle = Oracle(Ok(true));
        let store = MemoryRecordStore::new();
        let p = Pipeline::new(&engine, &oracle, &OneObjectLayout, &store);

        let f = p.capture_candidate(None, "opt").unwrap_err();
        assert_eq!(f.state, RunState::Idle);
        assert!(matches!(f.error, Error::EmptyStore(Slot::Baseline)));
        assert_eq!(engine.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn persist_failure_aborts_in_capturing_with_payload() {
        let engine = CannedEngine::default();
        let oracle = Oracle(Ok(true));
        let p = Pipeline::new(&engine, &oracle, &OneObjectLayout, &BrokenStore);

        let f = p.capture_baseline(&ProveInput::default(), "master").unwrap_err();
        assert_eq!(f.state, RunState::Capturing);
        assert!(f.error.unpersisted_record().is_some());
    }

    #[test]
    fn oracle_outage_aborts_in_verifying() {
        let engine = CannedEngine::default();
        let oracle = Oracle(Err(OracleFailure::new("busy")));
        let store = MemoryRecordStore::new();
        let p = Pipeline::new(&engine, &oracle, &OneObjectLayout, &store);

        let f = p.capture_baseline(&ProveInput::default(), "master").unwrap_err();
        assert_eq!(f.state, RunState::Verifying);
        assert!(matches!(f.error, Error::OracleUnavailable { .. }));
        // The proof is kept in history but never becomes the baseline.
        assert_eq!(store.list(Slot::History).unwrap().len(), 1);
        assert!(matches!(store.baseline(), Err(Error::EmptyStore(Slot::Baseline))));
    }

    #[test]
    fn rejected_baseline_keeps_the_previous_one() {
        let engine = CannedEngine::default();
        let store = MemoryRecordStore::new();
        let ok = Oracle(Ok(true));
        let trusted = Pipeline::new(&engine, &ok, &OneObjectLayout, &store)
            .capture_baseline(&ProveInput::default(), "master")
            .unwrap()
            .record_id;

        let no = Oracle(Ok(false));
        let f = Pipeline::new(&engine, &no, &OneObjectLayout, &store)
            .capture_baseline(&ProveInput::default(), "bad")
            .unwrap_err();
        assert_eq!(f.state, RunState::Verifying);
        assert!(matches!(f.error, Error::ProofRejected(_)));
        assert_eq!(store.baseline().unwrap().record_id(), trusted);
        assert_eq!(store.list(Slot::History).unwrap().len(), 2);

        // Later candidates are still judged against the trusted record.
        let cand = Pipeline::new(&engine, &ok, &OneObjectLayout, &store)
            .capture_candidate(None, "opt")
            .unwrap();
        assert_eq!(cand.comparison.unwrap().baseline_id, trusted);
    }

    #[test]
    fn rejected_candidate_never_reaches_comparison() {
        let engine = CannedEngine::default();
        let store = MemoryRecordStore::new();
        let ok = Oracle(Ok(true));
        Pipeline::new(&engine, &ok, &OneObjectLayout, &store)
            .capture_baseline(&ProveInput::default(), "master")
            .unwrap();

        let no = Oracle(Ok(false));
        let f = Pipeline::new(&engine, &no, &OneObjectLayout, &store)
            .capture_candidate(None, "opt")
            .unwrap_err();
        assert_eq!(f.state, RunState::Verifying);
        assert!(matches!(f.error, Error::ProofRejected(_)));
    }

    #[test]
    fn candidate_on_other_input_is_refused() {
        let engine = CannedEngine::default();
        let oracle = Oracle(Ok(true));
        let store = MemoryRecordStore::new();
        let p = Pipeline::new(&engine, &oracle, &OneObjectLayout, &store);
        p.capture_baseline(&ProveInput::default(), "master").unwrap();

        let other = ProveInput::new(3, [1; 5], [1; 5]);
        let f = p.capture_candidate(Some(&other), "opt").unwrap_err();
        assert_eq!(f.state, RunState::Idle);
        assert!(matches!(f.error, Error::CandidateInputMismatch { .. }));
        // Only the baseline was ever proved.
        assert_eq!(engine.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(store.list(Slot::History).unwrap().len(), 1);

        let same = ProveInput::default();
        assert!(p.capture_candidate(Some(&same), "opt").is_ok());
    }

    #[test]
    fn compare_records_refuses_different_inputs() {
        let engine = CannedEngine::default();
        let oracle = Oracle(Ok(true));
        let store = MemoryRecordStore::new();
        let p = Pipeline::new(&engine, &oracle, &OneObjectLayout, &store);
        let base = p.capture_baseline(&ProveInput::default(), "master").unwrap().record_id;

        let mut other = store.get(&base).unwrap();
        other.input = ProveInput::new(3, [1; 5], [1; 5]);
        other.source_branch = "other".into();
        let other_id = store.put(&other, Slot::History).unwrap();
        assert!(matches!(
            p.compare_records(&base, &other_id),
            Err(Error::InputMismatch { .. })
        ));
    }

    #[test]
    fn verify_all_reports_each_record() {
        let engine = CannedEngine::default();
        let oracle = Oracle(Ok(true));
        let store = MemoryRecordStore::new();
        let p = Pipeline::new(&engine, &oracle, &OneObjectLayout, &store);
        p.capture_baseline(&ProveInput::default(), "master").unwrap();
        p.capture_candidate(None, "a").unwrap();

        let mut forged = store.baseline().unwrap();
        forged.source_branch = "forged".into();
        forged.proof_objects.push(ProofObject::new(ObjectKind::Poly, vec![0]));
        store.put(&forged, Slot::History).unwrap();

        let summary = p.verify_all(4).unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.valid, 2);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.errors, 0);
        assert!(!summary.all_valid());
        assert_eq!(summary.entries[2].record_id, forged.record_id());
    }
}
