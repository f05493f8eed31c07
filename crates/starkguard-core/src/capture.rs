//! Drive the proving engine once and persist the resulting record.

use crate::engine::ProvingEngine;
use crate::error::{Error, Result};
use crate::store::RecordStore;
use crate::types::{ProofRecord, ProveInput, Slot};
use chrono::{SubsecRound, Utc};
use std::time::Instant;
use tracing::{error, info};

/// Turns one proving call into one persisted [`ProofRecord`].
///
/// No retries: a failed proof is reported immediately and re-running it is the
/// operator's decision.
pub struct CaptureRecorder<'a> {
    engine: &'a dyn ProvingEngine,
    store: &'a dyn RecordStore,
    test_name: String,
}

impl<'a> CaptureRecorder<'a> {
    /// Recorder writing records tagged with `test_name`.
    pub fn new(
        engine: &'a dyn ProvingEngine,
        store: &'a dyn RecordStore,
        test_name: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            store,
            test_name: test_name.into(),
        }
    }

    /// Capture a candidate record into history.
    pub fn capture(&self, input: &ProveInput, source_label: &str) -> Result<ProofRecord> {
        self.capture_into(input, source_label, Slot::History)
    }

    /// Prove `input`, build the record and persist it into `slot` before returning.
    ///
    /// Only the proving call is timed.
    ///
    /// # Errors
    /// - [`Error::ProofGeneration`] if the engine fails.
    /// - [`Error::PersistFailed`] (carrying the full record) if the store rejects it.
    pub fn capture_into(
        &self,
        input: &ProveInput,
        source_label: &str,
        slot: Slot,
    ) -> Result<ProofRecord> {
        info!(length = input.length, label = source_label, %slot, "proving");

        let started = Instant::now();
        let proved = self.engine.prove(input);
        let elapsed = started.elapsed();

        let output = proved.map_err(|failure| {
            error!(diagnostic = %failure.diagnostic, "proving engine failed");
            Error::ProofGeneration(failure)
        })?;

        let record = ProofRecord {
            input: *input,
            duration_secs: elapsed.as_secs_f64(),
            proof_hash: output.proof_hash,
            timestamp: Utc::now().trunc_subsecs(6),
            test_name: self.test_name.clone(),
            source_branch: source_label.to_owned(),
            proof_objects: output.objects,
        };

        match self.store.put(&record, slot) {
            Ok(id) => {
                info!(
                    record_id = %id,
                    duration_secs = record.duration_secs,
                    proof_hash = %record.proof_hash,
                    objects = record.object_count(),
                    "proof captured"
                );
                Ok(record)
            }
            Err(source) => {
                let payload = serde_json::to_string(&record).unwrap_or_default();
                error!(
                    record_id = %record.record_id(),
                    error = %source,
                    payload = %payload,
                    "proof generated but not persisted; payload logged for manual recovery"
                );
                Err(Error::PersistFailed {
                    record: Box::new(record),
                    source: Box::new(source),
                })
            }
        }
    }
}
