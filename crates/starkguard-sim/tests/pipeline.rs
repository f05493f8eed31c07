// End-to-end runs of the pipeline over the reference engine and a store on disk.

use starkguard_core::prelude::*;
use starkguard_core::Error;
use starkguard_sim::{SimConfig, SimEngine};
use std::path::Path;

fn engine(salt: &str) -> SimEngine {
    SimEngine::new(SimConfig {
        grind_rounds: 16,
        salt: salt.into(),
    })
}

/// Rewrite a stored document through `edit`.
fn tamper(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
    let mut doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    edit(&mut doc);
    std::fs::write(path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
}

#[test]
fn baseline_then_candidate_is_not_a_hash_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordStore::open(dir.path()).unwrap();
    let e = engine("");
    let p = Pipeline::new(&e, &e, &e, &store);

    let base = p.capture_baseline(&ProveInput::default(), "master").unwrap();
    assert!(base.verification.is_valid);
    assert_eq!(base.verification.object_count, 13);

    let cand = p.capture_candidate(None, "feature/faster-fri").unwrap();
    assert_eq!(cand.states.last(), Some(&RunState::Done));
    let cmp = cand.comparison.unwrap();
    assert!(cmp.hashes_equal);
    assert_ne!(cmp.verdict, Verdict::HashMismatch);
    assert!(cand.record_id.as_str().starts_with("feature_faster_fri-"));

    // Records and pointers survive a reopen.
    let reopened = FsRecordStore::open(dir.path()).unwrap();
    assert_eq!(reopened.baseline().unwrap().record_id(), base.record_id);
    assert_eq!(reopened.list(Slot::History).unwrap(), vec![base.record_id, cand.record_id]);
}

#[test]
fn proving_twice_gives_identical_objects() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordStore::open(dir.path()).unwrap();
    let e = engine("");
    let p = Pipeline::new(&e, &e, &e, &store);
    let input = ProveInput::new(4, [9; 5], [2; 5]);

    let a = p.capture_baseline(&input, "a").unwrap();
    let b = p.capture_candidate(Some(&input), "b").unwrap();
    let ra = store.get(&a.record_id).unwrap();
    let rb = store.get(&b.record_id).unwrap();
    assert_eq!(ra.proof_objects, rb.proof_objects);
    assert_eq!(ra.proof_hash, rb.proof_hash);
    assert_eq!(b.comparison.unwrap().first_divergence, None);
}

#[test]
fn dropped_object_fails_cardinality_before_oracle() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordStore::open(dir.path()).unwrap();
    let e = engine("");
    let p = Pipeline::new(&e, &e, &e, &store);
    let id = p.capture_baseline(&ProveInput::default(), "master").unwrap().record_id;

    tamper(&store.record_path(&id), |doc| {
        doc["proof_objects"].as_array_mut().unwrap().remove(7);
    });

    let result = p.verify_record(&id).unwrap();
    assert!(!result.is_valid);
    assert_eq!(
        result.error_detail,
        Some(ErrorDetail::CardinalityMismatch {
            expected: 13,
            found: 12
        })
    );
    assert!(matches!(result.ensure_valid(), Err(Error::StructuralMismatch { .. })));
}

#[test]
fn any_altered_byte_makes_the_proof_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordStore::open(dir.path()).unwrap();
    let e = engine("");
    let p = Pipeline::new(&e, &e, &e, &store);
    let id = p.capture_baseline(&ProveInput::default(), "master").unwrap().record_id;
    let pristine = std::fs::read(store.record_path(&id)).unwrap();

    for index in [1usize, 5, 6, 7, 10, 12] {
        std::fs::write(store.record_path(&id), &pristine).unwrap();
        tamper(&store.record_path(&id), |doc| {
            let data = doc["proof_objects"][index]["data"].as_str().unwrap().to_owned();
            let flipped = if data.starts_with('0') { "1" } else { "0" };
            doc["proof_objects"][index]["data"] = format!("{flipped}{}", &data[1..]).into();
        });
        let result = p.verify_record(&id).unwrap();
        assert!(!result.is_valid, "tampered object {index} accepted");
    }

    // Re-hashing the forged objects still does not fool the oracle.
    std::fs::write(store.record_path(&id), &pristine).unwrap();
    let mut forged = store.get(&id).unwrap();
    forged.proof_objects[12].data[0] ^= 0xff;
    forged.proof_hash = starkguard_sim::proof_digest(&forged.proof_objects);
    forged.source_branch = "forged".into();
    store.put(&forged, Slot::History).unwrap();
    let result = p.verify_record(&forged.record_id()).unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.error_detail, Some(ErrorDetail::OracleRejected));
    assert!(matches!(result.ensure_valid(), Err(Error::ProofRejected(_))));
}

#[test]
fn renamed_record_file_is_reported_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordStore::open(dir.path()).unwrap();
    let e = engine("");
    let p = Pipeline::new(&e, &e, &e, &store);
    let id = p.capture_baseline(&ProveInput::default(), "master").unwrap().record_id;

    tamper(&store.record_path(&id), |doc| doc["source_branch"] = "release".into());
    assert!(matches!(p.verify_record(&id), Err(Error::Corrupt { .. })));
}

#[test]
fn changed_engine_salt_is_a_hash_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordStore::open(dir.path()).unwrap();
    let old = engine("");
    Pipeline::new(&old, &old, &old, &store)
        .capture_baseline(&ProveInput::default(), "master")
        .unwrap();

    let new = engine("rewritten-air");
    let run = Pipeline::new(&new, &new, &new, &store)
        .capture_candidate(None, "rewrite")
        .unwrap();
    let cmp = run.comparison.unwrap();
    assert_eq!(cmp.verdict, Verdict::HashMismatch);
    assert!(!cmp.hashes_equal);
    // Column roots do not depend on the salt; the composition commitment does.
    assert_eq!(cmp.first_divergence, Some(5));
}

#[test]
fn reads_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordStore::open(dir.path()).unwrap();
    let e = engine("");
    let p = Pipeline::new(&e, &e, &e, &store);
    p.capture_baseline(&ProveInput::default(), "master").unwrap();
    p.capture_candidate(None, "one").unwrap();
    p.capture_candidate(None, "two").unwrap();

    let first = store.list(Slot::History).unwrap();
    let second = store.list(Slot::History).unwrap();
    assert_eq!(first, second);
    for id in &first {
        assert_eq!(store.get(id).unwrap(), store.get(id).unwrap());
    }
}

#[test]
fn duplicate_put_is_rejected_and_first_copy_kept() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordStore::open(dir.path()).unwrap();
    let e = engine("");
    let p = Pipeline::new(&e, &e, &e, &store);
    let id = p.capture_baseline(&ProveInput::default(), "master").unwrap().record_id;

    let mut again = store.get(&id).unwrap();
    let original = again.clone();
    again.duration_secs += 1.0;
    assert!(matches!(
        store.put(&again, Slot::History),
        Err(Error::DuplicateRecord { .. })
    ));
    assert_eq!(store.get(&id).unwrap(), original);
}

#[test]
fn unprovable_input_aborts_in_capturing() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordStore::open(dir.path()).unwrap();
    let e = engine("");
    let p = Pipeline::new(&e, &e, &e, &store);

    let f = p
        .capture_baseline(&ProveInput::new(0, [1; 5], [1; 5]), "master")
        .unwrap_err();
    assert_eq!(f.state, RunState::Capturing);
    assert!(matches!(f.error, Error::ProofGeneration(_)));
    assert!(store.list(Slot::History).unwrap().is_empty());
}

#[test]
fn persist_failure_aborts_with_the_record_attached() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordStore::open(dir.path().join("store")).unwrap();
    // Replace the records directory with a file so every publish fails.
    let records = dir.path().join("store").join("records");
    std::fs::remove_dir_all(&records).unwrap();
    std::fs::write(&records, b"not a directory").unwrap();

    let e = engine("");
    let f = Pipeline::new(&e, &e, &e, &store)
        .capture_baseline(&ProveInput::default(), "master")
        .unwrap_err();
    assert_eq!(f.state, RunState::Capturing);
    let record = f.error.unpersisted_record().unwrap();
    assert_eq!(record.object_count(), 13);
    assert_eq!(record.proof_hash, starkguard_sim::proof_digest(&record.proof_objects));
}

#[test]
fn verify_all_checks_the_whole_history_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordStore::open(dir.path()).unwrap();
    let e = engine("");
    let p = Pipeline::new(&e, &e, &e, &store);
    p.capture_baseline(&ProveInput::default(), "master").unwrap();
    for label in ["a", "b", "c", "d"] {
        p.capture_candidate(None, label).unwrap();
    }
    let ids = store.list(Slot::History).unwrap();
    tamper(&store.record_path(&ids[2]), |doc| {
        doc["proof_objects"].as_array_mut().unwrap().pop();
    });

    let summary = p.verify_all(3).unwrap();
    assert_eq!(summary.total, 5);
    assert_eq!(summary.valid, 4);
    assert_eq!(summary.invalid, 1);
    assert_eq!(summary.errors, 0);
    let order: Vec<_> = summary.entries.iter().map(|e| e.record_id.clone()).collect();
    assert_eq!(order, ids);
}

#[test]
fn promote_and_prune_keep_the_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsRecordStore::open(dir.path()).unwrap();
    let e = engine("");
    let p = Pipeline::new(&e, &e, &e, &store);
    p.capture_baseline(&ProveInput::default(), "master").unwrap();
    let cand = p.capture_candidate(None, "next").unwrap().record_id;

    store.promote(&cand).unwrap();
    assert_eq!(store.baseline().unwrap().record_id(), cand);

    let removed = store.prune(chrono::Utc::now() + chrono::Duration::days(1)).unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(store.list(Slot::History).unwrap(), vec![cand]);
}
