//! JSON helpers for records and reports.
//!
//! Records are written as pretty JSON with LF line endings and a trailing
//! newline; serde preserves struct field order, so the same record always
//! yields the same bytes and two record files diff line by line.

use crate::error::{Error, Result};
use crate::types::ProofRecord;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Ensure the parent directory for a file exists (no-op if none).
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
    }
    Ok(())
}

/// Canonical on-disk bytes of a record.
pub fn record_to_bytes(record: &ProofRecord) -> Result<Vec<u8>> {
    to_pretty_bytes(record).map_err(|e| Error::json(record.record_id().as_str(), e))
}

/// Pretty JSON with a trailing newline.
pub fn to_pretty_bytes<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = serde_json::to_vec_pretty(value)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Read a [`ProofRecord`] from a JSON file.
pub fn read_record_json<P: AsRef<Path>>(path: P) -> Result<ProofRecord> {
    read_json(path)
}

/// Read any `T: DeserializeOwned` from a JSON file.
pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path_ref = path.as_ref();
    let f = File::open(path_ref).map_err(|e| Error::io(path_ref, e))?;
    serde_json::from_reader(BufReader::new(f)).map_err(|e| Error::json(path_ref, e))
}

/// Write any `T: Serialize` as pretty JSON with a trailing newline.
pub fn write_json_pretty<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let path_ref = path.as_ref();
    ensure_parent_dir(path_ref)?;
    let bytes = to_pretty_bytes(value).map_err(|e| Error::json(path_ref, e))?;
    let f = File::create(path_ref).map_err(|e| Error::io(path_ref, e))?;
    let mut w = BufWriter::new(f);
    w.write_all(&bytes).map_err(|e| Error::io(path_ref, e))?;
    w.flush().map_err(|e| Error::io(path_ref, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ObjectKind, ProofObject, ProveInput};
    use chrono::{TimeZone, Utc};

    fn record() -> ProofRecord {
        ProofRecord {
            input: ProveInput::default(),
            duration_secs: 0.25,
            proof_hash: "00aa".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            test_name: "io".into(),
            source_branch: "master".into(),
            proof_objects: vec![ProofObject::new(ObjectKind::Heights, vec![7; 4])],
        }
    }

    #[test]
    fn record_file_roundtrip_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/rec.json");
        write_json_pretty(&path, &record()).unwrap();
        let got = read_record_json(&path).unwrap();
        assert_eq!(got, record());

        let first = fs::read(&path).unwrap();
        write_json_pretty(&path, &got).unwrap();
        assert_eq!(first, fs::read(&path).unwrap());
        assert_eq!(first.last(), Some(&b'\n'));
        assert_eq!(first, record_to_bytes(&record()).unwrap());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_record_json("/nonexistent/starkguard/rec.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/starkguard/rec.json"));
    }
}
