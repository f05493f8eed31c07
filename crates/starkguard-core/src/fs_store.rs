//! Durable [`RecordStore`] on a local directory.
//!
//! Layout under the store root:
//!
//! ```text
//! records/<record_id>.json   one canonical JSON document per record
//! history.idx                record ids, one per line, insertion order
//! BASELINE                   id of the current baseline
//! store.lock                 advisory lock for index and pointer updates
//! ```
//!
//! Record files are published with write-temp + `hard_link`: linking fails if
//! the target exists, so concurrent writers of one id race on the filesystem
//! and exactly one wins. The baseline pointer is replaced with write-temp +
//! `rename`, and only after the record it names is on disk. Index and pointer
//! updates run under an exclusive lock on `store.lock`, so several processes
//! can share one store.

use crate::error::{Error, Result};
use crate::io::{read_record_json, record_to_bytes};
use crate::store::RecordStore;
use crate::types::{ProofRecord, RecordId, Slot};
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

const RECORDS_DIR: &str = "records";
const INDEX_FILE: &str = "history.idx";
const BASELINE_FILE: &str = "BASELINE";
const LOCK_FILE: &str = "store.lock";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem-backed record store.
#[derive(Debug)]
pub struct FsRecordStore {
    root: PathBuf,
    // Serializes index appends and baseline swaps within this process.
    meta_lock: Mutex<()>,
}

/// Held while the index or the baseline pointer is read-modify-written.
/// The file lock is released when `_file` is closed.
struct MetaGuard<'a> {
    _file: File,
    _local: MutexGuard<'a, ()>,
}

impl FsRecordStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let records = root.join(RECORDS_DIR);
        fs::create_dir_all(&records).map_err(|e| Error::io(&records, e))?;
        debug!(root = %root.display(), "opened record store");
        Ok(Self {
            root,
            meta_lock: Mutex::new(()),
        })
    }

    /// Store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document for `id`.
    #[must_use]
    pub fn record_path(&self, id: &RecordId) -> PathBuf {
        self.root.join(RECORDS_DIR).join(format!("{id}.json"))
    }

    /// Take the in-process mutex, then the exclusive file lock.
    fn lock_meta(&self) -> Result<MetaGuard<'_>> {
        let local = self.meta_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        fs2::FileExt::lock_exclusive(&file).map_err(|e| Error::io(&path, e))?;
        Ok(MetaGuard {
            _file: file,
            _local: local,
        })
    }

    fn tmp_path(&self, dir: &Path, stem: &str) -> PathBuf {
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        dir.join(format!(".tmp-{stem}-{}-{seq}", std::process::id()))
    }

    /// Write `bytes` to a fresh temp file next to `target` and fsync it.
    fn write_tmp(&self, target: &Path, bytes: &[u8]) -> Result<PathBuf> {
        let dir = target.parent().unwrap_or(&self.root);
        let stem = target
            .file_name()
            .map_or_else(|| "file".into(), |n| n.to_string_lossy().into_owned());
        let tmp = self.tmp_path(dir, &stem);
        let mut f = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .map_err(|e| Error::io(&tmp, e))?;
        f.write_all(bytes).map_err(|e| Error::io(&tmp, e))?;
        f.sync_all().map_err(|e| Error::io(&tmp, e))?;
        Ok(tmp)
    }

    /// Publish a record file. Returns `false` if a file with that id already exists.
    fn publish(&self, record: &ProofRecord, id: &RecordId) -> Result<bool> {
        let target = self.record_path(id);
        let tmp = self.write_tmp(&target, &record_to_bytes(record)?)?;
        let linked = fs::hard_link(&tmp, &target);
        let _ = fs::remove_file(&tmp);
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(Error::io(&target, e)),
        }
    }

    fn append_index(&self, id: &RecordId) -> Result<()> {
        let path = self.root.join(INDEX_FILE);
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        f.write_all(format!("{id}\n").as_bytes())
            .map_err(|e| Error::io(&path, e))?;
        f.sync_all().map_err(|e| Error::io(&path, e))
    }

    fn read_index(&self) -> Result<Vec<RecordId>> {
        let path = self.root.join(INDEX_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&path, e)),
        };
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| {
                l.parse().map_err(|_| Error::Corrupt {
                    path: path.clone(),
                    reason: format!("bad index line {l:?}"),
                })
            })
            .collect()
    }

    fn rewrite_index(&self, ids: &[RecordId]) -> Result<()> {
        let path = self.root.join(INDEX_FILE);
        let body: String = ids.iter().map(|id| format!("{id}\n")).collect();
        let tmp = self.write_tmp(&path, body.as_bytes())?;
        fs::rename(&tmp, &path).map_err(|e| Error::io(&path, e))
    }

    fn read_pointer(&self) -> Result<Option<RecordId>> {
        let path = self.root.join(BASELINE_FILE);
        match fs::read_to_string(&path) {
            Ok(t) => t.trim().parse().map(Some).map_err(|_| Error::Corrupt {
                path,
                reason: "baseline pointer is not a record id".into(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(&path, e)),
        }
    }

    fn swap_pointer(&self, id: &RecordId) -> Result<()> {
        let path = self.root.join(BASELINE_FILE);
        let tmp = self.write_tmp(&path, format!("{id}\n").as_bytes())?;
        fs::rename(&tmp, &path).map_err(|e| Error::io(&path, e))?;
        // Make the rename itself durable where the platform allows it.
        if let Ok(dir) = File::open(&self.root) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}

impl RecordStore for FsRecordStore {
    fn put(&self, record: &ProofRecord, slot: Slot) -> Result<RecordId> {
        let id = record.record_id();
        let duplicate = || Error::DuplicateRecord {
            record_id: id.clone(),
            slot,
        };

        match slot {
            Slot::History => {
                if !self.publish(record, &id)? {
                    return Err(duplicate());
                }
                let _g = self.lock_meta()?;
                self.append_index(&id)?;
            }
            Slot::Baseline => {
                let _g = self.lock_meta()?;
                if self.read_pointer()?.as_ref() == Some(&id) {
                    return Err(duplicate());
                }
                if self.publish(record, &id)? {
                    self.append_index(&id)?;
                } else if self.get(&id)? != *record {
                    return Err(duplicate());
                } else if !self.read_index()?.contains(&id) {
                    // Published by an earlier put whose index append failed.
                    self.append_index(&id)?;
                }
                self.swap_pointer(&id)?;
                info!(record_id = %id, "baseline pointer updated");
            }
        }
        debug!(record_id = %id, %slot, "record persisted");
        Ok(id)
    }

    fn get(&self, id: &RecordId) -> Result<ProofRecord> {
        let path = self.record_path(id);
        if !path.exists() {
            return Err(Error::NotFound(id.clone()));
        }
        let record = read_record_json(&path)?;
        let derived = record.record_id();
        if &derived != id {
            return Err(Error::Corrupt {
                path,
                reason: format!("content derives id {derived}"),
            });
        }
        Ok(record)
    }

    fn list(&self, slot: Slot) -> Result<Vec<RecordId>> {
        match slot {
            Slot::History => self.read_index(),
            Slot::Baseline => Ok(self.read_pointer()?.into_iter().collect()),
        }
    }

    fn prune(&self, cutoff: DateTime<Utc>) -> Result<Vec<RecordId>> {
        let _g = self.lock_meta()?;
        let baseline = self.read_pointer()?;
        let mut kept = Vec::new();
        let mut removed = Vec::new();

        for id in self.read_index()? {
            let stale = baseline.as_ref() != Some(&id)
                && match self.get(&id) {
                    Ok(r) => r.timestamp < cutoff,
                    Err(Error::NotFound(_)) => true,
                    Err(e) => return Err(e),
                };
            if stale {
                let path = self.record_path(&id);
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::io(&path, e)),
                }
                removed.push(id);
            } else {
                kept.push(id);
            }
        }

        self.rewrite_index(&kept)?;
        info!(removed = removed.len(), kept = kept.len(), %cutoff, "pruned history");
        Ok(removed)
    }
}
