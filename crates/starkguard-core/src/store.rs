//! Append-only record persistence with a single baseline pointer.
//!
//! Records are keyed by [`RecordId`]. A store never overwrites an existing id;
//! a second writer for the same id gets [`Error::DuplicateRecord`]. The
//! baseline is a pointer into the stored records: replacing it demotes the old
//! baseline to plain history, it never deletes it.

use crate::error::{Error, Result};
use crate::types::{ProofRecord, RecordId, Slot};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Persistence contract used by the capture recorder and the pipeline.
pub trait RecordStore: Send + Sync {
    /// Persist `record` into `slot` and return its id.
    ///
    /// `Slot::Baseline` also records the id in history (if absent) and then
    /// atomically repoints the baseline.
    ///
    /// # Errors
    /// [`Error::DuplicateRecord`] if the id already exists in `slot`, or if a
    /// different record is already stored under the same id.
    fn put(&self, record: &ProofRecord, slot: Slot) -> Result<RecordId>;

    /// Fetch a stored record.
    ///
    /// # Errors
    /// [`Error::NotFound`] if no such id is stored.
    fn get(&self, id: &RecordId) -> Result<ProofRecord>;

    /// Ids in `slot`, in insertion order. Side-effect free.
    fn list(&self, slot: Slot) -> Result<Vec<RecordId>>;

    /// Delete history records created before `cutoff`, except the baseline.
    /// Returns the removed ids in insertion order.
    fn prune(&self, cutoff: DateTime<Utc>) -> Result<Vec<RecordId>>;

    /// Most recently created record in `slot`, by `timestamp`.
    ///
    /// Ties resolve to the later insertion.
    ///
    /// # Errors
    /// [`Error::EmptyStore`] when the slot holds nothing.
    fn latest(&self, slot: Slot) -> Result<ProofRecord> {
        let mut best: Option<ProofRecord> = None;
        for id in self.list(slot)? {
            let rec = self.get(&id)?;
            if best.as_ref().map_or(true, |b| rec.timestamp >= b.timestamp) {
                best = Some(rec);
            }
        }
        best.ok_or(Error::EmptyStore(slot))
    }

    /// The current baseline record.
    ///
    /// # Errors
    /// [`Error::EmptyStore`] when no baseline has been set.
    fn baseline(&self) -> Result<ProofRecord> {
        match self.list(Slot::Baseline)?.first() {
            Some(id) => self.get(id),
            None => Err(Error::EmptyStore(Slot::Baseline)),
        }
    }

    /// Make an already stored record the baseline.
    fn promote(&self, id: &RecordId) -> Result<()> {
        let record = self.get(id)?;
        self.put(&record, Slot::Baseline).map(|_| ())
    }
}

/// Volatile store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    inner: RwLock<MemInner>,
}

#[derive(Debug, Default)]
struct MemInner {
    records: HashMap<RecordId, ProofRecord>,
    order: Vec<RecordId>,
    baseline: Option<RecordId>,
}

impl MemoryRecordStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn put(&self, record: &ProofRecord, slot: Slot) -> Result<RecordId> {
        let id = record.record_id();
        let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let duplicate = || Error::DuplicateRecord {
            record_id: id.clone(),
            slot,
        };

        match slot {
            Slot::History => {
                if g.records.contains_key(&id) {
                    return Err(duplicate());
                }
            }
            Slot::Baseline => {
                if g.baseline.as_ref() == Some(&id) {
                    return Err(duplicate());
                }
                if g.records.get(&id).is_some_and(|stored| stored != record) {
                    return Err(duplicate());
                }
            }
        }

        if !g.records.contains_key(&id) {
            g.records.insert(id.clone(), record.clone());
            g.order.push(id.clone());
        }
        if slot == Slot::Baseline {
            g.baseline = Some(id.clone());
        }
        Ok(id)
    }

    fn get(&self, id: &RecordId) -> Result<ProofRecord> {
        let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        g.records
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.clone()))
    }

    fn list(&self, slot: Slot) -> Result<Vec<RecordId>> {
        let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(match slot {
            Slot::History => g.order.clone(),
            Slot::Baseline => g.baseline.iter().cloned().collect(),
        })
    }

    fn prune(&self, cutoff: DateTime<Utc>) -> Result<Vec<RecordId>> {
        let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let MemInner {
            records,
            order,
            baseline,
        } = &mut *g;

        let mut removed = Vec::new();
        order.retain(|id| {
            let stale = baseline.as_ref() != Some(id)
                && records.get(id).is_some_and(|r| r.timestamp < cutoff);
            if stale {
                records.remove(id);
                removed.push(id.clone());
            }
            !stale
        });
        Ok(removed)
    }
}
