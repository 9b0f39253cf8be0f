//! Last-write-wins merge of a local and a remote collection
//!
//! Pure: no I/O, no clock. The synchronizer applies the outcome.

use std::collections::{HashMap, HashSet};

use crate::models::{RecordId, SyncRecord};

/// How records that exist only on the remote side are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// First pass for a user and collection: remote-only records are adopted
    /// locally, nothing is deleted.
    Bootstrap,
    /// Steady state: local is authoritative for existence, so a remote-only
    /// record was deleted locally and the deletion is propagated.
    Propagate,
}

/// Outcome of one merge.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<T> {
    /// New local collection, newest first.
    pub merged: Vec<T>,
    /// Local winners to write remotely.
    pub upserts: Vec<T>,
    /// Remote-only ids to delete remotely.
    pub deletes: Vec<RecordId>,
    /// Ids whose remote version now stands locally.
    pub adopted: Vec<RecordId>,
}

impl<T> Reconciliation<T> {
    /// Whether applying this outcome needs any remote write.
    pub fn has_remote_writes(&self) -> bool {
        !self.upserts.is_empty() || !self.deletes.is_empty()
    }
}

/// Merge `local` and `remote` by id.
///
/// - local only: kept and upserted.
/// - both sides: the newer `updated_at` wins, local on ties. A local winner
///   is upserted unless the remote copy is identical, so merging an already
///   converged pair produces no writes.
/// - remote only: see [`ReconcileMode`].
///
/// Duplicate ids within one side collapse to their newest copy.
pub fn reconcile<T: SyncRecord>(
    local: &[T],
    remote: &[T],
    mode: ReconcileMode,
) -> Reconciliation<T> {
    let local = newest_by_id(local);
    let remote = newest_by_id(remote);
    let remote_index: HashMap<&RecordId, &T> =
        remote.iter().map(|record| (record.id(), *record)).collect();

    let mut merged = Vec::with_capacity(local.len().max(remote.len()));
    let mut upserts = Vec::new();
    let mut deletes = Vec::new();
    let mut adopted = Vec::new();

    for &record in &local {
        match remote_index.get(record.id()) {
            None => {
                merged.push(record.clone());
                upserts.push(record.clone());
            }
            Some(&theirs) if record.updated_at() >= theirs.updated_at() => {
                merged.push(record.clone());
                if record != theirs {
                    upserts.push(record.clone());
                }
            }
            Some(&theirs) => {
                merged.push(theirs.clone());
                adopted.push(theirs.id().clone());
            }
        }
    }

    let local_ids: HashSet<&RecordId> = local.iter().map(|record| record.id()).collect();
    for &record in remote.iter().filter(|record| !local_ids.contains(record.id())) {
        match mode {
            ReconcileMode::Propagate => deletes.push(record.id().clone()),
            ReconcileMode::Bootstrap => {
                merged.push(record.clone());
                adopted.push(record.id().clone());
            }
        }
    }

    merged.sort_by(|a, b| {
        b.updated_at()
            .cmp(&a.updated_at())
            .then_with(|| a.id().cmp(b.id()))
    });

    Reconciliation {
        merged,
        upserts,
        deletes,
        adopted,
    }
}

/// First-seen order, each id represented by its newest copy.
fn newest_by_id<T: SyncRecord>(records: &[T]) -> Vec<&T> {
    let mut positions: HashMap<&RecordId, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<&T> = Vec::with_capacity(records.len());
    for record in records {
        match positions.get(record.id()) {
            Some(&position) => {
                if record.updated_at() > unique[position].updated_at() {
                    unique[position] = record;
                }
            }
            None => {
                positions.insert(record.id(), unique.len());
                unique.push(record);
            }
        }
    }
    unique
}
