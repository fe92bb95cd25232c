//! RecordStore — append-only, run-scoped record store held in memory.
//!
//! Sequence numbers are gap-free and strictly increasing across all runs.
//! Reads never observe a partially appended record.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use chrono::Utc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::types::{AppendRecord, InvocationRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("parent record {0} not found")]
    ParentNotFound(i64),

    #[error("record for {action} has no run id")]
    MissingRunId { action: String },
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    next_seq: i64,
    records: BTreeMap<i64, InvocationRecord>,
    by_run: HashMap<String, Vec<i64>>,
}

/// Append-only record store. Cheap to clone; clones share the same records.
#[derive(Clone, Default)]
pub struct RecordStore {
    inner: Arc<Mutex<Inner>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a root record (no parent).
    pub fn append(&self, record: AppendRecord) -> Result<InvocationRecord> {
        let run_id = record.run_id.clone().ok_or_else(|| StoreError::MissingRunId {
            action: record.action.clone(),
        })?;
        let mut inner = self.lock();
        Ok(insert(&mut inner, record, run_id, None, None))
    }

    /// Append a record caused by `parent_seq`. Run id is inherited from the
    /// parent when the record does not carry one.
    pub fn append_child(&self, parent_seq: i64, record: AppendRecord) -> Result<InvocationRecord> {
        let mut inner = self.lock();
        let parent = inner
            .records
            .get(&parent_seq)
            .ok_or(StoreError::ParentNotFound(parent_seq))?;

        let run_id = record.run_id.clone().unwrap_or_else(|| parent.run_id.clone());
        // Root records point at themselves as the chain origin.
        let caused_by = parent.caused_by_seq.unwrap_or(parent.seq);

        Ok(insert(
            &mut inner,
            record,
            run_id,
            Some(parent_seq),
            Some(caused_by),
        ))
    }

    /// Read a single record by sequence number.
    pub fn read_record(&self, seq: i64) -> Option<InvocationRecord> {
        self.lock().records.get(&seq).cloned()
    }

    /// Read all records for a given run, in sequence order.
    pub fn read_by_run(&self, run_id: &str) -> Vec<InvocationRecord> {
        let inner = self.lock();
        inner
            .by_run
            .get(run_id)
            .map(|seqs| {
                seqs.iter()
                    .filter_map(|seq| inner.records.get(seq).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Read direct children of a record.
    pub fn read_children(&self, parent_seq: i64) -> Vec<InvocationRecord> {
        self.lock()
            .records
            .values()
            .filter(|r| r.parent_seq == Some(parent_seq))
            .cloned()
            .collect()
    }

    /// Read the full causal tree rooted at a record.
    pub fn read_tree(&self, root_seq: i64) -> Vec<InvocationRecord> {
        self.lock()
            .records
            .values()
            .filter(|r| r.seq == root_seq || r.caused_by_seq == Some(root_seq))
            .cloned()
            .collect()
    }

    /// Walk the parent chain upwards, nearest ancestor first.
    pub fn ancestors(&self, seq: i64) -> Vec<InvocationRecord> {
        let inner = self.lock();
        let mut chain = Vec::new();
        let mut cursor = inner.records.get(&seq).and_then(|r| r.parent_seq);
        while let Some(parent) = cursor.and_then(|s| inner.records.get(&s)) {
            chain.push(parent.clone());
            cursor = parent.parent_seq;
        }
        chain
    }

    /// The latest assigned sequence number, or 0 if nothing was ever appended.
    pub fn latest_seq(&self) -> i64 {
        self.lock().next_seq
    }

    /// Number of records currently retained.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record belonging to a run. Returns how many were removed.
    pub fn forget_run(&self, run_id: &str) -> usize {
        let mut inner = self.lock();
        let Some(seqs) = inner.by_run.remove(run_id) else {
            return 0;
        };
        for seq in &seqs {
            inner.records.remove(seq);
        }
        debug!(run_id, removed = seqs.len(), "Forgot run records");
        seqs.len()
    }
}

fn insert(
    inner: &mut Inner,
    record: AppendRecord,
    run_id: String,
    parent_seq: Option<i64>,
    caused_by_seq: Option<i64>,
) -> InvocationRecord {
    inner.next_seq += 1;
    let seq = inner.next_seq;

    let stored = InvocationRecord {
        seq,
        id: Uuid::new_v4(),
        ts: Utc::now(),
        action: record.action,
        parent_seq,
        caused_by_seq,
        run_id: run_id.clone(),
        depth: record.depth,
        input: record.input,
        output: record.output,
    };

    inner.records.insert(seq, stored.clone());
    inner.by_run.entry(run_id).or_default().push(seq);
    stored
}
