//! RecordPersister implementations.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use waypoint_events::{AppendRecord, InvocationRecord, RecordStore};

use crate::traits::RecordPersister;

// ---------------------------------------------------------------------------
// RecordStore adapter
// ---------------------------------------------------------------------------

#[async_trait]
impl RecordPersister for RecordStore {
    async fn persist(&self, record: AppendRecord) -> Result<InvocationRecord> {
        self.append(record)
    }

    async fn persist_child(&self, parent_seq: i64, record: AppendRecord) -> Result<InvocationRecord> {
        self.append_child(parent_seq, record)
    }

    async fn ancestors(&self, seq: i64) -> Result<Vec<InvocationRecord>> {
        Ok(RecordStore::ancestors(self, seq))
    }

    async fn read_run(&self, run_id: &str) -> Result<Vec<InvocationRecord>> {
        Ok(self.read_by_run(run_id))
    }

    async fn forget_run(&self, run_id: &str) -> Result<usize> {
        Ok(RecordStore::forget_run(self, run_id))
    }

    fn release_run(&self, run_id: &str) {
        RecordStore::forget_run(self, run_id);
    }
}

// ---------------------------------------------------------------------------
// Arc<P> blanket — lets tests share the store for assertions
// ---------------------------------------------------------------------------

#[async_trait]
impl<P: RecordPersister + ?Sized> RecordPersister for Arc<P> {
    async fn persist(&self, record: AppendRecord) -> Result<InvocationRecord> {
        (**self).persist(record).await
    }

    async fn persist_child(&self, parent_seq: i64, record: AppendRecord) -> Result<InvocationRecord> {
        (**self).persist_child(parent_seq, record).await
    }

    async fn ancestors(&self, seq: i64) -> Result<Vec<InvocationRecord>> {
        (**self).ancestors(seq).await
    }

    async fn read_run(&self, run_id: &str) -> Result<Vec<InvocationRecord>> {
        (**self).read_run(run_id).await
    }

    async fn forget_run(&self, run_id: &str) -> Result<usize> {
        (**self).forget_run(run_id).await
    }

    fn release_run(&self, run_id: &str) {
        (**self).release_run(run_id)
    }
}
