//! Core traits for the synchronization engine.

use std::future::Future;

use anyhow::Result;
use async_trait::async_trait;
use waypoint_events::{AppendRecord, InvocationRecord};

use crate::frame::Frames;
use crate::registry::ActionSpec;
use crate::Payload;

/// A self-contained module exposing named actions and read-only queries
/// over its own private state.
///
/// Actions take one object and return one object. Domain failures are
/// returned as an object with an `error` field, never as `Err`; `Err` is
/// reserved for crashes and aborts the branch that invoked the action.
#[async_trait]
pub trait Concept: Send + Sync {
    fn name(&self) -> &str;

    /// Every action and query this concept answers, with optional schemas.
    fn operations(&self) -> Vec<ActionSpec>;

    async fn perform(&self, action: &str, input: Payload) -> Result<Payload>;

    /// Queries return zero or more rows and must not mutate state.
    async fn query(&self, query: &str, input: Payload) -> Result<Vec<Payload>> {
        let _ = input;
        anyhow::bail!("{} has no query {query}", self.name())
    }
}

/// An asynchronous read-query usable from a `where` clause.
#[async_trait]
pub trait QueryFn: Send + Sync {
    async fn call(&self, input: Payload) -> Result<Vec<Payload>>;

    /// Name used in logs.
    fn label(&self) -> &str {
        "query"
    }
}

/// Closure-backed [`QueryFn`]. Build with [`query_fn`].
pub struct FnQuery<F> {
    label: String,
    f: F,
}

/// Wrap an async closure as a query.
pub fn query_fn<F, Fut>(label: impl Into<String>, f: F) -> FnQuery<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Payload>>> + Send + 'static,
{
    FnQuery {
        label: label.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut> QueryFn for FnQuery<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Payload>>> + Send + 'static,
{
    async fn call(&self, input: Payload) -> Result<Vec<Payload>> {
        (self.f)(input).await
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// The optional `where` clause of a rule: refines joined frames.
///
/// Returning `Err` (or panicking) aborts this firing's frame set only.
#[async_trait]
pub trait Where: Send + Sync {
    async fn apply(&self, frames: Frames) -> Result<Frames>;
}

/// Closure-backed [`Where`]. Build with [`where_fn`].
pub struct WhereFn<F>(F);

pub fn where_fn<F, Fut>(f: F) -> WhereFn<F>
where
    F: Fn(Frames) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Frames>> + Send + 'static,
{
    WhereFn(f)
}

#[async_trait]
impl<F, Fut> Where for WhereFn<F>
where
    F: Fn(Frames) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Frames>> + Send + 'static,
{
    async fn apply(&self, frames: Frames) -> Result<Frames> {
        (self.0)(frames).await
    }
}

/// Persists invocation records and returns them with sequence numbers.
///
/// Implemented by `RecordStore`; also implemented for `Arc<P>` so a store can
/// be shared with the caller for assertions.
#[async_trait]
pub trait RecordPersister: Send + Sync {
    /// Persist a root record (no parent).
    async fn persist(&self, record: AppendRecord) -> Result<InvocationRecord>;

    /// Persist a child record (causal chain from parent_seq).
    async fn persist_child(&self, parent_seq: i64, record: AppendRecord) -> Result<InvocationRecord>;

    /// Causal ancestors of a record, nearest first.
    async fn ancestors(&self, seq: i64) -> Result<Vec<InvocationRecord>>;

    /// Every record of a run, in sequence order.
    async fn read_run(&self, run_id: &str) -> Result<Vec<InvocationRecord>>;

    /// Drop a settled run's records.
    async fn forget_run(&self, run_id: &str) -> Result<usize>;

    /// Drop a run's records without awaiting. Called when a run is dropped
    /// before it settles, so it must not block.
    fn release_run(&self, run_id: &str);
}
