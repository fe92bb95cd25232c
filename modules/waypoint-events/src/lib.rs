//! Generic, domain-agnostic store of completed invocations.
//!
//! Holds opaque JSON input/output payloads with causal structure
//! (parent_seq, caused_by_seq) grouped by run. Zero knowledge of rules,
//! patterns, or any travel concept.
//!
//! Records live only as long as their run: the owner calls
//! [`RecordStore::forget_run`] when the run settles.

pub mod store;
pub mod types;

pub use store::{RecordStore, StoreError};
pub use types::{AppendRecord, InvocationRecord, Payload};
