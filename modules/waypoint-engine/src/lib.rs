//! Synchronization engine.
//!
//! Concepts never call each other. Every completed action is recorded and
//! matched against declarative `when` patterns; matching rules join their
//! bindings per run, refine them through `where` queries, and invoke their
//! `then` actions, whose completions re-enter the same loop until the run
//! settles.
//!
//! Consumers register concepts (implementing [`Concept`]) in a [`Registry`],
//! define rules as functions from fresh [`Vars`] to a [`SyncSpec`], and drive
//! runs through [`Engine`].

pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod join;
pub mod pattern;
pub mod payload;
pub mod persist;
pub mod registry;
pub mod sync;
pub mod traits;
pub mod unify;
pub mod vars;

pub use config::EngineConfig;
pub use engine::{AbortedBranch, Engine, EngineBuilder, Run, RunReport};
pub use error::EngineError;
pub use frame::{Frame, Frames};
pub use pattern::{lit, OutcomeFilter, Pattern, Template, Term};
pub use payload::{payload, Outcome};
pub use registry::{ActionId, ActionSpec, OperationKind, QueryRef, Registry};
pub use sync::{SyncDef, SyncSpec, Synchronization};
pub use traits::{query_fn, where_fn, Concept, FnQuery, QueryFn, RecordPersister, Where, WhereFn};
pub use vars::{Var, Vars};
pub use waypoint_events::{InvocationRecord, Payload, RecordStore};
