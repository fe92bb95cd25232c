//! The cascade loop.
//!
//! record → match → join → where → then → record, until the run settles.
//! Work is an explicit stack owned by the run, so a `then` action's
//! completion (and everything it cascades into) is processed before the next
//! sibling action runs, and the depth bound is a plain counter on each record.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use futures::FutureExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use waypoint_events::{AppendRecord, InvocationRecord, RecordStore};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::frame::Frames;
use crate::join::JoinState;
use crate::registry::{ActionId, OperationKind, Registry};
use crate::sync::{SyncDef, Synchronization};
use crate::traits::RecordPersister;
use crate::unify::unify;
use crate::Payload;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Rule-driven coordination over a fixed registry and rule set.
///
/// Immutable once built; share it behind an `Arc` and start one [`Run`] per
/// external request. Runs keep all matching state to themselves.
pub struct Engine<P: RecordPersister = RecordStore> {
    registry: Registry,
    syncs: Vec<Synchronization>,
    persister: P,
    config: EngineConfig,
}

impl Engine<RecordStore> {
    pub fn builder(registry: Registry) -> EngineBuilder<RecordStore> {
        EngineBuilder {
            registry,
            syncs: Vec::new(),
            persister: RecordStore::new(),
            config: EngineConfig::default(),
        }
    }
}

impl<P: RecordPersister> Engine<P> {
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn syncs(&self) -> &[Synchronization] {
        &self.syncs
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn persister(&self) -> &P {
        &self.persister
    }

    pub fn start_run(&self) -> Run<'_, P> {
        let id = Uuid::new_v4().to_string();
        debug!(run_id = id.as_str(), "Run started");
        Run {
            engine: self,
            id,
            joins: HashMap::new(),
            seen: HashSet::new(),
            aborted: Vec::new(),
            fired: 0,
            cancel: None,
            cancelled: false,
            settled: false,
        }
    }

    /// Invoke an action as the root of a new run, process everything it
    /// cascades into, and return the settled run.
    pub async fn invoke(&self, action: ActionId, input: Payload) -> Result<RunReport> {
        let mut run = self.start_run();
        match run.invoke(action, input).await {
            Ok(_) => run.finish().await,
            Err(e) => {
                if let Err(gc) = run.finish().await {
                    warn!(error = %gc, "Failed to release run after root failure");
                }
                Err(e)
            }
        }
    }

    /// [`Engine::invoke`] by qualified name, e.g. `Requesting.request`.
    pub async fn invoke_named(&self, qualified: &str, input: Payload) -> Result<RunReport> {
        let action = self
            .registry
            .lookup(qualified)
            .ok_or_else(|| EngineError::UnknownAction(qualified.to_string()))?;
        self.invoke(action, input).await
    }
}

/// Collects rules at process start. There is no registration after `build`.
pub struct EngineBuilder<P: RecordPersister> {
    registry: Registry,
    syncs: Vec<Synchronization>,
    persister: P,
    config: EngineConfig,
}

impl<P: RecordPersister> EngineBuilder<P> {
    pub fn with_persister<Q: RecordPersister>(self, persister: Q) -> EngineBuilder<Q> {
        EngineBuilder {
            registry: self.registry,
            syncs: self.syncs,
            persister,
            config: self.config,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Instantiate `def` with fresh variables and add it to the rule set.
    pub fn with_sync(mut self, name: &str, def: SyncDef) -> Result<Self> {
        let sync = Synchronization::instantiate(name, def, &self.registry)?;

        if sync.where_clause().is_none() {
            let missing: Vec<String> = sync
                .unbound_then_vars()
                .into_iter()
                .map(|v| sync.vars().describe(v))
                .collect();
            if !missing.is_empty() {
                warn!(sync = name, vars = ?missing, "then references variables no when pattern binds");
            }
        }

        debug!(
            sync = name,
            when = sync.when().len(),
            then = sync.then().len(),
            "Registered sync"
        );
        self.syncs.push(sync);
        Ok(self)
    }

    pub fn with_syncs(self, defs: &[(&str, SyncDef)]) -> Result<Self> {
        defs.iter()
            .try_fold(self, |builder, (name, def)| builder.with_sync(name, *def))
    }

    pub fn build(self) -> Engine<P> {
        info!(
            operations = self.registry.operations().count(),
            syncs = self.syncs.len(),
            max_depth = self.config.max_depth,
            "Engine built"
        );
        Engine {
            registry: self.registry,
            syncs: self.syncs,
            persister: self.persister,
            config: self.config,
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// A branch of the cascade that was abandoned. Sibling frames, other rules,
/// and already committed steps are unaffected.
#[derive(Debug, Clone, PartialEq)]
pub struct AbortedBranch {
    pub sync: String,
    /// The completion whose processing was abandoned.
    pub trigger_seq: i64,
    pub error: EngineError,
}

/// Everything a settled run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    /// Every completion of the run, in sequence order.
    pub records: Vec<InvocationRecord>,
    pub aborted: Vec<AbortedBranch>,
    /// Number of rule firings that dispatched at least one frame.
    pub fired: usize,
    pub cancelled: bool,
}

impl RunReport {
    /// The first externally triggered completion.
    pub fn root(&self) -> Option<&InvocationRecord> {
        self.records.iter().find(|r| r.depth == 0)
    }

    pub fn invocations_of<'a>(&'a self, qualified: &'a str) -> impl Iterator<Item = &'a InvocationRecord> {
        self.records.iter().filter(move |r| r.action == qualified)
    }

    pub fn count(&self, qualified: &str) -> usize {
        self.invocations_of(qualified).count()
    }
}

enum Work {
    /// A completion to match against every rule.
    Complete {
        action: ActionId,
        record: InvocationRecord,
    },
    /// Joined frames awaiting the rule's `where` clause.
    Evaluate {
        sync: usize,
        frames: Frames,
        trigger: InvocationRecord,
    },
    /// One resolved `then` action.
    Invoke {
        sync: usize,
        action: ActionId,
        input: Payload,
        trigger: InvocationRecord,
    },
}

/// One external request and everything it cascades into.
pub struct Run<'e, P: RecordPersister> {
    engine: &'e Engine<P>,
    id: String,
    /// Pending join slots, keyed by rule index.
    joins: HashMap<usize, JoinState>,
    /// Record ids already matched, so re-delivery is a no-op.
    seen: HashSet<Uuid>,
    aborted: Vec<AbortedBranch>,
    fired: usize,
    cancel: Option<Arc<AtomicBool>>,
    cancelled: bool,
    /// Set by `finish`; a run dropped before then releases its records on drop.
    settled: bool,
}

impl<'e, P: RecordPersister> Run<'e, P> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stop processing queued work once `flag` is set. Steps already
    /// committed stay committed.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn aborted(&self) -> &[AbortedBranch] {
        &self.aborted
    }

    /// Invoke an externally triggered action in this run. Returns once every
    /// rule reachable from its completion has finished dispatching.
    ///
    /// Unlike cascade steps, a root action that crashes is an error for the
    /// caller.
    pub async fn invoke(&mut self, action: ActionId, input: Payload) -> Result<InvocationRecord> {
        let engine = self.engine;
        if engine.registry.kind(action) != Some(OperationKind::Action) {
            return Err(EngineError::UnknownAction(engine.registry.qualified_name(action).to_string()).into());
        }
        let qualified = engine.registry.qualified_name(action).to_string();

        let output = engine
            .registry
            .perform(action, input.clone())
            .await
            .map_err(|e| EngineError::OperationFailed {
                action: qualified.clone(),
                message: format!("{e:#}"),
            })?;

        let record = engine
            .persister
            .persist(AppendRecord::new(qualified, input, output).with_run_id(&self.id))
            .await?;
        debug!(
            run_id = self.id.as_str(),
            action = record.action.as_str(),
            seq = record.seq,
            "Recorded root completion"
        );

        self.drain(vec![Work::Complete {
            action,
            record: record.clone(),
        }])
        .await?;
        Ok(record)
    }

    pub async fn invoke_named(&mut self, qualified: &str, input: Payload) -> Result<InvocationRecord> {
        let action = self
            .engine
            .registry
            .lookup(qualified)
            .ok_or_else(|| EngineError::UnknownAction(qualified.to_string()))?;
        self.invoke(action, input).await
    }

    /// Feed an already recorded completion of this run back through the
    /// rules. Completions this run has already processed are ignored.
    pub async fn deliver(&mut self, record: InvocationRecord) -> Result<()> {
        if record.run_id != self.id {
            return Err(EngineError::ForeignRecord {
                seq: record.seq,
                record_run: record.run_id,
                run: self.id.clone(),
            }
            .into());
        }
        let action = self
            .engine
            .registry
            .lookup(&record.action)
            .ok_or_else(|| EngineError::UnknownAction(record.action.clone()))?;
        self.drain(vec![Work::Complete { action, record }]).await
    }

    /// Settle the run: collect its records, then release them and every
    /// pending join slot.
    pub async fn finish(mut self) -> Result<RunReport> {
        let persister = &self.engine.persister;
        let records = persister.read_run(&self.id).await?;
        persister.forget_run(&self.id).await?;
        self.settled = true;

        let pending = self.joins.values().filter(|j| !j.is_idle()).count();
        info!(
            run_id = self.id.as_str(),
            records = records.len(),
            fired = self.fired,
            aborted = self.aborted.len(),
            pending_joins = pending,
            cancelled = self.cancelled,
            "Run settled"
        );

        Ok(RunReport {
            run_id: std::mem::take(&mut self.id),
            records,
            aborted: std::mem::take(&mut self.aborted),
            fired: self.fired,
            cancelled: self.cancelled,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    async fn drain(&mut self, mut stack: Vec<Work>) -> Result<()> {
        while let Some(work) = stack.pop() {
            if self.is_cancelled() {
                if !self.cancelled {
                    warn!(
                        run_id = self.id.as_str(),
                        dropped = stack.len() + 1,
                        "Run cancelled, dropping queued work"
                    );
                }
                self.cancelled = true;
                return Ok(());
            }

            match work {
                Work::Complete { action, record } => {
                    let next = self.complete(action, record);
                    stack.extend(next.into_iter().rev());
                }
                Work::Evaluate {
                    sync,
                    frames,
                    trigger,
                } => {
                    let next = self.evaluate(sync, frames, trigger).await;
                    stack.extend(next.into_iter().rev());
                }
                Work::Invoke {
                    sync,
                    action,
                    input,
                    trigger,
                } => {
                    if let Some(next) = self.dispatch(sync, action, input, trigger).await? {
                        stack.push(next);
                    }
                }
            }
        }
        Ok(())
    }

    /// Match a completion against every rule's `when` patterns and advance
    /// the joins it completes.
    fn complete(&mut self, action: ActionId, record: InvocationRecord) -> Vec<Work> {
        if !self.seen.insert(record.id) {
            debug!(
                run_id = self.id.as_str(),
                seq = record.seq,
                "Ignoring re-delivered completion"
            );
            return Vec::new();
        }

        let engine = self.engine;
        let mut next = Vec::new();

        for (index, sync) in engine.syncs.iter().enumerate() {
            let mut joined = Vec::new();
            for (slot, pattern) in sync.when().iter().enumerate() {
                let Some(frame) = unify(action, &record.input, &record.output, pattern) else {
                    continue;
                };
                let state = self
                    .joins
                    .entry(index)
                    .or_insert_with(|| JoinState::new(sync.when().len()));
                joined.extend(state.offer(slot, record.seq, frame));
            }

            if joined.is_empty() {
                continue;
            }
            debug!(
                run_id = self.id.as_str(),
                sync = sync.name(),
                seq = record.seq,
                frames = joined.len(),
                "Sync joined"
            );
            next.push(Work::Evaluate {
                sync: index,
                frames: joined.into_iter().map(|j| j.frame).collect(),
                trigger: record.clone(),
            });
        }

        next
    }

    /// Run the rule's `where` clause and resolve its `then` actions for
    /// every surviving frame.
    async fn evaluate(&mut self, index: usize, frames: Frames, trigger: InvocationRecord) -> Vec<Work> {
        let engine = self.engine;
        let sync = &engine.syncs[index];

        let frames = match sync.where_clause() {
            None => frames,
            Some(clause) => match AssertUnwindSafe(clause.apply(frames)).catch_unwind().await {
                Ok(Ok(frames)) => frames,
                Ok(Err(e)) => {
                    let error = match e.downcast_ref::<EngineError>() {
                        Some(engine_error) => sync.describe_error(engine_error.clone()),
                        None => EngineError::Callback(format!("{e:#}")),
                    };
                    self.abort(sync, trigger.seq, error);
                    return Vec::new();
                }
                Err(panic) => {
                    self.abort(sync, trigger.seq, EngineError::Callback(panic_message(&*panic)));
                    return Vec::new();
                }
            },
        };

        if frames.is_empty() {
            debug!(
                run_id = self.id.as_str(),
                sync = sync.name(),
                seq = trigger.seq,
                "Where clause left no frames"
            );
            return Vec::new();
        }

        self.fired += 1;
        info!(
            run_id = self.id.as_str(),
            sync = sync.name(),
            seq = trigger.seq,
            frames = frames.len(),
            "Sync fired"
        );

        let mut next = Vec::new();
        for frame in frames {
            let resolved: Result<Vec<(ActionId, Payload)>, EngineError> = sync
                .then()
                .iter()
                .map(|pattern| frame.resolve(&pattern.input).map(|input| (pattern.action, input)))
                .collect();

            match resolved {
                Ok(invocations) => next.extend(invocations.into_iter().map(|(action, input)| {
                    Work::Invoke {
                        sync: index,
                        action,
                        input,
                        trigger: trigger.clone(),
                    }
                })),
                Err(e) => self.abort(sync, trigger.seq, sync.describe_error(e)),
            }
        }
        next
    }

    /// Invoke one `then` action under the depth and cycle bounds and record
    /// its completion as a child of the trigger.
    async fn dispatch(
        &mut self,
        index: usize,
        action: ActionId,
        input: Payload,
        trigger: InvocationRecord,
    ) -> Result<Option<Work>> {
        let engine = self.engine;
        let sync = &engine.syncs[index];
        let qualified = engine.registry.qualified_name(action).to_string();

        let depth = trigger.depth + 1;
        if depth > engine.config.max_depth {
            self.abort(
                sync,
                trigger.seq,
                EngineError::DepthExceeded {
                    action: qualified,
                    depth,
                    limit: engine.config.max_depth,
                },
            );
            return Ok(None);
        }

        if engine.config.cycle_guard && self.repeats_ancestor(&qualified, &input, &trigger).await? {
            self.abort(sync, trigger.seq, EngineError::CycleDetected { action: qualified });
            return Ok(None);
        }

        let output = match engine.registry.perform(action, input.clone()).await {
            Ok(output) => output,
            Err(e) => {
                self.abort(
                    sync,
                    trigger.seq,
                    EngineError::OperationFailed {
                        action: qualified,
                        message: format!("{e:#}"),
                    },
                );
                return Ok(None);
            }
        };

        let record = engine
            .persister
            .persist_child(
                trigger.seq,
                AppendRecord::new(qualified, input, output)
                    .with_run_id(&self.id)
                    .with_depth(depth),
            )
            .await?;
        debug!(
            run_id = self.id.as_str(),
            sync = sync.name(),
            action = record.action.as_str(),
            seq = record.seq,
            depth,
            error = record.is_error(),
            "Recorded completion"
        );

        Ok(Some(Work::Complete { action, record }))
    }

    async fn repeats_ancestor(&self, action: &str, input: &Payload, trigger: &InvocationRecord) -> Result<bool> {
        let same = |r: &InvocationRecord| r.action == action && r.input == *input;
        if same(trigger) {
            return Ok(true);
        }
        let ancestors = self.engine.persister.ancestors(trigger.seq).await?;
        Ok(ancestors.iter().any(same))
    }

    fn abort(&mut self, sync: &Synchronization, trigger_seq: i64, err: EngineError) {
        match &err {
            EngineError::Callback(_) | EngineError::OperationFailed { .. } => error!(
                run_id = self.id.as_str(),
                sync = sync.name(),
                seq = trigger_seq,
                error = %err,
                "Branch aborted"
            ),
            _ => warn!(
                run_id = self.id.as_str(),
                sync = sync.name(),
                seq = trigger_seq,
                error = %err,
                "Branch aborted"
            ),
        }
        self.aborted.push(AbortedBranch {
            sync: sync.name().to_string(),
            trigger_seq,
            error: err,
        });
    }
}

impl<P: RecordPersister> Drop for Run<'_, P> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(run_id = self.id.as_str(), "Run dropped before settling, releasing its records");
        self.engine.persister.release_run(&self.id);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
