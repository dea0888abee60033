//! Generic list -> evaluate -> execute -> aggregate loop.
//!
//! One [`Orchestrator`] drives one service run. Each resource kind plugs in
//! through a [`ResourceAdapter`]; the control flow, the soft-fail policy and
//! the progress protocol live here once instead of once per service.
//!
//! ```text
//! Listing --> Evaluating <--> Executing --> Aggregating --> Done
//! ```
//!
//! Evaluation and execution interleave per resource so that each targeted
//! resource emits its `planned` and `completed` events back to back.

use crate::error::{CleanupError, RemoteError};
use crate::executor::Steps;
use crate::predicate::{Rejection, Verdict};
use crate::report::{DeletionReport, NullObserver, Observer, Summary, Tally};
use crate::resource::ResourceKind;
use crate::time::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Caller-supplied switches for one run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Mutate remote state. `false` (the default) is a dry-run.
    pub apply: bool,
    /// Resolved target-list override; empty means no override.
    pub only: Vec<String>,
}

impl RunOptions {
    /// Dry-run with no override.
    pub fn dry_run() -> Self {
        Self::default()
    }

    /// Apply mode with no override.
    pub fn apply() -> Self {
        Self {
            apply: true,
            only: Vec::new(),
        }
    }
}

/// State shared by every adapter during one run.
#[derive(Clone)]
pub struct RunContext {
    /// Captured once when the run starts.
    pub now: DateTime<Utc>,
    pub dry_run: bool,
    pub only: Vec<String>,
    pub observer: Arc<dyn Observer>,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("now", &self.now)
            .field("dry_run", &self.dry_run)
            .field("only", &self.only)
            .finish_non_exhaustive()
    }
}

impl RunContext {
    pub fn new(clock: &dyn Clock, options: &RunOptions, observer: Arc<dyn Observer>) -> Self {
        Self {
            now: clock.now(),
            dry_run: !options.apply,
            only: options.only.clone(),
            observer,
        }
    }

    /// A silent context at a fixed instant.
    pub fn quiet(now: DateTime<Utc>, options: &RunOptions) -> Self {
        Self {
            now,
            dry_run: !options.apply,
            only: options.only.clone(),
            observer: Arc::new(NullObserver),
        }
    }

    /// The override list, if one was supplied.
    pub fn only(&self) -> Option<&[String]> {
        (!self.only.is_empty()).then_some(self.only.as_slice())
    }
}

/// Capability set for one resource variant.
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    /// Listed snapshot of one resource.
    type Resource: Send + Sync;
    /// Sub-resources and switches resolved before execution.
    type Plan: Send + Sync;

    fn kind(&self) -> ResourceKind;

    /// Identifier used for allow/deny lists and report keys.
    fn id<'r>(&self, resource: &'r Self::Resource) -> &'r str;

    /// Fully materialised candidate set. Failure aborts the run.
    async fn list(&self) -> Result<Vec<Self::Resource>, RemoteError>;

    /// Decide whether `resource` is in scope.
    async fn evaluate(&self, resource: &Self::Resource, ctx: &RunContext) -> Verdict;

    /// Describe what deleting a targeted resource involves.
    async fn plan(
        &self,
        resource: &Self::Resource,
        ctx: &RunContext,
        steps: &mut Steps<'_>,
    ) -> Self::Plan;

    /// Plan for a kept resource whose sub-resources may still be swept.
    async fn partial_plan(
        &self,
        _resource: &Self::Resource,
        _rejection: &Rejection,
        _ctx: &RunContext,
    ) -> Option<Self::Plan> {
        None
    }

    /// Sub-item counts announced in the `planned` event.
    fn scope(&self, plan: &Self::Plan) -> Tally;

    /// Perform the ordered deletion, recording every stage in `steps`.
    async fn execute(&self, resource: &Self::Resource, plan: Self::Plan, steps: &mut Steps<'_>);
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Listing,
    Evaluating,
    Executing,
    Aggregating,
    Done,
}

/// Drives adapters for one service and owns its [`Summary`].
pub struct Orchestrator<'c> {
    ctx: &'c RunContext,
    summary: Summary,
    stage: Stage,
}

impl fmt::Debug for Orchestrator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("service", &self.summary.service)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

impl<'c> Orchestrator<'c> {
    pub fn new(service: &'static str, ctx: &'c RunContext) -> Self {
        Self {
            ctx,
            summary: Summary::new(service, ctx.dry_run),
            stage: Stage::Listing,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn enter(&mut self, stage: Stage) {
        if self.stage != stage {
            tracing::trace!("{}: {:?} -> {:?}", self.summary.service, self.stage, stage);
            self.stage = stage;
        }
    }

    /// Sweep every resource `adapter` lists.
    ///
    /// # Errors
    ///
    /// Returns [`CleanupError::Listing`] if the candidate set cannot be
    /// enumerated. Per-resource failures never surface here.
    pub async fn run<A: ResourceAdapter>(&mut self, adapter: &A) -> Result<(), CleanupError> {
        let ctx = self.ctx;
        let kind = adapter.kind();

        self.enter(Stage::Listing);
        let resources = adapter
            .list()
            .await
            .map_err(|e| CleanupError::listing(kind, e))?;
        tracing::debug!("Listed {} {kind} resource(s)", resources.len());
        self.summary.record_scanned(kind, resources.len());

        for resource in &resources {
            let id = adapter.id(resource);

            self.enter(Stage::Evaluating);
            let mut steps = Steps::new(id, ctx.dry_run, ctx.observer.as_ref());
            let plan = match adapter.evaluate(resource, ctx).await {
                Verdict::Target => {
                    tracing::info!("Processing {kind} {id}");
                    adapter.plan(resource, ctx, &mut steps).await
                }
                Verdict::Keep(rejection) => {
                    tracing::debug!("Skipping {kind} {id}: {rejection}");
                    match adapter.partial_plan(resource, &rejection, ctx).await {
                        Some(plan) => plan,
                        None => continue,
                    }
                }
            };

            let report = DeletionReport::planned(id, kind, adapter.scope(&plan), ctx.dry_run);
            ctx.observer.progress(&report);

            self.enter(Stage::Executing);
            adapter.execute(resource, plan, &mut steps).await;
            let (deleted, notes) = steps.finish();

            self.enter(Stage::Aggregating);
            let report = report.complete(deleted, notes);
            ctx.observer.progress(&report);
            self.summary.record(report);
        }
        Ok(())
    }

    /// Close the run and hand back its summary.
    pub fn finish(mut self) -> Summary {
        self.enter(Stage::Done);
        self.summary
    }
}
