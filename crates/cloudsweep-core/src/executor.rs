//! Deletion executor building blocks.
//!
//! Every mutating call goes through [`Steps::run`], which turns it into a
//! typed [`StepResult`] instead of letting an error escape: dry-run calls are
//! never issued, remote failures are logged as warnings and recorded as notes
//! on the resource's report, and the caller decides whether the next stage
//! still makes sense.

use crate::error::RemoteError;
use crate::report::{Item, Observer, Tally};
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;

/// A mutating call that took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deleted;

/// Why a mutating call did not take effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Dry-run: the call was logged, not issued.
    DryRun,
    /// The remote side rejected the call.
    Remote(RemoteError),
    /// An earlier stage this one depends on did not complete.
    Blocked(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DryRun => f.write_str("dry-run"),
            Self::Remote(e) => write!(f, "{e}"),
            Self::Blocked(why) => write!(f, "blocked: {why}"),
        }
    }
}

/// A skipped step and its reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped(pub SkipReason);

/// Result of one deletion stage.
pub type StepResult = Result<Deleted, Skipped>;

/// Per-resource ledger of executed stages.
///
/// Counts successes into a [`Tally`] and collects failure notes. Each stage is
/// independent: a failure here never prevents the caller from attempting the
/// next stage.
pub struct Steps<'a> {
    resource: &'a str,
    dry_run: bool,
    observer: &'a dyn Observer,
    deleted: Tally,
    notes: Vec<String>,
}

impl fmt::Debug for Steps<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Steps")
            .field("resource", &self.resource)
            .field("dry_run", &self.dry_run)
            .field("deleted", &self.deleted)
            .finish_non_exhaustive()
    }
}

impl<'a> Steps<'a> {
    pub fn new(resource: &'a str, dry_run: bool, observer: &'a dyn Observer) -> Self {
        Self {
            resource,
            dry_run,
            observer,
            deleted: Tally::new(),
            notes: Vec::new(),
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Issue one mutating call counted as one `item`.
    ///
    /// `action` describes the call for logs ("delete volume vol-1").
    pub async fn run<F>(&mut self, item: Item, action: &str, call: F) -> StepResult
    where
        F: Future<Output = Result<(), RemoteError>>,
    {
        if self.dry_run {
            tracing::info!("Dry run: would {action}");
            return Err(Skipped(SkipReason::DryRun));
        }
        match call.await {
            Ok(()) => {
                tracing::info!("{}", capitalize(action));
                self.deleted.add(item, 1);
                Ok(Deleted)
            }
            Err(e) => {
                self.fail(action, &e);
                Err(Skipped(SkipReason::Remote(e)))
            }
        }
    }

    /// Like [`run`](Self::run), but a "not found" answer means the thing was
    /// already gone: nothing is counted and nothing is noted.
    pub async fn run_if_present<F>(&mut self, item: Item, action: &str, call: F) -> StepResult
    where
        F: Future<Output = Result<(), RemoteError>>,
    {
        if self.dry_run {
            tracing::info!("Dry run: would {action}");
            return Err(Skipped(SkipReason::DryRun));
        }
        match call.await {
            Ok(()) => {
                tracing::info!("{}", capitalize(action));
                self.deleted.add(item, 1);
                Ok(Deleted)
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!("Nothing to {action}: {e}");
                Err(Skipped(SkipReason::Remote(e)))
            }
            Err(e) => {
                self.fail(action, &e);
                Err(Skipped(SkipReason::Remote(e)))
            }
        }
    }

    /// Record a stage that was not attempted because a dependency failed.
    pub fn block(&mut self, action: &str, why: &str) -> StepResult {
        if self.dry_run {
            return Err(Skipped(SkipReason::DryRun));
        }
        tracing::debug!("Skipping {action} for {}: {why}", self.resource);
        self.notes.push(format!("skipped {action}: {why}"));
        Err(Skipped(SkipReason::Blocked(why.to_string())))
    }

    /// Record a failed read that a later stage depended on.
    pub fn lookup_failed(&mut self, what: &str, err: &RemoteError) {
        self.fail(what, err);
    }

    /// Add successes counted outside [`run`](Self::run) (bulk deletes).
    pub fn count(&mut self, item: Item, n: u64) {
        if !self.dry_run {
            self.deleted.add(item, n);
        }
    }

    /// Note a failure that did not come from a single call.
    pub fn note(&mut self, message: String) {
        self.observer.warning(self.resource, &message);
        self.notes.push(message);
    }

    fn fail(&mut self, action: &str, err: &RemoteError) {
        tracing::warn!("Could not {action}: {err}");
        self.note(format!("could not {action}: {err}"));
    }

    /// Deleted tally and notes accumulated so far.
    pub fn finish(self) -> (Tally, Vec<String>) {
        (self.deleted, self.notes)
    }
}

fn capitalize(action: &str) -> String {
    let mut chars = action.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Result of a sequence of bulk delete requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Items the remote side confirmed deleted (would-be-deleted in dry-run).
    pub affected: u64,
    /// Bulk requests issued (zero in dry-run).
    pub requests: usize,
    /// Requests that failed outright.
    pub failed_requests: usize,
}

/// Delete `items` in sequential batches of at most `batch_size`.
///
/// `send` issues one bulk request and returns how many items the remote side
/// reported deleted. In dry-run no request is made and every candidate counts
/// as would-be-deleted. A failed batch is logged and skipped; later batches
/// are still sent.
pub async fn delete_in_batches<T, F, Fut>(
    items: &[T],
    batch_size: NonZeroUsize,
    dry_run: bool,
    label: &str,
    mut send: F,
) -> BatchOutcome
where
    T: Clone,
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<u64, RemoteError>>,
{
    let mut outcome = BatchOutcome::default();
    for batch in items.chunks(batch_size.get()) {
        if dry_run {
            tracing::info!("Dry run: would delete {} {label}", batch.len());
            outcome.affected += batch.len() as u64;
            continue;
        }
        outcome.requests += 1;
        match send(batch.to_vec()).await {
            Ok(n) => outcome.affected += n,
            Err(e) => {
                tracing::warn!("Bulk delete of {} {label} failed: {e}", batch.len());
                outcome.failed_requests += 1;
            }
        }
    }
    outcome
}
