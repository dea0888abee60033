//! Progress/reporting protocol.
//!
//! Each targeted resource produces exactly two events, `planned` and then
//! `completed`, both keyed by the resource identifier. Consumers treat the
//! stream as update-in-place: a later event for the same identifier replaces
//! the earlier one. Nothing is guaranteed about ordering across resources.

use crate::resource::ResourceKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Countable sub-items touched by a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Item {
    Objects,
    Versions,
    Buckets,
    Instances,
    Volumes,
    Snapshots,
    Functions,
    FunctionVersions,
    LogGroups,
    LogStreams,
    Roles,
    Users,
    Policies,
    PolicyVersions,
    AttachedPolicies,
    InlinePolicies,
    InstanceProfiles,
    AccessKeys,
    GroupMemberships,
    LoginProfiles,
}

impl Item {
    /// Stable snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Objects => "objects",
            Self::Versions => "versions",
            Self::Buckets => "buckets",
            Self::Instances => "instances",
            Self::Volumes => "volumes",
            Self::Snapshots => "snapshots",
            Self::Functions => "functions",
            Self::FunctionVersions => "function_versions",
            Self::LogGroups => "log_groups",
            Self::LogStreams => "log_streams",
            Self::Roles => "roles",
            Self::Users => "users",
            Self::Policies => "policies",
            Self::PolicyVersions => "policy_versions",
            Self::AttachedPolicies => "attached_policies",
            Self::InlinePolicies => "inline_policies",
            Self::InstanceProfiles => "instance_profiles",
            Self::AccessKeys => "access_keys",
            Self::GroupMemberships => "group_memberships",
            Self::LoginProfiles => "login_profiles",
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-item counters. Zero entries are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tally(BTreeMap<Item, u64>);

impl Tally {
    /// Empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` to `item`.
    pub fn add(&mut self, item: Item, n: u64) {
        if n > 0 {
            *self.0.entry(item).or_insert(0) += n;
        }
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, item: Item, n: u64) -> Self {
        self.add(item, n);
        self
    }

    /// Count for `item` (zero when absent).
    pub fn get(&self, item: Item) -> u64 {
        self.0.get(&item).copied().unwrap_or(0)
    }

    /// Fold another tally into this one.
    pub fn merge(&mut self, other: &Tally) {
        for (item, n) in &other.0 {
            self.add(*item, *n);
        }
    }

    /// Sum across all items.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate non-zero counters in item order.
    pub fn iter(&self) -> impl Iterator<Item = (Item, u64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }
}

/// Lifecycle of one deletion report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Planned,
    Completed,
}

/// What happened (or would happen) to one targeted resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletionReport {
    pub resource: String,
    pub kind: ResourceKind,
    pub status: ReportStatus,
    /// Scope of the intended operation.
    pub planned: Tally,
    /// Actual outcome. Always empty in dry-run.
    pub deleted: Tally,
    pub dry_run: bool,
    /// Reasons for sub-steps that were skipped or failed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl DeletionReport {
    /// A freshly targeted resource.
    pub fn planned(
        resource: impl Into<String>,
        kind: ResourceKind,
        planned: Tally,
        dry_run: bool,
    ) -> Self {
        Self {
            resource: resource.into(),
            kind,
            status: ReportStatus::Planned,
            planned,
            deleted: Tally::new(),
            dry_run,
            notes: Vec::new(),
        }
    }

    /// Transition `planned -> completed`. Consumes the report so a completed
    /// report cannot be completed twice.
    pub fn complete(mut self, deleted: Tally, notes: Vec<String>) -> Self {
        debug_assert_eq!(self.status, ReportStatus::Planned);
        self.status = ReportStatus::Completed;
        self.deleted = if self.dry_run { Tally::new() } else { deleted };
        self.notes = notes;
        self
    }
}

/// A snapshot of one report, emitted to observers.
pub type ProgressEvent = DeletionReport;

/// Accumulated result of one service run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub service: &'static str,
    pub dry_run: bool,
    pub scanned: BTreeMap<ResourceKind, u64>,
    pub targeted: BTreeMap<ResourceKind, u64>,
    pub planned: Tally,
    pub deleted: Tally,
    pub reports: Vec<DeletionReport>,
}

impl Summary {
    /// Empty summary for `service`.
    pub fn new(service: &'static str, dry_run: bool) -> Self {
        Self {
            service,
            dry_run,
            scanned: BTreeMap::new(),
            targeted: BTreeMap::new(),
            planned: Tally::new(),
            deleted: Tally::new(),
            reports: Vec::new(),
        }
    }

    pub(crate) fn record_scanned(&mut self, kind: ResourceKind, n: usize) {
        *self.scanned.entry(kind).or_insert(0) += n as u64;
    }

    pub(crate) fn record(&mut self, report: DeletionReport) {
        *self.targeted.entry(report.kind).or_insert(0) += 1;
        self.planned.merge(&report.planned);
        self.deleted.merge(&report.deleted);
        self.reports.push(report);
    }

    /// Resources of `kind` listed.
    pub fn scanned(&self, kind: ResourceKind) -> u64 {
        self.scanned.get(&kind).copied().unwrap_or(0)
    }

    /// Resources of `kind` that passed evaluation.
    pub fn targeted(&self, kind: ResourceKind) -> u64 {
        self.targeted.get(&kind).copied().unwrap_or(0)
    }

    /// Items of `item` actually deleted.
    pub fn deleted(&self, item: Item) -> u64 {
        self.deleted.get(item)
    }

    /// Items of `item` in scope.
    pub fn planned(&self, item: Item) -> u64 {
        self.planned.get(item)
    }

    /// Total resources targeted across kinds.
    pub fn total_targeted(&self) -> u64 {
        self.targeted.values().sum()
    }
}

/// Observer injected into the orchestrator.
///
/// Receives structured progress events and soft-failure warnings without
/// coupling the core to any particular terminal or log sink.
pub trait Observer: Send + Sync {
    /// A report changed state.
    fn progress(&self, event: &ProgressEvent);

    /// A soft failure worth surfacing to the operator.
    fn warning(&self, resource: &str, message: &str);
}

impl<T: Observer + ?Sized> Observer for std::sync::Arc<T> {
    fn progress(&self, event: &ProgressEvent) {
        (**self).progress(event);
    }
    fn warning(&self, resource: &str, message: &str) {
        (**self).warning(resource, message);
    }
}

/// A no-op observer for silent runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn progress(&self, _: &ProgressEvent) {}
    fn warning(&self, _: &str, _: &str) {}
}
