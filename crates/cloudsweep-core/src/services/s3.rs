//! Object storage cleanup: expire objects and versions, then optionally
//! remove buckets that end up empty.

use crate::error::{CleanupError, PolicyError, RemoteError};
use crate::executor::{BatchOutcome, Steps, delete_in_batches};
use crate::orchestrator::{Orchestrator, ResourceAdapter, RunContext};
use crate::policy::{self, Hazard};
use crate::predicate::{Criteria, NameMatcher, Subject, TagRequirement, TagView, Verdict};
use crate::report::{Item, Summary, Tally};
use crate::resource::{Bucket, ResourceKind, StoredObject, Tags};
use crate::services::Service;
use crate::time::Retention;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Largest number of keys one bulk delete request accepts.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Remote operations the bucket cleanup needs.
#[async_trait]
pub trait S3Api: Send + Sync {
    /// Every bucket in the account with its creation time.
    async fn list_buckets(&self) -> Result<Vec<Bucket>, RemoteError>;

    /// Tag set of one bucket. A bucket without tags yields an empty map.
    async fn bucket_tags(&self, bucket: &str) -> Result<Tags, RemoteError>;

    /// Every current object, pagination resolved.
    async fn list_objects(&self, bucket: &str) -> Result<Vec<StoredObject>, RemoteError>;

    /// Every object version and delete marker, pagination resolved.
    async fn list_object_versions(&self, bucket: &str) -> Result<Vec<StoredObject>, RemoteError>;

    /// Bulk delete of at most [`MAX_DELETE_BATCH`] entries. Returns how many
    /// the remote side confirmed.
    async fn delete_objects(
        &self,
        bucket: &str,
        objects: &[StoredObject],
    ) -> Result<u64, RemoteError>;

    /// Whether at least one current object remains.
    async fn has_objects(&self, bucket: &str) -> Result<bool, RemoteError>;

    /// Whether at least one version or delete marker remains.
    async fn has_versions(&self, bucket: &str) -> Result<bool, RemoteError>;

    /// Remove an empty bucket.
    async fn delete_bucket(&self, bucket: &str) -> Result<(), RemoteError>;
}

/// Bucket cleanup policy (`[s3]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct S3Policy {
    /// Literal name prefixes; a bucket matching any prefix or pattern passes.
    pub bucket_prefixes: Vec<String>,
    /// Glob patterns over bucket names.
    pub name_patterns: Vec<String>,
    /// When non-empty, only these buckets are considered.
    pub target_buckets: Vec<String>,
    /// Buckets that are never touched.
    pub ignore_buckets: Vec<String>,
    /// Minimum bucket age in days. `None` skips the check.
    #[serde(with = "policy::days")]
    pub bucket_retention_days: Option<u32>,
    /// Minimum object age in days. `None` selects objects of any age.
    #[serde(with = "policy::days")]
    pub object_retention_days: Option<u32>,
    /// Delete a targeted bucket once the run has left it empty.
    pub delete_empty_buckets: bool,
    /// Delete every object in a targeted bucket, whatever its age.
    pub delete_all_objects: bool,
    /// Also delete noncurrent versions and delete markers.
    pub include_versioned_objects: bool,
    /// Bucket tag that must be present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_tag: Option<TagRequirement>,
    /// Entries per DeleteObjects call, at most [`MAX_DELETE_BATCH`].
    pub max_delete_batch: usize,
}

impl Default for S3Policy {
    fn default() -> Self {
        Self {
            bucket_prefixes: Vec::new(),
            name_patterns: Vec::new(),
            target_buckets: Vec::new(),
            ignore_buckets: Vec::new(),
            bucket_retention_days: Some(30),
            object_retention_days: Some(30),
            delete_empty_buckets: false,
            delete_all_objects: false,
            include_versioned_objects: true,
            require_tag: None,
            max_delete_batch: MAX_DELETE_BATCH,
        }
    }
}

impl S3Policy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        self.batch_size()?;
        NameMatcher::with_prefixes(&self.name_patterns, &self.bucket_prefixes)?;
        policy::validate_selection(&[], self.require_tag.as_ref())
    }

    pub fn hazards(&self) -> Vec<Hazard> {
        let mut hazards = Vec::new();
        if self.delete_all_objects {
            hazards.push(Hazard::DeleteAllObjects);
        }
        hazards.extend(policy::zero_retention(
            Service::S3,
            &[
                ("object_retention_days", self.object_retention_days),
                ("bucket_retention_days", self.bucket_retention_days),
            ],
        ));
        hazards
    }

    fn batch_size(&self) -> Result<NonZeroUsize, PolicyError> {
        NonZeroUsize::new(self.max_delete_batch)
            .filter(|n| n.get() <= MAX_DELETE_BATCH)
            .ok_or(PolicyError::BatchSize {
                got: self.max_delete_batch,
                max: MAX_DELETE_BATCH,
            })
    }

    /// Bucket age is not checked when everything goes and the threshold is zero.
    fn bucket_retention(&self) -> Option<Retention> {
        if self.delete_all_objects && self.bucket_retention_days == Some(0) {
            return None;
        }
        Retention::from_days(self.bucket_retention_days)
    }

    /// Entries selected for deletion out of one listing.
    fn select(&self, listed: &[StoredObject], now: DateTime<Utc>) -> Vec<StoredObject> {
        if self.delete_all_objects {
            return listed.to_vec();
        }
        let Some(retention) = Retention::from_days(self.object_retention_days) else {
            return Vec::new();
        };
        listed
            .iter()
            .filter(|o| !retention.protects(o.last_modified, now))
            .cloned()
            .collect()
    }
}

/// Version id S3 gives objects written while versioning was never enabled.
pub const NULL_VERSION: &str = "null";

/// What a targeted bucket's deletion involves.
#[derive(Debug, Clone, Default)]
pub struct BucketPlan {
    /// Current objects, addressed by version id whenever the version listing
    /// covers their key.
    pub objects: Vec<StoredObject>,
    /// Noncurrent versions and delete markers.
    pub versions: Vec<StoredObject>,
    /// Every listed entry is selected, so the bucket should end up empty.
    pub drains: bool,
}

/// One listing and the share of it the policy selects.
struct Listing {
    listed: Vec<StoredObject>,
    selected: Vec<StoredObject>,
}

impl Listing {
    fn drained(&self) -> bool {
        self.listed.len() == self.selected.len()
    }
}

/// One deletion target per `(key, version)`.
///
/// A current object whose key shows up in the version listing is left to its
/// versioned entry: a key-only delete on a versioned bucket only stacks a
/// delete marker on top.
pub fn merge_targets(
    current: Vec<StoredObject>,
    listed_versions: &[StoredObject],
    selected_versions: Vec<StoredObject>,
) -> Vec<StoredObject> {
    let covered: BTreeSet<&str> = listed_versions.iter().map(|v| v.key.as_str()).collect();
    let mut merged = BTreeMap::new();
    let key_only = current.into_iter().filter(|o| !covered.contains(o.key.as_str()));
    for entry in key_only.chain(selected_versions) {
        merged
            .entry((entry.key.clone(), entry.version_id.clone()))
            .or_insert(entry);
    }
    merged.into_values().collect()
}

/// Whether key-only deletes of `selected` leave nothing behind in the
/// version listing: only null versions of those same keys may remain.
fn leaves_no_versions(listed_versions: &[StoredObject], selected: &[StoredObject]) -> bool {
    let keys: BTreeSet<&str> = selected.iter().map(|o| o.key.as_str()).collect();
    listed_versions.iter().all(|v| {
        v.current && v.version_id.as_deref() == Some(NULL_VERSION) && keys.contains(v.key.as_str())
    })
}

/// [`ResourceAdapter`] for buckets.
pub struct BucketAdapter {
    api: Arc<dyn S3Api>,
    policy: S3Policy,
    names: NameMatcher,
    batch: NonZeroUsize,
}

impl BucketAdapter {
    /// # Errors
    ///
    /// Returns a [`PolicyError`] if `policy` does not validate.
    pub fn new(api: Arc<dyn S3Api>, policy: S3Policy) -> Result<Self, PolicyError> {
        policy.validate()?;
        let names = NameMatcher::with_prefixes(&policy.name_patterns, &policy.bucket_prefixes)?;
        let batch = policy.batch_size()?;
        Ok(Self {
            api,
            policy,
            names,
            batch,
        })
    }

    fn criteria<'a>(&'a self, ctx: &'a RunContext) -> Criteria<'a> {
        Criteria {
            targets: &self.policy.target_buckets,
            only: ctx.only(),
            ignore: &self.policy.ignore_buckets,
            states: None,
            names: Some(&self.names),
            retention: self.policy.bucket_retention(),
            min_size: None,
            require_tag: self.policy.require_tag.as_ref(),
        }
    }

    /// The listing and its selected share; `None` when the listing failed.
    fn collect(
        &self,
        listing: Result<Vec<StoredObject>, RemoteError>,
        what: &str,
        now: DateTime<Utc>,
        steps: &mut Steps<'_>,
    ) -> Option<Listing> {
        match listing {
            Ok(listed) => {
                let selected = self.policy.select(&listed, now);
                Some(Listing { listed, selected })
            }
            Err(e) => {
                steps.lookup_failed(what, &e);
                None
            }
        }
    }

    /// Re-check emptiness against the remote side after the bulk deletes.
    async fn verify_empty(&self, bucket: &str, steps: &mut Steps<'_>) -> bool {
        match self.api.has_objects(bucket).await {
            Ok(false) => {}
            Ok(true) => {
                let _ = steps.block(&format!("delete bucket {bucket}"), "objects remain");
                return false;
            }
            Err(e) => {
                steps.lookup_failed(&format!("check objects in {bucket}"), &e);
                return false;
            }
        }
        match self.api.has_versions(bucket).await {
            Ok(false) => true,
            Ok(true) => {
                let _ = steps.block(&format!("delete bucket {bucket}"), "versions remain");
                false
            }
            Err(e) => {
                steps.lookup_failed(&format!("check versions in {bucket}"), &e);
                false
            }
        }
    }
}

fn record_batches(steps: &mut Steps<'_>, item: Item, sent: usize, outcome: BatchOutcome) {
    steps.count(item, outcome.affected);
    if steps.dry_run() {
        return;
    }
    if outcome.failed_requests > 0 {
        steps.note(format!(
            "{} of {} bulk delete request(s) for {item} failed",
            outcome.failed_requests, outcome.requests
        ));
    } else if outcome.affected < sent as u64 {
        steps.note(format!(
            "{} of {sent} {item} were not deleted",
            sent as u64 - outcome.affected
        ));
    }
}

#[async_trait]
impl ResourceAdapter for BucketAdapter {
    type Resource = Bucket;
    type Plan = BucketPlan;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Bucket
    }

    fn id<'r>(&self, bucket: &'r Bucket) -> &'r str {
        &bucket.name
    }

    async fn list(&self) -> Result<Vec<Bucket>, RemoteError> {
        self.api.list_buckets().await
    }

    async fn evaluate(&self, bucket: &Bucket, ctx: &RunContext) -> Verdict {
        let criteria = self.criteria(ctx);
        let subject = Subject {
            created: Some(bucket.created),
            tags: TagView::Deferred,
            ..Subject::named(&bucket.name)
        };
        let verdict = criteria.evaluate(&subject, ctx.now);
        if !verdict.is_target() || criteria.require_tag.is_none() {
            return verdict;
        }
        let tags = self.api.bucket_tags(&bucket.name).await;
        criteria.check_tags(tags.as_ref())
    }

    async fn plan(&self, bucket: &Bucket, ctx: &RunContext, steps: &mut Steps<'_>) -> BucketPlan {
        let name = bucket.name.as_str();

        let listing = self.api.list_objects(name).await;
        let objects = self.collect(listing, &format!("list objects in {name}"), ctx.now, steps);

        // Listed even when versions are out of scope, to tell whether the
        // bucket can drain.
        let policy = &self.policy;
        let versions = if policy.include_versioned_objects || policy.delete_empty_buckets {
            let listing = self.api.list_object_versions(name).await;
            self.collect(listing, &format!("list versions in {name}"), ctx.now, steps)
        } else {
            None
        };

        let objects_drained = objects.as_ref().is_some_and(Listing::drained);
        let current = objects.map(|l| l.selected).unwrap_or_default();
        let (targets, drains) = match versions {
            Some(versions) if policy.include_versioned_objects => {
                let drains = objects_drained && versions.drained();
                let merged = merge_targets(current, &versions.listed, versions.selected);
                (merged, drains)
            }
            Some(versions) => {
                let drains = objects_drained && leaves_no_versions(&versions.listed, &current);
                (current, drains)
            }
            None => (current, false),
        };

        let (objects, versions): (Vec<_>, Vec<_>) = targets.into_iter().partition(|o| o.current);
        BucketPlan {
            objects,
            versions,
            drains,
        }
    }

    fn scope(&self, plan: &BucketPlan) -> Tally {
        let bucket = u64::from(self.policy.delete_empty_buckets && plan.drains);
        Tally::new()
            .with(Item::Objects, plan.objects.len() as u64)
            .with(Item::Versions, plan.versions.len() as u64)
            .with(Item::Buckets, bucket)
    }

    async fn execute(&self, bucket: &Bucket, plan: BucketPlan, steps: &mut Steps<'_>) {
        let name = bucket.name.as_str();
        let api = self.api.as_ref();

        for (item, entries) in [(Item::Objects, &plan.objects), (Item::Versions, &plan.versions)] {
            if entries.is_empty() {
                continue;
            }
            let outcome = delete_in_batches(
                entries,
                self.batch,
                steps.dry_run(),
                item.as_str(),
                |batch| async move { api.delete_objects(name, &batch).await },
            )
            .await;
            record_batches(steps, item, entries.len(), outcome);
        }

        if !self.policy.delete_empty_buckets {
            return;
        }
        let empty = if steps.dry_run() {
            plan.drains
        } else {
            self.verify_empty(name, steps).await
        };
        if empty {
            let _ = steps
                .run(Item::Buckets, &format!("delete bucket {name}"), api.delete_bucket(name))
                .await;
        }
    }
}

/// Sweep every bucket the policy selects.
///
/// # Errors
///
/// Fails on an invalid policy or when buckets cannot be listed.
pub async fn run_cleanup(
    api: Arc<dyn S3Api>,
    policy: &S3Policy,
    ctx: &RunContext,
) -> Result<Summary, CleanupError> {
    let adapter = BucketAdapter::new(api, policy.clone())?;
    let mut orchestrator = Orchestrator::new(Service::S3.as_str(), ctx);
    orchestrator.run(&adapter).await?;
    Ok(orchestrator.finish())
}
