//! Block storage cleanup: unattached volumes and old snapshots.

use crate::error::{CleanupError, PolicyError, RemoteError};
use crate::executor::Steps;
use crate::orchestrator::{Orchestrator, ResourceAdapter, RunContext};
use crate::policy::{self, Hazard};
use crate::predicate::{Criteria, Subject, TagRequirement, TagView, Verdict};
use crate::report::{Item, Summary, Tally};
use crate::resource::{ResourceKind, Snapshot, Volume};
use crate::services::Service;
use crate::services::ec2::Ec2Api;
use crate::time::Retention;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Block storage cleanup policy (`[ebs]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EbsPolicy {
    pub target_volumes: Vec<String>,
    pub ignore_volumes: Vec<String>,
    pub target_states: Vec<String>,
    #[serde(with = "policy::days")]
    pub volume_retention_days: Option<u32>,
    /// Smaller volumes are kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_volume_size_gb: Option<i64>,
    pub include_snapshots: bool,
    pub target_snapshots: Vec<String>,
    pub ignore_snapshots: Vec<String>,
    #[serde(with = "policy::days")]
    pub snapshot_retention_days: Option<u32>,
    /// Applies to volumes and snapshots alike.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_tag: Option<TagRequirement>,
}

impl Default for EbsPolicy {
    fn default() -> Self {
        Self {
            target_volumes: Vec::new(),
            ignore_volumes: Vec::new(),
            target_states: vec!["available".to_string()],
            volume_retention_days: Some(7),
            min_volume_size_gb: Some(1),
            include_snapshots: true,
            target_snapshots: Vec::new(),
            ignore_snapshots: Vec::new(),
            snapshot_retention_days: Some(30),
            require_tag: None,
        }
    }
}

impl EbsPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.target_states.is_empty() {
            return Err(PolicyError::EmptyStates {
                field: "target_states",
            });
        }
        policy::validate_selection(&[], self.require_tag.as_ref())
    }

    pub fn hazards(&self) -> Vec<Hazard> {
        let mut fields = vec![("volume_retention_days", self.volume_retention_days)];
        if self.include_snapshots {
            fields.push(("snapshot_retention_days", self.snapshot_retention_days));
        }
        policy::zero_retention(Service::Ebs, &fields)
    }
}

/// [`ResourceAdapter`] for unattached volumes.
pub struct VolumeAdapter {
    api: Arc<dyn Ec2Api>,
    policy: EbsPolicy,
}

impl VolumeAdapter {
    pub fn new(api: Arc<dyn Ec2Api>, policy: EbsPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self { api, policy })
    }
}

#[async_trait]
impl ResourceAdapter for VolumeAdapter {
    type Resource = Volume;
    type Plan = ();

    fn kind(&self) -> ResourceKind {
        ResourceKind::Volume
    }

    fn id<'r>(&self, volume: &'r Volume) -> &'r str {
        &volume.id
    }

    async fn list(&self) -> Result<Vec<Volume>, RemoteError> {
        self.api.list_volumes().await
    }

    async fn evaluate(&self, volume: &Volume, ctx: &RunContext) -> Verdict {
        let criteria = Criteria {
            targets: &self.policy.target_volumes,
            only: ctx.only(),
            ignore: &self.policy.ignore_volumes,
            states: Some(self.policy.target_states.as_slice()),
            names: None,
            retention: Retention::from_days(self.policy.volume_retention_days),
            min_size: self.policy.min_volume_size_gb,
            require_tag: self.policy.require_tag.as_ref(),
        };
        let subject = Subject {
            id: &volume.id,
            name: &volume.id,
            state: Some(volume.state.as_str()),
            created: Some(volume.created),
            size: Some(volume.size_gb),
            tags: TagView::Known(&volume.tags),
        };
        criteria.evaluate(&subject, ctx.now)
    }

    async fn plan(&self, _: &Volume, _: &RunContext, _: &mut Steps<'_>) {}

    fn scope(&self, _: &()) -> Tally {
        Tally::new().with(Item::Volumes, 1)
    }

    async fn execute(&self, volume: &Volume, _: (), steps: &mut Steps<'_>) {
        let _ = steps
            .run(
                Item::Volumes,
                &format!("delete volume {} ({} GiB)", volume.id, volume.size_gb),
                self.api.delete_volume(&volume.id),
            )
            .await;
    }
}

/// [`ResourceAdapter`] for account-owned snapshots.
pub struct SnapshotAdapter {
    api: Arc<dyn Ec2Api>,
    policy: EbsPolicy,
}

impl SnapshotAdapter {
    pub fn new(api: Arc<dyn Ec2Api>, policy: EbsPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self { api, policy })
    }
}

#[async_trait]
impl ResourceAdapter for SnapshotAdapter {
    type Resource = Snapshot;
    type Plan = ();

    fn kind(&self) -> ResourceKind {
        ResourceKind::Snapshot
    }

    fn id<'r>(&self, snapshot: &'r Snapshot) -> &'r str {
        &snapshot.id
    }

    async fn list(&self) -> Result<Vec<Snapshot>, RemoteError> {
        self.api.list_snapshots().await
    }

    async fn evaluate(&self, snapshot: &Snapshot, ctx: &RunContext) -> Verdict {
        let criteria = Criteria {
            targets: &self.policy.target_snapshots,
            only: ctx.only(),
            ignore: &self.policy.ignore_snapshots,
            retention: Retention::from_days(self.policy.snapshot_retention_days),
            require_tag: self.policy.require_tag.as_ref(),
            ..Criteria::open()
        };
        let subject = Subject {
            created: Some(snapshot.started),
            tags: TagView::Known(&snapshot.tags),
            ..Subject::named(&snapshot.id)
        };
        criteria.evaluate(&subject, ctx.now)
    }

    async fn plan(&self, _: &Snapshot, _: &RunContext, _: &mut Steps<'_>) {}

    fn scope(&self, _: &()) -> Tally {
        Tally::new().with(Item::Snapshots, 1)
    }

    async fn execute(&self, snapshot: &Snapshot, _: (), steps: &mut Steps<'_>) {
        let _ = steps
            .run(
                Item::Snapshots,
                &format!("delete snapshot {}", snapshot.id),
                self.api.delete_snapshot(&snapshot.id),
            )
            .await;
    }
}

/// Delete unattached volumes, then (if enabled) old snapshots.
///
/// # Errors
///
/// Fails on an invalid policy or when volumes or snapshots cannot be listed.
pub async fn run_cleanup(
    api: Arc<dyn Ec2Api>,
    policy: &EbsPolicy,
    ctx: &RunContext,
) -> Result<Summary, CleanupError> {
    let volumes = VolumeAdapter::new(Arc::clone(&api), policy.clone())?;
    let mut orchestrator = Orchestrator::new(Service::Ebs.as_str(), ctx);
    orchestrator.run(&volumes).await?;
    if policy.include_snapshots {
        let snapshots = SnapshotAdapter::new(api, policy.clone())?;
        orchestrator.run(&snapshots).await?;
    }
    Ok(orchestrator.finish())
}
