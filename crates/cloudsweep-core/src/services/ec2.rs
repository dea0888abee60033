//! Compute instance cleanup: terminate idle instances and reclaim their
//! attached volumes.

use crate::error::{CleanupError, PolicyError, RemoteError};
use crate::executor::{SkipReason, Skipped, Steps};
use crate::orchestrator::{Orchestrator, ResourceAdapter, RunContext};
use crate::policy::{self, Hazard};
use crate::predicate::{Criteria, NameMatcher, Subject, TagRequirement, TagView, Verdict};
use crate::report::{Item, Summary, Tally};
use crate::resource::{Instance, ResourceKind, Snapshot, Volume};
use crate::services::Service;
use crate::time::Retention;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Remote operations on instances, volumes and snapshots.
///
/// Shared by the instance and the block storage cleanups, which talk to the
/// same compute endpoint.
#[async_trait]
pub trait Ec2Api: Send + Sync {
    async fn list_instances(&self) -> Result<Vec<Instance>, RemoteError>;
    async fn terminate_instance(&self, id: &str) -> Result<(), RemoteError>;
    async fn list_volumes(&self) -> Result<Vec<Volume>, RemoteError>;
    async fn delete_volume(&self, id: &str) -> Result<(), RemoteError>;
    /// Snapshots owned by the calling account only.
    async fn list_snapshots(&self) -> Result<Vec<Snapshot>, RemoteError>;
    async fn delete_snapshot(&self, id: &str) -> Result<(), RemoteError>;
}

/// Instance cleanup policy (`[ec2]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Ec2Policy {
    pub target_instances: Vec<String>,
    pub ignore_instances: Vec<String>,
    /// Lifecycle states eligible for termination.
    pub target_states: Vec<String>,
    /// Minimum age, measured from launch time.
    #[serde(with = "policy::days")]
    pub instance_retention_days: Option<u32>,
    /// Globs matched against the `Name` tag.
    pub name_patterns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_tag: Option<TagRequirement>,
    /// Delete attached volumes once the instance is terminated.
    pub delete_volumes: bool,
}

impl Default for Ec2Policy {
    fn default() -> Self {
        Self {
            target_instances: Vec::new(),
            ignore_instances: Vec::new(),
            target_states: vec!["stopped".to_string()],
            instance_retention_days: Some(7),
            name_patterns: Vec::new(),
            require_tag: None,
            delete_volumes: true,
        }
    }
}

impl Ec2Policy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.target_states.is_empty() {
            return Err(PolicyError::EmptyStates {
                field: "target_states",
            });
        }
        policy::validate_selection(&self.name_patterns, self.require_tag.as_ref())
    }

    pub fn hazards(&self) -> Vec<Hazard> {
        policy::zero_retention(
            Service::Ec2,
            &[("instance_retention_days", self.instance_retention_days)],
        )
    }
}

/// Volumes to reclaim after termination.
#[derive(Debug, Clone, Default)]
pub struct InstancePlan {
    pub volumes: Vec<String>,
}

/// [`ResourceAdapter`] for compute instances.
pub struct InstanceAdapter {
    api: Arc<dyn Ec2Api>,
    policy: Ec2Policy,
    names: NameMatcher,
}

impl InstanceAdapter {
    pub fn new(api: Arc<dyn Ec2Api>, policy: Ec2Policy) -> Result<Self, PolicyError> {
        policy.validate()?;
        let names = NameMatcher::new(&policy.name_patterns)?;
        Ok(Self { api, policy, names })
    }
}

#[async_trait]
impl ResourceAdapter for InstanceAdapter {
    type Resource = Instance;
    type Plan = InstancePlan;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Instance
    }

    fn id<'r>(&self, instance: &'r Instance) -> &'r str {
        &instance.id
    }

    async fn list(&self) -> Result<Vec<Instance>, RemoteError> {
        self.api.list_instances().await
    }

    async fn evaluate(&self, instance: &Instance, ctx: &RunContext) -> Verdict {
        let criteria = Criteria {
            targets: &self.policy.target_instances,
            only: ctx.only(),
            ignore: &self.policy.ignore_instances,
            states: Some(self.policy.target_states.as_slice()),
            names: Some(&self.names),
            retention: Retention::from_days(self.policy.instance_retention_days),
            min_size: None,
            require_tag: self.policy.require_tag.as_ref(),
        };
        let subject = Subject {
            id: &instance.id,
            name: &instance.name,
            state: Some(instance.state.as_str()),
            created: Some(instance.launched),
            size: None,
            tags: TagView::Known(&instance.tags),
        };
        criteria.evaluate(&subject, ctx.now)
    }

    async fn plan(&self, instance: &Instance, _: &RunContext, _: &mut Steps<'_>) -> InstancePlan {
        let volumes = if self.policy.delete_volumes {
            instance.volume_ids.clone()
        } else {
            Vec::new()
        };
        InstancePlan { volumes }
    }

    fn scope(&self, plan: &InstancePlan) -> Tally {
        Tally::new()
            .with(Item::Instances, 1)
            .with(Item::Volumes, plan.volumes.len() as u64)
    }

    async fn execute(&self, instance: &Instance, plan: InstancePlan, steps: &mut Steps<'_>) {
        let id = instance.id.as_str();
        let terminated = steps
            .run(
                Item::Instances,
                &format!("terminate instance {id}"),
                self.api.terminate_instance(id),
            )
            .await;
        let proceed = matches!(terminated, Ok(_) | Err(Skipped(SkipReason::DryRun)));

        for volume in &plan.volumes {
            let action = format!("delete volume {volume}");
            if proceed {
                let _ = steps
                    .run(Item::Volumes, &action, self.api.delete_volume(volume))
                    .await;
            } else {
                let _ = steps.block(&action, "instance was not terminated");
            }
        }
    }
}

/// Terminate every instance the policy selects.
///
/// # Errors
///
/// Fails on an invalid policy or when instances cannot be listed.
pub async fn run_cleanup(
    api: Arc<dyn Ec2Api>,
    policy: &Ec2Policy,
    ctx: &RunContext,
) -> Result<Summary, CleanupError> {
    let adapter = InstanceAdapter::new(api, policy.clone())?;
    let mut orchestrator = Orchestrator::new(Service::Ec2.as_str(), ctx);
    orchestrator.run(&adapter).await?;
    Ok(orchestrator.finish())
}
