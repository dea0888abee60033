//! Log group cleanup: drop idle groups whole, otherwise prune their stale
//! streams.

use crate::error::{CleanupError, PolicyError, RemoteError};
use crate::executor::Steps;
use crate::orchestrator::{Orchestrator, ResourceAdapter, RunContext};
use crate::policy::{self, Hazard};
use crate::predicate::{
    Check, Criteria, NameMatcher, Rejection, Subject, Unknown, Verdict, activity_verdict,
};
use crate::report::{Item, Summary, Tally};
use crate::resource::{LogGroup, LogStream, ResourceKind};
use crate::services::Service;
use crate::time::Retention;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Remote operations on log groups and streams.
#[async_trait]
pub trait LogsApi: Send + Sync {
    async fn list_log_groups(&self) -> Result<Vec<LogGroup>, RemoteError>;

    /// Time of the newest event in `group`; `None` when it holds no events.
    async fn last_event(&self, group: &str) -> Result<Option<DateTime<Utc>>, RemoteError>;

    async fn list_streams(&self, group: &str) -> Result<Vec<LogStream>, RemoteError>;
    async fn delete_log_group(&self, group: &str) -> Result<(), RemoteError>;
    async fn delete_log_stream(&self, group: &str, stream: &str) -> Result<(), RemoteError>;
}

/// Log cleanup policy (`[cloudwatch]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CloudWatchPolicy {
    pub target_log_groups: Vec<String>,
    pub ignore_log_groups: Vec<String>,
    pub name_patterns: Vec<String>,
    /// Idle window for a whole group.
    #[serde(with = "policy::days")]
    pub log_group_retention_days: Option<u32>,
    /// Idle window for one stream inside a group that is kept.
    #[serde(with = "policy::days")]
    pub log_stream_retention_days: Option<u32>,
    pub sweep_streams: bool,
}

impl Default for CloudWatchPolicy {
    fn default() -> Self {
        Self {
            target_log_groups: Vec::new(),
            ignore_log_groups: Vec::new(),
            name_patterns: Vec::new(),
            log_group_retention_days: Some(30),
            log_stream_retention_days: Some(7),
            sweep_streams: true,
        }
    }
}

impl CloudWatchPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        policy::validate_selection(&self.name_patterns, None)
    }

    pub fn hazards(&self) -> Vec<Hazard> {
        let mut fields = vec![("log_group_retention_days", self.log_group_retention_days)];
        if self.sweep_streams {
            fields.push(("log_stream_retention_days", self.log_stream_retention_days));
        }
        policy::zero_retention(Service::CloudWatch, &fields)
    }
}

/// Streams that have been idle past `retention`. Streams that never
/// received an event are kept.
pub fn stale_streams(
    streams: &[LogStream],
    retention: Retention,
    now: DateTime<Utc>,
) -> Vec<String> {
    streams
        .iter()
        .filter(|s| matches!(s.last_event, Some(at) if !retention.protects(at, now)))
        .map(|s| s.name.clone())
        .collect()
}

/// Either the whole group or a set of its streams.
#[derive(Debug, Clone, Default)]
pub struct LogGroupPlan {
    pub delete_group: bool,
    pub streams: Vec<String>,
}

/// [`ResourceAdapter`] for log groups.
pub struct LogGroupAdapter {
    api: Arc<dyn LogsApi>,
    policy: CloudWatchPolicy,
    names: NameMatcher,
}

impl LogGroupAdapter {
    pub fn new(api: Arc<dyn LogsApi>, policy: CloudWatchPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        let names = NameMatcher::new(&policy.name_patterns)?;
        Ok(Self { api, policy, names })
    }
}

#[async_trait]
impl ResourceAdapter for LogGroupAdapter {
    type Resource = LogGroup;
    type Plan = LogGroupPlan;

    fn kind(&self) -> ResourceKind {
        ResourceKind::LogGroup
    }

    fn id<'r>(&self, group: &'r LogGroup) -> &'r str {
        &group.name
    }

    async fn list(&self) -> Result<Vec<LogGroup>, RemoteError> {
        self.api.list_log_groups().await
    }

    async fn evaluate(&self, group: &LogGroup, ctx: &RunContext) -> Verdict {
        let criteria = Criteria {
            targets: &self.policy.target_log_groups,
            only: ctx.only(),
            ignore: &self.policy.ignore_log_groups,
            names: Some(&self.names),
            ..Criteria::open()
        };
        let verdict = criteria.evaluate(&Subject::named(&group.name), ctx.now);
        let Some(retention) = Retention::from_days(self.policy.log_group_retention_days) else {
            return verdict;
        };
        if !verdict.is_target() {
            return verdict;
        }

        // An unreadable last event is treated like an empty group: the
        // creation time decides.
        let last_event = match self.api.last_event(&group.name).await {
            Ok(at) => at,
            Err(e) => {
                tracing::warn!("Could not read last event of {}: {e}", group.name);
                None
            }
        };
        activity_verdict(last_event, Unknown::CreatedAt(group.created), retention, ctx.now)
    }

    async fn plan(&self, _: &LogGroup, _: &RunContext, _: &mut Steps<'_>) -> LogGroupPlan {
        LogGroupPlan {
            delete_group: true,
            streams: Vec::new(),
        }
    }

    async fn partial_plan(
        &self,
        group: &LogGroup,
        rejection: &Rejection,
        ctx: &RunContext,
    ) -> Option<LogGroupPlan> {
        if !self.policy.sweep_streams || !matches!(rejection.check, Check::Activity | Check::Age) {
            return None;
        }
        let retention = Retention::from_days(self.policy.log_stream_retention_days)?;
        let streams = match self.api.list_streams(&group.name).await {
            Ok(streams) => streams,
            Err(e) => {
                tracing::warn!("Could not list streams of {}: {e}", group.name);
                ctx.observer
                    .warning(&group.name, &format!("could not list streams: {e}"));
                return None;
            }
        };
        let stale = stale_streams(&streams, retention, ctx.now);
        (!stale.is_empty()).then_some(LogGroupPlan {
            delete_group: false,
            streams: stale,
        })
    }

    fn scope(&self, plan: &LogGroupPlan) -> Tally {
        Tally::new()
            .with(Item::LogGroups, u64::from(plan.delete_group))
            .with(Item::LogStreams, plan.streams.len() as u64)
    }

    async fn execute(&self, group: &LogGroup, plan: LogGroupPlan, steps: &mut Steps<'_>) {
        let name = group.name.as_str();
        if plan.delete_group {
            let _ = steps
                .run(
                    Item::LogGroups,
                    &format!("delete log group {name}"),
                    self.api.delete_log_group(name),
                )
                .await;
            return;
        }
        for stream in &plan.streams {
            let _ = steps
                .run(
                    Item::LogStreams,
                    &format!("delete log stream {stream} from {name}"),
                    self.api.delete_log_stream(name, stream),
                )
                .await;
        }
    }
}

/// Delete idle log groups and stale streams of active ones.
///
/// # Errors
///
/// Fails on an invalid policy or when log groups cannot be listed.
pub async fn run_cleanup(
    api: Arc<dyn LogsApi>,
    policy: &CloudWatchPolicy,
    ctx: &RunContext,
) -> Result<Summary, CleanupError> {
    let adapter = LogGroupAdapter::new(api, policy.clone())?;
    let mut orchestrator = Orchestrator::new(Service::CloudWatch.as_str(), ctx);
    orchestrator.run(&adapter).await?;
    Ok(orchestrator.finish())
}
