//! Serverless function cleanup: prune old published versions, then remove
//! idle functions and their log groups.

use crate::error::{CleanupError, PolicyError, RemoteError};
use crate::executor::{SkipReason, Skipped, Steps};
use crate::orchestrator::{Orchestrator, ResourceAdapter, RunContext};
use crate::policy::{self, Hazard};
use crate::predicate::{
    Criteria, NameMatcher, Subject, TagRequirement, Unknown, Verdict, activity_verdict,
};
use crate::report::{Item, Summary, Tally};
use crate::resource::{Function, FunctionVersion, LATEST_VERSION, ResourceKind, Tags};
use crate::services::Service;
use crate::services::cloudwatch::LogsApi;
use crate::time::Retention;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Remote operations on functions.
#[async_trait]
pub trait LambdaApi: Send + Sync {
    async fn list_functions(&self) -> Result<Vec<Function>, RemoteError>;
    async fn function_tags(&self, arn: &str) -> Result<Tags, RemoteError>;
    async fn list_versions(&self, function: &str) -> Result<Vec<FunctionVersion>, RemoteError>;
    async fn delete_version(&self, function: &str, version: &str) -> Result<(), RemoteError>;
    async fn delete_function(&self, function: &str) -> Result<(), RemoteError>;
}

/// Invocation metrics lookup.
#[async_trait]
pub trait MetricsApi: Send + Sync {
    /// Start of the newest daily period in `[since, until]` that recorded an
    /// invocation of `function`.
    async fn last_invocation(
        &self,
        function: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, RemoteError>;
}

/// Function cleanup policy (`[lambda]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LambdaPolicy {
    pub target_functions: Vec<String>,
    pub ignore_functions: Vec<String>,
    pub name_patterns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_tag: Option<TagRequirement>,
    /// Idle window: minimum age since last modification, and the span of
    /// invocation metrics consulted.
    #[serde(with = "policy::days")]
    pub function_retention_days: Option<u32>,
    /// Newest published versions left in place.
    pub keep_versions: usize,
    pub delete_function: bool,
    /// Delete `/aws/lambda/<name>` after the function itself is gone.
    pub delete_logs: bool,
}

impl Default for LambdaPolicy {
    fn default() -> Self {
        Self {
            target_functions: Vec::new(),
            ignore_functions: Vec::new(),
            name_patterns: Vec::new(),
            require_tag: None,
            function_retention_days: Some(30),
            keep_versions: 3,
            delete_function: true,
            delete_logs: true,
        }
    }
}

impl LambdaPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        policy::validate_selection(&self.name_patterns, self.require_tag.as_ref())
    }

    pub fn hazards(&self) -> Vec<Hazard> {
        policy::zero_retention(
            Service::Lambda,
            &[("function_retention_days", self.function_retention_days)],
        )
    }
}

/// Log group the runtime writes a function's output to.
pub fn log_group_name(function: &str) -> String {
    format!("/aws/lambda/{function}")
}

/// Published versions beyond the `keep` newest, newest first.
///
/// `$LATEST` is never counted nor returned. Version identifiers that are not
/// numbers are left alone.
pub fn versions_to_prune(versions: &[FunctionVersion], keep: usize) -> Vec<String> {
    let mut numbered: Vec<u64> = versions
        .iter()
        .filter(|v| v.version != LATEST_VERSION)
        .filter_map(|v| v.version.parse().ok())
        .collect();
    numbered.sort_unstable_by(|a, b| b.cmp(a));
    numbered.into_iter().skip(keep).map(|n| n.to_string()).collect()
}

/// Resolved deletion scope of one function.
#[derive(Debug, Clone, Default)]
pub struct FunctionPlan {
    pub versions: Vec<String>,
    pub delete_function: bool,
    pub log_group: Option<String>,
}

/// [`ResourceAdapter`] for functions.
pub struct FunctionAdapter {
    api: Arc<dyn LambdaApi>,
    metrics: Arc<dyn MetricsApi>,
    logs: Arc<dyn LogsApi>,
    policy: LambdaPolicy,
    names: NameMatcher,
}

impl FunctionAdapter {
    pub fn new(
        api: Arc<dyn LambdaApi>,
        metrics: Arc<dyn MetricsApi>,
        logs: Arc<dyn LogsApi>,
        policy: LambdaPolicy,
    ) -> Result<Self, PolicyError> {
        policy.validate()?;
        let names = NameMatcher::new(&policy.name_patterns)?;
        Ok(Self {
            api,
            metrics,
            logs,
            policy,
            names,
        })
    }
}

#[async_trait]
impl ResourceAdapter for FunctionAdapter {
    type Resource = Function;
    type Plan = FunctionPlan;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Function
    }

    fn id<'r>(&self, function: &'r Function) -> &'r str {
        &function.name
    }

    async fn list(&self) -> Result<Vec<Function>, RemoteError> {
        self.api.list_functions().await
    }

    async fn evaluate(&self, function: &Function, ctx: &RunContext) -> Verdict {
        let retention = Retention::from_days(self.policy.function_retention_days);
        let criteria = Criteria {
            targets: &self.policy.target_functions,
            only: ctx.only(),
            ignore: &self.policy.ignore_functions,
            names: Some(&self.names),
            retention,
            require_tag: self.policy.require_tag.as_ref(),
            ..Criteria::open()
        };
        let subject = Subject {
            created: function.last_modified,
            ..Subject::named(&function.name)
        };
        let verdict = criteria.evaluate(&subject, ctx.now);
        if !verdict.is_target() {
            return verdict;
        }

        if criteria.require_tag.is_some() {
            let tags = self.api.function_tags(&function.arn).await;
            let verdict = criteria.check_tags(tags.as_ref());
            if !verdict.is_target() {
                return verdict;
            }
        }

        let Some(retention) = retention else {
            return Verdict::Target;
        };
        let last = match self
            .metrics
            .last_invocation(&function.name, retention.cutoff(ctx.now), ctx.now)
            .await
        {
            Ok(last) => last,
            Err(e) => {
                tracing::warn!("Could not read invocations of {}: {e}", function.name);
                None
            }
        };
        activity_verdict(last, Unknown::Eligible, retention, ctx.now)
    }

    async fn plan(
        &self,
        function: &Function,
        _: &RunContext,
        steps: &mut Steps<'_>,
    ) -> FunctionPlan {
        let versions = match self.api.list_versions(&function.name).await {
            Ok(versions) => versions_to_prune(&versions, self.policy.keep_versions),
            Err(e) => {
                steps.lookup_failed(&format!("list versions of {}", function.name), &e);
                Vec::new()
            }
        };
        let log_group = (self.policy.delete_function && self.policy.delete_logs)
            .then(|| log_group_name(&function.name));
        FunctionPlan {
            versions,
            delete_function: self.policy.delete_function,
            log_group,
        }
    }

    fn scope(&self, plan: &FunctionPlan) -> Tally {
        Tally::new()
            .with(Item::FunctionVersions, plan.versions.len() as u64)
            .with(Item::Functions, u64::from(plan.delete_function))
            .with(Item::LogGroups, u64::from(plan.log_group.is_some()))
    }

    async fn execute(&self, function: &Function, plan: FunctionPlan, steps: &mut Steps<'_>) {
        let name = function.name.as_str();
        for version in &plan.versions {
            let _ = steps
                .run(
                    Item::FunctionVersions,
                    &format!("delete version {version} of {name}"),
                    self.api.delete_version(name, version),
                )
                .await;
        }

        if !plan.delete_function {
            return;
        }
        let deleted = steps
            .run(
                Item::Functions,
                &format!("delete function {name}"),
                self.api.delete_function(name),
            )
            .await;

        let Some(group) = plan.log_group else {
            return;
        };
        let action = format!("delete log group {group}");
        if matches!(deleted, Ok(_) | Err(Skipped(SkipReason::DryRun))) {
            let _ = steps
                .run_if_present(Item::LogGroups, &action, self.logs.delete_log_group(&group))
                .await;
        } else {
            let _ = steps.block(&action, "function was not deleted");
        }
    }
}

/// Prune versions of, and then delete, every function the policy selects.
///
/// # Errors
///
/// Fails on an invalid policy or when functions cannot be listed.
pub async fn run_cleanup(
    api: Arc<dyn LambdaApi>,
    metrics: Arc<dyn MetricsApi>,
    logs: Arc<dyn LogsApi>,
    policy: &LambdaPolicy,
    ctx: &RunContext,
) -> Result<Summary, CleanupError> {
    let adapter = FunctionAdapter::new(api, metrics, logs, policy.clone())?;
    let mut orchestrator = Orchestrator::new(Service::Lambda.as_str(), ctx);
    orchestrator.run(&adapter).await?;
    Ok(orchestrator.finish())
}
