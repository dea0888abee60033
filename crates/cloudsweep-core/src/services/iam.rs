//! Identity cleanup: idle roles and users, old customer managed policies.
//!
//! Identities cannot be deleted while anything still hangs off them, so each
//! deletion first unwinds its dependents:
//!
//! - role: detach managed policies, delete inline policies, leave instance
//!   profiles, delete the role
//! - user: delete access keys, detach managed policies, delete inline
//!   policies, leave groups, delete the login profile, delete the user
//! - policy: delete non-default versions, delete the policy
//!
//! Every step is attempted even when an earlier one failed; the final delete
//! is what surfaces an incomplete unwind.

use crate::error::{CleanupError, PolicyError, RemoteError};
use crate::executor::Steps;
use crate::orchestrator::{Orchestrator, ResourceAdapter, RunContext};
use crate::policy::{self, Hazard};
use crate::predicate::{Check, Criteria, NameMatcher, Subject, Unknown, Verdict, activity_verdict};
use crate::report::{Item, Summary, Tally};
use crate::resource::{ManagedPolicy, PolicyVersion, ResourceKind, Role, User};
use crate::services::Service;
use crate::time::Retention;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Roles on this path are owned by the provider's services.
pub const SERVICE_ROLE_PATH: &str = "/aws-service-role/";
/// ARN prefix of provider managed policies.
pub const MANAGED_POLICY_PREFIX: &str = "arn:aws:iam::aws:";

/// Remote operations on identities.
#[async_trait]
pub trait IamApi: Send + Sync {
    async fn list_roles(&self) -> Result<Vec<Role>, RemoteError>;
    /// When the role was last assumed, if that was ever recorded.
    async fn role_last_used(&self, role: &str) -> Result<Option<DateTime<Utc>>, RemoteError>;
    /// ARNs of managed policies attached to `role`.
    async fn list_attached_role_policies(&self, role: &str) -> Result<Vec<String>, RemoteError>;
    async fn detach_role_policy(&self, role: &str, policy_arn: &str) -> Result<(), RemoteError>;
    /// Names of inline policies embedded in `role`.
    async fn list_role_policies(&self, role: &str) -> Result<Vec<String>, RemoteError>;
    async fn delete_role_policy(&self, role: &str, policy: &str) -> Result<(), RemoteError>;
    async fn list_instance_profiles(&self, role: &str) -> Result<Vec<String>, RemoteError>;
    async fn remove_role_from_instance_profile(
        &self,
        profile: &str,
        role: &str,
    ) -> Result<(), RemoteError>;
    async fn delete_role(&self, role: &str) -> Result<(), RemoteError>;

    async fn list_users(&self) -> Result<Vec<User>, RemoteError>;
    /// When the user last signed in with a password, if ever.
    async fn password_last_used(&self, user: &str) -> Result<Option<DateTime<Utc>>, RemoteError>;
    /// Access key ids of `user`.
    async fn list_access_keys(&self, user: &str) -> Result<Vec<String>, RemoteError>;
    async fn delete_access_key(&self, user: &str, key_id: &str) -> Result<(), RemoteError>;
    async fn list_attached_user_policies(&self, user: &str) -> Result<Vec<String>, RemoteError>;
    async fn detach_user_policy(&self, user: &str, policy_arn: &str) -> Result<(), RemoteError>;
    async fn list_user_policies(&self, user: &str) -> Result<Vec<String>, RemoteError>;
    async fn delete_user_policy(&self, user: &str, policy: &str) -> Result<(), RemoteError>;
    /// Names of the groups `user` belongs to.
    async fn list_groups_for_user(&self, user: &str) -> Result<Vec<String>, RemoteError>;
    async fn remove_user_from_group(&self, group: &str, user: &str) -> Result<(), RemoteError>;
    /// Fails with a not-found error when the user has no console password.
    async fn delete_login_profile(&self, user: &str) -> Result<(), RemoteError>;
    async fn delete_user(&self, user: &str) -> Result<(), RemoteError>;

    /// Customer managed policies only.
    async fn list_policies(&self) -> Result<Vec<ManagedPolicy>, RemoteError>;
    async fn list_policy_versions(
        &self,
        policy_arn: &str,
    ) -> Result<Vec<PolicyVersion>, RemoteError>;
    async fn delete_policy_version(
        &self,
        policy_arn: &str,
        version_id: &str,
    ) -> Result<(), RemoteError>;
    async fn delete_policy(&self, policy_arn: &str) -> Result<(), RemoteError>;
}

/// Identity cleanup policy (`[iam]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IamPolicy {
    pub include_roles: bool,
    pub include_users: bool,
    pub include_policies: bool,
    pub target_roles: Vec<String>,
    pub ignore_roles: Vec<String>,
    pub target_users: Vec<String>,
    pub ignore_users: Vec<String>,
    pub target_policies: Vec<String>,
    pub ignore_policies: Vec<String>,
    /// Matched against role, user and policy names alike.
    pub name_patterns: Vec<String>,
    #[serde(with = "policy::days")]
    pub role_retention_days: Option<u32>,
    #[serde(with = "policy::days")]
    pub user_retention_days: Option<u32>,
    #[serde(with = "policy::days")]
    pub policy_retention_days: Option<u32>,
}

impl Default for IamPolicy {
    fn default() -> Self {
        Self {
            include_roles: true,
            include_users: true,
            include_policies: true,
            target_roles: Vec::new(),
            ignore_roles: Vec::new(),
            target_users: Vec::new(),
            ignore_users: Vec::new(),
            target_policies: Vec::new(),
            ignore_policies: Vec::new(),
            name_patterns: Vec::new(),
            role_retention_days: Some(30),
            user_retention_days: Some(30),
            policy_retention_days: Some(30),
        }
    }
}

impl IamPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        policy::validate_selection(&self.name_patterns, None)
    }

    pub fn hazards(&self) -> Vec<Hazard> {
        let mut fields = Vec::new();
        if self.include_roles {
            fields.push(("role_retention_days", self.role_retention_days));
        }
        if self.include_users {
            fields.push(("user_retention_days", self.user_retention_days));
        }
        if self.include_policies {
            fields.push(("policy_retention_days", self.policy_retention_days));
        }
        policy::zero_retention(Service::Iam, &fields)
    }
}

/// State shared by the three identity adapters.
struct Identity {
    api: Arc<dyn IamApi>,
    policy: IamPolicy,
    names: NameMatcher,
}

impl Identity {
    fn new(api: Arc<dyn IamApi>, policy: IamPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        let names = NameMatcher::new(&policy.name_patterns)?;
        Ok(Self { api, policy, names })
    }

    fn criteria<'a>(
        &'a self,
        ctx: &'a RunContext,
        targets: &'a [String],
        ignore: &'a [String],
    ) -> Criteria<'a> {
        Criteria {
            targets,
            only: ctx.only(),
            ignore,
            names: Some(&self.names),
            ..Criteria::open()
        }
    }
}

/// Step eight for roles and users.
///
/// No recorded activity falls back to the creation date. A failed lookup
/// counts as no recent activity.
fn last_activity_verdict(
    name: &str,
    lookup: Result<Option<DateTime<Utc>>, RemoteError>,
    created: DateTime<Utc>,
    retention: Retention,
    now: DateTime<Utc>,
) -> Verdict {
    match lookup {
        Ok(last) => activity_verdict(last, Unknown::CreatedAt(created), retention, now),
        Err(e) => {
            tracing::warn!("Could not read last activity of {name}: {e}");
            activity_verdict(None, Unknown::Eligible, retention, now)
        }
    }
}

/// Sub-resource listing needed before a deletion; a failed read is noted
/// and yields nothing to unwind.
fn listed<T>(steps: &mut Steps<'_>, what: &str, result: Result<Vec<T>, RemoteError>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        steps.lookup_failed(what, &e);
        Vec::new()
    })
}

/// Dependents of a role.
#[derive(Debug, Clone, Default)]
pub struct RolePlan {
    pub attached: Vec<String>,
    pub inline: Vec<String>,
    pub instance_profiles: Vec<String>,
}

/// [`ResourceAdapter`] for roles.
pub struct RoleAdapter(Identity);

impl RoleAdapter {
    pub fn new(api: Arc<dyn IamApi>, policy: IamPolicy) -> Result<Self, PolicyError> {
        Identity::new(api, policy).map(Self)
    }
}

#[async_trait]
impl ResourceAdapter for RoleAdapter {
    type Resource = Role;
    type Plan = RolePlan;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Role
    }

    fn id<'r>(&self, role: &'r Role) -> &'r str {
        &role.name
    }

    async fn list(&self) -> Result<Vec<Role>, RemoteError> {
        self.0.api.list_roles().await
    }

    async fn evaluate(&self, role: &Role, ctx: &RunContext) -> Verdict {
        let this = &self.0;
        if role.path.starts_with(SERVICE_ROLE_PATH) {
            return Verdict::keep(Check::Managed, "service-linked role");
        }
        let verdict = this
            .criteria(ctx, &this.policy.target_roles, &this.policy.ignore_roles)
            .evaluate(&Subject::named(&role.name), ctx.now);
        let Some(retention) = Retention::from_days(this.policy.role_retention_days) else {
            return verdict;
        };
        if !verdict.is_target() {
            return verdict;
        }
        let lookup = this.api.role_last_used(&role.name).await;
        last_activity_verdict(&role.name, lookup, role.created, retention, ctx.now)
    }

    async fn plan(&self, role: &Role, _: &RunContext, steps: &mut Steps<'_>) -> RolePlan {
        let api = &self.0.api;
        let name = role.name.as_str();
        RolePlan {
            attached: listed(
                steps,
                &format!("list attached policies of {name}"),
                api.list_attached_role_policies(name).await,
            ),
            inline: listed(
                steps,
                &format!("list inline policies of {name}"),
                api.list_role_policies(name).await,
            ),
            instance_profiles: listed(
                steps,
                &format!("list instance profiles of {name}"),
                api.list_instance_profiles(name).await,
            ),
        }
    }

    fn scope(&self, plan: &RolePlan) -> Tally {
        Tally::new()
            .with(Item::AttachedPolicies, plan.attached.len() as u64)
            .with(Item::InlinePolicies, plan.inline.len() as u64)
            .with(Item::InstanceProfiles, plan.instance_profiles.len() as u64)
            .with(Item::Roles, 1)
    }

    async fn execute(&self, role: &Role, plan: RolePlan, steps: &mut Steps<'_>) {
        let api = &self.0.api;
        let name = role.name.as_str();
        for arn in &plan.attached {
            let _ = steps
                .run(
                    Item::AttachedPolicies,
                    &format!("detach {arn} from role {name}"),
                    api.detach_role_policy(name, arn),
                )
                .await;
        }
        for policy in &plan.inline {
            let _ = steps
                .run(
                    Item::InlinePolicies,
                    &format!("delete inline policy {policy} of role {name}"),
                    api.delete_role_policy(name, policy),
                )
                .await;
        }
        for profile in &plan.instance_profiles {
            let _ = steps
                .run(
                    Item::InstanceProfiles,
                    &format!("remove role {name} from instance profile {profile}"),
                    api.remove_role_from_instance_profile(profile, name),
                )
                .await;
        }
        let _ = steps
            .run(Item::Roles, &format!("delete role {name}"), api.delete_role(name))
            .await;
    }
}

/// Dependents of a user.
#[derive(Debug, Clone, Default)]
pub struct UserPlan {
    pub access_keys: Vec<String>,
    pub attached: Vec<String>,
    pub inline: Vec<String>,
    pub groups: Vec<String>,
}

/// [`ResourceAdapter`] for users.
pub struct UserAdapter(Identity);

impl UserAdapter {
    pub fn new(api: Arc<dyn IamApi>, policy: IamPolicy) -> Result<Self, PolicyError> {
        Identity::new(api, policy).map(Self)
    }
}

#[async_trait]
impl ResourceAdapter for UserAdapter {
    type Resource = User;
    type Plan = UserPlan;

    fn kind(&self) -> ResourceKind {
        ResourceKind::User
    }

    fn id<'r>(&self, user: &'r User) -> &'r str {
        &user.name
    }

    async fn list(&self) -> Result<Vec<User>, RemoteError> {
        self.0.api.list_users().await
    }

    async fn evaluate(&self, user: &User, ctx: &RunContext) -> Verdict {
        let this = &self.0;
        let verdict = this
            .criteria(ctx, &this.policy.target_users, &this.policy.ignore_users)
            .evaluate(&Subject::named(&user.name), ctx.now);
        let Some(retention) = Retention::from_days(this.policy.user_retention_days) else {
            return verdict;
        };
        if !verdict.is_target() {
            return verdict;
        }
        let lookup = this.api.password_last_used(&user.name).await;
        last_activity_verdict(&user.name, lookup, user.created, retention, ctx.now)
    }

    async fn plan(&self, user: &User, _: &RunContext, steps: &mut Steps<'_>) -> UserPlan {
        let api = &self.0.api;
        let name = user.name.as_str();
        UserPlan {
            access_keys: listed(
                steps,
                &format!("list access keys of {name}"),
                api.list_access_keys(name).await,
            ),
            attached: listed(
                steps,
                &format!("list attached policies of {name}"),
                api.list_attached_user_policies(name).await,
            ),
            inline: listed(
                steps,
                &format!("list inline policies of {name}"),
                api.list_user_policies(name).await,
            ),
            groups: listed(
                steps,
                &format!("list groups of {name}"),
                api.list_groups_for_user(name).await,
            ),
        }
    }

    fn scope(&self, plan: &UserPlan) -> Tally {
        Tally::new()
            .with(Item::AccessKeys, plan.access_keys.len() as u64)
            .with(Item::AttachedPolicies, plan.attached.len() as u64)
            .with(Item::InlinePolicies, plan.inline.len() as u64)
            .with(Item::GroupMemberships, plan.groups.len() as u64)
            .with(Item::Users, 1)
    }

    async fn execute(&self, user: &User, plan: UserPlan, steps: &mut Steps<'_>) {
        let api = &self.0.api;
        let name = user.name.as_str();
        for key in &plan.access_keys {
            let _ = steps
                .run(
                    Item::AccessKeys,
                    &format!("delete access key {key} of {name}"),
                    api.delete_access_key(name, key),
                )
                .await;
        }
        for arn in &plan.attached {
            let _ = steps
                .run(
                    Item::AttachedPolicies,
                    &format!("detach {arn} from user {name}"),
                    api.detach_user_policy(name, arn),
                )
                .await;
        }
        for policy in &plan.inline {
            let _ = steps
                .run(
                    Item::InlinePolicies,
                    &format!("delete inline policy {policy} of user {name}"),
                    api.delete_user_policy(name, policy),
                )
                .await;
        }
        for group in &plan.groups {
            let _ = steps
                .run(
                    Item::GroupMemberships,
                    &format!("remove user {name} from group {group}"),
                    api.remove_user_from_group(group, name),
                )
                .await;
        }
        let _ = steps
            .run_if_present(
                Item::LoginProfiles,
                &format!("delete login profile of {name}"),
                api.delete_login_profile(name),
            )
            .await;
        let _ = steps
            .run(Item::Users, &format!("delete user {name}"), api.delete_user(name))
            .await;
    }
}

/// Non-default versions of a policy.
#[derive(Debug, Clone, Default)]
pub struct PolicyPlan {
    pub versions: Vec<String>,
}

/// [`ResourceAdapter`] for customer managed policies.
pub struct PolicyAdapter(Identity);

impl PolicyAdapter {
    pub fn new(api: Arc<dyn IamApi>, policy: IamPolicy) -> Result<Self, PolicyError> {
        Identity::new(api, policy).map(Self)
    }
}

#[async_trait]
impl ResourceAdapter for PolicyAdapter {
    type Resource = ManagedPolicy;
    type Plan = PolicyPlan;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Policy
    }

    fn id<'r>(&self, policy: &'r ManagedPolicy) -> &'r str {
        &policy.name
    }

    async fn list(&self) -> Result<Vec<ManagedPolicy>, RemoteError> {
        self.0.api.list_policies().await
    }

    async fn evaluate(&self, policy: &ManagedPolicy, ctx: &RunContext) -> Verdict {
        let this = &self.0;
        if policy.arn.starts_with(MANAGED_POLICY_PREFIX) {
            return Verdict::keep(Check::Managed, "provider managed policy");
        }
        let criteria = Criteria {
            retention: Retention::from_days(this.policy.policy_retention_days),
            ..this.criteria(ctx, &this.policy.target_policies, &this.policy.ignore_policies)
        };
        let subject = Subject {
            created: Some(policy.created),
            ..Subject::named(&policy.name)
        };
        criteria.evaluate(&subject, ctx.now)
    }

    async fn plan(
        &self,
        policy: &ManagedPolicy,
        _: &RunContext,
        steps: &mut Steps<'_>,
    ) -> PolicyPlan {
        let listing = self.0.api.list_policy_versions(&policy.arn).await;
        let versions = listed(steps, &format!("list versions of {}", policy.name), listing)
            .into_iter()
            .filter(|v| !v.is_default)
            .map(|v| v.version_id)
            .collect();
        PolicyPlan { versions }
    }

    fn scope(&self, plan: &PolicyPlan) -> Tally {
        Tally::new()
            .with(Item::PolicyVersions, plan.versions.len() as u64)
            .with(Item::Policies, 1)
    }

    async fn execute(&self, policy: &ManagedPolicy, plan: PolicyPlan, steps: &mut Steps<'_>) {
        let api = &self.0.api;
        let arn = policy.arn.as_str();
        for version in &plan.versions {
            let _ = steps
                .run(
                    Item::PolicyVersions,
                    &format!("delete version {version} of policy {}", policy.name),
                    api.delete_policy_version(arn, version),
                )
                .await;
        }
        let _ = steps
            .run(
                Item::Policies,
                &format!("delete policy {}", policy.name),
                api.delete_policy(arn),
            )
            .await;
    }
}

/// Sweep roles, then users, then policies, as enabled.
///
/// # Errors
///
/// Fails on an invalid policy or when any enabled identity kind cannot be
/// listed.
pub async fn run_cleanup(
    api: Arc<dyn IamApi>,
    policy: &IamPolicy,
    ctx: &RunContext,
) -> Result<Summary, CleanupError> {
    policy.validate()?;
    let mut orchestrator = Orchestrator::new(Service::Iam.as_str(), ctx);
    if policy.include_roles {
        let roles = RoleAdapter::new(Arc::clone(&api), policy.clone())?;
        orchestrator.run(&roles).await?;
    }
    if policy.include_users {
        let users = UserAdapter::new(Arc::clone(&api), policy.clone())?;
        orchestrator.run(&users).await?;
    }
    if policy.include_policies {
        let policies = PolicyAdapter::new(api, policy.clone())?;
        orchestrator.run(&policies).await?;
    }
    Ok(orchestrator.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hazards_follow_included_kinds() {
        let mut policy = IamPolicy {
            role_retention_days: Some(0),
            user_retention_days: Some(0),
            ..IamPolicy::default()
        };
        assert_eq!(policy.hazards().len(), 2);
        policy.include_users = false;
        assert_eq!(
            policy.hazards(),
            vec![Hazard::ZeroRetention {
                service: Service::Iam,
                field: "role_retention_days"
            }]
        );
    }

    #[test]
    fn test_retention_can_be_turned_off() {
        let policy: IamPolicy = toml::from_str(
            r#"
            include_users = false
            policy_retention_days = "never"
            "#,
        )
        .unwrap();
        assert!(!policy.include_users);
        assert_eq!(policy.policy_retention_days, None);
        assert_eq!(policy.role_retention_days, Some(30));
    }
}
