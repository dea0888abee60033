use super::{Remote, to_utc};
use crate::error::RemoteError;
use crate::resource::{ManagedPolicy, PolicyVersion, Role, User};
use crate::services::iam::IamApi;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_iam as iam;
use chrono::{DateTime, Utc};
use iam::types::PolicyScopeType;

/// [`IamApi`] over the IAM client.
#[derive(Debug, Clone)]
pub struct AwsIam {
    client: iam::Client,
}

impl AwsIam {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: iam::Client::new(config),
        }
    }
}

#[async_trait]
impl IamApi for AwsIam {
    async fn list_roles(&self) -> Result<Vec<Role>, RemoteError> {
        let mut roles = Vec::new();
        let mut pages = self.client.list_roles().into_paginator().send();
        while let Some(page) = pages.next().await.transpose().remote("ListRoles")? {
            roles.extend(page.roles().iter().map(|r| Role {
                name: r.role_name().to_string(),
                path: r.path().to_string(),
                arn: r.arn().to_string(),
                created: to_utc(r.create_date()).unwrap_or_default(),
            }));
        }
        Ok(roles)
    }

    async fn role_last_used(&self, role: &str) -> Result<Option<DateTime<Utc>>, RemoteError> {
        let resp = self
            .client
            .get_role()
            .role_name(role)
            .send()
            .await
            .remote("GetRole")?;
        let found: Option<&iam::types::Role> = resp.role().into();
        Ok(found
            .and_then(|r| r.role_last_used())
            .and_then(|u| u.last_used_date())
            .and_then(to_utc))
    }

    async fn list_attached_role_policies(&self, role: &str) -> Result<Vec<String>, RemoteError> {
        let mut arns = Vec::new();
        let mut pages = self
            .client
            .list_attached_role_policies()
            .role_name(role)
            .into_paginator()
            .send();
        while let Some(page) = pages
            .next()
            .await
            .transpose()
            .remote("ListAttachedRolePolicies")?
        {
            arns.extend(
                page.attached_policies()
                    .iter()
                    .filter_map(|p| p.policy_arn().map(str::to_string)),
            );
        }
        Ok(arns)
    }

    async fn detach_role_policy(&self, role: &str, policy_arn: &str) -> Result<(), RemoteError> {
        self.client
            .detach_role_policy()
            .role_name(role)
            .policy_arn(policy_arn)
            .send()
            .await
            .remote("DetachRolePolicy")?;
        Ok(())
    }

    async fn list_role_policies(&self, role: &str) -> Result<Vec<String>, RemoteError> {
        let mut names = Vec::new();
        let mut pages = self
            .client
            .list_role_policies()
            .role_name(role)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await.transpose().remote("ListRolePolicies")? {
            names.extend(page.policy_names().iter().cloned());
        }
        Ok(names)
    }

    async fn delete_role_policy(&self, role: &str, policy: &str) -> Result<(), RemoteError> {
        self.client
            .delete_role_policy()
            .role_name(role)
            .policy_name(policy)
            .send()
            .await
            .remote("DeleteRolePolicy")?;
        Ok(())
    }

    async fn list_instance_profiles(&self, role: &str) -> Result<Vec<String>, RemoteError> {
        let mut names = Vec::new();
        let mut pages = self
            .client
            .list_instance_profiles_for_role()
            .role_name(role)
            .into_paginator()
            .send();
        while let Some(page) = pages
            .next()
            .await
            .transpose()
            .remote("ListInstanceProfilesForRole")?
        {
            names.extend(
                page.instance_profiles()
                    .iter()
                    .map(|p| p.instance_profile_name().to_string()),
            );
        }
        Ok(names)
    }

    async fn remove_role_from_instance_profile(
        &self,
        profile: &str,
        role: &str,
    ) -> Result<(), RemoteError> {
        self.client
            .remove_role_from_instance_profile()
            .instance_profile_name(profile)
            .role_name(role)
            .send()
            .await
            .remote("RemoveRoleFromInstanceProfile")?;
        Ok(())
    }

    async fn delete_role(&self, role: &str) -> Result<(), RemoteError> {
        self.client
            .delete_role()
            .role_name(role)
            .send()
            .await
            .remote("DeleteRole")?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, RemoteError> {
        let mut users = Vec::new();
        let mut pages = self.client.list_users().into_paginator().send();
        while let Some(page) = pages.next().await.transpose().remote("ListUsers")? {
            users.extend(page.users().iter().map(|u| User {
                name: u.user_name().to_string(),
                created: to_utc(u.create_date()).unwrap_or_default(),
            }));
        }
        Ok(users)
    }

    async fn password_last_used(&self, user: &str) -> Result<Option<DateTime<Utc>>, RemoteError> {
        let resp = self
            .client
            .get_user()
            .user_name(user)
            .send()
            .await
            .remote("GetUser")?;
        let found: Option<&iam::types::User> = resp.user().into();
        Ok(found.and_then(|u| u.password_last_used()).and_then(to_utc))
    }

    async fn list_access_keys(&self, user: &str) -> Result<Vec<String>, RemoteError> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_access_keys()
            .user_name(user)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await.transpose().remote("ListAccessKeys")? {
            keys.extend(
                page.access_key_metadata()
                    .iter()
                    .filter_map(|k| k.access_key_id().map(str::to_string)),
            );
        }
        Ok(keys)
    }

    async fn delete_access_key(&self, user: &str, key_id: &str) -> Result<(), RemoteError> {
        self.client
            .delete_access_key()
            .user_name(user)
            .access_key_id(key_id)
            .send()
            .await
            .remote("DeleteAccessKey")?;
        Ok(())
    }

    async fn list_attached_user_policies(&self, user: &str) -> Result<Vec<String>, RemoteError> {
        let mut arns = Vec::new();
        let mut pages = self
            .client
            .list_attached_user_policies()
            .user_name(user)
            .into_paginator()
            .send();
        while let Some(page) = pages
            .next()
            .await
            .transpose()
            .remote("ListAttachedUserPolicies")?
        {
            arns.extend(
                page.attached_policies()
                    .iter()
                    .filter_map(|p| p.policy_arn().map(str::to_string)),
            );
        }
        Ok(arns)
    }

    async fn detach_user_policy(&self, user: &str, policy_arn: &str) -> Result<(), RemoteError> {
        self.client
            .detach_user_policy()
            .user_name(user)
            .policy_arn(policy_arn)
            .send()
            .await
            .remote("DetachUserPolicy")?;
        Ok(())
    }

    async fn list_user_policies(&self, user: &str) -> Result<Vec<String>, RemoteError> {
        let mut names = Vec::new();
        let mut pages = self
            .client
            .list_user_policies()
            .user_name(user)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await.transpose().remote("ListUserPolicies")? {
            names.extend(page.policy_names().iter().cloned());
        }
        Ok(names)
    }

    async fn delete_user_policy(&self, user: &str, policy: &str) -> Result<(), RemoteError> {
        self.client
            .delete_user_policy()
            .user_name(user)
            .policy_name(policy)
            .send()
            .await
            .remote("DeleteUserPolicy")?;
        Ok(())
    }

    async fn list_groups_for_user(&self, user: &str) -> Result<Vec<String>, RemoteError> {
        let mut groups = Vec::new();
        let mut pages = self
            .client
            .list_groups_for_user()
            .user_name(user)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await.transpose().remote("ListGroupsForUser")? {
            groups.extend(page.groups().iter().map(|g| g.group_name().to_string()));
        }
        Ok(groups)
    }

    async fn remove_user_from_group(&self, group: &str, user: &str) -> Result<(), RemoteError> {
        self.client
            .remove_user_from_group()
            .group_name(group)
            .user_name(user)
            .send()
            .await
            .remote("RemoveUserFromGroup")?;
        Ok(())
    }

    async fn delete_login_profile(&self, user: &str) -> Result<(), RemoteError> {
        self.client
            .delete_login_profile()
            .user_name(user)
            .send()
            .await
            .remote("DeleteLoginProfile")?;
        Ok(())
    }

    async fn delete_user(&self, user: &str) -> Result<(), RemoteError> {
        self.client
            .delete_user()
            .user_name(user)
            .send()
            .await
            .remote("DeleteUser")?;
        Ok(())
    }

    async fn list_policies(&self) -> Result<Vec<ManagedPolicy>, RemoteError> {
        let mut policies = Vec::new();
        let mut pages = self
            .client
            .list_policies()
            .scope(PolicyScopeType::Local)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await.transpose().remote("ListPolicies")? {
            for p in page.policies() {
                let (Some(name), Some(arn)) = (p.policy_name(), p.arn()) else {
                    continue;
                };
                policies.push(ManagedPolicy {
                    name: name.to_string(),
                    arn: arn.to_string(),
                    created: p.create_date().and_then(to_utc).unwrap_or_default(),
                });
            }
        }
        Ok(policies)
    }

    async fn list_policy_versions(
        &self,
        policy_arn: &str,
    ) -> Result<Vec<PolicyVersion>, RemoteError> {
        let mut versions = Vec::new();
        let mut pages = self
            .client
            .list_policy_versions()
            .policy_arn(policy_arn)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await.transpose().remote("ListPolicyVersions")? {
            for v in page.versions() {
                let Some(id) = v.version_id() else { continue };
                let is_default: Option<bool> = v.is_default_version().into();
                versions.push(PolicyVersion {
                    version_id: id.to_string(),
                    is_default: is_default.unwrap_or(false),
                });
            }
        }
        Ok(versions)
    }

    async fn delete_policy_version(
        &self,
        policy_arn: &str,
        version_id: &str,
    ) -> Result<(), RemoteError> {
        self.client
            .delete_policy_version()
            .policy_arn(policy_arn)
            .version_id(version_id)
            .send()
            .await
            .remote("DeletePolicyVersion")?;
        Ok(())
    }

    async fn delete_policy(&self, policy_arn: &str) -> Result<(), RemoteError> {
        self.client
            .delete_policy()
            .policy_arn(policy_arn)
            .send()
            .await
            .remote("DeletePolicy")?;
        Ok(())
    }
}
