//! Declarative cleanup policies.
//!
//! One typed policy per service, deserialised from the config collaborator
//! and validated once before any remote call. Field defaults mirror the
//! conservative values an operator gets with an empty config table.

use crate::error::PolicyError;
use crate::predicate::{NameMatcher, TagRequirement};
use crate::services::cloudwatch::CloudWatchPolicy;
use crate::services::ebs::EbsPolicy;
use crate::services::ec2::Ec2Policy;
use crate::services::iam::IamPolicy;
use crate::services::lambda::LambdaPolicy;
use crate::services::s3::S3Policy;
use crate::services::Service;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A high-blast-radius setting that apply-mode callers must acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "hazard", rename_all = "snake_case")]
pub enum Hazard {
    /// Every object in targeted buckets is deleted regardless of age.
    DeleteAllObjects,
    /// A retention threshold of zero days.
    ZeroRetention {
        service: Service,
        field: &'static str,
    },
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteAllObjects => f.write_str("s3.delete_all_objects is enabled"),
            Self::ZeroRetention { service, field } => write!(f, "{service}.{field} is 0"),
        }
    }
}

pub(crate) fn zero_retention(
    service: Service,
    fields: &[(&'static str, Option<u32>)],
) -> Vec<Hazard> {
    fields
        .iter()
        .filter(|(_, days)| *days == Some(0))
        .map(|(field, _)| Hazard::ZeroRetention {
            service,
            field: *field,
        })
        .collect()
}

/// Shared validation of name globs and the tag requirement.
pub(crate) fn validate_selection(
    patterns: &[String],
    require_tag: Option<&TagRequirement>,
) -> Result<(), PolicyError> {
    NameMatcher::new(patterns)?;
    if let Some(tag) = require_tag {
        tag.validate()?;
    }
    Ok(())
}

/// Retention fields accept a whole number of days, or `"off"` to disable the
/// age check entirely.
pub(crate) mod days {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Days(u32),
        Word(String),
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Days(n) => Ok(Some(n)),
            Raw::Word(w) if matches!(w.as_str(), "off" | "none" | "never") => Ok(None),
            Raw::Word(w) => Err(D::Error::custom(format!(
                "expected a number of days or \"off\", got \"{w}\""
            ))),
        }
    }

    #[allow(clippy::ref_option)]
    pub(crate) fn serialize<S: Serializer>(v: &Option<u32>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(n) => s.serialize_u32(*n),
            None => s.serialize_str("off"),
        }
    }
}

/// Every service policy plus shared settings, as loaded from config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Policies {
    /// Region for every service client; `None` uses the environment default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub s3: S3Policy,
    pub ec2: Ec2Policy,
    pub ebs: EbsPolicy,
    pub lambda: LambdaPolicy,
    pub cloudwatch: CloudWatchPolicy,
    pub iam: IamPolicy,
}

impl Policies {
    /// Validate the policy of every listed service.
    ///
    /// # Errors
    ///
    /// Returns the first [`PolicyError`] found, tagged with its service.
    pub fn validate(&self, services: &[Service]) -> Result<(), (Service, PolicyError)> {
        for service in services {
            let result = match service {
                Service::S3 => self.s3.validate(),
                Service::Ec2 => self.ec2.validate(),
                Service::Ebs => self.ebs.validate(),
                Service::Lambda => self.lambda.validate(),
                Service::CloudWatch => self.cloudwatch.validate(),
                Service::Iam => self.iam.validate(),
            };
            result.map_err(|e| (*service, e))?;
        }
        Ok(())
    }

    /// Hazards carried by the policies of the listed services.
    pub fn hazards(&self, services: &[Service]) -> Vec<Hazard> {
        services
            .iter()
            .flat_map(|service| match service {
                Service::S3 => self.s3.hazards(),
                Service::Ec2 => self.ec2.hazards(),
                Service::Ebs => self.ebs.hazards(),
                Service::Lambda => self.lambda.hazards(),
                Service::CloudWatch => self.cloudwatch.hazards(),
                Service::Iam => self.iam.hazards(),
            })
            .collect()
    }

    /// Append run-only include/exclude overrides to one service's lists.
    ///
    /// EBS ids starting with `snap-` go to the snapshot lists. IAM ids may be
    /// qualified as `role:NAME`, `user:NAME` or `policy:NAME`; a bare IAM name
    /// goes to all three kinds.
    pub fn widen(&mut self, service: Service, include: &[String], exclude: &[String]) {
        for raw in include {
            let (slots, id) = route(service, raw);
            for &slot in slots {
                push_unique(self.lists(slot).0, id);
            }
        }
        for raw in exclude {
            let (slots, id) = route(service, raw);
            for &slot in slots {
                push_unique(self.lists(slot).1, id);
            }
        }
    }

    /// Allow and deny list of one slot.
    fn lists(&mut self, slot: Slot) -> (&mut Vec<String>, &mut Vec<String>) {
        match slot {
            Slot::Buckets => (&mut self.s3.target_buckets, &mut self.s3.ignore_buckets),
            Slot::Instances => (&mut self.ec2.target_instances, &mut self.ec2.ignore_instances),
            Slot::Volumes => (&mut self.ebs.target_volumes, &mut self.ebs.ignore_volumes),
            Slot::Snapshots => (&mut self.ebs.target_snapshots, &mut self.ebs.ignore_snapshots),
            Slot::Functions => (
                &mut self.lambda.target_functions,
                &mut self.lambda.ignore_functions,
            ),
            Slot::LogGroups => (
                &mut self.cloudwatch.target_log_groups,
                &mut self.cloudwatch.ignore_log_groups,
            ),
            Slot::Roles => (&mut self.iam.target_roles, &mut self.iam.ignore_roles),
            Slot::Users => (&mut self.iam.target_users, &mut self.iam.ignore_users),
            Slot::Policies => (&mut self.iam.target_policies, &mut self.iam.ignore_policies),
        }
    }
}

/// A target/ignore list pair inside [`Policies`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Buckets,
    Instances,
    Volumes,
    Snapshots,
    Functions,
    LogGroups,
    Roles,
    Users,
    Policies,
}

/// Slots an override id lands in, and the id with any kind qualifier removed.
fn route(service: Service, raw: &str) -> (&'static [Slot], &str) {
    match service {
        Service::S3 => (&[Slot::Buckets], raw),
        Service::Ec2 => (&[Slot::Instances], raw),
        Service::Ebs if raw.starts_with("snap-") => (&[Slot::Snapshots], raw),
        Service::Ebs => (&[Slot::Volumes], raw),
        Service::Lambda => (&[Slot::Functions], raw),
        Service::CloudWatch => (&[Slot::LogGroups], raw),
        Service::Iam => {
            if let Some(name) = raw.strip_prefix("role:") {
                (&[Slot::Roles], name)
            } else if let Some(name) = raw.strip_prefix("user:") {
                (&[Slot::Users], name)
            } else if let Some(name) = raw.strip_prefix("policy:") {
                (&[Slot::Policies], name)
            } else {
                (&[Slot::Roles, Slot::Users, Slot::Policies], raw)
            }
        }
    }
}

fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|existing| existing == id) {
        list.push(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_conservative() {
        let p = Policies::default();
        assert!(!p.s3.delete_all_objects);
        assert!(!p.s3.delete_empty_buckets);
        assert_eq!(p.s3.object_retention_days, Some(30));
        assert_eq!(p.ec2.target_states, vec!["stopped".to_string()]);
        assert_eq!(p.ebs.target_states, vec!["available".to_string()]);
        assert_eq!(p.lambda.keep_versions, 3);
        assert!(p.hazards(&Service::ALL).is_empty());
        assert!(p.validate(&Service::ALL).is_ok());
    }

    #[test]
    fn test_hazards_are_reported_per_service() {
        let mut p = Policies::default();
        p.s3.delete_all_objects = true;
        p.s3.object_retention_days = Some(0);
        p.ec2.instance_retention_days = Some(0);

        let s3 = p.hazards(&[Service::S3]);
        assert!(s3.contains(&Hazard::DeleteAllObjects));
        assert!(s3.contains(&Hazard::ZeroRetention {
            service: Service::S3,
            field: "object_retention_days"
        }));
        assert_eq!(p.hazards(&[Service::Ec2]).len(), 1);
        assert!(p.hazards(&[Service::Lambda]).is_empty());
    }

    #[test]
    fn test_validation_names_the_service() {
        let mut p = Policies::default();
        p.lambda.name_patterns = vec!["[".into()];
        let (service, err) = p.validate(&Service::ALL).unwrap_err();
        assert_eq!(service, Service::Lambda);
        assert!(matches!(err, PolicyError::InvalidPattern { .. }));
        assert!(p.validate(&[Service::S3]).is_ok());
    }

    #[test]
    fn test_widen_appends_without_duplicates() {
        let mut p = Policies::default();
        p.s3.ignore_buckets = vec!["keep".into()];
        p.widen(
            Service::S3,
            &["a".to_string(), "a".to_string()],
            &["keep".to_string(), "b".to_string()],
        );
        assert_eq!(p.s3.target_buckets, vec!["a".to_string()]);
        assert_eq!(p.s3.ignore_buckets, vec!["keep".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_widen_routes_snapshots_apart_from_volumes() {
        let mut p = Policies::default();
        p.widen(
            Service::Ebs,
            &["vol-1".to_string(), "snap-1".to_string()],
            &["snap-2".to_string()],
        );
        assert_eq!(p.ebs.target_volumes, vec!["vol-1".to_string()]);
        assert_eq!(p.ebs.target_snapshots, vec!["snap-1".to_string()]);
        assert_eq!(p.ebs.ignore_snapshots, vec!["snap-2".to_string()]);
        assert!(p.ebs.ignore_volumes.is_empty());
    }

    #[test]
    fn test_widen_reaches_every_iam_kind() {
        let mut p = Policies::default();
        p.widen(
            Service::Iam,
            &["user:ci-bot".to_string(), "policy:old-access".to_string()],
            &["deploy".to_string(), "role:admin".to_string()],
        );
        assert!(p.iam.target_roles.is_empty());
        assert_eq!(p.iam.target_users, vec!["ci-bot".to_string()]);
        assert_eq!(p.iam.target_policies, vec!["old-access".to_string()]);
        assert_eq!(p.iam.ignore_roles, vec!["deploy".to_string(), "admin".to_string()]);
        assert_eq!(p.iam.ignore_users, vec!["deploy".to_string()]);
        assert_eq!(p.iam.ignore_policies, vec!["deploy".to_string()]);
    }
}
