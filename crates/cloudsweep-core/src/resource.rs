//! Snapshots of remote resources as returned by list/describe calls.
//!
//! These are observed, never owned: the core reads them once per pass and
//! only ever issues deletion requests against their identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key/value tags attached to a resource.
pub type Tags = BTreeMap<String, String>;

/// Resource variant tag used in reports and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Bucket,
    Instance,
    Volume,
    Snapshot,
    Function,
    LogGroup,
    Role,
    User,
    Policy,
}

impl ResourceKind {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bucket => "bucket",
            Self::Instance => "instance",
            Self::Volume => "volume",
            Self::Snapshot => "snapshot",
            Self::Function => "function",
            Self::LogGroup => "log_group",
            Self::Role => "role",
            Self::User => "user",
            Self::Policy => "policy",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A storage container (S3 bucket).
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub name: String,
    pub created: DateTime<Utc>,
}

/// A current object or an object version / delete marker inside a bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub key: String,
    /// `None` for current-object listings, `Some` for version listings.
    pub version_id: Option<String>,
    pub last_modified: DateTime<Utc>,
    /// The live version of its key. Noncurrent versions and delete markers
    /// are not current.
    pub current: bool,
}

/// A compute instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: String,
    /// Value of the `Name` tag, empty when untagged.
    pub name: String,
    pub state: String,
    pub launched: DateTime<Utc>,
    pub tags: Tags,
    /// Attached block volumes that outlive termination.
    pub volume_ids: Vec<String>,
}

/// A block storage volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    pub id: String,
    pub state: String,
    pub created: DateTime<Utc>,
    pub size_gb: i64,
    pub tags: Tags,
}

/// A block storage snapshot owned by the account.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub state: String,
    pub started: DateTime<Utc>,
    pub volume_size_gb: i64,
    pub tags: Tags,
}

/// A serverless function.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub arn: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One published version of a serverless function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionVersion {
    /// Either a decimal version number or `$LATEST`.
    pub version: String,
}

/// The unpublished head version of every function.
pub const LATEST_VERSION: &str = "$LATEST";

/// A log group.
#[derive(Debug, Clone, PartialEq)]
pub struct LogGroup {
    pub name: String,
    pub created: DateTime<Utc>,
}

/// A log stream inside a log group.
#[derive(Debug, Clone, PartialEq)]
pub struct LogStream {
    pub name: String,
    pub last_event: Option<DateTime<Utc>>,
}

/// An identity role.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub name: String,
    pub path: String,
    pub arn: String,
    pub created: DateTime<Utc>,
}

/// An identity user.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub name: String,
    pub created: DateTime<Utc>,
}

/// A customer managed identity policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedPolicy {
    pub name: String,
    pub arn: String,
    pub created: DateTime<Utc>,
}

/// One version of a managed policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyVersion {
    pub version_id: String,
    pub is_default: bool,
}
