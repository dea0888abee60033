//! In-memory stand-ins for the remote APIs.
//!
//! Every mutating call is written to a [`Journal`] before it is applied, so
//! tests can assert on ordering and on "nothing was touched".

#![allow(dead_code, unreachable_pub)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use cloudsweep_core::RemoteError;
use cloudsweep_core::resource::{
    Bucket, Function, FunctionVersion, Instance, LogGroup, LogStream, ManagedPolicy,
    PolicyVersion, Role, Snapshot, StoredObject, Tags, User, Volume,
};
use cloudsweep_core::services::cloudwatch::LogsApi;
use cloudsweep_core::services::ec2::Ec2Api;
use cloudsweep_core::services::iam::IamApi;
use cloudsweep_core::services::lambda::{LambdaApi, MetricsApi};
use cloudsweep_core::services::s3::{NULL_VERSION, S3Api};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

pub fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    now() - Duration::days(days)
}

pub fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn not_found(operation: &'static str, what: &str) -> RemoteError {
    RemoteError::with_code(operation, "NotFound", format!("{what} does not exist"))
}

/// Ordered log of attempted mutations.
#[derive(Debug, Default)]
pub struct Journal(Mutex<Vec<String>>);

impl Journal {
    pub fn record(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

/// One entry of a key's version stack.
#[derive(Debug, Clone)]
pub struct FakeVersion {
    pub id: String,
    pub marker: bool,
    pub last_modified: DateTime<Utc>,
}

/// A bucket with S3 versioning semantics: every key holds a version stack,
/// newest last. Unversioned buckets store a single `null` version per key.
#[derive(Debug, Clone)]
pub struct FakeBucket {
    pub created: DateTime<Utc>,
    /// `None` makes the tag lookup fail.
    pub tags: Option<Tags>,
    pub versioning: bool,
    pub keys: BTreeMap<String, Vec<FakeVersion>>,
    next_version: usize,
}

impl FakeBucket {
    fn put(&mut self, key: &str, marker: bool, last_modified: DateTime<Utc>) {
        let id = if self.versioning {
            self.next_version += 1;
            if marker {
                format!("dm{}", self.next_version)
            } else {
                format!("v{}", self.next_version)
            }
        } else {
            NULL_VERSION.to_string()
        };
        let stack = self.keys.entry(key.to_string()).or_default();
        if !self.versioning {
            stack.clear();
        }
        stack.push(FakeVersion {
            id,
            marker,
            last_modified,
        });
    }

    fn current_objects(&self) -> Vec<StoredObject> {
        self.keys
            .iter()
            .filter_map(|(key, stack)| {
                let top = stack.last().filter(|v| !v.marker)?;
                Some(StoredObject {
                    key: key.clone(),
                    version_id: None,
                    last_modified: top.last_modified,
                    current: true,
                })
            })
            .collect()
    }

    fn all_versions(&self) -> Vec<StoredObject> {
        self.keys
            .iter()
            .flat_map(|(key, stack)| {
                let top = stack.len() - 1;
                stack.iter().enumerate().map(move |(i, v)| StoredObject {
                    key: key.clone(),
                    version_id: Some(v.id.clone()),
                    last_modified: v.last_modified,
                    current: i == top && !v.marker,
                })
            })
            .collect()
    }

    fn delete(&mut self, target: &StoredObject) {
        match &target.version_id {
            None if self.versioning => {
                let now = self
                    .keys
                    .get(&target.key)
                    .and_then(|stack| stack.last())
                    .map_or(target.last_modified, |v| v.last_modified);
                self.put(&target.key, true, now);
            }
            None => {
                self.keys.remove(&target.key);
            }
            Some(id) => {
                if let Some(stack) = self.keys.get_mut(&target.key) {
                    stack.retain(|v| &v.id != id);
                    if stack.is_empty() {
                        self.keys.remove(&target.key);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeS3 {
    pub buckets: Mutex<BTreeMap<String, FakeBucket>>,
    pub journal: Journal,
    /// Size of every bulk delete request, in order.
    pub batches: Mutex<Vec<usize>>,
    pub fail_listing: bool,
}

impl FakeS3 {
    pub fn bucket(mut self, name: &str, age_days: i64, tags: Option<Tags>) -> Self {
        self.buckets.get_mut().unwrap().insert(
            name.to_string(),
            FakeBucket {
                created: days_ago(age_days),
                tags,
                versioning: false,
                keys: BTreeMap::new(),
                next_version: 0,
            },
        );
        self
    }

    fn entry(&mut self, bucket: &str) -> &mut FakeBucket {
        self.buckets.get_mut().unwrap().get_mut(bucket).unwrap()
    }

    /// Turn versioning on for everything written from now on.
    pub fn versioned(mut self, bucket: &str) -> Self {
        self.entry(bucket).versioning = true;
        self
    }

    /// `count` objects with fresh keys `obj-NNNNN`.
    pub fn objects(mut self, bucket: &str, count: usize, age_days: i64) -> Self {
        let entry = self.entry(bucket);
        let start = entry.keys.keys().filter(|k| k.starts_with("obj-")).count();
        for i in start..start + count {
            entry.put(&format!("obj-{i:05}"), false, days_ago(age_days));
        }
        self
    }

    /// `count` successive writes of `key`; the last one is current.
    pub fn versions(mut self, bucket: &str, key: &str, count: usize, age_days: i64) -> Self {
        let entry = self.entry(bucket);
        entry.versioning = true;
        for _ in 0..count {
            entry.put(key, false, days_ago(age_days));
        }
        self
    }

    /// Hide `key` behind a delete marker.
    pub fn delete_marker(mut self, bucket: &str, key: &str, age_days: i64) -> Self {
        self.entry(bucket).put(key, true, days_ago(age_days));
        self
    }

    pub fn has_bucket(&self, name: &str) -> bool {
        self.buckets.lock().unwrap().contains_key(name)
    }

    /// Current (visible) objects.
    pub fn object_count(&self, name: &str) -> usize {
        self.buckets.lock().unwrap()[name].current_objects().len()
    }

    /// Every stored version and delete marker.
    pub fn version_count(&self, name: &str) -> usize {
        self.buckets.lock().unwrap()[name].all_versions().len()
    }

    fn with_bucket<T>(
        &self,
        operation: &'static str,
        name: &str,
        f: impl FnOnce(&mut FakeBucket) -> T,
    ) -> Result<T, RemoteError> {
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets
            .get_mut(name)
            .ok_or_else(|| RemoteError::with_code(operation, "NoSuchBucket", name))?;
        Ok(f(bucket))
    }
}

#[async_trait]
impl S3Api for FakeS3 {
    async fn list_buckets(&self) -> Result<Vec<Bucket>, RemoteError> {
        if self.fail_listing {
            return Err(RemoteError::with_code("ListBuckets", "AccessDenied", "denied"));
        }
        Ok(self
            .buckets
            .lock()
            .unwrap()
            .iter()
            .map(|(name, b)| Bucket {
                name: name.clone(),
                created: b.created,
            })
            .collect())
    }

    async fn bucket_tags(&self, bucket: &str) -> Result<Tags, RemoteError> {
        self.with_bucket("GetBucketTagging", bucket, |b| b.tags.clone())?
            .ok_or_else(|| RemoteError::with_code("GetBucketTagging", "AccessDenied", "denied"))
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<StoredObject>, RemoteError> {
        self.with_bucket("ListObjectsV2", bucket, |b| b.current_objects())
    }

    async fn list_object_versions(&self, bucket: &str) -> Result<Vec<StoredObject>, RemoteError> {
        self.with_bucket("ListObjectVersions", bucket, |b| b.all_versions())
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        objects: &[StoredObject],
    ) -> Result<u64, RemoteError> {
        self.journal
            .record(format!("DeleteObjects {bucket} {}", objects.len()));
        self.batches.lock().unwrap().push(objects.len());
        self.with_bucket("DeleteObjects", bucket, |b| {
            for target in objects {
                b.delete(target);
            }
            objects.len() as u64
        })
    }

    async fn has_objects(&self, bucket: &str) -> Result<bool, RemoteError> {
        self.with_bucket("ListObjectsV2", bucket, |b| !b.current_objects().is_empty())
    }

    async fn has_versions(&self, bucket: &str) -> Result<bool, RemoteError> {
        self.with_bucket("ListObjectVersions", bucket, |b| !b.keys.is_empty())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), RemoteError> {
        self.journal.record(format!("DeleteBucket {bucket}"));
        let mut buckets = self.buckets.lock().unwrap();
        match buckets.get(bucket) {
            None => Err(RemoteError::with_code("DeleteBucket", "NoSuchBucket", bucket)),
            Some(b) if !b.keys.is_empty() => Err(RemoteError::with_code(
                "DeleteBucket",
                "BucketNotEmpty",
                "bucket is not empty",
            )),
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Compute and block storage
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeEc2 {
    pub instances: Mutex<Vec<Instance>>,
    pub volumes: Mutex<Vec<Volume>>,
    pub snapshots: Mutex<Vec<Snapshot>>,
    pub journal: Journal,
    /// Instances whose termination is refused.
    pub protected: BTreeSet<String>,
}

pub fn instance(id: &str, state: &str, age_days: i64, volumes: &[&str]) -> Instance {
    Instance {
        id: id.to_string(),
        name: String::new(),
        state: state.to_string(),
        launched: days_ago(age_days),
        tags: Tags::new(),
        volume_ids: volumes.iter().map(|v| (*v).to_string()).collect(),
    }
}

pub fn volume(id: &str, state: &str, age_days: i64, size_gb: i64) -> Volume {
    Volume {
        id: id.to_string(),
        state: state.to_string(),
        created: days_ago(age_days),
        size_gb,
        tags: Tags::new(),
    }
}

pub fn snapshot(id: &str, age_days: i64) -> Snapshot {
    Snapshot {
        id: id.to_string(),
        state: "completed".to_string(),
        started: days_ago(age_days),
        volume_size_gb: 8,
        tags: Tags::new(),
    }
}

#[async_trait]
impl Ec2Api for FakeEc2 {
    async fn list_instances(&self) -> Result<Vec<Instance>, RemoteError> {
        Ok(self.instances.lock().unwrap().clone())
    }

    async fn terminate_instance(&self, id: &str) -> Result<(), RemoteError> {
        self.journal.record(format!("TerminateInstances {id}"));
        if self.protected.contains(id) {
            return Err(RemoteError::with_code(
                "TerminateInstances",
                "OperationNotPermitted",
                "termination protection is enabled",
            ));
        }
        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| not_found("TerminateInstances", id))?;
        instance.state = "terminated".to_string();
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>, RemoteError> {
        Ok(self.volumes.lock().unwrap().clone())
    }

    async fn delete_volume(&self, id: &str) -> Result<(), RemoteError> {
        self.journal.record(format!("DeleteVolume {id}"));
        let mut volumes = self.volumes.lock().unwrap();
        let before = volumes.len();
        volumes.retain(|v| v.id != id);
        if volumes.len() == before {
            return Err(not_found("DeleteVolume", id));
        }
        Ok(())
    }

    async fn list_snapshots(&self) -> Result<Vec<Snapshot>, RemoteError> {
        Ok(self.snapshots.lock().unwrap().clone())
    }

    async fn delete_snapshot(&self, id: &str) -> Result<(), RemoteError> {
        self.journal.record(format!("DeleteSnapshot {id}"));
        let mut snapshots = self.snapshots.lock().unwrap();
        let before = snapshots.len();
        snapshots.retain(|s| s.id != id);
        if snapshots.len() == before {
            return Err(not_found("DeleteSnapshot", id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Functions, metrics and logs
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeLambda {
    pub functions: Mutex<Vec<Function>>,
    /// Published versions per function name.
    pub versions: Mutex<BTreeMap<String, Vec<String>>>,
    /// Tags per function ARN; a missing entry makes the lookup fail.
    pub tags: BTreeMap<String, Tags>,
    pub journal: Journal,
}

pub fn function(name: &str, modified_days_ago: i64) -> Function {
    Function {
        name: name.to_string(),
        arn: format!("arn:aws:lambda:us-east-1:123456789012:function:{name}"),
        last_modified: Some(days_ago(modified_days_ago)),
    }
}

#[async_trait]
impl LambdaApi for FakeLambda {
    async fn list_functions(&self) -> Result<Vec<Function>, RemoteError> {
        Ok(self.functions.lock().unwrap().clone())
    }

    async fn function_tags(&self, arn: &str) -> Result<Tags, RemoteError> {
        self.tags
            .get(arn)
            .cloned()
            .ok_or_else(|| RemoteError::with_code("ListTags", "AccessDeniedException", arn))
    }

    async fn list_versions(&self, function: &str) -> Result<Vec<FunctionVersion>, RemoteError> {
        let versions = self.versions.lock().unwrap();
        let listed = versions.get(function).cloned().unwrap_or_default();
        Ok(std::iter::once("$LATEST".to_string())
            .chain(listed)
            .map(|version| FunctionVersion { version })
            .collect())
    }

    async fn delete_version(&self, function: &str, version: &str) -> Result<(), RemoteError> {
        self.journal
            .record(format!("DeleteFunction {function}:{version}"));
        if let Some(versions) = self.versions.lock().unwrap().get_mut(function) {
            versions.retain(|v| v != version);
        }
        Ok(())
    }

    async fn delete_function(&self, function: &str) -> Result<(), RemoteError> {
        self.journal.record(format!("DeleteFunction {function}"));
        self.functions.lock().unwrap().retain(|f| f.name != function);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeMetrics {
    pub last: BTreeMap<String, DateTime<Utc>>,
    pub fail: bool,
}

#[async_trait]
impl MetricsApi for FakeMetrics {
    async fn last_invocation(
        &self,
        function: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, RemoteError> {
        if self.fail {
            return Err(RemoteError::with_code("GetMetricStatistics", "Throttling", "slow down"));
        }
        Ok(self
            .last
            .get(function)
            .copied()
            .filter(|at| *at >= since && *at <= until))
    }
}

#[derive(Debug, Default)]
pub struct FakeLogs {
    pub groups: Mutex<Vec<LogGroup>>,
    pub last_events: BTreeMap<String, DateTime<Utc>>,
    pub streams: Mutex<BTreeMap<String, Vec<LogStream>>>,
    pub journal: Journal,
}

pub fn log_group(name: &str, age_days: i64) -> LogGroup {
    LogGroup {
        name: name.to_string(),
        created: days_ago(age_days),
    }
}

pub fn log_stream(name: &str, last_event_days_ago: Option<i64>) -> LogStream {
    LogStream {
        name: name.to_string(),
        last_event: last_event_days_ago.map(days_ago),
    }
}

#[async_trait]
impl LogsApi for FakeLogs {
    async fn list_log_groups(&self) -> Result<Vec<LogGroup>, RemoteError> {
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn last_event(&self, group: &str) -> Result<Option<DateTime<Utc>>, RemoteError> {
        Ok(self.last_events.get(group).copied())
    }

    async fn list_streams(&self, group: &str) -> Result<Vec<LogStream>, RemoteError> {
        Ok(self
            .streams
            .lock()
            .unwrap()
            .get(group)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_log_group(&self, group: &str) -> Result<(), RemoteError> {
        self.journal.record(format!("DeleteLogGroup {group}"));
        let mut groups = self.groups.lock().unwrap();
        let before = groups.len();
        groups.retain(|g| g.name != group);
        if groups.len() == before {
            return Err(RemoteError::with_code(
                "DeleteLogGroup",
                "ResourceNotFoundException",
                group,
            ));
        }
        Ok(())
    }

    async fn delete_log_stream(&self, group: &str, stream: &str) -> Result<(), RemoteError> {
        self.journal
            .record(format!("DeleteLogStream {group} {stream}"));
        if let Some(streams) = self.streams.lock().unwrap().get_mut(group) {
            streams.retain(|s| s.name != stream);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Remote identity state. Maps are keyed by role, user or policy ARN.
#[derive(Debug, Default)]
pub struct IamState {
    pub roles: Vec<Role>,
    pub role_last_used: BTreeMap<String, DateTime<Utc>>,
    pub role_attached: BTreeMap<String, Vec<String>>,
    pub role_inline: BTreeMap<String, Vec<String>>,
    pub role_profiles: BTreeMap<String, Vec<String>>,

    pub users: Vec<User>,
    pub password_last_used: BTreeMap<String, DateTime<Utc>>,
    pub access_keys: BTreeMap<String, Vec<String>>,
    pub user_attached: BTreeMap<String, Vec<String>>,
    pub user_inline: BTreeMap<String, Vec<String>>,
    pub user_groups: BTreeMap<String, Vec<String>>,
    pub login_profiles: BTreeSet<String>,

    pub policies: Vec<ManagedPolicy>,
    pub policy_versions: BTreeMap<String, Vec<PolicyVersion>>,
}

#[derive(Debug, Default)]
pub struct FakeIam {
    pub state: Mutex<IamState>,
    pub journal: Journal,
    /// Policy ARNs that cannot be detached.
    pub stuck_policies: BTreeSet<String>,
}

impl FakeIam {
    pub fn new(state: IamState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }
}

pub fn role(name: &str, path: &str, age_days: i64) -> Role {
    Role {
        name: name.to_string(),
        path: path.to_string(),
        arn: format!("arn:aws:iam::123456789012:role{path}{name}"),
        created: days_ago(age_days),
    }
}

pub fn user(name: &str, age_days: i64) -> User {
    User {
        name: name.to_string(),
        created: days_ago(age_days),
    }
}

pub fn managed_policy(arn: &str, age_days: i64) -> ManagedPolicy {
    ManagedPolicy {
        name: arn.rsplit('/').next().unwrap_or(arn).to_string(),
        arn: arn.to_string(),
        created: days_ago(age_days),
    }
}

fn listed(map: &BTreeMap<String, Vec<String>>, key: &str) -> Vec<String> {
    map.get(key).cloned().unwrap_or_default()
}

fn take(map: &mut BTreeMap<String, Vec<String>>, key: &str, item: &str) {
    if let Some(items) = map.get_mut(key) {
        items.retain(|i| i != item);
    }
}

fn has_any(map: &BTreeMap<String, Vec<String>>, key: &str) -> bool {
    map.get(key).is_some_and(|items| !items.is_empty())
}

#[async_trait]
impl IamApi for FakeIam {
    async fn list_roles(&self) -> Result<Vec<Role>, RemoteError> {
        Ok(self.state.lock().unwrap().roles.clone())
    }

    async fn role_last_used(&self, role: &str) -> Result<Option<DateTime<Utc>>, RemoteError> {
        Ok(self.state.lock().unwrap().role_last_used.get(role).copied())
    }

    async fn list_attached_role_policies(&self, role: &str) -> Result<Vec<String>, RemoteError> {
        Ok(listed(&self.state.lock().unwrap().role_attached, role))
    }

    async fn detach_role_policy(&self, role: &str, policy_arn: &str) -> Result<(), RemoteError> {
        self.journal
            .record(format!("DetachRolePolicy {role} {policy_arn}"));
        if self.stuck_policies.contains(policy_arn) {
            return Err(RemoteError::with_code("DetachRolePolicy", "AccessDenied", "denied"));
        }
        take(&mut self.state.lock().unwrap().role_attached, role, policy_arn);
        Ok(())
    }

    async fn list_role_policies(&self, role: &str) -> Result<Vec<String>, RemoteError> {
        Ok(listed(&self.state.lock().unwrap().role_inline, role))
    }

    async fn delete_role_policy(&self, role: &str, policy: &str) -> Result<(), RemoteError> {
        self.journal
            .record(format!("DeleteRolePolicy {role} {policy}"));
        take(&mut self.state.lock().unwrap().role_inline, role, policy);
        Ok(())
    }

    async fn list_instance_profiles(&self, role: &str) -> Result<Vec<String>, RemoteError> {
        Ok(listed(&self.state.lock().unwrap().role_profiles, role))
    }

    async fn remove_role_from_instance_profile(
        &self,
        profile: &str,
        role: &str,
    ) -> Result<(), RemoteError> {
        self.journal
            .record(format!("RemoveRoleFromInstanceProfile {profile} {role}"));
        take(&mut self.state.lock().unwrap().role_profiles, role, profile);
        Ok(())
    }

    async fn delete_role(&self, role: &str) -> Result<(), RemoteError> {
        self.journal.record(format!("DeleteRole {role}"));
        let mut state = self.state.lock().unwrap();
        if has_any(&state.role_attached, role)
            || has_any(&state.role_inline, role)
            || has_any(&state.role_profiles, role)
        {
            return Err(RemoteError::with_code(
                "DeleteRole",
                "DeleteConflict",
                "role still has dependents",
            ));
        }
        state.roles.retain(|r| r.name != role);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, RemoteError> {
        Ok(self.state.lock().unwrap().users.clone())
    }

    async fn password_last_used(&self, user: &str) -> Result<Option<DateTime<Utc>>, RemoteError> {
        Ok(self.state.lock().unwrap().password_last_used.get(user).copied())
    }

    async fn list_access_keys(&self, user: &str) -> Result<Vec<String>, RemoteError> {
        Ok(listed(&self.state.lock().unwrap().access_keys, user))
    }

    async fn delete_access_key(&self, user: &str, key_id: &str) -> Result<(), RemoteError> {
        self.journal.record(format!("DeleteAccessKey {user} {key_id}"));
        take(&mut self.state.lock().unwrap().access_keys, user, key_id);
        Ok(())
    }

    async fn list_attached_user_policies(&self, user: &str) -> Result<Vec<String>, RemoteError> {
        Ok(listed(&self.state.lock().unwrap().user_attached, user))
    }

    async fn detach_user_policy(&self, user: &str, policy_arn: &str) -> Result<(), RemoteError> {
        self.journal
            .record(format!("DetachUserPolicy {user} {policy_arn}"));
        take(&mut self.state.lock().unwrap().user_attached, user, policy_arn);
        Ok(())
    }

    async fn list_user_policies(&self, user: &str) -> Result<Vec<String>, RemoteError> {
        Ok(listed(&self.state.lock().unwrap().user_inline, user))
    }

    async fn delete_user_policy(&self, user: &str, policy: &str) -> Result<(), RemoteError> {
        self.journal
            .record(format!("DeleteUserPolicy {user} {policy}"));
        take(&mut self.state.lock().unwrap().user_inline, user, policy);
        Ok(())
    }

    async fn list_groups_for_user(&self, user: &str) -> Result<Vec<String>, RemoteError> {
        Ok(listed(&self.state.lock().unwrap().user_groups, user))
    }

    async fn remove_user_from_group(&self, group: &str, user: &str) -> Result<(), RemoteError> {
        self.journal
            .record(format!("RemoveUserFromGroup {group} {user}"));
        take(&mut self.state.lock().unwrap().user_groups, user, group);
        Ok(())
    }

    async fn delete_login_profile(&self, user: &str) -> Result<(), RemoteError> {
        self.journal.record(format!("DeleteLoginProfile {user}"));
        if self.state.lock().unwrap().login_profiles.remove(user) {
            Ok(())
        } else {
            Err(RemoteError::with_code(
                "DeleteLoginProfile",
                "NoSuchEntity",
                format!("login profile for {user} cannot be found"),
            ))
        }
    }

    async fn delete_user(&self, user: &str) -> Result<(), RemoteError> {
        self.journal.record(format!("DeleteUser {user}"));
        let mut state = self.state.lock().unwrap();
        if has_any(&state.access_keys, user)
            || has_any(&state.user_attached, user)
            || has_any(&state.user_inline, user)
            || has_any(&state.user_groups, user)
            || state.login_profiles.contains(user)
        {
            return Err(RemoteError::with_code(
                "DeleteUser",
                "DeleteConflict",
                "user still has dependents",
            ));
        }
        state.users.retain(|u| u.name != user);
        Ok(())
    }

    async fn list_policies(&self) -> Result<Vec<ManagedPolicy>, RemoteError> {
        Ok(self.state.lock().unwrap().policies.clone())
    }

    async fn list_policy_versions(
        &self,
        policy_arn: &str,
    ) -> Result<Vec<PolicyVersion>, RemoteError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .policy_versions
            .get(policy_arn)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_policy_version(
        &self,
        policy_arn: &str,
        version_id: &str,
    ) -> Result<(), RemoteError> {
        self.journal
            .record(format!("DeletePolicyVersion {policy_arn} {version_id}"));
        if let Some(versions) = self.state.lock().unwrap().policy_versions.get_mut(policy_arn) {
            versions.retain(|v| v.version_id != version_id);
        }
        Ok(())
    }

    async fn delete_policy(&self, policy_arn: &str) -> Result<(), RemoteError> {
        self.journal.record(format!("DeletePolicy {policy_arn}"));
        self.state
            .lock()
            .unwrap()
            .policies
            .retain(|p| p.arn != policy_arn);
        Ok(())
    }
}
