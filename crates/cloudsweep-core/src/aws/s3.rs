use super::{Remote, remote_error, to_utc};
use crate::error::RemoteError;
use crate::resource::{Bucket, StoredObject, Tags};
use crate::services::s3::S3Api;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3 as s3;
use aws_sdk_s3::error::ProvideErrorMetadata;
use s3::primitives::DateTime;
use s3::types::{Delete, ObjectIdentifier};

/// [`S3Api`] over the S3 client.
#[derive(Debug, Clone)]
pub struct AwsS3 {
    client: s3::Client,
}

impl AwsS3 {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: s3::Client::new(config),
        }
    }
}

fn stored(
    key: Option<&str>,
    version_id: Option<&str>,
    modified: Option<&DateTime>,
    current: bool,
) -> Option<StoredObject> {
    Some(StoredObject {
        key: key?.to_string(),
        version_id: version_id.map(str::to_string),
        last_modified: modified.and_then(to_utc).unwrap_or_default(),
        current,
    })
}

#[async_trait]
impl S3Api for AwsS3 {
    async fn list_buckets(&self) -> Result<Vec<Bucket>, RemoteError> {
        let mut buckets = Vec::new();
        let mut pages = self.client.list_buckets().into_paginator().send();
        while let Some(page) = pages.next().await.transpose().remote("ListBuckets")? {
            for b in page.buckets() {
                let Some(name) = b.name() else { continue };
                buckets.push(Bucket {
                    name: name.to_string(),
                    created: b.creation_date().and_then(to_utc).unwrap_or_default(),
                });
            }
        }
        Ok(buckets)
    }

    async fn bucket_tags(&self, bucket: &str) -> Result<Tags, RemoteError> {
        match self.client.get_bucket_tagging().bucket(bucket).send().await {
            Ok(resp) => Ok(resp
                .tag_set()
                .iter()
                .map(|t| (t.key().to_string(), t.value().to_string()))
                .collect()),
            // An untagged bucket answers with an error rather than an empty set.
            Err(e) if e.code() == Some("NoSuchTagSet") => Ok(Tags::new()),
            Err(e) => Err(remote_error("GetBucketTagging", &e)),
        }
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<StoredObject>, RemoteError> {
        let mut objects = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await.transpose().remote("ListObjectsV2")? {
            objects.extend(
                page.contents()
                    .iter()
                    .filter_map(|o| stored(o.key(), None, o.last_modified(), true)),
            );
        }
        Ok(objects)
    }

    async fn list_object_versions(&self, bucket: &str) -> Result<Vec<StoredObject>, RemoteError> {
        // ListObjectVersions pages on two markers and has no SDK paginator.
        let mut entries = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_object_versions()
                .bucket(bucket)
                .set_key_marker(key_marker.clone())
                .set_version_id_marker(version_marker.clone())
                .send()
                .await
                .remote("ListObjectVersions")?;

            entries.extend(
                resp.versions().iter().filter_map(|v| {
                    let latest = v.is_latest() == Some(true);
                    stored(v.key(), v.version_id(), v.last_modified(), latest)
                }),
            );
            entries.extend(
                resp.delete_markers()
                    .iter()
                    .filter_map(|m| stored(m.key(), m.version_id(), m.last_modified(), false)),
            );

            if resp.is_truncated() != Some(true) {
                break;
            }
            key_marker = resp.next_key_marker().map(str::to_string);
            version_marker = resp.next_version_id_marker().map(str::to_string);
            if key_marker.is_none() && version_marker.is_none() {
                break;
            }
        }
        Ok(entries)
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        objects: &[StoredObject],
    ) -> Result<u64, RemoteError> {
        let identifiers = objects
            .iter()
            .map(|o| {
                ObjectIdentifier::builder()
                    .key(&o.key)
                    .set_version_id(o.version_id.clone())
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RemoteError::new("DeleteObjects", e))?;
        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(|e| RemoteError::new("DeleteObjects", e))?;

        let resp = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .remote("DeleteObjects")?;

        // Quiet mode only reports the keys that failed.
        for err in resp.errors() {
            tracing::debug!(
                "DeleteObjects: {} in {bucket}: {}",
                err.key().unwrap_or("?"),
                err.message().unwrap_or("unknown error")
            );
        }
        Ok(objects.len().saturating_sub(resp.errors().len()) as u64)
    }

    async fn has_objects(&self, bucket: &str) -> Result<bool, RemoteError> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(1)
            .send()
            .await
            .remote("ListObjectsV2")?;
        Ok(!resp.contents().is_empty())
    }

    async fn has_versions(&self, bucket: &str) -> Result<bool, RemoteError> {
        let resp = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .max_keys(1)
            .send()
            .await
            .remote("ListObjectVersions")?;
        Ok(!resp.versions().is_empty() || !resp.delete_markers().is_empty())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), RemoteError> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .remote("DeleteBucket")?;
        Ok(())
    }
}
