use super::{Remote, to_utc};
use crate::error::RemoteError;
use crate::resource::{Instance, Snapshot, Tags, Volume};
use crate::services::ec2::Ec2Api;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ec2 as ec2;

/// [`Ec2Api`] over the EC2 client. Serves both instance and block storage
/// cleanup.
#[derive(Debug, Clone)]
pub struct AwsEc2 {
    client: ec2::Client,
}

impl AwsEc2 {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: ec2::Client::new(config),
        }
    }
}

fn tag_map(raw: &[ec2::types::Tag]) -> Tags {
    raw.iter()
        .filter_map(|t| match (t.key(), t.value()) {
            (Some(k), Some(v)) => Some((k.to_string(), v.to_string())),
            _ => None,
        })
        .collect()
}

/// EBS volumes the platform will not remove by itself on termination.
fn retained_volumes(inst: &ec2::types::Instance) -> Vec<String> {
    inst.block_device_mappings()
        .iter()
        .filter_map(|m| m.ebs())
        .filter(|ebs| ebs.delete_on_termination() != Some(true))
        .filter_map(|ebs| ebs.volume_id().map(str::to_string))
        .collect()
}

#[async_trait]
impl Ec2Api for AwsEc2 {
    async fn list_instances(&self) -> Result<Vec<Instance>, RemoteError> {
        let mut instances = Vec::new();
        let mut pages = self.client.describe_instances().into_paginator().send();
        while let Some(page) = pages.next().await.transpose().remote("DescribeInstances")? {
            for inst in page.reservations().iter().flat_map(|r| r.instances()) {
                let Some(id) = inst.instance_id() else { continue };
                let tags = tag_map(inst.tags());
                instances.push(Instance {
                    id: id.to_string(),
                    name: tags.get("Name").cloned().unwrap_or_default(),
                    state: inst
                        .state()
                        .and_then(|s| s.name())
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_default(),
                    launched: inst.launch_time().and_then(to_utc).unwrap_or_default(),
                    tags,
                    volume_ids: retained_volumes(inst),
                });
            }
        }
        Ok(instances)
    }

    async fn terminate_instance(&self, id: &str) -> Result<(), RemoteError> {
        self.client
            .terminate_instances()
            .instance_ids(id)
            .send()
            .await
            .remote("TerminateInstances")?;
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>, RemoteError> {
        let mut volumes = Vec::new();
        let mut pages = self.client.describe_volumes().into_paginator().send();
        while let Some(page) = pages.next().await.transpose().remote("DescribeVolumes")? {
            for vol in page.volumes() {
                let Some(id) = vol.volume_id() else { continue };
                volumes.push(Volume {
                    id: id.to_string(),
                    state: vol.state().map(|s| s.as_str().to_string()).unwrap_or_default(),
                    created: vol.create_time().and_then(to_utc).unwrap_or_default(),
                    size_gb: vol.size().map_or(0, i64::from),
                    tags: tag_map(vol.tags()),
                });
            }
        }
        Ok(volumes)
    }

    async fn delete_volume(&self, id: &str) -> Result<(), RemoteError> {
        self.client
            .delete_volume()
            .volume_id(id)
            .send()
            .await
            .remote("DeleteVolume")?;
        Ok(())
    }

    async fn list_snapshots(&self) -> Result<Vec<Snapshot>, RemoteError> {
        let mut snapshots = Vec::new();
        let mut pages = self
            .client
            .describe_snapshots()
            .owner_ids("self")
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await.transpose().remote("DescribeSnapshots")? {
            for snap in page.snapshots() {
                let Some(id) = snap.snapshot_id() else { continue };
                snapshots.push(Snapshot {
                    id: id.to_string(),
                    state: snap.state().map(|s| s.as_str().to_string()).unwrap_or_default(),
                    started: snap.start_time().and_then(to_utc).unwrap_or_default(),
                    volume_size_gb: snap.volume_size().map_or(0, i64::from),
                    tags: tag_map(snap.tags()),
                });
            }
        }
        Ok(snapshots)
    }

    async fn delete_snapshot(&self, id: &str) -> Result<(), RemoteError> {
        self.client
            .delete_snapshot()
            .snapshot_id(id)
            .send()
            .await
            .remote("DeleteSnapshot")?;
        Ok(())
    }
}
