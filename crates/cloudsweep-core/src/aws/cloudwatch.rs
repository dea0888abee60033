use super::{Remote, to_smithy, to_utc};
use crate::error::RemoteError;
use crate::resource::{LogGroup, LogStream};
use crate::services::cloudwatch::LogsApi;
use crate::services::lambda::MetricsApi;
use crate::time::from_epoch_millis;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudwatch as cloudwatch;
use aws_sdk_cloudwatchlogs as logs;
use chrono::{DateTime, Utc};
use cloudwatch::types::{Dimension, Statistic};
use logs::types::OrderBy;

/// Metric period in seconds: one datapoint per day.
const DAILY: i32 = 86_400;

/// [`MetricsApi`] over CloudWatch metrics.
#[derive(Debug, Clone)]
pub struct AwsMetrics {
    client: cloudwatch::Client,
}

impl AwsMetrics {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: cloudwatch::Client::new(config),
        }
    }
}

#[async_trait]
impl MetricsApi for AwsMetrics {
    async fn last_invocation(
        &self,
        function: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, RemoteError> {
        let dimension = Dimension::builder()
            .name("FunctionName")
            .value(function)
            .build()
            .map_err(|e| RemoteError::new("GetMetricStatistics", e))?;
        let resp = self
            .client
            .get_metric_statistics()
            .namespace("AWS/Lambda")
            .metric_name("Invocations")
            .dimensions(dimension)
            .start_time(to_smithy(since))
            .end_time(to_smithy(until))
            .period(DAILY)
            .statistics(Statistic::Sum)
            .send()
            .await
            .remote("GetMetricStatistics")?;

        Ok(resp
            .datapoints()
            .iter()
            .filter(|p| p.sum().is_some_and(|n| n > 0.0))
            .filter_map(|p| p.timestamp().and_then(to_utc))
            .max())
    }
}

/// [`LogsApi`] over CloudWatch Logs.
#[derive(Debug, Clone)]
pub struct AwsLogs {
    client: logs::Client,
}

impl AwsLogs {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: logs::Client::new(config),
        }
    }
}

#[async_trait]
impl LogsApi for AwsLogs {
    async fn list_log_groups(&self) -> Result<Vec<LogGroup>, RemoteError> {
        let mut groups = Vec::new();
        let mut pages = self.client.describe_log_groups().into_paginator().send();
        while let Some(page) = pages.next().await.transpose().remote("DescribeLogGroups")? {
            for lg in page.log_groups() {
                let Some(name) = lg.log_group_name() else { continue };
                groups.push(LogGroup {
                    name: name.to_string(),
                    created: lg
                        .creation_time()
                        .and_then(from_epoch_millis)
                        .unwrap_or_default(),
                });
            }
        }
        Ok(groups)
    }

    async fn last_event(&self, group: &str) -> Result<Option<DateTime<Utc>>, RemoteError> {
        let resp = self
            .client
            .describe_log_streams()
            .log_group_name(group)
            .order_by(OrderBy::LastEventTime)
            .descending(true)
            .limit(1)
            .send()
            .await
            .remote("DescribeLogStreams")?;
        Ok(resp
            .log_streams()
            .first()
            .and_then(|s| s.last_event_timestamp())
            .and_then(from_epoch_millis))
    }

    async fn list_streams(&self, group: &str) -> Result<Vec<LogStream>, RemoteError> {
        let mut streams = Vec::new();
        let mut pages = self
            .client
            .describe_log_streams()
            .log_group_name(group)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await.transpose().remote("DescribeLogStreams")? {
            for s in page.log_streams() {
                let Some(name) = s.log_stream_name() else { continue };
                streams.push(LogStream {
                    name: name.to_string(),
                    last_event: s.last_event_timestamp().and_then(from_epoch_millis),
                });
            }
        }
        Ok(streams)
    }

    async fn delete_log_group(&self, group: &str) -> Result<(), RemoteError> {
        self.client
            .delete_log_group()
            .log_group_name(group)
            .send()
            .await
            .remote("DeleteLogGroup")?;
        Ok(())
    }

    async fn delete_log_stream(&self, group: &str, stream: &str) -> Result<(), RemoteError> {
        self.client
            .delete_log_stream()
            .log_group_name(group)
            .log_stream_name(stream)
            .send()
            .await
            .remote("DeleteLogStream")?;
        Ok(())
    }
}
