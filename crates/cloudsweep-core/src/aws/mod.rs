//! Remote API implementations backed by the AWS SDK.
//!
//! Each service trait of [`crate::services`] gets one thin client wrapper
//! here. The wrappers resolve pagination and translate SDK errors into
//! [`RemoteError`]; they make no decisions of their own.

mod cloudwatch;
mod ec2;
mod iam;
mod lambda;
mod s3;

pub use cloudwatch::{AwsLogs, AwsMetrics};
pub use ec2::AwsEc2;
pub use iam::AwsIam;
pub use lambda::AwsLambda;
pub use s3::AwsS3;

use crate::error::RemoteError;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::DateTime as SmithyDateTime;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// Load shared SDK configuration from the environment, optionally pinned to
/// `region`.
pub async fn load_config(region: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }
    loader.load().await
}

/// One client per remote API, sharing a single SDK configuration.
#[derive(Clone)]
pub struct AwsServices {
    pub s3: Arc<AwsS3>,
    pub ec2: Arc<AwsEc2>,
    pub lambda: Arc<AwsLambda>,
    pub metrics: Arc<AwsMetrics>,
    pub logs: Arc<AwsLogs>,
    pub iam: Arc<AwsIam>,
}

impl std::fmt::Debug for AwsServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsServices").finish_non_exhaustive()
    }
}

impl AwsServices {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            s3: Arc::new(AwsS3::new(config)),
            ec2: Arc::new(AwsEc2::new(config)),
            lambda: Arc::new(AwsLambda::new(config)),
            metrics: Arc::new(AwsMetrics::new(config)),
            logs: Arc::new(AwsLogs::new(config)),
            iam: Arc::new(AwsIam::new(config)),
        }
    }
}

/// Translate an SDK failure into a [`RemoteError`] tagged with `operation`.
pub(crate) fn remote_error<E>(operation: &'static str, err: &E) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let message = err
        .message()
        .map_or_else(|| DisplayErrorContext(err).to_string(), str::to_string);
    match err.code() {
        Some(code) => RemoteError::with_code(operation, code, message),
        None => RemoteError::new(operation, message),
    }
}

/// `?`-friendly form of [`remote_error`].
pub(crate) trait Remote<T> {
    fn remote(self, operation: &'static str) -> Result<T, RemoteError>;
}

impl<T, E> Remote<T> for Result<T, E>
where
    E: ProvideErrorMetadata + std::error::Error,
{
    fn remote(self, operation: &'static str) -> Result<T, RemoteError> {
        self.map_err(|e| remote_error(operation, &e))
    }
}

pub(crate) fn to_utc(ts: &SmithyDateTime) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts.secs(), ts.subsec_nanos()).single()
}

pub(crate) fn to_smithy(ts: DateTime<Utc>) -> SmithyDateTime {
    SmithyDateTime::from_secs(ts.timestamp())
}
