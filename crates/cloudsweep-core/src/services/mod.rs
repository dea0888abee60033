//! One module per cloud service: its policy, its remote API seam, its
//! resource adapters and its `run_cleanup` entry point.

pub mod cloudwatch;
pub mod ebs;
pub mod ec2;
pub mod iam;
pub mod lambda;
pub mod s3;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The six independently runnable cleanups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    S3,
    Ec2,
    Lambda,
    Ebs,
    CloudWatch,
    Iam,
}

impl Service {
    /// Every service, in the order a full run processes them.
    pub const ALL: [Service; 6] = [
        Service::S3,
        Service::Ec2,
        Service::Lambda,
        Service::Ebs,
        Service::CloudWatch,
        Service::Iam,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Ec2 => "ec2",
            Self::Lambda => "lambda",
            Self::Ebs => "ebs",
            Self::CloudWatch => "cloudwatch",
            Self::Iam => "iam",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|svc| svc.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown service '{s}'"))
    }
}
