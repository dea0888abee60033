//! cloudsweep - policy-driven cleanup of idle cloud resources
//!
//! The binary is thin glue over `cloudsweep-core`: it loads the TOML policy
//! file, refuses hazardous apply runs that were not acknowledged, runs the
//! selected services concurrently and renders their summaries.
//!
//! Every run is a dry-run unless `--apply` is given.

#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod cmd;
pub mod config;
pub mod ui;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "cloudsweep")]
#[command(author, version, about = "cloudsweep - clean up idle cloud resources")]
pub struct Cli {
    /// Policy file (TOML). Defaults to ./cloudsweep.toml when present
    #[arg(long, short, global = true, env = "CLOUDSWEEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Evaluate policies and delete (with --apply) what they select
    Run(RunArgs),
    /// Load and validate the policy file, then print the effective policies
    #[command(name = "check-config")]
    CheckConfig,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Service to clean (s3, ec2, lambda, ebs, cloudwatch, iam) or "all"
    #[arg(long, short, default_value = "all")]
    pub service: Vec<String>,

    /// Actually delete. Without this flag nothing is changed
    #[arg(long)]
    pub apply: bool,

    /// Print the per-resource deletion plan; implies a dry-run
    #[arg(long, conflicts_with = "apply")]
    pub plan: bool,

    /// Print summaries as JSON
    #[arg(long)]
    pub json: bool,

    /// Restrict this run to the given resource ids (single service only)
    #[arg(long, alias = "bucket", value_name = "ID")]
    pub only: Vec<String>,

    /// Add a resource id to the service's target list for this run.
    /// EBS snapshot ids (snap-...) go to the snapshot list. IAM ids may be
    /// written role:NAME, user:NAME or policy:NAME; a bare name covers all three
    #[arg(long, value_name = "ID")]
    pub include: Vec<String>,

    /// Add a resource id to the service's ignore list for this run.
    /// Ids are routed like --include
    #[arg(long, value_name = "ID")]
    pub exclude: Vec<String>,

    /// Show the plan, then ask per resource before applying (single service only)
    #[arg(long, conflicts_with_all = ["json", "plan"])]
    pub interactive: bool,

    /// S3: delete every object in targeted buckets regardless of age.
    /// Still needs --force-delete-all with --apply
    #[arg(long)]
    pub delete_all_objects: bool,

    /// Acknowledge s3.delete_all_objects in apply mode
    #[arg(long)]
    pub force_delete_all: bool,

    /// Acknowledge zero-day retention thresholds in apply mode
    #[arg(long)]
    pub force_zero_retention: bool,
}
