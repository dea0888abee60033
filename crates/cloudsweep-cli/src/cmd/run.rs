//! The `run` command.
//!
//! Everything that can be refused is refused before the SDK configuration is
//! loaded: service selection, policy validation, scoping flags and the
//! apply-mode hazard gate.
//!
//! `--interactive` runs a dry pass first and turns the approved resources
//! into the `only` list of the real pass.

use crate::RunArgs;
use crate::config::{self, Overrides};
use crate::ui::{self, Board, table};
use anyhow::{Result, bail};
use cloudsweep_core::aws::{self, AwsServices};
use cloudsweep_core::services::{cloudwatch, ebs, ec2, iam, lambda, s3};
use cloudsweep_core::{
    CleanupError, Clock, DeletionReport, FixedClock, Policies, RunContext, RunOptions, Service,
    Summary, SystemClock,
};
use futures::future::join_all;
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::Arc;

/// Result of one service within a run.
struct Outcome {
    service: Service,
    board: Arc<Board>,
    result: Result<Summary, CleanupError>,
}

pub async fn run(args: &RunArgs, config_path: Option<&Path>) -> Result<()> {
    let services = config::services(&args.service)?;
    let (mut policies, _) = config::load(config_path)?;

    let scoped = !args.only.is_empty() || !args.include.is_empty() || !args.exclude.is_empty();
    if scoped || args.interactive {
        let [service] = services.as_slice() else {
            bail!("--only, --include, --exclude and --interactive need exactly one --service");
        };
        policies.widen(*service, &args.include, &args.exclude);
    }
    if args.delete_all_objects {
        policies.s3.delete_all_objects = true;
    }

    let apply = args.apply && !args.plan;
    let hazards = policies.hazards(&services);
    if apply {
        config::gate(
            &hazards,
            Overrides {
                delete_all: args.force_delete_all,
                zero_retention: args.force_zero_retention,
            },
        )?;
    } else {
        for hazard in &hazards {
            tracing::warn!("{hazard} (not enforced in a dry run)");
        }
    }

    let sdk = aws::load_config(policies.region.as_deref()).await;
    let clients = AwsServices::new(&sdk);
    let clock = FixedClock(SystemClock.now());
    let mut only = args.only.clone();

    if args.interactive {
        let preview = RunOptions {
            apply: false,
            only: only.clone(),
        };
        let outcomes = run_services(&services, &policies, &clients, &clock, &preview, false).await;
        print_tables(&outcomes, true);
        ensure_succeeded(&outcomes)?;
        if !apply {
            tracing::info!("--interactive without --apply only shows the plan");
            return Ok(());
        }

        let reports: Vec<DeletionReport> = outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .flat_map(|summary| summary.reports.iter().cloned())
            .collect();
        if reports.is_empty() {
            tracing::info!("Nothing matched the policies; nothing to approve");
            return Ok(());
        }
        println!();
        only = ui::prompt::approve(&reports, std::io::stdin().lock(), std::io::stdout())?;
        if only.is_empty() {
            tracing::info!("No resources approved; nothing was changed");
            return Ok(());
        }
    }

    let options = RunOptions { apply, only };
    if apply {
        tracing::info!("Applying cleanup to: {}", names(&services));
    } else {
        tracing::info!("Dry run over: {}", names(&services));
    }

    let live = !args.json;
    let outcomes = run_services(&services, &policies, &clients, &clock, &options, live).await;

    if args.json {
        print_json(&outcomes)?;
    } else {
        print_tables(&outcomes, args.plan);
        if !apply {
            println!();
            println!("Dry run: nothing was changed. Re-run with --apply to delete.");
        }
    }
    ensure_succeeded(&outcomes)
}

/// Run every selected service concurrently, each with its own board.
async fn run_services(
    services: &[Service],
    policies: &Policies,
    clients: &AwsServices,
    clock: &FixedClock,
    options: &RunOptions,
    live: bool,
) -> Vec<Outcome> {
    join_all(services.iter().map(|&service| {
        let board = Arc::new(Board::new(service.as_str(), live));
        let ctx = RunContext::new(clock, options, board.clone());
        async move {
            let result = run_service(service, policies, clients, &ctx).await;
            Outcome {
                service,
                board,
                result,
            }
        }
    }))
    .await
}

fn ensure_succeeded(outcomes: &[Outcome]) -> Result<()> {
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if failed > 0 {
        bail!("{failed} service run(s) failed");
    }
    Ok(())
}

fn names(services: &[Service]) -> String {
    services
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

async fn run_service(
    service: Service,
    policies: &Policies,
    aws: &AwsServices,
    ctx: &RunContext,
) -> Result<Summary, CleanupError> {
    match service {
        Service::S3 => s3::run_cleanup(Arc::clone(&aws.s3), &policies.s3, ctx).await,
        Service::Ec2 => ec2::run_cleanup(Arc::clone(&aws.ec2), &policies.ec2, ctx).await,
        Service::Ebs => ebs::run_cleanup(Arc::clone(&aws.ec2), &policies.ebs, ctx).await,
        Service::Lambda => {
            lambda::run_cleanup(
                Arc::clone(&aws.lambda),
                Arc::clone(&aws.metrics),
                Arc::clone(&aws.logs),
                &policies.lambda,
                ctx,
            )
            .await
        }
        Service::CloudWatch => {
            cloudwatch::run_cleanup(Arc::clone(&aws.logs), &policies.cloudwatch, ctx).await
        }
        Service::Iam => iam::run_cleanup(Arc::clone(&aws.iam), &policies.iam, ctx).await,
    }
}

fn print_json(outcomes: &[Outcome]) -> Result<()> {
    let mut doc = Map::new();
    for outcome in outcomes {
        let value = match &outcome.result {
            Ok(summary) => serde_json::to_value(summary)?,
            Err(e) => json!({ "error": e.to_string() }),
        };
        doc.insert(outcome.service.to_string(), value);
    }
    println!("{}", serde_json::to_string_pretty(&Value::Object(doc))?);
    Ok(())
}

fn print_tables(outcomes: &[Outcome], plan: bool) {
    for outcome in outcomes {
        println!();
        let summary = match &outcome.result {
            Ok(summary) => summary,
            Err(e) => {
                println!("{}: failed: {e}", outcome.service);
                continue;
            }
        };

        println!("{}", table::headline(summary));
        let rows = outcome.board.rows();
        if plan && !rows.is_empty() {
            println!("{}", table::resource_table(&rows));
        }
        if summary.planned.is_empty() {
            println!("  nothing to clean up");
        } else {
            println!("{}", table::summary_table(summary));
        }
        for line in table::warning_lines(&outcome.board.warnings()) {
            eprintln!("{line}");
        }
    }
}
