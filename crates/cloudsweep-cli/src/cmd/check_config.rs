//! Validate the policy file without touching the account.

use crate::config::{self, Source};
use anyhow::{Context, Result};
use cloudsweep_core::Service;
use std::path::Path;

/// Print the effective policies as TOML, defaults filled in.
pub fn check_config(path: Option<&Path>) -> Result<()> {
    let (policies, source) = config::load(path)?;
    match &source {
        Source::File(path) => println!("# {} is valid", path.display()),
        Source::Defaults => println!("# no config file, built-in defaults"),
    }
    let rendered = toml::to_string_pretty(&policies).context("Failed to render policies")?;
    println!("{rendered}");

    for hazard in policies.hazards(&Service::ALL) {
        eprintln!("warning: {hazard} (needs acknowledgement with --apply)");
    }
    Ok(())
}
