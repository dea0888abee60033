//! Policy file loading and the apply-mode safety gate.

use anyhow::{Context, Result, bail};
use cloudsweep_core::{Hazard, Policies, Service};
use std::path::{Path, PathBuf};

/// Looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG: &str = "cloudsweep.toml";

/// Where the effective policies came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Defaults,
}

/// Load policies from `path`, from [`DEFAULT_CONFIG`] if it exists, or fall
/// back to the built-in defaults.
pub fn load(path: Option<&Path>) -> Result<(Policies, Source)> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG);
            if !fallback.exists() {
                tracing::debug!("No {DEFAULT_CONFIG} found, using default policies");
                return Ok((Policies::default(), Source::Defaults));
            }
            fallback
        }
    };
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let policies = parse(&raw).with_context(|| format!("Invalid config {}", path.display()))?;
    Ok((policies, Source::File(path)))
}

/// Parse and validate a policy document for every service.
pub fn parse(raw: &str) -> Result<Policies> {
    let policies: Policies = toml::from_str(raw)?;
    policies
        .validate(&Service::ALL)
        .map_err(|(service, e)| anyhow::anyhow!("[{service}] {e}"))?;
    Ok(policies)
}

/// Resolve `--service` values; `all` expands to every service.
pub fn services(raw: &[String]) -> Result<Vec<Service>> {
    let mut selected = Vec::new();
    for value in raw {
        if value.eq_ignore_ascii_case("all") {
            return Ok(Service::ALL.to_vec());
        }
        let service: Service = value.parse().map_err(anyhow::Error::msg)?;
        if !selected.contains(&service) {
            selected.push(service);
        }
    }
    if selected.is_empty() {
        bail!("No service selected");
    }
    Ok(selected)
}

/// Acknowledgements given on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub delete_all: bool,
    pub zero_retention: bool,
}

/// Hazards not covered by `overrides`.
pub fn unacknowledged(hazards: &[Hazard], overrides: Overrides) -> Vec<Hazard> {
    hazards
        .iter()
        .copied()
        .filter(|h| match h {
            Hazard::DeleteAllObjects => !overrides.delete_all,
            Hazard::ZeroRetention { .. } => !overrides.zero_retention,
        })
        .collect()
}

/// Refuse an apply run that carries unacknowledged hazards.
pub fn gate(hazards: &[Hazard], overrides: Overrides) -> Result<()> {
    let open = unacknowledged(hazards, overrides);
    if open.is_empty() {
        return Ok(());
    }
    let list = open
        .iter()
        .map(|h| format!("  - {h}"))
        .collect::<Vec<_>>()
        .join("\n");
    bail!(
        "Refusing to apply with hazardous settings:\n{list}\n\
         Pass --force-delete-all / --force-zero-retention to proceed"
    )
}
