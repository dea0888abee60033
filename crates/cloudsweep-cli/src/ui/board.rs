//! Update-in-place progress board.
//!
//! Rows are keyed by resource kind and id: a `completed` event replaces the
//! `planned` event for the same resource, so the board always holds the latest
//! state. Ids are only unique within a kind (an IAM role and user may share a
//! name).

use cloudsweep_core::report::ReportStatus;
use cloudsweep_core::resource::ResourceKind;
use cloudsweep_core::{Observer, ProgressEvent};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// A soft failure surfaced during the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Id of the resource the failure concerns.
    pub resource: String,
    /// What went wrong, as reported by the executor.
    pub message: String,
}

/// [`Observer`] collecting one row per resource for one service run.
#[derive(Debug)]
pub struct Board {
    service: &'static str,
    live: bool,
    rows: Mutex<BTreeMap<(ResourceKind, String), ProgressEvent>>,
    warnings: Mutex<Vec<Warning>>,
}

impl Board {
    /// `live` echoes every state change to stderr as it happens.
    pub fn new(service: &'static str, live: bool) -> Self {
        Self {
            service,
            live,
            rows: Mutex::new(BTreeMap::new()),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Latest event per resource, ordered by kind then id.
    pub fn rows(&self) -> Vec<ProgressEvent> {
        self.rows
            .lock()
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Warnings in the order they were raised.
    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }
}

impl Observer for Board {
    fn progress(&self, event: &ProgressEvent) {
        if self.live {
            let verb = match event.status {
                ReportStatus::Planned => "planned",
                ReportStatus::Completed => "done",
            };
            eprintln!("  [{}] {verb:<7} {} {}", self.service, event.kind, event.resource);
        }
        if let Ok(mut rows) = self.rows.lock() {
            rows.insert((event.kind, event.resource.clone()), event.clone());
        }
    }

    fn warning(&self, resource: &str, message: &str) {
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(Warning {
                resource: resource.to_string(),
                message: message.to_string(),
            });
        }
    }
}
