//! Plan and summary tables.

use super::board::Warning;
use cloudsweep_core::report::{Item, Tally};
use cloudsweep_core::{ProgressEvent, Summary};
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use std::collections::BTreeSet;

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// `objects 3, buckets 1`; `-` when nothing is counted.
pub fn format_tally(tally: &Tally) -> String {
    if tally.is_empty() {
        return "-".to_string();
    }
    tally
        .iter()
        .map(|(item, n)| format!("{item} {n}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One line naming the service, the mode and the scan totals.
pub fn headline(summary: &Summary) -> String {
    let mode = if summary.dry_run { "dry run" } else { "applied" };
    let scanned = summary
        .scanned
        .iter()
        .map(|(kind, n)| {
            let targeted = summary.targeted(*kind);
            format!("{kind}: {targeted}/{n} targeted")
        })
        .collect::<Vec<_>>()
        .join(", ");
    if scanned.is_empty() {
        format!("{} ({mode}): nothing listed", summary.service)
    } else {
        format!("{} ({mode}): {scanned}", summary.service)
    }
}

/// Per-item totals: planned against deleted.
pub fn summary_table(summary: &Summary) -> Table {
    let items: BTreeSet<Item> = summary
        .planned
        .iter()
        .chain(summary.deleted.iter())
        .map(|(item, _)| item)
        .collect();

    let mut table = base_table();
    table.set_header(vec!["Item", "Planned", "Deleted"]);
    for item in items {
        let deleted = if summary.dry_run {
            "-".to_string()
        } else {
            summary.deleted(item).to_string()
        };
        table.add_row(vec![
            Cell::new(item),
            Cell::new(summary.planned(item)).set_alignment(CellAlignment::Right),
            Cell::new(deleted).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

/// Latest state of every targeted resource.
pub fn resource_table(rows: &[ProgressEvent]) -> Table {
    let mut table = base_table();
    table.set_header(vec!["Resource", "Kind", "Planned", "Deleted", "Notes"]);
    for row in rows {
        let deleted = if row.dry_run {
            "-".to_string()
        } else {
            format_tally(&row.deleted)
        };
        table.add_row(vec![
            row.resource.clone(),
            row.kind.to_string(),
            format_tally(&row.planned),
            deleted,
            row.notes.len().to_string(),
        ]);
    }
    table
}

/// One stderr line per warning.
pub fn warning_lines(warnings: &[Warning]) -> Vec<String> {
    warnings
        .iter()
        .map(|w| format!("warning: {}: {}", w.resource, w.message))
        .collect()
}
