//! Per-resource approval for `run --interactive`.

use super::table::format_tally;
use cloudsweep_core::DeletionReport;
use std::io::{BufRead, Write};

/// Ask once per planned resource and return the identifiers answered `y`.
///
/// End of input declines everything still unanswered.
pub fn approve<R: BufRead, W: Write>(
    reports: &[DeletionReport],
    mut input: R,
    mut output: W,
) -> std::io::Result<Vec<String>> {
    let mut approved = Vec::new();
    for report in reports {
        if approved.contains(&report.resource) {
            continue;
        }
        write!(
            output,
            "  Apply deletions for {} {} ({})? (y/N) ",
            report.kind,
            report.resource,
            format_tally(&report.planned)
        )?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            writeln!(output)?;
            break;
        }
        let answer = answer.trim();
        if answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes") {
            approved.push(report.resource.clone());
        }
    }
    Ok(approved)
}
