//! Script runner: one envelope per command line plus a summary.

use super::DslError;
use super::dispatch::execute_line;
use crate::core::envelope::{BatchEnvelope, BatchSummary, Status, make_batch};
use crate::core::store::Store;
use std::fs;
use std::path::Path;
use std::time::Instant;

/// Run every line of `script`. `label` is reported as the batch's `file`.
///
/// Blank and comment lines count as skipped and produce no result entry.
pub fn execute_script(store: &Store, owner: Option<&str>, label: &str, script: &str) -> BatchEnvelope {
    let started = Instant::now();
    let mut summary = BatchSummary::default();
    let mut results = Vec::new();

    for line in script.lines() {
        summary.lines_total += 1;
        let Some(envelope) = execute_line(store, owner, line) else {
            summary.skipped += 1;
            continue;
        };
        match envelope.status {
            Status::Ok => summary.ok += 1,
            Status::Error => summary.error += 1,
            Status::Skipped => summary.skipped += 1,
        }
        results.push(envelope);
    }

    make_batch(label, summary, results, started)
}

/// Read and run a script file.
pub fn execute_file(store: &Store, owner: Option<&str>, path: &Path) -> Result<BatchEnvelope, DslError> {
    let script = fs::read_to_string(path)?;
    Ok(execute_script(store, owner, &path.display().to_string(), &script))
}
