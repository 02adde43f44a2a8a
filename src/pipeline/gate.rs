//! Conversion gating by modification time.
//!
//! A target needs conversion only when its interchange output is missing
//! or strictly older than the source drawing. Unreadable timestamps fail
//! open: converting a file twice is cheap, silently skipping a changed
//! one is not.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use log::debug;

use super::resolver::ScanTarget;
use crate::progress::ProgressCallback;

/// Result of splitting targets into pending and up-to-date sets.
#[derive(Debug, Default)]
pub struct GateOutcome {
    /// Targets whose interchange output must be (re)built.
    pub pending: Vec<ScanTarget>,
    /// Targets whose output is already current.
    pub skipped: Vec<ScanTarget>,
    /// True when a shutdown request stopped the comparison early.
    pub interrupted: bool,
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Decide whether one target's output is stale.
#[must_use]
pub fn needs_convert(target: &ScanTarget) -> bool {
    if !target.converted.exists() {
        return true;
    }
    // Source vanished between resolution and gating: nothing to convert
    let Ok(source_meta) = std::fs::metadata(&target.source) else {
        return false;
    };
    match (source_meta.modified().ok(), mtime(&target.converted)) {
        (Some(source), Some(output)) => output < source,
        _ => true,
    }
}

/// Partition `targets` by [`needs_convert`], reporting progress along the
/// way and honoring the shutdown flag between items.
#[must_use]
pub fn compare_targets(
    targets: Vec<ScanTarget>,
    progress: &dyn ProgressCallback,
    shutdown: Option<&Arc<AtomicBool>>,
) -> GateOutcome {
    let total = targets.len();
    progress.on_phase_start("compare", total);

    let step = (total / 200).max(1);
    let mut outcome = GateOutcome::default();

    for (index, target) in targets.into_iter().enumerate() {
        if shutdown.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            outcome.interrupted = true;
            break;
        }

        let done = index + 1;
        if done % step == 0 || done == total {
            progress.on_progress(done, &target.source.display().to_string());
        }

        if needs_convert(&target) {
            debug!("stale output for {}", target.source.display());
            outcome.pending.push(target);
        } else {
            outcome.skipped.push(target);
        }
    }

    progress.on_phase_end("compare");
    outcome
}
