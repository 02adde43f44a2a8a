//! Result post-processing: ordering, filter facets, and cleanup of the
//! interchange output folders.

use std::collections::BTreeSet;
use std::path::PathBuf;

use log::{debug, warn};

use super::scan::{MatchResult, ALL_KEYWORD};

/// Order results by source file name, case-insensitively. The sort is
/// stable, so rows of one file keep their extraction order.
pub fn sort_results(results: &mut [MatchResult]) {
    results.sort_by_cached_key(|r| r.file_name.to_lowercase());
}

/// Distinct values per result column, for narrowing a result set after
/// the scan. Each facet starts with the catch-all entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub files: Vec<String>,
    pub object_types: Vec<String>,
    pub layers: Vec<String>,
    pub keywords: Vec<String>,
}

impl FilterOptions {
    /// Collect facets from a result set.
    #[must_use]
    pub fn from_results(results: &[MatchResult]) -> Self {
        Self {
            files: facet(results.iter().map(|r| r.file_name.clone())),
            object_types: facet(results.iter().map(|r| r.object_type.clone())),
            layers: facet(results.iter().map(|r| r.layer.clone())),
            keywords: facet(results.iter().map(|r| r.keyword.clone())),
        }
    }
}

fn facet(values: impl Iterator<Item = String>) -> Vec<String> {
    let distinct: BTreeSet<String> = values.collect();
    let mut list = Vec::with_capacity(distinct.len() + 1);
    list.push(ALL_KEYWORD.to_string());
    list.extend(distinct);
    list
}

/// Delete interchange output folders, returning how many were removed.
/// Failures are logged and skipped so one stubborn folder does not stop
/// the rest of the cleanup.
pub fn clear_output_roots<'a>(roots: impl IntoIterator<Item = &'a PathBuf>) -> usize {
    let mut removed = 0;
    for root in roots {
        if !root.exists() {
            continue;
        }
        match std::fs::remove_dir_all(root) {
            Ok(()) => {
                debug!("removed {}", root.display());
                removed += 1;
            }
            Err(e) => warn!("could not remove {}: {}", root.display(), e),
        }
    }
    removed
}
