//! Input resolution: turning the caller's folders and loose files into a
//! deduplicated list of scan targets.
//!
//! Folders are walked recursively for drawings matching the configured
//! filename filter. Loose files are taken as-is, except when they already
//! live under one of the requested folders, in which case the folder walk
//! covers them and the loose entry is dropped.

use std::collections::HashSet;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::config::Settings;

/// One drawing scheduled for conversion and scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    /// Absolute path of the source drawing.
    pub source: PathBuf,
    /// Directory the converter writes into, a fixed-name subdirectory of
    /// the source's parent.
    pub output_root: PathBuf,
    /// Expected interchange file inside `output_root`.
    pub converted: PathBuf,
}

impl ScanTarget {
    /// Source file name, used for converter arguments and result rows.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Split a raw keyword argument on ASCII and fullwidth commas, trimming
/// each piece and dropping empties and case-insensitive duplicates.
/// First-seen order is preserved.
#[must_use]
pub fn parse_keywords(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    for piece in raw.split([',', '，']) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if seen.insert(piece.to_lowercase()) {
            keywords.push(piece.to_string());
        }
    }

    keywords
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|e| {
        warn!("could not absolutize {}: {}", path.display(), e);
        path.to_path_buf()
    })
}

fn matches_filter(name: &str, pattern: &glob::Pattern) -> bool {
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };
    pattern.matches_with(name, options)
}

fn target_for(source: PathBuf, settings: &Settings) -> ScanTarget {
    let parent = source.parent().map(Path::to_path_buf).unwrap_or_default();
    let output_root = parent.join(&settings.output_folder_name);
    let converted = output_root
        .join(source.file_name().unwrap_or_default())
        .with_extension(settings.interchange_extension());
    ScanTarget {
        source,
        output_root,
        converted,
    }
}

/// Path prefix test on lowercased, separator-terminated strings, so that
/// `/a/b` covers `/a/b/c.dwg` but not `/a/bc.dwg`.
fn is_under(file: &Path, folder: &Path) -> bool {
    let mut prefix = folder.to_string_lossy().to_lowercase();
    if !prefix.ends_with(MAIN_SEPARATOR) {
        prefix.push(MAIN_SEPARATOR);
    }
    file.to_string_lossy().to_lowercase().starts_with(&prefix)
}

/// Expand folders and loose files into scan targets.
///
/// Unreadable directory entries are logged and skipped; a missing folder
/// contributes nothing. A filter pattern that fails to compile is logged
/// and makes the folder walks contribute nothing; loose files are exempt
/// from the filter either way.
#[must_use]
pub fn build_scan_targets(folders: &[PathBuf], files: &[PathBuf], settings: &Settings) -> Vec<ScanTarget> {
    let folders: Vec<PathBuf> = folders.iter().map(|f| absolute(f)).collect();

    let pattern = match glob::Pattern::new(&settings.input_filter) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!("invalid input filter {:?}: {}", settings.input_filter, e);
            None
        }
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut targets = Vec::new();
    let mut push_source = |source: PathBuf| {
        if seen.insert(source.to_string_lossy().to_lowercase()) {
            targets.push(target_for(source, settings));
        }
    };

    for folder in &folders {
        let Some(ref pattern) = pattern else { break };
        for entry in WalkDir::new(folder).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("skipping unreadable entry under {}: {}", folder.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            // Never treat already-produced interchange output as input
            if entry
                .path()
                .parent()
                .and_then(Path::file_name)
                .is_some_and(|n| n.to_string_lossy().eq_ignore_ascii_case(&settings.output_folder_name))
            {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if matches_filter(&name, pattern) {
                push_source(entry.path().to_path_buf());
            }
        }
    }

    for file in files {
        let file = absolute(file);
        if folders.iter().any(|folder| is_under(&file, folder)) {
            debug!("{} already covered by a requested folder", file.display());
            continue;
        }
        push_source(file);
    }

    targets
}
