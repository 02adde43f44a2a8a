//! SQLite-backed text cache, one database per interchange output folder.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use bytesize::ByteSize;
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::dxf::{extract_text_items, TextItem};
use crate::pipeline::resolver::ScanTarget;
use crate::pipeline::scan::{MatchResult, ALL_KEYWORD};
use crate::progress::ProgressCallback;

/// Cache database file name inside each output folder. The leading dot
/// keeps it out of directory listings on Unix; on Windows the file is
/// additionally given the hidden attribute.
pub const CACHE_FILE_NAME: &str = ".cadtext_cache.db";

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS dxf_file (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    size INTEGER NOT NULL,
    mtime_ms INTEGER NOT NULL,
    cached INTEGER NOT NULL DEFAULT 0,
    text_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS dxf_text (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES dxf_file(id) ON DELETE CASCADE,
    object_type TEXT NOT NULL,
    layer TEXT NOT NULL,
    content TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_dxf_text_file ON dxf_text(file_id);
"#;

/// Errors from opening or querying the text cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache directory could not be created.
    #[error("Failed to create cache directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The database could not be opened or initialized.
    #[error("Failed to open text cache at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A query against an open cache failed.
    #[error("Cache query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Result of one cache update pass.
#[derive(Debug, Default)]
pub struct CacheUpdateOutcome {
    /// Targets that must be scanned as plain text because their
    /// structured parse failed, was skipped for size, or is known stale.
    pub plaintext: Vec<ScanTarget>,
    /// Files freshly parsed and stored this pass.
    pub cached: usize,
    /// Files whose stored text was already current.
    pub skipped: usize,
    /// Files whose structured parse failed or was not attempted.
    pub failed: usize,
    /// True when a shutdown request stopped the update early.
    pub interrupted: bool,
}

/// Text cache for one interchange output folder.
pub struct TextCache {
    conn: Connection,
}

impl TextCache {
    /// Open (or create) the cache database inside `output_root`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the folder cannot be created or the
    /// database cannot be opened and initialized.
    pub fn open(output_root: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(output_root).map_err(|e| CacheError::Io {
            path: output_root.to_path_buf(),
            source: e,
        })?;

        let db_path = output_root.join(CACHE_FILE_NAME);
        let fresh = !db_path.exists();

        let conn = Connection::open(&db_path).map_err(|e| CacheError::Open {
            path: db_path.clone(),
            source: e,
        })?;
        conn.execute_batch(SCHEMA).map_err(|e| CacheError::Open {
            path: db_path.clone(),
            source: e,
        })?;

        if fresh {
            hide_cache_file(&db_path);
        }

        Ok(Self { conn })
    }

    /// Bring the cache up to date with the given targets.
    ///
    /// File identity is the (size, mtime) pair; either changing forces a
    /// re-parse. Per target: missing interchange output is skipped
    /// entirely; oversize files are marked uncached and queued for plain
    /// text; unchanged files are served from the cache (or queued for
    /// plain text if their last parse failed or found nothing); changed
    /// files are re-parsed and their rows replaced in one transaction.
    pub fn update(
        &mut self,
        targets: &[ScanTarget],
        large_file_threshold: u64,
        progress: &dyn ProgressCallback,
        shutdown: Option<&Arc<AtomicBool>>,
    ) -> CacheUpdateOutcome {
        let mut outcome = CacheUpdateOutcome::default();
        progress.on_phase_start("cache", targets.len());

        for (index, target) in targets.iter().enumerate() {
            if shutdown.is_some_and(|f| f.load(Ordering::SeqCst)) {
                outcome.interrupted = true;
                break;
            }
            progress.on_progress(index + 1, &target.file_name());

            let Ok(meta) = std::fs::metadata(&target.converted) else {
                debug!("no interchange output for {}", target.source.display());
                continue;
            };
            let path = target.converted.display().to_string();
            let size = i64::try_from(meta.len()).unwrap_or(i64::MAX);
            let mtime = mtime_millis_of(&meta);

            if meta.len() > large_file_threshold {
                debug!(
                    "{path} is {}, over the {} structured-parse threshold",
                    ByteSize::b(meta.len()),
                    ByteSize::b(large_file_threshold)
                );
                self.mark_uncached(&path, size, mtime);
                outcome.plaintext.push(target.clone());
                outcome.failed += 1;
                continue;
            }

            match self.file_state(&path) {
                Ok(Some((stored_size, stored_mtime, cached)))
                    if stored_size == size && stored_mtime == mtime =>
                {
                    if cached {
                        outcome.skipped += 1;
                    } else {
                        outcome.plaintext.push(target.clone());
                    }
                    continue;
                }
                Ok(_) => {}
                Err(e) => warn!("cache lookup failed for {path}: {e}"),
            }

            match extract_text_items(&target.converted) {
                Ok(items) if items.is_empty() => {
                    debug!("no text entities in {path}");
                    self.mark_uncached(&path, size, mtime);
                    outcome.plaintext.push(target.clone());
                    outcome.failed += 1;
                }
                Ok(items) => match self.store_items(&path, size, mtime, &items) {
                    Ok(()) => outcome.cached += 1,
                    Err(e) => {
                        warn!("cache write failed for {path}: {e}");
                        self.mark_uncached(&path, size, mtime);
                        outcome.plaintext.push(target.clone());
                        outcome.failed += 1;
                    }
                },
                Err(e) => {
                    warn!("structured parse failed for {path}: {e}");
                    self.mark_uncached(&path, size, mtime);
                    outcome.plaintext.push(target.clone());
                    outcome.failed += 1;
                }
            }
        }

        progress.on_phase_end("cache");
        outcome
    }

    /// Match keywords against the cached text of the given targets.
    ///
    /// Only rows of files with a current, successful parse are consulted.
    /// With no keywords every row is returned under the catch-all
    /// keyword. Matching uses SQL `LIKE`, which ignores ASCII case.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Query`] when the database rejects a query.
    pub fn query(
        &self,
        targets: &[ScanTarget],
        keywords: &[String],
    ) -> Result<Vec<MatchResult>, CacheError> {
        let mut id_stmt = self
            .conn
            .prepare("SELECT id FROM dxf_file WHERE path = ?1 AND cached = 1")?;
        let mut all_stmt = self
            .conn
            .prepare("SELECT object_type, layer, content FROM dxf_text WHERE file_id = ?1")?;
        let mut like_stmt = self.conn.prepare(
            "SELECT object_type, layer, content FROM dxf_text
             WHERE file_id = ?1 AND content LIKE ?2 ESCAPE '\\'",
        )?;

        let mut results = Vec::new();
        for target in targets {
            let path = target.converted.display().to_string();
            let Some(file_id) = id_stmt
                .query_row([&path], |row| row.get::<_, i64>(0))
                .optional()?
            else {
                continue;
            };

            if keywords.is_empty() {
                let rows = all_stmt.query_map(params![file_id], row_to_columns)?;
                for row in rows {
                    let (object_type, layer, content) = row?;
                    results.push(cached_result(target, object_type, layer, content, ALL_KEYWORD));
                }
            } else {
                for keyword in keywords {
                    let pattern = format!("%{}%", escape_like(keyword));
                    let rows = like_stmt.query_map(params![file_id, pattern], row_to_columns)?;
                    for row in rows {
                        let (object_type, layer, content) = row?;
                        results.push(cached_result(target, object_type, layer, content, keyword));
                    }
                }
            }
        }

        Ok(results)
    }

    fn file_state(&self, path: &str) -> Result<Option<(i64, i64, bool)>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT size, mtime_ms, cached FROM dxf_file WHERE path = ?1",
                [path],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)? != 0,
                    ))
                },
            )
            .optional()
    }

    /// Replace a file's rows with freshly parsed items, atomically.
    fn store_items(
        &mut self,
        path: &str,
        size: i64,
        mtime: i64,
        items: &[TextItem],
    ) -> Result<(), rusqlite::Error> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO dxf_file (path, size, mtime_ms, cached, text_count)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(path) DO UPDATE SET
                 size = excluded.size,
                 mtime_ms = excluded.mtime_ms,
                 cached = 1,
                 text_count = excluded.text_count",
            params![path, size, mtime, items.len()],
        )?;
        let file_id: i64 =
            tx.query_row("SELECT id FROM dxf_file WHERE path = ?1", [path], |row| {
                row.get(0)
            })?;
        tx.execute("DELETE FROM dxf_text WHERE file_id = ?1", params![file_id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO dxf_text (file_id, object_type, layer, content)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for item in items {
                insert.execute(params![
                    file_id,
                    item.object_type.as_str(),
                    item.layer,
                    item.text
                ])?;
            }
        }
        tx.commit()
    }

    fn mark_uncached(&self, path: &str, size: i64, mtime: i64) {
        let outcome = self.conn.execute(
            "INSERT INTO dxf_file (path, size, mtime_ms, cached, text_count)
             VALUES (?1, ?2, ?3, 0, 0)
             ON CONFLICT(path) DO UPDATE SET
                 size = excluded.size,
                 mtime_ms = excluded.mtime_ms,
                 cached = 0,
                 text_count = 0",
            params![path, size, mtime],
        );
        if let Err(e) = outcome {
            warn!("could not mark {path} uncached: {e}");
        }
    }
}

fn row_to_columns(row: &rusqlite::Row<'_>) -> Result<(String, String, String), rusqlite::Error> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn cached_result(
    target: &ScanTarget,
    object_type: String,
    layer: String,
    content: String,
    keyword: &str,
) -> MatchResult {
    MatchResult {
        file_name: target.file_name(),
        object_type,
        layer,
        keyword: keyword.to_string(),
        content,
        source_file_path: target.converted.display().to_string(),
        original_source_path: target.source.display().to_string(),
    }
}

/// Modification time in whole milliseconds since the Unix epoch. Files
/// dated before the epoch collapse to zero, which still compares stably.
fn mtime_millis_of(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn escape_like(keyword: &str) -> String {
    keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(windows)]
fn hide_cache_file(path: &Path) {
    let status = std::process::Command::new("attrib")
        .arg("+h")
        .arg(path)
        .status();
    if let Err(e) = status {
        debug!("could not hide {}: {}", path.display(), e);
    }
}

#[cfg(not(windows))]
fn hide_cache_file(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use filetime::FileTime;
    use tempfile::TempDir;

    fn target_for(dir: &TempDir, name: &str) -> ScanTarget {
        let out = dir.path().join("output");
        let stem = Path::new(name).with_extension("dxf");
        ScanTarget {
            source: dir.path().join(name),
            output_root: out.clone(),
            converted: out.join(stem),
        }
    }

    fn write_converted(target: &ScanTarget, bytes: &[u8]) {
        std::fs::create_dir_all(&target.output_root).unwrap();
        std::fs::write(&target.converted, bytes).unwrap();
    }

    fn dxf_with_text(lines: &[(&str, &str)]) -> Vec<u8> {
        let mut out = String::from("0\nSECTION\n2\nENTITIES\n");
        for (layer, text) in lines {
            out.push_str(&format!("0\nTEXT\n8\n{layer}\n1\n{text}\n"));
        }
        out.push_str("0\nENDSEC\n0\nEOF\n");
        out.into_bytes()
    }

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn update(cache: &mut TextCache, targets: &[ScanTarget]) -> CacheUpdateOutcome {
        cache.update(targets, u64::MAX, &NoopProgress, None)
    }

    #[test]
    fn test_open_creates_folder_and_database() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("output");
        let _cache = TextCache::open(&root).unwrap();
        assert!(root.join(CACHE_FILE_NAME).exists());
    }

    #[test]
    fn test_update_then_query_matches_keyword() {
        let dir = TempDir::new().unwrap();
        let target = target_for(&dir, "plan.dwg");
        write_converted(&target, &dxf_with_text(&[("Piping", "Main Valve A1")]));

        let mut cache = TextCache::open(&target.output_root).unwrap();
        let outcome = update(&mut cache, std::slice::from_ref(&target));
        assert_eq!(outcome.cached, 1);
        assert_eq!(outcome.failed, 0);

        let results = cache.query(std::slice::from_ref(&target), &kw(&["valve"])).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].object_type, "TEXT");
        assert_eq!(results[0].layer, "Piping");
        assert_eq!(results[0].content, "Main Valve A1");
        assert_eq!(results[0].keyword, "valve");
        assert_eq!(results[0].file_name, "plan.dwg");
    }

    #[test]
    fn test_unchanged_file_is_served_without_reparsing() {
        let dir = TempDir::new().unwrap();
        let target = target_for(&dir, "plan.dwg");
        write_converted(&target, &dxf_with_text(&[("L", "content")]));

        let mut cache = TextCache::open(&target.output_root).unwrap();
        let first = update(&mut cache, std::slice::from_ref(&target));
        assert_eq!(first.cached, 1);

        let second = update(&mut cache, std::slice::from_ref(&target));
        assert_eq!(second.cached, 0);
        assert_eq!(second.skipped, 1);
    }

    #[test]
    fn test_changed_file_replaces_rows() {
        let dir = TempDir::new().unwrap();
        let target = target_for(&dir, "plan.dwg");
        write_converted(&target, &dxf_with_text(&[("L", "old text")]));

        let mut cache = TextCache::open(&target.output_root).unwrap();
        update(&mut cache, std::slice::from_ref(&target));

        write_converted(&target, &dxf_with_text(&[("L", "new text")]));
        filetime::set_file_mtime(&target.converted, FileTime::from_unix_time(2_000_000_000, 0))
            .unwrap();
        let outcome = update(&mut cache, std::slice::from_ref(&target));
        assert_eq!(outcome.cached, 1);

        let all = cache.query(std::slice::from_ref(&target), &[]).unwrap();
        assert_eq!(all.len(), 1, "old rows must be deleted");
        assert_eq!(all[0].content, "new text");
    }

    #[test]
    fn test_same_mtime_different_size_is_reparsed() {
        let dir = TempDir::new().unwrap();
        let target = target_for(&dir, "plan.dwg");
        let stamp = FileTime::from_unix_time(1_500_000_000, 0);

        write_converted(&target, &dxf_with_text(&[("L", "pump")]));
        filetime::set_file_mtime(&target.converted, stamp).unwrap();
        let mut cache = TextCache::open(&target.output_root).unwrap();
        update(&mut cache, std::slice::from_ref(&target));

        // Same timestamp, different length. A restored backup can look
        // like this, so size has to break the tie.
        write_converted(&target, &dxf_with_text(&[("L", "replacement valve")]));
        filetime::set_file_mtime(&target.converted, stamp).unwrap();
        let outcome = update(&mut cache, std::slice::from_ref(&target));
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.cached, 1);

        let results = cache.query(std::slice::from_ref(&target), &kw(&["valve"])).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "replacement valve");
    }

    #[test]
    fn test_drawing_without_text_goes_plain_text() {
        let dir = TempDir::new().unwrap();
        let target = target_for(&dir, "plan.dwg");
        write_converted(&target, b"0\nSECTION\n2\nENTITIES\n0\nENDSEC\n0\nEOF\n");

        let mut cache = TextCache::open(&target.output_root).unwrap();
        let outcome = update(&mut cache, std::slice::from_ref(&target));
        assert_eq!(outcome.cached, 0);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.plaintext.len(), 1);

        let results = cache.query(std::slice::from_ref(&target), &[]).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_unparseable_file_is_marked_for_plain_text() {
        let dir = TempDir::new().unwrap();
        let target = target_for(&dir, "plan.dwg");
        write_converted(&target, b"not an interchange file\n");

        let mut cache = TextCache::open(&target.output_root).unwrap();
        let outcome = update(&mut cache, std::slice::from_ref(&target));
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.plaintext.len(), 1);

        let results = cache.query(std::slice::from_ref(&target), &kw(&["not"])).unwrap();
        assert!(results.is_empty(), "uncached files must not serve queries");
    }

    #[test]
    fn test_unchanged_failed_file_goes_plain_text_without_failure_count() {
        let dir = TempDir::new().unwrap();
        let target = target_for(&dir, "plan.dwg");
        write_converted(&target, b"still not an interchange file\n");

        let mut cache = TextCache::open(&target.output_root).unwrap();
        let first = update(&mut cache, std::slice::from_ref(&target));
        assert_eq!(first.failed, 1);

        let second = update(&mut cache, std::slice::from_ref(&target));
        assert_eq!(second.failed, 0);
        assert_eq!(second.plaintext.len(), 1);
    }

    #[test]
    fn test_oversize_file_skips_parsing() {
        let dir = TempDir::new().unwrap();
        let target = target_for(&dir, "plan.dwg");
        write_converted(&target, &dxf_with_text(&[("L", "text")]));

        let mut cache = TextCache::open(&target.output_root).unwrap();
        let outcome = cache.update(std::slice::from_ref(&target), 4, &NoopProgress, None);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.plaintext.len(), 1);
        assert_eq!(outcome.cached, 0);
    }

    #[test]
    fn test_missing_interchange_output_contributes_nothing() {
        let dir = TempDir::new().unwrap();
        let target = target_for(&dir, "plan.dwg");
        std::fs::create_dir_all(&target.output_root).unwrap();

        let mut cache = TextCache::open(&target.output_root).unwrap();
        let outcome = update(&mut cache, std::slice::from_ref(&target));
        assert_eq!(outcome.cached + outcome.skipped + outcome.failed, 0);
        assert!(outcome.plaintext.is_empty());
    }

    #[test]
    fn test_query_empty_keywords_returns_all_rows() {
        let dir = TempDir::new().unwrap();
        let target = target_for(&dir, "plan.dwg");
        write_converted(
            &target,
            &dxf_with_text(&[("L1", "first"), ("L2", "second"), ("L3", "third")]),
        );

        let mut cache = TextCache::open(&target.output_root).unwrap();
        update(&mut cache, std::slice::from_ref(&target));

        let results = cache.query(std::slice::from_ref(&target), &[]).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.keyword == ALL_KEYWORD));
    }

    #[test]
    fn test_query_only_covers_requested_targets() {
        let dir = TempDir::new().unwrap();
        let a = target_for(&dir, "a.dwg");
        let b = target_for(&dir, "b.dwg");
        write_converted(&a, &dxf_with_text(&[("L", "valve in a")]));
        write_converted(&b, &dxf_with_text(&[("L", "valve in b")]));

        let mut cache = TextCache::open(&a.output_root).unwrap();
        update(&mut cache, &[a.clone(), b]);

        let results = cache.query(std::slice::from_ref(&a), &kw(&["valve"])).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "valve in a");
    }

    #[test]
    fn test_like_wildcards_in_keywords_are_literal() {
        let dir = TempDir::new().unwrap();
        let target = target_for(&dir, "plan.dwg");
        write_converted(
            &target,
            &dxf_with_text(&[("L", "progress 100% done"), ("L", "plain hundred")]),
        );

        let mut cache = TextCache::open(&target.output_root).unwrap();
        update(&mut cache, std::slice::from_ref(&target));

        let percent = cache.query(std::slice::from_ref(&target), &kw(&["100%"])).unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].content, "progress 100% done");

        let underscore = cache.query(std::slice::from_ref(&target), &kw(&["_"])).unwrap();
        assert!(underscore.is_empty());
    }

    #[test]
    fn test_update_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let target = target_for(&dir, "plan.dwg");
        write_converted(&target, &dxf_with_text(&[("L", "text")]));

        let mut cache = TextCache::open(&target.output_root).unwrap();
        let flag = Arc::new(AtomicBool::new(true));
        let outcome = cache.update(std::slice::from_ref(&target), u64::MAX, &NoopProgress, Some(&flag));
        assert!(outcome.interrupted);
        assert_eq!(outcome.cached, 0);
    }
}
