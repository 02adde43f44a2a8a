//! The scan pipeline: resolve, gate, convert, cache, scan, aggregate.
//!
//! [`Pipeline::run`] drives one full search over a set of drawing folders
//! and files:
//!
//! 1. [`resolver`] expands the inputs into deduplicated scan targets.
//! 2. [`gate`] compares timestamps and keeps only stale targets for
//!    conversion.
//! 3. [`convert`] runs the external converter over the stale targets, in
//!    parallel.
//! 4. [`cache`](crate::cache) brings each output folder's text cache up
//!    to date and answers keyword queries; files it cannot parse fall
//!    back to a plain-text scan. Without a cache every target is scanned
//!    directly.
//! 5. [`aggregate`] orders the results and derives filter facets.
//!
//! The pipeline reports progress through a [`ProgressCallback`], forwards
//! converter chatter to a [`LogSink`], and honors a shared shutdown flag
//! between units of work.

pub mod aggregate;
pub mod convert;
pub mod gate;
pub mod resolver;
pub mod scan;

pub use aggregate::FilterOptions;
pub use convert::{ConvertConfig, ConvertStats};
pub use gate::GateOutcome;
pub use resolver::{build_scan_targets, parse_keywords, ScanTarget};
pub use scan::{MatchResult, ALL_KEYWORD, PLAIN_TEXT_CONTENT, PLAIN_TEXT_OBJECT_TYPE};

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::cache::TextCache;
use crate::config::Settings;
use crate::logging::{LogSink, NullLogSink};
use crate::progress::{NoopProgress, ProgressCallback};

static NOOP_PROGRESS: NoopProgress = NoopProgress;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The inputs resolved to no drawings at all.
    #[error("No drawings found in the given inputs")]
    NoTargets,

    /// Conversions are pending but no converter executable is available.
    #[error(
        "Converter not found at {}; configure it with --converter or CADTEXT_CONVERTER",
        .0.display()
    )]
    ConverterMissing(PathBuf),

    /// A shutdown request stopped the run.
    #[error("Operation was interrupted")]
    Interrupted,
}

/// Configuration for a pipeline run.
pub struct PipelineConfig {
    /// Effective settings, usually loaded and normalized by the caller.
    pub settings: Settings,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
    /// Destination for converter output lines.
    pub log_sink: Arc<dyn LogSink>,
    /// Optional flag for graceful shutdown.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
}

impl PipelineConfig {
    /// Create a configuration from settings, with no progress reporting
    /// and converter output discarded.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            progress_callback: None,
            log_sink: Arc::new(NullLogSink),
            shutdown_flag: None,
        }
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Set the destination for converter output lines.
    #[must_use]
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Counters describing one pipeline run.
#[derive(Debug, Default, Clone)]
pub struct ScanStats {
    /// Drawings the inputs resolved to.
    pub targets: usize,
    /// Targets whose interchange output was already current.
    pub outputs_up_to_date: usize,
    /// Converter processes that ran to completion.
    pub conversions_run: usize,
    /// Converter processes that could not be started.
    pub conversion_failures: usize,
    /// Files freshly parsed into a cache this run.
    pub files_cached: usize,
    /// Files answered from an existing cache without re-parsing.
    pub served_from_cache: usize,
    /// Files that had to be scanned as plain text.
    pub plain_text_scans: usize,
    /// Files whose structured parse failed or was skipped for size.
    pub parse_failures: usize,
    /// Result rows produced.
    pub matches: usize,
}

/// Everything a pipeline run produces.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Match rows, ordered by source file name.
    pub results: Vec<MatchResult>,
    /// Filter facets derived from the results.
    pub filters: FilterOptions,
    /// Run counters.
    pub stats: ScanStats,
}

/// The keyword-search pipeline.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline from a configuration.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    fn progress(&self) -> &dyn ProgressCallback {
        self.config
            .progress_callback
            .as_deref()
            .unwrap_or(&NOOP_PROGRESS)
    }

    /// Run one full search.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoTargets`] when nothing resolves,
    /// [`PipelineError::ConverterMissing`] when conversions are pending
    /// without a usable converter, and [`PipelineError::Interrupted`]
    /// when a shutdown request stops the run.
    pub fn run(
        &self,
        folders: &[PathBuf],
        files: &[PathBuf],
        keywords: &[String],
    ) -> Result<ScanOutcome, PipelineError> {
        let settings = self.config.settings.normalized();
        let threshold = settings.large_file_threshold_bytes();
        let shutdown = self.config.shutdown_flag.as_ref();
        let mut stats = ScanStats::default();

        let targets = build_scan_targets(folders, files, &settings);
        if targets.is_empty() {
            return Err(PipelineError::NoTargets);
        }
        stats.targets = targets.len();
        info!("Resolved {} drawings", targets.len());

        let gate = gate::compare_targets(targets, self.progress(), shutdown);
        if gate.interrupted {
            return Err(PipelineError::Interrupted);
        }
        stats.outputs_up_to_date = gate.skipped.len();

        if !gate.pending.is_empty() {
            if settings.converter_path.as_os_str().is_empty()
                || !settings.converter_path.is_file()
            {
                return Err(PipelineError::ConverterMissing(settings.converter_path));
            }

            let mut convert_config = ConvertConfig::new(
                settings.converter_path.clone(),
                settings.version_token.clone(),
                settings.format_token.clone(),
            )
            .with_jobs(settings.convert_jobs)
            .with_log_sink(self.config.log_sink.clone());
            if let Some(ref callback) = self.config.progress_callback {
                convert_config = convert_config.with_progress_callback(callback.clone());
            }
            if let Some(flag) = shutdown {
                convert_config = convert_config.with_shutdown_flag(flag.clone());
            }

            let convert_stats = convert::convert_targets(&gate.pending, &convert_config);
            if convert_stats.interrupted {
                return Err(PipelineError::Interrupted);
            }
            stats.conversions_run = convert_stats.completed;
            stats.conversion_failures = convert_stats.failed;
        }

        let mut all_targets = gate.skipped;
        all_targets.extend(gate.pending);
        let output_roots: BTreeSet<PathBuf> =
            all_targets.iter().map(|t| t.output_root.clone()).collect();

        let mut results = Vec::new();
        if settings.use_cache {
            let mut plaintext_targets = Vec::new();
            let mut groups: BTreeMap<PathBuf, Vec<ScanTarget>> = BTreeMap::new();
            for target in all_targets {
                groups.entry(target.output_root.clone()).or_default().push(target);
            }

            for (root, group) in groups {
                if self.config.is_shutdown_requested() {
                    return Err(PipelineError::Interrupted);
                }
                match TextCache::open(&root) {
                    Ok(mut cache) => {
                        let outcome = cache.update(&group, threshold, self.progress(), shutdown);
                        if outcome.interrupted {
                            return Err(PipelineError::Interrupted);
                        }
                        stats.files_cached += outcome.cached;
                        stats.served_from_cache += outcome.skipped;
                        stats.parse_failures += outcome.failed;
                        plaintext_targets.extend(outcome.plaintext);

                        match cache.query(&group, keywords) {
                            Ok(rows) => results.extend(rows),
                            Err(e) => {
                                warn!("cache query failed for {}: {}", root.display(), e);
                                for target in &group {
                                    results.extend(scan::scan_target_directly(
                                        target, keywords, threshold,
                                    ));
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!("cache unavailable for {}: {}", root.display(), e);
                        for target in &group {
                            results.extend(scan::scan_target_directly(target, keywords, threshold));
                        }
                    }
                }
            }

            stats.plain_text_scans = plaintext_targets.len();
            let (plain_results, interrupted) =
                self.scan_parallel(&plaintext_targets, settings.scan_jobs, |target| {
                    scan::plain_or_empty(target, keywords)
                });
            if interrupted {
                return Err(PipelineError::Interrupted);
            }
            results.extend(plain_results);
        } else {
            let (direct_results, interrupted) =
                self.scan_parallel(&all_targets, settings.scan_jobs, |target| {
                    scan::scan_target_directly(target, keywords, threshold)
                });
            if interrupted {
                return Err(PipelineError::Interrupted);
            }
            results.extend(direct_results);
        }

        aggregate::sort_results(&mut results);
        let filters = FilterOptions::from_results(&results);
        stats.matches = results.len();

        if !settings.keep_outputs {
            let removed = aggregate::clear_output_roots(output_roots.iter());
            info!("Removed {removed} interchange output folders");
        }

        Ok(ScanOutcome {
            results,
            filters,
            stats,
        })
    }

    /// Scan targets in parallel on a dedicated pool, merging per-worker
    /// result vectors after the join.
    fn scan_parallel<F>(
        &self,
        targets: &[ScanTarget],
        jobs: usize,
        scan_one: F,
    ) -> (Vec<MatchResult>, bool)
    where
        F: Fn(&ScanTarget) -> Vec<MatchResult> + Sync,
    {
        if targets.is_empty() {
            return (Vec::new(), false);
        }

        self.progress().on_phase_start("scan", targets.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .build()
            .unwrap_or_else(|_| {
                log::warn!(
                    "Failed to create custom thread pool, using global pool with {} threads",
                    rayon::current_num_threads()
                );
                rayon::ThreadPoolBuilder::new().build().unwrap()
            });

        let done = std::sync::atomic::AtomicUsize::new(0);
        let interrupted = AtomicBool::new(false);

        let nested: Vec<Vec<MatchResult>> = pool.install(|| {
            targets
                .par_iter()
                .map(|target| {
                    if self.config.is_shutdown_requested() {
                        interrupted.store(true, Ordering::SeqCst);
                        return Vec::new();
                    }
                    let rows = scan_one(target);
                    let current = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(ref callback) = self.config.progress_callback {
                        callback.on_progress(current, &target.file_name());
                    }
                    rows
                })
                .collect()
        });

        self.progress().on_phase_end("scan");

        let results = nested.into_iter().flatten().collect();
        (results, interrupted.load(Ordering::SeqCst))
    }
}
