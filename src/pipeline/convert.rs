//! External converter execution.
//!
//! Each pending target is handed to the drawing converter as a separate
//! child process, several in parallel. The converter takes a source
//! directory, an output directory, version and format tokens, and a
//! filename filter, and writes the interchange file into the output
//! directory.
//!
//! Converter chatter is forwarded line by line to the configured
//! [`LogSink`], stderr lines prefixed with `[ERR]`. A non-zero exit is
//! logged but tolerated: the tool frequently exits non-zero after writing
//! usable output, and staleness gating catches genuinely missing files on
//! the next run. Only a process that cannot be launched at all counts as
//! a conversion failure.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use rayon::prelude::*;
use thiserror::Error;

use super::resolver::ScanTarget;
use crate::config::DEFAULT_CONVERT_JOBS;
use crate::logging::{LogSink, NullLogSink};
use crate::progress::ProgressCallback;

/// Errors that prevent a conversion job from producing output.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The per-source output directory could not be created.
    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The converter process could not be started.
    #[error("Failed to launch converter for {path}: {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration for the conversion phase.
pub struct ConvertConfig {
    /// Converter executable.
    pub converter: PathBuf,
    /// Target drawing version token passed through to the converter.
    pub version_token: String,
    /// Output format token passed through to the converter.
    pub format_token: String,
    /// Number of converter processes run in parallel.
    pub jobs: usize,
    /// Optional flag for graceful shutdown.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
    /// Destination for converter output lines.
    pub log_sink: Arc<dyn LogSink>,
}

impl ConvertConfig {
    /// Create a configuration for the given converter and tokens.
    #[must_use]
    pub fn new(converter: PathBuf, version_token: String, format_token: String) -> Self {
        Self {
            converter,
            version_token,
            format_token,
            jobs: DEFAULT_CONVERT_JOBS,
            shutdown_flag: None,
            progress_callback: None,
            log_sink: Arc::new(NullLogSink),
        }
    }

    /// Set the number of parallel converter processes.
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
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

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Statistics from the conversion phase.
#[derive(Debug, Default, Clone)]
pub struct ConvertStats {
    /// Jobs whose converter process ran to completion.
    pub completed: usize,
    /// Jobs that could not be started.
    pub failed: usize,
    /// True if conversion was interrupted by a shutdown request.
    pub interrupted: bool,
}

enum JobOutcome {
    Completed,
    Failed,
    Interrupted,
}

/// Convert all pending targets with up to `config.jobs` parallel processes.
#[must_use]
pub fn convert_targets(targets: &[ScanTarget], config: &ConvertConfig) -> ConvertStats {
    if targets.is_empty() {
        return ConvertStats::default();
    }

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_start("convert", targets.len());
    }
    log::info!(
        "Converting {} drawings with {} parallel jobs",
        targets.len(),
        config.jobs
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .build()
        .unwrap_or_else(|_| {
            log::warn!(
                "Failed to create custom thread pool, using global pool with {} threads",
                rayon::current_num_threads()
            );
            rayon::ThreadPoolBuilder::new().build().unwrap()
        });

    let done = AtomicUsize::new(0);
    let outcomes: Vec<JobOutcome> = pool.install(|| {
        targets
            .par_iter()
            .map(|target| {
                if config.is_shutdown_requested() {
                    return JobOutcome::Interrupted;
                }

                let outcome = match run_converter(target, config) {
                    Ok(true) => JobOutcome::Completed,
                    Ok(false) => JobOutcome::Interrupted,
                    Err(e) => {
                        error!("{e}");
                        config.log_sink.line(&format!("[ERR] {e}"));
                        JobOutcome::Failed
                    }
                };

                let current = done.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(ref callback) = config.progress_callback {
                    callback.on_progress(current, &target.file_name());
                }

                outcome
            })
            .collect()
    });

    let mut stats = ConvertStats::default();
    for outcome in outcomes {
        match outcome {
            JobOutcome::Completed => stats.completed += 1,
            JobOutcome::Failed => stats.failed += 1,
            JobOutcome::Interrupted => stats.interrupted = true,
        }
    }

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_end("convert");
    }

    stats
}

/// Run one converter process to completion.
///
/// Returns `Ok(false)` when the process was killed by a shutdown request.
fn run_converter(target: &ScanTarget, config: &ConvertConfig) -> Result<bool, ConvertError> {
    std::fs::create_dir_all(&target.output_root).map_err(|e| ConvertError::OutputDir {
        path: target.output_root.clone(),
        source: e,
    })?;

    let source_dir = target.source.parent().unwrap_or_else(|| Path::new("."));
    let file_name = target.file_name();
    debug!("converting {}", target.source.display());

    let mut child = Command::new(&config.converter)
        .arg(source_dir)
        .arg(&target.output_root)
        .arg(&config.version_token)
        .arg(&config.format_token)
        .arg("0")
        .arg("1")
        .arg(&file_name)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ConvertError::Launch {
            path: target.source.clone(),
            source: e,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    Ok(std::thread::scope(|scope| {
        if let Some(out) = stdout {
            let sink = &config.log_sink;
            scope.spawn(move || forward_lines(out, sink.as_ref(), ""));
        }
        if let Some(err) = stderr {
            let sink = &config.log_sink;
            scope.spawn(move || forward_lines(err, sink.as_ref(), "[ERR] "));
        }

        poll_to_exit(&mut child, &file_name, config)
    }))
}

fn forward_lines<R: Read>(stream: R, sink: &dyn LogSink, prefix: &str) {
    for line in BufReader::new(stream).lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        sink.line(&format!("{prefix}{line}"));
    }
}

/// Wait for the child, checking the shutdown flag between polls.
///
/// Returns false when the child was killed because of a shutdown request.
fn poll_to_exit(child: &mut Child, file_name: &str, config: &ConvertConfig) -> bool {
    loop {
        if config.is_shutdown_requested() {
            if let Err(e) = child.kill() {
                warn!("could not kill converter for {file_name}: {e}");
            }
            let _ = child.wait();
            return false;
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    warn!("converter exited with {status} for {file_name}");
                    config
                        .log_sink
                        .line(&format!("converter exited with {status} for {file_name}"));
                }
                return true;
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(50)),
            Err(e) => {
                warn!("could not poll converter for {file_name}: {e}");
                let _ = child.wait();
                return true;
            }
        }
    }
}
