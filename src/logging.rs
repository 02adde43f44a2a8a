//! Logging infrastructure for cadtext.
//!
//! Two layers:
//!
//! 1. The `log` facade backed by `env_logger` for diagnostics, configured by
//!    CLI verbosity flags (or `RUST_LOG` when set).
//! 2. [`LogSink`], the run-log channel injected into the pipeline. Converter
//!    subprocess output, downgrade notices and phase summaries go through it
//!    so callers can mirror them into a per-run log file.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use env_logger::Builder;
use log::LevelFilter;

/// Initialize the logging subsystem based on CLI verbosity flags.
///
/// Call once at startup. Priority:
///
/// 1. `RUST_LOG` environment variable, when set
/// 2. `quiet`: error level only
/// 3. `verbose >= 2`: trace, `verbose == 1`: debug
/// 4. Default: info
///
/// # Panics
///
/// Panics if called more than once, as `env_logger` can only be
/// initialized once per process.
pub fn init_logging(verbose: u8, quiet: bool) {
    let use_env = env::var("RUST_LOG").is_ok();

    let mut builder = Builder::new();

    if use_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(determine_level(verbose, quiet));
    }

    configure_format(&mut builder, verbose);
    builder.init();

    if !use_env {
        log::debug!(
            "Logging initialized at level: {:?}",
            determine_level(verbose, quiet)
        );
    }
}

/// Determine the log level from CLI flags.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// Configure the log format based on build type and verbosity.
///
/// - Debug builds: timestamp, level, module path (for detailed debugging)
/// - Release builds: compact format (level + message only)
fn configure_format(builder: &mut Builder, verbose: u8) {
    #[cfg(debug_assertions)]
    {
        builder.format(move |buf, record| {
            let timestamp = buf.timestamp_seconds();
            let level = record.level();
            let level_style = buf.default_level_style(level);

            if verbose >= 1 {
                writeln!(
                    buf,
                    "{} {level_style}{:<5}{level_style:#} [{}] {}",
                    timestamp,
                    level,
                    record.module_path().unwrap_or("unknown"),
                    record.args()
                )
            } else {
                writeln!(
                    buf,
                    "{} {level_style}{:<5}{level_style:#} {}",
                    timestamp,
                    level,
                    record.args()
                )
            }
        });
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = verbose;
        builder.format(|buf, record| {
            let level = record.level();
            let level_style = buf.default_level_style(level);
            writeln!(
                buf,
                "{level_style}{:<5}{level_style:#} {}",
                level,
                record.args()
            )
        });
    }
}

/// Destination for run-log lines produced while the pipeline executes.
///
/// Implementations must be callable from worker threads: the converter
/// invoker forwards subprocess stdout/stderr line-by-line from capture
/// threads, and scan workers report fallback downgrades.
pub trait LogSink: Send + Sync {
    /// Record one log line.
    fn line(&self, message: &str);
}

/// Sink that discards everything. Default for library consumers and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn line(&self, _message: &str) {}
}

/// CLI sink: forwards lines to `log::info!` and, when configured, appends
/// timestamped lines to a run log file.
pub struct CliLogSink {
    file: Option<Mutex<File>>,
}

impl CliLogSink {
    /// Create a sink, optionally opening `log_file` in append mode.
    ///
    /// A file that cannot be opened is reported with `log::warn!` and the
    /// sink degrades to console-only output.
    #[must_use]
    pub fn new(log_file: Option<&Path>) -> Self {
        let file = log_file.and_then(|path| {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(f) => Some(Mutex::new(f)),
                Err(e) => {
                    log::warn!("Cannot open run log {}: {}", path.display(), e);
                    None
                }
            }
        });
        Self { file }
    }
}

impl LogSink for CliLogSink {
    fn line(&self, message: &str) {
        log::info!("{}", message);

        if let Some(ref file) = self.file {
            let stamp = chrono::Local::now().format("%H:%M:%S");
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "[{}] {}", stamp, message);
            }
        }
    }
}
