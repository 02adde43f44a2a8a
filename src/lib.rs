//! CadText - Keyword Search for CAD Drawing Archives
//!
//! A cross-platform Rust CLI application for finding keywords inside DWG
//! drawing archives. Drawings are converted to DXF through an external
//! converter, the extracted text entities are cached in SQLite next to the
//! drawings, and keyword matches are reported as a result table or CSV.

pub mod cache;
pub mod cli;
pub mod config;
pub mod dxf;
pub mod error;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod signal;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::cli::{Cli, ClearOutputsArgs, Commands, ListTextsArgs, ScanArgs};
use crate::config::Settings;
use crate::error::ExitCode;
use crate::logging::CliLogSink;
use crate::output::CsvExport;
use crate::pipeline::{MatchResult, Pipeline, PipelineConfig, ScanStats};
use crate::progress::{Progress, ProgressCallback};

/// Run the application with parsed CLI arguments.
///
/// Returns the exit code for orderly completions; hard failures come back
/// as errors for `main` to report.
///
/// # Errors
///
/// Returns an error when the selected command cannot run to completion,
/// for example when no converter is available for pending conversions or
/// when a CSV export path cannot be written.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Scan(ref args) => run_scan(&cli, args),
        Commands::ListTexts(ref args) => run_list_texts(args),
        Commands::ClearOutputs(ref args) => run_clear_outputs(args),
    }
}

/// Execute the `scan` command: resolve, convert, cache and search drawings.
fn run_scan(cli: &Cli, args: &ScanArgs) -> Result<ExitCode> {
    let mut settings = args.apply_overrides(Settings::load()).normalized();

    // Probe for the converter up front so a repaired path is persisted
    // even when this particular run needs no conversions.
    if let Some(resolution) = settings.resolve_converter() {
        if let Some(repaired) = resolution.repaired {
            log::info!("Using converter found at {}", resolution.path.display());
            if let Err(e) = repaired.save() {
                log::warn!("Could not persist repaired settings: {e}");
            }
            settings = repaired;
        }
    }

    let mut folders = Vec::new();
    let mut files = Vec::new();
    for input in &args.inputs {
        if input.is_dir() {
            folders.push(input.clone());
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            log::warn!("Skipping missing input {}", input.display());
        }
    }

    let keywords = args
        .keywords
        .as_deref()
        .map(pipeline::parse_keywords)
        .unwrap_or_default();
    if keywords.is_empty() {
        log::info!("No keywords given; listing every text entity");
    }

    let shutdown = signal::install_handler().unwrap_or_else(|e| {
        log::warn!("Signal handler unavailable ({e}); Ctrl+C will abort hard");
        signal::create_handler()
    });

    let progress: Arc<dyn ProgressCallback> =
        Arc::new(Progress::new(cli.quiet || cli.no_progress));
    let log_sink = Arc::new(CliLogSink::new(args.log_file.as_deref()));

    let config = PipelineConfig::new(settings)
        .with_progress_callback(progress)
        .with_log_sink(log_sink)
        .with_shutdown_flag(shutdown.get_flag());
    let started = Instant::now();
    let outcome = Pipeline::new(config).run(&folders, &files, &keywords)?;
    let elapsed = started.elapsed();

    if let Some(ref csv_path) = args.csv {
        CsvExport::new(&outcome.results)
            .write_to_path(csv_path)
            .with_context(|| format!("Failed to write CSV to {}", csv_path.display()))?;
        log::info!(
            "Wrote {} rows to {}",
            outcome.results.len(),
            csv_path.display()
        );
    } else {
        print_results(&outcome.results);
    }

    if !cli.quiet {
        print_summary(&outcome.stats, elapsed);
    }

    if outcome.stats.conversion_failures > 0 {
        return Ok(ExitCode::PartialSuccess);
    }
    if outcome.results.is_empty() {
        return Ok(ExitCode::NoMatches);
    }
    Ok(ExitCode::Success)
}

/// Execute the `list-texts` command: dump every text entity of one file.
fn run_list_texts(args: &ListTextsArgs) -> Result<ExitCode> {
    let items = dxf::extract_text_items(&args.file)
        .with_context(|| format!("Failed to parse {}", args.file.display()))?;

    for item in &items {
        println!("{}\t{}\t{}", item.object_type, item.layer, item.text);
    }
    log::info!("{} text items in {}", items.len(), args.file.display());

    Ok(ExitCode::Success)
}

/// Execute the `clear-outputs` command: remove conversion output folders.
fn run_clear_outputs(args: &ClearOutputsArgs) -> Result<ExitCode> {
    let settings = Settings::load().normalized();
    let folder_name = args
        .output_folder_name
        .clone()
        .unwrap_or(settings.output_folder_name);

    let mut roots: Vec<PathBuf> = Vec::new();
    for input in &args.inputs {
        if input.is_dir() {
            collect_output_roots(input, &folder_name, &mut roots);
        } else if input.is_file() {
            if let Some(parent) = input.parent() {
                let root = parent.join(&folder_name);
                if root.is_dir() {
                    roots.push(root);
                }
            }
        } else {
            log::warn!("Skipping missing input {}", input.display());
        }
    }
    roots.sort();
    roots.dedup();

    if roots.is_empty() {
        println!("No '{folder_name}' folders found.");
        return Ok(ExitCode::Success);
    }

    if !args.yes {
        println!(
            "Would remove {} folder(s); pass --yes to delete:",
            roots.len()
        );
        for root in &roots {
            println!("  {}", root.display());
        }
        return Ok(ExitCode::Success);
    }

    let removed = pipeline::aggregate::clear_output_roots(roots.iter());
    println!("Removed {removed} of {} folder(s)", roots.len());

    Ok(ExitCode::Success)
}

/// Collect every directory named `folder_name` below `base`.
fn collect_output_roots(base: &Path, folder_name: &str, roots: &mut Vec<PathBuf>) {
    for entry in WalkDir::new(base).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Cannot read directory entry: {e}");
                continue;
            }
        };
        if entry.file_type().is_dir()
            && entry
                .file_name()
                .to_string_lossy()
                .eq_ignore_ascii_case(folder_name)
        {
            roots.push(entry.path().to_path_buf());
        }
    }
}

/// Print match rows as tab separated columns on stdout.
fn print_results(results: &[MatchResult]) {
    for row in results {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            row.file_name, row.object_type, row.layer, row.keyword, row.content
        );
    }
}

/// Print the run summary below the result rows.
fn print_summary(stats: &ScanStats, elapsed: std::time::Duration) {
    println!();
    println!(
        "Scanned {} drawing(s), {} match(es) in {:.2?}",
        stats.targets, stats.matches, elapsed
    );
    println!(
        "Conversions: {} run, {} up to date, {} failed",
        stats.conversions_run, stats.outputs_up_to_date, stats.conversion_failures
    );
    println!(
        "Cache: {} parsed, {} served, {} plain text fallback(s), {} parse failure(s)",
        stats.files_cached, stats.served_from_cache, stats.plain_text_scans, stats.parse_failures
    );
}
