//! Command-line interface definitions for cadtext.
//!
//! Defines all CLI arguments, subcommands and options using the clap derive
//! API: global options (verbosity, structured errors) and subcommands for
//! scanning, dumping extracted text and clearing converted outputs.
//!
//! # Example
//!
//! ```bash
//! # Search two project folders for keywords
//! cadtext scan ~/proj/site-a ~/proj/site-b -k "阀门,pump"
//!
//! # Everything in one folder, exported to a spreadsheet
//! cadtext scan ~/proj/site-a --csv results.csv
//!
//! # Show what the extractor sees in one converted file
//! cadtext list-texts ~/proj/site-a/output/plan.dxf
//!
//! # Remove converted output folders
//! cadtext clear-outputs ~/proj/site-a --yes
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Settings;

/// Keyword search inside CAD drawings.
///
/// cadtext converts proprietary drawings to a text-bearing interchange
/// format with an external converter, extracts text entities, caches them
/// per output folder, and reports keyword matches.
#[derive(Debug, Parser)]
#[command(name = "cadtext")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit errors as JSON on stderr (for scripting)
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Disable progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for cadtext.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert drawings as needed and search their text for keywords
    Scan(ScanArgs),
    /// Extract and print the text items of one interchange file
    ListTexts(ListTextsArgs),
    /// Remove the converted output folders under the given inputs
    ClearOutputs(ClearOutputsArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Folders and/or drawing files to scan
    #[arg(value_name = "INPUTS", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Comma-separated keywords; empty means "match everything"
    #[arg(short, long, value_name = "LIST")]
    pub keywords: Option<String>,

    /// Write the match results to a CSV file
    #[arg(long, value_name = "PATH")]
    pub csv: Option<PathBuf>,

    /// Append run log lines to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Path to the external converter executable
    ///
    /// Overrides the persisted setting for this run only.
    #[arg(long, value_name = "PATH", env = "CADTEXT_CONVERTER")]
    pub converter: Option<PathBuf>,

    /// Name of the per-folder subfolder for converted files
    #[arg(long, value_name = "NAME")]
    pub output_folder_name: Option<String>,

    /// Output format version token passed to the converter (e.g. ACAD2018)
    #[arg(long, value_name = "TOKEN")]
    pub version_token: Option<String>,

    /// Output format token passed to the converter (e.g. DXF)
    #[arg(long, value_name = "TOKEN")]
    pub format_token: Option<String>,

    /// Glob filter selecting source drawings (e.g. *.dwg)
    #[arg(long, value_name = "GLOB")]
    pub filter: Option<String>,

    /// Max concurrent converter subprocesses (clamped to 1-16)
    #[arg(long, value_name = "N")]
    pub convert_jobs: Option<usize>,

    /// Max concurrent scan workers (clamped to 1-64)
    #[arg(long, value_name = "N")]
    pub scan_jobs: Option<usize>,

    /// Structured-parse size limit in MB; larger files fall back to a
    /// plain-text scan (clamped to 1-4096)
    #[arg(long, value_name = "MB")]
    pub large_file_mb: Option<u64>,

    /// Skip the per-output-folder text cache
    #[arg(long)]
    pub no_cache: bool,

    /// Delete converted output folders after the scan
    #[arg(long)]
    pub discard_outputs: bool,
}

impl ScanArgs {
    /// Apply the per-run CLI overrides onto loaded settings.
    #[must_use]
    pub fn apply_overrides(&self, mut settings: Settings) -> Settings {
        if let Some(ref converter) = self.converter {
            settings.converter_path = converter.clone();
        }
        if let Some(ref name) = self.output_folder_name {
            settings.output_folder_name = name.clone();
        }
        if let Some(ref token) = self.version_token {
            settings.version_token = token.clone();
        }
        if let Some(ref token) = self.format_token {
            settings.format_token = token.clone();
        }
        if let Some(ref filter) = self.filter {
            settings.input_filter = filter.clone();
        }
        if let Some(jobs) = self.convert_jobs {
            settings.convert_jobs = jobs;
        }
        if let Some(jobs) = self.scan_jobs {
            settings.scan_jobs = jobs;
        }
        if let Some(mb) = self.large_file_mb {
            settings.large_file_mb = mb;
        }
        if self.no_cache {
            settings.use_cache = false;
        }
        if self.discard_outputs {
            settings.keep_outputs = false;
        }
        settings
    }
}

/// Arguments for the list-texts subcommand.
#[derive(Debug, Args)]
pub struct ListTextsArgs {
    /// Interchange file to extract
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// Arguments for the clear-outputs subcommand.
#[derive(Debug, Args)]
pub struct ClearOutputsArgs {
    /// Folders and/or drawing files whose output folders should be removed
    #[arg(value_name = "INPUTS", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Name of the per-folder subfolder for converted files
    #[arg(long, value_name = "NAME")]
    pub output_folder_name: Option<String>,

    /// Actually delete; without this flag the folders are only listed
    #[arg(short = 'y', long)]
    pub yes: bool,
}
