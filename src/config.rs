//! Application configuration management.
//!
//! Loads and saves the persistent scan settings (converter location, output
//! conventions, concurrency limits) from the platform config directory.
//! The pipeline never reads this file itself: a [`Settings`] value is
//! normalized and handed to it at construction, and any auto-repair of the
//! converter path produces a new value the caller decides to persist.

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default bounded concurrency for converter subprocesses.
pub const DEFAULT_CONVERT_JOBS: usize = 4;

/// Upper bound used for the default scan concurrency.
pub const DEFAULT_SCAN_JOBS_CAP: usize = 6;

/// Default structured-parse size limit in megabytes. Interchange files above
/// it go straight to the plain-text scanner.
pub const DEFAULT_LARGE_FILE_MB: u64 = 50;

fn default_output_folder_name() -> String {
    "output".to_string()
}

fn default_version_token() -> String {
    "ACAD2018".to_string()
}

fn default_format_token() -> String {
    "DXF".to_string()
}

fn default_input_filter() -> String {
    "*.dwg".to_string()
}

fn default_convert_jobs() -> usize {
    DEFAULT_CONVERT_JOBS
}

/// Default scan concurrency: min(CPU count, 6).
pub fn default_scan_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(DEFAULT_SCAN_JOBS_CAP)
        .min(DEFAULT_SCAN_JOBS_CAP)
}

fn default_large_file_mb() -> u64 {
    DEFAULT_LARGE_FILE_MB
}

fn default_true() -> bool {
    true
}

/// Persistent scan settings.
///
/// `#[serde(default)]` on every field keeps older settings files loadable
/// after new fields are added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the external converter executable.
    #[serde(default)]
    pub converter_path: PathBuf,

    /// Name of the per-input-folder subfolder holding converted files.
    #[serde(default = "default_output_folder_name")]
    pub output_folder_name: String,

    /// Output format version token passed to the converter (e.g. ACAD2018).
    #[serde(default = "default_version_token")]
    pub version_token: String,

    /// Output format token passed to the converter (e.g. DXF).
    #[serde(default = "default_format_token")]
    pub format_token: String,

    /// Glob filter selecting source drawings (e.g. *.dwg).
    #[serde(default = "default_input_filter")]
    pub input_filter: String,

    /// Bounded concurrency for converter subprocesses.
    #[serde(default = "default_convert_jobs")]
    pub convert_jobs: usize,

    /// Bounded concurrency for scan workers.
    #[serde(default = "default_scan_jobs")]
    pub scan_jobs: usize,

    /// Structured-parse size limit in megabytes.
    #[serde(default = "default_large_file_mb")]
    pub large_file_mb: u64,

    /// Whether to use the per-output-root text cache.
    #[serde(default = "default_true")]
    pub use_cache: bool,

    /// Whether converted output folders survive the run.
    #[serde(default = "default_true")]
    pub keep_outputs: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            converter_path: PathBuf::new(),
            output_folder_name: default_output_folder_name(),
            version_token: default_version_token(),
            format_token: default_format_token(),
            input_filter: default_input_filter(),
            convert_jobs: default_convert_jobs(),
            scan_jobs: default_scan_jobs(),
            large_file_mb: default_large_file_mb(),
            use_cache: true,
            keep_outputs: true,
        }
    }
}

/// Outcome of [`Settings::resolve_converter`].
#[derive(Debug, Clone)]
pub struct ConverterResolution {
    /// Usable converter executable.
    pub path: PathBuf,
    /// Present when the configured path was bad and a probe found a
    /// replacement; the caller is expected to persist this value.
    pub repaired: Option<Settings>,
}

impl Settings {
    /// Load the settings from the default platform-specific path.
    ///
    /// A missing or unreadable file yields defaults.
    #[must_use]
    pub fn load() -> Self {
        match Self::load_internal() {
            Ok(settings) => settings,
            Err(e) => {
                log::debug!("Failed to load settings, using defaults: {}", e);
                Self::default()
            }
        }
    }

    fn load_internal() -> Result<Self> {
        let path = Self::settings_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save the settings to the default platform-specific path.
    pub fn save(&self) -> Result<()> {
        let path = Self::settings_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default platform-specific settings path.
    fn settings_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "cadtext", "cadtext")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?;
        Ok(project_dirs.config_dir().join("settings.json"))
    }

    /// Return a copy with every field clamped into its valid range and
    /// empty tokens replaced by defaults.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut s = self.clone();

        s.convert_jobs = s.convert_jobs.clamp(1, 16);
        s.scan_jobs = s.scan_jobs.clamp(1, 64);
        s.large_file_mb = s.large_file_mb.clamp(1, 4096);

        if s.output_folder_name.trim().is_empty() {
            s.output_folder_name = default_output_folder_name();
        } else {
            s.output_folder_name = s.output_folder_name.trim().to_string();
        }
        if s.version_token.trim().is_empty() {
            s.version_token = default_version_token();
        }
        if s.format_token.trim().is_empty() {
            s.format_token = default_format_token();
        }
        if s.input_filter.trim().is_empty() {
            s.input_filter = default_input_filter();
        }

        s
    }

    /// Structured-parse size limit in bytes.
    #[must_use]
    pub fn large_file_threshold_bytes(&self) -> u64 {
        self.large_file_mb.saturating_mul(1024 * 1024)
    }

    /// File extension of converted interchange files (format token,
    /// lowercased).
    #[must_use]
    pub fn interchange_extension(&self) -> String {
        self.format_token.to_lowercase()
    }

    /// Locate a usable converter executable.
    ///
    /// The configured path wins when it exists. Otherwise well-known
    /// install locations are probed; a hit produces a repaired [`Settings`]
    /// value for the caller to persist. `None` means no converter could be
    /// found anywhere.
    #[must_use]
    pub fn resolve_converter(&self) -> Option<ConverterResolution> {
        if !self.converter_path.as_os_str().is_empty() && self.converter_path.is_file() {
            return Some(ConverterResolution {
                path: self.converter_path.clone(),
                repaired: None,
            });
        }

        for candidate in candidate_converters() {
            if candidate.is_file() {
                log::info!(
                    "Configured converter missing, found {}",
                    candidate.display()
                );
                let mut repaired = self.clone();
                repaired.converter_path = candidate.clone();
                return Some(ConverterResolution {
                    path: candidate,
                    repaired: Some(repaired),
                });
            }
        }

        None
    }
}

/// Well-known converter install locations, most specific first.
fn candidate_converters() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if cfg!(windows) {
        // ODA installs under a versioned folder, e.g.
        // C:\Program Files\ODA\ODAFileConverter 25.4.0\ODAFileConverter.exe
        for root in ["C:\\Program Files\\ODA", "C:\\Program Files (x86)\\ODA"] {
            if let Ok(entries) = fs::read_dir(Path::new(root)) {
                for entry in entries.flatten() {
                    candidates.push(entry.path().join("ODAFileConverter.exe"));
                }
            }
        }
    } else {
        candidates.push(PathBuf::from("/usr/bin/ODAFileConverter"));
        candidates.push(PathBuf::from("/usr/local/bin/ODAFileConverter"));
    }

    candidates
}
