//! Progress reporting utilities using indicatif.
//!
//! Provides the [`Progress`] struct which implements [`ProgressCallback`]
//! to display visual progress bars in the terminal for the pipeline phases
//! (comparing targets, converting drawings, updating caches, scanning).

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Progress callback for pipeline phases.
///
/// Implement this trait to receive progress updates while the scan
/// pipeline runs. All methods may be called from worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (e.g., "compare", "convert", "scan")
    /// * `total` - Total number of items to process
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for processed items.
    ///
    /// # Arguments
    ///
    /// * `current` - Current item number (1-based)
    /// * `path` - Path being processed
    fn on_progress(&self, current: usize, path: &str);

    /// Called when an item has been processed, providing its size.
    ///
    /// Can be used to track byte-based throughput across scanned files.
    fn on_item_completed(&self, _bytes: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called to update the progress message.
    fn on_message(&self, _message: &str) {}
}

/// Progress reporter that does nothing. Default for library consumers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressCallback for NoopProgress {
    fn on_phase_start(&self, _phase: &str, _total: usize) {}
    fn on_progress(&self, _current: usize, _path: &str) {}
    fn on_phase_end(&self, _phase: &str) {}
}

/// Progress reporter using indicatif.
///
/// Manages one bar per pipeline phase under a shared [`MultiProgress`].
pub struct Progress {
    multi: MultiProgress,
    compare: Mutex<Option<ProgressBar>>,
    convert: Mutex<Option<ProgressBar>>,
    cache: Mutex<Option<ProgressBar>>,
    scan: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            compare: Mutex::new(None),
            convert: Mutex::new(None),
            cache: Mutex::new(None),
            scan: Mutex::new(None),
            quiet,
        }
    }

    /// Style for the fast counting phases (compare, cache).
    fn counting_style(&self) -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    /// Style for the slow phases (convert, scan) with throughput and ETA.
    fn working_style(&self) -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} ({percent}%) {msg} {per_sec} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn slot(&self, phase: &str) -> Option<&Mutex<Option<ProgressBar>>> {
        match phase {
            "compare" => Some(&self.compare),
            "convert" => Some(&self.convert),
            "cache" => Some(&self.cache),
            "scan" => Some(&self.scan),
            _ => None,
        }
    }

    fn active_bar(&self) -> Option<ProgressBar> {
        for slot in [&self.scan, &self.cache, &self.convert, &self.compare] {
            if let Some(ref pb) = *slot.lock().unwrap() {
                return Some(pb.clone());
            }
        }
        None
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        let pb = self.multi.add(ProgressBar::new(total as u64));
        let (style, message) = match phase {
            "compare" => (self.counting_style(), "Comparing timestamps"),
            "convert" => (self.working_style(), "Converting drawings"),
            "cache" => (self.counting_style(), "Updating text cache"),
            "scan" => (self.working_style(), "Scanning"),
            other => (self.counting_style(), other),
        };
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        if let Some(slot) = self.slot(phase) {
            let mut guard = slot.lock().unwrap();
            *guard = Some(pb);
        }
    }

    fn on_progress(&self, current: usize, path: &str) {
        if self.quiet {
            return;
        }

        if let Some(pb) = self.active_bar() {
            pb.set_position(current as u64);
            pb.set_message(truncate_path(path, 30));
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }

        if let Some(slot) = self.slot(phase) {
            if let Some(pb) = slot.lock().unwrap().take() {
                pb.finish_and_clear();
            }
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }

        if let Some(pb) = self.active_bar() {
            pb.set_message(message.to_string());
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.len() <= max_len {
        return path.to_string();
    }

    let path_buf = std::path::Path::new(path);
    let file_name = path_buf
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if file_name.len() >= max_len {
        // CJK drawing names are common; the cut must land on a char boundary.
        let mut cut = file_name.len() - max_len + 3;
        while !file_name.is_char_boundary(cut) {
            cut += 1;
        }
        return format!("...{}", &file_name[cut..]);
    }

    format!(".../{}", file_name)
}
