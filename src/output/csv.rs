//! CSV export for keyword search results.
//!
//! Provides machine-readable CSV output for spreadsheets and downstream
//! reporting. One row is generated for each match.
//!
//! # Columns
//!
//! Headers are written in Chinese, matching the vocabulary of the
//! drawing archives this tool is used on:
//!
//! - `文件名`: Source drawing file name
//! - `对象类型`: Entity kind, or `未知` for plain-text matches
//! - `图层`: Layer name, `-` when unknown
//! - `关键字`: Keyword that matched, `全部` for catch-all rows
//! - `匹配内容`: Matched text, `(纯文本匹配)` for plain-text matches
//!
//! # Example
//!
//! ```no_run
//! use cadtext::output::csv::CsvExport;
//!
//! let results = Vec::new();
//! let export = CsvExport::new(&results);
//! export.write_to(std::io::stdout()).unwrap();
//! ```

use std::io;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::MatchResult;

/// Errors that can occur during CSV export.
#[derive(Debug, Error)]
pub enum CsvExportError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A single row in the CSV output.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "文件名")]
    file_name: &'a str,
    #[serde(rename = "对象类型")]
    object_type: &'a str,
    #[serde(rename = "图层")]
    layer: &'a str,
    #[serde(rename = "关键字")]
    keyword: &'a str,
    #[serde(rename = "匹配内容")]
    content: &'a str,
}

/// CSV export formatter.
pub struct CsvExport<'a> {
    results: &'a [MatchResult],
}

impl<'a> CsvExport<'a> {
    /// Create a new CSV export formatter.
    #[must_use]
    pub fn new(results: &'a [MatchResult]) -> Self {
        Self { results }
    }

    /// Write the CSV output to the given writer.
    ///
    /// # Errors
    ///
    /// Returns `CsvExportError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvExportError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        // serialize only emits headers with the first row; keep empty
        // exports valid for downstream tooling
        if self.results.is_empty() {
            csv_writer.write_record(["文件名", "对象类型", "图层", "关键字", "匹配内容"])?;
        }

        for result in self.results {
            let row = CsvRow {
                file_name: &result.file_name,
                object_type: &result.object_type,
                layer: &result.layer,
                keyword: &result.keyword,
                content: &result.content,
            };
            csv_writer.serialize(row)?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Write the CSV output to a file, creating or truncating it.
    ///
    /// # Errors
    ///
    /// Returns `CsvExportError` if the file cannot be created or written.
    pub fn write_to_path(&self, path: &Path) -> Result<(), CsvExportError> {
        let file = std::fs::File::create(path)?;
        self.write_to(io::BufWriter::new(file))
    }

    /// Generate CSV output as a string.
    ///
    /// # Errors
    ///
    /// Returns `CsvExportError` if serialization fails.
    pub fn to_string(&self) -> Result<String, CsvExportError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
