//! Output formatters for keyword search results.
//!
//! This module renders scan results for consumers outside the terminal:
//! - CSV for spreadsheet import and downstream reporting
//!
//! # Example
//!
//! ```no_run
//! use cadtext::output::CsvExport;
//!
//! let results = Vec::new();
//! let export = CsvExport::new(&results);
//! print!("{}", export.to_string().unwrap());
//! ```

pub mod csv;

pub use csv::{CsvExport, CsvExportError};
