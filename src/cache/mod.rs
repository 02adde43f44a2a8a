//! Extracted-text caching for cadtext.
//!
//! This module provides persistent storage for extracted drawing text to
//! speed up repeated searches by avoiding re-parsing of unchanged
//! interchange files.
//!
//! # Architecture
//!
//! One SQLite database lives inside each interchange output folder, so a
//! drawing directory carries its own cache and stays self-contained when
//! moved. [`store`] handles schema management, the per-file update rules,
//! and keyword queries.
//!
//! # Cache Invalidation
//!
//! A file row stores the interchange file's size and its modification
//! time in whole milliseconds. On update both stored values are compared
//! for exact equality: any difference re-parses the file and replaces its
//! text rows in one transaction. Files whose structured parse failed or
//! produced no text are kept with `cached = 0` so later runs fall back to
//! plain-text scanning without retrying the parser on an unchanged file.

pub mod store;

pub use store::{CacheError, CacheUpdateOutcome, TextCache, CACHE_FILE_NAME};
