//! Group code / value pair reader for interchange files.
//!
//! The ASCII interchange format is a flat sequence of two-line records: a
//! numeric group code followed by its value. Lines are read as raw bytes
//! and converted lossily, since converters emit text in whatever codepage
//! the drawing used; undecodable bytes degrade to replacement characters
//! instead of failing the whole file.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while reading an interchange file.
///
/// Any of these is recovered by the caller falling back to a plain-text
/// scan of the file.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The file could not be opened or read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A group code line did not hold a number.
    #[error("{path}:{line}: invalid group code {value:?}")]
    InvalidGroupCode {
        path: PathBuf,
        line: u64,
        value: String,
    },

    /// The file ended on a group code with no value line.
    #[error("{path}:{line}: group code without a value")]
    Truncated { path: PathBuf, line: u64 },
}

/// One group code / value record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GroupPair {
    pub code: i32,
    pub value: String,
}

/// Streaming reader over the pair sequence.
pub(crate) struct PairReader<R: BufRead> {
    input: R,
    path: PathBuf,
    line: u64,
    buf: Vec<u8>,
}

impl<R: BufRead> PairReader<R> {
    pub fn new(input: R, path: &Path) -> Self {
        Self {
            input,
            path: path.to_path_buf(),
            line: 0,
            buf: Vec::new(),
        }
    }

    /// Read one line, stripping the EOL. `None` at end of input.
    fn read_line(&mut self) -> Result<Option<String>, ParseError> {
        self.buf.clear();
        let n = self
            .input
            .read_until(b'\n', &mut self.buf)
            .map_err(|e| ParseError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        if n == 0 {
            return Ok(None);
        }
        self.line += 1;

        let mut s = String::from_utf8_lossy(&self.buf).into_owned();
        while s.ends_with('\n') || s.ends_with('\r') {
            s.pop();
        }
        Ok(Some(s))
    }

    /// Read the next code/value pair.
    ///
    /// Blank lines before a group code are tolerated (some converters pad
    /// the end of the file). A code with no following value line is a
    /// structural error.
    pub fn next_pair(&mut self) -> Result<Option<GroupPair>, ParseError> {
        let code_line = loop {
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
            }
        };

        let code = code_line
            .trim()
            .parse::<i32>()
            .map_err(|_| ParseError::InvalidGroupCode {
                path: self.path.clone(),
                line: self.line,
                value: code_line.trim().to_string(),
            })?;

        let Some(value) = self.read_line()? else {
            return Err(ParseError::Truncated {
                path: self.path.clone(),
                line: self.line,
            });
        };

        Ok(Some(GroupPair { code, value }))
    }
}
