//! Keyword matching over converted drawings.
//!
//! Two scan modes share one result type:
//!
//! - **Structured**: entity text items from the interchange parser are
//!   matched individually, one result per item/keyword hit with real
//!   object type and layer information.
//! - **Plain text**: the raw file is decoded in a streaming window and
//!   searched as one blob, at most one result per keyword, with sentinel
//!   object type and content. This is the fallback for oversize files and
//!   files the parser rejects.
//!
//! Matching is case-insensitive in both modes. An empty keyword list
//! matches everything: structured mode reports every text item under the
//! catch-all keyword, plain-text mode reports a single catch-all row.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{debug, warn};

use super::resolver::ScanTarget;
use crate::dxf::{extract_text_items, TextItem, NO_LAYER};

/// Catch-all keyword reported when no keywords were requested.
pub const ALL_KEYWORD: &str = "全部";

/// Object type reported for plain-text matches.
pub const PLAIN_TEXT_OBJECT_TYPE: &str = "未知";

/// Content placeholder reported for plain-text matches.
pub const PLAIN_TEXT_CONTENT: &str = "(纯文本匹配)";

/// Bytes read from the scanned file per decoding step.
const READ_BLOCK_BYTES: usize = 8192;

/// One keyword hit in one drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// File name of the source drawing.
    pub file_name: String,
    /// Entity kind, or the plain-text sentinel.
    pub object_type: String,
    /// Layer name, `-` when unknown.
    pub layer: String,
    /// Keyword that matched, or the catch-all keyword.
    pub keyword: String,
    /// Matched text, or the plain-text placeholder.
    pub content: String,
    /// Interchange file that was scanned.
    pub source_file_path: String,
    /// Source drawing the interchange file was converted from.
    pub original_source_path: String,
}

fn structured_result(target: &ScanTarget, item: &TextItem, keyword: &str) -> MatchResult {
    MatchResult {
        file_name: target.file_name(),
        object_type: item.object_type.as_str().to_string(),
        layer: item.layer.clone(),
        keyword: keyword.to_string(),
        content: item.text.clone(),
        source_file_path: target.converted.display().to_string(),
        original_source_path: target.source.display().to_string(),
    }
}

fn plain_result(target: &ScanTarget, keyword: &str) -> MatchResult {
    MatchResult {
        file_name: target.file_name(),
        object_type: PLAIN_TEXT_OBJECT_TYPE.to_string(),
        layer: NO_LAYER.to_string(),
        keyword: keyword.to_string(),
        content: PLAIN_TEXT_CONTENT.to_string(),
        source_file_path: target.converted.display().to_string(),
        original_source_path: target.source.display().to_string(),
    }
}

/// Match keywords against extracted text items.
///
/// Every item/keyword pair that matches yields its own result, so one
/// item can produce several rows and one keyword can hit many items.
#[must_use]
pub fn scan_structured(items: &[TextItem], keywords: &[String], target: &ScanTarget) -> Vec<MatchResult> {
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let mut results = Vec::new();

    for item in items {
        if keywords.is_empty() {
            results.push(structured_result(target, item, ALL_KEYWORD));
            continue;
        }
        let haystack = item.text.to_lowercase();
        for (keyword, lowered) in keywords.iter().zip(&lowered) {
            if haystack.contains(lowered.as_str()) {
                results.push(structured_result(target, item, keyword));
            }
        }
    }

    results
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

/// Guess the encoding from the first block of the file.
///
/// Byte-order marks win outright. Otherwise a NUL share above ten percent
/// indicates UTF-16, with endianness taken from where the NULs sit:
/// ASCII-heavy UTF-16 LE carries them in the odd (high) byte of each pair.
fn detect_encoding(head: &[u8]) -> TextEncoding {
    if head.starts_with(&[0xFF, 0xFE]) {
        return TextEncoding::Utf16Le;
    }
    if head.starts_with(&[0xFE, 0xFF]) {
        return TextEncoding::Utf16Be;
    }
    if head.starts_with(&[0xEF, 0xBB, 0xBF]) || head.is_empty() {
        return TextEncoding::Utf8;
    }

    let nuls = head.iter().filter(|&&b| b == 0).count();
    if nuls * 10 > head.len() {
        let odd_nuls = head.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
        let even_nuls = nuls - odd_nuls;
        if odd_nuls >= even_nuls {
            TextEncoding::Utf16Le
        } else {
            TextEncoding::Utf16Be
        }
    } else {
        TextEncoding::Utf8
    }
}

fn bom_len(head: &[u8], encoding: TextEncoding) -> usize {
    match encoding {
        TextEncoding::Utf8 if head.starts_with(&[0xEF, 0xBB, 0xBF]) => 3,
        TextEncoding::Utf16Le if head.starts_with(&[0xFF, 0xFE]) => 2,
        TextEncoding::Utf16Be if head.starts_with(&[0xFE, 0xFF]) => 2,
        _ => 0,
    }
}

/// Incremental lossy decoder. Bytes that do not complete a character yet
/// are carried to the next push; invalid sequences become U+FFFD.
struct StreamDecoder {
    encoding: TextEncoding,
    pending: Vec<u8>,
}

impl StreamDecoder {
    fn new(encoding: TextEncoding) -> Self {
        Self {
            encoding,
            pending: Vec::new(),
        }
    }

    fn push(&mut self, bytes: &[u8], out: &mut String) {
        self.pending.extend_from_slice(bytes);
        match self.encoding {
            TextEncoding::Utf8 => self.drain_utf8(out),
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => self.drain_utf16(out),
        }
    }

    /// Flush any bytes still pending at end of input as one U+FFFD.
    fn finish(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            out.push(char::REPLACEMENT_CHARACTER);
            self.pending.clear();
        }
    }

    fn drain_utf8(&mut self, out: &mut String) {
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_len = e.valid_up_to();
                    out.push_str(
                        std::str::from_utf8(&self.pending[start..start + valid_len]).unwrap_or(""),
                    );
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start += valid_len + bad;
                        }
                        None => {
                            // Incomplete sequence at the end: keep for later
                            start += valid_len;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
    }

    fn drain_utf16(&mut self, out: &mut String) {
        let usable = self.pending.len() - (self.pending.len() % 2);
        let mut units: Vec<u16> = self.pending[..usable]
            .chunks_exact(2)
            .map(|pair| match self.encoding {
                TextEncoding::Utf16Be => u16::from_be_bytes([pair[0], pair[1]]),
                _ => u16::from_le_bytes([pair[0], pair[1]]),
            })
            .collect();

        // A trailing high surrogate may pair with the next push
        let mut held = 0;
        if let Some(&last) = units.last() {
            if (0xD800..=0xDBFF).contains(&last) {
                units.pop();
                held = 2;
            }
        }

        out.extend(char::decode_utf16(units).map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER)));
        self.pending.drain(..usable - held);
    }
}

/// Search a file's raw text for keywords, at most one result per keyword.
///
/// The file is decoded block by block; between blocks the window keeps
/// one character less than the longest keyword, so matches spanning a
/// block boundary are still found. The scan stops as soon as every
/// keyword has matched.
///
/// # Errors
///
/// Returns the underlying I/O error when the file cannot be read.
pub fn scan_plain_text(
    path: &Path,
    keywords: &[String],
    target: &ScanTarget,
) -> std::io::Result<Vec<MatchResult>> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; READ_BLOCK_BYTES];

    let n = file.read(&mut buf)?;
    let head = &buf[..n];
    let encoding = detect_encoding(head);
    let skip = bom_len(head, encoding);
    let mut decoder = StreamDecoder::new(encoding);

    if keywords.is_empty() {
        return Ok(vec![plain_result(target, ALL_KEYWORD)]);
    }

    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let carry = lowered
        .iter()
        .map(|k| k.chars().count())
        .max()
        .unwrap_or(1)
        .saturating_sub(1);
    let mut matched = vec![false; keywords.len()];
    let mut results = Vec::new();

    let mut window = String::new();
    decoder.push(&head[skip..], &mut window);

    let search = |window: &str, results: &mut Vec<MatchResult>, matched: &mut [bool]| {
        let lower = window.to_lowercase();
        for (i, kw) in lowered.iter().enumerate() {
            if !matched[i] && lower.contains(kw.as_str()) {
                matched[i] = true;
                results.push(plain_result(target, &keywords[i]));
            }
        }
        matched.iter().all(|m| *m)
    };

    loop {
        if search(&window, &mut results, &mut matched) {
            break;
        }

        // Retain the tail so boundary-spanning keywords survive the cut
        if carry == 0 {
            window.clear();
        } else if let Some((idx, _)) = window.char_indices().rev().nth(carry - 1) {
            window.drain(..idx);
        }

        let n = file.read(&mut buf)?;
        if n == 0 {
            let mut tail = String::new();
            decoder.finish(&mut tail);
            if !tail.is_empty() {
                window.push_str(&tail);
                search(&window, &mut results, &mut matched);
            }
            break;
        }
        decoder.push(&buf[..n], &mut window);
    }

    Ok(results)
}

/// Scan one target without a cache.
///
/// Structured extraction is tried first; oversize files, files the parser
/// rejects, and files that parse but carry no text at all are searched as
/// plain text instead. A target without interchange output yields nothing.
#[must_use]
pub fn scan_target_directly(
    target: &ScanTarget,
    keywords: &[String],
    large_file_threshold: u64,
) -> Vec<MatchResult> {
    if !target.converted.exists() {
        debug!("no interchange output for {}", target.source.display());
        return Vec::new();
    }

    let oversize = std::fs::metadata(&target.converted)
        .map(|m| m.len() > large_file_threshold)
        .unwrap_or(false);
    if oversize {
        debug!(
            "{} exceeds the structured-parse threshold",
            target.converted.display()
        );
        return plain_or_empty(target, keywords);
    }

    match extract_text_items(&target.converted) {
        Ok(items) if items.is_empty() => plain_or_empty(target, keywords),
        Ok(items) => scan_structured(&items, keywords, target),
        Err(e) => {
            warn!(
                "structured parse failed for {}: {}",
                target.converted.display(),
                e
            );
            plain_or_empty(target, keywords)
        }
    }
}

pub(crate) fn plain_or_empty(target: &ScanTarget, keywords: &[String]) -> Vec<MatchResult> {
    scan_plain_text(&target.converted, keywords, target).unwrap_or_else(|e| {
        warn!(
            "plain-text scan failed for {}: {}",
            target.converted.display(),
            e
        );
        Vec::new()
    })
}
