//! MTEXT inline formatting code normalization.
//!
//! Rich-text entities store formatting inline with the text: paragraph
//! breaks (`\P`), stacked fractions (`\S1/2;`), font and color runs
//! (`\fSimHei|b0|i0;`, `\C1;`), toggles (`\L`), unicode escapes
//! (`\U+4E2D`) and brace grouping. [`normalize_mtext`] strips all of it
//! down to the text a viewer would render.

use regex::Regex;
use std::sync::OnceLock;

/// Paragraph breaks, column breaks and non-breaking spaces become a space.
fn break_codes() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\[PXNn~]").unwrap())
}

/// Stacked fraction syntax `\S<body>;` keeps its body.
fn stack_codes() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\S([^;]*);").unwrap())
}

/// Parameterized runs (alignment, color, font, height, slant, tracking,
/// width) are dropped whole, up to their terminating semicolon.
fn param_codes() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\\[ACFHQTW][^;]*;").unwrap())
}

/// Single-letter toggles: underline, overline, strike-through on/off.
fn toggle_codes() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\[LlOoKk]").unwrap())
}

/// Explicit code point escapes of the form `\U+XXXX`.
fn unicode_escapes() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\U\+([0-9A-Fa-f]{4})").unwrap())
}

/// Strip MTEXT inline formatting, returning the rendered text.
///
/// The passes run in a fixed order; notably the stacked-fraction rewrite
/// happens before parameter runs are dropped, and doubled backslashes are
/// unescaped last. An input that is pure formatting normalizes to an empty
/// string, which callers drop.
#[must_use]
pub fn normalize_mtext(raw: &str) -> String {
    let text = break_codes().replace_all(raw, " ");
    let text = stack_codes().replace_all(&text, "$1");
    let text = param_codes().replace_all(&text, "");
    let text = toggle_codes().replace_all(&text, "");
    let text = unicode_escapes().replace_all(&text, |caps: &regex::Captures| {
        u32::from_str_radix(&caps[1], 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    let text = text.replace(['{', '}'], "");
    let text = text.replace("\\\\", "\\");
    text.trim().to_string()
}
