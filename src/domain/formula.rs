//! Locating formula blocks inside a document.
//!
//! Formula blocks are delimited by the marker pair `` ```mr `` … `` ```mrend ``.
//! Scanning is a pure text operation: the offsets it records are only valid
//! against the exact text that was scanned.

use once_cell::sync::Lazy;
use regex::Regex;

pub const START_MARKER: &str = "```mr";
pub const END_MARKER: &str = "```mrend";

// Lazy matching keeps spans non-overlapping: scanning never re-enters text
// already consumed by a matched span, and `.` does not cross line breaks.
static FORMULA_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("{START_MARKER}.+?{END_MARKER}")).expect("formula pattern must be valid")
});

/// One formula block found in a document.
///
/// `start` and `end` are byte offsets into the scanned text; any edit to the
/// document invalidates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaSpan {
    pub raw: String,
    pub start: usize,
    pub end: usize,
}

/// Return every formula span in `text`, in ascending offset order.
///
/// An unterminated start marker simply does not match; a document without
/// any formula blocks yields an empty vector, which is a normal outcome.
pub fn scan(text: &str) -> Vec<FormulaSpan> {
    FORMULA_PATTERN
        .find_iter(text)
        .map(|found| FormulaSpan {
            raw: found.as_str().to_owned(),
            start: found.start(),
            end: found.end(),
        })
        .collect()
}

/// Strip the marker tokens and embedded line breaks from a raw span,
/// leaving only the formula source handed to the typesetting CLI.
pub fn strip_markers(raw: &str) -> String {
    let body = raw.strip_prefix(START_MARKER).unwrap_or(raw);
    let body = body.strip_suffix(END_MARKER).unwrap_or(body);
    body.trim().replace('\n', "")
}
