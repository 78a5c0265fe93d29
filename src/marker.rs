//! Detection of inline `[[name:args]]` tool markers in streamed text.

use regex::Regex;
use std::sync::LazyLock;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[(\w+):([^\]]*)\]\]").expect("marker pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineMarker {
    pub name: String,
    pub args: String,
    /// Byte offset of the opening `[[`.
    pub start: usize,
    /// Byte offset just past the closing `]]`.
    pub end: usize,
}

/// Returns the first complete marker in `buffer`, if any.
///
/// Matching is textual: arguments cannot contain `]` and markers do not nest.
pub fn scan(buffer: &str) -> Option<InlineMarker> {
    let captures = MARKER.captures(buffer)?;
    let whole = captures.get(0)?;
    Some(InlineMarker {
        name: captures[1].to_string(),
        args: captures[2].to_string(),
        start: whole.start(),
        end: whole.end(),
    })
}
