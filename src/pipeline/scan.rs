//! Reference scanner: find image references in a single line.
//!
//! Two syntaxes are recognised, both as emitted by pandoc's GFM writer:
//!
//! - inline Markdown images: `![alt](path)` or `![alt](path "title")`
//! - HTML image tags: `<img src="path" …>` / `<img … src="path" />`
//!
//! References whose source is empty or an embedded `data:` payload are never
//! returned; nothing downstream relocates or rewrites them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

static RE_INLINE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").unwrap());

static RE_IMG_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img\s[^>]*?\bsrc\s*=\s*"([^"]*)"[^>]*>"#).unwrap());

static RE_ALT_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\balt\s*=\s*"([^"]*)""#).unwrap());

static RE_TITLED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(\S.*?)\s+("[^"]*"|'[^']*'|\([^)]*\))$"#).unwrap());

/// Which syntax a reference was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Inline,
    Tag,
}

/// One image reference found on a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub kind: ReferenceKind,
    pub alt: String,
    pub raw_source: String,
    pub line_index: usize,
    /// Byte range of `raw_source` within the line.
    pub source_span: Range<usize>,
    /// Byte range of the whole reference within the line.
    pub span: Range<usize>,
}

impl ImageReference {
    /// The file name the source points at, without query or fragment.
    pub fn file_name(&self) -> &str {
        source_file_name(&self.raw_source)
    }
}

/// Strip `?query` / `#fragment` and any directory part from a source.
pub fn source_file_name(source: &str) -> &str {
    let path = strip_query(source);
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// The part of a source before any `?query` or `#fragment`.
pub fn strip_query(source: &str) -> &str {
    source.split(['?', '#']).next().unwrap_or(source)
}

/// Split the inside of `(…)` into its destination and an optional title
/// (`"t"`, `'t'` or `(t)`). Spaces inside the destination are kept.
pub fn split_title(body: &str) -> (&str, Option<&str>) {
    let trimmed = body.trim();
    match RE_TITLED.captures(trimmed) {
        Some(caps) => (
            caps.get(1).map_or(trimmed, |m| m.as_str()),
            caps.get(2).map(|m| m.as_str()),
        ),
        None => (trimmed, None),
    }
}

/// Whether a source must be left alone (empty, or a `data:` URI).
pub fn is_ignored_source(source: &str) -> bool {
    let s = source.trim();
    s.is_empty() || s.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:"))
}

/// All non-ignored references on `line`, ordered left to right.
pub fn scan_line(line: &str, line_index: usize) -> Vec<ImageReference> {
    let mut refs = Vec::new();

    for caps in RE_INLINE_IMAGE.captures_iter(line) {
        let (Some(whole), Some(alt), Some(target)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let inner = target.as_str();
        let lead = inner.len() - inner.trim_start().len();
        let (token, _) = split_title(inner);
        let start = target.start() + lead;
        refs.push(ImageReference {
            kind: ReferenceKind::Inline,
            alt: alt.as_str().to_string(),
            raw_source: token.to_string(),
            line_index,
            source_span: start..start + token.len(),
            span: whole.range(),
        });
    }

    for caps in RE_IMG_TAG.captures_iter(line) {
        let (Some(whole), Some(src)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let alt = RE_ALT_ATTR
            .captures(whole.as_str())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        refs.push(ImageReference {
            kind: ReferenceKind::Tag,
            alt,
            raw_source: src.as_str().to_string(),
            line_index,
            source_span: src.range(),
            span: whole.range(),
        });
    }

    refs.retain(|r| !is_ignored_source(&r.raw_source));
    refs.sort_by_key(|r| r.span.start);
    refs
}

/// The reference that opens `line` (after indentation), if any.
pub fn leading_reference(line: &str) -> Option<ImageReference> {
    let indent = line.len() - line.trim_start().len();
    scan_line(line, 0)
        .into_iter()
        .next()
        .filter(|r| r.span.start == indent)
}
