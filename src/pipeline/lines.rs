//! Line model: the in-memory [`Document`] and the line tokenizer.
//!
//! Every pass works on whole lines. Rather than re-deriving context (am I in a
//! table? is this a heading?) inside each pass, [`classify`] walks the
//! document once and tags every line with a [`LineKind`]. The relocation and
//! caption passes consume that tagged stream; the TOC pass re-classifies after
//! the caption pass has reshaped the document.

use crate::pipeline::caption::{parse_caption, CaptionOwner};
use crate::pipeline::scan::leading_reference;
use once_cell::sync::Lazy;
use regex::Regex;

/// Opening line of a promoted figure block.
pub const FIGURE_OPEN: &str = r#"<div class="figure-container">"#;

/// An ordered, mutable sequence of text lines.
///
/// Owned by exactly one pipeline run; the passes borrow its lines in turn.
/// `from_text` / `to_text` round-trip any LF-terminated input byte for byte;
/// a trailing newline shows up as a final empty line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    lines: Vec<String>,
}

impl Document {
    /// Split `text` into lines, normalising CRLF / CR to LF and dropping a
    /// leading byte-order mark.
    pub fn from_text(text: &str) -> Self {
        let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        Self {
            lines: text.split('\n').map(str::to_string).collect(),
        }
    }

    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn lines_mut(&mut self) -> &mut Vec<String> {
        &mut self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

impl From<Vec<String>> for Document {
    fn from(lines: Vec<String>) -> Self {
        Self { lines }
    }
}

/// What a single line is, as far as the passes care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Plain,
    /// Part of a pipe-delimited table block.
    Table,
    /// ATX heading with its level (1–6).
    Heading(u8),
    /// A standalone line that starts with a relocatable image reference.
    Image,
    /// A labelled caption line ("Рисунок 1 – …", "Table 2 - …").
    CaptionCandidate(CaptionOwner),
}

/// Table-state transition for one line.
///
/// Outside a table, a line opens one when its trimmed form starts with `|`
/// and contains a second `|`. Inside a table, the block continues while the
/// trimmed line starts with `|`.
pub fn next_table_state(in_table: bool, line: &str) -> bool {
    let trimmed = line.trim();
    if in_table {
        trimmed.starts_with('|')
    } else {
        trimmed.starts_with('|') && trimmed[1..].contains('|')
    }
}

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6}) +(.+?)\s*$").unwrap());

/// Parse an ATX heading into `(level, title)`.
pub fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let caps = RE_HEADING.captures(line)?;
    let level = caps.get(1)?.as_str().len() as u8;
    let title = caps.get(2)?.as_str();
    Some((level, title))
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Tag every line of `lines`, in a single forward pass.
///
/// Lines inside fenced code blocks are always [`LineKind::Plain`]. A line
/// directly under [`FIGURE_OPEN`] is never [`LineKind::Image`]: it belongs to
/// a figure promoted by an earlier run.
pub fn classify(lines: &[String]) -> Vec<LineKind> {
    let mut kinds = Vec::with_capacity(lines.len());
    let mut in_table = false;
    let mut in_fence = false;

    for (i, line) in lines.iter().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
            in_table = false;
            kinds.push(LineKind::Plain);
            continue;
        }
        if in_fence {
            kinds.push(LineKind::Plain);
            continue;
        }

        in_table = next_table_state(in_table, line);

        let kind = if in_table {
            LineKind::Table
        } else if let Some((level, _)) = parse_heading(line) {
            LineKind::Heading(level)
        } else if leading_reference(line).is_some() && !follows_figure_open(lines, i) {
            LineKind::Image
        } else if let Some(owner) = parse_caption(line).and_then(|c| c.owner) {
            LineKind::CaptionCandidate(owner)
        } else {
            LineKind::Plain
        };
        kinds.push(kind);
    }

    kinds
}

fn follows_figure_open(lines: &[String], i: usize) -> bool {
    i > 0 && lines[i - 1].trim() == FIGURE_OPEN
}
