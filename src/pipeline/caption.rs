//! Caption promotion: bind caption lines to figures and tables.
//!
//! pandoc renders Word captions as ordinary paragraphs next to the object
//! they describe, e.g.
//!
//! ```text
//! ![](images/pic_20250101_120000.png)
//!
//! Рисунок 1 – Структура системы
//! ```
//!
//! This pass turns such pairs into semantic markup and consumes the original
//! caption line. Numbering is dropped from the caption text; the figure and
//! table stylesheets re-add it with CSS counters.

use crate::error::PassWarning;
use crate::pipeline::lines::{LineKind, FIGURE_OPEN};
use crate::pipeline::scan::{leading_reference, ReferenceKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// What a caption describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptionOwner {
    Figure,
    Table,
}

/// A bound caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    pub owner: CaptionOwner,
    pub text: String,
}

/// A line that matched the caption pattern, before it is bound to anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionLine {
    /// `None` when the line carries no label word.
    pub owner: Option<CaptionOwner>,
    pub number: Option<String>,
    pub dash: char,
    pub text: String,
}

impl CaptionLine {
    /// Whether the line may caption a figure during look-ahead.
    ///
    /// Label-less lines need an en or em dash: a bare hyphen would make any
    /// Markdown list item under an image look like a caption.
    pub fn fits_figure(&self) -> bool {
        match self.owner {
            Some(CaptionOwner::Figure) => true,
            Some(CaptionOwner::Table) => false,
            None => self.dash != '-',
        }
    }
}

static RE_CAPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^\s*
        (?:(?P<label>(?i:рисунок|рис|figure|fig|таблица|табл|table|tab))\.?)?
        \s*
        (?P<num>\d+(?:[.,]\d+)*)?\.?
        \s*
        (?P<dash>[-–—])
        \s*
        (?P<text>.*?)
        \s*$",
    )
    .unwrap()
});

/// Match a line against the caption pattern.
///
/// Pattern: optional label word, optional number, a dash-class separator,
/// then free text.
pub fn parse_caption(line: &str) -> Option<CaptionLine> {
    let caps = RE_CAPTION.captures(line)?;
    let owner = caps.name("label").map(|m| {
        let label = m.as_str().to_lowercase();
        if label.starts_with("рис") || label.starts_with("fig") {
            CaptionOwner::Figure
        } else {
            CaptionOwner::Table
        }
    });
    let dash = caps.name("dash")?.as_str().chars().next()?;
    Some(CaptionLine {
        owner,
        number: caps.name("num").map(|m| m.as_str().to_string()),
        dash,
        text: caps.name("text").map(|m| m.as_str()).unwrap_or("").to_string(),
    })
}

/// Knobs for [`promote_captions`].
#[derive(Debug, Clone, Copy)]
pub struct CaptionOptions<'a> {
    /// Caption used when no caption line follows a figure.
    pub default_caption: &'a str,
    /// How many lines after a figure are searched for its caption.
    pub lookahead: usize,
}

/// Result of the caption pass.
#[derive(Debug, Default)]
pub struct Promotion {
    pub lines: Vec<String>,
    pub captions: Vec<Caption>,
    pub warnings: Vec<PassWarning>,
}

/// Promote captions around the relocated figures in `figures` and around
/// every table in `kinds`.
///
/// `figures` maps the index of each relocated [`LineKind::Image`] line to
/// the reference's new relative path. `kinds` must describe `lines` as they
/// were classified before relocation; relocation only rewrites paths, so
/// line kinds are unchanged by it.
pub fn promote_captions(
    lines: Vec<String>,
    kinds: &[LineKind],
    figures: &BTreeMap<usize, String>,
    options: CaptionOptions<'_>,
) -> Promotion {
    let n = lines.len();
    let mut blanked = vec![false; n];
    let mut replacement: Vec<Option<Vec<String>>> = vec![None; n];
    let mut captions = Vec::new();
    let mut warnings = Vec::new();

    // ── Figures: look ahead for the first fitting caption ────────────────
    for (&i, relative) in figures {
        let found = find_figure_caption(&lines, kinds, &blanked, i, options.lookahead);
        let text = match found {
            Some((j, text)) => {
                blanked[j] = true;
                text
            }
            None => String::new(),
        };
        let text = if text.is_empty() {
            options.default_caption.to_string()
        } else {
            text
        };
        if let Some(block) = figure_block(&lines[i], relative, &text) {
            replacement[i] = Some(block);
            captions.push(Caption {
                owner: CaptionOwner::Figure,
                text,
            });
        }
    }

    // ── Tables and orphans ───────────────────────────────────────────────
    for i in 0..n {
        let LineKind::CaptionCandidate(owner) = kinds[i] else {
            continue;
        };
        if blanked[i] {
            continue;
        }
        let Some(parsed) = parse_caption(&lines[i]) else {
            continue;
        };
        if owner == CaptionOwner::Table && starts_table_below(kinds, &lines, i) {
            debug!(line = i + 1, "table caption promoted");
            replacement[i] = Some(vec![format!(
                r#"<p class="table-caption">{}</p>"#,
                escape_html(&parsed.text)
            )]);
            captions.push(Caption {
                owner: CaptionOwner::Table,
                text: parsed.text,
            });
        } else {
            warn!(line = i + 1, "dropping caption with no adjacent figure or table");
            replacement[i] = Some(Vec::new());
            warnings.push(PassWarning::OrphanCaption {
                line: i + 1,
                text: lines[i].trim().to_string(),
            });
        }
    }

    let mut out = Vec::with_capacity(n + figures.len() * 3);
    for (i, line) in lines.into_iter().enumerate() {
        if blanked[i] {
            out.push(String::new());
        } else if let Some(block) = replacement[i].take() {
            out.extend(block);
        } else {
            out.push(line);
        }
    }

    Promotion {
        lines: out,
        captions,
        warnings,
    }
}

/// First caption line within the window below figure line `i`.
///
/// The search stops early at the next image, heading or table line so a
/// figure never steals a caption that belongs to something further down.
fn find_figure_caption(
    lines: &[String],
    kinds: &[LineKind],
    blanked: &[bool],
    i: usize,
    lookahead: usize,
) -> Option<(usize, String)> {
    let last = (i + lookahead).min(lines.len().saturating_sub(1));
    for j in (i + 1)..=last {
        match kinds[j] {
            LineKind::Image | LineKind::Heading(_) | LineKind::Table => break,
            _ => {}
        }
        if blanked[j] {
            continue;
        }
        if let Some(c) = parse_caption(&lines[j]).filter(CaptionLine::fits_figure) {
            return Some((j, c.text));
        }
    }
    None
}

/// Whether the next non-blank line after `i` is a table line.
fn starts_table_below(kinds: &[LineKind], lines: &[String], i: usize) -> bool {
    ((i + 1)..lines.len())
        .find(|&j| !lines[j].trim().is_empty())
        .is_some_and(|j| kinds[j] == LineKind::Table)
}

fn figure_block(line: &str, relative: &str, caption: &str) -> Option<Vec<String>> {
    let reference = leading_reference(line)?;
    let image = match reference.kind {
        ReferenceKind::Inline => format!(
            r#"<img src="{}" alt="{}">"#,
            relative,
            escape_html(&reference.alt)
        ),
        ReferenceKind::Tag => line[reference.span.clone()].to_string(),
    };

    let mut block = vec![
        FIGURE_OPEN.to_string(),
        image,
        format!(
            r#"<span class="figure-caption">{}</span>"#,
            escape_html(caption)
        ),
        "</div>".to_string(),
    ];
    let rest = line[reference.span.end..].trim();
    if !rest.is_empty() {
        block.push(rest.to_string());
    }
    Some(block)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
