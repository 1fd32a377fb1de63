//! Heading anchors and the table of contents.
//!
//! Every heading gets an `<a id="slug"></a>` line directly above it, and the
//! region under the TOC placeholder heading is regenerated from the headings
//! found. Both steps first remove what an earlier run produced, so running
//! the pass twice yields the same text.

use crate::error::PassWarning;
use crate::pipeline::lines::{classify, parse_heading, LineKind};
use crate::pipeline::styles::STYLE_MARKER;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

static RE_ANCHOR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^\s*<a id="[^"]*"></a>\s*$"#).unwrap());
static RE_NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingEntry {
    pub level: u8,
    pub title: String,
    pub slug: String,
}

/// Anchor-safe form of a heading title.
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    let stripped = RE_NON_SLUG.replace_all(&lower, "");
    let dashed = RE_WS.replace_all(stripped.trim(), "-");
    dashed.trim_matches('-').to_string()
}

/// Tracks slugs already handed out so duplicates get `-1`, `-2`, …
#[derive(Debug, Default)]
struct SlugRegistry {
    seen: HashMap<String, usize>,
}

impl SlugRegistry {
    fn unique(&mut self, base: String) -> String {
        if base.is_empty() {
            return base;
        }
        let mut count = self.seen.get(&base).copied().unwrap_or(0);
        let mut slug = if count == 0 {
            base.clone()
        } else {
            format!("{base}-{count}")
        };
        while count > 0 && self.seen.contains_key(&slug) {
            count += 1;
            slug = format!("{base}-{count}");
        }
        self.seen.insert(base, count + 1);
        self.seen.entry(slug.clone()).or_insert(1);
        slug
    }
}

#[derive(Debug, Default)]
pub struct TocOutcome {
    pub headings: Vec<HeadingEntry>,
    pub toc_rebuilt: bool,
    pub warnings: Vec<PassWarning>,
}

/// Strip stale anchors, rebuild the TOC under the `placeholder_title`
/// heading and insert fresh anchors.
///
/// Pass `None` as `placeholder_title` to only maintain anchors.
pub fn build_anchors_and_toc(lines: &mut Vec<String>, placeholder_title: Option<&str>) -> TocOutcome {
    let mut out = TocOutcome::default();

    // ── Step 1: drop anchors left above headings by an earlier run ───────
    strip_stale_anchors(lines);

    // ── Step 2: empty the region owned by the TOC placeholder ────────────
    let mut toc_at = None;
    if let Some(title) = placeholder_title {
        match find_placeholder(lines, title) {
            Some((at, level)) => {
                let end = region_end(lines, at, level);
                lines.splice(at + 1..end, [String::new(), String::new()]);
                toc_at = Some(at);
            }
            None => {
                warn!(title, "TOC placeholder heading not found");
                out.warnings.push(PassWarning::TocPlaceholderMissing {
                    title: title.to_string(),
                });
            }
        }
    }

    // ── Step 3: collect headings ─────────────────────────────────────────
    let mut registry = SlugRegistry::default();
    let mut positions = Vec::new();
    for (i, kind) in classify(lines).into_iter().enumerate() {
        let LineKind::Heading(level) = kind else {
            continue;
        };
        let Some((_, title)) = parse_heading(&lines[i]) else {
            continue;
        };
        let slug = registry.unique(slugify(title));
        positions.push(i);
        out.headings.push(HeadingEntry {
            level,
            title: title.to_string(),
            slug,
        });
    }

    // ── Step 4: fill the TOC region ──────────────────────────────────────
    if let Some(at) = toc_at {
        let entries: Vec<String> = positions
            .iter()
            .zip(&out.headings)
            .filter(|(pos, h)| **pos != at && !h.slug.is_empty())
            .map(|(_, h)| toc_entry(h))
            .collect();
        let added = entries.len();
        lines.splice(at + 2..at + 2, entries);
        for pos in positions.iter_mut().filter(|p| **p > at) {
            *pos += added;
        }
        out.toc_rebuilt = true;
        debug!(entries = added, "table of contents rebuilt");
    }

    // ── Step 5: anchors, inserted bottom-up so indices stay valid ────────
    for (pos, heading) in positions.iter().zip(&out.headings).rev() {
        if heading.slug.is_empty() {
            continue;
        }
        lines.insert(*pos, format!(r#"<a id="{}"></a>"#, heading.slug));
    }

    out
}

fn toc_entry(h: &HeadingEntry) -> String {
    let indent = "    ".repeat(usize::from(h.level.saturating_sub(1)));
    format!("{indent}- [{}](#{})", h.title, h.slug)
}

/// First heading titled `title`, with its level.
fn find_placeholder(lines: &[String], title: &str) -> Option<(usize, u8)> {
    classify(lines).into_iter().enumerate().find_map(|(i, kind)| match kind {
        LineKind::Heading(level) if parse_heading(&lines[i]).is_some_and(|(_, t)| t == title) => {
            Some((i, level))
        }
        _ => None,
    })
}

/// End (exclusive) of the region owned by the placeholder at line `at`: the
/// next heading of the same or a higher level, the style marker, or the end
/// of the document. Deeper headings belong to the region. A final empty line
/// (the file's trailing newline) is never part of it.
fn region_end(lines: &[String], at: usize, level: u8) -> usize {
    let start = at + 1;
    for (i, kind) in classify(lines).into_iter().enumerate().skip(start) {
        if lines[i].trim() == STYLE_MARKER {
            return i;
        }
        if matches!(kind, LineKind::Heading(l) if l <= level) {
            return i;
        }
    }
    if lines.len() > start && lines.last().is_some_and(|l| l.is_empty()) {
        lines.len() - 1
    } else {
        lines.len()
    }
}

fn strip_stale_anchors(lines: &mut Vec<String>) {
    let mut i = 0;
    while i + 1 < lines.len() {
        if RE_ANCHOR.is_match(&lines[i]) && parse_heading(&lines[i + 1]).is_some() {
            lines.remove(i);
        } else {
            i += 1;
        }
    }
}
