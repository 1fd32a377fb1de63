//! Stylesheet injection.
//!
//! Styles live in a single block at the end of the document:
//!
//! ```text
//! <!-- docx2md:styles -->
//! <style>
//! /* docx2md:figures */
//! …
//! /* docx2md:figures:end */
//! </style>
//! ```
//!
//! The marker line lets later runs find the block again; the per-fragment
//! comments let them replace one category without disturbing another.

use crate::error::PassWarning;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Sentinel line that opens the injected style block.
pub const STYLE_MARKER: &str = "<!-- docx2md:styles -->";

static RE_FRAGMENT_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/\* docx2md:([A-Za-z0-9_-]+) \*/$").unwrap());

const FIGURES_CSS: &str = r#".figure-container {
    text-align: center;
    margin: 15px 0;
    counter-increment: figureCounter;
}
.figure-container img {
    display: inline-block;
    max-width: 100%;
    height: auto;
}
.figure-caption {
    display: block;
    text-align: center;
    font-style: italic;
    margin-top: 5px;
}
.figure-caption:before {
    content: "Рисунок " counter(figureCounter) " - ";
    font-weight: bold;
}
body {
    counter-reset: figureCounter;
}"#;

const TABLES_CSS: &str = r#".table-caption {
    text-align: left;
    font-style: italic;
    margin: 10px 0 5px;
    counter-increment: tableCounter;
}
.table-caption:before {
    content: "Таблица " counter(tableCounter) " - ";
    font-weight: bold;
}
:root {
    counter-reset: tableCounter;
}"#;

/// A group of styles switched on by what the document contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleCategory {
    Figures,
    Tables,
}

impl StyleCategory {
    pub const ALL: [StyleCategory; 2] = [StyleCategory::Figures, StyleCategory::Tables];

    pub fn name(self) -> &'static str {
        match self {
            StyleCategory::Figures => "figures",
            StyleCategory::Tables => "tables",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            StyleCategory::Figures => "figures.css",
            StyleCategory::Tables => "tables.css",
        }
    }

    fn builtin_css(self) -> &'static str {
        match self {
            StyleCategory::Figures => FIGURES_CSS,
            StyleCategory::Tables => TABLES_CSS,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// Source of stylesheet text, shared by every document of a batch.
///
/// Files are read at most once per category.
#[derive(Debug, Default)]
pub struct StyleSheets {
    dir: Option<PathBuf>,
    cache: Mutex<HashMap<StyleCategory, Arc<str>>>,
}

impl StyleSheets {
    /// The stylesheets compiled into the crate.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Read `figures.css` / `tables.css` from `dir`.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            cache: Mutex::default(),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn load(&self, category: StyleCategory) -> Result<Arc<str>, PassWarning> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(css) = cache.get(&category) {
            return Ok(Arc::clone(css));
        }

        let css: Arc<str> = match &self.dir {
            None => Arc::from(category.builtin_css()),
            Some(dir) => {
                let path = dir.join(category.file_name());
                let text = std::fs::read_to_string(&path).map_err(|_| PassWarning::StylesheetMissing {
                    category: category.name().to_string(),
                    path: path.clone(),
                })?;
                debug!(path = %path.display(), "stylesheet loaded");
                Arc::from(text.trim_end())
            }
        };
        cache.insert(category, Arc::clone(&css));
        Ok(css)
    }
}

/// Upsert the style block so it holds `fragments` plus whatever other
/// fragments it already held.
///
/// Active fragments are fully replaced by their fresh text. Known
/// categories come first in category order; fragments with unknown names
/// follow in the order they were found.
pub fn inject_styles(lines: &mut Vec<String>, fragments: &[(StyleCategory, Arc<str>)]) {
    let existing = find_block(lines);

    let mut known: Vec<(StyleCategory, String)> = Vec::new();
    let mut unknown: Vec<(String, String)> = Vec::new();
    if let Some(range) = &existing {
        for (name, body) in parse_fragments(&lines[range.clone()]) {
            match StyleCategory::from_name(&name) {
                Some(c) => known.push((c, body)),
                None => unknown.push((name, body)),
            }
        }
    }
    for (category, css) in fragments {
        known.retain(|(c, _)| c != category);
        known.push((*category, css.to_string()));
    }
    known.sort_by_key(|(c, _)| *c);

    if known.is_empty() && unknown.is_empty() && existing.is_none() {
        return;
    }

    let mut block = vec![STYLE_MARKER.to_string(), "<style>".to_string()];
    let all = known
        .iter()
        .map(|(c, body)| (c.name(), body.as_str()))
        .chain(unknown.iter().map(|(n, b)| (n.as_str(), b.as_str())));
    for (name, body) in all {
        block.push(format!("/* docx2md:{name} */"));
        block.extend(body.lines().map(str::to_string));
        block.push(format!("/* docx2md:{name}:end */"));
    }
    block.push("</style>".to_string());

    match existing {
        Some(range) => {
            lines.splice(range, block);
        }
        None => {
            // Keep a trailing newline at the very end of the file.
            let at = if lines.last().is_some_and(|l| l.is_empty()) {
                lines.len() - 1
            } else {
                lines.len()
            };
            let mut insert = Vec::with_capacity(block.len() + 1);
            if at > 0 && !lines[at - 1].trim().is_empty() {
                insert.push(String::new());
            }
            insert.extend(block);
            lines.splice(at..at, insert);
        }
    }
}

/// Line range of the existing block: the marker through `</style>`, or just
/// the marker when no `<style>` follows it. An unterminated `<style>` owns
/// everything up to the end of the document (bar its trailing newline).
fn find_block(lines: &[String]) -> Option<std::ops::Range<usize>> {
    let m = lines.iter().position(|l| l.trim() == STYLE_MARKER)?;
    if lines.get(m + 1).map(|l| l.trim()) != Some("<style>") {
        return Some(m..m + 1);
    }
    match lines[m + 2..].iter().position(|l| l.trim() == "</style>") {
        Some(k) => Some(m..m + 2 + k + 1),
        None if lines.len() > m + 2 && lines.last().is_some_and(|l| l.is_empty()) => {
            Some(m..lines.len() - 1)
        }
        None => Some(m..lines.len()),
    }
}

fn parse_fragments(block: &[String]) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < block.len() {
        let Some(caps) = RE_FRAGMENT_OPEN.captures(block[i].trim()) else {
            i += 1;
            continue;
        };
        let name = caps[1].to_string();
        let end = format!("/* docx2md:{name}:end */");
        match block[i + 1..].iter().position(|l| l.trim() == end) {
            Some(k) => {
                let body = block[i + 1..i + 1 + k].join("\n");
                out.push((name, body));
                i += k + 2;
            }
            None => i += 1,
        }
    }
    out
}
