//! Link normalisation: apply the relocation path map everywhere a path can
//! appear, and percent-encode spaces in ordinary link targets.

use crate::pipeline::scan::{split_title, strip_query};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(!?)\[([^\]]*)\]\(([^)]*)\)").unwrap());

static RE_IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(<img\s[^>]*?\bsrc\s*=\s*")([^"]*)(")"#).unwrap());

static RE_REF_DEF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*\[[^\]]+\]:\s*)(\S+)(.*)$").unwrap());

/// Look `target` up in `map`, by its full text first and then without its
/// `?query` / `#fragment`, which is kept on the result.
fn map_target(target: &str, map: &BTreeMap<String, String>) -> Option<String> {
    if let Some(hit) = map.get(target) {
        return Some(hit.clone());
    }
    let path = strip_query(target);
    map.get(path)
        .map(|hit| format!("{hit}{}", &target[path.len()..]))
}

/// Replace the destination of a link body (the path, not the title)
/// using `f`.
fn rewrite_body(body: &str, f: impl FnOnce(&str) -> Option<String>) -> Option<String> {
    let lead = body.len() - body.trim_start().len();
    let (token, _) = split_title(body);
    let new = f(token)?;
    Some(format!("{}{}{}", &body[..lead], new, &body[lead + token.len()..]))
}

/// Apply the old → new path map to inline images and links, `<img src>`
/// attributes, and reference-style definitions.
pub fn rewrite_paths(line: &str, map: &BTreeMap<String, String>) -> String {
    if map.is_empty() {
        return line.to_string();
    }

    let line = RE_LINK.replace_all(line, |c: &Captures| {
        let body = &c[3];
        match rewrite_body(body, |t| map_target(t, map)) {
            Some(body) => format!("{}[{}]({})", &c[1], &c[2], body),
            None => c[0].to_string(),
        }
    });
    let line = RE_IMG_SRC.replace_all(&line, |c: &Captures| match map_target(&c[2], map) {
        Some(src) => format!("{}{}{}", &c[1], src, &c[3]),
        None => c[0].to_string(),
    });
    let line = RE_REF_DEF.replace(&line, |c: &Captures| match map_target(&c[2], map) {
        Some(target) => format!("{}{}{}", &c[1], target, &c[3]),
        None => c[0].to_string(),
    });
    line.into_owned()
}

/// Turn literal spaces in non-image link targets into `%20`.
///
/// A quoted title after the target is left as written.
pub fn encode_link_targets(line: &str) -> String {
    RE_LINK
        .replace_all(line, |c: &Captures| {
            if !c[1].is_empty() {
                return c[0].to_string();
            }
            format!("[{}]({})", &c[2], encode_body(&c[3]))
        })
        .into_owned()
}

fn encode_body(body: &str) -> String {
    // `target "title"` / `target 'title'`: only the target part is encoded.
    let (target, title) = split_title(body);
    let encoded = target.replace(' ', "%20");
    match title {
        Some(title) => format!("{encoded} {title}"),
        None => encoded,
    }
}

/// Run both normalisations over every line.
pub fn normalize_links(lines: &mut [String], map: &BTreeMap<String, String>) {
    for line in lines.iter_mut() {
        if !line.contains("](") && !line.contains("<img") && !line.contains("]:") {
            continue;
        }
        let rewritten = encode_link_targets(&rewrite_paths(line, map));
        *line = rewritten;
    }
}
