//! Unique destination names inside a shared directory.
//!
//! Several documents converted in parallel may write into the same image
//! directory. [`NameResolver::reserve`] claims a name by creating the file
//! with `create_new`, so two workers can never end up owning the same path
//! and no file that existed before the run is ever overwritten.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

/// Maximum counter tried before giving up on a desired name.
const MAX_SUFFIX: u32 = 10_000;

/// Picks collision-free file names in one directory.
#[derive(Debug)]
pub struct NameResolver {
    dir: PathBuf,
    taken: HashSet<String>,
}

impl NameResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            taken: HashSet::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The name `desired` would get right now, without claiming it.
    ///
    /// Returns `desired` when free, otherwise `{stem}_{n}{ext}` with the
    /// lowest free `n >= 1`.
    pub fn resolve(&self, desired: &str) -> String {
        candidates(desired)
            .find(|name| !self.taken.contains(name) && !self.dir.join(name).exists())
            .unwrap_or_else(|| desired.to_string())
    }

    /// Claim a free name derived from `desired` and create an empty file
    /// for it.
    ///
    /// The returned path is owned by the caller, who is expected to fill it
    /// (or remove it on failure).
    pub fn reserve(&mut self, desired: &str) -> io::Result<(String, PathBuf)> {
        for name in candidates(desired) {
            if self.taken.contains(&name) {
                continue;
            }
            let path = self.dir.join(&name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    self.taken.insert(name.clone());
                    return Ok((name, path));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    self.taken.insert(name);
                }
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free name derived from '{desired}'"),
        ))
    }
}

fn candidates(desired: &str) -> impl Iterator<Item = String> + '_ {
    let (stem, ext) = split_name(desired);
    std::iter::once(desired.to_string())
        .chain((1..=MAX_SUFFIX).map(move |n| format!("{stem}_{n}{ext}")))
}

/// Split `image.png` into `("image", ".png")`. Dotfiles have no extension.
fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

/// Replace characters that are unsafe in file names on common platforms.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Like [`sanitize_filename`], also turning whitespace into `_` so the name
/// can appear in a Markdown link target unencoded.
pub fn sanitize_image_name(name: &str) -> String {
    sanitize_filename(name)
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}
