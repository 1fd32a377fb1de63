//! Image relocation: copy every referenced image into the output image
//! directory under a unique, stamped name and rewrite the reference.

use crate::error::PassWarning;
use crate::output::PlacedImage;
use crate::pipeline::collision::{sanitize_image_name, NameResolver};
use crate::pipeline::lines::LineKind;
use crate::pipeline::scan::{scan_line, strip_query};
use crate::pipeline::transcode::{needs_transcode, ImageTranscoder};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Everything the relocation pass needs from its run.
#[derive(Clone, Copy)]
pub struct RelocationContext<'a> {
    /// Directory the Markdown file lives in; references are made relative
    /// to it.
    pub doc_dir: &'a Path,
    /// Media directory the converter extracted into.
    pub media_dir: &'a Path,
    /// Destination image directory. Created on first placement.
    pub images_dir: &'a Path,
    pub run_stamp: &'a str,
    pub transcoder: Option<&'a dyn ImageTranscoder>,
    pub transcode_extensions: &'a [String],
}

/// Outcome of [`relocate_images`].
#[derive(Debug, Default)]
pub struct Relocation {
    pub images: Vec<PlacedImage>,
    /// Raw source → new relative reference, for the link pass.
    pub path_map: BTreeMap<String, String>,
    /// Line index → relative reference, for every [`LineKind::Image`] line
    /// whose leading reference now points into the image directory.
    pub figures: BTreeMap<usize, String>,
    pub warnings: Vec<PassWarning>,
}

/// Relocate every reference on every line of `lines`, in place.
///
/// Failures are isolated per reference: the reference stays untouched and a
/// warning is recorded. A source seen twice in one document is placed once.
pub fn relocate_images(
    lines: &mut [String],
    kinds: &[LineKind],
    ctx: &RelocationContext<'_>,
) -> Relocation {
    let mut out = Relocation::default();
    let mut resolver = NameResolver::new(ctx.images_dir);
    let mut placed: HashMap<String, Option<String>> = HashMap::new();

    for (i, line) in lines.iter_mut().enumerate() {
        let refs = scan_line(line, i);
        if refs.is_empty() {
            continue;
        }

        let mut edits: Vec<(Range<usize>, String)> = Vec::new();
        for (n, r) in refs.iter().enumerate() {
            let relative = match placed.get(&r.raw_source) {
                Some(cached) => cached.clone(),
                None => {
                    let result = place(&r.raw_source, ctx, &mut resolver, &mut out);
                    placed.insert(r.raw_source.clone(), result.clone());
                    result
                }
            };
            let Some(relative) = relative else {
                continue;
            };

            if n == 0 && kinds.get(i) == Some(&LineKind::Image) {
                out.figures.insert(i, relative.clone());
            }
            if relative != r.raw_source {
                let suffix = &r.raw_source[strip_query(&r.raw_source).len()..];
                edits.push((r.source_span.clone(), format!("{relative}{suffix}")));
            }
        }

        // Right to left so earlier spans stay valid.
        for (span, replacement) in edits.into_iter().rev() {
            line.replace_range(span, &replacement);
        }
    }

    out
}

/// Place one raw source and return its new relative reference.
fn place(
    raw: &str,
    ctx: &RelocationContext<'_>,
    resolver: &mut NameResolver,
    out: &mut Relocation,
) -> Option<String> {
    let path_part = strip_query(raw);

    // Already inside the image directory: an earlier run placed it.
    let local = ctx.doc_dir.join(path_part);
    if local.is_file() && local.starts_with(ctx.images_dir) {
        debug!(source = raw, "reference already relocated");
        return Some(path_part.to_string());
    }

    let name = path_part.rsplit(['/', '\\']).next().unwrap_or(path_part);
    let Some(found) = locate(ctx, name) else {
        warn!(source = raw, "image not found");
        out.warnings.push(PassWarning::ImageNotFound {
            image: raw.to_string(),
        });
        return None;
    };

    let ext = found
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let (copy_from, ext) = if needs_transcode(&ext, ctx.transcode_extensions) {
        let Some(transcoder) = ctx.transcoder else {
            out.warnings.push(PassWarning::TranscodeFailed {
                image: raw.to_string(),
                detail: "no transcoder configured".to_string(),
            });
            return None;
        };
        match transcoder.transcode(&found) {
            Ok(png) => (png, "png".to_string()),
            Err(e) => {
                warn!(source = raw, error = %e, "transcode failed");
                out.warnings.push(PassWarning::TranscodeFailed {
                    image: raw.to_string(),
                    detail: e.to_string(),
                });
                return None;
            }
        }
    } else {
        (found.clone(), ext)
    };

    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let desired = if ext.is_empty() {
        sanitize_image_name(&format!("{stem}_{}", ctx.run_stamp))
    } else {
        sanitize_image_name(&format!("{stem}_{}.{ext}", ctx.run_stamp))
    };

    let dest = match reserve_and_copy(resolver, &desired, &copy_from) {
        Ok(dest) => dest,
        Err(e) => {
            warn!(source = raw, error = %e, "copy failed");
            out.warnings.push(PassWarning::CopyFailed {
                image: raw.to_string(),
                detail: e.to_string(),
            });
            return None;
        }
    };

    let relative = relative_reference(ctx.doc_dir, &dest);
    debug!(source = raw, dest = %dest.display(), "image relocated");
    out.path_map.insert(raw.to_string(), relative.clone());
    out.images.push(PlacedImage {
        source_path: found,
        dest_path: dest,
        relative_reference: relative.clone(),
    });
    Some(relative)
}

/// Candidate locations, in order: `<media>/media/<name>`, `<media>/<name>`,
/// `<doc_dir>/<name>`.
fn locate(ctx: &RelocationContext<'_>, name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    [
        ctx.media_dir.join("media").join(name),
        ctx.media_dir.join(name),
        ctx.doc_dir.join(name),
    ]
    .into_iter()
    .find(|p| p.is_file())
}

fn reserve_and_copy(resolver: &mut NameResolver, desired: &str, from: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(resolver.dir())?;
    let (_, dest) = resolver.reserve(desired)?;
    if let Err(e) = copy_preserving(from, &dest) {
        let _ = fs::remove_file(&dest);
        return Err(e);
    }
    Ok(dest)
}

/// Copy contents and permissions, then carry over the modification time.
fn copy_preserving(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to)?;
    if let Ok(modified) = fs::metadata(from).and_then(|m| m.modified()) {
        if let Ok(file) = fs::File::options().write(true).open(to) {
            let _ = file.set_modified(modified);
        }
    }
    Ok(())
}

/// `dest` relative to `doc_dir`, always with `/` separators.
fn relative_reference(doc_dir: &Path, dest: &Path) -> String {
    let rel = dest.strip_prefix(doc_dir).unwrap_or(dest);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::lines::{classify, Document};
    use crate::pipeline::transcode::TranscodeError;

    struct Fixture {
        _root: tempfile::TempDir,
        doc_dir: PathBuf,
        media_dir: PathBuf,
        images_dir: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let doc_dir = root.path().join("out");
            let media_dir = root.path().join("media_tmp");
            fs::create_dir_all(media_dir.join("media")).unwrap();
            fs::create_dir_all(&doc_dir).unwrap();
            let images_dir = doc_dir.join("images");
            Self {
                _root: root,
                doc_dir,
                media_dir,
                images_dir,
            }
        }

        fn media(&self, name: &str, body: &[u8]) {
            fs::write(self.media_dir.join("media").join(name), body).unwrap();
        }

        fn run(&self, text: &str, transcoder: Option<&dyn ImageTranscoder>) -> (Vec<String>, Relocation) {
            let mut lines = Document::from_text(text).into_lines();
            let kinds = classify(&lines);
            let exts = vec!["emf".to_string(), "wmf".to_string()];
            let ctx = RelocationContext {
                doc_dir: &self.doc_dir,
                media_dir: &self.media_dir,
                images_dir: &self.images_dir,
                run_stamp: "20250101_120000",
                transcoder,
                transcode_extensions: &exts,
            };
            let r = relocate_images(&mut lines, &kinds, &ctx);
            (lines, r)
        }
    }

    struct CopyToPng;

    impl ImageTranscoder for CopyToPng {
        fn transcode(&self, vector: &Path) -> Result<PathBuf, TranscodeError> {
            let out = vector.with_extension("png");
            fs::copy(vector, &out).map_err(|source| TranscodeError::Spawn {
                program: "copy".into(),
                source,
            })?;
            Ok(out)
        }
    }

    #[test]
    fn relocates_inline_reference_with_stamp() {
        let f = Fixture::new();
        f.media("image1.PNG", b"png");
        let (lines, r) = f.run("![](media/image1.PNG)", None);
        assert_eq!(lines[0], "![](images/image1_20250101_120000.png)");
        assert_eq!(r.images.len(), 1);
        assert_eq!(fs::read(f.images_dir.join("image1_20250101_120000.png")).unwrap(), b"png");
        assert_eq!(r.figures.get(&0).map(String::as_str), Some("images/image1_20250101_120000.png"));
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn file_name_with_space_is_found_and_sanitised() {
        let f = Fixture::new();
        f.media("my pic.png", b"png");
        let (lines, r) = f.run(r#"![](media/my pic.png "Title")"#, None);
        assert_eq!(lines[0], r#"![](images/my_pic_20250101_120000.png "Title")"#);
        assert!(r.warnings.is_empty());
        assert!(f.images_dir.join("my_pic_20250101_120000.png").exists());
    }

    #[test]
    fn vector_images_are_transcoded() {
        let f = Fixture::new();
        f.media("pic.emf", b"vec");
        let (lines, r) = f.run(r#"<img src="media/pic.emf" alt="x">"#, Some(&CopyToPng));
        assert_eq!(lines[0], r#"<img src="images/pic_20250101_120000.png" alt="x">"#);
        assert!(r.images[0].dest_path.ends_with("pic_20250101_120000.png"));
    }

    #[test]
    fn missing_transcoder_skips_vector_with_warning() {
        let f = Fixture::new();
        f.media("pic.wmf", b"vec");
        let (lines, r) = f.run("![](media/pic.wmf)", None);
        assert_eq!(lines[0], "![](media/pic.wmf)");
        assert!(matches!(r.warnings[0], PassWarning::TranscodeFailed { .. }));
        assert!(!f.images_dir.exists());
    }

    #[test]
    fn missing_image_is_left_untouched() {
        let f = Fixture::new();
        let (lines, r) = f.run("see ![](media/nope.png) here", None);
        assert_eq!(lines[0], "see ![](media/nope.png) here");
        assert!(matches!(r.warnings[0], PassWarning::ImageNotFound { .. }));
    }

    #[test]
    fn table_references_are_relocated_but_not_figures() {
        let f = Fixture::new();
        f.media("t.png", b"t");
        let (lines, r) = f.run("| ![](media/t.png) | x |\n|---|---|", None);
        assert_eq!(lines[0], "| ![](images/t_20250101_120000.png) | x |");
        assert!(r.figures.is_empty());
    }

    #[test]
    fn repeated_source_is_placed_once() {
        let f = Fixture::new();
        f.media("a.png", b"a");
        let (lines, r) = f.run("![](media/a.png) ![](media/a.png)", None);
        assert_eq!(
            lines[0],
            "![](images/a_20250101_120000.png) ![](images/a_20250101_120000.png)"
        );
        assert_eq!(r.images.len(), 1);
    }

    #[test]
    fn second_run_leaves_placed_references_alone() {
        let f = Fixture::new();
        f.media("a.png", b"a");
        let (lines, _) = f.run("![](media/a.png)", None);
        let (again, r) = f.run(&lines.join("\n"), None);
        assert_eq!(again, lines);
        assert!(r.images.is_empty());
        assert_eq!(fs::read_dir(&f.images_dir).unwrap().count(), 1);
    }

    #[test]
    fn existing_destination_gets_suffix() {
        let f = Fixture::new();
        f.media("a.png", b"new");
        fs::create_dir_all(&f.images_dir).unwrap();
        fs::write(f.images_dir.join("a_20250101_120000.png"), b"old").unwrap();
        let (lines, _) = f.run("![](media/a.png)", None);
        assert_eq!(lines[0], "![](images/a_20250101_120000_1.png)");
        assert_eq!(fs::read(f.images_dir.join("a_20250101_120000.png")).unwrap(), b"old");
    }

    #[test]
    fn query_suffix_survives_rewrite() {
        let f = Fixture::new();
        f.media("q.png", b"q");
        let (lines, r) = f.run("![](media/q.png?v=3)", None);
        assert_eq!(lines[0], "![](images/q_20250101_120000.png?v=3)");
        assert_eq!(r.path_map["media/q.png?v=3"], "images/q_20250101_120000.png");
    }
}
