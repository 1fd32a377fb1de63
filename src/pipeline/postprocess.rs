//! Post-processing: turn converter Markdown into the publication artifact.
//!
//! ## Why a fixed stage order?
//!
//! The passes feed each other:
//!
//! - Captions can only be bound once an image has a final path, so
//!   relocation runs first.
//! - Links are normalised after relocation so the path map is complete.
//! - Anchors and the TOC come after captions have reshaped the document.
//! - Styles go last because their categories depend on what the earlier
//!   passes produced.
//!
//! [`postprocess`] drives them as a small stage machine, reporting each
//! completed stage to the caller. It never fails: everything that can go
//! wrong for one image, caption or stylesheet becomes a [`PassWarning`].

use crate::error::PassWarning;
use crate::output::PlacedImage;
use crate::pipeline::caption::{promote_captions, CaptionOptions};
use crate::pipeline::lines::{classify, Document, LineKind, FIGURE_OPEN};
use crate::pipeline::links::normalize_links;
use crate::pipeline::relocate::{relocate_images, RelocationContext};
use crate::pipeline::styles::{inject_styles, StyleCategory, StyleSheets};
use crate::pipeline::toc::build_anchors_and_toc;
use crate::pipeline::transcode::ImageTranscoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// One step of the post-processing stage machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Scanning,
    Relocating,
    CaptionPromoting,
    LinkNormalizing,
    AnchorBuilding,
    StyleInjecting,
    Done,
}

impl Stage {
    /// The stage that follows this one. `Done` is terminal.
    pub fn next(self) -> Stage {
        match self {
            Stage::Scanning => Stage::Relocating,
            Stage::Relocating => Stage::CaptionPromoting,
            Stage::CaptionPromoting => Stage::LinkNormalizing,
            Stage::LinkNormalizing => Stage::AnchorBuilding,
            Stage::AnchorBuilding => Stage::StyleInjecting,
            Stage::StyleInjecting | Stage::Done => Stage::Done,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Scanning => "scanning",
            Stage::Relocating => "relocating images",
            Stage::CaptionPromoting => "promoting captions",
            Stage::LinkNormalizing => "normalizing links",
            Stage::AnchorBuilding => "building anchors",
            Stage::StyleInjecting => "injecting styles",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Which style categories the document needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassFlags {
    pub figures: bool,
    pub tables: bool,
}

impl PassFlags {
    pub fn active(self) -> Vec<StyleCategory> {
        StyleCategory::ALL
            .into_iter()
            .filter(|c| match c {
                StyleCategory::Figures => self.figures,
                StyleCategory::Tables => self.tables,
            })
            .collect()
    }
}

/// Inputs of one post-processing run.
#[derive(Clone, Copy)]
pub struct PostprocessContext<'a> {
    pub doc_dir: &'a Path,
    pub media_dir: &'a Path,
    pub images_dir: &'a Path,
    pub run_stamp: &'a str,
    pub transcoder: Option<&'a dyn ImageTranscoder>,
    pub transcode_extensions: &'a [String],
    pub styles: &'a StyleSheets,
    pub generate_toc: bool,
    pub toc_title: &'a str,
    pub default_caption: &'a str,
    pub caption_lookahead: usize,
}

#[derive(Debug, Default)]
pub struct PostprocessOutput {
    pub markdown: String,
    pub images: Vec<PlacedImage>,
    pub warnings: Vec<PassWarning>,
    pub flags: PassFlags,
}

/// Run every pass over `markdown`, calling `on_stage` after each one.
pub fn postprocess(
    markdown: &str,
    ctx: &PostprocessContext<'_>,
    on_stage: &mut dyn FnMut(Stage),
) -> PostprocessOutput {
    let mut out = PostprocessOutput::default();
    let mut doc = Document::default();
    let mut kinds: Vec<LineKind> = Vec::new();
    let mut figures: BTreeMap<usize, String> = BTreeMap::new();
    let mut path_map: BTreeMap<String, String> = BTreeMap::new();

    let mut stage = Stage::Scanning;
    while stage != Stage::Done {
        match stage {
            // ── Tokenize ─────────────────────────────────────────────────
            Stage::Scanning => {
                doc = Document::from_text(markdown);
                kinds = classify(doc.lines());
                out.flags.tables = kinds.contains(&LineKind::Table);
                debug!(lines = doc.lines().len(), "document scanned");
            }

            // ── Relocate images ──────────────────────────────────────────
            Stage::Relocating => {
                let rctx = RelocationContext {
                    doc_dir: ctx.doc_dir,
                    media_dir: ctx.media_dir,
                    images_dir: ctx.images_dir,
                    run_stamp: ctx.run_stamp,
                    transcoder: ctx.transcoder,
                    transcode_extensions: ctx.transcode_extensions,
                };
                let r = relocate_images(doc.lines_mut(), &kinds, &rctx);
                debug!(placed = r.images.len(), warnings = r.warnings.len(), "images relocated");
                out.images = r.images;
                out.warnings.extend(r.warnings);
                figures = r.figures;
                path_map = r.path_map;
            }

            // ── Captions ─────────────────────────────────────────────────
            Stage::CaptionPromoting => {
                let p = promote_captions(
                    std::mem::take(doc.lines_mut()),
                    &kinds,
                    &figures,
                    CaptionOptions {
                        default_caption: ctx.default_caption,
                        lookahead: ctx.caption_lookahead,
                    },
                );
                debug!(captions = p.captions.len(), "captions promoted");
                doc = Document::from(p.lines);
                out.warnings.extend(p.warnings);
                out.flags.figures = doc.lines().iter().any(|l| l.trim() == FIGURE_OPEN);
            }

            // ── Links ────────────────────────────────────────────────────
            Stage::LinkNormalizing => {
                normalize_links(doc.lines_mut(), &path_map);
            }

            // ── Anchors and TOC ──────────────────────────────────────────
            Stage::AnchorBuilding => {
                if ctx.generate_toc {
                    let toc = build_anchors_and_toc(doc.lines_mut(), Some(ctx.toc_title));
                    debug!(headings = toc.headings.len(), rebuilt = toc.toc_rebuilt, "anchors built");
                    out.warnings.extend(toc.warnings);
                }
            }

            // ── Styles ───────────────────────────────────────────────────
            Stage::StyleInjecting => {
                let mut fragments = Vec::new();
                for category in out.flags.active() {
                    match ctx.styles.load(category) {
                        Ok(css) => fragments.push((category, css)),
                        Err(w) => out.warnings.push(w),
                    }
                }
                inject_styles(doc.lines_mut(), &fragments);
            }

            Stage::Done => break,
        }
        on_stage(stage);
        stage = stage.next();
    }
    on_stage(Stage::Done);

    out.markdown = doc.to_text();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct Env {
        _root: tempfile::TempDir,
        doc_dir: std::path::PathBuf,
        media_dir: std::path::PathBuf,
        styles: StyleSheets,
    }

    impl Env {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let doc_dir = root.path().join("out");
            let media_dir = root.path().join("media");
            fs::create_dir_all(media_dir.join("media")).unwrap();
            fs::create_dir_all(&doc_dir).unwrap();
            Self {
                _root: root,
                doc_dir,
                media_dir,
                styles: StyleSheets::builtin(),
            }
        }

        fn run(&self, markdown: &str, stages: &mut Vec<Stage>) -> PostprocessOutput {
            let images_dir = self.doc_dir.join("images");
            let exts: Vec<String> = Vec::new();
            let ctx = PostprocessContext {
                doc_dir: &self.doc_dir,
                media_dir: &self.media_dir,
                images_dir: &images_dir,
                run_stamp: "20250101_120000",
                transcoder: None,
                transcode_extensions: &exts,
                styles: &self.styles,
                generate_toc: true,
                toc_title: "Оглавление",
                default_caption: "Изображение",
                caption_lookahead: 3,
            };
            postprocess(markdown, &ctx, &mut |s| stages.push(s))
        }
    }

    #[test]
    fn stages_run_in_order() {
        let env = Env::new();
        let mut stages = Vec::new();
        env.run("text\n", &mut stages);
        assert_eq!(
            stages,
            vec![
                Stage::Scanning,
                Stage::Relocating,
                Stage::CaptionPromoting,
                Stage::LinkNormalizing,
                Stage::AnchorBuilding,
                Stage::StyleInjecting,
                Stage::Done,
            ]
        );
    }

    #[test]
    fn figure_document_gets_figure_styles_only() {
        let env = Env::new();
        fs::write(env.media_dir.join("media").join("a.png"), b"a").unwrap();
        let out = env.run("# Оглавление\n\n# Intro\n\n![](a.png)\n\nРисунок 1 – Схема\n", &mut Vec::new());
        assert!(out.flags.figures);
        assert!(!out.flags.tables);
        assert!(out.markdown.contains(r#"<span class="figure-caption">Схема</span>"#));
        assert!(out.markdown.contains("/* docx2md:figures */"));
        assert!(!out.markdown.contains("/* docx2md:tables */"));
        assert!(out.markdown.contains("- [Intro](#intro)"));
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
    }

    #[test]
    fn output_is_stable_across_runs() {
        let env = Env::new();
        fs::write(env.media_dir.join("media").join("a.png"), b"a").unwrap();
        let md = "# Оглавление\n\n# Intro\n\n![](a.png)\n\nРисунок 1 – Схема\n\n| a | b |\n|---|---|\n";
        let first = env.run(md, &mut Vec::new());
        let second = env.run(&first.markdown, &mut Vec::new());
        assert_eq!(first.markdown, second.markdown);
        assert!(second.images.is_empty());
    }

    #[test]
    fn crlf_input_is_normalised() {
        let env = Env::new();
        let out = env.run("# Оглавление\r\n# A\r\n", &mut Vec::new());
        assert!(!out.markdown.contains('\r'));
    }

    #[test]
    fn stage_next_is_terminal_at_done() {
        assert_eq!(Stage::StyleInjecting.next(), Stage::Done);
        assert_eq!(Stage::Done.next(), Stage::Done);
    }
}
