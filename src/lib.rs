//! # docx2md
//!
//! Convert Word documents (DOCX) into self-contained Markdown publications.
//!
//! ## Why this crate?
//!
//! pandoc does the heavy lifting of reading DOCX, but its raw GFM output is
//! not something you can publish: images sit in a scratch directory under
//! generic names, captions are loose paragraphs, there is no table of
//! contents, and vector EMF/WMF images do not render anywhere. This crate
//! runs pandoc and then post-processes its output into a stable artifact:
//! images are relocated without collisions, captions become semantic markup,
//! headings get anchors and a TOC, and the styles those need are injected. Every
//! pass is idempotent, so re-running over an artifact changes nothing.
//!
//! ## Pipeline Overview
//!
//! ```text
//! DOCX
//!  │
//!  ├─ 1. Input     validate container, compute <output>/<stem>.md
//!  ├─ 2. Convert   pandoc → GFM + extracted media (spawn_blocking)
//!  ├─ 3. Relocate  copy images into <output>/images/, unique stamped names
//!  ├─ 4. Captions  figure / table captions → HTML wrappers
//!  ├─ 5. Links     %20-encode targets, apply the relocation path map
//!  ├─ 6. TOC       heading anchors + regenerated table of contents
//!  ├─ 7. Styles    upsert the sentinel-marked <style> block
//!  └─ 8. Output    atomic write + per-document report
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docx2md::{convert_file, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder().output_dir("out").build()?;
//!     let report = convert_file("report.docx", &config).await?;
//!     println!("{:?}: {} images", report.outcome, report.images.len());
//!     for w in &report.warnings {
//!         eprintln!("warning: {w}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docx2md` binary (clap + anyhow + tracing-subscriber + indicatif + walkdir) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! docx2md = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! | Tool | Used for | Replace with |
//! |------|----------|--------------|
//! | `pandoc` | DOCX → GFM | any [`DocumentConverter`] |
//! | `magick` | EMF/WMF → PNG | any [`ImageTranscoder`], or disable transcoding |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{
    convert_batch, convert_batch_sync, convert_file, postprocess_batch, postprocess_file, CancelToken,
};
pub use error::{Docx2MdError, PassWarning};
pub use output::{BatchReport, DocumentOutcome, DocumentReport, PlacedImage};
pub use pipeline::converter::{ConverterError, ConverterOptions, DocumentConverter, PandocConverter};
pub use pipeline::postprocess::{PassFlags, Stage};
pub use pipeline::transcode::{ImageTranscoder, MagickTranscoder, TranscodeError};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
