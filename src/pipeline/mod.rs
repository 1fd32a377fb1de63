//! Pipeline stages for DOCX-to-Markdown conversion.
//!
//! Each submodule implements exactly one transformation step or one of the
//! collaborators around it. Keeping stages separate makes each independently
//! testable and lets us swap the external tools (pandoc, ImageMagick) without
//! touching the text passes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ converter ──▶ postprocess ──────────────────────────────────────▶ output
//! (docx)    (pandoc)      scan → relocate → caption → links → toc → styles    (.md + images/)
//! ```
//!
//! 1. [`input`]      — validate the source container and compute the output path
//! 2. [`converter`]  — run the external converter; the only stage that produces
//!    Markdown from binary input
//! 3. [`postprocess`] — the in-memory stage machine that drives the passes below
//!    in their required order:
//!    - [`lines`]     — line tokenizer and table-state tracker
//!    - [`scan`]      — image reference recognition
//!    - [`relocate`]  — copy images into the output image directory, using
//!      [`collision`] for unique names and [`transcode`] for vector formats
//!    - [`caption`]   — bind caption lines to figures and tables
//!    - [`links`]     — percent-encode link targets and apply the path map
//!    - [`toc`]       — heading anchors and the table of contents
//!    - [`styles`]    — upsert the sentinel-marked style block

pub mod caption;
pub mod collision;
pub mod converter;
pub mod input;
pub mod lines;
pub mod links;
pub mod postprocess;
pub mod relocate;
pub mod scan;
pub mod styles;
pub mod toc;
pub mod transcode;
