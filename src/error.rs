//! Error types for the docx2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Docx2MdError`] — **Fatal** for one document: the source cannot be read,
//!   the converter failed, or the Markdown artifact cannot be written.
//!   Returned as `Err(Docx2MdError)` from [`crate::convert::convert_file`] and
//!   recorded as a `Failed` outcome inside a batch.
//!
//! * [`PassWarning`] — **Non-fatal**: a single image, caption or stylesheet
//!   could not be handled, but the document still completes. Collected in
//!   [`crate::output::DocumentReport::warnings`] and downgrades the outcome to
//!   `PartialSuccessWithWarnings`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docx2md library.
///
/// A fatal error only ever affects the document it was raised for; sibling
/// documents in a batch keep going.
#[derive(Debug, Error)]
pub enum Docx2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a DOCX (zip) container.
    #[error("File is not a valid DOCX: '{path}'\nFirst bytes: {magic:?}")]
    NotADocx { path: PathBuf, magic: [u8; 4] },

    /// The Markdown artifact already exists and overwriting is disabled.
    #[error("Output file already exists: '{path}'\nPass --overwrite to replace it.")]
    OutputExists { path: PathBuf },

    /// The output directory cannot be created or is read-only.
    #[error("Output directory is not writable: '{path}': {detail}")]
    OutputNotWritable { path: PathBuf, detail: String },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The external converter binary could not be started.
    #[error("Converter '{program}' was not found.\nInstall pandoc: https://pandoc.org/installing.html")]
    ConverterNotFound { program: String },

    /// The external converter ran but reported a failure.
    #[error("Conversion of '{path}' failed: {message}")]
    ConversionFailed { path: PathBuf, message: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read an intermediate or pre-converted Markdown file.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal problem raised by one of the post-processing passes.
///
/// The affected reference, caption or fragment is skipped; the rest of the
/// document is processed normally.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PassWarning {
    /// No candidate location held the referenced image.
    #[error("Image '{image}' not found in the media directory or next to the document")]
    ImageNotFound { image: String },

    /// The vector image could not be turned into a raster one.
    #[error("Could not transcode '{image}': {detail}")]
    TranscodeFailed { image: String, detail: String },

    /// Reserving or copying the destination file failed.
    #[error("Could not copy '{image}' into the image directory: {detail}")]
    CopyFailed { image: String, detail: String },

    /// A caption line had no adjacent figure or table and was dropped.
    #[error("Line {line}: caption '{text}' has no adjacent figure or table; dropped")]
    OrphanCaption { line: usize, text: String },

    /// TOC generation was requested but the placeholder heading is absent.
    #[error("TOC placeholder heading '{title}' not found; table of contents not rebuilt")]
    TocPlaceholderMissing { title: String },

    /// The stylesheet for an active category could not be loaded.
    #[error("Stylesheet for '{category}' missing at '{path}'; styles omitted")]
    StylesheetMissing { category: String, path: PathBuf },
}
