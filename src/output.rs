//! Result types returned by the conversion entry points.

use crate::error::PassWarning;
use crate::pipeline::postprocess::PassFlags;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An image copied into the output image directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedImage {
    /// Where the image was found (the transcoder input for vector images).
    pub source_path: PathBuf,
    /// Unique destination inside the image directory.
    pub dest_path: PathBuf,
    /// The reference text written into the Markdown, `/`-separated and
    /// relative to the document directory.
    pub relative_reference: String,
}

/// How a single document ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOutcome {
    Success,
    PartialSuccessWithWarnings,
    Failed,
}

/// Everything known about one converted (or failed) document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub source: PathBuf,
    /// Path of the written Markdown file; `None` when the document failed.
    pub output: Option<PathBuf>,
    pub outcome: DocumentOutcome,
    pub warnings: Vec<PassWarning>,
    pub images: Vec<PlacedImage>,
    pub flags: PassFlags,
    /// Display form of the fatal error, for `Failed` documents.
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl DocumentReport {
    /// Report for a document that hit a fatal error.
    pub fn failed(source: PathBuf, error: impl ToString, duration_ms: u64) -> Self {
        Self {
            source,
            output: None,
            outcome: DocumentOutcome::Failed,
            warnings: Vec::new(),
            images: Vec::new(),
            flags: PassFlags::default(),
            error: Some(error.to_string()),
            duration_ms,
        }
    }

    /// `true` unless the document failed. Warnings still count as success.
    pub fn is_success(&self) -> bool {
        self.outcome != DocumentOutcome::Failed
    }
}

/// Result of a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    /// Documents that produced an artifact (with or without warnings).
    pub success_count: usize,
    /// One report per started document, in input order.
    pub documents: Vec<DocumentReport>,
    /// Documents skipped because the batch was cancelled before they started.
    pub cancelled: Vec<PathBuf>,
    pub total_duration_ms: u64,
}

impl BatchReport {
    pub fn failed_count(&self) -> usize {
        self.documents.iter().filter(|d| !d.is_success()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.documents.iter().map(|d| d.warnings.len()).sum()
    }
}
