//! Progress-callback trait for per-document conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as a batch moves through its documents and each document moves
//! through the post-processing stages.
//!
//! # Example
//!
//! ```rust
//! use docx2md::{ConversionProgressCallback, ConversionConfig, DocumentReport};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, index: usize, total: usize, report: &DocumentReport) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {:?}", index + 1, total, report.outcome);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::DocumentReport;
use crate::pipeline::postprocess::Stage;
use std::path::Path;
use std::sync::Arc;

/// Called by the conversion entry points as work progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// With `concurrency > 1`, document-level and stage-level events for
/// different documents may arrive concurrently from different threads.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before any document is started.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a document is picked up. `index` is 0-based.
    fn on_document_start(&self, index: usize, total: usize, source: &Path) {
        let _ = (index, total, source);
    }

    /// Called after each post-processing stage of `source` completes.
    fn on_stage_complete(&self, source: &Path, stage: Stage) {
        let _ = (source, stage);
    }

    /// Called when a document finishes, successfully or not.
    fn on_document_complete(&self, index: usize, total: usize, report: &DocumentReport) {
        let _ = (index, total, report);
    }

    /// Called once after every started document has finished.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
