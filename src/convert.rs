//! Conversion entry points: one document, a batch, or a Markdown file that
//! was already converted.
//!
//! ## Why spawn_blocking?
//!
//! Every document runs two kinds of blocking work: the converter and
//! transcoder child processes, and synchronous filesystem copies. Each
//! document therefore runs start to finish inside
//! [`tokio::task::spawn_blocking`], and a batch fans out over documents with
//! `buffer_unordered`. Within one document everything is sequential.

use crate::config::ConversionConfig;
use crate::error::Docx2MdError;
use crate::output::{BatchReport, DocumentOutcome, DocumentReport};
use crate::pipeline::converter::{ConverterError, ConverterOptions, DocumentConverter};
use crate::pipeline::postprocess::{postprocess, PostprocessContext, PostprocessOutput};
use crate::pipeline::styles::StyleSheets;
use crate::pipeline::transcode::ImageTranscoder;
use crate::pipeline::input;
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Cooperative cancellation flag for a batch.
///
/// Documents that have not started when the token is cancelled are skipped;
/// documents already running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State shared by every document of one run.
#[derive(Clone)]
struct RunShared {
    stamp: String,
    styles: Arc<StyleSheets>,
    converter: Arc<dyn DocumentConverter>,
    transcoder: Option<Arc<dyn ImageTranscoder>>,
}

impl RunShared {
    fn new(config: &ConversionConfig) -> Self {
        Self {
            stamp: config.run_stamp(),
            styles: Arc::new(config.style_sheets()),
            converter: config.converter(),
            transcoder: config.transcoder(),
        }
    }
}

/// Convert one DOCX file into `<output_dir>/<stem>.md`.
///
/// # Errors
/// Returns `Err(Docx2MdError)` only for fatal errors:
/// - source missing, unreadable, or not a DOCX container
/// - output exists and `overwrite` is off, or the output dir is not writable
/// - the converter is missing or failed
/// - the Markdown file cannot be written
///
/// Problems with single images, captions or stylesheets are reported as
/// warnings in the returned [`DocumentReport`].
pub async fn convert_file(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<DocumentReport, Docx2MdError> {
    let shared = RunShared::new(config);
    let source = input.as_ref().to_path_buf();
    let config = config.clone();
    join_blocking(tokio::task::spawn_blocking(move || {
        convert_blocking(&source, &config, &shared)
    }))
    .await
}

/// Run the post-processing passes over a Markdown file that was already
/// produced by the converter, rewriting it in place.
///
/// Images are looked up in `media_dir` (default: the file's own directory)
/// and relocated into `<file dir>/<images_dir_name>`.
pub async fn postprocess_file(
    markdown_path: impl AsRef<Path>,
    media_dir: Option<&Path>,
    config: &ConversionConfig,
) -> Result<DocumentReport, Docx2MdError> {
    let shared = RunShared::new(config);
    let path = markdown_path.as_ref().to_path_buf();
    let media_dir = media_dir.map(Path::to_path_buf);
    let config = config.clone();
    join_blocking(tokio::task::spawn_blocking(move || {
        postprocess_blocking(&path, media_dir.as_deref(), &config, &shared)
    }))
    .await
}

/// What a batch does with each input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchJob {
    Convert,
    Postprocess,
}

/// Convert every file of `inputs`, up to `config.concurrency` at a time.
///
/// Never fails as a whole: each document's fatal error becomes a `Failed`
/// report. Reports are returned in input order. One run stamp and one
/// stylesheet cache are shared by the whole batch.
pub async fn convert_batch(
    inputs: &[PathBuf],
    config: &ConversionConfig,
    cancel: &CancelToken,
) -> BatchReport {
    run_batch(inputs, config, cancel, BatchJob::Convert).await
}

/// [`postprocess_file`] over every Markdown file of `inputs`, with the same
/// concurrency, cancellation, progress events and shared run stamp as
/// [`convert_batch`]. Images are looked up next to each file.
pub async fn postprocess_batch(
    inputs: &[PathBuf],
    config: &ConversionConfig,
    cancel: &CancelToken,
) -> BatchReport {
    run_batch(inputs, config, cancel, BatchJob::Postprocess).await
}

async fn run_batch(
    inputs: &[PathBuf],
    config: &ConversionConfig,
    cancel: &CancelToken,
    job: BatchJob,
) -> BatchReport {
    let start = Instant::now();
    let total = inputs.len();
    info!("Starting batch of {} documents", total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let shared = RunShared::new(config);
    let mut results: Vec<(usize, PathBuf, Option<DocumentReport>)> =
        stream::iter(inputs.iter().cloned().enumerate().map(|(index, source)| {
            let config = config.clone();
            let shared = shared.clone();
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    debug!("Skipping {} (cancelled)", source.display());
                    return (index, source, None);
                }
                let report = run_document(index, total, source.clone(), job, config, shared).await;
                (index, source, Some(report))
            }
        }))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;
    results.sort_by_key(|(index, _, _)| *index);

    let mut batch = BatchReport::default();
    for (_, source, report) in results {
        match report {
            Some(report) => {
                if report.is_success() {
                    batch.success_count += 1;
                }
                batch.documents.push(report);
            }
            None => batch.cancelled.push(source),
        }
    }
    batch.total_duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Batch complete: {}/{} succeeded, {} cancelled, {}ms",
        batch.success_count,
        total,
        batch.cancelled.len(),
        batch.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, batch.success_count);
    }
    batch
}

/// Synchronous wrapper around [`convert_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_batch_sync(
    inputs: &[PathBuf],
    config: &ConversionConfig,
    cancel: &CancelToken,
) -> Result<BatchReport, Docx2MdError> {
    Ok(tokio::runtime::Runtime::new()
        .map_err(|e| Docx2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_batch(inputs, config, cancel)))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// One batch entry, with its progress events. Fatal errors become a
/// `Failed` report.
async fn run_document(
    index: usize,
    total: usize,
    source: PathBuf,
    job: BatchJob,
    config: ConversionConfig,
    shared: RunShared,
) -> DocumentReport {
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(index, total, &source);
    }
    let start = Instant::now();
    let callback = config.progress_callback.clone();

    let src = source.clone();
    let result = join_blocking(tokio::task::spawn_blocking(move || match job {
        BatchJob::Convert => convert_blocking(&src, &config, &shared),
        BatchJob::Postprocess => postprocess_blocking(&src, None, &config, &shared),
    }))
    .await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            warn!("Failed to process {}: {}", source.display(), e);
            DocumentReport::failed(source, e, start.elapsed().as_millis() as u64)
        }
    };
    if let Some(cb) = callback {
        cb.on_document_complete(index, total, &report);
    }
    report
}

async fn join_blocking(
    handle: tokio::task::JoinHandle<Result<DocumentReport, Docx2MdError>>,
) -> Result<DocumentReport, Docx2MdError> {
    handle
        .await
        .map_err(|e| Docx2MdError::Internal(format!("worker task failed: {e}")))?
}

fn convert_blocking(
    source: &Path,
    config: &ConversionConfig,
    shared: &RunShared,
) -> Result<DocumentReport, Docx2MdError> {
    let start = Instant::now();
    info!("Converting {}", source.display());

    // ── Step 1: Validate input and output ────────────────────────────────
    input::validate_source(source)?;
    let output = input::output_path(&config.output_dir, source);
    let claim = input::prepare_output(&config.output_dir, &output, config.overwrite)?;

    // ── Step 2: Run the converter into a private media dir ───────────────
    let media = tempfile::Builder::new()
        .prefix("docx2md-media-")
        .tempdir()
        .map_err(|e| Docx2MdError::Internal(format!("tempdir: {e}")))?;
    let options = ConverterOptions {
        toc: config.generate_toc,
        preserve_tabs: config.preserve_tabs,
        overwrite: config.overwrite,
    };
    let markdown = shared
        .converter
        .convert(source, media.path(), &options)
        .map_err(|e| map_converter_error(source, e))?;
    debug!("Converter produced {} bytes", markdown.len());

    // ── Step 3: Post-process ─────────────────────────────────────────────
    let processed = run_passes(
        &markdown,
        source,
        &config.output_dir,
        media.path(),
        &config.images_dir(),
        config,
        shared,
    );

    // ── Step 4: Write atomically ─────────────────────────────────────────
    write_atomic(&output, &processed.markdown)?;
    claim.commit();
    // `media` is dropped (and removed) here.

    let report = finish_report(source, output, processed, start);
    info!(
        "Converted {} → {} ({} images, {} warnings, {}ms)",
        source.display(),
        report.output.as_deref().map(|p| p.display().to_string()).unwrap_or_default(),
        report.images.len(),
        report.warnings.len(),
        report.duration_ms
    );
    Ok(report)
}

fn postprocess_blocking(
    path: &Path,
    media_dir: Option<&Path>,
    config: &ConversionConfig,
    shared: &RunShared,
) -> Result<DocumentReport, Docx2MdError> {
    let start = Instant::now();
    let markdown = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            Docx2MdError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            Docx2MdError::ReadFailed {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let doc_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let media_dir = media_dir.map(Path::to_path_buf).unwrap_or_else(|| doc_dir.clone());
    let images_dir = doc_dir.join(&config.images_dir_name);

    let processed = run_passes(&markdown, path, &doc_dir, &media_dir, &images_dir, config, shared);
    write_atomic(path, &processed.markdown)?;
    Ok(finish_report(path, path.to_path_buf(), processed, start))
}

fn run_passes(
    markdown: &str,
    source: &Path,
    doc_dir: &Path,
    media_dir: &Path,
    images_dir: &Path,
    config: &ConversionConfig,
    shared: &RunShared,
) -> PostprocessOutput {
    let ctx = PostprocessContext {
        doc_dir,
        media_dir,
        images_dir,
        run_stamp: &shared.stamp,
        transcoder: shared.transcoder.as_deref(),
        transcode_extensions: &config.transcode_extensions,
        styles: &shared.styles,
        generate_toc: config.generate_toc,
        toc_title: &config.toc_title,
        default_caption: &config.default_caption,
        caption_lookahead: config.caption_lookahead,
    };
    let callback = config.progress_callback.as_deref();
    postprocess(markdown, &ctx, &mut |stage| {
        debug!("{}: {} complete", source.display(), stage);
        if let Some(cb) = callback {
            cb.on_stage_complete(source, stage);
        }
    })
}

fn finish_report(
    source: &Path,
    output: PathBuf,
    processed: PostprocessOutput,
    start: Instant,
) -> DocumentReport {
    let outcome = if processed.warnings.is_empty() {
        DocumentOutcome::Success
    } else {
        DocumentOutcome::PartialSuccessWithWarnings
    };
    for w in &processed.warnings {
        warn!("{}: {}", source.display(), w);
    }
    DocumentReport {
        source: source.to_path_buf(),
        output: Some(output),
        outcome,
        warnings: processed.warnings,
        images: processed.images,
        flags: processed.flags,
        error: None,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

fn map_converter_error(source: &Path, e: ConverterError) -> Docx2MdError {
    match e {
        ConverterError::NotFound { program } => Docx2MdError::ConverterNotFound { program },
        other => Docx2MdError::ConversionFailed {
            path: source.to_path_buf(),
            message: other.to_string(),
        },
    }
}

/// Write to a temp file next to `path`, then rename over `path`.
fn write_atomic(path: &Path, contents: &str) -> Result<(), Docx2MdError> {
    let write_failed = |source: std::io::Error| Docx2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let prefix = format!(
        ".{}.",
        path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    );
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_failed)?;
    tmp.write_all(contents.as_bytes()).map_err(write_failed)?;
    tmp.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}
