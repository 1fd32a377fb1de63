//! CLI binary for docx2md.
//!
//! A thin shim over the library crate that expands inputs, maps CLI flags
//! to `ConversionConfig` and prints per-document results.

use anyhow::{Context, Result};
use clap::Parser;
use docx2md::pipeline::input::is_docx;
use docx2md::{
    convert_batch, postprocess_batch, BatchReport, CancelToken, ConversionConfig,
    ConversionProgressCallback, DocumentOutcome, DocumentReport, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the batch, one log line per
/// finished document. Documents may finish out of order when
/// `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total} document(s)…"))
        ));
    }

    fn on_document_start(&self, _index: usize, _total: usize, source: &Path) {
        self.bar.set_message(file_label(source));
    }

    fn on_document_complete(&self, index: usize, total: usize, report: &DocumentReport) {
        self.bar.println(report_line(index, total, report));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _total: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn report_line(index: usize, total: usize, report: &DocumentReport) -> String {
    let elapsed = dim(&format!("{:.1}s", report.duration_ms as f64 / 1000.0));
    match report.outcome {
        DocumentOutcome::Success => format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            green("✓"),
            index + 1,
            total,
            file_label(&report.source),
            dim(&format!("{} images", report.images.len())),
            elapsed,
        ),
        DocumentOutcome::PartialSuccessWithWarnings => {
            let mut line = format!(
                "  {} {:>3}/{:<3}  {}  {}  {}",
                yellow("⚠"),
                index + 1,
                total,
                file_label(&report.source),
                yellow(&format!("{} warnings", report.warnings.len())),
                elapsed,
            );
            for w in &report.warnings {
                line.push_str(&format!("\n      {}", dim(&w.to_string())));
            }
            line
        }
        DocumentOutcome::Failed => {
            let error = report.error.clone().unwrap_or_default();
            // First line only; the rest is the remediation hint.
            let msg = error.lines().next().unwrap_or_default().to_string();
            format!(
                "  {} {:>3}/{:<3}  {}  {}  {}",
                red("✗"),
                index + 1,
                total,
                file_label(&report.source),
                red(&msg),
                elapsed,
            )
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one document next to the current directory
  docx2md report.docx

  # Convert a whole folder (recursively) into out/
  docx2md docs/ -o out

  # Four documents at a time, replacing existing output
  docx2md docs/ -o out --concurrency 4 --overwrite

  # English TOC heading and default caption
  docx2md --toc-title "Contents" --default-caption "Figure" report.docx

  # Custom stylesheets (figures.css / tables.css)
  docx2md --styles-dir ./styles report.docx

  # Re-run the post-processing passes over an existing Markdown file
  docx2md --postprocess out/report.md

  # Machine-readable batch report
  docx2md --json docs/ -o out > report.json

OUTPUT LAYOUT:
  <output-dir>/<name>.md          one Markdown file per input document
  <output-dir>/images/            relocated images, unique stamped names

EXTERNAL TOOLS:
  pandoc        DOCX → Markdown conversion (required)
  magick        EMF/WMF → PNG transcoding (optional; use --no-transcode)

ENVIRONMENT VARIABLES:
  DOCX2MD_*     every flag has a DOCX2MD_<FLAG> fallback, e.g. DOCX2MD_OUTPUT_DIR
  RUST_LOG      tracing filter, overrides -v / -q
"#;

/// Convert Word documents to self-contained Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "docx2md",
    version,
    about = "Convert DOCX documents to self-contained Markdown",
    long_about = "Convert DOCX documents to Markdown with pandoc, then relocate images, \
promote figure and table captions, build heading anchors and a table of contents, and \
inject the matching styles. Re-running over the output changes nothing.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// DOCX files or folders (folders are searched recursively).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for the Markdown files and the images folder.
    #[arg(short, long, env = "DOCX2MD_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Name of the images folder inside the output directory.
    #[arg(long, env = "DOCX2MD_IMAGES_DIR", default_value = "images")]
    images_dir: String,

    /// Skip heading anchors and the table of contents.
    #[arg(long, env = "DOCX2MD_NO_TOC")]
    no_toc: bool,

    /// Heading whose section is regenerated as the table of contents.
    #[arg(long, env = "DOCX2MD_TOC_TITLE", default_value = "Оглавление")]
    toc_title: String,

    /// Caption for figures that have none.
    #[arg(long, env = "DOCX2MD_DEFAULT_CAPTION", default_value = "Изображение")]
    default_caption: String,

    /// Replace existing Markdown files.
    #[arg(long, env = "DOCX2MD_OVERWRITE")]
    overwrite: bool,

    /// Keep tab characters instead of expanding them.
    #[arg(long, env = "DOCX2MD_PRESERVE_TABS")]
    preserve_tabs: bool,

    /// Directory with figures.css / tables.css (default: built-in styles).
    #[arg(long, env = "DOCX2MD_STYLES_DIR")]
    styles_dir: Option<PathBuf>,

    /// pandoc executable.
    #[arg(long, env = "DOCX2MD_PANDOC", default_value = "pandoc")]
    pandoc: String,

    /// ImageMagick executable used for EMF/WMF images.
    #[arg(long, env = "DOCX2MD_TRANSCODER", default_value = "magick")]
    transcoder: String,

    /// Do not transcode vector images; they are skipped with a warning.
    #[arg(long, env = "DOCX2MD_NO_TRANSCODE")]
    no_transcode: bool,

    /// Documents converted at once.
    #[arg(short, long, env = "DOCX2MD_CONCURRENCY", default_value_t = 1,
          value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: u16,

    /// Suffix for relocated image names (default: local time, YYYYMMDD_HHMMSS).
    #[arg(long, env = "DOCX2MD_TIMESTAMP")]
    timestamp: Option<String>,

    /// Treat inputs as already converted Markdown files and only re-run the
    /// post-processing passes, in place.
    #[arg(long)]
    postprocess: bool,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "DOCX2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCX2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCX2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCX2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Expand inputs ────────────────────────────────────────────────────
    let inputs = expand_inputs(&cli.inputs, cli.postprocess)?;
    if inputs.is_empty() {
        anyhow::bail!("No input documents found");
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Ctrl-C → stop before the next document ───────────────────────────
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{} stopping after the running documents…", yellow("⚠"));
                cancel.cancel();
            }
        });
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let report = if cli.postprocess {
        postprocess_batch(&inputs, &config, &cancel).await
    } else {
        convert_batch(&inputs, &config, &cancel).await
    };

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        if !show_progress {
            let total = report.documents.len();
            for (i, doc) in report.documents.iter().enumerate() {
                eprintln!("{}", report_line(i, total, doc));
            }
        }
        print_summary(&report);
    }

    let failed = report.failed_count();
    if failed > 0 {
        anyhow::bail!("{failed} document(s) failed");
    }
    Ok(())
}

fn print_summary(report: &BatchReport) {
    let total = report.documents.len();
    let failed = report.failed_count();
    let warnings = report.warning_count();
    let mark = if failed == 0 && warnings == 0 {
        green("✔")
    } else if failed == total {
        red("✘")
    } else {
        yellow("⚠")
    };
    eprintln!(
        "{} {}/{} documents converted  {}  {}",
        mark,
        bold(&report.success_count.to_string()),
        total,
        dim(&format!("{warnings} warnings")),
        dim(&format!("{}ms", report.total_duration_ms)),
    );
    if !report.cancelled.is_empty() {
        eprintln!(
            "  {} {} document(s) not started (cancelled)",
            yellow("⚠"),
            report.cancelled.len()
        );
    }
}

/// Expand folder arguments into the `.docx` (or `.md`) files below them.
///
/// Explicit file arguments are kept as given, so a mistyped path still
/// shows up as a per-document error instead of vanishing.
fn expand_inputs(args: &[PathBuf], markdown: bool) -> Result<Vec<PathBuf>> {
    let wanted = |p: &Path| {
        if markdown {
            p.extension().is_some_and(|e| e.eq_ignore_ascii_case("md"))
        } else {
            is_docx(p)
        }
    };

    let mut out = Vec::new();
    for arg in args {
        if !arg.is_dir() {
            out.push(arg.clone());
            continue;
        }
        let mut found = Vec::new();
        for entry in WalkDir::new(arg).follow_links(true) {
            let entry = entry.with_context(|| format!("Failed to read folder {}", arg.display()))?;
            let path = entry.path();
            let is_lock_file = path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("~$"));
            if entry.file_type().is_file() && wanted(path) && !is_lock_file {
                found.push(path.to_path_buf());
            }
        }
        found.sort();
        out.extend(found);
    }
    Ok(out)
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .output_dir(&cli.output_dir)
        .images_dir_name(&cli.images_dir)
        .generate_toc(!cli.no_toc)
        .toc_title(&cli.toc_title)
        .default_caption(&cli.default_caption)
        .overwrite(cli.overwrite)
        .preserve_tabs(cli.preserve_tabs)
        .pandoc_program(&cli.pandoc)
        .concurrency(usize::from(cli.concurrency));

    builder = if cli.no_transcode {
        builder.no_transcoder()
    } else {
        builder.transcoder_program(&cli.transcoder)
    };
    if let Some(ref dir) = cli.styles_dir {
        builder = builder.styles_dir(dir);
    }
    if let Some(ref stamp) = cli.timestamp {
        builder = builder.run_stamp(stamp);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
