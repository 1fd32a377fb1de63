//! End-to-end integration tests for docx2md.
//!
//! pandoc and ImageMagick are replaced by in-process fakes implementing
//! [`DocumentConverter`] and [`ImageTranscoder`], so these tests exercise the
//! full library path (validation, conversion, every pass, atomic write,
//! batching) without any external tool installed.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use docx2md::pipeline::styles::STYLE_MARKER;
use docx2md::{
    convert_batch, convert_file, postprocess_batch, postprocess_file, CancelToken, ConversionConfig,
    ConversionProgressCallback, ConverterError, ConverterOptions, DocumentConverter,
    DocumentOutcome, DocumentReport, Docx2MdError, ImageTranscoder, Stage, TranscodeError,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

const STAMP: &str = "20250101_120000";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// What the fake converter produces for one source file name.
#[derive(Clone)]
struct FakeDoc {
    /// Markdown with `{media}` standing for the extraction directory.
    markdown: String,
    media: Vec<(&'static str, Vec<u8>)>,
}

/// Writes the configured media under `<media_dir>/media/` and returns the
/// configured Markdown, like `pandoc --extract-media` does.
#[derive(Default)]
struct FakeConverter {
    docs: HashMap<String, FakeDoc>,
}

impl FakeConverter {
    fn with(mut self, name: &str, markdown: &str, media: Vec<(&'static str, Vec<u8>)>) -> Self {
        self.docs.insert(
            name.to_string(),
            FakeDoc {
                markdown: markdown.to_string(),
                media,
            },
        );
        self
    }
}

impl DocumentConverter for FakeConverter {
    fn convert(
        &self,
        source: &Path,
        media_dir: &Path,
        _options: &ConverterOptions,
    ) -> Result<String, ConverterError> {
        let name = source.file_name().unwrap().to_string_lossy().into_owned();
        let doc = self.docs.get(&name).ok_or_else(|| ConverterError::Failed {
            program: "fake".into(),
            status: "exit status: 1".into(),
            stderr: format!("no fixture for {name}"),
        })?;
        let media = media_dir.join("media");
        fs::create_dir_all(&media).unwrap();
        for (file, bytes) in &doc.media {
            fs::write(media.join(file), bytes).unwrap();
        }
        Ok(doc.markdown.replace("{media}", &media_dir.display().to_string()))
    }
}

/// "Transcodes" by copying the vector file to a `.png` sibling.
struct CopyTranscoder;

impl ImageTranscoder for CopyTranscoder {
    fn transcode(&self, vector: &Path) -> Result<PathBuf, TranscodeError> {
        let out = vector.with_extension("png");
        fs::copy(vector, &out).map_err(|source| TranscodeError::Spawn {
            program: "copy".into(),
            source,
        })?;
        Ok(out)
    }
}

/// Create an input file that passes the DOCX container check.
fn docx(dir: &Path, name: &str) -> PathBuf {
    let p = dir.join(name);
    fs::write(&p, b"PK\x03\x04 fake docx body").unwrap();
    p
}

fn config(out: &Path, converter: FakeConverter) -> ConversionConfig {
    ConversionConfig::builder()
        .output_dir(out)
        .run_stamp(STAMP)
        .converter(Arc::new(converter))
        .transcoder(Arc::new(CopyTranscoder))
        .build()
        .unwrap()
}

const FIGURE_DOC: &str = "# Оглавление\n\n# Введение\n\n![]({media}/media/image1.emf)\n\nРисунок 1 – Пример\n\nТекст.\n";

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn emf_figure_is_relocated_captioned_and_styled() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let src = docx(tmp.path(), "report.docx");
    let conv = FakeConverter::default().with("report.docx", FIGURE_DOC, vec![("image1.emf", b"EMF".to_vec())]);

    let report = convert_file(&src, &config(&out, conv)).await.unwrap();

    assert_eq!(report.outcome, DocumentOutcome::Success, "{:?}", report.warnings);
    assert_eq!(report.output.as_deref(), Some(out.join("report.md").as_path()));
    assert_eq!(report.images.len(), 1);
    assert!(report.flags.figures);
    assert!(!report.flags.tables);

    let md = fs::read_to_string(out.join("report.md")).unwrap();
    assert!(md.contains(&format!(r#"<img src="images/image1_{STAMP}.png" alt="">"#)), "{md}");
    assert!(md.contains(r#"<span class="figure-caption">Пример</span>"#));
    assert!(!md.contains("Рисунок 1 – Пример"), "caption line must be consumed");
    assert!(md.contains("- [Введение](#введение)"));
    assert!(md.contains("<a id=\"введение\"></a>\n# Введение"));
    assert_eq!(md.matches(STYLE_MARKER).count(), 1);
    assert!(md.contains("/* docx2md:figures */"));
    assert!(md.ends_with('\n'));

    let image = out.join("images").join(format!("image1_{STAMP}.png"));
    assert_eq!(fs::read(image).unwrap(), b"EMF");
    let mut entries: Vec<String> = fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    assert_eq!(entries, vec!["images", "report.md"], "no temp files are left behind");
}

#[tokio::test]
async fn rerunning_the_passes_changes_nothing() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let src = docx(tmp.path(), "report.docx");
    let md_doc = format!("{FIGURE_DOC}\n[Отчёт](docs/my file.pdf)\n\n| a | b |\n|---|---|\n");
    let conv = FakeConverter::default().with("report.docx", &md_doc, vec![("image1.emf", b"EMF".to_vec())]);
    let cfg = config(&out, conv);

    convert_file(&src, &cfg).await.unwrap();
    let first = fs::read_to_string(out.join("report.md")).unwrap();

    let again = postprocess_file(out.join("report.md"), None, &cfg).await.unwrap();
    let second = fs::read_to_string(out.join("report.md")).unwrap();

    assert_eq!(first, second);
    assert!(again.images.is_empty());
    assert_eq!(again.outcome, DocumentOutcome::Success, "{:?}", again.warnings);
    assert_eq!(fs::read_dir(out.join("images")).unwrap().count(), 1);
}

#[tokio::test]
async fn concurrent_documents_never_share_an_image_name() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let md = "![]({media}/media/image1.png)\n";
    let conv = FakeConverter::default()
        .with("a.docx", md, vec![("image1.png", b"A".to_vec())])
        .with("b.docx", md, vec![("image1.png", b"B".to_vec())])
        .with("c.docx", md, vec![("image1.png", b"C".to_vec())]);
    let inputs = vec![
        docx(tmp.path(), "a.docx"),
        docx(tmp.path(), "b.docx"),
        docx(tmp.path(), "c.docx"),
    ];
    let mut cfg = config(&out, conv);
    cfg.concurrency = 3;
    cfg.generate_toc = false;

    let batch = convert_batch(&inputs, &cfg, &CancelToken::new()).await;
    assert_eq!(batch.success_count, 3);

    let mut dests: Vec<PathBuf> = Vec::new();
    for (doc, expected) in batch.documents.iter().zip([b"A", b"B", b"C"]) {
        let placed = &doc.images[0];
        assert_eq!(fs::read(&placed.dest_path).unwrap(), expected);
        let md = fs::read_to_string(doc.output.as_ref().unwrap()).unwrap();
        assert!(md.contains(&placed.relative_reference));
        dests.push(placed.dest_path.clone());
    }
    dests.sort();
    dests.dedup();
    assert_eq!(dests.len(), 3);
    assert_eq!(fs::read_dir(out.join("images")).unwrap().count(), 3);
}

#[tokio::test]
async fn tables_are_never_figure_wrapped() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let src = docx(tmp.path(), "t.docx");
    let md = "Таблица 1 – Итоги\n\n| ![]({media}/media/t.png) | Рисунок 1 – в ячейке |\n|---|---|\n| a | b |\n";
    let conv = FakeConverter::default().with("t.docx", md, vec![("t.png", b"T".to_vec())]);
    let mut cfg = config(&out, conv);
    cfg.generate_toc = false;

    let report = convert_file(&src, &cfg).await.unwrap();
    let text = fs::read_to_string(out.join("t.md")).unwrap();

    assert!(report.flags.tables);
    assert!(!report.flags.figures);
    assert!(text.starts_with(r#"<p class="table-caption">Итоги</p>"#), "{text}");
    assert!(text.contains(&format!("| ![](images/t_{STAMP}.png) | Рисунок 1 – в ячейке |")));
    assert!(!text.contains("figure-container"));
    assert!(text.contains("/* docx2md:tables */"));
    assert_eq!(report.outcome, DocumentOutcome::Success, "{:?}", report.warnings);
}

#[tokio::test]
async fn link_targets_are_encoded_once() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let src = docx(tmp.path(), "links.docx");
    let md = "See [Отчёт](docs/my file.pdf) and [site](https://example.com/a%20b).\n";
    let conv = FakeConverter::default().with("links.docx", md, vec![]);
    let mut cfg = config(&out, conv);
    cfg.generate_toc = false;

    convert_file(&src, &cfg).await.unwrap();
    let first = fs::read_to_string(out.join("links.md")).unwrap();
    assert_eq!(
        first,
        "See [Отчёт](docs/my%20file.pdf) and [site](https://example.com/a%20b).\n"
    );

    postprocess_file(out.join("links.md"), None, &cfg).await.unwrap();
    assert_eq!(fs::read_to_string(out.join("links.md")).unwrap(), first);
}

#[tokio::test]
async fn style_block_is_upserted_not_duplicated() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let src = docx(tmp.path(), "s.docx");
    let md = "![]({media}/media/p.png)\n";
    let conv = FakeConverter::default().with("s.docx", md, vec![("p.png", b"P".to_vec())]);
    let mut cfg = config(&out, conv);
    cfg.generate_toc = false;

    convert_file(&src, &cfg).await.unwrap();
    let path = out.join("s.md");
    let first = fs::read_to_string(&path).unwrap();
    assert!(first.contains("/* docx2md:figures */"));
    assert!(!first.contains("/* docx2md:tables */"));

    // A table appears later (e.g. after a manual edit).
    fs::write(&path, format!("| a | b |\n|---|---|\n\n{first}")).unwrap();
    postprocess_file(&path, None, &cfg).await.unwrap();
    let second = fs::read_to_string(&path).unwrap();

    assert_eq!(second.matches(STYLE_MARKER).count(), 1);
    assert_eq!(second.matches("<style>").count(), 1);
    let f = second.find("/* docx2md:figures */").unwrap();
    let t = second.find("/* docx2md:tables */").unwrap();
    assert!(f < t);
}

#[tokio::test]
async fn one_failure_does_not_abort_the_batch() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let good = docx(tmp.path(), "good.docx");
    let missing = tmp.path().join("missing.docx");
    let not_docx = tmp.path().join("plain.docx");
    fs::write(&not_docx, "just text").unwrap();
    let conv = FakeConverter::default().with("good.docx", "Hello.\n", vec![]);
    let mut cfg = config(&out, conv);
    cfg.generate_toc = false;
    cfg.concurrency = 2;

    let batch = convert_batch(&[good, missing.clone(), not_docx], &cfg, &CancelToken::new()).await;

    assert_eq!(batch.success_count, 1);
    assert_eq!(batch.failed_count(), 2);
    assert_eq!(batch.documents.len(), 3);
    assert!(batch.documents[0].is_success());
    assert_eq!(batch.documents[1].source, missing);
    assert!(batch.documents[1].error.as_deref().unwrap().contains("not found"));
    assert_eq!(batch.documents[2].outcome, DocumentOutcome::Failed);
    assert!(out.join("good.md").exists());
    assert!(!out.join("plain.md").exists());
}

#[tokio::test]
async fn cancelled_batch_starts_nothing() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let inputs = vec![docx(tmp.path(), "a.docx"), docx(tmp.path(), "b.docx")];
    let conv = FakeConverter::default()
        .with("a.docx", "A\n", vec![])
        .with("b.docx", "B\n", vec![]);
    let cfg = config(&out, conv);

    let cancel = CancelToken::new();
    cancel.cancel();
    let batch = convert_batch(&inputs, &cfg, &cancel).await;

    assert!(batch.documents.is_empty());
    assert_eq!(batch.cancelled, inputs);
    assert!(!out.join("a.md").exists());
}

#[tokio::test]
async fn existing_output_is_protected_unless_overwrite() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let src = docx(tmp.path(), "r.docx");
    let conv = Arc::new(FakeConverter::default().with("r.docx", "New.\n", vec![]));
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("r.md"), "Old.\n").unwrap();

    let cfg = ConversionConfig::builder()
        .output_dir(&out)
        .run_stamp(STAMP)
        .generate_toc(false)
        .converter(conv.clone())
        .build()
        .unwrap();
    let err = convert_file(&src, &cfg).await.unwrap_err();
    assert!(matches!(err, Docx2MdError::OutputExists { .. }));
    assert_eq!(fs::read_to_string(out.join("r.md")).unwrap(), "Old.\n");

    let cfg = ConversionConfig::builder()
        .output_dir(&out)
        .run_stamp(STAMP)
        .generate_toc(false)
        .overwrite(true)
        .converter(conv)
        .build()
        .unwrap();
    convert_file(&src, &cfg).await.unwrap();
    assert_eq!(fs::read_to_string(out.join("r.md")).unwrap(), "New.\n");
}

#[tokio::test]
async fn missing_pandoc_is_a_fatal_error() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let src = docx(tmp.path(), "r.docx");
    let cfg = ConversionConfig::builder()
        .output_dir(tmp.path().join("out"))
        .pandoc_program("docx2md-no-such-pandoc")
        .build()
        .unwrap();

    let err = convert_file(&src, &cfg).await.unwrap_err();
    assert!(matches!(err, Docx2MdError::ConverterNotFound { .. }), "{err}");
    assert!(!tmp.path().join("out/r.md").exists(), "failed document leaves no output");
}

/// Echoes the parent folder name after a delay, so that two documents are
/// in flight at the same time.
struct SlowEchoConverter;

impl DocumentConverter for SlowEchoConverter {
    fn convert(
        &self,
        source: &Path,
        _media_dir: &Path,
        _options: &ConverterOptions,
    ) -> Result<String, ConverterError> {
        std::thread::sleep(std::time::Duration::from_millis(300));
        let folder = source.parent().unwrap().file_name().unwrap();
        Ok(format!("from {}\n", folder.to_string_lossy()))
    }
}

#[tokio::test]
async fn same_stem_documents_in_one_batch_do_not_clobber_each_other() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    fs::create_dir_all(tmp.path().join("a")).unwrap();
    fs::create_dir_all(tmp.path().join("b")).unwrap();
    let inputs = vec![
        docx(&tmp.path().join("a"), "r.docx"),
        docx(&tmp.path().join("b"), "r.docx"),
    ];
    let cfg = ConversionConfig::builder()
        .output_dir(&out)
        .run_stamp(STAMP)
        .generate_toc(false)
        .concurrency(2)
        .converter(Arc::new(SlowEchoConverter))
        .build()
        .unwrap();

    let batch = convert_batch(&inputs, &cfg, &CancelToken::new()).await;

    assert_eq!(batch.success_count, 1);
    assert_eq!(batch.failed_count(), 1);
    let winner = batch.documents.iter().find(|d| d.is_success()).unwrap();
    let loser = batch.documents.iter().find(|d| !d.is_success()).unwrap();
    assert!(loser.error.as_deref().unwrap().contains("already exists"));

    let folder = winner.source.parent().unwrap().file_name().unwrap();
    assert_eq!(
        fs::read_to_string(out.join("r.md")).unwrap(),
        format!("from {}\n", folder.to_string_lossy())
    );
}

#[tokio::test]
async fn vector_image_without_transcoder_is_a_warning() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let src = docx(tmp.path(), "v.docx");
    let conv = FakeConverter::default().with(
        "v.docx",
        "![]({media}/media/v.wmf)\n",
        vec![("v.wmf", b"WMF".to_vec())],
    );
    let cfg = ConversionConfig::builder()
        .output_dir(&out)
        .run_stamp(STAMP)
        .generate_toc(false)
        .converter(Arc::new(conv))
        .no_transcoder()
        .build()
        .unwrap();

    let report = convert_file(&src, &cfg).await.unwrap();
    assert_eq!(report.outcome, DocumentOutcome::PartialSuccessWithWarnings);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.images.is_empty());
    assert!(!out.join("images").exists());
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ConversionProgressCallback for Recorder {
    fn on_batch_start(&self, total: usize) {
        self.events.lock().unwrap().push(format!("batch:{total}"));
    }
    fn on_document_start(&self, index: usize, _total: usize, _source: &Path) {
        self.events.lock().unwrap().push(format!("start:{index}"));
    }
    fn on_stage_complete(&self, _source: &Path, stage: Stage) {
        self.events.lock().unwrap().push(format!("{stage:?}"));
    }
    fn on_document_complete(&self, index: usize, _total: usize, report: &DocumentReport) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done:{index}:{:?}", report.outcome));
    }
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("end:{total}:{success_count}"));
    }
}

#[tokio::test]
async fn progress_events_follow_the_stage_order() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("out");
    let src = docx(tmp.path(), "p.docx");
    let recorder = Arc::new(Recorder::default());
    let cfg = ConversionConfig::builder()
        .output_dir(&out)
        .run_stamp(STAMP)
        .generate_toc(false)
        .converter(Arc::new(FakeConverter::default().with("p.docx", "Text.\n", vec![])))
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    convert_batch(&[src], &cfg, &CancelToken::new()).await;

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "batch:1",
            "start:0",
            "Scanning",
            "Relocating",
            "CaptionPromoting",
            "LinkNormalizing",
            "AnchorBuilding",
            "StyleInjecting",
            "Done",
            "done:0:Success",
            "end:1:1",
        ]
    );
}

#[tokio::test]
async fn markdown_batch_reports_progress_and_shares_one_stamp() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("a.png"), b"A").unwrap();
    fs::write(dir.join("b.png"), b"B").unwrap();
    fs::write(dir.join("a.md"), "![](a.png)\n").unwrap();
    fs::write(dir.join("b.md"), "![](b.png)\n").unwrap();
    let recorder = Arc::new(Recorder::default());
    let cfg = ConversionConfig::builder()
        .output_dir(dir)
        .generate_toc(false)
        .concurrency(2)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let batch = postprocess_batch(&[dir.join("a.md"), dir.join("b.md")], &cfg, &CancelToken::new()).await;

    assert_eq!(batch.success_count, 2);
    let stamps: Vec<String> = batch
        .documents
        .iter()
        .zip(["a_", "b_"])
        .map(|(doc, prefix)| {
            let name = doc.images[0].dest_path.file_name().unwrap().to_string_lossy().into_owned();
            name.strip_prefix(prefix).unwrap().strip_suffix(".png").unwrap().to_string()
        })
        .collect();
    assert_eq!(stamps[0], stamps[1]);

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("batch:2"));
    assert_eq!(events.last().map(String::as_str), Some("end:2:2"));
    assert!(events.contains(&"start:0".to_string()));
    assert!(events.contains(&"start:1".to_string()));
}
