//! Configuration types for DOCX-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct is shared by every
//! document of a batch, so it carries its collaborators (converter,
//! transcoder, progress sink) as `Arc<dyn …>` trait objects.

use crate::error::Docx2MdError;
use crate::pipeline::converter::{DocumentConverter, PandocConverter};
use crate::pipeline::styles::StyleSheets;
use crate::pipeline::transcode::{ImageTranscoder, MagickTranscoder, DEFAULT_TRANSCODE_EXTENSIONS};
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Format of the default run stamp appended to relocated image names.
pub const RUN_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Configuration for a DOCX-to-Markdown conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use docx2md::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .output_dir("out")
///     .concurrency(4)
///     .toc_title("Contents")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Directory the Markdown files are written to. Default: `.`.
    pub output_dir: PathBuf,

    /// Name of the image directory created inside `output_dir`. Default: `images`.
    pub images_dir_name: String,

    /// Maintain heading anchors and rebuild the table of contents. Default: true.
    pub generate_toc: bool,

    /// Title of the heading whose region is regenerated as the table of
    /// contents. Default: `Оглавление`.
    pub toc_title: String,

    /// Caption used for figures that have no caption line. Default: `Изображение`.
    pub default_caption: String,

    /// Lines searched below a figure for its caption. Default: 3.
    pub caption_lookahead: usize,

    /// Replace an existing Markdown file. Default: false.
    pub overwrite: bool,

    /// Forward `--preserve-tabs` to the converter. Default: false.
    pub preserve_tabs: bool,

    /// Directory holding `figures.css` / `tables.css`. If None, the built-in
    /// stylesheets are used.
    pub styles_dir: Option<PathBuf>,

    /// Converter executable used when `converter` is None. Default: `pandoc`.
    pub pandoc_program: String,

    /// Pre-constructed converter. Takes precedence over `pandoc_program`.
    pub converter: Option<Arc<dyn DocumentConverter>>,

    /// Transcoder executable used when `transcoder` is None. Default:
    /// `magick`. If both are None, vector images are skipped with a warning.
    pub transcoder_program: Option<String>,

    /// Pre-constructed transcoder. Takes precedence over `transcoder_program`.
    pub transcoder: Option<Arc<dyn ImageTranscoder>>,

    /// File extensions routed through the transcoder. Default: `emf`, `wmf`.
    pub transcode_extensions: Vec<String>,

    /// Documents converted at once in a batch. Default: 1.
    pub concurrency: usize,

    /// Suffix appended to relocated image names. If None, the local time at
    /// the start of the run, formatted with [`RUN_STAMP_FORMAT`].
    pub run_stamp: Option<String>,

    /// Optional progress sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            images_dir_name: "images".to_string(),
            generate_toc: true,
            toc_title: "Оглавление".to_string(),
            default_caption: "Изображение".to_string(),
            caption_lookahead: 3,
            overwrite: false,
            preserve_tabs: false,
            styles_dir: None,
            pandoc_program: "pandoc".to_string(),
            converter: None,
            transcoder_program: Some("magick".to_string()),
            transcoder: None,
            transcode_extensions: DEFAULT_TRANSCODE_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            concurrency: 1,
            run_stamp: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("output_dir", &self.output_dir)
            .field("images_dir_name", &self.images_dir_name)
            .field("generate_toc", &self.generate_toc)
            .field("toc_title", &self.toc_title)
            .field("default_caption", &self.default_caption)
            .field("caption_lookahead", &self.caption_lookahead)
            .field("overwrite", &self.overwrite)
            .field("preserve_tabs", &self.preserve_tabs)
            .field("styles_dir", &self.styles_dir)
            .field("pandoc_program", &self.pandoc_program)
            .field("converter", &self.converter.as_ref().map(|_| "<dyn DocumentConverter>"))
            .field("transcoder_program", &self.transcoder_program)
            .field("transcoder", &self.transcoder.as_ref().map(|_| "<dyn ImageTranscoder>"))
            .field("transcode_extensions", &self.transcode_extensions)
            .field("concurrency", &self.concurrency)
            .field("run_stamp", &self.run_stamp)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// `<output_dir>/<images_dir_name>`.
    pub fn images_dir(&self) -> PathBuf {
        self.output_dir.join(&self.images_dir_name)
    }

    /// The configured run stamp, or a fresh one from the local clock.
    pub fn run_stamp(&self) -> String {
        self.run_stamp
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format(RUN_STAMP_FORMAT).to_string())
    }

    pub fn style_sheets(&self) -> StyleSheets {
        match &self.styles_dir {
            Some(dir) => StyleSheets::from_dir(dir),
            None => StyleSheets::builtin(),
        }
    }

    pub fn converter(&self) -> Arc<dyn DocumentConverter> {
        match &self.converter {
            Some(c) => Arc::clone(c),
            None => Arc::new(PandocConverter::new(&self.pandoc_program)),
        }
    }

    pub fn transcoder(&self) -> Option<Arc<dyn ImageTranscoder>> {
        if let Some(t) = &self.transcoder {
            return Some(Arc::clone(t));
        }
        self.transcoder_program
            .as_ref()
            .map(|p| Arc::new(MagickTranscoder::new(p)) as Arc<dyn ImageTranscoder>)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn images_dir_name(mut self, name: impl Into<String>) -> Self {
        self.config.images_dir_name = name.into();
        self
    }

    pub fn generate_toc(mut self, v: bool) -> Self {
        self.config.generate_toc = v;
        self
    }

    pub fn toc_title(mut self, title: impl Into<String>) -> Self {
        self.config.toc_title = title.into();
        self
    }

    pub fn default_caption(mut self, caption: impl Into<String>) -> Self {
        self.config.default_caption = caption.into();
        self
    }

    pub fn caption_lookahead(mut self, lines: usize) -> Self {
        self.config.caption_lookahead = lines;
        self
    }

    pub fn overwrite(mut self, v: bool) -> Self {
        self.config.overwrite = v;
        self
    }

    pub fn preserve_tabs(mut self, v: bool) -> Self {
        self.config.preserve_tabs = v;
        self
    }

    pub fn styles_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.styles_dir = Some(dir.into());
        self
    }

    pub fn pandoc_program(mut self, program: impl Into<String>) -> Self {
        self.config.pandoc_program = program.into();
        self
    }

    pub fn converter(mut self, converter: Arc<dyn DocumentConverter>) -> Self {
        self.config.converter = Some(converter);
        self
    }

    pub fn transcoder_program(mut self, program: impl Into<String>) -> Self {
        self.config.transcoder_program = Some(program.into());
        self
    }

    /// Disable transcoding entirely; vector images are then skipped.
    pub fn no_transcoder(mut self) -> Self {
        self.config.transcoder_program = None;
        self.config.transcoder = None;
        self
    }

    pub fn transcoder(mut self, transcoder: Arc<dyn ImageTranscoder>) -> Self {
        self.config.transcoder = Some(transcoder);
        self
    }

    pub fn transcode_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.transcode_extensions = exts
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn run_stamp(mut self, stamp: impl Into<String>) -> Self {
        self.config.run_stamp = Some(stamp.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Docx2MdError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(Docx2MdError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.images_dir_name.is_empty()
            || c.images_dir_name.contains(['/', '\\'])
            || c.images_dir_name == ".."
            || c.images_dir_name == "."
        {
            return Err(Docx2MdError::InvalidConfig(format!(
                "Image directory name must be a single path component, got '{}'",
                c.images_dir_name
            )));
        }
        if c.generate_toc && c.toc_title.trim().is_empty() {
            return Err(Docx2MdError::InvalidConfig(
                "TOC title must not be empty".into(),
            ));
        }
        if let Some(stamp) = &c.run_stamp {
            if stamp.contains(['/', '\\']) {
                return Err(Docx2MdError::InvalidConfig(format!(
                    "Run stamp must not contain path separators, got '{stamp}'"
                )));
            }
        }
        Ok(self.config)
    }
}
