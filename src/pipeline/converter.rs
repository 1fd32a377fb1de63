//! External document converter: DOCX in, GFM Markdown out.
//!
//! The converter is the only stage that reads the binary container. It
//! extracts embedded media into a run-owned temporary directory and returns
//! the Markdown text; nothing is written next to the source document.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Options forwarded to the converter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConverterOptions {
    /// Whether a table of contents is wanted. Consumed by post-processing;
    /// the converter's own TOC writer is never used because it cannot be
    /// re-run idempotently.
    pub toc: bool,
    /// Keep tab characters instead of expanding them to spaces.
    pub preserve_tabs: bool,
    /// Whether an existing artifact may be replaced. Checked before the
    /// converter runs.
    pub overwrite: bool,
}

#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("converter '{program}' not found")]
    NotFound { program: String },

    #[error("could not run '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("'{program}' produced output that is not valid UTF-8")]
    InvalidUtf8 { program: String },
}

/// Turns one DOCX file into Markdown.
pub trait DocumentConverter: Send + Sync {
    /// Convert `source`, extracting embedded media under `media_dir`.
    ///
    /// Extracted files must end up at `media_dir/media/<name>` or
    /// `media_dir/<name>`; the relocation pass looks in both.
    fn convert(
        &self,
        source: &Path,
        media_dir: &Path,
        options: &ConverterOptions,
    ) -> Result<String, ConverterError>;
}

/// pandoc-backed converter.
///
/// Runs `pandoc --from=docx --to=gfm --wrap=none --standalone
/// --extract-media=<media_dir> [--preserve-tabs] <source>` and captures
/// stdout.
#[derive(Debug, Clone)]
pub struct PandocConverter {
    program: String,
}

impl PandocConverter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, source: &Path, media_dir: &Path, options: &ConverterOptions) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--from=docx")
            .arg("--to=gfm")
            .arg("--wrap=none")
            .arg("--standalone")
            .arg(format!("--extract-media={}", media_dir.display()));
        if options.preserve_tabs {
            cmd.arg("--preserve-tabs");
        }
        cmd.arg(source);
        cmd
    }
}

impl Default for PandocConverter {
    fn default() -> Self {
        Self::new("pandoc")
    }
}

impl DocumentConverter for PandocConverter {
    fn convert(
        &self,
        source: &Path,
        media_dir: &Path,
        options: &ConverterOptions,
    ) -> Result<String, ConverterError> {
        let mut cmd = self.command(source, media_dir, options);
        debug!(?cmd, "running converter");

        let output = cmd.output().map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                ConverterError::NotFound {
                    program: self.program.clone(),
                }
            } else {
                ConverterError::Io {
                    program: self.program.clone(),
                    source,
                }
            }
        })?;

        if !output.status.success() {
            return Err(ConverterError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| ConverterError::InvalidUtf8 {
            program: self.program.clone(),
        })
    }
}
