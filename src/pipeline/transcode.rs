//! Vector-to-raster image transcoding.
//!
//! Word embeds EMF/WMF vector graphics that browsers and most Markdown
//! renderers cannot display. Those are converted to PNG through an external
//! tool before being placed in the image directory.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Extensions transcoded when no explicit list is configured.
pub const DEFAULT_TRANSCODE_EXTENSIONS: &[&str] = &["emf", "wmf"];

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("could not start '{program}': {source}")]
    Spawn {
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

    #[error("'{program}' reported success but produced no file at '{path}'")]
    MissingOutput { program: String, path: PathBuf },
}

/// Converts one vector image to a raster image.
///
/// Implementations must be callable from several worker threads at once.
pub trait ImageTranscoder: Send + Sync {
    /// Transcode `vector` and return the path of the raster file produced.
    ///
    /// The output lives in a location owned by the caller's run (typically
    /// next to `vector` in the temporary media directory).
    fn transcode(&self, vector: &Path) -> Result<PathBuf, TranscodeError>;
}

/// ImageMagick-backed transcoder: `magick <in> <out.png>`.
#[derive(Debug, Clone)]
pub struct MagickTranscoder {
    program: String,
}

impl MagickTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for MagickTranscoder {
    fn default() -> Self {
        Self::new("magick")
    }
}

impl ImageTranscoder for MagickTranscoder {
    fn transcode(&self, vector: &Path) -> Result<PathBuf, TranscodeError> {
        let out = vector.with_extension("png");
        debug!(program = %self.program, input = %vector.display(), "transcoding");

        let output = Command::new(&self.program)
            .arg(vector)
            .arg(&out)
            .output()
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TranscodeError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !out.is_file() {
            return Err(TranscodeError::MissingOutput {
                program: self.program.clone(),
                path: out,
            });
        }
        Ok(out)
    }
}

/// Whether a file with extension `ext` must be transcoded.
pub fn needs_transcode(ext: &str, extensions: &[String]) -> bool {
    extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
}
