//! Input validation and output placement.
//!
//! ## Why check the magic bytes?
//!
//! pandoc's error for a file that is not a DOCX is a terse zip-library
//! message. Checking the `PK\x03\x04` container signature up front gives the
//! caller a meaningful error before any child process is started, and before
//! anything is written to the output directory.

use crate::error::Docx2MdError;
use crate::pipeline::collision::sanitize_filename;
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Whether `path` has a `.docx` extension (case-insensitive).
pub fn is_docx(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case("docx"))
}

/// Check that `path` exists, is readable and is a zip container.
pub fn validate_source(path: &Path) -> Result<(), Docx2MdError> {
    if !path.exists() {
        return Err(Docx2MdError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic == ZIP_MAGIC => {}
                Ok(()) => {
                    return Err(Docx2MdError::NotADocx {
                        path: path.to_path_buf(),
                        magic,
                    })
                }
                // Shorter than a zip header.
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(Docx2MdError::NotADocx {
                        path: path.to_path_buf(),
                        magic,
                    })
                }
                Err(source) => {
                    return Err(Docx2MdError::ReadFailed {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(Docx2MdError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(Docx2MdError::ReadFailed {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    debug!("Validated source: {}", path.display());
    Ok(())
}

/// `<output_dir>/<sanitized stem>.md` for `source`.
pub fn output_path(output_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    output_dir.join(format!("{}.md", sanitize_filename(&stem)))
}

/// Exclusive hold on an output path that did not exist before this run.
///
/// The path is created empty when claimed, so no other document can take it.
/// Dropping the claim without [`OutputClaim::commit`] removes that placeholder.
#[derive(Debug)]
#[must_use]
pub struct OutputClaim {
    placeholder: Option<PathBuf>,
}

impl OutputClaim {
    fn unclaimed() -> Self {
        Self { placeholder: None }
    }

    /// The real output has replaced the placeholder; keep it.
    pub fn commit(mut self) {
        self.placeholder = None;
    }
}

impl Drop for OutputClaim {
    fn drop(&mut self) {
        if let Some(path) = self.placeholder.take() {
            debug!("Releasing unused output claim {}", path.display());
            let _ = fs::remove_file(path);
        }
    }
}

/// Make sure `output_dir` exists and is writable, and that `output` may be
/// (re)written.
///
/// Without `overwrite` the output path is claimed atomically
/// (`create_new`), so two documents mapping to the same name cannot both
/// pass this check.
pub fn prepare_output(
    output_dir: &Path,
    output: &Path,
    overwrite: bool,
) -> Result<OutputClaim, Docx2MdError> {
    fs::create_dir_all(output_dir).map_err(|e| Docx2MdError::OutputNotWritable {
        path: output_dir.to_path_buf(),
        detail: e.to_string(),
    })?;

    let meta = fs::metadata(output_dir).map_err(|e| Docx2MdError::OutputNotWritable {
        path: output_dir.to_path_buf(),
        detail: e.to_string(),
    })?;
    if !meta.is_dir() {
        return Err(Docx2MdError::OutputNotWritable {
            path: output_dir.to_path_buf(),
            detail: "not a directory".to_string(),
        });
    }
    if meta.permissions().readonly() {
        return Err(Docx2MdError::OutputNotWritable {
            path: output_dir.to_path_buf(),
            detail: "directory is read-only".to_string(),
        });
    }

    if overwrite {
        return Ok(OutputClaim::unclaimed());
    }
    match fs::OpenOptions::new().write(true).create_new(true).open(output) {
        Ok(_) => Ok(OutputClaim {
            placeholder: Some(output.to_path_buf()),
        }),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Docx2MdError::OutputExists {
            path: output.to_path_buf(),
        }),
        Err(e) => Err(Docx2MdError::OutputNotWritable {
            path: output.to_path_buf(),
            detail: e.to_string(),
        }),
    }
}
