//! Transient, revocable references to uploaded content.
//!
//! OCR tools want a path, not a byte buffer. We write the upload into a
//! private temporary directory, hand the engine the path, and delete it again
//! as soon as the extraction is over.

use std::fs;

use tempfile::TempDir;

use crate::prelude::*;

/// A temporary on-disk copy of an uploaded file.
///
/// The reference stays valid until [`TransientContent::revoke`] is called.
/// Dropping it revokes it too, so an early return or a dropped future never
/// leaves a copy behind.
#[derive(Debug)]
pub struct TransientContent {
    /// The directory holding our copy. `None` once revoked.
    dir: Option<TempDir>,

    /// Path to the copy inside `dir`.
    path: PathBuf,

    /// The sniffed MIME type of the content.
    mime_type: String,
}

impl TransientContent {
    /// Copy `data` into a fresh temporary directory. `extension` is used for
    /// the file name, since some tools pick a decoder by extension.
    pub fn new(data: &[u8], mime_type: &str, extension: &str) -> Result<Self> {
        let dir = TempDir::with_prefix("upload")
            .context("cannot create directory for uploaded content")?;
        let path = dir.path().join(format!("content.{extension}"));
        fs::write(&path, data)
            .with_context(|| format!("cannot write uploaded content to {:?}", path))?;
        trace!(path = %path.display(), bytes = data.len(), "Created transient content");
        Ok(Self {
            dir: Some(dir),
            path,
            mime_type: mime_type.to_owned(),
        })
    }

    /// The path an engine should read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The MIME type we detected for this content.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Is this reference still usable?
    pub fn is_live(&self) -> bool {
        self.dir.is_some()
    }

    /// Release our copy of the content. Safe to call more than once; failures
    /// are logged and otherwise ignored.
    pub fn revoke(&mut self) {
        if let Some(dir) = self.dir.take() {
            let dir_path = dir.path().to_owned();
            match dir.close() {
                Ok(()) => trace!(path = %dir_path.display(), "Revoked transient content"),
                Err(err) => warn!(
                    path = %dir_path.display(),
                    "Could not remove transient content: {err}"
                ),
            }
        }
    }
}

impl Drop for TransientContent {
    fn drop(&mut self) {
        self.revoke();
    }
}
