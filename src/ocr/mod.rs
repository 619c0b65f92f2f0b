//! Extracting text from uploaded PDFs.
//!
//! [`extract_text`] is the entry point. It reads the upload, makes a transient
//! copy the engine can read, runs a fresh [`RecognitionSession`] over it while
//! forwarding progress, and releases the copy whatever happens.

use std::error::Error as StdError;

use self::{content::TransientContent, engines::EngineFactory, session::RecognitionSession};
use crate::{
    async_utils::spawn_blocking_propagating_panics, languages::LanguageSet, prelude::*,
};

pub mod content;
pub mod engines;
pub mod session;

pub use self::session::ProgressEvent;

/// Content types we'll hand to an engine. PDFs are the normal case; the image
/// types are what `tesseract` can read directly.
const SUPPORTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/tiff",
    "image/bmp",
    "image/gif",
    "image/webp",
];

/// A boxed error, used to keep the underlying cause of an [`ExtractError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Why an extraction failed.
///
/// Callers only ever see these two cases. The stage that failed is logged, not
/// returned.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The upload could not be read, or isn't something we can OCR.
    #[error("failed to read {what}")]
    Read {
        what: String,
        #[source]
        source: BoxError,
    },

    /// The recognition engine failed.
    #[error("text recognition failed")]
    Recognition {
        #[source]
        source: BoxError,
    },
}

impl ExtractError {
    /// Build a [`ExtractError::Read`].
    pub fn read(what: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Read {
            what: what.into(),
            source: source.into(),
        }
    }

    /// Build a [`ExtractError::Recognition`].
    pub fn recognition(source: impl Into<BoxError>) -> Self {
        Self::Recognition {
            source: source.into(),
        }
    }
}

/// Extract text from the file at `path`.
///
/// If the file can't be read, no engine is created and no progress is
/// reported.
#[instrument(level = "debug", skip_all, fields(path = %path.display(), languages = %languages))]
pub async fn extract_text<F>(
    path: &Path,
    languages: &LanguageSet,
    engines: &dyn EngineFactory,
    on_progress: F,
) -> Result<String, ExtractError>
where
    F: FnMut(ProgressEvent) + Send,
{
    let data = tokio::fs::read(path)
        .await
        .map_err(|err| ExtractError::read(format!("{:?}", path.display()), err))?;
    extract_bytes(data, languages, engines, on_progress).await
}

/// Extract text from an upload that's already in memory.
#[instrument(level = "debug", skip_all, fields(bytes = data.len(), languages = %languages))]
pub async fn extract_bytes<F>(
    data: Vec<u8>,
    languages: &LanguageSet,
    engines: &dyn EngineFactory,
    on_progress: F,
) -> Result<String, ExtractError>
where
    F: FnMut(ProgressEvent) + Send,
{
    let (mime_type, extension) =
        sniff_content_type(&data).map_err(|err| ExtractError::read("upload", err))?;
    debug!(mime_type, "Detected upload type");

    let mut content = spawn_blocking_propagating_panics(move || {
        TransientContent::new(&data, mime_type, extension)
    })
    .await
    .map_err(ExtractError::recognition)?;

    let result = match engines.create() {
        Ok(engine) => {
            RecognitionSession::new(engine)
                .run(&content, languages, on_progress)
                .await
        }
        Err(err) => Err(ExtractError::recognition(
            err.context("cannot create recognition engine"),
        )),
    };
    content.revoke();

    match &result {
        Ok(text) => info!(chars = text.chars().count(), "Extracted text"),
        Err(err) => warn!("Extraction failed: {err}"),
    }
    result
}

/// Work out what kind of content we've been given, returning a MIME type and
/// the file extension engines should see.
fn sniff_content_type(data: &[u8]) -> Result<(&'static str, &'static str)> {
    let kind = infer::get(data).ok_or_else(|| anyhow!("unknown content type"))?;
    if SUPPORTED_MIME_TYPES.contains(&kind.mime_type()) {
        Ok((kind.mime_type(), kind.extension()))
    } else {
        Err(anyhow!(
            "unsupported content type {} (expected a PDF or an image)",
            kind.mime_type()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::engines::scripted::{Call, ScriptedFactory, Step};

    const TINY_PDF: &[u8] = b"%PDF-1.4\n%%EOF\n";

    /// A PDF whose bytes no other test will use.
    fn unique_pdf() -> Vec<u8> {
        format!("%PDF-1.4\n%{}\n%%EOF\n", uuid::Uuid::new_v4()).into_bytes()
    }

    /// Transient copies of `data` still on disk. Other tests may be creating
    /// and removing their own copies meanwhile, so read errors are skipped.
    fn leftover_copies(data: &[u8]) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(std::env::temp_dir()) else {
            return vec![];
        };
        entries
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("upload"))
            .filter_map(|entry| std::fs::read_dir(entry.path()).ok())
            .flat_map(|files| files.flatten())
            .map(|file| file.path())
            .filter(|path| std::fs::read(path).is_ok_and(|bytes| bytes == data))
            .collect()
    }

    #[test]
    fn leftover_copies_finds_live_content() -> Result<()> {
        let data = unique_pdf();
        let mut content = TransientContent::new(&data, "application/pdf", "pdf")?;
        assert_eq!(leftover_copies(&data), vec![content.path().to_owned()]);
        content.revoke();
        assert!(leftover_copies(&data).is_empty());
        Ok(())
    }

    async fn write_pdf(dir: &tempfile::TempDir) -> Result<PathBuf> {
        let path = dir.path().join("upload.pdf");
        tokio::fs::write(&path, TINY_PDF).await?;
        Ok(path)
    }

    #[tokio::test]
    async fn unreadable_file_is_read_failure_without_progress() -> Result<()> {
        let factory = ScriptedFactory::returning("text");
        let mut events = vec![];
        let result = extract_text(
            Path::new("/nonexistent/upload.pdf"),
            &LanguageSet::default(),
            &factory,
            |event| events.push(event),
        )
        .await;
        assert!(matches!(result, Err(ExtractError::Read { .. })));
        assert!(events.is_empty());
        assert!(factory.log.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn non_pdf_upload_is_read_failure() -> Result<()> {
        let factory = ScriptedFactory::returning("text");
        let mut events = vec![];
        let result = extract_bytes(
            b"just some text".to_vec(),
            &LanguageSet::default(),
            &factory,
            |event| events.push(event),
        )
        .await;
        assert!(matches!(result, Err(ExtractError::Read { .. })));
        assert!(events.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn single_language_extraction_reports_fixed_checkpoints() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("extract")?;
        let path = write_pdf(&dir).await?;
        let factory = ScriptedFactory::returning("Name: Asha\n");
        let mut percents = vec![];
        let text = extract_text(&path, &LanguageSet::new(["eng"]), &factory, |event| {
            percents.push(event.percent)
        })
        .await?;
        assert_eq!(text, "Name: Asha\n");
        assert_eq!(percents, vec![10, 25, 40, 60, 85, 100]);
        Ok(())
    }

    #[tokio::test]
    async fn content_is_live_during_recognition_and_revoked_after() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("extract")?;
        let path = write_pdf(&dir).await?;
        let factory = ScriptedFactory::returning("text");
        extract_text(&path, &LanguageSet::default(), &factory, |_| {}).await?;

        assert!(
            factory
                .log
                .calls()
                .iter()
                .any(|call| matches!(call, Call::Recognize { live: true, .. }))
        );
        for content_path in factory.log.recognized_paths() {
            assert!(!content_path.exists(), "{content_path:?} was not revoked");
        }
        Ok(())
    }

    #[tokio::test]
    async fn multi_language_loads_all_before_initializing() -> Result<()> {
        let factory = ScriptedFactory::returning("text");
        extract_bytes(
            TINY_PDF.to_vec(),
            &LanguageSet::new(["eng", "mal"]),
            &factory,
            |_| {},
        )
        .await?;
        let calls = factory.log.calls();
        let load_idx = calls
            .iter()
            .position(|call| *call == Call::LoadLanguages("eng+mal".to_owned()));
        let init_idx = calls
            .iter()
            .position(|call| *call == Call::Initialize("eng+mal".to_owned()));
        assert!(matches!((load_idx, init_idx), (Some(l), Some(i)) if l < i));
        Ok(())
    }

    #[tokio::test]
    async fn initialize_failure_still_revokes_and_terminates() -> Result<()> {
        let data = unique_pdf();
        let factory = ScriptedFactory::failing_at(Step::Initialize);
        let mut percents = vec![];
        let result = extract_bytes(
            data.clone(),
            &LanguageSet::default(),
            &factory,
            |event| percents.push(event.percent),
        )
        .await;
        assert!(matches!(result, Err(ExtractError::Recognition { .. })));
        assert_eq!(percents, vec![10, 25, 40]);
        assert_eq!(factory.log.terminate_count(), 1);
        assert!(leftover_copies(&data).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn failure_at_any_engine_stage_revokes_content() -> Result<()> {
        for step in [
            Step::Load,
            Step::LoadLanguages,
            Step::Initialize,
            Step::Recognize,
        ] {
            let data = unique_pdf();
            let factory = ScriptedFactory::failing_at(step);
            let result =
                extract_bytes(data.clone(), &LanguageSet::default(), &factory, |_| {})
                    .await;
            assert!(
                matches!(result, Err(ExtractError::Recognition { .. })),
                "expected recognition failure at {step:?}"
            );
            assert_eq!(factory.log.terminate_count(), 1, "at {step:?}");
            assert!(
                leftover_copies(&data).is_empty(),
                "content left behind after failure at {step:?}"
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn recognize_failure_revokes_content() -> Result<()> {
        let factory = ScriptedFactory::failing_at(Step::Recognize);
        let result =
            extract_bytes(TINY_PDF.to_vec(), &LanguageSet::default(), &factory, |_| {})
                .await;
        assert!(result.is_err());
        let paths = factory.log.recognized_paths();
        assert_eq!(paths.len(), 1);
        assert!(!paths[0].exists());
        assert_eq!(factory.log.terminate_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn sequential_extractions_are_independent() -> Result<()> {
        let factory = ScriptedFactory::returning("same");
        let first =
            extract_bytes(TINY_PDF.to_vec(), &LanguageSet::default(), &factory, |_| {})
                .await?;
        let second =
            extract_bytes(TINY_PDF.to_vec(), &LanguageSet::default(), &factory, |_| {})
                .await?;
        assert_eq!(first, second);

        let paths = factory.log.recognized_paths();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0], paths[1]);
        assert!(paths.iter().all(|path| !path.exists()));
        assert_eq!(factory.log.terminate_count(), 2);
        Ok(())
    }
}
