//! An "OCR" engine that calls `pdftotext`.

use tokio::process::Command;

use crate::{
    async_utils::check_for_command_failure, cpu_limit::with_cpu_semaphore,
    ocr::content::TransientContent, prelude::*,
};

use super::{RecognitionEngine, is_command_missing};

/// "OCR" engine wrapping the `pdftotext` CLI tool from `poppler-utils`.
///
/// This will miss any "non-searchable" text in a PDF, but sometimes you just
/// want cheap and fast. Language data is irrelevant to it, so the language
/// stages only record what was asked for.
#[derive(Default)]
#[non_exhaustive]
pub struct PdfToTextEngine {
    languages: Option<String>,
}

impl PdfToTextEngine {
    /// Create a new `pdftotext` engine.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecognitionEngine for PdfToTextEngine {
    #[instrument(level = "debug", skip_all)]
    async fn load(&mut self) -> Result<()> {
        // `pdftotext -v` has exited non-zero on some poppler releases, so we
        // only care that it runs at all.
        match Command::new("pdftotext").arg("-v").output().await {
            Ok(_) => Ok(()),
            Err(err) if is_command_missing(&err) => {
                Err(anyhow!("pdftotext is not installed or not on PATH"))
            }
            Err(err) => Err(anyhow::Error::new(err).context("cannot run pdftotext")),
        }
    }

    async fn load_languages(&mut self, specifier: &str) -> Result<()> {
        debug!(languages = specifier, "pdftotext ignores language selection");
        Ok(())
    }

    async fn initialize(&mut self, specifier: &str) -> Result<()> {
        self.languages = Some(specifier.to_owned());
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(path = %content.path().display()))]
    async fn recognize(&mut self, content: &TransientContent) -> Result<Option<String>> {
        if self.languages.is_none() {
            return Err(anyhow!("pdftotext must be initialized before recognizing"));
        }
        if content.mime_type() != "application/pdf" {
            return Err(anyhow!(
                "pdftotext only works with PDFs, not {}",
                content.mime_type()
            ));
        }

        let mut cmd = Command::new("pdftotext");
        cmd.arg("-layout")
            .arg(content.path())
            .arg("-")
            .kill_on_drop(true);
        let output = with_cpu_semaphore(|| async {
            cmd.output().await.context("cannot run pdftotext")
        })
        .await?;
        check_for_command_failure("pdftotext", &output, None)?;
        let text =
            String::from_utf8(output.stdout).context("pdftotext output was not valid UTF-8")?;
        Ok(Some(text))
    }

    async fn terminate(&mut self) -> Result<()> {
        self.languages = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_images() -> Result<()> {
        let mut engine = PdfToTextEngine::new();
        engine.initialize("eng").await?;
        let content = TransientContent::new(b"\x89PNG", "image/png", "png")?;
        let err = engine.recognize(&content).await.unwrap_err();
        assert!(err.to_string().contains("only works with PDFs"));
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn extracts_text_layer() -> Result<()> {
        let pdf = tokio::fs::read("tests/fixtures/ocr/hello.pdf").await?;
        let content = TransientContent::new(&pdf, "application/pdf", "pdf")?;
        let mut engine = PdfToTextEngine::new();
        engine.load().await?;
        engine.load_languages("eng").await?;
        engine.initialize("eng").await?;
        let text = engine.recognize(&content).await?.unwrap_or_default();
        assert!(text.contains("Hello"));
        engine.terminate().await
    }
}
