//! Tesseract OCR engine.

use std::{collections::BTreeSet, process::Output};

use tempfile::TempDir;
use tokio::process::Command;

use crate::{
    async_utils::check_for_command_failure,
    cpu_limit::with_cpu_semaphore,
    ocr::content::TransientContent,
    prelude::*,
};

use super::{RecognitionEngine, is_command_missing};

/// Page separator we put between the text of consecutive pages.
const PAGE_SEPARATOR: char = '\u{000C}';

/// OCR engine wrapping the `tesseract` CLI tool.
///
/// PDFs are rasterized with `pdftocairo` into the engine's scratch directory
/// and each page is recognized separately. Images go to `tesseract` as-is.
pub struct TesseractEngine {
    /// DPI for rasterizing PDF pages.
    dpi: u32,

    /// Has `tesseract` been found?
    loaded: bool,

    /// Languages whose data we've confirmed is installed.
    loaded_languages: Option<String>,

    /// Language specifier we were initialized with.
    initialized_languages: Option<String>,

    /// Scratch space for rasterized pages. Created by `initialize`.
    scratch: Option<TempDir>,
}

impl TesseractEngine {
    /// Create a new `tesseract` engine.
    pub fn new(dpi: u32) -> Self {
        Self {
            dpi,
            loaded: false,
            loaded_languages: None,
            initialized_languages: None,
            scratch: None,
        }
    }

    /// Rasterize a PDF into PNG pages, returning their paths in page order.
    #[instrument(level = "debug", skip_all, fields(dpi = self.dpi))]
    async fn rasterize_pdf(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
        // pdftocairo zero-pads page numbers, so a lexical sort is page order.
        let out_path = out_dir.join("page");
        let mut cmd = Command::new("pdftocairo");
        cmd.arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(pdf)
            .arg(&out_path)
            .kill_on_drop(true);
        let output = with_cpu_semaphore(|| async {
            cmd.output()
                .await
                .with_context(|| format!("failed to run pdftocairo on {:?}", pdf.display()))
        })
        .await?;
        check_for_command_failure("pdftocairo", &output, None)?;

        let mut pages = std::fs::read_dir(out_dir)
            .with_context(|| format!("failed to read directory {:?}", out_dir.display()))?
            .map(|entry| {
                let entry = entry.with_context(|| {
                    format!("failed to read entry in {:?}", out_dir.display())
                })?;
                Ok(entry.path())
            })
            .collect::<Result<Vec<_>>>()?;
        pages.retain(|path| path.extension().is_some_and(|ext| ext == "png"));
        pages.sort();
        if pages.is_empty() {
            return Err(anyhow!("pdftocairo produced no pages for {:?}", pdf.display()));
        }
        debug!(page_count = pages.len(), "Rasterized PDF");
        Ok(pages)
    }

    /// Run `tesseract` on a single image and return its text.
    #[instrument(level = "debug", skip_all, fields(image = %image.display()))]
    async fn recognize_image(&self, image: &Path, specifier: &str) -> Result<String> {
        let mut cmd = Command::new("tesseract");
        cmd.arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(specifier)
            .arg("--dpi")
            .arg(self.dpi.to_string())
            .kill_on_drop(true);
        let output = with_cpu_semaphore(|| async {
            cmd.output().await.context("cannot run tesseract")
        })
        .await?;
        page_text(output)
    }
}

#[async_trait]
impl RecognitionEngine for TesseractEngine {
    #[instrument(level = "debug", skip_all)]
    async fn load(&mut self) -> Result<()> {
        let output = Command::new("tesseract")
            .arg("--version")
            .output()
            .await
            .map_err(|err| {
                if is_command_missing(&err) {
                    anyhow!("tesseract is not installed or not on PATH")
                } else {
                    anyhow::Error::new(err).context("cannot run tesseract --version")
                }
            })?;
        check_for_command_failure("tesseract", &output, None)?;

        // Older versions print the version to stderr.
        let version = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        debug!(
            version = version.lines().next().unwrap_or_default(),
            "Found tesseract"
        );
        self.loaded = true;
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(languages = specifier))]
    async fn load_languages(&mut self, specifier: &str) -> Result<()> {
        if !self.loaded {
            return Err(anyhow!("tesseract must be loaded before loading languages"));
        }

        let output = Command::new("tesseract")
            .arg("--list-langs")
            .output()
            .await
            .context("cannot run tesseract --list-langs")?;
        check_for_command_failure("tesseract", &output, None)?;
        let available = parse_language_list(&String::from_utf8_lossy(&output.stdout));

        let missing = specifier
            .split('+')
            .filter(|code| !available.contains(*code))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(anyhow!(
                "tesseract has no language data for {} (installed: {})",
                missing.join(", "),
                available.iter().cloned().collect::<Vec<_>>().join(", "),
            ));
        }
        self.loaded_languages = Some(specifier.to_owned());
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(languages = specifier))]
    async fn initialize(&mut self, specifier: &str) -> Result<()> {
        if self.loaded_languages.as_deref() != Some(specifier) {
            return Err(anyhow!(
                "cannot initialize tesseract with {specifier:?} before loading its language data"
            ));
        }
        let scratch = TempDir::with_prefix("tesseract")
            .context("cannot create tesseract scratch directory")?;
        self.scratch = Some(scratch);
        self.initialized_languages = Some(specifier.to_owned());
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(path = %content.path().display()))]
    async fn recognize(&mut self, content: &TransientContent) -> Result<Option<String>> {
        let (Some(specifier), Some(scratch)) =
            (self.initialized_languages.as_deref(), self.scratch.as_ref())
        else {
            return Err(anyhow!("tesseract must be initialized before recognizing"));
        };

        let pages = if content.mime_type() == "application/pdf" {
            self.rasterize_pdf(content.path(), scratch.path()).await?
        } else {
            vec![content.path().to_owned()]
        };

        let mut text = String::new();
        for (page_idx, page) in pages.iter().enumerate() {
            if page_idx > 0 {
                text.push(PAGE_SEPARATOR);
            }
            let page_text = self
                .recognize_image(page, specifier)
                .await
                .with_context(|| format!("failed to OCR page {}", page_idx + 1))?;
            text.push_str(&page_text);
        }
        Ok(Some(text))
    }

    #[instrument(level = "debug", skip_all)]
    async fn terminate(&mut self) -> Result<()> {
        self.loaded = false;
        self.loaded_languages = None;
        self.initialized_languages = None;
        if let Some(scratch) = self.scratch.take() {
            scratch
                .close()
                .context("cannot remove tesseract scratch directory")?;
        }
        Ok(())
    }
}

/// Text from one `tesseract ... stdout` run. Only the exit status counts as
/// failure: leptonica prints `Error in ...` lines during successful runs.
fn page_text(output: Output) -> Result<String> {
    check_for_command_failure("tesseract", &output, None)?;
    String::from_utf8(output.stdout).context("tesseract output was not valid UTF-8")
}

/// Parse the output of `tesseract --list-langs`, which starts with a header
/// line and then lists one language per line.
fn parse_language_list(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of available"))
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{os::unix::process::ExitStatusExt as _, process::ExitStatus};

    use super::*;
    use crate::{languages::LanguageSet, ocr::session::RecognitionSession};

    #[test]
    fn parses_language_list() {
        let output = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nmal\nosd\n";
        let langs = parse_language_list(output);
        assert_eq!(
            langs.into_iter().collect::<Vec<_>>(),
            vec!["eng".to_owned(), "mal".to_owned(), "osd".to_owned()]
        );
    }

    fn tesseract_output(code: i32, stdout: &str, stderr: &str) -> Output {
        Output {
            status: ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn leptonica_noise_on_stderr_is_not_a_failure() -> Result<()> {
        let output = tesseract_output(
            0,
            "Hello World\n\u{000C}",
            "Error in boxClipToRectangle: box outside rectangle\n",
        );
        assert_eq!(page_text(output)?, "Hello World\n\u{000C}");
        Ok(())
    }

    #[test]
    fn nonzero_exit_is_a_failure() {
        let output = tesseract_output(1, "", "Error opening data file eng.traineddata\n");
        assert!(page_text(output).is_err());
    }

    #[tokio::test]
    async fn initialize_requires_loaded_languages() {
        let mut engine = TesseractEngine::new(300);
        assert!(engine.initialize("eng").await.is_err());
        assert!(engine.terminate().await.is_ok());
    }

    #[tokio::test]
    async fn recognize_requires_initialize() -> Result<()> {
        let mut engine = TesseractEngine::new(300);
        let content = TransientContent::new(b"\x89PNG", "image/png", "png")?;
        assert!(engine.recognize(&content).await.is_err());
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires tesseract and poppler-utils to be installed"]
    async fn recognizes_generated_pdf() -> Result<()> {
        let pdf = tokio::fs::read("tests/fixtures/ocr/hello.pdf").await?;
        let content = TransientContent::new(&pdf, "application/pdf", "pdf")?;
        let session = RecognitionSession::new(Box::new(TesseractEngine::new(300)));
        let text = session
            .run(&content, &LanguageSet::new(["eng"]), |_| {})
            .await?;
        assert!(text.to_lowercase().contains("hello"));
        Ok(())
    }
}
