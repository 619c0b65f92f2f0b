//! Recognition engine interface.
//!
//! An engine is used once: it's loaded, given its language data, initialized,
//! asked to recognize a single piece of content, and then terminated. The
//! session in [`super::session`] is responsible for calling these in order.

use clap::{Args, ValueEnum};

use super::content::TransientContent;
use crate::prelude::*;

pub mod pdftotext;
#[cfg(test)]
pub mod scripted;
pub mod tesseract;

/// A single-use OCR engine.
#[async_trait]
pub trait RecognitionEngine: Send {
    /// Make sure the engine itself is available.
    async fn load(&mut self) -> Result<()>;

    /// Load language data for a composite specifier like `eng+mal`.
    async fn load_languages(&mut self, specifier: &str) -> Result<()>;

    /// Prepare the engine to recognize text in `specifier`'s languages.
    async fn initialize(&mut self, specifier: &str) -> Result<()>;

    /// Recognize text in `content`. `None` means the engine produced no text
    /// result at all, which is not an error.
    async fn recognize(&mut self, content: &TransientContent) -> Result<Option<String>>;

    /// Release everything the engine holds. Must be safe to call after any
    /// earlier step failed.
    async fn terminate(&mut self) -> Result<()>;
}

/// Produces a fresh engine for every extraction.
pub trait EngineFactory: Send + Sync {
    /// Create a new, unloaded engine.
    fn create(&self) -> Result<Box<dyn RecognitionEngine>>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Result<Box<dyn RecognitionEngine>> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn RecognitionEngine>> {
        self()
    }
}

/// The engines we know how to drive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// The `tesseract` CLI. PDFs are rasterized with `pdftocairo` first.
    #[default]
    Tesseract,
    /// `pdftotext` from `poppler-utils`. Fast, but only sees PDFs that already
    /// have a text layer, and ignores the language selection.
    Pdftotext,
}

/// Command-line options for choosing and tuning an engine.
#[derive(Args, Clone, Debug)]
pub struct EngineOpts {
    /// Which OCR engine to use.
    #[clap(long, value_enum, default_value = "tesseract")]
    pub engine: EngineKind,

    /// The DPI to use when rasterizing PDF pages for OCR.
    #[clap(long, default_value = "300")]
    pub dpi: u32,
}

impl Default for EngineOpts {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            dpi: 300,
        }
    }
}

/// Get an engine factory for the specified options.
pub fn engine_factory(opts: &EngineOpts) -> Box<dyn EngineFactory> {
    match opts.engine {
        EngineKind::Tesseract => {
            let dpi = opts.dpi;
            Box::new(move || -> Result<Box<dyn RecognitionEngine>> {
                Ok(Box::new(tesseract::TesseractEngine::new(dpi)))
            })
        }
        EngineKind::Pdftotext => Box::new(|| -> Result<Box<dyn RecognitionEngine>> {
            Ok(Box::new(pdftotext::PdfToTextEngine::new()))
        }),
    }
}

/// Does `err` mean the command we tried to spawn isn't installed?
pub(crate) fn is_command_missing(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::NotFound
}
