//! Driving a recognition engine through its lifecycle.
//!
//! The stage table below is the single source of truth for progress
//! checkpoints. [`RecognitionSession::run`] walks it in order, reporting each
//! checkpoint before doing that stage's work, and always terminates the engine
//! on the way out.

use std::fmt;

use super::{ExtractError, content::TransientContent, engines::RecognitionEngine};
use crate::{languages::LanguageSet, prelude::*};

/// A stage in a single extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Loading,
    LoadingLanguages,
    Initializing,
    Recognizing,
    Processing,
    Complete,
}

impl Stage {
    /// The stages that do work, in the order they run. [`Stage::Complete`] is
    /// reported separately, once the engine has been terminated.
    pub const PIPELINE: [Stage; 5] = [
        Stage::Loading,
        Stage::LoadingLanguages,
        Stage::Initializing,
        Stage::Recognizing,
        Stage::Processing,
    ];

    /// Progress checkpoint reported when this stage starts.
    pub fn percent(self) -> u8 {
        match self {
            Stage::Loading => 10,
            Stage::LoadingLanguages => 25,
            Stage::Initializing => 40,
            Stage::Recognizing => 60,
            Stage::Processing => 85,
            Stage::Complete => 100,
        }
    }

    /// Human-readable status.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Loading => "Loading engine...",
            Stage::LoadingLanguages => "Loading languages...",
            Stage::Initializing => "Initializing OCR...",
            Stage::Recognizing => "Recognizing text...",
            Stage::Processing => "Processing text...",
            Stage::Complete => "Complete!",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A progress report from an extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Which stage we've reached.
    pub stage: Stage,

    /// Percent complete, in `0..=100`.
    pub percent: u8,
}

impl ProgressEvent {
    fn at(stage: Stage) -> Self {
        Self {
            stage,
            percent: stage.percent(),
        }
    }

    /// Human-readable status.
    pub fn label(&self) -> &'static str {
        self.stage.label()
    }
}

/// Owns one engine for the duration of one recognition.
pub struct RecognitionSession {
    engine: Box<dyn RecognitionEngine>,
}

impl RecognitionSession {
    /// Wrap a freshly created engine.
    pub fn new(engine: Box<dyn RecognitionEngine>) -> Self {
        Self { engine }
    }

    /// Run every stage against `content` and return the recognized text.
    ///
    /// Consumes the session: once the engine is terminated it can't be used
    /// again. The engine is terminated whether or not the stages succeed.
    #[instrument(level = "debug", skip_all, fields(languages = %languages))]
    pub async fn run<F>(
        mut self,
        content: &TransientContent,
        languages: &LanguageSet,
        mut on_progress: F,
    ) -> Result<String, ExtractError>
    where
        F: FnMut(ProgressEvent) + Send,
    {
        let specifier = languages.specifier();
        let outcome = self.run_stages(content, &specifier, &mut on_progress).await;
        let terminated = self.engine.terminate().await;

        match (outcome, terminated) {
            (Ok(text), Ok(())) => {
                on_progress(ProgressEvent::at(Stage::Complete));
                Ok(text)
            }
            (Ok(_), Err(err)) => {
                error!("Failed to terminate recognition engine: {err:?}");
                Err(ExtractError::recognition(
                    err.context("failed to terminate recognition engine"),
                ))
            }
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(terminate_err)) => {
                warn!("Also failed to terminate recognition engine: {terminate_err:?}");
                Err(err)
            }
        }
    }

    /// The driver loop. Stops at the first failing stage.
    async fn run_stages<F>(
        &mut self,
        content: &TransientContent,
        specifier: &str,
        on_progress: &mut F,
    ) -> Result<String, ExtractError>
    where
        F: FnMut(ProgressEvent) + Send,
    {
        let mut recognized = None;
        let mut text = String::new();
        for stage in Stage::PIPELINE {
            on_progress(ProgressEvent::at(stage));
            debug!(stage = ?stage, "Starting recognition stage");
            let result = match stage {
                Stage::Loading => self.engine.load().await,
                Stage::LoadingLanguages => self.engine.load_languages(specifier).await,
                Stage::Initializing => self.engine.initialize(specifier).await,
                Stage::Recognizing if !content.is_live() => {
                    Err(anyhow!("content was revoked before recognition"))
                }
                Stage::Recognizing => self
                    .engine
                    .recognize(content)
                    .await
                    .map(|output| recognized = output),
                Stage::Processing => {
                    text = clean_recognized_text(recognized.take());
                    Ok(())
                }
                Stage::Complete => Ok(()),
            };
            if let Err(err) = result {
                error!(stage = ?stage, "Recognition stage failed: {err:?}");
                return Err(ExtractError::recognition(err));
            }
        }
        Ok(text)
    }
}

/// Turn raw engine output into result text. Engines end each page with a
/// form feed; we separate pages with a blank line instead and drop the empty
/// page after the last separator. Page text is otherwise kept as-is.
fn clean_recognized_text(raw: Option<String>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    let mut text = String::new();
    for page in raw
        .replace("\r\n", "\n")
        .split('\u{000C}')
        .filter(|page| !page.trim().is_empty())
    {
        if !text.is_empty() {
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text.push('\n');
        }
        text.push_str(page);
    }
    text
}
