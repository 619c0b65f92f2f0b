//! A scripted engine for tests. It records every call and can be told to fail
//! at any step.

use std::sync::{Arc, Mutex};

use crate::{ocr::content::TransientContent, prelude::*};

use super::{EngineFactory, RecognitionEngine};

/// One step of the engine lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Load,
    LoadLanguages,
    Initialize,
    Recognize,
    Terminate,
}

/// A call made to a [`ScriptedEngine`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Load,
    LoadLanguages(String),
    Initialize(String),
    /// Records the content path and whether it was still live at the time.
    Recognize { path: PathBuf, live: bool },
    Terminate,
}

/// Shared record of calls, across every engine a factory creates.
#[derive(Clone, Debug, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.lock().expect("call log poisoned").push(call);
    }

    /// Everything recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().expect("call log poisoned").clone()
    }

    /// How many times was `terminate` called?
    pub fn terminate_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == Call::Terminate)
            .count()
    }

    /// Content paths passed to `recognize`.
    pub fn recognized_paths(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Recognize { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }
}

/// An engine that does what it's told.
pub struct ScriptedEngine {
    log: CallLog,
    text: Option<String>,
    fail_at: Option<Step>,
}

impl ScriptedEngine {
    fn step(&self, step: Step) -> Result<()> {
        if self.fail_at == Some(step) {
            Err(anyhow!("scripted failure at {step:?}"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecognitionEngine for ScriptedEngine {
    async fn load(&mut self) -> Result<()> {
        self.log.push(Call::Load);
        self.step(Step::Load)
    }

    async fn load_languages(&mut self, specifier: &str) -> Result<()> {
        self.log.push(Call::LoadLanguages(specifier.to_owned()));
        self.step(Step::LoadLanguages)
    }

    async fn initialize(&mut self, specifier: &str) -> Result<()> {
        self.log.push(Call::Initialize(specifier.to_owned()));
        self.step(Step::Initialize)
    }

    async fn recognize(&mut self, content: &TransientContent) -> Result<Option<String>> {
        self.log.push(Call::Recognize {
            path: content.path().to_owned(),
            live: content.is_live() && content.path().exists(),
        });
        self.step(Step::Recognize)?;
        Ok(self.text.clone())
    }

    async fn terminate(&mut self) -> Result<()> {
        self.log.push(Call::Terminate);
        self.step(Step::Terminate)
    }
}

/// Factory for [`ScriptedEngine`]s that all share one [`CallLog`].
pub struct ScriptedFactory {
    pub log: CallLog,
    pub text: Option<String>,
    pub fail_at: Option<Step>,
}

impl ScriptedFactory {
    /// A factory whose engines succeed and return `text`.
    pub fn returning(text: &str) -> Self {
        Self {
            log: CallLog::default(),
            text: Some(text.to_owned()),
            fail_at: None,
        }
    }

    /// A factory whose engines fail at `step`.
    pub fn failing_at(step: Step) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::returning("unused")
        }
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(&self) -> Result<Box<dyn RecognitionEngine>> {
        Ok(Box::new(ScriptedEngine {
            log: self.log.clone(),
            text: self.text.clone(),
            fail_at: self.fail_at,
        }))
    }
}
