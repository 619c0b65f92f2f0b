//! Command-line entry points.

use clap::Args;

use crate::{
    backend::{BackendClient, BackendConfig, auth::AuthClient},
    languages::LanguageSet,
    ocr::{self, engines::EngineOpts},
    prelude::*,
    ui::{ProgressConfig, Ui},
};

pub mod auth;
pub mod extract;
pub mod history;
pub mod languages;
pub mod schema;
pub mod submit;

/// Options shared by every subcommand that runs OCR.
#[derive(Debug, Clone, Args)]
pub struct OcrOpts {
    /// Language to recognize, as a short code (`ml`) or an engine code
    /// (`mal`). May be repeated. Defaults to English.
    #[clap(short = 'l', long = "language", value_name = "CODE")]
    pub languages: Vec<String>,

    #[clap(flatten)]
    pub engine_opts: EngineOpts,
}

impl OcrOpts {
    /// The languages the user picked.
    pub fn language_set(&self) -> LanguageSet {
        LanguageSet::from_user_codes(&self.languages)
    }
}

/// Extract text from `path`, showing a progress bar while we work.
pub async fn extract_with_progress(ui: &Ui, path: &Path, opts: &OcrOpts) -> Result<String> {
    let languages = opts.language_set();
    let engines = ocr::engines::engine_factory(&opts.engine_opts);
    let progress = ui.new_extraction_progress(&ProgressConfig {
        emoji: "📄",
        msg: "Extracting text",
        done_msg: "Extracted text",
    });
    match ocr::extract_text(path, &languages, engines.as_ref(), progress.callback()).await {
        Ok(text) => {
            progress.finish();
            Ok(text)
        }
        Err(err) => {
            progress.fail();
            Err(err).with_context(|| format!("failed to extract text from {:?}", path.display()))
        }
    }
}

/// Connect to the backend using our environment.
pub fn backend_client() -> Result<BackendClient> {
    Ok(BackendClient::new(BackendConfig::from_env()?))
}

/// An auth client for our backend.
pub fn auth_client() -> Result<AuthClient> {
    Ok(AuthClient::new(backend_client()?))
}
