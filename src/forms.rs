//! Saving extracted text as a form submission, and opening the form.

use tokio::process::Command;
use url::Url;

use crate::{
    async_utils::check_for_command_failure,
    backend::{
        auth::Identity,
        submissions::{NewSubmission, Submission, SubmissionStore},
    },
    prelude::*,
};

/// Status recorded for every new submission.
pub const COMPLETED: &str = "completed";

/// Why a submission couldn't be saved.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("you must be signed in to submit a form")]
    NotSignedIn,

    #[error("no text was extracted, so there is nothing to submit")]
    EmptyText,

    #[error("invalid form URL {url:?}: {reason}")]
    InvalidFormUrl { url: String, reason: String },

    #[error("failed to save submission")]
    Persistence(#[source] anyhow::Error),
}

/// Save `text` as a submission for `user`, aimed at `form_url`.
#[instrument(level = "debug", skip_all, fields(form_url = %form_url))]
pub async fn submit_form(
    store: &dyn SubmissionStore,
    user: Option<&Identity>,
    text: &str,
    form_url: &str,
) -> Result<Submission, SubmitError> {
    let user = user.ok_or(SubmitError::NotSignedIn)?;
    if text.trim().is_empty() {
        return Err(SubmitError::EmptyText);
    }
    let form_url = parse_form_url(form_url)?;

    let submission = store
        .insert(NewSubmission {
            user_id: user.id,
            pdf_content: text.to_owned(),
            form_url: form_url.to_string(),
            status: COMPLETED.to_owned(),
        })
        .await
        .map_err(SubmitError::Persistence)?;
    info!(id = %submission.id, user_id = %user.id, "Saved submission");
    Ok(submission)
}

/// Accept only absolute `http` and `https` URLs.
pub fn parse_form_url(form_url: &str) -> Result<Url, SubmitError> {
    let invalid = |reason: String| SubmitError::InvalidFormUrl {
        url: form_url.to_owned(),
        reason,
    };
    let url = Url::parse(form_url.trim()).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(invalid(format!("unsupported scheme {scheme:?}"))),
    }
}

/// Open `url` in the user's browser.
#[instrument(level = "debug", skip_all, fields(url = %url))]
pub async fn open_form(url: &Url) -> Result<()> {
    let mut cmd = opener_command(url);
    let output = cmd
        .output()
        .await
        .with_context(|| format!("cannot open {url} in a browser"))?;
    check_for_command_failure("browser opener", &output, None)?;
    Ok(())
}

#[cfg(target_os = "macos")]
fn opener_command(url: &Url) -> Command {
    let mut cmd = Command::new("open");
    cmd.arg(url.as_str());
    cmd
}

#[cfg(windows)]
fn opener_command(url: &Url) -> Command {
    // The empty string is the window title `start` expects first.
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "start", ""]).arg(url.as_str());
    cmd
}

#[cfg(not(any(target_os = "macos", windows)))]
fn opener_command(url: &Url) -> Command {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(url.as_str());
    cmd
}
