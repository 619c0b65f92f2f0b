//! The `history` subcommand.

use clap::Args;

use super::auth_client;
use crate::{
    async_utils::io::{write_json_pretty, write_text},
    backend::{
        auth::AuthSession,
        submissions::{RestSubmissionStore, Submission, SubmissionStore as _},
    },
    prelude::*,
};

/// How much extracted text to show per submission.
const PREVIEW_CHARS: usize = 60;

/// History command line arguments.
#[derive(Debug, Args)]
pub struct HistoryOpts {
    /// Print full records as JSON.
    #[clap(long)]
    pub json: bool,
}

/// The `history` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_history(opts: &HistoryOpts) -> Result<()> {
    let auth = auth_client()?;
    let session = signed_in(auth.current_session().await?)?;
    let store = RestSubmissionStore::new(auth.backend().clone(), &session);
    let submissions = store.list_for_user(session.user.id).await?;

    if opts.json {
        return write_json_pretty(None, &submissions).await;
    }
    if submissions.is_empty() {
        return write_text(None, "No submissions yet.").await;
    }
    let out = submissions
        .iter()
        .map(format_submission)
        .collect::<Vec<_>>()
        .join("\n");
    write_text(None, &out).await
}

/// History is per user, so someone has to be signed in.
fn signed_in(session: Option<AuthSession>) -> Result<AuthSession> {
    session.ok_or_else(|| anyhow!("you must be signed in to see your submissions"))
}

/// One line per submission.
fn format_submission(submission: &Submission) -> String {
    format!(
        "{}  {:<9}  {}  {}",
        submission.created_at.format("%Y-%m-%d %H:%M"),
        submission.status,
        submission.form_url,
        preview(&submission.pdf_content),
    )
}

/// The start of `text`, on one line.
fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let mut short = flat.chars().take(PREVIEW_CHARS).collect::<String>();
        short.push('…');
        short
    }
}
