//! The `submit` subcommand.

use clap::Args;

use super::{OcrOpts, auth_client, extract_with_progress};
use crate::{
    async_utils::io::write_text,
    backend::submissions::RestSubmissionStore,
    forms::{SubmitError, open_form, parse_form_url, submit_form},
    prelude::*,
    ui::Ui,
};

/// Submit command line arguments.
#[derive(Debug, Args)]
pub struct SubmitOpts {
    /// The PDF to extract text from.
    pub input_path: PathBuf,

    /// The form the extracted text is for.
    #[clap(long, value_name = "URL")]
    pub form_url: String,

    #[clap(flatten)]
    pub ocr_opts: OcrOpts,

    /// Open the form in a browser once the submission is saved.
    #[clap(long)]
    pub open: bool,
}

/// The `submit` subcommand.
#[instrument(level = "debug", skip_all, fields(input = %opts.input_path.display()))]
pub async fn cmd_submit(ui: &Ui, opts: &SubmitOpts) -> Result<()> {
    // Check everything we can before spending time on OCR.
    let form_url = parse_form_url(&opts.form_url)?;
    let auth = auth_client()?;
    let session = auth.current_session().await?.ok_or(SubmitError::NotSignedIn)?;

    let text = extract_with_progress(ui, &opts.input_path, &opts.ocr_opts).await?;

    let store = RestSubmissionStore::new(auth.backend().clone(), &session);
    let submission =
        submit_form(&store, Some(&session.user), &text, form_url.as_str()).await?;
    write_text(
        None,
        &format!(
            "Saved submission {}\nForm: {}",
            submission.id, submission.form_url
        ),
    )
    .await?;

    if opts.open {
        open_form(&form_url).await?;
    }
    Ok(())
}
