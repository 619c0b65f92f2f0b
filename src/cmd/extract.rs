//! The `extract` subcommand.

use clap::Args;

use super::{OcrOpts, extract_with_progress};
use crate::{async_utils::io::write_text, prelude::*, ui::Ui};

/// Extract command line arguments.
#[derive(Debug, Args)]
pub struct ExtractOpts {
    /// The PDF to extract text from.
    pub input_path: PathBuf,

    #[clap(flatten)]
    pub ocr_opts: OcrOpts,

    /// Write the text here instead of standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `extract` subcommand.
#[instrument(level = "debug", skip_all, fields(input = %opts.input_path.display()))]
pub async fn cmd_extract(ui: &Ui, opts: &ExtractOpts) -> Result<()> {
    let text = extract_with_progress(ui, &opts.input_path, &opts.ocr_opts).await?;
    write_text(opts.output_path.as_deref(), &text).await
}
