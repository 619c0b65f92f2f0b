//! The `languages` subcommand.

use clap::Args;

use crate::{
    async_utils::io::{write_json_pretty, write_text},
    languages::{SUPPORTED_LANGUAGES, default_language},
    prelude::*,
};

/// Languages command line arguments.
#[derive(Debug, Args)]
pub struct LanguagesOpts {
    /// Print the catalog as JSON.
    #[clap(long)]
    pub json: bool,
}

/// The `languages` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_languages(opts: &LanguagesOpts) -> Result<()> {
    if opts.json {
        return write_json_pretty(None, SUPPORTED_LANGUAGES).await;
    }

    let default_code = default_language().code;
    let mut out = String::new();
    for lang in SUPPORTED_LANGUAGES {
        let marker = if lang.code == default_code { " (default)" } else { "" };
        out.push_str(&format!(
            "{:<4}{:<5}{}{}\n",
            lang.code, lang.engine_code, lang.name, marker
        ));
    }
    write_text(None, &out).await
}
