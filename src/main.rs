use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod async_utils;
mod backend;
mod cmd;
mod cpu_limit;
mod forms;
mod languages;
mod ocr;
mod prelude;
mod ui;

/// Extract text from PDF forms with OCR, and keep a history of submissions.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - SUPABASE_URL: The backend project URL.
  - SUPABASE_ANON_KEY: The backend's anonymous API key.
  - FORM_AUTOFILLER_SESSION (optional): Where to keep the signed-in session.
  - FORM_AUTOFILLER_PASSWORD (optional): Password for `sign-in` and `sign-up`.
    If unset, the password is read from standard input.

  `extract` needs `tesseract` and `pdftocairo` (from poppler-utils) on the
  PATH, plus tesseract language data for every language you ask for.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// List the languages we can recognize.
    Languages(cmd::languages::LanguagesOpts),
    /// Extract text from a PDF.
    Extract(cmd::extract::ExtractOpts),
    /// Extract text from a PDF and save it as a form submission.
    Submit(cmd::submit::SubmitOpts),
    /// List your past submissions, newest first.
    History(cmd::history::HistoryOpts),
    /// Sign in to your account.
    SignIn(cmd::auth::SignInOpts),
    /// Create an account and profile.
    SignUp(cmd::auth::SignUpOpts),
    /// Sign out.
    SignOut,
    /// Show who is signed in.
    Whoami,
    /// Print schemas for stored record types.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Is the main output of this command going to stdout along with progress
    /// bars?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Extract(opts) => opts.output_path.is_none(),
            Cmd::Schema(opts) => opts.output_path.is_none(),
            Cmd::Submit(_) => false,
            Cmd::Languages(_)
            | Cmd::History(_)
            | Cmd::SignIn(_)
            | Cmd::SignUp(_)
            | Cmd::SignOut
            | Cmd::Whoami => true,
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    // We can stack multiple layers here if we need to.
    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Hide the progress bar if we're using stdout for output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Languages(opts) => cmd::languages::cmd_languages(opts).await?,
        Cmd::Extract(opts) => cmd::extract::cmd_extract(&ui, opts).await?,
        Cmd::Submit(opts) => cmd::submit::cmd_submit(&ui, opts).await?,
        Cmd::History(opts) => cmd::history::cmd_history(opts).await?,
        Cmd::SignIn(opts) => cmd::auth::cmd_sign_in(opts).await?,
        Cmd::SignUp(opts) => cmd::auth::cmd_sign_up(opts).await?,
        Cmd::SignOut => cmd::auth::cmd_sign_out().await?,
        Cmd::Whoami => cmd::auth::cmd_whoami().await?,
        Cmd::Schema(schema_opts) => cmd::schema::cmd_schema(schema_opts).await?,
    }
    Ok(())
}
