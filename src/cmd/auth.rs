//! The `sign-in`, `sign-up`, `sign-out` and `whoami` subcommands.

use chrono::NaiveDate;
use clap::Args;
use tokio::io::{AsyncBufReadExt as _, BufReader};

use super::auth_client;
use crate::{
    async_utils::io::write_text,
    backend::auth::ProfileDetails,
    prelude::*,
};

/// Environment variable we read the password from, before falling back to
/// standard input.
pub const PASSWORD_VAR: &str = "FORM_AUTOFILLER_PASSWORD";

/// Sign-in command line arguments.
#[derive(Debug, Args)]
pub struct SignInOpts {
    /// Account email address.
    #[clap(long)]
    pub email: String,
}

/// Sign-up command line arguments.
#[derive(Debug, Args)]
pub struct SignUpOpts {
    /// Account email address.
    #[clap(long)]
    pub email: String,

    /// Your full name.
    #[clap(long)]
    pub name: String,

    /// Where you live.
    #[clap(long)]
    pub place: String,

    /// Phone number.
    #[clap(long = "phone")]
    pub phone_number: String,

    /// Age in years.
    #[clap(long)]
    pub age: u32,

    /// Date of birth, as YYYY-MM-DD.
    #[clap(long = "dob", value_name = "YYYY-MM-DD")]
    pub date_of_birth: NaiveDate,
}

/// The `sign-in` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_sign_in(opts: &SignInOpts) -> Result<()> {
    let auth = auth_client()?;
    let password = read_password().await?;
    let session = auth.sign_in(&opts.email, &password).await?;
    let name = auth.display_name(&session).await?;
    write_text(None, &format!("Signed in as {name}")).await
}

/// The `sign-up` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_sign_up(opts: &SignUpOpts) -> Result<()> {
    let auth = auth_client()?;
    let password = read_password().await?;
    let details = ProfileDetails {
        name: opts.name.clone(),
        place: opts.place.clone(),
        phone_number: opts.phone_number.clone(),
        age: opts.age,
        date_of_birth: opts.date_of_birth,
    };
    match auth.sign_up(&opts.email, &password, &details).await? {
        Some(_) => write_text(None, &format!("Signed up and signed in as {}", opts.name)).await,
        None => {
            write_text(
                None,
                "Signed up. Check your email to confirm your account, then sign in.",
            )
            .await
        }
    }
}

/// The `sign-out` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_sign_out() -> Result<()> {
    auth_client()?.sign_out().await?;
    write_text(None, "Signed out").await
}

/// The `whoami` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_whoami() -> Result<()> {
    let auth = auth_client()?;
    let Some(session) = auth.current_session().await? else {
        return write_text(None, "Not signed in").await;
    };
    let mut out = format!("{}\nUser ID: {}", auth.display_name(&session).await?, session.user.id);
    if let Some(email) = &session.user.email {
        out.push_str(&format!("\nEmail: {email}"));
    }
    write_text(None, &out).await
}

/// Get the password from the environment, or the first line of stdin.
async fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_VAR) {
        return Ok(password);
    }
    eprintln!("Password:");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("cannot read password from standard input")?;
    let password = line.trim_end_matches(['\r', '\n']).to_owned();
    if password.is_empty() {
        return Err(anyhow!("no password given (set {PASSWORD_VAR} or type it on stdin)"));
    }
    Ok(password)
}
