//! Signing in and out, and finding out who we are.
//!
//! The signed-in session lives in a small JSON file between runs, so that
//! `submit` and `history` know which user to act for.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Method;
use schemars::JsonSchema;
use uuid::Uuid;

use super::{BackendClient, check_response};
use crate::prelude::*;

/// The signed-in user, as far as the backend is concerned.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// User ID. Submissions and profiles are keyed by this.
    pub id: Uuid,

    /// Email address, if the backend shared it.
    #[serde(default)]
    pub email: Option<String>,
}

/// A signed-in session, persisted between runs.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Identity,
}

impl AuthSession {
    /// Will the access token expire in the next minute?
    pub fn is_expiring(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now < Duration::seconds(60)
    }
}

/// A row in the `profiles` table.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub place: String,
    pub phone_number: String,
    pub age: u32,
    pub date_of_birth: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields collected at sign-up.
#[derive(Clone, Debug, Serialize)]
pub struct ProfileDetails {
    pub name: String,
    pub place: String,
    pub phone_number: String,
    pub age: u32,
    pub date_of_birth: NaiveDate,
}

/// GoTrue's response to a successful password or refresh-token grant.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: Identity,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: now + Duration::seconds(self.expires_in),
            user: self.user,
        }
    }
}

/// Sign-up returns a session when email confirmation is off, and just the new
/// user when it's on.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    PendingConfirmation(Identity),
}

/// Identity provider backed by GoTrue, with a local session file.
#[derive(Clone, Debug)]
pub struct AuthClient {
    backend: BackendClient,
}

impl AuthClient {
    /// Create a new auth client.
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    /// The backend we talk to.
    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    /// Sign in with an email and password, and remember the session.
    #[instrument(level = "debug", skip_all, fields(email = %email))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let mut url = self.backend.config().auth_url("token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let response = self
            .backend
            .request(Method::POST, url, None)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .context("failed to reach the sign-in endpoint")?;
        let token = check_response(response, "sign in")
            .await?
            .json::<TokenResponse>()
            .await
            .context("failed to parse sign-in response")?;
        let session = token.into_session(Utc::now());
        self.save_session(&session).await?;
        info!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    /// Create an account and its profile. Returns `None` if the backend wants
    /// the email address confirmed before the first sign-in.
    #[instrument(level = "debug", skip_all, fields(email = %email))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        details: &ProfileDetails,
    ) -> Result<Option<AuthSession>> {
        let url = self.backend.config().auth_url("signup")?;
        let response = self
            .backend
            .request(Method::POST, url, None)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .context("failed to reach the sign-up endpoint")?;
        let response = check_response(response, "sign up")
            .await?
            .json::<SignUpResponse>()
            .await
            .context("failed to parse sign-up response")?;

        match response {
            SignUpResponse::Session(token) => {
                let session = token.into_session(Utc::now());
                self.insert_profile(&session, details).await?;
                self.save_session(&session).await?;
                info!(user_id = %session.user.id, "Signed up");
                Ok(Some(session))
            }
            SignUpResponse::PendingConfirmation(user) => {
                info!(user_id = %user.id, "Signed up; waiting for email confirmation");
                Ok(None)
            }
        }
    }

    /// Store the profile row for a new user.
    async fn insert_profile(
        &self,
        session: &AuthSession,
        details: &ProfileDetails,
    ) -> Result<()> {
        let url = self.backend.config().rest_url("profiles")?;
        let mut row = serde_json::to_value(details).context("cannot serialize profile")?;
        row["id"] = json!(session.user.id);
        let response = self
            .backend
            .request(Method::POST, url, Some(&session.access_token))
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await
            .context("failed to reach the profiles table")?;
        check_response(response, "create profile").await?;
        Ok(())
    }

    /// The current session, refreshed if it's about to expire. `None` if
    /// nobody is signed in.
    #[instrument(level = "debug", skip_all)]
    pub async fn current_session(&self) -> Result<Option<AuthSession>> {
        let Some(session) = self.load_session().await? else {
            return Ok(None);
        };
        if !session.is_expiring(Utc::now()) {
            return Ok(Some(session));
        }

        debug!(user_id = %session.user.id, "Refreshing access token");
        let mut url = self.backend.config().auth_url("token")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");
        let response = self
            .backend
            .request(Method::POST, url, None)
            .json(&json!({ "refresh_token": session.refresh_token }))
            .send()
            .await
            .context("failed to reach the token endpoint")?;
        let token = check_response(response, "refresh session")
            .await
            .context("session expired; sign in again")?
            .json::<TokenResponse>()
            .await
            .context("failed to parse refresh response")?;
        let session = token.into_session(Utc::now());
        self.save_session(&session).await?;
        Ok(Some(session))
    }

    /// The current user, if anybody is signed in.
    pub async fn current_user(&self) -> Result<Option<Identity>> {
        Ok(self.current_session().await?.map(|session| session.user))
    }

    /// Fetch a user's profile. `None` if they never created one.
    #[instrument(level = "debug", skip_all, fields(user_id = %session.user.id))]
    pub async fn profile(&self, session: &AuthSession) -> Result<Option<Profile>> {
        let mut url = self.backend.config().rest_url("profiles")?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", session.user.id))
            .append_pair("select", "*");
        let response = self
            .backend
            .request(Method::GET, url, Some(&session.access_token))
            .send()
            .await
            .context("failed to reach the profiles table")?;
        let mut rows = check_response(response, "fetch profile")
            .await?
            .json::<Vec<Profile>>()
            .await
            .context("failed to parse profile")?;
        Ok(rows.pop())
    }

    /// A name to show for the signed-in user.
    pub async fn display_name(&self, session: &AuthSession) -> Result<String> {
        let profile = self.profile(session).await?;
        Ok(display_name(&session.user, profile.as_ref()))
    }

    /// Sign out. The local session is forgotten even if the backend can't be
    /// reached.
    #[instrument(level = "debug", skip_all)]
    pub async fn sign_out(&self) -> Result<()> {
        let session = match self.load_session().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!("Not signed in");
                return Ok(());
            }
            Err(err) => {
                // Without a readable session there's nothing to revoke remotely.
                warn!("Discarding unreadable session: {err:?}");
                self.forget_session().await?;
                info!("Signed out");
                return Ok(());
            }
        };
        let remote = async {
            let url = self.backend.config().auth_url("logout")?;
            let response = self
                .backend
                .request(Method::POST, url, Some(&session.access_token))
                .send()
                .await
                .context("failed to reach the sign-out endpoint")?;
            check_response(response, "sign out").await?;
            Ok::<_, anyhow::Error>(())
        }
        .await;
        self.forget_session().await?;
        if let Err(err) = remote {
            warn!("Could not revoke session on the backend: {err:?}");
        }
        info!(user_id = %session.user.id, "Signed out");
        Ok(())
    }

    async fn load_session(&self) -> Result<Option<AuthSession>> {
        let path = &self.backend.config().session_path;
        load_session_file(path).await
    }

    async fn save_session(&self, session: &AuthSession) -> Result<()> {
        let path = &self.backend.config().session_path;
        save_session_file(path, session).await
    }

    async fn forget_session(&self) -> Result<()> {
        let path = &self.backend.config().session_path;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("cannot remove session file {:?}", path.display())),
        }
    }
}

/// Profile name if there is one, then email, then the bare user ID.
pub fn display_name(user: &Identity, profile: Option<&Profile>) -> String {
    match (profile, &user.email) {
        (Some(profile), _) if !profile.name.trim().is_empty() => profile.name.clone(),
        (_, Some(email)) => email.clone(),
        _ => user.id.to_string(),
    }
}

async fn load_session_file(path: &Path) -> Result<Option<AuthSession>> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("cannot read session file {:?}", path.display()));
        }
    };
    let session = serde_json::from_str(&data)
        .with_context(|| format!("cannot parse session file {:?}", path.display()))?;
    Ok(Some(session))
}

async fn save_session_file(path: &Path, session: &AuthSession) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("cannot create {:?}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(session).context("cannot serialize session")?;
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("cannot write session file {:?}", path.display()))?;

    // The file holds bearer tokens.
    #[cfg(unix)]
    {
        use std::{fs::Permissions, os::unix::fs::PermissionsExt as _};
        tokio::fs::set_permissions(path, Permissions::from_mode(0o600))
            .await
            .with_context(|| format!("cannot restrict {:?}", path.display()))?;
    }
    Ok(())
}
