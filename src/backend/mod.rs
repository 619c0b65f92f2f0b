//! Client for our hosted backend (a Supabase project).
//!
//! We talk to two services over HTTP: GoTrue (`/auth/v1`) for identity, and
//! PostgREST (`/rest/v1`) for the `profiles` and `form_submissions` tables.

use std::env;

use reqwest::{RequestBuilder, Response};
use url::Url;

use crate::prelude::*;

pub mod auth;
pub mod submissions;

/// Environment variable holding the project URL.
pub const URL_VAR: &str = "SUPABASE_URL";

/// Environment variable holding the project's anonymous API key.
pub const ANON_KEY_VAR: &str = "SUPABASE_ANON_KEY";

/// Environment variable overriding where we keep the signed-in session.
pub const SESSION_PATH_VAR: &str = "FORM_AUTOFILLER_SESSION";

/// Where to find the backend, and where to keep our local session.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    /// Project URL, always ending in `/`.
    pub url: Url,

    /// Anonymous API key, sent with every request.
    pub anon_key: String,

    /// Path of the local session file.
    pub session_path: PathBuf,
}

impl BackendConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration using `lookup` to read variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow!("missing environment variable {name}"))
        };

        let mut raw_url = require(URL_VAR)?;
        if !raw_url.ends_with('/') {
            raw_url.push('/');
        }
        let url = Url::parse(&raw_url)
            .with_context(|| format!("invalid {URL_VAR}: {raw_url:?}"))?;
        let anon_key = require(ANON_KEY_VAR)?;

        let session_path = match lookup(SESSION_PATH_VAR) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => dirs::config_dir()
                .ok_or_else(|| {
                    anyhow!("cannot find a config directory; set {SESSION_PATH_VAR}")
                })?
                .join("form-autofiller")
                .join("session.json"),
        };

        Ok(Self {
            url,
            anon_key,
            session_path,
        })
    }

    /// URL of a GoTrue endpoint, e.g. `token`.
    pub fn auth_url(&self, endpoint: &str) -> Result<Url> {
        self.url
            .join(&format!("auth/v1/{endpoint}"))
            .with_context(|| format!("cannot build auth URL for {endpoint:?}"))
    }

    /// URL of a PostgREST table.
    pub fn rest_url(&self, table: &str) -> Result<Url> {
        self.url
            .join(&format!("rest/v1/{table}"))
            .with_context(|| format!("cannot build REST URL for {table:?}"))
    }
}

/// Shared HTTP plumbing for backend calls.
#[derive(Clone, Debug)]
pub struct BackendClient {
    config: BackendConfig,
    http: reqwest::Client,
}

impl BackendClient {
    /// Create a new client.
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Our configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Start a request with the API key attached, and a bearer token if we
    /// have one. Without a token, the anonymous key doubles as the bearer.
    pub fn request(
        &self,
        method: reqwest::Method,
        url: Url,
        access_token: Option<&str>,
    ) -> RequestBuilder {
        let bearer = access_token.unwrap_or(&self.config.anon_key);
        self.http
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
    }
}

/// Error bodies from GoTrue and PostgREST. Between them, these use several
/// different field names for the message.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
    hint: Option<String>,
}

impl ErrorBody {
    fn describe(self) -> Option<String> {
        let message = self
            .message
            .or(self.msg)
            .or(self.error_description)
            .or(self.error)?;
        Some(match self.hint {
            Some(hint) => format!("{message} (hint: {hint})"),
            None => message,
        })
    }
}

/// Turn a non-success response into an error, including the backend's own
/// message if it sent one.
pub async fn check_response(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::describe);
    match message {
        Some(message) => Err(anyhow!("{what} failed (status {status}): {message}")),
        None => Err(anyhow!("{what} failed (status {status})")),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use super::*;

    /// A config pointing at a made-up project.
    pub(crate) fn test_config() -> BackendConfig {
        let vars = HashMap::from([
            (URL_VAR, "https://example.supabase.co"),
            (ANON_KEY_VAR, "anon"),
            (SESSION_PATH_VAR, "/tmp/form-autofiller-test/session.json"),
        ]);
        BackendConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
            .expect("test config should be valid")
    }

    #[test]
    fn builds_endpoint_urls() -> Result<()> {
        let config = test_config();
        assert_eq!(
            config.auth_url("token")?.as_str(),
            "https://example.supabase.co/auth/v1/token"
        );
        assert_eq!(
            config.rest_url("form_submissions")?.as_str(),
            "https://example.supabase.co/rest/v1/form_submissions"
        );
        Ok(())
    }

    #[test]
    fn missing_variables_are_named() {
        let err = BackendConfig::from_lookup(|name| {
            (name == URL_VAR).then(|| "https://example.supabase.co".to_owned())
        })
        .unwrap_err();
        assert!(err.to_string().contains(ANON_KEY_VAR));
    }

    #[test]
    fn error_bodies_prefer_message_and_keep_hints() {
        let body: ErrorBody = serde_json::from_value(json!({
            "message": "permission denied for table form_submissions",
            "hint": "check row level security",
        }))
        .unwrap();
        assert_eq!(
            body.describe().unwrap(),
            "permission denied for table form_submissions (hint: check row level security)"
        );

        let body: ErrorBody = serde_json::from_value(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials",
        }))
        .unwrap();
        assert_eq!(body.describe().unwrap(), "Invalid login credentials");
    }
}
