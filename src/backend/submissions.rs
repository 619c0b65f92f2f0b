//! Saved form submissions.

use chrono::{DateTime, Utc};
use reqwest::Method;
use schemars::JsonSchema;
use uuid::Uuid;

use super::{BackendClient, auth::AuthSession, check_response};
use crate::prelude::*;

/// Name of the backend table.
const TABLE: &str = "form_submissions";

/// A row in the `form_submissions` table.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
pub struct Submission {
    pub id: Uuid,
    pub user_id: Uuid,

    /// Text extracted from the uploaded PDF.
    pub pdf_content: String,

    /// The form this text is meant to fill in.
    pub form_url: String,

    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// A submission we're about to save. The backend fills in the rest.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewSubmission {
    pub user_id: Uuid,
    pub pdf_content: String,
    pub form_url: String,
    pub status: String,
}

/// Somewhere to keep submissions.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Save a submission and return the stored record.
    async fn insert(&self, submission: NewSubmission) -> Result<Submission>;

    /// All of a user's submissions, newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Submission>>;
}

/// Submission store backed by PostgREST, acting as the signed-in user.
pub struct RestSubmissionStore {
    backend: BackendClient,
    access_token: String,
}

impl RestSubmissionStore {
    /// Create a store that acts with `session`'s credentials.
    pub fn new(backend: BackendClient, session: &AuthSession) -> Self {
        Self {
            backend,
            access_token: session.access_token.clone(),
        }
    }
}

#[async_trait]
impl SubmissionStore for RestSubmissionStore {
    #[instrument(level = "debug", skip_all, fields(user_id = %submission.user_id))]
    async fn insert(&self, submission: NewSubmission) -> Result<Submission> {
        let url = self.backend.config().rest_url(TABLE)?;
        let response = self
            .backend
            .request(Method::POST, url, Some(&self.access_token))
            .header("Prefer", "return=representation")
            .json(&submission)
            .send()
            .await
            .context("failed to reach the submissions table")?;
        let mut rows = check_response(response, "save submission")
            .await?
            .json::<Vec<Submission>>()
            .await
            .context("failed to parse saved submission")?;
        let saved = rows
            .pop()
            .ok_or_else(|| anyhow!("backend did not return the saved submission"))?;
        debug!(id = %saved.id, "Saved submission");
        Ok(saved)
    }

    #[instrument(level = "debug", skip_all, fields(user_id = %user_id))]
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Submission>> {
        let url = list_url(&self.backend, user_id)?;
        let response = self
            .backend
            .request(Method::GET, url, Some(&self.access_token))
            .send()
            .await
            .context("failed to reach the submissions table")?;
        let submissions = check_response(response, "list submissions")
            .await?
            .json::<Vec<Submission>>()
            .await
            .context("failed to parse submissions")?;
        debug!(count = submissions.len(), "Listed submissions");
        Ok(submissions)
    }
}

/// Query for one user's submissions, newest first.
fn list_url(backend: &BackendClient, user_id: Uuid) -> Result<url::Url> {
    let mut url = backend.config().rest_url(TABLE)?;
    url.query_pairs_mut()
        .append_pair("user_id", &format!("eq.{user_id}"))
        .append_pair("select", "*")
        .append_pair("order", "created_at.desc");
    Ok(url)
}


#[cfg(test)]
mod tests {
    use super::{memory::MemorySubmissionStore, *};
    use crate::backend::tests::test_config;

    fn new_submission(user_id: Uuid, text: &str) -> NewSubmission {
        NewSubmission {
            user_id,
            pdf_content: text.to_owned(),
            form_url: "https://forms.example.com/apply".to_owned(),
            status: "completed".to_owned(),
        }
    }

    #[test]
    fn list_query_filters_by_user_and_sorts_newest_first() -> Result<()> {
        let backend = BackendClient::new(test_config());
        let url = list_url(&backend, Uuid::nil())?;
        assert_eq!(
            url.as_str(),
            "https://example.supabase.co/rest/v1/form_submissions?user_id=eq.00000000-0000-0000-0000-000000000000&select=*&order=created_at.desc"
        );
        Ok(())
    }

    #[test]
    fn parses_backend_rows() {
        let row: Submission = serde_json::from_value(json!({
            "id": "6f1c1a54-7d0e-4d5b-9d83-2b3c7f0a9e11",
            "user_id": "00000000-0000-0000-0000-000000000000",
            "pdf_content": "Name: Asha",
            "form_url": "https://forms.example.com/apply",
            "status": "completed",
            "created_at": "2024-03-01T10:15:00.123456+00:00",
        }))
        .unwrap();
        assert_eq!(row.pdf_content, "Name: Asha");
        assert_eq!(row.status, "completed");
    }

    #[tokio::test]
    async fn memory_store_lists_only_that_users_rows_newest_first() -> Result<()> {
        let store = MemorySubmissionStore::default();
        let me = Uuid::new_v4();
        let someone_else = Uuid::new_v4();
        store.insert(new_submission(me, "first")).await?;
        store.insert(new_submission(someone_else, "theirs")).await?;
        store.insert(new_submission(me, "second")).await?;

        let mine = store.list_for_user(me).await?;
        let texts = mine.iter().map(|s| s.pdf_content.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, vec!["second", "first"]);
        assert!(store.list_for_user(Uuid::new_v4()).await?.is_empty());
        Ok(())
    }
}
