use async_trait::async_trait;
use serde::Deserialize;

use crate::models::ticket::{RawComment, RawIssue};

/// Failure classes for tracker calls. The fetch pool keys its retry policy
/// off these: `Auth` and `NotFound` are definitive, `RateLimit` backs off
/// exponentially, everything else linearly.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited: {0}")]
    RateLimit(String),
    #[error("transient tracker error: {0}")]
    Transient(String),
    #[error("unexpected tracker response: {0}")]
    Protocol(String),
}

impl TrackerError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, TrackerError::RateLimit(_))
    }

    /// Errors where another attempt cannot succeed.
    pub fn is_definitive(&self) -> bool {
        matches!(self, TrackerError::Auth(_) | TrackerError::NotFound(_))
    }
}

/// Adapter over the ticket tracker's REST/query API. Implementations must be
/// safe for concurrent use; the fetch pool shares one instance across all
/// workers.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Fetch a single issue with its changelog expanded.
    async fn issue(&self, key: &str) -> Result<RawIssue, TrackerError>;
    /// Fetch all comments of an issue.
    async fn comments(&self, key: &str) -> Result<Vec<RawComment>, TrackerError>;
    /// Run a query and return matching issue keys, newest start first.
    async fn search(&self, filter: &str, max_results: u32) -> Result<Vec<String>, TrackerError>;
    /// Display name of the authenticated user; doubles as a credential check.
    async fn myself(&self) -> Result<String, TrackerError>;
}

/// Tracker backed by a Jira-compatible REST API with per-request basic auth.
pub struct JiraTracker {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl JiraTracker {
    pub fn new(base_url: &str, username: &str, password: &str, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, TrackerError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| TrackerError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(classify_status(status.as_u16(), &text, path))
    }
}

fn classify_status(status: u16, text: &str, context: &str) -> TrackerError {
    let lower = text.to_lowercase();
    match status {
        401 | 403 => TrackerError::Auth(format!("{status} on {context}")),
        404 => TrackerError::NotFound(context.to_string()),
        429 => TrackerError::RateLimit(format!("429 on {context}")),
        _ if lower.contains("rate") || lower.contains("too many") => {
            TrackerError::RateLimit(format!("{status} on {context}: {text}"))
        }
        500..=599 => TrackerError::Transient(format!("{status} on {context}")),
        _ => TrackerError::Protocol(format!("{status} on {context}: {text}")),
    }
}

#[derive(Debug, Deserialize)]
struct WireUser {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
}

impl WireUser {
    fn best_name(self) -> String {
        self.display_name.or(self.name).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct WireComment {
    #[serde(default)]
    id: String,
    #[serde(default)]
    author: Option<WireUser>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
struct WireCommentPage {
    #[serde(default)]
    comments: Vec<WireComment>,
}

#[derive(Debug, Deserialize)]
struct WireSearchIssue {
    key: String,
}

#[derive(Debug, Deserialize)]
struct WireSearchPage {
    #[serde(default)]
    issues: Vec<WireSearchIssue>,
}

#[async_trait]
impl Tracker for JiraTracker {
    async fn issue(&self, key: &str) -> Result<RawIssue, TrackerError> {
        let path = format!("/rest/api/2/issue/{key}?expand=changelog");
        let response = self.get(&path).await?;
        response
            .json::<RawIssue>()
            .await
            .map_err(|e| TrackerError::Protocol(format!("decoding issue {key}: {e}")))
    }

    async fn comments(&self, key: &str) -> Result<Vec<RawComment>, TrackerError> {
        let path = format!("/rest/api/2/issue/{key}/comment");
        let response = self.get(&path).await?;
        let page = response
            .json::<WireCommentPage>()
            .await
            .map_err(|e| TrackerError::Protocol(format!("decoding comments of {key}: {e}")))?;
        Ok(page
            .comments
            .into_iter()
            .map(|c| RawComment {
                id: c.id,
                author: c.author.map(WireUser::best_name).unwrap_or_default(),
                created: c.created,
                body: c.body,
            })
            .collect())
    }

    async fn search(&self, filter: &str, max_results: u32) -> Result<Vec<String>, TrackerError> {
        let path = format!(
            "/rest/api/2/search?jql={}&maxResults={max_results}&fields=key",
            urlencoding::encode(filter)
        );
        let response = self.get(&path).await?;
        let page = response
            .json::<WireSearchPage>()
            .await
            .map_err(|e| TrackerError::Protocol(format!("decoding search result: {e}")))?;
        Ok(page.issues.into_iter().map(|i| i.key).collect())
    }

    async fn myself(&self) -> Result<String, TrackerError> {
        let response = self.get("/rest/api/2/myself").await?;
        let user = response
            .json::<WireUser>()
            .await
            .map_err(|e| TrackerError::Protocol(format!("decoding myself: {e}")))?;
        Ok(user.best_name())
    }
}
