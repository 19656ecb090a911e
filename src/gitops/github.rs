//! # GitHub Pull Requests
//!
//! Minimal REST client for the two pull-request calls the publisher needs.
//!
//! [`PullRequestApi`] is the seam the publisher depends on, so other hosting
//! providers (or test doubles) can stand in for GitHub.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{Credentials, RepoRef};
use crate::constants::USER_AGENT;
use crate::error::{PipelineError, PullRequestFailure, Result};

/// Request body for opening a pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub draft: bool,
}

/// An opened (or already open) pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
    pub head: String,
    pub base: String,
}

/// Hosting-provider operations used by the publisher
#[async_trait]
pub trait PullRequestApi: Send + Sync {
    /// Open a pull request
    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &NewPullRequest,
        credentials: &Credentials,
    ) -> Result<PullRequestRef>;

    /// Find the open pull request whose head is `head` (a branch in `repo`)
    async fn find_open_pull_request(
        &self,
        repo: &RepoRef,
        head: &str,
        credentials: &Credentials,
    ) -> Result<Option<PullRequestRef>>;
}

#[derive(Debug, Deserialize)]
struct BranchRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    number: u64,
    html_url: String,
    head: BranchRef,
    base: BranchRef,
}

impl From<PullRequestResponse> for PullRequestRef {
    fn from(pr: PullRequestResponse) -> Self {
        Self {
            number: pr.number,
            url: pr.html_url,
            head: pr.head.name,
            base: pr.base.name,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

impl ErrorResponse {
    fn describe(&self) -> String {
        let mut parts: Vec<&str> = self.message.iter().map(String::as_str).collect();
        parts.extend(self.errors.iter().filter_map(|e| e.message.as_deref()));
        parts.join(": ")
    }
}

/// Classify a non-success response from the pull-request endpoints
fn classify_failure(status: u16, body: &ErrorResponse) -> PullRequestFailure {
    match status {
        401 | 403 => PullRequestFailure::Unauthorized,
        404 => PullRequestFailure::NotFound,
        422 if body
            .describe()
            .to_lowercase()
            .contains("already exists") =>
        {
            PullRequestFailure::AlreadyExists
        }
        status => PullRequestFailure::Rejected { status },
    }
}

/// GitHub REST API client
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
                reqwest::Client::new()
            });
        let mut api_url = api_url.into();
        while api_url.ends_with('/') {
            api_url.pop();
        }
        Self { http, api_url }
    }

    fn pulls_url(&self, repo: &RepoRef) -> String {
        format!("{}/repos/{}/{}/pulls", self.api_url, repo.owner, repo.name)
    }

    fn authorized(builder: reqwest::RequestBuilder, credentials: &Credentials) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(credentials.token())
            .header("accept", "application/vnd.github+json")
            .header("x-github-api-version", "2022-11-28")
    }

    async fn failure(head: &str, response: reqwest::Response) -> PipelineError {
        let status = response.status().as_u16();
        let body: ErrorResponse = response.json().await.unwrap_or_default();
        let reason = classify_failure(status, &body);
        let message = match body.describe() {
            described if described.is_empty() => format!("HTTP {status}"),
            described => described,
        };
        error!(status, reason = reason.as_str(), "GitHub pull request call failed: {}", message);
        PipelineError::PullRequestFailed {
            head: head.to_string(),
            reason,
            message,
        }
    }

    fn transport(head: &str, e: &reqwest::Error) -> PipelineError {
        error!("GitHub request failed: {}", e);
        PipelineError::PullRequestFailed {
            head: head.to_string(),
            reason: PullRequestFailure::Transport,
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl PullRequestApi for GitHubClient {
    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &NewPullRequest,
        credentials: &Credentials,
    ) -> Result<PullRequestRef> {
        debug!(repo = %repo, head = %request.head, base = %request.base, "Creating pull request");

        let response = Self::authorized(self.http.post(self.pulls_url(repo)), credentials)
            .json(request)
            .send()
            .await
            .map_err(|e| Self::transport(&request.head, &e))?;

        if !response.status().is_success() {
            return Err(Self::failure(&request.head, response).await);
        }

        let created: PullRequestResponse = response
            .json()
            .await
            .map_err(|e| Self::transport(&request.head, &e))?;
        let created = PullRequestRef::from(created);
        info!(number = created.number, url = %created.url, "Opened pull request");
        Ok(created)
    }

    async fn find_open_pull_request(
        &self,
        repo: &RepoRef,
        head: &str,
        credentials: &Credentials,
    ) -> Result<Option<PullRequestRef>> {
        let head_filter = format!("{}:{}", repo.owner, head);
        let response = Self::authorized(self.http.get(self.pulls_url(repo)), credentials)
            .query(&[("head", head_filter.as_str()), ("state", "open")])
            .send()
            .await
            .map_err(|e| Self::transport(head, &e))?;

        if !response.status().is_success() {
            return Err(Self::failure(head, response).await);
        }

        let open: Vec<PullRequestResponse> = response
            .json()
            .await
            .map_err(|e| Self::transport(head, &e))?;
        Ok(open.into_iter().next().map(PullRequestRef::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> ErrorResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_already_exists_is_detected_from_error_details() {
        let response = body(
            r#"{"message":"Validation Failed","errors":[{"resource":"PullRequest","code":"custom","message":"A pull request already exists for org:db-pass-secret-from-terraform."}]}"#,
        );
        assert_eq!(classify_failure(422, &response), PullRequestFailure::AlreadyExists);
    }

    #[test]
    fn test_other_validation_failures_are_rejections() {
        let response = body(r#"{"message":"Validation Failed","errors":[{"message":"No commits between main and x"}]}"#);
        assert_eq!(
            classify_failure(422, &response),
            PullRequestFailure::Rejected { status: 422 }
        );
    }

    #[test]
    fn test_auth_and_not_found() {
        assert_eq!(classify_failure(401, &ErrorResponse::default()), PullRequestFailure::Unauthorized);
        assert_eq!(classify_failure(403, &ErrorResponse::default()), PullRequestFailure::Unauthorized);
        assert_eq!(classify_failure(404, &ErrorResponse::default()), PullRequestFailure::NotFound);
    }

    #[test]
    fn test_api_url_trailing_slash_is_trimmed() {
        let client = GitHubClient::new("http://127.0.0.1:1234/", Duration::from_secs(5));
        let repo = RepoRef::parse("org/infra").unwrap();
        assert_eq!(client.pulls_url(&repo), "http://127.0.0.1:1234/repos/org/infra/pulls");
    }
}
