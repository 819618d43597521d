//! VCS collaborator: the REST calls the pipeline makes against GitHub.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{GitHubSettings, STATUS_CONTEXT};
use crate::error::VcsError;
use crate::models::webhook::PullRequestPayload;
use crate::models::{CommitState, RepoRef};

/// HTTP connect timeout for GitHub API calls.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// HTTP total timeout for GitHub API calls.
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PER_PAGE: usize = 100;
/// GitHub lists at most 3000 files per pull request.
const MAX_FILE_PAGES: u32 = 30;
const MAX_COMMENT_PAGES: u32 = 10;
const API_VERSION: &str = "2022-11-28";

/// Pull request state as read at fetch time.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestInfo {
    pub number: u64,
    pub head_ref: String,
    pub head_sha: String,
    pub base_ref: String,
    pub html_url: Option<String>,
    pub repository_url: Option<String>,
    /// Head repository URL when the pull request comes from a fork.
    pub fork_url: Option<String>,
}

impl From<PullRequestPayload> for PullRequestInfo {
    fn from(pr: PullRequestPayload) -> Self {
        let fork_url = pr
            .head
            .repo
            .as_ref()
            .filter(|repo| repo.fork)
            .map(|repo| repo.html_url.clone());
        Self {
            number: pr.number,
            head_ref: pr.head.git_ref,
            head_sha: pr.head.sha,
            base_ref: pr.base.git_ref,
            html_url: pr.html_url,
            repository_url: pr.base.repo.map(|repo| repo.html_url),
            fork_url,
        }
    }
}

/// One file of a pull request diff.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChangedFile {
    #[serde(rename = "filename")]
    pub path: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Unified diff hunks; absent for binary or oversized files.
    #[serde(default)]
    pub patch: Option<String>,
}

/// Operations against the VCS host.
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Check that the credentials can see `repo`.
    async fn authenticate(&self, repo: &RepoRef) -> Result<(), VcsError>;

    async fn fetch_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<PullRequestInfo, VcsError>;

    async fn fetch_pull_request_diff(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Vec<ChangedFile>, VcsError>;

    /// Declared SPDX license of the repository, `None` when there is none.
    async fn fetch_repository_license(&self, repo: &RepoRef) -> Result<Option<String>, VcsError>;

    async fn set_commit_status(
        &self,
        repo: &RepoRef,
        sha: &str,
        state: CommitState,
        description: &str,
    ) -> Result<(), VcsError>;

    /// Edit the comment containing `marker`, or post a new one.
    async fn post_or_update_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        marker: &str,
        body: &str,
    ) -> Result<(), VcsError>;
}

#[derive(Deserialize)]
struct LicenseResponse {
    license: Option<LicenseInfo>,
}

#[derive(Deserialize)]
struct LicenseInfo {
    spdx_id: Option<String>,
}

#[derive(Deserialize)]
struct IssueComment {
    id: u64,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Serialize)]
struct StatusRequest<'a> {
    state: &'a str,
    description: &'a str,
    context: &'a str,
}

#[derive(Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

/// `reqwest` implementation of [`VcsClient`] for the GitHub REST API.
#[derive(Clone)]
pub struct GitHubClient {
    api_url: String,
    token: Option<SecretString>,
    http_client: reqwest::Client,
}

impl GitHubClient {
    pub fn new(settings: &GitHubSettings) -> Result<Self, VcsError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VcsError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            http_client,
        })
    }

    fn repo_url(&self, repo: &RepoRef, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.api_url,
            urlencoding::encode(&repo.owner),
            urlencoding::encode(&repo.name),
            rest
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http_client
            .request(method, url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "lpvs")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(ref token) = self.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret()));
        }
        builder
    }

    async fn send(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<Response, VcsError> {
        let response = builder
            .send()
            .await
            .map_err(|e| VcsError::Transport(format!("{}: {}", what, e)))?;
        check_status(response, what).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        what: &str,
    ) -> Result<T, VcsError> {
        self.send(self.request(reqwest::Method::GET, url), what)
            .await?
            .json()
            .await
            .map_err(|e| VcsError::Decode(format!("{}: {}", what, e)))
    }
}

/// Map non-success responses to [`VcsError`].
async fn check_status(response: Response, what: &str) -> Result<Response, VcsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let rate_limited = is_rate_limited(status, response.headers());
    let retry_after_secs = retry_after(response.headers());
    let message = response.text().await.unwrap_or_default();
    debug!(target: "vcs", status = status.as_u16(), what, "GitHub request failed");

    Err(match status {
        _ if rate_limited => VcsError::RateLimited { retry_after_secs },
        StatusCode::UNAUTHORIZED => VcsError::Unauthorized,
        StatusCode::FORBIDDEN => VcsError::Forbidden(what.to_string()),
        StatusCode::NOT_FOUND => VcsError::NotFound(what.to_string()),
        _ => VcsError::Http {
            status: status.as_u16(),
            message: message.chars().take(200).collect(),
        },
    })
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && (headers.contains_key("retry-after")
            || headers
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                == Some("0"))
}

fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[async_trait]
impl VcsClient for GitHubClient {
    async fn authenticate(&self, repo: &RepoRef) -> Result<(), VcsError> {
        self.send(
            self.request(reqwest::Method::GET, &self.repo_url(repo, "")),
            "repository",
        )
        .await?;
        Ok(())
    }

    async fn fetch_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<PullRequestInfo, VcsError> {
        let url = self.repo_url(repo, &format!("/pulls/{}", number));
        let payload: PullRequestPayload = self.get_json(&url, "pull request").await?;
        Ok(payload.into())
    }

    async fn fetch_pull_request_diff(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Vec<ChangedFile>, VcsError> {
        let mut files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let url = self.repo_url(
                repo,
                &format!("/pulls/{}/files?per_page={}&page={}", number, PER_PAGE, page),
            );
            let batch: Vec<ChangedFile> = self.get_json(&url, "pull request files").await?;
            let last = batch.len() < PER_PAGE;
            files.extend(batch);
            if last {
                return Ok(files);
            }
        }
        warn!(
            target: "vcs",
            repository = %repo,
            pull_request = number,
            files = files.len(),
            "Pull request file list truncated"
        );
        Ok(files)
    }

    async fn fetch_repository_license(&self, repo: &RepoRef) -> Result<Option<String>, VcsError> {
        let url = self.repo_url(repo, "/license");
        match self.get_json::<LicenseResponse>(&url, "repository license").await {
            Ok(response) => Ok(response
                .license
                .and_then(|l| l.spdx_id)
                .filter(|id| !id.is_empty() && id != "NOASSERTION")),
            Err(VcsError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_commit_status(
        &self,
        repo: &RepoRef,
        sha: &str,
        state: CommitState,
        description: &str,
    ) -> Result<(), VcsError> {
        let url = self.repo_url(repo, &format!("/statuses/{}", sha));
        let body = StatusRequest {
            state: state.as_str(),
            description,
            context: STATUS_CONTEXT,
        };
        self.send(
            self.request(reqwest::Method::POST, &url).json(&body),
            "commit status",
        )
        .await?;
        Ok(())
    }

    async fn post_or_update_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        marker: &str,
        body: &str,
    ) -> Result<(), VcsError> {
        let mut existing = None;
        'pages: for page in 1..=MAX_COMMENT_PAGES {
            let url = self.repo_url(
                repo,
                &format!("/issues/{}/comments?per_page={}&page={}", number, PER_PAGE, page),
            );
            let batch: Vec<IssueComment> = self.get_json(&url, "pull request comments").await?;
            let last = batch.len() < PER_PAGE;
            for comment in batch {
                if comment.body.as_deref().is_some_and(|b| b.contains(marker)) {
                    existing = Some(comment.id);
                    break 'pages;
                }
            }
            if last {
                break;
            }
        }

        let request = match existing {
            Some(id) => self.request(
                reqwest::Method::PATCH,
                &self.repo_url(repo, &format!("/issues/comments/{}", id)),
            ),
            None => self.request(
                reqwest::Method::POST,
                &self.repo_url(repo, &format!("/issues/{}/comments", number)),
            ),
        };
        self.send(request.json(&CommentRequest { body }), "pull request comment")
            .await?;
        Ok(())
    }
}
