//! GitHub API client for publishing posts: branch, commit, pull request.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("GitHub API error: {0}")]
    Api(String),

    #[error("unexpected response: {0}")]
    Parse(String),
}

/// Target repository settings.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub token: String,
    /// "owner/name".
    pub repo: String,
    pub base_branch: String,
}

impl GitHubConfig {
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("GITHUB_TOKEN").ok()?;
        let repo = std::env::var("GITHUB_CONTENT_REPO").ok()?;
        let base_branch =
            std::env::var("GITHUB_BASE_BRANCH").unwrap_or_else(|_| "main".to_string());
        Some(Self {
            token,
            repo,
            base_branch,
        })
    }
}

/// An opened pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

#[derive(Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    commit: CommitInfo,
}

#[derive(Deserialize)]
struct CommitInfo {
    sha: String,
}

/// GitHub REST client scoped to one content repository.
pub struct GitHubClient {
    client: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("https://api.github.com/repos/{}/{}", self.config.repo, path)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.config.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "postline")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, GitHubError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(GitHubError::Api(text))
    }

    async fn branch_sha(&self, branch: &str) -> Result<String, GitHubError> {
        let response = self
            .request(self.client.get(self.url(&format!("git/ref/heads/{branch}"))))
            .send()
            .await
            .map_err(|e| GitHubError::Request(e.to_string()))?;
        let parsed: GitRef = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| GitHubError::Parse(e.to_string()))?;
        Ok(parsed.object.sha)
    }

    /// Create `branch` off the configured base branch; returns the base sha.
    pub async fn create_branch(&self, branch: &str) -> Result<String, GitHubError> {
        let sha = self.branch_sha(&self.config.base_branch).await?;
        let body = json!({
            "ref": format!("refs/heads/{branch}"),
            "sha": sha,
        });
        let response = self
            .request(self.client.post(self.url("git/refs")))
            .json(&body)
            .send()
            .await
            .map_err(|e| GitHubError::Request(e.to_string()))?;
        Self::check(response).await?;
        Ok(sha)
    }

    /// Create or update a file on `branch`; returns the commit sha.
    pub async fn commit_file(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String, GitHubError> {
        let body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": branch,
        });
        let response = self
            .request(self.client.put(self.url(&format!("contents/{path}"))))
            .json(&body)
            .send()
            .await
            .map_err(|e| GitHubError::Request(e.to_string()))?;
        let parsed: ContentsResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| GitHubError::Parse(e.to_string()))?;
        Ok(parsed.commit.sha)
    }

    /// Open a pull request from `head` into the base branch.
    pub async fn open_pull_request(
        &self,
        head: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest, GitHubError> {
        let payload = json!({
            "title": title,
            "head": head,
            "base": self.config.base_branch,
            "body": body,
        });
        let response = self
            .request(self.client.post(self.url("pulls")))
            .json(&payload)
            .send()
            .await
            .map_err(|e| GitHubError::Request(e.to_string()))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| GitHubError::Parse(e.to_string()))
    }
}
