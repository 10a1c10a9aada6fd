//! GitHub REST client
//!
//! Implements [`GitHost`] against the GitHub v3 API with a token. File
//! contents travel base64-encoded through the contents API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{GitHostError, Result};
use crate::host::{
    Comment, CommitResult, FileContent, FileDelete, FileWrite, GitHost, NewPullRequest, PrSort,
    PrState, PullRequest,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_BASE_BRANCH: &str = "main";
const PAGE_SIZE: usize = 100;

/// GitHub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API root, without trailing slash
    pub api_url: String,
    /// Owner of the infrastructure repository
    pub owner: String,
    /// Infrastructure repository name
    pub repo: String,
    /// Token used as bearer auth
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Branch pull requests target
    pub base_branch: String,
}

impl GitHubConfig {
    /// Build from `GH_INFRA_OWNER`, `GH_INFRA_REPO`, `GH_TOKEN`, `GH_API_URL`
    /// and `GH_BASE_BRANCH`.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let (Some(owner), Some(repo)) = (var("GH_INFRA_OWNER"), var("GH_INFRA_REPO")) else {
            return Err(GitHostError::NotConfigured(
                "GH_INFRA_OWNER and GH_INFRA_REPO must be set".to_string(),
            ));
        };
        let mut config = Self::new(&owner, &repo);
        config.token = var("GH_TOKEN");
        if let Some(url) = var("GH_API_URL") {
            config = config.with_api_url(&url);
        }
        if let Some(branch) = var("GH_BASE_BRANCH") {
            config.base_branch = branch;
        }
        Ok(config)
    }

    pub fn new(owner: &str, repo: &str) -> Self {
        GitHubConfig {
            api_url: DEFAULT_API_URL.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: None,
            base_branch: DEFAULT_BASE_BRANCH.to_string(),
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_base_branch(mut self, branch: &str) -> Self {
        self.base_branch = branch.to_string();
        self
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_url, self.owner, self.repo, path)
    }
}

/// GitHub client for the infrastructure repository
pub struct GitHubClient {
    config: GitHubConfig,
    http: reqwest::Client,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("armportal/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(GitHubClient { config, http })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(GitHubConfig::from_env()?)
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, self.config.repo_url(path))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_raw(&self, builder: RequestBuilder) -> Result<reqwest::Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiMessage>(&text)
            .map(|m| m.message)
            .unwrap_or(text);
        debug!(status = status.as_u16(), message = %message, "github request failed");
        Err(GitHostError::from_status(status.as_u16(), message))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.send_raw(builder).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn paginate<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        max_pages: Option<usize>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let per_page = PAGE_SIZE.to_string();
        let mut page = 1usize;
        loop {
            let page_str = page.to_string();
            let builder = self
                .request(Method::GET, path)
                .query(query)
                .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())]);
            let batch: Vec<T> = self.send(builder).await?;
            let len = batch.len();
            items.extend(batch);
            if len < PAGE_SIZE || max_pages.is_some_and(|max| page >= max) {
                break;
            }
            page += 1;
        }
        Ok(items)
    }
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Deserialize)]
struct RawRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Deserialize)]
struct RawPull {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    head: RawRef,
    base: RawRef,
    html_url: String,
    #[serde(default)]
    labels: Vec<RawLabel>,
    user: Option<RawUser>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    merged_at: Option<DateTime<Utc>>,
}

impl From<RawPull> for PullRequest {
    fn from(raw: RawPull) -> Self {
        PullRequest {
            number: raw.number,
            title: raw.title,
            body: raw.body.unwrap_or_default(),
            state: if raw.state == "open" {
                PrState::Open
            } else {
                PrState::Closed
            },
            head_ref: raw.head.name,
            base_ref: raw.base.name,
            html_url: raw.html_url,
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
            author: raw.user.map(|u| u.login),
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            merged_at: raw.merged_at,
        }
    }
}

#[derive(Deserialize)]
struct RawObject {
    sha: String,
}

#[derive(Deserialize)]
struct RawGitRef {
    object: RawObject,
}

#[derive(Deserialize)]
struct RawContent {
    content: String,
    sha: String,
}

#[derive(Deserialize)]
struct RawCommitResult {
    content: Option<RawObject>,
    commit: RawObject,
}

#[derive(Deserialize)]
struct RawFile {
    filename: String,
}

#[derive(Deserialize)]
struct RawComment {
    body: Option<String>,
    user: Option<RawUser>,
    created_at: Option<DateTime<Utc>>,
}

/// The contents API wraps base64 at 60 columns.
fn decode_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(String::from_utf8(STANDARD.decode(compact)?)?)
}

#[async_trait]
impl GitHost for GitHubClient {
    fn base_branch(&self) -> &str {
        &self.config.base_branch
    }

    async fn branch_sha(&self, branch: &str) -> Result<String> {
        let raw: RawGitRef = self
            .send(self.request(Method::GET, &format!("git/ref/heads/{branch}")))
            .await?;
        Ok(raw.object.sha)
    }

    async fn create_branch(&self, name: &str, sha: &str) -> Result<()> {
        let body = json!({ "ref": format!("refs/heads/{name}"), "sha": sha });
        self.send_raw(self.request(Method::POST, "git/refs").json(&body))
            .await?;
        Ok(())
    }

    async fn get_file(&self, path: &str, git_ref: &str) -> Result<Option<FileContent>> {
        let builder = self
            .request(Method::GET, &format!("contents/{path}"))
            .query(&[("ref", git_ref)]);
        match self.send::<RawContent>(builder).await {
            Ok(raw) => Ok(Some(FileContent {
                content: decode_content(&raw.content)?,
                sha: raw.sha,
            })),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put_file(&self, write: FileWrite<'_>) -> Result<CommitResult> {
        let mut body = json!({
            "message": write.message,
            "content": STANDARD.encode(write.content.as_bytes()),
            "branch": write.branch,
        });
        if let Some(sha) = write.sha {
            body["sha"] = json!(sha);
        }
        let raw: RawCommitResult = self
            .send(self.request(Method::PUT, &format!("contents/{}", write.path)).json(&body))
            .await?;
        let content_sha = raw
            .content
            .map(|c| c.sha)
            .ok_or_else(|| GitHostError::InvalidResponse("missing content sha".to_string()))?;
        Ok(CommitResult {
            content_sha,
            commit_sha: raw.commit.sha,
        })
    }

    async fn delete_file(&self, delete: FileDelete<'_>) -> Result<String> {
        let body = json!({
            "message": delete.message,
            "sha": delete.sha,
            "branch": delete.branch,
        });
        let raw: RawCommitResult = self
            .send(self.request(Method::DELETE, &format!("contents/{}", delete.path)).json(&body))
            .await?;
        Ok(raw.commit.sha)
    }

    async fn create_pull_request(&self, pr: NewPullRequest) -> Result<PullRequest> {
        let body = json!({
            "title": pr.title,
            "body": pr.body,
            "head": pr.head,
            "base": pr.base,
        });
        let raw: RawPull = self
            .send(self.request(Method::POST, "pulls").json(&body))
            .await?;
        Ok(raw.into())
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        let raw: RawPull = self
            .send(self.request(Method::GET, &format!("pulls/{number}")))
            .await?;
        Ok(raw.into())
    }

    async fn list_pull_requests(&self, sort: PrSort, max_pages: Option<usize>) -> Result<Vec<PullRequest>> {
        let raw: Vec<RawPull> = self
            .paginate(
                "pulls",
                &[("state", "all"), ("sort", sort.as_str()), ("direction", "desc")],
                max_pages,
            )
            .await?;
        Ok(raw.into_iter().map(PullRequest::from).collect())
    }

    async fn list_pull_request_files(&self, number: u64) -> Result<Vec<String>> {
        let raw: Vec<RawFile> = self
            .paginate(&format!("pulls/{number}/files"), &[], None)
            .await?;
        Ok(raw.into_iter().map(|f| f.filename).collect())
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        let body = json!({ "labels": labels });
        self.send_raw(
            self.request(Method::POST, &format!("issues/{number}/labels"))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn add_comment(&self, number: u64, body: &str) -> Result<()> {
        let body = json!({ "body": body });
        self.send_raw(
            self.request(Method::POST, &format!("issues/{number}/comments"))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>> {
        let raw: Vec<RawComment> = self
            .paginate(&format!("issues/{number}/comments"), &[], None)
            .await?;
        Ok(raw
            .into_iter()
            .map(|c| Comment {
                body: c.body.unwrap_or_default(),
                author: c.user.map(|u| u.login),
                created_at: c.created_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builders() {
        let config = GitHubConfig::new("acme", "infra")
            .with_api_url("https://ghe.example.com/api/v3/")
            .with_base_branch("trunk")
            .with_token("t0k");
        assert_eq!(
            config.repo_url("pulls/3"),
            "https://ghe.example.com/api/v3/repos/acme/infra/pulls/3"
        );
        assert_eq!(config.base_branch, "trunk");
        assert_eq!(config.token.as_deref(), Some("t0k"));
    }

    #[test]
    fn token_is_not_serialized() {
        let config = GitHubConfig::new("acme", "infra").with_token("secret");
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("token").is_none());
    }

    #[test]
    fn decodes_wrapped_base64() {
        let encoded = "bW9kdWxl\nICJyZyIg\ne30K\n";
        assert_eq!(decode_content(encoded).unwrap(), "module \"rg\" {}\n");
    }

    #[test]
    fn raw_pull_maps_merge_state_and_labels() {
        let raw: RawPull = serde_json::from_value(json!({
            "number": 7,
            "title": "Provision Storage in dev (0a1b2c3d)",
            "body": null,
            "state": "closed",
            "head": { "ref": "requests/dev/azure-storage-basic-0a1b2c3d" },
            "base": { "ref": "main" },
            "html_url": "https://github.com/acme/infra/pull/7",
            "labels": [{ "name": "status:apply-ok-dev" }],
            "user": { "login": "alice" },
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T11:00:00Z",
            "merged_at": "2024-05-01T11:00:00Z"
        }))
        .unwrap();
        let pr = PullRequest::from(raw);
        assert!(pr.is_merged());
        assert_eq!(pr.state, PrState::Closed);
        assert_eq!(pr.body, "");
        assert_eq!(pr.labels, vec!["status:apply-ok-dev"]);
        assert_eq!(pr.author.as_deref(), Some("alice"));
    }
}
