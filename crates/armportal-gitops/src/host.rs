//! The git host seam.
//!
//! Everything the workflows need from the hosting service: refs, file
//! contents with blob-SHA concurrency, pull requests, labels and comments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    #[default]
    Open,
    Closed,
}

/// A pull request as the host reports it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: PrState,
    pub head_ref: String,
    pub base_ref: String,
    pub html_url: String,
    pub labels: Vec<String>,
    pub author: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }
}

/// Decoded file contents plus the blob SHA needed to update it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub content: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    /// Blob SHA of the written file.
    pub content_sha: String,
    pub commit_sha: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub body: String,
    pub author: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Create or update one file on a branch. `sha` must be the current blob
/// SHA when the file already exists on that branch.
#[derive(Debug, Clone, Copy)]
pub struct FileWrite<'a> {
    pub path: &'a str,
    pub content: &'a str,
    pub message: &'a str,
    pub branch: &'a str,
    pub sha: Option<&'a str>,
}

#[derive(Debug, Clone, Copy)]
pub struct FileDelete<'a> {
    pub path: &'a str,
    pub message: &'a str,
    pub branch: &'a str,
    pub sha: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// Listing order for pull requests; always newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrSort {
    Created,
    Updated,
}

impl PrSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrSort::Created => "created",
            PrSort::Updated => "updated",
        }
    }
}

#[async_trait]
pub trait GitHost: Send + Sync {
    /// Branch pull requests target by default.
    fn base_branch(&self) -> &str;

    /// Commit SHA at the tip of `branch`.
    async fn branch_sha(&self, branch: &str) -> Result<String>;

    /// Create `refs/heads/<name>` at `sha`. An existing branch is a conflict.
    async fn create_branch(&self, name: &str, sha: &str) -> Result<()>;

    /// File at `git_ref`, or `None` when it does not exist.
    async fn get_file(&self, path: &str, git_ref: &str) -> Result<Option<FileContent>>;

    async fn put_file(&self, write: FileWrite<'_>) -> Result<CommitResult>;

    /// Returns the commit SHA.
    async fn delete_file(&self, delete: FileDelete<'_>) -> Result<String>;

    async fn create_pull_request(&self, pr: NewPullRequest) -> Result<PullRequest>;

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest>;

    /// Pull requests in every state, newest first. `max_pages` of 100
    /// each; `None` reads them all.
    async fn list_pull_requests(&self, sort: PrSort, max_pages: Option<usize>) -> Result<Vec<PullRequest>>;

    /// Paths touched by the pull request.
    async fn list_pull_request_files(&self, number: u64) -> Result<Vec<String>>;

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()>;

    async fn add_comment(&self, number: u64, body: &str) -> Result<()>;

    /// Comments in posting order.
    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>>;
}
