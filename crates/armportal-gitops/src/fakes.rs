//! In-memory git host.
//!
//! Keeps whole-branch snapshots, enforces blob-SHA concurrency on updates
//! and computes pull request file lists against the base as it was when the
//! pull request was opened.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::{GitHostError, Result};
use crate::host::{
    Comment, CommitResult, FileContent, FileDelete, FileWrite, GitHost, NewPullRequest, PrSort,
    PrState, PullRequest,
};

type Files = BTreeMap<String, String>;

#[derive(Debug, Clone, Default)]
struct Head {
    sha: String,
    files: Files,
}

#[derive(Debug, Clone)]
struct StoredPull {
    pr: PullRequest,
    base_snapshot: Files,
    comments: Vec<Comment>,
}

#[derive(Debug, Default)]
struct State {
    heads: HashMap<String, Head>,
    pulls: Vec<StoredPull>,
    commits: u64,
}

impl State {
    fn next_commit(&mut self, branch: &str) -> String {
        self.commits += 1;
        short_hash(&format!("{branch}:{}", self.commits))
    }

    fn pull_mut(&mut self, number: u64) -> Result<&mut StoredPull> {
        self.pulls
            .iter_mut()
            .find(|p| p.pr.number == number)
            .ok_or_else(|| GitHostError::NotFound(format!("pull request #{number}")))
    }

    fn head_mut(&mut self, branch: &str) -> Result<&mut Head> {
        self.heads
            .get_mut(branch)
            .ok_or_else(|| GitHostError::NotFound(format!("branch {branch}")))
    }
}

fn short_hash(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))[..40].to_string()
}

/// Blob SHA of file content.
pub fn blob_sha(content: &str) -> String {
    short_hash(&format!("blob:{content}"))
}

pub struct MemoryGitHost {
    owner: String,
    repo: String,
    base_branch: String,
    state: Mutex<State>,
}

impl Default for MemoryGitHost {
    fn default() -> Self {
        Self::new("acme", "infra")
    }
}

impl MemoryGitHost {
    /// A repository with an empty `main` branch.
    pub fn new(owner: &str, repo: &str) -> Self {
        let mut state = State::default();
        let sha = state.next_commit("main");
        state.heads.insert(
            "main".to_string(),
            Head {
                sha,
                files: Files::new(),
            },
        );
        MemoryGitHost {
            owner: owner.to_string(),
            repo: repo.to_string(),
            base_branch: "main".to_string(),
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| GitHostError::Http("memory host lock poisoned".to_string()))
    }

    fn pull_url(&self, number: u64) -> String {
        format!("https://github.com/{}/{}/pull/{number}", self.owner, self.repo)
    }

    /// Write a file straight onto a branch, creating the branch if needed.
    pub fn seed_file(&self, branch: &str, path: &str, content: &str) -> Result<()> {
        let mut state = self.lock()?;
        let sha = state.next_commit(branch);
        let head = state.heads.entry(branch.to_string()).or_default();
        head.files.insert(path.to_string(), content.to_string());
        head.sha = sha;
        Ok(())
    }

    pub fn file(&self, branch: &str, path: &str) -> Option<String> {
        let state = self.lock().ok()?;
        state.heads.get(branch)?.files.get(path).cloned()
    }

    pub fn branch_names(&self) -> Vec<String> {
        let Ok(state) = self.lock() else {
            return Vec::new();
        };
        let mut names: Vec<_> = state.heads.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn pull(&self, number: u64) -> Option<PullRequest> {
        let state = self.lock().ok()?;
        state
            .pulls
            .iter()
            .find(|p| p.pr.number == number)
            .map(|p| p.pr.clone())
    }

    /// Apply the pull request's changes to its base and mark it merged.
    pub fn merge(&self, number: u64) -> Result<()> {
        let mut state = self.lock()?;
        let stored = state.pull_mut(number)?.clone();
        let head_files = state
            .heads
            .get(&stored.pr.head_ref)
            .map(|h| h.files.clone())
            .unwrap_or_default();
        let sha = state.next_commit(&stored.pr.base_ref);
        let base = state.head_mut(&stored.pr.base_ref)?;
        for path in changed_paths(&stored.base_snapshot, &head_files) {
            match head_files.get(&path) {
                Some(content) => {
                    base.files.insert(path, content.clone());
                }
                None => {
                    base.files.remove(&path);
                }
            }
        }
        base.sha = sha;
        let pull = state.pull_mut(number)?;
        pull.pr.state = PrState::Closed;
        pull.pr.merged_at = Some(Utc::now());
        pull.pr.updated_at = pull.pr.merged_at;
        Ok(())
    }

    /// Replace the label set, as CI would after plan/apply.
    pub fn set_labels(&self, number: u64, labels: &[&str]) -> Result<()> {
        let mut state = self.lock()?;
        state.pull_mut(number)?.pr.labels = labels.iter().map(|l| l.to_string()).collect();
        Ok(())
    }

    pub fn comments(&self, number: u64) -> Vec<String> {
        let Ok(state) = self.lock() else {
            return Vec::new();
        };
        state
            .pulls
            .iter()
            .find(|p| p.pr.number == number)
            .map(|p| p.comments.iter().map(|c| c.body.clone()).collect())
            .unwrap_or_default()
    }
}

fn changed_paths(base: &Files, head: &Files) -> Vec<String> {
    let mut paths: Vec<String> = head
        .iter()
        .filter(|(path, content)| base.get(*path) != Some(*content))
        .map(|(path, _)| path.clone())
        .collect();
    paths.extend(base.keys().filter(|p| !head.contains_key(*p)).cloned());
    paths.sort();
    paths
}

#[async_trait]
impl GitHost for MemoryGitHost {
    fn base_branch(&self) -> &str {
        &self.base_branch
    }

    async fn branch_sha(&self, branch: &str) -> Result<String> {
        let state = self.lock()?;
        state
            .heads
            .get(branch)
            .map(|h| h.sha.clone())
            .ok_or_else(|| GitHostError::NotFound(format!("branch {branch}")))
    }

    async fn create_branch(&self, name: &str, sha: &str) -> Result<()> {
        let mut state = self.lock()?;
        if state.heads.contains_key(name) {
            return Err(GitHostError::Conflict("Reference already exists".to_string()));
        }
        let files = state
            .heads
            .values()
            .find(|h| h.sha == sha)
            .map(|h| h.files.clone())
            .ok_or_else(|| GitHostError::NotFound(format!("Object does not exist: {sha}")))?;
        state.heads.insert(
            name.to_string(),
            Head {
                sha: sha.to_string(),
                files,
            },
        );
        Ok(())
    }

    async fn get_file(&self, path: &str, git_ref: &str) -> Result<Option<FileContent>> {
        let state = self.lock()?;
        let head = state
            .heads
            .get(git_ref)
            .ok_or_else(|| GitHostError::NotFound(format!("No commit found for the ref {git_ref}")))?;
        Ok(head.files.get(path).map(|content| FileContent {
            content: content.clone(),
            sha: blob_sha(content),
        }))
    }

    async fn put_file(&self, write: FileWrite<'_>) -> Result<CommitResult> {
        let mut state = self.lock()?;
        let commit_sha = state.next_commit(write.branch);
        let head = state.head_mut(write.branch)?;
        if let Some(existing) = head.files.get(write.path) {
            match write.sha {
                Some(sha) if sha == blob_sha(existing) => {}
                Some(_) => {
                    return Err(GitHostError::Conflict(format!(
                        "{} does not match the current blob",
                        write.path
                    )))
                }
                None => {
                    return Err(GitHostError::from_status(
                        422,
                        format!("\"sha\" wasn't supplied for {}", write.path),
                    ))
                }
            }
        }
        head.files
            .insert(write.path.to_string(), write.content.to_string());
        head.sha = commit_sha.clone();
        Ok(CommitResult {
            content_sha: blob_sha(write.content),
            commit_sha,
        })
    }

    async fn delete_file(&self, delete: FileDelete<'_>) -> Result<String> {
        let mut state = self.lock()?;
        let commit_sha = state.next_commit(delete.branch);
        let head = state.head_mut(delete.branch)?;
        let existing = head
            .files
            .get(delete.path)
            .ok_or_else(|| GitHostError::NotFound(delete.path.to_string()))?;
        if blob_sha(existing) != delete.sha {
            return Err(GitHostError::Conflict(format!(
                "{} does not match the current blob",
                delete.path
            )));
        }
        head.files.remove(delete.path);
        head.sha = commit_sha.clone();
        Ok(commit_sha)
    }

    async fn create_pull_request(&self, new: NewPullRequest) -> Result<PullRequest> {
        let mut state = self.lock()?;
        if !state.heads.contains_key(&new.head) {
            return Err(GitHostError::from_status(422, format!("head {} not found", new.head)));
        }
        if state
            .pulls
            .iter()
            .any(|p| p.pr.head_ref == new.head && p.pr.state == PrState::Open)
        {
            return Err(GitHostError::Conflict(format!(
                "A pull request already exists for {}",
                new.head
            )));
        }
        let base_snapshot = state
            .heads
            .get(&new.base)
            .map(|h| h.files.clone())
            .ok_or_else(|| GitHostError::from_status(422, format!("base {} not found", new.base)))?;
        let head_files = state.heads.get(&new.head).map(|h| &h.files);
        if head_files.is_some_and(|files| changed_paths(&base_snapshot, files).is_empty()) {
            return Err(GitHostError::from_status(
                422,
                format!("No commits between {} and {}", new.base, new.head),
            ));
        }
        let number = state.pulls.len() as u64 + 1;
        let now = Utc::now();
        let pr = PullRequest {
            number,
            title: new.title,
            body: new.body,
            state: PrState::Open,
            head_ref: new.head,
            base_ref: new.base,
            html_url: self.pull_url(number),
            labels: Vec::new(),
            author: Some("armportal[bot]".to_string()),
            created_at: Some(now),
            updated_at: Some(now),
            merged_at: None,
        };
        state.pulls.push(StoredPull {
            pr: pr.clone(),
            base_snapshot,
            comments: Vec::new(),
        });
        Ok(pr)
    }

    async fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        let mut state = self.lock()?;
        Ok(state.pull_mut(number)?.pr.clone())
    }

    async fn list_pull_requests(&self, sort: PrSort, max_pages: Option<usize>) -> Result<Vec<PullRequest>> {
        let state = self.lock()?;
        let mut pulls: Vec<PullRequest> = state.pulls.iter().map(|p| p.pr.clone()).collect();
        // Numbers increase with creation time; ties on update fall back to it.
        match sort {
            PrSort::Created => pulls.sort_by(|a, b| b.number.cmp(&a.number)),
            PrSort::Updated => pulls.sort_by(|a, b| {
                b.updated_at
                    .cmp(&a.updated_at)
                    .then(b.number.cmp(&a.number))
            }),
        }
        if let Some(pages) = max_pages {
            pulls.truncate(pages * 100);
        }
        Ok(pulls)
    }

    async fn list_pull_request_files(&self, number: u64) -> Result<Vec<String>> {
        let mut state = self.lock()?;
        let stored = state.pull_mut(number)?.clone();
        let head = state
            .heads
            .get(&stored.pr.head_ref)
            .map(|h| h.files.clone())
            .unwrap_or_default();
        Ok(changed_paths(&stored.base_snapshot, &head))
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        let mut state = self.lock()?;
        let pull = state.pull_mut(number)?;
        for label in labels {
            if !pull.pr.labels.contains(label) {
                pull.pr.labels.push(label.clone());
            }
        }
        Ok(())
    }

    async fn add_comment(&self, number: u64, body: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.pull_mut(number)?.comments.push(Comment {
            body: body.to_string(),
            author: Some("armportal[bot]".to_string()),
            created_at: Some(Utc::now()),
        });
        Ok(())
    }

    async fn list_comments(&self, number: u64) -> Result<Vec<Comment>> {
        let mut state = self.lock()?;
        Ok(state.pull_mut(number)?.comments.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write<'a>(path: &'a str, content: &'a str, branch: &'a str, sha: Option<&'a str>) -> FileWrite<'a> {
        FileWrite {
            path,
            content,
            message: "test",
            branch,
            sha,
        }
    }

    #[tokio::test]
    async fn branch_conflicts_and_stale_shas() {
        let host = MemoryGitHost::default();
        let base = host.branch_sha("main").await.unwrap();
        host.create_branch("requests/dev/a", &base).await.unwrap();
        assert!(host
            .create_branch("requests/dev/a", &base)
            .await
            .unwrap_err()
            .is_conflict());

        let first = host
            .put_file(write("infra/a.tf", "one", "requests/dev/a", None))
            .await
            .unwrap();
        let stale = host
            .put_file(write("infra/a.tf", "two", "requests/dev/a", Some("deadbeef")))
            .await
            .unwrap_err();
        assert!(stale.is_conflict());
        host.put_file(write("infra/a.tf", "two", "requests/dev/a", Some(&first.content_sha)))
            .await
            .unwrap();
        assert_eq!(host.file("requests/dev/a", "infra/a.tf").as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn pull_without_changes_is_rejected() {
        let host = MemoryGitHost::default();
        let base = host.branch_sha("main").await.unwrap();
        host.create_branch("destroy/dev/a", &base).await.unwrap();
        let err = host
            .create_pull_request(NewPullRequest {
                title: "t".to_string(),
                body: String::new(),
                head: "destroy/dev/a".to_string(),
                base: "main".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("No commits between main and destroy/dev/a"));
    }

    #[tokio::test]
    async fn pull_files_and_merge() {
        let host = MemoryGitHost::default();
        host.seed_file("main", "infra/keep.tf", "keep").unwrap();
        let base = host.branch_sha("main").await.unwrap();
        host.create_branch("requests/dev/b", &base).await.unwrap();
        host.put_file(write("infra/b.tf", "b", "requests/dev/b", None))
            .await
            .unwrap();
        let pr = host
            .create_pull_request(NewPullRequest {
                title: "t".to_string(),
                body: String::new(),
                head: "requests/dev/b".to_string(),
                base: "main".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(host.list_pull_request_files(pr.number).await.unwrap(), vec!["infra/b.tf"]);
        assert!(host.get_file("infra/b.tf", "main").await.unwrap().is_none());

        host.merge(pr.number).unwrap();
        assert!(host.get_pull_request(pr.number).await.unwrap().is_merged());
        assert_eq!(host.file("main", "infra/b.tf").as_deref(), Some("b"));
        assert_eq!(host.file("main", "infra/keep.tf").as_deref(), Some("keep"));
        assert_eq!(host.list_pull_request_files(pr.number).await.unwrap(), vec!["infra/b.tf"]);
    }
}
