//! Branch and file helpers shared by the workflows.

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::host::{CommitResult, FileWrite, GitHost};

/// Create `name` at `base_sha`.
///
/// When the branch already exists it is reused, unless `force_recreate` is
/// set, in which case a new branch with a random suffix is created instead.
/// Returns the branch actually created or reused.
pub async fn ensure_branch(
    host: &dyn GitHost,
    name: &str,
    base_sha: &str,
    force_recreate: bool,
) -> Result<String> {
    match host.create_branch(name, base_sha).await {
        Ok(()) => {
            debug!(branch = %name, "created branch");
            Ok(name.to_string())
        }
        Err(e) if e.is_conflict() && force_recreate => {
            let suffix = Uuid::new_v4().simple().to_string();
            let unique = format!("{name}-{}", &suffix[..7]);
            host.create_branch(&unique, base_sha).await?;
            info!(branch = %name, created = %unique, "branch existed, created a fresh one");
            Ok(unique)
        }
        Err(e) if e.is_conflict() => {
            debug!(branch = %name, "reusing existing branch");
            Ok(name.to_string())
        }
        Err(e) => Err(e),
    }
}

/// Blob SHA of `path` at `git_ref`, if the file exists there.
pub async fn existing_sha(host: &dyn GitHost, path: &str, git_ref: &str) -> Result<Option<String>> {
    Ok(host.get_file(path, git_ref).await?.map(|f| f.sha))
}

pub async fn file_exists(host: &dyn GitHost, path: &str, git_ref: &str) -> Result<bool> {
    Ok(host.get_file(path, git_ref).await?.is_some())
}

/// Create or update a file. `sha` is required when the file already exists
/// on `branch`; a stale value surfaces as a conflict.
pub async fn commit_file(
    host: &dyn GitHost,
    branch: &str,
    path: &str,
    content: &str,
    message: &str,
    sha: Option<&str>,
) -> Result<CommitResult> {
    let result = host
        .put_file(FileWrite {
            path,
            content,
            message,
            branch,
            sha,
        })
        .await?;
    debug!(branch = %branch, path = %path, commit = %result.commit_sha, "committed file");
    Ok(result)
}

fn is_claim(path: &str) -> bool {
    path.starts_with("infra/crossplane/") && (path.ends_with(".yaml") || path.ends_with(".yml"))
}

/// The infrastructure file among a pull request's paths: the first Terraform
/// file that is not a destroy marker, else the first Crossplane claim.
pub fn find_iac_file(files: &[String]) -> Option<&str> {
    files
        .iter()
        .find(|f| f.ends_with(".tf") && !f.contains(".destroy"))
        .or_else(|| files.iter().find(|f| is_claim(f)))
        .map(String::as_str)
}

/// Paths of infrastructure files (Terraform, claims, destroy markers).
pub fn infra_files(files: &[String]) -> Vec<String> {
    files
        .iter()
        .filter(|f| f.starts_with("infra/"))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryGitHost;

    #[tokio::test]
    async fn ensure_branch_reuses_or_recreates() {
        let host = MemoryGitHost::default();
        let base = host.branch_sha("main").await.unwrap();

        let first = ensure_branch(&host, "destroy/dev/x", &base, false).await.unwrap();
        assert_eq!(first, "destroy/dev/x");
        let reused = ensure_branch(&host, "destroy/dev/x", &base, false).await.unwrap();
        assert_eq!(reused, "destroy/dev/x");

        let fresh = ensure_branch(&host, "destroy/dev/x", &base, true).await.unwrap();
        assert!(fresh.starts_with("destroy/dev/x-"));
        assert_eq!(fresh.len(), "destroy/dev/x-".len() + 7);
        assert!(host.branch_names().contains(&fresh));
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let host = MemoryGitHost::default();
        assert!(!file_exists(&host, "infra/environments/dev/x.tf", "main").await.unwrap());
        assert!(existing_sha(&host, "infra/environments/dev/x.tf", "main")
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn iac_file_prefers_terraform_and_skips_markers() {
        let files = vec![
            "README.md".to_string(),
            "infra/environments/dev/a.destroy".to_string(),
            "infra/environments/dev/a.tf".to_string(),
        ];
        assert_eq!(find_iac_file(&files), Some("infra/environments/dev/a.tf"));

        let claims = vec!["infra/crossplane/claims/qa/shop-qa.yaml".to_string()];
        assert_eq!(find_iac_file(&claims), Some("infra/crossplane/claims/qa/shop-qa.yaml"));
        assert_eq!(find_iac_file(&["docs/x.yaml".to_string()]), None);
        assert_eq!(infra_files(&files).len(), 2);
    }
}
