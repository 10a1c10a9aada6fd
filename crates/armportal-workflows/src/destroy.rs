//! Destroy: open a pull request whose merge tears a resource down.
//!
//! When the artifact is still on the base branch it is deleted. When it is
//! already gone, Terraform needs a `.destroy` marker to trigger a destroy
//! run; for Crossplane the absence of the claim is itself the signal, and a
//! short note is committed so the pull request has a change to carry.

use armportal_core::metrics::METRICS;
use armportal_core::obs;
use armportal_core::{
    DestroyMethod, DestroyOutcome, DestroyResourceCommand, DestroySubmission, DomainEvent,
    FieldError, PortalError, Provider, Result,
};
use armportal_gitops::body::{destroy_body, destroy_marker, destroy_note};
use armportal_gitops::{commit_file, ensure_branch, existing_sha, FileDelete, NewPullRequest};
use tracing::info;

use crate::portal::Portal;

fn invalid(message: impl Into<String>) -> PortalError {
    let message = message.into();
    PortalError::validation(message.clone(), vec![FieldError::new("prNumber", message)])
}

/// `requests/dev/x` → `destroy/dev/x`.
pub fn destroy_branch(head_ref: &str) -> Option<String> {
    let rest = head_ref.strip_prefix("requests/")?;
    (!rest.is_empty()).then(|| format!("destroy/{rest}"))
}

/// `infra/environments/dev/x.tf` → `infra/environments/dev/x.destroy`.
pub fn marker_path(file_path: &str) -> String {
    match file_path.strip_suffix(".tf") {
        Some(stem) => format!("{stem}.destroy"),
        None => format!("{file_path}.destroy"),
    }
}

/// `infra/crossplane/claims/dev/x.yaml` → `infra/crossplane/claims/dev/x.destroyed.md`.
pub fn note_path(file_path: &str) -> String {
    let stem = file_path
        .strip_suffix(".yaml")
        .or_else(|| file_path.strip_suffix(".yml"))
        .unwrap_or(file_path);
    format!("{stem}.destroyed.md")
}

pub fn destroy_labels(source_pr: u64) -> Vec<String> {
    vec!["terraform-destroy".to_string(), format!("destroys-pr-{source_pr}")]
}

/// Open the destroy pull request for a merged provisioning request.
pub async fn destroy(
    portal: &Portal,
    cmd: &DestroyResourceCommand,
) -> Result<(DestroyOutcome, Vec<DomainEvent>)> {
    let job = portal.jobs.load_job(cmd.pr_number).await?;
    if !job.merged {
        return Err(invalid(format!(
            "PR #{} is not merged; only deployed resources can be destroyed",
            job.pr_number
        )));
    }
    let branch_name = destroy_branch(&job.head_ref).ok_or_else(|| {
        invalid(format!(
            "PR #{} branch {} is not a provisioning request",
            job.pr_number, job.head_ref
        ))
    })?;
    let file_path = job
        .file_path
        .clone()
        .ok_or_else(|| invalid(format!("No infrastructure file found in PR #{}", job.pr_number)))?;

    let host = portal.host.as_ref();
    let base = host.base_branch().to_string();
    let base_sha = host.branch_sha(&base).await?;
    let branch = ensure_branch(host, &branch_name, &base_sha, true).await?;

    let method = match existing_sha(host, &file_path, &base).await? {
        Some(sha) => {
            host.delete_file(FileDelete {
                path: &file_path,
                message: &format!("destroy: remove {file_path}"),
                branch: &branch,
                sha: &sha,
            })
            .await?;
            DestroyMethod::DeletedFile
        }
        None if job.provider == Provider::Terraform => {
            let marker = marker_path(&file_path);
            let sha = existing_sha(host, &marker, &branch).await?;
            commit_file(
                host,
                &branch,
                &marker,
                &destroy_marker(&file_path),
                &format!("destroy: mark {file_path} for destruction"),
                sha.as_deref(),
            )
            .await?;
            DestroyMethod::Marker
        }
        None => {
            let note = note_path(&file_path);
            let sha = existing_sha(host, &note, &branch).await?;
            commit_file(
                host,
                &branch,
                &note,
                &destroy_note(&file_path, job.pr_number),
                &format!("destroy: note {file_path} already removed"),
                sha.as_deref(),
            )
            .await?;
            DestroyMethod::AlreadyAbsent
        }
    };

    let pr = host
        .create_pull_request(NewPullRequest {
            title: format!("Destroy: {}", job.title),
            body: destroy_body(job.pr_number, &file_path, method, job.provider),
            head: branch.clone(),
            base,
        })
        .await?;
    METRICS.inc_pull_requests_opened();
    obs::emit_pr_opened(pr.number, &branch, &pr.html_url);
    host.add_labels(pr.number, &destroy_labels(job.pr_number)).await?;

    let source_pr = job.pr_number;
    let (job, events) = job.mark_as_destroyed(pr.html_url.clone())?;
    portal.jobs.invalidate(source_pr).await;
    info!(source_pr, pr_number = pr.number, method = ?method, "destroy pull request ready");

    let outcome = DestroyOutcome {
        source_pr,
        source_environment: job.environment,
        destroy: DestroySubmission {
            branch_name: branch,
            file_path,
            pull_request_number: pr.number,
            pull_request_url: pr.html_url,
            destroys_pr: source_pr,
            method,
        },
    };
    Ok((outcome, events))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_and_marker_names() {
        assert_eq!(destroy_branch("requests/dev/rg-1").as_deref(), Some("destroy/dev/rg-1"));
        assert_eq!(destroy_branch("feature/x"), None);
        assert_eq!(destroy_branch("requests/"), None);
        assert_eq!(marker_path("infra/environments/dev/rg-1.tf"), "infra/environments/dev/rg-1.destroy");
        assert_eq!(destroy_labels(8), vec!["terraform-destroy", "destroys-pr-8"]);
        assert_eq!(
            note_path("infra/crossplane/claims/dev/shop-dev.yaml"),
            "infra/crossplane/claims/dev/shop-dev.destroyed.md"
        );
    }
}
