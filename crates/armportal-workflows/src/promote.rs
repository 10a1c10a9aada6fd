//! Promotion: copy a merged resource into the next environment.

use armportal_core::metrics::METRICS;
use armportal_core::obs;
use armportal_core::render::crossplane::promote_claims;
use armportal_core::render::terraform::TAG_ENVIRONMENT;
use armportal_core::{
    DomainEvent, Environment, FieldError, Job, PortalError, PromoteResourceCommand,
    PromotionRequest, PromotionSubmission, Provider, Result,
};
use armportal_gitops::parse::extract_module_name;
use armportal_gitops::{
    commit_file, ensure_branch, existing_sha, GitHost, NewPullRequest, PromotionBody,
};
use chrono::Utc;
use regex::Regex;
use tracing::{info, warn};

use crate::portal::{parse_optional_environment, Portal};

fn invalid_source(message: impl Into<String>) -> PortalError {
    let message = message.into();
    PortalError::validation(message.clone(), vec![FieldError::new("prNumber", message)])
}

/// Result of retargeting a Terraform module file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentRewrite {
    pub content: String,
    pub rewritten: usize,
    /// Matches beyond the module's `environment` input and the
    /// environment tag.
    pub unexpected: usize,
}

/// Replace `*environment = "<source>"` assignments, keeping each key and
/// its alignment.
pub fn rewrite_environment(content: &str, source: Environment, target: Environment) -> Result<EnvironmentRewrite> {
    let pattern = format!(
        r#"([A-Za-z0-9_-]*environment)(\s*=\s*)"{}""#,
        regex::escape(source.as_str())
    );
    let re = Regex::new(&pattern)
        .map_err(|e| PortalError::unexpected(format!("invalid environment pattern: {e}")))?;

    let mut seen: Vec<&str> = Vec::new();
    let mut rewritten = 0;
    let mut unexpected = 0;
    for caps in re.captures_iter(content) {
        rewritten += 1;
        let key = caps.get(1).map_or("", |m| m.as_str());
        let known = key == "environment" || key == TAG_ENVIRONMENT;
        if known && !seen.contains(&key) {
            seen.push(key);
        } else {
            unexpected += 1;
        }
    }
    let replacement = format!(r#"${{1}}${{2}}"{target}""#);
    Ok(EnvironmentRewrite {
        content: re.replace_all(content, replacement.as_str()).into_owned(),
        rewritten,
        unexpected,
    })
}

/// Path of the artifact in the target environment. Claim files named
/// `<app>-<env>.yaml` take the target's name.
pub fn promoted_path(path: &str, source: Environment, target: Environment) -> Option<String> {
    if let Some(rest) = path.strip_prefix(&format!("infra/environments/{source}/")) {
        return Some(format!("infra/environments/{target}/{rest}"));
    }
    let rest = path.strip_prefix(&format!("infra/crossplane/claims/{source}/"))?;
    let file = [".yaml", ".yml"]
        .iter()
        .find_map(|ext| {
            let stem = rest.strip_suffix(&format!("-{source}{ext}"))?;
            Some(format!("{stem}-{target}{ext}"))
        })
        .unwrap_or_else(|| rest.to_string());
    Some(format!("infra/crossplane/claims/{target}/{file}"))
}

pub fn promotion_labels(provider: Provider, source: Environment, target: Environment, source_pr: u64) -> Vec<String> {
    let pipeline = match provider {
        Provider::Terraform => "terraform-plan",
        Provider::Crossplane => "crossplane",
    };
    let mut labels = vec![
        pipeline.to_string(),
        format!("environment:{target}"),
        format!("promotion:{source}-to-{target}"),
        format!("source-pr-{source_pr}"),
    ];
    if target == Environment::Prod {
        labels.push("priority:high".to_string());
    }
    labels
}

/// Source content: the merged file on base, or the request branch when
/// base no longer carries it.
async fn source_content(host: &dyn GitHost, job: &Job, path: &str) -> Result<String> {
    if let Some(file) = host.get_file(path, host.base_branch()).await? {
        return Ok(file.content);
    }
    match host.get_file(path, &job.head_ref).await? {
        Some(file) => Ok(file.content),
        None => Err(PortalError::not_found(format!(
            "Resource file {path} not found for PR #{}",
            job.pr_number
        ))),
    }
}

/// Open the promotion pull request for a merged provisioning request.
pub async fn promote(
    portal: &Portal,
    cmd: &PromoteResourceCommand,
) -> Result<(PromotionRequest, Vec<DomainEvent>)> {
    let target = parse_optional_environment(cmd.target_environment.as_deref())?;
    let job = portal.jobs.load_job(cmd.pr_number).await?;
    if !job.head_ref.starts_with("requests/") {
        return Err(invalid_source(format!(
            "PR #{} is not a provisioning request",
            cmd.pr_number
        )));
    }

    let request = PromotionRequest::new(job, target)?.validate_policies(&portal.policy)?;
    let job = &request.source_job;
    let source = request
        .source_environment()
        .ok_or_else(|| invalid_source("Source resource has no environment specified"))?;
    let target = request.target_environment;
    let source_path = job
        .file_path
        .clone()
        .ok_or_else(|| invalid_source(format!("No infrastructure file found in PR #{}", job.pr_number)))?;
    let target_path = promoted_path(&source_path, source, target).ok_or_else(|| {
        invalid_source(format!("Unexpected resource path {source_path}"))
    })?;

    let host = portal.host.as_ref();
    let content = source_content(host, job, &source_path).await?;
    let (content, rewritten) = match job.provider {
        Provider::Terraform => {
            let rewrite = rewrite_environment(&content, source, target)?;
            if rewrite.unexpected > 0 {
                warn!(
                    pr_number = job.pr_number,
                    unexpected = rewrite.unexpected,
                    "unexpected environment assignments rewritten; review the promoted file"
                );
            }
            (rewrite.content, rewrite.rewritten)
        }
        Provider::Crossplane => promote_claims(&content, source, target)?,
    };
    if rewritten == 0 {
        return Err(invalid_source(format!(
            "No {source} environment setting found in {source_path}"
        )));
    }

    // Claim names carry the environment, so the target file names the module.
    let module_name = extract_module_name(&target_path)
        .or_else(|| job.module_name.clone())
        .unwrap_or_else(|| format!("pr-{}", job.pr_number));
    let base = host.base_branch().to_string();
    let base_sha = host.branch_sha(&base).await?;
    let branch_name = format!(
        "requests/{target}/{module_name}-promoted-{}",
        Utc::now().timestamp()
    );
    let branch = ensure_branch(host, &branch_name, &base_sha, true).await?;

    let file_name = source_path.rsplit('/').next().unwrap_or(&source_path);
    let sha = existing_sha(host, &target_path, &branch).await?;
    commit_file(
        host,
        &branch,
        &target_path,
        &content,
        &format!("promote: {source} -> {target} ({file_name})"),
        sha.as_deref(),
    )
    .await?;

    let fence = match job.provider {
        Provider::Terraform => "hcl",
        Provider::Crossplane => "yaml",
    };
    let body = PromotionBody {
        blueprint_id: job.blueprint_id.as_deref(),
        version: job.blueprint_version.as_deref(),
        provider: job.provider,
        module_name: Some(module_name.as_str()),
        created_by: cmd.created_by.as_deref().or(job.created_by.as_deref()),
        source_pr: job.pr_number,
        source_env: source,
        target_env: target,
        target_path: &target_path,
        fence,
        content: &content,
    }
    .render();
    let subject = job.blueprint_id.as_deref().unwrap_or(&module_name);
    let pr = host
        .create_pull_request(NewPullRequest {
            title: format!("Promote {subject} to {target}"),
            body,
            head: branch.clone(),
            base,
        })
        .await?;
    METRICS.inc_pull_requests_opened();
    obs::emit_pr_opened(pr.number, &branch, &pr.html_url);

    host.add_labels(pr.number, &promotion_labels(job.provider, source, target, job.pr_number))
        .await?;
    let target_note = format!("Promoted from #{} ({source} environment)", job.pr_number);
    let source_note = format!("Promoted to {target} in #{}", pr.number);
    futures::try_join!(
        host.add_comment(pr.number, &target_note),
        host.add_comment(job.pr_number, &source_note),
    )?;

    let source_pr = job.pr_number;
    portal.jobs.invalidate(source_pr).await;
    info!(source_pr, pr_number = pr.number, source = %source, target = %target, "promotion pull request ready");

    let submission = PromotionSubmission {
        branch_name: branch,
        file_path: target_path,
        pull_request_number: pr.number,
        pull_request_url: pr.html_url,
        source_pr,
        source_environment: source,
        target_environment: target,
    };
    Ok(request.mark_as_submitted(submission)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_and_tag_are_expected_rewrites() {
        let hcl = "module \"m\" {\n  environment    = \"dev\"\n  name           = \"dev\"\n  tags = {\n    armportal-environment = \"dev\"\n  }\n}\n";
        let rw = rewrite_environment(hcl, Environment::Dev, Environment::Qa).unwrap();
        assert_eq!(rw.rewritten, 2);
        assert_eq!(rw.unexpected, 0);
        assert!(rw.content.contains("  environment    = \"qa\""));
        assert!(rw.content.contains("    armportal-environment = \"qa\""));
        assert!(rw.content.contains("name           = \"dev\""));
    }

    #[test]
    fn repeated_or_foreign_assignments_are_unexpected() {
        let escaped = "environment=\"dev\"\ndescription = \"environment = \\\"dev\\\"\"";
        let rw = rewrite_environment(escaped, Environment::Dev, Environment::Qa).unwrap();
        assert_eq!((rw.rewritten, rw.unexpected), (1, 0));

        let twice = "environment = \"dev\"\nenvironment = \"dev\"";
        let rw = rewrite_environment(twice, Environment::Dev, Environment::Qa).unwrap();
        assert_eq!((rw.rewritten, rw.unexpected), (2, 1));

        let foreign = "deploy_environment = \"dev\"";
        let rw = rewrite_environment(foreign, Environment::Dev, Environment::Qa).unwrap();
        assert_eq!(rw.content, "deploy_environment = \"qa\"");
        assert_eq!(rw.unexpected, 1);
    }

    #[test]
    fn target_paths_swap_the_environment_directory() {
        assert_eq!(
            promoted_path("infra/environments/dev/rg-1.tf", Environment::Dev, Environment::Qa).as_deref(),
            Some("infra/environments/qa/rg-1.tf")
        );
        assert_eq!(
            promoted_path("infra/crossplane/claims/qa/shop-qa.yaml", Environment::Qa, Environment::Staging)
                .as_deref(),
            Some("infra/crossplane/claims/staging/shop-staging.yaml")
        );
        assert_eq!(
            promoted_path("infra/crossplane/claims/dev/shared.yaml", Environment::Dev, Environment::Qa)
                .as_deref(),
            Some("infra/crossplane/claims/qa/shared.yaml")
        );
        assert_eq!(promoted_path("README.md", Environment::Dev, Environment::Qa), None);
    }

    #[test]
    fn prod_promotions_are_high_priority() {
        let labels = promotion_labels(Provider::Terraform, Environment::Staging, Environment::Prod, 4);
        assert_eq!(
            labels,
            vec![
                "terraform-plan",
                "environment:prod",
                "promotion:staging-to-prod",
                "source-pr-4",
                "priority:high"
            ]
        );
        assert_eq!(promotion_labels(Provider::Terraform, Environment::Dev, Environment::Qa, 4).len(), 4);
    }
}
