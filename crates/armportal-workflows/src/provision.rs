//! Provisioning: policy gate, render, branch, commit, pull request.
//!
//! The artifact is committed twice. The first render tags the resource
//! with the module name because the pull request number does not exist
//! yet; once the pull request is open the artifact is re-rendered with
//! the number and the same file is amended using the blob SHA the first
//! commit returned. When the re-render is byte-identical (stacks tag by
//! module name) the amend is skipped.

use armportal_core::metrics::METRICS;
use armportal_core::obs;
use armportal_core::policy::apply_auto_fill;
use armportal_core::{
    render, Blueprint, DomainEvent, PolicyInput, PreviewBlueprintQuery, PreviewOutcome,
    PortalError, Provider, ProvisionBlueprintCommand, ProvisionRequest, RenderRequest,
    RenderedArtifact, Result, Submission, Variables,
};
use armportal_gitops::{
    commit_file, ensure_branch, existing_sha, render_pr_body, NewPullRequest, PrMetadata,
    ProvisionDescription,
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::portal::{new_module_name, parse_environment, short_id, Portal};

/// Labels CI keys off for a fresh request.
pub fn provision_labels(provider: Provider, environment: &str) -> Vec<String> {
    let pipeline = match provider {
        Provider::Terraform => "terraform-plan",
        Provider::Crossplane => "crossplane",
    };
    vec![format!("environment:{environment}"), pipeline.to_string()]
}

fn stamp_message(provider: Provider, pr_number: u64) -> String {
    match provider {
        Provider::Terraform => format!("chore: update request-id tag with PR number #{pr_number}"),
        Provider::Crossplane => format!("chore: update request-id label with PR number #{pr_number}"),
    }
}

struct Naming {
    short: String,
    module_name: String,
    branch: String,
    commit_message: String,
    title: String,
}

fn naming(request: &ProvisionRequest, blueprint: &Blueprint) -> Naming {
    let short = short_id();
    let env = request.environment;
    match &request.module_name {
        Some(module) => Naming {
            branch: format!("requests/{env}/{module}-update-{short}"),
            commit_message: format!("chore: update {} in {env} ({module})", blueprint.id),
            title: format!("Update {} in {env} ({module})", blueprint.display_name()),
            module_name: module.clone(),
            short,
        },
        None => {
            let module = new_module_name(&blueprint.id, &short);
            Naming {
                branch: format!("requests/{env}/{module}"),
                commit_message: format!("chore: request {} in {env} ({short})", blueprint.id),
                title: format!("Provision {} in {env} ({short})", blueprint.display_name()),
                module_name: module,
                short,
            }
        }
    }
}

fn render_for(
    portal: &Portal,
    blueprint: &Blueprint,
    request: &ProvisionRequest,
    module_name: &str,
    pr_number: Option<u64>,
    provisioned_at: DateTime<Utc>,
) -> Result<RenderedArtifact> {
    render(&RenderRequest {
        blueprint,
        catalog: &portal.catalog,
        module_name,
        environment: request.environment,
        variables: request.effective_variables(),
        pr_number,
        created_by: request.created_by.as_deref(),
        provisioned_at,
    })
}

/// Validate, render and open the provisioning pull request.
pub async fn provision(
    portal: &Portal,
    cmd: &ProvisionBlueprintCommand,
) -> Result<(ProvisionRequest, Vec<DomainEvent>)> {
    let environment = parse_environment(&cmd.environment)?;
    let blueprint = portal
        .catalog
        .get(&cmd.blueprint_id, cmd.version.as_deref())?;

    let request = ProvisionRequest::new(&blueprint.id, environment, cmd.variables.clone())
        .with_version(Some(blueprint.version.clone()))
        .with_module_name(cmd.module_name.clone())
        .with_created_by(cmd.created_by.clone());
    request.validate_environment(blueprint)?;
    request.validate_required_variables(blueprint)?;
    let request = request
        .validate_policies(&portal.policy, blueprint)?
        .apply_auto_fill();

    let names = naming(&request, blueprint);
    let provisioned_at = Utc::now();
    let artifact = render_for(portal, blueprint, &request, &names.module_name, None, provisioned_at)?;

    let host = portal.host.as_ref();
    let base = host.base_branch().to_string();
    let base_sha = host.branch_sha(&base).await?;
    let branch = ensure_branch(host, &names.branch, &base_sha, false).await?;

    // An update finds the current file on the fresh branch, cut from base.
    let sha = existing_sha(host, &artifact.path, &branch).await?;
    let first = commit_file(
        host,
        &branch,
        &artifact.path,
        &artifact.content,
        &names.commit_message,
        sha.as_deref(),
    )
    .await?;

    let components: Vec<String> = blueprint.components.iter().map(|c| c.id.clone()).collect();
    let description = ProvisionDescription {
        provider: artifact.provider,
        artifact_name: &artifact.artifact_name,
        is_update: request.is_update(),
        kind: blueprint.crossplane.as_ref().map(|c| c.kind.as_str()),
        components: &components,
        fence: &artifact.fence,
        content: &artifact.content,
    }
    .render();
    let meta = PrMetadata {
        blueprint_id: Some(blueprint.id.clone()),
        version: request.version.clone(),
        environment: Some(environment.to_string()),
        provider: Some(artifact.provider.as_str().to_string()),
        created_by: request.created_by.clone(),
        module_name: Some(artifact.artifact_name.clone()),
    };
    let pr = host
        .create_pull_request(NewPullRequest {
            title: names.title,
            body: render_pr_body(&meta, &description),
            head: branch.clone(),
            base,
        })
        .await?;
    METRICS.inc_pull_requests_opened();
    obs::emit_pr_opened(pr.number, &branch, &pr.html_url);

    host.add_labels(pr.number, &provision_labels(artifact.provider, environment.as_str()))
        .await?;

    let stamped = render_for(
        portal,
        blueprint,
        &request,
        &names.module_name,
        Some(pr.number),
        provisioned_at,
    )?;
    let (commit_sha, request_id_stamped) = if stamped.digest() == artifact.digest() {
        (first.commit_sha, false)
    } else {
        let amended = commit_file(
            host,
            &branch,
            &stamped.path,
            &stamped.content,
            &stamp_message(stamped.provider, pr.number),
            Some(&first.content_sha),
        )
        .await
        .map_err(|e| {
            // The footer still names the module, so the request stays
            // resolvable without the stamped tag.
            warn!(pr_number = pr.number, branch = %branch, error = %e, "failed to stamp pull request number");
            PortalError::from(e)
        })?;
        (amended.commit_sha, true)
    };

    info!(
        pr_number = pr.number,
        module = %names.module_name,
        request = %names.short,
        stamped = request_id_stamped,
        "provisioning pull request ready"
    );

    let submission = Submission {
        branch_name: branch,
        file_path: stamped.path,
        pull_request_number: pr.number,
        pull_request_url: pr.html_url,
        commit_sha,
        provider: stamped.provider,
        module_name: stamped.artifact_name,
        request_id_stamped,
    };
    Ok(request.mark_as_submitted(submission)?)
}

/// Render a blueprint with policy evaluation and no git writes. A failing
/// policy result is returned, not raised.
pub fn preview(portal: &Portal, query: &PreviewBlueprintQuery) -> Result<PreviewOutcome> {
    let environment = parse_environment(&query.environment)?;
    let blueprint = portal
        .catalog
        .get(&query.blueprint_id, query.version.as_deref())?;

    let request = ProvisionRequest::new(&blueprint.id, environment, query.variables.clone())
        .with_module_name(query.module_name.clone())
        .with_created_by(query.created_by.clone());
    request.validate_environment(blueprint)?;

    let policy = portal.policy.validate_policies(PolicyInput {
        blueprint_id: &blueprint.id,
        environment,
        variables: &request.variables,
        blueprint: Some(blueprint),
    });
    let variables: Variables = apply_auto_fill(&request.variables, &policy.auto_filled);
    let module_name = query
        .module_name
        .clone()
        .unwrap_or_else(|| new_module_name(&blueprint.id, &short_id()));

    let artifact = render(&RenderRequest {
        blueprint,
        catalog: &portal.catalog,
        module_name: &module_name,
        environment,
        variables: &variables,
        pr_number: None,
        created_by: query.created_by.as_deref(),
        provisioned_at: Utc::now(),
    })?;
    Ok(PreviewOutcome { artifact, policy })
}
