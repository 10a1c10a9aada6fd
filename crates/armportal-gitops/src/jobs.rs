//! Job projection over provisioning pull requests.

use std::sync::Arc;
use std::time::Duration;

use armportal_core::cache::{cache_evict, cache_get, cache_put, Cache};
use armportal_core::{Environment, Job, PortalError, Result};
use tracing::debug;

use crate::body::PrMetadata;
use crate::branch::{file_exists, find_iac_file, infra_files};
use crate::error::GitHostError;
use crate::host::{GitHost, PrSort, PullRequest};
use crate::parse::{
    detect_provider, extract_module_name, latest_outputs, parse_metadata, pr_status,
    request_branch_environment, status_from_labels,
};

/// Detailed job projections are cached for an hour.
pub const DETAILS_TTL: Duration = Duration::from_secs(60 * 60);

fn details_key(number: u64) -> String {
    format!("pr:details:{number}")
}

fn pull_not_found(number: u64) -> impl FnOnce(GitHostError) -> PortalError {
    move |e| {
        if e.is_not_found() {
            PortalError::not_found(format!("Pull request #{number} not found"))
        } else {
            e.into()
        }
    }
}

/// The list-view projection: everything derivable from the pull request
/// itself without further API calls.
pub fn project_job(pr: &PullRequest, meta: &PrMetadata) -> Job {
    let status = status_from_labels(&pr.labels);
    let environment = meta
        .environment
        .as_deref()
        .and_then(|e| e.parse::<Environment>().ok())
        .or_else(|| request_branch_environment(&pr.head_ref));
    Job {
        pr_number: pr.number,
        title: pr.title.clone(),
        environment,
        blueprint_id: meta.blueprint_id.clone(),
        blueprint_version: meta.version.clone(),
        provider: detect_provider(
            meta.provider.as_deref(),
            &[meta.blueprint_id.as_deref(), meta.module_name.as_deref()],
            &pr.head_ref,
            None,
        ),
        module_name: meta.module_name.clone(),
        file_path: None,
        status: pr_status(pr),
        merged: pr.is_merged(),
        plan_status: status.plan,
        apply_status: status.apply,
        head_ref: pr.head_ref.clone(),
        created_by: meta.created_by.clone(),
        labels: pr.labels.clone(),
        outputs: None,
        resources: Vec::new(),
        resource_exists: None,
        pull_request_url: pr.html_url.clone(),
        created_at: pr.created_at,
        updated_at: pr.updated_at,
    }
}

/// Reads jobs from the git host, caching detailed projections.
#[derive(Clone)]
pub struct JobRepository {
    host: Arc<dyn GitHost>,
    cache: Arc<dyn Cache>,
}

impl JobRepository {
    pub fn new(host: Arc<dyn GitHost>, cache: Arc<dyn Cache>) -> Self {
        Self { host, cache }
    }

    pub fn host(&self) -> &Arc<dyn GitHost> {
        &self.host
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Pull requests on `requests/` branches, optionally for one environment.
    pub async fn list_jobs(&self, environment: Option<Environment>) -> Result<Vec<Job>> {
        let pulls = self.host.list_pull_requests(PrSort::Created, None).await?;
        let prefix = match environment {
            Some(env) => format!("requests/{env}/"),
            None => "requests/".to_string(),
        };
        Ok(pulls
            .iter()
            .filter(|pr| pr.head_ref.starts_with(&prefix))
            .map(|pr| {
                let mut job = project_job(pr, &parse_metadata(&pr.body));
                if environment.is_some() {
                    job.environment = environment;
                }
                job
            })
            .collect())
    }

    /// Detailed projection, served from cache when fresh.
    pub async fn get_job(&self, number: u64) -> Result<Job> {
        let key = details_key(number);
        if let Some(job) = cache_get::<Job>(self.cache.as_ref(), &key).await {
            debug!(pr_number = number, "job served from cache");
            return Ok(job);
        }
        let job = self.load_job(number).await?;
        cache_put(self.cache.as_ref(), &key, &job, DETAILS_TTL).await;
        Ok(job)
    }

    /// Detailed projection straight from the git host.
    pub async fn load_job(&self, number: u64) -> Result<Job> {
        let pr = self
            .host
            .get_pull_request(number)
            .await
            .map_err(pull_not_found(number))?;
        let (files, comments) = futures::try_join!(
            self.host.list_pull_request_files(number),
            self.host.list_comments(number),
        )?;

        let meta = parse_metadata(&pr.body);
        let mut job = project_job(&pr, &meta);
        let file_path = find_iac_file(&files).map(str::to_string);
        let module_name = file_path
            .as_deref()
            .and_then(extract_module_name)
            .or(meta.module_name.clone());

        job.provider = detect_provider(
            meta.provider.as_deref(),
            &[meta.blueprint_id.as_deref(), module_name.as_deref()],
            &pr.head_ref,
            file_path.as_deref(),
        );
        job.outputs = latest_outputs(&comments, module_name.as_deref());
        job.resource_exists = match (&file_path, pr.is_merged()) {
            (Some(path), true) => Some(file_exists(self.host.as_ref(), path, &pr.base_ref).await?),
            _ => Some(false),
        };
        job.resources = infra_files(&files);
        job.module_name = module_name;
        job.file_path = file_path;
        Ok(job)
    }

    /// Drop the cached projection after a workflow changes the pull request.
    pub async fn invalidate(&self, number: u64) {
        cache_evict(self.cache.as_ref(), &details_key(number)).await;
    }
}
