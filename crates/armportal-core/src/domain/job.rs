//! Job: the read-model projection of a provisioning pull request.
//!
//! The pull request is the source of truth; a `Job` is rebuilt from it on
//! demand and only changes through the transition methods below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::blueprint::Provider;
use super::environment::Environment;
use super::error::{FieldError, PortalError, Rejected, Result};
use super::events::{DomainEvent, EventMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Open,
    Running,
    Merged,
    Closed,
    Failed,
    Cancelled,
    Destroying,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Open => "open",
            JobStatus::Running => "running",
            JobStatus::Merged => "merged",
            JobStatus::Closed => "closed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Destroying => "destroying",
        }
    }
}

/// Plan/apply outcome as reported by CI labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Unknown,
    Ok,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub pr_number: u64,
    pub title: String,
    pub environment: Option<Environment>,
    pub blueprint_id: Option<String>,
    pub blueprint_version: Option<String>,
    pub provider: Provider,
    pub module_name: Option<String>,
    pub file_path: Option<String>,
    pub status: JobStatus,
    pub merged: bool,
    pub plan_status: StageStatus,
    pub apply_status: StageStatus,
    pub head_ref: String,
    pub created_by: Option<String>,
    pub labels: Vec<String>,
    /// Non-sensitive outputs parsed from CI comments.
    pub outputs: Option<serde_json::Map<String, serde_json::Value>>,
    /// Paths of infrastructure files touched by the pull request.
    pub resources: Vec<String>,
    /// Whether the artifact is still present on the base branch.
    pub resource_exists: Option<bool>,
    pub pull_request_url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn promotion_error(message: &str) -> PortalError {
    PortalError::validation(message, vec![FieldError::new("prNumber", message)])
}

impl Job {
    pub fn next_environment(&self) -> Option<Environment> {
        self.environment.and_then(|e| e.next())
    }

    /// The environment this job can be promoted into.
    pub fn can_promote(&self) -> Result<Environment> {
        if !self.merged {
            return Err(promotion_error(
                "Resource must be merged and deployed before promotion",
            ));
        }
        let env = self
            .environment
            .ok_or_else(|| promotion_error("Source resource has no environment specified"))?;
        env.next().ok_or_else(|| {
            promotion_error("Cannot promote from production - it is the final environment")
        })
    }

    /// Resolve the promotion target, defaulting to the next environment.
    pub fn validate_promotion(&self, target: Option<Environment>) -> Result<Environment> {
        let next = self.can_promote()?;
        match target {
            None => Ok(next),
            Some(t) if t == next => Ok(t),
            Some(t) => Err(PortalError::validation(
                format!(
                    "Cannot promote from {} to {t}. Next environment is {next}",
                    self.environment.map(|e| e.as_str()).unwrap_or("unknown")
                ),
                vec![FieldError::new(
                    "targetEnvironment",
                    format!("Target environment must be {next}"),
                )],
            )),
        }
    }

    /// Set a lifecycle status. `destroying` is only reachable via
    /// [`Job::mark_as_destroyed`].
    pub fn update_status(mut self, status: JobStatus) -> std::result::Result<Self, Rejected<Self>> {
        if status == JobStatus::Destroying || self.status == JobStatus::Destroying {
            let message = format!(
                "Invalid status transition: {} -> {}",
                self.status.as_str(),
                status.as_str()
            );
            return Err(Rejected::new(
                self,
                PortalError::validation(message, vec![FieldError::new("status", "Invalid status")]),
            ));
        }
        self.status = status;
        self.merged = self.merged || status == JobStatus::Merged;
        Ok(self)
    }

    pub fn mark_as_destroyed(
        mut self,
        pull_request_url: impl Into<String>,
    ) -> std::result::Result<(Self, Vec<DomainEvent>), Rejected<Self>> {
        if !self.merged {
            return Err(Rejected::new(
                self,
                PortalError::validation(
                    "Only merged resources can be destroyed",
                    vec![FieldError::new("prNumber", "Pull request is not merged")],
                ),
            ));
        }
        self.status = JobStatus::Destroying;
        let event = DomainEvent::ResourceDestroyed {
            meta: EventMeta::now(),
            job_id: self.pr_number,
            pull_request_url: pull_request_url.into(),
        };
        Ok((self, vec![event]))
    }
}
