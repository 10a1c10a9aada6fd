//! PromotionRequest: moves a merged job one step along the environment chain.

use serde::{Deserialize, Serialize};

use super::environment::Environment;
use super::error::{PolicyIssue, PortalError, Rejected, Result};
use super::events::{DomainEvent, EventMeta};
use super::job::Job;
use super::submission::PromotionSubmission;
use crate::policy::{PolicyEngine, PolicyResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
    #[default]
    Pending,
    PolicyFailed,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionRequest {
    pub source_job: Job,
    pub target_environment: Environment,
    pub status: PromotionStatus,
    pub policy_validation: Option<PolicyResult>,
    pub promotion_pr: Option<PromotionSubmission>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionOutcome {
    pub source_pr: u64,
    pub source_environment: Option<Environment>,
    pub target_environment: Environment,
    pub status: PromotionStatus,
    pub pull_request_number: Option<u64>,
    pub pull_request_url: Option<String>,
    pub branch_name: Option<String>,
    pub file_path: Option<String>,
    pub policy_warnings: Vec<PolicyIssue>,
}

impl PromotionRequest {
    /// Derive the target environment, failing when the job is not promotable.
    pub fn new(source_job: Job, target: Option<Environment>) -> Result<Self> {
        let target_environment = source_job.validate_promotion(target)?;
        Ok(Self {
            source_job,
            target_environment,
            status: PromotionStatus::Pending,
            policy_validation: None,
            promotion_pr: None,
        })
    }

    pub fn source_environment(&self) -> Option<Environment> {
        self.source_job.environment
    }

    /// Adjacency plus approval requirements of the target environment.
    pub fn validate_policies(mut self, engine: &PolicyEngine) -> std::result::Result<Self, Rejected<Self>> {
        let mut result = engine.validate_promotion(
            self.source_job.environment,
            self.source_job.merged,
            self.target_environment,
        );
        result
            .warnings
            .extend(engine.approval_warning(self.target_environment));
        self.policy_validation = Some(result.clone());
        if result.valid {
            Ok(self)
        } else {
            self.status = PromotionStatus::PolicyFailed;
            Err(Rejected::new(self, result.into_error()))
        }
    }

    pub fn mark_as_submitted(
        mut self,
        submission: PromotionSubmission,
    ) -> std::result::Result<(Self, Vec<DomainEvent>), Rejected<Self>> {
        let Some(source_environment) = self.source_job.environment else {
            return Err(Rejected::new(
                self,
                PortalError::conflict("Promotion source has no environment"),
            ));
        };
        if self.status != PromotionStatus::Pending {
            let message = format!("Promotion cannot be submitted from status {:?}", self.status);
            return Err(Rejected::new(self, PortalError::conflict(message)));
        }
        let event = DomainEvent::ResourcePromoted {
            meta: EventMeta::now(),
            source_job_id: self.source_job.pr_number,
            source_environment,
            target_environment: self.target_environment,
            pull_request_url: submission.pull_request_url.clone(),
        };
        self.promotion_pr = Some(submission);
        self.status = PromotionStatus::Submitted;
        Ok((self, vec![event]))
    }

    pub fn to_result(&self) -> PromotionOutcome {
        let pr = self.promotion_pr.as_ref();
        PromotionOutcome {
            source_pr: self.source_job.pr_number,
            source_environment: self.source_job.environment,
            target_environment: self.target_environment,
            status: self.status,
            pull_request_number: pr.map(|p| p.pull_request_number),
            pull_request_url: pr.map(|p| p.pull_request_url.clone()),
            branch_name: pr.map(|p| p.branch_name.clone()),
            file_path: pr.map(|p| p.file_path.clone()),
            policy_warnings: self
                .policy_validation
                .as_ref()
                .map(|p| p.warnings.clone())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::JobStatus;

    fn job(env: Environment) -> Job {
        Job {
            pr_number: 21,
            environment: Some(env),
            status: JobStatus::Merged,
            merged: true,
            ..Job::default()
        }
    }

    fn submission(target: Environment) -> PromotionSubmission {
        PromotionSubmission {
            branch_name: "requests/qa/x-promoted-1".to_string(),
            file_path: "infra/environments/qa/x.tf".to_string(),
            pull_request_number: 22,
            pull_request_url: "https://github.com/o/r/pull/22".to_string(),
            source_pr: 21,
            source_environment: Environment::Dev,
            target_environment: target,
        }
    }

    #[test]
    fn target_is_derived_from_chain() {
        let req = PromotionRequest::new(job(Environment::Staging), None).unwrap();
        assert_eq!(req.target_environment, Environment::Prod);
        assert!(PromotionRequest::new(job(Environment::Prod), None).is_err());
    }

    #[test]
    fn policies_add_approval_warning() {
        let req = PromotionRequest::new(job(Environment::Dev), None)
            .unwrap()
            .validate_policies(&PolicyEngine::default())
            .unwrap();
        let warnings = &req.policy_validation.as_ref().unwrap().warnings;
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].policy, "approval-required");
    }

    #[test]
    fn submission_raises_promoted_event() {
        let req = PromotionRequest::new(job(Environment::Dev), None).unwrap();
        let (req, events) = req.mark_as_submitted(submission(Environment::Qa)).unwrap();
        assert_eq!(req.status, PromotionStatus::Submitted);
        match &events[0] {
            DomainEvent::ResourcePromoted {
                source_job_id,
                source_environment,
                target_environment,
                ..
            } => {
                assert_eq!(*source_job_id, 21);
                assert_eq!(*source_environment, Environment::Dev);
                assert_eq!(*target_environment, Environment::Qa);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(req.to_result().pull_request_number, Some(22));
    }
}
