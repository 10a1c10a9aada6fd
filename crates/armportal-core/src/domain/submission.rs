//! What the git host handed back after a workflow opened a pull request.

use serde::{Deserialize, Serialize};

use super::blueprint::Provider;
use super::environment::Environment;

/// A provisioning pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub branch_name: String,
    pub file_path: String,
    pub pull_request_number: u64,
    pub pull_request_url: String,
    pub commit_sha: String,
    pub provider: Provider,
    pub module_name: String,
    /// False when the second phase (PR number injection) was not needed.
    pub request_id_stamped: bool,
}

/// A promotion pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionSubmission {
    pub branch_name: String,
    pub file_path: String,
    pub pull_request_number: u64,
    pub pull_request_url: String,
    pub source_pr: u64,
    pub source_environment: Environment,
    pub target_environment: Environment,
}

/// How a destroy pull request signals removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyMethod {
    /// The artifact existed on the base branch and is deleted.
    DeletedFile,
    /// Terraform artifact already absent; a `.destroy` marker is committed.
    Marker,
    /// Crossplane artifact already absent; absence is itself the signal and
    /// only a note is committed.
    AlreadyAbsent,
}

/// A destroy pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroySubmission {
    pub branch_name: String,
    pub file_path: String,
    pub pull_request_number: u64,
    pub pull_request_url: String,
    pub destroys_pr: u64,
    pub method: DestroyMethod,
}

/// Caller-facing summary of a destroy request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyOutcome {
    pub source_pr: u64,
    pub source_environment: Option<Environment>,
    pub destroy: DestroySubmission,
}
