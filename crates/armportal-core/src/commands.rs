//! Commands and queries accepted by the mediator.
//!
//! Environments travel as raw strings so that a bad value reaches the
//! validation behavior and comes back as a field error rather than failing
//! deserialization.

use serde::{Deserialize, Serialize};

use crate::domain::variables::Variables;
use crate::policy::PolicyResult;
use crate::render::RenderedArtifact;

/// Request a new resource, or update one when `module_name` is given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionBlueprintCommand {
    pub blueprint_id: String,
    #[serde(default)]
    pub version: Option<String>,
    pub environment: String,
    #[serde(default)]
    pub variables: Variables,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Promote a merged resource to the next environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoteResourceCommand {
    pub pr_number: u64,
    #[serde(default)]
    pub target_environment: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyResourceCommand {
    pub pr_number: u64,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetJobQuery {
    pub pr_number: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsQuery {
    #[serde(default)]
    pub environment: Option<String>,
}

/// Render a blueprint offline, with policy evaluation but no git writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewBlueprintQuery {
    pub blueprint_id: String,
    #[serde(default)]
    pub version: Option<String>,
    pub environment: String,
    #[serde(default)]
    pub variables: Variables,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewOutcome {
    pub artifact: RenderedArtifact,
    pub policy: PolicyResult,
}
