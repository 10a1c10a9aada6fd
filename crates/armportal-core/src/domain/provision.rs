//! ProvisionRequest: the state machine behind a provisioning command.
//!
//! `pending` → (environment, required variables, policies) → `submitted`,
//! or `policy_failed` when the policy gate blocks. Transitions consume the
//! request and return the new state; events come back alongside it.

use serde::{Deserialize, Serialize};

use super::blueprint::{Blueprint, Provider};
use super::environment::Environment;
use super::error::{FieldError, PolicyIssue, PortalError, Rejected, Result};
use super::events::{DomainEvent, EventMeta};
use super::submission::Submission;
use super::variables::Variables;
use crate::policy::{apply_auto_fill, PolicyEngine, PolicyInput, PolicyResult};

/// Supplied by the hosting infrastructure, never by the requester.
const INFRA_SUPPLIED: &[&str] = &["subscription_id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStatus {
    #[default]
    Pending,
    PolicyFailed,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub blueprint_id: String,
    pub version: Option<String>,
    pub environment: Environment,
    pub variables: Variables,
    pub module_name: Option<String>,
    pub created_by: Option<String>,
    pub status: ProvisionStatus,
    pub policy_validation: Option<PolicyResult>,
    pub final_variables: Option<Variables>,
    pub submission: Option<Submission>,
}

/// Caller-facing summary of a provisioning request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionOutcome {
    pub blueprint_id: String,
    pub version: Option<String>,
    pub environment: Environment,
    pub status: ProvisionStatus,
    pub module_name: Option<String>,
    pub provider: Option<Provider>,
    pub branch_name: Option<String>,
    pub file_path: Option<String>,
    pub pull_request_number: Option<u64>,
    pub pull_request_url: Option<String>,
    pub policy_warnings: Vec<PolicyIssue>,
    pub auto_filled: Variables,
}

impl ProvisionRequest {
    pub fn new(blueprint_id: impl Into<String>, environment: Environment, variables: Variables) -> Self {
        Self {
            blueprint_id: blueprint_id.into(),
            version: None,
            environment,
            variables,
            module_name: None,
            created_by: None,
            status: ProvisionStatus::Pending,
            policy_validation: None,
            final_variables: None,
            submission: None,
        }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn with_module_name(mut self, module_name: Option<String>) -> Self {
        self.module_name = module_name;
        self
    }

    pub fn with_created_by(mut self, created_by: Option<String>) -> Self {
        self.created_by = created_by;
        self
    }

    /// A supplied module name means an existing resource is being updated.
    pub fn is_update(&self) -> bool {
        self.module_name.is_some()
    }

    pub fn pull_request_url(&self) -> Option<&str> {
        self.submission.as_ref().map(|s| s.pull_request_url.as_str())
    }

    pub fn validate_environment(&self, blueprint: &Blueprint) -> Result<()> {
        if blueprint.allows(self.environment) {
            return Ok(());
        }
        let allowed = blueprint
            .allowed_environments
            .iter()
            .map(Environment::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Err(PortalError::validation(
            format!(
                "Environment {} is not allowed for blueprint {}",
                self.environment, blueprint.id
            ),
            vec![FieldError::new(
                "environment",
                format!("Allowed environments: {allowed}"),
            )],
        ))
    }

    pub fn validate_required_variables(&self, blueprint: &Blueprint) -> Result<()> {
        let missing: Vec<_> = blueprint
            .required_variables()
            .filter(|def| !INFRA_SUPPLIED.contains(&def.name.as_str()))
            .filter(|def| !self.variables.contains_key(&def.name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let names = missing
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Err(PortalError::validation(
            format!("Missing required variables: {names}"),
            missing
                .iter()
                .map(|d| FieldError::new(&d.name, format!("{} is required", d.display_label())))
                .collect(),
        ))
    }

    /// Run the policy gate. A blocking result moves the request to
    /// `policy_failed`.
    pub fn validate_policies(
        mut self,
        engine: &PolicyEngine,
        blueprint: &Blueprint,
    ) -> std::result::Result<Self, Rejected<Self>> {
        let result = engine.validate_policies(PolicyInput {
            blueprint_id: &self.blueprint_id,
            environment: self.environment,
            variables: &self.variables,
            blueprint: Some(blueprint),
        });
        self.policy_validation = Some(result.clone());
        if result.valid {
            Ok(self)
        } else {
            self.status = ProvisionStatus::PolicyFailed;
            Err(Rejected::new(self, result.into_error()))
        }
    }

    /// Compute the final variables: explicit values over auto-filled ones.
    pub fn apply_auto_fill(mut self) -> Self {
        let merged = match &self.policy_validation {
            Some(p) => apply_auto_fill(&self.variables, &p.auto_filled),
            None => self.variables.clone(),
        };
        self.final_variables = Some(merged);
        self
    }

    /// Variables to render with.
    pub fn effective_variables(&self) -> &Variables {
        self.final_variables.as_ref().unwrap_or(&self.variables)
    }

    pub fn mark_as_submitted(
        mut self,
        submission: Submission,
    ) -> std::result::Result<(Self, Vec<DomainEvent>), Rejected<Self>> {
        if self.status != ProvisionStatus::Pending {
            let message = format!(
                "Provision request cannot be submitted from status {:?}",
                self.status
            );
            return Err(Rejected::new(self, PortalError::conflict(message)));
        }
        let event = DomainEvent::BlueprintProvisioned {
            meta: EventMeta::now(),
            blueprint_id: self.blueprint_id.clone(),
            environment: self.environment,
            pull_request_url: submission.pull_request_url.clone(),
            created_by: self.created_by.clone(),
        };
        self.module_name = Some(submission.module_name.clone());
        self.submission = Some(submission);
        self.status = ProvisionStatus::Submitted;
        Ok((self, vec![event]))
    }

    pub fn to_result(&self) -> ProvisionOutcome {
        let policy = self.policy_validation.as_ref();
        ProvisionOutcome {
            blueprint_id: self.blueprint_id.clone(),
            version: self.version.clone(),
            environment: self.environment,
            status: self.status,
            module_name: self.module_name.clone(),
            provider: self.submission.as_ref().map(|s| s.provider),
            branch_name: self.submission.as_ref().map(|s| s.branch_name.clone()),
            file_path: self.submission.as_ref().map(|s| s.file_path.clone()),
            pull_request_number: self.submission.as_ref().map(|s| s.pull_request_number),
            pull_request_url: self.pull_request_url().map(str::to_string),
            policy_warnings: policy.map(|p| p.warnings.clone()).unwrap_or_default(),
            auto_filled: policy.map(|p| p.auto_filled.clone()).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::blueprint::{VariableDef, VariableType};
    use serde_json::json;

    fn blueprint() -> Blueprint {
        let var = |name: &str, required: bool| VariableDef {
            name: name.to_string(),
            label: None,
            var_type: VariableType::String,
            required,
            options: vec![],
            default: None,
            description: None,
        };
        Blueprint {
            id: "azure-rg-basic".to_string(),
            version: "1.0.0".to_string(),
            display_name: None,
            description: None,
            provider: Provider::Terraform,
            module_source: Some("../../modules/azure-rg-basic".to_string()),
            variables: vec![
                var("project_name", true),
                var("location", true),
                var("subscription_id", true),
            ],
            outputs: vec![],
            allowed_environments: vec![Environment::Dev, Environment::Qa],
            components: vec![],
            stack_outputs: vec![],
            crossplane: None,
        }
    }

    fn submission() -> Submission {
        Submission {
            branch_name: "requests/dev/azure-rg-basic-0a1b2c3d".to_string(),
            file_path: "infra/environments/dev/azure-rg-basic-0a1b2c3d.tf".to_string(),
            pull_request_number: 5,
            pull_request_url: "https://github.com/o/r/pull/5".to_string(),
            commit_sha: "abc".to_string(),
            provider: Provider::Terraform,
            module_name: "azure-rg-basic-0a1b2c3d".to_string(),
            request_id_stamped: true,
        }
    }

    #[test]
    fn disallowed_environment_is_rejected() {
        let req = ProvisionRequest::new("azure-rg-basic", Environment::Prod, Variables::new());
        let err = req.validate_environment(&blueprint()).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("not allowed"));
    }

    #[test]
    fn missing_required_variable_yields_field_error() {
        let vars = Variables::from([("project_name".to_string(), json!("demo"))]);
        let req = ProvisionRequest::new("azure-rg-basic", Environment::Dev, vars);
        match req.validate_required_variables(&blueprint()).unwrap_err() {
            PortalError::Validation { errors, .. } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "location");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn policy_failure_moves_to_policy_failed() {
        let vars = Variables::from([
            ("project_name".to_string(), json!("Not Valid")),
            ("location".to_string(), json!("eastus2")),
        ]);
        let req = ProvisionRequest::new("azure-rg-basic", Environment::Dev, vars);
        let rejected = req
            .validate_policies(&PolicyEngine::default(), &blueprint())
            .unwrap_err();
        assert_eq!(rejected.state.status, ProvisionStatus::PolicyFailed);
        assert!(matches!(rejected.error, PortalError::Policy { .. }));
    }

    #[test]
    fn submit_once_then_terminal() {
        let vars = Variables::from([
            ("project_name".to_string(), json!("demo")),
            ("location".to_string(), json!("eastus2")),
            ("subscription_id".to_string(), json!("sub")),
        ]);
        let req = ProvisionRequest::new("azure-rg-basic", Environment::Dev, vars)
            .validate_policies(&PolicyEngine::default(), &blueprint())
            .unwrap()
            .apply_auto_fill();
        assert_eq!(req.effective_variables()["environment"], json!("dev"));

        let (req, events) = req.mark_as_submitted(submission()).unwrap();
        assert_eq!(req.status, ProvisionStatus::Submitted);
        assert_eq!(events.len(), 1);
        let outcome = req.to_result();
        assert_eq!(outcome.pull_request_number, Some(5));
        assert_eq!(outcome.auto_filled["environment"], json!("dev"));

        let rejected = req.mark_as_submitted(submission()).unwrap_err();
        assert_eq!(rejected.error.status_code(), 409);
    }
}
