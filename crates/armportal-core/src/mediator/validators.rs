//! Per-request validators run by [`super::ValidationBehavior`].

use std::str::FromStr;
use std::sync::Arc;

use super::{Request, RequestKind};
use crate::domain::environment::Environment;
use crate::domain::error::FieldError;

pub trait RequestValidator: Send + Sync {
    /// Field errors for the request; empty means valid.
    fn validate(&self, request: &Request) -> Vec<FieldError>;
}

fn require_text(errors: &mut Vec<FieldError>, field: &str, value: &str, label: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, format!("{label} is required")));
    }
}

fn require_environment(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "Environment is required"));
    } else if Environment::from_str(value).is_err() {
        errors.push(FieldError::new(
            field,
            "Environment must be one of: dev, qa, staging, prod",
        ));
    }
}

fn require_pr_number(errors: &mut Vec<FieldError>, pr_number: u64) {
    if pr_number == 0 {
        errors.push(FieldError::new("prNumber", "PR number must be a positive integer"));
    }
}

fn optional_module_name(errors: &mut Vec<FieldError>, module_name: Option<&str>) {
    if module_name.is_some_and(|m| m.trim().is_empty()) {
        errors.push(FieldError::new("moduleName", "Module name cannot be blank"));
    }
}

pub struct ProvisionBlueprintValidator;

impl RequestValidator for ProvisionBlueprintValidator {
    fn validate(&self, request: &Request) -> Vec<FieldError> {
        let Request::ProvisionBlueprint(cmd) = request else {
            return Vec::new();
        };
        let mut errors = Vec::new();
        require_text(&mut errors, "blueprintId", &cmd.blueprint_id, "Blueprint ID");
        require_environment(&mut errors, "environment", &cmd.environment);
        optional_module_name(&mut errors, cmd.module_name.as_deref());
        errors
    }
}

pub struct PreviewBlueprintValidator;

impl RequestValidator for PreviewBlueprintValidator {
    fn validate(&self, request: &Request) -> Vec<FieldError> {
        let Request::PreviewBlueprint(query) = request else {
            return Vec::new();
        };
        let mut errors = Vec::new();
        require_text(&mut errors, "blueprintId", &query.blueprint_id, "Blueprint ID");
        require_environment(&mut errors, "environment", &query.environment);
        optional_module_name(&mut errors, query.module_name.as_deref());
        errors
    }
}

pub struct PromoteResourceValidator;

impl RequestValidator for PromoteResourceValidator {
    fn validate(&self, request: &Request) -> Vec<FieldError> {
        let Request::PromoteResource(cmd) = request else {
            return Vec::new();
        };
        let mut errors = Vec::new();
        require_pr_number(&mut errors, cmd.pr_number);
        if let Some(target) = &cmd.target_environment {
            require_environment(&mut errors, "targetEnvironment", target);
        }
        errors
    }
}

pub struct DestroyResourceValidator;

impl RequestValidator for DestroyResourceValidator {
    fn validate(&self, request: &Request) -> Vec<FieldError> {
        let Request::DestroyResource(cmd) = request else {
            return Vec::new();
        };
        let mut errors = Vec::new();
        require_pr_number(&mut errors, cmd.pr_number);
        errors
    }
}

pub struct GetJobValidator;

impl RequestValidator for GetJobValidator {
    fn validate(&self, request: &Request) -> Vec<FieldError> {
        let Request::GetJob(query) = request else {
            return Vec::new();
        };
        let mut errors = Vec::new();
        require_pr_number(&mut errors, query.pr_number);
        errors
    }
}

pub struct ListJobsValidator;

impl RequestValidator for ListJobsValidator {
    fn validate(&self, request: &Request) -> Vec<FieldError> {
        let Request::ListJobs(query) = request else {
            return Vec::new();
        };
        let mut errors = Vec::new();
        if let Some(env) = &query.environment {
            require_environment(&mut errors, "environment", env);
        }
        errors
    }
}

fn entry<V: RequestValidator + 'static>(
    kind: RequestKind,
    validator: V,
) -> (RequestKind, Arc<dyn RequestValidator>) {
    (kind, Arc::new(validator))
}

/// The validator table used by [`super::ValidationBehavior::standard`].
pub fn standard_validators() -> Vec<(RequestKind, Arc<dyn RequestValidator>)> {
    vec![
        entry(RequestKind::ProvisionBlueprint, ProvisionBlueprintValidator),
        entry(RequestKind::PromoteResource, PromoteResourceValidator),
        entry(RequestKind::DestroyResource, DestroyResourceValidator),
        entry(RequestKind::GetJob, GetJobValidator),
        entry(RequestKind::ListJobs, ListJobsValidator),
        entry(RequestKind::PreviewBlueprint, PreviewBlueprintValidator),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{
        DestroyResourceCommand, PromoteResourceCommand, ProvisionBlueprintCommand,
    };

    fn fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn provision_requires_blueprint_and_known_environment() {
        let req = Request::ProvisionBlueprint(ProvisionBlueprintCommand {
            blueprint_id: " ".to_string(),
            environment: "production".to_string(),
            module_name: Some(String::new()),
            ..Default::default()
        });
        let errors = ProvisionBlueprintValidator.validate(&req);
        assert_eq!(fields(&errors), vec!["blueprintId", "environment", "moduleName"]);
    }

    #[test]
    fn valid_provision_passes() {
        let req = Request::ProvisionBlueprint(ProvisionBlueprintCommand {
            blueprint_id: "azure-rg-basic".to_string(),
            environment: "QA".to_string(),
            ..Default::default()
        });
        assert!(ProvisionBlueprintValidator.validate(&req).is_empty());
    }

    #[test]
    fn promote_checks_pr_number_and_optional_target() {
        let req = Request::PromoteResource(PromoteResourceCommand {
            pr_number: 0,
            target_environment: Some("uat".to_string()),
            created_by: None,
        });
        let errors = PromoteResourceValidator.validate(&req);
        assert_eq!(fields(&errors), vec!["prNumber", "targetEnvironment"]);
    }

    #[test]
    fn destroy_needs_positive_pr() {
        let req = Request::DestroyResource(DestroyResourceCommand {
            pr_number: 0,
            created_by: None,
        });
        assert_eq!(DestroyResourceValidator.validate(&req).len(), 1);
    }

    #[test]
    fn standard_table_covers_every_kind() {
        let kinds: Vec<_> = standard_validators().into_iter().map(|(k, _)| k).collect();
        for kind in RequestKind::ALL {
            assert!(kinds.contains(&kind), "{kind}");
        }
    }
}
