//! Domain-level error taxonomy for ARM Portal.
//!
//! Every failure that crosses the request pipeline is a [`PortalError`].
//! Each variant carries an HTTP status hint so the outer layer can render
//! one uniform [`ErrorBody`] without re-classifying.

use serde::{Deserialize, Serialize};

/// A field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Severity attached to a policy finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A single policy finding. Errors block, warnings inform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyIssue {
    /// Policy identifier, e.g. `naming-convention` or `required-tags`.
    pub policy: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_tags: Vec<String>,
}

impl PolicyIssue {
    pub fn new(policy: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            message: message.into(),
            field: None,
            severity: None,
            missing_tags: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_missing_tags(mut self, tags: Vec<String>) -> Self {
        self.missing_tags = tags;
        self
    }
}

/// ARM Portal domain errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortalError {
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },

    #[error("{message}")]
    NotFound { message: String },

    #[error("policy validation failed: {}", summarize(.errors))]
    Policy {
        errors: Vec<PolicyIssue>,
        warnings: Vec<PolicyIssue>,
    },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("upstream failure: {message}")]
    Upstream { message: String },

    #[error("{message}")]
    Unexpected { message: String },

    #[error("No handler registered for request type: {request_type}")]
    HandlerNotRegistered { request_type: String },
}

fn summarize(issues: &[PolicyIssue]) -> String {
    issues
        .iter()
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl PortalError {
    pub fn validation(message: impl Into<String>, errors: Vec<FieldError>) -> Self {
        PortalError::Validation {
            message: message.into(),
            errors,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        PortalError::NotFound {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortalError::Conflict {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        PortalError::Upstream {
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        PortalError::Unexpected {
            message: message.into(),
        }
    }

    /// HTTP status hint for the outer layer.
    pub fn status_code(&self) -> u16 {
        match self {
            PortalError::Validation { .. } | PortalError::Policy { .. } => 400,
            PortalError::NotFound { .. } => 404,
            PortalError::Conflict { .. } => 409,
            PortalError::Upstream { .. } => 502,
            PortalError::Unexpected { .. } | PortalError::HandlerNotRegistered { .. } => 500,
        }
    }

    /// Short machine-readable classification.
    pub fn kind(&self) -> &'static str {
        match self {
            PortalError::Validation { .. } => "validation_failed",
            PortalError::NotFound { .. } => "not_found",
            PortalError::Policy { .. } => "policy_failed",
            PortalError::Conflict { .. } => "conflict",
            PortalError::Upstream { .. } => "upstream_failure",
            PortalError::Unexpected { .. } => "unexpected",
            PortalError::HandlerNotRegistered { .. } => "handler_not_registered",
        }
    }

    /// Whether this error is one the pipeline expects handlers to return.
    pub fn is_expected(&self) -> bool {
        !matches!(
            self,
            PortalError::Unexpected { .. } | PortalError::HandlerNotRegistered { .. }
        )
    }

    pub fn to_body(&self) -> ErrorBody {
        let (errors, warnings) = match self {
            PortalError::Validation { errors, .. } => (
                errors
                    .iter()
                    .map(|e| serde_json::json!({ "field": e.field, "message": e.message }))
                    .collect(),
                Vec::new(),
            ),
            PortalError::Policy { errors, warnings } => (
                errors.iter().filter_map(|e| serde_json::to_value(e).ok()).collect(),
                warnings.clone(),
            ),
            _ => (Vec::new(), Vec::new()),
        };
        ErrorBody {
            status: self.status_code(),
            error: self.kind().to_string(),
            message: self.to_string(),
            errors,
            warnings,
        }
    }
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        PortalError::unexpected(format!("serialization error: {err}"))
    }
}

impl From<serde_yaml::Error> for PortalError {
    fn from(err: serde_yaml::Error) -> Self {
        PortalError::unexpected(format!("yaml error: {err}"))
    }
}

impl From<std::io::Error> for PortalError {
    fn from(err: std::io::Error) -> Self {
        PortalError::unexpected(format!("io error: {err}"))
    }
}

/// Uniform serialized failure shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PolicyIssue>,
}

/// A failed state transition: the entity's resulting state plus the reason.
#[derive(Debug, Clone)]
pub struct Rejected<T> {
    pub state: T,
    pub error: PortalError,
}

impl<T> Rejected<T> {
    pub fn new(state: T, error: PortalError) -> Self {
        Self { state, error }
    }
}

impl<T> From<Rejected<T>> for PortalError {
    fn from(rejected: Rejected<T>) -> Self {
        rejected.error
    }
}

/// Result type for ARM Portal domain operations.
pub type Result<T> = std::result::Result<T, PortalError>;
