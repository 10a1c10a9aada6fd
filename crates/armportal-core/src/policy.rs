//! Provisioning and promotion policy engine.
//!
//! Evaluates a [`PolicyInput`] against a [`PolicyConfig`] to produce a
//! [`PolicyResult`]: blocking errors, informational warnings, and the
//! variables that were auto-filled. Also checks promotion adjacency and
//! Azure resource naming rules.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::blueprint::Blueprint;
use crate::domain::environment::Environment;
use crate::domain::error::{PolicyIssue, PortalError, Severity};
use crate::domain::variables::{is_blank, text_of, Variables};
use crate::obs;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamingPolicy {
    pub enabled: bool,
    pub pattern: String,
    pub max_length: usize,
    pub message: String,
    /// Variables the naming rule is applied to.
    pub applies_to: Vec<String>,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            pattern: "^[a-z0-9-]+$".to_string(),
            max_length: 63,
            message: "Resource names must be lowercase alphanumeric with hyphens only".to_string(),
            applies_to: vec!["project_name".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentPolicy {
    pub requires_approval: bool,
    #[serde(default)]
    pub approval_count: u32,
    pub message: String,
    #[serde(default)]
    pub requires_change_control: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    pub naming: NamingPolicy,
    pub required_tags: Vec<String>,
    pub environments: BTreeMap<Environment, EnvironmentPolicy>,
    pub promotion_paths: BTreeMap<Environment, Vec<Environment>>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let env = |requires_approval: bool, approval_count: u32, message: &str, cc: bool| {
            EnvironmentPolicy {
                requires_approval,
                approval_count,
                message: message.to_string(),
                requires_change_control: cc,
            }
        };
        let environments = BTreeMap::from([
            (
                Environment::Dev,
                env(false, 0, "Development environment - no approval required", false),
            ),
            (
                Environment::Qa,
                env(true, 1, "QA deployments require 1 approval", false),
            ),
            (
                Environment::Staging,
                env(
                    true,
                    1,
                    "Staging deployments require 1 approval and must match QA tested config",
                    false,
                ),
            ),
            (
                Environment::Prod,
                env(true, 2, "Production deployments require 2 approvals", true),
            ),
        ]);
        let promotion_paths = Environment::ALL
            .iter()
            .map(|e| (*e, e.next().into_iter().collect()))
            .collect();

        Self {
            naming: NamingPolicy::default(),
            required_tags: vec![
                "owner".to_string(),
                "cost_center".to_string(),
                "environment".to_string(),
            ],
            environments,
            promotion_paths,
        }
    }
}

// ---------------------------------------------------------------------------
// Input / result
// ---------------------------------------------------------------------------

/// Everything the engine needs to judge a provisioning request.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    pub blueprint_id: &'a str,
    pub environment: Environment,
    pub variables: &'a Variables,
    pub blueprint: Option<&'a Blueprint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResult {
    pub valid: bool,
    pub errors: Vec<PolicyIssue>,
    pub warnings: Vec<PolicyIssue>,
    pub auto_filled: Variables,
}

impl PolicyResult {
    fn from_parts(errors: Vec<PolicyIssue>, warnings: Vec<PolicyIssue>, auto_filled: Variables) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
            auto_filled,
        }
    }

    /// Convert a failed result into the blocking policy error.
    pub fn into_error(self) -> PortalError {
        PortalError::Policy {
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

/// Merge auto-filled values underneath the explicit variables.
/// An explicitly supplied key is never overwritten.
pub fn apply_auto_fill(variables: &Variables, auto_filled: &Variables) -> Variables {
    let mut merged = variables.clone();
    for (k, v) in auto_filled {
        merged.entry(k.clone()).or_insert_with(|| v.clone());
    }
    merged
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PolicyEngine {
    config: PolicyConfig,
    naming: Option<Regex>,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new(PolicyConfig::default())
    }
}

impl PolicyEngine {
    pub fn new(config: PolicyConfig) -> Self {
        let naming = Regex::new(&config.naming.pattern).ok();
        Self { config, naming }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn environment_policy(&self, env: Environment) -> Option<&EnvironmentPolicy> {
        self.config.environments.get(&env)
    }

    /// Evaluate a provisioning request.
    pub fn validate_policies(&self, input: PolicyInput<'_>) -> PolicyResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut auto_filled = Variables::new();
        let vars = input.variables;

        if let Some(bp) = input.blueprint {
            for def in bp.required_variables() {
                if is_blank(vars.get(&def.name)) {
                    errors.push(
                        PolicyIssue::new(
                            "required-field",
                            format!("{} is required", def.display_label()),
                        )
                        .with_field(&def.name),
                    );
                }
            }
        }

        if self.config.naming.enabled {
            for field in &self.config.naming.applies_to {
                if let Some(name) = text_of(vars, field) {
                    errors.extend(self.check_naming(field, &name));
                }
            }
        }

        if !vars.contains_key("environment") {
            auto_filled.insert(
                "environment".to_string(),
                serde_json::Value::String(input.environment.to_string()),
            );
        }

        let missing: Vec<String> = self
            .config
            .required_tags
            .iter()
            .filter(|tag| is_blank(vars.get(*tag)) && !auto_filled.contains_key(*tag))
            .cloned()
            .collect();
        if !missing.is_empty() {
            warnings.push(
                PolicyIssue::new(
                    "required-tags",
                    format!("Missing required tags: {}", missing.join(", ")),
                )
                .with_missing_tags(missing),
            );
        }

        warnings.extend(self.approval_warning(input.environment));

        let result = PolicyResult::from_parts(errors, warnings, auto_filled);
        obs::emit_policy_evaluated(
            input.blueprint_id,
            input.environment.as_str(),
            result.valid,
            result.errors.len(),
            result.warnings.len(),
        );
        result
    }

    fn check_naming(&self, field: &str, name: &str) -> Vec<PolicyIssue> {
        let policy = &self.config.naming;
        let mut issues = Vec::new();
        let matches = self.naming.as_ref().map(|re| re.is_match(name));
        match matches {
            Some(true) => {}
            Some(false) => issues.push(
                PolicyIssue::new("naming-convention", policy.message.clone()).with_field(field),
            ),
            None => issues.push(
                PolicyIssue::new(
                    "naming-convention",
                    format!("Naming pattern is not a valid expression: {}", policy.pattern),
                )
                .with_field(field),
            ),
        }
        if name.chars().count() > policy.max_length {
            issues.push(
                PolicyIssue::new(
                    "naming-length",
                    format!(
                        "Resource name must be {} characters or less",
                        policy.max_length
                    ),
                )
                .with_field(field),
            );
        }
        issues
    }

    /// High-severity warning when the environment needs approval.
    pub fn approval_warning(&self, env: Environment) -> Option<PolicyIssue> {
        let policy = self.environment_policy(env)?;
        policy.requires_approval.then(|| {
            PolicyIssue::new("approval-required", policy.message.clone())
                .with_severity(Severity::High)
        })
    }

    pub fn promotion_targets(&self, source: Environment) -> &[Environment] {
        self.config
            .promotion_paths
            .get(&source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Judge a promotion from `source` (if known) to `target`.
    pub fn validate_promotion(
        &self,
        source: Option<Environment>,
        merged: bool,
        target: Environment,
    ) -> PolicyResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        match source {
            None => errors.push(
                PolicyIssue::new(
                    "promotion-path",
                    "Source resource has no environment specified",
                )
                .with_field("environment"),
            ),
            Some(src) => {
                let targets = self.promotion_targets(src);
                if !targets.contains(&target) {
                    let valid = if targets.is_empty() {
                        "none".to_string()
                    } else {
                        targets
                            .iter()
                            .map(Environment::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    };
                    errors.push(
                        PolicyIssue::new(
                            "promotion-path",
                            format!(
                                "Cannot promote from {src} to {target}. Valid targets: {valid}"
                            ),
                        )
                        .with_field("targetEnvironment"),
                    );
                }
            }
        }

        if !merged {
            errors.push(PolicyIssue::new(
                "promotion-merged",
                "Source resource must be merged before promotion",
            ));
        }

        match target {
            Environment::Staging => warnings.push(
                PolicyIssue::new(
                    "environment-warning",
                    "**Staging Validation**: Ensure this configuration matches the tested QA deployment.",
                )
                .with_severity(Severity::Medium),
            ),
            Environment::Prod => warnings.push(
                PolicyIssue::new(
                    "environment-warning",
                    "**Production Deployment**: This requires 2 approvals and change control documentation.",
                )
                .with_severity(Severity::High),
            ),
            _ => {}
        }

        PolicyResult::from_parts(errors, warnings, Variables::new())
    }
}

// ---------------------------------------------------------------------------
// Resource naming helpers
// ---------------------------------------------------------------------------

/// Suggest a resource name: `<project>-<short blueprint>-<env>`.
pub fn generate_resource_name(blueprint_id: &str, project_name: &str, env: Environment) -> String {
    let short = blueprint_id.strip_prefix("azure-").unwrap_or(blueprint_id);
    let short = short.strip_suffix("-basic").unwrap_or(short);

    let mut project = String::new();
    for c in project_name.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            c
        } else {
            '-'
        };
        if c == '-' && project.ends_with('-') {
            continue;
        }
        project.push(c);
    }
    let project: String = project.chars().take(20).collect();
    let project = project.trim_matches('-');

    format!("{project}-{short}-{env}")
}

/// Outcome of an Azure naming check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingVerdict {
    pub valid: bool,
    pub errors: Vec<String>,
}

struct AzureRule {
    min: usize,
    max: usize,
    pattern: &'static str,
    message: &'static str,
}

fn azure_rule(resource_type: &str) -> Option<AzureRule> {
    match resource_type {
        "resource-group" => Some(AzureRule {
            min: 1,
            max: 90,
            pattern: r"^[A-Za-z0-9_\-.()]+$",
            message: "Resource group names can contain alphanumerics, underscores, parentheses, hyphens, periods",
        }),
        "storage-account" => Some(AzureRule {
            min: 3,
            max: 24,
            pattern: r"^[a-z0-9]+$",
            message: "Storage account names must be lowercase alphanumeric only",
        }),
        "key-vault" => Some(AzureRule {
            min: 3,
            max: 24,
            pattern: r"^[a-zA-Z][a-zA-Z0-9-]*[a-zA-Z0-9]$",
            message: "Key Vault names must start with a letter, end with letter or digit, and contain only alphanumerics and hyphens",
        }),
        _ => None,
    }
}

/// Check Azure naming rules. Unknown resource types always pass.
pub fn validate_azure_naming(resource_type: &str, name: &str) -> NamingVerdict {
    let Some(rule) = azure_rule(resource_type) else {
        return NamingVerdict {
            valid: true,
            errors: Vec::new(),
        };
    };

    let mut errors = Vec::new();
    let len = name.chars().count();
    if len < rule.min {
        errors.push(format!("Name must be at least {} characters", rule.min));
    }
    if len > rule.max {
        errors.push(format!("Name must be {} characters or less", rule.max));
    }
    let matches = Regex::new(rule.pattern)
        .map(|re| re.is_match(name))
        .unwrap_or(false);
    if !matches {
        errors.push(rule.message.to_string());
    }

    NamingVerdict {
        valid: errors.is_empty(),
        errors,
    }
}
