//! Pull request bodies.
//!
//! Every body ends with a metadata footer that [`crate::parse`] reads back;
//! the git host is the only store of workflow state.

use armportal_core::{DestroyMethod, Environment, Provider};
use serde::{Deserialize, Serialize};

/// Fields carried in the metadata footer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrMetadata {
    pub blueprint_id: Option<String>,
    pub version: Option<String>,
    pub environment: Option<String>,
    pub provider: Option<String>,
    pub created_by: Option<String>,
    /// Terraform module name or Crossplane claim name.
    pub module_name: Option<String>,
}

pub fn code_fence(lang: &str, content: &str) -> String {
    format!("```{lang}\n{}\n```", content.trim_end_matches('\n'))
}

/// Description followed by the `**Metadata:**` footer.
pub fn render_pr_body(meta: &PrMetadata, description: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !description.is_empty() {
        parts.push(description.to_string());
        parts.push(String::new());
    }
    parts.push("---".to_string());
    parts.push("**Metadata:**".to_string());
    if let Some(id) = &meta.blueprint_id {
        parts.push(format!("- Blueprint: `{id}`"));
    }
    if let Some(version) = &meta.version {
        parts.push(format!("- Version: `{version}`"));
    }
    if let Some(env) = &meta.environment {
        parts.push(format!("- Environment: `{env}`"));
    }
    if let Some(provider) = &meta.provider {
        parts.push(format!("- Provider: `{provider}`"));
    }
    if let Some(user) = &meta.created_by {
        parts.push(format!("- Created by: @{user}"));
    }
    if let Some(name) = &meta.module_name {
        let label = if meta.provider.as_deref() == Some(Provider::Crossplane.as_str()) {
            "Claim Name"
        } else {
            "Terraform Module"
        };
        parts.push(format!("- {label}: `{name}`"));
    }
    parts.join("\n")
}

/// Description block of a provisioning pull request.
pub struct ProvisionDescription<'a> {
    pub provider: Provider,
    pub artifact_name: &'a str,
    pub is_update: bool,
    /// Crossplane claim kind, when known.
    pub kind: Option<&'a str>,
    /// Enabled building-block components.
    pub components: &'a [String],
    pub fence: &'a str,
    pub content: &'a str,
}

impl ProvisionDescription<'_> {
    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        match self.provider {
            Provider::Terraform => {
                if self.is_update {
                    parts.push(format!(
                        "**Update**: Modifying existing resource `{}`",
                        self.artifact_name
                    ));
                    parts.push(String::new());
                }
                parts.push("Rendered module:".to_string());
            }
            Provider::Crossplane => {
                if self.is_update {
                    parts.push(format!(
                        "**Update**: Modifying existing Crossplane claim `{}`",
                        self.artifact_name
                    ));
                    parts.push(String::new());
                }
                parts.push("**Provider**: Crossplane".to_string());
                if let Some(kind) = self.kind {
                    parts.push(format!("**Kind**: {kind}"));
                }
                if !self.components.is_empty() {
                    parts.push(format!("**Components**: {}", self.components.join(", ")));
                }
                parts.push(String::new());
                parts.push("Rendered claim:".to_string());
            }
        }
        parts.push(code_fence(self.fence, self.content));
        parts.join("\n")
    }
}

fn approval_requirements(target: Environment) -> &'static str {
    match target {
        Environment::Qa => "1 approval required",
        Environment::Staging => "1 approval required + must match QA config",
        Environment::Prod => "2 approvals required + change control documentation",
        Environment::Dev => "See governance policy",
    }
}

fn pre_merge_checklist(target: Environment) -> &'static [&'static str] {
    match target {
        Environment::Qa => &["- [ ] Configuration reviewed and approved"],
        Environment::Staging => &[
            "- [ ] QA testing completed successfully",
            "- [ ] Configuration matches QA environment",
            "- [ ] Stakeholder approval obtained",
        ],
        Environment::Prod => &[
            "- [ ] Staging validation completed",
            "- [ ] Change control ticket created",
            "- [ ] Rollback plan documented",
            "- [ ] 2 required approvals obtained",
            "- [ ] Deployment window confirmed",
        ],
        Environment::Dev => &[],
    }
}

fn environment_warning(target: Environment) -> Option<&'static str> {
    match target {
        Environment::Staging => Some(
            "**Staging Validation**: Ensure this configuration matches the tested QA deployment.",
        ),
        Environment::Prod => Some(
            "**Production Deployment**: This requires 2 approvals and change control documentation.",
        ),
        _ => None,
    }
}

/// Body of a promotion pull request.
pub struct PromotionBody<'a> {
    pub blueprint_id: Option<&'a str>,
    pub version: Option<&'a str>,
    pub provider: Provider,
    pub module_name: Option<&'a str>,
    pub created_by: Option<&'a str>,
    pub source_pr: u64,
    pub source_env: Environment,
    pub target_env: Environment,
    pub target_path: &'a str,
    pub fence: &'a str,
    pub content: &'a str,
}

impl PromotionBody<'_> {
    pub fn render(&self) -> String {
        let mut parts = vec![
            "## Environment Promotion".to_string(),
            String::new(),
            format!(
                "**{}** → **{}**",
                self.source_env.as_str().to_uppercase(),
                self.target_env.as_str().to_uppercase()
            ),
            String::new(),
            format!("**Source PR**: #{}", self.source_pr),
            format!("**Resource File**: `{}`", self.target_path),
            String::new(),
            "### Approval Requirements".to_string(),
            approval_requirements(self.target_env).to_string(),
            String::new(),
            "### Configuration".to_string(),
            format!(
                "This promotion copies the configuration from {} (PR #{}) to {}.",
                self.source_env, self.source_pr, self.target_env
            ),
            String::new(),
        ];
        if let Some(warning) = environment_warning(self.target_env) {
            parts.push(warning.to_string());
            parts.push(String::new());
        }
        let checklist = pre_merge_checklist(self.target_env);
        if !checklist.is_empty() {
            parts.push("### Pre-Merge Checklist".to_string());
            parts.extend(checklist.iter().map(|c| c.to_string()));
            parts.push(String::new());
        }
        parts.push(match self.provider {
            Provider::Terraform => "### Terraform Module".to_string(),
            Provider::Crossplane => "### Crossplane Claim".to_string(),
        });
        parts.push(String::new());
        parts.push(code_fence(self.fence, self.content));

        let meta = PrMetadata {
            blueprint_id: self.blueprint_id.map(str::to_string),
            version: self.version.map(str::to_string),
            environment: Some(self.target_env.to_string()),
            provider: Some(self.provider.as_str().to_string()),
            created_by: self.created_by.map(str::to_string),
            module_name: self.module_name.map(str::to_string),
        };
        let mut body = render_pr_body(&meta, &parts.join("\n"));
        body.push('\n');
        body.push_str(&promotion_comments(self.source_pr, self.source_env, self.target_env));
        body
    }
}

pub fn promotion_comments(source_pr: u64, source: Environment, target: Environment) -> String {
    [
        format!("<!-- metadata:promotion:source-pr:{source_pr} -->"),
        format!("<!-- metadata:promotion:source-env:{source} -->"),
        format!("<!-- metadata:promotion:target-env:{target} -->"),
    ]
    .join("\n")
}

/// Body of a destroy pull request.
pub fn destroy_body(source_pr: u64, file_path: &str, method: DestroyMethod, provider: Provider) -> String {
    let mut parts = vec![
        "## Destroy Resource".to_string(),
        String::new(),
        format!("This PR will destroy the infrastructure deployed in #{source_pr}."),
        String::new(),
        format!("**Original PR**: #{source_pr}"),
        format!("**Resource File**: `{file_path}`"),
    ];
    match method {
        DestroyMethod::DeletedFile => {}
        DestroyMethod::Marker => parts.push(
            "**Note**: Resource file not on base branch - using marker file for destroy".to_string(),
        ),
        DestroyMethod::AlreadyAbsent => parts.push(
            "**Note**: Claim file already absent from base branch - no marker needed, a destroy note records the request".to_string(),
        ),
    }
    parts.push(String::new());
    parts.push(match provider {
        Provider::Terraform => "Warning: Merging this PR will run `terraform destroy` and permanently delete the deployed resources.".to_string(),
        Provider::Crossplane => "Warning: Merging this PR removes the claim and Crossplane will delete the composed resources.".to_string(),
    });
    parts.push(String::new());
    parts.push("---".to_string());
    parts.push(format!("<!-- metadata:destroys-pr:{source_pr} -->"));
    parts.join("\n")
}

/// Text of the note committed when a claim is already gone from base.
pub fn destroy_note(file_path: &str, source_pr: u64) -> String {
    format!(
        "# Destroyed: {file_path}\n\nRequested by the destroy of #{source_pr}. The claim was already absent from the base branch, so no resources remain to delete.\n"
    )
}

/// Text of a `.destroy` marker for a Terraform file.
pub fn destroy_marker(file_path: &str) -> String {
    format!(
        "# Destroy marker for {file_path}\n# This file triggers terraform destroy for the associated resources\n"
    )
}
