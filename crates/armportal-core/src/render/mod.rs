//! Infrastructure-as-code renderers.
//!
//! [`render`] picks the renderer for a blueprint (Terraform module, stack of
//! modules, or Crossplane claim) and returns the artifact together with the
//! repository path it belongs at.

pub mod crossplane;
pub mod stack;
pub mod terraform;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::blueprint::{Blueprint, Provider};
use crate::domain::catalog::BlueprintCatalog;
use crate::domain::environment::Environment;
use crate::domain::error::Result;
use crate::domain::variables::{text_of, Variables};

pub use crossplane::{promote_claims, render_crossplane, transform_variables, ClaimRender};
pub use stack::{expand_stack, render_stack, stack_outputs, StackOutputRef};
pub use terraform::{parse_module_variables, render_module, ModuleRender};

pub fn terraform_path(env: Environment, module_name: &str) -> String {
    format!("infra/environments/{env}/{module_name}.tf")
}

pub fn crossplane_path(env: Environment, claim_name: &str) -> String {
    format!("infra/crossplane/claims/{env}/{claim_name}.yaml")
}

/// `<appName>-<env>` when the request names an application, else the
/// module name.
pub fn claim_name(variables: &Variables, module_name: &str, env: Environment) -> String {
    match text_of(variables, "appName") {
        Some(app) => format!("{app}-{env}"),
        None => module_name.to_string(),
    }
}

/// Everything a renderer needs.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub blueprint: &'a Blueprint,
    /// Resolves stack component blueprints.
    pub catalog: &'a BlueprintCatalog,
    pub module_name: &'a str,
    pub environment: Environment,
    pub variables: &'a Variables,
    pub pr_number: Option<u64>,
    pub created_by: Option<&'a str>,
    pub provisioned_at: DateTime<Utc>,
}

/// A rendered file ready to commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedArtifact {
    pub provider: Provider,
    pub path: String,
    pub content: String,
    /// Code fence language for PR bodies.
    pub fence: String,
    /// Terraform module name or Crossplane claim name.
    pub artifact_name: String,
}

impl RenderedArtifact {
    /// Hex sha256 of the content.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.content.as_bytes()))
    }
}

pub fn render(req: &RenderRequest<'_>) -> Result<RenderedArtifact> {
    match req.blueprint.provider {
        Provider::Crossplane => {
            let name = claim_name(req.variables, req.module_name, req.environment);
            let content = render_crossplane(&ClaimRender {
                claim_name: &name,
                blueprint: req.blueprint,
                variables: req.variables,
                pr_number: req.pr_number,
                created_by: req.created_by,
                provisioned_at: req.provisioned_at,
            })?;
            Ok(RenderedArtifact {
                provider: Provider::Crossplane,
                path: crossplane_path(req.environment, &name),
                content,
                fence: "yaml".to_string(),
                artifact_name: name,
            })
        }
        Provider::Terraform => {
            let env = req.environment.as_str();
            let content = if req.blueprint.is_stack() {
                let mut stack_vars = req.variables.clone();
                stack_vars
                    .entry("environment".to_string())
                    .or_insert_with(|| serde_json::Value::String(env.to_string()));
                render_stack(
                    req.blueprint,
                    req.catalog,
                    &stack_vars,
                    req.module_name,
                    req.created_by,
                )?
            } else {
                render_module(&ModuleRender {
                    module_name: req.module_name,
                    blueprint: req.blueprint,
                    variables: req.variables,
                    pr_number: req.pr_number,
                    owner: req.created_by,
                    environment: Some(env),
                })?
            };
            Ok(RenderedArtifact {
                provider: Provider::Terraform,
                path: terraform_path(req.environment, req.module_name),
                content,
                fence: "hcl".to_string(),
                artifact_name: req.module_name.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::blueprint::{CrossplaneMode, CrossplaneSpec};
    use serde_json::json;

    fn claim_blueprint() -> Blueprint {
        Blueprint {
            id: "xp-postgres".to_string(),
            version: "1.0.0".to_string(),
            display_name: None,
            description: None,
            provider: Provider::Crossplane,
            module_source: None,
            variables: vec![],
            outputs: vec![],
            allowed_environments: vec![],
            components: vec![],
            stack_outputs: vec![],
            crossplane: Some(CrossplaneSpec {
                api_version: "platform.chrishouse.io/v1alpha1".to_string(),
                kind: "PostgresClaim".to_string(),
                claims_namespace: Some("team-a".to_string()),
                composition_ref: None,
                mode: CrossplaneMode::Claim,
            }),
        }
    }

    #[test]
    fn paths_follow_repository_layout() {
        assert_eq!(terraform_path(Environment::Qa, "m"), "infra/environments/qa/m.tf");
        assert_eq!(
            crossplane_path(Environment::Prod, "c"),
            "infra/crossplane/claims/prod/c.yaml"
        );
    }

    #[test]
    fn claim_name_prefers_app_name() {
        let vars = Variables::from([("appName".to_string(), json!("shop"))]);
        assert_eq!(claim_name(&vars, "xp-1", Environment::Dev), "shop-dev");
        assert_eq!(claim_name(&Variables::new(), "xp-1", Environment::Dev), "xp-1");
    }

    #[test]
    fn crossplane_artifact_lands_under_claims() {
        let bp = claim_blueprint();
        let catalog = BlueprintCatalog::new();
        let vars = Variables::from([("appName".to_string(), json!("ledger"))]);
        let artifact = render(&RenderRequest {
            blueprint: &bp,
            catalog: &catalog,
            module_name: "xp-postgres-0a1b2c3d",
            environment: Environment::Staging,
            variables: &vars,
            pr_number: Some(3),
            created_by: None,
            provisioned_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(artifact.path, "infra/crossplane/claims/staging/ledger-staging.yaml");
        assert_eq!(artifact.fence, "yaml");
        assert!(artifact.content.contains("namespace: team-a"));
        assert_eq!(artifact.digest().len(), 64);
    }
}
