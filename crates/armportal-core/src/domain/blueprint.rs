//! Blueprint catalog entries.
//!
//! A blueprint is an immutable, versioned description of something that can
//! be provisioned: a single Terraform module, a stack of modules, or a
//! Crossplane claim. Catalog files use camelCase keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::environment::Environment;

/// Which GitOps pipeline realises the blueprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Terraform,
    Crossplane,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Terraform => "terraform",
            Provider::Crossplane => "crossplane",
        }
    }

    pub fn parse(s: &str) -> Option<Provider> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terraform" => Some(Provider::Terraform),
            "crossplane" => Some(Provider::Crossplane),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    #[default]
    String,
    Number,
    Boolean,
    Select,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDef {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub var_type: VariableType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl VariableDef {
    /// Label shown in messages; falls back to the variable name.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub sensitive: bool,
}

/// One module inside a stack blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackComponent {
    pub id: String,
    /// Component blueprint id.
    pub blueprint: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Values may reference `${stack.VAR}` or `${component.output}`.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// A stack-level output, sourced from `componentId.outputName`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutput {
    pub name: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossplaneMode {
    #[default]
    Claim,
    BuildingBlocks,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossplaneSpec {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub claims_namespace: Option<String>,
    #[serde(default)]
    pub composition_ref: Option<String>,
    #[serde(default)]
    pub mode: CrossplaneMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub module_source: Option<String>,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub outputs: Vec<OutputDef>,
    /// Empty means every environment is allowed.
    #[serde(default)]
    pub allowed_environments: Vec<Environment>,
    /// Non-empty for stack blueprints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<StackComponent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack_outputs: Vec<StackOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossplane: Option<CrossplaneSpec>,
}

impl Blueprint {
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    pub fn is_stack(&self) -> bool {
        !self.components.is_empty()
    }

    pub fn is_building_blocks(&self) -> bool {
        self.crossplane
            .as_ref()
            .map(|c| c.mode == CrossplaneMode::BuildingBlocks)
            .unwrap_or(false)
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDef> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn declares(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    pub fn required_variables(&self) -> impl Iterator<Item = &VariableDef> {
        self.variables.iter().filter(|v| v.required)
    }

    pub fn allows(&self, env: Environment) -> bool {
        self.allowed_environments.is_empty() || self.allowed_environments.contains(&env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORAGE: &str = r#"
id: azure-storage-basic
version: 1.2.0
displayName: Azure Storage Account
moduleSource: ../../modules/azure-storage-basic
variables:
  - name: project_name
    label: Project Name
    required: true
  - name: account_tier
    type: select
    options: [Standard, Premium]
    default: Standard
outputs:
  - name: primary_access_key
    sensitive: true
allowedEnvironments: [dev, qa]
"#;

    #[test]
    fn parses_catalog_yaml() {
        let bp: Blueprint = serde_yaml::from_str(STORAGE).unwrap();
        assert_eq!(bp.provider, Provider::Terraform);
        assert_eq!(bp.required_variables().count(), 1);
        assert_eq!(bp.variable("account_tier").unwrap().var_type, VariableType::Select);
        assert!(bp.outputs[0].sensitive);
        assert!(bp.allows(Environment::Qa));
        assert!(!bp.allows(Environment::Prod));
        assert!(!bp.is_stack());
    }

    #[test]
    fn label_falls_back_to_name() {
        let bp: Blueprint = serde_yaml::from_str(STORAGE).unwrap();
        assert_eq!(bp.variable("project_name").unwrap().display_label(), "Project Name");
        assert_eq!(bp.variable("account_tier").unwrap().display_label(), "account_tier");
    }

    #[test]
    fn building_blocks_mode_is_kebab_case() {
        let spec: CrossplaneSpec = serde_yaml::from_str(
            "apiVersion: platform.example.io/v1alpha1\nkind: AppStack\nmode: building-blocks\n",
        )
        .unwrap();
        assert_eq!(spec.mode, CrossplaneMode::BuildingBlocks);
    }
}
