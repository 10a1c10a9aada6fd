//! Shared collaborators of the workflows.

use std::sync::Arc;

use armportal_core::{BlueprintCatalog, Cache, Environment, PolicyEngine, Result};
use armportal_gitops::{GitHost, JobRepository, ModuleIndex};
use uuid::Uuid;

/// Everything a workflow talks to. Cheap to clone.
#[derive(Clone)]
pub struct Portal {
    pub host: Arc<dyn GitHost>,
    pub cache: Arc<dyn Cache>,
    pub catalog: Arc<BlueprintCatalog>,
    pub policy: Arc<PolicyEngine>,
    pub jobs: JobRepository,
}

impl Portal {
    pub fn new(
        host: Arc<dyn GitHost>,
        cache: Arc<dyn Cache>,
        catalog: Arc<BlueprintCatalog>,
        policy: Arc<PolicyEngine>,
    ) -> Self {
        let jobs = JobRepository::new(host.clone(), cache.clone());
        Self {
            host,
            cache,
            catalog,
            policy,
            jobs,
        }
    }

    pub fn module_index(&self) -> ModuleIndex {
        ModuleIndex::new(self.host.clone(), self.cache.clone())
    }
}

/// Eight hex characters identifying one request.
pub fn short_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Lowercase, with anything outside `[a-z0-9-]` replaced by `-`.
pub fn safe_name(input: &str) -> String {
    input
        .to_ascii_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// `<blueprint>-<short id>`.
pub fn new_module_name(blueprint_id: &str, short: &str) -> String {
    format!("{}-{short}", safe_name(blueprint_id))
}

pub fn parse_environment(value: &str) -> Result<Environment> {
    value.parse()
}

pub fn parse_optional_environment(value: Option<&str>) -> Result<Option<Environment>> {
    value.map(parse_environment).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_are_safe_and_suffixed() {
        let short = short_id();
        assert_eq!(short.len(), 8);
        assert!(short.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(new_module_name("Azure_RG.basic", "0a1b2c3d"), "azure-rg-basic-0a1b2c3d");
    }

    #[test]
    fn environments_parse_or_fail_validation() {
        assert_eq!(parse_optional_environment(None).unwrap(), None);
        assert_eq!(parse_optional_environment(Some("qa")).unwrap(), Some(Environment::Qa));
        assert_eq!(parse_environment("uat").unwrap_err().status_code(), 400);
    }
}
