//! Versioned blueprint catalog.
//!
//! Several versions of one blueprint coexist, keyed by `(id, semver)`.
//! Lookups without a version resolve to the highest release.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use super::blueprint::Blueprint;
use super::error::{FieldError, PortalError, Result};

// ---------------------------------------------------------------------------
// Semver helpers
// ---------------------------------------------------------------------------

/// Parsed semver: MAJOR.MINOR.PATCH with optional pre-release suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Semver {
    major: u64,
    minor: u64,
    patch: u64,
    pre: Option<String>,
}

impl Semver {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim().trim_start_matches('v');
        let (version_part, pre) = match input.split_once('-') {
            Some((v, p)) if !p.is_empty() => (v, Some(p.to_string())),
            _ => (input, None),
        };

        let parts: Vec<&str> = version_part.split('.').collect();
        if parts.len() != 3 {
            return None;
        }

        Some(Self {
            major: parts[0].parse().ok()?,
            minor: parts[1].parse().ok()?,
            patch: parts[2].parse().ok()?,
            pre,
        })
    }
}

impl Ord for Semver {
    /// Pre-release < release for equal versions.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => std::cmp::Ordering::Equal,
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Semver {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// In-memory catalog. Entries are immutable once inserted.
#[derive(Debug, Clone, Default)]
pub struct BlueprintCatalog {
    entries: BTreeMap<String, Vec<(Semver, Blueprint)>>,
}

impl BlueprintCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list, rejecting duplicates and invalid versions.
    pub fn from_blueprints(blueprints: impl IntoIterator<Item = Blueprint>) -> Result<Self> {
        let mut catalog = Self::new();
        for bp in blueprints {
            catalog.insert(bp)?;
        }
        Ok(catalog)
    }

    /// Parse a YAML document holding a sequence of blueprints.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let blueprints: Vec<Blueprint> = serde_yaml::from_str(yaml)?;
        Self::from_blueprints(blueprints)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let catalog = Self::from_yaml_str(&raw)?;
        debug!(path = %path.display(), blueprints = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    pub fn insert(&mut self, blueprint: Blueprint) -> Result<()> {
        let version = Semver::parse(&blueprint.version).ok_or_else(|| {
            PortalError::validation(
                format!("Invalid blueprint version: {}", blueprint.version),
                vec![FieldError::new("version", "Version must be MAJOR.MINOR.PATCH")],
            )
        })?;
        let versions = self.entries.entry(blueprint.id.clone()).or_default();
        if versions.iter().any(|(v, _)| *v == version) {
            return Err(PortalError::conflict(format!(
                "Blueprint {}@{} already registered",
                blueprint.id, blueprint.version
            )));
        }
        versions.push((version, blueprint));
        versions.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(())
    }

    /// Exact version when given, otherwise the latest release.
    pub fn get(&self, id: &str, version: Option<&str>) -> Result<&Blueprint> {
        let versions = self
            .entries
            .get(id)
            .ok_or_else(|| PortalError::not_found(format!("Blueprint not found: {id}")))?;
        match version {
            Some(v) => {
                let wanted = Semver::parse(v).ok_or_else(|| {
                    PortalError::not_found(format!("Blueprint not found: {id}@{v}"))
                })?;
                versions
                    .iter()
                    .find(|(sv, _)| *sv == wanted)
                    .map(|(_, bp)| bp)
                    .ok_or_else(|| PortalError::not_found(format!("Blueprint not found: {id}@{v}")))
            }
            None => versions
                .iter()
                .rev()
                .find(|(sv, _)| sv.pre.is_none())
                .or_else(|| versions.last())
                .map(|(_, bp)| bp)
                .ok_or_else(|| PortalError::not_found(format!("Blueprint not found: {id}"))),
        }
    }

    pub fn versions(&self, id: &str) -> Vec<&str> {
        self.entries
            .get(id)
            .map(|vs| vs.iter().map(|(_, bp)| bp.version.as_str()).collect())
            .unwrap_or_default()
    }

    /// Latest version of every blueprint, sorted by id.
    pub fn list(&self) -> Vec<&Blueprint> {
        self.entries
            .keys()
            .filter_map(|id| self.get(id, None).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::blueprint::Provider;

    fn bp(id: &str, version: &str) -> Blueprint {
        Blueprint {
            id: id.to_string(),
            version: version.to_string(),
            display_name: None,
            description: None,
            provider: Provider::Terraform,
            module_source: Some(format!("../../modules/{id}")),
            variables: vec![],
            outputs: vec![],
            allowed_environments: vec![],
            components: vec![],
            stack_outputs: vec![],
            crossplane: None,
        }
    }

    #[test]
    fn semver_orders_prerelease_below_release() {
        let a = Semver::parse("1.0.0-rc1").unwrap();
        let b = Semver::parse("1.0.0").unwrap();
        let c = Semver::parse("v1.0.10").unwrap();
        assert!(a < b);
        assert!(b < c);
        assert!(Semver::parse("1.0").is_none());
    }

    #[test]
    fn latest_skips_prerelease() {
        let catalog = BlueprintCatalog::from_blueprints([
            bp("azure-rg-basic", "1.0.0"),
            bp("azure-rg-basic", "1.10.0"),
            bp("azure-rg-basic", "2.0.0-beta"),
            bp("azure-rg-basic", "1.9.3"),
        ])
        .unwrap();
        assert_eq!(catalog.get("azure-rg-basic", None).unwrap().version, "1.10.0");
        assert_eq!(
            catalog.get("azure-rg-basic", Some("2.0.0-beta")).unwrap().version,
            "2.0.0-beta"
        );
        assert_eq!(catalog.versions("azure-rg-basic").len(), 4);
    }

    #[test]
    fn duplicate_version_is_a_conflict() {
        let mut catalog = BlueprintCatalog::new();
        catalog.insert(bp("x", "1.0.0")).unwrap();
        let err = catalog.insert(bp("x", "1.0.0")).unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn unknown_blueprint_is_not_found() {
        let catalog = BlueprintCatalog::new();
        let err = catalog.get("nope", None).unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(
            &path,
            "- id: azure-rg-basic\n  version: \"1.0.0\"\n  moduleSource: ../../modules/azure-rg-basic\n",
        )
        .unwrap();
        let catalog = BlueprintCatalog::load(&path).unwrap();
        assert_eq!(catalog.list().len(), 1);
    }
}
