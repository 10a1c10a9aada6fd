//! Module name → pull request resolution.
//!
//! Cloud resources carry an `armportal-request-id` tag. New resources tag
//! the pull request number; stack components and older resources tag a
//! module name instead, which is resolved here through an index of request
//! branches built from one listing call.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use armportal_core::cache::{cache_get, cache_put, Cache};
use armportal_core::render::terraform_path;
use armportal_core::{Environment, Job, Result};
use tracing::{debug, warn};

use crate::host::{GitHost, PrSort};
use crate::jobs::JobRepository;

pub const INDEX_TTL: Duration = Duration::from_secs(5 * 60);

/// What an `armportal-request-id` tag points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestRef {
    PullRequest(u64),
    Module(String),
}

/// Parse a request-id tag value.
pub fn request_ref(tag: &str) -> Option<RequestRef> {
    let tag = tag.trim();
    if tag.is_empty() {
        return None;
    }
    Some(match tag.parse::<u64>() {
        Ok(n) if n > 0 => RequestRef::PullRequest(n),
        _ => RequestRef::Module(tag.to_string()),
    })
}

/// Names to try for a tagged module: the name itself, then with stack
/// component suffixes (`_<component>`) stripped one at a time.
pub fn module_candidates(module_name: &str) -> Vec<&str> {
    let mut candidates = vec![module_name];
    let mut rest = module_name;
    while let Some((base, _)) = rest.rsplit_once('_') {
        if base.is_empty() {
            break;
        }
        candidates.push(base);
        rest = base;
    }
    candidates
}

const BRANCH_SUFFIXES: &[&str] = &["-update-", "-promoted-"];

/// Module name a request branch provisions, given its environment.
pub fn branch_module(head_ref: &str, environment: Environment) -> Option<&str> {
    let suffix = head_ref.strip_prefix(&format!("requests/{environment}/"))?;
    let module = BRANCH_SUFFIXES
        .iter()
        .find_map(|marker| suffix.split_once(marker).map(|(module, _)| module))
        .unwrap_or(suffix);
    (!module.is_empty()).then_some(module)
}

pub struct ModuleIndex {
    host: Arc<dyn GitHost>,
    cache: Arc<dyn Cache>,
}

impl ModuleIndex {
    pub fn new(host: Arc<dyn GitHost>, cache: Arc<dyn Cache>) -> Self {
        Self { host, cache }
    }

    /// Expected file path → most recently updated pull request.
    async fn build(&self, environment: Environment) -> BTreeMap<String, u64> {
        let pulls = match self.host.list_pull_requests(PrSort::Updated, Some(1)).await {
            Ok(pulls) => pulls,
            Err(e) => {
                warn!(environment = %environment, error = %e, "failed to build module index");
                return BTreeMap::new();
            }
        };
        let mut index = BTreeMap::new();
        for pr in &pulls {
            if let Some(module) = branch_module(&pr.head_ref, environment) {
                index
                    .entry(terraform_path(environment, module))
                    .or_insert(pr.number);
            }
        }
        debug!(environment = %environment, modules = index.len(), pulls = pulls.len(), "built module index");
        index
    }

    async fn index(&self, environment: Environment) -> BTreeMap<String, u64> {
        let key = format!("module-index:{environment}");
        if let Some(index) = cache_get(self.cache.as_ref(), &key).await {
            return index;
        }
        let index = self.build(environment).await;
        cache_put(self.cache.as_ref(), &key, &index, INDEX_TTL).await;
        index
    }

    /// Pull request that created `module_name` in `environment`. Misses are
    /// cached too, so an unknown module does not trigger a rescan.
    pub async fn find_pr(&self, module_name: &str, environment: Environment) -> Option<u64> {
        let key = format!("module-pr:{environment}:{module_name}");
        if let Some(cached) = cache_get::<Option<u64>>(self.cache.as_ref(), &key).await {
            return cached;
        }
        let index = self.index(environment).await;
        let found = index.get(&terraform_path(environment, module_name)).copied();
        cache_put(self.cache.as_ref(), &key, &found, INDEX_TTL).await;
        found
    }

    /// Resolve a request-id tag to the pull request number.
    pub async fn resolve(&self, tag: &str, environment: Environment) -> Option<u64> {
        match request_ref(tag)? {
            RequestRef::PullRequest(n) => Some(n),
            RequestRef::Module(name) => {
                for candidate in module_candidates(&name) {
                    if let Some(n) = self.find_pr(candidate, environment).await {
                        return Some(n);
                    }
                }
                None
            }
        }
    }

    /// Resolve a request-id tag straight to its job.
    pub async fn resolve_job(
        &self,
        jobs: &JobRepository,
        tag: &str,
        environment: Environment,
    ) -> Result<Option<Job>> {
        match self.resolve(tag, environment).await {
            Some(n) => jobs.get_job(n).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryGitHost;
    use crate::host::NewPullRequest;
    use armportal_core::MemoryCache;

    #[test]
    fn tags_and_candidates() {
        assert_eq!(request_ref("42"), Some(RequestRef::PullRequest(42)));
        assert_eq!(
            request_ref("shop-1a2b3c4d_app"),
            Some(RequestRef::Module("shop-1a2b3c4d_app".to_string()))
        );
        assert_eq!(request_ref(" "), None);
        assert_eq!(module_candidates("shop-1a2b3c4d_app"), vec!["shop-1a2b3c4d_app", "shop-1a2b3c4d"]);
        assert_eq!(module_candidates("plain"), vec!["plain"]);
    }

    #[test]
    fn branch_module_strips_update_and_promotion_suffixes() {
        assert_eq!(
            branch_module("requests/dev/rg-1a2b3c4d-update-9f9f9f9f", Environment::Dev),
            Some("rg-1a2b3c4d")
        );
        assert_eq!(branch_module("requests/dev/rg-1a2b3c4d", Environment::Dev), Some("rg-1a2b3c4d"));
        assert_eq!(
            branch_module("requests/qa/rg-1a2b3c4d-promoted-1760000000", Environment::Qa),
            Some("rg-1a2b3c4d")
        );
        assert_eq!(branch_module("requests/qa/rg-1a2b3c4d", Environment::Dev), None);
    }

    async fn open(host: &MemoryGitHost, branch: &str) -> u64 {
        let base = host.branch_sha("main").await.unwrap();
        host.create_branch(branch, &base).await.unwrap();
        host.seed_file(branch, &format!("infra/{branch}.tf"), "module \"x\" {}\n")
            .unwrap();
        host.create_pull_request(NewPullRequest {
            title: branch.to_string(),
            body: String::new(),
            head: branch.to_string(),
            base: "main".to_string(),
        })
        .await
        .unwrap()
        .number
    }

    #[tokio::test]
    async fn most_recent_pull_wins_and_misses_are_cached() {
        let host = Arc::new(MemoryGitHost::default());
        let first = open(&host, "requests/dev/shop-1a2b3c4d").await;
        let update = open(&host, "requests/dev/shop-1a2b3c4d-update-00000000").await;
        assert!(update > first);

        let index = ModuleIndex::new(host.clone(), Arc::new(MemoryCache::new()));
        assert_eq!(index.resolve("shop-1a2b3c4d_app", Environment::Dev).await, Some(update));
        assert_eq!(index.resolve("7", Environment::Dev).await, Some(7));

        assert_eq!(index.find_pr("ghost-00000000", Environment::Dev).await, None);
        let late = open(&host, "requests/dev/ghost-00000000").await;
        assert!(late > 0);
        assert_eq!(index.find_pr("ghost-00000000", Environment::Dev).await, None);
    }
}
