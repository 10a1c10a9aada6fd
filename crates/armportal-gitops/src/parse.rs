//! Recovering workflow state from pull requests.
//!
//! Bodies, labels and CI comments follow fixed grammars; everything here is
//! a pure function of their text.

use armportal_core::{Environment, JobStatus, Provider, StageStatus};
use regex::Regex;
use serde_json::{Map, Value};

use crate::body::PrMetadata;
use crate::host::{Comment, PrState, PullRequest};

/// Comment markers CI uses when posting apply outputs, per environment.
pub const OUTPUT_MARKERS: &[&str] = &[
    "TF_OUTPUTS:",
    "Terraform Outputs",
    "Terraform Deployment Complete",
    "Terraform Apply Result",
];

fn capture(text: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    let caps = re.captures(text)?;
    let value = caps.get(1)?.as_str().trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Read the metadata footer.
pub fn parse_metadata(body: &str) -> PrMetadata {
    if body.is_empty() {
        return PrMetadata::default();
    }
    PrMetadata {
        blueprint_id: capture(body, r"(?i)Blueprint:\s*`([^`]+)`"),
        version: capture(body, r"(?i)Version:\s*`([^`]+)`"),
        environment: capture(body, r"(?i)Environment:\s*`([^`]+)`"),
        provider: capture(body, r"(?i)Provider:\s*`([^`]+)`"),
        created_by: capture(body, r"(?i)Created by:\s*@(\S+)"),
        module_name: capture(body, r"(?i)(?:Terraform Module|Claim Name):\s*`([^`]+)`"),
    }
}

/// Promotion links carried as HTML comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PromotionMetadata {
    pub source_pr: Option<u64>,
    pub source_env: Option<Environment>,
    pub target_env: Option<Environment>,
}

pub fn parse_promotion_metadata(body: &str) -> PromotionMetadata {
    PromotionMetadata {
        source_pr: capture(body, r"<!-- metadata:promotion:source-pr:(\d+) -->")
            .and_then(|n| n.parse().ok()),
        source_env: capture(body, r"<!-- metadata:promotion:source-env:(\w+) -->")
            .and_then(|e| e.parse().ok()),
        target_env: capture(body, r"<!-- metadata:promotion:target-env:(\w+) -->")
            .and_then(|e| e.parse().ok()),
    }
}

/// Number of the pull request a destroy pull request tears down.
pub fn parse_destroy_metadata(body: &str) -> Option<u64> {
    capture(body, r"<!-- metadata:destroys-pr:(\d+) -->").and_then(|n| n.parse().ok())
}

/// Plan and apply outcome from CI labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LabelStatus {
    pub plan: StageStatus,
    pub apply: StageStatus,
}

const ENV_SUFFIX: &str = r"(?:-(?:dev|qa|staging|prod))?$";

fn any_label(labels: &[String], stem: &str) -> bool {
    let Ok(re) = Regex::new(&format!("^status:{stem}{ENV_SUFFIX}")) else {
        return false;
    };
    labels.iter().any(|l| re.is_match(l))
}

fn stage(labels: &[String], stage: &str) -> StageStatus {
    // A failure anywhere outranks success elsewhere.
    if any_label(labels, &format!("{stage}-failed")) {
        StageStatus::Failed
    } else if any_label(labels, &format!("{stage}-ok")) {
        StageStatus::Ok
    } else {
        StageStatus::Unknown
    }
}

/// Map `status:{plan,apply}-{ok,failed}[-env]` labels.
pub fn status_from_labels(labels: &[String]) -> LabelStatus {
    LabelStatus {
        plan: stage(labels, "plan"),
        apply: stage(labels, "apply"),
    }
}

pub fn pr_status(pr: &PullRequest) -> JobStatus {
    match (pr.state, pr.is_merged()) {
        (PrState::Open, _) => JobStatus::Open,
        (PrState::Closed, true) => JobStatus::Merged,
        (PrState::Closed, false) => JobStatus::Closed,
    }
}

pub fn is_output_comment(body: &str) -> bool {
    body.starts_with(OUTPUT_MARKERS[0]) || OUTPUT_MARKERS[1..].iter().any(|m| body.contains(m))
}

/// The JSON document inside an output comment: a fenced `json` block, or a
/// raw object after a `Terraform Outputs` heading.
pub fn extract_output_json(body: &str) -> Option<Map<String, Value>> {
    let text = capture(body, r"(?s)```json(.*?)```").or_else(|| {
        let rest = Regex::new(r"(?is)###?\s*Terraform Outputs\s*\n(.*)")
            .ok()?
            .captures(body)?
            .get(1)?
            .as_str()
            .to_string();
        capture(&rest, r"(?s)(\{.*?\n\})")
    })?;
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn is_sensitive(value: &Value) -> bool {
    value.get("sensitive").and_then(Value::as_bool) == Some(true)
}

/// Drop sensitive entries and, given a module name, keep only keys
/// prefixed `<module>_` with the prefix stripped. `None` when nothing
/// remains for the module.
pub fn filter_outputs(outputs: Map<String, Value>, module_name: Option<&str>) -> Option<Map<String, Value>> {
    let visible = outputs.into_iter().filter(|(_, v)| !is_sensitive(v));
    let Some(module) = module_name else {
        return Some(visible.collect());
    };
    let prefix = format!("{module}_");
    let filtered: Map<String, Value> = visible
        .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|short| (short.to_string(), v)))
        .collect();
    if filtered.is_empty() {
        tracing::debug!(module = %module, "no outputs for module in output comment");
        None
    } else {
        Some(filtered)
    }
}

/// Outputs from the most recent output comment.
pub fn latest_outputs(comments: &[Comment], module_name: Option<&str>) -> Option<Map<String, Value>> {
    let comment = comments.iter().rev().find(|c| is_output_comment(&c.body))?;
    filter_outputs(extract_output_json(&comment.body)?, module_name)
}

/// `infra/environments/dev/azure-rg-basic-92b8015f.tf` → `azure-rg-basic-92b8015f`.
pub fn extract_module_name(path: &str) -> Option<String> {
    let file = path.rsplit('/').next()?;
    let name = [".tf", ".yaml", ".yml"]
        .iter()
        .find_map(|ext| file.strip_suffix(ext))
        .unwrap_or(file);
    (!name.is_empty()).then(|| name.to_string())
}

/// Provider of a pull request: the footer value when present, else `xp-`
/// blueprint or module names and `crossplane` in the branch or path.
pub fn detect_provider(
    explicit: Option<&str>,
    names: &[Option<&str>],
    head_ref: &str,
    file_path: Option<&str>,
) -> Provider {
    if let Some(provider) = explicit.and_then(Provider::parse) {
        return provider;
    }
    let xp_name = names.iter().flatten().any(|n| n.starts_with("xp-"));
    let xp_location = head_ref.contains("crossplane")
        || file_path.is_some_and(|p| p.contains("crossplane"));
    if xp_name || xp_location {
        Provider::Crossplane
    } else {
        Provider::Terraform
    }
}

/// `requests/<env>/...` with the environment, if the branch is a request.
pub fn request_branch_environment(head_ref: &str) -> Option<Environment> {
    let rest = head_ref.strip_prefix("requests/")?;
    rest.split('/').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn footer_round_trip() {
        let body = "Rendered module:\n\n---\n**Metadata:**\n- Blueprint: `azure-storage-basic`\n\
                    - Version: `1.2.0`\n- Environment: `dev`\n- Created by: @alice\n\
                    - Terraform Module: `azure-storage-basic-1a2b3c4d`";
        let meta = parse_metadata(body);
        assert_eq!(meta.blueprint_id.as_deref(), Some("azure-storage-basic"));
        assert_eq!(meta.version.as_deref(), Some("1.2.0"));
        assert_eq!(meta.environment.as_deref(), Some("dev"));
        assert_eq!(meta.created_by.as_deref(), Some("alice"));
        assert_eq!(meta.module_name.as_deref(), Some("azure-storage-basic-1a2b3c4d"));
        assert_eq!(meta.provider, None);
        assert_eq!(parse_metadata(""), PrMetadata::default());
    }

    #[test]
    fn promotion_and_destroy_comments() {
        let body = "...\n<!-- metadata:promotion:source-pr:12 -->\n\
                    <!-- metadata:promotion:source-env:dev -->\n\
                    <!-- metadata:promotion:target-env:qa -->";
        let promo = parse_promotion_metadata(body);
        assert_eq!(promo.source_pr, Some(12));
        assert_eq!(promo.source_env, Some(Environment::Dev));
        assert_eq!(promo.target_env, Some(Environment::Qa));
        assert_eq!(parse_destroy_metadata("<!-- metadata:destroys-pr:31 -->"), Some(31));
        assert_eq!(parse_destroy_metadata("no marker"), None);
    }

    #[test]
    fn failed_label_wins() {
        let status = status_from_labels(&labels(&[
            "status:plan-ok-dev",
            "status:plan-failed-qa",
            "status:apply-ok",
        ]));
        assert_eq!(status.plan, StageStatus::Failed);
        assert_eq!(status.apply, StageStatus::Ok);

        let none = status_from_labels(&labels(&["status:plan-ok-uat", "environment:dev"]));
        assert_eq!(none.plan, StageStatus::Unknown);
        assert_eq!(none.apply, StageStatus::Unknown);
    }

    #[test]
    fn outputs_drop_sensitive_and_strip_prefix() {
        let body = "TF_OUTPUTS:\n```json\n{\"mod_x\":{\"value\":\"v\",\"sensitive\":true},\"mod_y\":\"w\"}\n```";
        let comments = vec![Comment {
            body: body.to_string(),
            author: None,
            created_at: None,
        }];
        let outputs = latest_outputs(&comments, Some("mod")).unwrap();
        assert_eq!(Value::Object(outputs), json!({ "y": "w" }));
    }

    #[test]
    fn outputs_after_heading_and_latest_comment_wins() {
        let old = Comment {
            body: "TF_OUTPUTS:\n```json\n{\"a\": 1}\n```".to_string(),
            author: None,
            created_at: None,
        };
        let new = Comment {
            body: "**QA Terraform Outputs:**\n### Terraform Outputs\n{\n  \"a\": 2\n}\ntrailing".to_string(),
            author: None,
            created_at: None,
        };
        let chatter = Comment {
            body: "LGTM".to_string(),
            author: None,
            created_at: None,
        };
        let outputs = latest_outputs(&[old, new, chatter], None).unwrap();
        assert_eq!(outputs["a"], json!(2));
    }

    #[test]
    fn bare_heading_is_an_output_comment() {
        let bare = Comment {
            body: "### Terraform Outputs\n{\n  \"rg_name\": \"rg-demo\"\n}".to_string(),
            author: None,
            created_at: None,
        };
        assert!(is_output_comment(&bare.body));
        let outputs = latest_outputs(&[bare], None).unwrap();
        assert_eq!(outputs["rg_name"], json!("rg-demo"));

        assert!(is_output_comment("## Terraform Apply Result\n```json\n{}\n```"));
        assert!(!is_output_comment("Terraform plan succeeded"));
    }

    #[test]
    fn unmatched_module_yields_none() {
        let outputs = json!({ "other_x": 1 }).as_object().cloned().unwrap();
        assert!(filter_outputs(outputs, Some("mod")).is_none());
    }

    #[test]
    fn module_names_and_providers() {
        assert_eq!(
            extract_module_name("infra/environments/dev/azure-rg-basic-92b8015f.tf").as_deref(),
            Some("azure-rg-basic-92b8015f")
        );
        assert_eq!(
            extract_module_name("infra/crossplane/claims/qa/shop-qa.yaml").as_deref(),
            Some("shop-qa")
        );

        assert_eq!(
            detect_provider(Some("crossplane"), &[], "requests/dev/x", None),
            Provider::Crossplane
        );
        assert_eq!(
            detect_provider(None, &[Some("xp-redis")], "requests/dev/x", None),
            Provider::Crossplane
        );
        assert_eq!(
            detect_provider(None, &[None], "requests/dev/x", Some("infra/crossplane/claims/dev/x.yaml")),
            Provider::Crossplane
        );
        assert_eq!(
            detect_provider(None, &[Some("azure-rg-basic")], "requests/dev/x", None),
            Provider::Terraform
        );
        assert_eq!(request_branch_environment("requests/qa/x-1"), Some(Environment::Qa));
        assert_eq!(request_branch_environment("destroy/qa/x-1"), None);
    }
}
