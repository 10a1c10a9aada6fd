//! Crossplane claim renderer.
//!
//! Form variables arrive flat (`frontend_imageRepo`) and are nested into
//! claim parameters (`frontend: { imageRepo }`). Single-claim blueprints
//! produce one Claim; building-blocks blueprints produce a namespace plus
//! one Claim per enabled component, as a multi-document file.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use serde_yaml::Value as YamlValue;

use crate::domain::blueprint::{Blueprint, CrossplaneSpec};
use crate::domain::environment::Environment;
use crate::domain::error::{FieldError, PortalError, Result};
use crate::domain::variables::{is_truthy, text_of, Variables};

pub const DEFAULT_CLAIMS_NAMESPACE: &str = "platform-claims";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_BLUEPRINT: &str = "armportal.chrishouse.io/blueprint";
pub const LABEL_VERSION: &str = "armportal.chrishouse.io/version";
pub const LABEL_REQUEST_ID: &str = "armportal.chrishouse.io/request-id";
pub const LABEL_CREATED_BY: &str = "armportal.chrishouse.io/created-by";
pub const LABEL_COMPONENT: &str = "armportal.chrishouse.io/component";
pub const ANNOTATION_PROVISIONED_AT: &str = "armportal.chrishouse.io/provisioned-at";

const NUMERIC_FIELDS: [&str; 7] = [
    "replicas",
    "port",
    "storagegb",
    "memorylimitmb",
    "cpulimit",
    "cpurequest",
    "memoryrequest",
];

// ---------------------------------------------------------------------------
// Variable transform
// ---------------------------------------------------------------------------

/// Coerce a form value: `"true"`/`"false"` become booleans, and known
/// numeric fields become integers when they parse.
pub fn coerce_value(value: &Value, key: &str) -> Value {
    let Value::String(s) = value else {
        return value.clone();
    };
    match s.as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    let lower = key.to_ascii_lowercase();
    if NUMERIC_FIELDS.iter().any(|f| lower.contains(f)) {
        if let Ok(n) = s.trim().parse::<i64>() {
            return Value::from(n);
        }
    }
    value.clone()
}

/// Nest `parent_child` keys under `parent`. Only the first underscore
/// splits; nulls are dropped.
pub fn transform_variables(variables: &Variables) -> Map<String, Value> {
    let mut parameters = Map::new();
    for (key, value) in variables {
        if value.is_null() {
            continue;
        }
        let coerced = coerce_value(value, key);
        let Some((parent, child)) = key.split_once('_') else {
            parameters.insert(key.clone(), coerced);
            continue;
        };
        // A scalar already owns the parent name; keep the flat key.
        if !matches!(parameters.get(parent), None | Some(Value::Object(_))) {
            parameters.insert(key.clone(), coerced);
            continue;
        }
        if let Value::Object(nested) = parameters
            .entry(parent.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
        {
            nested.insert(child.to_string(), coerced);
        }
    }
    parameters
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    api_version: String,
    kind: String,
    metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    spec: Option<ClaimSpec>,
}

#[derive(Debug, Serialize)]
struct Metadata {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    annotations: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimSpec {
    parameters: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    write_connection_secret_to_ref: Option<NameRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    composition_ref: Option<NameRef>,
}

#[derive(Debug, Serialize)]
struct NameRef {
    name: String,
}

/// Inputs for rendering a Crossplane blueprint.
#[derive(Debug, Clone, Copy)]
pub struct ClaimRender<'a> {
    pub claim_name: &'a str,
    pub blueprint: &'a Blueprint,
    pub variables: &'a Variables,
    /// Pull request number once known; the claim name stands in before.
    pub pr_number: Option<u64>,
    pub created_by: Option<&'a str>,
    pub provisioned_at: DateTime<Utc>,
}

impl ClaimRender<'_> {
    fn request_id(&self) -> String {
        self.pr_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| self.claim_name.to_string())
    }

    fn tracking_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::from([
            (LABEL_MANAGED_BY.to_string(), "armportal".to_string()),
            (LABEL_BLUEPRINT.to_string(), self.blueprint.id.clone()),
            (LABEL_VERSION.to_string(), self.blueprint.version.clone()),
            (LABEL_REQUEST_ID.to_string(), self.request_id()),
        ]);
        if let Some(user) = self.created_by {
            labels.insert(LABEL_CREATED_BY.to_string(), user.to_string());
        }
        labels
    }
}

fn crossplane_spec(blueprint: &Blueprint) -> Result<&CrossplaneSpec> {
    blueprint.crossplane.as_ref().ok_or_else(|| {
        PortalError::validation(
            format!("Blueprint {} has no crossplane configuration", blueprint.id),
            vec![FieldError::new("blueprintId", "Blueprint is not a Crossplane claim")],
        )
    })
}

/// Render a blueprint in whichever mode it declares.
pub fn render_crossplane(r: &ClaimRender<'_>) -> Result<String> {
    if r.blueprint.is_building_blocks() {
        render_building_blocks(r)
    } else {
        render_claim(r)
    }
}

/// Single-claim mode.
pub fn render_claim(r: &ClaimRender<'_>) -> Result<String> {
    let spec = crossplane_spec(r.blueprint)?;
    let doc = Document {
        api_version: spec.api_version.clone(),
        kind: spec.kind.clone(),
        metadata: Metadata {
            name: r.claim_name.to_string(),
            namespace: Some(
                spec.claims_namespace
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CLAIMS_NAMESPACE.to_string()),
            ),
            labels: r.tracking_labels(),
            annotations: BTreeMap::from([(
                ANNOTATION_PROVISIONED_AT.to_string(),
                r.provisioned_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            )]),
        },
        spec: Some(ClaimSpec {
            parameters: transform_variables(r.variables),
            write_connection_secret_to_ref: Some(NameRef {
                name: format!("{}-connection", r.claim_name),
            }),
            composition_ref: spec
                .composition_ref
                .clone()
                .map(|name| NameRef { name }),
        }),
    };
    Ok(serde_yaml::to_string(&doc)?)
}

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

type Derive = fn(&Variables, &str) -> Option<Value>;

enum Source {
    Var(&'static str),
    Derived(Derive),
}

struct BuildingBlock {
    component: &'static str,
    kind: &'static str,
    suffix: &'static str,
    parameters: &'static [(&'static str, Source)],
}

fn db_secret_name(vars: &Variables, app: &str) -> Option<Value> {
    is_truthy(vars.get("postgres_enabled")).then(|| json!(format!("{app}-db-credentials")))
}

fn backend_url(vars: &Variables, app: &str) -> Option<Value> {
    is_truthy(vars.get("backend_enabled")).then(|| json!(format!("http://{app}-backend")))
}

fn cluster_issuer(_: &Variables, _: &str) -> Option<Value> {
    Some(json!("letsencrypt-prod"))
}

fn ingress_paths(vars: &Variables, app: &str) -> Option<Value> {
    let mut paths = Vec::new();
    if is_truthy(vars.get("frontend_enabled")) {
        paths.push(json!({"path": "/", "serviceName": format!("{app}-frontend"), "servicePort": 80}));
    }
    if is_truthy(vars.get("backend_enabled")) {
        paths.push(json!({"path": "/api", "serviceName": format!("{app}-backend"), "servicePort": 80}));
    }
    if paths.is_empty() {
        paths.push(json!({"path": "/", "serviceName": format!("{app}-backend"), "servicePort": 80}));
    }
    Some(Value::Array(paths))
}

const BUILDING_BLOCKS: &[BuildingBlock] = &[
    BuildingBlock {
        component: "postgres",
        kind: "PostgresClaim",
        suffix: "-db",
        parameters: &[
            ("storageGB", Source::Var("postgres_storageGB")),
            ("version", Source::Var("postgres_version")),
        ],
    },
    BuildingBlock {
        component: "redis",
        kind: "RedisClaim",
        suffix: "-cache",
        parameters: &[
            ("version", Source::Var("redis_version")),
            ("memoryLimitMB", Source::Var("redis_memoryLimitMB")),
            ("storageGB", Source::Var("redis_storageGB")),
        ],
    },
    BuildingBlock {
        component: "rabbitmq",
        kind: "RabbitMQClaim",
        suffix: "-mq",
        parameters: &[
            ("version", Source::Var("rabbitmq_version")),
            ("memoryLimitMB", Source::Var("rabbitmq_memoryLimitMB")),
            ("storageGB", Source::Var("rabbitmq_storageGB")),
            ("exposeManagement", Source::Var("rabbitmq_exposeManagement")),
            ("managementHost", Source::Var("rabbitmq_managementHost")),
        ],
    },
    BuildingBlock {
        component: "backend",
        kind: "BackendClaim",
        suffix: "-backend",
        parameters: &[
            ("image", Source::Var("backend_image")),
            ("replicas", Source::Var("backend_replicas")),
            ("port", Source::Var("backend_port")),
            ("env", Source::Var("environment")),
            ("dbSecretName", Source::Derived(db_secret_name)),
        ],
    },
    BuildingBlock {
        component: "frontend",
        kind: "FrontendClaim",
        suffix: "-frontend",
        parameters: &[
            ("image", Source::Var("frontend_image")),
            ("replicas", Source::Var("frontend_replicas")),
            ("port", Source::Var("frontend_port")),
            ("backendUrl", Source::Derived(backend_url)),
        ],
    },
    BuildingBlock {
        component: "ingress",
        kind: "IngressClaim",
        suffix: "-ingress",
        parameters: &[
            ("host", Source::Var("ingress_host")),
            ("clusterIssuer", Source::Derived(cluster_issuer)),
            ("paths", Source::Derived(ingress_paths)),
        ],
    },
];

/// Component names that building-blocks mode understands, in emission order.
pub fn building_block_components() -> impl Iterator<Item = &'static str> {
    BUILDING_BLOCKS.iter().map(|b| b.component)
}

fn block_parameters(block: &BuildingBlock, vars: &Variables, app: &str) -> Map<String, Value> {
    let mut parameters = Map::new();
    for (name, source) in block.parameters {
        let value = match source {
            Source::Var(key) => vars.get(*key).cloned(),
            Source::Derived(derive) => derive(vars, app),
        };
        let Some(value) = value else { continue };
        let empty = matches!(&value, Value::Null) || value.as_str() == Some("");
        if !empty {
            parameters.insert(name.to_string(), coerce_value(&value, name));
        }
    }
    parameters
}

/// Building-blocks mode: a namespace document followed by one Claim per
/// enabled component.
pub fn render_building_blocks(r: &ClaimRender<'_>) -> Result<String> {
    let spec = crossplane_spec(r.blueprint)?;
    let app = text_of(r.variables, "appName").ok_or_else(|| {
        PortalError::validation(
            "Building blocks require an application name",
            vec![FieldError::new("appName", "appName is required")],
        )
    })?;
    let environment = text_of(r.variables, "environment").unwrap_or_else(|| "dev".to_string());
    let namespace = format!("{app}-{environment}");

    let mut common = r.tracking_labels();
    common.insert("app.kubernetes.io/name".to_string(), app.clone());
    common.insert("app.kubernetes.io/instance".to_string(), namespace.clone());

    let mut ns_labels = common.clone();
    ns_labels.insert(LABEL_MANAGED_BY.to_string(), "crossplane".to_string());
    ns_labels.insert("istio-injection".to_string(), "enabled".to_string());

    let mut documents = vec![serde_yaml::to_string(&Document {
        api_version: "v1".to_string(),
        kind: "Namespace".to_string(),
        metadata: Metadata {
            name: namespace.clone(),
            namespace: None,
            labels: ns_labels,
            annotations: BTreeMap::new(),
        },
        spec: None,
    })?];

    for block in BUILDING_BLOCKS {
        if !is_truthy(r.variables.get(&format!("{}_enabled", block.component))) {
            continue;
        }
        let mut labels = common.clone();
        labels.insert(LABEL_COMPONENT.to_string(), block.component.to_string());
        documents.push(serde_yaml::to_string(&Document {
            api_version: spec.api_version.clone(),
            kind: block.kind.to_string(),
            metadata: Metadata {
                name: format!("{app}{}", block.suffix),
                namespace: Some(namespace.clone()),
                labels,
                annotations: BTreeMap::new(),
            },
            spec: Some(ClaimSpec {
                parameters: block_parameters(block, r.variables, &app),
                write_connection_secret_to_ref: None,
                composition_ref: None,
            }),
        })?);
    }

    Ok(format!("---\n{}", documents.join("---\n")))
}

// ---------------------------------------------------------------------------
// Promotion
// ---------------------------------------------------------------------------

fn field<'v>(doc: &'v mut YamlValue, path: &[&str]) -> Option<&'v mut YamlValue> {
    path.iter().try_fold(doc, |node, key| node.get_mut(*key))
}

fn replace_suffix(node: Option<&mut YamlValue>, from: &str, to: &str) -> usize {
    let Some(YamlValue::String(text)) = node else {
        return 0;
    };
    match text.strip_suffix(from) {
        Some(stem) => {
            *text = format!("{stem}{to}");
            1
        }
        None => 0,
    }
}

fn replace_exact(node: Option<&mut YamlValue>, from: &str, to: &str) -> usize {
    match node {
        Some(YamlValue::String(text)) if text.as_str() == from => {
            *text = to.to_string();
            1
        }
        _ => 0,
    }
}

fn retarget_document(doc: &mut YamlValue, source: &str, target: &str) -> usize {
    let (env_from, env_to) = (format!("-{source}"), format!("-{target}"));
    let (secret_from, secret_to) = (
        format!("-{source}-connection"),
        format!("-{target}-connection"),
    );
    let mut rewritten = 0;
    for path in [
        &["metadata", "name"][..],
        &["metadata", "namespace"][..],
        &["metadata", "labels", "app.kubernetes.io/instance"][..],
    ] {
        rewritten += replace_suffix(field(doc, path), &env_from, &env_to);
    }
    rewritten += replace_suffix(
        field(doc, &["spec", "writeConnectionSecretToRef", "name"]),
        &secret_from,
        &secret_to,
    );
    for key in ["environment", "env"] {
        rewritten += replace_exact(field(doc, &["spec", "parameters", key]), source, target);
    }
    rewritten
}

/// Retarget a rendered claim file at another environment: `<app>-<env>`
/// names, namespaces and connection secrets, plus the `environment`/`env`
/// parameters. Returns the new content and how many fields changed.
pub fn promote_claims(content: &str, source: Environment, target: Environment) -> Result<(String, usize)> {
    let mut rewritten = 0;
    let mut documents = Vec::new();
    for de in serde_yaml::Deserializer::from_str(content) {
        let mut doc = YamlValue::deserialize(de)?;
        if doc.is_null() {
            continue;
        }
        rewritten += retarget_document(&mut doc, source.as_str(), target.as_str());
        documents.push(serde_yaml::to_string(&doc)?);
    }
    let content = match documents.as_slice() {
        [single] if !content.trim_start().starts_with("---") => single.clone(),
        _ => format!("---\n{}", documents.join("---\n")),
    };
    Ok((content, rewritten))
}
