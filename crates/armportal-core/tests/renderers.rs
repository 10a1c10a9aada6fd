//! Renderer behaviour driven through a catalog file.

use armportal_core::domain::variables::from_pairs;
use armportal_core::render::{self, terraform};
use armportal_core::{BlueprintCatalog, Environment, Provider, RenderRequest, Variables};
use chrono::Utc;
use serde_json::json;

const CATALOG: &str = r#"
- id: azure-rg-basic
  version: 1.0.0
  moduleSource: ../../modules/azure-rg-basic
  variables:
    - name: project_name
      required: true
    - name: location
  outputs:
    - name: name
    - name: id

- id: azure-app-service
  version: 1.1.0
  moduleSource: ../../modules/azure-app-service
  variables:
    - name: project_name
    - name: resource_group_name
    - name: app_settings_json
  outputs:
    - name: default_hostname
    - name: publish_profile
      sensitive: true

- id: web-app-stack
  version: 0.9.0
  displayName: Web App Stack
  variables:
    - name: project_name
      required: true
    - name: location
  components:
    - id: rg
      blueprint: azure-rg-basic
      variables:
        project_name: "${stack.project_name}"
        location: "${stack.location}"
    - id: app
      blueprint: azure-app-service
      variables:
        project_name: "${stack.project_name}-web"
        resource_group_name: "${rg.name}"
  stackOutputs:
    - name: url
      source: app.default_hostname

- id: xp-redis
  version: 1.0.0
  provider: crossplane
  crossplane:
    apiVersion: platform.chrishouse.io/v1alpha1
    kind: RedisClaim
"#;

fn catalog() -> BlueprintCatalog {
    BlueprintCatalog::from_yaml_str(CATALOG).unwrap()
}

fn render_with(
    catalog: &BlueprintCatalog,
    id: &str,
    module: &str,
    env: Environment,
    vars: &Variables,
    pr: Option<u64>,
) -> render::RenderedArtifact {
    let bp = catalog.get(id, None).unwrap();
    render::render(&RenderRequest {
        blueprint: bp,
        catalog,
        module_name: module,
        environment: env,
        variables: vars,
        pr_number: pr,
        created_by: Some("alice"),
        provisioned_at: Utc::now(),
    })
    .unwrap()
}

#[test]
fn reference_prefixes_are_never_quoted() {
    for (value, bare) in [
        ("module.rg.name", true),
        ("var.location", true),
        ("local.prefix", true),
        ("data.azurerm_client_config.current.tenant_id", true),
        ("modules.rg", false),
        ("eastus2", false),
        ("variable", false),
    ] {
        assert_eq!(terraform::is_reference(value), bare, "{value}");
        let quoted = terraform::quote(value);
        assert_eq!(quoted, format!("\"{value}\""));
    }
}

#[test]
fn module_render_parses_back_to_its_inputs() {
    let catalog = catalog();
    let vars = from_pairs(["project_name=ledger", "location=westeurope"]);
    let artifact = render_with(
        &catalog,
        "azure-rg-basic",
        "azure-rg-basic-0f0f0f0f",
        Environment::Dev,
        &vars,
        Some(17),
    );

    assert_eq!(artifact.provider, Provider::Terraform);
    assert_eq!(artifact.path, "infra/environments/dev/azure-rg-basic-0f0f0f0f.tf");
    assert_eq!(artifact.content.matches("output \"").count(), 2);

    let parsed = terraform::parse_module(&artifact.content, "azure-rg-basic-0f0f0f0f").unwrap();
    assert_eq!(parsed.variables["project_name"], "ledger");
    assert_eq!(parsed.variables["location"], "westeurope");
    assert_eq!(parsed.tags[terraform::TAG_REQUEST_ID], "17");
    assert_eq!(parsed.tags[terraform::TAG_ENVIRONMENT], "dev");
    assert_eq!(parsed.tags[terraform::TAG_OWNER], "alice");
}

#[test]
fn digest_changes_when_pr_number_is_injected() {
    let catalog = catalog();
    let vars = from_pairs(["project_name=ledger"]);
    let provisional = render_with(&catalog, "azure-rg-basic", "m", Environment::Qa, &vars, None);
    let stamped = render_with(&catalog, "azure-rg-basic", "m", Environment::Qa, &vars, Some(5));
    let again = render_with(&catalog, "azure-rg-basic", "m", Environment::Qa, &vars, Some(5));
    assert_ne!(provisional.digest(), stamped.digest());
    assert_eq!(stamped.digest(), again.digest());
}

#[test]
fn stack_renders_components_in_order_with_resolved_references() {
    let catalog = catalog();
    let vars = from_pairs(["project_name=shop", "location=eastus2"]);
    let artifact = render_with(&catalog, "web-app-stack", "shop-1a2b3c4d", Environment::Qa, &vars, Some(30));
    let hcl = &artifact.content;

    assert_eq!(
        terraform::module_names(hcl),
        vec!["shop-1a2b3c4d_rg", "shop-1a2b3c4d_app"]
    );
    let app = terraform::parse_module(hcl, "shop-1a2b3c4d_app").unwrap();
    assert_eq!(app.variables["resource_group_name"], "module.shop-1a2b3c4d_rg.name");
    assert_eq!(app.variables["project_name"], "shop-web");
    assert_eq!(app.tags[terraform::TAG_ENVIRONMENT], "qa");
    assert!(hcl.contains("output \"shop-1a2b3c4d_app_publish_profile\""));

    let stack = catalog.get("web-app-stack", None).unwrap();
    let outputs = render::stack_outputs(stack, "shop-1a2b3c4d");
    assert_eq!(outputs[0].module_output, "shop-1a2b3c4d_app_default_hostname");
}

#[test]
fn crossplane_claim_output_is_valid_yaml() {
    let catalog = catalog();
    let mut vars = from_pairs([
        "redis_version=7",
        "redis_memoryLimitMB=256",
        "redis_persistence=true",
        "note=a: b # not a comment",
    ]);
    vars.insert("tier".to_string(), json!("null"));
    let artifact = render_with(&catalog, "xp-redis", "xp-redis-00000001", Environment::Prod, &vars, Some(2));

    assert_eq!(artifact.path, "infra/crossplane/claims/prod/xp-redis-00000001.yaml");
    let doc: serde_yaml::Value = serde_yaml::from_str(&artifact.content).unwrap();
    let params = &doc["spec"]["parameters"];
    assert_eq!(params["redis"]["version"], "7");
    assert_eq!(params["redis"]["memoryLimitMB"], 256);
    assert_eq!(params["redis"]["persistence"].as_bool(), Some(true));
    assert_eq!(params["note"], "a: b # not a comment");
    assert_eq!(params["tier"], "null");
}
