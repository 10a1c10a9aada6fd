//! Terraform module renderer.
//!
//! Emits one `module` block per request plus an `output` block for every
//! declared blueprint output. Values that look like Terraform references
//! (`module.`, `var.`, `local.`, `data.`) are written bare; everything
//! else is a quoted string.

use std::collections::BTreeMap;

use regex::Regex;

use crate::domain::blueprint::{Blueprint, OutputDef};
use crate::domain::error::{FieldError, PortalError, Result};
use crate::domain::variables::{text_of, value_text, Variables};

pub const TAG_ENVIRONMENT: &str = "armportal-environment";
pub const TAG_BLUEPRINT: &str = "armportal-blueprint";
pub const TAG_REQUEST_ID: &str = "armportal-request-id";
pub const TAG_OWNER: &str = "armportal-owner";

const REFERENCE_PREFIXES: [&str; 4] = ["module.", "var.", "local.", "data."];

/// Inputs for a single module block.
#[derive(Debug, Clone, Copy)]
pub struct ModuleRender<'a> {
    pub module_name: &'a str,
    pub blueprint: &'a Blueprint,
    pub variables: &'a Variables,
    /// Pull request number once known; the module name stands in before.
    pub pr_number: Option<u64>,
    pub owner: Option<&'a str>,
    /// Overrides `variables.environment` for the environment tag.
    pub environment: Option<&'a str>,
}

pub fn is_reference(value: &str) -> bool {
    REFERENCE_PREFIXES.iter().any(|p| value.starts_with(p))
}

/// Quote a string literal for HCL.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn unquote(raw: &str) -> String {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn hcl_value(value: &str) -> String {
    if is_reference(value) {
        value.to_string()
    } else {
        quote(value)
    }
}

/// Name of the root output for a module output.
pub fn output_name(module_name: &str, output: &str) -> String {
    format!("{module_name}_{output}")
}

pub fn render_output_block(module_name: &str, output: &OutputDef) -> String {
    let mut lines = vec![
        format!("output \"{}\" {{", output_name(module_name, &output.name)),
        format!("  value       = module.{module_name}.{}", output.name),
    ];
    if let Some(desc) = &output.description {
        lines.push(format!("  description = {}", quote(desc)));
    }
    if output.sensitive {
        lines.push("  sensitive   = true".to_string());
    }
    lines.push("}".to_string());
    lines.join("\n")
}

/// Render the module block and its outputs.
pub fn render_module(r: &ModuleRender<'_>) -> Result<String> {
    let source = r.blueprint.module_source.as_deref().ok_or_else(|| {
        PortalError::validation(
            format!("Blueprint {} has no module source", r.blueprint.id),
            vec![FieldError::new("blueprintId", "Blueprint is not a Terraform module")],
        )
    })?;

    let assignments: Vec<(&str, String)> = r
        .blueprint
        .variables
        .iter()
        .filter_map(|def| {
            let text = value_text(r.variables.get(&def.name)?)?;
            Some((def.name.as_str(), hcl_value(&text)))
        })
        .collect();

    let width = assignments
        .iter()
        .map(|(k, _)| k.len())
        .chain(std::iter::once("source".len()))
        .max()
        .unwrap_or(0);

    let mut lines = vec![format!("module \"{}\" {{", r.module_name)];
    lines.push(format!("  {:<width$} = {}", "source", quote(source)));
    for (key, value) in &assignments {
        lines.push(format!("  {key:<width$} = {value}"));
    }

    let environment = r
        .environment
        .map(str::to_string)
        .or_else(|| text_of(r.variables, "environment"))
        .unwrap_or_else(|| "dev".to_string());
    let request_id = r
        .pr_number
        .map(|n| n.to_string())
        .unwrap_or_else(|| r.module_name.to_string());
    let mut tags = vec![
        (TAG_ENVIRONMENT, environment),
        (TAG_BLUEPRINT, r.blueprint.id.clone()),
        (TAG_REQUEST_ID, request_id),
    ];
    if let Some(owner) = r.owner {
        tags.push((TAG_OWNER, owner.to_string()));
    }
    let tag_width = tags.iter().map(|(k, _)| k.len()).max().unwrap_or(0);

    lines.push(String::new());
    lines.push("  # ARM Portal tracking tags".to_string());
    lines.push("  tags = {".to_string());
    for (key, value) in &tags {
        lines.push(format!("    {key:<tag_width$} = {}", quote(value)));
    }
    lines.push("  }".to_string());
    lines.push("}".to_string());

    if !r.blueprint.outputs.is_empty() {
        lines.push(String::new());
        let blocks: Vec<String> = r
            .blueprint
            .outputs
            .iter()
            .map(|o| render_output_block(r.module_name, o))
            .collect();
        lines.push(blocks.join("\n\n"));
    }

    Ok(lines.join("\n"))
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// A module block recovered from rendered HCL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedModule {
    pub source: Option<String>,
    pub variables: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

fn assignment_re() -> Option<Regex> {
    Regex::new(r#"^\s*([A-Za-z0-9_-]+)\s*=\s*(.+?)\s*$"#).ok()
}

/// Parse the named module block. Values are unquoted; references stay bare.
pub fn parse_module(hcl: &str, module_name: &str) -> Option<ParsedModule> {
    let header = format!("module \"{module_name}\" {{");
    let re = assignment_re()?;
    let mut lines = hcl.lines().skip_while(|l| l.trim() != header);
    lines.next()?;

    let mut parsed = ParsedModule::default();
    let mut in_tags = false;
    for line in lines {
        let trimmed = line.trim();
        if trimmed == "}" {
            if in_tags {
                in_tags = false;
                continue;
            }
            return Some(parsed);
        }
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let key = caps[1].to_string();
        let raw = &caps[2];
        if key == "tags" && raw == "{" {
            in_tags = true;
            continue;
        }
        let value = if raw.starts_with('"') {
            unquote(raw)
        } else {
            raw.to_string()
        };
        if in_tags {
            parsed.tags.insert(key, value);
        } else if key == "source" {
            parsed.source = Some(value);
        } else {
            parsed.variables.insert(key, value);
        }
    }
    None
}

/// Declared variables of the named module, without tags or source.
pub fn parse_module_variables(hcl: &str, module_name: &str) -> Option<BTreeMap<String, String>> {
    parse_module(hcl, module_name).map(|m| m.variables)
}

/// Names of every `module` block in the file, in order.
pub fn module_names(hcl: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r#"(?m)^module\s+"([^"]+)"\s*\{"#) else {
        return Vec::new();
    };
    re.captures_iter(hcl).map(|c| c[1].to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::blueprint::{Provider, VariableDef, VariableType};
    use serde_json::json;

    fn blueprint() -> Blueprint {
        let var = |name: &str| VariableDef {
            name: name.to_string(),
            label: None,
            var_type: VariableType::String,
            required: false,
            options: vec![],
            default: None,
            description: None,
        };
        Blueprint {
            id: "azure-storage-basic".to_string(),
            version: "1.0.0".to_string(),
            display_name: None,
            description: None,
            provider: Provider::Terraform,
            module_source: Some("../../modules/azure-storage-basic".to_string()),
            variables: vec![
                var("project_name"),
                var("location"),
                var("resource_group_name"),
                var("replication"),
                var("environment"),
            ],
            outputs: vec![
                OutputDef {
                    name: "storage_account_name".to_string(),
                    description: Some("Name of the \"account\"".to_string()),
                    sensitive: false,
                },
                OutputDef {
                    name: "primary_access_key".to_string(),
                    description: None,
                    sensitive: true,
                },
            ],
            allowed_environments: vec![],
            components: vec![],
            stack_outputs: vec![],
            crossplane: None,
        }
    }

    fn vars() -> Variables {
        Variables::from([
            ("project_name".to_string(), json!("demo")),
            ("location".to_string(), json!("eastus2")),
            ("resource_group_name".to_string(), json!("module.rg_x.name")),
            ("replication".to_string(), json!("say \"hi\"")),
            ("environment".to_string(), json!("qa")),
            ("undeclared".to_string(), json!("ignored")),
        ])
    }

    fn render(pr: Option<u64>) -> String {
        let bp = blueprint();
        let v = vars();
        render_module(&ModuleRender {
            module_name: "azure-storage-basic-1a2b3c4d",
            blueprint: &bp,
            variables: &v,
            pr_number: pr,
            owner: None,
            environment: None,
        })
        .unwrap()
    }

    #[test]
    fn references_are_bare_and_literals_quoted() {
        let hcl = render(Some(42));
        assert!(hcl.contains("  resource_group_name = module.rg_x.name\n"));
        assert!(hcl.contains("  location            = \"eastus2\"\n"));
        assert!(hcl.contains(r#"replication         = "say \"hi\"""#));
        assert!(hcl.contains("  source              = \"../../modules/azure-storage-basic\""));
        assert!(!hcl.contains("undeclared"));
    }

    #[test]
    fn var_prefix_is_never_quoted() {
        for value in ["var.location", "var.x", "local.tags", "data.azurerm_client_config.current.tenant_id"] {
            let mut v = vars();
            v.insert("location".to_string(), json!(value));
            let bp = blueprint();
            let hcl = render_module(&ModuleRender {
                module_name: "m",
                blueprint: &bp,
                variables: &v,
                pr_number: None,
                owner: None,
                environment: None,
            })
            .unwrap();
            assert!(hcl.contains(&format!("= {value}\n")), "{value}");
        }
    }

    #[test]
    fn tags_carry_environment_blueprint_and_request_id() {
        let hcl = render(Some(42));
        assert!(hcl.contains("    armportal-environment = \"qa\""));
        assert!(hcl.contains("    armportal-blueprint   = \"azure-storage-basic\""));
        assert!(hcl.contains("    armportal-request-id  = \"42\""));

        let provisional = render(None);
        assert!(provisional.contains("armportal-request-id  = \"azure-storage-basic-1a2b3c4d\""));
    }

    #[test]
    fn one_output_block_per_declared_output() {
        let hcl = render(Some(1));
        assert_eq!(hcl.matches("output \"").count(), 2);
        assert!(hcl.contains("output \"azure-storage-basic-1a2b3c4d_primary_access_key\" {"));
        assert!(hcl.contains("  value       = module.azure-storage-basic-1a2b3c4d.primary_access_key\n  sensitive   = true"));
        assert!(hcl.contains(r#"description = "Name of the \"account\"""#));
    }

    #[test]
    fn render_then_parse_recovers_declared_variables() {
        let hcl = render(Some(7));
        let parsed = parse_module(&hcl, "azure-storage-basic-1a2b3c4d").unwrap();
        let expected: BTreeMap<String, String> = vars()
            .into_iter()
            .filter(|(k, _)| k != "undeclared")
            .map(|(k, v)| (k, v.as_str().unwrap().to_string()))
            .collect();
        assert_eq!(parsed.variables, expected);
        assert_eq!(parsed.tags[TAG_REQUEST_ID], "7");
        assert_eq!(parsed.source.as_deref(), Some("../../modules/azure-storage-basic"));
    }

    #[test]
    fn missing_module_source_is_a_validation_error() {
        let mut bp = blueprint();
        bp.module_source = None;
        let v = vars();
        let err = render_module(&ModuleRender {
            module_name: "m",
            blueprint: &bp,
            variables: &v,
            pr_number: None,
            owner: Some("alice"),
            environment: None,
        })
        .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn lists_module_names() {
        let hcl = format!("{}\n\n{}", render(None), "module \"other\" {\n}\n");
        assert_eq!(module_names(&hcl), vec!["azure-storage-basic-1a2b3c4d", "other"]);
    }
}
