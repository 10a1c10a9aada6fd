//! Stack renderer: expands a stack blueprint into ordered Terraform modules.
//!
//! Component variables may reference `${stack.VAR}` (stack-level variables)
//! or `${component.output}`. Component references resolve forward only: a
//! component sees the outputs of components declared before it.

use std::collections::BTreeMap;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::terraform::{render_module, ModuleRender};
use crate::domain::blueprint::Blueprint;
use crate::domain::catalog::BlueprintCatalog;
use crate::domain::error::{FieldError, PortalError, Result};
use crate::domain::variables::{text_of, value_text, Variables};

/// One component after expansion.
#[derive(Debug, Clone)]
pub struct ExpandedModule<'a> {
    pub component_id: String,
    pub module_name: String,
    pub blueprint: &'a Blueprint,
    pub variables: Variables,
    pub depends_on: Vec<String>,
}

/// A stack-level output mapped onto a component's root output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackOutputRef {
    pub name: String,
    pub description: Option<String>,
    pub module_output: String,
}

pub fn component_module_name(base: &str, component_id: &str) -> String {
    format!("{base}_{component_id}")
}

fn reference_re() -> Result<Regex> {
    Regex::new(r"\$\{([A-Za-z0-9_-]+)\.([A-Za-z0-9_-]+)\}")
        .map_err(|e| PortalError::unexpected(format!("invalid reference pattern: {e}")))
}

fn resolve(
    raw: &str,
    re: &Regex,
    stack_vars: &Variables,
    known: &BTreeMap<String, BTreeMap<String, String>>,
    unresolved: &mut Vec<String>,
) -> String {
    let lookup = |caps: &Captures<'_>| -> Option<String> {
        let (scope, name) = (&caps[1], &caps[2]);
        if scope == "stack" {
            stack_vars.get(name).and_then(value_text)
        } else {
            known.get(scope)?.get(name).cloned()
        }
    };

    // A value that is exactly one component reference becomes a bare expression.
    if let Some(caps) = re.captures(raw) {
        if caps[0].len() == raw.len() && &caps[1] != "stack" {
            return match lookup(&caps) {
                Some(expr) => expr,
                None => {
                    unresolved.push(raw.to_string());
                    raw.to_string()
                }
            };
        }
    }

    re.replace_all(raw, |caps: &Captures<'_>| match lookup(caps) {
        Some(v) if &caps[1] == "stack" => v,
        Some(expr) => format!("${{{expr}}}"),
        None => {
            unresolved.push(caps[0].to_string());
            caps[0].to_string()
        }
    })
    .into_owned()
}

/// Expand the stack's components in declaration order.
pub fn expand_stack<'a>(
    stack: &Blueprint,
    catalog: &'a BlueprintCatalog,
    stack_vars: &Variables,
    base_module_name: &str,
) -> Result<Vec<ExpandedModule<'a>>> {
    if !stack.is_stack() {
        return Err(PortalError::validation(
            format!("Blueprint {} is not a stack", stack.id),
            vec![],
        ));
    }
    let re = reference_re()?;
    let mut known: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut modules = Vec::with_capacity(stack.components.len());
    let mut unresolved = Vec::new();

    for component in &stack.components {
        let blueprint = catalog.get(&component.blueprint, component.version.as_deref())?;
        let module_name = component_module_name(base_module_name, &component.id);

        let variables: Variables = component
            .variables
            .iter()
            .map(|(k, v)| {
                let resolved = resolve(v, &re, stack_vars, &known, &mut unresolved);
                (k.clone(), serde_json::Value::String(resolved))
            })
            .collect();

        known.insert(
            component.id.clone(),
            blueprint
                .outputs
                .iter()
                .map(|o| (o.name.clone(), format!("module.{module_name}.{}", o.name)))
                .collect(),
        );

        modules.push(ExpandedModule {
            component_id: component.id.clone(),
            module_name,
            blueprint,
            variables,
            depends_on: component.depends_on.clone(),
        });
    }

    if !unresolved.is_empty() {
        return Err(PortalError::validation(
            format!("Unresolved stack references: {}", unresolved.join(", ")),
            unresolved
                .into_iter()
                .map(|r| FieldError::new("variables", format!("Cannot resolve {r}")))
                .collect(),
        ));
    }
    Ok(modules)
}

/// Render every component module, separated by blank lines.
pub fn render_stack(
    stack: &Blueprint,
    catalog: &BlueprintCatalog,
    stack_vars: &Variables,
    base_module_name: &str,
    owner: Option<&str>,
) -> Result<String> {
    let environment = text_of(stack_vars, "environment");
    let blocks = expand_stack(stack, catalog, stack_vars, base_module_name)?
        .iter()
        .map(|m| {
            render_module(&ModuleRender {
                module_name: &m.module_name,
                blueprint: m.blueprint,
                variables: &m.variables,
                pr_number: None,
                owner,
                environment: environment.as_deref(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(blocks.join("\n\n"))
}

/// Map the stack's declared outputs onto component root outputs.
pub fn stack_outputs(stack: &Blueprint, base_module_name: &str) -> Vec<StackOutputRef> {
    stack
        .stack_outputs
        .iter()
        .filter_map(|o| {
            let (component, output) = o.source.split_once('.')?;
            Some(StackOutputRef {
                name: o.name.clone(),
                description: o.description.clone(),
                module_output: format!(
                    "{}_{output}",
                    component_module_name(base_module_name, component)
                ),
            })
        })
        .collect()
}
