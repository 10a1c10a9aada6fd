//! ARM Portal CLI
//!
//! The `armportal` command drives the GitOps provisioning workflows against
//! the infrastructure repository.
//!
//! ## Commands
//!
//! - `provision`: Open a pull request that adds (or updates) a resource
//! - `promote`: Copy a merged resource into the next environment
//! - `destroy`: Open a pull request that tears a merged resource down
//! - `job` / `jobs`: Read provisioning jobs back from pull requests
//! - `render`: Render a blueprint offline, no git writes
//! - `catalog`: List the blueprints in the catalog

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, Level};

use armportal_core::metrics::METRICS;
use armportal_core::{
    BlueprintCatalog, DestroyResourceCommand, GetJobQuery, ListJobsQuery, Mediator, MemoryCache,
    PolicyConfig, PolicyEngine, PortalEnv, PortalError, PreviewBlueprintQuery,
    PromoteResourceCommand, ProvisionBlueprintCommand, Request, Response, Variables,
};
use armportal_gitops::{GitHost, GitHubClient, MemoryGitHost};
use armportal_workflows::{build_mediator, Portal};

#[derive(Parser)]
#[command(name = "armportal")]
#[command(author = "ARM Portal Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Self-service infrastructure as pull requests", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Blueprint catalog (YAML)
    #[arg(long, global = true, env = "ARMPORTAL_CATALOG", default_value = "catalog/blueprints.yaml")]
    catalog: PathBuf,

    /// Policy configuration (YAML); built-in defaults when omitted
    #[arg(long, global = true, env = "ARMPORTAL_POLICY")]
    policy: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a resource from a blueprint
    Provision {
        #[command(flatten)]
        blueprint: BlueprintArgs,

        /// Update this existing module instead of creating a new one
        #[arg(long)]
        module: Option<String>,

        /// Requesting user
        #[arg(long, env = "ARMPORTAL_USER")]
        created_by: Option<String>,
    },

    /// Promote a merged resource to the next environment
    Promote {
        /// Pull request that provisioned the resource
        pr: u64,

        /// Target environment (default: next on the promotion path)
        #[arg(short, long)]
        to: Option<String>,

        #[arg(long, env = "ARMPORTAL_USER")]
        created_by: Option<String>,
    },

    /// Open a pull request that destroys a merged resource
    Destroy {
        /// Pull request that provisioned the resource
        pr: u64,

        #[arg(long, env = "ARMPORTAL_USER")]
        created_by: Option<String>,
    },

    /// Show one job
    Job {
        /// Pull request number
        pr: u64,
    },

    /// List jobs, newest first
    Jobs {
        /// Only jobs targeting this environment
        #[arg(short, long)]
        environment: Option<String>,
    },

    /// Render a blueprint offline and print the artifact
    Render {
        #[command(flatten)]
        blueprint: BlueprintArgs,

        /// Module name to render under (generated when omitted)
        #[arg(long)]
        module: Option<String>,

        /// Print only the rendered file content
        #[arg(long)]
        raw: bool,
    },

    /// List the blueprints in the catalog
    Catalog,
}

#[derive(Args)]
struct BlueprintArgs {
    /// Blueprint id
    blueprint: String,

    /// Target environment (dev, qa, staging, prod)
    #[arg(short, long, default_value = "dev")]
    environment: String,

    /// Pin a blueprint version (default: latest)
    #[arg(long)]
    version: Option<String>,

    /// Variable as key=value; JSON values are parsed, anything else is a string
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, Value)>,

    /// JSON object of variables; `--var` entries override it
    #[arg(long)]
    vars_file: Option<PathBuf>,
}

impl BlueprintArgs {
    fn variables(&self) -> Result<Variables> {
        let mut variables = match &self.vars_file {
            Some(path) => read_vars_file(path)?,
            None => Variables::new(),
        };
        variables.extend(self.vars.iter().cloned());
        Ok(variables)
    }
}

fn parse_var(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing variable name in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn read_vars_file(path: &Path) -> Result<Variables> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read variables file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Variables file {} is not a JSON object", path.display()))
}

fn load_policy(path: Option<&Path>) -> Result<PolicyEngine> {
    let Some(path) = path else {
        return Ok(PolicyEngine::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read policy file {}", path.display()))?;
    let config: PolicyConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("Invalid policy file {}", path.display()))?;
    Ok(PolicyEngine::new(config))
}

impl Commands {
    /// Whether the command needs the infrastructure repository.
    fn needs_repository(&self) -> bool {
        !matches!(self, Commands::Render { .. } | Commands::Catalog)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    armportal_core::telemetry::init_tracing(cli.json, level);

    let outcome = run(cli).await;
    METRICS.flush();
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

/// Portal errors print their response body; anything else prints the chain.
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<PortalError>() {
        Some(portal) => match serde_json::to_string_pretty(&portal.to_body()) {
            Ok(body) => println!("{body}"),
            Err(_) => eprintln!("error: {portal}"),
        },
        None => eprintln!("error: {err:#}"),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let catalog = BlueprintCatalog::load(&cli.catalog)
        .with_context(|| format!("Failed to load catalog {}", cli.catalog.display()))?;
    debug!(blueprints = catalog.len(), "catalog ready");
    let catalog = Arc::new(catalog);

    let host: Arc<dyn GitHost> = if cli.command.needs_repository() {
        Arc::new(GitHubClient::from_env().context("Failed to configure GitHub access")?)
    } else {
        Arc::new(MemoryGitHost::default())
    };
    let portal = Portal::new(
        host,
        Arc::new(MemoryCache::new()),
        catalog.clone(),
        Arc::new(load_policy(cli.policy.as_deref())?),
    );
    let mediator = build_mediator(portal, PortalEnv::from_env());

    let request = match cli.command {
        Commands::Provision {
            blueprint,
            module,
            created_by,
        } => Request::ProvisionBlueprint(ProvisionBlueprintCommand {
            variables: blueprint.variables()?,
            blueprint_id: blueprint.blueprint,
            version: blueprint.version,
            environment: blueprint.environment,
            module_name: module,
            created_by,
        }),
        Commands::Promote { pr, to, created_by } => {
            Request::PromoteResource(PromoteResourceCommand {
                pr_number: pr,
                target_environment: to,
                created_by,
            })
        }
        Commands::Destroy { pr, created_by } => Request::DestroyResource(DestroyResourceCommand {
            pr_number: pr,
            created_by,
        }),
        Commands::Job { pr } => Request::GetJob(GetJobQuery { pr_number: pr }),
        Commands::Jobs { environment } => Request::ListJobs(ListJobsQuery { environment }),
        Commands::Render {
            blueprint,
            module,
            raw,
        } => {
            let query = PreviewBlueprintQuery {
                variables: blueprint.variables()?,
                blueprint_id: blueprint.blueprint,
                version: blueprint.version,
                environment: blueprint.environment,
                module_name: module,
                created_by: None,
            };
            return cmd_render(&mediator, query, raw).await;
        }
        Commands::Catalog => return cmd_catalog(&catalog),
    };

    let response = mediator.send(request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn cmd_render(
    mediator: &Mediator,
    query: PreviewBlueprintQuery,
    raw: bool,
) -> Result<()> {
    let response = mediator.send(Request::PreviewBlueprint(query)).await?;
    match response {
        Response::Preview(preview) if raw => {
            for warning in &preview.policy.warnings {
                eprintln!("warning: {}", warning.message);
            }
            print!("{}", preview.artifact.content);
        }
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}

fn cmd_catalog(catalog: &BlueprintCatalog) -> Result<()> {
    if catalog.is_empty() {
        println!("No blueprints in catalog");
        return Ok(());
    }
    println!("{:<32} {:<10} {:<12} NAME", "ID", "VERSION", "PROVIDER");
    for bp in catalog.list() {
        println!(
            "{:<32} {:<10} {:<12} {}",
            bp.id,
            bp.version,
            bp.provider.as_str(),
            bp.display_name()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn var_values_parse_as_json_when_they_can() {
        assert_eq!(parse_var("count=3").unwrap(), ("count".to_string(), json!(3)));
        assert_eq!(
            parse_var("enable_https=true").unwrap(),
            ("enable_https".to_string(), json!(true))
        );
        assert_eq!(
            parse_var("location=eastus2").unwrap(),
            ("location".to_string(), json!("eastus2"))
        );
        assert_eq!(
            parse_var("query=a=b").unwrap(),
            ("query".to_string(), json!("a=b"))
        );
        assert!(parse_var("no-equals").is_err());
        assert!(parse_var("=value").is_err());
    }

    #[test]
    fn vars_flag_overrides_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars.json");
        std::fs::write(&path, r#"{"project_name": "shop", "location": "westus"}"#).unwrap();

        let cli = Cli::try_parse_from([
            "armportal",
            "render",
            "azure-storage-basic",
            "--vars-file",
            path.to_str().unwrap(),
            "--var",
            "location=eastus2",
        ])
        .unwrap();
        let Commands::Render { blueprint, .. } = cli.command else {
            panic!("expected render");
        };
        let variables = blueprint.variables().unwrap();
        assert_eq!(variables["project_name"], json!("shop"));
        assert_eq!(variables["location"], json!("eastus2"));
        assert_eq!(blueprint.environment, "dev");
    }

    #[test]
    fn only_offline_commands_skip_the_repository() {
        let render = Cli::try_parse_from(["armportal", "render", "bp"]).unwrap();
        assert!(!render.command.needs_repository());
        let catalog = Cli::try_parse_from(["armportal", "catalog"]).unwrap();
        assert!(!catalog.command.needs_repository());
        let promote = Cli::try_parse_from(["armportal", "promote", "12", "--to", "qa"]).unwrap();
        assert!(promote.command.needs_repository());
    }

    #[test]
    fn policy_defaults_when_no_file_is_given() {
        let engine = load_policy(None).unwrap();
        assert_eq!(engine.config(), &PolicyConfig::default());
    }

    #[test]
    fn portal_errors_downcast_through_context() {
        let err = anyhow::Error::new(PortalError::not_found("Job not found: 7"))
            .context("while loading job");
        let portal = err.downcast_ref::<PortalError>().unwrap();
        assert_eq!(portal.to_body().status, 404);
    }
}
