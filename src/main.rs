//! # sops-gitops
//!
//! Command-line stand-in for the declarative framework boundary: reads a
//! resource descriptor and the previously stored state, runs one lifecycle
//! operation and prints the new state.
//!
//! ## Usage
//!
//! ```bash
//! # Encrypt and open a pull request
//! sops-gitops create --resource db-pass.yaml --provider provider.yaml > state.json
//!
//! # Refresh; skips encryption when nothing changed
//! sops-gitops read --resource db-pass.yaml --provider provider.yaml --state state.json
//!
//! # Pre-install kubectl and sops
//! sops-gitops tools
//! ```
//!
//! Failures print a JSON diagnostic on stderr and exit with status 1.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use sops_gitops::config::{PipelineConfig, ProviderConfig};
use sops_gitops::pipeline::{Diagnostic, Operation, Pipeline, ResourceDescriptor, ResourceState};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BUILD_GIT_HASH"),
    ", built ",
    env!("BUILD_DATETIME"),
    ")"
);

/// Provision SOPS-encrypted Kubernetes secrets through GitOps pull requests
#[derive(Parser)]
#[command(name = "sops-gitops", version, long_version = LONG_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt the secret and open a pull request
    Create(ResourceArgs),
    /// Refresh state, republishing only when the rendered secret changed
    Read(ResourceArgs),
    /// Re-run the full create sequence
    Update(ResourceArgs),
    /// Clear stored state
    Delete(ResourceArgs),
    /// Ensure kubectl, sops and the shell are available
    Tools,
}

#[derive(Args)]
struct ResourceArgs {
    /// Resource descriptor (YAML)
    #[arg(long)]
    resource: PathBuf,

    /// Provider block (YAML); `gh_token` falls back to GITHUB_TOKEN
    #[arg(long)]
    provider: Option<PathBuf>,

    /// State written by the previous successful run (JSON)
    #[arg(long)]
    state: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // ring must be installed before any TLS client is built
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Failed to install rustls crypto provider");
        return ExitCode::FAILURE;
    }

    let config = PipelineConfig::from_env();
    sops_gitops::observability::init_tracing(&config);
    info!(
        "sops-gitops {} (git_hash={}, built={})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_GIT_HASH"),
        env!("BUILD_DATETIME")
    );

    match run(Cli::parse(), &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: &PipelineConfig) -> Result<ExitCode> {
    let (operation, args) = match cli.command {
        Commands::Create(args) => (Operation::Create, args),
        Commands::Read(args) => (Operation::Read, args),
        Commands::Update(args) => (Operation::Update, args),
        Commands::Delete(args) => (Operation::Delete, args),
        Commands::Tools => return provision_tools(config).await,
    };

    let descriptor: ResourceDescriptor = serde_yaml::from_str(&read(&args.resource)?)
        .with_context(|| format!("Failed to parse resource descriptor {}", args.resource.display()))?;
    let provider = load_provider(args.provider.as_deref())?;
    let prior: Option<ResourceState> = match &args.state {
        Some(path) if path.exists() => Some(
            serde_json::from_str(&read(path)?)
                .with_context(|| format!("Failed to parse state {}", path.display()))?,
        ),
        _ => None,
    };

    let pipeline = Pipeline::new(config, provider);
    match pipeline.apply(operation, &descriptor, prior.as_ref()).await {
        Ok(outcome) => {
            info!(transition = ?outcome.transition, "{} {} finished", operation, outcome.state.id);
            println!("{}", serde_json::to_string_pretty(&outcome.state)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", serde_json::to_string_pretty(&Diagnostic::from(&e))?);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn provision_tools(config: &PipelineConfig) -> Result<ExitCode> {
    let pipeline = Pipeline::new(config, ProviderConfig::default());
    let resolved = pipeline
        .ensure_tools()
        .await
        .context("Failed to provision tools")?;
    for (name, path) in resolved {
        println!("{name}\t{}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn load_provider(path: Option<&Path>) -> Result<ProviderConfig> {
    let provider = match path {
        Some(path) => ProviderConfig::from_yaml(&read(path)?)
            .with_context(|| format!("Failed to parse provider configuration {}", path.display()))?,
        None => ProviderConfig::default(),
    };
    Ok(provider.with_env_fallback())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
