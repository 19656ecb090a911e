//! # Pipeline Orchestrator
//!
//! Runs one lifecycle operation for one secret resource:
//!
//! ```text
//! Start -> ValidateDeps -> RenderSecret -> (SkipUnchanged) | Encrypt -> Publish -> (Done)
//! ```
//!
//! Any failure ends in `(Failed: <category>)`, reported as a [`StageError`]
//! naming the stage. Delete skips every stage and only clears state. Update
//! re-runs the full create sequence. Read stops after rendering when the
//! fingerprint matches the stored one.
//!
//! State is only produced on success, so a publish failure after a successful
//! encryption leaves the caller's previous state untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, info_span, Instrument};
use zeroize::Zeroizing;

use crate::config::{PipelineConfig, ProviderConfig};
use crate::error::{PipelineError, Result};
use crate::fingerprint::{fingerprint, should_republish, Fingerprint};
use crate::gitops::{GitHubClient, GitOpsPublisher, PullRequestRef, RepoRef};
use crate::process::ProcessRunner;
use crate::secret;
use crate::sops::Encryptor;
use crate::tools::{ManagedTool, ToolProvisioner};
use crate::validation::{validate_branch_name, validate_kubernetes_name, validate_kubernetes_namespace};

/// Lifecycle operation requested by the framework boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        })
    }
}

/// State-machine stage a failure occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    ValidateDeps,
    RenderSecret,
    Encrypt,
    Publish,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::ValidateDeps => "ValidateDeps",
            Stage::RenderSecret => "RenderSecret",
            Stage::Encrypt => "Encrypt",
            Stage::Publish => "Publish",
        })
    }
}

/// Terminal `(Failed: <category>)` state
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}

impl StageError {
    #[must_use]
    pub fn category(&self) -> &'static str {
        self.error.category()
    }
}

/// Structured failure handed back to the framework boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub category: String,
    pub stage: Stage,
    pub summary: String,
    pub detail: String,
}

impl From<&StageError> for Diagnostic {
    fn from(err: &StageError) -> Self {
        Self {
            category: err.category().to_string(),
            stage: err.stage,
            summary: format!("{} failed: {}", err.stage, err.category()),
            detail: err.error.to_string(),
        }
    }
}

/// Declarative inputs for one secret resource
#[derive(Clone, Deserialize)]
pub struct ResourceDescriptor {
    pub name: String,
    pub namespace: String,
    pub values: BTreeMap<String, String>,
    #[serde(default)]
    pub is_base64: bool,
    pub base_branch: String,
    /// Overrides the provider's `sops_config`
    #[serde(default)]
    pub sops_config: Option<String>,
    /// Overrides the provider's `repo`
    #[serde(default)]
    pub repo: Option<String>,
}

impl std::fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .field("is_base64", &self.is_base64)
            .field("base_branch", &self.base_branch)
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

impl ResourceDescriptor {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        values: BTreeMap<String, String>,
        base_branch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            values,
            is_base64: false,
            base_branch: base_branch.into(),
            sops_config: None,
            repo: None,
        }
    }

    /// A secret holding one value, keyed by the secret name
    pub fn single_value(
        name: impl Into<String>,
        namespace: impl Into<String>,
        value: impl Into<String>,
        base_branch: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let values = BTreeMap::from([(name.clone(), value.into())]);
        Self::new(name, namespace, values, base_branch)
    }

    #[must_use]
    pub fn with_base64(mut self, is_base64: bool) -> Self {
        self.is_base64 = is_base64;
        self
    }

    #[must_use]
    pub fn with_sops_config(mut self, sops_config: impl Into<String>) -> Self {
        self.sops_config = Some(sops_config.into());
        self
    }

    #[must_use]
    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    /// External identifier, `<name>-<namespace>`
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.namespace)
    }
}

/// Persisted per-resource state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    #[serde(default)]
    pub unencrypted_hash: Option<Fingerprint>,
    #[serde(default)]
    pub encrypted_text: Option<String>,
    #[serde(default)]
    pub pull_request_url: Option<String>,
}

/// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Transition {
    /// Encrypted and published
    Done,
    /// Read found the stored fingerprint current
    SkipUnchanged,
    /// State cleared
    Deleted,
}

/// Successful result of [`Pipeline::apply`]
#[derive(Debug, Clone)]
pub struct Outcome {
    pub transition: Transition,
    pub state: ResourceState,
    pub pull_request: Option<PullRequestRef>,
}

/// Sequences tool provisioning, rendering, encryption and publication
#[derive(Debug, Clone)]
pub struct Pipeline {
    provider: ProviderConfig,
    provisioner: ToolProvisioner,
    encryptor: Encryptor,
    publisher: GitOpsPublisher,
    required_tools: Vec<ManagedTool>,
}

impl Pipeline {
    /// Build a pipeline wired to GitHub from runtime configuration
    #[must_use]
    pub fn new(config: &PipelineConfig, provider: ProviderConfig) -> Self {
        let runner = ProcessRunner::new(config.process_timeout, config.shell.clone());
        let provisioner = ToolProvisioner::new(config.install_dir.clone(), config.download_timeout);
        let encryptor = Encryptor::new(provisioner.clone(), runner.clone());
        let api = Arc::new(GitHubClient::new(
            config.github_api_url.clone(),
            config.download_timeout,
        ));
        let publisher = GitOpsPublisher::new(runner, config.git_base_url.clone(), api)
            .with_reuse_pull_request(config.reuse_pull_request);
        Self::with_components(provider, provisioner, encryptor, publisher)
    }

    /// Build a pipeline from already-configured components.
    ///
    /// The required host shell is the one the encryptor runs its scripts with.
    #[must_use]
    pub fn with_components(
        provider: ProviderConfig,
        provisioner: ToolProvisioner,
        encryptor: Encryptor,
        publisher: GitOpsPublisher,
    ) -> Self {
        let required_tools = default_required_tools(encryptor.shell());
        Self {
            provider,
            provisioner,
            encryptor,
            publisher,
            required_tools,
        }
    }

    #[must_use]
    pub fn with_required_tools(mut self, tools: Vec<ManagedTool>) -> Self {
        self.required_tools = tools;
        self
    }

    /// Ensure every required tool, returning the resolved paths
    pub async fn ensure_tools(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut resolved = Vec::with_capacity(self.required_tools.len());
        for tool in &self.required_tools {
            let path = self.provisioner.ensure(tool).await?;
            resolved.push((tool.name.clone(), path));
        }
        Ok(resolved)
    }

    /// Run `operation` for `descriptor`, given the state stored by the last successful run
    pub async fn apply(
        &self,
        operation: Operation,
        descriptor: &ResourceDescriptor,
        prior: Option<&ResourceState>,
    ) -> std::result::Result<Outcome, StageError> {
        let id = prior
            .map(|state| state.id.clone())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| descriptor.id());
        let run_id = uuid::Uuid::new_v4();
        let span = info_span!(
            "pipeline.apply",
            resource.id = %id,
            operation = %operation,
            run.id = %run_id,
            operation.success = tracing::field::Empty,
            operation.duration_ms = tracing::field::Empty
        );
        let start = Instant::now();

        let result = self
            .run(operation, descriptor, prior, id)
            .instrument(span.clone())
            .await;

        span.record("operation.duration_ms", start.elapsed().as_millis() as u64);
        span.record("operation.success", result.is_ok());
        if let Err(e) = &result {
            span.in_scope(|| error!(category = e.category(), stage = %e.stage, "Pipeline failed: {}", e.error));
        }
        result
    }

    async fn run(
        &self,
        operation: Operation,
        descriptor: &ResourceDescriptor,
        prior: Option<&ResourceState>,
        id: String,
    ) -> std::result::Result<Outcome, StageError> {
        if operation == Operation::Delete {
            info!("Clearing stored state for {}", id);
            return Ok(Outcome {
                transition: Transition::Deleted,
                state: ResourceState {
                    id,
                    ..ResourceState::default()
                },
                pull_request: None,
            });
        }

        // ValidateDeps
        let target = self.resolve_target(descriptor).map_err(at(Stage::ValidateDeps))?;
        self.ensure_tools().await.map_err(at(Stage::ValidateDeps))?;

        // RenderSecret
        let plaintext = Zeroizing::new(
            secret::render(
                &descriptor.name,
                &descriptor.namespace,
                &descriptor.values,
                descriptor.is_base64,
            )
            .map_err(at(Stage::RenderSecret))?,
        );
        let hash = fingerprint(&plaintext);

        if operation == Operation::Read {
            let stored = prior.and_then(|state| state.unencrypted_hash.as_ref());
            if !should_republish(&plaintext, stored) {
                debug!(fingerprint = %hash, "Fingerprint unchanged, skipping encrypt and publish");
                return Ok(Outcome {
                    transition: Transition::SkipUnchanged,
                    state: prior
                        .cloned()
                        .map(|state| ResourceState { id: id.clone(), ..state })
                        .unwrap_or_else(|| ResourceState {
                            id,
                            ..ResourceState::default()
                        }),
                    pull_request: None,
                });
            }
            info!("Fingerprint changed out-of-band, republishing");
        }

        // Encrypt
        let ciphertext = self
            .encryptor
            .encrypt(&plaintext, &target.sops_config)
            .await
            .map_err(at(Stage::Encrypt))?;

        // Publish
        let pull_request = self
            .publisher
            .publish(
                &target.repo,
                &descriptor.base_branch,
                &descriptor.name,
                &ciphertext,
                &self.provider.credentials(),
            )
            .await
            .map_err(at(Stage::Publish))?;

        info!(
            fingerprint = %hash,
            pull_request = %pull_request.url,
            "Published secret {} to {}",
            descriptor.name,
            target.repo
        );

        Ok(Outcome {
            transition: Transition::Done,
            state: ResourceState {
                id,
                unencrypted_hash: Some(hash),
                encrypted_text: Some(ciphertext),
                pull_request_url: Some(pull_request.url.clone()),
            },
            pull_request: Some(pull_request),
        })
    }

    /// Merge per-resource overrides over the provider block and validate inputs
    fn resolve_target(&self, descriptor: &ResourceDescriptor) -> Result<Target> {
        let mut effective = self.provider.clone();
        if let Some(sops_config) = descriptor.sops_config.as_ref().filter(|s| !s.trim().is_empty()) {
            effective.sops_config = sops_config.clone();
        }
        if let Some(repo) = descriptor.repo.as_ref().filter(|r| !r.trim().is_empty()) {
            effective.repo = repo.clone();
        }
        effective.validate()?;

        validate_kubernetes_name(&descriptor.name, "name")?;
        validate_kubernetes_namespace(&descriptor.namespace)?;
        validate_branch_name(&descriptor.base_branch)?;

        Ok(Target {
            repo: effective.repo_ref()?,
            sops_config: effective.sops_config.clone(),
        })
    }
}

struct Target {
    repo: RepoRef,
    sops_config: String,
}

/// Tools every create/update/read run requires
#[must_use]
pub fn default_required_tools(shell: &str) -> Vec<ManagedTool> {
    vec![
        ManagedTool::kubectl(),
        ManagedTool::sops(),
        ManagedTool::host_only(shell),
    ]
}

fn at(stage: Stage) -> impl Fn(PipelineError) -> StageError {
    move |error| StageError { stage, error }
}
