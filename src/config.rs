//! # Configuration
//!
//! Two layers:
//!
//! - [`ProviderConfig`]: the provider block (`gh_token`, `repo`, `sops_config`)
//!   supplied by the framework boundary
//! - [`PipelineConfig`]: runtime settings loaded from environment variables,
//!   all with defaults

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_GITHUB_API_URL, DEFAULT_GIT_BASE_URL,
    DEFAULT_INSTALL_DIR, DEFAULT_SHELL,
};
use crate::error::{PipelineError, Result};
use crate::gitops::{Credentials, RepoRef};

/// Provider block: credentials, target repository and encryption policy
#[derive(Clone, Default, Deserialize)]
pub struct ProviderConfig {
    /// GitHub token used for clone, push and the pull-request API
    #[serde(default)]
    pub gh_token: String,
    /// Target repository, `owner/name`
    #[serde(default)]
    pub repo: String,
    /// Content of the `.sops.yaml` policy file
    #[serde(default)]
    pub sops_config: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("gh_token", &if self.gh_token.is_empty() { "" } else { "***" })
            .field("repo", &self.repo)
            .field("sops_config_len", &self.sops_config.len())
            .finish()
    }
}

impl ProviderConfig {
    /// Parse a provider block from YAML
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| {
            PipelineError::PreconditionViolation(format!("invalid provider configuration: {e}"))
        })
    }

    /// Fill an empty `gh_token` from `GITHUB_TOKEN`
    #[must_use]
    pub fn with_env_fallback(self) -> Self {
        self.with_token_fallback(std::env::var("GITHUB_TOKEN").ok())
    }

    #[must_use]
    pub fn with_token_fallback(mut self, token: Option<String>) -> Self {
        if self.gh_token.trim().is_empty() {
            if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
                self.gh_token = token;
            }
        }
        self
    }

    /// Report every missing required value at once
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<String> = [
            ("gh_token", &self.gh_token),
            ("repo", &self.repo),
            ("sops_config", &self.sops_config),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| format!("'{key}'"))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::PreconditionViolation(format!(
                "missing required configuration(s): {}",
                missing.join(", ")
            )))
        }
    }

    pub fn repo_ref(&self) -> Result<RepoRef> {
        RepoRef::parse(&self.repo)
    }

    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.gh_token.clone())
    }
}

/// Runtime settings
///
/// All settings have defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Directory managed tools are installed into
    pub install_dir: PathBuf,
    /// Base URL repositories are cloned from
    pub git_base_url: String,
    /// GitHub REST API endpoint
    pub github_api_url: String,
    /// Timeout for each external command; `None` waits indefinitely
    pub process_timeout: Option<Duration>,
    /// Timeout for a single tool download and for API calls
    pub download_timeout: Duration,
    /// Shell used for piped invocations
    pub shell: String,
    /// Return an already-open pull request for the branch instead of failing
    pub reuse_pull_request: bool,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let process_timeout = var_or_default::<u64>(&lookup, "SOPS_GITOPS_PROCESS_TIMEOUT_SECS", 0);
        Self {
            install_dir: PathBuf::from(var_or_default_str(
                &lookup,
                "SOPS_GITOPS_INSTALL_DIR",
                DEFAULT_INSTALL_DIR,
            )),
            git_base_url: var_or_default_str(&lookup, "SOPS_GITOPS_GIT_BASE_URL", DEFAULT_GIT_BASE_URL),
            github_api_url: var_or_default_str(
                &lookup,
                "SOPS_GITOPS_GITHUB_API_URL",
                DEFAULT_GITHUB_API_URL,
            ),
            process_timeout: (process_timeout > 0).then_some(Duration::from_secs(process_timeout)),
            download_timeout: Duration::from_secs(var_or_default(
                &lookup,
                "SOPS_GITOPS_DOWNLOAD_TIMEOUT_SECS",
                DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            )),
            shell: var_or_default_str(&lookup, "SOPS_GITOPS_SHELL", DEFAULT_SHELL),
            reuse_pull_request: var_or_default_bool(&lookup, "SOPS_GITOPS_REUSE_PULL_REQUEST", true),
            log_level: var_or_default_str(&lookup, "LOG_LEVEL", "info"),
            log_format: var_or_default_str(&lookup, "LOG_FORMAT", "text"),
        }
    }
}

/// Read variable or return default
fn var_or_default<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read variable as boolean or return default
fn var_or_default_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read variable as string or return default
fn var_or_default_str(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
