//! # Tool Provisioner
//!
//! Guarantees that an external executable is resolvable on the search path,
//! downloading a pinned release when it is missing.
//!
//! Resolution is re-probed on every call; nothing is cached between calls.
//! Installs write the artifact to a temporary file inside the install
//! directory and atomically rename it into place, so concurrent first-use from
//! several pipeline runs cannot leave a half-written executable behind.

pub mod download;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::constants::{
    KUBECTL_URL_TEMPLATE, KUBECTL_VERSION, SOPS_URL_TEMPLATE, SOPS_VERSION, USER_AGENT,
};
use crate::error::{PipelineError, Result};

/// Host operating system and CPU architecture, named the way release
/// artifacts name them (`linux`/`darwin`, `amd64`/`arm64`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Platform this process is running on
    #[must_use]
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => other,
        };
        Self::new(os, arch)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// A downloadable build of a tool for one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    pub platform: Platform,
    pub url: String,
    /// Optional hex SHA-256 of the artifact
    pub sha256: Option<String>,
}

/// An executable this system knows how to provide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedTool {
    pub name: String,
    pub version: String,
    pub distributions: Vec<Distribution>,
}

impl ManagedTool {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            distributions: Vec::new(),
        }
    }

    /// A tool that must already be present on the host (nothing to download)
    pub fn host_only(name: impl Into<String>) -> Self {
        Self::new(name, "host")
    }

    #[must_use]
    pub fn with_distribution(mut self, platform: Platform, url: impl Into<String>) -> Self {
        self.distributions.push(Distribution {
            platform,
            url: url.into(),
            sha256: None,
        });
        self
    }

    /// Add a distribution whose artifact must match the hex SHA-256 `sha256`
    #[must_use]
    pub fn with_pinned_distribution(
        mut self,
        platform: Platform,
        url: impl Into<String>,
        sha256: impl Into<String>,
    ) -> Self {
        self.distributions.push(Distribution {
            platform,
            url: url.into(),
            sha256: Some(sha256.into()),
        });
        self
    }

    /// kubectl, the cluster CLI
    #[must_use]
    pub fn kubectl() -> Self {
        let url = |os: &str, arch: &str| {
            KUBECTL_URL_TEMPLATE
                .replace("{version}", KUBECTL_VERSION)
                .replace("{os}", os)
                .replace("{arch}", arch)
        };
        Self::new("kubectl", KUBECTL_VERSION)
            .with_distribution(Platform::new("linux", "amd64"), url("linux", "amd64"))
            .with_distribution(Platform::new("darwin", "amd64"), url("darwin", "amd64"))
            .with_distribution(Platform::new("darwin", "arm64"), url("darwin", "arm64"))
    }

    /// sops, the encryption CLI
    #[must_use]
    pub fn sops() -> Self {
        let url = |os: &str| {
            SOPS_URL_TEMPLATE
                .replace("{version}", SOPS_VERSION)
                .replace("{os}", os)
        };
        Self::new("sops", SOPS_VERSION)
            .with_distribution(Platform::new("linux", "amd64"), url("linux"))
            .with_distribution(Platform::new("darwin", "amd64"), url("darwin"))
    }

    /// Select the artifact for `platform`
    pub fn distribution_for(&self, platform: &Platform) -> Result<&Distribution> {
        self.distributions
            .iter()
            .find(|d| &d.platform == platform)
            .ok_or_else(|| PipelineError::UnsupportedPlatform {
                tool: self.name.clone(),
                os: platform.os.clone(),
                arch: platform.arch.clone(),
            })
    }
}

/// Whether `name` resolves to an executable on the process search path
#[must_use]
pub fn exists(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Installs managed tools on demand
#[derive(Debug, Clone)]
pub struct ToolProvisioner {
    install_dir: PathBuf,
    search_path: Option<OsString>,
    http: reqwest::Client,
}

impl ToolProvisioner {
    pub fn new(install_dir: impl Into<PathBuf>, download_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(download_timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
                reqwest::Client::new()
            });
        Self {
            install_dir: install_dir.into(),
            search_path: None,
            http,
        }
    }

    /// Resolve tools against `path` instead of the process `PATH`
    #[must_use]
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Locate `name` on the configured search path
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let found = match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
                which::which_in(name, Some(paths), cwd)
            }
            None => which::which(name),
        };
        found.ok()
    }

    /// Ensure `tool` is available for the current platform
    pub async fn ensure(&self, tool: &ManagedTool) -> Result<PathBuf> {
        self.ensure_for(tool, &Platform::current()).await
    }

    /// Ensure `tool` is available, installing the `platform` build if it is missing
    pub async fn ensure_for(&self, tool: &ManagedTool, platform: &Platform) -> Result<PathBuf> {
        if let Some(path) = self.resolve(&tool.name) {
            debug!(tool = %tool.name, path = %path.display(), "Tool already present");
            return Ok(path);
        }

        let distribution = tool.distribution_for(platform)?;

        let span = info_span!(
            "tool.install",
            tool.name = %tool.name,
            tool.version = %tool.version,
            platform = %platform
        );
        self.install(tool, distribution).instrument(span).await
    }

    async fn install(&self, tool: &ManagedTool, distribution: &Distribution) -> Result<PathBuf> {
        let start = Instant::now();
        info!(
            "Installing {} {} into {}",
            tool.name,
            tool.version,
            self.install_dir.display()
        );

        let install_failed = |reason: String| PipelineError::InstallVerificationFailed {
            tool: tool.name.clone(),
            reason,
        };

        tokio::fs::create_dir_all(&self.install_dir)
            .await
            .map_err(|e| {
                install_failed(format!(
                    "cannot create install directory {}: {e}",
                    self.install_dir.display()
                ))
            })?;

        let artifact = download::download_artifact(
            &self.http,
            &distribution.url,
            &self.install_dir,
            distribution.sha256.as_deref(),
        )
        .await
        .map_err(|e| install_failed(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(artifact.path(), std::fs::Permissions::from_mode(0o755))
                .map_err(|e| install_failed(format!("cannot mark artifact executable: {e}")))?;
        }

        let target = self.install_dir.join(&tool.name);
        artifact
            .persist(&target)
            .map_err(|e| install_failed(format!("cannot move artifact to {}: {}", target.display(), e.error)))?;

        match self.resolve(&tool.name) {
            Some(path) => {
                info!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Installed {} at {}",
                    tool.name,
                    path.display()
                );
                Ok(path)
            }
            None => Err(install_failed(format!(
                "installed to {} but still not resolvable on the search path",
                target.display()
            ))),
        }
    }
}
