//! # Constants
//!
//! Shared constants used throughout the pipeline.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default directory managed tools are installed into (must be on `PATH`)
pub const DEFAULT_INSTALL_DIR: &str = "/usr/local/bin";

/// Default base URL repositories are cloned from and pushed to
pub const DEFAULT_GIT_BASE_URL: &str = "https://github.com";

/// Default GitHub REST API endpoint
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Default timeout for a single tool download (seconds)
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// Default shell used for piped invocations
pub const DEFAULT_SHELL: &str = "bash";

/// Pinned kubectl release
pub const KUBECTL_VERSION: &str = "v1.22.4";

/// kubectl download URL template (`{version}`, `{os}`, `{arch}`)
pub const KUBECTL_URL_TEMPLATE: &str = "https://dl.k8s.io/release/{version}/bin/{os}/{arch}/kubectl";

/// Pinned sops release
pub const SOPS_VERSION: &str = "v3.7.1";

/// sops download URL template (`{version}`, `{os}`)
pub const SOPS_URL_TEMPLATE: &str =
    "https://github.com/mozilla/sops/releases/download/{version}/sops-{version}.{os}";

/// Policy file name sops discovers from its working directory
pub const SOPS_CONFIG_FILE: &str = ".sops.yaml";

/// Suffix appended to the secret name to build the publication branch
pub const BRANCH_SUFFIX: &str = "-secret-from-terraform";

/// Suffix appended to the secret name to build the committed file name
pub const ENCRYPTED_FILE_SUFFIX: &str = ".enc.yaml";

/// Commit author name for automated commits
pub const BOT_AUTHOR_NAME: &str = "github-actions[bot]";

/// Commit author email for automated commits
pub const BOT_AUTHOR_EMAIL: &str = "41898282+github-actions[bot]@users.noreply.github.com";

/// Pull request body
pub const PULL_REQUEST_BODY: &str = "Resource created via Terraform :robot:";

/// Maximum number of stderr characters carried into an error
pub const MAX_STDERR_CHARS: usize = 2000;

/// User agent sent to GitHub (the API rejects requests without one)
pub const USER_AGENT: &str = concat!("sops-gitops/", env!("CARGO_PKG_VERSION"));
