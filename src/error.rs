//! # Errors
//!
//! Error taxonomy surfaced by every pipeline component.
//!
//! Each variant is one failure category. Variants that wrap an external tool
//! carry its captured (redacted, truncated) standard-error text.

use std::time::Duration;
use thiserror::Error;

/// Why opening a pull request failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullRequestFailure {
    /// An open pull request for the same head branch already exists
    AlreadyExists,
    /// The credential was rejected (401/403)
    Unauthorized,
    /// Repository or base branch not found (404)
    NotFound,
    /// Any other non-success response
    Rejected { status: u16 },
    /// The request never produced a response
    Transport,
}

impl PullRequestFailure {
    /// Get human-readable string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PullRequestFailure::AlreadyExists => "already-exists",
            PullRequestFailure::Unauthorized => "unauthorized",
            PullRequestFailure::NotFound => "not-found",
            PullRequestFailure::Rejected { .. } => "rejected",
            PullRequestFailure::Transport => "transport",
        }
    }
}

impl std::fmt::Display for PullRequestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PullRequestFailure::Rejected { status } => write!(f, "rejected (HTTP {status})"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unsupported platform: no {tool} distribution for {os}/{arch}")]
    UnsupportedPlatform {
        tool: String,
        os: String,
        arch: String,
    },

    #[error("failed to install {tool}: {reason}")]
    InstallVerificationFailed { tool: String, reason: String },

    #[error("workspace error: {context}: {source}")]
    WorkspaceError {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sops encryption failed: {stderr}")]
    EncryptionFailed { stderr: String },

    #[error("failed to clone repository '{repo}': {stderr}")]
    CloneFailed { repo: String, stderr: String },

    #[error("failed to create branch '{branch}': {stderr}")]
    BranchCreationFailed { branch: String, stderr: String },

    #[error("failed to check out branch '{branch}': {stderr}")]
    CheckoutFailed { branch: String, stderr: String },

    #[error("failed to write '{file}': {message}")]
    WriteFailed { file: String, message: String },

    #[error("failed to commit '{file}': {stderr}")]
    CommitFailed { file: String, stderr: String },

    #[error("failed to push branch '{branch}': {stderr}")]
    PushFailed { branch: String, stderr: String },

    #[error("failed to open pull request from '{head}' ({reason}): {message}")]
    PullRequestFailed {
        head: String,
        reason: PullRequestFailure,
        message: String,
    },

    #[error("'{command}' timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("precondition violated: {0}")]
    PreconditionViolation(String),
}

impl PipelineError {
    /// Stable category name used in diagnostics
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::UnsupportedPlatform { .. } => "UnsupportedPlatform",
            PipelineError::InstallVerificationFailed { .. } => "InstallVerificationFailed",
            PipelineError::WorkspaceError { .. } => "WorkspaceError",
            PipelineError::EncryptionFailed { .. } => "EncryptionFailed",
            PipelineError::CloneFailed { .. } => "CloneFailed",
            PipelineError::BranchCreationFailed { .. } => "BranchCreationFailed",
            PipelineError::CheckoutFailed { .. } => "CheckoutFailed",
            PipelineError::WriteFailed { .. } => "WriteFailed",
            PipelineError::CommitFailed { .. } => "CommitFailed",
            PipelineError::PushFailed { .. } => "PushFailed",
            PipelineError::PullRequestFailed { .. } => "PullRequestFailed",
            PipelineError::Timeout { .. } => "Timeout",
            PipelineError::PreconditionViolation(_) => "PreconditionViolation",
        }
    }

    pub(crate) fn workspace(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::WorkspaceError {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Truncate captured stderr so it stays readable in a diagnostic
pub(crate) fn truncate_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.chars().count() > crate::constants::MAX_STDERR_CHARS {
        let head: String = trimmed
            .chars()
            .take(crate::constants::MAX_STDERR_CHARS)
            .collect();
        format!("{head}... (truncated)")
    } else {
        trimmed.to_string()
    }
}
