//! # Validation
//!
//! Validates secret names, namespaces, repository references and branch names
//! before any side effect happens. Every failure is a
//! [`PipelineError::PreconditionViolation`].

use regex::Regex;

use crate::error::{PipelineError, Result};

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| PipelineError::PreconditionViolation(format!("Failed to compile regex: {e}")))
}

/// Validate a Kubernetes resource name (RFC 1123 subdomain)
/// Format: lowercase alphanumeric, hyphens, dots
/// Length: 1-253 characters
/// Cannot start or end with hyphen or dot
pub fn validate_kubernetes_name(name: &str, field_name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(PipelineError::PreconditionViolation(format!(
            "{field_name} cannot be empty"
        )));
    }

    if name.len() > 253 {
        return Err(PipelineError::PreconditionViolation(format!(
            "{field_name} '{name}' exceeds maximum length of 253 characters (got {})",
            name.len()
        )));
    }

    let name_regex = compile(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")?;
    if !name_regex.is_match(name) {
        return Err(PipelineError::PreconditionViolation(format!(
            "{field_name} '{name}' must be a valid Kubernetes name (lowercase alphanumeric, hyphens, dots; cannot start/end with hyphen or dot)"
        )));
    }

    Ok(())
}

/// Validate a Kubernetes namespace (RFC 1123 label)
/// Format: lowercase alphanumeric, hyphens
/// Length: 1-63 characters
pub fn validate_kubernetes_namespace(namespace: &str) -> Result<()> {
    if namespace.trim().is_empty() {
        return Err(PipelineError::PreconditionViolation(
            "namespace cannot be empty".to_string(),
        ));
    }

    if namespace.len() > 63 {
        return Err(PipelineError::PreconditionViolation(format!(
            "namespace '{namespace}' exceeds maximum length of 63 characters (got {})",
            namespace.len()
        )));
    }

    let namespace_regex = compile(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$")?;
    if !namespace_regex.is_match(namespace) {
        return Err(PipelineError::PreconditionViolation(format!(
            "namespace '{namespace}' must be a valid Kubernetes namespace (lowercase alphanumeric, hyphens; cannot start/end with hyphen)"
        )));
    }

    Ok(())
}

/// Validate a repository reference of the form `owner/name`
pub fn validate_repo_ref(repo: &str) -> Result<()> {
    let repo_regex = compile(r"^[A-Za-z0-9][A-Za-z0-9-]*/[A-Za-z0-9._-]+$")?;
    if !repo_regex.is_match(repo) {
        return Err(PipelineError::PreconditionViolation(format!(
            "repo '{repo}' must have the form 'owner/name'"
        )));
    }
    Ok(())
}

/// Validate a branch name well enough to pass it to git and the hosting API
pub fn validate_branch_name(branch: &str) -> Result<()> {
    if branch.trim().is_empty() {
        return Err(PipelineError::PreconditionViolation(
            "base_branch cannot be empty".to_string(),
        ));
    }

    let branch_regex = compile(r"^[A-Za-z0-9._/-]+$")?;
    if !branch_regex.is_match(branch)
        || branch.starts_with('-')
        || branch.starts_with('/')
        || branch.ends_with('/')
        || branch.ends_with(".lock")
        || branch.contains("..")
        || branch.contains("//")
    {
        return Err(PipelineError::PreconditionViolation(format!(
            "base_branch '{branch}' is not a valid branch name"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kubernetes_name() {
        assert!(validate_kubernetes_name("db-pass", "name").is_ok());
        assert!(validate_kubernetes_name("app.config", "name").is_ok());
        assert!(validate_kubernetes_name("", "name").is_err());
        assert!(validate_kubernetes_name("-leading", "name").is_err());
        assert!(validate_kubernetes_name("Upper", "name").is_err());
        assert!(validate_kubernetes_name("a/b", "name").is_err());
        assert!(validate_kubernetes_name(&"a".repeat(254), "name").is_err());
    }

    #[test]
    fn test_kubernetes_namespace() {
        assert!(validate_kubernetes_namespace("prod").is_ok());
        assert!(validate_kubernetes_namespace("team-a").is_ok());
        assert!(validate_kubernetes_namespace("with.dot").is_err());
        assert!(validate_kubernetes_namespace(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_repo_ref() {
        assert!(validate_repo_ref("org/infra").is_ok());
        assert!(validate_repo_ref("argyle-systems/gh-actions-playground").is_ok());
        assert!(validate_repo_ref("org").is_err());
        assert!(validate_repo_ref("org/infra/extra").is_err());
        assert!(validate_repo_ref("/infra").is_err());
    }

    #[test]
    fn test_branch_name() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("release/1.2").is_ok());
        assert!(validate_branch_name("").is_err());
        assert!(validate_branch_name("-main").is_err());
        assert!(validate_branch_name("a..b").is_err());
        assert!(validate_branch_name("has space").is_err());
        assert!(validate_branch_name("main.lock").is_err());
    }
}
