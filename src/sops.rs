//! # Encryption Stage
//!
//! Encrypts a rendered manifest with the sops binary.
//!
//! sops has no flag for passing policy content directly, so each call writes
//! the policy to `.sops.yaml` inside a fresh temporary directory and runs sops
//! from there; sops discovers the policy file from its working directory.
//! The plaintext is piped on stdin and never written to disk.
//!
//! The [`EncryptionWorkspace`] is a `TempDir`, so it is removed on every exit
//! path, including unwinding.

use std::path::Path;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::constants::SOPS_CONFIG_FILE;
use crate::error::{PipelineError, Result};
use crate::process::ProcessRunner;
use crate::tools::{ManagedTool, ToolProvisioner};

/// Ephemeral directory holding exactly one sops policy file
#[derive(Debug)]
pub struct EncryptionWorkspace {
    dir: TempDir,
}

impl EncryptionWorkspace {
    /// Create the directory and write `policy_config` verbatim into it
    pub fn create(policy_config: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("sops-gitops-enc-")
            .tempdir()
            .map_err(|e| PipelineError::workspace("failed to create tmp sops dir", e))?;

        std::fs::write(dir.path().join(SOPS_CONFIG_FILE), policy_config).map_err(|e| {
            PipelineError::workspace(format!("failed to write {SOPS_CONFIG_FILE} file"), e)
        })?;

        debug!(path = %dir.path().display(), "Created encryption workspace");
        Ok(Self { dir })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory, reporting failures instead of swallowing them in `Drop`
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove encryption workspace {}: {}", path.display(), e);
        }
    }
}

/// Quote `value` for a POSIX shell
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Runs sops against a request-scoped policy
#[derive(Debug, Clone)]
pub struct Encryptor {
    provisioner: ToolProvisioner,
    runner: ProcessRunner,
    tool: ManagedTool,
}

impl Encryptor {
    #[must_use]
    pub fn new(provisioner: ToolProvisioner, runner: ProcessRunner) -> Self {
        Self {
            provisioner,
            runner,
            tool: ManagedTool::sops(),
        }
    }

    /// Use a different encryption tool definition
    #[must_use]
    pub fn with_tool(mut self, tool: ManagedTool) -> Self {
        self.tool = tool;
        self
    }

    /// Shell used to run the encryption tool
    #[must_use]
    pub fn shell(&self) -> &str {
        self.runner.shell()
    }

    /// Encrypt `plaintext` under `policy_config`, returning sops YAML output
    pub async fn encrypt(&self, plaintext: &str, policy_config: &str) -> Result<String> {
        let span = info_span!(
            "sops.encrypt",
            plaintext.size = plaintext.len(),
            operation.success = tracing::field::Empty,
            operation.duration_ms = tracing::field::Empty
        );
        let start = Instant::now();

        let workspace = EncryptionWorkspace::create(policy_config)?;
        let result = self
            .encrypt_in(&workspace, plaintext)
            .instrument(span.clone())
            .await;
        workspace.close();

        span.record("operation.duration_ms", start.elapsed().as_millis() as u64);
        span.record("operation.success", result.is_ok());
        result
    }

    async fn encrypt_in(&self, workspace: &EncryptionWorkspace, plaintext: &str) -> Result<String> {
        let sops_path = self.provisioner.ensure(&self.tool).await?;
        debug!("Using sops binary at: {:?}", sops_path);

        let script = format!(
            "{} --input-type yaml --output-type yaml --encrypt /dev/stdin",
            shell_quote(&sops_path.to_string_lossy())
        );

        let output = self
            .runner
            .run_shell(&script, workspace.path(), Some(plaintext.as_bytes()))
            .await
            .map_err(|e| {
                // Only stderr is logged, never the plaintext
                error!("sops encryption failed: {}", e);
                e.into_pipeline_error(|stderr| PipelineError::EncryptionFailed { stderr })
            })?;

        if output.stdout.trim().is_empty() {
            return Err(PipelineError::EncryptionFailed {
                stderr: "sops produced no output".to_string(),
            });
        }

        info!(ciphertext.size = output.stdout.len(), "Encrypted secret with sops");
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("/usr/local/bin/sops"), "'/usr/local/bin/sops'");
        assert_eq!(shell_quote("/tmp/it's/sops"), r"'/tmp/it'\''s/sops'");
    }

    #[test]
    fn test_workspace_holds_policy_and_is_removed_on_close() {
        let workspace = EncryptionWorkspace::create("creation_rules:\n  - age: age1xyz\n")
            .expect("workspace should be created");
        let path = workspace.path().to_path_buf();

        let policy = std::fs::read_to_string(path.join(SOPS_CONFIG_FILE)).unwrap();
        assert_eq!(policy, "creation_rules:\n  - age: age1xyz\n");
        assert_eq!(std::fs::read_dir(&path).unwrap().count(), 1);

        workspace.close();
        assert!(!path.exists());
    }

    #[test]
    fn test_workspace_is_removed_on_drop() {
        let workspace = EncryptionWorkspace::create("creation_rules: []\n").unwrap();
        let path = workspace.path().to_path_buf();
        drop(workspace);
        assert!(!path.exists());
    }
}
