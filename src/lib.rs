//! # sops-gitops
//!
//! Provisions Kubernetes secrets encrypted with sops and publishes them to a
//! Git repository through a pull request, so plaintext never reaches source
//! control while the change stays reviewable.
//!
//! ## Pipeline
//!
//! 1. **Tool provisioning** ([`tools`]) - kubectl and sops are installed on demand
//! 2. **Rendering** ([`secret`]) - deterministic `Secret` manifest
//! 3. **Fingerprint gate** ([`fingerprint`]) - skip work when nothing changed
//! 4. **Encryption** ([`sops`]) - sops against a request-scoped `.sops.yaml`
//! 5. **Publication** ([`gitops`]) - clone, branch, commit, push, pull request
//!
//! [`pipeline::Pipeline`] sequences the stages for create, read, update and
//! delete and reports failures as [`pipeline::StageError`].

pub mod config;
pub mod constants;
pub mod error;
pub mod fingerprint;
pub mod gitops;
pub mod observability;
pub mod pipeline;
pub mod process;
pub mod secret;
pub mod sops;
pub mod tools;
pub mod validation;

pub use error::{PipelineError, PullRequestFailure, Result};
pub use pipeline::{Operation, Outcome, Pipeline, ResourceDescriptor, ResourceState};
