//! # GitOps Publisher Tests
//!
//! Publishes into local bare repositories over `file://` with a recording
//! pull-request API.

mod common;

use common::{test_credentials, GitRemote, RecordingPullRequests};
use sops_gitops::error::PullRequestFailure;
use sops_gitops::gitops::{GitOpsPublisher, PullRequestRef};
use sops_gitops::process::ProcessRunner;
use sops_gitops::PipelineError;
use std::path::PathBuf;
use std::sync::Arc;

const CIPHERTEXT: &str = "data: ENC[AES256_GCM,data:abc=,type:str]\nsops:\n  version: 3.7.1\n";

fn publisher(remote: &GitRemote, api: Arc<RecordingPullRequests>) -> GitOpsPublisher {
    GitOpsPublisher::new(ProcessRunner::default(), remote.base_url(), api)
}

/// Publication workspaces currently in the temp dir
fn publication_workspaces() -> Vec<PathBuf> {
    std::fs::read_dir(std::env::temp_dir())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .is_some_and(|n| n.to_string_lossy().starts_with("sops-gitops-repo-"))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn test_publish_creates_branch_commit_and_pull_request() {
    let remote = GitRemote::new("org/infra");
    let api = Arc::new(RecordingPullRequests::default());

    let pr = publisher(&remote, api.clone())
        .publish(&remote.repo, "main", "db-pass", CIPHERTEXT, &test_credentials())
        .await
        .expect("publish should succeed");

    assert_eq!(pr.head, "db-pass-secret-from-terraform");
    assert_eq!(pr.base, "main");

    assert_eq!(
        remote
            .file_on_branch("db-pass-secret-from-terraform", "db-pass.enc.yaml")
            .as_deref(),
        Some(CIPHERTEXT)
    );
    assert_eq!(
        remote.tip_commit("db-pass-secret-from-terraform"),
        "github-actions[bot] <41898282+github-actions[bot]@users.noreply.github.com>|adding terraform 'db-pass' secret"
    );
    // The base branch is untouched
    assert!(remote.file_on_branch("main", "db-pass.enc.yaml").is_none());

    let created = api.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].title, "Add terraform 'db-pass' secret");
    assert_eq!(created[0].body, "Resource created via Terraform :robot:");
    assert_eq!(created[0].head, "db-pass-secret-from-terraform");
    assert_eq!(created[0].base, "main");
    assert!(!created[0].draft);
}

#[tokio::test]
async fn test_republish_updates_the_same_branch() {
    let remote = GitRemote::new("org/infra");
    let api = Arc::new(RecordingPullRequests::default());
    let publisher = publisher(&remote, api.clone());

    publisher
        .publish(&remote.repo, "main", "db-pass", CIPHERTEXT, &test_credentials())
        .await
        .unwrap();
    publisher
        .publish(&remote.repo, "main", "db-pass", "data: ENC[rotated]\n", &test_credentials())
        .await
        .unwrap();

    assert_eq!(
        remote
            .file_on_branch("db-pass-secret-from-terraform", "db-pass.enc.yaml")
            .as_deref(),
        Some("data: ENC[rotated]\n")
    );
}

#[tokio::test]
async fn test_push_failure_opens_no_pull_request() {
    let remote = GitRemote::new("org/infra");
    remote.reject_pushes();
    let api = Arc::new(RecordingPullRequests::default());

    let err = publisher(&remote, api.clone())
        .publish(&remote.repo, "main", "db-pass", CIPHERTEXT, &test_credentials())
        .await
        .unwrap_err();

    assert_eq!(err.category(), "PushFailed");
    assert!(err.to_string().contains("db-pass-secret-from-terraform"));
    assert!(api.created().is_empty());
    assert!(!remote.has_branch("db-pass-secret-from-terraform"));
}

#[tokio::test]
async fn test_unknown_base_branch_is_clone_failure() {
    let remote = GitRemote::new("org/infra");
    let api = Arc::new(RecordingPullRequests::default());

    let err = publisher(&remote, api.clone())
        .publish(&remote.repo, "does-not-exist", "db-pass", CIPHERTEXT, &test_credentials())
        .await
        .unwrap_err();

    assert_eq!(err.category(), "CloneFailed");
    assert!(api.created().is_empty());
}

#[tokio::test]
async fn test_missing_repository_is_clone_failure() {
    let remote = GitRemote::new("org/infra");
    let api = Arc::new(RecordingPullRequests::default());
    let other = sops_gitops::gitops::RepoRef::parse("org/missing").unwrap();

    let err = publisher(&remote, api)
        .publish(&other, "main", "db-pass", CIPHERTEXT, &test_credentials())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::CloneFailed { ref repo, .. } if repo == "org/missing"));
    assert!(!err.to_string().contains("ghp_testtoken"));
}

#[tokio::test]
async fn test_workspaces_are_removed_on_success_and_failure() {
    // A secret name no other test publishes, so concurrent tests cannot interfere
    let secret = "workspace-check";
    let ours = |p: &PathBuf| {
        p.join(".git")
            .join("refs/heads/workspace-check-secret-from-terraform")
            .exists()
    };

    let remote = GitRemote::new("org/infra");
    let api = Arc::new(RecordingPullRequests::default());
    publisher(&remote, api.clone())
        .publish(&remote.repo, "main", secret, CIPHERTEXT, &test_credentials())
        .await
        .unwrap();
    assert!(!publication_workspaces().iter().any(ours));

    let failing = GitRemote::new("org/infra");
    failing.reject_pushes();
    publisher(&failing, api)
        .publish(&failing.repo, "main", secret, CIPHERTEXT, &test_credentials())
        .await
        .unwrap_err();
    assert!(!publication_workspaces().iter().any(ours));
}

#[tokio::test]
async fn test_existing_pull_request_is_reused() {
    let remote = GitRemote::new("org/infra");
    let existing = PullRequestRef {
        number: 7,
        url: "https://github.com/org/infra/pull/7".to_string(),
        head: "db-pass-secret-from-terraform".to_string(),
        base: "main".to_string(),
    };
    let api = Arc::new(RecordingPullRequests::with_existing(existing.clone()));

    let pr = publisher(&remote, api.clone())
        .publish(&remote.repo, "main", "db-pass", CIPHERTEXT, &test_credentials())
        .await
        .unwrap();

    assert_eq!(pr, existing);
    assert_eq!(
        api.lookups.lock().unwrap().as_slice(),
        ["db-pass-secret-from-terraform".to_string()]
    );
}

#[tokio::test]
async fn test_existing_pull_request_fails_when_reuse_disabled() {
    let remote = GitRemote::new("org/infra");
    let api = Arc::new(RecordingPullRequests::with_existing(PullRequestRef {
        number: 7,
        url: "https://github.com/org/infra/pull/7".to_string(),
        head: "db-pass-secret-from-terraform".to_string(),
        base: "main".to_string(),
    }));

    let err = publisher(&remote, api.clone())
        .with_reuse_pull_request(false)
        .publish(&remote.repo, "main", "db-pass", CIPHERTEXT, &test_credentials())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::PullRequestFailed {
            reason: PullRequestFailure::AlreadyExists,
            ..
        }
    ));
    assert!(api.lookups.lock().unwrap().is_empty());
}
