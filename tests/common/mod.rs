//! Common test utilities
//!
//! Shared fixtures for integration tests: rustls setup, fake tool scripts on an
//! isolated search path, local bare Git remotes and a recording pull-request API.

#![allow(dead_code, reason = "each test crate uses a different subset of helpers")]

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, Once};
use tempfile::TempDir;

use sops_gitops::error::{PipelineError, PullRequestFailure, Result};
use sops_gitops::gitops::{Credentials, NewPullRequest, PullRequestApi, PullRequestRef, RepoRef};

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

/// Write an executable script into `dir`
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// Fake sops: refuses to run without `.sops.yaml` in its working directory,
/// records that directory in `cwd_log`, and prints the hex of stdin as ciphertext
pub fn encrypting_sops(cwd_log: &Path) -> String {
    format!(
        "#!/bin/sh\n\
         pwd >> '{}'\n\
         test -f .sops.yaml || {{ echo 'config file not found' >&2; exit 1; }}\n\
         printf 'data: ENC[%s]\\nsops:\\n  version: 3.7.1\\n' \"$(od -An -tx1 | tr -d ' \\n')\"\n",
        cwd_log.display()
    )
}

/// Fake sops that records its working directory and fails with `stderr`
pub fn failing_sops(cwd_log: &Path, stderr: &str) -> String {
    format!(
        "#!/bin/sh\npwd >> '{}'\ncat > /dev/null\necho '{}' >&2\nexit 1\n",
        cwd_log.display(),
        stderr
    )
}

pub const FAKE_KUBECTL: &str = "#!/bin/sh\necho 'Client Version: v1.22.4'\n";

/// Directory holding fake `kubectl` and `sops`
pub struct FakeTools {
    pub dir: TempDir,
    pub cwd_log: PathBuf,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::with_sops(encrypting_sops)
    }

    pub fn with_sops(sops: impl FnOnce(&Path) -> String) -> Self {
        let dir = tempfile::tempdir().expect("tool dir");
        let cwd_log = dir.path().join("sops-cwd.log");
        write_script(dir.path(), "kubectl", FAKE_KUBECTL);
        write_script(dir.path(), "sops", &sops(&cwd_log));
        Self { dir, cwd_log }
    }

    /// Fake tools first, then the real `PATH` for `sh`, `git` and friends
    pub fn search_path(&self) -> OsString {
        let mut paths = vec![self.dir.path().to_path_buf()];
        if let Some(path) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&path));
        }
        std::env::join_paths(paths).expect("join paths")
    }

    /// Working directories sops was run from
    pub fn sops_working_dirs(&self) -> Vec<PathBuf> {
        std::fs::read_to_string(&self.cwd_log)
            .unwrap_or_default()
            .lines()
            .map(PathBuf::from)
            .collect()
    }
}

fn git(args: &[&str]) -> std::process::Output {
    let output = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com", "-c", "commit.gpgsign=false"])
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

/// A bare repository served over `file://`, laid out as `<root>/<owner>/<name>.git`
pub struct GitRemote {
    pub root: TempDir,
    pub repo: RepoRef,
}

impl GitRemote {
    /// Bare remote with one commit on `main`
    pub fn new(repo: &str) -> Self {
        let root = tempfile::tempdir().expect("remote root");
        let repo = RepoRef::parse(repo).expect("repo ref");

        let seed = root.path().join("seed");
        let seed_str = seed.to_string_lossy().into_owned();
        git(&["init", "--quiet", &seed_str]);
        git(&["-C", &seed_str, "symbolic-ref", "HEAD", "refs/heads/main"]);
        std::fs::write(seed.join("README.md"), "# infra\n").expect("seed readme");
        git(&["-C", &seed_str, "add", "README.md"]);
        git(&["-C", &seed_str, "commit", "--quiet", "-m", "initial commit"]);

        let bare = root.path().join(&repo.owner).join(format!("{}.git", repo.name));
        std::fs::create_dir_all(bare.parent().expect("owner dir")).expect("create owner dir");
        git(&["clone", "--quiet", "--bare", &seed_str, &bare.to_string_lossy()]);

        Self { root, repo }
    }

    pub fn base_url(&self) -> String {
        format!("file://{}", self.root.path().display())
    }

    pub fn bare_path(&self) -> PathBuf {
        self.root
            .path()
            .join(&self.repo.owner)
            .join(format!("{}.git", self.repo.name))
    }

    /// Reject every push
    pub fn reject_pushes(&self) {
        let hooks = self.bare_path().join("hooks");
        std::fs::create_dir_all(&hooks).expect("hooks dir");
        write_script(&hooks, "pre-receive", "#!/bin/sh\necho 'push rejected by policy' >&2\nexit 1\n");
    }

    /// Content of `file` on `branch`, if both exist
    pub fn file_on_branch(&self, branch: &str, file: &str) -> Option<String> {
        let output = Command::new("git")
            .arg("--git-dir")
            .arg(self.bare_path())
            .arg("show")
            .arg(format!("{branch}:{file}"))
            .output()
            .ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// `author|subject` of the tip of `branch`
    pub fn tip_commit(&self, branch: &str) -> String {
        let output = Command::new("git")
            .arg("--git-dir")
            .arg(self.bare_path())
            .args(["log", "-1", "--format=%an <%ae>|%s", branch])
            .output()
            .expect("git log");
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        Command::new("git")
            .arg("--git-dir")
            .arg(self.bare_path())
            .args(["rev-parse", "--verify", "--quiet"])
            .arg(format!("refs/heads/{branch}"))
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

/// Pull-request API double that records every request
#[derive(Default)]
pub struct RecordingPullRequests {
    pub created: Mutex<Vec<NewPullRequest>>,
    pub lookups: Mutex<Vec<String>>,
    /// When set, creation fails with `AlreadyExists` and lookups return this
    pub existing: Option<PullRequestRef>,
}

impl RecordingPullRequests {
    pub fn with_existing(existing: PullRequestRef) -> Self {
        Self {
            existing: Some(existing),
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<NewPullRequest> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PullRequestApi for RecordingPullRequests {
    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &NewPullRequest,
        _credentials: &Credentials,
    ) -> Result<PullRequestRef> {
        self.created.lock().unwrap().push(request.clone());
        if self.existing.is_some() {
            return Err(PipelineError::PullRequestFailed {
                head: request.head.clone(),
                reason: PullRequestFailure::AlreadyExists,
                message: format!("A pull request already exists for {}:{}.", repo.owner, request.head),
            });
        }
        let number = self.created.lock().unwrap().len() as u64;
        Ok(PullRequestRef {
            number,
            url: format!("https://github.com/{repo}/pull/{number}"),
            head: request.head.clone(),
            base: request.base.clone(),
        })
    }

    async fn find_open_pull_request(
        &self,
        _repo: &RepoRef,
        head: &str,
        _credentials: &Credentials,
    ) -> Result<Option<PullRequestRef>> {
        self.lookups.lock().unwrap().push(head.to_string());
        Ok(self.existing.clone())
    }
}

pub const TEST_POLICY: &str = "creation_rules:\n  - path_regex: .*\n    age: age1qyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqs3290gq\n";

pub fn test_credentials() -> Credentials {
    Credentials::new("ghp_testtoken")
}
