//! `GitService` backed by the git command line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gatekeeper_engine::GitService;
use gatekeeper_types::{ServiceError, ServiceResult};
use tokio::process::Command;
use tracing::debug;

const STASH_MESSAGE: &str = "gatekeeper: red phase";

/// Git access to one project checkout, comparing `base_ref` with `target_ref`.
///
/// An empty `target_ref` compares the base against the working tree.
#[derive(Clone, Debug)]
pub struct GitCli {
    root: PathBuf,
    base_ref: String,
    target_ref: String,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>, base_ref: impl Into<String>, target_ref: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_ref: base_ref.into(),
            target_ref: target_ref.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn git(&self, args: &[&str]) -> ServiceResult<String> {
        debug!(args = ?args, "git");
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .output()
            .await?;
        if !output.status.success() {
            return Err(ServiceError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn range_args<'a>(&'a self, leading: &[&'a str]) -> Vec<&'a str> {
        let mut args = leading.to_vec();
        args.push(&self.base_ref);
        if !self.target_ref.is_empty() {
            args.push(&self.target_ref);
        }
        args
    }
}

#[async_trait]
impl GitService for GitCli {
    async fn diff(&self) -> ServiceResult<String> {
        self.git(&self.range_args(&["diff"])).await
    }

    async fn read_file(&self, path: &str) -> ServiceResult<String> {
        Ok(tokio::fs::read_to_string(self.root.join(path)).await?)
    }

    async fn checkout(&self, git_ref: &str) -> ServiceResult<()> {
        if git_ref.starts_with('-') {
            return Err(ServiceError::Git(format!("refusing option-like ref {:?}", git_ref)));
        }
        self.git(&["checkout", "--quiet", git_ref]).await.map(|_| ())
    }

    /// Against the working tree this includes untracked, non-ignored files.
    async fn diff_files(&self) -> ServiceResult<Vec<String>> {
        let mut out = self.git(&self.range_args(&["diff", "--name-only"])).await?;
        if self.target_ref.is_empty() {
            out.push('\n');
            out.push_str(&self.git(&["ls-files", "--others", "--exclude-standard"]).await?);
        }
        let mut files: Vec<String> = Vec::new();
        for line in out.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !files.iter().any(|f| f == line) {
                files.push(line.to_string());
            }
        }
        Ok(files)
    }

    async fn current_ref(&self) -> ServiceResult<String> {
        match self.git(&["symbolic-ref", "--quiet", "--short", "HEAD"]).await {
            Ok(branch) => Ok(branch.trim().to_string()),
            Err(_) => Ok(self.git(&["rev-parse", "HEAD"]).await?.trim().to_string()),
        }
    }

    async fn stash(&self) -> ServiceResult<bool> {
        let status = self.git(&["status", "--porcelain"]).await?;
        if status.trim().is_empty() {
            return Ok(false);
        }
        self.git(&["stash", "push", "--include-untracked", "--message", STASH_MESSAGE])
            .await?;
        Ok(true)
    }

    async fn stash_pop(&self) -> ServiceResult<()> {
        self.git(&["stash", "pop", "--quiet"]).await.map(|_| ())
    }
}
