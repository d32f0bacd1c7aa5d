use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use gatekeeper_engine::SandboxProvider;
use gatekeeper_types::SandboxResult;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, SandboxError};

/// Sandbox settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Directories linked from the original project into every sandbox
    pub dependency_dirs: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            dependency_dirs: vec!["node_modules".to_string()],
        }
    }
}

/// Turn a git ref into a directory-name-safe token.
///
/// `feature/login` and `feature-login` map to the same name; they share a
/// sandbox slot and are serialised by the same lock.
pub fn sanitize_ref(target_ref: &str) -> String {
    let mapped: String = target_ref
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = mapped.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        "ref".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Creates and removes worktree sandboxes.
#[derive(Default)]
pub struct SandboxService {
    config: SandboxConfig,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl SandboxService {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Deterministic location of the sandbox for `target_ref`.
    pub fn sandbox_path(sandbox_base_path: &Path, target_ref: &str) -> PathBuf {
        sandbox_base_path.join(format!("sandbox-{}", sanitize_ref(target_ref)))
    }

    async fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Drop the lock for `path` unless another caller still holds or awaits it.
    async fn forget_lock(&self, path: &Path, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        let idle = locks
            .get(path)
            .is_some_and(|held| Arc::ptr_eq(held, lock) && Arc::strong_count(lock) == 2);
        if idle {
            locks.remove(path);
        }
    }

    /// Check out `target_ref` into a sandbox under `sandbox_base_path`.
    ///
    /// Relative paths are resolved against the current directory first, so
    /// the reported path, the worktree and the dependency links agree.
    /// Reuses an existing sandbox for the same ref. Never returns an error:
    /// failures come back as `success = false` with a diagnostic, and no
    /// half-created worktree is left behind.
    pub async fn create(
        &self,
        original_path: &Path,
        sandbox_base_path: &Path,
        target_ref: &str,
    ) -> SandboxResult {
        let (original_path, sandbox_base_path) =
            match (absolute(original_path), absolute(sandbox_base_path)) {
                (Ok(original), Ok(base)) => (original, base),
                (Err(err), _) | (_, Err(err)) => {
                    return SandboxResult::failure(
                        Self::sandbox_path(sandbox_base_path, target_ref),
                        SandboxError::from(err).to_string(),
                    )
                }
            };
        let sandbox_path = Self::sandbox_path(&sandbox_base_path, target_ref);
        let lock = self.path_lock(&sandbox_path).await;
        let _guard = lock.lock().await;

        match self
            .create_locked(&original_path, &sandbox_path, target_ref)
            .await
        {
            Ok(junction_created) => {
                info!(
                    path = %sandbox_path.display(),
                    target_ref,
                    junction_created,
                    "Sandbox ready"
                );
                SandboxResult {
                    success: true,
                    sandbox_path,
                    junction_created,
                    error: None,
                }
            }
            Err(err) => {
                warn!(
                    path = %sandbox_path.display(),
                    target_ref,
                    error = %err,
                    "Sandbox creation failed"
                );
                SandboxResult::failure(sandbox_path, err.to_string())
            }
        }
    }

    async fn create_locked(
        &self,
        original_path: &Path,
        sandbox_path: &Path,
        target_ref: &str,
    ) -> Result<bool> {
        let target_ref = target_ref.trim();
        if target_ref.is_empty() || target_ref.starts_with('-') {
            return Err(SandboxError::InvalidRef(target_ref.to_string()));
        }
        let commit = format!("{}^{{commit}}", target_ref);
        if git(original_path, &["rev-parse", "--verify", "--quiet", &commit])
            .await
            .is_err()
        {
            return Err(SandboxError::InvalidRef(target_ref.to_string()));
        }

        if tokio::fs::try_exists(sandbox_path).await? {
            if !is_registered_worktree(original_path, sandbox_path).await? {
                return Err(SandboxError::Occupied(sandbox_path.to_path_buf()));
            }
            debug!(path = %sandbox_path.display(), "Reusing existing sandbox");
            git(sandbox_path, &["checkout", "--detach", "--force", target_ref]).await?;
        } else {
            if let Some(parent) = sandbox_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            // Metadata of a deleted sandbox directory makes `worktree add` refuse the path.
            let _ = git(original_path, &["worktree", "prune"]).await;

            let path_arg = sandbox_path.to_string_lossy();
            if let Err(err) = git(
                original_path,
                &["worktree", "add", "--detach", path_arg.as_ref(), target_ref],
            )
            .await
            {
                remove_partial(original_path, sandbox_path).await;
                return Err(err);
            }
        }

        Ok(self.link_dependencies(original_path, sandbox_path).await)
    }

    /// Link dependency directories into the sandbox. Returns whether at least
    /// one link is in place; failures are logged and otherwise ignored.
    async fn link_dependencies(&self, original_path: &Path, sandbox_path: &Path) -> bool {
        let mut linked = false;
        for dir in &self.config.dependency_dirs {
            let source = original_path.join(dir);
            let is_dir = tokio::fs::metadata(&source)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }

            let target = sandbox_path.join(dir);
            match tokio::fs::symlink_metadata(&target).await {
                Ok(meta) if meta.file_type().is_symlink() => {
                    linked = true;
                    continue;
                }
                Ok(_) => {
                    debug!(dir = %dir, "Sandbox has its own dependency directory");
                    continue;
                }
                Err(_) => {}
            }

            match link_dir(&source, &target).await {
                Ok(()) => linked = true,
                Err(err) => warn!(dir = %dir, error = %err, "Could not link dependency directory"),
            }
        }
        linked
    }

    /// Remove dependency links, then the worktree. Best effort: problems are
    /// logged, never returned.
    pub async fn cleanup(&self, sandbox_path: &Path) {
        let sandbox_path = match absolute(sandbox_path) {
            Ok(path) => path,
            Err(err) => {
                warn!(path = %sandbox_path.display(), error = %err, "Could not resolve sandbox path");
                return;
            }
        };
        let lock = self.path_lock(&sandbox_path).await;
        {
            let _guard = lock.lock().await;
            self.cleanup_locked(&sandbox_path).await;
        }
        self.forget_lock(&sandbox_path, &lock).await;
    }

    async fn cleanup_locked(&self, sandbox_path: &Path) {

        for dir in &self.config.dependency_dirs {
            let target = sandbox_path.join(dir);
            let is_link = tokio::fs::symlink_metadata(&target)
                .await
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            if is_link {
                if let Err(err) = unlink_dir(&target).await {
                    warn!(path = %target.display(), error = %err, "Could not remove dependency link");
                }
            }
        }

        if !tokio::fs::try_exists(sandbox_path).await.unwrap_or(false) {
            return;
        }

        let main_repo = main_repo_of(sandbox_path).await;
        let path_arg = sandbox_path.to_string_lossy();
        let removed = match &main_repo {
            Ok(main) => git(main, &["worktree", "remove", "--force", path_arg.as_ref()])
                .await
                .map(|_| ()),
            Err(err) => Err(SandboxError::Git {
                command: "rev-parse --git-common-dir".into(),
                stderr: err.to_string(),
            }),
        };

        match removed {
            Ok(()) => info!(path = %sandbox_path.display(), "Sandbox removed"),
            Err(err) => {
                warn!(
                    path = %sandbox_path.display(),
                    error = %err,
                    "git worktree remove failed; deleting directory"
                );
                if let Err(err) = tokio::fs::remove_dir_all(sandbox_path).await {
                    warn!(path = %sandbox_path.display(), error = %err, "Could not delete sandbox");
                }
                if let Ok(main) = &main_repo {
                    let _ = git(main, &["worktree", "prune"]).await;
                }
            }
        }
    }
}

#[async_trait]
impl SandboxProvider for SandboxService {
    async fn create(
        &self,
        original_path: &Path,
        sandbox_base_path: &Path,
        target_ref: &str,
    ) -> SandboxResult {
        SandboxService::create(self, original_path, sandbox_base_path, target_ref).await
    }

    async fn cleanup(&self, sandbox_path: &Path) {
        SandboxService::cleanup(self, sandbox_path).await
    }
}

async fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .await?;
    if !output.status.success() {
        return Err(SandboxError::Git {
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// `path` made absolute against the current directory, without touching the
/// filesystem.
fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    std::path::absolute(path)
}

fn comparable(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

async fn is_registered_worktree(original_path: &Path, sandbox_path: &Path) -> Result<bool> {
    let listing = git(original_path, &["worktree", "list", "--porcelain"]).await?;
    let wanted = comparable(sandbox_path);
    Ok(listing
        .lines()
        .filter_map(|line| line.strip_prefix("worktree "))
        .any(|path| comparable(Path::new(path.trim())) == wanted))
}

/// Root of the repository owning a linked worktree.
async fn main_repo_of(worktree: &Path) -> Result<PathBuf> {
    let common = git(worktree, &["rev-parse", "--git-common-dir"]).await?;
    let common = PathBuf::from(common);
    let common = if common.is_absolute() {
        common
    } else {
        worktree.join(common)
    };
    let common = comparable(&common);
    common
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| SandboxError::Git {
            command: "rev-parse --git-common-dir".into(),
            stderr: format!("no parent for {}", common.display()),
        })
}

async fn remove_partial(original_path: &Path, sandbox_path: &Path) {
    let path_arg = sandbox_path.to_string_lossy();
    let _ = git(
        original_path,
        &["worktree", "remove", "--force", path_arg.as_ref()],
    )
    .await;
    if tokio::fs::try_exists(sandbox_path).await.unwrap_or(false) {
        if let Err(err) = tokio::fs::remove_dir_all(sandbox_path).await {
            warn!(path = %sandbox_path.display(), error = %err, "Could not remove partial sandbox");
        }
    }
    let _ = git(original_path, &["worktree", "prune"]).await;
}

#[cfg(unix)]
async fn link_dir(source: &Path, target: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(source, target).await
}

#[cfg(windows)]
async fn link_dir(source: &Path, target: &Path) -> std::io::Result<()> {
    tokio::fs::symlink_dir(source, target).await
}

#[cfg(not(any(unix, windows)))]
async fn link_dir(_source: &Path, _target: &Path) -> std::io::Result<()> {
    Err(std::io::ErrorKind::Unsupported.into())
}

#[cfg(windows)]
async fn unlink_dir(target: &Path) -> std::io::Result<()> {
    tokio::fs::remove_dir(target).await
}

#[cfg(not(windows))]
async fn unlink_dir(target: &Path) -> std::io::Result<()> {
    tokio::fs::remove_file(target).await
}
