//! The manifest: declared file changes for a task.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::ManifestError;

/// What a task intends to do with a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileAction {
    Create,
    Modify,
    Delete,
}

/// One declared file change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub path: String,
    pub action: FileAction,
    #[serde(default)]
    pub reason: String,
}

impl ManifestFile {
    pub fn new(path: impl Into<String>, action: FileAction, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action,
            reason: reason.into(),
        }
    }
}

/// Declared file changes plus the test file specifying them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub files: Vec<ManifestFile>,
    pub test_file: String,
}

impl Manifest {
    pub fn new(test_file: impl Into<String>) -> Self {
        Self {
            files: Vec::new(),
            test_file: test_file.into(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, action: FileAction) -> Self {
        self.files.push(ManifestFile::new(path, action, ""));
        self
    }

    /// Check the structural invariants, reporting every violation found.
    pub fn validate(&self) -> Result<(), Vec<ManifestError>> {
        let mut errors = Vec::new();

        if self.files.is_empty() {
            errors.push(ManifestError::Empty);
        }

        let mut seen = HashSet::new();
        for file in &self.files {
            let path = file.path.trim();
            if path.is_empty() {
                errors.push(ManifestError::EmptyPath);
                continue;
            }
            if has_glob(path) {
                errors.push(ManifestError::GlobPath(path.to_string()));
            }
            if !seen.insert(normalize_path(path)) {
                errors.push(ManifestError::DuplicatePath(path.to_string()));
            }
        }

        if !is_test_file(&self.test_file) {
            errors.push(ManifestError::InvalidTestFile(self.test_file.clone()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Whether `path` is declared by this manifest (or is the test file).
    pub fn declares(&self, path: &str) -> bool {
        let wanted = normalize_path(path);
        normalize_path(&self.test_file) == wanted
            || self.files.iter().any(|f| normalize_path(&f.path) == wanted)
    }

    /// Paths the task creates or modifies.
    pub fn writable_paths(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .filter(|f| f.action != FileAction::Delete)
            .map(|f| f.path.as_str())
    }

    pub fn action_for(&self, path: &str) -> Option<FileAction> {
        let wanted = normalize_path(path);
        self.files
            .iter()
            .find(|f| normalize_path(&f.path) == wanted)
            .map(|f| f.action)
    }
}

fn has_glob(path: &str) -> bool {
    path.contains(['*', '?', '[', ']', '{', '}'])
}

/// Strip `./` prefixes and normalise separators so paths compare equal.
pub fn normalize_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let mut rest = unified.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.to_string()
}

/// Whether a path names a test or spec file (`foo.test.ts`, `bar.spec.js`,
/// `baz_test.go`, `qux_spec.rb`).
pub fn is_test_file(path: &str) -> bool {
    let normalized = normalize_path(path);
    let name = normalized.rsplit('/').next().unwrap_or_default();
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return false;
    };
    if ext.is_empty() {
        return false;
    }
    stem.ends_with(".test")
        || stem.ends_with(".spec")
        || stem.ends_with("_test")
        || stem.ends_with("_spec")
}
