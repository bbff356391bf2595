//! Path resolution confined to a workspace root.
//!
//! Rules, in order:
//! 1. `..` components are rejected outright.
//! 2. Relative paths are joined onto the root.
//! 3. The deepest existing ancestor is canonicalized (symlinks resolved)
//!    and the remaining components re-appended, so not-yet-created files
//!    can be checked too.
//! 4. The result must sit under the canonical root.
//! 5. It must not sit under any forbidden prefix (`~` expanded).

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Path '{path}' is outside the workspace")]
    OutsideWorkspace { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to resolve path '{path}': {reason}")]
    ResolveFailed { path: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct WorkspaceSandbox {
    root: PathBuf,
    forbidden: Vec<String>,
}

impl WorkspaceSandbox {
    pub fn new(root: impl Into<PathBuf>, forbidden: Vec<String>) -> Self {
        Self {
            root: root.into(),
            forbidden,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist yet.
    pub fn ensure_root(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    pub fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let input = Path::new(path);
        if input.components().any(|c| matches!(c, Component::ParentDir)) {
            tracing::warn!(path, "Rejected path traversal");
            return Err(SandboxError::PathTraversal { path: path.into() });
        }

        let root = self.root.canonicalize().map_err(|e| SandboxError::ResolveFailed {
            path: self.root.display().to_string(),
            reason: format!("workspace root: {e}"),
        })?;

        let joined = if input.is_absolute() {
            input.to_path_buf()
        } else {
            root.join(input)
        };
        let resolved = canonicalize_lenient(&joined).map_err(|e| SandboxError::ResolveFailed {
            path: path.into(),
            reason: e.to_string(),
        })?;

        if !resolved.starts_with(&root) {
            return Err(SandboxError::OutsideWorkspace { path: path.into() });
        }

        for pattern in &self.forbidden {
            let forbidden = PathBuf::from(expand_tilde(pattern));
            if resolved.starts_with(&forbidden) {
                return Err(SandboxError::ForbiddenPath {
                    path: path.into(),
                    pattern: pattern.clone(),
                });
            }
        }

        Ok(resolved)
    }
}

/// Canonicalize the deepest existing ancestor and re-append the rest.
fn canonicalize_lenient(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = path;
    let mut tail = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in tail.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

fn expand_tilde(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"));
        if let Ok(home) = home {
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}
