//! The caller's project directory.
//!
//! The graph only names the workspace through a local context; the engine
//! transfers its content. Locally we resolve the root once and check that the
//! files the pipeline depends on exist before anything is written.

use std::fs;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::util::hash::{ContentHash, hash_bytes};

#[derive(Debug, Error)]
pub enum WorkspaceError {
  #[error("workspace {path} not found: {message}")]
  NotFound { path: String, message: String },

  #[error("workspace {0} is not a directory")]
  NotADirectory(String),

  /// The path is absolute or climbs out of the workspace.
  #[error("{path} is outside the workspace")]
  OutsideWorkspace { path: String },

  #[error("manifest {path} not found in workspace")]
  MissingManifest { path: String },

  #[error("failed to read {path}: {message}")]
  Read { path: String, message: String },
}

/// A canonicalized workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
  root: PathBuf,
}

/// What was found in a dependency manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestInfo {
  pub path: PathBuf,
  pub lines: usize,
  /// Lines that are neither blank nor comments.
  pub entries: usize,
  pub hash: ContentHash,
}

impl Workspace {
  pub fn open(path: &Path) -> Result<Self, WorkspaceError> {
    let root = dunce::canonicalize(path).map_err(|e| WorkspaceError::NotFound {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    if !root.is_dir() {
      return Err(WorkspaceError::NotADirectory(root.display().to_string()));
    }
    debug!(root = %root.display(), "opened workspace");
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Resolve a workspace-relative path without leaving the workspace.
  pub fn file(&self, relative: &str) -> Result<PathBuf, WorkspaceError> {
    let candidate = Path::new(relative);
    let escapes = candidate
      .components()
      .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.is_empty() || escapes {
      return Err(WorkspaceError::OutsideWorkspace {
        path: relative.to_string(),
      });
    }
    Ok(self.root.join(candidate))
  }

  /// Read a dependency manifest such as `requirements.txt`.
  pub fn manifest(&self, relative: &str) -> Result<ManifestInfo, WorkspaceError> {
    let path = self.file(relative)?;
    if !path.is_file() {
      return Err(WorkspaceError::MissingManifest {
        path: relative.to_string(),
      });
    }

    let content = fs::read(&path).map_err(|e| WorkspaceError::Read {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    let text = String::from_utf8_lossy(&content);
    let lines = text.lines().count();
    let entries = text
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty() && !line.starts_with('#'))
      .count();

    let info = ManifestInfo {
      path,
      lines,
      entries,
      hash: hash_bytes(&content),
    };
    debug!(manifest = %info.path.display(), lines, entries, "read manifest");
    Ok(info)
  }
}
