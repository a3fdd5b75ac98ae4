use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A filesystem transformation recorded in a vertex.
///
/// Input references inside an op (`input`, `dest_input`, ...) are indices
/// into the owning vertex's input list. `None` means scratch, the empty
/// filesystem.
///
/// # Variants
///
/// - [`Source`](Op::Source): a root filesystem with no inputs (image or local context)
/// - [`Exec`](Op::Exec): run a command over a root mount plus extra mounts
/// - [`Copy`](Op::Copy): copy a path from one filesystem into another
/// - [`Merge`](Op::Merge): overlay several filesystems, later inputs winning
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
  Source(SourceOp),
  Exec(ExecOp),
  Copy(CopyOp),
  Merge(MergeOp),
}

/// A source filesystem identified by a URI-like string.
///
/// - `docker-image://docker.io/library/alpine:latest`
/// - `local://working-dir`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceOp {
  pub identifier: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub attrs: BTreeMap<String, String>,
}

/// Process parameters of an exec op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecMeta {
  pub args: Vec<String>,
  /// `KEY=VALUE` entries, sorted by key.
  pub env: Vec<String>,
  pub cwd: String,
}

/// One filesystem mounted into an exec op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MountOp {
  pub input: Option<usize>,
  /// Sub-path of the input that is mounted, `None` for its root.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub selector: Option<String>,
  pub dest: String,
  /// Output index this mount produces; read-only mounts produce none.
  pub output: Option<usize>,
  pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecOp {
  pub meta: ExecMeta,
  /// The first mount is always the root filesystem at `/` (output 0).
  pub mounts: Vec<MountOp>,
}

/// Flags controlling how a copy resolves its source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopyInfo {
  pub allow_wildcard: bool,
  pub create_dest_path: bool,
  pub attempt_unpack: bool,
}

impl CopyInfo {
  /// Wildcards, unpacking and parent creation all enabled, as used when
  /// extracting a stage output into scratch.
  pub fn extract() -> Self {
    Self {
      allow_wildcard: true,
      create_dest_path: true,
      attempt_unpack: true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopyOp {
  pub dest_input: Option<usize>,
  pub src_input: Option<usize>,
  pub src: String,
  pub dest: String,
  pub info: CopyInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MergeOp {
  /// Input indices in overlay order; the last one wins on conflicts.
  pub inputs: Vec<usize>,
}

/// A path or parameter that cannot be encoded for the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidOp {
  #[error("path {path:?} must be absolute")]
  RelativePath { path: String },

  #[error("path must not be empty")]
  EmptyPath,

  #[error("path {path:?} contains a NUL byte")]
  NulByte { path: String },

  #[error("exec has no arguments")]
  EmptyArgs,

  #[error("malformed env entry {entry:?}")]
  MalformedEnv { entry: String },

  #[error("mount target {dest} is used more than once")]
  DuplicateMount { dest: String },

  #[error("exec must mount its root filesystem at / first")]
  MissingRootMount,

  #[error("source identifier {identifier:?} has no scheme")]
  MalformedIdentifier { identifier: String },

  #[error("input index {index} out of bounds (have {count})")]
  InputOutOfBounds { index: usize, count: usize },

  #[error("merge needs at least one input")]
  EmptyMerge,
}
