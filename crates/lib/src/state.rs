//! Immutable filesystem states.
//!
//! A [`State`] names one output of one vertex in a [`Graph`](crate::graph::Graph)
//! (or scratch, the empty filesystem) together with the metadata that later
//! operations inherit: the working directory and the environment.
//!
//! States are values. Setting the directory or an env var returns a new
//! state and never creates a vertex; the metadata is baked into the next run
//! operation built on top of the state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::util::path;

/// Identity of one [`Graph`](crate::graph::Graph) instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GraphId(pub(crate) usize);

impl GraphId {
  /// A fresh id, distinct from every other id handed out in this process.
  pub(crate) fn next() -> Self {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    Self(NEXT.fetch_add(1, Ordering::Relaxed))
  }
}

/// Index of a vertex inside its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(pub(crate) usize);

impl VertexId {
  pub fn index(self) -> usize {
    self.0
  }
}

impl std::fmt::Display for VertexId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "v{}", self.0)
  }
}

/// One output of a vertex, tagged with the graph that owns the vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Output {
  pub graph: GraphId,
  pub vertex: VertexId,
  pub index: usize,
}

/// Metadata inherited by operations built on a state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateMeta {
  pub dir: Option<String>,
  /// Keys are unique; `BTreeMap` keeps the encoding independent of
  /// insertion order.
  pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct State {
  output: Option<Output>,
  meta: StateMeta,
}

impl State {
  /// The empty filesystem.
  pub fn scratch() -> Self {
    Self::default()
  }

  pub(crate) fn new(output: Output, meta: StateMeta) -> Self {
    Self {
      output: Some(output),
      meta,
    }
  }

  pub fn output(&self) -> Option<Output> {
    self.output
  }

  pub fn is_scratch(&self) -> bool {
    self.output.is_none()
  }

  pub fn meta(&self) -> &StateMeta {
    &self.meta
  }

  /// Set the working directory. Relative paths are joined onto the current one.
  pub fn with_dir(mut self, dir: &str) -> Self {
    self.meta.dir = Some(path::join(self.get_dir(), dir));
    self
  }

  /// Set an environment variable, replacing any previous value.
  pub fn with_env(mut self, key: &str, value: &str) -> Self {
    self.meta.env.insert(key.to_string(), value.to_string());
    self
  }

  /// The working directory, `/` when none was set.
  pub fn get_dir(&self) -> &str {
    self.meta.dir.as_deref().unwrap_or("/")
  }

  pub fn get_env(&self, key: &str) -> Option<&str> {
    self.meta.env.get(key).map(|v| v.as_str())
  }

  pub fn env(&self) -> &BTreeMap<String, String> {
    &self.meta.env
  }
}
