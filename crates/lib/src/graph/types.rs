use thiserror::Error;

use crate::op::Op;
use crate::state::{GraphId, Output, VertexId};

/// An interned node: an op plus the outputs it reads.
///
/// Two vertices with the same op and the same inputs are the same vertex.
/// Inputs always refer to vertices created earlier, so a graph can never
/// contain a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Vertex {
  pub op: Op,
  pub inputs: Vec<Output>,
}

/// Errors raised while building states.
///
/// These reject the builder call; no vertex is created.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
  /// A run operation was given no arguments.
  #[error("run command needs at least one argument")]
  EmptyArgs,

  /// A shell-style command string could not be split.
  #[error("cannot split command {command:?}: unbalanced quotes or trailing escape")]
  UnparsableCommand { command: String },

  #[error("invalid image reference {reference:?}: {reason}")]
  InvalidImageRef { reference: String, reason: String },

  #[error("invalid local context name {name:?}")]
  InvalidLocalName { name: String },

  /// A state refers to a vertex this graph does not contain.
  #[error("state refers to unknown vertex {0}")]
  UnknownVertex(VertexId),

  /// A state was built by a different graph.
  #[error("state refers to vertex {vertex} of another graph ({graph:?})")]
  ForeignState { vertex: VertexId, graph: GraphId },

  /// A state names an output its vertex does not have.
  #[error("vertex {vertex} has no output {index}")]
  UnknownOutput { vertex: VertexId, index: usize },

  #[error("no mount at {target}")]
  NoSuchMount { target: String },

  /// Read-only mounts have no output state.
  #[error("mount at {target} is read-only and has no output")]
  ReadonlyMount { target: String },
}
