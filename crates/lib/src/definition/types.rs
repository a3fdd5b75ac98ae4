use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::GraphError;
use crate::op::{InvalidOp, Op};
use crate::platform::Platform;
use crate::state::VertexId;
use crate::util::hash::{Digest, HashError, Hashable};

/// Reference to one output of an op in the same definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputRef {
  pub digest: Digest,
  pub index: usize,
}

/// One op of a definition with its content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionOp {
  pub digest: Digest,
  pub inputs: Vec<InputRef>,
  pub op: Op,
}

/// The part of an op that its digest covers.
#[derive(Serialize)]
pub(crate) struct OpBody<'a> {
  pub inputs: &'a [InputRef],
  pub op: &'a Op,
}

impl Hashable for OpBody<'_> {}

impl DefinitionOp {
  /// Recompute the digest from the inputs and the op.
  pub fn compute_digest(&self) -> Result<Digest, HashError> {
    OpBody {
      inputs: &self.inputs,
      op: &self.op,
    }
    .compute_digest()
  }
}

/// The serialized DAG handed to the execution engine.
///
/// `ops` lists every op reachable from `root` once, parents before children.
/// Field order is the encoding order, so the platform annotation comes last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
  pub version: u32,
  pub ops: Vec<DefinitionOp>,
  /// `None` when the result is the empty filesystem.
  pub root: Option<InputRef>,
  pub platform: Platform,
}

/// Errors that abort serialization. No output is produced when one occurs.
#[derive(Debug, Error)]
pub enum MarshalError {
  /// An op cannot be encoded for the engine.
  #[error("cannot encode {kind} op `{description}`: {source}")]
  InvalidOp {
    kind: &'static str,
    description: String,
    #[source]
    source: InvalidOp,
  },

  /// A state refers to a vertex the graph does not contain.
  #[error("state refers to unknown vertex {0}")]
  UnknownVertex(VertexId),

  /// The root state does not belong to the graph being marshaled.
  #[error("cannot marshal root: {0}")]
  Root(#[source] GraphError),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
