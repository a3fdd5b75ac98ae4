//! Serialized, platform-targeted build definitions.
//!
//! [`marshal`] walks the part of a [`Graph`] reachable from one state and
//! emits every distinct vertex exactly once, parents first. Each op is
//! identified by the digest of its canonical JSON form with inputs referenced
//! by digest, so equal subgraphs always get equal digests.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "version": 1,
//!   "ops": [
//!     { "digest": "sha256:...", "inputs": [], "op": { "source": { ... } } },
//!     { "digest": "sha256:...", "inputs": [{ "digest": "sha256:...", "index": 0 }], "op": { "exec": { ... } } }
//!   ],
//!   "root": { "digest": "sha256:...", "index": 0 },
//!   "platform": { "os": "linux", "architecture": "amd64" }
//! }
//! ```
//!
//! # Submodules
//!
//! - [`dag`] - well-formedness checks and execution waves for a definition

pub mod dag;
mod types;

pub use types::*;

use std::collections::{BTreeSet, HashMap};
use std::io::Write;

use tracing::debug;

use crate::consts::DEFINITION_VERSION;
use crate::graph::Graph;
use crate::platform::Platform;
use crate::state::{State, VertexId};
use crate::util::hash::{Digest, Hashable};

/// Serialize everything reachable from `root`, pinned to `platform`.
///
/// A scratch root produces a definition with no ops.
///
/// # Errors
///
/// Fails without producing anything if an op cannot be encoded (relative
/// mount target, empty copy path, ...) or if `root` is not part of `graph`.
pub fn marshal(graph: &Graph, root: &State, platform: Platform) -> Result<Definition, MarshalError> {
  let Some(root_output) = root.output() else {
    return Ok(Definition {
      version: DEFINITION_VERSION,
      ops: Vec::new(),
      root: None,
      platform,
    });
  };

  graph.check(root).map_err(MarshalError::Root)?;
  let reachable = reachable_from(graph, root_output.vertex)?;

  let mut digests: HashMap<VertexId, Digest> = HashMap::with_capacity(reachable.len());
  let mut ops = Vec::with_capacity(reachable.len());

  // Inputs always point at earlier vertices, so ascending ids are a
  // topological order.
  for id in reachable {
    let vertex = graph.vertex(id).ok_or(MarshalError::UnknownVertex(id))?;
    vertex
      .op
      .validate(vertex.inputs.len())
      .map_err(|source| MarshalError::InvalidOp {
        kind: vertex.op.kind(),
        description: vertex.op.describe(),
        source,
      })?;

    let inputs = vertex
      .inputs
      .iter()
      .map(|input| {
        digests
          .get(&input.vertex)
          .map(|digest| InputRef {
            digest: digest.clone(),
            index: input.index,
          })
          .ok_or(MarshalError::UnknownVertex(input.vertex))
      })
      .collect::<Result<Vec<_>, _>>()?;

    let digest = OpBody {
      inputs: &inputs,
      op: &vertex.op,
    }
    .compute_digest()?;

    debug!(vertex = %id, digest = %digest.short(), kind = vertex.op.kind(), "marshaled op");
    digests.insert(id, digest.clone());
    ops.push(DefinitionOp {
      digest,
      inputs,
      op: vertex.op.clone(),
    });
  }

  let root_digest = digests
    .get(&root_output.vertex)
    .cloned()
    .ok_or(MarshalError::UnknownVertex(root_output.vertex))?;

  Ok(Definition {
    version: DEFINITION_VERSION,
    ops,
    root: Some(InputRef {
      digest: root_digest,
      index: root_output.index,
    }),
    platform,
  })
}

/// Depth-first collection of every vertex `start` depends on, including itself.
fn reachable_from(graph: &Graph, start: VertexId) -> Result<BTreeSet<VertexId>, MarshalError> {
  let mut seen = BTreeSet::new();
  let mut stack = vec![start];

  while let Some(id) = stack.pop() {
    if !seen.insert(id) {
      continue;
    }
    let vertex = graph.vertex(id).ok_or(MarshalError::UnknownVertex(id))?;
    for input in &vertex.inputs {
      if input.vertex >= id {
        return Err(MarshalError::UnknownVertex(input.vertex));
      }
      stack.push(input.vertex);
    }
  }

  Ok(seen)
}

impl Definition {
  /// Compact JSON bytes. Serializing the same definition twice gives
  /// identical bytes.
  pub fn to_bytes(&self) -> Result<Vec<u8>, MarshalError> {
    Ok(serde_json::to_vec(self)?)
  }

  pub fn to_pretty_bytes(&self) -> Result<Vec<u8>, MarshalError> {
    let mut bytes = serde_json::to_vec_pretty(self)?;
    bytes.push(b'\n');
    Ok(bytes)
  }

  /// Serialize fully, then write the bytes in one call.
  ///
  /// Nothing is written if serialization fails.
  pub fn write_to(&self, writer: &mut impl Write, pretty: bool) -> Result<(), MarshalError> {
    let bytes = if pretty { self.to_pretty_bytes()? } else { self.to_bytes()? };
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
  }

  /// Decode a definition produced by [`Definition::to_bytes`].
  ///
  /// Only the encoding is checked; use [`dag::DefinitionDag::from_definition`]
  /// to verify digests and structure.
  pub fn from_slice(bytes: &[u8]) -> Result<Self, MarshalError> {
    Ok(serde_json::from_slice(bytes)?)
  }

  /// Look up an op by digest.
  pub fn op(&self, digest: &Digest) -> Option<&DefinitionOp> {
    self.ops.iter().find(|op| &op.digest == digest)
  }

  /// The op the root reference points at.
  pub fn root_op(&self) -> Option<&DefinitionOp> {
    self.root.as_ref().and_then(|root| self.op(&root.digest))
  }
}
