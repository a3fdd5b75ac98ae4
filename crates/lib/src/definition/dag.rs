//! Dependency DAG of a serialized definition.
//!
//! Used to check that a definition is well formed before it is handed to the
//! engine (or after it is read back), and to compute the parallel execution
//! waves the engine is free to use.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::op::InvalidOp;
use crate::util::hash::Digest;

use super::Definition;

/// Reasons a definition is not a well-formed DAG.
#[derive(Debug, Error)]
pub enum DagError {
  #[error("op {0} appears more than once")]
  DuplicateOp(Digest),

  #[error("op {op} references missing input {input}")]
  DanglingInput { op: Digest, input: Digest },

  #[error("op {op} is listed before its input {input}")]
  OutOfOrder { op: Digest, input: Digest },

  #[error("op {op} has no output {index} on input {input}")]
  MissingOutput { op: Digest, input: Digest, index: usize },

  #[error("root references missing op {0}")]
  DanglingRoot(Digest),

  #[error("root references output {index} of {root}, which has no such output")]
  DanglingRootOutput { root: Digest, index: usize },

  #[error("digest mismatch: listed {listed}, computed {computed}")]
  DigestMismatch { listed: Digest, computed: Digest },

  #[error("op {op} is invalid: {source}")]
  InvalidOp {
    op: Digest,
    #[source]
    source: InvalidOp,
  },

  #[error("dependency cycle detected")]
  CycleDetected,

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

/// A DAG over the ops of a definition, edges from input to dependent.
pub struct DefinitionDag {
  graph: DiGraph<Digest, ()>,
  nodes: HashMap<Digest, NodeIndex>,
}

impl DefinitionDag {
  /// Build and verify the DAG of `definition`.
  ///
  /// # Errors
  ///
  /// Fails if any op is duplicated, listed before one of its inputs, has a
  /// digest that does not match its content, references an input or output
  /// that does not exist, or if the root is dangling.
  pub fn from_definition(definition: &Definition) -> Result<Self, DagError> {
    let mut graph = DiGraph::new();
    let mut nodes: HashMap<Digest, NodeIndex> = HashMap::new();
    let mut output_counts: HashMap<&Digest, usize> = HashMap::new();

    for op in &definition.ops {
      let computed = op.compute_digest()?;
      if computed != op.digest {
        return Err(DagError::DigestMismatch {
          listed: op.digest.clone(),
          computed,
        });
      }
      op.op.validate(op.inputs.len()).map_err(|source| DagError::InvalidOp {
        op: op.digest.clone(),
        source,
      })?;

      if nodes.contains_key(&op.digest) {
        return Err(DagError::DuplicateOp(op.digest.clone()));
      }

      let idx = graph.add_node(op.digest.clone());

      for input in &op.inputs {
        let Some(&input_idx) = nodes.get(&input.digest) else {
          let known_later = definition.ops.iter().any(|o| o.digest == input.digest);
          return Err(if known_later {
            DagError::OutOfOrder {
              op: op.digest.clone(),
              input: input.digest.clone(),
            }
          } else {
            DagError::DanglingInput {
              op: op.digest.clone(),
              input: input.digest.clone(),
            }
          });
        };
        if input.index >= output_counts[&input.digest] {
          return Err(DagError::MissingOutput {
            op: op.digest.clone(),
            input: input.digest.clone(),
            index: input.index,
          });
        }
        graph.add_edge(input_idx, idx, ());
      }

      nodes.insert(op.digest.clone(), idx);
      output_counts.insert(&op.digest, op.op.output_count());
    }

    if let Some(root) = &definition.root {
      let Some(&count) = output_counts.get(&root.digest) else {
        return Err(DagError::DanglingRoot(root.digest.clone()));
      };
      if root.index >= count {
        return Err(DagError::DanglingRootOutput {
          root: root.digest.clone(),
          index: root.index,
        });
      }
    }

    let dag = Self { graph, nodes };
    dag.verify_acyclic()?;
    Ok(dag)
  }

  fn verify_acyclic(&self) -> Result<(), DagError> {
    toposort(&self.graph, None).map_err(|_| DagError::CycleDetected)?;
    Ok(())
  }

  /// Number of ops.
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Ops in an order where inputs come before dependents.
  pub fn topological_order(&self) -> Result<Vec<Digest>, DagError> {
    let sorted = toposort(&self.graph, None).map_err(|_| DagError::CycleDetected)?;
    Ok(sorted.into_iter().map(|idx| self.graph[idx].clone()).collect())
  }

  /// Direct inputs of an op, without duplicates.
  pub fn dependencies(&self, digest: &Digest) -> Vec<Digest> {
    let Some(&idx) = self.nodes.get(digest) else {
      return Vec::new();
    };

    let mut deps: Vec<Digest> = self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep].clone())
      .collect::<HashSet<_>>()
      .into_iter()
      .collect();
    deps.sort();
    deps
  }

  /// Group ops into waves; every op's inputs are in earlier waves.
  ///
  /// Ops within a wave are independent and sorted by digest.
  pub fn waves(&self) -> Result<Vec<Vec<Digest>>, DagError> {
    // Kahn's algorithm, one level at a time
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|&&idx| in_degree[&idx] == 0).copied().collect();

      if ready.is_empty() {
        return Err(DagError::CycleDetected);
      }

      for &idx in &ready {
        remaining.remove(&idx);
        // neighbors_directed yields one entry per edge, matching the in-degree count
        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      let mut wave: Vec<Digest> = ready.into_iter().map(|idx| self.graph[idx].clone()).collect();
      wave.sort();
      waves.push(wave);
    }

    Ok(waves)
  }
}
