//! The build graph and its operation builders.
//!
//! A [`Graph`] is an append-only arena of [`Vertex`] values plus a
//! content-identity map from vertex to id. Every builder interns the vertex
//! it creates: building the same operation on the same inputs twice returns
//! the same vertex, which is what lets independent stages share a prefix.
//!
//! # Builders
//!
//! - [`Graph::image`] - fetch a base image
//! - [`Graph::local`] - the caller's workspace
//! - [`Graph::run`] - run a command over mounted filesystems
//! - [`Graph::copy`] - copy a path between filesystems
//! - [`Graph::merge`] - overlay filesystems, later ones winning
//!
//! Directory and environment changes live on [`State`] itself.

pub mod image;
mod run;
mod types;

pub use run::*;
pub use types::*;

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use crate::consts::DEFAULT_PATH_ENV;
use crate::op::{CopyInfo, CopyOp, ExecMeta, ExecOp, MergeOp, MountOp, Op, SourceOp};
use crate::state::{GraphId, Output, State, StateMeta, VertexId};
use crate::util::path;

#[derive(Debug)]
pub struct Graph {
  id: GraphId,
  vertices: Vec<Vertex>,
  index: HashMap<Vertex, VertexId>,
}

/// Collects a vertex's inputs, reusing the slot of a repeated output.
#[derive(Default)]
struct Inputs {
  outputs: Vec<Output>,
}

impl Inputs {
  fn slot(&mut self, state: &State) -> Option<usize> {
    let output = state.output()?;
    match self.outputs.iter().position(|o| *o == output) {
      Some(i) => Some(i),
      None => {
        self.outputs.push(output);
        Some(self.outputs.len() - 1)
      }
    }
  }
}

impl Default for Graph {
  fn default() -> Self {
    Self {
      id: GraphId::next(),
      vertices: Vec::new(),
      index: HashMap::new(),
    }
  }
}

impl Graph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Identity of this graph; every state it builds carries it.
  pub fn id(&self) -> GraphId {
    self.id
  }

  /// Number of distinct vertices.
  pub fn len(&self) -> usize {
    self.vertices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vertices.is_empty()
  }

  pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
    self.vertices.get(id.0)
  }

  /// All vertices in creation order, which is also a topological order.
  pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex)> {
    self.vertices.iter().enumerate().map(|(i, v)| (VertexId(i), v))
  }

  /// Fetch a base image. The result has no parents.
  pub fn image(&mut self, reference: &str) -> Result<State, GraphError> {
    let normalized = image::normalize_reference(reference)?;
    let op = Op::Source(SourceOp {
      identifier: format!("docker-image://{}", normalized),
      attrs: BTreeMap::new(),
    });
    let id = self.intern(Vertex { op, inputs: Vec::new() });
    Ok(State::new(self.output(id, 0), StateMeta::default()))
  }

  /// The caller's workspace, transferred by the engine under `name`.
  pub fn local(&mut self, name: &str) -> Result<State, GraphError> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == '/') {
      return Err(GraphError::InvalidLocalName { name: name.to_string() });
    }
    let op = Op::Source(SourceOp {
      identifier: format!("local://{}", name),
      attrs: BTreeMap::from([("local.sharedkeyhint".to_string(), name.to_string())]),
    });
    let id = self.intern(Vertex { op, inputs: Vec::new() });
    Ok(State::new(self.output(id, 0), StateMeta::default()))
  }

  /// Run a command on top of `base`.
  ///
  /// The command sees `base` at `/` plus every mount in `opts`. Its
  /// environment is the base state's environment with the overrides applied,
  /// and a default `PATH` when neither sets one.
  ///
  /// # Errors
  ///
  /// `EmptyArgs` if `opts.args` is empty or its first element is empty.
  pub fn run(&mut self, base: &State, opts: RunOptions) -> Result<ExecState, GraphError> {
    let RunOptions { args, mounts, env, cwd } = opts;
    if args.first().is_none_or(|a| a.is_empty()) {
      return Err(GraphError::EmptyArgs);
    }

    self.check(base)?;
    for mount in &mounts {
      self.check(&mount.source)?;
    }

    let mut merged_env = base.env().clone();
    merged_env.extend(env);
    merged_env
      .entry("PATH".to_string())
      .or_insert_with(|| DEFAULT_PATH_ENV.to_string());

    let cwd = match cwd {
      Some(cwd) => path::join(base.get_dir(), &cwd),
      None => base.get_dir().to_string(),
    };

    let mut inputs = Inputs::default();
    let mut mount_ops = vec![MountOp {
      input: inputs.slot(base),
      selector: None,
      dest: "/".to_string(),
      output: Some(0),
      readonly: false,
    }];
    let mut exec_mounts = Vec::with_capacity(mounts.len());
    let mut next_output = 1;

    for mount in mounts {
      let output = if mount.readonly {
        None
      } else {
        next_output += 1;
        Some(next_output - 1)
      };
      mount_ops.push(MountOp {
        input: inputs.slot(&mount.source),
        selector: mount.selector.map(|s| path::join("/", &s)),
        dest: mount.target.clone(),
        output,
        readonly: mount.readonly,
      });
      exec_mounts.push(ExecMount {
        target: mount.target,
        output,
      });
    }

    let op = Op::Exec(ExecOp {
      meta: ExecMeta {
        args,
        env: merged_env.iter().map(|(k, v)| format!("{}={}", k, v)).collect(),
        cwd,
      },
      mounts: mount_ops,
    });
    let id = self.intern(Vertex {
      op,
      inputs: inputs.outputs,
    });

    Ok(ExecState {
      graph: self.id,
      vertex: id,
      root: State::new(self.output(id, 0), base.meta().clone()),
      mounts: exec_mounts,
    })
  }

  /// Copy `src_path` from `src` to `dest_path` on top of `dest`.
  ///
  /// Relative paths are resolved against each state's working directory.
  /// `dest` may be scratch, which extracts just the copied path.
  pub fn copy(
    &mut self,
    src: &State,
    src_path: &str,
    dest: &State,
    dest_path: &str,
    info: CopyInfo,
  ) -> Result<State, GraphError> {
    self.check(src)?;
    self.check(dest)?;

    let mut inputs = Inputs::default();
    let dest_input = inputs.slot(dest);
    let src_input = inputs.slot(src);

    let op = Op::Copy(CopyOp {
      dest_input,
      src_input,
      src: resolve(src.get_dir(), src_path),
      dest: resolve(dest.get_dir(), dest_path),
      info,
    });
    let id = self.intern(Vertex {
      op,
      inputs: inputs.outputs,
    });
    Ok(State::new(self.output(id, 0), dest.meta().clone()))
  }

  /// Overlay `states` in order; on conflicting paths the later state wins.
  ///
  /// Scratch states contribute nothing and are skipped. With no remaining
  /// states the result is scratch, with one it is that state.
  pub fn merge(&mut self, states: &[State]) -> Result<State, GraphError> {
    let layers: Vec<&State> = states.iter().filter(|s| !s.is_scratch()).collect();
    for layer in &layers {
      self.check(layer)?;
    }

    match layers.as_slice() {
      [] => Ok(State::scratch()),
      [single] => Ok((*single).clone()),
      _ => {
        let mut inputs = Inputs::default();
        let order = layers.iter().filter_map(|s| inputs.slot(s)).collect();
        let id = self.intern(Vertex {
          op: Op::Merge(MergeOp { inputs: order }),
          inputs: inputs.outputs,
        });
        Ok(State::new(self.output(id, 0), StateMeta::default()))
      }
    }
  }

  /// Return the id of an identical vertex, or append this one.
  fn intern(&mut self, vertex: Vertex) -> VertexId {
    if let Some(&id) = self.index.get(&vertex) {
      trace!(vertex = %id, kind = vertex.op.kind(), "reused existing vertex");
      return id;
    }

    let id = VertexId(self.vertices.len());
    debug!(vertex = %id, kind = vertex.op.kind(), op = %vertex.op.describe(), "added vertex");
    self.index.insert(vertex.clone(), id);
    self.vertices.push(vertex);
    id
  }

  fn output(&self, vertex: VertexId, index: usize) -> Output {
    Output {
      graph: self.id,
      vertex,
      index,
    }
  }

  /// Make sure a state belongs to this graph.
  pub(crate) fn check(&self, state: &State) -> Result<(), GraphError> {
    let Some(output) = state.output() else {
      return Ok(());
    };
    if output.graph != self.id {
      return Err(GraphError::ForeignState {
        vertex: output.vertex,
        graph: output.graph,
      });
    }
    let vertex = self
      .vertices
      .get(output.vertex.0)
      .ok_or(GraphError::UnknownVertex(output.vertex))?;
    if output.index >= vertex.op.output_count() {
      return Err(GraphError::UnknownOutput {
        vertex: output.vertex,
        index: output.index,
      });
    }
    Ok(())
  }
}

fn resolve(dir: &str, p: &str) -> String {
  // Empty paths are kept so marshaling can reject them.
  if p.is_empty() { String::new() } else { path::join(dir, p) }
}
