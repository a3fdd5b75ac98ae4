use std::collections::BTreeMap;

use crate::state::{GraphId, Output, State, StateMeta, VertexId};
use crate::util::path;

use super::GraphError;

/// A filesystem bound into a run operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
  pub target: String,
  pub source: State,
  /// Sub-path of `source` to mount instead of its root.
  pub selector: Option<String>,
  pub readonly: bool,
}

impl Mount {
  /// A read-write mount of `source` at `target`.
  pub fn new(target: &str, source: &State) -> Self {
    Self {
      target: target.to_string(),
      source: source.clone(),
      selector: None,
      readonly: false,
    }
  }

  pub fn readonly(mut self) -> Self {
    self.readonly = true;
    self
  }

  pub fn with_selector(mut self, selector: &str) -> Self {
    self.selector = Some(selector.to_string());
    self
  }
}

/// Parameters of a run operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
  pub args: Vec<String>,
  pub mounts: Vec<Mount>,
  /// Overrides applied on top of the base state's environment.
  pub env: BTreeMap<String, String>,
  /// Overrides the base state's working directory.
  pub cwd: Option<String>,
}

impl RunOptions {
  pub fn new<I, S>(args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      args: args.into_iter().map(Into::into).collect(),
      ..Self::default()
    }
  }

  /// Split a shell-style command line into arguments.
  ///
  /// The command is not run through a shell; quotes only group words.
  pub fn shell(command: &str) -> Result<Self, GraphError> {
    let args = shlex::split(command).ok_or_else(|| GraphError::UnparsableCommand {
      command: command.to_string(),
    })?;
    Ok(Self::new(args))
  }

  pub fn with_mount(mut self, mount: Mount) -> Self {
    self.mounts.push(mount);
    self
  }

  pub fn with_env(mut self, key: &str, value: &str) -> Self {
    self.env.insert(key.to_string(), value.to_string());
    self
  }

  pub fn with_cwd(mut self, cwd: &str) -> Self {
    self.cwd = Some(cwd.to_string());
    self
  }
}

impl TryFrom<&str> for RunOptions {
  type Error = GraphError;

  fn try_from(command: &str) -> Result<Self, Self::Error> {
    RunOptions::shell(command)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExecMount {
  pub target: String,
  pub output: Option<usize>,
}

/// The result of a run operation.
///
/// [`root`](Self::root) is the usual continuation; read-write mounts can be
/// retrieved with [`get_mount`](Self::get_mount).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecState {
  pub(crate) graph: GraphId,
  pub(crate) vertex: VertexId,
  pub(crate) root: State,
  pub(crate) mounts: Vec<ExecMount>,
}

impl ExecState {
  pub fn vertex(&self) -> VertexId {
    self.vertex
  }

  /// The root filesystem after the command ran, with the base state's metadata.
  pub fn root(&self) -> State {
    self.root.clone()
  }

  /// The filesystem of the read-write mount at `target` after the command ran.
  pub fn get_mount(&self, target: &str) -> Result<State, GraphError> {
    let wanted = path::normalize(target);
    let mount = self
      .mounts
      .iter()
      .find(|m| path::normalize(&m.target) == wanted)
      .ok_or_else(|| GraphError::NoSuchMount {
        target: target.to_string(),
      })?;

    match mount.output {
      Some(index) => Ok(State::new(
        Output {
          graph: self.graph,
          vertex: self.vertex,
          index,
        },
        StateMeta::default(),
      )),
      None => Err(GraphError::ReadonlyMount {
        target: target.to_string(),
      }),
    }
  }

  /// Find the output holding `subpath` after the command ran.
  ///
  /// Returns the state of the deepest read-write mount containing `subpath`
  /// (or the root) and `subpath` relative to that state.
  pub fn output_for(&self, subpath: &str) -> (State, String) {
    let best = self
      .mounts
      .iter()
      .filter_map(|m| {
        let index = m.output?;
        let rest = path::strip_prefix(subpath, &m.target)?;
        Some((path::normalize(&m.target).len(), index, rest))
      })
      .max_by_key(|(depth, _, _)| *depth);

    match best {
      Some((_, index, rest)) => (
        State::new(
          Output {
            graph: self.graph,
            vertex: self.vertex,
            index,
          },
          StateMeta::default(),
        ),
        rest,
      ),
      None => (self.root(), path::normalize(subpath)),
    }
  }
}
