//! Pipeline assembly.
//!
//! [`assemble`] turns a [`PipelineConfig`] into one terminal [`State`] per
//! stage. Every stage is built from the top as if it were alone: fetch the
//! image, install system packages, copy the dependency manifest out of the
//! workspace, install dependencies, then run the stage's own setup and steps
//! and extract its output into scratch at the export path.
//!
//! Stages share nothing explicitly. The common prefix collapses into single
//! vertices because [`Graph`] interns identical operations.

pub mod config;

pub use config::{BaseConfig, PipelineConfig, StageConfig, StepConfig, WorkspaceMount, resolve_config_path};

use thiserror::Error;
use tracing::{debug, info};

use crate::graph::{ExecState, Graph, GraphError, Mount, RunOptions};
use crate::op::CopyInfo;
use crate::state::State;
use crate::util::path;

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("failed to read config {path}: {message}")]
  Read { path: String, message: String },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid pipeline config: {0}")]
  InvalidConfig(String),

  /// Building the shared base failed.
  #[error("base: {0}")]
  Base(#[source] GraphError),

  #[error("stage {stage:?}: {source}")]
  Stage {
    stage: String,
    #[source]
    source: GraphError,
  },
}

/// One assembled stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
  pub name: String,
  /// Scratch with the stage output copied to `export_path`.
  pub state: State,
  /// Where the output lived in the stage's work filesystem.
  pub output_path: String,
  pub export_path: String,
}

/// The assembled stages, in config order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
  pub stages: Vec<Stage>,
}

impl Pipeline {
  pub fn stage(&self, name: &str) -> Option<&Stage> {
    self.stages.iter().find(|s| s.name == name)
  }

  pub fn states(&self) -> Vec<State> {
    self.stages.iter().map(|s| s.state.clone()).collect()
  }
}

/// Assemble every stage of `config` into `graph`.
///
/// # Errors
///
/// Fails if the config is invalid or any operation cannot be constructed
/// (bad image reference, a command that is empty or cannot be split).
pub fn assemble(graph: &mut Graph, config: &PipelineConfig) -> Result<Pipeline, PipelineError> {
  config.validate()?;

  let before = graph.len();
  let mut stages = Vec::with_capacity(config.stages.len());
  for stage in &config.stages {
    let assembled = assemble_stage(graph, &config.base, stage)?;
    debug!(stage = %assembled.name, export = %assembled.export_path, "assembled stage");
    stages.push(assembled);
  }

  info!(
    stages = stages.len(),
    vertices = graph.len() - before,
    "assembled pipeline"
  );
  Ok(Pipeline { stages })
}

/// The prefix every stage starts with: dependencies installed over the
/// system packages, working directory set.
fn base_state(graph: &mut Graph, base: &BaseConfig) -> Result<State, GraphError> {
  let image = graph.image(&base.image)?.with_dir(&base.workdir);
  let system = graph.run(&image, RunOptions::shell(&base.system_install)?)?.root();

  let context = graph.local(&base.context)?;
  let manifest_path = path::join("/", &base.manifest);
  let manifest = graph.copy(
    &context,
    &manifest_path,
    &State::scratch(),
    &manifest_path,
    CopyInfo::extract(),
  )?;

  let install = RunOptions::shell(&base.dependency_install)?.with_mount(Mount::new(&base.workdir, &manifest).readonly());
  Ok(graph.run(&system, install)?.root())
}

fn assemble_stage(graph: &mut Graph, base: &BaseConfig, stage: &StageConfig) -> Result<Stage, PipelineError> {
  let stage_err = |source| PipelineError::Stage {
    stage: stage.name.clone(),
    source,
  };

  let mut current = base_state(graph, base).map_err(PipelineError::Base)?;
  for command in &stage.setup {
    let opts = RunOptions::shell(command).map_err(stage_err)?;
    current = graph.run(&current, opts).map_err(stage_err)?.root();
  }

  let mut workspace = graph.local(&base.context).map_err(stage_err)?;
  let mut last: Option<ExecState> = None;
  for step in &stage.steps {
    let mut opts = RunOptions::shell(&step.run).map_err(stage_err)?;
    for (key, value) in &step.env {
      opts = opts.with_env(key, value);
    }
    opts = match step.workspace {
      WorkspaceMount::ReadWrite => opts.with_mount(Mount::new(&base.workdir, &workspace)),
      WorkspaceMount::ReadOnly => opts.with_mount(Mount::new(&base.workdir, &workspace).readonly()),
      WorkspaceMount::None => opts,
    };

    let exec = graph.run(&current, opts).map_err(stage_err)?;
    current = exec.root();
    if step.workspace == WorkspaceMount::ReadWrite {
      workspace = exec.get_mount(&base.workdir).map_err(stage_err)?;
    }
    last = Some(exec);
  }

  // validate() guarantees at least one step
  let Some(last) = last else {
    return Err(PipelineError::InvalidConfig(format!("stage {:?} has no steps", stage.name)));
  };

  let export_path = stage.export_path();
  let (holder, subpath) = last.output_for(&stage.output);
  let state = graph
    .copy(&holder, &subpath, &State::scratch(), &export_path, CopyInfo::extract())
    .map_err(stage_err)?;

  Ok(Stage {
    name: stage.name.clone(),
    state,
    output_path: stage.output.clone(),
    export_path,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::Vertex;
  use crate::op::Op;
  use crate::state::VertexId;
  use crate::workspace::Workspace;
  use proptest::prelude::*;
  use std::fs;
  use tempfile::TempDir;

  fn vertex_of<'a>(graph: &'a Graph, state: &State) -> (VertexId, &'a Vertex) {
    let id = state.output().unwrap().vertex;
    (id, graph.vertex(id).unwrap())
  }

  /// Follow the first input back to a source, collecting each op on the way.
  fn chain(graph: &Graph, state: &State) -> Vec<Op> {
    let mut ops = Vec::new();
    let (_, mut vertex) = vertex_of(graph, state);
    loop {
      ops.push(vertex.op.clone());
      let next = match &vertex.op {
        // follow the source side of a copy
        Op::Copy(copy) => copy.src_input.map(|i| vertex.inputs[i]),
        // follow the root mount of a run
        Op::Exec(exec) => exec.mounts[0].input.map(|i| vertex.inputs[i]),
        _ => None,
      };
      match next {
        Some(output) => vertex = graph.vertex(output.vertex).unwrap(),
        None => break,
      }
    }
    ops.reverse();
    ops
  }

  fn args(op: &Op) -> Vec<String> {
    match op {
      Op::Exec(exec) => exec.meta.args.clone(),
      other => panic!("expected exec, got {}", other.kind()),
    }
  }

  #[test]
  fn default_pipeline_has_three_stages() {
    let mut graph = Graph::new();
    let pipeline = assemble(&mut graph, &PipelineConfig::default()).unwrap();

    let exports: Vec<&str> = pipeline.stages.iter().map(|s| s.export_path.as_str()).collect();
    assert_eq!(exports, vec!["/out/build", "/out/coverage", "/out/pylint"]);
    assert_eq!(pipeline.stage("coverage").unwrap().output_path, "/out");
    assert!(pipeline.stage("missing").is_none());
  }

  #[test]
  fn build_stage_is_an_ordered_chain() {
    let temp = TempDir::new().unwrap();
    let requirements: String = (0..10).map(|i| format!("package{}=={}.0\n", i, i)).collect();
    fs::write(temp.path().join("requirements.txt"), requirements).unwrap();

    let workspace = Workspace::open(temp.path()).unwrap();
    let manifest = workspace.manifest("requirements.txt").unwrap();
    assert_eq!(manifest.entries, 10);

    let mut graph = Graph::new();
    let pipeline = assemble(&mut graph, &PipelineConfig::default()).unwrap();
    let build = pipeline.stage("build").unwrap();
    let ops = chain(&graph, &build.state);

    // image -> apk -> pip -> setup.py -> export copy
    assert!(matches!(&ops[0], Op::Source(s) if s.identifier == "docker-image://docker.io/library/alpine:latest"));
    assert_eq!(&args(&ops[1])[..3], ["apk", "add", "--no-cache"]);
    assert_eq!(args(&ops[2]), ["pip", "install", "-r", "requirements.txt"]);
    assert_eq!(args(&ops[3]), ["python3", "setup.py", "bdist"]);
    match &ops[4] {
      Op::Copy(copy) => {
        assert_eq!(copy.src, "/dist");
        assert_eq!(copy.dest, "/out/build");
        assert_eq!(copy.dest_input, None);
      }
      other => panic!("expected copy, got {}", other.kind()),
    }
    assert_eq!(ops.len(), 5);
  }

  #[test]
  fn dependency_install_mounts_copied_manifest() {
    let mut graph = Graph::new();
    let pipeline = assemble(&mut graph, &PipelineConfig::default()).unwrap();
    let ops = chain(&graph, &pipeline.stage("build").unwrap().state);

    let install = graph
      .vertices()
      .find(|(_, v)| matches!(&v.op, Op::Exec(e) if e.meta.args[0] == "pip" && e.meta.args[1] == "install" && e.meta.args[2] == "-r"))
      .map(|(_, v)| v.clone())
      .unwrap();
    assert_eq!(install.op, ops[2]);

    let Op::Exec(exec) = &install.op else { unreachable!() };
    assert_eq!(exec.meta.cwd, "/app");
    let mount = &exec.mounts[1];
    assert_eq!(mount.dest, "/app");
    assert!(mount.readonly);

    let manifest = graph.vertex(install.inputs[mount.input.unwrap()].vertex).unwrap();
    match &manifest.op {
      Op::Copy(copy) => {
        assert_eq!(copy.src, "/requirements.txt");
        assert_eq!(copy.dest, "/requirements.txt");
      }
      other => panic!("expected copy, got {}", other.kind()),
    }
  }

  #[test]
  fn stages_share_the_base_prefix() {
    let mut graph = Graph::new();
    assemble(&mut graph, &PipelineConfig::default()).unwrap();

    let count = |pred: &dyn Fn(&Op) -> bool| graph.vertices().filter(|(_, v)| pred(&v.op)).count();
    assert_eq!(count(&|op| matches!(op, Op::Source(_))), 2);
    assert_eq!(count(&|op| matches!(op, Op::Exec(e) if e.meta.args[0] == "apk")), 1);
    assert_eq!(
      count(&|op| matches!(op, Op::Exec(e) if e.meta.args.join(" ") == "pip install -r requirements.txt")),
      1
    );

    // prefix 5, build 2, coverage 4, pylint 3
    assert_eq!(graph.len(), 14);
  }

  #[test]
  fn coverage_steps_see_workspace_read_only_with_env() {
    let mut graph = Graph::new();
    assemble(&mut graph, &PipelineConfig::default()).unwrap();

    let coverage: Vec<_> = graph
      .vertices()
      .filter_map(|(_, v)| match &v.op {
        Op::Exec(e) if e.meta.args[0] == "coverage" => Some(e.clone()),
        _ => None,
      })
      .collect();
    assert_eq!(coverage.len(), 2);
    for exec in coverage {
      assert!(exec.meta.env.contains(&"COVERAGE_FILE=/tmp/coverage".to_string()));
      assert_eq!(exec.mounts[1].dest, "/app");
      assert!(exec.mounts[1].readonly);
    }
  }

  #[test]
  fn pylint_output_comes_from_workspace_mount() {
    let mut graph = Graph::new();
    let pipeline = assemble(&mut graph, &PipelineConfig::default()).unwrap();
    let (_, vertex) = vertex_of(&graph, &pipeline.stage("pylint").unwrap().state);

    let Op::Copy(copy) = &vertex.op else {
      panic!("expected copy, got {}", vertex.op.kind());
    };
    assert_eq!(copy.src, "/pylint");
    assert_eq!(vertex.inputs[0].index, 1);
  }

  #[test]
  fn assembling_twice_adds_nothing() {
    let mut graph = Graph::new();
    let first = assemble(&mut graph, &PipelineConfig::default()).unwrap();
    let len = graph.len();
    let second = assemble(&mut graph, &PipelineConfig::default()).unwrap();
    assert_eq!(graph.len(), len);
    assert_eq!(first, second);
  }

  #[test]
  fn invalid_config_builds_nothing() {
    let mut config = PipelineConfig::default();
    config.stages[0].steps.clear();

    let mut graph = Graph::new();
    assert!(matches!(assemble(&mut graph, &config), Err(PipelineError::InvalidConfig(_))));
    assert!(graph.is_empty());
  }

  #[test]
  fn empty_step_command_names_the_stage() {
    let mut config = PipelineConfig::default();
    config.stages[2].steps[0].run = "   ".to_string();

    let mut graph = Graph::new();
    match assemble(&mut graph, &config) {
      Err(PipelineError::Stage { stage, source }) => {
        assert_eq!(stage, "pylint");
        assert_eq!(source, GraphError::EmptyArgs);
      }
      other => panic!("expected stage error, got {:?}", other),
    }
  }

  #[test]
  fn bad_image_is_a_base_error() {
    let mut config = PipelineConfig::default();
    config.base.image = "Not An Image".to_string();

    let mut graph = Graph::new();
    assert!(matches!(
      assemble(&mut graph, &config),
      Err(PipelineError::Base(GraphError::InvalidImageRef { .. }))
    ));
  }

  fn stage_with(name: String, command: String) -> StageConfig {
    StageConfig {
      name,
      setup: Vec::new(),
      steps: vec![StepConfig::new(&command)],
      output: "/app/out".to_string(),
      export_path: None,
    }
  }

  proptest! {
    #[test]
    fn prefix_is_shared_by_any_number_of_stages(commands in prop::collection::vec("[a-z]{1,8}", 1..6)) {
      let mut config = PipelineConfig::default();
      config.stages = commands
        .iter()
        .enumerate()
        .map(|(i, cmd)| stage_with(format!("s{}", i), format!("run-{}", cmd)))
        .collect();

      let mut graph = Graph::new();
      assemble(&mut graph, &config).unwrap();

      let sources = graph.vertices().filter(|(_, v)| matches!(v.op, Op::Source(_))).count();
      let installs = graph
        .vertices()
        .filter(|(_, v)| matches!(&v.op, Op::Exec(e) if e.meta.args[0] == "apk" || e.meta.args[0] == "pip"))
        .count();
      prop_assert_eq!(sources, 2);
      prop_assert_eq!(installs, 2);

      // identical commands share a step; export copies differ by path
      let distinct: std::collections::HashSet<&String> = commands.iter().collect();
      prop_assert_eq!(graph.len(), 5 + distinct.len() + commands.len());
    }
  }
}
