//! Merging stage results and producing the final definition.
//!
//! Stages are overlaid in pipeline order. Where two stages write the same
//! path, the later stage wins; [`MergedRoot::owner`] answers which stage a
//! path in the merged tree comes from under that policy.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::definition::dag::{DagError, DefinitionDag};
use crate::definition::{Definition, MarshalError, marshal};
use crate::graph::{Graph, GraphError};
use crate::pipeline::{Pipeline, PipelineConfig, PipelineError, assemble};
use crate::platform::Platform;
use crate::state::State;
use crate::util::path;
use crate::workspace::{Workspace, WorkspaceError};

#[derive(Debug, Error)]
pub enum ExportError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Marshal(#[from] MarshalError),

  #[error("definition is not well formed: {0}")]
  Dag(#[from] DagError),

  #[error(transparent)]
  Pipeline(#[from] PipelineError),

  #[error(transparent)]
  Workspace(#[from] WorkspaceError),
}

/// The overlay of every stage, plus where each exported path came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRoot {
  pub state: State,
  /// Export path to the stage that owns it; later stages replace earlier
  /// ones at the same path.
  pub provenance: BTreeMap<String, String>,
  layers: Vec<(String, String)>,
}

impl MergedRoot {
  /// `(export path, stage)` pairs in merge order.
  pub fn layers(&self) -> impl Iterator<Item = (&str, &str)> {
    self.layers.iter().map(|(path, stage)| (path.as_str(), stage.as_str()))
  }

  /// Stages whose export path is at least partly covered by a later stage.
  pub fn shadowed(&self) -> Vec<(&str, &str)> {
    self
      .layers()
      .filter(|(export_path, stage)| self.owner(export_path) != Some(*stage))
      .collect()
  }

  /// The stage whose output provides `target` in the merged tree.
  ///
  /// That is the last stage, in merge order, whose export path contains
  /// `target`.
  pub fn owner(&self, target: &str) -> Option<&str> {
    self
      .layers
      .iter()
      .rev()
      .find(|(export_path, _)| path::strip_prefix(target, export_path).is_some())
      .map(|(_, stage)| stage.as_str())
  }
}

/// Overlay every stage state of `pipeline` in order.
pub fn merge_stages(graph: &mut Graph, pipeline: &Pipeline) -> Result<MergedRoot, GraphError> {
  let mut layers: Vec<(String, String)> = Vec::with_capacity(pipeline.stages.len());
  for stage in &pipeline.stages {
    let export_path = path::normalize(&stage.export_path);
    for (earlier_path, earlier) in &layers {
      if overlaps(earlier_path, &export_path) {
        warn!(
          earlier = %earlier,
          later = %stage.name,
          earlier_path = %earlier_path,
          later_path = %export_path,
          "stage outputs overlap, later stage wins on conflicting files"
        );
      }
    }
    layers.push((export_path, stage.name.clone()));
  }

  let provenance = layers.iter().cloned().collect();
  let state = graph.merge(&pipeline.states())?;
  Ok(MergedRoot {
    state,
    provenance,
    layers,
  })
}

fn overlaps(a: &str, b: &str) -> bool {
  path::strip_prefix(a, b).is_some() || path::strip_prefix(b, a).is_some()
}

/// A validated definition and the provenance of its merged tree.
#[derive(Debug, Clone)]
pub struct Export {
  pub definition: Definition,
  pub merged: MergedRoot,
}

/// Merge the pipeline, serialize everything reachable and validate the result.
///
/// # Errors
///
/// Nothing is produced if an op cannot be encoded or the definition fails
/// the well-formedness checks.
pub fn export(graph: &mut Graph, pipeline: &Pipeline, platform: Platform) -> Result<Export, ExportError> {
  let merged = merge_stages(graph, pipeline)?;
  let definition = marshal(graph, &merged.state, platform)?;
  let dag = DefinitionDag::from_definition(&definition)?;
  debug!(ops = dag.len(), "validated definition");

  info!(
    ops = definition.ops.len(),
    stages = pipeline.stages.len(),
    platform = %platform,
    "exported definition"
  );
  Ok(Export { definition, merged })
}

/// Assemble `config` into a fresh graph and export it.
///
/// With a workspace, its dependency manifest must exist; this is checked
/// before anything is assembled.
pub fn compile(
  config: &PipelineConfig,
  workspace: Option<&Workspace>,
  platform: Platform,
) -> Result<Export, ExportError> {
  if let Some(workspace) = workspace {
    let manifest = workspace.manifest(&config.base.manifest)?;
    debug!(entries = manifest.entries, hash = %manifest.hash, "checked manifest");
  }

  let mut graph = Graph::new();
  let pipeline = assemble(&mut graph, config)?;
  export(&mut graph, &pipeline, platform)
}
