//! Implementation of the `stagegraph plan` command.
//!
//! Shows what a definition contains without writing it: every op grouped
//! into the waves an engine may run in parallel, plus which stage owns each
//! exported path.

use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result};
use serde::Serialize;

use stagegraph_lib::definition::Definition;
use stagegraph_lib::definition::dag::DefinitionDag;
use stagegraph_lib::export::{MergedRoot, compile};
use stagegraph_lib::platform::TARGET;
use stagegraph_lib::util::hash::{Digest, hash_file};

use super::Context;
use crate::output::{OutputFormat, print_json, print_stat, print_success, print_warning, symbols, truncate_hash};

#[derive(Serialize)]
struct PlanOp {
  digest: String,
  kind: &'static str,
  description: String,
}

#[derive(Serialize)]
struct PlanStage {
  name: String,
  export_path: String,
  shadowed: bool,
}

#[derive(Serialize)]
struct PlanOutput {
  platform: String,
  root: Option<String>,
  ops: usize,
  waves: Vec<Vec<PlanOp>>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  stages: Vec<PlanStage>,
  #[serde(skip_serializing_if = "Option::is_none")]
  file_hash: Option<String>,
}

pub fn cmd_plan(ctx: &Context, definition_path: Option<&Path>, output: OutputFormat) -> Result<()> {
  let (definition, merged, file_hash) = match definition_path {
    Some(path) => {
      let bytes = fs::read(path).with_context(|| format!("Failed to read definition: {}", path.display()))?;
      let definition =
        Definition::from_slice(&bytes).with_context(|| format!("Failed to parse definition: {}", path.display()))?;
      let hash = hash_file(path).with_context(|| format!("Failed to hash definition: {}", path.display()))?;
      (definition, None, Some(hash.0))
    }
    None => {
      let workspace = ctx.open_workspace()?;
      let config = ctx.load_config(workspace.root())?;
      let export = compile(&config, Some(&workspace), TARGET).context("Failed to compile pipeline")?;
      (export.definition, Some(export.merged), None)
    }
  };

  let dag = DefinitionDag::from_definition(&definition).context("Definition is not well formed")?;
  let waves = dag.waves().context("Failed to order definition")?;
  let plan = build_plan(&definition, &waves, merged.as_ref(), file_hash);

  if output.is_json() {
    return print_json(&plan);
  }

  print_success(&format!("Plan for {}", plan.platform));
  print_stat("Ops", &plan.ops.to_string());
  print_stat("Waves", &plan.waves.len().to_string());
  if let Some(root) = &plan.root {
    print_stat("Root", truncate_hash(root));
  }
  if let Some(hash) = &plan.file_hash {
    print_stat("File", truncate_hash(hash));
  }

  for (i, wave) in plan.waves.iter().enumerate() {
    println!();
    println!("Wave {}:", i + 1);
    for op in wave {
      println!(
        "  {} {} {:<6} {}",
        symbols::INFO,
        truncate_hash(&op.digest),
        op.kind,
        op.description
      );
    }
  }

  if !plan.stages.is_empty() {
    println!();
    println!("Stages:");
    for stage in &plan.stages {
      println!("  {} {} {}", stage.name, symbols::ARROW, stage.export_path);
      if stage.shadowed {
        print_warning(&format!(
          "output of stage '{}' at {} is overlaid by a later stage",
          stage.name, stage.export_path
        ));
      }
    }
  }

  Ok(())
}

fn build_plan(
  definition: &Definition,
  waves: &[Vec<Digest>],
  merged: Option<&MergedRoot>,
  file_hash: Option<String>,
) -> PlanOutput {
  let waves = waves
    .iter()
    .map(|wave| {
      wave
        .iter()
        .filter_map(|digest| definition.op(digest))
        .map(|op| PlanOp {
          digest: op.digest.0.clone(),
          kind: op.op.kind(),
          description: op.op.describe(),
        })
        .collect()
    })
    .collect();

  let stages = merged
    .map(|merged| {
      let shadowed = merged.shadowed();
      merged
        .layers()
        .map(|(export_path, name)| PlanStage {
          name: name.to_string(),
          export_path: export_path.to_string(),
          shadowed: shadowed.contains(&(export_path, name)),
        })
        .collect()
    })
    .unwrap_or_default();

  PlanOutput {
    platform: definition.platform.to_string(),
    root: definition.root.as_ref().map(|root| root.digest.0.clone()),
    ops: definition.ops.len(),
    waves,
    stages,
    file_hash,
  }
}
