//! Implementation of the `stagegraph marshal` command.
//!
//! Assembles the pipeline for the workspace and writes the definition to
//! stdout. Everything is built and validated first; stdout is only touched
//! once the complete byte string exists.

use std::io;
use std::time::Instant;

use anyhow::{Context as _, Result};
use tracing::info;

use stagegraph_lib::export::compile;
use stagegraph_lib::platform::TARGET;

use super::Context;
use crate::output::{format_duration, print_success};

pub fn cmd_marshal(ctx: &Context, pretty: bool) -> Result<()> {
  let start = Instant::now();

  let workspace = ctx.open_workspace()?;
  let config = ctx.load_config(workspace.root())?;
  let export = compile(&config, Some(&workspace), TARGET).context("Failed to compile pipeline")?;

  let mut stdout = io::stdout().lock();
  export
    .definition
    .write_to(&mut stdout, pretty)
    .context("Failed to write definition")?;

  info!(ops = export.definition.ops.len(), "wrote definition");
  print_success(&format!(
    "{} ops from {} stage(s) for {} in {}",
    export.definition.ops.len(),
    export.merged.provenance.len(),
    export.definition.platform,
    format_duration(start.elapsed())
  ));

  Ok(())
}
