//! Implementation of the `stagegraph config` command.

use anyhow::Result;

use super::Context;
use crate::output::print_json;

/// Print the config `marshal` would use for this workspace.
pub fn cmd_config(ctx: &Context) -> Result<()> {
  let workspace = ctx.open_workspace()?;
  let config = ctx.load_config(workspace.root())?;
  print_json(&config)
}
