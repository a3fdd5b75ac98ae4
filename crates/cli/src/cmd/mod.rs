mod config;
mod info;
mod marshal;
mod plan;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use tracing::info;

use stagegraph_lib::pipeline::{PipelineConfig, resolve_config_path};
use stagegraph_lib::workspace::Workspace;

pub use config::cmd_config;
pub use info::cmd_info;
pub use marshal::cmd_marshal;
pub use plan::cmd_plan;

/// Global options shared by every subcommand.
pub struct Context {
  pub workspace: PathBuf,
  pub config: Option<PathBuf>,
}

impl Context {
  pub fn open_workspace(&self) -> Result<Workspace> {
    Workspace::open(&self.workspace)
      .with_context(|| format!("Failed to open workspace: {}", self.workspace.display()))
  }

  /// Load the config that applies to `workspace`, or the built-in default.
  pub fn load_config(&self, workspace: &Path) -> Result<PipelineConfig> {
    match resolve_config_path(self.config.as_deref(), workspace) {
      Some(path) => {
        info!(path = %path.display(), "using pipeline config");
        PipelineConfig::load(&path).with_context(|| format!("Failed to load config: {}", path.display()))
      }
      None => {
        info!("using built-in pipeline config");
        Ok(PipelineConfig::default())
      }
    }
  }
}
