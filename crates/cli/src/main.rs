mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::OutputFormat;

/// stagegraph - compile a staged build pipeline into a build-engine definition
#[derive(Parser)]
#[command(name = "stagegraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging on stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Project directory the pipeline builds
  #[arg(short, long, global = true, default_value = ".")]
  workspace: PathBuf,

  /// Pipeline config file (overrides STAGEGRAPH_CONFIG and <workspace>/stagegraph.json)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Write the build definition to stdout
  Marshal {
    /// Indent the JSON output
    #[arg(long)]
    pretty: bool,
  },

  /// Summarize the build graph: ops, execution waves and stage outputs
  Plan {
    /// Inspect an existing definition file instead of assembling one
    #[arg(long)]
    definition: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Show the target and host platforms
  Info {
    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Print the effective pipeline config as JSON
  Config,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let ctx = cmd::Context {
    workspace: cli.workspace,
    config: cli.config,
  };

  match cli.command {
    Commands::Marshal { pretty } => cmd::cmd_marshal(&ctx, pretty),
    Commands::Plan { definition, output } => cmd::cmd_plan(&ctx, definition.as_deref(), output),
    Commands::Info { output } => cmd::cmd_info(output),
    Commands::Config => cmd::cmd_config(&ctx),
  }
}
