use anyhow::Result;

use stagegraph_lib::consts::DEFINITION_VERSION;
use stagegraph_lib::platform::{Platform, TARGET};

use crate::output::{OutputFormat, print_json, print_stat};

pub fn cmd_info(output: OutputFormat) -> Result<()> {
  let host = Platform::host();

  if output.is_json() {
    return print_json(&serde_json::json!({
      "version": env!("CARGO_PKG_VERSION"),
      "definition_version": DEFINITION_VERSION,
      "target": TARGET,
      "host": host,
    }));
  }

  println!("stagegraph v{}", env!("CARGO_PKG_VERSION"));
  print_stat("Target", &TARGET.to_string());
  match host {
    Some(host) => print_stat("Host", &host.to_string()),
    None => print_stat("Host", "unsupported"),
  }
  print_stat("Definition format", &format!("v{}", DEFINITION_VERSION));
  Ok(())
}
