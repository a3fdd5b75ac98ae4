use std::fmt;

use serde::{Deserialize, Serialize};

/// CPU architecture variants a definition can target.
///
/// Names follow the OCI image spec (`amd64`, `arm64`), which is what the
/// execution engine expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
  Amd64,
  Arm64,
}

impl Arch {
  /// Detect the host CPU architecture.
  ///
  /// Only used for informational output; definitions are always pinned to
  /// [`super::TARGET`].
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::Amd64),
      "aarch64" => Some(Self::Arm64),
      _ => None,
    }
  }

  /// Returns the OCI identifier for this architecture
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Amd64 => "amd64",
      Self::Arm64 => "arm64",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
