//! Target platform of a definition.
//!
//! The platform is fixed when this crate is built ([`TARGET`]); it is never
//! detected from the machine that runs the compiler.

pub mod arch;
pub mod os;

use arch::Arch;
use os::Os;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The platform every emitted definition is pinned to.
pub const TARGET: Platform = Platform::LINUX_AMD64;

/// OS and CPU architecture pair (e.g. "linux/amd64")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
  pub os: Os,
  #[serde(rename = "architecture")]
  pub arch: Arch,
}

impl Platform {
  pub const LINUX_AMD64: Platform = Platform::new(Os::Linux, Arch::Amd64);
  pub const LINUX_ARM64: Platform = Platform::new(Os::Linux, Arch::Arm64);

  /// Create a new platform identifier
  pub const fn new(os: Os, arch: Arch) -> Self {
    Self { os, arch }
  }

  /// The host platform, for informational output only.
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn host() -> Option<Self> {
    Some(Self {
      os: Os::current()?,
      arch: Arch::current()?,
    })
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.os, self.arch)
  }
}
