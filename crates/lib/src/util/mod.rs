//! Shared utilities.
//!
//! Common utilities used across the crate: content digests and path helpers.

pub mod hash;
pub mod path;
