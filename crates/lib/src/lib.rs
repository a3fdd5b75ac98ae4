//! stagegraph-lib: build graph construction and serialization
//!
//! This crate compiles a staged build recipe into a content-addressed DAG
//! for an external build engine:
//! - `State`: an immutable filesystem reference plus working dir and env
//! - `Graph`: interned operations (image, local, run, copy, merge)
//! - `Pipeline`: named stages sharing a common prefix
//! - `Definition`: the serialized, platform-pinned DAG written to stdout

pub mod consts;
pub mod definition;
pub mod export;
pub mod graph;
pub mod op;
pub mod pipeline;
pub mod platform;
pub mod state;
pub mod util;
pub mod workspace;
