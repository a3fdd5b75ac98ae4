//! Operations recorded in graph vertices.
//!
//! An [`Op`] is the typed transformation a vertex applies to its inputs.
//! Ops are plain data: building one never fails, and whether its paths make
//! sense is only checked by [`Op::validate`] when a definition is marshaled
//! or decoded.
//!
//! # Op Types
//!
//! - [`Op::Source`] - image or local context, no inputs
//! - [`Op::Exec`] - command run over mounted filesystems
//! - [`Op::Copy`] - copy between two filesystems
//! - [`Op::Merge`] - ordered overlay of filesystems

mod types;

pub use types::*;

use std::collections::HashSet;

impl Op {
  /// Short lowercase name of the op kind.
  pub fn kind(&self) -> &'static str {
    match self {
      Op::Source(_) => "source",
      Op::Exec(_) => "exec",
      Op::Copy(_) => "copy",
      Op::Merge(_) => "merge",
    }
  }

  /// Number of outputs the op produces.
  pub fn output_count(&self) -> usize {
    match self {
      Op::Exec(exec) => exec.mounts.iter().filter(|m| m.output.is_some()).count(),
      Op::Source(_) | Op::Copy(_) | Op::Merge(_) => 1,
    }
  }

  /// One-line human-readable summary.
  pub fn describe(&self) -> String {
    match self {
      Op::Source(source) => source.identifier.clone(),
      Op::Exec(exec) => {
        let mounts: Vec<String> = exec
          .mounts
          .iter()
          .skip(1)
          .map(|m| format!("{}{}", m.dest, if m.readonly { ":ro" } else { "" }))
          .collect();
        if mounts.is_empty() {
          format!("{} (cwd {})", exec.meta.args.join(" "), exec.meta.cwd)
        } else {
          format!(
            "{} (cwd {}, mounts {})",
            exec.meta.args.join(" "),
            exec.meta.cwd,
            mounts.join(", ")
          )
        }
      }
      Op::Copy(copy) => format!("{} -> {}", copy.src, copy.dest),
      Op::Merge(merge) => format!("{} inputs", merge.inputs.len()),
    }
  }

  /// Check that the op can be encoded for the engine.
  ///
  /// `input_count` is the length of the owning vertex's input list.
  pub fn validate(&self, input_count: usize) -> Result<(), InvalidOp> {
    let check_input = |index: Option<usize>| match index {
      Some(index) if index >= input_count => Err(InvalidOp::InputOutOfBounds {
        index,
        count: input_count,
      }),
      _ => Ok(()),
    };

    match self {
      Op::Source(source) => {
        if !source.identifier.contains("://") {
          return Err(InvalidOp::MalformedIdentifier {
            identifier: source.identifier.clone(),
          });
        }
      }
      Op::Exec(exec) => {
        if exec.meta.args.is_empty() || exec.meta.args[0].is_empty() {
          return Err(InvalidOp::EmptyArgs);
        }
        for entry in &exec.meta.env {
          match entry.split_once('=') {
            Some((key, _)) if !key.is_empty() => {}
            _ => return Err(InvalidOp::MalformedEnv { entry: entry.clone() }),
          }
        }
        absolute_path(&exec.meta.cwd)?;

        match exec.mounts.first() {
          Some(root) if root.dest == "/" => {}
          _ => return Err(InvalidOp::MissingRootMount),
        }

        let mut seen = HashSet::new();
        for mount in &exec.mounts {
          check_input(mount.input)?;
          absolute_path(&mount.dest)?;
          if let Some(selector) = &mount.selector {
            absolute_path(selector)?;
          }
          if !seen.insert(crate::util::path::normalize(&mount.dest)) {
            return Err(InvalidOp::DuplicateMount {
              dest: mount.dest.clone(),
            });
          }
        }
      }
      Op::Copy(copy) => {
        check_input(copy.dest_input)?;
        check_input(copy.src_input)?;
        absolute_path(&copy.src)?;
        absolute_path(&copy.dest)?;
      }
      Op::Merge(merge) => {
        if merge.inputs.is_empty() {
          return Err(InvalidOp::EmptyMerge);
        }
        for index in &merge.inputs {
          check_input(Some(*index))?;
        }
      }
    }

    Ok(())
  }
}

fn absolute_path(path: &str) -> Result<(), InvalidOp> {
  if path.is_empty() {
    return Err(InvalidOp::EmptyPath);
  }
  if path.contains('\0') {
    return Err(InvalidOp::NulByte { path: path.to_string() });
  }
  if !path.starts_with('/') {
    return Err(InvalidOp::RelativePath { path: path.to_string() });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn exec(args: &[&str], mounts: Vec<MountOp>) -> Op {
    Op::Exec(ExecOp {
      meta: ExecMeta {
        args: args.iter().map(|a| a.to_string()).collect(),
        env: vec!["PATH=/bin".to_string()],
        cwd: "/".to_string(),
      },
      mounts,
    })
  }

  fn mount(input: Option<usize>, dest: &str, output: Option<usize>) -> MountOp {
    MountOp {
      input,
      selector: None,
      dest: dest.to_string(),
      output,
      readonly: output.is_none(),
    }
  }

  #[test]
  fn exec_with_root_mount_is_valid() {
    let op = exec(&["true"], vec![mount(Some(0), "/", Some(0))]);
    assert!(op.validate(1).is_ok());
    assert_eq!(op.output_count(), 1);
  }

  #[test]
  fn exec_rejects_relative_mount_target() {
    let op = exec(
      &["true"],
      vec![mount(Some(0), "/", Some(0)), mount(Some(1), "app", None)],
    );
    assert_eq!(
      op.validate(2),
      Err(InvalidOp::RelativePath {
        path: "app".to_string()
      })
    );
  }

  #[test]
  fn exec_rejects_duplicate_mount_targets() {
    let op = exec(
      &["true"],
      vec![
        mount(Some(0), "/", Some(0)),
        mount(Some(1), "/app", None),
        mount(None, "/app/", Some(1)),
      ],
    );
    assert!(matches!(op.validate(2), Err(InvalidOp::DuplicateMount { .. })));
  }

  #[test]
  fn exec_requires_root_mount_first() {
    let op = exec(&["true"], vec![mount(Some(0), "/app", Some(0))]);
    assert_eq!(op.validate(1), Err(InvalidOp::MissingRootMount));
  }

  #[test]
  fn exec_rejects_input_out_of_bounds() {
    let op = exec(&["true"], vec![mount(Some(3), "/", Some(0))]);
    assert_eq!(op.validate(1), Err(InvalidOp::InputOutOfBounds { index: 3, count: 1 }));
  }

  #[test]
  fn copy_rejects_nul_byte() {
    let op = Op::Copy(CopyOp {
      dest_input: None,
      src_input: Some(0),
      src: "/a\0b".to_string(),
      dest: "/out".to_string(),
      info: CopyInfo::default(),
    });
    assert!(matches!(op.validate(1), Err(InvalidOp::NulByte { .. })));
  }

  #[test]
  fn copy_rejects_empty_source() {
    let op = Op::Copy(CopyOp {
      dest_input: None,
      src_input: Some(0),
      src: String::new(),
      dest: "/out".to_string(),
      info: CopyInfo::extract(),
    });
    assert_eq!(op.validate(1), Err(InvalidOp::EmptyPath));
  }

  #[test]
  fn source_requires_scheme() {
    let op = Op::Source(SourceOp {
      identifier: "alpine".to_string(),
      attrs: Default::default(),
    });
    assert!(matches!(op.validate(0), Err(InvalidOp::MalformedIdentifier { .. })));
  }

  #[test]
  fn describe_lists_extra_mounts() {
    let op = exec(
      &["pip", "install", "-r", "requirements.txt"],
      vec![mount(Some(0), "/", Some(0)), mount(Some(1), "/app", None)],
    );
    assert_eq!(op.describe(), "pip install -r requirements.txt (cwd /, mounts /app:ro)");
  }
}
