//! POSIX path helpers for paths inside the target filesystem.
//!
//! These never touch the host filesystem and always use `/` separators,
//! whatever the host OS is.

/// Normalize a path: collapse repeated separators, resolve `.` and `..`.
///
/// Absolute paths stay absolute and `..` never climbs above `/`.
pub fn normalize(path: &str) -> String {
  let absolute = path.starts_with('/');
  let mut parts: Vec<&str> = Vec::new();

  for segment in path.split('/') {
    match segment {
      "" | "." => {}
      ".." => {
        if parts.last().is_some_and(|p| *p != "..") {
          parts.pop();
        } else if !absolute {
          parts.push("..");
        }
      }
      other => parts.push(other),
    }
  }

  let joined = parts.join("/");
  if absolute {
    format!("/{}", joined)
  } else if joined.is_empty() {
    ".".to_string()
  } else {
    joined
  }
}

/// Join `path` onto `base`. An absolute `path` replaces `base`.
pub fn join(base: &str, path: &str) -> String {
  if path.starts_with('/') {
    normalize(path)
  } else {
    normalize(&format!("{}/{}", base, path))
  }
}

/// If `path` is `prefix` or lies below it, return the remainder as an
/// absolute path (`/` when they are equal).
pub fn strip_prefix(path: &str, prefix: &str) -> Option<String> {
  let path = normalize(path);
  let prefix = normalize(prefix);

  if prefix == "/" {
    return Some(path);
  }
  if path == prefix {
    return Some("/".to_string());
  }
  path
    .strip_prefix(&prefix)
    .filter(|rest| rest.starts_with('/'))
    .map(|rest| rest.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_resolves_dots() {
    assert_eq!(normalize("/app/./src/../dist"), "/app/dist");
    assert_eq!(normalize("//app//dist/"), "/app/dist");
    assert_eq!(normalize("/../.."), "/");
    assert_eq!(normalize("a/../../b"), "../b");
    assert_eq!(normalize(""), ".");
  }

  #[test]
  fn join_relative_and_absolute() {
    assert_eq!(join("/app", "dist"), "/app/dist");
    assert_eq!(join("/app", "/out"), "/out");
    assert_eq!(join("/", "app"), "/app");
    assert_eq!(join("/app/src", ".."), "/app");
  }

  #[test]
  fn strip_prefix_requires_component_boundary() {
    assert_eq!(strip_prefix("/app/dist", "/app"), Some("/dist".to_string()));
    assert_eq!(strip_prefix("/app", "/app"), Some("/".to_string()));
    assert_eq!(strip_prefix("/application", "/app"), None);
    assert_eq!(strip_prefix("/out", "/"), Some("/out".to_string()));
  }
}
