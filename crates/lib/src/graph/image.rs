//! Image reference normalization.
//!
//! Short references are expanded the way the engine's registry client does,
//! so `alpine` and `docker.io/library/alpine:latest` intern to one vertex.

use super::GraphError;

const DEFAULT_DOMAIN: &str = "docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";
const DEFAULT_TAG: &str = "latest";

/// Expand `reference` to `domain/path[:tag][@digest]`.
pub fn normalize_reference(reference: &str) -> Result<String, GraphError> {
  let invalid = |reason: &str| GraphError::InvalidImageRef {
    reference: reference.to_string(),
    reason: reason.to_string(),
  };

  let trimmed = reference.trim();
  if trimmed.is_empty() {
    return Err(invalid("reference is empty"));
  }
  if trimmed.chars().any(char::is_whitespace) {
    return Err(invalid("reference contains whitespace"));
  }

  let (name, digest) = match trimmed.split_once('@') {
    Some((name, digest)) => {
      if !digest.contains(':') {
        return Err(invalid("digest must be algorithm:hex"));
      }
      (name, Some(digest))
    }
    None => (trimmed, None),
  };

  // A tag is a colon after the last slash; a colon before it is a port.
  let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
  let (repo, tag) = match name[last_slash..].rfind(':') {
    Some(i) => {
      let split = last_slash + i;
      (&name[..split], Some(&name[split + 1..]))
    }
    None => (name, None),
  };
  if tag.is_some_and(str::is_empty) {
    return Err(invalid("tag is empty"));
  }

  let (domain, path) = match repo.split_once('/') {
    Some((first, rest)) if first.contains('.') || first.contains(':') || first == "localhost" => {
      (first.to_string(), rest.to_string())
    }
    _ => (DEFAULT_DOMAIN.to_string(), repo.to_string()),
  };
  if path.is_empty() || path.split('/').any(str::is_empty) {
    return Err(invalid("repository path has an empty component"));
  }
  if path.chars().any(|c| c.is_ascii_uppercase()) {
    return Err(invalid("repository name must be lowercase"));
  }

  let path = if domain == DEFAULT_DOMAIN && !path.contains('/') {
    format!("{}{}", OFFICIAL_REPO_PREFIX, path)
  } else {
    path
  };

  let mut normalized = format!("{}/{}", domain, path);
  match (tag, digest) {
    (Some(tag), _) => {
      normalized.push(':');
      normalized.push_str(tag);
    }
    (None, None) => {
      normalized.push(':');
      normalized.push_str(DEFAULT_TAG);
    }
    (None, Some(_)) => {}
  }
  if let Some(digest) = digest {
    normalized.push('@');
    normalized.push_str(digest);
  }

  Ok(normalized)
}
