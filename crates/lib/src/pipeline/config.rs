//! Pipeline configuration.
//!
//! A [`PipelineConfig`] describes the shared base recipe and the stages built
//! on top of it. The built-in default is the Python project pipeline: a
//! wheel build, a coverage report and a lint report.
//!
//! # Example
//!
//! ```json
//! {
//!   "base": {
//!     "image": "docker.io/library/alpine:latest",
//!     "system_install": "apk add --no-cache python3 py3-pip",
//!     "dependency_install": "pip install -r requirements.txt",
//!     "manifest": "requirements.txt",
//!     "workdir": "/app",
//!     "context": "working-dir"
//!   },
//!   "stages": [
//!     {
//!       "name": "build",
//!       "steps": [{ "run": "python3 setup.py bdist" }],
//!       "output": "/app/dist"
//!     }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{CONFIG_ENV_VAR, CONFIG_FILE_NAME};

use super::PipelineError;

const PYTHON_SYSTEM_INSTALL: &str =
  "apk add --no-cache python3 py3-pip py3-distutils-extra py3-wheel build-base gcc python3-dev zlib-dev jpeg-dev";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
  pub base: BaseConfig,
  pub stages: Vec<StageConfig>,
}

/// The recipe every stage starts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseConfig {
  pub image: String,
  /// Command installing system packages into the image.
  pub system_install: String,
  /// Command installing project dependencies from `manifest`, run in `workdir`.
  pub dependency_install: String,
  /// Dependency manifest, relative to the workspace root.
  pub manifest: String,
  pub workdir: String,
  /// Name of the local context the engine transfers the workspace under.
  pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
  pub name: String,
  /// Stage-specific tooling installs, run before the steps.
  #[serde(default)]
  pub setup: Vec<String>,
  pub steps: Vec<StepConfig>,
  /// Path holding the stage's result after the last step.
  pub output: String,
  /// Where the output lands in the merged tree; defaults to `/out/<name>`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub export_path: Option<String>,
}

impl StageConfig {
  pub fn export_path(&self) -> String {
    self
      .export_path
      .clone()
      .unwrap_or_else(|| format!("/out/{}", self.name))
  }
}

/// How a step sees the workspace at the workdir.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkspaceMount {
  #[default]
  ReadWrite,
  ReadOnly,
  None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
  pub run: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
  #[serde(default)]
  pub workspace: WorkspaceMount,
}

impl StepConfig {
  pub fn new(run: &str) -> Self {
    Self {
      run: run.to_string(),
      env: BTreeMap::new(),
      workspace: WorkspaceMount::default(),
    }
  }

  pub fn with_env(mut self, key: &str, value: &str) -> Self {
    self.env.insert(key.to_string(), value.to_string());
    self
  }

  pub fn with_workspace(mut self, workspace: WorkspaceMount) -> Self {
    self.workspace = workspace;
    self
  }
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      base: BaseConfig {
        image: "docker.io/library/alpine:latest".to_string(),
        system_install: PYTHON_SYSTEM_INSTALL.to_string(),
        dependency_install: "pip install -r requirements.txt".to_string(),
        manifest: "requirements.txt".to_string(),
        workdir: "/app".to_string(),
        context: "working-dir".to_string(),
      },
      stages: vec![
        StageConfig {
          name: "build".to_string(),
          setup: Vec::new(),
          steps: vec![StepConfig::new("python3 setup.py bdist")],
          output: "/app/dist".to_string(),
          export_path: None,
        },
        StageConfig {
          name: "coverage".to_string(),
          setup: vec!["pip install coverage".to_string()],
          steps: vec![
            StepConfig::new("coverage run -m unittest discover")
              .with_env("COVERAGE_FILE", "/tmp/coverage")
              .with_workspace(WorkspaceMount::ReadOnly),
            StepConfig::new("coverage html --directory /out/htmlcov")
              .with_env("COVERAGE_FILE", "/tmp/coverage")
              .with_workspace(WorkspaceMount::ReadOnly),
          ],
          output: "/out".to_string(),
          export_path: None,
        },
        StageConfig {
          name: "pylint".to_string(),
          setup: vec!["pip install pylint".to_string()],
          steps: vec![StepConfig::new(
            "pylint pngparser -f json --output /app/pylint/report.json",
          )],
          output: "/app/pylint".to_string(),
          export_path: None,
        },
      ],
    }
  }
}

impl PipelineConfig {
  /// Read a JSON config file and validate it.
  pub fn load(path: &Path) -> Result<Self, PipelineError> {
    let content = fs::read_to_string(path).map_err(|e| PipelineError::Read {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    let config: PipelineConfig = serde_json::from_str(&content).map_err(|source| PipelineError::Parse {
      path: path.display().to_string(),
      source,
    })?;
    config.validate()?;
    debug!(path = %path.display(), stages = config.stages.len(), "loaded pipeline config");
    Ok(config)
  }

  /// Reject configs that would assemble an incomplete or ambiguous pipeline.
  pub fn validate(&self) -> Result<(), PipelineError> {
    let invalid = |message: String| Err(PipelineError::InvalidConfig(message));

    if self.stages.is_empty() {
      return invalid("at least one stage is required".to_string());
    }
    if !self.base.workdir.starts_with('/') {
      return invalid(format!("workdir {:?} must be absolute", self.base.workdir));
    }
    if self.base.manifest.is_empty() || self.base.manifest.starts_with('/') {
      return invalid(format!(
        "manifest {:?} must be a path relative to the workspace",
        self.base.manifest
      ));
    }

    let mut names = HashSet::new();
    for stage in &self.stages {
      if stage.name.is_empty() {
        return invalid("stage names must not be empty".to_string());
      }
      if !names.insert(stage.name.as_str()) {
        return invalid(format!("stage {:?} is defined more than once", stage.name));
      }
      if stage.steps.is_empty() {
        return invalid(format!("stage {:?} has no steps", stage.name));
      }
      if !stage.output.starts_with('/') {
        return invalid(format!("stage {:?} output {:?} must be absolute", stage.name, stage.output));
      }
      let export_path = stage.export_path();
      if !export_path.starts_with('/') {
        return invalid(format!("stage {:?} export path {:?} must be absolute", stage.name, export_path));
      }
    }

    Ok(())
  }
}

/// Pick the config file to load, if any.
///
/// Order: the explicit path, then `$STAGEGRAPH_CONFIG`, then
/// `stagegraph.json` at the workspace root. `None` means the built-in
/// default applies.
pub fn resolve_config_path(explicit: Option<&Path>, workspace_root: &Path) -> Option<PathBuf> {
  if let Some(path) = explicit {
    return Some(path.to_path_buf());
  }
  if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
    if !path.is_empty() {
      return Some(PathBuf::from(path));
    }
  }
  let in_workspace = workspace_root.join(CONFIG_FILE_NAME);
  in_workspace.is_file().then_some(in_workspace)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use tempfile::TempDir;

  #[test]
  fn default_config_is_valid() {
    let config = PipelineConfig::default();
    config.validate().unwrap();
    let names: Vec<&str> = config.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["build", "coverage", "pylint"]);
  }

  #[test]
  fn export_path_defaults_to_out_name() {
    let config = PipelineConfig::default();
    let paths: Vec<String> = config.stages.iter().map(StageConfig::export_path).collect();
    assert_eq!(paths, vec!["/out/build", "/out/coverage", "/out/pylint"]);
  }

  #[test]
  fn duplicate_stage_names_are_rejected() {
    let mut config = PipelineConfig::default();
    config.stages[1].name = "build".to_string();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("more than once"));
  }

  #[test]
  fn empty_stage_list_is_rejected() {
    let mut config = PipelineConfig::default();
    config.stages.clear();
    assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));
  }

  #[test]
  fn relative_output_is_rejected() {
    let mut config = PipelineConfig::default();
    config.stages[0].output = "dist".to_string();
    assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));
  }

  #[test]
  fn relative_workdir_is_rejected() {
    let mut config = PipelineConfig::default();
    config.base.workdir = "app".to_string();
    assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));
  }

  #[test]
  fn minimal_json_uses_field_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("pipeline.json");
    fs::write(
      &path,
      r#"{
        "base": {
          "image": "python:3.12-alpine",
          "system_install": "apk add --no-cache build-base",
          "dependency_install": "pip install -r requirements.txt",
          "manifest": "requirements.txt",
          "workdir": "/src",
          "context": "src"
        },
        "stages": [
          { "name": "test", "steps": [{ "run": "pytest", "workspace": "read-only" }], "output": "/src/reports" }
        ]
      }"#,
    )
    .unwrap();

    let config = PipelineConfig::load(&path).unwrap();
    let stage = &config.stages[0];
    assert!(stage.setup.is_empty());
    assert_eq!(stage.steps[0].workspace, WorkspaceMount::ReadOnly);
    assert_eq!(stage.export_path(), "/out/test");
  }

  #[test]
  fn malformed_json_reports_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();

    let err = PipelineConfig::load(&path).unwrap_err();
    assert!(matches!(err, PipelineError::Parse { .. }));
    assert!(err.to_string().contains("broken.json"));
  }

  #[test]
  fn default_config_survives_json() {
    let config = PipelineConfig::default();
    let json = serde_json::to_string_pretty(&config).unwrap();
    let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
  }

  #[test]
  #[serial]
  fn explicit_path_wins() {
    temp_env::with_var(CONFIG_ENV_VAR, Some("/from/env.json"), || {
      let resolved = resolve_config_path(Some(Path::new("/explicit.json")), Path::new("/ws"));
      assert_eq!(resolved, Some(PathBuf::from("/explicit.json")));
    });
  }

  #[test]
  #[serial]
  fn env_var_beats_workspace_file() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(CONFIG_FILE_NAME), "{}").unwrap();

    temp_env::with_var(CONFIG_ENV_VAR, Some("/from/env.json"), || {
      let resolved = resolve_config_path(None, temp.path());
      assert_eq!(resolved, Some(PathBuf::from("/from/env.json")));
    });
  }

  #[test]
  #[serial]
  fn workspace_file_then_default() {
    let temp = TempDir::new().unwrap();

    temp_env::with_var(CONFIG_ENV_VAR, None::<&str>, || {
      assert_eq!(resolve_config_path(None, temp.path()), None);

      fs::write(temp.path().join(CONFIG_FILE_NAME), "{}").unwrap();
      assert_eq!(
        resolve_config_path(None, temp.path()),
        Some(temp.path().join(CONFIG_FILE_NAME))
      );
    });
  }
}
