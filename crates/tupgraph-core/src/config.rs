//! Tracker configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Configuration for graph maintenance.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct TrackerConfig {
    /// Absolute path of the project root on disk.
    pub project_root: PathBuf,

    /// Per-directory build description file.
    #[builder(default = "default_build_file_name()")]
    #[serde(default = "default_build_file_name")]
    pub build_file_name: String,

    /// Root-level configuration file whose identity survives deletion.
    #[builder(default = "default_config_file_name()")]
    #[serde(default = "default_config_file_name")]
    pub config_file_name: String,

    /// Reserved ignore file maintained by the build.
    #[builder(default = "default_ignore_file_name()")]
    #[serde(default = "default_ignore_file_name")]
    pub ignore_file_name: String,

    /// Path components that make a path hidden. Empty allows hidden paths.
    #[builder(default = "default_hidden_names()")]
    #[serde(default = "default_hidden_names")]
    pub hidden_names: Vec<String>,

    /// Track paths outside the project instead of ignoring them.
    #[builder(default = "false")]
    #[serde(default)]
    pub full_deps: bool,
}

fn default_build_file_name() -> String {
    "Tupfile".to_string()
}

fn default_config_file_name() -> String {
    "tup.config".to_string()
}

fn default_ignore_file_name() -> String {
    ".gitignore".to_string()
}

fn default_hidden_names() -> Vec<String> {
    [".git", ".tup", ".hg", ".svn", ".bzr"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl TrackerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.project_root {
            if root.as_os_str().is_empty() {
                return Err("Project root cannot be empty".to_string());
            }
        } else {
            return Err("Project root is required".to_string());
        }
        Ok(())
    }
}

impl TrackerConfig {
    /// Create a new tracker config builder.
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    /// Create a config with defaults for the given project root.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            build_file_name: default_build_file_name(),
            config_file_name: default_config_file_name(),
            ignore_file_name: default_ignore_file_name(),
            hidden_names: default_hidden_names(),
            full_deps: false,
        }
    }

    /// Check if a single path component marks the path hidden.
    pub fn is_hidden_name(&self, name: &str) -> bool {
        self.hidden_names.iter().any(|hidden| hidden == name)
    }
}
