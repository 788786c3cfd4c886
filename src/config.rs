//! Per-repository settings, stored as YAML inside the git directory.

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the settings file inside the git directory.
pub const CONFIG_FILE: &str = "git-tkt.yaml";

pub const DEFAULT_BRANCH: &str = "git-tkt";
pub const DEFAULT_FOLDER: &str = "active";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Branch holding the tickets
    pub branch: String,

    /// Folder used when a command names none
    pub default_folder: String,

    /// YAML field schema; the built-in schema when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            branch: DEFAULT_BRANCH.to_string(),
            default_folder: DEFAULT_FOLDER.to_string(),
            fields_file: None,
        }
    }
}

impl Config {
    pub fn path(git_dir: &Path) -> PathBuf {
        git_dir.join(CONFIG_FILE)
    }

    /// Load settings, falling back to defaults when no file exists.
    pub fn load(git_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(git_dir);
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml { path, source })
    }

    pub fn save(&self, git_dir: &Path) -> Result<PathBuf, ConfigError> {
        let path = Self::path(git_dir);
        let text = serde_yaml::to_string(self).map_err(|source| ConfigError::Yaml {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, text).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Saved config to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.branch, "git-tkt");
        assert_eq!(config.default_folder, "active");
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            branch: "tickets".into(),
            default_folder: "archived".into(),
            fields_file: Some(PathBuf::from("fields.yaml")),
        };
        let path = config.save(dir.path()).unwrap();
        assert_eq!(path, dir.path().join(CONFIG_FILE));
        assert_eq!(Config::load(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "branch: issues\n").unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.branch, "issues");
        assert_eq!(config.default_folder, "active");
        assert_eq!(config.fields_file, None);
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "branch: [unclosed\n").unwrap();
        assert!(matches!(Config::load(dir.path()), Err(ConfigError::Yaml { .. })));
    }
}
