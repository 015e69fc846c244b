use crate::error::{ArborDbError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Database configuration parsed from a JSON config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path of the data directory. Relative paths resolve against the
    /// config file's directory.
    #[serde(default = "default_root")]
    pub root: String,
}

fn default_root() -> String {
    "./".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            root: default_root(),
        }
    }
}

impl Config {
    /// Parse the JSON config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Resolve the data directory for a config file located at
    /// `config_path`.
    pub fn resolve_root(&self, config_path: &Path) -> Result<PathBuf> {
        let root = Path::new(&self.root);
        if root.is_absolute() {
            return Ok(root.to_path_buf());
        }
        let dir = config_path.parent().ok_or_else(|| {
            ArborDbError::Config(format!(
                "Config file {} has no parent directory",
                config_path.display()
            ))
        })?;
        Ok(dir.join(root))
    }
}
