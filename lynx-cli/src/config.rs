//! Configuration file for `lynx-exec`

use lynx_history::HistoryConfig;
use lynx_sandbox::SandboxConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that points at an alternative config file
pub const CONFIG_ENV: &str = "LYNX_EXEC_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine home directory")]
    NoHome,

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Interpreter, limits and workspace layout
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Execution history database
    #[serde(default)]
    pub history: HistoryConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Also write logs to this file
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl AppConfig {
    /// Load from `explicit`, else `$LYNX_EXEC_CONFIG`, else the default
    /// location. A missing file yields the defaults.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<(Self, PathBuf)> {
        let env = std::env::var(CONFIG_ENV).ok();
        let path = Self::resolve_path(explicit, env.as_deref())?;
        let config = Self::load_from(&path)?;
        Ok((config, path))
    }

    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn resolve_path(explicit: Option<&Path>, env: Option<&str>) -> ConfigResult<PathBuf> {
        if let Some(path) = explicit {
            return expand_path(&path.to_string_lossy());
        }
        match env {
            Some(path) if !path.is_empty() => expand_path(path),
            _ => Self::default_path(),
        }
    }

    /// `~/.config/lynx-exec/config.toml`
    pub fn default_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
        Ok(home.join(".config").join("lynx-exec").join("config.toml"))
    }

    /// Sandbox settings with `~` expanded in every path
    pub fn sandbox(&self) -> ConfigResult<SandboxConfig> {
        let mut sandbox = self.sandbox.clone();
        sandbox.interpreter_path = expand_path(&sandbox.interpreter_path.to_string_lossy())?;
        sandbox.workspace_root = expand_path(&sandbox.workspace_root.to_string_lossy())?;
        Ok(sandbox)
    }

    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        expand_path(&self.history.database_path)
    }

    pub fn log_file(&self) -> ConfigResult<Option<PathBuf>> {
        self.logging.file.as_deref().map(expand_path).transpose()
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_path(path: &str) -> ConfigResult<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
        Ok(home.join(rest))
    } else if path == "~" {
        dirs::home_dir().ok_or(ConfigError::NoHome)
    } else {
        Ok(PathBuf::from(path))
    }
}
