//! Pipeline configuration via `tarflow.toml`
//!
//! The file is located through `--config` or the `TARFLOW_CONFIG`
//! environment variable. Invalid configuration is fatal before any dataset is
//! touched.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "TARFLOW_CONFIG";

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// JSON file holding the catalog (datasets, ledger, metadata)
    pub state_file: PathBuf,
    /// Directory for temporary report files
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
    /// Deployment name shown in reports
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Local backup root; local backup is disabled when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
}

fn default_tmp_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_environment() -> String {
    "production".to_string()
}

/// `[remote]` section: the object store backup destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RemoteConfig {
    /// Bucket name; remote backup is disabled when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Root directory of the directory-backed store
    pub root: PathBuf,
}

/// Configuration loaded from `tarflow.toml`
///
/// # Example
///
/// ```toml
/// [server]
/// state-file = "/srv/tarflow/catalog.json"
/// backup-dir = "/srv/backup"
///
/// [remote]
/// bucket = "tarballs"
/// root = "/srv/objects"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Server settings
    pub server: ServerConfig,
    /// Remote destination, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
}

impl PipelineConfig {
    /// Returns a commented example config file
    pub fn default_toml() -> &'static str {
        r#"# tarflow configuration

[server]
# Catalog of datasets, stage enablement and metadata
state-file = "/srv/tarflow/catalog.json"
# Temporary report files (default: system temp dir)
# tmp-dir = "/srv/tarflow/tmp"
# environment = "production"
# Local backup root; comment out to disable local backup
backup-dir = "/srv/tarflow/backup"

# Remote object store destination; remove `bucket` to disable
[remote]
bucket = "tarballs"
root = "/srv/tarflow/objects"
"#
    }

    /// Parse and validate config text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema or
    /// fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.state_file.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("server.state-file is empty".into()));
        }
        if let Some(dir) = &self.server.backup_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "server.backup-dir must be an absolute path, got {}",
                    dir.display()
                )));
            }
        }
        if let Some(remote) = &self.remote {
            if matches!(&remote.bucket, Some(b) if b.trim().is_empty()) {
                return Err(ConfigError::Invalid("remote.bucket is empty".into()));
            }
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file '{}': {message}", path.display())]
    Read {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        message: String,
    },

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// Config values are inconsistent
    #[error("Invalid config: {0}")]
    Invalid(String),
}
