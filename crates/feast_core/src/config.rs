//! Runtime configuration.
//!
//! # Responsibility
//! - Describe API endpoint, store location and logging setup.
//! - Load overrides from a TOML file; every field has a default.
//!
//! # Invariants
//! - A validated config has a non-empty base URL, a non-zero timeout and a
//!   non-empty store name.

use crate::store::manager::{StoreOptions, DEFAULT_STORE_NAME};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://uscdata.org/eats/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const LOG_DIR_NAME: &str = "logs";

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config file: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base directory; the store lives in `<directory>/Database`.
    /// Defaults to the user's documents directory.
    pub directory: Option<PathBuf>,
    pub name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: None,
            name: DEFAULT_STORE_NAME.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn base_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(default_base_directory)
    }

    pub fn to_options(&self) -> StoreOptions {
        StoreOptions::new(self.base_directory()).with_store_name(self.name.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace|debug|info|warn|error`; build-mode default when unset.
    pub level: Option<String>,
    /// Absolute log directory; `<documents>/logs` when unset.
    pub directory: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level
            .as_deref()
            .unwrap_or_else(|| crate::logging::default_log_level())
    }

    pub fn log_dir(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| default_base_directory().join(LOG_DIR_NAME))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeastConfig {
    pub api: ApiConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl FeastConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url cannot be empty".to_string()));
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "api.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.store.name.trim().is_empty() {
            return Err(ConfigError::Invalid("store.name cannot be empty".to_string()));
        }
        Ok(())
    }
}

fn default_base_directory() -> PathBuf {
    dirs::document_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
