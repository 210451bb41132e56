//! Engine configuration.
//!
//! Values are layered, highest precedence first:
//! - environment variables (`GITIT_REPOS_ROOT`, `GITIT_DEFAULT_BRANCH`,
//!   `GITIT_CONTEXT_LINES`, `GITIT_MAX_TREE_DEPTH`)
//! - the TOML file named by `GITIT_CONFIG`
//! - `./gitit.toml`
//! - built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diff::DEFAULT_MAX_TREE_DEPTH;
use crate::line_diff::DEFAULT_CONTEXT_LINES;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_FILE_ENV: &str = "GITIT_CONFIG";

const LOCAL_CONFIG_FILE: &str = "gitit.toml";

/// Settings shared by the repository workspace and the diff engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Directory holding one repository per learner.
    pub repos_root: PathBuf,
    /// Branch new repositories start on.
    pub default_branch: String,
    /// Unchanged lines kept around each hunk.
    pub context_lines: u32,
    /// Deepest directory nesting a tree walk will follow.
    pub max_tree_depth: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            repos_root: PathBuf::from("repos"),
            default_branch: "main".to_owned(),
            context_lines: DEFAULT_CONTEXT_LINES,
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
        }
    }
}

impl CoreConfig {
    /// Parse configuration from TOML text; missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or mistyped values.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_owned(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file layer (if any) and then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when a configuration file exists but is invalid, or an
    /// environment override cannot be parsed.
    pub fn load_with_layers() -> Result<Self, ConfigError> {
        let mut config = Self::load_file_layer()?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file_layer() -> Result<Self, ConfigError> {
        if let Ok(explicit) = std::env::var(CONFIG_FILE_ENV) {
            let path = Path::new(&explicit);
            if path.exists() {
                tracing::info!(path = %explicit, "loading configuration from {CONFIG_FILE_ENV}");
                return Self::from_toml_file(path);
            }
            tracing::warn!(path = %explicit, "{CONFIG_FILE_ENV} specified but not found");
        }

        let local = Path::new(LOCAL_CONFIG_FILE);
        if local.exists() {
            tracing::info!("loading configuration from ./{LOCAL_CONFIG_FILE}");
            return Self::from_toml_file(local);
        }

        tracing::debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Apply overrides from a key lookup (the process environment in
    /// [`CoreConfig::load_with_layers`]).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unparseable numbers or empty
    /// strings.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("GITIT_REPOS_ROOT") {
            self.repos_root = PathBuf::from(root);
        }
        if let Some(branch) = lookup("GITIT_DEFAULT_BRANCH") {
            self.default_branch = branch;
        }
        if let Some(raw) = lookup("GITIT_CONTEXT_LINES") {
            self.context_lines = parse_number("GITIT_CONTEXT_LINES", &raw)?;
        }
        if let Some(raw) = lookup("GITIT_MAX_TREE_DEPTH") {
            self.max_tree_depth = parse_number("GITIT_MAX_TREE_DEPTH", &raw)?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.repos_root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "repos_root".to_owned(),
                value: String::new(),
                reason: "repository root must not be empty".to_owned(),
            });
        }
        if self.default_branch.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "default_branch".to_owned(),
                value: self.default_branch.clone(),
                reason: "branch name must not be empty".to_owned(),
            });
        }
        if self.max_tree_depth == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_tree_depth".to_owned(),
                value: "0".to_owned(),
                reason: "depth limit must allow the root tree".to_owned(),
            });
        }
        Ok(())
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err: T::Err| ConfigError::InvalidValue {
            key: key.to_owned(),
            value: raw.to_owned(),
            reason: err.to_string(),
        })
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File that was requested.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// Configuration file is not valid TOML for [`CoreConfig`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// File that was parsed.
        path: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// A value was present but unusable.
    #[error("invalid value for {key} ({value:?}): {reason}")]
    InvalidValue {
        /// Setting or variable name.
        key: String,
        /// Raw value supplied.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}
