//! Configuration system for jitforge.
//!
//! Load engine configuration from TOML or YAML files to control code
//! generation and host symbol resolution without code changes.
//!
//! # Examples
//!
//! Load configuration from TOML string:
//!
//! ```
//! use jitforge_config::{JitConfig, OptLevel};
//!
//! let config = JitConfig::from_toml_str(r#"
//!     opt_level = "speed_and_size"
//!     verify_ir = false
//!
//!     [host]
//!     search_process = true
//!     allow = ["abs", "labs"]
//! "#).unwrap();
//!
//! assert_eq!(config.opt_level, OptLevel::SpeedAndSize);
//! assert!(config.host.allows("labs"));
//! assert!(!config.host.allows("malloc"));
//! ```
//!
//! Use default config when file is missing:
//!
//! ```
//! use jitforge_config::JitConfig;
//!
//! let config = JitConfig::load("jitforge.toml").unwrap_or_default();
//! // Proceeds with defaults if file doesn't exist
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct JitConfig {
    /// Code generator optimization level.
    #[serde(default)]
    pub opt_level: OptLevel,

    /// Run the code generator's IR verifier on every function.
    #[serde(default = "default_true")]
    pub verify_ir: bool,

    /// Host-process symbol resolution.
    #[serde(default)]
    pub host: HostConfig,
}

fn default_true() -> bool {
    true
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::default(),
            verify_ir: true,
            host: HostConfig::default(),
        }
    }
}

impl JitConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file, parsed as YAML when the extension is
    /// `.yaml` or `.yml` and as TOML otherwise.
    ///
    /// # Errors
    ///
    /// Returns error if file doesn't exist or fails to parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the optimization level.
    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    /// Enables or disables IR verification.
    pub fn with_verify_ir(mut self, verify: bool) -> Self {
        self.verify_ir = verify;
        self
    }

    /// Enables or disables searching the running process image for symbols.
    pub fn with_process_search(mut self, enabled: bool) -> Self {
        self.host.search_process = enabled;
        self
    }

    /// Adds a name to the process symbol allow-list.
    pub fn allow_host_symbol(mut self, name: impl Into<String>) -> Self {
        self.host.allow.push(name.into());
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = self.host.allow.iter().find(|name| name.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "host.allow contains an empty symbol name: {name:?}"
            )));
        }
        Ok(())
    }
}

/// Code generator optimization level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    /// No optimization.
    None,

    /// Optimize for speed.
    #[default]
    Speed,

    /// Optimize for speed and code size.
    SpeedAndSize,
}

impl OptLevel {
    /// The value of the code generator's `opt_level` setting.
    pub fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Host-process symbol resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HostConfig {
    /// Whether symbols exported by the running process are visible to
    /// compiled code.
    #[serde(default = "default_true")]
    pub search_process: bool,

    /// Restricts process lookups to these names. Empty allows everything.
    #[serde(default)]
    pub allow: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            search_process: true,
            allow: Vec::new(),
        }
    }
}

impl HostConfig {
    /// Returns true if `name` may be looked up in the process image.
    pub fn allows(&self, name: &str) -> bool {
        self.search_process && (self.allow.is_empty() || self.allow.iter().any(|a| a == name))
    }
}
