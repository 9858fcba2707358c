//! Configuration management for sysplug.
//!
//! This module provides the configuration system that supports:
//! - Loading from YAML files
//! - Environment variable overrides
//! - Validation of all settings
//! - Plugin definitions and logging configuration

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Main application configuration.
///
/// # Examples
///
/// ```no_run
/// use sysplug_core::config::AppConfig;
///
/// // Load from file
/// let config = AppConfig::from_file("sysplug.yaml").unwrap();
///
/// // Validate before use
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Plugins known to the engine
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,

    /// Names of the plugins to actually load. Empty means every enabled plugin.
    #[serde(default)]
    pub load_plugins: Vec<String>,
}

impl AppConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()).into());
        }
        let contents = std::fs::read_to_string(path)?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate, layering environment
    /// variable overrides (`SYSPLUG__LOGGING__LEVEL=debug`) on top of the file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or merged.
    pub fn from_config_builder<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix("SYSPLUG")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    ///
    /// Checks for:
    /// - Non-empty, unique plugin names
    /// - Non-empty library paths
    /// - `load_plugins` only naming configured plugins
    /// - A parseable log level
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self) -> Result<()> {
        let mut seen_names = HashSet::new();
        for plugin in &self.plugins {
            plugin.validate()?;
            if !seen_names.insert(plugin.name.as_str()) {
                return Err(ConfigError::DuplicatePluginName {
                    name: plugin.name.clone(),
                }
                .into());
            }
        }

        for name in &self.load_plugins {
            if !seen_names.contains(name.as_str()) {
                return Err(ConfigError::invalid_value(
                    "load_plugins",
                    format!("unknown plugin '{}'", name),
                )
                .into());
            }
        }

        self.logging.parse_level()?;

        Ok(())
    }

    /// Returns a plugin configuration by name.
    pub fn get_plugin(&self, name: &str) -> Option<&PluginConfig> {
        self.plugins.iter().find(|p| p.name == name)
    }

    /// Returns the plugins that should be loaded, in declaration order.
    pub fn plugins_to_load(&self) -> Vec<&PluginConfig> {
        self.plugins
            .iter()
            .filter(|p| p.enabled)
            .filter(|p| self.load_plugins.is_empty() || self.load_plugins.contains(&p.name))
            .collect()
    }
}

/// Configuration of a single plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Name used to refer to the plugin in the configuration
    pub name: String,

    /// Path of the dynamic library implementing the plugin
    pub library_path: PathBuf,

    /// Configuration string passed to the plugin's init function
    #[serde(default)]
    pub init_config: InitConfig,

    /// Parameters used when opening the plugin as an event source
    #[serde(default)]
    pub open_params: String,

    /// Whether the plugin is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl PluginConfig {
    /// Creates a plugin configuration with an empty init config.
    pub fn new(name: impl Into<String>, library_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            library_path: library_path.into(),
            init_config: InitConfig::default(),
            open_params: String::new(),
            enabled: true,
        }
    }

    /// Validates a single plugin entry.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::missing_field("plugins[].name").into());
        }
        if self.library_path.as_os_str().is_empty() {
            return Err(ConfigError::invalid_plugin(&self.name, "library_path is empty").into());
        }
        Ok(())
    }
}

/// Plugin init configuration.
///
/// Either a raw string handed verbatim to the plugin, or a structured
/// document that is serialized to JSON first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitConfig {
    Text(String),
    Structured(serde_json::Value),
}

impl Default for InitConfig {
    fn default() -> Self {
        InitConfig::Text(String::new())
    }
}

impl InitConfig {
    /// Renders the configuration as the string passed to the plugin.
    pub fn to_config_string(&self) -> String {
        match self {
            InitConfig::Text(text) => text.clone(),
            InitConfig::Structured(serde_json::Value::Null) => String::new(),
            InitConfig::Structured(value) => value.to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Whether to include timestamps
    #[serde(default = "default_true")]
    pub timestamps: bool,

    /// Per-module log levels
    #[serde(default)]
    pub module_levels: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            timestamps: true,
            module_levels: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                reason: format!("Invalid log level: {}", self.level),
            }
            .into()
        })
    }

    /// Builds an env-filter directive string, e.g. `info,sysplug_plugin_api=debug`.
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.level.clone()];
        let mut modules: Vec<_> = self.module_levels.iter().collect();
        modules.sort();
        for (module, level) in modules {
            directives.push(format!("{}={}", module, level));
        }
        directives.join(",")
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}
