use thiserror::Error;

use crate::tables::TableError;

/// Plugin system error types
///
/// Variants fall into four groups: load/ABI failures, schema and config
/// failures, lifecycle misuse by the caller, and failures reported by the
/// module itself.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Failed to load plugin: {0}")]
    LoadError(String),

    #[error("plugin required API version '{required}' not compatible with the framework's API version '{supported}'")]
    IncompatibleApiVersion { required: String, supported: String },

    #[error("plugin is missing required symbol '{symbol}'")]
    MissingSymbol { symbol: &'static str },

    #[error("plugin implements only part of the {capability} capability: missing '{symbol}'")]
    IncompleteCapability {
        capability: &'static str,
        symbol: &'static str,
    },

    #[error("plugin does not implement any capability")]
    NoCapabilities,

    #[error("Invalid plugin metadata: {0}")]
    InvalidMetadata(String),

    #[error("error in plugin {plugin}: {reason}")]
    Schema { plugin: String, reason: String },

    #[error("error in plugin {plugin} init config: In {path}, {reason}")]
    InitConfig {
        plugin: String,
        path: String,
        reason: String,
    },

    #[error("plugin capability used before init: {plugin}")]
    NotInitialized { plugin: String },

    #[error("plugin has been initialized twice: {plugin}")]
    AlreadyInitialized { plugin: String },

    #[error("plugin has been destroyed: {plugin}")]
    Destroyed { plugin: String },

    #[error("Unsupported plugin capability: {0}")]
    UnsupportedCapability(String),

    #[error("Could not initialize plugin: {0}")]
    InitFailed(String),

    #[error("error in plugin {plugin}: {operation} has error {message}")]
    Module {
        plugin: String,
        operation: &'static str,
        message: String,
    },

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

impl PluginError {
    /// Creates a schema error attributed to a plugin.
    pub fn schema(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the caller used the API wrong, as opposed to the
    /// module failing.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            PluginError::NotInitialized { .. }
                | PluginError::AlreadyInitialized { .. }
                | PluginError::Destroyed { .. }
                | PluginError::UnsupportedCapability(_)
        )
    }

    /// Returns true if the module itself reported the failure.
    pub fn is_module_failure(&self) -> bool {
        matches!(self, PluginError::InitFailed(_) | PluginError::Module { .. })
    }
}

pub type PluginResult<T> = Result<T, PluginError>;
