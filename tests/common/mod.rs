//! Common test utilities and helpers for integration tests

use std::io::Write;
use std::sync::Arc;
use sysplug_plugin_api::testing::MockModule;
use sysplug_plugin_api::{Plugin, PluginManager, PluginResult};
use tempfile::NamedTempFile;

/// Field schema served by the extraction mocks
pub const AUDIT_FIELDS: &str = r#"[
    {"type": "string", "name": "audit.user", "desc": "User name", "display": "User"},
    {"type": "uint64", "name": "audit.arg", "desc": "Indexed argument", "arg": {"isRequired": true, "isIndex": true}}
]"#;

/// Init schema of the audit source mock
pub const AUDIT_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "endpoint": {"type": "string"},
        "jitter": {"type": "integer", "minimum": 0}
    },
    "required": ["endpoint"]
}"#;

/// Write a configuration file for the test
pub fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("Failed to create config file");
    file.write_all(yaml.as_bytes())
        .expect("Failed to write config file");
    file
}

/// Load a mock module into the manager
pub fn register(manager: &PluginManager, mock: &MockModule) -> PluginResult<Arc<Plugin>> {
    let plugin = Plugin::from_api(mock.api(), manager.tables().clone())?;
    manager.register(plugin)
}
