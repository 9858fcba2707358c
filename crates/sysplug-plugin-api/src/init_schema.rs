//! Init config validation against the schema a module declares.

use jsonschema::JSONSchema;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::abi::{SCHEMA_JSON, SCHEMA_NONE};
use crate::error::{PluginError, PluginResult};

/// Kind of schema returned by `get_init_schema`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    None,
    Json,
    Unknown(u32),
}

impl SchemaType {
    pub fn from_code(code: u32) -> Self {
        match code {
            SCHEMA_NONE => Self::None,
            SCHEMA_JSON => Self::Json,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::None => SCHEMA_NONE,
            Self::Json => SCHEMA_JSON,
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Json => f.write_str("json"),
            Self::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// Validates an init config and returns the config to pass to `init`.
///
/// Without a schema the config is returned unchanged. With a JSON schema an
/// empty config is treated as `{}`, and only the first violation is
/// reported.
pub fn validate_init_config(
    plugin: &str,
    schema_type: SchemaType,
    schema: &str,
    config: &str,
) -> PluginResult<String> {
    if schema.is_empty() {
        return Ok(config.to_string());
    }
    match schema_type {
        SchemaType::None => Ok(config.to_string()),
        SchemaType::Json => validate_json_schema(plugin, schema, config),
        SchemaType::Unknown(code) => Err(PluginError::schema(
            plugin,
            format!("get_init_schema returned an unknown schema type {}", code),
        )),
    }
}

fn validate_json_schema(plugin: &str, schema: &str, config: &str) -> PluginResult<String> {
    let schema: Value = serde_json::from_str(schema)
        .ok()
        .filter(Value::is_object)
        .ok_or_else(|| PluginError::schema(plugin, "get_init_schema did not return a json object"))?;

    let config = if config.is_empty() { "{}" } else { config };
    let instance: Value = serde_json::from_str(config)
        .map_err(|_| PluginError::schema(plugin, "init config is not a valid json"))?;

    let compiled = JSONSchema::compile(&schema).map_err(|e| {
        PluginError::schema(
            plugin,
            format!("get_init_schema returned an invalid json schema: {}", e),
        )
    })?;

    if let Err(mut errors) = compiled.validate(&instance) {
        let failure = errors.next().map(|e| {
            let path = e.instance_path.to_string();
            let path = if path.is_empty() { "/".to_string() } else { path };
            (path, e.to_string())
        });
        return Err(match failure {
            Some((path, reason)) => PluginError::InitConfig {
                plugin: plugin.to_string(),
                path,
                reason,
            },
            None => PluginError::schema(
                plugin,
                "init config: failed parsing with provided schema",
            ),
        });
    }

    debug!(plugin, "init config matches schema");
    Ok(config.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"{
        "type": "object",
        "properties": {
            "jitter": {"type": "integer"},
            "name": {"type": "string"}
        },
        "required": ["jitter"],
        "additionalProperties": false
    }"#;

    #[test]
    fn test_no_schema_passes_through() {
        let out = validate_init_config("dummy", SchemaType::None, SCHEMA, "not json").unwrap();
        assert_eq!(out, "not json");
        let out = validate_init_config("dummy", SchemaType::Json, "", "").unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn test_valid_config() {
        let out =
            validate_init_config("dummy", SchemaType::Json, SCHEMA, r#"{"jitter": 10}"#).unwrap();
        assert_eq!(out, r#"{"jitter": 10}"#);
    }

    #[test]
    fn test_empty_config_is_empty_object() {
        let permissive = r#"{"type": "object"}"#;
        assert_eq!(
            validate_init_config("dummy", SchemaType::Json, permissive, "").unwrap(),
            "{}"
        );

        let empty = validate_init_config("dummy", SchemaType::Json, SCHEMA, "").unwrap_err();
        let object = validate_init_config("dummy", SchemaType::Json, SCHEMA, "{}").unwrap_err();
        assert_eq!(empty.to_string(), object.to_string());
    }

    #[test]
    fn test_violation_names_path() {
        let err = validate_init_config("dummy", SchemaType::Json, SCHEMA, r#"{"jitter": "x"}"#)
            .unwrap_err();
        match err {
            PluginError::InitConfig { plugin, path, .. } => {
                assert_eq!(plugin, "dummy");
                assert_eq!(path, "/jitter");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let err = validate_init_config("dummy", SchemaType::Json, "[1]", "{}").unwrap_err();
        assert_eq!(
            err.to_string(),
            "error in plugin dummy: get_init_schema did not return a json object"
        );

        let err = validate_init_config("dummy", SchemaType::Json, SCHEMA, "{oops").unwrap_err();
        assert_eq!(err.to_string(), "error in plugin dummy: init config is not a valid json");

        let err = validate_init_config("dummy", SchemaType::Unknown(7), SCHEMA, "{}").unwrap_err();
        assert_eq!(
            err.to_string(),
            "error in plugin dummy: get_init_schema returned an unknown schema type 7"
        );
    }

    #[test]
    fn test_schema_type_codes() {
        assert_eq!(SchemaType::from_code(0), SchemaType::None);
        assert_eq!(SchemaType::from_code(1), SchemaType::Json);
        assert_eq!(SchemaType::from_code(9), SchemaType::Unknown(9));
        assert_eq!(SchemaType::Unknown(9).code(), 9);
    }
}
