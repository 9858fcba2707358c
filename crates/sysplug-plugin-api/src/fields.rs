//! Field schema declared by extraction plugins.
//!
//! `get_fields` returns a JSON array of field descriptors:
//!
//! ```json
//! [
//!   {"type": "uint64", "name": "dummy.value", "desc": "The value", "display": "Value"},
//!   {"type": "string", "name": "dummy.strval", "desc": "A string", "isList": true,
//!    "arg": {"isRequired": true, "isIndex": true}, "properties": ["hidden"]}
//! ]
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::ops::BitOr;
use tracing::debug;

use crate::abi::type_code;
use crate::error::{PluginError, PluginResult};

/// Value type of an extracted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Uint64,
    RelTime,
    AbsTime,
    Bool,
    Ipv4Addr,
    Ipv4Net,
    Ipv6Addr,
    Ipv6Net,
    IpNet,
}

impl FieldType {
    /// Resolves a schema type name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" => Self::String,
            "uint64" => Self::Uint64,
            "reltime" => Self::RelTime,
            "abstime" => Self::AbsTime,
            "bool" => Self::Bool,
            "ipv4addr" => Self::Ipv4Addr,
            "ipv4net" => Self::Ipv4Net,
            "ipv6addr" => Self::Ipv6Addr,
            "ipv6net" => Self::Ipv6Net,
            "ipnet" => Self::IpNet,
            _ => return None,
        })
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            type_code::CHARBUF => Self::String,
            type_code::UINT64 => Self::Uint64,
            type_code::RELTIME => Self::RelTime,
            type_code::ABSTIME => Self::AbsTime,
            type_code::BOOL => Self::Bool,
            type_code::IPV4ADDR => Self::Ipv4Addr,
            type_code::IPV4NET => Self::Ipv4Net,
            type_code::IPV6ADDR => Self::Ipv6Addr,
            type_code::IPV6NET => Self::Ipv6Net,
            type_code::IPNET => Self::IpNet,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Uint64 => "uint64",
            Self::RelTime => "reltime",
            Self::AbsTime => "abstime",
            Self::Bool => "bool",
            Self::Ipv4Addr => "ipv4addr",
            Self::Ipv4Net => "ipv4net",
            Self::Ipv6Addr => "ipv6addr",
            Self::Ipv6Net => "ipv6net",
            Self::IpNet => "ipnet",
        }
    }

    /// Type code used across the module boundary.
    pub fn code(self) -> u32 {
        match self {
            Self::String => type_code::CHARBUF,
            Self::Uint64 => type_code::UINT64,
            Self::RelTime => type_code::RELTIME,
            Self::AbsTime => type_code::ABSTIME,
            Self::Bool => type_code::BOOL,
            Self::Ipv4Addr => type_code::IPV4ADDR,
            Self::Ipv4Net => type_code::IPV4NET,
            Self::Ipv6Addr => type_code::IPV6ADDR,
            Self::Ipv6Net => type_code::IPV6NET,
            Self::IpNet => type_code::IPNET,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct FieldFlags(u32);

impl FieldFlags {
    pub const NONE: FieldFlags = FieldFlags(0);
    pub const ARG_REQUIRED: FieldFlags = FieldFlags(1 << 0);
    pub const ARG_INDEX: FieldFlags = FieldFlags(1 << 1);
    pub const ARG_KEY: FieldFlags = FieldFlags(1 << 2);
    pub const ARG_ALLOWED: FieldFlags = FieldFlags(1 << 3);
    pub const IS_LIST: FieldFlags = FieldFlags(1 << 4);
    pub const HIDDEN: FieldFlags = FieldFlags(1 << 5);
    pub const INFO: FieldFlags = FieldFlags(1 << 6);
    pub const CONVERSATION: FieldFlags = FieldFlags(1 << 7);

    #[inline]
    pub fn contains(self, other: FieldFlags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: FieldFlags) {
        self.0 |= other.0;
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for FieldFlags {
    type Output = FieldFlags;

    fn bitor(self, rhs: FieldFlags) -> FieldFlags {
        FieldFlags(self.0 | rhs.0)
    }
}

/// A field an extraction plugin can extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub display: String,
    pub description: String,
    pub field_type: FieldType,
    pub flags: FieldFlags,
}

impl FieldInfo {
    pub fn is_list(&self) -> bool {
        self.flags.contains(FieldFlags::IS_LIST)
    }

    pub fn arg_required(&self) -> bool {
        self.flags.contains(FieldFlags::ARG_REQUIRED)
    }

    pub fn arg_allowed(&self) -> bool {
        self.flags.contains(FieldFlags::ARG_ALLOWED)
    }

    pub fn arg_is_index(&self) -> bool {
        self.flags.contains(FieldFlags::ARG_INDEX)
    }

    pub fn arg_is_key(&self) -> bool {
        self.flags.contains(FieldFlags::ARG_KEY)
    }

    pub fn is_hidden(&self) -> bool {
        self.flags.contains(FieldFlags::HIDDEN)
    }
}

/// Parses the field schema returned by `get_fields`.
pub fn parse_fields(plugin: &str, json: &str) -> PluginResult<Vec<FieldInfo>> {
    debug!(plugin, json, "parsing field schema");

    let root: Value = serde_json::from_str(json)
        .map_err(|_| PluginError::schema(plugin, "get_fields returned an invalid JSON"))?;
    let entries = root
        .as_array()
        .ok_or_else(|| PluginError::schema(plugin, "get_fields returned an invalid JSON"))?;

    entries
        .iter()
        .map(|entry| {
            let entry = entry
                .as_object()
                .ok_or_else(|| PluginError::schema(plugin, "field JSON entry is not an object"))?;
            parse_field(plugin, entry)
        })
        .collect()
}

fn non_empty_str<'a>(entry: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn optional_bool(
    plugin: &str,
    field: &str,
    object: &Map<String, Value>,
    key: &str,
) -> PluginResult<Option<bool>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(PluginError::schema(
            plugin,
            format!("field {} {} property is not boolean", field, key),
        )),
    }
}

fn parse_field(plugin: &str, entry: &Map<String, Value>) -> PluginResult<FieldInfo> {
    let ftype = non_empty_str(entry, "type")
        .ok_or_else(|| PluginError::schema(plugin, "field JSON entry has no type"))?;
    let name = non_empty_str(entry, "name")
        .ok_or_else(|| PluginError::schema(plugin, "field JSON entry has no name"))?;
    if name.contains('\0') {
        return Err(PluginError::schema(
            plugin,
            format!("field {:?} name contains a NUL character", name),
        ));
    }
    let description = non_empty_str(entry, "desc")
        .ok_or_else(|| PluginError::schema(plugin, "field JSON entry has no desc"))?;
    let display = entry
        .get("display")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let field_type = FieldType::from_name(ftype)
        .ok_or_else(|| PluginError::schema(plugin, format!("invalid field type {}", ftype)))?;

    let mut flags = FieldFlags::NONE;
    if optional_bool(plugin, name, entry, "isList")? == Some(true) {
        flags.insert(FieldFlags::IS_LIST);
    }

    match entry.get("arg") {
        None | Some(Value::Null) => {}
        Some(Value::Object(arg)) => flags.insert(parse_arg(plugin, name, arg)?),
        Some(_) => {
            return Err(PluginError::schema(
                plugin,
                format!("field {} arg property is not an object", name),
            ))
        }
    }

    match entry.get("properties") {
        None | Some(Value::Null) => {}
        Some(Value::Array(props)) => {
            for prop in props {
                let prop = prop.as_str().ok_or_else(|| {
                    PluginError::schema(
                        plugin,
                        format!("field {} properties value is not string", name),
                    )
                })?;
                // unknown properties are ignored
                match prop {
                    "hidden" => flags.insert(FieldFlags::HIDDEN),
                    "info" => flags.insert(FieldFlags::INFO),
                    "conversation" => flags.insert(FieldFlags::CONVERSATION),
                    _ => {}
                }
            }
        }
        Some(_) => {
            return Err(PluginError::schema(
                plugin,
                format!("field {} properties property is not array", name),
            ))
        }
    }

    Ok(FieldInfo {
        name: name.to_string(),
        display: display.to_string(),
        description: description.to_string(),
        field_type,
        flags,
    })
}

fn parse_arg(plugin: &str, field: &str, arg: &Map<String, Value>) -> PluginResult<FieldFlags> {
    let mut flags = FieldFlags::NONE;
    if optional_bool(plugin, field, arg, "isRequired")? == Some(true) {
        flags.insert(FieldFlags::ARG_REQUIRED);
    }
    if optional_bool(plugin, field, arg, "isIndex")? == Some(true) {
        flags.insert(FieldFlags::ARG_INDEX | FieldFlags::ARG_ALLOWED);
    }
    if optional_bool(plugin, field, arg, "isKey")? == Some(true) {
        flags.insert(FieldFlags::ARG_KEY | FieldFlags::ARG_ALLOWED);
    }

    if flags.contains(FieldFlags::ARG_REQUIRED)
        && !flags.contains(FieldFlags::ARG_INDEX)
        && !flags.contains(FieldFlags::ARG_KEY)
    {
        return Err(PluginError::schema(
            plugin,
            format!(
                "field {} arg has isRequired true, but none of isKey nor isIndex is true",
                field
            ),
        ));
    }
    Ok(flags)
}
