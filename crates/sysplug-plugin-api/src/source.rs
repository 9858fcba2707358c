//! Event sourcing helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ffi::CString;

use crate::abi::{
    self, CloseFn, GetLastErrorFn, NextBatchFn, OpenFn, PluginState, SourceInstance, RC_SUCCESS,
};
use crate::error::{PluginError, PluginResult};

/// Number of payload bytes shown by [`event_preview`].
pub const PREVIEW_LEN: usize = 50;

/// A data source instance a sourcing plugin can be opened against.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenParam {
    pub value: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub separator: String,
}

/// Progress reported by a running source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Progress {
    pub message: String,
    /// 0 to 100
    pub percent: u32,
}

/// Parses the JSON returned by `list_open_params`.
pub(crate) fn parse_open_params(plugin: &str, json: &str) -> PluginResult<Vec<OpenParam>> {
    if json.is_empty() {
        return Ok(Vec::new());
    }

    let not_array = || PluginError::schema(plugin, "list_open_params returned a non-array JSON");
    let root: Value = serde_json::from_str(json).map_err(|_| not_array())?;
    let entries = root.as_array().ok_or_else(not_array)?;

    let text = |entry: &Value, key: &str| {
        entry
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    entries
        .iter()
        .map(|entry| {
            let value = text(entry, "value");
            if value.is_empty() {
                return Err(PluginError::schema(
                    plugin,
                    "list_open_params has entry with no value",
                ));
            }
            Ok(OpenParam {
                value,
                desc: text(entry, "desc"),
                separator: text(entry, "separator"),
            })
        })
        .collect()
}

/// Generic rendering of an event payload.
///
/// Shows the payload length and up to [`PREVIEW_LEN`] bytes of printable
/// ASCII, followed by `...` when the payload is longer. Payloads with a
/// non-printable byte in that range render as `<binary>`.
pub fn event_preview(payload: &[u8]) -> String {
    let shown = &payload[..payload.len().min(PREVIEW_LEN)];
    let mut out = format!("datalen={} data=", payload.len());
    if !shown.iter().all(|b| (0x20..=0x7e).contains(b)) {
        out.push_str("<binary>");
        return out;
    }
    out.extend(shown.iter().map(|&b| b as char));
    if payload.len() > PREVIEW_LEN {
        out.push_str("...");
    }
    out
}

/// What the capture pipeline needs to drive a sourcing plugin.
#[derive(Debug, Clone, Copy)]
pub struct EventSourceDescriptor<'a> {
    pub state: *mut PluginState,
    pub name: &'a str,
    pub id: u32,
    pub open: OpenFn,
    pub close: CloseFn,
    pub get_last_error: GetLastErrorFn,
    pub next_batch: NextBatchFn,
}

impl<'a> EventSourceDescriptor<'a> {
    /// Opens a source instance with the given open parameters.
    ///
    /// # Safety
    ///
    /// The plugin the descriptor came from must still be initialized.
    pub unsafe fn open_instance(&self, params: &str) -> PluginResult<*mut SourceInstance> {
        let params = CString::new(params)
            .map_err(|_| PluginError::schema(self.name, "open params contain a NUL byte"))?;
        let mut rc = RC_SUCCESS;
        let instance = (self.open)(self.state, params.as_ptr(), &mut rc);
        if rc != RC_SUCCESS || instance.is_null() {
            return Err(PluginError::Module {
                plugin: self.name.to_string(),
                operation: "open",
                message: abi::string_from_module((self.get_last_error)(self.state)),
            });
        }
        Ok(instance)
    }

    /// Closes an instance returned by [`open_instance`](Self::open_instance).
    ///
    /// # Safety
    ///
    /// `instance` must come from `open_instance` on the same plugin and must
    /// not be used afterwards.
    pub unsafe fn close_instance(&self, instance: *mut SourceInstance) {
        (self.close)(self.state, instance)
    }
}
