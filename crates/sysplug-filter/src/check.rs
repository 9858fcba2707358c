//! Filter checks backed by a plugin's extraction capability.

use memchr::memchr;
use std::ffi::CString;
use std::fmt;
use std::ptr;
use std::sync::Arc;
use sysplug_core::event::{Event, EventSources};
use sysplug_plugin_api::abi::{ExtractField, ExtractResult, PLUGIN_FALSE, PLUGIN_TRUE};
use sysplug_plugin_api::{Capabilities, FieldInfo, Plugin};
use tracing::debug;

use crate::error::{FilterError, FilterResult, IndexError};
use crate::value::{decode_values, FieldValue};

/// Parses a numeric field argument.
///
/// Only canonical decimal numbers are indexes: `0` is valid, `01` is not.
pub fn parse_index(arg: &str) -> Result<u64, IndexError> {
    if !arg.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IndexError::NotDigits);
    }
    if arg.is_empty() || (arg.len() > 1 && arg.starts_with('0')) {
        return Err(IndexError::LeadingZero);
    }
    arg.parse::<u64>().map_err(|_| IndexError::Overflow)
}

/// Argument given to a field in a filter, as in `proc.arg[2]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldArgument {
    text: String,
    index: u64,
    key: Option<CString>,
}

impl FieldArgument {
    /// The argument text between the brackets.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Numeric index, 0 unless the field takes an index.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// String key, set only when the field takes a key.
    pub fn key(&self) -> Option<&str> {
        self.key.as_ref().and_then(|k| k.to_str().ok())
    }
}

/// Extraction counters of one check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Total extraction attempts
    pub total: u64,
    /// Attempts that produced at least one value
    pub extracted: u64,
    /// Events rejected on source or event code without calling the module
    pub rejected: u64,
    /// Module calls that failed or returned nothing
    pub empty: u64,
}

impl fmt::Display for ExtractStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExtractStats(total: {}, extracted: {}, rejected: {}, empty: {})",
            self.total, self.extracted, self.rejected, self.empty
        )
    }
}

/// A compiled reference to one plugin field inside a filter.
///
/// Each filter expression owns its check; clones start with the source
/// compatibility cache of the check they were cloned from.
#[derive(Debug, Clone)]
pub struct PluginFieldCheck {
    plugin: Arc<Plugin>,
    sources: EventSources,
    field_id: Option<usize>,
    field_name: CString,
    argument: Option<FieldArgument>,
    /// Compatibility of each event source index seen so far
    compatible_sources: Vec<bool>,
    stats: ExtractStats,
}

impl PluginFieldCheck {
    /// Creates a check for the fields of an extraction plugin.
    pub fn new(plugin: Arc<Plugin>, sources: EventSources) -> FilterResult<Self> {
        if !plugin.capabilities().contains(Capabilities::EXTRACTION) {
            return Err(FilterError::NotExtractionCapable(plugin.name().to_string()));
        }
        Ok(Self {
            plugin,
            sources,
            field_id: None,
            field_name: CString::default(),
            argument: None,
            compatible_sources: Vec::new(),
            stats: ExtractStats::default(),
        })
    }

    /// Name of the field class in listings.
    pub fn info_name(&self) -> String {
        format!("{} (plugin)", self.plugin.name())
    }

    pub fn plugin(&self) -> &Arc<Plugin> {
        &self.plugin
    }

    pub fn fields(&self) -> &[FieldInfo] {
        self.plugin.fields()
    }

    /// The field selected by the last successful parse.
    pub fn field(&self) -> Option<&FieldInfo> {
        self.field_id.and_then(|id| self.plugin.fields().get(id))
    }

    pub fn field_id(&self) -> Option<usize> {
        self.field_id
    }

    pub fn argument(&self) -> Option<&FieldArgument> {
        self.argument.as_ref()
    }

    pub fn stats(&self) -> ExtractStats {
        self.stats
    }

    /// Matches a field reference at the start of `text`.
    ///
    /// Returns the number of bytes consumed, or `None` when `text` does not
    /// start with one of the plugin's fields. The longest matching field
    /// name wins. An argument must follow the name directly.
    pub fn parse_field_name(&mut self, text: &str) -> FilterResult<Option<usize>> {
        self.argument = None;

        let Some((field_id, field)) = self
            .plugin
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| text.starts_with(f.name.as_str()))
            .max_by_key(|(_, f)| f.name.len())
        else {
            return Ok(None);
        };
        self.field_name = CString::new(field.name.as_str())
            .map_err(|_| FilterError::InvalidFieldName(field.name.clone()))?;
        self.field_id = Some(field_id);

        // the reference ends at the first space
        let word = match memchr(b' ', text.as_bytes()) {
            Some(end) => &text[..end],
            None => text,
        };
        let name_len = field.name.len();

        if word.as_bytes().get(name_len) != Some(&b'[') {
            if field.arg_required() {
                return Err(FilterError::ArgumentRequired {
                    filter: text.to_string(),
                    field: field.name.clone(),
                });
            }
            return Ok(Some(name_len));
        }

        let rest = &word[name_len + 1..];
        let Some(close) = memchr(b']', rest.as_bytes()) else {
            return Err(FilterError::MalformedArgument {
                filter: text.to_string(),
                field: field.name.clone(),
            });
        };
        let arg = &rest[..close];

        if !field.arg_allowed() && !field.arg_required() {
            return Err(FilterError::ArgumentNotAllowed {
                filter: text.to_string(),
                field: field.name.clone(),
                argument: arg.to_string(),
            });
        }

        let mut argument = FieldArgument {
            text: arg.to_string(),
            index: 0,
            key: None,
        };
        if field.arg_is_index() {
            argument.index = parse_index(arg).map_err(|reason| FilterError::InvalidIndex {
                filter: text.to_string(),
                field: field.name.clone(),
                argument: arg.to_string(),
                reason,
            })?;
        }
        if field.arg_is_key() {
            let key = CString::new(arg).map_err(|_| FilterError::MalformedArgument {
                filter: text.to_string(),
                field: field.name.clone(),
            })?;
            argument.key = Some(key);
        }
        self.argument = Some(argument);

        Ok(Some(name_len + 1 + close + 1))
    }

    /// Whether events from source `idx` may carry this plugin's fields.
    fn source_compatible(&mut self, idx: u32) -> bool {
        let idx = idx as usize;
        if idx >= self.sources.len() {
            return false;
        }
        while self.compatible_sources.len() <= idx {
            let next = self.compatible_sources.len() as u32;
            let compatible = self
                .sources
                .name(next)
                .is_some_and(|name| self.plugin.extract_event_sources().is_compatible(&name));
            self.compatible_sources.push(compatible);
        }
        self.compatible_sources[idx]
    }

    /// Extracts the selected field from `evt`.
    ///
    /// Returns `None` when the event is not relevant to the plugin, or the
    /// module produced no value.
    pub fn extract(&mut self, evt: &Event<'_>) -> FilterResult<Option<Vec<FieldValue>>> {
        let plugin = Arc::clone(&self.plugin);
        let field = self
            .field_id
            .and_then(|id| plugin.fields().get(id))
            .ok_or(FilterError::NoField)?;
        self.stats.total += 1;

        let Some(source_idx) = evt.source_idx else {
            self.stats.rejected += 1;
            return Ok(None);
        };
        if !plugin.extract_event_codes().contains(evt.event_type)
            || !self.source_compatible(source_idx)
        {
            self.stats.rejected += 1;
            return Ok(None);
        }

        let argument = self.argument.as_ref();
        let mut request = [ExtractField {
            res: ExtractResult { u64: ptr::null() },
            res_len: 0,
            field_id: self.field_id.unwrap_or_default() as u32,
            field: self.field_name.as_ptr(),
            arg_key: argument
                .and_then(|a| a.key.as_ref())
                .map_or(ptr::null(), |k| k.as_ptr()),
            arg_index: argument.map_or(0, |a| a.index),
            arg_present: if argument.is_some() { PLUGIN_TRUE } else { PLUGIN_FALSE },
            ftype: field.field_type.code(),
            flist: if field.is_list() { PLUGIN_TRUE } else { PLUGIN_FALSE },
        }];

        if !plugin.extract_fields(evt, &mut request)? || request[0].res_len == 0 {
            debug!(
                plugin = plugin.name(),
                field = %field.name,
                evtnum = evt.num,
                "no value extracted"
            );
            self.stats.empty += 1;
            return Ok(None);
        }

        let values = unsafe { decode_values(&request[0]) }?;
        self.stats.extracted += 1;
        Ok(Some(values))
    }
}
