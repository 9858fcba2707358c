//! Capability resolution.
//!
//! A raw `PluginApi` table is turned once, at load time, into a
//! `ResolvedApi`: one typed group of non-null function pointers per
//! capability the module implements. Dispatch code can only reach a
//! function through the group of a capability that was actually resolved.

use std::fmt;
use std::ops::BitOr;

use sysplug_core::event::{EventCodes, EventSourceSet, SYSCALL_SOURCE_NAME, PLUGIN_EVENT_CODE};
use tracing::debug;

use crate::abi::{self, PluginApi};
use crate::error::{PluginError, PluginResult};

/// Capability bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    pub const SOURCING: Capabilities = Capabilities(1 << 0);
    pub const EXTRACTION: Capabilities = Capabilities(1 << 1);
    pub const PARSING: Capabilities = Capabilities(1 << 2);

    #[inline]
    pub fn contains(self, other: Capabilities) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// Returns true if any of the bits of `other` is set.
    #[inline]
    pub fn intersects(self, other: Capabilities) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Capabilities) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Names of the capabilities set, in a stable order.
    pub fn names(self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.contains(Self::SOURCING) {
            names.push("sourcing");
        }
        if self.contains(Self::EXTRACTION) {
            names.push("extraction");
        }
        if self.contains(Self::PARSING) {
            names.push("parsing");
        }
        names
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        Capabilities(self.0 | rhs.0)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.names().join("|"))
    }
}

/// Functions every module must export.
#[derive(Debug, Clone, Copy)]
pub struct CommonApi {
    pub get_required_api_version: abi::GetStrFn,
    pub get_version: abi::GetStrFn,
    pub get_name: abi::GetStrFn,
    pub get_description: abi::GetStrFn,
    pub get_contact: abi::GetStrFn,
    pub init: abi::InitFn,
    pub destroy: abi::DestroyFn,
    pub get_last_error: abi::GetLastErrorFn,
    pub get_init_schema: Option<abi::GetInitSchemaFn>,
}

#[derive(Debug, Clone, Copy)]
pub struct SourcingApi {
    pub open: abi::OpenFn,
    pub close: abi::CloseFn,
    pub next_batch: abi::NextBatchFn,
    pub get_id: Option<abi::GetIdFn>,
    pub get_event_source: Option<abi::GetStrFn>,
    pub list_open_params: Option<abi::ListOpenParamsFn>,
    pub get_progress: Option<abi::GetProgressFn>,
    pub event_to_string: Option<abi::EventToStringFn>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractionApi {
    pub get_fields: abi::GetStrFn,
    pub extract_fields: abi::ExtractFieldsFn,
    pub get_extract_event_sources: Option<abi::GetStrFn>,
    pub get_extract_event_types: Option<abi::GetEventTypesFn>,
}

#[derive(Debug, Clone, Copy)]
pub struct ParsingApi {
    pub parse_event: abi::ParseEventFn,
    pub get_parse_event_sources: Option<abi::GetStrFn>,
    pub get_parse_event_types: Option<abi::GetEventTypesFn>,
}

/// Typed view of a module's function table.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedApi {
    pub common: CommonApi,
    pub sourcing: Option<SourcingApi>,
    pub extraction: Option<ExtractionApi>,
    pub parsing: Option<ParsingApi>,
}

fn require<T>(f: Option<T>, symbol: &'static str) -> PluginResult<T> {
    f.ok_or(PluginError::MissingSymbol { symbol })
}

fn require_for<T>(f: Option<T>, capability: &'static str, symbol: &'static str) -> PluginResult<T> {
    f.ok_or(PluginError::IncompleteCapability { capability, symbol })
}

impl ResolvedApi {
    /// Checks the table and groups its functions by capability.
    ///
    /// A capability counts as advertised as soon as any of its functions is
    /// present; all of its mandatory functions must then be present too.
    pub fn resolve(api: &PluginApi) -> PluginResult<Self> {
        let common = CommonApi {
            get_required_api_version: require(
                api.get_required_api_version,
                "get_required_api_version",
            )?,
            get_version: require(api.get_version, "get_version")?,
            get_name: require(api.get_name, "get_name")?,
            get_description: require(api.get_description, "get_description")?,
            get_contact: require(api.get_contact, "get_contact")?,
            init: require(api.init, "init")?,
            destroy: require(api.destroy, "destroy")?,
            get_last_error: require(api.get_last_error, "get_last_error")?,
            get_init_schema: api.get_init_schema,
        };

        let advertises_sourcing = api.open.is_some()
            || api.close.is_some()
            || api.next_batch.is_some()
            || api.get_id.is_some()
            || api.get_event_source.is_some()
            || api.list_open_params.is_some()
            || api.get_progress.is_some()
            || api.event_to_string.is_some();
        let sourcing = if advertises_sourcing {
            Some(SourcingApi {
                open: require_for(api.open, "sourcing", "open")?,
                close: require_for(api.close, "sourcing", "close")?,
                next_batch: require_for(api.next_batch, "sourcing", "next_batch")?,
                get_id: api.get_id,
                get_event_source: api.get_event_source,
                list_open_params: api.list_open_params,
                get_progress: api.get_progress,
                event_to_string: api.event_to_string,
            })
        } else {
            None
        };

        let advertises_extraction = api.get_fields.is_some()
            || api.extract_fields.is_some()
            || api.get_extract_event_sources.is_some()
            || api.get_extract_event_types.is_some();
        let extraction = if advertises_extraction {
            Some(ExtractionApi {
                get_fields: require_for(api.get_fields, "extraction", "get_fields")?,
                extract_fields: require_for(api.extract_fields, "extraction", "extract_fields")?,
                get_extract_event_sources: api.get_extract_event_sources,
                get_extract_event_types: api.get_extract_event_types,
            })
        } else {
            None
        };

        let advertises_parsing = api.parse_event.is_some()
            || api.get_parse_event_sources.is_some()
            || api.get_parse_event_types.is_some();
        let parsing = if advertises_parsing {
            Some(ParsingApi {
                parse_event: require_for(api.parse_event, "parsing", "parse_event")?,
                get_parse_event_sources: api.get_parse_event_sources,
                get_parse_event_types: api.get_parse_event_types,
            })
        } else {
            None
        };

        let resolved = ResolvedApi {
            common,
            sourcing,
            extraction,
            parsing,
        };
        if resolved.capabilities().is_empty() {
            return Err(PluginError::NoCapabilities);
        }
        Ok(resolved)
    }

    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::NONE;
        if self.sourcing.is_some() {
            caps.insert(Capabilities::SOURCING);
        }
        if self.extraction.is_some() {
            caps.insert(Capabilities::EXTRACTION);
        }
        if self.parsing.is_some() {
            caps.insert(Capabilities::PARSING);
        }
        caps
    }
}

/// Identity of a sourcing plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcingIdentity {
    /// Numeric source id, 0 when the plugin has no distinguishing source
    pub id: u32,
    /// Name of the event source, empty when `id` is 0
    pub event_source: String,
}

impl SourcingIdentity {
    pub fn resolve(api: &SourcingApi) -> Self {
        match (api.get_id, api.get_event_source) {
            (Some(get_id), Some(get_event_source)) => {
                let id = unsafe { get_id() };
                if id == 0 {
                    return Self::default();
                }
                let event_source = unsafe { abi::string_from_module(get_event_source()) };
                Self { id, event_source }
            }
            _ => Self::default(),
        }
    }
}

/// Event sources and event codes a capability applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventScope {
    pub sources: EventSourceSet,
    pub codes: EventCodes,
}

/// Resolves the compatible sources and codes of the extraction or parsing
/// capability.
///
/// The plugin's own event source (if any) is always added to the declared
/// sources. Without explicitly declared codes, a scope that covers the
/// syscall source applies to every code; any other scope only applies to
/// plugin events.
pub(crate) fn resolve_event_scope(
    plugin: &str,
    symbol: &str,
    get_sources: Option<abi::GetStrFn>,
    get_codes: Option<abi::GetEventTypesFn>,
    own_source: Option<&str>,
) -> PluginResult<EventScope> {
    let declared = match get_sources {
        Some(get_sources) => unsafe { abi::string_from_module(get_sources()) },
        None => String::new(),
    };
    let mut sources = parse_source_list(plugin, symbol, &declared)?;
    if let Some(own) = own_source {
        sources.insert(own);
    }

    let mut explicit = Vec::new();
    if let Some(get_codes) = get_codes {
        let mut ntypes: u32 = 0;
        let types = unsafe { get_codes(&mut ntypes) };
        if !types.is_null() && ntypes > 0 {
            let types = unsafe { std::slice::from_raw_parts(types, ntypes as usize) };
            explicit.extend_from_slice(types);
        }
    }

    let codes = if !explicit.is_empty() {
        EventCodes::from_codes(explicit)
    } else if sources.is_compatible(SYSCALL_SOURCE_NAME) {
        EventCodes::All
    } else {
        EventCodes::from_codes([PLUGIN_EVENT_CODE])
    };

    debug!(plugin, symbol, ?sources, ?codes, "resolved event scope");
    Ok(EventScope { sources, codes })
}

fn parse_source_list(plugin: &str, symbol: &str, json: &str) -> PluginResult<EventSourceSet> {
    let mut sources = EventSourceSet::new();
    if json.is_empty() {
        return Ok(sources);
    }

    let not_array = || PluginError::schema(plugin, format!("'{}' did not return a json array", symbol));
    let root: serde_json::Value = serde_json::from_str(json).map_err(|_| not_array())?;
    let entries = root.as_array().ok_or_else(not_array)?;
    for entry in entries {
        let source = entry.as_str().ok_or_else(not_array)?;
        sources.insert(source);
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::raw::c_char;

    unsafe extern "C" fn no_sources() -> *const c_char {
        std::ptr::null()
    }

    unsafe extern "C" fn k8s_sources() -> *const c_char {
        b"[\"k8s_audit\", \"\"]\0".as_ptr() as *const c_char
    }

    unsafe extern "C" fn bad_sources() -> *const c_char {
        b"[\"k8s_audit\", 3]\0".as_ptr() as *const c_char
    }

    unsafe extern "C" fn object_sources() -> *const c_char {
        b"{\"k8s_audit\": true}\0".as_ptr() as *const c_char
    }

    static CODES: [u16; 2] = [1, 2];

    unsafe extern "C" fn two_codes(n: *mut u32) -> *const u16 {
        *n = CODES.len() as u32;
        CODES.as_ptr()
    }

    unsafe extern "C" fn no_codes(n: *mut u32) -> *const u16 {
        *n = 0;
        std::ptr::null()
    }

    #[test]
    fn test_capabilities_bits() {
        let caps = Capabilities::SOURCING | Capabilities::EXTRACTION;
        assert!(caps.contains(Capabilities::SOURCING));
        assert!(!caps.contains(Capabilities::PARSING));
        assert!(caps.intersects(Capabilities::PARSING | Capabilities::EXTRACTION));
        assert!(!caps.contains(Capabilities::NONE));
        assert_eq!(caps.to_string(), "sourcing|extraction");
        assert_eq!(Capabilities::NONE.to_string(), "none");
    }

    #[test]
    fn test_resolve_empty_table() {
        let err = ResolvedApi::resolve(&PluginApi::default()).unwrap_err();
        assert!(matches!(
            err,
            PluginError::MissingSymbol {
                symbol: "get_required_api_version"
            }
        ));
    }

    #[test]
    fn test_scope_defaults_to_syscall_when_no_sources() {
        let scope = resolve_event_scope("p", "get_extract_event_sources", Some(no_sources), None, None)
            .unwrap();
        assert!(scope.sources.is_empty());
        assert_eq!(scope.codes, EventCodes::All);
    }

    #[test]
    fn test_scope_own_source_without_codes() {
        let scope = resolve_event_scope(
            "p",
            "get_extract_event_sources",
            None,
            Some(no_codes),
            Some("dummy"),
        )
        .unwrap();
        assert!(scope.sources.contains("dummy"));
        assert_eq!(scope.codes, EventCodes::from_codes([PLUGIN_EVENT_CODE]));
    }

    #[test]
    fn test_scope_own_syscall_source_means_all_codes() {
        let scope =
            resolve_event_scope("p", "get_extract_event_sources", None, None, Some("syscall"))
                .unwrap();
        assert_eq!(scope.sources.len(), 1);
        assert!(scope.sources.contains("syscall"));
        assert!(scope.codes.is_all());
    }

    #[test]
    fn test_scope_explicit_codes_and_sources() {
        let scope = resolve_event_scope(
            "p",
            "get_parse_event_sources",
            Some(k8s_sources),
            Some(two_codes),
            None,
        )
        .unwrap();
        assert_eq!(scope.sources.len(), 1);
        assert!(scope.sources.contains("k8s_audit"));
        assert_eq!(scope.codes, EventCodes::from_codes([1, 2]));
    }

    #[test]
    fn test_scope_rejects_malformed_sources() {
        for bad in [bad_sources as abi::GetStrFn, object_sources] {
            let err = resolve_event_scope("myplugin", "get_extract_event_sources", Some(bad), None, None)
                .unwrap_err();
            assert_eq!(
                err.to_string(),
                "error in plugin myplugin: 'get_extract_event_sources' did not return a json array"
            );
        }
    }
}
