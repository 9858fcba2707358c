//! Module handles.
//!
//! A [`ModuleHandle`] owns loaded native code (or an in-process function
//! table) together with the checked, typed view of its exported functions.

use libloading::Library;
use semver::Version;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::abi::{self, PluginApi, PLUGIN_API_VERSION};
use crate::capabilities::{Capabilities, ResolvedApi};
use crate::error::{PluginError, PluginResult};

/// Loaded module code and its resolved function table.
pub struct ModuleHandle {
    api: ResolvedApi,
    required_api_version: Version,
    path: Option<PathBuf>,
    // dropped last: function pointers in `api` point into it
    _library: Option<Library>,
}

impl ModuleHandle {
    /// Opens a dynamic module and resolves its `plugin_*` symbols.
    pub fn load(path: impl AsRef<Path>) -> PluginResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading plugin module");

        let library = unsafe { Library::new(path) }.map_err(|e| {
            PluginError::LoadError(format!(
                "can't load plugin dynamic library {}: {}",
                path.display(),
                e
            ))
        })?;
        let api = unsafe { resolve_symbols(&library) };
        Self::with_api(api, Some(path.to_path_buf()), Some(library))
    }

    /// Wraps a function table provided in-process.
    pub fn from_api(api: PluginApi) -> PluginResult<Self> {
        Self::with_api(api, None, None)
    }

    fn with_api(api: PluginApi, path: Option<PathBuf>, library: Option<Library>) -> PluginResult<Self> {
        let get_required_api_version = api
            .get_required_api_version
            .ok_or(PluginError::MissingSymbol {
                symbol: "get_required_api_version",
            })?;
        let required = unsafe { abi::string_from_module(get_required_api_version()) };
        let required_api_version = check_api_version(&required)?;

        let api = ResolvedApi::resolve(&api)?;
        debug!(
            required_api_version = %required_api_version,
            capabilities = %api.capabilities(),
            "resolved plugin function table"
        );

        Ok(Self {
            api,
            required_api_version,
            path,
            _library: library,
        })
    }

    pub fn api(&self) -> &ResolvedApi {
        &self.api
    }

    pub fn capabilities(&self) -> Capabilities {
        self.api.capabilities()
    }

    pub fn required_api_version(&self) -> &Version {
        &self.required_api_version
    }

    /// Path the module was loaded from, `None` for in-process modules.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("path", &self.path)
            .field("required_api_version", &self.required_api_version)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// Checks a module's required API version against the engine's.
///
/// Compatible when the major versions match and the required version is
/// not newer than the engine's.
pub fn check_api_version(required: &str) -> PluginResult<Version> {
    let supported = Version::parse(PLUGIN_API_VERSION)
        .map_err(|e| PluginError::LoadError(format!("invalid engine API version: {}", e)))?;
    let parsed = Version::parse(required).map_err(|_| {
        PluginError::LoadError(format!(
            "plugin provided an invalid required API version: '{}'",
            required
        ))
    })?;

    let compatible = parsed.major == supported.major
        && (parsed.minor < supported.minor
            || (parsed.minor == supported.minor && parsed.patch <= supported.patch));
    if !compatible {
        return Err(PluginError::IncompatibleApiVersion {
            required: required.to_string(),
            supported: PLUGIN_API_VERSION.to_string(),
        });
    }
    Ok(parsed)
}

unsafe fn symbol<T: Copy>(library: &Library, name: &str) -> Option<T> {
    let name = format!("plugin_{}\0", name);
    library.get::<T>(name.as_bytes()).ok().map(|s| *s)
}

unsafe fn resolve_symbols(library: &Library) -> PluginApi {
    PluginApi {
        get_required_api_version: symbol(library, "get_required_api_version"),
        get_version: symbol(library, "get_version"),
        get_name: symbol(library, "get_name"),
        get_description: symbol(library, "get_description"),
        get_contact: symbol(library, "get_contact"),
        get_init_schema: symbol(library, "get_init_schema"),
        init: symbol(library, "init"),
        destroy: symbol(library, "destroy"),
        get_last_error: symbol(library, "get_last_error"),
        get_id: symbol(library, "get_id"),
        get_event_source: symbol(library, "get_event_source"),
        open: symbol(library, "open"),
        close: symbol(library, "close"),
        list_open_params: symbol(library, "list_open_params"),
        get_progress: symbol(library, "get_progress"),
        event_to_string: symbol(library, "event_to_string"),
        next_batch: symbol(library, "next_batch"),
        get_fields: symbol(library, "get_fields"),
        get_extract_event_types: symbol(library, "get_extract_event_types"),
        get_extract_event_sources: symbol(library, "get_extract_event_sources"),
        extract_fields: symbol(library, "extract_fields"),
        get_parse_event_types: symbol(library, "get_parse_event_types"),
        get_parse_event_sources: symbol(library, "get_parse_event_sources"),
        parse_event: symbol(library, "parse_event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_compatibility() {
        assert!(check_api_version("3.1.0").is_ok());
        assert!(check_api_version("3.0.0").is_ok());
        assert!(check_api_version("3.0.9").is_ok());
        assert!(matches!(
            check_api_version("3.2.0"),
            Err(PluginError::IncompatibleApiVersion { .. })
        ));
        assert!(matches!(
            check_api_version("3.1.1"),
            Err(PluginError::IncompatibleApiVersion { .. })
        ));
        assert!(matches!(
            check_api_version("2.0.0"),
            Err(PluginError::IncompatibleApiVersion { .. })
        ));
        assert!(matches!(
            check_api_version("4.0.0"),
            Err(PluginError::IncompatibleApiVersion { .. })
        ));
    }

    #[test]
    fn test_invalid_api_version() {
        let err = check_api_version("three").unwrap_err();
        assert!(err.to_string().contains("invalid required API version"));
    }

    #[test]
    fn test_load_missing_library() {
        let err = ModuleHandle::load("/nonexistent/libdummy.so").unwrap_err();
        assert!(matches!(err, PluginError::LoadError(_)));
        assert!(err.to_string().contains("/nonexistent/libdummy.so"));
    }

    #[test]
    fn test_from_empty_table() {
        let err = ModuleHandle::from_api(PluginApi::default()).unwrap_err();
        assert!(matches!(
            err,
            PluginError::MissingSymbol {
                symbol: "get_required_api_version"
            }
        ));
    }
}
