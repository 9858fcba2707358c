//! The plugin facade.
//!
//! A [`Plugin`] wraps one loaded module. Metadata, field schema and event
//! scopes are read once at load time; everything else goes through the
//! lifecycle:
//!
//! ```text
//! Loaded --init ok--> Initialized --destroy--> Destroyed
//!    |                                            ^
//!    +----init fails--> InitFailed ---destroy-----+
//! ```
//!
//! `init` and `destroy` must not race with each other or with capability
//! calls; the owner serializes them. Capability calls only need `&self`.

use semver::Version;
use serde::Serialize;
use std::ffi::CString;
use std::fmt;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};
use std::sync::Arc;
use sysplug_core::event::{Event, EventCodes, EventSourceSet};
use tracing::{debug, info, warn};

use crate::abi::{
    self, EventInput, EventParseInput, ExtractField, FieldExtractInput, InitInput, InitTablesInput,
    PluginApi, PluginState, SourceInstance, RC_FAILURE, RC_SUCCESS, SCHEMA_NONE,
};
use crate::capabilities::{resolve_event_scope, Capabilities, EventScope, SourcingIdentity};
use crate::error::{PluginError, PluginResult};
use crate::fields::{parse_fields, FieldInfo};
use crate::init_schema::{validate_init_config, SchemaType};
use crate::loader::ModuleHandle;
use crate::source::{event_preview, parse_open_params, EventSourceDescriptor, OpenParam, Progress};
use crate::table_api::{self, OwnerContext};
use crate::tables::TableRegistry;

/// Returned by `get_last_error` when the module has no state to ask.
pub const NO_STATE_ERROR: &str = "Plugin handle or get_last_error function not defined";

/// Lifecycle phase of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Phase {
    Loaded = 0,
    Initialized = 1,
    /// `init` failed; the module state (if any) is kept for `get_last_error`
    InitFailed = 2,
    Destroyed = 3,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Phase::Initialized,
            2 => Phase::InitFailed,
            3 => Phase::Destroyed,
            _ => Phase::Loaded,
        }
    }
}

/// Static plugin identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginMetadata {
    pub name: String,
    pub description: String,
    pub contact: String,
    pub version: Version,
    pub required_api_version: Version,
}

pub struct Plugin {
    metadata: PluginMetadata,
    capabilities: Capabilities,
    sourcing: SourcingIdentity,
    fields: Vec<FieldInfo>,
    extract_scope: EventScope,
    parse_scope: EventScope,
    phase: AtomicU8,
    state: AtomicPtr<PluginState>,
    source_instance: AtomicPtr<SourceInstance>,
    owner: Box<OwnerContext>,
    // dropped last
    module: ModuleHandle,
}

impl Plugin {
    /// Loads a plugin from a dynamic module.
    pub fn load(path: impl AsRef<Path>, tables: Arc<TableRegistry>) -> PluginResult<Arc<Self>> {
        let module = ModuleHandle::load(path)?;
        Self::from_module(module, tables).map(Arc::new)
    }

    /// Creates a plugin from an in-process function table.
    pub fn from_api(api: PluginApi, tables: Arc<TableRegistry>) -> PluginResult<Arc<Self>> {
        let module = ModuleHandle::from_api(api)?;
        Self::from_module(module, tables).map(Arc::new)
    }

    /// Reads metadata, field schema and event scopes out of a module.
    pub fn from_module(module: ModuleHandle, tables: Arc<TableRegistry>) -> PluginResult<Self> {
        let api = *module.api();
        let common = api.common;

        let name = unsafe { abi::string_from_module((common.get_name)()) };
        if name.is_empty() {
            return Err(PluginError::InvalidMetadata(
                "plugin provided an empty name".to_string(),
            ));
        }
        let raw_version = unsafe { abi::string_from_module((common.get_version)()) };
        let version = Version::parse(&raw_version).map_err(|_| {
            PluginError::schema(
                &name,
                format!("plugin provided an invalid version string: '{}'", raw_version),
            )
        })?;
        let metadata = PluginMetadata {
            description: unsafe { abi::string_from_module((common.get_description)()) },
            contact: unsafe { abi::string_from_module((common.get_contact)()) },
            version,
            required_api_version: module.required_api_version().clone(),
            name,
        };
        let name = metadata.name.as_str();

        let sourcing = api
            .sourcing
            .as_ref()
            .map(SourcingIdentity::resolve)
            .unwrap_or_default();
        let own_source = api
            .sourcing
            .is_some()
            .then_some(sourcing.event_source.as_str());

        let mut fields = Vec::new();
        let mut extract_scope = EventScope::default();
        if let Some(extraction) = &api.extraction {
            let raw = unsafe { (extraction.get_fields)() };
            if raw.is_null() {
                return Err(PluginError::schema(name, "get_fields returned a null string"));
            }
            let json = unsafe { abi::string_from_module(raw) };
            fields = parse_fields(name, &json)?;
            extract_scope = resolve_event_scope(
                name,
                "get_extract_event_sources",
                extraction.get_extract_event_sources,
                extraction.get_extract_event_types,
                own_source,
            )?;
        }

        let mut parse_scope = EventScope::default();
        if let Some(parsing) = &api.parsing {
            parse_scope = resolve_event_scope(
                name,
                "get_parse_event_sources",
                parsing.get_parse_event_sources,
                parsing.get_parse_event_types,
                own_source,
            )?;
        }

        info!(
            plugin = name,
            version = %metadata.version,
            capabilities = %module.capabilities(),
            id = sourcing.id,
            fields = fields.len(),
            "loaded plugin"
        );

        Ok(Self {
            owner: Box::new(OwnerContext::new(name, tables)),
            capabilities: module.capabilities(),
            metadata,
            sourcing,
            fields,
            extract_scope,
            parse_scope,
            phase: AtomicU8::new(Phase::Loaded as u8),
            state: AtomicPtr::new(ptr::null_mut()),
            source_instance: AtomicPtr::new(ptr::null_mut()),
            module,
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn description(&self) -> &str {
        &self.metadata.description
    }

    pub fn contact(&self) -> &str {
        &self.metadata.contact
    }

    pub fn version(&self) -> &Version {
        &self.metadata.version
    }

    pub fn required_api_version(&self) -> &Version {
        &self.metadata.required_api_version
    }

    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Sourcing id, 0 when the plugin has none.
    pub fn id(&self) -> u32 {
        self.sourcing.id
    }

    /// Name of the event source the plugin produces, empty when none.
    pub fn event_source(&self) -> &str {
        &self.sourcing.event_source
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn extract_event_sources(&self) -> &EventSourceSet {
        &self.extract_scope.sources
    }

    pub fn extract_event_codes(&self) -> &EventCodes {
        &self.extract_scope.codes
    }

    pub fn parse_event_sources(&self) -> &EventSourceSet {
        &self.parse_scope.sources
    }

    pub fn parse_event_codes(&self) -> &EventCodes {
        &self.parse_scope.codes
    }

    pub fn module_path(&self) -> Option<&Path> {
        self.module.path()
    }

    pub fn owner(&self) -> &OwnerContext {
        &self.owner
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() == Phase::Initialized
    }

    /// Returns the init config schema the module declares.
    pub fn get_init_schema(&self) -> (SchemaType, String) {
        match self.module.api().common.get_init_schema {
            Some(get_init_schema) => {
                let mut code = SCHEMA_NONE;
                let schema = unsafe { abi::string_from_module(get_init_schema(&mut code)) };
                (SchemaType::from_code(code), schema)
            }
            None => (SchemaType::None, String::new()),
        }
    }

    /// Validates `config` against the module's schema and initializes the
    /// module.
    pub fn init(&self, config: &str) -> PluginResult<()> {
        match self.phase() {
            Phase::Loaded => {}
            Phase::Initialized | Phase::InitFailed => {
                return Err(PluginError::AlreadyInitialized {
                    plugin: self.name().to_string(),
                })
            }
            Phase::Destroyed => {
                return Err(PluginError::Destroyed {
                    plugin: self.name().to_string(),
                })
            }
        }

        let (schema_type, schema) = self.get_init_schema();
        let config = validate_init_config(self.name(), schema_type, &schema, config)?;
        let config = CString::new(config)
            .map_err(|_| PluginError::schema(self.name(), "init config contains a NUL byte"))?;

        let tables = table_api::init_tables_input();
        let input = InitInput {
            config: config.as_ptr(),
            owner: self.owner.as_owner_ptr(),
            get_owner_last_error: table_api::get_owner_last_error,
            tables: if self
                .capabilities
                .intersects(Capabilities::EXTRACTION | Capabilities::PARSING)
            {
                &tables as *const InitTablesInput
            } else {
                ptr::null()
            },
        };

        let mut rc = RC_FAILURE;
        let state = unsafe { (self.module.api().common.init)(&input, &mut rc) };
        // a failing module may still return a state to report its error
        self.state.store(state, Ordering::Release);

        if rc != RC_SUCCESS {
            self.phase.store(Phase::InitFailed as u8, Ordering::Release);
            let message = self.module_last_error();
            warn!(plugin = self.name(), rc, error = %message, "plugin init failed");
            return Err(PluginError::InitFailed(message));
        }

        self.phase.store(Phase::Initialized as u8, Ordering::Release);
        info!(plugin = self.name(), "plugin initialized");
        Ok(())
    }

    /// Destroys the module state. No-op unless `init` was called.
    pub fn destroy(&self) {
        match self.phase() {
            Phase::Loaded | Phase::Destroyed => return,
            Phase::Initialized | Phase::InitFailed => {}
        }
        // capability calls from here on see the plugin as destroyed
        self.phase.store(Phase::Destroyed as u8, Ordering::Release);
        self.source_instance.store(ptr::null_mut(), Ordering::Release);

        let state = self.state.swap(ptr::null_mut(), Ordering::AcqRel);
        if !state.is_null() {
            unsafe { (self.module.api().common.destroy)(state) };
        }
        self.owner.release_tables();
        info!(plugin = self.name(), "plugin destroyed");
    }

    /// Returns the module's last error, `None` if it has not set one.
    pub fn get_last_error(&self) -> PluginResult<Option<String>> {
        match self.phase() {
            Phase::Initialized | Phase::InitFailed => {}
            Phase::Loaded => return Err(self.not_initialized()),
            Phase::Destroyed => {
                return Err(PluginError::Destroyed {
                    plugin: self.name().to_string(),
                })
            }
        }
        let message = self.module_last_error();
        Ok((!message.is_empty()).then_some(message))
    }

    fn module_last_error(&self) -> String {
        let state = self.state.load(Ordering::Acquire);
        if state.is_null() {
            return NO_STATE_ERROR.to_string();
        }
        unsafe { abi::string_from_module((self.module.api().common.get_last_error)(state)) }
    }

    fn not_initialized(&self) -> PluginError {
        PluginError::NotInitialized {
            plugin: self.name().to_string(),
        }
    }

    fn unsupported(&self, capability: Capabilities) -> PluginError {
        PluginError::UnsupportedCapability(format!(
            "plugin {} does not have the {} capability",
            self.name(),
            capability
        ))
    }

    /// Returns the module state, failing unless the plugin is initialized.
    fn initialized_state(&self) -> PluginResult<*mut PluginState> {
        match self.phase() {
            Phase::Initialized => Ok(self.state.load(Ordering::Acquire)),
            Phase::Destroyed => Err(PluginError::Destroyed {
                plugin: self.name().to_string(),
            }),
            Phase::Loaded | Phase::InitFailed => Err(self.not_initialized()),
        }
    }

    fn module_error(&self, operation: &'static str) -> PluginError {
        PluginError::Module {
            plugin: self.name().to_string(),
            operation,
            message: self.module_last_error(),
        }
    }

    // Event sourcing

    /// Returns what the capture pipeline needs to drive this plugin.
    pub fn as_event_source(&self) -> PluginResult<EventSourceDescriptor<'_>> {
        let state = self.initialized_state()?;
        let sourcing = self
            .module
            .api()
            .sourcing
            .ok_or_else(|| self.unsupported(Capabilities::SOURCING))?;
        Ok(EventSourceDescriptor {
            state,
            name: self.name(),
            id: self.sourcing.id,
            open: sourcing.open,
            close: sourcing.close,
            get_last_error: self.module.api().common.get_last_error,
            next_batch: sourcing.next_batch,
        })
    }

    /// Records the source instance the capture pipeline opened.
    pub fn bind_source_instance(&self, instance: *mut SourceInstance) {
        self.source_instance.store(instance, Ordering::Release);
    }

    pub fn clear_source_instance(&self) {
        self.source_instance.store(ptr::null_mut(), Ordering::Release);
    }

    pub fn list_open_params(&self) -> PluginResult<Vec<OpenParam>> {
        let state = self.initialized_state()?;
        let list = match self.module.api().sourcing.and_then(|s| s.list_open_params) {
            Some(list) if !state.is_null() => list,
            _ => return Ok(Vec::new()),
        };

        let mut rc = RC_FAILURE;
        let json = unsafe { abi::string_from_module(list(state, &mut rc)) };
        if rc != RC_SUCCESS {
            return Err(self.module_error("list_open_params"));
        }
        parse_open_params(self.name(), &json)
    }

    /// Progress of the running source. Empty until a source instance is
    /// bound.
    pub fn get_progress(&self) -> PluginResult<Progress> {
        let state = self.initialized_state()?;
        let instance = self.source_instance.load(Ordering::Acquire);
        let get_progress = match self.module.api().sourcing.and_then(|s| s.get_progress) {
            Some(f) if !instance.is_null() => f,
            _ => return Ok(Progress::default()),
        };

        let mut percent = 0u32;
        let message = unsafe { abi::string_from_module(get_progress(state, instance, &mut percent)) };
        Ok(Progress {
            message,
            percent: percent.min(100),
        })
    }

    /// Renders an event, falling back to a generic payload preview.
    pub fn event_to_string(&self, evt: &Event<'_>) -> PluginResult<String> {
        let state = self.initialized_state()?;
        let mut rendered = String::new();
        if let Some(format) = self.module.api().sourcing.and_then(|s| s.event_to_string) {
            if !state.is_null() {
                let input = event_input(evt);
                rendered = unsafe { abi::string_from_module(format(state, &input)) };
            }
        }
        if rendered.is_empty() {
            rendered = event_preview(evt.payload);
        }
        Ok(rendered)
    }

    // Field extraction

    /// Asks the module to fill in `fields` for `evt`.
    ///
    /// Returns the module's own verdict; `Ok(false)` means it failed.
    pub fn extract_fields(&self, evt: &Event<'_>, fields: &mut [ExtractField]) -> PluginResult<bool> {
        let state = self.initialized_state()?;
        let extraction = self
            .module
            .api()
            .extraction
            .ok_or_else(|| self.unsupported(Capabilities::EXTRACTION))?;

        let evt = event_input(evt);
        let input = FieldExtractInput {
            owner: self.owner.as_owner_ptr(),
            get_owner_last_error: table_api::get_owner_last_error,
            num_fields: fields.len() as u32,
            fields: fields.as_mut_ptr(),
            table_reader: table_api::reader_vtable(),
        };
        let rc = unsafe { (extraction.extract_fields)(state, &evt, &input) };
        Ok(rc == RC_SUCCESS)
    }

    // Event parsing

    /// Lets the module update its state from `evt`.
    pub fn parse_event(&self, evt: &Event<'_>) -> PluginResult<bool> {
        let state = self.initialized_state()?;
        let parsing = self
            .module
            .api()
            .parsing
            .ok_or_else(|| self.unsupported(Capabilities::PARSING))?;

        let evt = event_input(evt);
        let input = EventParseInput {
            owner: self.owner.as_owner_ptr(),
            get_owner_last_error: table_api::get_owner_last_error,
            table_reader: table_api::reader_vtable(),
            table_writer: table_api::writer_vtable(),
        };
        let rc = unsafe { (parsing.parse_event)(state, &evt, &input) };
        if rc != RC_SUCCESS {
            debug!(plugin = self.name(), evtnum = evt.evtnum, "plugin failed to parse event");
        }
        Ok(rc == RC_SUCCESS)
    }

    /// Returns the module's last error without phase checks, for logging
    /// after a failed capability call.
    pub fn last_error_message(&self) -> String {
        self.module_last_error()
    }
}

fn event_input(evt: &Event<'_>) -> EventInput {
    EventInput {
        evt: evt.raw.as_ptr(),
        evt_len: evt.raw.len() as u32,
        evt_type: evt.event_type,
        evtnum: evt.num,
        evtsrc_idx: evt.source_idx_raw(),
        evtsrc_name: evt.source_name.as_ptr(),
    }
}

impl Drop for Plugin {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.metadata.name)
            .field("version", &self.metadata.version)
            .field("capabilities", &self.capabilities)
            .field("id", &self.sourcing.id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{ExtractResult, PLUGIN_FALSE};
    use crate::fields::FieldType;
    use crate::tables::{StateType, StateValue, TableOwner};
    use crate::testing::{MockModule, MockValue, MOCK_TABLE_FIELD};
    use std::ffi::CStr;
    use sysplug_core::event::{PLUGIN_EVENT_CODE, SYSCALL_SOURCE_NAME};

    const FIELDS: &str = r#"[
        {"type": "uint64", "name": "mock.count", "desc": "Event count"},
        {"type": "string", "name": "mock.name", "desc": "A name", "arg": {"isRequired": true, "isKey": true}}
    ]"#;

    const SCHEMA: &str = r#"{
        "type": "object",
        "properties": {"jitter": {"type": "integer"}},
        "required": ["jitter"]
    }"#;

    fn source_name() -> &'static CStr {
        CStr::from_bytes_with_nul(b"mock_source\0").unwrap()
    }

    fn event(num: u64, payload: &[u8]) -> Event<'_> {
        Event {
            num,
            event_type: PLUGIN_EVENT_CODE,
            source_idx: Some(1),
            source_name: source_name(),
            raw: payload,
            payload,
        }
    }

    fn request(field: &CString, field_type: FieldType) -> ExtractField {
        ExtractField {
            res: ExtractResult { u64: ptr::null() },
            res_len: 0,
            field_id: 0,
            field: field.as_ptr(),
            arg_key: ptr::null(),
            arg_index: 0,
            arg_present: PLUGIN_FALSE,
            ftype: field_type.code(),
            flist: PLUGIN_FALSE,
        }
    }

    fn load(mock: &MockModule) -> Arc<Plugin> {
        Plugin::from_api(mock.api(), Arc::new(TableRegistry::new())).unwrap()
    }

    #[test]
    fn test_metadata_and_fields() {
        let plugin = load(&MockModule::new("mock").with_version("1.2.3").with_extraction(FIELDS));
        assert_eq!(plugin.name(), "mock");
        assert_eq!(plugin.version(), &Version::new(1, 2, 3));
        assert_eq!(plugin.capabilities(), Capabilities::EXTRACTION);
        assert_eq!(plugin.id(), 0);
        assert_eq!(plugin.event_source(), "");
        assert_eq!(plugin.fields().len(), 2);
        assert!(plugin.fields()[1].arg_required());
        assert_eq!(plugin.phase(), Phase::Loaded);
        assert!(plugin.module_path().is_none());
    }

    #[test]
    fn test_invalid_metadata() {
        let err = Plugin::from_api(
            MockModule::new("mock").with_version("one").with_parsing().api(),
            Arc::new(TableRegistry::new()),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "error in plugin mock: plugin provided an invalid version string: 'one'"
        );

        let err = Plugin::from_api(
            MockModule::new("").with_parsing().api(),
            Arc::new(TableRegistry::new()),
        )
        .unwrap_err();
        assert!(matches!(err, PluginError::InvalidMetadata(_)));
    }

    #[test]
    fn test_missing_symbols() {
        let mut api = MockModule::new("mock").with_parsing().api();
        api.destroy = None;
        let err = Plugin::from_api(api, Arc::new(TableRegistry::new())).unwrap_err();
        assert!(matches!(err, PluginError::MissingSymbol { symbol: "destroy" }));

        let mut api = MockModule::new("mock").with_sourcing(3, "src").api();
        api.close = None;
        let err = Plugin::from_api(api, Arc::new(TableRegistry::new())).unwrap_err();
        assert!(matches!(
            err,
            PluginError::IncompleteCapability {
                capability: "sourcing",
                symbol: "close"
            }
        ));
    }

    #[test]
    fn test_lifecycle() {
        let mock = MockModule::new("mock").with_parsing();
        let counters = mock.counters();
        let plugin = load(&mock);

        plugin.init("").unwrap();
        assert!(plugin.is_initialized());
        assert_eq!(counters.init_calls(), 1);
        assert_eq!(plugin.get_last_error().unwrap(), None);

        let err = plugin.init("").unwrap_err();
        assert!(matches!(err, PluginError::AlreadyInitialized { .. }));
        assert_eq!(counters.init_calls(), 1);

        plugin.destroy();
        plugin.destroy();
        assert_eq!(plugin.phase(), Phase::Destroyed);
        assert_eq!(counters.destroy_calls(), 1);

        assert!(matches!(plugin.init(""), Err(PluginError::Destroyed { .. })));
        assert!(matches!(
            plugin.parse_event(&event(1, b"")),
            Err(PluginError::Destroyed { .. })
        ));
    }

    #[test]
    fn test_destroy_without_init_is_noop() {
        let mock = MockModule::new("mock").with_parsing();
        let counters = mock.counters();
        let plugin = load(&mock);
        plugin.destroy();
        assert_eq!(plugin.phase(), Phase::Loaded);
        drop(plugin);
        assert_eq!(counters.destroy_calls(), 0);
    }

    #[test]
    fn test_drop_destroys() {
        let mock = MockModule::new("mock").with_parsing();
        let counters = mock.counters();
        let plugin = load(&mock);
        plugin.init("").unwrap();
        drop(plugin);
        assert_eq!(counters.destroy_calls(), 1);
    }

    #[test]
    fn test_init_failure_keeps_state() {
        let mock = MockModule::new("mock")
            .with_parsing()
            .failing_init("bad credentials", true);
        let counters = mock.counters();
        let plugin = load(&mock);

        match plugin.init("") {
            Err(PluginError::InitFailed(message)) => assert_eq!(message, "bad credentials"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(plugin.phase(), Phase::InitFailed);
        assert_eq!(
            plugin.get_last_error().unwrap().as_deref(),
            Some("bad credentials")
        );
        assert!(matches!(
            plugin.parse_event(&event(1, b"")),
            Err(PluginError::NotInitialized { .. })
        ));
        assert!(matches!(plugin.init(""), Err(PluginError::AlreadyInitialized { .. })));

        plugin.destroy();
        assert_eq!(counters.destroy_calls(), 1);
    }

    #[test]
    fn test_init_failure_without_state() {
        let mock = MockModule::new("mock")
            .with_parsing()
            .failing_init("lost", false);
        let counters = mock.counters();
        let plugin = load(&mock);

        match plugin.init("") {
            Err(PluginError::InitFailed(message)) => assert_eq!(message, NO_STATE_ERROR),
            other => panic!("unexpected result: {:?}", other),
        }
        plugin.destroy();
        assert_eq!(plugin.phase(), Phase::Destroyed);
        assert_eq!(counters.destroy_calls(), 0);
    }

    #[test]
    fn test_init_config_validation() {
        let mock = MockModule::new("mock").with_parsing().with_init_schema(SCHEMA);
        let counters = mock.counters();
        let plugin = load(&mock);

        let (schema_type, schema) = plugin.get_init_schema();
        assert_eq!(schema_type, SchemaType::Json);
        assert_eq!(schema, SCHEMA);

        let err = plugin.init(r#"{"jitter": "high"}"#).unwrap_err();
        assert!(matches!(err, PluginError::InitConfig { ref path, .. } if path == "/jitter"));
        assert_eq!(counters.init_calls(), 0);
        assert_eq!(plugin.phase(), Phase::Loaded);

        plugin.init(r#"{"jitter": 5}"#).unwrap();
        assert_eq!(counters.last_config().as_deref(), Some(r#"{"jitter": 5}"#));
    }

    #[test]
    fn test_empty_config_with_schema_is_empty_object() {
        let mock = MockModule::new("mock")
            .with_parsing()
            .with_init_schema(r#"{"type": "object"}"#);
        let counters = mock.counters();
        let plugin = load(&mock);
        plugin.init("").unwrap();
        assert_eq!(counters.last_config().as_deref(), Some("{}"));
    }

    #[test]
    fn test_syscall_source_scopes() {
        let plugin = load(
            &MockModule::new("mock")
                .with_sourcing(1, SYSCALL_SOURCE_NAME)
                .with_extraction(FIELDS)
                .with_parsing(),
        );
        assert_eq!(
            plugin.capabilities(),
            Capabilities::SOURCING | Capabilities::EXTRACTION | Capabilities::PARSING
        );
        assert!(plugin.extract_event_codes().is_all());
        assert_eq!(plugin.extract_event_sources().len(), 1);
        assert!(plugin.extract_event_sources().contains(SYSCALL_SOURCE_NAME));
        assert!(plugin.parse_event_codes().is_all());
        assert!(plugin.parse_event_sources().contains(SYSCALL_SOURCE_NAME));
    }

    #[test]
    fn test_extract_fields() {
        let mock = MockModule::new("mock")
            .with_extraction(FIELDS)
            .with_value("mock.count", MockValue::Uint64(vec![42]));
        let counters = mock.counters();
        let plugin = load(&mock);

        let name = CString::new("mock.count").unwrap();
        let mut fields = [request(&name, FieldType::Uint64)];
        assert!(matches!(
            plugin.extract_fields(&event(1, b"x"), &mut fields),
            Err(PluginError::NotInitialized { .. })
        ));

        plugin.init("").unwrap();
        assert!(plugin.extract_fields(&event(1, b"x"), &mut fields).unwrap());
        assert_eq!(fields[0].res_len, 1);
        assert_eq!(unsafe { *fields[0].res.u64 }, 42);
        assert_eq!(counters.extract_calls(), 1);

        assert!(matches!(
            plugin.parse_event(&event(1, b"x")),
            Err(PluginError::UnsupportedCapability(_))
        ));
    }

    #[test]
    fn test_extract_failure_reports_last_error() {
        let plugin = load(&MockModule::new("mock").with_extraction(FIELDS).failing_extraction());
        plugin.init("").unwrap();

        let name = CString::new("mock.count").unwrap();
        let mut fields = [request(&name, FieldType::Uint64)];
        assert!(!plugin.extract_fields(&event(1, b""), &mut fields).unwrap());
        assert_eq!(plugin.last_error_message(), "mock extraction failure");
    }

    #[test]
    fn test_parse_writes_owned_table() {
        let tables = Arc::new(TableRegistry::new());
        let mock = MockModule::new("mock").with_parsing().with_owned_table("mock_events");
        let counters = mock.counters();
        let plugin = Plugin::from_api(mock.api(), tables.clone()).unwrap();

        plugin.init("").unwrap();
        assert_eq!(
            tables.owner_of("mock_events"),
            Some(TableOwner::Plugin("mock".to_string()))
        );
        assert_eq!(plugin.owner().owned_tables(), vec!["mock_events".to_string()]);

        assert!(plugin.parse_event(&event(7, b"payload")).unwrap());
        assert_eq!(counters.parse_calls(), 1);
        let reader = tables.reader("mock_events", StateType::Uint64).unwrap();
        assert_eq!(
            reader.read(&StateValue::Uint64(7), MOCK_TABLE_FIELD).unwrap(),
            StateValue::Uint64(7)
        );

        plugin.destroy();
        assert!(!tables.contains("mock_events"));
    }

    #[test]
    fn test_owned_table_conflict_fails_init() {
        let tables = Arc::new(TableRegistry::new());
        let first = Plugin::from_api(
            MockModule::new("first").with_parsing().with_owned_table("shared").api(),
            tables.clone(),
        )
        .unwrap();
        let second = Plugin::from_api(
            MockModule::new("second").with_parsing().with_owned_table("shared").api(),
            tables.clone(),
        )
        .unwrap();

        first.init("").unwrap();
        assert!(matches!(second.init(""), Err(PluginError::InitFailed(_))));
        assert_eq!(second.phase(), Phase::InitFailed);

        second.destroy();
        assert!(tables.contains("shared"));
        first.destroy();
        assert!(!tables.contains("shared"));
    }

    #[test]
    fn test_sourcing_helpers() {
        let plugin = load(
            &MockModule::new("mock")
                .with_sourcing(42, "mock_source")
                .with_open_params(r#"[{"value": "file.log", "desc": "A file"}]"#)
                .with_progress("halfway", 150),
        );
        assert!(plugin.as_event_source().is_err());
        plugin.init("").unwrap();

        let params = plugin.list_open_params().unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].value, "file.log");

        assert_eq!(plugin.get_progress().unwrap(), Progress::default());

        let source = plugin.as_event_source().unwrap();
        assert_eq!(source.id, 42);
        let instance = unsafe { source.open_instance("file.log") }.unwrap();
        plugin.bind_source_instance(instance);
        let progress = plugin.get_progress().unwrap();
        assert_eq!(progress.message, "halfway");
        assert_eq!(progress.percent, 100);

        plugin.clear_source_instance();
        unsafe { source.close_instance(instance) };

        assert_eq!(
            plugin.event_to_string(&event(1, b"hello")).unwrap(),
            "datalen=5 data=hello"
        );
    }

    #[test]
    fn test_event_to_string_and_open_params_failures() {
        let plugin = load(
            &MockModule::new("mock")
                .with_sourcing(42, "mock_source")
                .with_event_to_string("custom rendering")
                .failing_open_params("no sources"),
        );
        plugin.init("").unwrap();
        assert_eq!(
            plugin.event_to_string(&event(1, b"hello")).unwrap(),
            "custom rendering"
        );
        let err = plugin.list_open_params().unwrap_err();
        assert_eq!(
            err.to_string(),
            "error in plugin mock: list_open_params has error no sources"
        );
    }
}
