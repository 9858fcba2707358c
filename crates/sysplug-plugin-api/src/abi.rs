//! C-compatible binary contract between the engine and plugin modules.
//!
//! Every type here is `#[repr(C)]` and mirrors what a module compiled in any
//! language sees. Function pointers are `Option` so that a null entry in the
//! table maps to `None`.

use std::os::raw::{c_char, c_void};

/// Plugin API version implemented by this engine.
pub const PLUGIN_API_VERSION: &str = "3.1.0";

/// Opaque per-instance plugin state created by `init`.
pub type PluginState = c_void;
/// Opaque back-reference to the engine-side owner of a plugin.
pub type PluginOwner = c_void;
/// Opaque handle of an opened event source instance.
pub type SourceInstance = c_void;
/// Opaque handle of a table handed to a plugin.
pub type TableHandle = c_void;

/// Return code of plugin calls.
pub type PluginRc = i32;

pub const RC_SUCCESS: PluginRc = 0;
pub const RC_FAILURE: PluginRc = 1;
pub const RC_TIMEOUT: PluginRc = -1;
pub const RC_EOF: PluginRc = 2;
pub const RC_NOT_SUPPORTED: PluginRc = 3;

/// Boolean as passed across the boundary.
pub type PluginBool = u32;

pub const PLUGIN_TRUE: PluginBool = 1;
pub const PLUGIN_FALSE: PluginBool = 0;

/// Schema type codes returned by `get_init_schema`.
pub const SCHEMA_NONE: u32 = 0;
pub const SCHEMA_JSON: u32 = 1;

/// Type codes shared by field values and table state.
pub mod type_code {
    pub const INT8: u32 = 1;
    pub const INT16: u32 = 2;
    pub const INT32: u32 = 3;
    pub const INT64: u32 = 4;
    pub const UINT8: u32 = 5;
    pub const UINT16: u32 = 6;
    pub const UINT32: u32 = 7;
    pub const UINT64: u32 = 8;
    pub const CHARBUF: u32 = 9;
    pub const RELTIME: u32 = 20;
    pub const ABSTIME: u32 = 21;
    pub const BOOL: u32 = 25;
    pub const IPV4ADDR: u32 = 26;
    pub const IPV4NET: u32 = 37;
    pub const IPV6ADDR: u32 = 38;
    pub const IPV6NET: u32 = 39;
    pub const IPNET: u32 = 41;
}

/// Event handed to a plugin.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EventInput {
    /// Raw event buffer
    pub evt: *const u8,
    pub evt_len: u32,
    pub evt_type: u16,
    pub evtnum: u64,
    /// Event source index, `u32::MAX` when unknown
    pub evtsrc_idx: u32,
    pub evtsrc_name: *const c_char,
}

/// Length-prefixed byte buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ByteBuffer {
    pub len: u32,
    pub ptr: *const c_void,
}

/// Result storage of one extracted field, interpreted through `ftype`.
#[repr(C)]
#[derive(Clone, Copy)]
pub union ExtractResult {
    pub str: *const *const c_char,
    pub u64: *const u64,
    pub u32: *const u32,
    pub boolean: *const PluginBool,
    pub buf: *const ByteBuffer,
}

/// One field extraction request, filled in by the plugin.
#[repr(C)]
pub struct ExtractField {
    pub res: ExtractResult,
    pub res_len: u64,
    pub field_id: u32,
    pub field: *const c_char,
    pub arg_key: *const c_char,
    pub arg_index: u64,
    pub arg_present: PluginBool,
    pub ftype: u32,
    pub flist: PluginBool,
}

/// Returns the last error the owner recorded, or null.
pub type GetOwnerLastErrorFn = unsafe extern "C" fn(owner: *mut PluginOwner) -> *const c_char;

/// Table state value.
#[repr(C)]
#[derive(Clone, Copy)]
pub union StateData {
    pub s8: i8,
    pub s16: i16,
    pub s32: i32,
    pub s64: i64,
    pub u8: u8,
    pub u16: u16,
    pub u32: u32,
    pub u64: u64,
    pub str: *const c_char,
    pub b: PluginBool,
}

/// Table description returned by `list_tables`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TableInfoRaw {
    pub name: *const c_char,
    pub key_type: u32,
}

/// Table field description returned by `list_table_fields`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TableFieldInfoRaw {
    pub name: *const c_char,
    pub field_type: u32,
    pub read_only: PluginBool,
}

/// Table creation request passed to `add_table`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TableInput {
    pub name: *const c_char,
    pub key_type: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct TableFieldsVtable {
    pub list_table_fields: unsafe extern "C" fn(
        t: *mut TableHandle,
        nfields: *mut u32,
    ) -> *const TableFieldInfoRaw,
    pub add_table_field: unsafe extern "C" fn(
        t: *mut TableHandle,
        name: *const c_char,
        data_type: u32,
    ) -> PluginRc,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct TableReaderVtable {
    pub get_table_name: unsafe extern "C" fn(t: *mut TableHandle) -> *const c_char,
    pub get_table_size: unsafe extern "C" fn(t: *mut TableHandle) -> u64,
    pub read_entry_field: unsafe extern "C" fn(
        t: *mut TableHandle,
        key: *const StateData,
        field: *const c_char,
        out: *mut StateData,
    ) -> PluginRc,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct TableWriterVtable {
    pub clear_table: unsafe extern "C" fn(t: *mut TableHandle) -> PluginRc,
    pub erase_table_entry: unsafe extern "C" fn(t: *mut TableHandle, key: *const StateData) -> PluginRc,
    pub write_entry_field: unsafe extern "C" fn(
        t: *mut TableHandle,
        key: *const StateData,
        field: *const c_char,
        value: *const StateData,
    ) -> PluginRc,
}

/// Table access available during `init`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct InitTablesInput {
    pub list_tables:
        unsafe extern "C" fn(owner: *mut PluginOwner, ntables: *mut u32) -> *const TableInfoRaw,
    pub get_table: unsafe extern "C" fn(
        owner: *mut PluginOwner,
        name: *const c_char,
        key_type: u32,
    ) -> *mut TableHandle,
    pub add_table:
        unsafe extern "C" fn(owner: *mut PluginOwner, input: *const TableInput) -> PluginRc,
    pub fields: TableFieldsVtable,
}

#[repr(C)]
pub struct InitInput {
    pub config: *const c_char,
    pub owner: *mut PluginOwner,
    pub get_owner_last_error: GetOwnerLastErrorFn,
    /// Null unless the plugin has the extraction or parsing capability
    pub tables: *const InitTablesInput,
}

#[repr(C)]
pub struct FieldExtractInput {
    pub owner: *mut PluginOwner,
    pub get_owner_last_error: GetOwnerLastErrorFn,
    pub num_fields: u32,
    pub fields: *mut ExtractField,
    pub table_reader: TableReaderVtable,
}

#[repr(C)]
pub struct EventParseInput {
    pub owner: *mut PluginOwner,
    pub get_owner_last_error: GetOwnerLastErrorFn,
    pub table_reader: TableReaderVtable,
    pub table_writer: TableWriterVtable,
}

pub type GetStrFn = unsafe extern "C" fn() -> *const c_char;
pub type GetInitSchemaFn = unsafe extern "C" fn(schema_type: *mut u32) -> *const c_char;
pub type InitFn = unsafe extern "C" fn(input: *const InitInput, rc: *mut PluginRc) -> *mut PluginState;
pub type DestroyFn = unsafe extern "C" fn(s: *mut PluginState);
pub type GetLastErrorFn = unsafe extern "C" fn(s: *mut PluginState) -> *const c_char;
pub type GetIdFn = unsafe extern "C" fn() -> u32;
pub type OpenFn = unsafe extern "C" fn(
    s: *mut PluginState,
    params: *const c_char,
    rc: *mut PluginRc,
) -> *mut SourceInstance;
pub type CloseFn = unsafe extern "C" fn(s: *mut PluginState, h: *mut SourceInstance);
pub type ListOpenParamsFn = unsafe extern "C" fn(s: *mut PluginState, rc: *mut PluginRc) -> *const c_char;
pub type GetProgressFn = unsafe extern "C" fn(
    s: *mut PluginState,
    h: *mut SourceInstance,
    progress_pct: *mut u32,
) -> *const c_char;
pub type EventToStringFn =
    unsafe extern "C" fn(s: *mut PluginState, evt: *const EventInput) -> *const c_char;
pub type NextBatchFn = unsafe extern "C" fn(
    s: *mut PluginState,
    h: *mut SourceInstance,
    nevts: *mut u32,
    evts: *mut *mut *mut u8,
) -> PluginRc;
pub type GetEventTypesFn = unsafe extern "C" fn(numtypes: *mut u32) -> *const u16;
pub type ExtractFieldsFn = unsafe extern "C" fn(
    s: *mut PluginState,
    evt: *const EventInput,
    input: *const FieldExtractInput,
) -> PluginRc;
pub type ParseEventFn = unsafe extern "C" fn(
    s: *mut PluginState,
    evt: *const EventInput,
    input: *const EventParseInput,
) -> PluginRc;

/// Function table exported by a plugin module.
///
/// Dynamic modules export each entry as a `plugin_<name>` symbol; in-process
/// modules fill the table directly.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct PluginApi {
    // common
    pub get_required_api_version: Option<GetStrFn>,
    pub get_version: Option<GetStrFn>,
    pub get_name: Option<GetStrFn>,
    pub get_description: Option<GetStrFn>,
    pub get_contact: Option<GetStrFn>,
    pub get_init_schema: Option<GetInitSchemaFn>,
    pub init: Option<InitFn>,
    pub destroy: Option<DestroyFn>,
    pub get_last_error: Option<GetLastErrorFn>,

    // event sourcing
    pub get_id: Option<GetIdFn>,
    pub get_event_source: Option<GetStrFn>,
    pub open: Option<OpenFn>,
    pub close: Option<CloseFn>,
    pub list_open_params: Option<ListOpenParamsFn>,
    pub get_progress: Option<GetProgressFn>,
    pub event_to_string: Option<EventToStringFn>,
    pub next_batch: Option<NextBatchFn>,

    // field extraction
    pub get_fields: Option<GetStrFn>,
    pub get_extract_event_types: Option<GetEventTypesFn>,
    pub get_extract_event_sources: Option<GetStrFn>,
    pub extract_fields: Option<ExtractFieldsFn>,

    // event parsing
    pub get_parse_event_types: Option<GetEventTypesFn>,
    pub get_parse_event_sources: Option<GetStrFn>,
    pub parse_event: Option<ParseEventFn>,
}

impl std::fmt::Debug for PluginApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginApi")
            .field("get_name", &self.get_name.is_some())
            .field("init", &self.init.is_some())
            .field("open", &self.open.is_some())
            .field("extract_fields", &self.extract_fields.is_some())
            .field("parse_event", &self.parse_event.is_some())
            .finish_non_exhaustive()
    }
}

/// Copies a module-owned C string into an owned `String`.
///
/// Null pointers yield an empty string; invalid UTF-8 is replaced lossily.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
pub unsafe fn string_from_module(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
}
