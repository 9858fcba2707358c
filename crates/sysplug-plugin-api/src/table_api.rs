//! Table bridge across the module boundary.
//!
//! Modules never see [`Table`](crate::tables::Table) objects. They get an
//! owner back-reference (a pointer to the facade's [`OwnerContext`]) and
//! vtables of `extern "C"` functions operating on opaque table handles. A
//! handle points to a [`TableAccessor`] kept alive by the owner context
//! until the plugin is destroyed.
//!
//! Failing operations return `RC_FAILURE` or null and record a message
//! retrievable through `get_owner_last_error`.

use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::abi::{
    InitTablesInput, PluginOwner, PluginRc, StateData, TableFieldInfoRaw, TableFieldsVtable,
    TableHandle, TableInfoRaw, TableInput, TableReaderVtable, TableWriterVtable, PLUGIN_FALSE,
    PLUGIN_TRUE, RC_FAILURE, RC_SUCCESS,
};
use crate::tables::{
    StateTable, StateType, StateValue, TableError, TableOwner, TableRegistry, TableResult,
    TableWriter,
};

type ErrorSlot = Arc<Mutex<Option<CString>>>;

thread_local! {
    // string values read by a module, per accessor address
    static READ_STRINGS: RefCell<HashMap<usize, CString>> = RefCell::new(HashMap::new());
    static OWNER_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

fn to_cstring(s: &str) -> CString {
    CString::new(s.replace('\0', " ")).unwrap_or_default()
}

fn record_error(slot: &ErrorSlot, message: &str) {
    *slot.lock() = Some(to_cstring(message));
}

/// Per-plugin state the module reaches through its owner pointer.
///
/// Boxed by the facade so its address stays stable for the plugin's whole
/// lifetime.
pub struct OwnerContext {
    plugin_name: String,
    registry: Arc<TableRegistry>,
    last_error: ErrorSlot,
    table_infos: Mutex<(Vec<CString>, Vec<TableInfoRaw>)>,
    accessors: Mutex<HashMap<String, Box<TableAccessor>>>,
    owned_tables: Mutex<Vec<String>>,
}

impl OwnerContext {
    pub fn new(plugin_name: impl Into<String>, registry: Arc<TableRegistry>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            registry,
            last_error: Arc::new(Mutex::new(None)),
            table_infos: Mutex::new((Vec::new(), Vec::new())),
            accessors: Mutex::new(HashMap::new()),
            owned_tables: Mutex::new(Vec::new()),
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn registry(&self) -> &Arc<TableRegistry> {
        &self.registry
    }

    pub(crate) fn as_owner_ptr(&self) -> *mut PluginOwner {
        self as *const OwnerContext as *mut PluginOwner
    }

    /// Last error recorded by a failing table operation.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .as_ref()
            .map(|e| e.to_string_lossy().into_owned())
    }

    pub(crate) fn set_last_error(&self, message: &str) {
        record_error(&self.last_error, message);
    }

    /// Names of the tables this plugin registered.
    pub fn owned_tables(&self) -> Vec<String> {
        self.owned_tables.lock().clone()
    }

    /// Drops every accessor handed out to the module and unregisters the
    /// tables the plugin owns.
    pub(crate) fn release_tables(&self) {
        self.accessors.lock().clear();
        self.table_infos.lock().1.clear();
        let owned = std::mem::take(&mut *self.owned_tables.lock());
        if owned.is_empty() {
            return;
        }
        let removed = self.registry.remove_owned_by(&self.plugin_name);
        debug!(plugin = %self.plugin_name, tables = ?removed, "released plugin tables");
    }

    fn accessor(&self, writer: TableWriter) -> *mut TableHandle {
        let name = writer.reader().name().to_string();
        let mut accessors = self.accessors.lock();
        let accessor = accessors
            .entry(name)
            .or_insert_with(|| Box::new(TableAccessor::new(writer, self.last_error.clone())));
        &**accessor as *const TableAccessor as *mut TableHandle
    }

    fn list_tables(&self, ntables: &mut u32) -> *const TableInfoRaw {
        let infos = self.registry.list();
        let mut cache = self.table_infos.lock();
        let (names, raw) = &mut *cache;
        *names = infos.iter().map(|i| to_cstring(&i.name)).collect();
        *raw = names
            .iter()
            .zip(infos.iter())
            .map(|(name, info)| TableInfoRaw {
                name: name.as_ptr(),
                key_type: info.key_type.code(),
            })
            .collect();
        *ntables = raw.len() as u32;
        raw.as_ptr()
    }

    fn get_table(&self, name: &str, key_type: u32) -> TableResult<*mut TableHandle> {
        let key_type = StateType::from_code(key_type)?;
        let writer = self.registry.writer(name, key_type)?;
        Ok(self.accessor(writer))
    }

    fn add_table(&self, name: &str, key_type: u32) -> TableResult<()> {
        let key_type = StateType::from_code(key_type)?;
        let table = Arc::new(StateTable::new(name, key_type));
        self.registry
            .register(table, TableOwner::Plugin(self.plugin_name.clone()))?;
        self.owned_tables.lock().push(name.to_string());
        debug!(plugin = %self.plugin_name, table = name, %key_type, "plugin added table");
        Ok(())
    }
}

// The raw pointers cached in `table_infos` point into the CStrings stored
// next to them and are only handed to the module.
unsafe impl Send for OwnerContext {}
unsafe impl Sync for OwnerContext {}

impl std::fmt::Debug for OwnerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerContext")
            .field("plugin_name", &self.plugin_name)
            .field("owned_tables", &self.owned_tables())
            .finish_non_exhaustive()
    }
}

/// Target of an opaque table handle.
pub(crate) struct TableAccessor {
    writer: TableWriter,
    name: CString,
    fields: Mutex<(Vec<CString>, Vec<TableFieldInfoRaw>)>,
    last_error: ErrorSlot,
}

impl TableAccessor {
    fn new(writer: TableWriter, last_error: ErrorSlot) -> Self {
        let name = to_cstring(writer.reader().name());
        Self {
            writer,
            name,
            fields: Mutex::new((Vec::new(), Vec::new())),
            last_error,
        }
    }

    fn fail(&self, err: &TableError) -> PluginRc {
        record_error(&self.last_error, &err.to_string());
        RC_FAILURE
    }

    fn list_fields(&self, nfields: &mut u32) -> *const TableFieldInfoRaw {
        let fields = self.writer.reader().fields();
        let mut cache = self.fields.lock();
        let (names, raw) = &mut *cache;
        *names = fields.iter().map(|f| to_cstring(&f.name)).collect();
        *raw = names
            .iter()
            .zip(fields.iter())
            .map(|(name, field)| TableFieldInfoRaw {
                name: name.as_ptr(),
                field_type: field.field_type.code(),
                read_only: if field.read_only { PLUGIN_TRUE } else { PLUGIN_FALSE },
            })
            .collect();
        *nfields = raw.len() as u32;
        raw.as_ptr()
    }

    fn field_type(&self, field: &str) -> TableResult<StateType> {
        self.writer
            .reader()
            .fields()
            .into_iter()
            .find(|f| f.name == field)
            .map(|f| f.field_type)
            .ok_or_else(|| TableError::UnknownField {
                table: self.writer.reader().name().to_string(),
                field: field.to_string(),
            })
    }

    /// Reads one entry field into `out`.
    ///
    /// A string value stays valid until the calling thread reads another
    /// string from this table.
    unsafe fn read(&self, key: &StateData, field: &str, out: &mut StateData) -> TableResult<()> {
        let key = value_from_raw(self.writer.reader().key_type(), key)?;
        let value = self.writer.reader().read(&key, field)?;
        *out = match value {
            StateValue::String(s) => {
                let slot = self as *const TableAccessor as usize;
                let stored = READ_STRINGS.with(|strings| {
                    let mut strings = strings.borrow_mut();
                    let entry = strings.entry(slot).or_default();
                    *entry = to_cstring(&s);
                    entry.as_ptr()
                });
                StateData { str: stored }
            }
            other => value_to_raw(&other),
        };
        Ok(())
    }

    unsafe fn write(&self, key: &StateData, field: &str, value: &StateData) -> TableResult<()> {
        let key = value_from_raw(self.writer.reader().key_type(), key)?;
        let value = value_from_raw(self.field_type(field)?, value)?;
        self.writer.write(key, field, value)
    }

    unsafe fn erase(&self, key: &StateData) -> TableResult<bool> {
        let key = value_from_raw(self.writer.reader().key_type(), key)?;
        self.writer.erase(&key)
    }
}

/// Reads a typed value out of the raw union.
///
/// # Safety
///
/// `data` must hold a value of type `ty`; string values must be null or
/// point to a NUL-terminated string.
pub(crate) unsafe fn value_from_raw(ty: StateType, data: &StateData) -> TableResult<StateValue> {
    Ok(match ty {
        StateType::Int8 => StateValue::Int8(data.s8),
        StateType::Int16 => StateValue::Int16(data.s16),
        StateType::Int32 => StateValue::Int32(data.s32),
        StateType::Int64 => StateValue::Int64(data.s64),
        StateType::Uint8 => StateValue::Uint8(data.u8),
        StateType::Uint16 => StateValue::Uint16(data.u16),
        StateType::Uint32 => StateValue::Uint32(data.u32),
        StateType::Uint64 => StateValue::Uint64(data.u64),
        StateType::Bool => StateValue::Bool(data.b != PLUGIN_FALSE),
        StateType::String => {
            if data.str.is_null() {
                return Err(TableError::InvalidValue(ty));
            }
            StateValue::String(CStr::from_ptr(data.str).to_string_lossy().into_owned())
        }
    })
}

/// Writes a non-string value into the raw union.
fn value_to_raw(value: &StateValue) -> StateData {
    match *value {
        StateValue::Int8(v) => StateData { s8: v },
        StateValue::Int16(v) => StateData { s16: v },
        StateValue::Int32(v) => StateData { s32: v },
        StateValue::Int64(v) => StateData { s64: v },
        StateValue::Uint8(v) => StateData { u8: v },
        StateValue::Uint16(v) => StateData { u16: v },
        StateValue::Uint32(v) => StateData { u32: v },
        StateValue::Uint64(v) => StateData { u64: v },
        StateValue::Bool(v) => StateData {
            b: if v { PLUGIN_TRUE } else { PLUGIN_FALSE },
        },
        StateValue::String(_) => StateData { str: ptr::null() },
    }
}

unsafe fn owner_ref<'a>(owner: *mut PluginOwner) -> Option<&'a OwnerContext> {
    (owner as *const OwnerContext).as_ref()
}

unsafe fn accessor_ref<'a>(t: *mut TableHandle) -> Option<&'a TableAccessor> {
    (t as *const TableAccessor).as_ref()
}

unsafe fn str_arg<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    CStr::from_ptr(s).to_str().ok()
}

/// The returned string stays valid until the calling thread asks again.
pub(crate) unsafe extern "C" fn get_owner_last_error(owner: *mut PluginOwner) -> *const c_char {
    let Some(ctx) = owner_ref(owner) else {
        return ptr::null();
    };
    let Some(message) = ctx.last_error.lock().clone() else {
        return ptr::null();
    };
    OWNER_ERROR.with(|slot| {
        let mut slot = slot.borrow_mut();
        *slot = message;
        slot.as_ptr()
    })
}

unsafe extern "C" fn list_tables(owner: *mut PluginOwner, ntables: *mut u32) -> *const TableInfoRaw {
    let (Some(ctx), Some(ntables)) = (owner_ref(owner), ntables.as_mut()) else {
        return ptr::null();
    };
    ctx.list_tables(ntables)
}

unsafe extern "C" fn get_table(
    owner: *mut PluginOwner,
    name: *const c_char,
    key_type: u32,
) -> *mut TableHandle {
    let Some(ctx) = owner_ref(owner) else {
        return ptr::null_mut();
    };
    let Some(name) = str_arg(name) else {
        ctx.set_last_error(&TableError::InvalidName.to_string());
        return ptr::null_mut();
    };
    match ctx.get_table(name, key_type) {
        Ok(handle) => handle,
        Err(err) => {
            debug!(plugin = %ctx.plugin_name, table = name, error = %err, "table lookup failed");
            ctx.set_last_error(&err.to_string());
            ptr::null_mut()
        }
    }
}

unsafe extern "C" fn add_table(owner: *mut PluginOwner, input: *const TableInput) -> PluginRc {
    let (Some(ctx), Some(input)) = (owner_ref(owner), input.as_ref()) else {
        return RC_FAILURE;
    };
    let Some(name) = str_arg(input.name) else {
        ctx.set_last_error(&TableError::InvalidName.to_string());
        return RC_FAILURE;
    };
    match ctx.add_table(name, input.key_type) {
        Ok(()) => RC_SUCCESS,
        Err(err) => {
            warn!(plugin = %ctx.plugin_name, table = name, error = %err, "plugin failed to add table");
            ctx.set_last_error(&err.to_string());
            RC_FAILURE
        }
    }
}

unsafe extern "C" fn list_table_fields(
    t: *mut TableHandle,
    nfields: *mut u32,
) -> *const TableFieldInfoRaw {
    let (Some(acc), Some(nfields)) = (accessor_ref(t), nfields.as_mut()) else {
        return ptr::null();
    };
    acc.list_fields(nfields)
}

unsafe extern "C" fn add_table_field(
    t: *mut TableHandle,
    name: *const c_char,
    data_type: u32,
) -> PluginRc {
    let Some(acc) = accessor_ref(t) else {
        return RC_FAILURE;
    };
    let result = StateType::from_code(data_type).and_then(|ty| match str_arg(name) {
        Some(name) => acc.writer.add_field(name, ty),
        None => Err(TableError::UnknownField {
            table: acc.writer.reader().name().to_string(),
            field: String::new(),
        }),
    });
    match result {
        Ok(()) => RC_SUCCESS,
        Err(err) => acc.fail(&err),
    }
}

unsafe extern "C" fn get_table_name(t: *mut TableHandle) -> *const c_char {
    accessor_ref(t).map_or(ptr::null(), |acc| acc.name.as_ptr())
}

unsafe extern "C" fn get_table_size(t: *mut TableHandle) -> u64 {
    accessor_ref(t).map_or(u64::MAX, |acc| acc.writer.reader().len() as u64)
}

unsafe extern "C" fn read_entry_field(
    t: *mut TableHandle,
    key: *const StateData,
    field: *const c_char,
    out: *mut StateData,
) -> PluginRc {
    let Some(acc) = accessor_ref(t) else {
        return RC_FAILURE;
    };
    let (Some(key), Some(field), Some(out)) = (key.as_ref(), str_arg(field), out.as_mut()) else {
        return acc.fail(&TableError::InvalidValue(acc.writer.reader().key_type()));
    };
    match acc.read(key, field, out) {
        Ok(()) => RC_SUCCESS,
        Err(err) => acc.fail(&err),
    }
}

unsafe extern "C" fn clear_table(t: *mut TableHandle) -> PluginRc {
    match accessor_ref(t) {
        Some(acc) => {
            acc.writer.clear();
            RC_SUCCESS
        }
        None => RC_FAILURE,
    }
}

unsafe extern "C" fn erase_table_entry(t: *mut TableHandle, key: *const StateData) -> PluginRc {
    let Some(acc) = accessor_ref(t) else {
        return RC_FAILURE;
    };
    let Some(key) = key.as_ref() else {
        return acc.fail(&TableError::InvalidValue(acc.writer.reader().key_type()));
    };
    match acc.erase(key) {
        Ok(true) => RC_SUCCESS,
        Ok(false) => acc.fail(&TableError::EntryNotFound {
            table: acc.writer.reader().name().to_string(),
            key: "<unknown>".to_string(),
        }),
        Err(err) => acc.fail(&err),
    }
}

unsafe extern "C" fn write_entry_field(
    t: *mut TableHandle,
    key: *const StateData,
    field: *const c_char,
    value: *const StateData,
) -> PluginRc {
    let Some(acc) = accessor_ref(t) else {
        return RC_FAILURE;
    };
    let (Some(key), Some(field), Some(value)) = (key.as_ref(), str_arg(field), value.as_ref())
    else {
        return acc.fail(&TableError::InvalidValue(acc.writer.reader().key_type()));
    };
    match acc.write(key, field, value) {
        Ok(()) => RC_SUCCESS,
        Err(err) => acc.fail(&err),
    }
}

pub(crate) fn fields_vtable() -> TableFieldsVtable {
    TableFieldsVtable {
        list_table_fields,
        add_table_field,
    }
}

pub(crate) fn init_tables_input() -> InitTablesInput {
    InitTablesInput {
        list_tables,
        get_table,
        add_table,
        fields: fields_vtable(),
    }
}

pub(crate) fn reader_vtable() -> TableReaderVtable {
    TableReaderVtable {
        get_table_name,
        get_table_size,
        read_entry_field,
    }
}

pub(crate) fn writer_vtable() -> TableWriterVtable {
    TableWriterVtable {
        clear_table,
        erase_table_entry,
        write_entry_field,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_with_threads() -> OwnerContext {
        let registry = Arc::new(TableRegistry::new());
        registry
            .register(
                Arc::new(
                    StateTable::new("threads", StateType::Int64)
                        .with_field("comm", StateType::String, false)
                        .with_field("pid", StateType::Int64, true),
                ),
                TableOwner::Engine,
            )
            .unwrap();
        OwnerContext::new("dummy", registry)
    }

    #[test]
    fn test_list_and_get_tables() {
        let ctx = owner_with_threads();
        let owner = ctx.as_owner_ptr();
        let init = init_tables_input();

        let mut n: u32 = 0;
        let infos = unsafe { (init.list_tables)(owner, &mut n) };
        assert_eq!(n, 1);
        let info = unsafe { &*infos };
        assert_eq!(unsafe { CStr::from_ptr(info.name) }.to_str().unwrap(), "threads");
        assert_eq!(info.key_type, StateType::Int64.code());

        let name = CString::new("threads").unwrap();
        let handle = unsafe { (init.get_table)(owner, name.as_ptr(), StateType::Int64.code()) };
        assert!(!handle.is_null());
        let again = unsafe { (init.get_table)(owner, name.as_ptr(), StateType::Int64.code()) };
        assert_eq!(handle, again);

        let reader = reader_vtable();
        let tname = unsafe { CStr::from_ptr((reader.get_table_name)(handle)) };
        assert_eq!(tname.to_str().unwrap(), "threads");
        assert_eq!(unsafe { (reader.get_table_size)(handle) }, 0);
    }

    #[test]
    fn test_missing_table_sets_owner_error() {
        let ctx = owner_with_threads();
        let owner = ctx.as_owner_ptr();
        let init = init_tables_input();

        let name = CString::new("containers").unwrap();
        let handle = unsafe { (init.get_table)(owner, name.as_ptr(), StateType::String.code()) };
        assert!(handle.is_null());

        let err = unsafe { get_owner_last_error(owner) };
        assert!(!err.is_null());
        assert_eq!(
            unsafe { CStr::from_ptr(err) }.to_str().unwrap(),
            "table 'containers' does not exist"
        );
        assert_eq!(ctx.last_error().as_deref(), Some("table 'containers' does not exist"));
    }

    #[test]
    fn test_write_then_read_through_vtables() {
        let ctx = owner_with_threads();
        let owner = ctx.as_owner_ptr();
        let name = CString::new("threads").unwrap();
        let handle = unsafe {
            (init_tables_input().get_table)(owner, name.as_ptr(), StateType::Int64.code())
        };

        let writer = writer_vtable();
        let reader = reader_vtable();
        let key = StateData { s64: 42 };
        let comm = CString::new("comm").unwrap();
        let bash = CString::new("bash").unwrap();
        let value = StateData { str: bash.as_ptr() };
        assert_eq!(
            unsafe { (writer.write_entry_field)(handle, &key, comm.as_ptr(), &value) },
            RC_SUCCESS
        );

        let mut out = StateData { u64: 0 };
        assert_eq!(
            unsafe { (reader.read_entry_field)(handle, &key, comm.as_ptr(), &mut out) },
            RC_SUCCESS
        );
        assert_eq!(unsafe { CStr::from_ptr(out.str) }.to_str().unwrap(), "bash");

        let pid = CString::new("pid").unwrap();
        let pid_value = StateData { s64: 1 };
        assert_eq!(
            unsafe { (writer.write_entry_field)(handle, &key, pid.as_ptr(), &pid_value) },
            RC_FAILURE
        );
        assert!(ctx.last_error().unwrap().contains("read-only"));

        assert_eq!(unsafe { (writer.erase_table_entry)(handle, &key) }, RC_SUCCESS);
        assert_eq!(unsafe { (writer.erase_table_entry)(handle, &key) }, RC_FAILURE);
        assert_eq!(unsafe { (writer.clear_table)(handle) }, RC_SUCCESS);
    }

    #[test]
    fn test_add_table_is_owned_and_released() {
        let ctx = owner_with_threads();
        let owner = ctx.as_owner_ptr();
        let init = init_tables_input();

        let name = CString::new("dummy_state").unwrap();
        let input = TableInput {
            name: name.as_ptr(),
            key_type: StateType::Uint64.code(),
        };
        assert_eq!(unsafe { (init.add_table)(owner, &input) }, RC_SUCCESS);
        assert_eq!(unsafe { (init.add_table)(owner, &input) }, RC_FAILURE);
        assert_eq!(ctx.owned_tables(), vec!["dummy_state".to_string()]);
        assert_eq!(
            ctx.registry().owner_of("dummy_state"),
            Some(TableOwner::Plugin("dummy".into()))
        );

        let handle = unsafe { (init.get_table)(owner, name.as_ptr(), StateType::Uint64.code()) };
        let field = CString::new("count").unwrap();
        assert_eq!(
            unsafe { (init.fields.add_table_field)(handle, field.as_ptr(), StateType::Uint64.code()) },
            RC_SUCCESS
        );
        let mut n: u32 = 0;
        let fields = unsafe { (init.fields.list_table_fields)(handle, &mut n) };
        assert_eq!(n, 1);
        assert_eq!(unsafe { (*fields).read_only }, PLUGIN_FALSE);

        ctx.release_tables();
        assert!(!ctx.registry().contains("dummy_state"));
        assert!(ctx.registry().contains("threads"));
        assert!(ctx.owned_tables().is_empty());
    }

    #[test]
    fn test_concurrent_string_reads_keep_their_values() {
        use std::sync::Barrier;
        use std::thread;

        const THREADS: usize = 8;
        let ctx = owner_with_threads();
        let name = CString::new("threads").unwrap();
        let handle = unsafe {
            (init_tables_input().get_table)(ctx.as_owner_ptr(), name.as_ptr(), StateType::Int64.code())
        };
        let comm = CString::new("comm").unwrap();
        for i in 0..THREADS {
            let value = CString::new(format!("worker-{}", i)).unwrap();
            let status = unsafe {
                (writer_vtable().write_entry_field)(
                    handle,
                    &StateData { s64: i as i64 },
                    comm.as_ptr(),
                    &StateData { str: value.as_ptr() },
                )
            };
            assert_eq!(status, RC_SUCCESS);
        }

        let handle = handle as usize;
        let barrier = Barrier::new(THREADS);
        thread::scope(|s| {
            for i in 0..THREADS {
                let (barrier, comm) = (&barrier, &comm);
                s.spawn(move || {
                    let handle = handle as *mut TableHandle;
                    for _ in 0..50 {
                        let mut out = StateData { u64: 0 };
                        let status = unsafe {
                            (reader_vtable().read_entry_field)(
                                handle,
                                &StateData { s64: i as i64 },
                                comm.as_ptr(),
                                &mut out,
                            )
                        };
                        assert_eq!(status, RC_SUCCESS);
                        // all threads have read before any value is checked
                        barrier.wait();
                        let value = unsafe { CStr::from_ptr(out.str) };
                        assert_eq!(value.to_str().unwrap(), format!("worker-{}", i));
                    }
                });
            }
        });
    }

    #[test]
    fn test_null_owner_is_harmless() {
        assert!(unsafe { get_owner_last_error(ptr::null_mut()) }.is_null());
        let mut n: u32 = 0;
        assert!(unsafe { (init_tables_input().list_tables)(ptr::null_mut(), &mut n) }.is_null());
        assert_eq!(unsafe { (reader_vtable().get_table_size)(ptr::null_mut()) }, u64::MAX);
    }
}
