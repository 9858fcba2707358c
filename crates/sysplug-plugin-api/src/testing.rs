//! In-process mock module for tests.
//!
//! [`MockModule`] builds a [`PluginApi`] table whose functions serve
//! configurable metadata, field schema, event scopes and extraction
//! results. Functions without a state argument read the configuration from
//! a per-thread slot, so a mock must be loaded and initialized on the
//! thread that built its table. Calls taking a state may come from any
//! thread.

use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::abi::{
    ByteBuffer, EventInput, EventParseInput, ExtractField, FieldExtractInput, InitInput,
    PluginApi, PluginBool, PluginRc, PluginState, SourceInstance, StateData, TableHandle,
    TableInput, PLUGIN_API_VERSION, PLUGIN_FALSE, PLUGIN_TRUE, RC_EOF, RC_FAILURE, RC_SUCCESS,
    SCHEMA_JSON,
};
use crate::tables::StateType;

const MOCK_SLOTS: usize = 16;

/// Field the mock adds to its own table and writes on every parsed event.
pub const MOCK_TABLE_FIELD: &str = "evtnum";

thread_local! {
    static SLOTS: RefCell<Vec<Option<Arc<MockSetup>>>> = RefCell::new(vec![None; MOCK_SLOTS]);
    static NEXT_SLOT: Cell<usize> = const { Cell::new(0) };
}

fn cstr(s: &str) -> CString {
    CString::new(s).unwrap_or_default()
}

/// Argument the mock last received with an extraction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockArg {
    Index(u64),
    Key(String),
}

/// Values the mock returns for a field.
#[derive(Debug, Clone, PartialEq)]
pub enum MockValue {
    Uint64(Vec<u64>),
    Uint32(Vec<u32>),
    Bool(Vec<bool>),
    String(Vec<String>),
    Buffer(Vec<Vec<u8>>),
}

/// Calls observed by a mock.
#[derive(Debug, Default)]
pub struct MockCounters {
    init_calls: AtomicUsize,
    destroy_calls: AtomicUsize,
    extract_calls: AtomicUsize,
    parse_calls: AtomicUsize,
    last_arg: Mutex<Option<MockArg>>,
    last_config: Mutex<Option<String>>,
}

impl MockCounters {
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    pub fn parse_calls(&self) -> usize {
        self.parse_calls.load(Ordering::SeqCst)
    }

    pub fn last_arg(&self) -> Option<MockArg> {
        self.last_arg.lock().clone()
    }

    /// Config string the module last received in `init`.
    pub fn last_config(&self) -> Option<String> {
        self.last_config.lock().clone()
    }
}

#[derive(Clone)]
struct MockSetup {
    required_api_version: CString,
    version: CString,
    name: CString,
    description: CString,
    contact: CString,
    init_schema: Option<(u32, CString)>,
    init_error: Option<(CString, bool)>,
    sourcing: Option<(u32, CString)>,
    open_params: Option<(CString, PluginRc)>,
    progress: Option<(CString, u32)>,
    event_string: Option<CString>,
    fields: Option<CString>,
    extract_sources: Option<CString>,
    extract_codes: Option<Vec<u16>>,
    values: HashMap<String, MockValue>,
    extract_rc: PluginRc,
    parsing: bool,
    parse_sources: Option<CString>,
    parse_codes: Option<Vec<u16>>,
    parse_rc: PluginRc,
    owned_table: Option<CString>,
    counters: Arc<MockCounters>,
}

/// Builder for an in-process plugin module.
#[derive(Clone)]
pub struct MockModule {
    setup: MockSetup,
}

impl MockModule {
    /// A module with metadata only; add at least one capability.
    pub fn new(name: &str) -> Self {
        Self {
            setup: MockSetup {
                required_api_version: cstr(PLUGIN_API_VERSION),
                version: cstr("0.1.0"),
                name: cstr(name),
                description: cstr("mock plugin"),
                contact: cstr("sysplug test suite"),
                init_schema: None,
                init_error: None,
                sourcing: None,
                open_params: None,
                progress: None,
                event_string: None,
                fields: None,
                extract_sources: None,
                extract_codes: None,
                values: HashMap::new(),
                extract_rc: RC_SUCCESS,
                parsing: false,
                parse_sources: None,
                parse_codes: None,
                parse_rc: RC_SUCCESS,
                owned_table: None,
                counters: Arc::new(MockCounters::default()),
            },
        }
    }

    pub fn counters(&self) -> Arc<MockCounters> {
        self.setup.counters.clone()
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.setup.version = cstr(version);
        self
    }

    pub fn with_required_api_version(mut self, version: &str) -> Self {
        self.setup.required_api_version = cstr(version);
        self
    }

    pub fn with_init_schema(mut self, schema: &str) -> Self {
        self.setup.init_schema = Some((SCHEMA_JSON, cstr(schema)));
        self
    }

    pub fn with_init_schema_type(mut self, schema_type: u32, schema: &str) -> Self {
        self.setup.init_schema = Some((schema_type, cstr(schema)));
        self
    }

    /// Makes `init` fail with `message`, returning a state only if
    /// `keep_state` is set.
    pub fn failing_init(mut self, message: &str, keep_state: bool) -> Self {
        self.setup.init_error = Some((cstr(message), keep_state));
        self
    }

    pub fn with_sourcing(mut self, id: u32, event_source: &str) -> Self {
        self.setup.sourcing = Some((id, cstr(event_source)));
        self
    }

    pub fn with_open_params(mut self, json: &str) -> Self {
        self.setup.open_params = Some((cstr(json), RC_SUCCESS));
        self
    }

    /// Makes `list_open_params` fail with `message` as last error.
    pub fn failing_open_params(mut self, message: &str) -> Self {
        self.setup.open_params = Some((cstr(message), RC_FAILURE));
        self
    }

    pub fn with_progress(mut self, message: &str, percent: u32) -> Self {
        self.setup.progress = Some((cstr(message), percent));
        self
    }

    pub fn with_event_to_string(mut self, rendered: &str) -> Self {
        self.setup.event_string = Some(cstr(rendered));
        self
    }

    pub fn with_extraction(mut self, fields_json: &str) -> Self {
        self.setup.fields = Some(cstr(fields_json));
        self
    }

    pub fn with_extract_sources(mut self, json: &str) -> Self {
        self.setup.extract_sources = Some(cstr(json));
        self
    }

    pub fn with_extract_codes(mut self, codes: &[u16]) -> Self {
        self.setup.extract_codes = Some(codes.to_vec());
        self
    }

    pub fn with_value(mut self, field: &str, value: MockValue) -> Self {
        self.setup.values.insert(field.to_string(), value);
        self
    }

    pub fn failing_extraction(mut self) -> Self {
        self.setup.extract_rc = RC_FAILURE;
        self
    }

    pub fn with_parsing(mut self) -> Self {
        self.setup.parsing = true;
        self
    }

    pub fn with_parse_sources(mut self, json: &str) -> Self {
        self.setup.parse_sources = Some(cstr(json));
        self
    }

    pub fn with_parse_codes(mut self, codes: &[u16]) -> Self {
        self.setup.parse_codes = Some(codes.to_vec());
        self
    }

    pub fn failing_parse(mut self) -> Self {
        self.setup.parse_rc = RC_FAILURE;
        self
    }

    /// Makes `init` register a `uint64`-keyed table owned by the plugin.
    /// Parsing then records every event number in it.
    pub fn with_owned_table(mut self, name: &str) -> Self {
        self.setup.owned_table = Some(cstr(name));
        self
    }

    /// Installs the configuration in a slot and returns its function table.
    pub fn api(&self) -> PluginApi {
        let slot = NEXT_SLOT.with(|next| {
            let slot = next.get();
            next.set((slot + 1) % MOCK_SLOTS);
            slot
        });
        SLOTS.with(|slots| slots.borrow_mut()[slot] = Some(Arc::new(self.setup.clone())));

        let mut api = table_for_slot(slot);
        let setup = &self.setup;
        if setup.init_schema.is_none() {
            api.get_init_schema = None;
        }
        match &setup.sourcing {
            None => {
                api.get_id = None;
                api.get_event_source = None;
                api.open = None;
                api.close = None;
                api.next_batch = None;
                api.list_open_params = None;
                api.get_progress = None;
                api.event_to_string = None;
            }
            Some(_) => {
                if setup.open_params.is_none() {
                    api.list_open_params = None;
                }
                if setup.progress.is_none() {
                    api.get_progress = None;
                }
                if setup.event_string.is_none() {
                    api.event_to_string = None;
                }
            }
        }
        if setup.fields.is_none() {
            api.get_fields = None;
            api.extract_fields = None;
        }
        if setup.fields.is_none() || setup.extract_sources.is_none() {
            api.get_extract_event_sources = None;
        }
        if setup.fields.is_none() || setup.extract_codes.is_none() {
            api.get_extract_event_types = None;
        }
        if !setup.parsing {
            api.parse_event = None;
        }
        if !setup.parsing || setup.parse_sources.is_none() {
            api.get_parse_event_sources = None;
        }
        if !setup.parsing || setup.parse_codes.is_none() {
            api.get_parse_event_types = None;
        }
        api
    }
}

fn setup<const SLOT: usize>() -> Option<Arc<MockSetup>> {
    SLOTS.with(|slots| slots.borrow().get(SLOT).cloned().flatten())
}

macro_rules! str_getter {
    ($fn:ident, $field:ident) => {
        unsafe extern "C" fn $fn<const SLOT: usize>() -> *const c_char {
            setup::<SLOT>().map_or(ptr::null(), |s| s.$field.as_ptr())
        }
    };
}

str_getter!(get_required_api_version, required_api_version);
str_getter!(get_version, version);
str_getter!(get_name, name);
str_getter!(get_description, description);
str_getter!(get_contact, contact);

unsafe extern "C" fn get_init_schema<const SLOT: usize>(schema_type: *mut u32) -> *const c_char {
    let Some(setup) = setup::<SLOT>() else {
        return ptr::null();
    };
    match &setup.init_schema {
        Some((ty, schema)) => {
            *schema_type = *ty;
            schema.as_ptr()
        }
        None => ptr::null(),
    }
}

unsafe extern "C" fn get_id<const SLOT: usize>() -> u32 {
    setup::<SLOT>().and_then(|s| s.sourcing.as_ref().map(|(id, _)| *id)).unwrap_or(0)
}

unsafe extern "C" fn get_event_source<const SLOT: usize>() -> *const c_char {
    setup::<SLOT>()
        .and_then(|s| s.sourcing.as_ref().map(|(_, src)| src.as_ptr()))
        .unwrap_or(ptr::null())
}

unsafe extern "C" fn get_fields<const SLOT: usize>() -> *const c_char {
    setup::<SLOT>()
        .and_then(|s| s.fields.as_ref().map(|f| f.as_ptr()))
        .unwrap_or(ptr::null())
}

unsafe extern "C" fn get_extract_event_sources<const SLOT: usize>() -> *const c_char {
    setup::<SLOT>()
        .and_then(|s| s.extract_sources.as_ref().map(|f| f.as_ptr()))
        .unwrap_or(ptr::null())
}

unsafe extern "C" fn get_parse_event_sources<const SLOT: usize>() -> *const c_char {
    setup::<SLOT>()
        .and_then(|s| s.parse_sources.as_ref().map(|f| f.as_ptr()))
        .unwrap_or(ptr::null())
}

unsafe fn codes(codes: Option<&Vec<u16>>, numtypes: *mut u32) -> *const u16 {
    match codes {
        Some(codes) => {
            *numtypes = codes.len() as u32;
            codes.as_ptr()
        }
        None => {
            *numtypes = 0;
            ptr::null()
        }
    }
}

unsafe extern "C" fn get_extract_event_types<const SLOT: usize>(numtypes: *mut u32) -> *const u16 {
    let setup = setup::<SLOT>();
    codes(setup.as_ref().and_then(|s| s.extract_codes.as_ref()), numtypes)
}

unsafe extern "C" fn get_parse_event_types<const SLOT: usize>(numtypes: *mut u32) -> *const u16 {
    let setup = setup::<SLOT>();
    codes(setup.as_ref().and_then(|s| s.parse_codes.as_ref()), numtypes)
}

#[derive(Default)]
struct FieldScratch {
    u64s: Vec<u64>,
    u32s: Vec<u32>,
    bools: Vec<PluginBool>,
    strings: Vec<CString>,
    str_ptrs: Vec<*const c_char>,
    bufs: Vec<Vec<u8>>,
    buf_descs: Vec<ByteBuffer>,
}

impl FieldScratch {
    fn fill(&mut self, value: &MockValue, field: &mut ExtractField) {
        match value {
            MockValue::Uint64(v) => {
                self.u64s = v.clone();
                field.res.u64 = self.u64s.as_ptr();
                field.res_len = v.len() as u64;
            }
            MockValue::Uint32(v) => {
                self.u32s = v.clone();
                field.res.u32 = self.u32s.as_ptr();
                field.res_len = v.len() as u64;
            }
            MockValue::Bool(v) => {
                self.bools = v
                    .iter()
                    .map(|b| if *b { PLUGIN_TRUE } else { PLUGIN_FALSE })
                    .collect();
                field.res.boolean = self.bools.as_ptr();
                field.res_len = v.len() as u64;
            }
            MockValue::String(v) => {
                self.strings = v.iter().map(|s| cstr(s)).collect();
                self.str_ptrs = self.strings.iter().map(|s| s.as_ptr()).collect();
                field.res.str = self.str_ptrs.as_ptr();
                field.res_len = v.len() as u64;
            }
            MockValue::Buffer(v) => {
                self.bufs = v.clone();
                self.buf_descs = self
                    .bufs
                    .iter()
                    .map(|b| ByteBuffer {
                        len: b.len() as u32,
                        ptr: b.as_ptr().cast(),
                    })
                    .collect();
                field.res.buf = self.buf_descs.as_ptr();
                field.res_len = v.len() as u64;
            }
        }
    }
}

struct MockState {
    setup: Arc<MockSetup>,
    last_error: Mutex<CString>,
    table: *mut TableHandle,
    scratch: Mutex<Vec<FieldScratch>>,
}

unsafe fn state_ref<'a>(s: *mut PluginState) -> Option<&'a MockState> {
    (s as *const MockState).as_ref()
}

unsafe extern "C" fn init<const SLOT: usize>(
    input: *const InitInput,
    rc: *mut PluginRc,
) -> *mut PluginState {
    let (Some(setup), Some(input)) = (setup::<SLOT>(), input.as_ref()) else {
        *rc = RC_FAILURE;
        return ptr::null_mut();
    };
    setup.counters.init_calls.fetch_add(1, Ordering::SeqCst);
    if !input.config.is_null() {
        let config = CStr::from_ptr(input.config).to_string_lossy().into_owned();
        *setup.counters.last_config.lock() = Some(config);
    }

    let mut state = Box::new(MockState {
        setup: setup.clone(),
        last_error: Mutex::new(CString::default()),
        table: ptr::null_mut(),
        scratch: Mutex::new(Vec::new()),
    });

    if let (Some(table), Some(tables)) = (&setup.owned_table, input.tables.as_ref()) {
        let key_type = StateType::Uint64.code();
        let request = TableInput {
            name: table.as_ptr(),
            key_type,
        };
        let handle = if (tables.add_table)(input.owner, &request) == RC_SUCCESS {
            (tables.get_table)(input.owner, table.as_ptr(), key_type)
        } else {
            ptr::null_mut()
        };
        if handle.is_null() {
            let err = (input.get_owner_last_error)(input.owner);
            if !err.is_null() {
                *state.last_error.lock() = CStr::from_ptr(err).to_owned();
            }
            *rc = RC_FAILURE;
            return Box::into_raw(state).cast();
        }
        let field = cstr(MOCK_TABLE_FIELD);
        (tables.fields.add_table_field)(handle, field.as_ptr(), key_type);
        state.table = handle;
    }

    if let Some((message, keep_state)) = &setup.init_error {
        *state.last_error.lock() = message.clone();
        *rc = RC_FAILURE;
        if *keep_state {
            return Box::into_raw(state).cast();
        }
        return ptr::null_mut();
    }

    *rc = RC_SUCCESS;
    Box::into_raw(state).cast()
}

unsafe extern "C" fn destroy(s: *mut PluginState) {
    if s.is_null() {
        return;
    }
    let state = Box::from_raw(s as *mut MockState);
    state.setup.counters.destroy_calls.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn get_last_error(s: *mut PluginState) -> *const c_char {
    state_ref(s).map_or(ptr::null(), |st| st.last_error.lock().as_ptr())
}

unsafe extern "C" fn open(
    _s: *mut PluginState,
    _params: *const c_char,
    rc: *mut PluginRc,
) -> *mut SourceInstance {
    *rc = RC_SUCCESS;
    Box::into_raw(Box::new(0u64)).cast()
}

unsafe extern "C" fn close(_s: *mut PluginState, h: *mut SourceInstance) {
    if !h.is_null() {
        drop(Box::from_raw(h as *mut u64));
    }
}

unsafe extern "C" fn next_batch(
    _s: *mut PluginState,
    _h: *mut SourceInstance,
    nevts: *mut u32,
    _evts: *mut *mut *mut u8,
) -> PluginRc {
    *nevts = 0;
    RC_EOF
}

unsafe extern "C" fn list_open_params(s: *mut PluginState, rc: *mut PluginRc) -> *const c_char {
    let Some(st) = state_ref(s) else {
        *rc = RC_FAILURE;
        return ptr::null();
    };
    match &st.setup.open_params {
        Some((json, RC_SUCCESS)) => {
            *rc = RC_SUCCESS;
            json.as_ptr()
        }
        Some((message, code)) => {
            *st.last_error.lock() = message.clone();
            *rc = *code;
            ptr::null()
        }
        None => {
            *rc = RC_SUCCESS;
            ptr::null()
        }
    }
}

unsafe extern "C" fn get_progress(
    s: *mut PluginState,
    _h: *mut SourceInstance,
    progress_pct: *mut u32,
) -> *const c_char {
    match state_ref(s).and_then(|st| st.setup.progress.as_ref()) {
        Some((message, pct)) => {
            *progress_pct = *pct;
            message.as_ptr()
        }
        None => {
            *progress_pct = 0;
            ptr::null()
        }
    }
}

unsafe extern "C" fn event_to_string(s: *mut PluginState, _evt: *const EventInput) -> *const c_char {
    state_ref(s)
        .and_then(|st| st.setup.event_string.as_ref().map(|e| e.as_ptr()))
        .unwrap_or(ptr::null())
}

unsafe extern "C" fn extract_fields(
    s: *mut PluginState,
    _evt: *const EventInput,
    input: *const FieldExtractInput,
) -> PluginRc {
    let (Some(st), Some(input)) = (state_ref(s), input.as_ref()) else {
        return RC_FAILURE;
    };
    let setup = &st.setup;
    setup.counters.extract_calls.fetch_add(1, Ordering::SeqCst);
    if setup.extract_rc != RC_SUCCESS {
        *st.last_error.lock() = cstr("mock extraction failure");
        return setup.extract_rc;
    }

    let fields = std::slice::from_raw_parts_mut(input.fields, input.num_fields as usize);
    let mut scratch = st.scratch.lock();
    scratch.clear();
    scratch.resize_with(fields.len(), FieldScratch::default);

    for (field, buf) in fields.iter_mut().zip(scratch.iter_mut()) {
        if field.arg_present != PLUGIN_FALSE {
            let arg = if field.arg_key.is_null() {
                MockArg::Index(field.arg_index)
            } else {
                MockArg::Key(CStr::from_ptr(field.arg_key).to_string_lossy().into_owned())
            };
            *setup.counters.last_arg.lock() = Some(arg);
        }

        field.res_len = 0;
        if field.field.is_null() {
            continue;
        }
        let name = CStr::from_ptr(field.field).to_string_lossy();
        if let Some(value) = setup.values.get(name.as_ref()) {
            buf.fill(value, field);
        }
    }
    RC_SUCCESS
}

unsafe extern "C" fn parse_event(
    s: *mut PluginState,
    evt: *const EventInput,
    input: *const EventParseInput,
) -> PluginRc {
    let (Some(st), Some(evt), Some(input)) = (state_ref(s), evt.as_ref(), input.as_ref()) else {
        return RC_FAILURE;
    };
    st.setup.counters.parse_calls.fetch_add(1, Ordering::SeqCst);
    if st.setup.parse_rc != RC_SUCCESS {
        *st.last_error.lock() = cstr("mock parse failure");
        return st.setup.parse_rc;
    }

    if !st.table.is_null() {
        let key = StateData { u64: evt.evtnum };
        let field = cstr(MOCK_TABLE_FIELD);
        let rc = (input.table_writer.write_entry_field)(st.table, &key, field.as_ptr(), &key);
        if rc != RC_SUCCESS {
            return rc;
        }
    }
    RC_SUCCESS
}

fn table<const SLOT: usize>() -> PluginApi {
    PluginApi {
        get_required_api_version: Some(get_required_api_version::<SLOT>),
        get_version: Some(get_version::<SLOT>),
        get_name: Some(get_name::<SLOT>),
        get_description: Some(get_description::<SLOT>),
        get_contact: Some(get_contact::<SLOT>),
        get_init_schema: Some(get_init_schema::<SLOT>),
        init: Some(init::<SLOT>),
        destroy: Some(destroy),
        get_last_error: Some(get_last_error),
        get_id: Some(get_id::<SLOT>),
        get_event_source: Some(get_event_source::<SLOT>),
        open: Some(open),
        close: Some(close),
        list_open_params: Some(list_open_params),
        get_progress: Some(get_progress),
        event_to_string: Some(event_to_string),
        next_batch: Some(next_batch),
        get_fields: Some(get_fields::<SLOT>),
        get_extract_event_types: Some(get_extract_event_types::<SLOT>),
        get_extract_event_sources: Some(get_extract_event_sources::<SLOT>),
        extract_fields: Some(extract_fields),
        get_parse_event_types: Some(get_parse_event_types::<SLOT>),
        get_parse_event_sources: Some(get_parse_event_sources::<SLOT>),
        parse_event: Some(parse_event),
    }
}

fn table_for_slot(slot: usize) -> PluginApi {
    match slot {
        0 => table::<0>(),
        1 => table::<1>(),
        2 => table::<2>(),
        3 => table::<3>(),
        4 => table::<4>(),
        5 => table::<5>(),
        6 => table::<6>(),
        7 => table::<7>(),
        8 => table::<8>(),
        9 => table::<9>(),
        10 => table::<10>(),
        11 => table::<11>(),
        12 => table::<12>(),
        13 => table::<13>(),
        14 => table::<14>(),
        _ => table::<15>(),
    }
}
