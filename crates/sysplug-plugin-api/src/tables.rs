//! Shared state tables.
//!
//! A table is a named associative structure keyed by a single typed key.
//! Each entry maps the table's declared fields to typed values. Tables are
//! registered once in a [`TableRegistry`] with an owner (the engine or a
//! plugin) and are handed out as [`TableReader`] or [`TableWriter`]
//! accessors, which never transfer ownership.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Table errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("table '{0}' does not exist")]
    NotFound(String),

    #[error("table '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid table name")]
    InvalidName,

    #[error("table '{table}' has key type {actual}, but {expected} was requested")]
    KeyTypeMismatch {
        table: String,
        expected: StateType,
        actual: StateType,
    },

    #[error("table '{table}' has no field '{field}'")]
    UnknownField { table: String, field: String },

    #[error("field '{field}' of table '{table}' already exists with type {existing}")]
    FieldExists {
        table: String,
        field: String,
        existing: StateType,
    },

    #[error("field '{field}' of table '{table}' has type {expected}, got {actual}")]
    FieldTypeMismatch {
        table: String,
        field: String,
        expected: StateType,
        actual: StateType,
    },

    #[error("field '{field}' of table '{table}' is read-only")]
    ReadOnlyField { table: String, field: String },

    #[error("table '{table}' has no entry with key {key}")]
    EntryNotFound { table: String, key: String },

    #[error("unsupported state type code {0}")]
    InvalidType(u32),

    #[error("invalid value for type {0}")]
    InvalidValue(StateType),
}

pub type TableResult<T> = Result<T, TableError>;

/// Type of a table key or field value.
///
/// Codes are shared with the event parameter type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum StateType {
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    Uint8 = 5,
    Uint16 = 6,
    Uint32 = 7,
    Uint64 = 8,
    String = 9,
    Bool = 25,
}

impl StateType {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> TableResult<Self> {
        Ok(match code {
            1 => Self::Int8,
            2 => Self::Int16,
            3 => Self::Int32,
            4 => Self::Int64,
            5 => Self::Uint8,
            6 => Self::Uint16,
            7 => Self::Uint32,
            8 => Self::Uint64,
            9 => Self::String,
            25 => Self::Bool,
            other => return Err(TableError::InvalidType(other)),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::String => "string",
            Self::Bool => "bool",
        }
    }

    /// Value of a field that was never written.
    pub fn default_value(self) -> StateValue {
        match self {
            Self::Int8 => StateValue::Int8(0),
            Self::Int16 => StateValue::Int16(0),
            Self::Int32 => StateValue::Int32(0),
            Self::Int64 => StateValue::Int64(0),
            Self::Uint8 => StateValue::Uint8(0),
            Self::Uint16 => StateValue::Uint16(0),
            Self::Uint32 => StateValue::Uint32(0),
            Self::Uint64 => StateValue::Uint64(0),
            Self::String => StateValue::String(String::new()),
            Self::Bool => StateValue::Bool(false),
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed table key or field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    String(String),
    Bool(bool),
}

impl StateValue {
    pub fn state_type(&self) -> StateType {
        match self {
            Self::Int8(_) => StateType::Int8,
            Self::Int16(_) => StateType::Int16,
            Self::Int32(_) => StateType::Int32,
            Self::Int64(_) => StateType::Int64,
            Self::Uint8(_) => StateType::Uint8,
            Self::Uint16(_) => StateType::Uint16,
            Self::Uint32(_) => StateType::Uint32,
            Self::Uint64(_) => StateType::Uint64,
            Self::String(_) => StateType::String,
            Self::Bool(_) => StateType::Bool,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int8(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::Uint8(v) => write!(f, "{}", v),
            Self::Uint16(v) => write!(f, "{}", v),
            Self::Uint32(v) => write!(f, "{}", v),
            Self::Uint64(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{:?}", v),
            Self::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<u64> for StateValue {
    fn from(v: u64) -> Self {
        Self::Uint64(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Declared field of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableField {
    pub name: String,
    pub field_type: StateType,
    pub read_only: bool,
}

/// A shared state table.
pub trait Table: Send + Sync {
    fn name(&self) -> &str;

    fn key_type(&self) -> StateType;

    fn fields(&self) -> Vec<TableField>;

    /// Declares a new field. Declaring an existing field again with the
    /// same type is a no-op.
    fn add_field(&self, name: &str, field_type: StateType) -> TableResult<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads a field of an entry. Fields never written read as the default
    /// value of their type.
    fn get(&self, key: &StateValue, field: &str) -> TableResult<StateValue>;

    /// Writes a field of an entry, creating the entry if needed.
    fn set(&self, key: StateValue, field: &str, value: StateValue) -> TableResult<()>;

    /// Removes an entry. Returns false if there was none.
    fn erase(&self, key: &StateValue) -> TableResult<bool>;

    fn clear(&self);
}

#[derive(Default)]
struct StateTableInner {
    fields: Vec<TableField>,
    entries: HashMap<StateValue, HashMap<String, StateValue>>,
}

/// In-memory table.
pub struct StateTable {
    name: String,
    key_type: StateType,
    inner: RwLock<StateTableInner>,
}

impl StateTable {
    pub fn new(name: impl Into<String>, key_type: StateType) -> Self {
        Self {
            name: name.into(),
            key_type,
            inner: RwLock::new(StateTableInner::default()),
        }
    }

    /// Adds a field at construction time.
    pub fn with_field(self, name: impl Into<String>, field_type: StateType, read_only: bool) -> Self {
        self.inner.write().fields.push(TableField {
            name: name.into(),
            field_type,
            read_only,
        });
        self
    }

    fn check_key(&self, key: &StateValue) -> TableResult<()> {
        if key.state_type() != self.key_type {
            return Err(TableError::KeyTypeMismatch {
                table: self.name.clone(),
                expected: key.state_type(),
                actual: self.key_type,
            });
        }
        Ok(())
    }

    fn field_type(&self, inner: &StateTableInner, field: &str) -> TableResult<StateType> {
        inner
            .fields
            .iter()
            .find(|f| f.name == field)
            .map(|f| f.field_type)
            .ok_or_else(|| TableError::UnknownField {
                table: self.name.clone(),
                field: field.to_string(),
            })
    }
}

impl fmt::Debug for StateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTable")
            .field("name", &self.name)
            .field("key_type", &self.key_type)
            .field("len", &self.len())
            .finish()
    }
}

impl Table for StateTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn key_type(&self) -> StateType {
        self.key_type
    }

    fn fields(&self) -> Vec<TableField> {
        self.inner.read().fields.clone()
    }

    fn add_field(&self, name: &str, field_type: StateType) -> TableResult<()> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.fields.iter().find(|f| f.name == name) {
            if existing.field_type == field_type {
                return Ok(());
            }
            return Err(TableError::FieldExists {
                table: self.name.clone(),
                field: name.to_string(),
                existing: existing.field_type,
            });
        }
        inner.fields.push(TableField {
            name: name.to_string(),
            field_type,
            read_only: false,
        });
        Ok(())
    }

    fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    fn get(&self, key: &StateValue, field: &str) -> TableResult<StateValue> {
        self.check_key(key)?;
        let inner = self.inner.read();
        let field_type = self.field_type(&inner, field)?;
        let entry = inner
            .entries
            .get(key)
            .ok_or_else(|| TableError::EntryNotFound {
                table: self.name.clone(),
                key: key.to_string(),
            })?;
        Ok(entry
            .get(field)
            .cloned()
            .unwrap_or_else(|| field_type.default_value()))
    }

    fn set(&self, key: StateValue, field: &str, value: StateValue) -> TableResult<()> {
        self.check_key(&key)?;
        let mut inner = self.inner.write();
        let field_type = self.field_type(&inner, field)?;
        if value.state_type() != field_type {
            return Err(TableError::FieldTypeMismatch {
                table: self.name.clone(),
                field: field.to_string(),
                expected: field_type,
                actual: value.state_type(),
            });
        }
        inner
            .entries
            .entry(key)
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    fn erase(&self, key: &StateValue) -> TableResult<bool> {
        self.check_key(key)?;
        Ok(self.inner.write().entries.remove(key).is_some())
    }

    fn clear(&self) {
        self.inner.write().entries.clear();
    }
}

/// Who registered a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableOwner {
    Engine,
    Plugin(String),
}

/// Summary of a registered table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub key_type: StateType,
    pub owner: TableOwner,
}

struct RegisteredTable {
    table: Arc<dyn Table>,
    owner: TableOwner,
}

/// Central registry of shared tables.
#[derive(Default)]
pub struct TableRegistry {
    tables: DashMap<String, RegisteredTable>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table under its own name.
    pub fn register(&self, table: Arc<dyn Table>, owner: TableOwner) -> TableResult<()> {
        let name = table.name().to_string();
        if name.is_empty() {
            return Err(TableError::InvalidName);
        }
        match self.tables.entry(name) {
            Entry::Occupied(e) => Err(TableError::AlreadyExists(e.key().clone())),
            Entry::Vacant(e) => {
                debug!(table = %e.key(), ?owner, "registered table");
                e.insert(RegisteredTable { table, owner });
                Ok(())
            }
        }
    }

    /// Resolves a table by name, checking its key type.
    pub fn get(&self, name: &str, key_type: StateType) -> TableResult<Arc<dyn Table>> {
        let entry = self
            .tables
            .get(name)
            .ok_or_else(|| TableError::NotFound(name.to_string()))?;
        let actual = entry.table.key_type();
        if actual != key_type {
            return Err(TableError::KeyTypeMismatch {
                table: name.to_string(),
                expected: key_type,
                actual,
            });
        }
        Ok(entry.table.clone())
    }

    pub fn reader(&self, name: &str, key_type: StateType) -> TableResult<TableReader> {
        self.get(name, key_type).map(TableReader::new)
    }

    pub fn writer(&self, name: &str, key_type: StateType) -> TableResult<TableWriter> {
        self.get(name, key_type).map(TableWriter::new)
    }

    pub fn owner_of(&self, name: &str) -> Option<TableOwner> {
        self.tables.get(name).map(|e| e.owner.clone())
    }

    /// Lists all tables, sorted by name.
    pub fn list(&self) -> Vec<TableInfo> {
        let mut infos: Vec<TableInfo> = self
            .tables
            .iter()
            .map(|e| TableInfo {
                name: e.key().clone(),
                key_type: e.table.key_type(),
                owner: e.owner.clone(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Removes every table owned by `plugin` and returns their names.
    pub fn remove_owned_by(&self, plugin: &str) -> Vec<String> {
        let owned: Vec<String> = self
            .tables
            .iter()
            .filter(|e| matches!(&e.owner, TableOwner::Plugin(p) if p == plugin))
            .map(|e| e.key().clone())
            .collect();
        for name in &owned {
            self.tables.remove(name);
        }
        if !owned.is_empty() {
            debug!(plugin, tables = ?owned, "removed plugin-owned tables");
        }
        owned
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl fmt::Debug for TableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableRegistry")
            .field("tables", &self.list())
            .finish()
    }
}

/// Read-only access to a table.
#[derive(Clone)]
pub struct TableReader {
    table: Arc<dyn Table>,
}

impl TableReader {
    pub fn new(table: Arc<dyn Table>) -> Self {
        Self { table }
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub fn key_type(&self) -> StateType {
        self.table.key_type()
    }

    pub fn fields(&self) -> Vec<TableField> {
        self.table.fields()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn read(&self, key: &StateValue, field: &str) -> TableResult<StateValue> {
        self.table.get(key, field)
    }
}

/// Read-write access to a table.
#[derive(Clone)]
pub struct TableWriter {
    reader: TableReader,
}

impl TableWriter {
    pub fn new(table: Arc<dyn Table>) -> Self {
        Self {
            reader: TableReader::new(table),
        }
    }

    pub fn reader(&self) -> &TableReader {
        &self.reader
    }

    pub fn add_field(&self, name: &str, field_type: StateType) -> TableResult<()> {
        if name.is_empty() {
            return Err(TableError::UnknownField {
                table: self.reader.name().to_string(),
                field: String::new(),
            });
        }
        self.reader.table.add_field(name, field_type)
    }

    /// Writes a field, refusing fields declared read-only.
    pub fn write(&self, key: StateValue, field: &str, value: StateValue) -> TableResult<()> {
        let read_only = self
            .reader
            .fields()
            .iter()
            .any(|f| f.name == field && f.read_only);
        if read_only {
            return Err(TableError::ReadOnlyField {
                table: self.reader.name().to_string(),
                field: field.to_string(),
            });
        }
        self.reader.table.set(key, field, value)
    }

    pub fn erase(&self, key: &StateValue) -> TableResult<bool> {
        self.reader.table.erase(key)
    }

    pub fn clear(&self) {
        self.reader.table.clear()
    }
}
