//! Engine-side event model.
//!
//! The capture pipeline produces raw event buffers and assigns each event a
//! numeric event-source index. This module only describes the view of those
//! events that plugins are handed, plus the sets used to decide whether a
//! plugin is interested in an event at all.

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashSet};
use std::ffi::CStr;
use std::sync::Arc;

/// Name of the built-in primary event source (syscall-derived events).
pub const SYSCALL_SOURCE_NAME: &str = "syscall";

/// Event code used for events produced by sourcing plugins.
pub const PLUGIN_EVENT_CODE: u16 = 322;

/// A captured event as seen by plugins.
///
/// Borrowed from the capture pipeline for the duration of a single dispatch.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    /// Monotonic event sequence number
    pub num: u64,
    /// Numeric event type code
    pub event_type: u16,
    /// Index of the event source in the engine's source catalog,
    /// `None` when the source is unknown
    pub source_idx: Option<u32>,
    /// Name of the event source
    pub source_name: &'a CStr,
    /// Complete raw event buffer (header and parameters)
    pub raw: &'a [u8],
    /// Payload carried by the event (the plugin data for plugin events)
    pub payload: &'a [u8],
}

impl<'a> Event<'a> {
    /// Returns the event source index as used across the module boundary.
    ///
    /// Unknown sources are encoded as `u32::MAX`.
    #[inline]
    pub fn source_idx_raw(&self) -> u32 {
        self.source_idx.unwrap_or(u32::MAX)
    }
}

/// Catalog of event source names indexed by the numeric source index.
///
/// Cheap to clone; all clones observe the same catalog.
#[derive(Debug, Clone, Default)]
pub struct EventSources {
    names: Arc<RwLock<Vec<String>>>,
}

impl EventSources {
    /// Creates a catalog that only knows the built-in syscall source.
    pub fn new() -> Self {
        let sources = Self::default();
        sources.add(SYSCALL_SOURCE_NAME);
        sources
    }

    /// Registers a source and returns its index. Registering an existing
    /// name returns the index it already has.
    pub fn add(&self, name: &str) -> u32 {
        let mut names = self.names.write();
        if let Some(idx) = names.iter().position(|n| n == name) {
            return idx as u32;
        }
        names.push(name.to_string());
        (names.len() - 1) as u32
    }

    /// Returns the name of the source at `idx`.
    pub fn name(&self, idx: u32) -> Option<String> {
        self.names.read().get(idx as usize).cloned()
    }

    /// Returns the index of a source by name.
    pub fn index_of(&self, name: &str) -> Option<u32> {
        self.names
            .read()
            .iter()
            .position(|n| n == name)
            .map(|idx| idx as u32)
    }

    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

/// Set of event codes a plugin is interested in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventCodes {
    /// Every event code
    All,
    /// Only the listed codes
    Only(BTreeSet<u16>),
}

impl EventCodes {
    /// Returns true if the set contains `code`.
    #[inline]
    pub fn contains(&self, code: u16) -> bool {
        match self {
            EventCodes::All => true,
            EventCodes::Only(codes) => codes.contains(&code),
        }
    }

    /// Returns true if this is the "all codes" set.
    pub fn is_all(&self) -> bool {
        matches!(self, EventCodes::All)
    }

    /// Builds an explicit set from a list of codes.
    pub fn from_codes<I: IntoIterator<Item = u16>>(codes: I) -> Self {
        EventCodes::Only(codes.into_iter().collect())
    }
}

impl Default for EventCodes {
    fn default() -> Self {
        EventCodes::Only(BTreeSet::new())
    }
}

/// Set of event source names a plugin declares compatibility with.
///
/// The empty set means "compatible with every source".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSourceSet {
    sources: HashSet<String>,
}

impl EventSourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source name. Empty names are ignored.
    pub fn insert(&mut self, source: impl Into<String>) {
        let source = source.into();
        if !source.is_empty() {
            self.sources.insert(source);
        }
    }

    /// Returns true if events from `source` are compatible with this set.
    #[inline]
    pub fn is_compatible(&self, source: &str) -> bool {
        self.sources.is_empty() || self.sources.contains(source)
    }

    /// Returns true if no explicit source was declared.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn contains(&self, source: &str) -> bool {
        self.sources.contains(source)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for EventSourceSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = EventSourceSet::new();
        for source in iter {
            set.insert(source);
        }
        set
    }
}
