//! # sysplug Plugin API
//!
//! Loads native capability plugins and dispatches engine work to them.
//!
//! A plugin is a dynamic module exporting a flat C ABI (`plugin_get_name`,
//! `plugin_init`, ...). Which capabilities it has is decided by which
//! functions it exports:
//!
//! - **Event sourcing**: opens data sources and produces events
//! - **Field extraction**: extracts named fields from events
//! - **Event parsing**: updates plugin state from events, usually in tables
//!
//! [`Plugin`] is the lifecycle-checked facade over one module;
//! [`PluginManager`] owns all loaded plugins together with the
//! [`TableRegistry`] they share state through.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sysplug_plugin_api::{Plugin, TableRegistry};
//!
//! let tables = Arc::new(TableRegistry::new());
//! let plugin = Plugin::load("/usr/share/sysplug/plugins/libdummy.so", tables)?;
//! plugin.init(r#"{"jitter": 10}"#)?;
//! for field in plugin.fields() {
//!     println!("{} ({})", field.name, field.field_type);
//! }
//! plugin.destroy();
//! # Ok::<(), sysplug_plugin_api::PluginError>(())
//! ```

pub mod abi;
pub mod capabilities;
pub mod error;
pub mod fields;
pub mod init_schema;
pub mod loader;
pub mod manager;
pub mod plugin;
pub mod source;
pub mod table_api;
pub mod tables;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use abi::PLUGIN_API_VERSION;
pub use capabilities::Capabilities;
pub use error::{PluginError, PluginResult};
pub use fields::{FieldFlags, FieldInfo, FieldType};
pub use init_schema::SchemaType;
pub use loader::ModuleHandle;
pub use manager::PluginManager;
pub use plugin::{Phase, Plugin, PluginMetadata};
pub use source::{EventSourceDescriptor, OpenParam, Progress};
pub use table_api::OwnerContext;
pub use tables::{StateTable, StateType, StateValue, Table, TableError, TableRegistry};

// Re-export core types that plugins interact with
pub use sysplug_core::event::{Event, EventCodes, EventSourceSet, EventSources};
