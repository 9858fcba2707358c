//! # sysplug Core
//!
//! Core types, error handling, and configuration shared by the sysplug
//! plugin subsystem.
//!
//! This crate provides the foundational building blocks:
//!
//! - **Events**: The engine-side view of a captured event (`Event`), the catalog
//!   of numeric event-source indices (`EventSources`), event-code sets and the
//!   event-source compatibility set used to decide which plugins see which events.
//! - **Errors**: Error types using `thiserror` for configuration and I/O failures.
//! - **Configuration**: YAML files with environment variable overrides and
//!   validation, describing which plugins to load and how to log.
//!
//! ## Example
//!
//! ```
//! use sysplug_core::config::AppConfig;
//!
//! let yaml = r#"
//! plugins:
//!   - name: dummy
//!     library_path: /usr/share/sysplug/plugins/libdummy.so
//!     init_config: '{"jitter": 10}'
//! "#;
//!
//! let config = AppConfig::from_yaml(yaml).unwrap();
//! assert!(config.validate().is_ok());
//! ```

pub mod config;
pub mod error;
pub mod event;

// Re-export commonly used types for convenience
pub use config::{AppConfig, PluginConfig};
pub use error::{Result, SysplugError};
pub use event::{
    Event, EventCodes, EventSourceSet, EventSources, PLUGIN_EVENT_CODE, SYSCALL_SOURCE_NAME,
};
