//! Plugin fields in filter expressions
//!
//! This crate connects filter expressions to the fields extraction plugins
//! declare:
//!
//! - Parsing field references with an optional argument, `name` or
//!   `name[argument]`, checked against the field's argument flags
//! - Rejecting events the plugin cannot handle (unknown or incompatible
//!   event source, event code outside its set) without calling the module
//! - Converting the module's raw results into typed [`FieldValue`]s
//!
//! Argument errors surface while a filter is compiled, so a malformed
//! expression never reaches event evaluation.
//!
//! # Examples
//!
//! ```rust
//! use sysplug_filter::check::parse_index;
//! use sysplug_filter::IndexError;
//!
//! assert_eq!(parse_index("3"), Ok(3));
//! assert_eq!(parse_index("03"), Err(IndexError::LeadingZero));
//! ```

pub mod check;
pub mod error;
pub mod value;

// Re-export commonly used types
pub use check::{parse_index, ExtractStats, FieldArgument, PluginFieldCheck};
pub use error::{FilterError, FilterResult, IndexError};
pub use value::FieldValue;
