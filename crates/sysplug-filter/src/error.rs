use std::fmt;
use sysplug_plugin_api::PluginError;
use thiserror::Error;

/// Why an index argument was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    /// Empty, or a number with a leading zero
    LeadingZero,
    /// Contains something other than `0-9`
    NotDigits,
    /// Does not fit in 64 bits
    Overflow,
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::LeadingZero => f.write_str("has an invalid index argument starting with 0"),
            IndexError::NotDigits => {
                f.write_str("has an invalid index argument not composed only by digits")
            }
            IndexError::Overflow => {
                f.write_str("has an invalid index argument not representable on 64 bit")
            }
        }
    }
}

/// Filter adapter errors
///
/// Syntax errors are raised while a filter is compiled, never while it is
/// evaluated.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("plugin {0} does not have the extraction capability")]
    NotExtractionCapable(String),

    #[error("filter {filter} {field} does not allow nor require an argument but one is provided: {argument}")]
    ArgumentNotAllowed {
        filter: String,
        field: String,
        argument: String,
    },

    #[error("filter {filter} {field} requires an argument but none provided")]
    ArgumentRequired { filter: String, field: String },

    #[error("filter {filter} {field} has a badly-formatted argument")]
    MalformedArgument { filter: String, field: String },

    #[error("filter {filter} {field} {reason}: {argument}")]
    InvalidIndex {
        filter: String,
        field: String,
        argument: String,
        reason: IndexError,
    },

    #[error("plugin extract error: unsupported field type {0}")]
    UnsupportedType(u32),

    #[error("no field selected")]
    NoField,

    #[error("field name {0:?} contains a NUL character")]
    InvalidFieldName(String),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

impl FilterError {
    /// Returns true for errors in the filter text itself.
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            FilterError::ArgumentNotAllowed { .. }
                | FilterError::ArgumentRequired { .. }
                | FilterError::MalformedArgument { .. }
                | FilterError::InvalidIndex { .. }
        )
    }
}

pub type FilterResult<T> = Result<T, FilterError>;
