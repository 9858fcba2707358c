//! Typed values produced by field extraction.

use std::fmt;
use std::net::Ipv4Addr;
use std::slice;
use sysplug_plugin_api::abi::{self, ExtractField};
use sysplug_plugin_api::FieldType;

use crate::error::{FilterError, FilterResult};

/// One extracted value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Uint64(u64),
    RelTime(u64),
    AbsTime(u64),
    Bool(bool),
    Ipv4Addr(Ipv4Addr),
    String(String),
    Ipv4Net(Vec<u8>),
    Ipv6Addr(Vec<u8>),
    Ipv6Net(Vec<u8>),
    IpNet(Vec<u8>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Uint64(_) => FieldType::Uint64,
            FieldValue::RelTime(_) => FieldType::RelTime,
            FieldValue::AbsTime(_) => FieldType::AbsTime,
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Ipv4Addr(_) => FieldType::Ipv4Addr,
            FieldValue::String(_) => FieldType::String,
            FieldValue::Ipv4Net(_) => FieldType::Ipv4Net,
            FieldValue::Ipv6Addr(_) => FieldType::Ipv6Addr,
            FieldValue::Ipv6Net(_) => FieldType::Ipv6Net,
            FieldValue::IpNet(_) => FieldType::IpNet,
        }
    }

    /// Raw bytes as the engine stores them: 8 bytes for integers and
    /// times, 4 bytes for booleans and IPv4 addresses, the text for
    /// strings and the buffer for network types.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            FieldValue::Uint64(v) | FieldValue::RelTime(v) | FieldValue::AbsTime(v) => {
                v.to_ne_bytes().to_vec()
            }
            FieldValue::Bool(b) => u32::from(*b).to_ne_bytes().to_vec(),
            FieldValue::Ipv4Addr(addr) => addr.octets().to_vec(),
            FieldValue::String(s) => s.as_bytes().to_vec(),
            FieldValue::Ipv4Net(buf)
            | FieldValue::Ipv6Addr(buf)
            | FieldValue::Ipv6Net(buf)
            | FieldValue::IpNet(buf) => buf.clone(),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Uint64(v) | FieldValue::RelTime(v) | FieldValue::AbsTime(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Uint64(v) | FieldValue::RelTime(v) | FieldValue::AbsTime(v) => {
                write!(f, "{}", v)
            }
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Ipv4Addr(addr) => write!(f, "{}", addr),
            FieldValue::String(s) => f.write_str(s),
            FieldValue::Ipv4Net(buf)
            | FieldValue::Ipv6Addr(buf)
            | FieldValue::Ipv6Net(buf)
            | FieldValue::IpNet(buf) => {
                for (i, b) in buf.iter().enumerate() {
                    if i > 0 {
                        f.write_str(":")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

unsafe fn items<'a, T>(ptr: *const T, len: usize) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(ptr, len)
    }
}

/// Converts the result a module wrote into `field`.
///
/// # Safety
///
/// `field` must have been filled in by a successful extraction, and the
/// module's result buffers must still be valid.
pub unsafe fn decode_values(field: &ExtractField) -> FilterResult<Vec<FieldValue>> {
    let len = field.res_len as usize;
    let field_type =
        FieldType::from_code(field.ftype).ok_or(FilterError::UnsupportedType(field.ftype))?;

    let values = match field_type {
        FieldType::Uint64 | FieldType::RelTime | FieldType::AbsTime => {
            let wrap = match field_type {
                FieldType::RelTime => FieldValue::RelTime,
                FieldType::AbsTime => FieldValue::AbsTime,
                _ => FieldValue::Uint64,
            };
            items(field.res.u64, len).iter().map(|v| wrap(*v)).collect()
        }
        FieldType::Bool => items(field.res.u32, len)
            .iter()
            .map(|v| FieldValue::Bool(*v != 0))
            .collect(),
        // the address is stored in network byte order
        FieldType::Ipv4Addr => items(field.res.u32, len)
            .iter()
            .map(|v| FieldValue::Ipv4Addr(Ipv4Addr::from(v.to_ne_bytes())))
            .collect(),
        FieldType::String => items(field.res.str, len)
            .iter()
            .map(|s| FieldValue::String(abi::string_from_module(*s)))
            .collect(),
        FieldType::Ipv4Net | FieldType::Ipv6Addr | FieldType::Ipv6Net | FieldType::IpNet => {
            let wrap = match field_type {
                FieldType::Ipv4Net => FieldValue::Ipv4Net,
                FieldType::Ipv6Addr => FieldValue::Ipv6Addr,
                FieldType::Ipv6Net => FieldValue::Ipv6Net,
                _ => FieldValue::IpNet,
            };
            items(field.res.buf, len)
                .iter()
                .map(|b| wrap(items(b.ptr.cast::<u8>(), b.len as usize).to_vec()))
                .collect()
        }
    };
    Ok(values)
}
