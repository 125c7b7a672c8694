use std::collections::BTreeMap;
use std::fmt;

use crate::record::Record;

/// The dynamic value type shared by the evaluator, the codecs and the
/// partially-built record (see SPEC_FULL.md §B.1).
///
/// Every codec decodes into a `Value` and every expression evaluates to
/// one; converters translate between a `Value` and the strongly-typed slot
/// a host record exposes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    /// Sign-extended integer wider than 64 bits but within the 1..=128 bit
    /// range `get_integer` supports (spec §4.1).
    Integer128(i128),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    /// A nested, fully decoded record (the result of an `Object` codec),
    /// tagged with the sub-template name that produced it so encode can
    /// re-select the same alternative without re-evaluating its condition
    /// (spec §9, "Sum types over class hierarchies").
    Object { type_name: String, record: Record },
    /// Free-form metadata map, used by the describer and by configuration
    /// field export.
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Integer(v) => Some(*v as i128),
            Value::Integer128(v) => Some(*v),
            Value::Bool(b) => Some(*b as i128),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Integer(v) if *v >= 0 => Some(*v as u64),
            Value::Integer128(v) if *v >= 0 => Some(*v as u64),
            Value::Bool(b) => Some(*b as u64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(v) => Some(*v != 0),
            Value::Null => Some(false),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(v) => Some(*v as f64),
            Value::Integer128(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Integer128(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "{b:02x?}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object { type_name, .. } => write!(f, "<{type_name}>"),
            Value::Map(m) => write!(f, "{m:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i128> for Value {
    fn from(v: i128) -> Self {
        if let Ok(v) = i64::try_from(v) {
            Value::Integer(v)
        } else {
            Value::Integer128(v)
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}
