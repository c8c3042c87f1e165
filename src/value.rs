//! Dynamic field values.
//!
//! Message schemas are only known at runtime, so decoded packets carry their
//! field values as a name-keyed map of [`MavValue`]s instead of per-message
//! structs.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single decoded (or to-be-encoded) field value.
///
/// Enum-bound scalar fields are surfaced as the entry name; bitmask fields as
/// the set of entry names whose bits are set. Integer width and signedness on
/// the wire come from the field type, not from the value variant.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", content = "value"))]
pub enum MavValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    IntVec(Vec<i64>),
    UIntVec(Vec<u64>),
    FloatVec(Vec<f64>),
    Enum(String),
    EnumSet(Vec<String>),
}

impl MavValue {
    /// Numeric view as unsigned, if the value is an in-range integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Numeric view as signed, if the value is an in-range integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Numeric view as a float; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Variant name, used in error reports.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "an integer",
            Self::UInt(_) => "an unsigned integer",
            Self::Float(_) => "a float",
            Self::Text(_) => "a string",
            Self::IntVec(_) => "an integer array",
            Self::UIntVec(_) => "an unsigned integer array",
            Self::FloatVec(_) => "a float array",
            Self::Enum(_) => "an enum entry name",
            Self::EnumSet(_) => "a set of enum entry names",
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for MavValue {
            fn from(v: $t) -> Self {
                Self::Int(v.into())
            }
        })*
    };
}

macro_rules! value_from_uint {
    ($($t:ty),*) => {
        $(impl From<$t> for MavValue {
            fn from(v: $t) -> Self {
                Self::UInt(v.into())
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64);
value_from_uint!(u8, u16, u32, u64);

impl From<f32> for MavValue {
    fn from(v: f32) -> Self {
        Self::Float(v.into())
    }
}

impl From<f64> for MavValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for MavValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MavValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Field-name keyed value map of a single packet.
pub type MavContent = BTreeMap<String, MavValue>;

/// Caller-supplied values for encoding: either positional in field
/// declaration order (base fields first, then extensions), or by name.
#[derive(Debug, Clone)]
pub enum MavArgs {
    Positional(Vec<MavValue>),
    Named(MavContent),
}

impl From<Vec<MavValue>> for MavArgs {
    fn from(values: Vec<MavValue>) -> Self {
        Self::Positional(values)
    }
}

impl From<MavContent> for MavArgs {
    fn from(values: MavContent) -> Self {
        Self::Named(values)
    }
}
