//! Field type resolution.
//!
//! MAVLink field types are strings like `uint32_t`, `float[4]` or `char[16]`.
//! `char[N]` is a single zero-terminated string of capacity N, not an array
//! of N values. The historical `_mavlink_version` suffix marks a `uint8_t`
//! that carries the protocol minor version; it keeps its own kind because the
//! CRC seed still names it `uint8_t`.

use std::sync::LazyLock;

use regex::Regex;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

static TYPE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<schar>u)?(?P<base>int(8|16|32|64)_t|char|float|double)(_mavlink_version)?(\[(?P<count>\d+)\])?$",
    )
    .expect("failed to build type regex")
});

#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MavType {
    UInt8MavlinkVersion,
    #[default]
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Char,
    Float,
    Double,
    CharArray(usize),
    Array(Box<MavType>, usize),
}

impl MavType {
    /// Parses a field type string from a message definition.
    pub fn parse(s: &str) -> Option<Self> {
        use self::MavType::*;

        let caps = TYPE_REGEX.captures(s)?;
        let unsigned = caps.name("schar").is_some();
        let versioned = s.contains("_mavlink_version");
        let scalar = match (unsigned, caps.name("base")?.as_str()) {
            (true, "int8_t") if versioned => UInt8MavlinkVersion,
            (true, "int8_t") => UInt8,
            (true, "int16_t") => UInt16,
            (true, "int32_t") => UInt32,
            (true, "int64_t") => UInt64,
            (false, "int8_t") => Int8,
            (false, "int16_t") => Int16,
            (false, "int32_t") => Int32,
            (false, "int64_t") => Int64,
            (false, "char") => Char,
            (false, "float") => Float,
            (false, "double") => Double,
            _ => return None,
        };

        match caps.name("count") {
            None => Some(scalar),
            Some(count) => {
                let count = count.as_str().parse::<usize>().ok().filter(|&c| c > 0)?;
                match scalar {
                    Char => Some(CharArray(count)),
                    other => Some(Array(Box::new(other), count)),
                }
            }
        }
    }

    /// Like [`MavType::parse`] but reporting the offending field on failure.
    pub fn parse_for_field(s: &str, field: &str) -> Result<Self, SchemaError> {
        Self::parse(s).ok_or_else(|| SchemaError::InvalidType {
            typ: s.to_string(),
            field: field.to_string(),
        })
    }

    /// Total size in bytes on the wire.
    pub fn wire_len(&self) -> usize {
        use self::MavType::*;
        match self {
            UInt8MavlinkVersion | UInt8 | Int8 | Char => 1,
            UInt16 | Int16 => 2,
            UInt32 | Int32 | Float => 4,
            UInt64 | Int64 | Double => 8,
            CharArray(size) => *size,
            Array(t, size) => t.wire_len() * size,
        }
    }

    /// Size of a single primitive element, the key for field reordering.
    pub fn element_len(&self) -> usize {
        use self::MavType::*;
        match self {
            CharArray(_) => 1,
            Array(t, _) => t.element_len(),
            scalar => scalar.wire_len(),
        }
    }

    /// Number of primitive elements. A `char[N]` decodes to one value but
    /// still counts N elements for the CRC seed.
    pub fn element_count(&self) -> usize {
        use self::MavType::*;
        match self {
            CharArray(size) => *size,
            Array(_, size) => *size,
            _ => 1,
        }
    }

    /// Canonical type name fed into the CRC-extra seed: the unsigned form as
    /// it appears in the XML, with any `[N]` suffix removed.
    pub fn canonical_name(&self) -> &'static str {
        use self::MavType::*;
        match self {
            UInt8MavlinkVersion => "uint8_t",
            UInt8 => "uint8_t",
            Int8 => "int8_t",
            Char => "char",
            UInt16 => "uint16_t",
            Int16 => "int16_t",
            UInt32 => "uint32_t",
            Int32 => "int32_t",
            Float => "float",
            UInt64 => "uint64_t",
            Int64 => "int64_t",
            Double => "double",
            CharArray(_) => "char",
            Array(t, _) => t.canonical_name(),
        }
    }

    /// Whether a scalar value of this type can bind to an enum entry.
    pub fn is_scalar_integer(&self) -> bool {
        use self::MavType::*;
        matches!(
            self,
            UInt8MavlinkVersion | UInt8 | UInt16 | UInt32 | UInt64 | Int8 | Int16 | Int32 | Int64
        )
    }
}
