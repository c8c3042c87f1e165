//! Schema-driven payload encoding and decoding.
//!
//! Payloads are serialised field by field in wire order (see
//! [`MavMessage::wire_fields`]), every primitive little-endian. Values cross
//! the API as [`MavValue`]s keyed by field name; no per-message structs
//! exist.

use std::sync::Arc;

use crate::bytes::Bytes;
use crate::bytes_mut::BytesMut;
use crate::error::{DecodeError, EncodeError};
use crate::schema::{MavField, MavMessage, MavSchema, MavType};
use crate::utils::{remove_trailing_zeroes, zero_terminated};
use crate::value::{MavArgs, MavContent, MavValue};
use crate::{MavHeader, MavlinkVersion};

/// A decoded message: its descriptor, the sender metadata from the frame
/// header, and the field values.
#[derive(Debug, Clone)]
pub struct MavPacket {
    pub message: Arc<MavMessage>,
    pub header: MavHeader,
    pub content: MavContent,
}

impl MavPacket {
    pub fn name(&self) -> &str {
        &self.message.name
    }

    pub fn get(&self, field: &str) -> Option<&MavValue> {
        self.content.get(field)
    }
}

/// Decodes a wire payload into field values.
///
/// Payloads shorter than the full field set are right-padded with zeros
/// first; that recovers both v2 trailing-zero truncation and v1 frames of
/// messages that grew extension fields.
pub fn decode_payload(
    schema: &MavSchema,
    message: &MavMessage,
    payload: &[u8],
) -> Result<MavContent, DecodeError> {
    let mut padded = [0u8; 255];
    let buf = if payload.len() < message.wire_size() {
        padded[..payload.len()].copy_from_slice(payload);
        &padded[..message.wire_size()]
    } else {
        payload
    };

    let mut buf = Bytes::new(buf);
    let mut content = MavContent::new();
    for field in message.wire_fields() {
        let raw = read_raw(&mut buf, &field.mavtype);
        let value = resolve_enum(schema, field, raw)?;
        content.insert(field.name.clone(), value);
    }
    Ok(content)
}

fn read_raw(buf: &mut Bytes<'_>, mavtype: &MavType) -> MavValue {
    use MavType::*;
    match mavtype {
        UInt8MavlinkVersion | UInt8 => MavValue::UInt(buf.get_u8().into()),
        UInt16 => MavValue::UInt(buf.get_u16_le().into()),
        UInt32 => MavValue::UInt(buf.get_u32_le().into()),
        UInt64 => MavValue::UInt(buf.get_u64_le()),
        Int8 => MavValue::Int(buf.get_i8().into()),
        Int16 => MavValue::Int(buf.get_i16_le().into()),
        Int32 => MavValue::Int(buf.get_i32_le().into()),
        Int64 => MavValue::Int(buf.get_i64_le()),
        Char => MavValue::UInt(buf.get_u8().into()),
        Float => MavValue::Float(buf.get_f32_le().into()),
        Double => MavValue::Float(buf.get_f64_le()),
        CharArray(size) => {
            let bytes = buf.get_bytes(*size);
            MavValue::Text(String::from_utf8_lossy(zero_terminated(bytes)).into_owned())
        }
        Array(t, size) => match t.as_ref() {
            Float => MavValue::FloatVec((0..*size).map(|_| buf.get_f32_le().into()).collect()),
            Double => MavValue::FloatVec((0..*size).map(|_| buf.get_f64_le()).collect()),
            Int8 => MavValue::IntVec((0..*size).map(|_| buf.get_i8().into()).collect()),
            Int16 => MavValue::IntVec((0..*size).map(|_| buf.get_i16_le().into()).collect()),
            Int32 => MavValue::IntVec((0..*size).map(|_| buf.get_i32_le().into()).collect()),
            Int64 => MavValue::IntVec((0..*size).map(|_| buf.get_i64_le()).collect()),
            UInt16 => MavValue::UIntVec((0..*size).map(|_| buf.get_u16_le().into()).collect()),
            UInt32 => MavValue::UIntVec((0..*size).map(|_| buf.get_u32_le().into()).collect()),
            UInt64 => MavValue::UIntVec((0..*size).map(|_| buf.get_u64_le()).collect()),
            _ => MavValue::UIntVec((0..*size).map(|_| buf.get_u8().into()).collect()),
        },
    }
}

/// Applies the enum binding of a field: bitmask fields become the set of
/// entry names with bits set, scalar enum fields the matching entry name.
/// Arrays and float fields keep their raw values even when enum-bound.
fn resolve_enum(
    schema: &MavSchema,
    field: &MavField,
    raw: MavValue,
) -> Result<MavValue, DecodeError> {
    let Some(enumtype) = &field.enumtype else {
        return Ok(raw);
    };
    if !field.mavtype.is_scalar_integer() {
        return Ok(raw);
    }
    let Some(raw_bits) = raw.as_u64() else {
        return Ok(raw);
    };
    let enm = schema
        .enum_named(enumtype)
        .ok_or_else(|| DecodeError::UnknownEnum {
            enumtype: enumtype.clone(),
            field: field.name.clone(),
        })?;

    if field.is_bitmask() {
        return Ok(MavValue::EnumSet(enm.decode_bitmask(raw_bits)));
    }
    match enm.entry_by_value(raw_bits) {
        Some(entry) => Ok(MavValue::Enum(entry.name.clone())),
        None => Err(DecodeError::NoEnumEntry {
            enumtype: enumtype.clone(),
            field: field.name.clone(),
            value: raw_bits,
        }),
    }
}

/// Encodes caller values into a wire payload for the given protocol version.
///
/// Positional values follow field declaration order (base fields, then
/// extensions); named values must cover every field exactly. The v1 payload
/// carries the base fields at full size; the v2 payload carries all fields
/// with trailing zeros trimmed, but never to fewer than one byte.
pub fn encode_payload(
    schema: &MavSchema,
    message: &MavMessage,
    version: MavlinkVersion,
    args: &MavArgs,
) -> Result<Vec<u8>, EncodeError> {
    let values = collect_values(message, args)?;

    let mut payload = [0u8; 255];
    let mut buf = BytesMut::new(&mut payload);
    for (index, field) in message.wire_indexed() {
        if version == MavlinkVersion::V1 && field.is_extension {
            continue;
        }
        write_field(schema, field, values[index], &mut buf)?;
    }

    let written = buf.len();
    let len = match version {
        MavlinkVersion::V1 => message.base_wire_size(),
        MavlinkVersion::V2 => remove_trailing_zeroes(&payload[..written]),
    };
    Ok(payload[..len].to_vec())
}

/// Resolves positional or named arguments into one value per field, in
/// declaration order.
fn collect_values<'a>(
    message: &MavMessage,
    args: &'a MavArgs,
) -> Result<Vec<&'a MavValue>, EncodeError> {
    match args {
        MavArgs::Positional(values) => {
            if values.len() != message.fields.len() {
                return Err(EncodeError::Arity {
                    message: message.name.clone(),
                    expected: message.fields.len(),
                    found: values.len(),
                });
            }
            Ok(values.iter().collect())
        }
        MavArgs::Named(values) => {
            for name in values.keys() {
                if !message.fields.iter().any(|f| &f.name == name) {
                    return Err(EncodeError::UnknownField {
                        message: message.name.clone(),
                        field: name.clone(),
                    });
                }
            }
            message
                .fields
                .iter()
                .map(|field| {
                    values
                        .get(&field.name)
                        .ok_or_else(|| EncodeError::MissingField {
                            message: message.name.clone(),
                            field: field.name.clone(),
                        })
                })
                .collect()
        }
    }
}

fn write_field(
    schema: &MavSchema,
    field: &MavField,
    value: &MavValue,
    buf: &mut BytesMut<'_>,
) -> Result<(), EncodeError> {
    use MavType::*;
    match &field.mavtype {
        CharArray(size) => {
            let MavValue::Text(text) = value else {
                return Err(type_error(field, "a string", value));
            };
            if text.len() > *size {
                return Err(EncodeError::StringTooLong {
                    field: field.name.clone(),
                    capacity: *size,
                    value: text.clone(),
                });
            }
            buf.put_slice(text.as_bytes());
            for _ in text.len()..*size {
                buf.put_u8(0);
            }
            Ok(())
        }
        Array(t, size) => write_array(field, t, *size, value, buf),
        Float => {
            let v = value
                .as_f64()
                .ok_or_else(|| type_error(field, "a number", value))?;
            buf.put_f32_le(v as f32);
            Ok(())
        }
        Double => {
            let v = value
                .as_f64()
                .ok_or_else(|| type_error(field, "a number", value))?;
            buf.put_f64_le(v);
            Ok(())
        }
        scalar => {
            let bits = integer_bits(schema, field, value)?;
            write_integer(field, scalar, bits, buf)
        }
    }
}

/// Integer representation of a scalar value, resolving enum entry names and
/// bitmask sets through the registry.
fn integer_bits(
    schema: &MavSchema,
    field: &MavField,
    value: &MavValue,
) -> Result<i128, EncodeError> {
    let lookup = |symbol: &str| -> Result<u64, EncodeError> {
        let enumtype = field
            .enumtype
            .clone()
            .unwrap_or_else(|| "<unbound>".to_string());
        schema
            .enum_named(&enumtype)
            .and_then(|e| e.entry(symbol))
            .map(|e| e.value)
            .ok_or_else(|| EncodeError::UnknownEnumEntry {
                enumtype,
                symbol: symbol.to_string(),
            })
    };

    match value {
        MavValue::Int(v) => Ok(*v as i128),
        MavValue::UInt(v) => Ok(*v as i128),
        MavValue::Enum(symbol) => Ok(lookup(symbol)? as i128),
        MavValue::EnumSet(symbols) => {
            let mut bits = 0u64;
            for symbol in symbols {
                bits |= lookup(symbol)?;
            }
            Ok(bits as i128)
        }
        other => Err(type_error(field, "an integer or enum entry", other)),
    }
}

fn write_integer(
    field: &MavField,
    scalar: &MavType,
    bits: i128,
    buf: &mut BytesMut<'_>,
) -> Result<(), EncodeError> {
    use MavType::*;

    macro_rules! put {
        ($t:ty, $put:ident) => {{
            let v = <$t>::try_from(bits).map_err(|_| EncodeError::ValueOutOfRange {
                field: field.name.clone(),
                typ: scalar.canonical_name().to_string(),
                value: bits.to_string(),
            })?;
            buf.$put(v);
        }};
    }

    match scalar {
        UInt8MavlinkVersion | UInt8 | Char => put!(u8, put_u8),
        UInt16 => put!(u16, put_u16_le),
        UInt32 => put!(u32, put_u32_le),
        UInt64 => put!(u64, put_u64_le),
        Int8 => put!(i8, put_i8),
        Int16 => put!(i16, put_i16_le),
        Int32 => put!(i32, put_i32_le),
        Int64 => put!(i64, put_i64_le),
        Float | Double | CharArray(_) | Array(_, _) => unreachable!("not an integer type"),
    }
    Ok(())
}

fn write_array(
    field: &MavField,
    elem: &MavType,
    size: usize,
    value: &MavValue,
    buf: &mut BytesMut<'_>,
) -> Result<(), EncodeError> {
    use MavType::*;

    let check_len = |found: usize| -> Result<(), EncodeError> {
        if found != size {
            Err(EncodeError::ArrayLength {
                field: field.name.clone(),
                expected: size,
                found,
            })
        } else {
            Ok(())
        }
    };

    match (elem, value) {
        (Float, MavValue::FloatVec(v)) => {
            check_len(v.len())?;
            for x in v {
                buf.put_f32_le(*x as f32);
            }
            Ok(())
        }
        (Double, MavValue::FloatVec(v)) => {
            check_len(v.len())?;
            for x in v {
                buf.put_f64_le(*x);
            }
            Ok(())
        }
        (_, MavValue::IntVec(v)) => {
            check_len(v.len())?;
            for x in v {
                write_integer(field, elem, *x as i128, buf)?;
            }
            Ok(())
        }
        (_, MavValue::UIntVec(v)) => {
            check_len(v.len())?;
            for x in v {
                write_integer(field, elem, *x as i128, buf)?;
            }
            Ok(())
        }
        _ => Err(type_error(field, "an array", value)),
    }
}

fn type_error(field: &MavField, expected: &'static str, found: &MavValue) -> EncodeError {
    EncodeError::ValueType {
        field: field.name.clone(),
        expected,
        found: found.kind(),
    }
}
