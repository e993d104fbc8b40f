//! Tag-based encoding/decoding of `Value` and `ScalarValue`.

use uuid::Uuid;

use crate::config::Limits;
use crate::error::CodecError;
use crate::value::{Decimal128, DateTimeKind, EnumValue, ScalarValue, Value, ValueTag};

use super::context::{ReadCtx, WriteCtx};
use super::varint::{read_ivarint, read_uvarint, write_ivarint, write_uvarint};

/// Walk a value, registering every string and (when identity is on) enum
/// type id it contains into `ctx`'s interning tables, in first-seen order.
pub fn collect_value(value: &Value, ctx: &mut WriteCtx) {
    match value {
        Value::String(s) => {
            if ctx.use_string_table {
                ctx.intern_string(s);
            }
        }
        Value::Enum(e) => {
            if ctx.use_type_table && ctx.enum_identity {
                if let Some(type_id) = e.type_id {
                    ctx.intern_type(type_id);
                }
            }
        }
        Value::ObjectArray(items) | Value::List(items) => {
            for item in items {
                collect_value(item, ctx);
            }
        }
        Value::Map(entries) => {
            for (k, v) in entries {
                collect_scalar(k, ctx);
                collect_value(v, ctx);
            }
        }
        _ => {}
    }
}

/// See `collect_value`; the scalar half, for map keys.
pub fn collect_scalar(scalar: &ScalarValue, ctx: &mut WriteCtx) {
    if let ScalarValue::String(s) = scalar {
        if ctx.use_string_table {
            ctx.intern_string(s);
        }
    }
}

/// Encode `value`'s tag byte plus payload.
pub fn encode_value(out: &mut Vec<u8>, value: &Value, ctx: &WriteCtx) {
    match value {
        Value::Null => out.push(ValueTag::Null as u8),
        Value::I8(v) => {
            out.push(ValueTag::I8 as u8);
            out.push(*v as u8);
        }
        Value::I16(v) => {
            out.push(ValueTag::I16 as u8);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::I32(v) => {
            out.push(ValueTag::I32 as u8);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::I64(v) => {
            out.push(ValueTag::I64 as u8);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::U8(v) => {
            out.push(ValueTag::U8 as u8);
            out.push(*v);
        }
        Value::U16(v) => {
            out.push(ValueTag::U16 as u8);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::U32(v) => {
            out.push(ValueTag::U32 as u8);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::U64(v) => {
            out.push(ValueTag::U64 as u8);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Bool(v) => {
            out.push(ValueTag::Bool as u8);
            out.push(*v as u8);
        }
        Value::Char(v) => {
            out.push(ValueTag::Char as u8);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Float32(v) => {
            out.push(ValueTag::Float32 as u8);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Float64(v) => {
            out.push(ValueTag::Float64 as u8);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Decimal(d) => {
            out.push(ValueTag::Decimal as u8);
            out.push(d.scale());
            out.push(d.is_negative() as u8);
            out.extend_from_slice(&d.magnitude().to_le_bytes());
        }
        Value::Guid(u) => {
            out.push(ValueTag::Guid as u8);
            out.extend_from_slice(u.as_bytes());
        }
        Value::String(s) => encode_string(out, s, ctx),
        Value::DateTime { ticks, kind } => {
            out.push(ValueTag::DateTime as u8);
            out.extend_from_slice(&ticks.to_le_bytes());
            out.push(*kind as u8);
        }
        Value::DateTimeOffset { ticks, offset_minutes } => {
            out.push(ValueTag::DateTimeOffset as u8);
            out.extend_from_slice(&ticks.to_le_bytes());
            out.extend_from_slice(&offset_minutes.to_le_bytes());
        }
        Value::TimeSpan(v) => {
            out.push(ValueTag::TimeSpan as u8);
            out.extend_from_slice(&v.to_le_bytes());
        }
        Value::Bytes(bytes) => {
            out.push(ValueTag::Bytes as u8);
            write_uvarint(out, bytes.len() as u64);
            out.extend_from_slice(bytes);
        }
        Value::ObjectArray(items) => {
            out.push(ValueTag::ObjectArray as u8);
            write_uvarint(out, items.len() as u64);
            for item in items {
                encode_value(out, item, ctx);
            }
        }
        Value::List(items) => {
            out.push(ValueTag::List as u8);
            write_uvarint(out, items.len() as u64);
            for item in items {
                encode_value(out, item, ctx);
            }
        }
        Value::Map(entries) => {
            out.push(ValueTag::Map as u8);
            write_uvarint(out, entries.len() as u64);
            for (k, v) in entries {
                encode_scalar(out, k, ctx);
                encode_value(out, v, ctx);
            }
        }
        Value::Enum(e) => encode_enum(out, e, ctx),
    }
}

fn encode_string(out: &mut Vec<u8>, s: &str, ctx: &WriteCtx) {
    if ctx.use_string_table {
        if let Some(index) = ctx.string_index_of(s) {
            out.push(ValueTag::InternedStringRef as u8);
            write_uvarint(out, index as u64);
            return;
        }
    }
    out.push(ValueTag::InlineString as u8);
    write_uvarint(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

fn encode_enum(out: &mut Vec<u8>, e: &EnumValue, ctx: &WriteCtx) {
    let use_identity = ctx.enum_identity && e.type_id.is_some();
    if use_identity {
        let type_id = e.type_id.unwrap();
        out.push(ValueTag::EnumWithIdentity as u8);
        write_ivarint(out, e.underlying);
        if ctx.use_type_table {
            if let Some(index) = ctx.type_index_of(type_id) {
                out.push(1); // table-ref form
                write_uvarint(out, index as u64);
                return;
            }
        }
        out.push(0); // inline form
        out.extend_from_slice(&type_id.to_le_bytes());
    } else {
        out.push(ValueTag::EnumPrimitive as u8);
        write_ivarint(out, e.underlying);
    }
}

/// Encode a map key. Map keys share the `Value` tag space (restricted to
/// the scalar-legal variants).
pub fn encode_scalar(out: &mut Vec<u8>, scalar: &ScalarValue, ctx: &WriteCtx) {
    encode_value(out, &Value::from(scalar.clone()), ctx);
}

/// Decode a tagged value starting at `*offset`, enforcing `limits` and the
/// shared recursion `depth`.
pub fn decode_value(
    buf: &[u8],
    offset: &mut usize,
    ctx: &ReadCtx,
    limits: &Limits,
    depth: usize,
) -> Result<Value, CodecError> {
    if depth > limits.max_nesting {
        return Err(CodecError::BoundExceeded {
            bound: "max_nesting",
            limit: limits.max_nesting,
            actual: depth,
        });
    }

    let tag_offset = *offset;
    let tag_byte = read_u8(buf, offset)?;
    let tag = ValueTag::from_u8(tag_byte).ok_or(CodecError::UnknownTag {
        tag: tag_byte,
        offset: tag_offset,
    })?;

    Ok(match tag {
        ValueTag::Null => Value::Null,
        ValueTag::I8 => Value::I8(read_u8(buf, offset)? as i8),
        ValueTag::I16 => Value::I16(i16::from_le_bytes(read_array(buf, offset)?)),
        ValueTag::I32 => Value::I32(i32::from_le_bytes(read_array(buf, offset)?)),
        ValueTag::I64 => Value::I64(i64::from_le_bytes(read_array(buf, offset)?)),
        ValueTag::U8 => Value::U8(read_u8(buf, offset)?),
        ValueTag::U16 => Value::U16(u16::from_le_bytes(read_array(buf, offset)?)),
        ValueTag::U32 => Value::U32(u32::from_le_bytes(read_array(buf, offset)?)),
        ValueTag::U64 => Value::U64(u64::from_le_bytes(read_array(buf, offset)?)),
        ValueTag::Bool => Value::Bool(read_u8(buf, offset)? != 0),
        ValueTag::Char => Value::Char(u16::from_le_bytes(read_array(buf, offset)?)),
        ValueTag::Float32 => Value::Float32(f32::from_le_bytes(read_array(buf, offset)?)),
        ValueTag::Float64 => Value::Float64(f64::from_le_bytes(read_array(buf, offset)?)),
        ValueTag::Decimal => {
            let scale = read_u8(buf, offset)?;
            let negative = read_u8(buf, offset)? != 0;
            let magnitude = u128::from_le_bytes(read_array(buf, offset)?);
            Decimal128::new(scale, negative, magnitude).map(Value::Decimal).ok_or(
                CodecError::InvalidString { offset: tag_offset },
            )?
        }
        ValueTag::Guid => Value::Guid(Uuid::from_bytes(read_array(buf, offset)?)),
        ValueTag::InlineString => {
            let len = read_len(buf, offset, limits.max_string_bytes, "max_string_bytes")?;
            let bytes = read_bytes(buf, offset, len)?;
            Value::String(
                String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidString { offset: tag_offset })?,
            )
        }
        ValueTag::InternedStringRef => {
            let index = read_uvarint(buf, offset)? as usize;
            let s = ctx
                .string_table
                .get(index)
                .ok_or(CodecError::InvalidString { offset: tag_offset })?;
            Value::String(s.clone())
        }
        ValueTag::DateTime => {
            let ticks = i64::from_le_bytes(read_array(buf, offset)?);
            let kind_byte = read_u8(buf, offset)?;
            let kind = match kind_byte {
                0 => DateTimeKind::Unspecified,
                1 => DateTimeKind::Utc,
                2 => DateTimeKind::Local,
                _ => return Err(CodecError::UnknownTag { tag: kind_byte, offset: tag_offset }),
            };
            Value::DateTime { ticks, kind }
        }
        ValueTag::DateTimeOffset => {
            let ticks = i64::from_le_bytes(read_array(buf, offset)?);
            let offset_minutes = i16::from_le_bytes(read_array(buf, offset)?);
            Value::DateTimeOffset { ticks, offset_minutes }
        }
        ValueTag::TimeSpan => Value::TimeSpan(i64::from_le_bytes(read_array(buf, offset)?)),
        ValueTag::Bytes => {
            let len = read_len(buf, offset, limits.max_list_len, "max_list_len")?;
            Value::Bytes(read_bytes(buf, offset, len)?.to_vec())
        }
        ValueTag::ObjectArray => {
            let len = read_len(buf, offset, limits.max_list_len, "max_list_len")?;
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(decode_value(buf, offset, ctx, limits, depth + 1)?);
            }
            Value::ObjectArray(items)
        }
        ValueTag::List => {
            let len = read_len(buf, offset, limits.max_list_len, "max_list_len")?;
            let mut items = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                items.push(decode_value(buf, offset, ctx, limits, depth + 1)?);
            }
            Value::List(items)
        }
        ValueTag::Map => {
            let len = read_len(buf, offset, limits.max_list_len, "max_list_len")?;
            let mut entries = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                let key_offset = *offset;
                let key_value = decode_value(buf, offset, ctx, limits, depth + 1)?;
                let key = ScalarValue::try_from(key_value)
                    .map_err(|_| CodecError::InvalidString { offset: key_offset })?;
                let value = decode_value(buf, offset, ctx, limits, depth + 1)?;
                entries.push((key, value));
            }
            Value::Map(entries)
        }
        ValueTag::EnumWithIdentity => {
            let underlying = read_ivarint(buf, offset)?;
            let form = read_u8(buf, offset)?;
            let type_id = if form == 1 {
                let index = read_uvarint(buf, offset)? as usize;
                *ctx
                    .type_table
                    .get(index)
                    .ok_or(CodecError::UnknownTag { tag: tag_byte, offset: tag_offset })?
            } else {
                u64::from_le_bytes(read_array(buf, offset)?)
            };
            Value::Enum(EnumValue { underlying, type_id: Some(type_id) })
        }
        ValueTag::EnumPrimitive => Value::Enum(EnumValue {
            underlying: read_ivarint(buf, offset)?,
            type_id: None,
        }),
    })
}

/// Decode a map key (a value restricted to the scalar tag set).
pub fn decode_scalar(
    buf: &[u8],
    offset: &mut usize,
    ctx: &ReadCtx,
    limits: &Limits,
    depth: usize,
) -> Result<ScalarValue, CodecError> {
    let key_offset = *offset;
    let value = decode_value(buf, offset, ctx, limits, depth)?;
    ScalarValue::try_from(value).map_err(|_| CodecError::InvalidString { offset: key_offset })
}

pub(super) fn read_u8(buf: &[u8], offset: &mut usize) -> Result<u8, CodecError> {
    let byte = *buf.get(*offset).ok_or(CodecError::Truncated { offset: *offset, needed: 1 })?;
    *offset += 1;
    Ok(byte)
}

pub(super) fn read_array<const N: usize>(buf: &[u8], offset: &mut usize) -> Result<[u8; N], CodecError> {
    let bytes = read_bytes(buf, offset, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

pub(super) fn read_bytes<'a>(buf: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8], CodecError> {
    let end = offset.checked_add(len).ok_or(CodecError::Truncated { offset: *offset, needed: len })?;
    if end > buf.len() {
        return Err(CodecError::Truncated {
            offset: *offset,
            needed: end - buf.len(),
        });
    }
    let slice = &buf[*offset..end];
    *offset = end;
    Ok(slice)
}

pub(super) fn read_len(buf: &[u8], offset: &mut usize, limit: usize, bound: &'static str) -> Result<usize, CodecError> {
    let len = read_uvarint(buf, offset)? as usize;
    if len > limit {
        return Err(CodecError::BoundExceeded { bound, limit, actual: len });
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;

    fn round_trip(value: Value, string_table: bool) -> Value {
        let mut wctx = WriteCtx::new(string_table, false, true);
        collect_value(&value, &mut wctx);
        let mut out = Vec::new();
        encode_value(&mut out, &value, &wctx);
        let rctx = ReadCtx {
            string_table: wctx.string_table,
            type_table: Vec::new(),
        };
        let mut offset = 0;
        decode_value(&out, &mut offset, &rctx, &Limits::default(), 0).unwrap()
    }

    #[test]
    fn scalars_round_trip() {
        assert_eq!(round_trip(Value::I32(-42), false), Value::I32(-42));
        assert_eq!(round_trip(Value::U64(u64::MAX), false), Value::U64(u64::MAX));
        assert_eq!(round_trip(Value::Bool(true), false), Value::Bool(true));
        assert_eq!(round_trip(Value::Float64(3.5), false), Value::Float64(3.5));
    }

    #[test]
    fn interned_string_round_trips() {
        let value = Value::List(vec![
            Value::String("hello".into()),
            Value::String("hello".into()),
        ]);
        assert_eq!(round_trip(value.clone(), true), value);
    }

    #[test]
    fn unknown_tag_reports_offset() {
        let buf = [0xFFu8];
        let mut offset = 0;
        let err = decode_value(&buf, &mut offset, &ReadCtx::default(), &Limits::default(), 0).unwrap_err();
        assert!(matches!(err, CodecError::UnknownTag { tag: 0xFF, offset: 0 }));
    }

    #[test]
    fn oversized_list_is_rejected() {
        let limits = Limits { max_list_len: 2, ..Limits::default() };
        let mut out = Vec::new();
        out.push(ValueTag::List as u8);
        write_uvarint(&mut out, 3);
        let mut offset = 0;
        let err = decode_value(&out, &mut offset, &ReadCtx::default(), &limits, 0).unwrap_err();
        assert!(matches!(err, CodecError::BoundExceeded { bound: "max_list_len", .. }));
    }
}
