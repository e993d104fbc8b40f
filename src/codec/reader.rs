//! Decodes the binary wire format back into a `Document`.
//!
//! Decoding is bounded and defensive throughout: every length read against
//! the stream is checked against `Limits` before it is used to size an
//! allocation or drive a loop, and every short read reports the byte
//! offset at which it was detected.

use crate::config::{Limits, Options};
use crate::document::{Document, MemberIndex, Operation, OpKind};
use crate::error::CodecError;
use crate::value::ScalarValue;

use super::context::ReadCtx;
use super::value_codec::{decode_scalar, decode_value, read_bytes, read_len, read_u8};
use super::varint::read_uvarint;

const MAGIC: &[u8; 4] = b"DELT";
const VERSION: u8 = 1;

const FLAG_STRING_TABLE: u8 = 1 << 0;
const FLAG_TYPE_TABLE: u8 = 1 << 1;
const FLAG_ENUM_IDENTITY: u8 = 1 << 2;

/// A decoded document, plus the header's advisory fingerprint when the
/// stream was headered.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Advisory type fingerprint read from a headered stream. `None` for
    /// headerless input.
    pub fingerprint: Option<[u8; 8]>,
    /// The decoded document.
    pub document: Document,
}

impl Frame {
    /// The header fingerprint as a lowercase hex string, for logging and
    /// diagnostics (the fingerprint itself is advisory, never consulted to
    /// gate decoding - see §7's user-visible failure reporting).
    pub fn fingerprint_hex(&self) -> Option<String> {
        self.fingerprint.map(hex::encode)
    }
}

struct Budget {
    limits: Limits,
    ops_remaining: usize,
}

/// Decode `bytes` per `options`, enforcing `options.limits` throughout.
pub fn read(bytes: &[u8], options: &Options) -> Result<Frame, CodecError> {
    let mut offset = 0usize;
    let mut budget = Budget {
        limits: options.limits,
        ops_remaining: options.limits.max_ops,
    };

    let (fingerprint, rctx) = if options.headered {
        if peek(bytes, offset, 4)? != MAGIC.as_slice() {
            return Err(CodecError::InvalidHeader { offset });
        }
        offset += 4;

        let version = read_u8(bytes, &mut offset)?;
        if version > VERSION {
            return Err(CodecError::UnsupportedVersion {
                version,
                max_supported: VERSION,
            });
        }

        let flags = read_u8(bytes, &mut offset)?;
        let fingerprint_bytes: [u8; 8] = read_bytes(bytes, &mut offset, 8)?
            .try_into()
            .expect("read_bytes(8) returns an 8-byte slice");

        let mut rctx = ReadCtx::default();
        if flags & FLAG_STRING_TABLE != 0 {
            let count = read_len(bytes, &mut offset, budget.limits.max_list_len, "max_list_len")?;
            rctx.string_table = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                let len = read_len(bytes, &mut offset, budget.limits.max_string_bytes, "max_string_bytes")?;
                let raw = read_bytes(bytes, &mut offset, len)?;
                let s = String::from_utf8(raw.to_vec())
                    .map_err(|_| CodecError::InvalidString { offset })?;
                rctx.string_table.push(s);
            }
        }
        if flags & FLAG_TYPE_TABLE != 0 {
            let count = read_len(bytes, &mut offset, budget.limits.max_list_len, "max_list_len")?;
            rctx.type_table = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                let len = read_len(bytes, &mut offset, 8, "type_identifier_len")?;
                let raw = read_bytes(bytes, &mut offset, len)?;
                let mut id_bytes = [0u8; 8];
                id_bytes[..raw.len()].copy_from_slice(raw);
                rctx.type_table.push(u64::from_le_bytes(id_bytes));
            }
        }
        let _ = flags & FLAG_ENUM_IDENTITY; // decode is tag-driven; the flag is advisory only on read

        (Some(fingerprint_bytes), rctx)
    } else {
        if bytes.len() >= 4 && peek(bytes, 0, 4)? == MAGIC.as_slice() {
            return Err(CodecError::InvalidHeader { offset: 0 });
        }
        (None, ReadCtx::default())
    };

    let document = decode_document(bytes, &mut offset, &rctx, &mut budget, 0)?;

    Ok(Frame { fingerprint, document })
}

fn peek(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], CodecError> {
    if offset + len > bytes.len() {
        return Err(CodecError::Truncated {
            offset,
            needed: offset + len - bytes.len(),
        });
    }
    Ok(&bytes[offset..offset + len])
}

fn decode_document(
    buf: &[u8],
    offset: &mut usize,
    rctx: &ReadCtx,
    budget: &mut Budget,
    depth: usize,
) -> Result<Document, CodecError> {
    if depth > budget.limits.max_nesting {
        return Err(CodecError::BoundExceeded {
            bound: "max_nesting",
            limit: budget.limits.max_nesting,
            actual: depth,
        });
    }

    let op_count = read_len(buf, offset, budget.limits.max_ops, "max_ops")?;
    let mut ops = Vec::with_capacity(op_count.min(4096));
    for _ in 0..op_count {
        if budget.ops_remaining == 0 {
            return Err(CodecError::BoundExceeded {
                bound: "max_ops",
                limit: budget.limits.max_ops,
                actual: budget.limits.max_ops + 1,
            });
        }
        budget.ops_remaining -= 1;
        ops.push(decode_operation(buf, offset, rctx, budget, depth)?);
    }
    Ok(Document::from_operations(ops))
}

fn decode_optional_value(
    buf: &[u8],
    offset: &mut usize,
    rctx: &ReadCtx,
    budget: &Budget,
    depth: usize,
) -> Result<Option<crate::value::Value>, CodecError> {
    match read_u8(buf, offset)? {
        0 => Ok(None),
        _ => Ok(Some(decode_value(buf, offset, rctx, &budget.limits, depth)?)),
    }
}

fn decode_member_index(buf: &[u8], offset: &mut usize) -> Result<MemberIndex, CodecError> {
    Ok(read_uvarint(buf, offset)? as MemberIndex)
}

fn decode_operation(
    buf: &[u8],
    offset: &mut usize,
    rctx: &ReadCtx,
    budget: &mut Budget,
    depth: usize,
) -> Result<Operation, CodecError> {
    let kind_offset = *offset;
    let kind_byte = read_u8(buf, offset)?;
    let kind = OpKind::from_u8(kind_byte).ok_or(CodecError::UnknownTag {
        tag: kind_byte,
        offset: kind_offset,
    })?;

    Ok(match kind {
        OpKind::ReplaceObject => {
            Operation::ReplaceObject(decode_optional_value(buf, offset, rctx, budget, depth)?)
        }
        OpKind::SetMember => {
            let member_index = decode_member_index(buf, offset)?;
            let value = decode_value(buf, offset, rctx, &budget.limits, depth)?;
            Operation::SetMember { member_index, value }
        }
        OpKind::NestedMember => {
            let member_index = decode_member_index(buf, offset)?;
            let nested = decode_document(buf, offset, rctx, budget, depth + 1)?;
            Operation::NestedMember { member_index, nested }
        }
        OpKind::SeqAddAt => {
            let member_index = decode_member_index(buf, offset)?;
            let index = read_uvarint(buf, offset)? as u32;
            let value = decode_value(buf, offset, rctx, &budget.limits, depth)?;
            Operation::SeqAddAt { member_index, index, value }
        }
        OpKind::SeqReplaceAt => {
            let member_index = decode_member_index(buf, offset)?;
            let index = read_uvarint(buf, offset)? as u32;
            let value = decode_value(buf, offset, rctx, &budget.limits, depth)?;
            Operation::SeqReplaceAt { member_index, index, value }
        }
        OpKind::SeqRemoveAt => {
            let member_index = decode_member_index(buf, offset)?;
            let index = read_uvarint(buf, offset)? as u32;
            let expected = decode_optional_value(buf, offset, rctx, budget, depth)?;
            Operation::SeqRemoveAt { member_index, index, expected }
        }
        OpKind::SeqNestedAt => {
            let member_index = decode_member_index(buf, offset)?;
            let index = read_uvarint(buf, offset)? as u32;
            let nested = decode_document(buf, offset, rctx, budget, depth + 1)?;
            Operation::SeqNestedAt { member_index, index, nested }
        }
        OpKind::DictSet => {
            let member_index = decode_member_index(buf, offset)?;
            let key = decode_scalar(buf, offset, rctx, &budget.limits, depth)?;
            let value = decode_value(buf, offset, rctx, &budget.limits, depth)?;
            Operation::DictSet { member_index, key, value }
        }
        OpKind::DictRemove => {
            let member_index = decode_member_index(buf, offset)?;
            let key: ScalarValue = decode_scalar(buf, offset, rctx, &budget.limits, depth)?;
            Operation::DictRemove { member_index, key }
        }
        OpKind::DictNested => {
            let member_index = decode_member_index(buf, offset)?;
            let key = decode_scalar(buf, offset, rctx, &budget.limits, depth)?;
            let nested = decode_document(buf, offset, rctx, budget, depth + 1)?;
            Operation::DictNested { member_index, key, nested }
        }
    })
}
