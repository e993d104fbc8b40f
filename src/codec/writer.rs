//! Encodes a `Document` to the binary wire format.
//!
//! Encoding happens in two passes: a collection pass walks the whole tree
//! to build the string/type interning tables in first-seen order, then the
//! encoding pass writes the header, tables, and operation stream using
//! those tables. Two passes are required because a table reference can
//! only be written once every entry that precedes it in the tables is
//! known, and the writer does not want to buffer the whole tree twice to
//! discover that after the fact.

use crate::config::Options;
use crate::descriptor::MemberInfo;
use crate::document::{Document, Operation};
use crate::value::{ScalarValue, Value};

use super::context::{type_fingerprint, WriteCtx};
use super::value_codec::{collect_scalar, collect_value, encode_scalar, encode_value};
use super::varint::write_uvarint;

const MAGIC: &[u8; 4] = b"DELT";
const VERSION: u8 = 1;

const FLAG_STRING_TABLE: u8 = 1 << 0;
const FLAG_TYPE_TABLE: u8 = 1 << 1;
const FLAG_ENUM_IDENTITY: u8 = 1 << 2;

/// Encode `document` per `options`, returning the wire bytes.
///
/// `root_members` is the root type's member table, used only to compute
/// the advisory fingerprint; pass an empty slice for headerless output or
/// when no fingerprint is wanted. Returned as `Bytes` rather
/// than `Vec<u8>` so callers can hand the frame to another component
/// (e.g. a transport) without an extra copy.
pub fn write(document: &Document, root_members: &[MemberInfo], options: &Options) -> bytes::Bytes {
    let mut wctx = WriteCtx::new(
        options.string_table,
        options.type_table,
        options.enum_identity,
    );
    collect_document(document, &mut wctx);

    let mut out = Vec::new();
    if options.headered {
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.push(header_flags(options));
        out.extend_from_slice(&type_fingerprint(root_members));

        if options.string_table {
            write_uvarint(&mut out, wctx.string_table.len() as u64);
            for s in &wctx.string_table {
                write_uvarint(&mut out, s.len() as u64);
                out.extend_from_slice(s.as_bytes());
            }
        }
        if options.type_table {
            write_uvarint(&mut out, wctx.type_table.len() as u64);
            for id in &wctx.type_table {
                write_uvarint(&mut out, 8);
                out.extend_from_slice(&id.to_le_bytes());
            }
        }
    }

    encode_document(&mut out, document, &wctx);
    bytes::Bytes::from(out)
}

fn header_flags(options: &Options) -> u8 {
    let mut flags = 0u8;
    if options.string_table {
        flags |= FLAG_STRING_TABLE;
    }
    if options.type_table {
        flags |= FLAG_TYPE_TABLE;
    }
    if options.enum_identity {
        flags |= FLAG_ENUM_IDENTITY;
    }
    flags
}

fn collect_document(doc: &Document, ctx: &mut WriteCtx) {
    for op in doc.operations() {
        collect_operation(op, ctx);
    }
}

fn collect_operation(op: &Operation, ctx: &mut WriteCtx) {
    match op {
        Operation::ReplaceObject(value) => {
            if let Some(v) = value {
                collect_value(v, ctx);
            }
        }
        Operation::SetMember { value, .. } => collect_value(value, ctx),
        Operation::NestedMember { nested, .. } => collect_document(nested, ctx),
        Operation::SeqAddAt { value, .. } | Operation::SeqReplaceAt { value, .. } => {
            collect_value(value, ctx)
        }
        Operation::SeqRemoveAt { expected, .. } => {
            if let Some(v) = expected {
                collect_value(v, ctx);
            }
        }
        Operation::SeqNestedAt { nested, .. } => collect_document(nested, ctx),
        Operation::DictSet { key, value, .. } => {
            collect_scalar(key, ctx);
            collect_value(value, ctx);
        }
        Operation::DictRemove { key, .. } => collect_scalar(key, ctx),
        Operation::DictNested { key, nested, .. } => {
            collect_scalar(key, ctx);
            collect_document(nested, ctx);
        }
    }
}

fn encode_document(out: &mut Vec<u8>, doc: &Document, ctx: &WriteCtx) {
    write_uvarint(out, doc.len() as u64);
    for op in doc.operations() {
        encode_operation(out, op, ctx);
    }
}

fn encode_optional_value(out: &mut Vec<u8>, value: &Option<Value>, ctx: &WriteCtx) {
    match value {
        Some(v) => {
            out.push(1);
            encode_value(out, v, ctx);
        }
        None => out.push(0),
    }
}

fn encode_operation(out: &mut Vec<u8>, op: &Operation, ctx: &WriteCtx) {
    out.push(op.kind() as u8);
    match op {
        Operation::ReplaceObject(value) => encode_optional_value(out, value, ctx),
        Operation::SetMember { member_index, value } => {
            write_uvarint(out, *member_index as u64);
            encode_value(out, value, ctx);
        }
        Operation::NestedMember { member_index, nested } => {
            write_uvarint(out, *member_index as u64);
            encode_document(out, nested, ctx);
        }
        Operation::SeqAddAt { member_index, index, value }
        | Operation::SeqReplaceAt { member_index, index, value } => {
            write_uvarint(out, *member_index as u64);
            write_uvarint(out, *index as u64);
            encode_value(out, value, ctx);
        }
        Operation::SeqRemoveAt { member_index, index, expected } => {
            write_uvarint(out, *member_index as u64);
            write_uvarint(out, *index as u64);
            encode_optional_value(out, expected, ctx);
        }
        Operation::SeqNestedAt { member_index, index, nested } => {
            write_uvarint(out, *member_index as u64);
            write_uvarint(out, *index as u64);
            encode_document(out, nested, ctx);
        }
        Operation::DictSet { member_index, key, value } => {
            write_uvarint(out, *member_index as u64);
            encode_scalar(out, key, ctx);
            encode_value(out, value, ctx);
        }
        Operation::DictRemove { member_index, key } => {
            write_uvarint(out, *member_index as u64);
            encode_scalar(out, key, ctx);
        }
        Operation::DictNested { member_index, key, nested } => {
            write_uvarint(out, *member_index as u64);
            encode_scalar(out, key, ctx);
            encode_document(out, nested, ctx);
        }
    }
}
