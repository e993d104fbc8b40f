//! The applicator side of the delta engine.

use crate::config::{Options, OutOfRangePolicy};
use crate::descriptor::{MapAdapter, MemberKind, Record, RootFactory, SequenceAdapter};
use crate::dirty::DirtyTracker;
use crate::document::{Document, MemberIndex, Operation};
use crate::error::ApplyError;
use crate::value::{ScalarValue, Value};

/// Apply `doc` to `root` in document order, returning the (possibly new)
/// root reference. `factory` materializes a fresh instance when the
/// document's `ReplaceObject` needs to swap the root's concrete type (or
/// build one where `root` was `None`).
///
/// A `ReplaceObject` anywhere in the top-level document replaces the root
/// and discards every other top-level op; in practice `compute_delta` only
/// ever emits it as the document's sole operation.
pub fn apply_delta(
    mut root: Option<Box<dyn Record>>,
    doc: &Document,
    factory: &dyn RootFactory,
    options: &Options,
) -> Result<Option<Box<dyn Record>>, ApplyError> {
    let ops = doc.operations();
    if let Some(Operation::ReplaceObject(value)) = ops.first() {
        root = match value {
            None => None,
            Some(v) => factory.materialize(v),
        };
        return Ok(root);
    }

    if let Some(record) = root.as_deref_mut() {
        apply_ops(record, ops, options)?;
        if let Some(tracker) = record.dirty_tracker_mut() {
            tracker.clear_all();
        }
    }
    Ok(root)
}

/// Apply a flat run of member ops to an already-resolved record, honoring
/// the `SeqAddAt` dedup rule: a duplicate of the immediately preceding
/// `SeqAddAt` at the same `(member, index, value)` is ignored, preventing a
/// double-insert on replay of the same document.
fn apply_ops(record: &mut dyn Record, ops: &[Operation], options: &Options) -> Result<(), ApplyError> {
    let mut last_add: Option<(MemberIndex, u32, &Value)> = None;
    for op in ops {
        if let Operation::SeqAddAt { member_index, index, value } = op {
            if let Some((lm, li, lv)) = last_add {
                if lm == *member_index && li == *index && lv == value {
                    last_add = Some((*member_index, *index, value));
                    continue;
                }
            }
            last_add = Some((*member_index, *index, value));
        } else {
            last_add = None;
        }
        apply_member_op(record, op, options)?;
    }
    Ok(())
}

fn apply_member_op(record: &mut dyn Record, op: &Operation, options: &Options) -> Result<(), ApplyError> {
    match op {
        Operation::ReplaceObject(_) => unreachable!("ReplaceObject is handled by apply_delta"),
        Operation::SetMember { member_index, value } => apply_set_member(record, *member_index, value.clone()),
        Operation::NestedMember { member_index, nested } => {
            apply_nested_member(record, *member_index, nested, options)
        }
        Operation::SeqAddAt { member_index, index, value } => {
            apply_seq_add(record, *member_index, *index, value.clone())
        }
        Operation::SeqReplaceAt { member_index, index, value } => {
            apply_seq_replace(record, *member_index, *index, value.clone(), options)
        }
        Operation::SeqRemoveAt { member_index, index, .. } => {
            apply_seq_remove(record, *member_index, *index, options)
        }
        Operation::SeqNestedAt { member_index, index, nested } => {
            apply_seq_nested(record, *member_index, *index, nested, options)
        }
        Operation::DictSet { member_index, key, value } => {
            apply_dict_set(record, *member_index, key.clone(), value.clone())
        }
        Operation::DictRemove { member_index, key } => apply_dict_remove(record, *member_index, key),
        Operation::DictNested { member_index, key, nested } => {
            apply_dict_nested(record, *member_index, key, nested, options)
        }
    }
}

fn member_kind(record: &dyn Record, member_index: MemberIndex) -> Option<MemberKind> {
    record
        .members()
        .iter()
        .find(|m| m.stable_index == member_index)
        .map(|m| m.kind)
}

fn apply_set_member(record: &mut dyn Record, member_index: MemberIndex, value: Value) -> Result<(), ApplyError> {
    match member_kind(record, member_index) {
        Some(MemberKind::NestedRecord) | Some(MemberKind::Polymorphic) => {
            if value.is_null() {
                record.set_nested(member_index, None);
                Ok(())
            } else if record.assign_nested_from_value(member_index, &value) {
                Ok(())
            } else {
                Err(ApplyError::ShapeMismatch {
                    member_index,
                    kind: "nested_record",
                    reason: "value did not describe a compatible record shape",
                })
            }
        }
        Some(MemberKind::Sequence) => {
            let items = match value {
                Value::List(v) | Value::ObjectArray(v) => v,
                Value::Null => Vec::new(),
                _ => {
                    return Err(ApplyError::ShapeMismatch {
                        member_index,
                        kind: "sequence",
                        reason: "expected a list-shaped value",
                    })
                }
            };
            match record.get_sequence_mut(member_index) {
                Some(seq) => {
                    let len = seq.len();
                    seq.splice(0, len, items);
                    Ok(())
                }
                None => Err(ApplyError::ShapeMismatch {
                    member_index,
                    kind: "sequence",
                    reason: "member has no sequence adapter",
                }),
            }
        }
        Some(MemberKind::Map) => {
            let entries = match value {
                Value::Map(m) => m,
                Value::Null => Vec::new(),
                _ => {
                    return Err(ApplyError::ShapeMismatch {
                        member_index,
                        kind: "map",
                        reason: "expected a map-shaped value",
                    })
                }
            };
            match record.get_map_mut(member_index) {
                Some(map) => {
                    for k in map.keys() {
                        map.remove(&k);
                    }
                    for (k, v) in entries {
                        map.set(k, v);
                    }
                    Ok(())
                }
                None => Err(ApplyError::ShapeMismatch {
                    member_index,
                    kind: "map",
                    reason: "member has no map adapter",
                }),
            }
        }
        _ => {
            if record.set_scalar(member_index, value) {
                Ok(())
            } else {
                Err(ApplyError::ShapeMismatch {
                    member_index,
                    kind: "scalar",
                    reason: "descriptor rejected the assignment",
                })
            }
        }
    }
}

fn apply_nested_member(
    record: &mut dyn Record,
    member_index: MemberIndex,
    nested: &Document,
    options: &Options,
) -> Result<(), ApplyError> {
    match record.get_nested_mut(member_index) {
        Some(child) => apply_sub_document(child, nested, options),
        None => Ok(()),
    }
}

fn apply_sub_document(record: &mut dyn Record, doc: &Document, options: &Options) -> Result<(), ApplyError> {
    apply_ops(record, doc.operations(), options)?;
    if let Some(tracker) = record.dirty_tracker_mut() {
        tracker.clear_all();
    }
    Ok(())
}

fn apply_seq_add(
    record: &mut dyn Record,
    member_index: MemberIndex,
    index: u32,
    value: Value,
) -> Result<(), ApplyError> {
    let Some(seq) = record.get_sequence_mut(member_index) else {
        return Ok(());
    };
    let len = seq.len();
    let at = (index as usize).min(len);
    seq.splice(at, 0, vec![value]);
    Ok(())
}

fn apply_seq_replace(
    record: &mut dyn Record,
    member_index: MemberIndex,
    index: u32,
    value: Value,
    options: &Options,
) -> Result<(), ApplyError> {
    let Some(seq) = record.get_sequence_mut(member_index) else {
        return Ok(());
    };
    let len = seq.len();
    if index as usize >= len {
        return handle_out_of_range(member_index, index, len, options);
    }
    seq.splice(index as usize, 1, vec![value]);
    Ok(())
}

fn apply_seq_remove(
    record: &mut dyn Record,
    member_index: MemberIndex,
    index: u32,
    options: &Options,
) -> Result<(), ApplyError> {
    let Some(seq) = record.get_sequence_mut(member_index) else {
        return Ok(());
    };
    let len = seq.len();
    if index as usize >= len {
        return handle_out_of_range(member_index, index, len, options);
    }
    seq.splice(index as usize, 1, Vec::new());
    Ok(())
}

fn apply_seq_nested(
    record: &mut dyn Record,
    member_index: MemberIndex,
    index: u32,
    nested: &Document,
    options: &Options,
) -> Result<(), ApplyError> {
    let Some(seq) = record.get_sequence_mut(member_index) else {
        return Ok(());
    };
    let len = seq.len();
    if index as usize >= len {
        return handle_out_of_range(member_index, index, len, options);
    }
    match seq.nested_at_mut(index as usize) {
        Some(child) => apply_sub_document(child, nested, options),
        // value-like element: SeqNestedAt is a no-op.
        None => Ok(()),
    }
}

fn handle_out_of_range(
    member_index: MemberIndex,
    index: u32,
    len: usize,
    options: &Options,
) -> Result<(), ApplyError> {
    match options.out_of_range {
        OutOfRangePolicy::Ignore => Ok(()),
        OutOfRangePolicy::Strict => Err(ApplyError::OutOfRange { member_index, index, len }),
    }
}

fn apply_dict_set(
    record: &mut dyn Record,
    member_index: MemberIndex,
    key: ScalarValue,
    value: Value,
) -> Result<(), ApplyError> {
    if let Some(map) = record.get_map_mut(member_index) {
        map.set(key, value);
    }
    Ok(())
}

fn apply_dict_remove(record: &mut dyn Record, member_index: MemberIndex, key: &ScalarValue) -> Result<(), ApplyError> {
    if let Some(map) = record.get_map_mut(member_index) {
        map.remove(key);
    }
    Ok(())
}

fn apply_dict_nested(
    record: &mut dyn Record,
    member_index: MemberIndex,
    key: &ScalarValue,
    nested: &Document,
    options: &Options,
) -> Result<(), ApplyError> {
    let Some(map) = record.get_map_mut(member_index) else {
        return Ok(());
    };
    match map.get_nested_mut(key) {
        Some(child) => apply_sub_document(child, nested, options),
        // key missing: do not create.
        None => Ok(()),
    }
}
