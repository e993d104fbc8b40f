//! The diff side of the delta engine.

use std::collections::HashMap;

use crate::config::{CompareOptions, StringComparison};
use crate::descriptor::{self, MapAdapter, MemberInfo, MemberKind, Record, SequenceAdapter, SequencePolicy};
use crate::dirty::DirtyTracker;
use crate::document::{Document, MemberIndex, Writer};
use crate::error::EngineError;
use crate::value::{Decimal128, ScalarValue, Value};

use super::CompareContext;

/// Compute the delta between `left` and `right`, recursively walking their
/// members under `options`.
///
/// `None` for both sides yields an empty document. Exactly one side `None`,
/// or both present but of differing runtime type, yields a single
/// `ReplaceObject`. Otherwise the per-member walk produces the operation
/// stream.
pub fn compute_delta(
    left: Option<&dyn Record>,
    right: Option<&dyn Record>,
    options: &CompareOptions,
) -> Result<Document, EngineError> {
    let mut writer = Writer::new();
    match (left, right) {
        (None, None) => {}
        (None, Some(r)) => {
            writer.replace_object(Some(descriptor::export_full(r)));
        }
        (Some(_), None) => {
            writer.replace_object(None);
        }
        (Some(l), Some(r)) => {
            if l.runtime_type() != r.runtime_type() {
                writer.replace_object(Some(descriptor::export_full(r)));
            } else {
                let mut ctx = CompareContext::new(options);
                diff_record(&mut writer, l, r, &mut ctx)?;
            }
        }
    }
    Ok(writer.finish())
}

/// Diff one record's members, preferring the right-hand side's dirty
/// tracker when it has one and validate-on-emit is off: only bits
/// popped from the tracker are considered, each still confirmed by
/// `diff_member`'s own equality check, so the result is a subset of a full
/// walk. Otherwise every member is walked.
fn diff_record(
    writer: &mut Writer,
    left: &dyn Record,
    right: &dyn Record,
    ctx: &mut CompareContext<'_>,
) -> Result<(), EngineError> {
    ctx.enter()?;
    let suppress = ctx.enter_pair(
        descriptor::record_address(left),
        descriptor::record_address(right),
    );
    if !suppress {
        let fast_path = right
            .dirty_tracker()
            .filter(|_| !ctx.options.dirty.validate_on_emit);
        match fast_path {
            Some(tracker) => {
                while let Some(bit) = tracker.pop_next() {
                    let Some(info) = left.members().iter().find(|m| m.stable_index as usize == bit)
                    else {
                        continue;
                    };
                    if info.policy.delta_skip {
                        continue;
                    }
                    diff_member(writer, left, right, info, ctx)?;
                }
            }
            None => {
                for info in left.members() {
                    if info.policy.delta_skip {
                        continue;
                    }
                    diff_member(writer, left, right, info, ctx)?;
                }
            }
        }
    }
    ctx.exit();
    Ok(())
}

fn diff_member(
    writer: &mut Writer,
    left: &dyn Record,
    right: &dyn Record,
    info: &MemberInfo,
    ctx: &mut CompareContext<'_>,
) -> Result<(), EngineError> {
    if info.policy.delta_shallow {
        return diff_whole_value(writer, info, left, right, ctx.options);
    }

    match info.kind {
        MemberKind::Skipped => Ok(()),
        MemberKind::Scalar | MemberKind::String | MemberKind::Enum => {
            let lv = left.get_scalar(info.stable_index).unwrap_or(Value::Null);
            let rv = right.get_scalar(info.stable_index).unwrap_or(Value::Null);
            if !value_deep_equal(&lv, &rv, ctx.options) {
                writer.set_member(info.stable_index, rv);
            }
            Ok(())
        }
        MemberKind::NestedRecord | MemberKind::Polymorphic => {
            diff_nested_member(writer, info.stable_index, left, right, ctx)
        }
        MemberKind::Sequence => diff_sequence_member(writer, info, left, right, ctx),
        MemberKind::Map => diff_map_member(writer, info, left, right, ctx),
        MemberKind::ShallowOpaque => diff_whole_value(writer, info, left, right, ctx.options),
    }
}

/// Compare and, on difference, emit `SetMember` for a member compared as a
/// single opaque value (`delta_shallow` or `ShallowOpaque`).
fn diff_whole_value(
    writer: &mut Writer,
    info: &MemberInfo,
    left: &dyn Record,
    right: &dyn Record,
    options: &CompareOptions,
) -> Result<(), EngineError> {
    let lv = descriptor::export_member_value(left, info);
    let rv = descriptor::export_member_value(right, info);
    if !value_deep_equal(&lv, &rv, options) {
        writer.set_member(info.stable_index, rv);
    }
    Ok(())
}

fn diff_nested_member(
    writer: &mut Writer,
    member_index: MemberIndex,
    left: &dyn Record,
    right: &dyn Record,
    ctx: &mut CompareContext<'_>,
) -> Result<(), EngineError> {
    let nl = left.get_nested(member_index);
    let nr = right.get_nested(member_index);
    match (nl, nr) {
        (None, None) => Ok(()),
        (None, Some(r)) => {
            writer.set_member(member_index, descriptor::export_full(r));
            Ok(())
        }
        (Some(_), None) => {
            writer.set_member(member_index, Value::Null);
            Ok(())
        }
        (Some(l), Some(r)) => {
            if l.runtime_type() != r.runtime_type() {
                writer.set_member(member_index, descriptor::export_full(r));
                return Ok(());
            }
            let mut sub = Writer::new();
            diff_record(&mut sub, l, r, ctx)?;
            let doc = sub.finish();
            if !doc.is_empty() {
                writer.nested_member(member_index, doc);
            }
            Ok(())
        }
    }
}

fn diff_sequence_member(
    writer: &mut Writer,
    info: &MemberInfo,
    left: &dyn Record,
    right: &dyn Record,
    ctx: &mut CompareContext<'_>,
) -> Result<(), EngineError> {
    let seq_l = left.get_sequence(info.stable_index);
    let seq_r = right.get_sequence(info.stable_index);
    match (seq_l, seq_r) {
        (None, None) => Ok(()),
        (None, Some(r)) => {
            writer.set_member(info.stable_index, descriptor::sequence_to_value(r));
            Ok(())
        }
        (Some(_), None) => {
            writer.set_member(info.stable_index, Value::Null);
            Ok(())
        }
        (Some(l), Some(r)) => match &info.policy.sequence {
            SequencePolicy::WholeReplacement => {
                let lv = descriptor::sequence_to_value(l);
                let rv = descriptor::sequence_to_value(r);
                if !value_deep_equal(&lv, &rv, ctx.options) {
                    writer.set_member(info.stable_index, rv);
                }
                Ok(())
            }
            SequencePolicy::Positional => {
                diff_sequence_positional(writer, info.stable_index, l, r, ctx)
            }
            SequencePolicy::KeyedMultiset { key_members } => {
                diff_sequence_keyed(writer, info.stable_index, l, r, key_members, ctx)
            }
        },
    }
}

fn elements_equal(
    seq_l: &dyn SequenceAdapter,
    seq_r: &dyn SequenceAdapter,
    li: usize,
    ri: usize,
    ctx: &mut CompareContext<'_>,
) -> Result<bool, EngineError> {
    match (seq_l.nested_at(li), seq_r.nested_at(ri)) {
        (Some(nl), Some(nr)) => {
            if nl.runtime_type() != nr.runtime_type() {
                return Ok(false);
            }
            let mut probe = Writer::new();
            let snapshot = ctx.snapshot_cycle_state();
            let outcome = diff_record(&mut probe, nl, nr, ctx);
            ctx.restore_cycle_state(snapshot);
            outcome?;
            Ok(probe.finish().is_empty())
        }
        (None, None) => Ok(value_deep_equal(&seq_l.at(li), &seq_r.at(ri), ctx.options)),
        _ => Ok(false),
    }
}

/// Minimal positional edit program: trim the equal prefix/suffix, then pair
/// the remaining indices position-by-position. Ordering guarantee: all
/// replace/nested ops ascend by position,
/// then removes descend, then adds ascend (all removes precede all adds).
fn diff_sequence_positional(
    writer: &mut Writer,
    member_index: MemberIndex,
    seq_l: &dyn SequenceAdapter,
    seq_r: &dyn SequenceAdapter,
    ctx: &mut CompareContext<'_>,
) -> Result<(), EngineError> {
    let len_l = seq_l.len();
    let len_r = seq_r.len();
    let min_len = len_l.min(len_r);

    let mut prefix = 0;
    while prefix < min_len && elements_equal(seq_l, seq_r, prefix, prefix, ctx)? {
        prefix += 1;
    }

    let mut suffix = 0;
    let remaining = min_len - prefix;
    while suffix < remaining
        && elements_equal(seq_l, seq_r, len_l - 1 - suffix, len_r - 1 - suffix, ctx)?
    {
        suffix += 1;
    }

    let l_end = len_l - suffix;
    let r_end = len_r - suffix;
    let overlap = (l_end - prefix).min(r_end - prefix);

    for k in 0..overlap {
        let li = prefix + k;
        let ri = prefix + k;
        match (seq_l.nested_at(li), seq_r.nested_at(ri)) {
            (Some(nl), Some(nr)) if nl.runtime_type() == nr.runtime_type() => {
                let mut sub = Writer::new();
                diff_record(&mut sub, nl, nr, ctx)?;
                let doc = sub.finish();
                if !doc.is_empty() {
                    writer.seq_nested_at(member_index, li as u32, doc);
                }
            }
            _ => {
                let lv = seq_l.at(li);
                let rv = seq_r.at(ri);
                if !value_deep_equal(&lv, &rv, ctx.options) {
                    writer.seq_replace_at(member_index, li as u32, rv);
                }
            }
        }
    }

    for i in (prefix + overlap..l_end).rev() {
        writer.seq_remove_at(member_index, i as u32, Some(seq_l.at(i)));
    }
    for i in prefix + overlap..r_end {
        writer.seq_add_at(member_index, i as u32, seq_add_value(seq_r, i));
    }

    Ok(())
}

/// Value to carry on a `SeqAddAt` for element `i`: the fully reified record
/// (as `assign_nested_from_value`/a host splice expects) for nested-record
/// elements, the plain value otherwise.
fn seq_add_value(seq: &dyn SequenceAdapter, i: usize) -> Value {
    match seq.nested_at(i) {
        Some(record) => descriptor::export_full(record),
        None => seq.at(i),
    }
}

fn element_key(adapter: &dyn SequenceAdapter, i: usize, key_members: &[&'static str]) -> Value {
    if key_members.is_empty() {
        return adapter.at(i);
    }
    match adapter.nested_at(i) {
        Some(record) => {
            let mut parts: Vec<Value> = Vec::with_capacity(key_members.len());
            for name in key_members {
                let value = record
                    .members()
                    .iter()
                    .find(|m| m.name == *name)
                    .and_then(|m| record.get_scalar(m.stable_index))
                    .unwrap_or(Value::Null);
                parts.push(value);
            }
            if parts.len() == 1 {
                parts.into_iter().next().unwrap()
            } else {
                Value::List(parts)
            }
        }
        None => adapter.at(i),
    }
}

/// Unordered keyed-multiset diff: pair elements by a named-member key rather
/// than position. Ties among equal keys break by first occurrence on each
/// side.
fn diff_sequence_keyed(
    writer: &mut Writer,
    member_index: MemberIndex,
    seq_l: &dyn SequenceAdapter,
    seq_r: &dyn SequenceAdapter,
    key_members: &[&'static str],
    ctx: &mut CompareContext<'_>,
) -> Result<(), EngineError> {
    let len_l = seq_l.len();
    let len_r = seq_r.len();
    let left_keys: Vec<Value> = (0..len_l).map(|i| element_key(seq_l, i, key_members)).collect();
    let right_keys: Vec<Value> = (0..len_r).map(|i| element_key(seq_r, i, key_members)).collect();

    let mut matched_right = vec![false; len_r];
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    let mut unmatched_left: Vec<usize> = Vec::new();

    for li in 0..len_l {
        let mut found = None;
        for ri in 0..len_r {
            if !matched_right[ri] && value_deep_equal(&left_keys[li], &right_keys[ri], ctx.options) {
                found = Some(ri);
                break;
            }
        }
        match found {
            Some(ri) => {
                matched_right[ri] = true;
                pairs.push((li, ri));
            }
            None => unmatched_left.push(li),
        }
    }
    let unmatched_right: Vec<usize> = (0..len_r).filter(|&ri| !matched_right[ri]).collect();

    for (li, ri) in &pairs {
        if let (Some(nl), Some(nr)) = (seq_l.nested_at(*li), seq_r.nested_at(*ri)) {
            let mut sub = Writer::new();
            diff_record(&mut sub, nl, nr, ctx)?;
            let doc = sub.finish();
            if !doc.is_empty() {
                writer.seq_nested_at(member_index, *li as u32, doc);
            }
        }
        // value-like pairing: an equal key on a value-like element already
        // means an equal element (the key *is* the whole value), so there is
        // nothing left to diff.
    }

    let mut removes = unmatched_left;
    removes.sort_unstable_by(|a, b| b.cmp(a));
    for li in removes {
        writer.seq_remove_at(member_index, li as u32, Some(seq_l.at(li)));
    }

    let mut adds = unmatched_right;
    adds.sort_unstable();
    for ri in adds {
        writer.seq_add_at(member_index, ri as u32, seq_add_value(seq_r, ri));
    }

    Ok(())
}

fn diff_map_member(
    writer: &mut Writer,
    info: &MemberInfo,
    left: &dyn Record,
    right: &dyn Record,
    ctx: &mut CompareContext<'_>,
) -> Result<(), EngineError> {
    let map_l = left.get_map(info.stable_index);
    let map_r = right.get_map(info.stable_index);
    let (map_l, map_r) = match (map_l, map_r) {
        (None, None) => return Ok(()),
        (None, Some(r)) => {
            writer.set_member(info.stable_index, descriptor::map_to_value(r));
            return Ok(());
        }
        (Some(_), None) => {
            writer.set_member(info.stable_index, Value::Null);
            return Ok(());
        }
        (Some(l), Some(r)) => (l, r),
    };

    let keys_l = map_l.keys();
    let keys_r = map_r.keys();
    let set_r: std::collections::HashSet<ScalarValue> = keys_r.iter().cloned().collect();
    let set_l: std::collections::HashSet<ScalarValue> = keys_l.iter().cloned().collect();

    // Sorted-by-key emission gives deterministic codec output regardless of
    // the map adapter's own iteration order.
    let mut removed: Vec<ScalarValue> = keys_l.iter().filter(|k| !set_r.contains(k)).cloned().collect();
    removed.sort_by(compare_scalars);
    for k in removed {
        writer.dict_remove(info.stable_index, k);
    }

    let mut added: Vec<ScalarValue> = keys_r.iter().filter(|k| !set_l.contains(k)).cloned().collect();
    added.sort_by(compare_scalars);
    for k in added {
        let v = map_r.get(&k).unwrap_or(Value::Null);
        writer.dict_set(info.stable_index, k, v);
    }

    let mut common: Vec<ScalarValue> = keys_l.iter().filter(|k| set_r.contains(k)).cloned().collect();
    common.sort_by(compare_scalars);
    for k in common {
        match (map_l.get_nested(&k), map_r.get_nested(&k)) {
            (Some(nl), Some(nr)) if nl.runtime_type() == nr.runtime_type() => {
                let mut sub = Writer::new();
                diff_record(&mut sub, nl, nr, ctx)?;
                let doc = sub.finish();
                if !doc.is_empty() {
                    writer.dict_nested(info.stable_index, k, doc);
                }
            }
            (None, None) => {
                let lv = map_l.get(&k).unwrap_or(Value::Null);
                let rv = map_r.get(&k).unwrap_or(Value::Null);
                if !value_deep_equal(&lv, &rv, ctx.options) {
                    writer.dict_set(info.stable_index, k, rv);
                }
            }
            _ => {
                // exactly one side is a nested record (polymorphic-null
                // mismatch) - whole-value replace.
                let rv = match map_r.get_nested(&k) {
                    Some(r) => descriptor::export_full(r),
                    None => map_r.get(&k).unwrap_or(Value::Null),
                };
                writer.dict_set(info.stable_index, k, rv);
            }
        }
    }

    Ok(())
}

fn compare_scalars(a: &ScalarValue, b: &ScalarValue) -> std::cmp::Ordering {
    scalar_sort_key(a).cmp(&scalar_sort_key(b))
}

fn scalar_sort_key(v: &ScalarValue) -> (u8, i128, String) {
    use ScalarValue::*;
    match v {
        I8(x) => (0, *x as i128, String::new()),
        I16(x) => (1, *x as i128, String::new()),
        I32(x) => (2, *x as i128, String::new()),
        I64(x) => (3, *x as i128, String::new()),
        U8(x) => (4, *x as i128, String::new()),
        U16(x) => (5, *x as i128, String::new()),
        U32(x) => (6, *x as i128, String::new()),
        U64(x) => (7, *x as i128, String::new()),
        Bool(x) => (8, *x as i128, String::new()),
        Char(x) => (9, *x as i128, String::new()),
        String(s) => (10, 0, s.clone()),
        Guid(u) => (11, 0, u.to_string()),
    }
}

/// Deep value equality under comparison options: string comparator,
/// NaN-equality, float/double/decimal epsilons.
pub(crate) fn value_deep_equal(a: &Value, b: &Value, options: &CompareOptions) -> bool {
    use Value::*;
    match (a, b) {
        (Null, Null) => true,
        (I8(x), I8(y)) => x == y,
        (I16(x), I16(y)) => x == y,
        (I32(x), I32(y)) => x == y,
        (I64(x), I64(y)) => x == y,
        (U8(x), U8(y)) => x == y,
        (U16(x), U16(y)) => x == y,
        (U32(x), U32(y)) => x == y,
        (U64(x), U64(y)) => x == y,
        (Bool(x), Bool(y)) => x == y,
        (Char(x), Char(y)) => x == y,
        (Float32(x), Float32(y)) => {
            float_eq(*x as f64, *y as f64, options.float_epsilon as f64, options.nan_equality)
        }
        (Float64(x), Float64(y)) => float_eq(*x, *y, options.double_epsilon, options.nan_equality),
        (Decimal(x), Decimal(y)) => decimal_eq(x, y, options.decimal_epsilon),
        (String(x), String(y)) => string_eq(x, y, options.string_comparison),
        (Guid(x), Guid(y)) => x == y,
        (
            DateTime { ticks: t1, kind: k1 },
            DateTime { ticks: t2, kind: k2 },
        ) => t1 == t2 && k1 == k2,
        (
            DateTimeOffset { ticks: t1, offset_minutes: o1 },
            DateTimeOffset { ticks: t2, offset_minutes: o2 },
        ) => t1 == t2 && o1 == o2,
        (TimeSpan(x), TimeSpan(y)) => x == y,
        (Bytes(x), Bytes(y)) => x == y,
        (ObjectArray(x), ObjectArray(y)) | (List(x), List(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| value_deep_equal(a, b, options))
        }
        (Map(x), Map(y)) => map_deep_equal(x, y, options),
        (Enum(x), Enum(y)) => x.underlying == y.underlying && x.type_id == y.type_id,
        _ => false,
    }
}

fn float_eq(a: f64, b: f64, epsilon: f64, nan_equality: bool) -> bool {
    if a.is_nan() && b.is_nan() {
        return nan_equality;
    }
    if epsilon > 0.0 {
        (a - b).abs() <= epsilon
    } else {
        a == b
    }
}

fn decimal_eq(a: &Decimal128, b: &Decimal128, epsilon: f64) -> bool {
    if epsilon <= 0.0 {
        return a.scale() == b.scale() && a.is_negative() == b.is_negative() && a.magnitude() == b.magnitude();
    }
    (decimal_to_f64(a) - decimal_to_f64(b)).abs() <= epsilon
}

fn decimal_to_f64(d: &Decimal128) -> f64 {
    let magnitude = d.magnitude() as f64 / 10f64.powi(d.scale() as i32);
    if d.is_negative() {
        -magnitude
    } else {
        magnitude
    }
}

fn string_eq(a: &str, b: &str, comparison: StringComparison) -> bool {
    match comparison {
        StringComparison::Ordinal => a == b,
        StringComparison::OrdinalIgnoreCase => a.eq_ignore_ascii_case(b),
    }
}

fn map_deep_equal(
    a: &[(ScalarValue, Value)],
    b: &[(ScalarValue, Value)],
    options: &CompareOptions,
) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let b_map: HashMap<&ScalarValue, &Value> = b.iter().map(|(k, v)| (k, v)).collect();
    a.iter().all(|(k, v)| match b_map.get(k) {
        Some(bv) => value_deep_equal(v, bv, options),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompareOptions;

    #[test]
    fn float_epsilon_suppresses_small_differences() {
        let opts = CompareOptions {
            double_epsilon: 0.01,
            ..Default::default()
        };
        assert!(value_deep_equal(&Value::Float64(1.0), &Value::Float64(1.005), &opts));
        assert!(!value_deep_equal(&Value::Float64(1.0), &Value::Float64(1.02), &opts));
    }

    #[test]
    fn nan_equality_toggle() {
        let mut opts = CompareOptions::default();
        assert!(!value_deep_equal(&Value::Float64(f64::NAN), &Value::Float64(f64::NAN), &opts));
        opts.nan_equality = true;
        assert!(value_deep_equal(&Value::Float64(f64::NAN), &Value::Float64(f64::NAN), &opts));
    }

    #[test]
    fn ordinal_ignore_case_string_comparison() {
        let opts = CompareOptions {
            string_comparison: StringComparison::OrdinalIgnoreCase,
            ..Default::default()
        };
        assert!(value_deep_equal(
            &Value::String("Hello".into()),
            &Value::String("hello".into()),
            &opts
        ));
    }

    #[test]
    fn map_equality_ignores_entry_order() {
        let a = Value::Map(vec![
            (ScalarValue::U32(1), Value::I32(1)),
            (ScalarValue::U32(2), Value::I32(2)),
        ]);
        let b = Value::Map(vec![
            (ScalarValue::U32(2), Value::I32(2)),
            (ScalarValue::U32(1), Value::I32(1)),
        ]);
        assert!(value_deep_equal(&a, &b, &CompareOptions::default()));
    }
}
