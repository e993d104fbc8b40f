//! The type descriptor contract.
//!
//! This is the abstract interface the diff engine and applicator consume.
//! The engine never reflects on record layout directly - it only ever goes
//! through `Record`, `SequenceAdapter`, and `MapAdapter` trait objects. A
//! real deployment's code generator would emit one `Record` implementation
//! per host type; this crate ships no generator, only the contract and a
//! couple of hand-written test fixtures that prove the engine works
//! against it.

use crate::document::MemberIndex;
use crate::dirty::DirtyTracker;
use crate::value::{ScalarValue, Value};

/// Runtime type token, used to detect polymorphic mismatches and embedded in
/// the codec's type interning table. Descriptors are free to derive this
/// however they like (a generated type ID, a hash of the type name, ...) as
/// long as it's stable for a given concrete type.
pub type RuntimeTypeId = u64;

/// The shape a member can take.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// A plain scalar (numeric, bool, GUID, date/time, ...).
    Scalar,
    /// A string.
    String,
    /// An enum, with or without identity.
    Enum,
    /// A nested record of statically known concrete type.
    NestedRecord,
    /// An ordered or unordered sequence.
    Sequence,
    /// A map.
    Map,
    /// A member whose concrete runtime type varies (interface/abstract
    /// member).
    Polymorphic,
    /// A member compared and emitted as a whole value rather than walked
    /// member-by-member, even though its declared kind might otherwise be
    /// `NestedRecord`.
    ShallowOpaque,
    /// A member the engine must never diff or apply.
    Skipped,
}

/// Whether a sequence member is positional (ordered, paired index-by-index)
/// or a keyed multiset (unordered, paired by a key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencePolicy {
    /// Ordered list: elements are compared position-by-position.
    Positional,
    /// Whole-replacement block: any content difference replaces the entire
    /// member via `SetMember` rather than emitting granular ops.
    WholeReplacement,
    /// Unordered keyed multiset: elements are paired by the value of the
    /// named member(s) (or by the element itself if it's value-like).
    KeyedMultiset {
        /// Names of the member(s) that make up the pairing key.
        key_members: Vec<&'static str>,
    },
}

/// Per-member comparison/diff policy.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberPolicy {
    /// Sequence pairing policy. Only meaningful for `MemberKind::Sequence`.
    pub sequence: SequencePolicy,
    /// Default order-insensitivity for maps and non-sequence collections
    /// (sequence order-insensitivity is expressed via `SequencePolicy`
    /// instead).
    pub order_insensitive: bool,
    /// Compare and emit this member as a single opaque value rather than
    /// walking into it, even if its kind would otherwise be walked.
    pub delta_shallow: bool,
    /// Never diff or apply this member.
    pub delta_skip: bool,
    /// If set, only these member names are considered for the member's own
    /// nested schema walk (nested records only).
    pub compare_members_schema: Option<Vec<&'static str>>,
    /// If set, these member names are excluded from the member's own
    /// nested schema walk (nested records only).
    pub ignore_members_schema: Option<Vec<&'static str>>,
}

impl Default for MemberPolicy {
    fn default() -> Self {
        Self {
            sequence: SequencePolicy::Positional,
            order_insensitive: false,
            delta_shallow: false,
            delta_skip: false,
            compare_members_schema: None,
            ignore_members_schema: None,
        }
    }
}

/// One entry in a record type's member table.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    /// Stable, append-only identifier.
    pub stable_index: MemberIndex,
    /// Member name, for diagnostics and keyed-multiset key resolution.
    pub name: &'static str,
    /// Shape of the member.
    pub kind: MemberKind,
    /// Comparison/diff policy.
    pub policy: MemberPolicy,
}

/// A live record instance of possibly-unknown concrete type, accessed only
/// through this object-safe trait. Nested records - whether
/// declared statically (`NestedRecord`) or resolved dynamically
/// (`Polymorphic`) - are reached through the same `get_nested`/
/// `get_nested_mut` pair; the engine tells them apart only by the member's
/// declared `MemberKind`.
pub trait Record {
    /// This record's ordered member table.
    fn members(&self) -> &[MemberInfo];

    /// Runtime type token for this concrete instance, used for polymorphic
    /// mismatch detection and type interning.
    fn runtime_type(&self) -> RuntimeTypeId;

    /// Read a `Scalar`/`String`/`Enum` member as an engine `Value`.
    fn get_scalar(&self, index: MemberIndex) -> Option<Value>;

    /// Assign a `Scalar`/`String`/`Enum` member, or replace a
    /// whole-replacement sequence/map member, from an engine `Value`.
    fn set_scalar(&mut self, index: MemberIndex, value: Value) -> bool;

    /// Borrow a `NestedRecord`/`Polymorphic` member. `None` means the
    /// member is logically null.
    fn get_nested(&self, index: MemberIndex) -> Option<&dyn Record>;

    /// Mutably borrow a `NestedRecord`/`Polymorphic` member for in-place
    /// apply.
    fn get_nested_mut(&mut self, index: MemberIndex) -> Option<&mut dyn Record>;

    /// Replace a `NestedRecord`/`Polymorphic` member wholesale - used when
    /// exactly one side is null or a polymorphic type mismatch is detected.
    fn set_nested(&mut self, index: MemberIndex, value: Option<Box<dyn Record>>) -> bool;

    /// Assign a `NestedRecord`/`Polymorphic` member wholesale from a fully
    /// materialized value snapshot, as produced by `export_full`. This is how
    /// `SetMember`/`ReplaceObject` whole-replacement payloads reach a
    /// nested-record position without the engine or codec ever needing to
    /// know the member's concrete Rust type. Returns `false` if the value
    /// doesn't describe a shape this descriptor can materialize.
    fn assign_nested_from_value(&mut self, index: MemberIndex, value: &Value) -> bool;

    /// Borrow a `Sequence` member.
    fn get_sequence(&self, index: MemberIndex) -> Option<&dyn SequenceAdapter>;

    /// Mutably borrow a `Sequence` member.
    fn get_sequence_mut(&mut self, index: MemberIndex) -> Option<&mut dyn SequenceAdapter>;

    /// Borrow a `Map` member.
    fn get_map(&self, index: MemberIndex) -> Option<&dyn MapAdapter>;

    /// Mutably borrow a `Map` member.
    fn get_map_mut(&mut self, index: MemberIndex) -> Option<&mut dyn MapAdapter>;

    /// The optional dirty-tracker hook. `None` means the
    /// concrete type does not support dirty tracking and the engine must
    /// fall back to a full walk.
    fn dirty_tracker(&self) -> Option<&dyn DirtyTracker> {
        None
    }

    /// Mutable access to the dirty tracker, for clearing bits after apply.
    fn dirty_tracker_mut(&mut self) -> Option<&mut dyn DirtyTracker> {
        None
    }
}

/// Adapter over a sequence-kind member.
///
/// Implementations backed by an immutable/copy-on-write host container are
/// expected to perform their own clone-and-assign-back internally - the
/// engine and applicator call `splice`/`nested_at_mut` uniformly either way.
pub trait SequenceAdapter {
    /// Number of elements.
    fn len(&self) -> usize;

    /// Whether there are no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `i` as an engine value. Only meaningful for value-like
    /// elements; nested-record elements are reached via `nested_at`.
    fn at(&self, i: usize) -> Value;

    /// Nested-record view of element `i`, when elements are themselves
    /// records.
    fn nested_at(&self, i: usize) -> Option<&dyn Record>;

    /// Mutable nested-record view of element `i`.
    fn nested_at_mut(&mut self, i: usize) -> Option<&mut dyn Record>;

    /// Remove `removed` elements starting at `index`, then insert
    /// `inserted` at that position, in order. A no-op where `index` is out
    /// of bounds and nothing is being inserted.
    fn splice(&mut self, index: usize, removed: usize, inserted: Vec<Value>);

    /// Whether the member's declared container type is read-only at the
    /// host level (informational only - `splice`/`nested_at_mut` already
    /// account for it).
    fn is_read_only(&self) -> bool {
        false
    }
}

/// Adapter over a map-kind member.
pub trait MapAdapter {
    /// All keys currently present, in adapter-defined order.
    fn keys(&self) -> Vec<ScalarValue>;

    /// Value at `key`, for value-like entries.
    fn get(&self, key: &ScalarValue) -> Option<Value>;

    /// Nested-record view of the entry at `key`.
    fn get_nested(&self, key: &ScalarValue) -> Option<&dyn Record>;

    /// Mutable nested-record view of the entry at `key`.
    fn get_nested_mut(&mut self, key: &ScalarValue) -> Option<&mut dyn Record>;

    /// Insert or overwrite an entry.
    fn set(&mut self, key: ScalarValue, value: Value);

    /// Remove an entry, if present. Returns whether it was present.
    fn remove(&mut self, key: &ScalarValue) -> bool;

    /// See `SequenceAdapter::is_read_only`.
    fn is_read_only(&self) -> bool {
        false
    }
}

/// Identity of a `Record` trait object for cycle tracking: the address of
/// the data pointer, ignoring the vtable pointer.
pub fn record_address(record: &dyn Record) -> usize {
    record as *const dyn Record as *const () as usize
}

/// Materialize a record's full member tree as a plain `Value`. The result
/// is always a `Value::Map` keyed by stable member index, with nested records recursing
/// into further `Value::Map`s and sequence/map members reified into
/// `Value::List`/`Value::Map` - there is no dedicated wire tag for "nested
/// record", so whole-replacement ops carry this shape instead and
/// `Record::assign_nested_from_value` is the inverse operation.
pub fn export_full(record: &dyn Record) -> Value {
    let mut entries = Vec::new();
    for info in record.members() {
        if info.policy.delta_skip {
            continue;
        }
        let key = ScalarValue::U32(info.stable_index);
        entries.push((key, export_member_value(record, info)));
    }
    Value::Map(entries)
}

/// Materialize a single member's current value, fully reifying nested
/// records/sequences/maps. Used both by `export_full`'s per-member walk and
/// by the diff engine when a member is compared as a single opaque value
/// (`delta_shallow`, `ShallowOpaque`, or a `WholeReplacement` sequence).
pub fn export_member_value(record: &dyn Record, info: &MemberInfo) -> Value {
    match info.kind {
        MemberKind::NestedRecord | MemberKind::Polymorphic => {
            match record.get_nested(info.stable_index) {
                Some(child) => export_full(child),
                None => Value::Null,
            }
        }
        MemberKind::Sequence => match record.get_sequence(info.stable_index) {
            Some(seq) => sequence_to_value(seq),
            None => Value::List(Vec::new()),
        },
        MemberKind::Map => match record.get_map(info.stable_index) {
            Some(map) => map_to_value(map),
            None => Value::Map(Vec::new()),
        },
        _ => record.get_scalar(info.stable_index).unwrap_or(Value::Null),
    }
}

/// Reify a sequence adapter's full contents as a `Value::List`, recursing
/// into nested-record elements.
pub fn sequence_to_value(seq: &dyn SequenceAdapter) -> Value {
    let mut items = Vec::with_capacity(seq.len());
    for i in 0..seq.len() {
        items.push(match seq.nested_at(i) {
            Some(child) => export_full(child),
            None => seq.at(i),
        });
    }
    Value::List(items)
}

/// Reify a map adapter's full contents as a `Value::Map`, recursing into
/// nested-record entries.
pub fn map_to_value(map: &dyn MapAdapter) -> Value {
    let mut pairs = Vec::new();
    for key in map.keys() {
        let value = match map.get_nested(&key) {
            Some(child) => export_full(child),
            None => map.get(&key).unwrap_or(Value::Null),
        };
        pairs.push((key, value));
    }
    Value::Map(pairs)
}

/// Reconstructs a brand-new root instance when `ReplaceObject` needs to swap
/// the root's concrete type (or materialize it from nothing). A real
/// deployment's code generator would emit one factory alongside each
/// `Record` implementation; this crate leaves instantiation to the caller
/// because, unlike member assignment, there's no existing instance to
/// delegate to.
pub trait RootFactory {
    /// Build a new boxed record from a fully materialized value snapshot (as
    /// produced by `export_full`), or `None` if the value doesn't describe a
    /// shape this factory knows how to build.
    fn materialize(&self, value: &Value) -> Option<Box<dyn Record>>;
}
