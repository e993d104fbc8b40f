//! The delta document: an ordered operation stream describing mutations to
//! a target graph, plus the writer/reader that append to and enumerate it.

use crate::value::{ScalarValue, Value};

/// A stable, append-only member identifier assigned once per record member
/// at type-definition time. Removed members' indices are never reused by a
/// well-behaved descriptor.
pub type MemberIndex = u32;

/// One mutation in a delta document.
///
/// Only the fields meaningful for a given `kind` are populated; the rest
/// carry the type's default and are ignored by both the applicator and the
/// codec.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Replace the root object wholesale. `None` replaces it with a logical
    /// null. Never empty - this variant is never omitted by nested
    /// suppression.
    ReplaceObject(Option<Value>),

    /// Assign a scalar/string/enum/shallow member, or replace a whole
    /// read-only container member.
    SetMember {
        /// Member being assigned.
        member_index: MemberIndex,
        /// New value.
        value: Value,
    },

    /// Recurse into a nested record member; non-empty by construction
    /// (nested suppression happens before this variant is built).
    NestedMember {
        /// Member being recursed into.
        member_index: MemberIndex,
        /// Subdocument describing the nested mutation.
        nested: Document,
    },

    /// Insert an element into a sequence member at a position.
    SeqAddAt {
        /// Sequence member.
        member_index: MemberIndex,
        /// Insertion index.
        index: u32,
        /// Element to insert.
        value: Value,
    },

    /// Replace the element at a position in a sequence member.
    SeqReplaceAt {
        /// Sequence member.
        member_index: MemberIndex,
        /// Index to replace.
        index: u32,
        /// New element value.
        value: Value,
    },

    /// Remove the element at a position in a sequence member.
    SeqRemoveAt {
        /// Sequence member.
        member_index: MemberIndex,
        /// Index to remove.
        index: u32,
        /// Advisory: the element that was expected to be there. Not
        /// consulted by the default applicator.
        expected: Option<Value>,
    },

    /// Recurse into the nested record at a sequence position.
    SeqNestedAt {
        /// Sequence member.
        member_index: MemberIndex,
        /// Index of the element recursed into.
        index: u32,
        /// Subdocument describing the nested mutation.
        nested: Document,
    },

    /// Set (insert or overwrite) a map entry.
    DictSet {
        /// Map member.
        member_index: MemberIndex,
        /// Entry key.
        key: ScalarValue,
        /// Entry value.
        value: Value,
    },

    /// Remove a map entry.
    DictRemove {
        /// Map member.
        member_index: MemberIndex,
        /// Entry key.
        key: ScalarValue,
    },

    /// Recurse into the nested record at a map entry.
    DictNested {
        /// Map member.
        member_index: MemberIndex,
        /// Entry key.
        key: ScalarValue,
        /// Subdocument describing the nested mutation.
        nested: Document,
    },
}

/// A discriminant-only view of an operation's kind, used by the codec and
/// by callers that want to branch on kind without matching the full payload.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// See `Operation::ReplaceObject`.
    ReplaceObject = 0,
    /// See `Operation::SetMember`.
    SetMember = 1,
    /// See `Operation::NestedMember`.
    NestedMember = 2,
    /// See `Operation::SeqAddAt`.
    SeqAddAt = 3,
    /// See `Operation::SeqReplaceAt`.
    SeqReplaceAt = 4,
    /// See `Operation::SeqRemoveAt`.
    SeqRemoveAt = 5,
    /// See `Operation::SeqNestedAt`.
    SeqNestedAt = 6,
    /// See `Operation::DictSet`.
    DictSet = 7,
    /// See `Operation::DictRemove`.
    DictRemove = 8,
    /// See `Operation::DictNested`.
    DictNested = 9,
}

impl OpKind {
    /// Decode a kind byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        use OpKind::*;
        Some(match byte {
            0 => ReplaceObject,
            1 => SetMember,
            2 => NestedMember,
            3 => SeqAddAt,
            4 => SeqReplaceAt,
            5 => SeqRemoveAt,
            6 => SeqNestedAt,
            7 => DictSet,
            8 => DictRemove,
            9 => DictNested,
            _ => return None,
        })
    }
}

impl Operation {
    /// This operation's kind discriminant.
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::ReplaceObject(_) => OpKind::ReplaceObject,
            Operation::SetMember { .. } => OpKind::SetMember,
            Operation::NestedMember { .. } => OpKind::NestedMember,
            Operation::SeqAddAt { .. } => OpKind::SeqAddAt,
            Operation::SeqReplaceAt { .. } => OpKind::SeqReplaceAt,
            Operation::SeqRemoveAt { .. } => OpKind::SeqRemoveAt,
            Operation::SeqNestedAt { .. } => OpKind::SeqNestedAt,
            Operation::DictSet { .. } => OpKind::DictSet,
            Operation::DictRemove { .. } => OpKind::DictRemove,
            Operation::DictNested { .. } => OpKind::DictNested,
        }
    }

    /// The member this operation targets, if any (`ReplaceObject` targets
    /// none - it replaces the root).
    pub fn member_index(&self) -> Option<MemberIndex> {
        match self {
            Operation::ReplaceObject(_) => None,
            Operation::SetMember { member_index, .. }
            | Operation::NestedMember { member_index, .. }
            | Operation::SeqAddAt { member_index, .. }
            | Operation::SeqReplaceAt { member_index, .. }
            | Operation::SeqRemoveAt { member_index, .. }
            | Operation::SeqNestedAt { member_index, .. }
            | Operation::DictSet { member_index, .. }
            | Operation::DictRemove { member_index, .. }
            | Operation::DictNested { member_index, .. } => Some(*member_index),
        }
    }
}

/// An ordered, immutable-once-observed sequence of operations.
///
/// Documents are built via `Writer` and consumed via `Reader`; once either
/// has touched a document it should be treated as frozen (concurrent reads
/// of a frozen document are always safe).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    ops: Vec<Operation>,
}

impl Document {
    /// An empty document.
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// A document is empty iff it has zero operations.
    /// `ReplaceObject` is never empty because it is always constructed as
    /// the document's sole or first operation.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of top-level operations (does not count nested ops).
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Borrow the operations in insertion order.
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Consume the document, yielding its operations in insertion order.
    pub fn into_operations(self) -> Vec<Operation> {
        self.ops
    }

    /// Build a document directly from a vector of operations (used by the
    /// codec reader).
    pub fn from_operations(ops: Vec<Operation>) -> Self {
        Self { ops }
    }
}

/// Appends operations to a document. Appends are O(1) amortised.
#[derive(Debug, Default)]
pub struct Writer {
    doc: Document,
}

impl Writer {
    /// A writer over a fresh, empty document.
    pub fn new() -> Self {
        Self {
            doc: Document::new(),
        }
    }

    /// Finish writing and hand back the built document.
    pub fn finish(self) -> Document {
        self.doc
    }

    /// Whether nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.doc.is_empty()
    }

    /// Append `ReplaceObject`.
    pub fn replace_object(&mut self, value: Option<Value>) -> &mut Self {
        self.doc.ops.push(Operation::ReplaceObject(value));
        self
    }

    /// Append `SetMember`.
    pub fn set_member(&mut self, member_index: MemberIndex, value: Value) -> &mut Self {
        self.doc
            .ops
            .push(Operation::SetMember { member_index, value });
        self
    }

    /// Append `NestedMember`.
    pub fn nested_member(&mut self, member_index: MemberIndex, nested: Document) -> &mut Self {
        self.doc.ops.push(Operation::NestedMember {
            member_index,
            nested,
        });
        self
    }

    /// Append `SeqAddAt`.
    pub fn seq_add_at(&mut self, member_index: MemberIndex, index: u32, value: Value) -> &mut Self {
        self.doc.ops.push(Operation::SeqAddAt {
            member_index,
            index,
            value,
        });
        self
    }

    /// Append `SeqReplaceAt`.
    pub fn seq_replace_at(
        &mut self,
        member_index: MemberIndex,
        index: u32,
        value: Value,
    ) -> &mut Self {
        self.doc.ops.push(Operation::SeqReplaceAt {
            member_index,
            index,
            value,
        });
        self
    }

    /// Append `SeqRemoveAt`.
    pub fn seq_remove_at(
        &mut self,
        member_index: MemberIndex,
        index: u32,
        expected: Option<Value>,
    ) -> &mut Self {
        self.doc.ops.push(Operation::SeqRemoveAt {
            member_index,
            index,
            expected,
        });
        self
    }

    /// Append `SeqNestedAt`.
    pub fn seq_nested_at(
        &mut self,
        member_index: MemberIndex,
        index: u32,
        nested: Document,
    ) -> &mut Self {
        self.doc.ops.push(Operation::SeqNestedAt {
            member_index,
            index,
            nested,
        });
        self
    }

    /// Append `DictSet`.
    pub fn dict_set(&mut self, member_index: MemberIndex, key: ScalarValue, value: Value) -> &mut Self {
        self.doc.ops.push(Operation::DictSet {
            member_index,
            key,
            value,
        });
        self
    }

    /// Append `DictRemove`.
    pub fn dict_remove(&mut self, member_index: MemberIndex, key: ScalarValue) -> &mut Self {
        self.doc
            .ops
            .push(Operation::DictRemove { member_index, key });
        self
    }

    /// Append `DictNested`.
    pub fn dict_nested(
        &mut self,
        member_index: MemberIndex,
        key: ScalarValue,
        nested: Document,
    ) -> &mut Self {
        self.doc.ops.push(Operation::DictNested {
            member_index,
            key,
            nested,
        });
        self
    }
}

/// Enumerates a document's operations in insertion order. Partial
/// enumeration never mutates the document - this is a thin wrapper over a
/// slice iterator, kept as its own type so call sites read as a reader/writer
/// pairing rather than raw slice indexing.
pub struct Reader<'a> {
    ops: std::slice::Iter<'a, Operation>,
}

impl<'a> Reader<'a> {
    /// Build a reader over a document's operations.
    pub fn new(doc: &'a Document) -> Self {
        Self {
            ops: doc.ops.iter(),
        }
    }
}

impl<'a> Iterator for Reader<'a> {
    type Item = &'a Operation;

    fn next(&mut self) -> Option<Self::Item> {
        self.ops.next()
    }
}
