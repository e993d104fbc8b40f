//! Shared writer/reader state: the string and type interning tables and the
//! type fingerprint.

use std::collections::HashMap;

use crate::descriptor::MemberInfo;

/// Interning tables and table-usage flags threaded through a single
/// `write` call. Tables are built in first-seen order during the collection
/// pass.
#[derive(Debug, Default)]
pub struct WriteCtx {
    pub string_table: Vec<String>,
    string_index: HashMap<String, u32>,
    pub type_table: Vec<u64>,
    type_index: HashMap<u64, u32>,
    pub use_string_table: bool,
    pub use_type_table: bool,
    pub enum_identity: bool,
}

impl WriteCtx {
    pub fn new(use_string_table: bool, use_type_table: bool, enum_identity: bool) -> Self {
        Self {
            string_table: Vec::new(),
            string_index: HashMap::new(),
            type_table: Vec::new(),
            type_index: HashMap::new(),
            use_string_table,
            use_type_table,
            enum_identity,
        }
    }

    /// Register `s` in the string table if not already present.
    pub fn intern_string(&mut self, s: &str) {
        if self.string_index.contains_key(s) {
            return;
        }
        let idx = self.string_table.len() as u32;
        self.string_table.push(s.to_string());
        self.string_index.insert(s.to_string(), idx);
    }

    pub fn string_index_of(&self, s: &str) -> Option<u32> {
        self.string_index.get(s).copied()
    }

    /// Register `id` in the type table if not already present.
    pub fn intern_type(&mut self, id: u64) {
        if self.type_index.contains_key(&id) {
            return;
        }
        let idx = self.type_table.len() as u32;
        self.type_table.push(id);
        self.type_index.insert(id, idx);
    }

    pub fn type_index_of(&self, id: u64) -> Option<u32> {
        self.type_index.get(&id).copied()
    }
}

/// Tables reconstructed from a headered stream before decoding ops.
#[derive(Debug, Default)]
pub struct ReadCtx {
    pub string_table: Vec<String>,
    pub type_table: Vec<u64>,
}

/// Hash the stable shape of a type's member table - `(stable_index, kind)`
/// pairs, in order, never names - into an 8-byte advisory fingerprint.
/// Never an integrity mechanism: equality is never required for decoding to
/// proceed.
pub fn type_fingerprint(members: &[MemberInfo]) -> [u8; 8] {
    let mut hasher = blake3::Hasher::new();
    for m in members {
        hasher.update(&m.stable_index.to_le_bytes());
        hasher.update(&[m.kind as u8]);
    }
    let hash = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash.as_bytes()[..8]);
    out
}
