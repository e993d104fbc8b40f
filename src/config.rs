//! Configuration for the structural delta engine.
//!
//! Bundles the comparison options the diff engine consults (§4.4), the
//! binary codec's safety caps (§4.8), and the dirty-tracking validate-on-emit
//! toggle (§4.7) into one struct that can either be built programmatically
//! or loaded from TOML.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How strings are compared during a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringComparison {
    /// Byte-for-byte comparison.
    Ordinal,
    /// ASCII case-insensitive comparison.
    OrdinalIgnoreCase,
}

impl Default for StringComparison {
    fn default() -> Self {
        StringComparison::Ordinal
    }
}

/// Comparison options consulted by the diff engine (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompareOptions {
    /// String comparator used for `Value::String` and map string keys.
    pub string_comparison: StringComparison,
    /// Whether `NaN == NaN` is treated as equal.
    pub nan_equality: bool,
    /// Maximum absolute difference below which two `f32`s are equal.
    pub float_epsilon: f32,
    /// Maximum absolute difference below which two `f64`s are equal.
    pub double_epsilon: f64,
    /// Maximum absolute difference below which two decimals are equal,
    /// expressed in units of the smaller side's scale.
    pub decimal_epsilon: f64,
    /// Default order-insensitivity for sequence members that don't declare
    /// their own policy (root default; per-member policy always wins).
    pub order_insensitive_default: bool,
    /// Recursion budget for nested records/sequences/maps; also the
    /// engine-side half of the nesting depth cap (the codec enforces its
    /// own independent cap on decode, see `Limits::max_nesting`).
    pub recursion_budget: u32,
    /// Enable cycle tracking (visited left/right address pairs).
    pub track_cycles: bool,
    /// Dirty-tracking validate-on-emit policy (§4.7), consulted when the
    /// right-hand side exposes a dirty tracker.
    pub dirty: DirtyPolicy,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            string_comparison: StringComparison::Ordinal,
            nan_equality: false,
            float_epsilon: 0.0,
            double_epsilon: 0.0,
            decimal_epsilon: 0.0,
            order_insensitive_default: false,
            recursion_budget: 256,
            track_cycles: true,
            dirty: DirtyPolicy::default(),
        }
    }
}

/// Safety caps enforced while decoding the binary wire format (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum total operations across all nested levels.
    pub max_ops: usize,
    /// Maximum nesting depth of subdocuments.
    pub max_nesting: usize,
    /// Maximum length in bytes of any single string.
    pub max_string_bytes: usize,
    /// Maximum length of any list, object array, map, or byte blob.
    pub max_list_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_ops: 1_000_000,
            max_nesting: 256,
            max_string_bytes: 64 * 1024 * 1024,
            max_list_len: 4 * 1024 * 1024,
        }
    }
}

/// Dirty-tracking policy consulted by the engine when a descriptor exposes
/// dirty-bit hooks (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtyPolicy {
    /// When set, the engine still enumerates candidate members from popped
    /// dirty bits but confirms each with a full deep-equality check before
    /// emitting, suppressing false positives and falling back to a full
    /// walk for members whose bits were never marked.
    pub validate_on_emit: bool,
}

impl Default for DirtyPolicy {
    fn default() -> Self {
        Self {
            validate_on_emit: false,
        }
    }
}

/// Applicator policy for out-of-range sequence indices (§4.6, §9 Open
/// Question (a)). The source shows both behaviours; this crate defaults to
/// the no-op policy and lets strict callers opt in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutOfRangePolicy {
    /// Ignore sequence ops whose index is out of range (default).
    Ignore,
    /// Return `ApplyError::OutOfRange` instead.
    Strict,
}

impl Default for OutOfRangePolicy {
    fn default() -> Self {
        OutOfRangePolicy::Ignore
    }
}

/// Top-level options bundle threaded through diff, apply, and codec calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Diff engine comparison options.
    pub compare: CompareOptions,
    /// Codec decode safety caps.
    pub limits: Limits,
    /// Applicator out-of-range policy.
    pub out_of_range: OutOfRangePolicy,
    /// Whether the codec writes/expects a headered frame (§4.8).
    pub headered: bool,
    /// Whether the codec writes/expects a string interning table.
    pub string_table: bool,
    /// Whether the codec writes/expects a type interning table.
    pub type_table: bool,
    /// Whether enum values retain their originating type identity on the
    /// wire (§3.3, §4.8 flag bit 2).
    pub enum_identity: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            compare: CompareOptions::default(),
            limits: Limits::default(),
            out_of_range: OutOfRangePolicy::default(),
            headered: true,
            string_table: true,
            type_table: true,
            enum_identity: true,
        }
    }
}

impl Options {
    /// Parse options from a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(e.to_string()))
    }

    /// Serialize options to a TOML document.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Options with headered framing and all interning tables disabled -
    /// the bare operation stream described in §4.8.
    pub fn headerless() -> Self {
        Self {
            headered: false,
            string_table: false,
            type_table: false,
            ..Default::default()
        }
    }
}
