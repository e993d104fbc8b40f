//! The value model (C1) - a tagged union of wire-representable values.
//!
//! `Value` is the in-memory representation the engine, applicator, and codec
//! all share. It is intentionally a plain owned enum rather than a
//! zero-copy borrowing view: diff output is built from live record members
//! as often as it is decoded off the wire, and the two need a common shape.
//! The codec's job (see `codec::value_codec`) is to move between this enum
//! and the tagged wire bytes; it's where the zero-copy-parsing idiom lives.

use std::collections::HashMap;

use uuid::Uuid;

/// Wire tag discriminator, one byte, stable across versions.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTag {
    /// Absence of a value.
    Null = 0,
    /// `i8`.
    I8 = 1,
    /// `i16`.
    I16 = 2,
    /// `i32`.
    I32 = 3,
    /// `i64`.
    I64 = 4,
    /// `u8`.
    U8 = 5,
    /// `u16`.
    U16 = 6,
    /// `u32`.
    U32 = 7,
    /// `u64`.
    U64 = 8,
    /// `bool`.
    Bool = 9,
    /// UTF-16 code unit.
    Char = 10,
    /// `f32`.
    Float32 = 11,
    /// `f64`.
    Float64 = 12,
    /// 128-bit decimal.
    Decimal = 13,
    /// 16-byte GUID.
    Guid = 14,
    /// Inline (non-interned) UTF-8 string.
    InlineString = 15,
    /// Reference into the string interning table.
    InternedStringRef = 16,
    /// Date-time with kind.
    DateTime = 17,
    /// Date-time with UTC offset.
    DateTimeOffset = 18,
    /// Time span, 100ns ticks.
    TimeSpan = 19,
    /// Raw byte blob.
    Bytes = 20,
    /// Enum carrying its originating type identity.
    EnumWithIdentity = 21,
    /// Enum degraded to its underlying primitive only.
    EnumPrimitive = 22,
    /// Homogeneous object array.
    ObjectArray = 23,
    /// Ordered list.
    List = 24,
    /// Map from scalar key to value.
    Map = 25,
}

impl ValueTag {
    /// Decode a tag byte, if it names a known variant.
    pub fn from_u8(byte: u8) -> Option<Self> {
        use ValueTag::*;
        Some(match byte {
            0 => Null,
            1 => I8,
            2 => I16,
            3 => I32,
            4 => I64,
            5 => U8,
            6 => U16,
            7 => U32,
            8 => U64,
            9 => Bool,
            10 => Char,
            11 => Float32,
            12 => Float64,
            13 => Decimal,
            14 => Guid,
            15 => InlineString,
            16 => InternedStringRef,
            17 => DateTime,
            18 => DateTimeOffset,
            19 => TimeSpan,
            20 => Bytes,
            21 => EnumWithIdentity,
            22 => EnumPrimitive,
            23 => ObjectArray,
            24 => List,
            25 => Map,
            _ => return None,
        })
    }
}

/// A 128-bit decimal: `{ scale <= 28, sign, 96-bit magnitude }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal128 {
    /// Number of digits after the decimal point, at most 28.
    scale: u8,
    /// Sign: `true` for negative.
    negative: bool,
    /// Unsigned 96-bit magnitude, stored in the low 96 bits of a `u128`.
    magnitude: u128,
}

/// Maximum supported decimal scale.
pub const DECIMAL_MAX_SCALE: u8 = 28;
/// Maximum supported decimal magnitude (2^96 - 1).
pub const DECIMAL_MAX_MAGNITUDE: u128 = (1u128 << 96) - 1;

impl Decimal128 {
    /// Construct a decimal, validating scale and magnitude bounds.
    pub fn new(scale: u8, negative: bool, magnitude: u128) -> Option<Self> {
        if scale > DECIMAL_MAX_SCALE || magnitude > DECIMAL_MAX_MAGNITUDE {
            return None;
        }
        Some(Self {
            scale,
            negative,
            magnitude,
        })
    }

    /// Scale (digits after the decimal point).
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Sign.
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Unsigned 96-bit magnitude.
    pub fn magnitude(&self) -> u128 {
        self.magnitude
    }
}

/// Date-time "kind", distinguishing unspecified/UTC/local the way a
/// `DateTimeKind`-bearing host type would.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeKind {
    /// Kind not specified.
    Unspecified,
    /// UTC.
    Utc,
    /// Local to an unspecified timezone.
    Local,
}

/// A scalar value, restricted to the variants that are legal as a map key.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// `i8`.
    I8(i8),
    /// `i16`.
    I16(i16),
    /// `i32`.
    I32(i32),
    /// `i64`.
    I64(i64),
    /// `u8`.
    U8(u8),
    /// `u16`.
    U16(u16),
    /// `u32`.
    U32(u32),
    /// `u64`.
    U64(u64),
    /// `bool`.
    Bool(bool),
    /// UTF-16 code unit.
    Char(u16),
    /// UTF-8 string.
    String(String),
    /// GUID.
    Guid(Uuid),
}

impl std::hash::Hash for ScalarValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        use ScalarValue::*;
        match self {
            I8(v) => (0u8, *v as i64).hash(state),
            I16(v) => (1u8, *v as i64).hash(state),
            I32(v) => (2u8, *v as i64).hash(state),
            I64(v) => (3u8, *v).hash(state),
            U8(v) => (4u8, *v as u64).hash(state),
            U16(v) => (5u8, *v as u64).hash(state),
            U32(v) => (6u8, *v as u64).hash(state),
            U64(v) => (7u8, *v).hash(state),
            Bool(v) => (8u8, *v).hash(state),
            Char(v) => (9u8, *v).hash(state),
            String(v) => (10u8, v).hash(state),
            Guid(v) => (11u8, v.as_bytes()).hash(state),
        }
    }
}

impl Eq for ScalarValue {}

impl From<ScalarValue> for Value {
    fn from(s: ScalarValue) -> Self {
        match s {
            ScalarValue::I8(v) => Value::I8(v),
            ScalarValue::I16(v) => Value::I16(v),
            ScalarValue::I32(v) => Value::I32(v),
            ScalarValue::I64(v) => Value::I64(v),
            ScalarValue::U8(v) => Value::U8(v),
            ScalarValue::U16(v) => Value::U16(v),
            ScalarValue::U32(v) => Value::U32(v),
            ScalarValue::U64(v) => Value::U64(v),
            ScalarValue::Bool(v) => Value::Bool(v),
            ScalarValue::Char(v) => Value::Char(v),
            ScalarValue::String(v) => Value::String(v),
            ScalarValue::Guid(v) => Value::Guid(v),
        }
    }
}

impl TryFrom<Value> for ScalarValue {
    type Error = Value;

    /// Narrow a `Value` down to the scalar variants legal as a map key.
    /// Fails (returning the original value) for any container/compound
    /// variant.
    fn try_from(v: Value) -> Result<Self, Value> {
        match v {
            Value::I8(x) => Ok(ScalarValue::I8(x)),
            Value::I16(x) => Ok(ScalarValue::I16(x)),
            Value::I32(x) => Ok(ScalarValue::I32(x)),
            Value::I64(x) => Ok(ScalarValue::I64(x)),
            Value::U8(x) => Ok(ScalarValue::U8(x)),
            Value::U16(x) => Ok(ScalarValue::U16(x)),
            Value::U32(x) => Ok(ScalarValue::U32(x)),
            Value::U64(x) => Ok(ScalarValue::U64(x)),
            Value::Bool(x) => Ok(ScalarValue::Bool(x)),
            Value::Char(x) => Ok(ScalarValue::Char(x)),
            Value::String(x) => Ok(ScalarValue::String(x)),
            Value::Guid(x) => Ok(ScalarValue::Guid(x)),
            other => Err(other),
        }
    }
}

/// Enum payload: an underlying integer plus an optional originating type
/// identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    /// The underlying integer value.
    pub underlying: i64,
    /// Stable identifier of the originating enum type, when identity is
    /// carried. `None` means identity is disabled and the decoder will not
    /// be able to reconstruct the exact runtime type.
    pub type_id: Option<u64>,
}

/// The value model's top-level tagged union.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// `i8`.
    I8(i8),
    /// `i16`.
    I16(i16),
    /// `i32`.
    I32(i32),
    /// `i64`.
    I64(i64),
    /// `u8`.
    U8(u8),
    /// `u16`.
    U16(u16),
    /// `u32`.
    U32(u32),
    /// `u64`.
    U64(u64),
    /// `bool`.
    Bool(bool),
    /// UTF-16 code unit.
    Char(u16),
    /// `f32`.
    Float32(f32),
    /// `f64`.
    Float64(f64),
    /// 128-bit decimal.
    Decimal(Decimal128),
    /// UTF-8 string.
    String(String),
    /// 16-byte GUID.
    Guid(Uuid),
    /// Date-time with kind, as ticks since an epoch meaningful to the host.
    DateTime {
        /// Ticks (100ns units) since the host's reference epoch.
        ticks: i64,
        /// Kind of date-time.
        kind: DateTimeKind,
    },
    /// Date-time with a UTC offset, in minutes.
    DateTimeOffset {
        /// Ticks (100ns units) since the host's reference epoch.
        ticks: i64,
        /// Offset from UTC, in minutes.
        offset_minutes: i16,
    },
    /// Time span as 100ns ticks.
    TimeSpan(i64),
    /// Raw byte blob.
    Bytes(Vec<u8>),
    /// Homogeneous object array (whole-replacement container).
    ObjectArray(Vec<Value>),
    /// Ordered list, preserving iteration order.
    List(Vec<Value>),
    /// Map from a scalar key to a value.
    Map(Vec<(ScalarValue, Value)>),
    /// Enum value, with optional type identity.
    Enum(EnumValue),
}

impl Value {
    /// The wire tag this value encodes as, absent interning decisions (the
    /// codec picks `InternedStringRef`/`EnumWithIdentity` vs. the inline
    /// forms based on options and table membership, not on the value
    /// itself).
    pub fn tag(&self) -> ValueTag {
        match self {
            Value::Null => ValueTag::Null,
            Value::I8(_) => ValueTag::I8,
            Value::I16(_) => ValueTag::I16,
            Value::I32(_) => ValueTag::I32,
            Value::I64(_) => ValueTag::I64,
            Value::U8(_) => ValueTag::U8,
            Value::U16(_) => ValueTag::U16,
            Value::U32(_) => ValueTag::U32,
            Value::U64(_) => ValueTag::U64,
            Value::Bool(_) => ValueTag::Bool,
            Value::Char(_) => ValueTag::Char,
            Value::Float32(_) => ValueTag::Float32,
            Value::Float64(_) => ValueTag::Float64,
            Value::Decimal(_) => ValueTag::Decimal,
            Value::String(_) => ValueTag::InlineString,
            Value::Guid(_) => ValueTag::Guid,
            Value::DateTime { .. } => ValueTag::DateTime,
            Value::DateTimeOffset { .. } => ValueTag::DateTimeOffset,
            Value::TimeSpan(_) => ValueTag::TimeSpan,
            Value::Bytes(_) => ValueTag::Bytes,
            Value::ObjectArray(_) => ValueTag::ObjectArray,
            Value::List(_) => ValueTag::List,
            Value::Map(_) => ValueTag::Map,
            Value::Enum(e) => {
                if e.type_id.is_some() {
                    ValueTag::EnumWithIdentity
                } else {
                    ValueTag::EnumPrimitive
                }
            }
        }
    }

    /// Whether this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Build a `Value::Map` from a `HashMap`, for callers that don't need to
/// preserve a particular key order (the wire format doesn't promise one for
/// maps, only for lists).
pub fn map_from_hashmap(map: HashMap<ScalarValue, Value>) -> Value {
    Value::Map(map.into_iter().collect())
}
