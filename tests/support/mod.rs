//! Hand-written `Record`/`SequenceAdapter`/`MapAdapter` fixtures, standing
//! in for a code generator's output (see `descriptor`'s module doc).
//!
//! `Order` mirrors the order-with-line-items shape used by the end-to-end
//! scenarios: a `String` id/status, a keyed-multiset sequence of `Line`s
//! paired by `sku`, and a string-to-string `props` map. Sequence/map
//! members are stored as adapter newtypes that own their backing
//! container directly, so `get_sequence`/`get_map` can hand out a plain
//! borrow instead of manufacturing a transient trait object.
//!
//! `SelfLoop` is a minimal fixture whose sole member recurses into itself -
//! a genuine shared-borrow cycle, used to exercise cycle termination
//! without needing `Rc`/`RefCell` storage (a shared borrow of `self`
//! already satisfies `get_nested`'s signature).

#![allow(dead_code)]

use once_cell::sync::Lazy;
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing-subscriber` fmt layer the first time it's called, so
/// `tracing::debug!` output (e.g. the cycle-reentry log in `engine::mod`)
/// is visible under `RUST_LOG` when running tests verbosely. Harmless to
/// call from every test - subsequent calls are no-ops.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

use structural_delta::descriptor::{
    MapAdapter, MemberInfo, MemberKind, MemberPolicy, Record, RootFactory, SequenceAdapter,
    SequencePolicy,
};
use structural_delta::dirty::{BitIndex, DirtyTracker};
use structural_delta::value::{ScalarValue, Value};

pub const ORDER_TYPE_ID: u64 = 1;
pub const LINE_TYPE_ID: u64 = 2;

pub const M_ID: u32 = 0;
pub const M_STATUS: u32 = 1;
pub const M_LINES: u32 = 2;
pub const M_PROPS: u32 = 3;

pub const M_SKU: u32 = 0;
pub const M_QTY: u32 = 1;

static ORDER_MEMBERS: Lazy<Vec<MemberInfo>> = Lazy::new(|| {
    vec![
        MemberInfo {
            stable_index: M_ID,
            name: "id",
            kind: MemberKind::String,
            policy: MemberPolicy::default(),
        },
        MemberInfo {
            stable_index: M_STATUS,
            name: "status",
            kind: MemberKind::String,
            policy: MemberPolicy::default(),
        },
        MemberInfo {
            stable_index: M_LINES,
            name: "lines",
            kind: MemberKind::Sequence,
            policy: MemberPolicy {
                sequence: SequencePolicy::KeyedMultiset {
                    key_members: vec!["sku"],
                },
                order_insensitive: true,
                ..MemberPolicy::default()
            },
        },
        MemberInfo {
            stable_index: M_PROPS,
            name: "props",
            kind: MemberKind::Map,
            policy: MemberPolicy::default(),
        },
    ]
});

static LINE_MEMBERS: Lazy<Vec<MemberInfo>> = Lazy::new(|| {
    vec![
        MemberInfo {
            stable_index: M_SKU,
            name: "sku",
            kind: MemberKind::String,
            policy: MemberPolicy::default(),
        },
        MemberInfo {
            stable_index: M_QTY,
            name: "qty",
            kind: MemberKind::Scalar,
            policy: MemberPolicy::default(),
        },
    ]
});

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub sku: String,
    pub qty: i32,
}

impl Line {
    pub fn new(sku: impl Into<String>, qty: i32) -> Self {
        Self { sku: sku.into(), qty }
    }
}

impl Record for Line {
    fn members(&self) -> &[MemberInfo] {
        &LINE_MEMBERS
    }

    fn runtime_type(&self) -> u64 {
        LINE_TYPE_ID
    }

    fn get_scalar(&self, index: u32) -> Option<Value> {
        match index {
            M_SKU => Some(Value::String(self.sku.clone())),
            M_QTY => Some(Value::I32(self.qty)),
            _ => None,
        }
    }

    fn set_scalar(&mut self, index: u32, value: Value) -> bool {
        match (index, value) {
            (M_SKU, Value::String(s)) => {
                self.sku = s;
                true
            }
            (M_QTY, Value::I32(v)) => {
                self.qty = v;
                true
            }
            _ => false,
        }
    }

    fn get_nested(&self, _index: u32) -> Option<&dyn Record> {
        None
    }

    fn get_nested_mut(&mut self, _index: u32) -> Option<&mut dyn Record> {
        None
    }

    fn set_nested(&mut self, _index: u32, _value: Option<Box<dyn Record>>) -> bool {
        false
    }

    fn assign_nested_from_value(&mut self, _index: u32, _value: &Value) -> bool {
        false
    }

    fn get_sequence(&self, _index: u32) -> Option<&dyn SequenceAdapter> {
        None
    }

    fn get_sequence_mut(&mut self, _index: u32) -> Option<&mut dyn SequenceAdapter> {
        None
    }

    fn get_map(&self, _index: u32) -> Option<&dyn MapAdapter> {
        None
    }

    fn get_map_mut(&mut self, _index: u32) -> Option<&mut dyn MapAdapter> {
        None
    }
}

/// Reconstruct a `Line` from the `Value::Map` shape `export_full` produces
/// for a nested record, for the whole-value paths (`ReplaceObject`,
/// `SetMember`, `SeqAddAt`/`SeqReplaceAt` on a keyed sequence).
fn line_from_value(value: &Value) -> Option<Line> {
    let Value::Map(entries) = value else {
        return None;
    };
    let mut sku = None;
    let mut qty = None;
    for (k, v) in entries {
        match (k, v) {
            (ScalarValue::U32(i), Value::String(s)) if *i == M_SKU => sku = Some(s.clone()),
            (ScalarValue::U32(i), Value::I32(n)) if *i == M_QTY => qty = Some(*n),
            _ => {}
        }
    }
    Some(Line {
        sku: sku?,
        qty: qty.unwrap_or_default(),
    })
}

/// Sequence adapter owning its backing `Vec<Line>` directly, paired by
/// `sku` (§4.4 keyed multiset).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinesAdapter(pub Vec<Line>);

impl SequenceAdapter for LinesAdapter {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn at(&self, i: usize) -> Value {
        self.0
            .get(i)
            .map(|l| Value::String(l.sku.clone()))
            .unwrap_or(Value::Null)
    }

    fn nested_at(&self, i: usize) -> Option<&dyn Record> {
        self.0.get(i).map(|l| l as &dyn Record)
    }

    fn nested_at_mut(&mut self, i: usize) -> Option<&mut dyn Record> {
        self.0.get_mut(i).map(|l| l as &mut dyn Record)
    }

    fn splice(&mut self, index: usize, removed: usize, inserted: Vec<Value>) {
        let index = index.min(self.0.len());
        let removed = removed.min(self.0.len().saturating_sub(index));
        let inserted: Vec<Line> = inserted.iter().filter_map(line_from_value).collect();
        self.0.splice(index..index + removed, inserted);
    }
}

/// Map adapter owning its backing string-to-string pairs directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropsAdapter(pub Vec<(String, String)>);

impl MapAdapter for PropsAdapter {
    fn keys(&self) -> Vec<ScalarValue> {
        self.0.iter().map(|(k, _)| ScalarValue::String(k.clone())).collect()
    }

    fn get(&self, key: &ScalarValue) -> Option<Value> {
        let ScalarValue::String(k) = key else { return None };
        self.0
            .iter()
            .find(|(ek, _)| ek == k)
            .map(|(_, v)| Value::String(v.clone()))
    }

    fn get_nested(&self, _key: &ScalarValue) -> Option<&dyn Record> {
        None
    }

    fn get_nested_mut(&mut self, _key: &ScalarValue) -> Option<&mut dyn Record> {
        None
    }

    fn set(&mut self, key: ScalarValue, value: Value) {
        let ScalarValue::String(k) = key else { return };
        let Value::String(v) = value else { return };
        match self.0.iter_mut().find(|(ek, _)| *ek == k) {
            Some(entry) => entry.1 = v,
            None => self.0.push((k, v)),
        }
    }

    fn remove(&mut self, key: &ScalarValue) -> bool {
        let ScalarValue::String(k) = key else { return false };
        let before = self.0.len();
        self.0.retain(|(ek, _)| ek != k);
        self.0.len() != before
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    pub id: String,
    pub status: String,
    pub lines: LinesAdapter,
    pub props: PropsAdapter,
}

impl Order {
    pub fn new(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            lines: LinesAdapter::default(),
            props: PropsAdapter::default(),
        }
    }

    pub fn with_lines(mut self, lines: Vec<Line>) -> Self {
        self.lines = LinesAdapter(lines);
        self
    }

    pub fn with_props(mut self, props: Vec<(&str, &str)>) -> Self {
        self.props = PropsAdapter(props.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect());
        self
    }
}

impl Record for Order {
    fn members(&self) -> &[MemberInfo] {
        &ORDER_MEMBERS
    }

    fn runtime_type(&self) -> u64 {
        ORDER_TYPE_ID
    }

    fn get_scalar(&self, index: u32) -> Option<Value> {
        match index {
            M_ID => Some(Value::String(self.id.clone())),
            M_STATUS => Some(Value::String(self.status.clone())),
            _ => None,
        }
    }

    fn set_scalar(&mut self, index: u32, value: Value) -> bool {
        match (index, value) {
            (M_ID, Value::String(s)) => {
                self.id = s;
                true
            }
            (M_STATUS, Value::String(s)) => {
                self.status = s;
                true
            }
            _ => false,
        }
    }

    fn get_nested(&self, _index: u32) -> Option<&dyn Record> {
        None
    }

    fn get_nested_mut(&mut self, _index: u32) -> Option<&mut dyn Record> {
        None
    }

    fn set_nested(&mut self, _index: u32, _value: Option<Box<dyn Record>>) -> bool {
        false
    }

    fn assign_nested_from_value(&mut self, _index: u32, _value: &Value) -> bool {
        false
    }

    fn get_sequence(&self, index: u32) -> Option<&dyn SequenceAdapter> {
        (index == M_LINES).then_some(&self.lines as &dyn SequenceAdapter)
    }

    fn get_sequence_mut(&mut self, index: u32) -> Option<&mut dyn SequenceAdapter> {
        (index == M_LINES).then_some(&mut self.lines as &mut dyn SequenceAdapter)
    }

    fn get_map(&self, index: u32) -> Option<&dyn MapAdapter> {
        (index == M_PROPS).then_some(&self.props as &dyn MapAdapter)
    }

    fn get_map_mut(&mut self, index: u32) -> Option<&mut dyn MapAdapter> {
        (index == M_PROPS).then_some(&mut self.props as &mut dyn MapAdapter)
    }
}

pub struct OrderFactory;

impl RootFactory for OrderFactory {
    fn materialize(&self, value: &Value) -> Option<Box<dyn Record>> {
        let Value::Map(entries) = value else {
            return None;
        };
        let mut order = Order::new("", "");
        for (k, v) in entries {
            let ScalarValue::U32(idx) = k else { continue };
            match (*idx, v) {
                (M_ID, Value::String(s)) => order.id = s.clone(),
                (M_STATUS, Value::String(s)) => order.status = s.clone(),
                (M_LINES, Value::List(items)) => {
                    order.lines = LinesAdapter(items.iter().filter_map(line_from_value).collect());
                }
                (M_PROPS, Value::Map(pairs)) => {
                    let mut props = Vec::new();
                    for (pk, pv) in pairs {
                        if let (ScalarValue::String(key), Value::String(val)) = (pk, pv) {
                            props.push((key.clone(), val.clone()));
                        }
                    }
                    order.props = PropsAdapter(props);
                }
                _ => {}
            }
        }
        Some(Box::new(order))
    }
}

pub const BATCH_TYPE_ID: u64 = 4;
pub const ITEM_TYPE_ID: u64 = 5;

pub const M_ITEMS: u32 = 0;
pub const M_X: u32 = 0;

static ITEM_MEMBERS: Lazy<Vec<MemberInfo>> = Lazy::new(|| {
    vec![MemberInfo {
        stable_index: M_X,
        name: "x",
        kind: MemberKind::Scalar,
        policy: MemberPolicy::default(),
    }]
});

/// A trivial nested-record element, used to exercise positional (rather
/// than keyed) sequences of nested records - `Line`/`LinesAdapter` above are
/// always paired by `sku`, which can't exercise `diff_sequence_positional`.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub x: i32,
}

impl Item {
    pub fn new(x: i32) -> Self {
        Self { x }
    }
}

impl Record for Item {
    fn members(&self) -> &[MemberInfo] {
        &ITEM_MEMBERS
    }

    fn runtime_type(&self) -> u64 {
        ITEM_TYPE_ID
    }

    fn get_scalar(&self, index: u32) -> Option<Value> {
        (index == M_X).then_some(Value::I32(self.x))
    }

    fn set_scalar(&mut self, index: u32, value: Value) -> bool {
        if let (M_X, Value::I32(v)) = (index, &value) {
            self.x = *v;
            true
        } else {
            false
        }
    }

    fn get_nested(&self, _index: u32) -> Option<&dyn Record> {
        None
    }

    fn get_nested_mut(&mut self, _index: u32) -> Option<&mut dyn Record> {
        None
    }

    fn set_nested(&mut self, _index: u32, _value: Option<Box<dyn Record>>) -> bool {
        false
    }

    fn assign_nested_from_value(&mut self, _index: u32, _value: &Value) -> bool {
        false
    }

    fn get_sequence(&self, _index: u32) -> Option<&dyn SequenceAdapter> {
        None
    }

    fn get_sequence_mut(&mut self, _index: u32) -> Option<&mut dyn SequenceAdapter> {
        None
    }

    fn get_map(&self, _index: u32) -> Option<&dyn MapAdapter> {
        None
    }

    fn get_map_mut(&mut self, _index: u32) -> Option<&mut dyn MapAdapter> {
        None
    }
}

fn item_from_value(value: &Value) -> Option<Item> {
    let Value::Map(entries) = value else {
        return None;
    };
    for (k, v) in entries {
        if let (ScalarValue::U32(i), Value::I32(n)) = (k, v) {
            if *i == M_X {
                return Some(Item { x: *n });
            }
        }
    }
    None
}

/// Sequence adapter owning its backing `Vec<Item>` directly, diffed
/// position-by-position (§4.4 positional).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemsAdapter(pub Vec<Item>);

impl SequenceAdapter for ItemsAdapter {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn at(&self, _i: usize) -> Value {
        // every element is a nested record; callers reach it via `nested_at`.
        Value::Null
    }

    fn nested_at(&self, i: usize) -> Option<&dyn Record> {
        self.0.get(i).map(|it| it as &dyn Record)
    }

    fn nested_at_mut(&mut self, i: usize) -> Option<&mut dyn Record> {
        self.0.get_mut(i).map(|it| it as &mut dyn Record)
    }

    fn splice(&mut self, index: usize, removed: usize, inserted: Vec<Value>) {
        let index = index.min(self.0.len());
        let removed = removed.min(self.0.len().saturating_sub(index));
        let inserted: Vec<Item> = inserted.iter().filter_map(item_from_value).collect();
        self.0.splice(index..index + removed, inserted);
    }
}

static BATCH_MEMBERS: Lazy<Vec<MemberInfo>> = Lazy::new(|| {
    vec![MemberInfo {
        stable_index: M_ITEMS,
        name: "items",
        kind: MemberKind::Sequence,
        policy: MemberPolicy {
            sequence: SequencePolicy::Positional,
            ..MemberPolicy::default()
        },
    }]
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub items: ItemsAdapter,
}

impl Batch {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items: ItemsAdapter(items) }
    }
}

impl Record for Batch {
    fn members(&self) -> &[MemberInfo] {
        &BATCH_MEMBERS
    }

    fn runtime_type(&self) -> u64 {
        BATCH_TYPE_ID
    }

    fn get_scalar(&self, _index: u32) -> Option<Value> {
        None
    }

    fn set_scalar(&mut self, _index: u32, _value: Value) -> bool {
        false
    }

    fn get_nested(&self, _index: u32) -> Option<&dyn Record> {
        None
    }

    fn get_nested_mut(&mut self, _index: u32) -> Option<&mut dyn Record> {
        None
    }

    fn set_nested(&mut self, _index: u32, _value: Option<Box<dyn Record>>) -> bool {
        false
    }

    fn assign_nested_from_value(&mut self, _index: u32, _value: &Value) -> bool {
        false
    }

    fn get_sequence(&self, index: u32) -> Option<&dyn SequenceAdapter> {
        (index == M_ITEMS).then_some(&self.items as &dyn SequenceAdapter)
    }

    fn get_sequence_mut(&mut self, index: u32) -> Option<&mut dyn SequenceAdapter> {
        (index == M_ITEMS).then_some(&mut self.items as &mut dyn SequenceAdapter)
    }

    fn get_map(&self, _index: u32) -> Option<&dyn MapAdapter> {
        None
    }

    fn get_map_mut(&mut self, _index: u32) -> Option<&mut dyn MapAdapter> {
        None
    }
}

pub struct BatchFactory;

impl RootFactory for BatchFactory {
    fn materialize(&self, value: &Value) -> Option<Box<dyn Record>> {
        let Value::Map(entries) = value else {
            return None;
        };
        let mut batch = Batch::default();
        for (k, v) in entries {
            if let (ScalarValue::U32(idx), Value::List(items)) = (k, v) {
                if *idx == M_ITEMS {
                    batch.items = ItemsAdapter(items.iter().filter_map(item_from_value).collect());
                }
            }
        }
        Some(Box::new(batch))
    }
}

/// A record whose sole `NestedRecord` member recurses into itself.
pub struct SelfLoop {
    pub value: i32,
}

static SELF_LOOP_MEMBERS: Lazy<Vec<MemberInfo>> = Lazy::new(|| {
    vec![
        MemberInfo {
            stable_index: 0,
            name: "value",
            kind: MemberKind::Scalar,
            policy: MemberPolicy::default(),
        },
        MemberInfo {
            stable_index: 1,
            name: "self_ref",
            kind: MemberKind::NestedRecord,
            policy: MemberPolicy::default(),
        },
    ]
});

impl Record for SelfLoop {
    fn members(&self) -> &[MemberInfo] {
        &SELF_LOOP_MEMBERS
    }

    fn runtime_type(&self) -> u64 {
        3
    }

    fn get_scalar(&self, index: u32) -> Option<Value> {
        (index == 0).then_some(Value::I32(self.value))
    }

    fn set_scalar(&mut self, index: u32, value: Value) -> bool {
        if let (0, Value::I32(v)) = (index, &value) {
            self.value = *v;
            true
        } else {
            false
        }
    }

    fn get_nested(&self, index: u32) -> Option<&dyn Record> {
        (index == 1).then_some(self as &dyn Record)
    }

    fn get_nested_mut(&mut self, _index: u32) -> Option<&mut dyn Record> {
        None
    }

    fn set_nested(&mut self, _index: u32, _value: Option<Box<dyn Record>>) -> bool {
        false
    }

    fn assign_nested_from_value(&mut self, _index: u32, _value: &Value) -> bool {
        false
    }

    fn get_sequence(&self, _index: u32) -> Option<&dyn SequenceAdapter> {
        None
    }

    fn get_sequence_mut(&mut self, _index: u32) -> Option<&mut dyn SequenceAdapter> {
        None
    }

    fn get_map(&self, _index: u32) -> Option<&dyn MapAdapter> {
        None
    }

    fn get_map_mut(&mut self, _index: u32) -> Option<&mut dyn MapAdapter> {
        None
    }
}

/// Wraps an `Order` with a single-threaded dirty bit per scalar member,
/// marking on every setter call regardless of whether the value actually
/// changed - exercising the engine's dirty fast path (§4.7) and its
/// validate-on-emit fallback.
pub struct DirtyOrder {
    pub order: Order,
    bits: BitIndex,
}

impl DirtyOrder {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            bits: BitIndex::new(ORDER_MEMBERS.len()),
        }
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.order.id = id.into();
        self.bits.mark(M_ID as usize);
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.order.status = status.into();
        self.bits.mark(M_STATUS as usize);
    }
}

impl Record for DirtyOrder {
    fn members(&self) -> &[MemberInfo] {
        self.order.members()
    }

    fn runtime_type(&self) -> u64 {
        self.order.runtime_type()
    }

    fn get_scalar(&self, index: u32) -> Option<Value> {
        self.order.get_scalar(index)
    }

    fn set_scalar(&mut self, index: u32, value: Value) -> bool {
        self.order.set_scalar(index, value)
    }

    fn get_nested(&self, index: u32) -> Option<&dyn Record> {
        self.order.get_nested(index)
    }

    fn get_nested_mut(&mut self, index: u32) -> Option<&mut dyn Record> {
        self.order.get_nested_mut(index)
    }

    fn set_nested(&mut self, index: u32, value: Option<Box<dyn Record>>) -> bool {
        self.order.set_nested(index, value)
    }

    fn assign_nested_from_value(&mut self, index: u32, value: &Value) -> bool {
        self.order.assign_nested_from_value(index, value)
    }

    fn get_sequence(&self, index: u32) -> Option<&dyn SequenceAdapter> {
        self.order.get_sequence(index)
    }

    fn get_sequence_mut(&mut self, index: u32) -> Option<&mut dyn SequenceAdapter> {
        self.order.get_sequence_mut(index)
    }

    fn get_map(&self, index: u32) -> Option<&dyn MapAdapter> {
        self.order.get_map(index)
    }

    fn get_map_mut(&mut self, index: u32) -> Option<&mut dyn MapAdapter> {
        self.order.get_map_mut(index)
    }

    fn dirty_tracker(&self) -> Option<&dyn DirtyTracker> {
        Some(&self.bits)
    }

    fn dirty_tracker_mut(&mut self) -> Option<&mut dyn DirtyTracker> {
        Some(&mut self.bits)
    }
}
