//! Property values and ordered property bags.

use std::fmt;

use lazy_static::lazy_static;
use rustc_hash::FxHashSet;

use crate::model::{Graph, PoolValue};

/// Key of the derived display name of nodes, graphs and groups.
pub const NAME_PROPERTY: &str = "name";
/// Key of the derived short name of groups.
pub const SHORT_NAME_PROPERTY: &str = "shortName";
/// Key set on nodes with at least one predecessor.
pub const HAS_PREDECESSOR_PROPERTY: &str = "hasPredecessor";
/// Key set on graphs whose content digest repeats an earlier sibling's.
pub const DUPLICATE_PROPERTY: &str = "duplicate";
/// Key of the declared graph type used to scope duplicate detection.
pub const GRAPH_TYPE_PROPERTY: &str = "type";

lazy_static! {
    static ref NODE_DERIVED: FxHashSet<&'static str> =
        [NAME_PROPERTY, HAS_PREDECESSOR_PROPERTY].into_iter().collect();
    static ref GRAPH_DERIVED: FxHashSet<&'static str> =
        [NAME_PROPERTY, DUPLICATE_PROPERTY].into_iter().collect();
    static ref GROUP_DERIVED: FxHashSet<&'static str> =
        [NAME_PROPERTY, SHORT_NAME_PROPERTY].into_iter().collect();
}

/// The kind of entity a property bag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Document,
    Group,
    Graph,
    Node,
}

impl EntityKind {
    /// Returns true if the builder synthesizes `key` for this kind of entity,
    /// so it is never written to the wire.
    pub fn is_derived(self, key: &str) -> bool {
        match self {
            EntityKind::Document => false,
            EntityKind::Group => GROUP_DERIVED.contains(key),
            EntityKind::Graph => GRAPH_DERIVED.contains(key),
            EntityKind::Node => NODE_DERIVED.contains(key),
        }
    }
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    String(String),
    Pooled(PoolValue),
    IntArray(Vec<i32>),
    DoubleArray(Vec<f64>),
    PoolArray(Vec<Option<PoolValue>>),
    Graph(Box<Graph>),
}

impl Value {
    /// Returns the string content of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Pooled(PoolValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns the nested graph of a subgraph value.
    pub fn as_graph(&self) -> Option<&Graph> {
        match self {
            Value::Graph(g) => Some(g),
            _ => None,
        }
    }
}

impl From<PoolValue> for Value {
    fn from(value: PoolValue) -> Self {
        match value {
            PoolValue::String(s) => Value::String(s.to_string()),
            other => Value::Pooled(other),
        }
    }
}

impl From<Option<PoolValue>> for Value {
    fn from(value: Option<PoolValue>) -> Self {
        value.map_or(Value::Null, Value::from)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    f.write_str("]")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
            Value::Pooled(p) => write!(f, "{}", p),
            Value::IntArray(items) => write_list(f, items),
            Value::DoubleArray(items) => write_list(f, items),
            Value::PoolArray(items) => {
                let shown: Vec<String> = items
                    .iter()
                    .map(|item| item.as_ref().map_or_else(|| "null".to_string(), |p| p.to_string()))
                    .collect();
                write_list(f, &shown)
            }
            Value::Graph(g) => f.write_str(&g.title()),
        }
    }
}

/// An ordered, string-keyed property bag.
///
/// Insertion order is kept for display; equality ignores it.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: Vec<(String, Value)>,
}

impl Properties {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing an existing value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns the string content of `key`, if it holds a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the entries that are written to the wire for an entity of `kind`.
    pub fn persistent(&self, kind: EntityKind) -> impl Iterator<Item = (&str, &Value)> {
        self.iter().filter(move |(k, _)| !kind.is_derived(k))
    }

    /// Drops every derived entry for an entity of `kind`, and those of any
    /// graph held as a value.
    pub fn strip_derived(&mut self, kind: EntityKind) {
        self.entries.retain(|(k, _)| !kind.is_derived(k));
        for value in self.values_mut() {
            if let Value::Graph(g) = value {
                g.strip_derived();
            }
        }
    }

    /// Mutable access to every value, in insertion order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.entries.iter_mut().map(|(_, v)| v)
    }
}

impl PartialEq for Properties {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}
