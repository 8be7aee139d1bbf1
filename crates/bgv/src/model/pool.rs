//! Constant pool payloads.
//!
//! These are the shared immutable values a producer interns in the stream's
//! constant pool. Composite payloads reference their parts through `Arc`, so
//! a class shared by a thousand node classes is stored once.

use std::fmt;
use std::sync::Arc;

use crate::limits::{
    POOL_CLASS, POOL_ENUM, POOL_FIELD, POOL_METHOD, POOL_NODE, POOL_NODE_CLASS,
    POOL_NODE_SOURCE_POSITION, POOL_SIGNATURE, POOL_STRING,
};

/// A Java-like class descriptor; an enum class carries its value names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Klass {
    pub name: String,
    pub simple_name: String,
    pub enum_values: Option<Vec<String>>,
}

impl Klass {
    /// Creates a plain class descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let simple_name = simple_name_of(&name).to_string();
        Self {
            name,
            simple_name,
            enum_values: None,
        }
    }

    /// Creates an enum class descriptor with the given value names.
    pub fn new_enum(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            enum_values: Some(values),
            ..Self::new(name)
        }
    }

    /// Returns true for enum classes.
    pub fn is_enum(&self) -> bool {
        self.enum_values.is_some()
    }
}

fn simple_name_of(name: &str) -> &str {
    let tail = name.rsplit('.').next().unwrap_or(name);
    tail.rsplit('$').next().unwrap_or(tail)
}

/// One constant of an enum class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub klass: Arc<Klass>,
    pub ordinal: i32,
}

impl EnumValue {
    /// Returns the constant's name, if the ordinal is within the class's values.
    pub fn name(&self) -> Option<&str> {
        let values = self.klass.enum_values.as_ref()?;
        usize::try_from(self.ordinal)
            .ok()
            .and_then(|i| values.get(i))
            .map(String::as_str)
    }
}

/// A method signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub return_type: String,
    pub arg_types: Vec<String>,
}

/// A compiled method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method {
    pub holder: Arc<Klass>,
    pub name: String,
    pub signature: Arc<Signature>,
    pub flags: i32,
    /// Raw bytecode; absent when the producer did not dump it.
    pub bytecode: Option<Vec<u8>>,
}

/// A field of a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub holder: Arc<Klass>,
    pub name: String,
    pub type_name: String,
    pub flags: i32,
}

/// A named edge slot of a node class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Port {
    pub name: String,
    pub is_list: bool,
}

impl Port {
    pub fn new(name: impl Into<String>, is_list: bool) -> Self {
        Self {
            name: name.into(),
            is_list,
        }
    }

    /// Edge label for the slot at `list_index` of this port.
    pub fn label(&self, list_index: Option<usize>) -> String {
        match list_index {
            Some(i) => format!("{}[{}]", self.name, i),
            None => self.name.clone(),
        }
    }
}

/// An input port tagged with its input type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedPort {
    pub port: Port,
    pub input_type: Option<EnumValue>,
}

impl TypedPort {
    pub fn new(port: Port, input_type: Option<EnumValue>) -> Self {
        Self { port, input_type }
    }
}

/// Shared metadata of every node instantiated from one class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeClass {
    pub klass: Arc<Klass>,
    pub name_template: String,
    pub inputs: Vec<TypedPort>,
    pub successors: Vec<Port>,
}

impl NodeClass {
    /// Display name used when the template is empty: the simple class name
    /// without a trailing `Node`.
    pub fn short_name(&self) -> &str {
        let simple = self.klass.simple_name.as_str();
        match simple.strip_suffix("Node") {
            Some(stripped) if !stripped.is_empty() => stripped,
            _ => simple,
        }
    }
}

/// One file location of a source position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub uri: String,
    pub line: i32,
    pub start: i32,
    pub end: i32,
}

/// Source position of a node, possibly inlined into a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub method: Arc<Method>,
    pub bci: i32,
    pub locations: Vec<Location>,
    pub caller: Option<Arc<SourcePosition>>,
}

/// A reference to a node of the enclosing graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub id: i32,
    pub node_class: Arc<NodeClass>,
}

/// Discriminant of [`PoolValue`], with its wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    String,
    Enum,
    Class,
    Method,
    NodeClass,
    Field,
    Signature,
    SourcePosition,
    Node,
}

impl PoolKind {
    /// Returns the kind's wire tag.
    pub fn tag(self) -> u8 {
        match self {
            PoolKind::String => POOL_STRING,
            PoolKind::Enum => POOL_ENUM,
            PoolKind::Class => POOL_CLASS,
            PoolKind::Method => POOL_METHOD,
            PoolKind::NodeClass => POOL_NODE_CLASS,
            PoolKind::Field => POOL_FIELD,
            PoolKind::Signature => POOL_SIGNATURE,
            PoolKind::SourcePosition => POOL_NODE_SOURCE_POSITION,
            PoolKind::Node => POOL_NODE,
        }
    }

    /// Creates a kind from its wire tag (`POOL_NEW` and `POOL_NULL` are not kinds).
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            POOL_STRING => Some(PoolKind::String),
            POOL_ENUM => Some(PoolKind::Enum),
            POOL_CLASS => Some(PoolKind::Class),
            POOL_METHOD => Some(PoolKind::Method),
            POOL_NODE_CLASS => Some(PoolKind::NodeClass),
            POOL_FIELD => Some(PoolKind::Field),
            POOL_SIGNATURE => Some(PoolKind::Signature),
            POOL_NODE_SOURCE_POSITION => Some(PoolKind::SourcePosition),
            POOL_NODE => Some(PoolKind::Node),
            _ => None,
        }
    }
}

/// A constant pool payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolValue {
    String(Arc<str>),
    Klass(Arc<Klass>),
    EnumValue(EnumValue),
    Method(Arc<Method>),
    Field(Arc<Field>),
    Signature(Arc<Signature>),
    NodeClass(Arc<NodeClass>),
    SourcePosition(Arc<SourcePosition>),
    NodeRef(NodeRef),
}

impl PoolValue {
    /// Returns the payload's kind.
    pub fn kind(&self) -> PoolKind {
        match self {
            PoolValue::String(_) => PoolKind::String,
            PoolValue::Klass(_) => PoolKind::Class,
            PoolValue::EnumValue(_) => PoolKind::Enum,
            PoolValue::Method(_) => PoolKind::Method,
            PoolValue::Field(_) => PoolKind::Field,
            PoolValue::Signature(_) => PoolKind::Signature,
            PoolValue::NodeClass(_) => PoolKind::NodeClass,
            PoolValue::SourcePosition(_) => PoolKind::SourcePosition,
            PoolValue::NodeRef(_) => PoolKind::Node,
        }
    }

    /// Creates a pooled string.
    pub fn string(s: &str) -> Self {
        PoolValue::String(Arc::from(s))
    }
}

impl fmt::Display for PoolValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolValue::String(s) => f.write_str(s),
            PoolValue::Klass(k) => f.write_str(&k.name),
            PoolValue::EnumValue(e) => match e.name() {
                Some(name) => f.write_str(name),
                None => write!(f, "{}#{}", e.klass.simple_name, e.ordinal),
            },
            PoolValue::Method(m) => write!(
                f,
                "{}.{}({})",
                m.holder.simple_name,
                m.name,
                m.signature.arg_types.join(", ")
            ),
            PoolValue::Field(field) => write!(f, "{}.{}", field.holder.simple_name, field.name),
            PoolValue::Signature(s) => write!(f, "({}){}", s.arg_types.join(", "), s.return_type),
            PoolValue::NodeClass(nc) => f.write_str(&nc.klass.name),
            PoolValue::SourcePosition(p) => write!(f, "{}@{}", p.method.name, p.bci),
            PoolValue::NodeRef(n) => write!(f, "{}|{}", n.id, n.node_class.short_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_name() {
        assert_eq!(Klass::new("org.graal.nodes.ConstantNode").simple_name, "ConstantNode");
        assert_eq!(Klass::new("a.Outer$Inner").simple_name, "Inner");
        assert_eq!(Klass::new("Plain").simple_name, "Plain");
    }

    #[test]
    fn test_enum_value_name() {
        let klass = Arc::new(Klass::new_enum("x.InputType", vec!["Value".into(), "Memory".into()]));
        let value = EnumValue { klass: klass.clone(), ordinal: 1 };
        assert_eq!(value.name(), Some("Memory"));
        assert_eq!(PoolValue::EnumValue(value).to_string(), "Memory");

        let out_of_range = EnumValue { klass, ordinal: 7 };
        assert_eq!(out_of_range.name(), None);
    }

    #[test]
    fn test_node_class_short_name() {
        let nc = NodeClass {
            klass: Arc::new(Klass::new("x.AddNode")),
            name_template: String::new(),
            inputs: vec![],
            successors: vec![],
        };
        assert_eq!(nc.short_name(), "Add");

        let bare = NodeClass {
            klass: Arc::new(Klass::new("x.Node")),
            ..nc
        };
        assert_eq!(bare.short_name(), "Node");
    }

    #[test]
    fn test_kind_tags() {
        for kind in [
            PoolKind::String,
            PoolKind::Enum,
            PoolKind::Class,
            PoolKind::Method,
            PoolKind::NodeClass,
            PoolKind::Field,
            PoolKind::Signature,
            PoolKind::SourcePosition,
            PoolKind::Node,
        ] {
            assert_eq!(PoolKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(PoolKind::from_tag(0x00), None);
        assert_eq!(PoolKind::from_tag(0x05), None);
    }

    #[test]
    fn test_port_label() {
        let port = Port::new("values", true);
        assert_eq!(port.label(Some(2)), "values[2]");
        assert_eq!(Port::new("x", false).label(None), "x");
    }
}
