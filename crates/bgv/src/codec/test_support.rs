//! Fixtures shared by the codec tests.

use std::sync::Arc;

use crate::codec::decoder::decode_document;
use crate::codec::encoder::{EncodeOptions, encode_document};
use crate::model::*;

pub fn input_type(ordinal: i32) -> EnumValue {
    EnumValue {
        klass: Arc::new(Klass::new_enum(
            "demo.InputType",
            vec!["Value".to_string(), "Association".to_string()],
        )),
        ordinal,
    }
}

/// `Start`: no inputs, one `next` successor.
pub fn start_class() -> Arc<NodeClass> {
    Arc::new(NodeClass {
        klass: Arc::new(Klass::new("demo.nodes.StartNode")),
        name_template: "Start".to_string(),
        inputs: Vec::new(),
        successors: vec![Port::new("next", false)],
    })
}

/// `Add`: two value inputs `x` and `y`.
pub fn add_class() -> Arc<NodeClass> {
    Arc::new(NodeClass {
        klass: Arc::new(Klass::new("demo.nodes.AddNode")),
        name_template: "+".to_string(),
        inputs: vec![
            TypedPort::new(Port::new("x", false), Some(input_type(0))),
            TypedPort::new(Port::new("y", false), Some(input_type(0))),
        ],
        successors: Vec::new(),
    })
}

/// `Phi`: one list input `values`.
pub fn phi_class() -> Arc<NodeClass> {
    Arc::new(NodeClass {
        klass: Arc::new(Klass::new("demo.nodes.PhiNode")),
        name_template: "Phi({i#values})".to_string(),
        inputs: vec![TypedPort::new(Port::new("values", true), Some(input_type(1)))],
        successors: Vec::new(),
    })
}

pub fn sample_method() -> Arc<Method> {
    Arc::new(Method {
        holder: Arc::new(Klass::new("demo.Main")),
        name: "run".to_string(),
        signature: Arc::new(Signature {
            return_type: "int".to_string(),
            arg_types: vec!["int".to_string(), "int".to_string()],
        }),
        flags: 9,
        bytecode: Some(vec![0x1a, 0x1b, 0x60, 0xac]),
    })
}

pub fn sample_position(method: &Arc<Method>) -> PoolValue {
    let caller = SourcePosition {
        method: method.clone(),
        bci: 4,
        locations: Vec::new(),
        caller: None,
    };
    PoolValue::SourcePosition(Arc::new(SourcePosition {
        method: method.clone(),
        bci: 2,
        locations: vec![Location {
            uri: "file:///demo/Main.java".to_string(),
            line: 12,
            start: -1,
            end: -1,
        }],
        caller: Some(Arc::new(caller)),
    }))
}

/// A three node graph: `Start -> Add(x, y)` and `Phi[Add, Start]`, in two blocks.
pub fn sample_graph(dump_id: i32, title: &str) -> Graph {
    let method = sample_method();
    let mut graph = Graph::new(dump_id, "%s", vec![Value::from(title)]);
    graph.properties.set("k_long", 1i64 << 40);
    graph.properties.set("k_float", Value::Float(0.5));
    graph.properties.set("k_off", false);
    graph.properties.set("k_doubles", Value::DoubleArray(vec![1.5, -2.0]));
    graph.properties.set(
        "k_pooled",
        Value::PoolArray(vec![
            Some(PoolValue::string("a")),
            None,
            Some(PoolValue::Klass(Arc::new(Klass::new("demo.Other")))),
        ]),
    );
    graph.properties.set("k_mode", Value::Pooled(PoolValue::EnumValue(input_type(1))));

    let mut start = Node::new(0, start_class());
    start.properties.set("k_ints", Value::IntArray(vec![1, 2, 3]));
    let mut add = Node::new(1, add_class());
    add.has_predecessors = true;
    add.properties.set("k_value", 7);
    add.properties.set("k_position", Value::Pooled(sample_position(&method)));
    add.properties.set(
        "k_field",
        Value::Pooled(PoolValue::Field(Arc::new(Field {
            holder: method.holder.clone(),
            name: "counter".to_string(),
            type_name: "int".to_string(),
            flags: 2,
        }))),
    );
    let mut phi = Node::new(2, phi_class());
    phi.properties.set(
        "k_ref",
        Value::Pooled(PoolValue::NodeRef(NodeRef {
            id: 0,
            node_class: start_class(),
        })),
    );
    phi.properties.set("k_body", Value::Graph(Box::new(nested_graph("k_body"))));
    phi.properties.set("k_nothing", Value::Null);
    graph.nodes = vec![start, add, phi];

    assert!(graph.connect_successor(0, 1, 0, None));
    assert!(graph.connect_input(0, 1, 0, None));
    assert!(graph.connect_input(0, 1, 1, None));
    assert!(graph.connect_input(1, 2, 0, Some(0)));
    assert!(graph.connect_input(0, 2, 0, Some(1)));

    let mut entry = Block::new(0);
    entry.nodes = vec![0, 1];
    entry.successors = vec![1];
    let mut exit = Block::new(1);
    exit.nodes = vec![2];
    graph.blocks = vec![entry, exit];
    graph
}

/// A graph held by property `key`.
pub fn nested_graph(key: &str) -> Graph {
    let mut graph = Graph::new(-1, key, Vec::new());
    graph.properties.set("k_inner", true);
    graph.nodes.push(Node::new(0, start_class()));
    graph
}

/// Group `demo.Main.run` with two graphs and a sub-group holding a third.
pub fn sample_document() -> Document {
    let mut document = Document::new();
    document.properties.set("k_vm", "demo");

    let mut root = Group::new("demo.Main.run", "run");
    root.method = Some(sample_method());
    root.bci = 0;
    root.properties.set("k_compiler", "opt");
    root.elements.push(GroupElement::Graph(sample_graph(0, "After parsing")));
    root.elements.push(GroupElement::Graph(sample_graph(1, "After inlining")));

    let mut inner = Group::new("inlined", "inl");
    inner.elements.push(GroupElement::Graph(sample_graph(2, "Inlined")));
    root.elements.push(GroupElement::Group(inner));

    document.groups.push(root);
    document
}

/// Encodes, decodes and strips derived properties.
pub fn round_trip(document: &Document, options: EncodeOptions) -> Document {
    let bytes = encode_document(document, options).unwrap();
    let report = decode_document(bytes.as_slice());
    assert!(report.failure.is_none(), "{:?}", report.failure);
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    let mut decoded = report.document;
    decoded.strip_derived();
    decoded
}

/// Number of non-overlapping occurrences of `needle` in `haystack`.
pub fn occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}
