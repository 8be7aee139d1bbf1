//! The folder tree: documents, groups, graphs, nodes, edges and blocks.

use std::sync::Arc;

use crate::model::template::format_title;
use crate::model::value::{DUPLICATE_PROPERTY, GRAPH_TYPE_PROPERTY, NAME_PROPERTY};
use crate::model::{EntityKind, EnumValue, Method, NodeClass, Properties, Value};

/// The root of a decoded stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub properties: Properties,
    pub groups: Vec<Group>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates every top-level graph of every group, depth-first.
    pub fn graphs(&self) -> impl Iterator<Item = &Graph> {
        let mut out = Vec::new();
        for group in &self.groups {
            group.collect_graphs(&mut out);
        }
        out.into_iter()
    }

    /// Removes every property the decoder synthesizes, recursively.
    pub fn strip_derived(&mut self) {
        self.properties.strip_derived(EntityKind::Document);
        for group in &mut self.groups {
            group.strip_derived();
        }
    }
}

/// A folder of graphs and nested groups, optionally tagged with a method.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    pub short_name: String,
    pub method: Option<Arc<Method>>,
    pub bci: i32,
    pub properties: Properties,
    pub elements: Vec<GroupElement>,
}

/// A child of a group, kept in stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupElement {
    Group(Group),
    Graph(Graph),
}

impl Group {
    pub fn new(name: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short_name: short_name.into(),
            method: None,
            bci: -1,
            properties: Properties::new(),
            elements: Vec::new(),
        }
    }

    /// Direct child graphs, in stream order.
    pub fn graphs(&self) -> impl Iterator<Item = &Graph> {
        self.elements.iter().filter_map(|e| match e {
            GroupElement::Graph(g) => Some(g),
            GroupElement::Group(_) => None,
        })
    }

    /// Direct child groups, in stream order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.elements.iter().filter_map(|e| match e {
            GroupElement::Group(g) => Some(g),
            GroupElement::Graph(_) => None,
        })
    }

    fn collect_graphs<'a>(&'a self, out: &mut Vec<&'a Graph>) {
        for element in &self.elements {
            match element {
                GroupElement::Graph(g) => out.push(g),
                GroupElement::Group(g) => g.collect_graphs(out),
            }
        }
    }

    fn strip_derived(&mut self) {
        self.properties.strip_derived(EntityKind::Group);
        for element in &mut self.elements {
            match element {
                GroupElement::Graph(g) => g.strip_derived(),
                GroupElement::Group(g) => g.strip_derived(),
            }
        }
    }
}

/// One data-flow graph.
#[derive(Debug, Clone)]
pub struct Graph {
    /// Producer's dump id; `-1` for graphs nested in a property.
    pub dump_id: i32,
    pub format: String,
    pub args: Vec<Value>,
    pub properties: Properties,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub blocks: Vec<Block>,
}

impl Graph {
    pub fn new(dump_id: i32, format: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            dump_id,
            format: format.into(),
            args,
            properties: Properties::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Display title: the derived `name` property, else the formatted header.
    pub fn title(&self) -> String {
        match self.properties.get_str(NAME_PROPERTY) {
            Some(name) => name.to_string(),
            None => format_title(&self.format, &self.args),
        }
    }

    /// Declared graph type; duplicates are only detected within one type.
    pub fn graph_type(&self) -> &str {
        self.properties.get_str(GRAPH_TYPE_PROPERTY).unwrap_or("")
    }

    /// Returns true if the decoder found this graph's content repeated.
    pub fn is_duplicate(&self) -> bool {
        matches!(self.properties.get(DUPLICATE_PROPERTY), Some(Value::Bool(true)))
    }

    pub fn node(&self, id: i32) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Adds an input edge `from -> to` through input port `port` of `to`'s class.
    ///
    /// Returns false if `to` is unknown or has no such port.
    pub fn connect_input(&mut self, from: i32, to: i32, port: usize, list_index: Option<usize>) -> bool {
        let edge = self
            .node(to)
            .and_then(|n| Edge::input(&n.node_class, port, list_index, from, to));
        self.push_edge(edge)
    }

    /// Adds a successor edge `from -> to` through successor port `port` of `from`'s class.
    pub fn connect_successor(&mut self, from: i32, to: i32, port: usize, list_index: Option<usize>) -> bool {
        let edge = self
            .node(from)
            .and_then(|n| Edge::successor(&n.node_class, port, list_index, from, to));
        self.push_edge(edge)
    }

    fn push_edge(&mut self, edge: Option<Edge>) -> bool {
        match edge {
            Some(edge) => {
                self.edges.push(edge);
                true
            }
            None => false,
        }
    }

    pub(crate) fn strip_derived(&mut self) {
        self.properties.strip_derived(EntityKind::Graph);
        for node in &mut self.nodes {
            node.properties.strip_derived(EntityKind::Node);
        }
    }
}

impl PartialEq for Graph {
    /// Structural equality; edge order does not matter.
    fn eq(&self, other: &Self) -> bool {
        if self.dump_id != other.dump_id
            || self.format != other.format
            || self.args != other.args
            || self.properties != other.properties
            || self.nodes != other.nodes
            || self.blocks != other.blocks
            || self.edges.len() != other.edges.len()
        {
            return false;
        }
        let mut unmatched: Vec<&Edge> = other.edges.iter().collect();
        self.edges.iter().all(|edge| {
            match unmatched.iter().position(|candidate| *candidate == edge) {
                Some(pos) => {
                    unmatched.swap_remove(pos);
                    true
                }
                None => false,
            }
        })
    }
}

/// A node of a graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: i32,
    pub node_class: Arc<NodeClass>,
    pub has_predecessors: bool,
    pub properties: Properties,
}

impl Node {
    pub fn new(id: i32, node_class: Arc<NodeClass>) -> Self {
        Self {
            id,
            node_class,
            has_predecessors: false,
            properties: Properties::new(),
        }
    }

    /// Graphs attached to this node as property values.
    pub fn subgraphs(&self) -> impl Iterator<Item = (&str, &Graph)> {
        self.properties
            .iter()
            .filter_map(|(k, v)| v.as_graph().map(|g| (k, g)))
    }

    /// Derived display name, if the decoder assigned one.
    pub fn name(&self) -> Option<&str> {
        self.properties.get_str(NAME_PROPERTY)
    }
}

/// Direction class of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Data/usage edge, declared on the consuming node.
    Input,
    /// Control-flow edge, declared on the producing node.
    Successor,
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub from: i32,
    pub to: i32,
    /// Successor port ordinal on `from` (successor edges), else 0.
    pub from_index: usize,
    /// Input port ordinal on `to` (input edges), else 0.
    pub to_index: usize,
    pub label: String,
    pub type_tag: Option<EnumValue>,
    pub kind: EdgeKind,
    /// Position within a list port.
    pub list_index: Option<usize>,
    /// Set when an endpoint was missing from the graph.
    pub dangling: bool,
}

impl Edge {
    /// Input edge through input port `port` of `class` (the class of `to`).
    pub fn input(class: &NodeClass, port: usize, list_index: Option<usize>, from: i32, to: i32) -> Option<Self> {
        let typed = class.inputs.get(port)?;
        Some(Self {
            from,
            to,
            from_index: 0,
            to_index: port,
            label: typed.port.label(list_index),
            type_tag: typed.input_type.clone(),
            kind: EdgeKind::Input,
            list_index,
            dangling: false,
        })
    }

    /// Successor edge through successor port `port` of `class` (the class of `from`).
    pub fn successor(class: &NodeClass, port: usize, list_index: Option<usize>, from: i32, to: i32) -> Option<Self> {
        let p = class.successors.get(port)?;
        Some(Self {
            from,
            to,
            from_index: port,
            to_index: 0,
            label: p.label(list_index),
            type_tag: None,
            kind: EdgeKind::Successor,
            list_index,
            dangling: false,
        })
    }

    /// Port ordinal on the node that declares this edge.
    pub fn port(&self) -> usize {
        match self.kind {
            EdgeKind::Input => self.to_index,
            EdgeKind::Successor => self.from_index,
        }
    }
}

/// A basic block: a named set of nodes with successor blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: i32,
    pub name: String,
    pub nodes: Vec<i32>,
    pub successors: Vec<i32>,
}

impl Block {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            name: id.to_string(),
            nodes: Vec::new(),
            successors: Vec::new(),
        }
    }
}
