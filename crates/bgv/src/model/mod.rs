//! Data model types for BGV.
//!
//! This module contains the types the codec reads and writes:
//! - Constant pool payloads (classes, methods, node classes, ...)
//! - Property values and ordered property bags
//! - The folder tree (document, groups, graphs, nodes, edges, blocks)
//! - Name templates for derived node names and graph titles

pub mod graph;
pub mod pool;
pub mod template;
pub mod value;
pub mod version;

pub use graph::{Block, Document, Edge, EdgeKind, Graph, Group, GroupElement, Node};
pub use pool::{
    EnumValue, Field, Klass, Location, Method, NodeClass, NodeRef, PoolKind, PoolValue, Port,
    Signature, SourcePosition, TypedPort,
};
pub use template::{format_title, node_name};
pub use value::{EntityKind, Properties, Value};
pub use version::Version;
