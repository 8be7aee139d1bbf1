//! The seam between the wire decoder and an object model.
//!
//! The decoder drives a [`Builder`] with structural calls as it walks the
//! stream. [`ModelBuilder`] assembles the crate's own [`Document`] tree;
//! [`NullBuilder`] ignores everything and only counts, which is the fastest
//! way to validate a stream.

mod model_builder;

pub use model_builder::{GraphLocation, LoadReport, ModelBuilder};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::mpsc;

use uuid::Uuid;

use crate::codec::cursor::ContentDigest;
use crate::codec::pool::ConstantPool;
use crate::error::DecodeError;
use crate::limits::LEGACY_VERSION;
use crate::model::{Document, Graph, Group, Method, NodeClass, Properties, Value, Version};

/// Identity of one decode session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(Uuid);

impl StreamId {
    /// Creates a fresh random id.
    pub fn new() -> Self {
        StreamId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-fatal problem found while loading, with its folder path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadingError {
    pub message: String,
    /// Enclosing group names and graph titles, outermost first.
    pub context: Vec<String>,
}

impl fmt::Display for LoadingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.context.join(" / "), self.message)
        }
    }
}

// =============================================================================
// MODEL CONTROL
// =============================================================================

#[derive(Debug)]
struct ControlState {
    position: Cell<u64>,
    root_start: Cell<u64>,
    version: Cell<Version>,
    snapshots: Cell<bool>,
    snapshot: RefCell<Option<ConstantPool>>,
}

/// Read-only view of the decoder's progress, shared with its builder.
///
/// The decoder refreshes the position before every call that may start or
/// finish an entity, so a builder can record where things live in the stream
/// and later skip them with [`SkipRoot`](crate::error::SkipRoot).
#[derive(Debug, Clone)]
pub struct ModelControl {
    state: Rc<ControlState>,
}

impl ModelControl {
    pub fn new() -> Self {
        Self {
            state: Rc::new(ControlState {
                position: Cell::new(0),
                root_start: Cell::new(0),
                version: Cell::new(LEGACY_VERSION),
                snapshots: Cell::new(false),
                snapshot: RefCell::new(None),
            }),
        }
    }

    /// Absolute stream offset at the last synchronization point.
    pub fn position(&self) -> u64 {
        self.state.position.get()
    }

    /// Absolute stream offset of the current root item's first byte.
    pub fn root_start(&self) -> u64 {
        self.state.root_start.get()
    }

    /// Format version of the stream.
    pub fn version(&self) -> Version {
        self.state.version.get()
    }

    /// Asks the decoder to snapshot its constant pool at the end of every
    /// top-level graph.
    pub fn request_pool_snapshots(&self, enabled: bool) {
        self.state.snapshots.set(enabled);
    }

    pub fn wants_pool_snapshots(&self) -> bool {
        self.state.snapshots.get()
    }

    /// Takes the snapshot left by the decoder at the last graph end.
    pub fn take_pool_snapshot(&self) -> Option<ConstantPool> {
        self.state.snapshot.borrow_mut().take()
    }

    pub(crate) fn set_position(&self, position: u64) {
        self.state.position.set(position);
    }

    pub(crate) fn set_root_start(&self, position: u64) {
        self.state.root_start.set(position);
        self.state.position.set(position);
    }

    pub(crate) fn set_version(&self, version: Version) {
        self.state.version.set(version);
    }

    pub(crate) fn offer_pool_snapshot(&self, pool: &ConstantPool) {
        if self.wants_pool_snapshots() {
            *self.state.snapshot.borrow_mut() = Some(pool.clone());
        }
    }
}

impl Default for ModelControl {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// COLLABORATORS
// =============================================================================

/// Resolves the root document of a session.
///
/// Called at most once per session: with the first group's properties when a
/// group needs a parent, or with the stream properties when a document header
/// arrives first.
pub trait DocumentFactory {
    fn create_document(&mut self, stream: StreamId, properties: &Properties, first_group: Option<&Group>) -> Document;
}

impl<F> DocumentFactory for F
where
    F: FnMut(StreamId, &Properties, Option<&Group>) -> Document,
{
    fn create_document(&mut self, stream: StreamId, properties: &Properties, first_group: Option<&Group>) -> Document {
        self(stream, properties, first_group)
    }
}

/// Creates an empty document, adopting stream properties from a header.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDocumentFactory;

impl DocumentFactory for DefaultDocumentFactory {
    fn create_document(&mut self, _stream: StreamId, properties: &Properties, first_group: Option<&Group>) -> Document {
        match first_group {
            Some(_) => Document::new(),
            None => Document {
                properties: properties.clone(),
                groups: Vec::new(),
            },
        }
    }
}

/// Folder attachment notification.
///
/// Paths name the enclosing groups, outermost first, so applying an event
/// twice has no further effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderEvent {
    DocumentResolved { stream: StreamId },
    GroupOpened { parent: Vec<String>, name: String },
    GraphAdded { parent: Vec<String>, dump_id: i32, title: String },
    GroupClosed { path: Vec<String> },
}

/// Queue receiving folder events, possibly drained on another thread.
pub trait FolderSink {
    fn submit(&mut self, event: FolderEvent);
}

impl FolderSink for Vec<FolderEvent> {
    fn submit(&mut self, event: FolderEvent) {
        self.push(event);
    }
}

impl FolderSink for mpsc::Sender<FolderEvent> {
    fn submit(&mut self, event: FolderEvent) {
        // A dropped receiver only means nobody is watching anymore.
        let _ = self.send(event);
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Structural callbacks driven by the [`Decoder`](crate::codec::decoder::Decoder).
///
/// Calls arrive in stream order. Every `start_*` that returned `Ok` is matched
/// by its `end_*`, also when the decoder aborts on a fatal error. A `start_*`
/// may fail with [`DecodeError::SkipRoot`] to abandon the current root item;
/// the decoder then rewinds the builder with [`truncate_context`](Self::truncate_context)
/// to the depth it had when the root item began.
///
/// Properties stream in one at a time: [`set_property`](Self::set_property)
/// targets the group, graph or document header being opened,
/// [`set_node_property`](Self::set_node_property) the current node.
#[allow(unused_variables)]
pub trait Builder {
    fn set_model_control(&mut self, control: ModelControl) {}

    /// Pool to start decoding with, for sessions resumed mid-stream.
    fn constant_pool(&mut self) -> Option<ConstantPool> {
        None
    }

    /// Called before every root item.
    fn start_root(&mut self) {}

    fn start_document_header(&mut self) {}

    fn end_document_header(&mut self) -> Result<(), DecodeError> {
        Ok(())
    }

    fn start_group(&mut self) -> Result<(), DecodeError> {
        Ok(())
    }

    fn set_group_name(&mut self, name: &str, short_name: &str) {}

    fn set_method(&mut self, method: Option<Arc<Method>>, bci: i32) {}

    fn start_group_content(&mut self) -> Result<(), DecodeError> {
        Ok(())
    }

    fn end_group(&mut self) {}

    /// Opens a graph. Nested graphs arrive as `start_graph(-1, key, [])`
    /// right after [`start_nested_property`](Self::start_nested_property).
    fn start_graph(&mut self, dump_id: i32, format: &str, args: Vec<Value>) -> Result<(), DecodeError> {
        Ok(())
    }

    fn set_property(&mut self, key: &str, value: Value) {}

    fn start_graph_contents(&mut self) -> Result<(), DecodeError> {
        Ok(())
    }

    fn start_node(&mut self, id: i32, has_predecessors: bool, class: Arc<NodeClass>) -> Result<(), DecodeError> {
        Ok(())
    }

    fn set_node_property(&mut self, key: &str, value: Value) {}

    /// Announces that the next graph is the value of property `key`.
    fn start_nested_property(&mut self, key: &str) {}

    /// Edge from node `from` into input `port` of the current node.
    fn input_edge(&mut self, port: usize, list_index: Option<usize>, from: i32) {}

    /// Edge from successor `port` of the current node to node `to`.
    fn successor_edge(&mut self, port: usize, list_index: Option<usize>, to: i32) {}

    /// Called once the current node's edges are known.
    fn set_node_name(&mut self, class: &NodeClass) {}

    fn end_node(&mut self, id: i32) {}

    fn start_block(&mut self, id: i32) {}

    fn add_node_to_block(&mut self, node_id: i32) {}

    fn end_block(&mut self, id: i32) {}

    fn add_block_edge(&mut self, from: i32, to: i32) {}

    fn make_block_edges(&mut self) {}

    fn make_graph_edges(&mut self) {}

    /// Digest of the current top-level graph's node and block sections.
    fn graph_content_digest(&mut self, digest: ContentDigest) {}

    fn mark_graph_duplicate(&mut self) {}

    /// Closes the current graph, returning it if it was opened as a nested
    /// property value.
    fn end_graph(&mut self) -> Option<Graph> {
        None
    }

    fn report_loading_error(&mut self, message: &str, context: &[String]) {}

    fn context_depth(&self) -> usize {
        0
    }

    fn truncate_context(&mut self, depth: usize) {}
}

/// Builder that keeps nothing but counts.
#[derive(Debug, Clone, Default)]
pub struct NullBuilder {
    pub groups: usize,
    pub graphs: usize,
    pub nodes: usize,
    pub errors: Vec<String>,
}

impl NullBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Builder for NullBuilder {
    fn start_group(&mut self) -> Result<(), DecodeError> {
        self.groups += 1;
        Ok(())
    }

    fn start_graph(&mut self, _dump_id: i32, _format: &str, _args: Vec<Value>) -> Result<(), DecodeError> {
        self.graphs += 1;
        Ok(())
    }

    fn start_node(&mut self, _id: i32, _has_predecessors: bool, _class: Arc<NodeClass>) -> Result<(), DecodeError> {
        self.nodes += 1;
        Ok(())
    }

    fn report_loading_error(&mut self, message: &str, _context: &[String]) {
        self.errors.push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_factory() {
        let props = Properties::new().with("vm", "graal");
        let mut factory = DefaultDocumentFactory;

        let doc = factory.create_document(StreamId::new(), &props, None);
        assert_eq!(doc.properties, props);

        let group = Group::new("g", "g");
        let doc = factory.create_document(StreamId::new(), &props, Some(&group));
        assert!(doc.properties.is_empty());
    }

    #[test]
    fn test_closure_factory() {
        let mut calls = 0;
        let mut factory = |_: StreamId, props: &Properties, _: Option<&Group>| {
            calls += 1;
            Document {
                properties: props.clone(),
                groups: Vec::new(),
            }
        };
        let doc = factory.create_document(StreamId::new(), &Properties::new().with("a", 1), None);
        assert_eq!(doc.properties.get("a"), Some(&Value::Int(1)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_model_control_snapshots() {
        let control = ModelControl::new();
        let mut pool = ConstantPool::new();
        pool.add_pool_entry(0, crate::model::PoolValue::string("s"));

        control.offer_pool_snapshot(&pool);
        assert!(control.take_pool_snapshot().is_none());

        control.request_pool_snapshots(true);
        control.offer_pool_snapshot(&pool);
        let snapshot = control.take_pool_snapshot().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(control.take_pool_snapshot().is_none());
    }

    #[test]
    fn test_sender_sink() {
        let (mut tx, rx) = mpsc::channel();
        tx.submit(FolderEvent::GroupClosed { path: vec!["g".into()] });
        assert_eq!(rx.recv().unwrap(), FolderEvent::GroupClosed { path: vec!["g".into()] });

        drop(rx);
        tx.submit(FolderEvent::GroupClosed { path: vec![] });
    }

    #[test]
    fn test_loading_error_display() {
        let err = LoadingError {
            message: "dangling edge".into(),
            context: vec!["g".into(), "After parsing".into()],
        };
        assert_eq!(err.to_string(), "g / After parsing: dangling edge");
    }
}
