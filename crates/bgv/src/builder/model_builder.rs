//! Incremental builder assembling a [`Document`] tree.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::builder::{
    Builder, DefaultDocumentFactory, DocumentFactory, FolderEvent, FolderSink, LoadingError,
    ModelControl, StreamId,
};
use crate::codec::cursor::ContentDigest;
use crate::codec::pool::ConstantPool;
use crate::error::{DecodeError, SkipRoot};
use crate::model::value::{
    DUPLICATE_PROPERTY, HAS_PREDECESSOR_PROPERTY, NAME_PROPERTY, SHORT_NAME_PROPERTY,
};
use crate::model::{
    Block, Document, Edge, EdgeKind, Graph, Group, GroupElement, Method, Node, NodeClass,
    Properties, Value, node_name,
};

/// Where a top-level graph lives in a stream.
#[derive(Debug, Clone)]
pub struct GraphLocation {
    pub dump_id: i32,
    /// Offset of the graph's `BEGIN_GRAPH` op-code.
    pub root_start: u64,
    /// Offset of the first byte after the graph.
    pub end: u64,
    /// Pool state after the graph, needed to resume decoding at `end`.
    pub pool: Option<ConstantPool>,
}

/// Outcome of a load: the document (partial if decoding failed) and every
/// problem found on the way.
#[derive(Debug)]
pub struct LoadReport {
    pub stream: StreamId,
    pub document: Document,
    pub errors: Vec<LoadingError>,
    pub locations: Vec<GraphLocation>,
    /// The fatal error that ended decoding early.
    pub failure: Option<DecodeError>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

type DigestScope = FxHashMap<String, ContentDigest>;

enum Frame {
    Header(Properties),
    Folder(FolderFrame),
    /// Boundary of a graph held in a property.
    Nested,
    Graph(GraphFrame),
    Node(NodeFrame),
}

struct FolderFrame {
    group: Group,
    /// Set once the header is complete and children may arrive.
    content: bool,
    digests: DigestScope,
}

struct GraphFrame {
    graph: Graph,
    nested: bool,
    root_start: u64,
    edges: Vec<PendingEdge>,
    block: Option<Block>,
    block_edges: Vec<(i32, i32)>,
}

struct NodeFrame {
    node: Node,
    edges: Vec<PendingEdge>,
}

/// An edge waiting for the graph's node set to be complete.
struct PendingEdge {
    kind: EdgeKind,
    /// Class of the declaring node.
    class: Arc<NodeClass>,
    port: usize,
    list_index: Option<usize>,
    from: i32,
    to: i32,
}

impl PendingEdge {
    fn resolve(&self) -> Option<Edge> {
        match self.kind {
            EdgeKind::Input => Edge::input(&self.class, self.port, self.list_index, self.from, self.to),
            EdgeKind::Successor => Edge::successor(&self.class, self.port, self.list_index, self.from, self.to),
        }
    }
}

/// The default [`Builder`]: assembles groups, graphs and nodes into a
/// [`Document`], marks duplicate graphs and collects loading errors.
pub struct ModelBuilder {
    stream: StreamId,
    control: ModelControl,
    factory: Box<dyn DocumentFactory>,
    sink: Option<Box<dyn FolderSink>>,
    document: Option<Document>,
    frames: Vec<Frame>,
    root_digests: DigestScope,
    /// Index in `document.groups` of the group holding graphs outside any group.
    loose_group: Option<usize>,
    errors: Vec<LoadingError>,
    index_locations: bool,
    locations: Vec<GraphLocation>,
    headers_only: FxHashMap<u64, GraphLocation>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self {
            stream: StreamId::new(),
            control: ModelControl::new(),
            factory: Box::new(DefaultDocumentFactory),
            sink: None,
            document: None,
            frames: Vec::new(),
            root_digests: DigestScope::default(),
            loose_group: None,
            errors: Vec::new(),
            index_locations: false,
            locations: Vec::new(),
            headers_only: FxHashMap::default(),
        }
    }

    /// Resolves the root document through `factory`.
    pub fn with_factory(mut self, factory: impl DocumentFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    /// Loads into an existing document; the factory is never consulted.
    pub fn with_document(mut self, document: Document) -> Self {
        self.document = Some(document);
        self
    }

    /// Reports folder structure to `sink` as it is built.
    pub fn with_sink(mut self, sink: impl FolderSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Records a [`GraphLocation`] with a pool snapshot for every top-level graph.
    pub fn with_location_index(mut self) -> Self {
        self.index_locations = true;
        self
    }

    /// Loads only the header and properties of the graphs at `locations`,
    /// skipping their nodes and blocks.
    pub fn with_headers_only(mut self, locations: impl IntoIterator<Item = GraphLocation>) -> Self {
        self.headers_only
            .extend(locations.into_iter().map(|l| (l.root_start, l)));
        self
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream
    }

    pub fn errors(&self) -> &[LoadingError] {
        &self.errors
    }

    /// Closes whatever is still open and returns the result.
    pub fn finish(mut self) -> LoadReport {
        while let Some(frame) = self.frames.last() {
            match frame {
                Frame::Node(n) => {
                    let id = n.node.id;
                    self.end_node(id);
                }
                Frame::Graph(_) => {
                    self.make_block_edges();
                    self.make_graph_edges();
                    self.end_graph();
                }
                Frame::Folder(_) => self.end_group(),
                Frame::Nested | Frame::Header(_) => {
                    self.frames.pop();
                }
            }
        }
        LoadReport {
            stream: self.stream,
            document: self.document.take().unwrap_or_default(),
            errors: self.errors,
            locations: self.locations,
            failure: None,
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn emit(&mut self, event: FolderEvent) {
        if let Some(sink) = &mut self.sink {
            sink.submit(event);
        }
    }

    fn folder_path(&self) -> Vec<String> {
        self.frames
            .iter()
            .filter_map(|f| match f {
                Frame::Folder(folder) => Some(folder.group.name.clone()),
                _ => None,
            })
            .collect()
    }

    fn context_path(&self) -> Vec<String> {
        self.frames
            .iter()
            .filter_map(|f| match f {
                Frame::Folder(folder) => Some(folder.group.name.clone()),
                Frame::Graph(g) => Some(g.graph.title()),
                _ => None,
            })
            .collect()
    }

    fn resolve_document(&mut self, properties: &Properties, first_group: Option<&Group>) {
        if self.document.is_some() {
            return;
        }
        let document = self.factory.create_document(self.stream, properties, first_group);
        debug!(stream = %self.stream, "document resolved");
        self.document = Some(document);
        self.emit(FolderEvent::DocumentResolved { stream: self.stream });
    }

    fn current_graph(&mut self) -> Option<&mut GraphFrame> {
        match self.frames.last_mut() {
            Some(Frame::Graph(g)) => Some(g),
            _ => None,
        }
    }

    fn current_node(&mut self) -> Option<&mut NodeFrame> {
        match self.frames.last_mut() {
            Some(Frame::Node(n)) => Some(n),
            _ => None,
        }
    }

    /// Digest scope enclosing the current graph.
    fn current_scope(&mut self) -> &mut DigestScope {
        for frame in self.frames.iter_mut().rev() {
            match frame {
                Frame::Folder(f) if f.content => return &mut f.digests,
                _ => {}
            }
        }
        &mut self.root_digests
    }

    fn report_all(&mut self, problems: Vec<String>) {
        for problem in problems {
            self.report_loading_error(&problem, &[]);
        }
    }

    fn attach_graph(&mut self, graph: Graph) {
        let parent = self.folder_path();
        self.emit(FolderEvent::GraphAdded {
            parent,
            dump_id: graph.dump_id,
            title: graph.title(),
        });

        if let Some(Frame::Folder(folder)) = self.frames.last_mut() {
            folder.group.elements.push(GroupElement::Graph(graph));
            return;
        }

        self.resolve_document(&Properties::new(), None);
        let Some(document) = self.document.as_mut() else {
            return;
        };
        match self.loose_group {
            Some(i) if i < document.groups.len() => {
                document.groups[i].elements.push(GroupElement::Graph(graph));
            }
            _ => {
                let mut group = Group::new("", "");
                group.elements.push(GroupElement::Graph(graph));
                document.groups.push(group);
                self.loose_group = Some(document.groups.len() - 1);
            }
        }
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder for ModelBuilder {
    fn set_model_control(&mut self, control: ModelControl) {
        if self.index_locations {
            control.request_pool_snapshots(true);
        }
        self.control = control;
    }

    fn start_document_header(&mut self) {
        self.frames.push(Frame::Header(Properties::new()));
    }

    fn end_document_header(&mut self) -> Result<(), DecodeError> {
        let properties = match self.frames.pop() {
            Some(Frame::Header(p)) => p,
            Some(other) => {
                self.frames.push(other);
                return Ok(());
            }
            None => return Ok(()),
        };
        match self.document.as_mut() {
            Some(document) => {
                for (key, value) in properties.iter() {
                    document.properties.set(key, value.clone());
                }
            }
            None => self.resolve_document(&properties, None),
        }
        Ok(())
    }

    fn start_group(&mut self) -> Result<(), DecodeError> {
        self.frames.push(Frame::Folder(FolderFrame {
            group: Group::new("", ""),
            content: false,
            digests: DigestScope::default(),
        }));
        Ok(())
    }

    fn set_group_name(&mut self, name: &str, short_name: &str) {
        if let Some(Frame::Folder(folder)) = self.frames.last_mut() {
            folder.group.name = name.to_string();
            folder.group.short_name = short_name.to_string();
        }
    }

    fn set_method(&mut self, method: Option<Arc<Method>>, bci: i32) {
        if let Some(Frame::Folder(folder)) = self.frames.last_mut() {
            folder.group.method = method;
            folder.group.bci = bci;
        }
    }

    fn start_group_content(&mut self) -> Result<(), DecodeError> {
        let mut folder = match self.frames.pop() {
            Some(Frame::Folder(folder)) => folder,
            Some(other) => {
                self.frames.push(other);
                return Ok(());
            }
            None => return Ok(()),
        };
        folder.content = true;
        let name = folder.group.name.clone();
        let short_name = folder.group.short_name.clone();
        folder.group.properties.set(NAME_PROPERTY, name.clone());
        folder.group.properties.set(SHORT_NAME_PROPERTY, short_name);

        let parent = self.folder_path();
        if parent.is_empty() {
            self.resolve_document(&folder.group.properties, Some(&folder.group));
        }
        debug!(group = %name, depth = parent.len(), "group opened");
        self.emit(FolderEvent::GroupOpened { parent, name });
        self.frames.push(Frame::Folder(folder));
        Ok(())
    }

    fn end_group(&mut self) {
        let folder = match self.frames.pop() {
            Some(Frame::Folder(folder)) => folder,
            Some(other) => {
                warn!("group closed while another entity is open");
                self.frames.push(other);
                return;
            }
            None => return,
        };
        let group = folder.group;
        let mut path = self.folder_path();
        path.push(group.name.clone());
        self.emit(FolderEvent::GroupClosed { path });

        if let Some(Frame::Folder(parent)) = self.frames.last_mut() {
            parent.group.elements.push(GroupElement::Group(group));
            return;
        }
        self.resolve_document(&group.properties, Some(&group));
        if let Some(document) = self.document.as_mut() {
            document.groups.push(group);
            self.loose_group = None;
        }
    }

    fn start_graph(&mut self, dump_id: i32, format: &str, args: Vec<Value>) -> Result<(), DecodeError> {
        let nested = matches!(self.frames.last(), Some(Frame::Nested));
        self.frames.push(Frame::Graph(GraphFrame {
            graph: Graph::new(dump_id, format, args),
            nested,
            root_start: self.control.root_start(),
            edges: Vec::new(),
            block: None,
            block_edges: Vec::new(),
        }));
        Ok(())
    }

    fn set_property(&mut self, key: &str, value: Value) {
        match self.frames.last_mut() {
            Some(Frame::Header(properties)) => properties.set(key, value),
            Some(Frame::Folder(folder)) => folder.group.properties.set(key, value),
            Some(Frame::Graph(g)) => g.graph.properties.set(key, value),
            Some(Frame::Node(n)) => n.node.properties.set(key, value),
            Some(Frame::Nested) | None => {
                warn!(key, "property outside of any entity");
            }
        }
    }

    fn start_graph_contents(&mut self) -> Result<(), DecodeError> {
        let location = match self.frames.last() {
            Some(Frame::Graph(g)) if !g.nested => self.headers_only.get(&g.root_start).cloned(),
            _ => None,
        };
        let Some(location) = location else {
            return Ok(());
        };
        if let Some(Frame::Graph(frame)) = self.frames.pop() {
            let mut graph = frame.graph;
            graph.properties.set(NAME_PROPERTY, graph.title());
            self.attach_graph(graph);
        }
        debug!(root_start = location.root_start, end = location.end, "skipping graph contents");
        if self.index_locations {
            self.locations.push(location.clone());
        }
        Err(SkipRoot {
            end: location.end,
            pool: location.pool,
        }
        .into())
    }

    fn start_node(&mut self, id: i32, has_predecessors: bool, class: Arc<NodeClass>) -> Result<(), DecodeError> {
        let mut node = Node::new(id, class);
        node.has_predecessors = has_predecessors;
        if has_predecessors {
            node.properties.set(HAS_PREDECESSOR_PROPERTY, true);
        }
        self.frames.push(Frame::Node(NodeFrame {
            node,
            edges: Vec::new(),
        }));
        Ok(())
    }

    fn set_node_property(&mut self, key: &str, value: Value) {
        if let Some(n) = self.current_node() {
            n.node.properties.set(key, value);
        }
    }

    fn start_nested_property(&mut self, _key: &str) {
        self.frames.push(Frame::Nested);
    }

    fn input_edge(&mut self, port: usize, list_index: Option<usize>, from: i32) {
        if let Some(n) = self.current_node() {
            n.edges.push(PendingEdge {
                kind: EdgeKind::Input,
                class: n.node.node_class.clone(),
                port,
                list_index,
                from,
                to: n.node.id,
            });
        }
    }

    fn successor_edge(&mut self, port: usize, list_index: Option<usize>, to: i32) {
        if let Some(n) = self.current_node() {
            n.edges.push(PendingEdge {
                kind: EdgeKind::Successor,
                class: n.node.node_class.clone(),
                port,
                list_index,
                from: n.node.id,
                to,
            });
        }
    }

    fn set_node_name(&mut self, class: &NodeClass) {
        if let Some(n) = self.current_node() {
            let inputs: Vec<Edge> = n
                .edges
                .iter()
                .filter(|e| e.kind == EdgeKind::Input)
                .filter_map(PendingEdge::resolve)
                .collect();
            let refs: Vec<&Edge> = inputs.iter().collect();
            let name = node_name(class, &n.node.properties, &refs);
            n.node.properties.set(NAME_PROPERTY, name);
        }
    }

    fn end_node(&mut self, _id: i32) {
        let frame = match self.frames.pop() {
            Some(Frame::Node(n)) => n,
            Some(other) => {
                self.frames.push(other);
                return;
            }
            None => return,
        };
        if let Some(g) = self.current_graph() {
            g.graph.nodes.push(frame.node);
            g.edges.extend(frame.edges);
        }
    }

    fn start_block(&mut self, id: i32) {
        if let Some(g) = self.current_graph() {
            g.block = Some(Block::new(id));
        }
    }

    fn add_node_to_block(&mut self, node_id: i32) {
        if let Some(block) = self.current_graph().and_then(|g| g.block.as_mut()) {
            block.nodes.push(node_id);
        }
    }

    fn end_block(&mut self, _id: i32) {
        if let Some(g) = self.current_graph() {
            if let Some(block) = g.block.take() {
                g.graph.blocks.push(block);
            }
        }
    }

    fn add_block_edge(&mut self, from: i32, to: i32) {
        if let Some(g) = self.current_graph() {
            g.block_edges.push((from, to));
        }
    }

    fn make_block_edges(&mut self) {
        let Some(g) = self.current_graph() else {
            return;
        };
        let mut problems = Vec::new();
        let nodes: FxHashSet<i32> = g.graph.nodes.iter().map(|n| n.id).collect();
        let blocks: FxHashSet<i32> = g.graph.blocks.iter().map(|b| b.id).collect();

        for block in &g.graph.blocks {
            for id in block.nodes.iter().filter(|id| !nodes.contains(id)) {
                problems.push(format!("block {} contains unknown node {}", block.id, id));
            }
        }
        for (from, to) in std::mem::take(&mut g.block_edges) {
            if !blocks.contains(&to) {
                problems.push(format!("block edge {} -> {} targets unknown block", from, to));
            }
            match g.graph.blocks.iter_mut().find(|b| b.id == from) {
                Some(block) => block.successors.push(to),
                None => problems.push(format!("block edge {} -> {} starts at unknown block", from, to)),
            }
        }
        self.report_all(problems);
    }

    fn make_graph_edges(&mut self) {
        let Some(g) = self.current_graph() else {
            return;
        };
        let mut problems = Vec::new();
        let nodes: FxHashSet<i32> = g.graph.nodes.iter().map(|n| n.id).collect();

        for pending in std::mem::take(&mut g.edges) {
            let Some(mut edge) = pending.resolve() else {
                continue;
            };
            let missing = match edge.kind {
                EdgeKind::Input => edge.from,
                EdgeKind::Successor => edge.to,
            };
            if !nodes.contains(&missing) {
                edge.dangling = true;
                problems.push(format!(
                    "edge {} -> {} ({}) references missing node {}",
                    edge.from, edge.to, edge.label, missing
                ));
            }
            g.graph.edges.push(edge);
        }
        self.report_all(problems);
    }

    fn graph_content_digest(&mut self, digest: ContentDigest) {
        let Some(g) = self.current_graph() else {
            return;
        };
        let graph_type = g.graph.graph_type().to_string();
        let previous = self.current_scope().insert(graph_type, digest);
        if previous == Some(digest) {
            self.mark_graph_duplicate();
        }
    }

    fn mark_graph_duplicate(&mut self) {
        if let Some(g) = self.current_graph() {
            g.graph.properties.set(DUPLICATE_PROPERTY, true);
        }
    }

    fn end_graph(&mut self) -> Option<Graph> {
        let frame = match self.frames.pop() {
            Some(Frame::Graph(g)) => g,
            Some(other) => {
                self.frames.push(other);
                return None;
            }
            None => return None,
        };
        let mut graph = frame.graph;
        graph.properties.set(NAME_PROPERTY, graph.title());

        if frame.nested {
            if matches!(self.frames.last(), Some(Frame::Nested)) {
                self.frames.pop();
            }
            return Some(graph);
        }

        if self.index_locations {
            self.locations.push(GraphLocation {
                dump_id: graph.dump_id,
                root_start: frame.root_start,
                end: self.control.position(),
                pool: self.control.take_pool_snapshot(),
            });
        }
        self.attach_graph(graph);
        None
    }

    fn report_loading_error(&mut self, message: &str, context: &[String]) {
        let mut path = self.context_path();
        path.extend_from_slice(context);
        let error = LoadingError {
            message: message.to_string(),
            context: path,
        };
        warn!(%error, "loading error");
        self.errors.push(error);
    }

    fn context_depth(&self) -> usize {
        self.frames.len()
    }

    fn truncate_context(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Klass, Port, TypedPort};

    fn class(name: &str, template: &str) -> Arc<NodeClass> {
        Arc::new(NodeClass {
            klass: Arc::new(Klass::new(name)),
            name_template: template.to_string(),
            inputs: vec![TypedPort::new(Port::new("x", false), None)],
            successors: vec![Port::new("next", false)],
        })
    }

    fn open_group(b: &mut ModelBuilder, name: &str) {
        b.start_group().unwrap();
        b.set_group_name(name, name);
        b.start_group_content().unwrap();
    }

    /// Two nodes, `0 -x-> 1`, plus `extra` as a node property of node 1.
    fn simple_graph(b: &mut ModelBuilder, dump_id: i32, graph_type: &str, extra: i32) {
        b.start_graph(dump_id, "graph %d", vec![Value::Int(dump_id)]).unwrap();
        b.set_property("type", Value::from(graph_type));
        b.start_graph_contents().unwrap();
        let a = class("n.StartNode", "");
        b.start_node(0, false, a.clone()).unwrap();
        b.successor_edge(0, None, 1);
        b.set_node_name(&a);
        b.end_node(0);
        let c = class("n.ConstNode", "C({p#value})");
        b.start_node(1, true, c.clone()).unwrap();
        b.set_node_property("value", Value::Int(extra));
        b.input_edge(0, None, 0);
        b.set_node_name(&c);
        b.end_node(1);
        b.make_block_edges();
        b.make_graph_edges();
    }

    #[test]
    fn test_builds_folder_tree() {
        let mut b = ModelBuilder::new().with_sink(Vec::new());
        open_group(&mut b, "outer");
        open_group(&mut b, "inner");
        simple_graph(&mut b, 0, "", 1);
        assert_eq!(b.end_graph(), None);
        b.end_group();
        b.end_group();

        let report = b.finish();
        assert!(report.errors.is_empty());
        let outer = &report.document.groups[0];
        assert_eq!(outer.name, "outer");
        assert_eq!(outer.properties.get_str(SHORT_NAME_PROPERTY), Some("outer"));
        let inner = outer.groups().next().unwrap();
        let graph = inner.graphs().next().unwrap();
        assert_eq!(graph.title(), "graph 0");
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.nodes[0].name(), Some("Start"));
        assert_eq!(graph.nodes[1].name(), Some("C(1)"));
        assert_eq!(
            graph.nodes[1].properties.get(HAS_PREDECESSOR_PROPERTY),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn test_folder_events() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut b = ModelBuilder::new().with_sink(tx);
        open_group(&mut b, "g");
        simple_graph(&mut b, 3, "", 0);
        b.end_graph();
        b.end_group();
        let stream = b.stream_id();
        drop(b);

        let events: Vec<FolderEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                FolderEvent::DocumentResolved { stream },
                FolderEvent::GroupOpened { parent: vec![], name: "g".into() },
                FolderEvent::GraphAdded {
                    parent: vec!["g".into()],
                    dump_id: 3,
                    title: "graph 3".into(),
                },
                FolderEvent::GroupClosed { path: vec!["g".into()] },
            ]
        );
    }

    #[test]
    fn test_factory_called_once_with_first_group() {
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let log = seen.clone();
        let factory = move |_: StreamId, props: &Properties, group: Option<&Group>| {
            log.borrow_mut()
                .push((props.get_str("vm").map(str::to_string), group.map(|g| g.name.clone())));
            Document::new()
        };
        let mut b = ModelBuilder::new().with_factory(factory);
        b.start_group().unwrap();
        b.set_group_name("first", "f");
        b.set_property("vm", Value::from("graal"));
        b.start_group_content().unwrap();
        b.end_group();
        open_group(&mut b, "second");
        b.end_group();
        let report = b.finish();

        assert_eq!(report.document.groups.len(), 2);
        assert_eq!(
            *seen.borrow(),
            vec![(Some("graal".to_string()), Some("first".to_string()))]
        );
    }

    #[test]
    fn test_document_header_properties() {
        let mut b = ModelBuilder::new();
        b.start_document_header();
        b.set_property("vm.version", Value::from("21"));
        b.end_document_header().unwrap();
        let report = b.finish();
        assert_eq!(report.document.properties.get_str("vm.version"), Some("21"));
    }

    #[test]
    fn test_duplicates_within_scope_and_type() {
        let mut b = ModelBuilder::new();
        open_group(&mut b, "g");
        for (id, ty) in [(0, "ir"), (1, "ir"), (2, "cfg")] {
            simple_graph(&mut b, id, ty, 7);
            b.graph_content_digest([7; 32]);
            b.end_graph();
        }
        b.end_group();
        open_group(&mut b, "h");
        simple_graph(&mut b, 3, "ir", 7);
        b.graph_content_digest([7; 32]);
        b.end_graph();
        b.end_group();

        let report = b.finish();
        let flags: Vec<bool> = report.document.graphs().map(Graph::is_duplicate).collect();
        assert_eq!(flags, vec![false, true, false, false]);
    }

    #[test]
    fn test_group_property_graph_keeps_folder_scope() {
        let mut b = ModelBuilder::new();
        b.start_group().unwrap();
        b.set_group_name("g", "g");
        let depth = b.context_depth();
        b.start_nested_property("k_body");
        b.start_graph(-1, "k_body", vec![]).unwrap();
        b.start_graph_contents().unwrap();
        b.make_block_edges();
        b.make_graph_edges();
        let nested = b.end_graph().unwrap();
        assert_eq!(b.context_depth(), depth);
        b.set_property("k_body", Value::Graph(Box::new(nested)));
        b.start_group_content().unwrap();

        for id in 0..2 {
            simple_graph(&mut b, id, "ir", 7);
            b.graph_content_digest([7; 32]);
            b.end_graph();
        }
        b.end_group();

        let report = b.finish();
        let group = &report.document.groups[0];
        let flags: Vec<bool> = group.graphs().map(Graph::is_duplicate).collect();
        assert_eq!(flags, vec![false, true]);
        match group.properties.get("k_body") {
            Some(Value::Graph(g)) => assert!(!g.is_duplicate()),
            other => panic!("expected a graph, got {:?}", other),
        }
    }

    #[test]
    fn test_dangling_edges_are_kept_and_reported() {
        let mut b = ModelBuilder::new();
        open_group(&mut b, "g");
        b.start_graph(0, "broken", vec![]).unwrap();
        b.start_graph_contents().unwrap();
        let c = class("n.UseNode", "");
        b.start_node(1, false, c.clone()).unwrap();
        b.input_edge(0, None, 42);
        b.set_node_name(&c);
        b.end_node(1);
        b.start_block(0);
        b.add_node_to_block(1);
        b.add_node_to_block(9);
        b.end_block(0);
        b.add_block_edge(0, 5);
        b.make_block_edges();
        b.make_graph_edges();
        b.end_graph();
        b.end_group();

        let report = b.finish();
        let graph = report.document.graphs().next().unwrap();
        assert_eq!(graph.edges.len(), 1);
        assert!(graph.edges[0].dangling);
        assert_eq!(graph.blocks[0].nodes, vec![1, 9]);
        assert_eq!(graph.blocks[0].successors, vec![5]);

        assert_eq!(report.errors.len(), 3);
        assert!(report.errors.iter().all(|e| e.context == vec!["g".to_string(), "broken".to_string()]));
        assert!(report.errors.iter().any(|e| e.message.contains("missing node 42")));
        assert!(report.errors.iter().any(|e| e.message.contains("unknown node 9")));
    }

    #[test]
    fn test_nested_graph_is_returned() {
        let mut b = ModelBuilder::new();
        open_group(&mut b, "g");
        b.start_graph(0, "outer", vec![]).unwrap();
        b.start_graph_contents().unwrap();
        let c = class("n.CallNode", "");
        b.start_node(0, false, c).unwrap();
        let depth = b.context_depth();

        b.start_nested_property("callee");
        b.start_graph(-1, "callee", vec![]).unwrap();
        b.start_graph_contents().unwrap();
        b.make_block_edges();
        b.make_graph_edges();
        let nested = b.end_graph().unwrap();
        assert_eq!(b.context_depth(), depth);
        assert_eq!(nested.title(), "callee");

        b.set_node_property("callee", Value::Graph(Box::new(nested)));
        b.end_node(0);
        b.end_graph();
        b.end_group();

        let report = b.finish();
        let node = &report.document.graphs().next().unwrap().nodes[0];
        assert_eq!(node.subgraphs().count(), 1);
    }

    #[test]
    fn test_truncate_context() {
        let mut b = ModelBuilder::new();
        open_group(&mut b, "g");
        let depth = b.context_depth();
        b.start_graph(0, "abandoned", vec![]).unwrap();
        b.start_node(0, false, class("n.X", "")).unwrap();
        assert_eq!(b.context_depth(), depth + 2);

        b.truncate_context(depth);
        b.end_group();
        let report = b.finish();
        assert_eq!(report.document.groups[0].elements.len(), 0);
    }

    #[test]
    fn test_loose_graphs_share_implicit_group() {
        let mut b = ModelBuilder::new();
        simple_graph(&mut b, 0, "", 1);
        b.end_graph();
        simple_graph(&mut b, 1, "", 1);
        b.end_graph();
        let report = b.finish();
        assert_eq!(report.document.groups.len(), 1);
        assert_eq!(report.document.groups[0].graphs().count(), 2);
    }

    #[test]
    fn test_finish_closes_open_frames() {
        let mut b = ModelBuilder::new();
        open_group(&mut b, "g");
        b.start_graph(0, "partial", vec![]).unwrap();
        b.start_graph_contents().unwrap();
        b.start_node(0, false, class("n.X", "")).unwrap();
        let report = b.finish();
        let graph = report.document.graphs().next().unwrap();
        assert_eq!(graph.nodes.len(), 1);
    }
}
