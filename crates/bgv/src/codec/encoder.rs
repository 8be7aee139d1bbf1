//! Wire encoder: writes a [`Document`] tree as a BGV stream.
//!
//! Every root item (group header, graph, group close) is assembled in memory
//! and committed to the output only once complete, so a failed or cancelled
//! write never leaves half a record behind.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::codec::pool::{PoolRef, PoolWriter};
use crate::codec::primitives::Writer;
use crate::error::EncodeError;
use crate::limits::*;
use crate::model::{
    Document, Edge, EdgeKind, EntityKind, Graph, Group, GroupElement, Node, PoolKind, PoolValue,
    Port, Properties, Value, Version,
};

/// Options for encoding.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// Format version announced in the header and respected by the output.
    pub version: Version,
    /// Number of live constant pool indices before recycling starts.
    pub pool_capacity: usize,
    /// zstd level for whole-stream compression; `None` writes plain bytes.
    pub compression: Option<i32>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            compression: None,
        }
    }
}

impl EncodeOptions {
    /// Creates default encoding options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Compresses the whole stream with zstd at `level`.
    pub fn compressed(mut self, level: i32) -> Self {
        self.compression = Some(level);
        self
    }
}

/// Incremental stream writer.
///
/// Producers call [`begin_group`](Self::begin_group), [`write_graph`](Self::write_graph)
/// and [`close_group`](Self::close_group) as their data becomes available, or
/// [`write_document`](Self::write_document) for a complete tree. Compression
/// is the caller's concern here; see [`encode_document_to`].
pub struct Encoder<W: Write> {
    out: W,
    version: Version,
    pool: PoolWriter,
    pool_capacity: usize,
    unit: Writer,
    cancel: Option<Arc<AtomicBool>>,
    open_groups: usize,
    header_written: bool,
}

impl<W: Write> Encoder<W> {
    pub fn new(out: W, options: EncodeOptions) -> Result<Self, EncodeError> {
        if options.version > CURRENT_VERSION {
            return Err(EncodeError::VersionTooNew {
                requested: options.version,
                supported: CURRENT_VERSION,
            });
        }
        Ok(Self {
            out,
            version: options.version,
            pool: PoolWriter::new(options.pool_capacity)?,
            pool_capacity: options.pool_capacity,
            unit: Writer::with_capacity(4096),
            cancel: None,
            open_groups: 0,
            header_written: false,
        })
    }

    /// Checks `flag` before every root item; once set, open groups are
    /// closed and writing fails with [`EncodeError::Cancelled`].
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Groups begun but not yet closed.
    pub fn open_groups(&self) -> usize {
        self.open_groups
    }

    /// Writes a complete document: stream properties, then every group tree.
    pub fn write_document(&mut self, document: &Document) -> Result<(), EncodeError> {
        if !document.properties.is_empty() {
            self.write_stream_properties(&document.properties)?;
        }
        for group in &document.groups {
            self.write_group(group)?;
        }
        Ok(())
    }

    /// Writes `group` and everything in it, then closes it.
    pub fn write_group(&mut self, group: &Group) -> Result<(), EncodeError> {
        self.begin_group(group)?;
        for element in &group.elements {
            match element {
                GroupElement::Graph(graph) => self.write_graph(graph)?,
                GroupElement::Group(child) => self.write_group(child)?,
            }
        }
        self.close_group()
    }

    pub fn write_stream_properties(&mut self, properties: &Properties) -> Result<(), EncodeError> {
        if !self.version.supports(STREAM_PROPERTIES_SINCE) {
            return Err(EncodeError::UnsupportedInVersion {
                feature: "stream properties",
                version: self.version,
            });
        }
        self.emit_unit(|e| {
            e.w.write_u8(STREAM_PROPERTIES);
            e.properties(properties, EntityKind::Document)
        })
    }

    /// Writes a group header; its contents follow until [`close_group`](Self::close_group).
    pub fn begin_group(&mut self, group: &Group) -> Result<(), EncodeError> {
        self.emit_unit(|e| e.group_header(group))?;
        self.open_groups += 1;
        Ok(())
    }

    pub fn write_graph(&mut self, graph: &Graph) -> Result<(), EncodeError> {
        self.emit_unit(|e| e.graph(graph))
    }

    pub fn close_group(&mut self) -> Result<(), EncodeError> {
        if self.open_groups == 0 {
            debug!("close_group without open group ignored");
            return Ok(());
        }
        self.out.write_all(&[CLOSE_GROUP])?;
        self.open_groups -= 1;
        Ok(())
    }

    /// Flushes and returns the output. A stream with no items still gets a header.
    pub fn finish(mut self) -> Result<W, EncodeError> {
        if !self.header_written {
            let mut header = Writer::new();
            write_header(&mut header, self.version);
            self.out.write_all(header.as_bytes())?;
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn emit_unit<F>(&mut self, write: F) -> Result<(), EncodeError>
    where
        F: FnOnce(&mut Emitter<'_>) -> Result<(), EncodeError>,
    {
        self.check_cancelled()?;
        self.unit.clear();
        if !self.header_written {
            write_header(&mut self.unit, self.version);
        }

        let result = {
            let mut emitter = Emitter {
                w: &mut self.unit,
                pool: &mut self.pool,
                version: self.version,
                depth: 0,
            };
            write(&mut emitter)
        };

        match result {
            Ok(()) => {
                self.out.write_all(self.unit.as_bytes())?;
                self.header_written = true;
                Ok(())
            }
            Err(err) => {
                // Bindings made by the discarded unit never reached the output.
                self.unit.clear();
                self.pool = PoolWriter::new(self.pool_capacity)?;
                Err(err)
            }
        }
    }

    fn check_cancelled(&mut self) -> Result<(), EncodeError> {
        let cancelled = self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed));
        if !cancelled {
            return Ok(());
        }
        debug!(open_groups = self.open_groups, "write cancelled, closing open groups");
        if self.open_groups > 0 {
            self.out.write_all(&vec![CLOSE_GROUP; self.open_groups])?;
            self.open_groups = 0;
        }
        self.out.flush()?;
        Err(EncodeError::Cancelled)
    }
}

/// The node at the other end of an edge from the one declaring it.
fn far_end(edge: &Edge) -> i32 {
    match edge.kind {
        EdgeKind::Input => edge.from,
        EdgeKind::Successor => edge.to,
    }
}

fn write_header(w: &mut Writer, version: Version) {
    w.write_bytes(MAGIC);
    w.write_u8(version.major);
    w.write_u8(version.minor);
}

/// Writes the body of one root item into a unit buffer.
struct Emitter<'a> {
    w: &'a mut Writer,
    pool: &'a mut PoolWriter,
    version: Version,
    depth: usize,
}

impl Emitter<'_> {
    fn group_header(&mut self, group: &Group) -> Result<(), EncodeError> {
        self.w.write_u8(BEGIN_GROUP);
        self.pool_string(&group.name)?;
        self.pool_string(&group.short_name)?;
        let method = group.method.clone().map(PoolValue::Method);
        self.pool_value(method.as_ref())?;
        self.w.write_i32(group.bci);
        self.properties(&group.properties, EntityKind::Group)
    }

    fn graph(&mut self, graph: &Graph) -> Result<(), EncodeError> {
        self.w.write_u8(BEGIN_GRAPH);
        self.w.write_i32(graph.dump_id);
        self.w.write_checked_string(&graph.format, "graph format")?;
        self.w
            .write_length(graph.args.len(), MAX_ARRAY_LEN, "graph argument count")?;
        for arg in &graph.args {
            self.value(arg)?;
        }
        self.graph_body(graph)
    }

    /// Properties, nodes and blocks: everything a nested graph consists of.
    fn graph_body(&mut self, graph: &Graph) -> Result<(), EncodeError> {
        self.properties(&graph.properties, EntityKind::Graph)?;

        let mut declared: FxHashMap<(i32, EdgeKind), Vec<&Edge>> = FxHashMap::default();
        for edge in &graph.edges {
            let owner = match edge.kind {
                EdgeKind::Input => edge.to,
                EdgeKind::Successor => edge.from,
            };
            declared.entry((owner, edge.kind)).or_default().push(edge);
        }

        self.w
            .write_length(graph.nodes.len(), MAX_NODES_PER_GRAPH, "node count")?;
        for node in &graph.nodes {
            self.node(node, &declared)?;
        }

        self.w
            .write_length(graph.blocks.len(), MAX_NODES_PER_GRAPH, "block count")?;
        for block in &graph.blocks {
            self.w.write_i32(block.id);
            self.w
                .write_length(block.nodes.len(), MAX_NODES_PER_GRAPH, "block node count")?;
            for &id in &block.nodes {
                self.w.write_i32(id);
            }
            self.w.write_length(
                block.successors.len(),
                MAX_NODES_PER_GRAPH,
                "block successor count",
            )?;
            for &id in &block.successors {
                self.w.write_i32(id);
            }
        }
        Ok(())
    }

    fn node(&mut self, node: &Node, declared: &FxHashMap<(i32, EdgeKind), Vec<&Edge>>) -> Result<(), EncodeError> {
        self.w.write_i32(node.id);
        self.pool_value(Some(&PoolValue::NodeClass(node.node_class.clone())))?;
        self.w.write_u8(node.has_predecessors as u8);
        self.properties(&node.properties, EntityKind::Node)?;

        let class = node.node_class.clone();
        let inputs = declared.get(&(node.id, EdgeKind::Input));
        for (ordinal, typed) in class.inputs.iter().enumerate() {
            self.port(&typed.port, ordinal, inputs)?;
        }
        let successors = declared.get(&(node.id, EdgeKind::Successor));
        for (ordinal, port) in class.successors.iter().enumerate() {
            self.port(port, ordinal, successors)?;
        }
        Ok(())
    }

    fn port(&mut self, port: &Port, ordinal: usize, edges: Option<&Vec<&Edge>>) -> Result<(), EncodeError> {
        let on_port: Vec<&Edge> = edges
            .map(|edges| edges.iter().copied().filter(|e| e.port() == ordinal).collect())
            .unwrap_or_default();

        if !port.is_list {
            self.w.write_i32(on_port.first().map_or(-1, |e| far_end(e)));
            return Ok(());
        }

        let len = on_port
            .iter()
            .enumerate()
            .map(|(i, e)| e.list_index.unwrap_or(i) + 1)
            .max()
            .unwrap_or(0);
        let mut slots = vec![-1; len];
        for (i, edge) in on_port.iter().enumerate() {
            slots[edge.list_index.unwrap_or(i)] = far_end(edge);
        }
        self.w.write_short_length(slots.len(), "list port size")?;
        for id in slots {
            self.w.write_i32(id);
        }
        Ok(())
    }

    // =========================================================================
    // Properties
    // =========================================================================

    fn properties(&mut self, properties: &Properties, kind: EntityKind) -> Result<(), EncodeError> {
        let entries: Vec<(&str, &Value)> = properties.persistent(kind).collect();
        self.property_count(entries.len())?;
        for (key, value) in entries {
            self.pool_string(key)?;
            self.value(value)?;
        }
        Ok(())
    }

    fn property_count(&mut self, count: usize) -> Result<(), EncodeError> {
        if !self.version.supports(LARGE_PROPERTIES_SINCE) {
            return self.w.write_short_length(count, "property count");
        }
        if count < PROPERTY_COUNT_ESCAPE as usize {
            self.w.write_u16(count as u16);
            Ok(())
        } else {
            self.w.write_u16(PROPERTY_COUNT_ESCAPE);
            self.w.write_length(count, MAX_PROPERTIES, "property count")
        }
    }

    fn value(&mut self, value: &Value) -> Result<(), EncodeError> {
        match value {
            Value::Null => {
                self.w.write_u8(PROPERTY_POOL);
                self.w.write_u8(POOL_NULL);
            }
            Value::Int(v) => {
                self.w.write_u8(PROPERTY_INT);
                self.w.write_i32(*v);
            }
            Value::Long(v) => {
                self.w.write_u8(PROPERTY_LONG);
                self.w.write_i64(*v);
            }
            Value::Float(v) => {
                self.w.write_u8(PROPERTY_FLOAT);
                self.w.write_f32(*v);
            }
            Value::Double(v) => {
                self.w.write_u8(PROPERTY_DOUBLE);
                self.w.write_f64(*v);
            }
            Value::Bool(true) => self.w.write_u8(PROPERTY_TRUE),
            Value::Bool(false) => self.w.write_u8(PROPERTY_FALSE),
            Value::String(s) => {
                self.w.write_u8(PROPERTY_POOL);
                self.pool_string(s)?;
            }
            Value::Pooled(p) => {
                self.w.write_u8(PROPERTY_POOL);
                self.pool_value(Some(p))?;
            }
            Value::IntArray(items) => {
                self.array_header(PROPERTY_INT, items.len())?;
                for &v in items {
                    self.w.write_i32(v);
                }
            }
            Value::DoubleArray(items) => {
                self.array_header(PROPERTY_DOUBLE, items.len())?;
                for &v in items {
                    self.w.write_f64(v);
                }
            }
            Value::PoolArray(items) => {
                self.array_header(PROPERTY_POOL, items.len())?;
                for item in items {
                    self.pool_value(item.as_ref())?;
                }
            }
            Value::Graph(graph) => {
                if self.depth >= MAX_NESTING_DEPTH {
                    return Err(EncodeError::LengthExceedsLimit {
                        field: "graph nesting",
                        len: self.depth + 1,
                        max: MAX_NESTING_DEPTH,
                    });
                }
                self.w.write_u8(PROPERTY_SUBGRAPH);
                self.depth += 1;
                self.graph_body(graph)?;
                self.depth -= 1;
            }
        }
        Ok(())
    }

    fn array_header(&mut self, element: u8, len: usize) -> Result<(), EncodeError> {
        self.w.write_u8(PROPERTY_ARRAY);
        self.w.write_u8(element);
        self.w.write_length(len, MAX_ARRAY_LEN, "array length")
    }

    // =========================================================================
    // Constant pool
    // =========================================================================

    fn pool_string(&mut self, s: &str) -> Result<(), EncodeError> {
        self.pool_value(Some(&PoolValue::string(s)))
    }

    fn pool_value(&mut self, value: Option<&PoolValue>) -> Result<(), EncodeError> {
        let Some(value) = value else {
            self.w.write_u8(POOL_NULL);
            return Ok(());
        };
        let kind = value.kind();
        let gate = match kind {
            PoolKind::SourcePosition => Some(("source positions", SOURCE_POSITIONS_SINCE)),
            PoolKind::Node => Some(("pooled node references", LARGE_PROPERTIES_SINCE)),
            _ => None,
        };
        if let Some((feature, since)) = gate {
            if !self.version.supports(since) {
                return Err(EncodeError::UnsupportedInVersion {
                    feature,
                    version: self.version,
                });
            }
        }

        match self.pool.reference(value)? {
            PoolRef::Known(index) => {
                self.w.write_u8(kind.tag());
                self.w.write_u16(index);
            }
            PoolRef::New(index) => {
                self.w.write_u8(POOL_NEW);
                self.w.write_u16(index);
                self.w.write_u8(kind.tag());
                self.payload(value)?;
                self.pool.release(index);
            }
        }
        Ok(())
    }

    fn payload(&mut self, value: &PoolValue) -> Result<(), EncodeError> {
        match value {
            PoolValue::String(s) => self.w.write_checked_string(s, "pooled string")?,
            PoolValue::Klass(klass) => {
                self.w.write_checked_string(&klass.name, "class name")?;
                match &klass.enum_values {
                    None => self.w.write_u8(KLASS),
                    Some(values) => {
                        self.w.write_u8(ENUM_KLASS);
                        self.w
                            .write_length(values.len(), MAX_ARRAY_LEN, "enum value count")?;
                        for v in values {
                            self.pool_string(v)?;
                        }
                    }
                }
            }
            PoolValue::EnumValue(e) => {
                self.pool_value(Some(&PoolValue::Klass(e.klass.clone())))?;
                self.w.write_i32(e.ordinal);
            }
            PoolValue::Method(m) => {
                self.pool_value(Some(&PoolValue::Klass(m.holder.clone())))?;
                self.pool_string(&m.name)?;
                self.pool_value(Some(&PoolValue::Signature(m.signature.clone())))?;
                self.w.write_i32(m.flags);
                if let Some(code) = &m.bytecode {
                    if code.len() > MAX_BYTES_LEN {
                        return Err(EncodeError::LengthExceedsLimit {
                            field: "method bytecode",
                            len: code.len(),
                            max: MAX_BYTES_LEN,
                        });
                    }
                }
                self.w.write_byte_block(m.bytecode.as_deref());
            }
            PoolValue::Field(f) => {
                self.pool_value(Some(&PoolValue::Klass(f.holder.clone())))?;
                self.pool_string(&f.name)?;
                self.pool_string(&f.type_name)?;
                self.w.write_i32(f.flags);
            }
            PoolValue::Signature(s) => {
                self.w
                    .write_short_length(s.arg_types.len(), "signature argument count")?;
                for arg in &s.arg_types {
                    self.pool_string(arg)?;
                }
                self.pool_string(&s.return_type)?;
            }
            PoolValue::NodeClass(nc) => {
                self.pool_value(Some(&PoolValue::Klass(nc.klass.clone())))?;
                self.w
                    .write_checked_string(&nc.name_template, "node name template")?;
                self.w.write_short_length(nc.inputs.len(), "input port count")?;
                for input in &nc.inputs {
                    self.w.write_u8(input.port.is_list as u8);
                    self.pool_string(&input.port.name)?;
                    let input_type = input.input_type.clone().map(PoolValue::EnumValue);
                    self.pool_value(input_type.as_ref())?;
                }
                self.w
                    .write_short_length(nc.successors.len(), "successor port count")?;
                for port in &nc.successors {
                    self.w.write_u8(port.is_list as u8);
                    self.pool_string(&port.name)?;
                }
            }
            PoolValue::SourcePosition(p) => {
                self.pool_value(Some(&PoolValue::Method(p.method.clone())))?;
                self.w.write_i32(p.bci);
                for location in &p.locations {
                    self.pool_string(&location.uri)?;
                    self.w.write_i32(location.line);
                    self.w.write_i32(location.start);
                    self.w.write_i32(location.end);
                }
                self.w.write_u8(POOL_NULL);
                let caller = p.caller.clone().map(PoolValue::SourcePosition);
                self.pool_value(caller.as_ref())?;
            }
            PoolValue::NodeRef(n) => {
                self.w.write_i32(n.id);
                self.pool_value(Some(&PoolValue::NodeClass(n.node_class.clone())))?;
            }
        }
        Ok(())
    }
}

/// Encodes a document to bytes.
pub fn encode_document(document: &Document, options: EncodeOptions) -> Result<Vec<u8>, EncodeError> {
    encode_document_to(document, Vec::new(), options)
}

/// Encodes a document into `out`, zstd-compressed if the options ask for it.
pub fn encode_document_to<W: Write>(document: &Document, out: W, options: EncodeOptions) -> Result<W, EncodeError> {
    match options.compression {
        None => {
            let mut encoder = Encoder::new(out, options)?;
            encoder.write_document(document)?;
            encoder.finish()
        }
        Some(level) => {
            let zstd = zstd::Encoder::new(out, level)
                .map_err(|e| EncodeError::CompressionFailed(e.to_string()))?;
            let mut encoder = Encoder::new(zstd, options)?;
            encoder.write_document(document)?;
            encoder
                .finish()?
                .finish()
                .map_err(|e| EncodeError::CompressionFailed(e.to_string()))
        }
    }
}
