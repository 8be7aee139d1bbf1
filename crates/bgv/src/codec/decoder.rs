//! Wire decoder: walks the op-code stream and drives a [`Builder`].
//!
//! The decoder is a pull-based state machine. Each root item (group header,
//! graph, group close, stream properties) is parsed by bounded recursive
//! descent; groups stay open across root items until their `CLOSE_GROUP`.

use std::io::Read;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::builder::{Builder, LoadReport, ModelBuilder, ModelControl};
use crate::codec::cursor::ByteCursor;
use crate::codec::pool::ConstantPool;
use crate::error::{DecodeError, SkipRoot};
use crate::limits::*;
use crate::model::{
    EnumValue, Field, Klass, Location, Method, NodeClass, NodeRef, PoolKind, PoolValue, Port,
    Signature, SourcePosition, TypedPort, Value, Version,
};

/// Options for decoding.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Initial size of the read buffer.
    pub buffer_size: usize,
    /// Maximum nesting of graphs inside properties and of pooled source
    /// position callers.
    pub max_nesting_depth: usize,
    /// Whether to digest top-level graphs for duplicate detection.
    pub digests: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_nesting_depth: MAX_NESTING_DEPTH,
            digests: true,
        }
    }
}

impl DecodeOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Skips content digests; no graph is marked duplicate.
    pub fn without_digests(mut self) -> Self {
        self.digests = false;
        self
    }
}

/// Builder call that still needs its matching `end_*`.
#[derive(Debug, Clone, Copy)]
enum Open {
    Header,
    Group,
    Graph,
    Node(i32),
    Block(i32),
}

/// Receiver of one property list.
#[derive(Debug, Clone, Copy)]
enum PropertyTarget {
    Entity,
    Node,
}

/// Decoder of one stream into one [`Builder`].
pub struct Decoder<R, B> {
    cursor: ByteCursor<R>,
    pool: ConstantPool,
    builder: B,
    control: ModelControl,
    options: DecodeOptions,
    open: Vec<Open>,
    /// Builder context depth and `open` length when the current root item began.
    root_depth: usize,
    root_open: usize,
    nesting: usize,
    headers: usize,
}

impl<R: Read, B: Builder> Decoder<R, B> {
    pub fn new(reader: R, builder: B) -> Self {
        Self::with_options(reader, builder, DecodeOptions::default())
    }

    pub fn with_options(reader: R, builder: B, options: DecodeOptions) -> Self {
        Self {
            cursor: ByteCursor::with_capacity(reader, options.buffer_size),
            pool: ConstantPool::new(),
            builder,
            control: ModelControl::new(),
            options,
            open: Vec::new(),
            root_depth: 0,
            root_open: 0,
            nesting: 0,
            headers: 0,
        }
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut B {
        &mut self.builder
    }

    pub fn into_builder(self) -> B {
        self.builder
    }

    /// Format version of the stream, as of the last header.
    pub fn version(&self) -> Version {
        self.cursor.version()
    }

    /// Absolute offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    /// Decodes the whole stream.
    ///
    /// On a fatal error every open builder entity is closed before the error
    /// is returned, so the builder holds a consistent partial model.
    pub fn parse(&mut self) -> Result<(), DecodeError> {
        self.builder.set_model_control(self.control.clone());
        if let Some(pool) = self.builder.constant_pool() {
            self.pool = pool;
        }

        loop {
            let step = match self.parse_root() {
                Err(DecodeError::SkipRoot(skip)) => self.recover(skip),
                other => other,
            };
            match step {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    self.abort(&err);
                    return Err(err);
                }
            }
        }

        if !self.open.is_empty() {
            debug!(open = self.open.len(), "stream ended inside open groups");
            self.flush_open();
        }
        Ok(())
    }

    // =========================================================================
    // Root items
    // =========================================================================

    /// Parses one root item; returns false at a clean end of stream.
    fn parse_root(&mut self) -> Result<bool, DecodeError> {
        let offset = self.cursor.position();
        if self.cursor.read_header()? {
            if self.headers > 0 || offset > 0 {
                debug!(offset = self.cursor.position(), "stream header mid-stream, restarting pool");
                self.pool.restart();
            }
            self.headers += 1;
            self.control.set_version(self.cursor.version());
        }
        if self.cursor.is_at_end()? {
            return Ok(false);
        }

        self.root_depth = self.builder.context_depth();
        self.root_open = self.open.len();
        self.nesting = 0;
        self.control.set_root_start(self.cursor.position());
        self.builder.start_root();

        let op = self.cursor.read_u8("root op-code")?;
        trace!(op, offset = self.control.root_start(), "root item");
        match op {
            BEGIN_GROUP => self.parse_group()?,
            BEGIN_GRAPH => self.parse_graph()?,
            CLOSE_GROUP => self.close_group(),
            STREAM_PROPERTIES => self.parse_stream_properties()?,
            tag => {
                return Err(DecodeError::MalformedTag {
                    context: "root op-code",
                    tag,
                });
            }
        }
        Ok(true)
    }

    fn parse_group(&mut self) -> Result<(), DecodeError> {
        self.builder.start_group()?;
        self.open.push(Open::Group);

        let name = self.read_string_entry()?.unwrap_or_default();
        let short_name = self.read_string_entry()?.unwrap_or_default();
        let method = self.read_method()?;
        let bci = self.cursor.read_i32("group bci")?;
        self.read_properties(PropertyTarget::Entity)?;

        self.builder.set_group_name(&name, &short_name);
        self.builder.set_method(method, bci);
        self.sync();
        self.builder.start_group_content()
    }

    fn close_group(&mut self) {
        match self.open.last() {
            Some(Open::Group) => {
                self.open.pop();
                self.builder.end_group();
            }
            _ => {
                warn!(offset = self.control.root_start(), "CLOSE_GROUP without open group");
                let context = [format!("offset {}", self.control.root_start())];
                self.builder
                    .report_loading_error("group close without matching group", &context);
            }
        }
    }

    fn parse_stream_properties(&mut self) -> Result<(), DecodeError> {
        self.require_version("stream properties", STREAM_PROPERTIES_SINCE)?;
        self.builder.start_document_header();
        self.open.push(Open::Header);
        self.read_properties(PropertyTarget::Entity)?;
        self.open.pop();
        self.builder.end_document_header()
    }

    fn parse_graph(&mut self) -> Result<(), DecodeError> {
        let dump_id = self.cursor.read_i32("graph dump id")?;
        let format = self.cursor.read_string("graph format")?;
        let argc = self.cursor.read_length(MAX_ARRAY_LEN, "graph argument count")?;
        let mut args = Vec::with_capacity(argc.min(64));
        for _ in 0..argc {
            args.push(self.read_property_value("argument")?);
        }

        self.builder.start_graph(dump_id, &format, args)?;
        self.open.push(Open::Graph);
        self.read_properties(PropertyTarget::Entity)?;
        self.sync();
        self.builder.start_graph_contents()?;

        if self.options.digests {
            self.cursor.start_digest();
        }
        self.read_graph_body()?;
        if let Some(digest) = self.cursor.finish_digest() {
            self.builder.graph_content_digest(digest);
        }

        self.sync();
        self.control.offer_pool_snapshot(&self.pool);
        self.open.pop();
        self.builder.end_graph();
        Ok(())
    }

    // =========================================================================
    // Graph bodies
    // =========================================================================

    fn read_graph_body(&mut self) -> Result<(), DecodeError> {
        let nodes = self.cursor.read_length(MAX_NODES_PER_GRAPH, "node count")?;
        for _ in 0..nodes {
            self.read_node()?;
        }
        let blocks = self.cursor.read_length(MAX_NODES_PER_GRAPH, "block count")?;
        for _ in 0..blocks {
            self.read_block()?;
        }
        self.builder.make_block_edges();
        self.builder.make_graph_edges();
        Ok(())
    }

    fn read_node(&mut self) -> Result<(), DecodeError> {
        let id = self.cursor.read_i32("node id")?;
        let class = self.read_node_class()?;
        let class = required(class, "node class")?;
        let predecessors = self.cursor.read_u8("node predecessor count")?;

        self.builder.start_node(id, predecessors > 0, class.clone())?;
        self.open.push(Open::Node(id));
        self.read_properties(PropertyTarget::Node)?;

        for (port, typed) in class.inputs.iter().enumerate() {
            for (list_index, from) in self.read_port(&typed.port)? {
                self.builder.input_edge(port, list_index, from);
            }
        }
        for (port, successor) in class.successors.iter().enumerate() {
            for (list_index, to) in self.read_port(successor)? {
                self.builder.successor_edge(port, list_index, to);
            }
        }

        self.builder.set_node_name(&class);
        self.open.pop();
        self.builder.end_node(id);
        Ok(())
    }

    /// Reads the node ids of one port; empty (negative) slots are dropped.
    fn read_port(&mut self, port: &Port) -> Result<Vec<(Option<usize>, i32)>, DecodeError> {
        if !port.is_list {
            let id = self.cursor.read_i32("edge endpoint")?;
            return Ok(if id >= 0 { vec![(None, id)] } else { Vec::new() });
        }
        let size = self.cursor.read_u16("list port size")? as usize;
        let mut ids = Vec::with_capacity(size);
        for slot in 0..size {
            let id = self.cursor.read_i32("edge endpoint")?;
            if id >= 0 {
                ids.push((Some(slot), id));
            }
        }
        Ok(ids)
    }

    fn read_block(&mut self) -> Result<(), DecodeError> {
        let id = self.cursor.read_i32("block id")?;
        self.builder.start_block(id);
        self.open.push(Open::Block(id));

        let nodes = self.cursor.read_length(MAX_NODES_PER_GRAPH, "block node count")?;
        for _ in 0..nodes {
            let node = self.cursor.read_i32("block node id")?;
            if node >= 0 {
                self.builder.add_node_to_block(node);
            }
        }
        self.open.pop();
        self.builder.end_block(id);

        let successors = self.cursor.read_length(MAX_NODES_PER_GRAPH, "block successor count")?;
        for _ in 0..successors {
            let to = self.cursor.read_i32("block successor id")?;
            self.builder.add_block_edge(id, to);
        }
        Ok(())
    }

    // =========================================================================
    // Properties
    // =========================================================================

    fn read_properties(&mut self, target: PropertyTarget) -> Result<(), DecodeError> {
        let short = self.cursor.read_u16("property count")?;
        let count = if short == PROPERTY_COUNT_ESCAPE && self.version().supports(LARGE_PROPERTIES_SINCE) {
            self.cursor.read_length(MAX_PROPERTIES, "property count")?
        } else {
            short as usize
        };

        for _ in 0..count {
            let key = self.read_string_entry()?;
            let key = required(key, "property key")?;
            let value = self.read_property_value(&key)?;
            match target {
                PropertyTarget::Entity => self.builder.set_property(&key, value),
                PropertyTarget::Node => self.builder.set_node_property(&key, value),
            }
        }
        Ok(())
    }

    fn read_property_value(&mut self, key: &str) -> Result<Value, DecodeError> {
        let tag = self.cursor.read_u8("property tag")?;
        if tag == PROPERTY_SUBGRAPH {
            self.read_nested_graph(key)
        } else {
            self.read_tagged_value(tag)
        }
    }

    fn read_tagged_value(&mut self, tag: u8) -> Result<Value, DecodeError> {
        let value = match tag {
            PROPERTY_POOL => Value::from(self.read_pool_entry(None)?),
            PROPERTY_INT => Value::Int(self.cursor.read_i32("int property")?),
            PROPERTY_LONG => Value::Long(self.cursor.read_i64("long property")?),
            PROPERTY_DOUBLE => Value::Double(self.cursor.read_f64("double property")?),
            PROPERTY_FLOAT => Value::Float(self.cursor.read_f32("float property")?),
            PROPERTY_TRUE => Value::Bool(true),
            PROPERTY_FALSE => Value::Bool(false),
            PROPERTY_ARRAY => self.read_array()?,
            tag => {
                return Err(DecodeError::MalformedTag {
                    context: "property tag",
                    tag,
                });
            }
        };
        Ok(value)
    }

    fn read_array(&mut self) -> Result<Value, DecodeError> {
        let element = self.cursor.read_u8("array element tag")?;
        let len = self.cursor.read_length(MAX_ARRAY_LEN, "array length")?;
        let capacity = len.min(4096);
        let value = match element {
            PROPERTY_INT => {
                let mut items = Vec::with_capacity(capacity);
                for _ in 0..len {
                    items.push(self.cursor.read_i32("int array element")?);
                }
                Value::IntArray(items)
            }
            PROPERTY_DOUBLE => {
                let mut items = Vec::with_capacity(capacity);
                for _ in 0..len {
                    items.push(self.cursor.read_f64("double array element")?);
                }
                Value::DoubleArray(items)
            }
            PROPERTY_POOL => {
                let mut items = Vec::with_capacity(capacity);
                for _ in 0..len {
                    items.push(self.read_pool_entry(None)?);
                }
                Value::PoolArray(items)
            }
            tag => {
                return Err(DecodeError::MalformedTag {
                    context: "array element tag",
                    tag,
                });
            }
        };
        Ok(value)
    }

    /// Reads a graph held by property `key`: properties, nodes and blocks
    /// without a dump id or title header.
    fn read_nested_graph(&mut self, key: &str) -> Result<Value, DecodeError> {
        if self.nesting >= self.options.max_nesting_depth {
            return Err(DecodeError::NestingTooDeep {
                max: self.options.max_nesting_depth,
            });
        }
        self.nesting += 1;

        self.builder.start_nested_property(key);
        self.builder.start_graph(-1, key, Vec::new())?;
        self.open.push(Open::Graph);
        self.read_properties(PropertyTarget::Entity)?;
        self.builder.start_graph_contents()?;
        self.read_graph_body()?;
        self.open.pop();
        let graph = self.builder.end_graph();

        self.nesting -= 1;
        Ok(graph.map_or(Value::Null, |g| Value::Graph(Box::new(g))))
    }

    // =========================================================================
    // Constant pool
    // =========================================================================

    /// Reads a pool reference, decoding and binding a `POOL_NEW` entry.
    ///
    /// `expected` restricts the acceptable kinds; `None` accepts any.
    fn read_pool_entry(&mut self, expected: Option<PoolKind>) -> Result<Option<PoolValue>, DecodeError> {
        let tag = self.cursor.read_u8("pool tag")?;
        match tag {
            POOL_NULL => Ok(None),
            POOL_NEW => {
                let index = self.cursor.read_u16("pool index")?;
                let kind_tag = self.cursor.read_u8("pool entry kind")?;
                let kind = PoolKind::from_tag(kind_tag).ok_or(DecodeError::MalformedTag {
                    context: "pool entry kind",
                    tag: kind_tag,
                })?;
                check_kind(expected, kind)?;
                let value = self.read_pool_payload(kind)?;
                Ok(Some(self.pool.add_pool_entry(index, value)))
            }
            _ => {
                let kind = PoolKind::from_tag(tag).ok_or(DecodeError::MalformedTag {
                    context: "pool tag",
                    tag,
                })?;
                check_kind(expected, kind)?;
                let index = self.cursor.read_u16("pool index")?;
                let value = self.pool.get(index)?;
                if value.kind() != kind {
                    return Err(DecodeError::PoolKindMismatch {
                        expected: kind,
                        found: value.kind(),
                    });
                }
                Ok(Some(value.clone()))
            }
        }
    }

    fn read_pool_payload(&mut self, kind: PoolKind) -> Result<PoolValue, DecodeError> {
        let value = match kind {
            PoolKind::String => PoolValue::String(Arc::from(self.cursor.read_string("pooled string")?)),
            PoolKind::Class => PoolValue::Klass(Arc::new(self.read_klass_payload()?)),
            PoolKind::Enum => {
                let klass = required(self.read_klass()?, "enum class")?;
                let ordinal = self.cursor.read_i32("enum ordinal")?;
                let value = EnumValue { klass, ordinal };
                if value.name().is_none() {
                    return Err(DecodeError::InvalidEnumOrdinal {
                        klass: value.klass.name.clone(),
                        ordinal,
                    });
                }
                PoolValue::EnumValue(value)
            }
            PoolKind::Method => {
                let holder = required(self.read_klass()?, "method holder")?;
                let name = required(self.read_string_entry()?, "method name")?;
                let signature = required(self.read_signature()?, "method signature")?;
                let flags = self.cursor.read_i32("method flags")?;
                let bytecode = self.cursor.read_byte_block("method bytecode")?;
                PoolValue::Method(Arc::new(Method {
                    holder,
                    name,
                    signature,
                    flags,
                    bytecode,
                }))
            }
            PoolKind::Field => {
                let holder = required(self.read_klass()?, "field holder")?;
                let name = required(self.read_string_entry()?, "field name")?;
                let type_name = required(self.read_string_entry()?, "field type")?;
                let flags = self.cursor.read_i32("field flags")?;
                PoolValue::Field(Arc::new(Field {
                    holder,
                    name,
                    type_name,
                    flags,
                }))
            }
            PoolKind::Signature => {
                let argc = self.cursor.read_u16("signature argument count")?;
                let mut arg_types = Vec::with_capacity(argc as usize);
                for _ in 0..argc {
                    arg_types.push(required(self.read_string_entry()?, "argument type")?);
                }
                let return_type = required(self.read_string_entry()?, "return type")?;
                PoolValue::Signature(Arc::new(Signature {
                    return_type,
                    arg_types,
                }))
            }
            PoolKind::NodeClass => PoolValue::NodeClass(Arc::new(self.read_node_class_payload()?)),
            PoolKind::SourcePosition => {
                self.require_version("source positions", SOURCE_POSITIONS_SINCE)?;
                PoolValue::SourcePosition(Arc::new(self.read_source_position_payload()?))
            }
            PoolKind::Node => {
                self.require_version("pooled node references", LARGE_PROPERTIES_SINCE)?;
                let id = self.cursor.read_i32("node reference id")?;
                let node_class = required(self.read_node_class()?, "node reference class")?;
                PoolValue::NodeRef(NodeRef { id, node_class })
            }
        };
        Ok(value)
    }

    fn read_klass_payload(&mut self) -> Result<Klass, DecodeError> {
        let name = self.cursor.read_string("class name")?;
        match self.cursor.read_u8("class kind")? {
            KLASS => Ok(Klass::new(name)),
            ENUM_KLASS => {
                let count = self.cursor.read_length(MAX_ARRAY_LEN, "enum value count")?;
                let mut values = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    values.push(required(self.read_string_entry()?, "enum value name")?);
                }
                Ok(Klass::new_enum(name, values))
            }
            tag => Err(DecodeError::MalformedTag {
                context: "class kind",
                tag,
            }),
        }
    }

    fn read_node_class_payload(&mut self) -> Result<NodeClass, DecodeError> {
        let klass = required(self.read_klass()?, "node class type")?;
        let name_template = self.cursor.read_string("node name template")?;

        let input_count = self.cursor.read_u16("input port count")?;
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            let is_list = self.cursor.read_u8("input port kind")? != 0;
            let name = required(self.read_string_entry()?, "input port name")?;
            let input_type = self.read_enum_value()?;
            inputs.push(TypedPort::new(Port::new(name, is_list), input_type));
        }

        let successor_count = self.cursor.read_u16("successor port count")?;
        let mut successors = Vec::with_capacity(successor_count as usize);
        for _ in 0..successor_count {
            let is_list = self.cursor.read_u8("successor port kind")? != 0;
            let name = required(self.read_string_entry()?, "successor port name")?;
            successors.push(Port::new(name, is_list));
        }

        Ok(NodeClass {
            klass,
            name_template,
            inputs,
            successors,
        })
    }

    fn read_source_position_payload(&mut self) -> Result<SourcePosition, DecodeError> {
        if self.nesting >= self.options.max_nesting_depth {
            return Err(DecodeError::NestingTooDeep {
                max: self.options.max_nesting_depth,
            });
        }
        self.nesting += 1;

        let method = required(self.read_method()?, "position method")?;
        let bci = self.cursor.read_i32("position bci")?;
        let mut locations = Vec::new();
        while let Some(uri) = self.read_string_entry()? {
            let line = self.cursor.read_i32("location line")?;
            let start = self.cursor.read_i32("location start")?;
            let end = self.cursor.read_i32("location end")?;
            locations.push(Location { uri, line, start, end });
        }
        let caller = match self.read_pool_entry(Some(PoolKind::SourcePosition))? {
            Some(PoolValue::SourcePosition(p)) => Some(p),
            Some(other) => return Err(mismatch(PoolKind::SourcePosition, &other)),
            None => None,
        };

        self.nesting -= 1;
        Ok(SourcePosition {
            method,
            bci,
            locations,
            caller,
        })
    }

    // Typed pool reads. Each accepts only its own kind or null.

    fn read_string_entry(&mut self) -> Result<Option<String>, DecodeError> {
        match self.read_pool_entry(Some(PoolKind::String))? {
            Some(PoolValue::String(s)) => Ok(Some(s.to_string())),
            Some(other) => Err(mismatch(PoolKind::String, &other)),
            None => Ok(None),
        }
    }

    fn read_klass(&mut self) -> Result<Option<Arc<Klass>>, DecodeError> {
        match self.read_pool_entry(Some(PoolKind::Class))? {
            Some(PoolValue::Klass(k)) => Ok(Some(k)),
            Some(other) => Err(mismatch(PoolKind::Class, &other)),
            None => Ok(None),
        }
    }

    fn read_enum_value(&mut self) -> Result<Option<EnumValue>, DecodeError> {
        match self.read_pool_entry(Some(PoolKind::Enum))? {
            Some(PoolValue::EnumValue(e)) => Ok(Some(e)),
            Some(other) => Err(mismatch(PoolKind::Enum, &other)),
            None => Ok(None),
        }
    }

    fn read_method(&mut self) -> Result<Option<Arc<Method>>, DecodeError> {
        match self.read_pool_entry(Some(PoolKind::Method))? {
            Some(PoolValue::Method(m)) => Ok(Some(m)),
            Some(other) => Err(mismatch(PoolKind::Method, &other)),
            None => Ok(None),
        }
    }

    fn read_signature(&mut self) -> Result<Option<Arc<Signature>>, DecodeError> {
        match self.read_pool_entry(Some(PoolKind::Signature))? {
            Some(PoolValue::Signature(s)) => Ok(Some(s)),
            Some(other) => Err(mismatch(PoolKind::Signature, &other)),
            None => Ok(None),
        }
    }

    fn read_node_class(&mut self) -> Result<Option<Arc<NodeClass>>, DecodeError> {
        match self.read_pool_entry(Some(PoolKind::NodeClass))? {
            Some(PoolValue::NodeClass(c)) => Ok(Some(c)),
            Some(other) => Err(mismatch(PoolKind::NodeClass, &other)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Recovery and teardown
    // =========================================================================

    fn require_version(&self, feature: &'static str, required: Version) -> Result<(), DecodeError> {
        let found = self.version();
        if found.supports(required) {
            Ok(())
        } else {
            Err(DecodeError::FeatureNotInVersion {
                feature,
                required,
                found,
            })
        }
    }

    fn sync(&self) {
        self.control.set_position(self.cursor.position());
    }

    /// Abandons the current root item; returns false if the skip ran past
    /// the end of the stream.
    fn recover(&mut self, skip: SkipRoot) -> Result<bool, DecodeError> {
        self.cursor.cancel_digest();
        self.builder.truncate_context(self.root_depth);
        self.open.truncate(self.root_open);

        let position = self.cursor.position();
        if skip.end < position {
            warn!(end = skip.end, position, "skip target behind current position");
        }
        debug!(from = position, to = skip.end, "skipping root item");
        match self.cursor.skip(skip.end.saturating_sub(position)) {
            Ok(()) => {}
            Err(DecodeError::TruncatedInput { .. }) => {
                debug!(end = skip.end, "skip target past end of stream");
                return Ok(false);
            }
            Err(err) => return Err(err),
        }
        if let Some(pool) = skip.pool {
            self.pool = pool;
        }
        Ok(true)
    }

    fn abort(&mut self, err: &DecodeError) {
        self.cursor.cancel_digest();
        warn!(error = %err, offset = self.cursor.position(), "decoding failed");
        let context = [format!("offset {}", self.cursor.position())];
        self.builder.report_loading_error(&err.to_string(), &context);
        self.flush_open();
    }

    /// Closes every open builder entity, innermost first.
    fn flush_open(&mut self) {
        while let Some(open) = self.open.pop() {
            match open {
                Open::Header => {
                    let _ = self.builder.end_document_header();
                }
                Open::Group => self.builder.end_group(),
                Open::Graph => {
                    self.builder.make_block_edges();
                    self.builder.make_graph_edges();
                    self.builder.end_graph();
                }
                Open::Node(id) => self.builder.end_node(id),
                Open::Block(id) => self.builder.end_block(id),
            }
        }
    }
}

fn check_kind(expected: Option<PoolKind>, found: PoolKind) -> Result<(), DecodeError> {
    match expected {
        Some(expected) if expected != found => Err(DecodeError::PoolKindMismatch { expected, found }),
        _ => Ok(()),
    }
}

fn mismatch(expected: PoolKind, found: &PoolValue) -> DecodeError {
    DecodeError::PoolKindMismatch {
        expected,
        found: found.kind(),
    }
}

fn required<T>(value: Option<T>, context: &'static str) -> Result<T, DecodeError> {
    value.ok_or(DecodeError::MalformedTag {
        context,
        tag: POOL_NULL,
    })
}

/// Decodes `reader` into a [`Document`](crate::model::Document) with a
/// default [`ModelBuilder`].
///
/// Never fails outright: a fatal error is returned in
/// [`LoadReport::failure`] next to the partial document.
pub fn decode_document<R: Read>(reader: R) -> LoadReport {
    decode_document_with(reader, ModelBuilder::new(), DecodeOptions::default())
}

/// Decodes `reader` with a configured [`ModelBuilder`].
pub fn decode_document_with<R: Read>(reader: R, builder: ModelBuilder, options: DecodeOptions) -> LoadReport {
    let mut decoder = Decoder::with_options(reader, builder, options);
    let failure = decoder.parse().err();
    let mut report = decoder.into_builder().finish();
    report.failure = failure;
    report
}
