//! Benchmark for BGV encoding and decoding on synthetic compiler graphs.
//!
//! Usage: `bgv-bench [graphs] [nodes-per-graph] [--json summary.json]`

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bgv::model::{Block, EnumValue, Klass, Method, NodeClass, Port, Signature, TypedPort};
use bgv::{
    Decoder, Document, EncodeOptions, Graph, Group, GroupElement, Node, NullBuilder, PoolValue,
    Value, decode_document, encode_document, open_dump,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

// =============================================================================
// SYNTHETIC GRAPHS
// =============================================================================

struct Classes {
    start: Arc<NodeClass>,
    constant: Arc<NodeClass>,
    add: Arc<NodeClass>,
    phi: Arc<NodeClass>,
    ret: Arc<NodeClass>,
}

impl Classes {
    fn new() -> Self {
        let input_type = Arc::new(Klass::new_enum(
            "bench.InputType",
            vec!["Value".to_string(), "Memory".to_string(), "Guard".to_string()],
        ));
        let value = Some(EnumValue {
            klass: input_type,
            ordinal: 0,
        });
        let class = |name: &str, template: &str, inputs: Vec<TypedPort>, successors: Vec<Port>| {
            Arc::new(NodeClass {
                klass: Arc::new(Klass::new(format!("bench.nodes.{}", name))),
                name_template: template.to_string(),
                inputs,
                successors,
            })
        };
        Self {
            start: class("StartNode", "", Vec::new(), vec![Port::new("next", false)]),
            constant: class("ConstantNode", "C({p#rawvalue})", Vec::new(), Vec::new()),
            add: class(
                "AddNode",
                "+",
                vec![
                    TypedPort::new(Port::new("x", false), value.clone()),
                    TypedPort::new(Port::new("y", false), value.clone()),
                ],
                Vec::new(),
            ),
            phi: class(
                "ValuePhiNode",
                "Phi({i#values})",
                vec![TypedPort::new(Port::new("values", true), value.clone())],
                Vec::new(),
            ),
            ret: class(
                "ReturnNode",
                "",
                vec![TypedPort::new(Port::new("result", false), value)],
                Vec::new(),
            ),
        }
    }
}

fn method(index: usize) -> Arc<Method> {
    Arc::new(Method {
        holder: Arc::new(Klass::new(format!("bench.Workload{}", index % 7))),
        name: format!("compute{}", index),
        signature: Arc::new(Signature {
            return_type: "long".to_string(),
            arg_types: vec!["long".to_string(), "int".to_string()],
        }),
        flags: 0x9,
        bytecode: Some(vec![0x1e, 0x1b, 0x85, 0x61, 0xad]),
    })
}

/// A chain of constants summed pairwise, merged by phis, ending in a return.
fn build_graph(classes: &Classes, dump_id: i32, phase: &str, nodes: usize) -> Graph {
    let mut graph = Graph::new(dump_id, "%s", vec![Value::from(phase)]);
    graph.properties.set("type", "phase");
    graph.properties.set("compilationId", dump_id as i64 * 31);

    graph.nodes.push(Node::new(0, classes.start.clone()));
    let mut last = 0;
    for id in 1..nodes.max(2) as i32 - 1 {
        let node = match id % 3 {
            0 => {
                let mut node = Node::new(id, classes.constant.clone());
                node.properties.set("rawvalue", id as i64);
                node.properties.set("stamp", "i64");
                node
            }
            1 => Node::new(id, classes.add.clone()),
            _ => Node::new(id, classes.phi.clone()),
        };
        graph.nodes.push(node);
        match id % 3 {
            1 => {
                graph.connect_input(last, id, 0, None);
                graph.connect_input((id - 2).max(0), id, 1, None);
            }
            2 => {
                graph.connect_input(last, id, 0, Some(0));
                graph.connect_input((id - 1).max(0), id, 0, Some(1));
            }
            _ => {}
        }
        last = id;
    }
    let ret = nodes.max(2) as i32 - 1;
    graph.nodes.push(Node::new(ret, classes.ret.clone()));
    graph.connect_input(last, ret, 0, None);
    graph.connect_successor(0, ret, 0, None);

    let mut block = Block::new(0);
    block.nodes = graph.nodes.iter().map(|n| n.id).collect();
    graph.blocks.push(block);
    graph
}

fn build_document(graphs: usize, nodes: usize) -> Document {
    let classes = Classes::new();
    let mut document = Document::new();
    document.properties.set("vm", "bench");
    let phases = ["After parsing", "After inlining", "After lowering", "Final"];

    for index in 0..graphs.div_ceil(phases.len()) {
        let method = method(index);
        let mut group = Group::new(
            format!("{}.{}", method.holder.name, method.name),
            method.name.clone(),
        );
        group.method = Some(method.clone());
        group.bci = 0;
        group
            .properties
            .set("method", Value::Pooled(PoolValue::Method(method)));

        for (phase_index, phase) in phases.iter().enumerate() {
            let dump_id = (index * phases.len() + phase_index) as i32;
            if dump_id as usize >= graphs {
                break;
            }
            group
                .elements
                .push(GroupElement::Graph(build_graph(&classes, dump_id, phase, nodes)));
        }
        document.groups.push(group);
    }
    document
}

// =============================================================================
// REPORTING
// =============================================================================

#[derive(Serialize)]
struct Summary {
    graphs: usize,
    nodes_per_graph: usize,
    encoded_bytes: usize,
    compressed_bytes: usize,
    encode_ms: f64,
    compress_ms: f64,
    decode_ms: f64,
    decode_compressed_ms: f64,
    scan_ms: f64,
    loading_errors: usize,
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn throughput(bytes: usize, d: Duration) -> f64 {
    (bytes as f64 / 1_000_000.0) / d.as_secs_f64()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let json_path = args
        .iter()
        .position(|a| a == "--json")
        .and_then(|i| args.get(i + 1).cloned());
    let mut numbers = args.iter().filter_map(|a| a.parse::<usize>().ok());
    let graphs = numbers.next().unwrap_or(400);
    let nodes = numbers.next().unwrap_or(500);

    let build_start = Instant::now();
    let document = build_document(graphs, nodes);
    println!(
        "Built {} graphs of {} nodes in {:?}",
        document.graphs().count(),
        nodes,
        build_start.elapsed()
    );

    // Benchmark encoding (uncompressed)
    let encode_start = Instant::now();
    let encoded = encode_document(&document, EncodeOptions::new()).expect("Failed to encode");
    let encode_time = encode_start.elapsed();
    println!("\nUncompressed: {} bytes in {:?}", encoded.len(), encode_time);
    println!("  Throughput: {:.2} MB/s", throughput(encoded.len(), encode_time));

    // Benchmark encoding (compressed)
    let compress_start = Instant::now();
    let compressed = encode_document(&document, EncodeOptions::new().compressed(3))
        .expect("Failed to compress");
    let compress_time = compress_start.elapsed();
    println!("\nCompressed (level 3): {} bytes in {:?}", compressed.len(), compress_time);
    println!(
        "  Compression ratio: {:.1}x",
        encoded.len() as f64 / compressed.len() as f64
    );

    // Benchmark decoding into the document model
    let decode_start = Instant::now();
    let report = decode_document(encoded.as_slice());
    let decode_time = decode_start.elapsed();
    println!("\nDecode: {:?}", decode_time);
    println!("  Throughput: {:.2} MB/s", throughput(encoded.len(), decode_time));
    if let Some(failure) = &report.failure {
        println!("  FAILED: {}", failure);
    }

    let mut decoded = report.document;
    decoded.strip_derived();
    assert_eq!(decoded, document, "Round trip should preserve the document");
    let loading_errors = report.errors.len();

    let unzip_start = Instant::now();
    let unzipped = decode_document(open_dump(compressed.as_slice()).expect("Failed to open dump"));
    let unzip_time = unzip_start.elapsed();
    println!("\nDecode (compressed): {:?}", unzip_time);
    if let Some(failure) = &unzipped.failure {
        println!("  FAILED: {}", failure);
    }

    // Benchmark a scan that builds nothing
    let scan_start = Instant::now();
    let mut decoder = Decoder::new(encoded.as_slice(), NullBuilder::new());
    decoder.parse().expect("Failed to scan");
    let scan_time = scan_start.elapsed();
    let counts = decoder.into_builder();
    println!(
        "\nScan: {} groups, {} graphs, {} nodes in {:?}",
        counts.groups, counts.graphs, counts.nodes, scan_time
    );
    println!("  Throughput: {:.2} MB/s", throughput(encoded.len(), scan_time));

    if let Some(path) = json_path {
        let summary = Summary {
            graphs,
            nodes_per_graph: nodes,
            encoded_bytes: encoded.len(),
            compressed_bytes: compressed.len(),
            encode_ms: ms(encode_time),
            compress_ms: ms(compress_time),
            decode_ms: ms(decode_time),
            decode_compressed_ms: ms(unzip_time),
            scan_ms: ms(scan_time),
            loading_errors,
        };
        let json = serde_json::to_string_pretty(&summary).expect("Failed to serialize summary");
        fs::write(&path, json).expect("Failed to write summary");
        println!("\nWrote summary to {}", path);
    }
}
