//! Simple decoder to inspect BGV dumps (plain or zstd-compressed).
//!
//! Set `RUST_LOG=bgv=debug` to watch headers, pool restarts and skips.

use std::fs::File;

use bgv::{Graph, Group, GroupElement, Value, decode_document, open_dump};
use tracing_subscriber::EnvFilter;

fn format_value(v: &Value) -> String {
    match v {
        Value::String(s) => {
            let preview: String = s.chars().take(60).collect();
            if s.chars().count() > 60 {
                format!("\"{}...\"", preview)
            } else {
                format!("\"{}\"", preview)
            }
        }
        Value::IntArray(items) => format!("int[{}]", items.len()),
        Value::DoubleArray(items) => format!("double[{}]", items.len()),
        Value::PoolArray(items) => format!("pool[{}]", items.len()),
        Value::Graph(g) => format!("GRAPH({} nodes)", g.nodes.len()),
        other => other.to_string(),
    }
}

fn print_graph(graph: &Graph, indent: usize) {
    let pad = "  ".repeat(indent);
    let duplicate = if graph.is_duplicate() { " (duplicate)" } else { "" };
    println!(
        "{}[{}] {}: {} nodes, {} edges, {} blocks{}",
        pad,
        graph.dump_id,
        graph.title(),
        graph.nodes.len(),
        graph.edges.len(),
        graph.blocks.len(),
        duplicate
    );
    for node in graph.nodes.iter().take(5) {
        println!(
            "{}    {} {}",
            pad,
            node.id,
            node.name().unwrap_or(&node.node_class.klass.simple_name)
        );
        for (key, value) in node.properties.iter().take(3) {
            println!("{}        {} = {}", pad, key, format_value(value));
        }
    }
    if graph.nodes.len() > 5 {
        println!("{}    ... and {} more nodes", pad, graph.nodes.len() - 5);
    }
}

fn print_group(group: &Group, indent: usize) {
    let pad = "  ".repeat(indent);
    match &group.method {
        Some(method) => println!("{}{} ({}.{})", pad, group.name, method.holder.name, method.name),
        None => println!("{}{}", pad, group.name),
    }
    for element in &group.elements {
        match element {
            GroupElement::Graph(graph) => print_graph(graph, indent + 1),
            GroupElement::Group(child) => print_group(child, indent + 1),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "dump.bgv".to_string());
    println!("Reading: {}", path);

    let file = File::open(&path).expect("Failed to open file");
    let reader = open_dump(file).expect("Failed to read dump");
    if reader.is_compressed() {
        println!("zstd-compressed");
    }

    let report = decode_document(reader);

    println!("\n=== Stream {} ===", report.stream);
    for (key, value) in report.document.properties.iter() {
        println!("  {} = {}", key, format_value(value));
    }

    println!("\n=== Groups ({}) ===", report.document.groups.len());
    for group in &report.document.groups {
        print_group(group, 0);
    }

    if !report.errors.is_empty() {
        println!("\n=== Loading errors ({}) ===", report.errors.len());
        for error in &report.errors {
            println!("  {}", error);
        }
    }
    if let Some(failure) = &report.failure {
        println!("\nDecoding stopped: {}", failure);
        std::process::exit(1);
    }
}
