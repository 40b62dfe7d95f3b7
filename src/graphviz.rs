use std::fmt::Write;

use crate::graph_def::{GraphDef, NodeDef};

/// Render `graph` in Graphviz DOT syntax.
pub fn graph_def_to_dot(graph: &GraphDef) -> String {
    let mut dot = String::from("digraph graphloom {\n");
    dot.push_str("  rankdir=LR;\n");
    dot.push_str("  node [fontname=\"Helvetica\"];\n");
    dot.push_str("  edge [fontname=\"Helvetica\"];\n\n");

    for node in graph.nodes() {
        let fill = if node.in_edges().is_empty() {
            "#d0e6ff"
        } else if node.out_edges().is_empty() {
            "#d6f5d6"
        } else {
            "#f0f0f0"
        };
        let label_lines = [
            format!("{} (#{})", node.name(), node.id()),
            format!("op: {}", node.op_name()),
            format!("device: {}", node.device()),
            format_dtypes(node),
        ];
        let label = escape_label(&label_lines.join("\n"));
        let _ = writeln!(
            dot,
            "  node_{} [shape=box,style=\"rounded,filled\",fillcolor=\"{}\",label=\"{}\"];",
            node.id(),
            fill,
            label
        );
    }

    dot.push('\n');

    for edge in graph.edges() {
        let _ = writeln!(
            dot,
            "  node_{} -> node_{} [label=\"out{} -> in{}\"];",
            edge.src, edge.dest, edge.src_slot, edge.dest_slot
        );
    }

    dot.push_str("}\n");
    dot
}

fn escape_label(label: &str) -> String {
    label
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn format_dtypes(node: &NodeDef) -> String {
    node.out_dtypes()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
