use std::fmt::Write as _;

use super::DiagramRenderer;
use crate::model::{DiagramEdge, DiagramNode, DiagramSpec, EdgeStyle, NodeShape, TimingProvenance};

const MEASURED_STROKE: &str = "stroke:#e53935,stroke-width:2px";

/// Mermaid flowchart source. Measured elements get a red stroke.
#[derive(Debug, Clone, Copy, Default)]
pub struct MermaidRenderer;

fn escape(text: &str) -> String {
    text.replace('"', "#quot;")
}

fn node_line(node: &DiagramNode) -> String {
    let label = escape(&node.label);
    match node.shape {
        NodeShape::Box => format!("{}[\"{label}\"]", node.id),
        NodeShape::Store => format!("{}[(\"{label}\")]", node.id),
    }
}

fn edge_line(edge: &DiagramEdge) -> String {
    let arrow = match edge.style {
        EdgeStyle::Request => "-->",
        EdgeStyle::RoundTrip => "<-->",
        EdgeStyle::Link => "---",
        EdgeStyle::Async => "-.->",
        EdgeStyle::Idle => "-.-",
    };
    match edge.label.as_deref().or(edge.annotation.as_deref()) {
        Some(text) => format!("{} {arrow}|\"{}\"| {}", edge.from, escape(text), edge.to),
        None => format!("{} {arrow} {}", edge.from, edge.to),
    }
}

impl DiagramRenderer for MermaidRenderer {
    fn name(&self) -> &'static str {
        "mermaid"
    }

    fn render(&self, spec: &DiagramSpec) -> String {
        let mut out = String::from("graph TD\n");
        if let Some(caption) = spec.caption() {
            let _ = writeln!(out, "    %% {}", caption.replace(['\r', '\n'], " "));
        }
        if spec.provenance == TimingProvenance::Estimated {
            out.push_str("    %% estimated timings\n");
        }
        for node in &spec.nodes {
            let _ = writeln!(out, "    {}", node_line(node));
        }
        for edge in &spec.edges {
            let _ = writeln!(out, "    {}", edge_line(edge));
        }
        for node in spec.nodes.iter().filter(|n| n.measured) {
            let _ = writeln!(out, "    style {} {MEASURED_STROKE}", node.id);
        }
        for (index, _) in spec.edges.iter().enumerate().filter(|(_, e)| e.measured) {
            let _ = writeln!(out, "    linkStyle {index} {MEASURED_STROKE}");
        }
        out
    }
}
