use std::fmt::Write as _;

use flowlens_types::timing::FlowKind;

use super::DiagramRenderer;
use crate::model::{DiagramSpec, EdgeStyle, TimingProvenance};

/// Plain one-line-per-edge listing, used by the terminal dashboard.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl TextRenderer {
    /// Rendered lines without the trailing newline, ready for a widget.
    pub fn lines(&self, spec: &DiagramSpec) -> Vec<String> {
        let mut lines = Vec::with_capacity(spec.edges.len() + 2);
        let provenance = match spec.provenance {
            TimingProvenance::Measured => "",
            TimingProvenance::Estimated => ", estimated",
        };
        let flow = match spec.flow {
            FlowKind::Read => "read",
            FlowKind::Write => "write",
        };
        lines.push(format!("{} ({flow}{provenance})", spec.architecture.title()));
        if let Some(caption) = spec.caption() {
            lines.push(caption);
        }

        let label_of = |id: &str| {
            spec.node(id)
                .map(|n| n.label.clone())
                .unwrap_or_else(|| id.to_string())
        };
        let width = spec
            .edges
            .iter()
            .map(|e| label_of(&e.from).len() + label_of(&e.to).len() + 5)
            .max()
            .unwrap_or(0);

        for edge in &spec.edges {
            let arrow = match edge.style {
                EdgeStyle::Request => "->",
                EdgeStyle::RoundTrip => "<->",
                EdgeStyle::Link => "--",
                EdgeStyle::Async => "~>",
                EdgeStyle::Idle => "..",
            };
            let path = format!("{} {arrow} {}", label_of(&edge.from), label_of(&edge.to));
            let mut line = format!("  {path:<width$}");
            match (&edge.label, &edge.annotation) {
                (Some(label), _) => {
                    let _ = write!(line, " {label}");
                    if edge.measured {
                        line.push_str(" *");
                    }
                }
                (None, Some(annotation)) => {
                    let _ = write!(line, " ({annotation})");
                }
                (None, None) => line.push_str(" -"),
            }
            lines.push(line.trim_end().to_string());
        }
        lines
    }
}

impl DiagramRenderer for TextRenderer {
    fn name(&self) -> &'static str {
        "text"
    }

    fn render(&self, spec: &DiagramSpec) -> String {
        let mut out = self.lines(spec).join("\n");
        out.push('\n');
        out
    }
}
