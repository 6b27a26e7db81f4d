mod mermaid;
mod text;

pub use mermaid::MermaidRenderer;
pub use text::TextRenderer;

use crate::model::DiagramSpec;

/// Turns a structured spec into one concrete textual format.
pub trait DiagramRenderer {
    fn name(&self) -> &'static str;

    fn render(&self, spec: &DiagramSpec) -> String;
}
