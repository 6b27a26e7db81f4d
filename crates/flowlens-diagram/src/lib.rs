//! Timing-aware architecture diagrams.
//!
//! [`DiagramBuilder`] turns timing snapshots into a structured [`DiagramSpec`];
//! renderers in [`render`] translate a spec into a concrete textual format.

pub mod builder;
pub mod estimate;
pub mod model;
pub mod render;

pub use builder::{infer_overhead, DiagramBuilder};
pub use model::{DiagramEdge, DiagramNode, DiagramSpec, EdgeStyle, NodeRole, NodeShape, TimingProvenance};
pub use render::{DiagramRenderer, MermaidRenderer, TextRenderer};
