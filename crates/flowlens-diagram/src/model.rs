use flowlens_types::{timing::FlowKind, Architecture};
use serde::{Deserialize, Serialize};

/// Whether the numbers in a spec were measured or derived from placeholder ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingProvenance {
    Measured,
    Estimated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeShape {
    Box,
    /// Drawn as a cylinder by renderers that support it.
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Client,
    Gateway,
    Service,
    Store,
    Broker,
    Source,
    Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub id: String,
    pub label: String,
    pub shape: NodeShape,
    pub role: NodeRole,
    /// Real timing exists for the stage this node represents.
    pub measured: bool,
}

impl DiagramNode {
    pub fn new(id: &str, label: &str, role: NodeRole) -> Self {
        let shape = match role {
            NodeRole::Store => NodeShape::Store,
            _ => NodeShape::Box,
        };
        Self {
            id: id.to_string(),
            label: label.to_string(),
            shape,
            role,
            measured: false,
        }
    }

    pub fn measured_if(mut self, measured: bool) -> Self {
        self.measured = measured;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeStyle {
    /// One-way synchronous call.
    Request,
    /// Call and response, timed as a round trip.
    RoundTrip,
    /// Plain association, e.g. a service and its own database.
    Link,
    /// Asynchronous hand-off.
    Async,
    /// Path that exists but carried no timing this time.
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub from: String,
    pub to: String,
    pub style: EdgeStyle,
    pub latency_ms: Option<u64>,
    /// Present exactly when `latency_ms` is.
    pub label: Option<String>,
    pub measured: bool,
    /// Static wording such as `async`; never a timing.
    pub annotation: Option<String>,
}

impl DiagramEdge {
    pub fn new(from: &str, to: &str, style: EdgeStyle) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            style,
            latency_ms: None,
            label: None,
            measured: false,
            annotation: None,
        }
    }

    pub fn annotated(mut self, annotation: &str) -> Self {
        self.annotation = Some(annotation.to_string());
        self
    }

    pub fn is_labeled(&self) -> bool {
        self.label.is_some()
    }
}

/// Fully-specified directed graph describing one flow of one architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramSpec {
    pub architecture: Architecture,
    pub flow: FlowKind,
    pub provenance: TimingProvenance,
    /// Entity the flow is about, shown as a caption.
    pub subject: Option<String>,
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
}

impl DiagramSpec {
    pub fn node(&self, id: &str) -> Option<&DiagramNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&DiagramEdge> {
        self.edges.iter().find(|e| e.from == from && e.to == to)
    }

    pub fn labeled_edges(&self) -> impl Iterator<Item = &DiagramEdge> {
        self.edges.iter().filter(|e| e.is_labeled())
    }

    pub fn caption(&self) -> Option<String> {
        let subject = self.subject.as_deref()?;
        Some(match self.flow {
            FlowKind::Write => format!("Write: {subject}"),
            FlowKind::Read => format!("Read: {subject}"),
        })
    }
}
