use flowlens_types::{
    config::EstimationConfig,
    timing::{FlowKind, MutationTiming, PropagationStatus, StageTiming},
    Architecture,
};

use crate::{
    estimate::estimate_stage_timing,
    model::{DiagramEdge, DiagramNode, DiagramSpec, EdgeStyle, NodeRole, TimingProvenance},
};

/// Portion of `total` not explained by the slowest of `parts`.
///
/// Returns `None` unless `total` and at least one part were measured; a
/// slowest part larger than the total clamps to zero.
pub fn infer_overhead(total: Option<u64>, parts: &[Option<u64>]) -> Option<u64> {
    let total = total?;
    let slowest = parts.iter().flatten().copied().max()?;
    Some(total.saturating_sub(slowest))
}

/// Builds diagram specs from timing snapshots. Holds no state besides its
/// configuration, so equal inputs always produce equal specs.
#[derive(Debug, Clone, Default)]
pub struct DiagramBuilder {
    estimation: Option<EstimationConfig>,
}

impl DiagramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow estimated read diagrams while only a client round trip is known.
    pub fn with_estimation(ratios: EstimationConfig) -> Self {
        Self {
            estimation: Some(ratios),
        }
    }

    pub fn from_config(ratios: &EstimationConfig) -> Self {
        if ratios.enabled {
            Self::with_estimation(ratios.clone())
        } else {
            Self::new()
        }
    }

    /// Write flow while a timed mutation is present, read flow otherwise.
    pub fn build(
        &self,
        architecture: Architecture,
        stage: &StageTiming,
        mutation: Option<&MutationTiming>,
    ) -> DiagramSpec {
        match mutation.filter(|m| m.is_present()) {
            Some(mutation) => self.build_write(architecture, mutation),
            None => self.build_read(architecture, stage),
        }
    }

    pub fn build_read(&self, architecture: Architecture, stage: &StageTiming) -> DiagramSpec {
        if let (Some(ratios), Some(total)) = (&self.estimation, stage.total) {
            if !stage.has_stage_measurements() {
                let estimated = estimate_stage_timing(architecture, total, ratios);
                return read_spec(architecture, &estimated, TimingProvenance::Estimated);
            }
        }
        read_spec(architecture, stage, TimingProvenance::Measured)
    }

    pub fn build_write(&self, architecture: Architecture, mutation: &MutationTiming) -> DiagramSpec {
        let mut spec = match architecture {
            Architecture::SyncFederated => federated_write(mutation),
            Architecture::AsyncProjected => projected_write(mutation),
        };
        spec.subject = Some(
            mutation
                .entity_name
                .clone()
                .unwrap_or_else(|| "New Person".to_string()),
        );
        spec
    }
}

fn read_spec(
    architecture: Architecture,
    stage: &StageTiming,
    provenance: TimingProvenance,
) -> DiagramSpec {
    let (nodes, edges) = match architecture {
        Architecture::SyncFederated => federated_read(stage, provenance),
        Architecture::AsyncProjected => projected_read(stage, provenance),
    };
    DiagramSpec {
        architecture,
        flow: FlowKind::Read,
        provenance,
        subject: None,
        nodes,
        edges,
    }
}

fn format_label(value: u64, provenance: TimingProvenance) -> String {
    match provenance {
        TimingProvenance::Measured => format!("{value}ms"),
        TimingProvenance::Estimated => format!("~{value}ms"),
    }
}

fn timed(
    mut edge: DiagramEdge,
    value: Option<u64>,
    provenance: TimingProvenance,
) -> DiagramEdge {
    edge.latency_ms = value;
    edge.label = value.map(|v| format_label(v, provenance));
    edge.measured = value.is_some() && provenance == TimingProvenance::Measured;
    edge
}

/// Read-flow edges fall back to the idle style when nothing was timed.
fn timed_or_idle(
    from: &str,
    to: &str,
    style: EdgeStyle,
    value: Option<u64>,
    provenance: TimingProvenance,
) -> DiagramEdge {
    let style = if value.is_some() { style } else { EdgeStyle::Idle };
    timed(DiagramEdge::new(from, to, style), value, provenance)
}

fn node(
    id: &str,
    label: &str,
    role: NodeRole,
    value: Option<u64>,
    provenance: TimingProvenance,
) -> DiagramNode {
    DiagramNode::new(id, label, role)
        .measured_if(value.is_some() && provenance == TimingProvenance::Measured)
}

fn federated_read(
    stage: &StageTiming,
    provenance: TimingProvenance,
) -> (Vec<DiagramNode>, Vec<DiagramEdge>) {
    let reported = match (stage.network, stage.router) {
        (None, None) => None,
        (network, router) => Some(network.unwrap_or(0) + router.unwrap_or(0)),
    };
    let overhead = reported.or_else(|| {
        infer_overhead(stage.total, &[stage.hr, stage.employment, stage.security])
    });

    let nodes = vec![
        DiagramNode::new("Client", "Client", NodeRole::Client),
        node("Router", "Router", NodeRole::Gateway, overhead, provenance),
        node("HR", "HR Subgraph", NodeRole::Service, stage.hr, provenance),
        node("Emp", "Employment", NodeRole::Service, stage.employment, provenance),
        node("Sec", "Security", NodeRole::Service, stage.security, provenance),
        node("HR_DB", "HR DB", NodeRole::Store, stage.hr_db, provenance),
        node("Emp_DB", "Emp DB", NodeRole::Store, stage.employment_db, provenance),
        node("Sec_DB", "Sec DB", NodeRole::Store, stage.security_db, provenance),
    ];
    let edges = vec![
        timed_or_idle("Client", "Router", EdgeStyle::RoundTrip, overhead, provenance),
        timed_or_idle("Router", "HR", EdgeStyle::RoundTrip, stage.hr, provenance),
        timed_or_idle("Router", "Emp", EdgeStyle::RoundTrip, stage.employment, provenance),
        timed_or_idle("Router", "Sec", EdgeStyle::RoundTrip, stage.security, provenance),
        timed_or_idle("HR", "HR_DB", EdgeStyle::Link, stage.hr_db, provenance),
        timed_or_idle("Emp", "Emp_DB", EdgeStyle::Link, stage.employment_db, provenance),
        timed_or_idle("Sec", "Sec_DB", EdgeStyle::Link, stage.security_db, provenance),
    ];
    (nodes, edges)
}

fn projected_read(
    stage: &StageTiming,
    provenance: TimingProvenance,
) -> (Vec<DiagramNode>, Vec<DiagramEdge>) {
    let overhead = stage
        .network
        .or_else(|| infer_overhead(stage.total, &[stage.query_service]));

    let nodes = vec![
        DiagramNode::new("Client", "Client", NodeRole::Client),
        node("QS", "Projection Svc", NodeRole::Service, stage.query_service, provenance),
        node("Local", "Local Projections", NodeRole::Store, stage.db, provenance),
        DiagramNode::new("Sources", "Source Services", NodeRole::Source),
        DiagramNode::new("Kafka", "Kafka", NodeRole::Broker),
        DiagramNode::new("Consumer", "Consumer", NodeRole::Service),
    ];
    let edges = vec![
        timed_or_idle("Client", "QS", EdgeStyle::RoundTrip, overhead, provenance),
        timed_or_idle("QS", "Local", EdgeStyle::Link, stage.db, provenance),
        DiagramEdge::new("Sources", "Kafka", EdgeStyle::Request),
        DiagramEdge::new("Kafka", "Consumer", EdgeStyle::Request),
        DiagramEdge::new("Consumer", "Local", EdgeStyle::Async).annotated("async"),
    ];
    (nodes, edges)
}

fn write_spec(
    architecture: Architecture,
    nodes: Vec<DiagramNode>,
    edges: Vec<DiagramEdge>,
) -> DiagramSpec {
    DiagramSpec {
        architecture,
        flow: FlowKind::Write,
        provenance: TimingProvenance::Measured,
        subject: None,
        nodes,
        edges,
    }
}

fn federated_write(m: &MutationTiming) -> DiagramSpec {
    let measured = TimingProvenance::Measured;
    let nodes = vec![
        DiagramNode::new("Client", "Client", NodeRole::Client),
        node("Router", "Router", NodeRole::Gateway, m.router_overhead_ms, measured),
        node("HR", "HR Subgraph", NodeRole::Service, m.service_ms, measured),
        node("HR_DB", "HR DB", NodeRole::Store, m.db_write_ms, measured),
        node("Response", "Response", NodeRole::Outcome, m.mutation_ms, measured),
    ];
    let edges = vec![
        timed(
            DiagramEdge::new("Client", "Router", EdgeStyle::Request),
            m.router_overhead_ms,
            measured,
        ),
        timed(
            DiagramEdge::new("Router", "HR", EdgeStyle::Request),
            m.service_ms,
            measured,
        ),
        timed(
            DiagramEdge::new("HR", "HR_DB", EdgeStyle::Request),
            m.db_write_ms,
            measured,
        ),
        DiagramEdge::new("HR_DB", "Response", EdgeStyle::Async).annotated("committed"),
        timed(
            DiagramEdge::new("Response", "Client", EdgeStyle::Async),
            m.mutation_ms,
            measured,
        ),
    ];
    write_spec(Architecture::SyncFederated, nodes, edges)
}

fn projected_write(m: &MutationTiming) -> DiagramSpec {
    let measured = TimingProvenance::Measured;
    let nodes = vec![
        DiagramNode::new("Client", "Client", NodeRole::Client),
        node("Events", "HR Events Svc", NodeRole::Service, m.mutation_ms, measured),
        node("DB", "HR DB", NodeRole::Store, m.db_write_ms, measured),
        node("Outbox", "Outbox", NodeRole::Store, m.outbox_write_ms, measured),
        node("Kafka", "Kafka", NodeRole::Broker, m.outbox_to_broker_ms, measured),
        node(
            "Consumer",
            "Consumer",
            NodeRole::Service,
            m.consumer_to_projection_ms,
            measured,
        ),
        node(
            "Projection",
            "Projection",
            NodeRole::Store,
            m.consumer_to_projection_ms,
            measured,
        ),
        node("Ready", "Query Ready", NodeRole::Outcome, m.propagation_ms, measured),
    ];

    let mut ready = timed(
        DiagramEdge::new("Projection", "Ready", EdgeStyle::Async),
        m.propagation_ms,
        measured,
    );
    if matches!(
        m.propagation,
        PropagationStatus::TimedOut | PropagationStatus::Unmeasurable
    ) {
        ready = ready.annotated(m.propagation.describe());
    }

    let edges = vec![
        timed(
            DiagramEdge::new("Client", "Events", EdgeStyle::Request),
            m.mutation_ms,
            measured,
        ),
        timed(
            DiagramEdge::new("Events", "DB", EdgeStyle::Request),
            m.db_write_ms,
            measured,
        ),
        timed(
            DiagramEdge::new("Events", "Outbox", EdgeStyle::Request),
            m.outbox_write_ms,
            measured,
        ),
        timed(
            DiagramEdge::new("Outbox", "Kafka", EdgeStyle::Async),
            m.outbox_to_broker_ms,
            measured,
        ),
        DiagramEdge::new("Kafka", "Consumer", EdgeStyle::Async).annotated("poll"),
        timed(
            DiagramEdge::new("Consumer", "Projection", EdgeStyle::Async),
            m.consumer_to_projection_ms,
            measured,
        ),
        ready,
    ];
    write_spec(Architecture::AsyncProjected, nodes, edges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn federated_stage(total: Option<u64>, hr: u64, emp: u64, sec: u64) -> StageTiming {
        StageTiming {
            total,
            hr: Some(hr),
            employment: Some(emp),
            security: Some(sec),
            ..Default::default()
        }
    }

    #[test]
    fn empty_timing_has_no_labeled_edges() {
        let builder = DiagramBuilder::new();
        for architecture in Architecture::ALL {
            let spec = builder.build_read(architecture, &StageTiming::default());
            assert_eq!(spec.labeled_edges().count(), 0);
            assert!(spec.nodes.iter().all(|n| !n.measured));
            assert!(spec.edges.iter().all(|e| !e.measured));
        }
    }

    #[test]
    fn overhead_is_total_minus_slowest_subgraph() {
        let spec = DiagramBuilder::new().build_read(
            Architecture::SyncFederated,
            &federated_stage(Some(120), 40, 75, 30),
        );
        let edge = spec.edge("Client", "Router").expect("client edge");
        assert_eq!(edge.latency_ms, Some(45));
        assert_eq!(edge.label.as_deref(), Some("45ms"));
        assert!(spec.node("Router").expect("router").measured);
    }

    #[test]
    fn overhead_never_goes_negative() {
        assert_eq!(infer_overhead(Some(50), &[Some(20), Some(80)]), Some(0));
        let spec = DiagramBuilder::new().build_read(
            Architecture::SyncFederated,
            &federated_stage(Some(50), 20, 80, 10),
        );
        assert_eq!(spec.edge("Client", "Router").unwrap().label.as_deref(), Some("0ms"));
    }

    #[test]
    fn overhead_requires_total_and_a_part() {
        assert_eq!(infer_overhead(None, &[Some(20)]), None);
        assert_eq!(infer_overhead(Some(90), &[None, None, None]), None);
        assert_eq!(infer_overhead(Some(90), &[]), None);

        let no_total = DiagramBuilder::new().build_read(
            Architecture::SyncFederated,
            &federated_stage(None, 40, 75, 30),
        );
        let edge = no_total.edge("Client", "Router").unwrap();
        assert!(edge.label.is_none());
        assert_eq!(edge.style, EdgeStyle::Idle);

        let total_only = DiagramBuilder::new()
            .build_read(Architecture::SyncFederated, &StageTiming::with_total(90));
        assert_eq!(total_only.labeled_edges().count(), 0);
    }

    #[test]
    fn label_presence_matches_timing_and_emphasis() {
        let stage = StageTiming {
            total: Some(100),
            hr: Some(60),
            hr_db: Some(22),
            ..Default::default()
        };
        let spec = DiagramBuilder::new().build_read(Architecture::SyncFederated, &stage);
        for edge in &spec.edges {
            assert_eq!(edge.label.is_some(), edge.latency_ms.is_some());
            assert_eq!(edge.measured, edge.label.is_some());
        }
        assert_eq!(spec.edge("HR", "HR_DB").unwrap().label.as_deref(), Some("22ms"));
        assert!(spec.edge("Router", "Emp").unwrap().label.is_none());
        assert!(spec.node("HR_DB").unwrap().measured);
        assert!(!spec.node("Emp_DB").unwrap().measured);
    }

    #[test]
    fn reported_router_time_wins_over_inference() {
        let stage = StageTiming {
            router: Some(7),
            ..federated_stage(Some(120), 40, 75, 30)
        };
        let spec = DiagramBuilder::new().build_read(Architecture::SyncFederated, &stage);
        assert_eq!(spec.edge("Client", "Router").unwrap().latency_ms, Some(7));
    }

    #[test]
    fn projected_read_labels_network_overhead_and_db() {
        let stage = StageTiming {
            total: Some(18),
            query_service: Some(5),
            db: Some(2),
            ..Default::default()
        };
        let spec = DiagramBuilder::new().build_read(Architecture::AsyncProjected, &stage);
        assert_eq!(spec.edge("Client", "QS").unwrap().latency_ms, Some(13));
        assert_eq!(spec.edge("QS", "Local").unwrap().latency_ms, Some(2));
        assert!(spec.node("QS").unwrap().measured);
        let async_edge = spec.edge("Consumer", "Local").unwrap();
        assert_eq!(async_edge.annotation.as_deref(), Some("async"));
        assert!(async_edge.label.is_none());
    }

    #[test]
    fn build_is_idempotent() {
        let builder = DiagramBuilder::new();
        let stage = federated_stage(Some(120), 40, 75, 30);
        let mutation = MutationTiming {
            mutation_ms: Some(44),
            ..MutationTiming::for_entity("Dana")
        };
        assert_eq!(
            builder.build(Architecture::SyncFederated, &stage, None),
            builder.build(Architecture::SyncFederated, &stage, None)
        );
        assert_eq!(
            builder.build(Architecture::AsyncProjected, &stage, Some(&mutation)),
            builder.build(Architecture::AsyncProjected, &stage, Some(&mutation))
        );
    }

    #[test]
    fn mutation_presence_switches_flow() {
        let builder = DiagramBuilder::new();
        let stage = StageTiming::with_total(30);
        let mutation = MutationTiming {
            mutation_ms: Some(80),
            propagation_ms: Some(300),
            total_ms: Some(380),
            propagation: PropagationStatus::Propagated,
            ..MutationTiming::for_entity("Dana")
        };

        let write = builder.build(Architecture::AsyncProjected, &stage, Some(&mutation));
        assert_eq!(write.flow, FlowKind::Write);
        assert_eq!(write.caption().as_deref(), Some("Write: Dana"));
        assert_eq!(write.edge("Client", "Events").unwrap().latency_ms, Some(80));
        assert_eq!(write.edge("Projection", "Ready").unwrap().latency_ms, Some(300));

        let read = builder.build(Architecture::AsyncProjected, &stage, None);
        assert_eq!(read.flow, FlowKind::Read);

        let untimed = MutationTiming::for_entity("Dana");
        let still_read = builder.build(Architecture::AsyncProjected, &stage, Some(&untimed));
        assert_eq!(still_read.flow, FlowKind::Read);
    }

    #[test]
    fn timeout_is_annotated_not_labeled() {
        let mutation = MutationTiming {
            mutation_ms: Some(80),
            total_ms: Some(80),
            propagation: PropagationStatus::TimedOut,
            ..MutationTiming::for_entity("Dana")
        };
        let spec = DiagramBuilder::new().build_write(Architecture::AsyncProjected, &mutation);
        let ready = spec.edge("Projection", "Ready").unwrap();
        assert!(ready.label.is_none());
        assert_eq!(ready.annotation.as_deref(), Some("timed out"));
        assert!(!spec.node("Ready").unwrap().measured);
    }

    #[test]
    fn federated_write_labels_total_on_response() {
        let mutation = MutationTiming {
            mutation_ms: Some(52),
            total_ms: Some(52),
            service_ms: Some(30),
            db_write_ms: Some(9),
            router_overhead_ms: Some(22),
            ..MutationTiming::for_entity("Eve")
        };
        let spec = DiagramBuilder::new().build_write(Architecture::SyncFederated, &mutation);
        assert_eq!(spec.edge("Response", "Client").unwrap().label.as_deref(), Some("52ms"));
        assert_eq!(spec.edge("Client", "Router").unwrap().latency_ms, Some(22));
        assert_eq!(
            spec.edge("HR_DB", "Response").unwrap().annotation.as_deref(),
            Some("committed")
        );
        assert_eq!(spec.labeled_edges().count(), 4);
    }

    #[test]
    fn estimation_only_applies_without_stage_measurements() {
        let builder = DiagramBuilder::with_estimation(EstimationConfig::default());

        let estimated = builder.build_read(Architecture::SyncFederated, &StageTiming::with_total(100));
        assert_eq!(estimated.provenance, TimingProvenance::Estimated);
        assert!(estimated.labeled_edges().count() > 0);
        assert!(estimated.labeled_edges().all(|e| e.label.as_deref().unwrap().starts_with('~')));
        assert!(estimated.edges.iter().all(|e| !e.measured));
        assert!(estimated.nodes.iter().all(|n| !n.measured));

        let measured = builder.build_read(
            Architecture::SyncFederated,
            &federated_stage(Some(100), 40, 50, 30),
        );
        assert_eq!(measured.provenance, TimingProvenance::Measured);
        assert!(measured.labeled_edges().all(|e| !e.label.as_deref().unwrap().starts_with('~')));

        let nothing = builder.build_read(Architecture::AsyncProjected, &StageTiming::default());
        assert_eq!(nothing.provenance, TimingProvenance::Measured);
        assert_eq!(nothing.labeled_edges().count(), 0);
    }
}
