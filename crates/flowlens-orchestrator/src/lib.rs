//! Measurement orchestrator: timed reads and writes against both architectures.

pub mod propagation;
pub mod slot;

use chrono::Utc;
use flowlens_network::{
    FederationGateway, GatewayResponse, HttpFederationGateway, HttpProjectionGateway,
    ProjectionGateway,
};
use flowlens_ops::DashboardStore;
use flowlens_types::{
    config::{FlowlensConfig, PropagationConfig},
    metrics::{MetricsSnapshot, FRESHNESS_UNKNOWN},
    person::{sort_persons, NewPerson, PersonSummary},
    timing::{MutationTiming, PropagationStatus, StageTiming},
    Architecture, FlowlensError, Result,
};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use propagation::{wait_for_propagation, PollOutcome};
pub use slot::{OperationSlots, SlotGuard};

use propagation::elapsed_ms;

/// How a create ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreateOutcome {
    /// Another operation on the same architecture was still running.
    Rejected,
    WriteFailed,
    /// Synchronous write; readable as soon as it returned.
    Written,
    Propagated,
    TimedOut,
    /// The write returned no identifier, so propagation was not polled.
    Unmeasurable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateReport {
    pub architecture: Architecture,
    pub outcome: CreateOutcome,
    pub timing: MutationTiming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub federated: bool,
    pub projected: bool,
}

pub struct Orchestrator<F, P>
where
    F: FederationGateway,
    P: ProjectionGateway,
{
    federation: F,
    projection: P,
    store: DashboardStore,
    propagation: PropagationConfig,
    slots: OperationSlots,
}

impl Orchestrator<HttpFederationGateway, HttpProjectionGateway> {
    /// HTTP gateways built from a validated configuration.
    pub fn connect(config: &FlowlensConfig, store: DashboardStore) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            HttpFederationGateway::new(&config.endpoints)?,
            HttpProjectionGateway::new(&config.endpoints)?,
            store,
            config.propagation.clone(),
        ))
    }
}

impl<F, P> Orchestrator<F, P>
where
    F: FederationGateway,
    P: ProjectionGateway,
{
    pub fn new(
        federation: F,
        projection: P,
        store: DashboardStore,
        propagation: PropagationConfig,
    ) -> Self {
        Self {
            federation,
            projection,
            store,
            propagation,
            slots: OperationSlots::new(),
        }
    }

    pub fn store(&self) -> &DashboardStore {
        &self.store
    }

    pub fn is_busy(&self, architecture: Architecture) -> bool {
        self.slots.is_busy(architecture)
    }

    /// User-initiated read. Clears the architecture's mutation timing, so
    /// diagrams return to the read flow. Failures are recorded, never returned.
    pub async fn query(&self, architecture: Architecture, entity_id: &str) -> MetricsSnapshot {
        let Some(_slot) = self.slots.try_acquire(architecture) else {
            self.store
                .warning(
                    architecture,
                    format!("Query for {entity_id} skipped: operation in progress"),
                )
                .await;
            return self.store.metrics(architecture).await;
        };
        self.store.set_mutation(architecture, None).await;
        self.query_locked(architecture, entity_id).await
    }

    /// Queries both architectures concurrently.
    pub async fn query_both(&self, entity_id: &str) -> (MetricsSnapshot, MetricsSnapshot) {
        tokio::join!(
            self.query(Architecture::SyncFederated, entity_id),
            self.query(Architecture::AsyncProjected, entity_id)
        )
    }

    async fn query_locked(&self, architecture: Architecture, entity_id: &str) -> MetricsSnapshot {
        self.store
            .info(architecture, format!("Querying for {entity_id}..."))
            .await;

        let started = Instant::now();
        let result = match architecture {
            Architecture::SyncFederated => self.federation.query_person(entity_id).await,
            Architecture::AsyncProjected => self.projection.composed_view(entity_id).await,
        };
        let latency = elapsed_ms(started);

        match result {
            Ok(response) => self.record_read(architecture, entity_id, latency, response).await,
            Err(err) => {
                let snapshot = self
                    .store
                    .update_metrics(architecture, |m| m.error_count += 1)
                    .await;
                self.store.error(architecture, err.to_string()).await;
                snapshot
            }
        }
    }

    async fn record_read(
        &self,
        architecture: Architecture,
        entity_id: &str,
        latency: u64,
        response: GatewayResponse,
    ) -> MetricsSnapshot {
        let stage_timing = match architecture {
            Architecture::SyncFederated => StageTiming {
                total: Some(latency),
                ..response.server_timing.to_stage_timing()
            },
            Architecture::AsyncProjected => StageTiming {
                total: Some(latency),
                query_service: response.server_timing.elapsed_ms,
                ..Default::default()
            },
        };

        let mut message = format!("Success: {latency}ms");
        match architecture {
            Architecture::SyncFederated => {
                let parts: Vec<String> = [
                    ("HR", stage_timing.hr),
                    ("Emp", stage_timing.employment),
                    ("Sec", stage_timing.security),
                ]
                .into_iter()
                .filter_map(|(name, ms)| ms.map(|ms| format!("{name}: {ms}ms")))
                .collect();
                if !parts.is_empty() {
                    message.push_str(&format!(" ({})", parts.join(", ")));
                }
            }
            Architecture::AsyncProjected => {
                let service = stage_timing
                    .query_service
                    .map(|ms| format!("{ms}ms"))
                    .unwrap_or_else(|| "n/a".to_string());
                let freshness = response.freshness.as_deref().unwrap_or(FRESHNESS_UNKNOWN);
                message.push_str(&format!(
                    " (Projection Service: {service}, freshness: {freshness})"
                ));
            }
        }
        if !response.is_success() {
            message.push_str(&format!(" [status {}]", response.status));
        }

        let GatewayResponse {
            body, freshness, ..
        } = response;
        let snapshot = self
            .store
            .update_metrics(architecture, |m| {
                m.latency_ms = Some(latency);
                m.stage_timing = stage_timing;
                m.query_count += 1;
                m.last_result = Some(body);
                m.last_entity = Some(entity_id.to_string());
                m.mark_services(true);
                if architecture.propagates_asynchronously() {
                    m.freshness = Some(freshness.unwrap_or_else(|| FRESHNESS_UNKNOWN.to_string()));
                }
            })
            .await;
        self.store.info(architecture, message).await;
        snapshot
    }

    /// Timed create. On the projected side also measures how long the new
    /// entity takes to become readable.
    pub async fn create(&self, architecture: Architecture, person: &NewPerson) -> CreateReport {
        let Some(_slot) = self.slots.try_acquire(architecture) else {
            self.store
                .warning(
                    architecture,
                    format!("Create of {} skipped: operation in progress", person.name),
                )
                .await;
            return CreateReport {
                architecture,
                outcome: CreateOutcome::Rejected,
                timing: MutationTiming::for_entity(&person.name),
            };
        };

        self.store
            .info(architecture, format!("Creating person: {}...", person.name))
            .await;
        match architecture {
            Architecture::SyncFederated => self.create_federated(person).await,
            Architecture::AsyncProjected => self.create_projected(person).await,
        }
    }

    /// Federated first, then projected.
    pub async fn create_both(&self, person: &NewPerson) -> (CreateReport, CreateReport) {
        let federated = self.create(Architecture::SyncFederated, person).await;
        let projected = self.create(Architecture::AsyncProjected, person).await;
        (federated, projected)
    }

    async fn record_write_failure(
        &self,
        architecture: Architecture,
        timing: MutationTiming,
        err: FlowlensError,
    ) -> CreateReport {
        self.store
            .update_metrics(architecture, |m| m.error_count += 1)
            .await;
        self.store.set_mutation(architecture, Some(timing.clone())).await;
        self.store
            .error(architecture, format!("Create failed: {err}"))
            .await;
        CreateReport {
            architecture,
            outcome: CreateOutcome::WriteFailed,
            timing,
        }
    }

    async fn create_federated(&self, person: &NewPerson) -> CreateReport {
        let architecture = Architecture::SyncFederated;
        let mut timing = MutationTiming::for_entity(&person.name);

        let started = Instant::now();
        let result = self.federation.create_person(person).await;
        let mutation_ms = elapsed_ms(started);

        let response = match result {
            Ok(response) => response,
            Err(err) => return self.record_write_failure(architecture, timing, err).await,
        };

        let server = &response.server_timing;
        let hr_time = server.stage("hrTime");
        timing.entity_id = response.string_at("/data/createPerson/id");
        timing.mutation_ms = Some(mutation_ms);
        timing.total_ms = Some(mutation_ms);
        timing.service_ms = hr_time;
        timing.db_write_ms = server.stage("hrDbTime");
        timing.router_overhead_ms = server
            .stage("routerOverhead")
            .or_else(|| hr_time.map(|hr| mutation_ms.saturating_sub(hr)));

        self.store.set_mutation(architecture, Some(timing.clone())).await;
        self.store
            .update_metrics(architecture, |m| m.mark_services(true))
            .await;
        self.store
            .info(
                architecture,
                format!(
                    "Person created: {} in {mutation_ms}ms (data immediately available)",
                    person.name
                ),
            )
            .await;

        if let Some(id) = &timing.entity_id {
            self.query_locked(architecture, id).await;
        }

        CreateReport {
            architecture,
            outcome: CreateOutcome::Written,
            timing,
        }
    }

    async fn create_projected(&self, person: &NewPerson) -> CreateReport {
        let architecture = Architecture::AsyncProjected;
        let mut timing = MutationTiming::for_entity(&person.name);
        let request = match person.hire_date {
            Some(_) => person.clone(),
            None => person.clone().hired_on(Utc::now().date_naive()),
        };

        let started = Instant::now();
        let result = self.projection.create_person(&request).await;
        let mutation_ms = elapsed_ms(started);

        let response = match result {
            Ok(response) => response,
            Err(err) => return self.record_write_failure(architecture, timing, err).await,
        };

        let server = &response.server_timing;
        timing.entity_id = response.string_at("/id");
        timing.mutation_ms = Some(mutation_ms);
        timing.service_ms = server.elapsed_ms;
        timing.db_write_ms = server.stage("db_write");
        timing.outbox_write_ms = server.stage("outbox_write");

        let outcome = match timing.entity_id.clone() {
            None => {
                timing.propagation = PropagationStatus::Unmeasurable;
                timing.total_ms = Some(mutation_ms);
                self.store
                    .warning(
                        architecture,
                        format!(
                            "Mutation complete: {mutation_ms}ms, but the response carried no id; propagation cannot be measured"
                        ),
                    )
                    .await;
                CreateOutcome::Unmeasurable
            }
            Some(id) => {
                self.store
                    .info(
                        architecture,
                        format!("Mutation complete: {mutation_ms}ms. Waiting for propagation..."),
                    )
                    .await;
                match wait_for_propagation(&self.projection, &id, &self.propagation).await {
                    PollOutcome::Visible(propagation_ms) => {
                        let total = mutation_ms + propagation_ms;
                        timing.propagation = PropagationStatus::Propagated;
                        timing.propagation_ms = Some(propagation_ms);
                        timing.total_ms = Some(total);
                        self.store
                            .info(
                                architecture,
                                format!(
                                    "Propagated in {propagation_ms}ms. Total: {total}ms (mutation: {mutation_ms}ms + propagation: {propagation_ms}ms)"
                                ),
                            )
                            .await;
                        self.attach_breakdown(&id, &mut timing).await;
                        CreateOutcome::Propagated
                    }
                    PollOutcome::TimedOut { waited_ms } => {
                        timing.propagation = PropagationStatus::TimedOut;
                        timing.total_ms = Some(mutation_ms);
                        self.store
                            .warning(
                                architecture,
                                format!("Propagation timeout after {waited_ms}ms"),
                            )
                            .await;
                        CreateOutcome::TimedOut
                    }
                }
            }
        };

        self.store.set_mutation(architecture, Some(timing.clone())).await;
        self.store
            .update_metrics(architecture, |m| m.mark_services(true))
            .await;

        if let Err(err) = self.refresh_persons().await {
            warn!(%architecture, "person list refresh after create failed: {err}");
        }
        if let Some(id) = &timing.entity_id {
            self.store.select_person(id.clone()).await;
            self.query_locked(architecture, id).await;
        }

        CreateReport {
            architecture,
            outcome,
            timing,
        }
    }

    /// Best-effort consumer breakdown of the asynchronous hop.
    async fn attach_breakdown(&self, id: &str, timing: &mut MutationTiming) {
        match self.projection.propagation_breakdown(id).await {
            Ok(Some(breakdown)) => {
                timing.outbox_to_broker_ms = breakdown.outbox_to_broker_ms;
                timing.consumer_to_projection_ms = breakdown.consumer_to_projection_ms;
            }
            Ok(None) => debug!(id, "no propagation breakdown available"),
            Err(err) => debug!(id, "propagation breakdown unavailable: {err}"),
        }
    }

    /// Probes both architectures; each verdict applies to all of its dependencies.
    pub async fn refresh_health(&self) -> HealthReport {
        let (federated, projected) =
            tokio::join!(self.federation.health(), self.projection.health());
        HealthReport {
            federated: self.apply_health(Architecture::SyncFederated, federated).await,
            projected: self.apply_health(Architecture::AsyncProjected, projected).await,
        }
    }

    async fn apply_health(&self, architecture: Architecture, probe: Result<bool>) -> bool {
        let up = match probe {
            Ok(up) => {
                if !up {
                    self.store
                        .warning(architecture, "Health check returned a non-success status")
                        .await;
                }
                up
            }
            Err(err) => {
                self.store
                    .warning(architecture, format!("Health check failed: {err}"))
                    .await;
                false
            }
        };
        self.store
            .update_metrics(architecture, |m| m.mark_services(up))
            .await;
        up
    }

    /// Reloads the person list, seed persons first.
    pub async fn refresh_persons(&self) -> Result<Vec<PersonSummary>> {
        let mut persons = self
            .projection
            .list_persons()
            .await
            .map_err(|err| orchestrator_error(format!("person refresh failed: {err}")))?;
        sort_persons(&mut persons);
        info!(count = persons.len(), "person list refreshed");
        self.store.set_persons(persons.clone()).await;
        Ok(persons)
    }
}

pub fn orchestrator_error(message: impl Into<String>) -> FlowlensError {
    FlowlensError::Orchestrator(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowlens_network::{network_error, PropagationBreakdown, ServerTiming};
    use flowlens_types::{activity::LogLevel, config::DashboardConfig};
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    };
    use tokio::time::{sleep, Duration};

    #[derive(Default)]
    struct FakeFederation {
        fail_reads: AtomicBool,
        write_delay_ms: u64,
        fail_writes: bool,
        extension_stages: Vec<(&'static str, u64)>,
        healthy: bool,
    }

    #[async_trait]
    impl FederationGateway for FakeFederation {
        async fn query_person(&self, id: &str) -> Result<GatewayResponse> {
            sleep(Duration::from_millis(30)).await;
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(network_error("connection refused"));
            }
            Ok(GatewayResponse {
                status: 200,
                body: json!({ "data": { "person": { "id": id } } }),
                server_timing: ServerTiming {
                    elapsed_ms: None,
                    stages: [("hr".to_string(), 12), ("employment".to_string(), 20)]
                        .into_iter()
                        .collect(),
                },
                freshness: None,
            })
        }

        async fn create_person(&self, person: &NewPerson) -> Result<GatewayResponse> {
            sleep(Duration::from_millis(self.write_delay_ms)).await;
            if self.fail_writes {
                return Err(network_error("router unavailable"));
            }
            Ok(GatewayResponse {
                status: 200,
                body: json!({ "data": { "createPerson": { "id": "fed-7", "name": person.name } } }),
                server_timing: ServerTiming {
                    elapsed_ms: None,
                    stages: self
                        .extension_stages
                        .iter()
                        .map(|(k, v)| (k.to_string(), *v))
                        .collect(),
                },
                freshness: None,
            })
        }

        async fn health(&self) -> Result<bool> {
            if self.healthy {
                Ok(true)
            } else {
                Err(network_error("connection refused"))
            }
        }
    }

    struct FakeProjection {
        query_time_ms: Option<u64>,
        fail_reads: AtomicBool,
        write_delay_ms: u64,
        write_id: Option<&'static str>,
        /// 1-based list call on which the written id becomes visible.
        visible_on_call: Option<usize>,
        list_calls: AtomicUsize,
        composed_calls: AtomicUsize,
        breakdown: Option<PropagationBreakdown>,
        healthy: bool,
        last_write: Mutex<Option<NewPerson>>,
    }

    impl Default for FakeProjection {
        fn default() -> Self {
            Self {
                query_time_ms: None,
                fail_reads: AtomicBool::new(false),
                write_delay_ms: 0,
                write_id: Some("p-42"),
                visible_on_call: Some(1),
                list_calls: AtomicUsize::new(0),
                composed_calls: AtomicUsize::new(0),
                breakdown: None,
                healthy: true,
                last_write: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ProjectionGateway for FakeProjection {
        async fn composed_view(&self, id: &str) -> Result<GatewayResponse> {
            self.composed_calls.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(8)).await;
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(network_error("connection reset"));
            }
            Ok(GatewayResponse {
                status: 200,
                body: json!({ "personId": id, "freshness": { "dataFreshness": "2s ago" } }),
                server_timing: ServerTiming {
                    elapsed_ms: self.query_time_ms,
                    ..Default::default()
                },
                freshness: Some("2s ago".into()),
            })
        }

        async fn list_persons(&self) -> Result<Vec<PersonSummary>> {
            let call = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let mut persons = vec![
                PersonSummary {
                    id: "person-002".into(),
                    name: "Bob".into(),
                },
                PersonSummary {
                    id: "person-001".into(),
                    name: "Alice".into(),
                },
            ];
            if let (Some(id), Some(visible)) = (self.write_id, self.visible_on_call) {
                if call >= visible {
                    persons.insert(
                        0,
                        PersonSummary {
                            id: id.into(),
                            name: "Aaron New".into(),
                        },
                    );
                }
            }
            Ok(persons)
        }

        async fn create_person(&self, person: &NewPerson) -> Result<GatewayResponse> {
            *self.last_write.lock().expect("lock") = Some(person.clone());
            sleep(Duration::from_millis(self.write_delay_ms)).await;
            let body = match self.write_id {
                Some(id) => json!({ "id": id, "name": person.name }),
                None => json!({ "status": "accepted" }),
            };
            Ok(GatewayResponse {
                status: 201,
                body,
                server_timing: ServerTiming {
                    elapsed_ms: Some(31),
                    stages: [("db_write".to_string(), 9), ("outbox_write".to_string(), 4)]
                        .into_iter()
                        .collect(),
                },
                freshness: None,
            })
        }

        async fn propagation_breakdown(&self, _id: &str) -> Result<Option<PropagationBreakdown>> {
            Ok(self.breakdown.clone())
        }

        async fn health(&self) -> Result<bool> {
            Ok(self.healthy)
        }
    }

    fn orchestrator(
        federation: FakeFederation,
        projection: FakeProjection,
    ) -> Orchestrator<FakeFederation, FakeProjection> {
        Orchestrator::new(
            federation,
            projection,
            DashboardStore::new(&DashboardConfig::default()),
            PropagationConfig::default(),
        )
    }

    fn dana() -> NewPerson {
        NewPerson::new("Dana", "dana@example.com")
    }

    #[tokio::test(start_paused = true)]
    async fn propagation_is_measured_within_poll_granularity() {
        let orch = orchestrator(
            FakeFederation::default(),
            FakeProjection {
                write_delay_ms: 80,
                visible_on_call: Some(3),
                breakdown: Some(PropagationBreakdown {
                    outbox_to_broker_ms: Some(15),
                    consumer_to_projection_ms: Some(40),
                }),
                ..Default::default()
            },
        );

        let report = orch.create(Architecture::AsyncProjected, &dana()).await;
        assert_eq!(report.outcome, CreateOutcome::Propagated);

        let timing = &report.timing;
        let mutation = timing.mutation_ms.expect("mutation timed");
        let propagation = timing.propagation_ms.expect("propagation timed");
        assert!((80..=81).contains(&mutation), "mutation {mutation}");
        // visible on the third check: two 100ms sleeps
        assert_eq!(propagation, 200);
        assert_eq!(timing.total_ms, Some(mutation + propagation));
        assert_eq!(timing.entity_id.as_deref(), Some("p-42"));
        assert_eq!(timing.service_ms, Some(31));
        assert_eq!(timing.db_write_ms, Some(9));
        assert_eq!(timing.consumer_to_projection_ms, Some(40));

        let store = orch.store();
        assert_eq!(
            store.mutation(Architecture::AsyncProjected).await,
            Some(timing.clone())
        );
        assert_eq!(store.selected_person().await, "p-42");
        assert_eq!(store.persons().await[0].id, "person-001");
        let metrics = store.metrics(Architecture::AsyncProjected).await;
        assert_eq!(metrics.last_entity.as_deref(), Some("p-42"));
        assert!(metrics.all_services_up());

        let write = orch.projection.last_write.lock().expect("lock").clone();
        assert!(write.expect("write sent").hire_date.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn propagation_timeout_leaves_total_equal_to_mutation() {
        let orch = orchestrator(
            FakeFederation::default(),
            FakeProjection {
                write_delay_ms: 50,
                visible_on_call: None,
                ..Default::default()
            },
        );

        let report = orch.create(Architecture::AsyncProjected, &dana()).await;
        assert_eq!(report.outcome, CreateOutcome::TimedOut);
        assert_eq!(report.timing.propagation_ms, None);
        assert_eq!(report.timing.propagation, PropagationStatus::TimedOut);
        assert_eq!(report.timing.total_ms, report.timing.mutation_ms);
        assert!(orch.projection.list_calls.load(Ordering::SeqCst) >= 90);

        let logs = orch.store().logs(Architecture::AsyncProjected).await;
        assert!(logs
            .iter()
            .any(|l| l.level == LogLevel::Warning && l.message.contains("timeout")));
        assert!(logs.iter().all(|l| l.level != LogLevel::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_read_keeps_previous_latency() {
        let orch = orchestrator(FakeFederation::default(), FakeProjection::default());

        let first = orch.query(Architecture::SyncFederated, "person-001").await;
        assert_eq!(first.latency_ms, Some(30));
        assert_eq!(first.stage_timing.employment, Some(20));

        orch.federation.fail_reads.store(true, Ordering::SeqCst);
        let second = orch.query(Architecture::SyncFederated, "person-001").await;
        assert_eq!(second.error_count, 1);
        assert_eq!(second.query_count, 1);
        assert_eq!(second.latency_ms, first.latency_ms);
        assert_eq!(second.stage_timing, first.stage_timing);

        let errors = orch
            .store()
            .logs(Architecture::SyncFederated)
            .await
            .into_iter()
            .filter(|l| l.level == LogLevel::Error)
            .count();
        assert_eq!(errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_projected_read_counts_as_error() {
        let orch = orchestrator(FakeFederation::default(), FakeProjection::default());
        orch.projection.fail_reads.store(true, Ordering::SeqCst);
        let snapshot = orch.query(Architecture::AsyncProjected, "person-001").await;
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.latency_ms, None);
    }

    #[tokio::test(start_paused = true)]
    async fn query_time_header_becomes_query_service_stage() {
        let orch = orchestrator(
            FakeFederation::default(),
            FakeProjection {
                query_time_ms: Some(42),
                ..Default::default()
            },
        );
        let snapshot = orch.query(Architecture::AsyncProjected, "person-001").await;
        assert_eq!(snapshot.stage_timing.query_service, Some(42));
        assert_eq!(snapshot.stage_timing.total, Some(8));
        assert_eq!(snapshot.freshness.as_deref(), Some("2s ago"));
        assert_eq!(snapshot.query_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_query_time_is_not_estimated() {
        let orch = orchestrator(FakeFederation::default(), FakeProjection::default());
        let snapshot = orch.query(Architecture::AsyncProjected, "person-001").await;
        assert_eq!(snapshot.stage_timing.query_service, None);
        assert!(!snapshot.stage_timing.has_stage_measurements());
    }

    #[tokio::test(start_paused = true)]
    async fn user_query_clears_only_its_mutation_timing() {
        let orch = orchestrator(
            FakeFederation {
                write_delay_ms: 20,
                ..Default::default()
            },
            FakeProjection::default(),
        );
        orch.create_both(&dana()).await;
        assert!(orch.store().mutation(Architecture::SyncFederated).await.is_some());
        assert!(orch.store().mutation(Architecture::AsyncProjected).await.is_some());

        orch.query(Architecture::SyncFederated, "person-001").await;
        assert!(orch.store().mutation(Architecture::SyncFederated).await.is_none());
        assert!(orch.store().mutation(Architecture::AsyncProjected).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn federated_write_derives_router_overhead() {
        let orch = orchestrator(
            FakeFederation {
                write_delay_ms: 50,
                extension_stages: vec![("hrTime", 35), ("hrDbTime", 12)],
                ..Default::default()
            },
            FakeProjection::default(),
        );
        let report = orch.create(Architecture::SyncFederated, &dana()).await;
        assert_eq!(report.outcome, CreateOutcome::Written);
        let timing = report.timing;
        let mutation = timing.mutation_ms.expect("timed");
        assert_eq!(timing.total_ms, Some(mutation));
        assert_eq!(timing.propagation, PropagationStatus::NotApplicable);
        assert_eq!(timing.service_ms, Some(35));
        assert_eq!(timing.db_write_ms, Some(12));
        assert_eq!(timing.router_overhead_ms, Some(mutation - 35));
        assert_eq!(timing.entity_id.as_deref(), Some("fed-7"));

        // read-back keeps the write timing and records the new entity
        let metrics = orch.store().metrics(Architecture::SyncFederated).await;
        assert_eq!(metrics.last_entity.as_deref(), Some("fed-7"));
        assert!(orch.store().mutation(Architecture::SyncFederated).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn write_without_id_skips_polling() {
        let orch = orchestrator(
            FakeFederation::default(),
            FakeProjection {
                write_id: None,
                ..Default::default()
            },
        );
        let report = orch.create(Architecture::AsyncProjected, &dana()).await;
        assert_eq!(report.outcome, CreateOutcome::Unmeasurable);
        assert_eq!(report.timing.propagation, PropagationStatus::Unmeasurable);
        assert_eq!(report.timing.propagation_ms, None);
        assert_eq!(report.timing.total_ms, report.timing.mutation_ms);
        // only the post-write list refresh, no polling
        assert_eq!(orch.projection.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.projection.composed_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_counts_error_and_skips_read_back() {
        let orch = orchestrator(
            FakeFederation {
                fail_writes: true,
                ..Default::default()
            },
            FakeProjection::default(),
        );
        let report = orch.create(Architecture::SyncFederated, &dana()).await;
        assert_eq!(report.outcome, CreateOutcome::WriteFailed);
        assert!(!report.timing.is_present());

        let metrics = orch.store().metrics(Architecture::SyncFederated).await;
        assert_eq!(metrics.error_count, 1);
        assert_eq!(metrics.query_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_operations_are_rejected() {
        let orch = orchestrator(FakeFederation::default(), FakeProjection::default());
        let before = orch.store().metrics(Architecture::AsyncProjected).await;

        let guard = orch
            .slots
            .try_acquire(Architecture::AsyncProjected)
            .expect("free slot");
        assert!(orch.is_busy(Architecture::AsyncProjected));

        let snapshot = orch.query(Architecture::AsyncProjected, "person-001").await;
        assert_eq!(snapshot, before);
        let report = orch.create(Architecture::AsyncProjected, &dana()).await;
        assert_eq!(report.outcome, CreateOutcome::Rejected);
        assert_eq!(orch.projection.composed_calls.load(Ordering::SeqCst), 0);

        let warnings = orch
            .store()
            .logs(Architecture::AsyncProjected)
            .await
            .into_iter()
            .filter(|l| l.level == LogLevel::Warning)
            .count();
        assert_eq!(warnings, 2);

        // the other architecture is unaffected
        let federated = orch.query(Architecture::SyncFederated, "person-001").await;
        assert_eq!(federated.query_count, 1);

        drop(guard);
        let snapshot = orch.query(Architecture::AsyncProjected, "person-001").await;
        assert_eq!(snapshot.query_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn query_both_updates_both_sides() {
        let orch = orchestrator(FakeFederation::default(), FakeProjection::default());
        let (federated, projected) = orch.query_both("person-003").await;
        assert_eq!(federated.query_count, 1);
        assert_eq!(projected.query_count, 1);
        let state = orch.store().snapshot().await;
        assert_eq!(state.comparison().latency_diff_percent, Some(275));
    }

    #[tokio::test]
    async fn health_failure_marks_every_dependency_down() {
        let orch = orchestrator(
            FakeFederation {
                healthy: false,
                ..Default::default()
            },
            FakeProjection::default(),
        );
        let report = orch.refresh_health().await;
        assert_eq!(
            report,
            HealthReport {
                federated: false,
                projected: true
            }
        );
        let federated = orch.store().metrics(Architecture::SyncFederated).await;
        assert!(federated.services_up.values().all(|up| !up));
        let projected = orch.store().metrics(Architecture::AsyncProjected).await;
        assert!(projected.all_services_up());
    }

    #[tokio::test]
    async fn refresh_persons_sorts_seed_persons_first() {
        let orch = orchestrator(FakeFederation::default(), FakeProjection::default());
        let persons = orch.refresh_persons().await.expect("persons");
        let ids: Vec<_> = persons.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["person-001", "person-002", "p-42"]);
        assert_eq!(orch.store().persons().await, persons);
    }
}
