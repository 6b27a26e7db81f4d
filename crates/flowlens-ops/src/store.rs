use std::sync::Arc;

use futures::{stream::BoxStream, StreamExt};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, warn};

use flowlens_types::{
    activity::{ActivityLog, LogEntry, LogLevel},
    config::DashboardConfig,
    events::{DashboardEvent, EventPayload},
    metrics::{ComparisonSummary, MetricsSnapshot, WriteComparison},
    person::PersonSummary,
    timing::MutationTiming,
    Architecture,
};

const EVENT_CAPACITY: usize = 256;

/// Everything the dashboard shows for one architecture.
#[derive(Debug, Clone, Serialize)]
pub struct ArchitectureState {
    pub metrics: MetricsSnapshot,
    /// Present only between a create and the next user-initiated read.
    pub mutation: Option<MutationTiming>,
    pub log: ActivityLog,
}

impl ArchitectureState {
    fn new(architecture: Architecture, log_capacity: usize) -> Self {
        Self {
            metrics: MetricsSnapshot::new(architecture),
            mutation: None,
            log: ActivityLog::with_capacity(log_capacity),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardState {
    pub federated: ArchitectureState,
    pub projected: ArchitectureState,
    pub persons: Vec<PersonSummary>,
    pub selected_person: String,
}

impl DashboardState {
    pub fn architecture(&self, architecture: Architecture) -> &ArchitectureState {
        match architecture {
            Architecture::SyncFederated => &self.federated,
            Architecture::AsyncProjected => &self.projected,
        }
    }

    fn architecture_mut(&mut self, architecture: Architecture) -> &mut ArchitectureState {
        match architecture {
            Architecture::SyncFederated => &mut self.federated,
            Architecture::AsyncProjected => &mut self.projected,
        }
    }

    pub fn comparison(&self) -> ComparisonSummary {
        ComparisonSummary::from_snapshots(&self.federated.metrics, &self.projected.metrics)
    }

    pub fn write_comparison(&self) -> Option<WriteComparison> {
        WriteComparison::between(self.federated.mutation.as_ref()?, self.projected.mutation.as_ref()?)
    }
}

/// Shared dashboard state. Cloning is cheap; all clones see the same state
/// and every change is published to subscribers.
#[derive(Clone)]
pub struct DashboardStore {
    state: Arc<RwLock<DashboardState>>,
    tx: broadcast::Sender<DashboardEvent>,
}

impl DashboardStore {
    pub fn new(config: &DashboardConfig) -> Self {
        let state = DashboardState {
            federated: ArchitectureState::new(Architecture::SyncFederated, config.log_capacity),
            projected: ArchitectureState::new(Architecture::AsyncProjected, config.log_capacity),
            persons: Vec::new(),
            selected_person: config.default_person.clone(),
        };
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(state)),
            tx,
        }
    }

    fn publish(&self, architecture: Option<Architecture>, payload: EventPayload) {
        // no subscribers is fine
        let _ = self.tx.send(DashboardEvent::new(architecture, payload));
    }

    pub fn subscribe(&self) -> BoxStream<'static, DashboardEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }

    pub async fn snapshot(&self) -> DashboardState {
        self.state.read().await.clone()
    }

    pub async fn metrics(&self, architecture: Architecture) -> MetricsSnapshot {
        self.state
            .read()
            .await
            .architecture(architecture)
            .metrics
            .clone()
    }

    /// Applies `update` to a copy and swaps the whole snapshot in.
    pub async fn update_metrics<F>(&self, architecture: Architecture, update: F) -> MetricsSnapshot
    where
        F: FnOnce(&mut MetricsSnapshot),
    {
        let updated = {
            let mut state = self.state.write().await;
            let slot = &mut state.architecture_mut(architecture).metrics;
            let mut next = slot.clone();
            update(&mut next);
            *slot = next.clone();
            next
        };
        self.publish(
            Some(architecture),
            EventPayload::Metrics(Box::new(updated.clone())),
        );
        updated
    }

    pub async fn mutation(&self, architecture: Architecture) -> Option<MutationTiming> {
        self.state
            .read()
            .await
            .architecture(architecture)
            .mutation
            .clone()
    }

    pub async fn set_mutation(&self, architecture: Architecture, mutation: Option<MutationTiming>) {
        {
            let mut state = self.state.write().await;
            let slot = &mut state.architecture_mut(architecture).mutation;
            if slot.is_none() && mutation.is_none() {
                return;
            }
            *slot = mutation.clone();
        }
        self.publish(Some(architecture), EventPayload::Mutation(mutation));
    }

    /// Appends to the architecture's activity log and mirrors the line to tracing.
    pub async fn log(&self, architecture: Architecture, entry: LogEntry) {
        match entry.level {
            LogLevel::Info => info!(%architecture, "{}", entry.message),
            LogLevel::Warning => warn!(%architecture, "{}", entry.message),
            LogLevel::Error => error!(%architecture, "{}", entry.message),
        }
        self.state
            .write()
            .await
            .architecture_mut(architecture)
            .log
            .push(entry.clone());
        self.publish(Some(architecture), EventPayload::Activity(entry));
    }

    pub async fn info(&self, architecture: Architecture, message: impl Into<String>) {
        self.log(architecture, LogEntry::info(message)).await;
    }

    pub async fn warning(&self, architecture: Architecture, message: impl Into<String>) {
        self.log(architecture, LogEntry::warning(message)).await;
    }

    pub async fn error(&self, architecture: Architecture, message: impl Into<String>) {
        self.log(architecture, LogEntry::error(message)).await;
    }

    pub async fn logs(&self, architecture: Architecture) -> Vec<LogEntry> {
        self.state
            .read()
            .await
            .architecture(architecture)
            .log
            .entries()
            .cloned()
            .collect()
    }

    pub async fn set_persons(&self, persons: Vec<PersonSummary>) {
        self.state.write().await.persons = persons.clone();
        self.publish(None, EventPayload::Persons(persons));
    }

    pub async fn persons(&self) -> Vec<PersonSummary> {
        self.state.read().await.persons.clone()
    }

    pub async fn select_person(&self, id: impl Into<String>) {
        self.state.write().await.selected_person = id.into();
    }

    pub async fn selected_person(&self) -> String {
        self.state.read().await.selected_person.clone()
    }
}
