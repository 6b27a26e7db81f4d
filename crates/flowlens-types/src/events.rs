use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    activity::LogEntry,
    metrics::MetricsSnapshot,
    person::PersonSummary,
    timing::{Architecture, MutationTiming},
};

/// Kinds of state change published by the dashboard store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Metrics,
    Mutation,
    Activity,
    Persons,
}

/// Immutable event envelope for live views and reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardEvent {
    pub id: Uuid,
    pub kind: EventKind,
    /// `None` for events that are not tied to one architecture.
    pub architecture: Option<Architecture>,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Metrics(Box<MetricsSnapshot>),
    /// `None` when the mutation timing was cleared.
    Mutation(Option<MutationTiming>),
    Activity(LogEntry),
    Persons(Vec<PersonSummary>),
}

impl DashboardEvent {
    pub fn new(architecture: Option<Architecture>, payload: EventPayload) -> Self {
        let kind = match &payload {
            EventPayload::Metrics(_) => EventKind::Metrics,
            EventPayload::Mutation(_) => EventKind::Mutation,
            EventPayload::Activity(_) => EventKind::Activity,
            EventPayload::Persons(_) => EventKind::Persons,
        };
        Self {
            id: Uuid::new_v4(),
            kind,
            architecture,
            timestamp: Utc::now(),
            payload,
        }
    }
}
