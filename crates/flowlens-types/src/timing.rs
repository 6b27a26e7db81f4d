use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::FlowlensError;

/// The two architectural styles being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Architecture {
    /// GraphQL federation: one response composed from several subgraphs.
    SyncFederated,
    /// Event-driven writes, reads served from a local projection.
    AsyncProjected,
}

impl Architecture {
    pub const ALL: [Architecture; 2] = [Architecture::SyncFederated, Architecture::AsyncProjected];

    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::SyncFederated => "sync-federated",
            Architecture::AsyncProjected => "async-projected",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Architecture::SyncFederated => "GraphQL Federation",
            Architecture::AsyncProjected => "Kafka Projections",
        }
    }

    /// Whether a write becomes visible to readers only after an asynchronous hop.
    pub fn propagates_asynchronously(self) -> bool {
        matches!(self, Architecture::AsyncProjected)
    }

    /// Constituent dependencies tracked by the health flags.
    pub fn dependencies(self) -> &'static [&'static str] {
        match self {
            Architecture::SyncFederated => &["hr", "employment", "security"],
            Architecture::AsyncProjected => &["query", "consumer", "kafka"],
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = FlowlensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync-federated" | "federated" | "federation" | "graphql" => {
                Ok(Architecture::SyncFederated)
            }
            "async-projected" | "projected" | "projection" | "kafka" | "events" => {
                Ok(Architecture::AsyncProjected)
            }
            other => Err(FlowlensError::Configuration(format!(
                "unknown architecture '{other}'"
            ))),
        }
    }
}

/// Which half of the data flow a diagram depicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    Read,
    Write,
}

/// Millisecond measurements for each stage of a read path.
///
/// `None` always means "not measured"; it is never a stand-in for zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    /// Client-observed round trip.
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub network: Option<u64>,
    #[serde(default)]
    pub router: Option<u64>,
    #[serde(default)]
    pub hr: Option<u64>,
    #[serde(default)]
    pub hr_db: Option<u64>,
    #[serde(default)]
    pub employment: Option<u64>,
    #[serde(default)]
    pub employment_db: Option<u64>,
    #[serde(default)]
    pub security: Option<u64>,
    #[serde(default)]
    pub security_db: Option<u64>,
    #[serde(default)]
    pub query_service: Option<u64>,
    #[serde(default)]
    pub db: Option<u64>,
}

impl StageTiming {
    pub fn with_total(total: u64) -> Self {
        Self {
            total: Some(total),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == StageTiming::default()
    }

    /// True when anything beyond the client round trip was measured.
    pub fn has_stage_measurements(&self) -> bool {
        let stages = StageTiming {
            total: None,
            ..self.clone()
        };
        !stages.is_empty()
    }
}

/// How the asynchronous propagation of a write ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropagationStatus {
    /// The architecture has no asynchronous hop, or the write failed.
    #[default]
    NotApplicable,
    Propagated,
    TimedOut,
    /// The write response carried no identifier to poll for.
    Unmeasurable,
}

impl PropagationStatus {
    pub fn describe(self) -> &'static str {
        match self {
            PropagationStatus::NotApplicable => "not applicable",
            PropagationStatus::Propagated => "propagated",
            PropagationStatus::TimedOut => "timed out",
            PropagationStatus::Unmeasurable => "cannot measure",
        }
    }
}

/// Millisecond measurements of one create operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationTiming {
    pub entity_name: Option<String>,
    pub entity_id: Option<String>,
    pub mutation_ms: Option<u64>,
    pub propagation_ms: Option<u64>,
    pub total_ms: Option<u64>,
    pub router_overhead_ms: Option<u64>,
    pub service_ms: Option<u64>,
    pub db_write_ms: Option<u64>,
    pub outbox_write_ms: Option<u64>,
    pub outbox_to_broker_ms: Option<u64>,
    pub consumer_to_projection_ms: Option<u64>,
    #[serde(default)]
    pub propagation: PropagationStatus,
}

impl MutationTiming {
    pub fn for_entity(name: impl Into<String>) -> Self {
        Self {
            entity_name: Some(name.into()),
            ..Default::default()
        }
    }

    /// A write flow can only be drawn once the write itself was timed.
    pub fn is_present(&self) -> bool {
        self.mutation_ms.is_some()
    }
}
