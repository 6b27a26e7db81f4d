use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::timing::{Architecture, MutationTiming, StageTiming};

pub const FRESHNESS_UNKNOWN: &str = "N/A";

/// Aggregated read-side metrics for one architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub architecture: Architecture,
    pub latency_ms: Option<u64>,
    pub stage_timing: StageTiming,
    pub services_up: BTreeMap<String, bool>,
    pub query_count: u64,
    pub error_count: u64,
    pub last_result: Option<serde_json::Value>,
    pub last_entity: Option<String>,
    /// Only reported by the projected read path.
    pub freshness: Option<String>,
}

impl MetricsSnapshot {
    pub fn new(architecture: Architecture) -> Self {
        let services_up = architecture
            .dependencies()
            .iter()
            .map(|name| (name.to_string(), false))
            .collect();
        Self {
            architecture,
            latency_ms: None,
            stage_timing: StageTiming::default(),
            services_up,
            query_count: 0,
            error_count: 0,
            last_result: None,
            last_entity: None,
            freshness: None,
        }
    }

    /// Health is probed per architecture, so every dependency shares the verdict.
    pub fn mark_services(&mut self, up: bool) {
        for flag in self.services_up.values_mut() {
            *flag = up;
        }
    }

    pub fn all_services_up(&self) -> bool {
        self.services_up.values().all(|up| *up)
    }

    pub fn freshness_label(&self) -> &str {
        self.freshness.as_deref().unwrap_or(FRESHNESS_UNKNOWN)
    }
}

/// Read latency comparison between the two architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub federated_ms: Option<u64>,
    pub projected_ms: Option<u64>,
    /// How much slower the federated read was, relative to the projected one.
    pub latency_diff_percent: Option<i64>,
}

impl ComparisonSummary {
    pub fn from_snapshots(federated: &MetricsSnapshot, projected: &MetricsSnapshot) -> Self {
        let latency_diff_percent = match (federated.latency_ms, projected.latency_ms) {
            (Some(fed), Some(proj)) if proj > 0 => {
                Some(((fed as f64 - proj as f64) / proj as f64 * 100.0).round() as i64)
            }
            _ => None,
        };
        Self {
            federated_ms: federated.latency_ms,
            projected_ms: projected.latency_ms,
            latency_diff_percent,
        }
    }
}

/// Write cost comparison once both architectures completed a create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteComparison {
    /// The synchronous write was faster by this percentage.
    SyncFaster(i64),
    SimilarSpeed,
}

impl WriteComparison {
    pub fn between(sync: &MutationTiming, asynchronous: &MutationTiming) -> Option<Self> {
        let sync_total = sync.total_ms.filter(|t| *t > 0)?;
        let async_total = asynchronous.total_ms.filter(|t| *t > 0)?;
        if async_total > sync_total {
            let percent = ((async_total as f64 / sync_total as f64 - 1.0) * 100.0).round() as i64;
            Some(WriteComparison::SyncFaster(percent))
        } else {
            Some(WriteComparison::SimilarSpeed)
        }
    }

    pub fn describe(&self) -> String {
        match self {
            WriteComparison::SyncFaster(percent) => format!("{percent}% faster"),
            WriteComparison::SimilarSpeed => "similar speed".to_string(),
        }
    }
}
