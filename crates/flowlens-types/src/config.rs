use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    activity::DEFAULT_LOG_CAPACITY, person::DEFAULT_PERSON_ID, FlowlensError, Result,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// GraphQL federation router.
    pub federation_url: String,
    /// Projection query service base URL (without the `/api` suffix).
    pub projection_url: String,
    /// HR events service accepting asynchronous writes.
    pub events_url: String,
    /// Projection consumer exposing per-entity propagation breakdowns.
    pub consumer_url: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            federation_url: "http://localhost:4000".into(),
            projection_url: "http://localhost:8090".into(),
            events_url: "http://localhost:8084".into(),
            consumer_url: None,
            request_timeout_ms: 5_000,
        }
    }
}

impl EndpointsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    pub interval_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            max_wait_ms: 10_000,
        }
    }
}

impl PropagationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// Placeholder split ratios for diagrams drawn before any stage was measured.
///
/// These numbers have no empirical basis; they only exist so a diagram can show
/// a rough breakdown of a client-measured total, always marked as estimated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    pub enabled: bool,
    pub network_share: f64,
    pub router_share: f64,
    pub hr_share: f64,
    pub employment_share: f64,
    pub security_share: f64,
    /// Portion of a subgraph call spent in its database.
    pub db_share: f64,
    pub query_service_share: f64,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            network_share: 0.10,
            router_share: 0.08,
            hr_share: 0.35,
            employment_share: 0.35,
            security_share: 0.30,
            db_share: 0.70,
            query_service_share: 0.30,
        }
    }
}

impl EstimationConfig {
    fn shares(&self) -> [(&'static str, f64); 7] {
        [
            ("network_share", self.network_share),
            ("router_share", self.router_share),
            ("hr_share", self.hr_share),
            ("employment_share", self.employment_share),
            ("security_share", self.security_share),
            ("db_share", self.db_share),
            ("query_service_share", self.query_service_share),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub default_person: String,
    pub log_capacity: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_person: DEFAULT_PERSON_ID.into(),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub log_level: String,
    pub report_dir: String,
    /// Tracing output file used while the terminal dashboard owns the screen.
    pub log_file: Option<String>,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            report_dir: "reports".into(),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowlensConfig {
    pub endpoints: EndpointsConfig,
    pub propagation: PropagationConfig,
    pub estimation: EstimationConfig,
    pub dashboard: DashboardConfig,
    pub ops: OpsConfig,
}

impl FlowlensConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            FlowlensError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            FlowlensError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        let urls = [
            ("endpoints.federation_url", self.endpoints.federation_url.as_str()),
            ("endpoints.projection_url", self.endpoints.projection_url.as_str()),
            ("endpoints.events_url", self.endpoints.events_url.as_str()),
        ];
        for (key, url) in urls {
            if url.trim().is_empty() {
                return Err(FlowlensError::Configuration(format!(
                    "{key} must not be empty"
                )));
            }
        }
        if self.endpoints.request_timeout_ms == 0 {
            return Err(FlowlensError::Configuration(
                "endpoints.request_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.propagation.interval_ms == 0 {
            return Err(FlowlensError::Configuration(
                "propagation.interval_ms must be greater than zero".into(),
            ));
        }
        if self.propagation.interval_ms >= self.propagation.max_wait_ms {
            return Err(FlowlensError::Configuration(
                "propagation.interval_ms must be smaller than propagation.max_wait_ms".into(),
            ));
        }
        for (key, share) in self.estimation.shares() {
            if !(0.0..=1.0).contains(&share) {
                return Err(FlowlensError::Configuration(format!(
                    "estimation.{key} must be between 0.0 and 1.0"
                )));
            }
        }
        if self.dashboard.log_capacity == 0 {
            return Err(FlowlensError::Configuration(
                "dashboard.log_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
