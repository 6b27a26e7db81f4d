use std::collections::BTreeMap;

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use flowlens_types::timing::StageTiming;

pub const QUERY_TIME_HEADER: &str = "X-Query-Time-Ms";
pub const DATA_FRESHNESS_HEADER: &str = "X-Data-Freshness";
pub const EVENTS_TIME_HEADER: &str = "X-HR-Events-Time-Ms";
pub const EVENTS_DETAILS_HEADER: &str = "X-HR-Events-Timing-Details";
pub const SUBGRAPH_TIME_HEADER: &str = "X-Subgraph-Time-Ms";
pub const SUBGRAPH_DETAILS_HEADER: &str = "X-Timing-Details";

/// Timing a backend reported about its own share of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTiming {
    /// Server-side handling time of the whole request.
    pub elapsed_ms: Option<u64>,
    /// Named sub-stages exactly as the backend spelled them.
    pub stages: BTreeMap<String, u64>,
}

impl ServerTiming {
    pub fn stage(&self, key: &str) -> Option<u64> {
        self.stages.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.elapsed_ms.is_none() && self.stages.is_empty()
    }

    /// Read-path stages keyed in the `StageTiming` vocabulary; unknown keys are ignored.
    pub fn to_stage_timing(&self) -> StageTiming {
        let object: serde_json::Map<String, Value> = self
            .stages
            .iter()
            .map(|(key, value)| (key.clone(), Value::from(*value)))
            .collect();
        serde_json::from_value(Value::Object(object)).unwrap_or_default()
    }

    fn merge(&mut self, stages: BTreeMap<String, u64>) {
        self.stages.extend(stages);
    }
}

/// Non-negative millisecond value from a JSON number or numeric string.
pub fn millis_from_value(value: &Value) -> Option<u64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (number.is_finite() && number >= 0.0).then(|| number.round() as u64)
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn header_millis(headers: &HeaderMap, name: &str) -> Option<u64> {
    millis_from_value(&Value::String(header_str(headers, name)?.to_string()))
}

/// Numeric entries of a flat JSON object; anything else is dropped.
pub fn timing_map(value: &Value) -> BTreeMap<String, u64> {
    value
        .as_object()
        .map(|object| {
            object
                .iter()
                .filter_map(|(key, v)| millis_from_value(v).map(|ms| (key.clone(), ms)))
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_timing_details(raw: &str) -> BTreeMap<String, u64> {
    serde_json::from_str::<Value>(raw)
        .map(|value| timing_map(&value))
        .unwrap_or_default()
}

/// GraphQL `extensions.timing` of a router response.
pub fn extension_timing(body: &Value) -> BTreeMap<String, u64> {
    body.pointer("/extensions/timing")
        .map(timing_map)
        .unwrap_or_default()
}

/// Collects the elapsed header and the JSON details header of one response.
pub fn server_timing_from_headers(
    headers: &HeaderMap,
    elapsed_header: &str,
    details_header: &str,
) -> ServerTiming {
    let mut timing = ServerTiming {
        elapsed_ms: header_millis(headers, elapsed_header),
        stages: BTreeMap::new(),
    };
    if let Some(raw) = header_str(headers, details_header) {
        timing.merge(parse_timing_details(raw));
    }
    timing
}

pub(crate) fn federation_timing(headers: &HeaderMap, body: &Value) -> ServerTiming {
    let mut timing =
        server_timing_from_headers(headers, SUBGRAPH_TIME_HEADER, SUBGRAPH_DETAILS_HEADER);
    timing.merge(extension_timing(body));
    timing
}

/// Consumer-reported split of the asynchronous hop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationBreakdown {
    pub outbox_to_broker_ms: Option<u64>,
    pub consumer_to_projection_ms: Option<u64>,
}

impl PropagationBreakdown {
    pub fn from_body(body: &Value) -> Option<Self> {
        let breakdown = Self {
            outbox_to_broker_ms: body.get("outboxToKafkaMs").and_then(millis_from_value),
            consumer_to_projection_ms: body
                .get("consumerToProjectionMs")
                .and_then(millis_from_value),
        };
        (breakdown != Self::default()).then_some(breakdown)
    }
}
