//! HTTP collaborators for both architectures.
//!
//! The orchestrator only sees the [`FederationGateway`] and [`ProjectionGateway`]
//! traits; the `reqwest` implementations live in [`http`].

pub mod http;
pub mod metadata;

use async_trait::async_trait;
use serde_json::Value;

use flowlens_types::{
    person::{NewPerson, PersonSummary},
    FlowlensError, Result,
};

pub use http::{HttpFederationGateway, HttpProjectionGateway};
pub use metadata::{PropagationBreakdown, ServerTiming};

pub fn network_error(msg: impl Into<String>) -> FlowlensError {
    FlowlensError::Network(msg.into())
}

pub fn decode_error(msg: impl Into<String>) -> FlowlensError {
    FlowlensError::Decode(msg.into())
}

/// Decoded response of one backend call plus whatever timing it reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayResponse {
    pub status: u16,
    /// `Value::Null` when the body was empty.
    pub body: Value,
    pub server_timing: ServerTiming,
    /// Only sent by the projection query service.
    pub freshness: Option<String>,
}

impl GatewayResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// String or numeric value at a JSON pointer, e.g. `/data/createPerson/id`.
    pub fn string_at(&self, pointer: &str) -> Option<String> {
        match self.body.pointer(pointer)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// GraphQL federation router.
#[async_trait]
pub trait FederationGateway: Send + Sync {
    /// Composed person read; a non-success status is still a response.
    async fn query_person(&self, id: &str) -> Result<GatewayResponse>;
    async fn create_person(&self, person: &NewPerson) -> Result<GatewayResponse>;
    /// `Ok(false)` when the router answered with a non-success status.
    async fn health(&self) -> Result<bool>;
}

/// Event-driven write side together with its projection read side.
#[async_trait]
pub trait ProjectionGateway: Send + Sync {
    /// Projected composed view; a non-success status is still a response.
    async fn composed_view(&self, id: &str) -> Result<GatewayResponse>;
    async fn list_persons(&self) -> Result<Vec<PersonSummary>>;
    async fn create_person(&self, person: &NewPerson) -> Result<GatewayResponse>;
    /// `Ok(None)` when no consumer is configured or it has no data for `id`.
    async fn propagation_breakdown(&self, id: &str) -> Result<Option<PropagationBreakdown>>;
    async fn health(&self) -> Result<bool>;
}
