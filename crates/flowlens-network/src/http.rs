use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, StatusCode, Url};
use serde_json::{json, Value};
use tracing::debug;

use flowlens_types::{
    config::EndpointsConfig,
    person::{NewPerson, PersonSummary},
    FlowlensError, Result,
};

use crate::{
    decode_error,
    metadata::{
        federation_timing, header_millis, header_str, server_timing_from_headers,
        DATA_FRESHNESS_HEADER, EVENTS_DETAILS_HEADER, EVENTS_TIME_HEADER, QUERY_TIME_HEADER,
    },
    network_error, FederationGateway, GatewayResponse, ProjectionGateway, PropagationBreakdown,
    ServerTiming,
};

fn transport_error(err: reqwest::Error) -> FlowlensError {
    if err.is_timeout() {
        network_error(format!("request timed out: {err}"))
    } else {
        network_error(err.to_string())
    }
}

fn build_client(endpoints: &EndpointsConfig) -> Result<Client> {
    Client::builder()
        .timeout(endpoints.request_timeout())
        .build()
        .map_err(|err| network_error(format!("failed to build http client: {err}")))
}

fn parse_base(key: &str, raw: &str) -> Result<Url> {
    Url::parse(raw.trim()).map_err(|err| {
        FlowlensError::Configuration(format!("invalid {key} '{raw}': {err}"))
    })
}

/// Appends percent-encoded path segments to a base URL.
fn join_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| network_error(format!("{base} cannot be a base url")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Status, headers and JSON body; an empty body decodes to `Value::Null`.
async fn read_response(response: reqwest::Response) -> Result<(StatusCode, HeaderMap, Value)> {
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.bytes().await.map_err(transport_error)?;
    let body = if bytes.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .map_err(|err| decode_error(format!("response from {status} is not json: {err}")))?
    };
    Ok((status, headers, body))
}

fn graphql_error_message(body: &Value) -> Option<String> {
    let first = body.get("errors")?.as_array()?.first()?;
    Some(
        first
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown graphql error")
            .to_string(),
    )
}

fn person_query(id: &str) -> Result<String> {
    let literal = serde_json::to_string(id).map_err(|err| decode_error(err.to_string()))?;
    Ok(format!(
        "{{ person(id: {literal}) {{ id name email hireDate active \
         employee {{ id title department salary }} \
         badge {{ id badgeNumber accessLevel clearance }} }} }}"
    ))
}

fn create_person_mutation(person: &NewPerson) -> Result<String> {
    let name = serde_json::to_string(&person.name).map_err(|err| decode_error(err.to_string()))?;
    let email =
        serde_json::to_string(&person.email).map_err(|err| decode_error(err.to_string()))?;
    Ok(format!(
        "mutation {{ createPerson(name: {name}, email: {email}) {{ id name }} }}"
    ))
}

/// Federation router reached through GraphQL over HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpFederationGateway {
    client: Client,
    endpoint: Url,
}

impl HttpFederationGateway {
    pub fn new(endpoints: &EndpointsConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(endpoints)?,
            endpoint: parse_base("endpoints.federation_url", &endpoints.federation_url)?,
        })
    }

    async fn post_graphql(&self, query: String) -> Result<GatewayResponse> {
        debug!(endpoint = %self.endpoint, "graphql request");
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(transport_error)?;
        let (status, headers, body) = read_response(response).await?;
        Ok(GatewayResponse {
            status: status.as_u16(),
            server_timing: federation_timing(&headers, &body),
            body,
            freshness: None,
        })
    }
}

#[async_trait]
impl FederationGateway for HttpFederationGateway {
    async fn query_person(&self, id: &str) -> Result<GatewayResponse> {
        self.post_graphql(person_query(id)?).await
    }

    async fn create_person(&self, person: &NewPerson) -> Result<GatewayResponse> {
        let response = self.post_graphql(create_person_mutation(person)?).await?;
        if !response.is_success() {
            return Err(network_error(format!(
                "createPerson returned status {}",
                response.status
            )));
        }
        if response.body.pointer("/data/createPerson").map_or(true, Value::is_null) {
            if let Some(message) = graphql_error_message(&response.body) {
                return Err(network_error(format!("createPerson failed: {message}")));
            }
        }
        Ok(response)
    }

    async fn health(&self) -> Result<bool> {
        let response = self.post_graphql("{ __typename }".to_string()).await?;
        Ok(response.is_success())
    }
}

/// Event-driven write service, projection query service and optional consumer.
#[derive(Debug, Clone)]
pub struct HttpProjectionGateway {
    client: Client,
    projection: Url,
    events: Url,
    consumer: Option<Url>,
}

impl HttpProjectionGateway {
    pub fn new(endpoints: &EndpointsConfig) -> Result<Self> {
        let consumer = endpoints
            .consumer_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| parse_base("endpoints.consumer_url", url))
            .transpose()?;
        Ok(Self {
            client: build_client(endpoints)?,
            projection: parse_base("endpoints.projection_url", &endpoints.projection_url)?,
            events: parse_base("endpoints.events_url", &endpoints.events_url)?,
            consumer,
        })
    }

    async fn get(&self, url: Url) -> Result<(StatusCode, HeaderMap, Value)> {
        debug!(%url, "projection request");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;
        read_response(response).await
    }
}

#[async_trait]
impl ProjectionGateway for HttpProjectionGateway {
    async fn composed_view(&self, id: &str) -> Result<GatewayResponse> {
        let url = join_segments(&self.projection, &["api", "composed", id])?;
        let (status, headers, body) = self.get(url).await?;
        let freshness = body
            .pointer("/freshness/dataFreshness")
            .and_then(Value::as_str)
            .or_else(|| header_str(&headers, DATA_FRESHNESS_HEADER))
            .map(str::to_string);
        Ok(GatewayResponse {
            status: status.as_u16(),
            body,
            server_timing: ServerTiming {
                elapsed_ms: header_millis(&headers, QUERY_TIME_HEADER),
                ..Default::default()
            },
            freshness,
        })
    }

    async fn list_persons(&self) -> Result<Vec<PersonSummary>> {
        let url = join_segments(&self.projection, &["api", "persons"])?;
        let (status, _, body) = self.get(url).await?;
        if !status.is_success() {
            return Err(network_error(format!("person list returned status {status}")));
        }
        serde_json::from_value(body)
            .map_err(|err| decode_error(format!("unexpected person list: {err}")))
    }

    async fn create_person(&self, person: &NewPerson) -> Result<GatewayResponse> {
        let url = join_segments(&self.events, &["api", "persons"])?;
        debug!(%url, name = %person.name, "event-driven create");
        let response = self
            .client
            .post(url)
            .json(person)
            .send()
            .await
            .map_err(transport_error)?;
        let (status, headers, body) = read_response(response).await?;
        if !status.is_success() {
            return Err(network_error(format!("create returned status {status}")));
        }
        Ok(GatewayResponse {
            status: status.as_u16(),
            body,
            server_timing: server_timing_from_headers(
                &headers,
                EVENTS_TIME_HEADER,
                EVENTS_DETAILS_HEADER,
            ),
            freshness: None,
        })
    }

    async fn propagation_breakdown(&self, id: &str) -> Result<Option<PropagationBreakdown>> {
        let Some(consumer) = &self.consumer else {
            return Ok(None);
        };
        let url = join_segments(consumer, &["api", "metrics", "timing", id])?;
        let (status, _, body) = self.get(url).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(network_error(format!(
                "propagation breakdown returned status {status}"
            )));
        }
        Ok(PropagationBreakdown::from_body(&body))
    }

    async fn health(&self) -> Result<bool> {
        let url = join_segments(&self.projection, &["q", "health", "ready"])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;
        Ok(response.status().is_success())
    }
}
