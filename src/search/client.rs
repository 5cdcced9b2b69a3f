//! HTTP search client
//!
//! Issues `POST {scheme}://{host}:{port}/search/` with a JSON body. The query
//! text travels as the `userQuery` parameter referenced from the YQL, never
//! concatenated into the query language.

use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::traits::{measure_async, RawResponse, SearchBackend};
use crate::config::{BackendConfig, RankingConfiguration};
use crate::error::SearchError;

/// Longest error body kept in a [`SearchError::Status`]
const ERROR_BODY_MAX_LEN: usize = 200;

/// Search client over a pooled `reqwest::Client`
pub struct HttpSearchClient {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    backend_timeout_secs: f64,
    name: String,
}

impl HttpSearchClient {
    pub fn new(config: &BackendConfig) -> Result<Self, SearchError> {
        let endpoint_str = config.endpoint();
        let endpoint = reqwest::Url::parse(&endpoint_str)
            .map_err(|e| SearchError::InvalidEndpoint(format!("{}: {}", endpoint_str, e)))?;
        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            return Err(SearchError::InvalidEndpoint(format!(
                "unsupported scheme: {} (only http/https allowed)",
                endpoint.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("ranking-eval/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.concurrency.max(1))
            .build()
            .map_err(|e| SearchError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            name: format!("http:{}", endpoint),
            endpoint,
            backend_timeout_secs: config.backend_timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }

    async fn send(&self, body: &Value, timeout: Duration) -> Result<Value, SearchError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: text.chars().take(ERROR_BODY_MAX_LEN).collect(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(e, timeout))?;
        let json: Value = serde_json::from_slice(&bytes)
            .map_err(|e| SearchError::Malformed(format!("invalid JSON: {}", e)))?;

        check_response(&json)?;
        Ok(json)
    }
}

fn classify_reqwest_error(e: reqwest::Error, timeout: Duration) -> SearchError {
    if e.is_timeout() {
        SearchError::Timeout(timeout)
    } else {
        SearchError::Transport(e.to_string())
    }
}

/// Build the request body for one query
pub fn build_request_body(
    query_text: &str,
    configuration: &RankingConfiguration,
    backend_timeout_secs: f64,
) -> Value {
    let mut body = json!({
        "yql": configuration.grammar.yql(),
        "userQuery": query_text,
        "hits": configuration.hits,
        "offset": configuration.offset,
        "ranking": configuration.rank_profile.profile_name(),
        "timeout": backend_timeout_secs,
        "presentation.format": "json",
    });
    if let (Some(summary), Some(map)) = (&configuration.summary, body.as_object_mut()) {
        map.insert("summary".to_string(), Value::String(summary.clone()));
    }
    body
}

/// Reject bodies that are not a result envelope or that report backend errors
///
/// A missing `root.children` is a zero-hit response, not an error.
pub fn check_response(json: &Value) -> Result<(), SearchError> {
    if !json.is_object() {
        return Err(SearchError::Malformed("response is not a JSON object".to_string()));
    }
    let errors = json
        .pointer("/root/errors")
        .and_then(Value::as_array)
        .filter(|errors| !errors.is_empty());
    if let Some(errors) = errors {
        let messages: Vec<String> = errors
            .iter()
            .map(|e| {
                e.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| e.to_string())
            })
            .collect();
        return Err(SearchError::Backend(messages.join("; ")));
    }
    Ok(())
}

#[async_trait::async_trait]
impl SearchBackend for HttpSearchClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query_text: &str,
        configuration: &RankingConfiguration,
        timeout: Duration,
    ) -> Result<RawResponse, SearchError> {
        let body = build_request_body(query_text, configuration, self.backend_timeout_secs);
        let (result, duration) = measure_async(self.send(&body, timeout)).await;
        debug!(
            ranking = configuration.rank_profile.profile_name(),
            latency_ms = duration.as_millis() as u64,
            ok = result.is_ok(),
            "search request"
        );
        result.map(|json| RawResponse::new(json, duration))
    }
}
