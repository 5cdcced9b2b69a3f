//! Search backend trait abstraction
//!
//! Defines a common interface for anything that can answer a ranked retrieval
//! request: the HTTP client, the caching wrapper, and test doubles.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::RankingConfiguration;
use crate::error::SearchError;

/// Raw backend response with timing metadata
#[derive(Debug, Clone, Serialize)]
pub struct RawResponse {
    /// Decoded JSON body
    pub json: Value,
    /// Time taken by the call (zero when served from a cache)
    #[serde(skip)]
    pub duration: Duration,
}

impl RawResponse {
    pub fn new(json: Value, duration: Duration) -> Self {
        Self { json, duration }
    }
}

/// Unified trait for ranked retrieval backends
///
/// Implementations issue exactly one request per call and never retry; retry
/// policy belongs to the caller.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Run one ranked retrieval request
    ///
    /// Identical `(query_text, configuration)` pairs are read-only against the
    /// backend, so responses may be cached by the caller.
    async fn search(
        &self,
        query_text: &str,
        configuration: &RankingConfiguration,
        timeout: Duration,
    ) -> Result<RawResponse, SearchError>;
}

/// Helper to measure duration of an async operation
pub async fn measure_async<F, T>(f: F) -> (T, Duration)
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let result = f.await;
    let duration = start.elapsed();
    (result, duration)
}
