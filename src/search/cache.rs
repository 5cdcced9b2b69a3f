//! Explicit response cache
//!
//! Responses are keyed by a SHA-256 of the canonical JSON encoding of
//! `(query_text, configuration)`. The cache is a value the caller creates and
//! injects; nothing is memoized globally, so tests can run with or without it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::debug;

use super::traits::{RawResponse, SearchBackend};
use crate::config::RankingConfiguration;
use crate::error::SearchError;

/// In-memory response cache
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, RawResponse>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical key for a request
    pub fn key(query_text: &str, configuration: &RankingConfiguration) -> String {
        // Struct field order is fixed, so serde_json output is canonical
        let encoded = serde_json::to_string(&(query_text, configuration))
            .unwrap_or_else(|_| format!("{}\u{0}{:?}", query_text, configuration));
        let mut hasher = Sha256::new();
        hasher.update(encoded.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<RawResponse> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let found = entries.get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, key: String, response: RawResponse) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, response);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Backend wrapper serving repeated requests from a [`ResponseCache`]
///
/// Failed requests are never cached.
pub struct CachedBackend<B> {
    inner: B,
    cache: Arc<ResponseCache>,
    name: String,
}

impl<B: SearchBackend> CachedBackend<B> {
    pub fn new(inner: B, cache: Arc<ResponseCache>) -> Self {
        let name = format!("cached:{}", inner.name());
        Self { inner, cache, name }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }
}

#[async_trait::async_trait]
impl<B: SearchBackend> SearchBackend for CachedBackend<B> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query_text: &str,
        configuration: &RankingConfiguration,
        timeout: Duration,
    ) -> Result<RawResponse, SearchError> {
        let key = ResponseCache::key(query_text, configuration);
        if let Some(mut cached) = self.cache.get(&key) {
            debug!(key = &key[..12], "response cache hit");
            cached.duration = Duration::ZERO;
            return Ok(cached);
        }

        let response = self.inner.search(query_text, configuration, timeout).await?;
        self.cache.insert(key, response.clone());
        Ok(response)
    }
}
