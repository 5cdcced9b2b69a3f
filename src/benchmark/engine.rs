//! Evaluation engine
//!
//! Runs every query of a [`QueryRelevanceSample`] through a [`SearchBackend`]
//! under one [`RankingConfiguration`], scores each ranked list against the
//! query's relevant document, and aggregates corpus-level metrics.
//!
//! Queries are independent, so up to `concurrency` requests are kept in
//! flight at once. Records stay in sample order. A backend
//! failure on any query aborts the run: skipping the query would bias MRR, and
//! scoring it as 0 would conflate "not found" with "could not ask".

use futures::stream::{self, StreamExt};
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::quality::{AggregateMetrics, EvaluationRun, PerQueryRecord};
use crate::config::{BackendConfig, RankingConfiguration};
use crate::corpus::RelevanceCorpus;
use crate::error::{EvalError, EvalResult, SearchError};
use crate::queries::{QueryRelevanceSample, SampledQuery};
use crate::search::{parser, RawResponse, SearchBackend};

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Maximum in-flight requests (1 = sequential)
    pub concurrency: usize,
    /// Client-side timeout applied to every request
    pub request_timeout: Duration,
    /// Retries for transient failures
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries
    pub retry_base_delay: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            request_timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(250),
        }
    }
}

impl EngineOptions {
    pub fn from_backend(config: &BackendConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            request_timeout: config.request_timeout(),
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }
}

/// Shared flag that aborts in-progress runs
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the engine can be reused
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One sample evaluated under several configurations
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSession {
    pub sample: QueryRelevanceSample,
    pub runs: Vec<EvaluationRun>,
}

pub struct EvaluationEngine {
    backend: Arc<dyn SearchBackend>,
    options: EngineOptions,
    cancel: CancelHandle,
}

impl EvaluationEngine {
    pub fn new(backend: Arc<dyn SearchBackend>, options: EngineOptions) -> Self {
        Self {
            backend,
            options,
            cancel: CancelHandle::default(),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn check_cancelled(&self) -> EvalResult<()> {
        if self.cancel.is_cancelled() {
            return Err(EvalError::Cancelled);
        }
        Ok(())
    }

    /// Evaluate one configuration over a sample
    ///
    /// On error or cancellation no partial records or metrics are returned.
    pub async fn evaluate(
        &self,
        sample: &QueryRelevanceSample,
        configuration: &RankingConfiguration,
    ) -> EvalResult<EvaluationRun> {
        configuration.validate()?;
        if sample.is_empty() {
            return Err(EvalError::ZeroSample);
        }

        let label = configuration.label();
        info!(
            label = %label,
            queries = sample.len(),
            concurrency = self.options.concurrency,
            backend = self.backend.name(),
            "starting evaluation run"
        );

        let start = Instant::now();
        let mut indexed = Vec::with_capacity(sample.len());

        // Unordered window keeps every slot busy; sample order is restored below
        let mut results = stream::iter(sample.entries().iter().enumerate())
            .map(|(index, entry)| async move {
                (index, self.evaluate_query(entry, configuration).await)
            })
            .buffer_unordered(self.options.concurrency.max(1));
        while let Some((index, result)) = results.next().await {
            indexed.push((index, result?));
        }
        self.check_cancelled()?;

        indexed.sort_unstable_by_key(|(index, _)| *index);
        let records: Vec<PerQueryRecord> = indexed.into_iter().map(|(_, record)| record).collect();

        let elapsed = start.elapsed();
        let metrics =
            AggregateMetrics::aggregate(configuration, &records, elapsed, &sample.fingerprint())?;

        info!(label = %label, "{}", metrics.format_summary());

        Ok(EvaluationRun {
            configuration: configuration.clone(),
            records,
            metrics,
        })
    }

    async fn evaluate_query(
        &self,
        entry: &SampledQuery,
        configuration: &RankingConfiguration,
    ) -> EvalResult<PerQueryRecord> {
        let raw = self.search_with_retry(entry, configuration).await?;
        let ranking = parser::parse(&raw);
        let record = PerQueryRecord::score(
            &entry.query_id,
            &ranking,
            &entry.relevant_document_id,
            configuration.hits,
        );
        debug!(
            query_id = %entry.query_id,
            returned = ranking.len(),
            rank = ?record.rank,
            rr = record.reciprocal_rank,
            "scored query"
        );
        Ok(record)
    }

    async fn search_once(
        &self,
        query_text: &str,
        configuration: &RankingConfiguration,
    ) -> Result<RawResponse, SearchError> {
        let timeout = self.options.request_timeout;
        match tokio::time::timeout(timeout, self.backend.search(query_text, configuration, timeout))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout(timeout)),
        }
    }

    async fn search_with_retry(
        &self,
        entry: &SampledQuery,
        configuration: &RankingConfiguration,
    ) -> EvalResult<RawResponse> {
        let mut attempt: u32 = 0;
        loop {
            self.check_cancelled()?;

            match self.search_once(&entry.text, configuration).await {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_transient() && attempt < self.options.max_retries => {
                    attempt += 1;
                    let delay = self.options.retry_base_delay * 2_u32.saturating_pow(attempt - 1);
                    warn!(
                        query_id = %entry.query_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying search after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(source) => {
                    return Err(EvalError::BackendUnavailable {
                        query_id: entry.query_id.clone(),
                        source,
                    })
                }
            }
        }
    }

    /// Sample once, then evaluate every configuration on that same sample
    ///
    /// Configuration and sampling errors are reported before any backend call.
    pub async fn run_session<R: Rng + ?Sized>(
        &self,
        corpus: &RelevanceCorpus,
        sample_size: usize,
        rng: &mut R,
        configurations: &[RankingConfiguration],
    ) -> EvalResult<EvaluationSession> {
        for configuration in configurations {
            configuration.validate()?;
        }
        if sample_size == 0 {
            return Err(EvalError::ZeroSample);
        }

        let sample = corpus.sample_with_rng(sample_size, rng)?;

        let mut runs = Vec::with_capacity(configurations.len());
        for configuration in configurations {
            runs.push(self.evaluate(&sample, configuration).await?);
        }

        Ok(EvaluationSession { sample, runs })
    }
}
