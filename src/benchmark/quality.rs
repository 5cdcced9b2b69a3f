//! Quality metrics for ranked retrieval evaluation
//!
//! Implements reciprocal rank, mean reciprocal rank (MRR) and the
//! rank-position frequency distribution.
//!
//! ## Metrics Overview
//!
//! - **Reciprocal rank**: 1/rank of the relevant document within the first
//!   `hits` results, 0 if absent
//! - **MRR**: reciprocal rank averaged across the query sample
//! - **Position frequency**: for each rank 1..=hits, the fraction of queries
//!   whose relevant document landed there. Misses are not counted anywhere,
//!   so the buckets sum to at most 1.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::RankingConfiguration;
use crate::error::{EvalError, EvalResult};

/// Zero-based position of the first occurrence of `relevant_id` in the first
/// `hits` entries
pub fn relevant_rank(ranking: &[String], relevant_id: &str, hits: usize) -> Option<usize> {
    ranking
        .iter()
        .take(hits)
        .position(|id| id == relevant_id)
}

/// Reciprocal rank: `1/(rank+1)` for a found document, 0 otherwise
pub fn reciprocal_rank(ranking: &[String], relevant_id: &str, hits: usize) -> f64 {
    relevant_rank(ranking, relevant_id, hits)
        .map(|rank| 1.0 / (rank as f64 + 1.0))
        .unwrap_or(0.0)
}

/// Reciprocal rank of one query in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerQueryRecord {
    pub query_id: String,
    /// In {0} ∪ {1/k : k = 1..=hits}
    pub reciprocal_rank: f64,
    /// Zero-based rank of the relevant document, if found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
}

impl PerQueryRecord {
    /// Score one query's ranked ids against its relevant document
    pub fn score(query_id: &str, ranking: &[String], relevant_id: &str, hits: usize) -> Self {
        let rank = relevant_rank(ranking, relevant_id, hits);
        Self {
            query_id: query_id.to_string(),
            reciprocal_rank: rank.map(|r| 1.0 / (r as f64 + 1.0)).unwrap_or(0.0),
            rank,
        }
    }

    pub fn found(&self) -> bool {
        self.rank.is_some()
    }
}

/// Corpus-level metrics for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    /// Configuration label, e.g. "bm25, AND"
    pub configuration_label: String,
    pub rank_profile: String,
    pub grammar: String,
    pub hits: usize,
    pub query_count: usize,
    pub queries_per_second: f64,
    pub mean_reciprocal_rank: f64,
    /// Length `hits`; index i is the fraction of queries found at rank i+1
    pub position_frequency: Vec<f64>,
    /// Wall-clock time of the whole batch (seconds)
    pub elapsed_secs: f64,
    /// Fingerprint of the query sample the run used
    pub sample_fingerprint: String,
}

impl AggregateMetrics {
    /// Aggregate per-query records
    ///
    /// `elapsed` is the wall-clock time of the whole batch, not summed
    /// per-request latency.
    pub fn aggregate(
        configuration: &RankingConfiguration,
        records: &[PerQueryRecord],
        elapsed: Duration,
        sample_fingerprint: &str,
    ) -> EvalResult<Self> {
        let query_count = records.len();
        if query_count == 0 {
            return Err(EvalError::ZeroSample);
        }

        let hits = configuration.hits;
        let mut position_count = vec![0usize; hits];
        let mut total_rr = 0.0;
        for record in records {
            total_rr += record.reciprocal_rank;
            if let Some(rank) = record.rank.filter(|&r| r < hits) {
                position_count[rank] += 1;
            }
        }

        let n = query_count as f64;
        // Guard against a zero timer reading on very fast batches
        let elapsed_secs = elapsed.as_secs_f64().max(1e-9);

        Ok(Self {
            configuration_label: configuration.label(),
            rank_profile: configuration.rank_profile.profile_name().to_string(),
            grammar: configuration.grammar.label().to_string(),
            hits,
            query_count,
            queries_per_second: n / elapsed_secs,
            mean_reciprocal_rank: total_rr / n,
            position_frequency: position_count.iter().map(|&c| c as f64 / n).collect(),
            elapsed_secs,
            sample_fingerprint: sample_fingerprint.to_string(),
        })
    }

    /// Fraction of queries whose relevant document appeared within `hits`
    pub fn found_fraction(&self) -> f64 {
        self.position_frequency.iter().sum()
    }

    /// Format as a summary string
    pub fn format_summary(&self) -> String {
        format!(
            "MRR: {:.3} | Found@{}: {:.1}% | P@1: {:.1}% | Queries: {} | QPS: {:.1}",
            self.mean_reciprocal_rank,
            self.hits,
            self.found_fraction() * 100.0,
            self.position_frequency.first().copied().unwrap_or(0.0) * 100.0,
            self.query_count,
            self.queries_per_second,
        )
    }
}

/// Records and metrics of one completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub configuration: RankingConfiguration,
    pub records: Vec<PerQueryRecord>,
    pub metrics: AggregateMetrics,
}

impl EvaluationRun {
    pub fn position_frequency(&self) -> &[f64] {
        &self.metrics.position_frequency
    }
}
