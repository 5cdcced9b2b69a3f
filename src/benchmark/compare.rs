//! Side-by-side comparison of two completed runs
//!
//! Pairs two [`AggregateMetrics`] into a metrics table and a `hits × 2`
//! position-frequency matrix. Both runs must share the same `hits` and the
//! same query sample, otherwise the matrix rows would not line up.

use serde::Serialize;
use std::fmt::Write as _;

use super::quality::AggregateMetrics;
use crate::error::{EvalError, EvalResult};

/// One metrics row of the comparison table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub label: String,
    pub query_count: usize,
    pub queries_per_second: f64,
    pub mean_reciprocal_rank: f64,
}

impl From<&AggregateMetrics> for ComparisonRow {
    fn from(metrics: &AggregateMetrics) -> Self {
        Self {
            label: metrics.configuration_label.clone(),
            query_count: metrics.query_count,
            queries_per_second: metrics.queries_per_second,
            mean_reciprocal_rank: metrics.mean_reciprocal_rank,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub hits: usize,
    pub sample_fingerprint: String,
    pub rows: [ComparisonRow; 2],
    /// Row i holds the frequency at rank i+1 for run A and run B
    pub position_matrix: Vec<[f64; 2]>,
}

impl ComparisonReport {
    pub fn compare(run_a: &AggregateMetrics, run_b: &AggregateMetrics) -> EvalResult<Self> {
        if run_a.hits != run_b.hits {
            return Err(EvalError::MisalignedComparison(format!(
                "hits differ: {} vs {}",
                run_a.hits, run_b.hits
            )));
        }
        if run_a.sample_fingerprint != run_b.sample_fingerprint {
            return Err(EvalError::MisalignedComparison(format!(
                "runs used different query samples ({} vs {})",
                run_a.sample_fingerprint, run_b.sample_fingerprint
            )));
        }
        if run_a.position_frequency.len() != run_a.hits
            || run_b.position_frequency.len() != run_b.hits
        {
            return Err(EvalError::MisalignedComparison(
                "position frequency length does not match hits".to_string(),
            ));
        }

        let position_matrix = run_a
            .position_frequency
            .iter()
            .zip(&run_b.position_frequency)
            .map(|(&a, &b)| [a, b])
            .collect();

        Ok(Self {
            hits: run_a.hits,
            sample_fingerprint: run_a.sample_fingerprint.clone(),
            rows: [ComparisonRow::from(run_a), ComparisonRow::from(run_b)],
            position_matrix,
        })
    }

    /// MRR of run B minus MRR of run A
    pub fn mrr_delta(&self) -> f64 {
        self.rows[1].mean_reciprocal_rank - self.rows[0].mean_reciprocal_rank
    }

    /// Plain-text metrics table followed by the position matrix
    pub fn format_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:30} {:>10} {:>10} {:>10}", "Configuration", "Queries", "QPS", "MRR");
        let _ = writeln!(out, "{}", "─".repeat(63));
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{:30} {:>10} {:>10.1} {:>10.4}",
                row.label, row.query_count, row.queries_per_second, row.mean_reciprocal_rank
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:>8} {:>26} {:>26}",
            "Position", self.rows[0].label, self.rows[1].label
        );
        let _ = writeln!(out, "{}", "─".repeat(62));
        for (i, [a, b]) in self.position_matrix.iter().enumerate() {
            let _ = writeln!(out, "{:>8} {:>25.1}% {:>25.1}%", i + 1, a * 100.0, b * 100.0);
        }
        out
    }
}
