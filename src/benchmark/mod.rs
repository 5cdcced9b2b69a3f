//! Evaluation infrastructure
//!
//! Runs query samples against a search backend and scores the rankings.
//!
//! ## Usage
//!
//! Use the CLI to compare two ranking configurations on one shared sample:
//!
//! ```bash
//! ranking-eval compare --profile-a bm25 --profile-b native-rank --sample-size 100
//! ```
//!
//! ## Modules
//!
//! - `quality` - Reciprocal rank, MRR and rank-position frequency
//! - `engine` - Batched evaluation runs with timeouts, retries and cancellation
//! - `compare` - Side-by-side report of two runs

pub mod compare;
pub mod engine;
pub mod quality;

pub use compare::{ComparisonReport, ComparisonRow};
pub use engine::{CancelHandle, EngineOptions, EvaluationEngine, EvaluationSession};
pub use quality::{
    reciprocal_rank, relevant_rank, AggregateMetrics, EvaluationRun, PerQueryRecord,
};
