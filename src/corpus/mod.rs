//! Relevance corpus loading and sampling
//!
//! ```rust,ignore
//! use corpus::RelevanceCorpus;
//!
//! let corpus = RelevanceCorpus::load(&queries_path, &qrels_path)?;
//! let sample = corpus.sample(100)?; // draw once, reuse for every run
//! ```

pub mod loader;
pub mod sample;

pub use loader::{load_judgments, load_queries, RelevanceCorpus};
pub use sample::{sample, sample_with_rng};
