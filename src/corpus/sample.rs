//! Query/judgment sampling
//!
//! Draws `n` distinct judged queries uniformly at random, without replacement,
//! and joins each with its query text. Draw once per session and reuse the
//! resulting [`QueryRelevanceSample`] for every configuration being compared.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use tracing::{info, warn};

use super::loader::RelevanceCorpus;
use crate::error::{EvalError, EvalResult};
use crate::queries::{QueryRecord, QueryRelevanceSample, RelevanceJudgment, SampledQuery};

/// Sample with a fresh thread-local RNG (different draw every call)
pub fn sample(
    judgments: &HashMap<String, RelevanceJudgment>,
    queries: &HashMap<String, QueryRecord>,
    n: usize,
) -> EvalResult<QueryRelevanceSample> {
    sample_with_rng(judgments, queries, n, &mut rand::thread_rng())
}

/// Sample with a caller-supplied RNG (seed it for a reproducible draw)
pub fn sample_with_rng<R: Rng + ?Sized>(
    judgments: &HashMap<String, RelevanceJudgment>,
    queries: &HashMap<String, QueryRecord>,
    n: usize,
    rng: &mut R,
) -> EvalResult<QueryRelevanceSample> {
    // Sorted so a seeded RNG gives the same draw regardless of map order
    let mut eligible: Vec<&RelevanceJudgment> = judgments
        .values()
        .filter(|j| queries.contains_key(&j.query_id))
        .collect();
    eligible.sort_by(|a, b| a.query_id.cmp(&b.query_id));

    let orphans = judgments.len() - eligible.len();
    if orphans > 0 {
        warn!(orphans, "judgments without a query text are excluded from sampling");
    }

    if eligible.len() < n {
        return Err(EvalError::InsufficientCorpus {
            requested: n,
            available: eligible.len(),
        });
    }

    let entries = eligible
        .choose_multiple(rng, n)
        .filter_map(|judgment| {
            queries.get(&judgment.query_id).map(|query| SampledQuery {
                query_id: judgment.query_id.clone(),
                text: query.text.clone(),
                relevant_document_id: judgment.relevant_document_id.clone(),
            })
        });

    let sample = QueryRelevanceSample::from_entries(entries);
    info!(
        requested = n,
        available = eligible.len(),
        fingerprint = %sample.fingerprint(),
        "sampled queries"
    );
    Ok(sample)
}

impl RelevanceCorpus {
    pub fn sample(&self, n: usize) -> EvalResult<QueryRelevanceSample> {
        sample(&self.judgments, &self.queries, n)
    }

    pub fn sample_with_rng<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> EvalResult<QueryRelevanceSample> {
        sample_with_rng(&self.judgments, &self.queries, n, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn corpus(size: usize) -> RelevanceCorpus {
        let mut queries = HashMap::new();
        let mut judgments = HashMap::new();
        for i in 0..size {
            let id = format!("q{i}");
            queries.insert(
                id.clone(),
                QueryRecord { query_id: id.clone(), text: format!("query text {i}") },
            );
            judgments.insert(
                id.clone(),
                RelevanceJudgment { query_id: id, relevant_document_id: format!("D{i}") },
            );
        }
        RelevanceCorpus::from_parts(queries, judgments)
    }

    #[test]
    fn test_sample_without_replacement() {
        let corpus = corpus(200);
        let sample = corpus.sample(50).unwrap();

        assert_eq!(sample.len(), 50);
        let ids: HashSet<_> = sample.iter().map(|e| e.query_id.clone()).collect();
        assert_eq!(ids.len(), 50);
        for entry in &sample {
            assert!(corpus.queries.contains_key(&entry.query_id));
            let judgment = &corpus.judgments[&entry.query_id];
            assert_eq!(entry.relevant_document_id, judgment.relevant_document_id);
            assert_eq!(entry.text, corpus.queries[&entry.query_id].text);
        }
    }

    #[test]
    fn test_sample_whole_corpus() {
        let corpus = corpus(10);
        let sample = corpus.sample(10).unwrap();
        assert_eq!(sample.len(), 10);
    }

    #[test]
    fn test_insufficient_corpus() {
        let corpus = corpus(100);
        let err = corpus.sample(500).unwrap_err();
        assert!(matches!(
            err,
            EvalError::InsufficientCorpus { requested: 500, available: 100 }
        ));
    }

    #[test]
    fn test_orphan_judgments_not_sampled() {
        let mut corpus = corpus(5);
        corpus.judgments.insert(
            "orphan".to_string(),
            RelevanceJudgment {
                query_id: "orphan".to_string(),
                relevant_document_id: "DX".to_string(),
            },
        );
        assert_eq!(corpus.eligible_count(), 5);
        assert!(matches!(
            corpus.sample(6),
            Err(EvalError::InsufficientCorpus { requested: 6, available: 5 })
        ));
        let sample = corpus.sample(5).unwrap();
        assert!(!sample.contains("orphan"));
    }

    #[test]
    fn test_seeded_sample_is_reproducible() {
        let corpus = corpus(200);
        let a = corpus.sample_with_rng(20, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = corpus.sample_with_rng(20, &mut StdRng::seed_from_u64(42)).unwrap();
        let c = corpus.sample_with_rng(20, &mut StdRng::seed_from_u64(43)).unwrap();

        let ids = |s: &QueryRelevanceSample| s.iter().map(|e| e.query_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
        assert_ne!(ids(&a), ids(&c));
    }
}
