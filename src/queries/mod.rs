//! Queries and relevance judgments
//!
//! ## Data model
//!
//! - [`QueryRecord`]: one query text, loaded once from the queries file
//! - [`RelevanceJudgment`]: the single document judged relevant for a query
//! - [`QueryRelevanceSample`]: a fixed random draw of query/judgment pairs,
//!   shared read-only by every evaluation run of a session so that different
//!   ranking configurations are compared on identical queries
//!
//! Relevance is binary and single-answer: exactly one relevant document per
//! query. Reciprocal rank is computed against that one document.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// A query text keyed by its corpus id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query_id: String,
    pub text: String,
}

/// The document considered correct for a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceJudgment {
    pub query_id: String,
    pub relevant_document_id: String,
}

/// One entry of a sample: query text joined with its relevant document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampledQuery {
    pub query_id: String,
    pub text: String,
    pub relevant_document_id: String,
}

/// Immutable query/judgment sample
///
/// Iterates in draw order. Keys are unique and every entry has both a query
/// text and a judgment.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRelevanceSample {
    entries: Vec<SampledQuery>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl QueryRelevanceSample {
    /// Build a sample from already-joined entries
    ///
    /// Later duplicates of a query id are dropped.
    pub fn from_entries(entries: impl IntoIterator<Item = SampledQuery>) -> Self {
        let mut kept = Vec::new();
        let mut index = HashMap::new();
        for entry in entries {
            if index.contains_key(&entry.query_id) {
                continue;
            }
            index.insert(entry.query_id.clone(), kept.len());
            kept.push(entry);
        }
        Self { entries: kept, index }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampledQuery> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[SampledQuery] {
        &self.entries
    }

    pub fn get(&self, query_id: &str) -> Option<&SampledQuery> {
        self.index.get(query_id).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, query_id: &str) -> bool {
        self.index.contains_key(query_id)
    }

    /// Identity of the query set, independent of draw order
    ///
    /// Two runs with the same fingerprint were evaluated on the same queries.
    pub fn fingerprint(&self) -> String {
        let mut ids: Vec<&str> = self.entries.iter().map(|e| e.query_id.as_str()).collect();
        ids.sort_unstable();

        let mut hasher = Sha256::new();
        for id in ids {
            hasher.update(id.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())[..16].to_string()
    }
}

impl<'a> IntoIterator for &'a QueryRelevanceSample {
    type Item = &'a SampledQuery;
    type IntoIter = std::slice::Iter<'a, SampledQuery>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
