//! Corpus loader for query/relevance files
//!
//! Reads the two tabular corpus files:
//!
//! - queries: `query_id<TAB>query text`
//! - qrels (TREC convention): `query_id iteration document_id relevance_grade`
//!
//! Files ending in `.gz` are gzip-decoded; anything else is read as plain text.
//!
//! ```rust,ignore
//! let corpus = RelevanceCorpus::load(&queries_path, &qrels_path)?;
//! let sample = corpus.sample(100)?;
//! ```

use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{EvalError, EvalResult};
use crate::queries::{QueryRecord, RelevanceJudgment};

/// Loaded queries and judgments, keyed by query id
#[derive(Debug, Clone, Default)]
pub struct RelevanceCorpus {
    pub queries: HashMap<String, QueryRecord>,
    pub judgments: HashMap<String, RelevanceJudgment>,
}

impl RelevanceCorpus {
    /// Load both corpus files
    pub fn load(queries_source: &Path, judgments_source: &Path) -> EvalResult<Self> {
        let queries = load_queries(queries_source)?;
        let judgments = load_judgments(judgments_source)?;
        info!(
            queries = queries.len(),
            judgments = judgments.len(),
            "loaded relevance corpus"
        );
        Ok(Self { queries, judgments })
    }

    pub fn from_parts(
        queries: HashMap<String, QueryRecord>,
        judgments: HashMap<String, RelevanceJudgment>,
    ) -> Self {
        Self { queries, judgments }
    }

    /// Judged queries that also have a query text
    pub fn eligible_count(&self) -> usize {
        self.judgments
            .keys()
            .filter(|id| self.queries.contains_key(*id))
            .count()
    }
}

fn source_name(path: &Path) -> String {
    path.display().to_string()
}

fn open_lines(path: &Path) -> EvalResult<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|source| EvalError::CorpusIo {
        source_name: source_name(path),
        source,
    })?;
    let is_gzip = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"));

    let reader: Box<dyn Read> = if is_gzip {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

fn format_error(path: &Path, line: usize, reason: impl Into<String>) -> EvalError {
    EvalError::CorpusFormat {
        source_name: source_name(path),
        line,
        reason: reason.into(),
    }
}

/// Feed each decoded line (1-based number, without line ending) to `row`
///
/// Content that cannot be decoded (bad gzip stream, invalid UTF-8) is a
/// format error on the line where decoding failed; only failures of the
/// underlying read are IO errors.
fn for_each_line(
    mut reader: impl BufRead,
    path: &Path,
    mut row: impl FnMut(usize, &str) -> EvalResult<()>,
) -> EvalResult<()> {
    let mut buf = Vec::new();
    let mut line_num = 0;
    loop {
        buf.clear();
        line_num += 1;
        let read = reader.read_until(b'\n', &mut buf).map_err(|source| match source.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
                format_error(path, line_num, format!("undecodable content: {}", source))
            }
            _ => EvalError::CorpusIo {
                source_name: source_name(path),
                source,
            },
        })?;
        if read == 0 {
            return Ok(());
        }

        let line = std::str::from_utf8(&buf)
            .map_err(|e| format_error(path, line_num, format!("invalid UTF-8: {}", e)))?;
        row(line_num, line.trim_end_matches(['\r', '\n']))?;
    }
}

/// Load `query_id<TAB>text` rows
pub fn load_queries(path: &Path) -> EvalResult<HashMap<String, QueryRecord>> {
    let reader = open_lines(path)?;
    parse_queries(reader, path)
}

/// A query id repeated with the same text is tolerated; a different text is
/// rejected.
fn parse_queries(reader: impl BufRead, path: &Path) -> EvalResult<HashMap<String, QueryRecord>> {
    let mut queries: HashMap<String, QueryRecord> = HashMap::new();
    let mut repeated = 0usize;

    for_each_line(reader, path, |line_num, line| {
        if line.trim().is_empty() {
            return Ok(());
        }

        let (query_id, text) = line
            .split_once('\t')
            .ok_or_else(|| format_error(path, line_num, "expected query_id<TAB>text"))?;
        let query_id = query_id.trim();
        if query_id.is_empty() {
            return Err(format_error(path, line_num, "empty query id"));
        }
        let text = text.trim();

        match queries.get(query_id) {
            Some(existing) if existing.text != text => Err(format_error(
                path,
                line_num,
                format!("query {} appears again with a different text", query_id),
            )),
            Some(_) => {
                repeated += 1;
                Ok(())
            }
            None => {
                queries.insert(
                    query_id.to_string(),
                    QueryRecord {
                        query_id: query_id.to_string(),
                        text: text.to_string(),
                    },
                );
                Ok(())
            }
        }
    })?;

    if repeated > 0 {
        warn!(repeated, source = %source_name(path), "repeated query rows ignored");
    }

    Ok(queries)
}

/// Load qrels rows, keeping only positively graded judgments
///
/// A query judged relevant for two different documents is rejected: the
/// evaluation assumes a single relevant document per query.
pub fn load_judgments(path: &Path) -> EvalResult<HashMap<String, RelevanceJudgment>> {
    let reader = open_lines(path)?;
    parse_judgments(reader, path)
}

fn parse_judgments(
    reader: impl BufRead,
    path: &Path,
) -> EvalResult<HashMap<String, RelevanceJudgment>> {
    let mut judgments: HashMap<String, RelevanceJudgment> = HashMap::new();
    let mut non_relevant = 0usize;

    for_each_line(reader, path, |line_num, line| {
        if line.trim().is_empty() {
            return Ok(());
        }

        // MS MARCO ships qrels space-separated, TREC tools write tabs
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 4 {
            return Err(format_error(
                path,
                line_num,
                format!("expected 4 columns (query_id iteration document_id grade), got {}", parts.len()),
            ));
        }

        let query_id = parts[0];
        let document_id = parts[2];
        let grade: i32 = parts[3].parse().map_err(|_| {
            format_error(path, line_num, format!("invalid relevance grade '{}'", parts[3]))
        })?;

        if grade <= 0 {
            non_relevant += 1;
            return Ok(());
        }

        match judgments.get(query_id) {
            Some(existing) if existing.relevant_document_id != document_id => Err(format_error(
                path,
                line_num,
                format!(
                    "query {} already judged relevant for {}, multi-document relevance is not supported (found {})",
                    query_id, existing.relevant_document_id, document_id
                ),
            )),
            Some(_) => Ok(()),
            None => {
                judgments.insert(
                    query_id.to_string(),
                    RelevanceJudgment {
                        query_id: query_id.to_string(),
                        relevant_document_id: document_id.to_string(),
                    },
                );
                Ok(())
            }
        }
    })?;

    if non_relevant > 0 {
        debug!(non_relevant, "skipped judgments with grade <= 0");
    }

    Ok(judgments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_gz(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let file = File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
        path
    }

    #[test]
    fn test_load_gzip_corpus() {
        let dir = TempDir::new().unwrap();
        let queries = write_gz(
            &dir,
            "queries.tsv.gz",
            "1\twhat is a cat\n2\thow do birds fly\n\n3\tcapital of\tfrance\n",
        );
        let qrels = write_gz(&dir, "qrels.tsv.gz", "1 0 D10 1\n2\t0\tD20\t1\n3 0 D30 1\n");

        let corpus = RelevanceCorpus::load(&queries, &qrels).unwrap();
        assert_eq!(corpus.queries.len(), 3);
        assert_eq!(corpus.queries["1"].text, "what is a cat");
        // Text keeps everything after the first tab
        assert_eq!(corpus.queries["3"].text, "capital of\tfrance");
        assert_eq!(corpus.judgments.len(), 3);
        assert_eq!(corpus.judgments["2"].relevant_document_id, "D20");
        assert_eq!(corpus.eligible_count(), 3);
    }

    #[test]
    fn test_load_plain_text_corpus() {
        let dir = TempDir::new().unwrap();
        let queries = dir.path().join("queries.tsv");
        std::fs::write(&queries, "7\tplain query\n").unwrap();

        let loaded = load_queries(&queries).unwrap();
        assert_eq!(loaded["7"].text, "plain query");
    }

    #[test]
    fn test_malformed_query_row_names_source() {
        let dir = TempDir::new().unwrap();
        let queries = write_gz(&dir, "bad-queries.tsv.gz", "1\tok\nno tab here\n");

        let err = load_queries(&queries).unwrap_err();
        match err {
            EvalError::CorpusFormat { source_name, line, .. } => {
                assert!(source_name.contains("bad-queries.tsv.gz"));
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_qrels_column() {
        let dir = TempDir::new().unwrap();
        let qrels = write_gz(&dir, "qrels.tsv.gz", "1 0 D10\n");

        let err = load_judgments(&qrels).unwrap_err();
        assert!(matches!(err, EvalError::CorpusFormat { line: 1, .. }));
        assert!(err.to_string().contains("qrels.tsv.gz"));
    }

    #[test]
    fn test_invalid_grade() {
        let dir = TempDir::new().unwrap();
        let qrels = write_gz(&dir, "qrels.tsv.gz", "1 0 D10 high\n");
        assert!(matches!(
            load_judgments(&qrels),
            Err(EvalError::CorpusFormat { .. })
        ));
    }

    #[test]
    fn test_zero_grade_rows_skipped() {
        let dir = TempDir::new().unwrap();
        let qrels = write_gz(&dir, "qrels.tsv.gz", "1 0 D10 0\n2 0 D20 1\n");
        let judgments = load_judgments(&qrels).unwrap();
        assert_eq!(judgments.len(), 1);
        assert!(judgments.contains_key("2"));
    }

    #[test]
    fn test_conflicting_judgments_rejected() {
        let dir = TempDir::new().unwrap();
        let qrels = write_gz(&dir, "qrels.tsv.gz", "1 0 D10 1\n1 0 D10 1\n1 0 D11 1\n");

        let err = load_judgments(&qrels).unwrap_err();
        assert!(matches!(err, EvalError::CorpusFormat { line: 3, .. }));
    }

    #[test]
    fn test_extra_qrels_column_rejected() {
        let dir = TempDir::new().unwrap();
        let qrels = write_gz(&dir, "qrels.tsv.gz", "1 0 D10 1\n2 0 D20 1 extra\n");

        let err = load_judgments(&qrels).unwrap_err();
        assert!(matches!(err, EvalError::CorpusFormat { line: 2, .. }));
    }

    #[test]
    fn test_invalid_utf8_is_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queries.tsv.gz");
        let file = File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(b"1\tok\n2\t\xff\xfe bad\n").unwrap();
        encoder.finish().unwrap();

        match load_queries(&path).unwrap_err() {
            EvalError::CorpusFormat { source_name, line, reason } => {
                assert!(source_name.contains("queries.tsv.gz"));
                assert_eq!(line, 2);
                assert!(reason.contains("UTF-8"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_gzip_content_is_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("q.tsv.gz");
        std::fs::write(&path, "1\tthis file was never compressed\n2\tsecond row\n").unwrap();

        match load_queries(&path).unwrap_err() {
            EvalError::CorpusFormat { source_name, line, .. } => {
                assert!(source_name.contains("q.tsv.gz"));
                assert_eq!(line, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_repeated_query_ids() {
        let dir = TempDir::new().unwrap();
        let same = write_gz(&dir, "same.tsv.gz", "1\tcats\n1\tcats\n2\tdogs\n");
        let loaded = load_queries(&same).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["1"].text, "cats");

        let conflicting = write_gz(&dir, "conflict.tsv.gz", "1\tcats\n2\tdogs\n1\tbirds\n");
        let err = load_queries(&conflicting).unwrap_err();
        assert!(matches!(err, EvalError::CorpusFormat { line: 3, .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_queries(Path::new("/nonexistent/queries.tsv.gz")).unwrap_err();
        assert!(matches!(err, EvalError::CorpusIo { .. }));
    }
}
