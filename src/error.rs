//! Error taxonomy for corpus loading, backend calls and evaluation runs.

use thiserror::Error;

/// Failures talking to the search backend for a single request.
///
/// The client never sees query ids; the engine wraps these into
/// [`EvalError::BackendUnavailable`] together with the failing query.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Connection refused, DNS failure, broken pipe, ...
    #[error("transport error: {0}")]
    Transport(String),

    /// No response within the client-side timeout.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Non-2xx HTTP status.
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Body was not a JSON object.
    #[error("malformed backend response: {0}")]
    Malformed(String),

    /// 2xx response carrying a non-empty `root.errors` list.
    #[error("backend reported errors: {0}")]
    Backend(String),

    /// Host/port/scheme do not form a usable URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl SearchError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Malformed(_) | Self::Backend(_) | Self::InvalidEndpoint(_) => false,
        }
    }
}

/// Errors surfaced by the evaluation pipeline.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A corpus file has a malformed row or violates the single-answer model.
    #[error("corpus format error in {source_name} (line {line}): {reason}")]
    CorpusFormat {
        source_name: String,
        line: usize,
        reason: String,
    },

    /// A corpus file could not be opened or read.
    #[error("failed to read corpus file {source_name}: {source}")]
    CorpusIo {
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    /// Requested sample is larger than the eligible judgment set.
    #[error("requested a sample of {requested} queries but only {available} judged queries are available")]
    InsufficientCorpus { requested: usize, available: usize },

    /// A backend call failed for a query; the whole run is aborted.
    #[error("backend unavailable for query {query_id}: {source}")]
    BackendUnavailable {
        query_id: String,
        #[source]
        source: SearchError,
    },

    /// Aggregation over an empty sample.
    #[error("cannot aggregate metrics over zero queries")]
    ZeroSample,

    #[error("invalid ranking configuration: {0}")]
    InvalidConfiguration(String),

    /// Two runs cannot be paired position by position.
    #[error("runs cannot be compared: {0}")]
    MisalignedComparison(String),

    /// The run was aborted; partial records were discarded.
    #[error("evaluation cancelled")]
    Cancelled,
}

pub type EvalResult<T> = Result<T, EvalError>;
