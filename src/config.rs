//! Configuration for ranking evaluation
//!
//! Defines the `eval.toml` schema, the ranking configuration passed into every
//! search call, and the grammar/rank-profile enums.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EvalError, EvalResult};

/// How the tokens of a multi-term query must match
///
/// - `Conjunctive`: every term must match (AND)
/// - `Disjunctive`: any term may match (OR)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrammarMode {
    #[default]
    Conjunctive,
    Disjunctive,
}

impl GrammarMode {
    /// Short label used in run names ("AND" / "OR")
    pub fn label(&self) -> &'static str {
        match self {
            Self::Conjunctive => "AND",
            Self::Disjunctive => "OR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "and" | "all" | "conjunctive" => Some(Self::Conjunctive),
            "or" | "any" | "disjunctive" => Some(Self::Disjunctive),
            _ => None,
        }
    }

    /// YQL selecting all documents matching the parameterized `userQuery`
    ///
    /// The query text itself is never spliced into the YQL.
    pub fn yql(&self) -> &'static str {
        match self {
            Self::Conjunctive => "select * from sources * where (userInput(@userQuery));",
            Self::Disjunctive => {
                r#"select * from sources * where ([{"grammar": "any"}]userInput(@userQuery));"#
            }
        }
    }
}

/// Named scoring function on the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RankProfile {
    /// `bm25`
    Bm25,
    /// `default` (the backend's native rank)
    NativeRank,
    /// Any other profile deployed on the backend
    Custom(String),
}

impl RankProfile {
    /// Profile name sent in the `ranking` request field
    pub fn profile_name(&self) -> &str {
        match self {
            Self::Bm25 => "bm25",
            Self::NativeRank => "default",
            Self::Custom(name) => name,
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Bm25 => "BM25",
            Self::NativeRank => "Native Rank",
            Self::Custom(name) => name,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "bm25" => Self::Bm25,
            "default" | "native" | "native-rank" | "native rank" | "nativerank" => Self::NativeRank,
            _ => Self::Custom(s.trim().to_string()),
        }
    }
}

impl From<String> for RankProfile {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<RankProfile> for String {
    fn from(p: RankProfile) -> Self {
        p.profile_name().to_string()
    }
}

impl fmt::Display for RankProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile_name())
    }
}

/// One ranking configuration; identifies one evaluation run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankingConfiguration {
    /// Rank profile name
    pub rank_profile: RankProfile,

    /// Grammar applied to the tokenized query
    #[serde(default)]
    pub grammar: GrammarMode,

    /// Number of results requested (and evaluated) per query
    #[serde(default = "default_hits")]
    pub hits: usize,

    /// Pagination offset
    #[serde(default)]
    pub offset: usize,

    /// Optional document summary class (e.g. "minimal")
    #[serde(default = "default_summary", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

fn default_hits() -> usize { 10 }
fn default_summary() -> Option<String> { Some("minimal".to_string()) }

impl RankingConfiguration {
    pub fn new(rank_profile: RankProfile, grammar: GrammarMode, hits: usize) -> Self {
        Self {
            rank_profile,
            grammar,
            hits,
            offset: 0,
            summary: default_summary(),
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.summary = summary;
        self
    }

    /// Run label, e.g. "bm25, AND"
    pub fn label(&self) -> String {
        format!("{}, {}", self.rank_profile.profile_name(), self.grammar.label())
    }

    pub fn validate(&self) -> EvalResult<()> {
        if self.hits == 0 {
            return Err(EvalError::InvalidConfiguration(format!(
                "{}: hits must be at least 1",
                self.label()
            )));
        }
        if self.rank_profile.profile_name().is_empty() {
            return Err(EvalError::InvalidConfiguration(
                "rank profile name is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Search backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Host name; "http://localhost" style values also set the scheme
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Client-side per-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,

    /// Timeout declared to the backend in the request body (seconds)
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: f64,

    /// Maximum concurrent requests per evaluation run
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retries for transient failures (0 = fail on first error)
    #[serde(default)]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_scheme() -> String { "http".to_string() }
fn default_host() -> String { "localhost".to_string() }
fn default_port() -> u16 { 8080 }
fn default_timeout_secs() -> f64 { 5.0 }
fn default_backend_timeout_secs() -> f64 { 1.0 }
fn default_concurrency() -> usize { 4 }
fn default_retry_base_delay_ms() -> u64 { 250 }

fn timeout_duration(secs: f64) -> Option<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            backend_timeout_secs: default_backend_timeout_secs(),
            concurrency: default_concurrency(),
            max_retries: 0,
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl BackendConfig {
    /// Replace the host; a value with a scheme prefix also replaces the scheme
    pub fn set_host(&mut self, host: &str) {
        match host.split_once("://") {
            Some((scheme, rest)) => {
                self.scheme = scheme.to_string();
                self.host = rest.trim_end_matches('/').to_string();
            }
            None => self.host = host.trim_end_matches('/').to_string(),
        }
    }

    /// `scheme://host:port/search/`
    pub fn endpoint(&self) -> String {
        let (scheme, host) = match self.host.split_once("://") {
            Some((scheme, rest)) => (scheme, rest.trim_end_matches('/')),
            None => (self.scheme.as_str(), self.host.trim_end_matches('/')),
        };
        format!("{}://{}:{}/search/", scheme, host, self.port)
    }

    /// Client-side per-request timeout
    ///
    /// Falls back to the default when `timeout_secs` has not been validated.
    pub fn request_timeout(&self) -> Duration {
        timeout_duration(self.timeout_secs)
            .unwrap_or_else(|| Duration::from_secs_f64(default_timeout_secs()))
    }

    /// Reject timeouts that are not finite and positive, and an empty host
    pub fn validate(&self) -> EvalResult<()> {
        for (name, value) in [
            ("timeout_secs", self.timeout_secs),
            ("backend_timeout_secs", self.backend_timeout_secs),
        ] {
            if timeout_duration(value).is_none() {
                return Err(EvalError::InvalidConfiguration(format!(
                    "backend.{} must be a finite number of seconds > 0, got {}",
                    name, value
                )));
            }
        }
        if self.host.trim().is_empty() {
            return Err(EvalError::InvalidConfiguration(
                "backend.host is empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Corpus file locations and sampling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSettings {
    #[serde(default = "default_queries_path")]
    pub queries: PathBuf,

    #[serde(default = "default_qrels_path")]
    pub qrels: PathBuf,

    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Seed for a reproducible sample; unseeded draws differ per invocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_queries_path() -> PathBuf { PathBuf::from("msmarco/sample/msmarco-doctrain-queries.tsv.gz") }
fn default_qrels_path() -> PathBuf { PathBuf::from("msmarco/sample/msmarco-doctrain-qrels.tsv.gz") }
fn default_sample_size() -> usize { 100 }

impl Default for CorpusSettings {
    fn default() -> Self {
        Self {
            queries: default_queries_path(),
            qrels: default_qrels_path(),
            sample_size: default_sample_size(),
            seed: None,
        }
    }
}

/// Evaluation config loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub corpus: CorpusSettings,

    /// Ranking configurations evaluated by `evaluate`
    #[serde(default)]
    pub runs: Vec<RankingConfiguration>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            corpus: CorpusSettings::default(),
            runs: vec![
                RankingConfiguration::new(RankProfile::Bm25, GrammarMode::Conjunctive, 10),
                RankingConfiguration::new(RankProfile::NativeRank, GrammarMode::Conjunctive, 10),
            ],
        }
    }
}

impl EvalConfig {
    /// Load config from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read eval config: {:?}", path))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse eval config: {:?}", path))?;
        config
            .validate()
            .with_context(|| format!("Invalid eval config: {:?}", path))?;
        Ok(config)
    }

    /// Check backend settings and every configured run
    pub fn validate(&self) -> EvalResult<()> {
        self.backend.validate()?;
        for run in &self.runs {
            run.validate()?;
        }
        Ok(())
    }

    /// Load from `path` if it exists, otherwise built-in defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grammar_from_str() {
        assert_eq!(GrammarMode::from_str("AND"), Some(GrammarMode::Conjunctive));
        assert_eq!(GrammarMode::from_str("any"), Some(GrammarMode::Disjunctive));
        assert_eq!(GrammarMode::from_str("Disjunctive"), Some(GrammarMode::Disjunctive));
        assert_eq!(GrammarMode::from_str("xor"), None);
    }

    #[test]
    fn test_grammar_yql_uses_parameter() {
        assert!(GrammarMode::Conjunctive.yql().contains("userInput(@userQuery)"));
        assert!(!GrammarMode::Conjunctive.yql().contains("grammar"));
        assert!(GrammarMode::Disjunctive.yql().contains(r#"[{"grammar": "any"}]"#));
    }

    #[test]
    fn test_rank_profile_mapping() {
        assert_eq!(RankProfile::parse("BM25").profile_name(), "bm25");
        assert_eq!(RankProfile::parse("Native Rank"), RankProfile::NativeRank);
        assert_eq!(RankProfile::NativeRank.profile_name(), "default");
        assert_eq!(
            RankProfile::parse("closeness"),
            RankProfile::Custom("closeness".to_string())
        );
    }

    #[test]
    fn test_configuration_label_and_validate() {
        let config = RankingConfiguration::new(RankProfile::Bm25, GrammarMode::Disjunctive, 10);
        assert_eq!(config.label(), "bm25, OR");
        assert!(config.validate().is_ok());

        let zero = RankingConfiguration::new(RankProfile::Bm25, GrammarMode::Conjunctive, 0);
        assert!(matches!(zero.validate(), Err(EvalError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_endpoint() {
        let mut backend = BackendConfig::default();
        assert_eq!(backend.endpoint(), "http://localhost:8080/search/");

        backend.set_host("https://search.example.com/");
        backend.port = 4443;
        assert_eq!(backend.scheme, "https");
        assert_eq!(backend.endpoint(), "https://search.example.com:4443/search/");
    }

    #[test]
    fn test_eval_config_toml() {
        let toml_str = r#"
[backend]
host = "vespa.internal"
port = 19071
concurrency = 8

[corpus]
sample_size = 50
seed = 7

[[runs]]
rank_profile = "bm25"
grammar = "disjunctive"
hits = 20

[[runs]]
rank_profile = "default"
"#;
        let config: EvalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend.port, 19071);
        assert_eq!(config.backend.concurrency, 8);
        assert_eq!(config.backend.timeout_secs, 5.0);
        assert_eq!(config.corpus.sample_size, 50);
        assert_eq!(config.corpus.seed, Some(7));
        assert_eq!(config.runs.len(), 2);
        assert_eq!(config.runs[0].grammar, GrammarMode::Disjunctive);
        assert_eq!(config.runs[0].hits, 20);
        assert_eq!(config.runs[1].rank_profile, RankProfile::NativeRank);
        assert_eq!(config.runs[1].hits, 10);
        assert_eq!(config.runs[1].summary.as_deref(), Some("minimal"));
    }

    #[test]
    fn test_backend_timeouts_rejected() {
        for bad in ["inf", "-inf", "nan", "-3.0", "0.0", "1e30"] {
            let toml_str = format!("[backend]\ntimeout_secs = {}", bad);
            let config: EvalConfig = toml::from_str(&toml_str).unwrap();
            assert!(
                matches!(config.validate(), Err(EvalError::InvalidConfiguration(_))),
                "timeout_secs = {} accepted",
                bad
            );
            // Never panics, even before validation
            assert_eq!(config.backend.request_timeout(), Duration::from_secs(5));
        }

        let mut backend = BackendConfig::default();
        backend.backend_timeout_secs = f64::NAN;
        assert!(backend.validate().is_err());

        backend.backend_timeout_secs = 0.5;
        backend.timeout_secs = 2.5;
        assert!(backend.validate().is_ok());
        assert_eq!(backend.request_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn test_load_rejects_infinite_timeout() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("eval.toml");
        std::fs::write(&path, "[backend]\ntimeout_secs = inf\n").unwrap();

        let err = EvalConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("timeout_secs"));
    }

    #[test]
    fn test_eval_config_default() {
        let config = EvalConfig::default();
        assert_eq!(config.corpus.sample_size, 100);
        assert_eq!(config.runs.len(), 2);
        assert!(config.corpus.seed.is_none());
        assert!(config.validate().is_ok());
    }
}
