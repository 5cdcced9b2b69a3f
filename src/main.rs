//! Ranking Evaluation CLI
//!
//! Measures retrieval quality (MRR, rank-position frequency) and throughput
//! of a search backend on a sample of judged queries.
//!
//! ## Quick Start
//!
//! ```bash
//! # Compare BM25 against the native rank profile on 100 sampled queries
//! ./ranking-eval compare \
//!     --profile-a bm25 --profile-b native-rank \
//!     --sample-size 100
//!
//! # Same profile, conjunctive vs disjunctive grammar, reproducible sample
//! ./ranking-eval compare \
//!     --profile-a bm25 --grammar-a and \
//!     --profile-b bm25 --grammar-b or \
//!     --seed 42
//!
//! # Every [[runs]] entry from a config file on one shared sample
//! ./ranking-eval evaluate --config eval.toml
//!
//! # A single query, raw JSON response
//! ./ranking-eval query "what is a cat" --profile bm25 --raw
//! ```
//!
//! ## Configuration
//!
//! Backend, corpus and runs are configured in `eval.toml`. Command-line flags
//! override the file; without a file the built-in defaults are used.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use ranking_eval::benchmark::{
    CancelHandle, ComparisonReport, EngineOptions, EvaluationEngine, EvaluationRun,
    EvaluationSession,
};
use ranking_eval::config::{EvalConfig, GrammarMode, RankProfile, RankingConfiguration};
use ranking_eval::corpus::RelevanceCorpus;
use ranking_eval::error::EvalError;
use ranking_eval::search::{
    parse_hits, CachedBackend, HttpSearchClient, ResponseCache, SearchBackend,
};

/// Query grammar for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum GrammarArg {
    /// Every term must match
    #[default]
    And,
    /// Any term may match
    Or,
}

impl From<GrammarArg> for GrammarMode {
    fn from(arg: GrammarArg) -> Self {
        match arg {
            GrammarArg::And => GrammarMode::Conjunctive,
            GrammarArg::Or => GrammarMode::Disjunctive,
        }
    }
}

#[derive(Parser)]
#[command(name = "ranking-eval")]
#[command(about = "Ranking quality and throughput evaluation for a search backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every command that talks to the backend
#[derive(Args, Debug, Clone)]
struct BackendArgs {
    /// Path to eval config file (TOML)
    #[arg(short, long, default_value = "eval.toml")]
    config: PathBuf,

    /// Backend host, optionally with scheme (e.g. "http://localhost")
    #[arg(long)]
    host: Option<String>,

    /// Backend port
    #[arg(long)]
    port: Option<u16>,

    /// Maximum concurrent requests
    #[arg(long)]
    concurrency: Option<usize>,

    /// Client-side request timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Retries for transient failures
    #[arg(long)]
    retries: Option<u32>,
}

impl BackendArgs {
    fn load(&self) -> Result<EvalConfig> {
        let mut config = if self.config.exists() {
            println!("Loading config from {:?}...", self.config);
            EvalConfig::load(&self.config)?
        } else {
            EvalConfig::default()
        };

        if let Some(host) = &self.host {
            config.backend.set_host(host);
        }
        if let Some(port) = self.port {
            config.backend.port = port;
        }
        if let Some(concurrency) = self.concurrency {
            config.backend.concurrency = concurrency.max(1);
        }
        if let Some(timeout) = self.timeout {
            config.backend.timeout_secs = timeout;
        }
        if let Some(retries) = self.retries {
            config.backend.max_retries = retries;
        }
        config
            .backend
            .validate()
            .context("Invalid backend settings")?;
        Ok(config)
    }
}

/// Corpus sampling overrides
#[derive(Args, Debug, Clone)]
struct SampleArgs {
    /// Queries file (id<TAB>text, optionally gzipped)
    #[arg(long)]
    queries: Option<PathBuf>,

    /// Relevance judgments file (qid iter docid grade, optionally gzipped)
    #[arg(long)]
    qrels: Option<PathBuf>,

    /// Number of queries to sample
    #[arg(short = 'n', long)]
    sample_size: Option<usize>,

    /// Seed for a reproducible sample
    #[arg(long)]
    seed: Option<u64>,
}

impl SampleArgs {
    fn apply(&self, config: &mut EvalConfig) {
        if let Some(queries) = &self.queries {
            config.corpus.queries = queries.clone();
        }
        if let Some(qrels) = &self.qrels {
            config.corpus.qrels = qrels.clone();
        }
        if let Some(n) = self.sample_size {
            config.corpus.sample_size = n;
        }
        if self.seed.is_some() {
            config.corpus.seed = self.seed;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two ranking configurations on one shared query sample
    ///
    /// Results are saved to a JSON file.
    Compare {
        #[command(flatten)]
        backend: BackendArgs,

        #[command(flatten)]
        sample: SampleArgs,

        /// Rank profile of configuration A (bm25, native-rank, or any deployed profile)
        #[arg(long, default_value = "bm25")]
        profile_a: String,

        /// Grammar of configuration A
        #[arg(long, value_enum, default_value = "and")]
        grammar_a: GrammarArg,

        /// Rank profile of configuration B
        #[arg(long, default_value = "native-rank")]
        profile_b: String,

        /// Grammar of configuration B
        #[arg(long, value_enum, default_value = "and")]
        grammar_b: GrammarArg,

        /// Number of results requested per query
        #[arg(long, default_value = "10")]
        hits: usize,

        /// Serve repeated identical requests from an in-memory cache
        #[arg(long)]
        cache: bool,

        /// Output file for results (JSON)
        #[arg(short, long, default_value = "results/comparison.json")]
        output: PathBuf,
    },

    /// Evaluate every configured run on one shared query sample
    Evaluate {
        #[command(flatten)]
        backend: BackendArgs,

        #[command(flatten)]
        sample: SampleArgs,

        /// Output file for results (JSON)
        #[arg(short, long, default_value = "results/evaluation.json")]
        output: PathBuf,
    },

    /// Send a single query and show the ranked hits
    Query {
        /// Query text
        text: String,

        #[command(flatten)]
        backend: BackendArgs,

        /// Rank profile
        #[arg(long, default_value = "bm25")]
        profile: String,

        /// Query grammar
        #[arg(long, value_enum, default_value = "and")]
        grammar: GrammarArg,

        /// Number of results
        #[arg(long, default_value = "10")]
        hits: usize,

        /// Print the raw JSON response instead of parsed hits
        #[arg(long)]
        raw: bool,
    },

    /// Load the corpus files and report their sizes
    ValidateCorpus {
        /// Path to eval config file (TOML)
        #[arg(short, long, default_value = "eval.toml")]
        config: PathBuf,

        #[command(flatten)]
        sample: SampleArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compare {
            backend,
            sample,
            profile_a,
            grammar_a,
            profile_b,
            grammar_b,
            hits,
            cache,
            output,
        } => {
            let a = RankingConfiguration::new(RankProfile::parse(&profile_a), grammar_a.into(), hits);
            let b = RankingConfiguration::new(RankProfile::parse(&profile_b), grammar_b.into(), hits);
            run_compare(&backend, &sample, a, b, cache, &output).await?;
        }

        Commands::Evaluate {
            backend,
            sample,
            output,
        } => {
            run_evaluate(&backend, &sample, &output).await?;
        }

        Commands::Query {
            text,
            backend,
            profile,
            grammar,
            hits,
            raw,
        } => {
            let configuration =
                RankingConfiguration::new(RankProfile::parse(&profile), grammar.into(), hits);
            run_query(&backend, &text, &configuration, raw).await?;
        }

        Commands::ValidateCorpus { config, sample } => {
            validate_corpus(&config, &sample)?;
        }
    }

    Ok(())
}

fn build_backend(
    config: &EvalConfig,
    cache: bool,
) -> Result<(Arc<dyn SearchBackend>, Option<Arc<ResponseCache>>)> {
    let client = HttpSearchClient::new(&config.backend)
        .context("Failed to create search client")?;
    println!("  Endpoint: {}", client.endpoint());

    if cache {
        println!("  Response cache enabled");
        let cache = Arc::new(ResponseCache::new());
        let backend: Arc<dyn SearchBackend> = Arc::new(CachedBackend::new(client, Arc::clone(&cache)));
        Ok((backend, Some(cache)))
    } else {
        Ok((Arc::new(client), None))
    }
}

fn load_corpus(config: &EvalConfig) -> Result<RelevanceCorpus> {
    println!("\nLoading corpus...");
    println!("  Queries: {:?}", config.corpus.queries);
    println!("  Qrels:   {:?}", config.corpus.qrels);
    let corpus = RelevanceCorpus::load(&config.corpus.queries, &config.corpus.qrels)?;
    println!(
        "  {} queries, {} judgments ({} eligible for sampling)",
        corpus.queries.len(),
        corpus.judgments.len(),
        corpus.eligible_count()
    );
    Ok(corpus)
}

fn sample_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Cancel in-progress runs on Ctrl-C
fn cancel_on_ctrl_c(handle: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cancelling evaluation...");
            handle.cancel();
        }
    });
}

async fn run_session(
    config: &EvalConfig,
    configurations: &[RankingConfiguration],
    cache: bool,
) -> Result<EvaluationSession> {
    let (backend, cache) = build_backend(config, cache)?;
    let corpus = load_corpus(config)?;

    let engine = EvaluationEngine::new(backend, EngineOptions::from_backend(&config.backend));
    cancel_on_ctrl_c(engine.cancel_handle());

    let mut rng = sample_rng(config.corpus.seed);
    println!(
        "\nEvaluating {} configuration(s) on {} sampled queries (concurrency {})...",
        configurations.len(),
        config.corpus.sample_size,
        engine.options().concurrency
    );

    match engine
        .run_session(&corpus, config.corpus.sample_size, &mut rng, configurations)
        .await
    {
        Ok(session) => {
            if let Some(cache) = cache {
                println!(
                    "  Response cache: {} hits, {} misses, {} entries",
                    cache.hits(),
                    cache.misses(),
                    cache.len()
                );
            }
            Ok(session)
        }
        Err(EvalError::Cancelled) => {
            anyhow::bail!("Evaluation cancelled; partial results were discarded")
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(serde::Serialize)]
struct SampleOutput {
    size: usize,
    fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

impl SampleOutput {
    fn new(session: &EvaluationSession, seed: Option<u64>) -> Self {
        Self {
            size: session.sample.len(),
            fingerprint: session.sample.fingerprint(),
            seed,
        }
    }
}

fn write_json<T: serde::Serialize>(output: &Path, value: &T) -> Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(output, &json)
        .with_context(|| format!("Failed to write results: {:?}", output))?;
    println!("\nResults saved to {:?}", output);
    Ok(())
}

fn print_runs(runs: &[EvaluationRun]) {
    println!("\n{:30} {}", "Configuration", "Summary");
    println!("{}", "─".repeat(100));
    for run in runs {
        println!("{:30} {}", run.metrics.configuration_label, run.metrics.format_summary());
    }
}

/// Compare two configurations on one sample
async fn run_compare(
    backend_args: &BackendArgs,
    sample_args: &SampleArgs,
    a: RankingConfiguration,
    b: RankingConfiguration,
    cache: bool,
    output: &Path,
) -> Result<()> {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              RANKING COMPARISON                              ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let mut config = backend_args.load()?;
    sample_args.apply(&mut config);

    println!("  A: {} ({})", a.label(), a.rank_profile.display_name());
    println!("  B: {} ({})", b.label(), b.rank_profile.display_name());

    let session = run_session(&config, &[a, b], cache).await?;
    let (run_a, run_b) = match session.runs.as_slice() {
        [run_a, run_b] => (run_a, run_b),
        _ => anyhow::bail!("Expected two runs, got {}", session.runs.len()),
    };

    let report = ComparisonReport::compare(&run_a.metrics, &run_b.metrics)?;

    println!("\n┌─ RESULTS ({} queries, hits={}) ─────────────────────────────────┐", report.rows[0].query_count, report.hits);
    print!("{}", report.format_table());
    println!("\n  MRR delta (B - A): {:+.4}", report.mrr_delta());
    info!(fingerprint = %report.sample_fingerprint, "comparison complete");

    #[derive(serde::Serialize)]
    struct CompareOutput<'a> {
        timestamp: String,
        endpoint: String,
        sample: SampleOutput,
        report: &'a ComparisonReport,
        runs: &'a [EvaluationRun],
    }

    let output_data = CompareOutput {
        timestamp: chrono::Utc::now().to_rfc3339(),
        endpoint: config.backend.endpoint(),
        sample: SampleOutput::new(&session, config.corpus.seed),
        report: &report,
        runs: &session.runs,
    };
    write_json(output, &output_data)
}

/// Evaluate every configured run
async fn run_evaluate(
    backend_args: &BackendArgs,
    sample_args: &SampleArgs,
    output: &Path,
) -> Result<()> {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              RANKING EVALUATION                              ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let mut config = backend_args.load()?;
    sample_args.apply(&mut config);

    if config.runs.is_empty() {
        anyhow::bail!("No runs configured. Add [[runs]] entries to {:?}", backend_args.config);
    }
    for run in &config.runs {
        println!("  {}", run.label());
    }

    let session = run_session(&config, &config.runs, false).await?;
    print_runs(&session.runs);

    #[derive(serde::Serialize)]
    struct EvaluateOutput<'a> {
        timestamp: String,
        endpoint: String,
        sample: SampleOutput,
        runs: &'a [EvaluationRun],
    }

    let output_data = EvaluateOutput {
        timestamp: chrono::Utc::now().to_rfc3339(),
        endpoint: config.backend.endpoint(),
        sample: SampleOutput::new(&session, config.corpus.seed),
        runs: &session.runs,
    };
    write_json(output, &output_data)
}

/// Send one query and print the response
async fn run_query(
    backend_args: &BackendArgs,
    text: &str,
    configuration: &RankingConfiguration,
    raw: bool,
) -> Result<()> {
    configuration.validate()?;
    let config = backend_args.load()?;
    let client = HttpSearchClient::new(&config.backend)
        .context("Failed to create search client")?;

    let response = client
        .search(text, configuration, config.backend.request_timeout())
        .await
        .with_context(|| format!("Query failed against {}", client.endpoint()))?;

    if raw {
        println!("{}", serde_json::to_string_pretty(&response.json)?);
        return Ok(());
    }

    let hits = parse_hits(&response);
    println!(
        "{} hit(s) for {:?} [{}] in {:.1}ms",
        hits.len(),
        text,
        configuration.label(),
        response.duration.as_secs_f64() * 1000.0
    );
    println!("─────────────────────────────────────────────────────────────────");
    for (i, hit) in hits.iter().enumerate() {
        println!("{:>3}. {:20} {:>10.4}  {}", i + 1, hit.id, hit.relevance, hit.title.as_deref().unwrap_or(""));
        if let Some(url) = &hit.url {
            println!("     {}", url);
        }
        if let Some(body) = &hit.body {
            let snippet: String = body.chars().take(160).collect();
            println!("     {}", snippet);
        }
    }

    Ok(())
}

/// Load both corpus files and report their sizes
fn validate_corpus(config_path: &Path, sample_args: &SampleArgs) -> Result<()> {
    let mut config = EvalConfig::load_or_default(config_path)?;
    sample_args.apply(&mut config);

    let corpus = load_corpus(&config)?;
    let sample_size = config.corpus.sample_size;
    if corpus.eligible_count() < sample_size {
        println!(
            "\n  ⚠ Only {} judged queries available; a sample of {} would fail",
            corpus.eligible_count(),
            sample_size
        );
    } else {
        println!("\n  ✓ Corpus supports a sample of {} queries", sample_size);
    }

    Ok(())
}
