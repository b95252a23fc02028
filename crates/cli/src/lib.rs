//! # Repo Atlas CLI
//!
//! Orchestrates the Repo Atlas crates into two pipelines over one repository's
//! embedded code points:
//!
//! ```text
//! scroll ─► sample ─► preprocess ─► k-means ─┬─► representatives ─► cluster summaries ─► repo summary
//!                                            │        (cached by content hash)
//!                                            └─► chunk / file nodes ─► similarity atlas
//! ```
//!
//! Points come from a Qdrant-compatible index or a local JSON points file.
//! Summaries are generated through an OpenAI-compatible chat endpoint.

use anyhow::{bail, Context, Result};
use atlas_graph::AtlasInput;
use atlas_protocol::{output_schemas, serialize_json, AtlasGranularity};
use atlas_summarizer::GroundedSummarizer;
use atlas_vector_store::{JsonCollection, PointSource};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub mod cache;
pub mod config;
pub mod generator;
pub mod pipeline;
pub mod qdrant;

pub use cache::{
    content_hash, get_or_compute, CacheKey, CachedSummary, FileSummaryStore, MemorySummaryStore,
    SummaryStore,
};
pub use config::{GeneratorConfig, PipelineConfig};
pub use generator::ChatCompletionsGenerator;
pub use pipeline::{ClusteredCorpus, Pipeline};
pub use qdrant::QdrantClient;

const INDEX_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "repo-atlas")]
#[command(about = "Grounded repository summaries and similarity atlases from embedded code", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Pipeline configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Read points from a JSON points file instead of the vector index
    #[arg(long, global = true)]
    points: Option<PathBuf>,

    /// Vector index base URL (overrides ATLAS_QDRANT_URL)
    #[arg(long, global = true)]
    qdrant_url: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a repository into grounded cluster and repo summaries
    Summarize(SummarizeArgs),

    /// Build a semantic similarity graph over chunks or files
    Atlas(AtlasArgs),

    /// Print JSON Schemas of the output records
    Schema,
}

#[derive(Args)]
struct ClusteringArgs {
    /// Number of clusters
    #[arg(short = 'k', long)]
    k: Option<usize>,

    /// Sample budget before clustering
    #[arg(long)]
    n_max: Option<usize>,

    /// Seed for sampling and k-means
    #[arg(long)]
    seed: Option<u64>,

    /// Maximum points read from the collection
    #[arg(long)]
    scroll_limit: Option<usize>,
}

#[derive(Args)]
struct SummarizeArgs {
    /// Repository identifier (collection `repo_{repo_id}` by default)
    repo_id: String,

    #[command(flatten)]
    clustering: ClusteringArgs,

    /// Maximum concurrent generation calls
    #[arg(long)]
    concurrency: Option<usize>,

    /// Do not write cluster ids back into point payloads
    #[arg(long)]
    no_persist: bool,

    /// Summary cache directory
    #[arg(long, default_value = ".repo-atlas/cache")]
    cache_dir: PathBuf,

    /// Keep the summary cache in memory for this process only
    #[arg(long)]
    no_cache: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GranularityArg {
    Chunk,
    File,
}

impl From<GranularityArg> for AtlasGranularity {
    fn from(value: GranularityArg) -> Self {
        match value {
            GranularityArg::Chunk => Self::Chunk,
            GranularityArg::File => Self::File,
        }
    }
}

#[derive(Args)]
struct AtlasArgs {
    /// Repository identifier
    repo_id: String,

    #[command(flatten)]
    clustering: ClusteringArgs,

    /// Node granularity
    #[arg(long, value_enum, default_value = "chunk")]
    granularity: GranularityArg,

    /// Build from a JSON node list (chunk or file records) instead of clustering points
    #[arg(long)]
    nodes: Option<PathBuf>,

    /// Minimum cosine similarity for an edge
    #[arg(long)]
    threshold: Option<f32>,

    /// Nearest neighbours considered per node
    #[arg(long)]
    k_sim: Option<usize>,
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    config.apply_env();
    if let Some(url) = &cli.qdrant_url {
        config.qdrant_url = url.clone();
    }

    let output = match cli.command {
        Commands::Schema => output_schemas()?,
        Commands::Summarize(args) => {
            apply_clustering(&mut config, &args.clustering);
            if let Some(concurrency) = args.concurrency {
                config.concurrency = concurrency;
            }
            if args.no_persist {
                config.persist_cluster_ids = false;
            }
            config.validate()?;
            run_summarize(config, cli.points.as_deref(), args).await?
        }
        Commands::Atlas(args) => {
            apply_clustering(&mut config, &args.clustering);
            if let Some(threshold) = args.threshold {
                config.similarity_threshold = threshold;
            }
            if let Some(k_sim) = args.k_sim {
                config.k_sim = k_sim;
            }
            config.validate()?;
            run_atlas(config, cli.points.as_deref(), args).await?
        }
    };

    println!("{}", serialize_json(&output, cli.pretty)?);
    Ok(())
}

fn apply_clustering(config: &mut PipelineConfig, args: &ClusteringArgs) {
    if let Some(k) = args.k {
        config.k = k;
    }
    if let Some(n_max) = args.n_max {
        config.n_max = n_max;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(limit) = args.scroll_limit {
        config.scroll_limit = limit;
    }
}

fn point_source(config: &PipelineConfig, points: Option<&Path>) -> Result<Arc<dyn PointSource>> {
    match points {
        Some(path) => {
            log::debug!("Reading points from {}", path.display());
            Ok(Arc::new(JsonCollection::single_file(path)))
        }
        None => {
            let client =
                QdrantClient::new(&config.qdrant_url, config.qdrant_api_key.as_deref(), INDEX_TIMEOUT)?;
            Ok(Arc::new(client))
        }
    }
}

fn build_summarizer(config: &PipelineConfig) -> Result<GroundedSummarizer> {
    let Some(url) = config.generator.url.as_deref() else {
        bail!(
            "No generation endpoint configured; set {} or [generator].url",
            crate::config::ENV_GENERATOR_URL
        );
    };
    let generator = ChatCompletionsGenerator::new(
        url,
        &config.generator.model,
        config.generator.api_key.as_deref(),
    )?;
    Ok(GroundedSummarizer::new(
        Arc::new(generator),
        config.summarizer_options(),
    ))
}

async fn run_summarize(
    config: PipelineConfig,
    points: Option<&Path>,
    args: SummarizeArgs,
) -> Result<serde_json::Value> {
    let summarizer = build_summarizer(&config)?;
    let store: Box<dyn SummaryStore> = if args.no_cache {
        Box::new(MemorySummaryStore::new())
    } else {
        Box::new(FileSummaryStore::new(&args.cache_dir))
    };
    let pipeline = Pipeline::new(config.clone(), point_source(&config, points)?);

    let result = pipeline
        .summarize(&args.repo_id, &summarizer, store.as_ref())
        .await?;
    if let Some(error) = &result.summary.error {
        log::warn!("Summary for '{}' is incomplete: {error}", args.repo_id);
    }
    serde_json::to_value(result.summary.as_ref()).context("Failed to encode summary")
}

async fn run_atlas(
    config: PipelineConfig,
    points: Option<&Path>,
    args: AtlasArgs,
) -> Result<serde_json::Value> {
    let pipeline = Pipeline::new(config.clone(), point_source(&config, points)?);
    let pack = match &args.nodes {
        Some(path) => {
            let raw = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read nodes {}", path.display()))?;
            let value: serde_json::Value = serde_json::from_slice(&raw)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?;
            pipeline.build_atlas(&args.repo_id, AtlasInput::from_json(value)?)?
        }
        None => {
            pipeline
                .atlas(&args.repo_id, args.granularity.into())
                .await?
        }
    };
    log::info!(
        "Atlas for '{}': {} nodes, {} edges, {} components",
        pack.repo_id,
        pack.stats.nodes,
        pack.stats.edges,
        pack.stats.components
    );
    serde_json::to_value(&pack).context("Failed to encode atlas")
}
