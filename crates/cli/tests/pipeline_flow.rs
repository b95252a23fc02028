use anyhow::Result;
use async_trait::async_trait;
use atlas_cli::{content_hash, MemorySummaryStore, Pipeline, PipelineConfig};
use atlas_protocol::AtlasGranularity;
use atlas_summarizer::{GenerationRequest, GroundedSummarizer, SummarizerError, TextGenerator};
use atlas_vector_store::{EmbeddedPoint, MemoryCollection, PointPayload};
use fastrand::Rng;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Grounded replies built from the prompt: clusters cite their first key file.
#[derive(Default)]
struct PromptEchoGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl TextGenerator for PromptEchoGenerator {
    async fn generate(&self, request: &GenerationRequest) -> atlas_summarizer::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.prompt.contains("Metrics: ") {
            return Ok(r#"{"title": "Demo", "overview": "API, storage and UI layers.",
                "sections": [{"title": "Layers", "summary": "Three groups."}]}"#
                .to_string());
        }
        let key_file = request
            .prompt
            .lines()
            .find_map(|line| line.strip_prefix("Key files: "))
            .and_then(|files| files.split(", ").next())
            .unwrap_or_default()
            .to_string();
        Ok(format!(
            r#"{{"title": "Module", "summary": "Code in {key_file}.", "key_files": ["{key_file}"]}}"#
        ))
    }
}

struct DownGenerator;

#[async_trait]
impl TextGenerator for DownGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> atlas_summarizer::Result<String> {
        Err(SummarizerError::Generation("connection refused".into()))
    }
}

/// Three tight groups along the axes of a 4-d space, 4 files x 5 chunks each.
fn corpus() -> Vec<EmbeddedPoint> {
    let mut rng = Rng::with_seed(5);
    let mut points = Vec::new();
    let mut id = 0u64;
    for (dir, axis) in [("src/api", 0usize), ("src/db", 1), ("web/ui", 2)] {
        for file in 0..4 {
            for chunk in 0..5 {
                let mut vector = vec![0.0f32; 4];
                vector[axis] = 1.0;
                for v in &mut vector {
                    *v += (rng.f32() - 0.5) * 0.05;
                }
                let path = format!("{dir}/mod{file}.rs");
                let payload = PointPayload::new(&path, format!("fn item_{chunk}() {{}}"))
                    .lines(chunk * 10 + 1, chunk * 10 + 8);
                points.push(EmbeddedPoint::new(id, vector, payload));
                id += 1;
            }
        }
    }
    points
}

fn config() -> PipelineConfig {
    PipelineConfig {
        k: 3,
        concurrency: 2,
        ..PipelineConfig::default()
    }
}

async fn index_with(points: Vec<EmbeddedPoint>) -> Arc<MemoryCollection> {
    let index = Arc::new(MemoryCollection::new());
    index.insert("repo_demo", points).await;
    index
}

#[tokio::test]
async fn summarize_persists_cluster_ids_and_reuses_cached_result() -> Result<()> {
    let index = index_with(corpus()).await;
    let generator = Arc::new(PromptEchoGenerator::default());
    let summarizer = GroundedSummarizer::new(generator.clone(), config().summarizer_options());
    let store = MemorySummaryStore::new();
    let pipeline = Pipeline::new(config(), index.clone());

    let first = pipeline.summarize("demo", &summarizer, &store).await?;
    assert!(!first.hit);
    let summary = &first.summary;
    assert!(summary.is_complete(), "{summary:?}");
    assert_eq!(summary.repo_id, "demo");
    assert_eq!(summary.content_hash, content_hash(&corpus()));
    assert_eq!(summary.metrics.points, 60);
    assert_eq!(summary.metrics.files, 12);
    assert_eq!(summary.metrics.clusters, 3);
    assert_eq!(summary.repo_summary.title, "Demo");
    let ids: Vec<&str> = summary.clusters.iter().map(|c| c.cluster_id.as_str()).collect();
    assert_eq!(ids, vec!["0", "1", "2"]);
    // One call per cluster plus the repo overview.
    assert_eq!(generator.calls.load(Ordering::SeqCst), 4);

    let persisted = index.points("repo_demo").await.unwrap_or_default();
    assert!(persisted.iter().all(|p| p.payload.cluster_id.is_some()));
    let labels: HashSet<_> = persisted.iter().filter_map(|p| p.payload.cluster_id).collect();
    assert_eq!(labels.len(), 3);

    let second = pipeline.summarize("demo", &summarizer, &store).await?;
    assert!(second.hit);
    assert!(Arc::ptr_eq(&first.summary, &second.summary));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 4);
    Ok(())
}

#[tokio::test]
async fn changed_excerpt_recomputes_under_a_new_hash() -> Result<()> {
    let generator = Arc::new(PromptEchoGenerator::default());
    let summarizer = GroundedSummarizer::new(generator.clone(), config().summarizer_options());
    let store = MemorySummaryStore::new();

    let original = Pipeline::new(config(), index_with(corpus()).await)
        .summarize("demo", &summarizer, &store)
        .await?;

    let mut edited = corpus();
    edited[7].payload.excerpt = "fn item_2() { todo() }".to_string();
    let changed = Pipeline::new(config(), index_with(edited).await)
        .summarize("demo", &summarizer, &store)
        .await?;

    assert!(!changed.hit);
    assert_ne!(original.summary.content_hash, changed.summary.content_hash);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 8);
    assert_eq!(store.len().await, 2);
    Ok(())
}

#[tokio::test]
async fn collaborator_failures_abort_without_caching() {
    let store = MemorySummaryStore::new();

    let summarizer = GroundedSummarizer::new(
        Arc::new(PromptEchoGenerator::default()),
        config().summarizer_options(),
    );
    let missing = Pipeline::new(config(), Arc::new(MemoryCollection::new()))
        .summarize("demo", &summarizer, &store)
        .await;
    assert!(missing.is_err());

    let down = GroundedSummarizer::new(Arc::new(DownGenerator), config().summarizer_options());
    let failed = Pipeline::new(config(), index_with(corpus()).await)
        .summarize("demo", &down, &store)
        .await;
    assert!(failed.is_err());
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn empty_collection_yields_structurally_valid_summary() -> Result<()> {
    let generator = Arc::new(PromptEchoGenerator::default());
    let summarizer = GroundedSummarizer::new(generator.clone(), config().summarizer_options());
    let store = MemorySummaryStore::new();

    let result = Pipeline::new(config(), index_with(Vec::new()).await)
        .summarize("demo", &summarizer, &store)
        .await?;
    assert_eq!(result.summary.metrics.points, 0);
    assert!(result.summary.clusters.is_empty());
    assert!(result.summary.error.is_some());
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.len().await, 1);

    let again = Pipeline::new(config(), index_with(Vec::new()).await)
        .summarize("demo", &summarizer, &store)
        .await?;
    assert!(again.hit);
    Ok(())
}

#[tokio::test]
async fn file_atlas_links_files_within_each_group_only() -> Result<()> {
    let pipeline = Pipeline::new(
        PipelineConfig {
            persist_cluster_ids: false,
            ..config()
        },
        index_with(corpus()).await,
    );

    let pack = pipeline.atlas("demo", AtlasGranularity::File).await?;
    assert_eq!(pack.granularity, AtlasGranularity::File);
    assert_eq!(pack.stats.nodes, 12);
    assert_eq!(pack.stats.components, 3);
    for edge in &pack.edges {
        let group = |id: &str| id.rsplit_once('/').map(|(dir, _)| dir.to_string());
        assert_eq!(group(&edge.source), group(&edge.target));
        assert!(edge.weight > 0.0 && edge.weight <= 1.0);
    }

    let chunks = pipeline.atlas("demo", AtlasGranularity::Chunk).await?;
    assert_eq!(chunks.stats.nodes, 60);
    let pairs: HashSet<_> = chunks
        .edges
        .iter()
        .map(|e| (e.source.clone(), e.target.clone()))
        .collect();
    assert_eq!(pairs.len(), chunks.edges.len());
    Ok(())
}
