use crate::cache::{get_or_compute, CachedSummary, SummaryStore};
use crate::config::PipelineConfig;
use anyhow::{Context, Result};
use atlas_cluster::{
    aggregate_to_files, assign_clusters, corpus_metrics, preprocess, select_representatives,
    stratified_sample, Cluster, ClusterAssignment, KMeans, Preprocessed,
};
use atlas_graph::{AtlasBuilder, AtlasInput};
use atlas_protocol::{AtlasGranularity, AtlasPack, RepoSummary};
use atlas_summarizer::GroundedSummarizer;
use atlas_vector_store::{EmbeddedPoint, PointId, PointSource};
use fastrand::Rng;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Sampled, normalized and clustered corpus.
#[derive(Debug, Clone)]
pub struct ClusteredCorpus {
    pub data: Preprocessed,
    pub assignments: Vec<ClusterAssignment>,
    pub clusters: BTreeMap<usize, Cluster>,
}

/// One repository run: scroll, sample, cluster, then summarize or build an atlas.
pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn PointSource>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, source: Arc<dyn PointSource>) -> Self {
        Self { config, source }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn fetch_points(&self, repo_id: &str) -> Result<Vec<EmbeddedPoint>> {
        let collection = self.config.collection_name(repo_id);
        self.source
            .scroll(&collection, self.config.scroll_limit, true)
            .await
            .with_context(|| format!("Failed to scroll collection '{collection}'"))
    }

    /// Sample, preprocess and cluster `points`. Deterministic for a fixed seed.
    pub fn cluster_points(&self, points: Vec<EmbeddedPoint>) -> Result<ClusteredCorpus> {
        let mut rng = Rng::with_seed(self.config.seed);
        let sampled = stratified_sample(points, self.config.n_max, &mut rng);
        let data = preprocess(&sampled);
        if data.is_empty() {
            log::warn!("No usable points after preprocessing");
            return Ok(ClusteredCorpus {
                data,
                assignments: Vec::new(),
                clusters: BTreeMap::new(),
            });
        }

        let clustering = KMeans::new(self.config.k)
            .seed(self.config.seed)
            .fit(data.matrix.view())
            .context("Clustering failed")?;
        let (assignments, clusters) =
            assign_clusters(&data, &clustering).context("Cluster assignment failed")?;
        log::info!(
            "Clustered {} points into {} clusters ({} iterations)",
            assignments.len(),
            clusters.len(),
            clustering.iterations
        );
        Ok(ClusteredCorpus {
            data,
            assignments,
            clusters,
        })
    }

    /// Write each point's `cluster_id` back to the index, one call per cluster.
    pub async fn persist_cluster_ids(&self, repo_id: &str, corpus: &ClusteredCorpus) -> Result<()> {
        let collection = self.config.collection_name(repo_id);
        for cluster in corpus.clusters.values() {
            let ids: Vec<PointId> = cluster
                .member_indices
                .iter()
                .map(|&idx| corpus.assignments[idx].record.id.clone())
                .collect();
            let mut payload = Map::new();
            payload.insert("cluster_id".to_string(), Value::from(cluster.id));
            self.source
                .set_payload(&collection, payload, &ids)
                .await
                .with_context(|| {
                    format!("Failed to persist cluster {} in '{collection}'", cluster.id)
                })?;
        }
        log::info!(
            "Persisted cluster ids for {} clusters in '{collection}'",
            corpus.clusters.len()
        );
        Ok(())
    }

    /// Summarize the repository, reusing a stored result for an unchanged point set.
    pub async fn summarize(
        &self,
        repo_id: &str,
        summarizer: &GroundedSummarizer,
        cache: &dyn SummaryStore,
    ) -> Result<CachedSummary> {
        let points = self.fetch_points(repo_id).await?;
        get_or_compute(cache, repo_id, &points, |content_hash| {
            self.summarize_points(repo_id, points.clone(), content_hash, summarizer)
        })
        .await
    }

    /// Full summary pipeline over already-fetched points, without the cache.
    pub async fn summarize_points(
        &self,
        repo_id: &str,
        points: Vec<EmbeddedPoint>,
        content_hash: String,
        summarizer: &GroundedSummarizer,
    ) -> Result<RepoSummary> {
        let corpus = self.cluster_points(points)?;
        if self.config.persist_cluster_ids && !corpus.assignments.is_empty() {
            self.persist_cluster_ids(repo_id, &corpus).await?;
        }

        let sets = select_representatives(
            &corpus.assignments,
            &corpus.clusters,
            self.config.n_labels,
            self.config.n_min,
        );
        log::info!("Selected {} representative sets", sets.len());

        let batch = summarizer
            .summarize_sets(&sets, repo_id, self.config.concurrency)
            .await
            .context("Cluster summarization failed")?;

        let mut summary = RepoSummary::empty(repo_id, content_hash);
        summary.metrics = corpus_metrics(&corpus.data.records, sets.len());
        summary.clusters = batch.summaries;
        summary.failed_clusters = batch.failures;
        summarizer
            .summarize_repo(summary)
            .await
            .context("Repository summarization failed")
    }

    /// Similarity graph over the clustered corpus at the requested granularity.
    pub async fn atlas(&self, repo_id: &str, granularity: AtlasGranularity) -> Result<AtlasPack> {
        let points = self.fetch_points(repo_id).await?;
        let corpus = self.cluster_points(points)?;
        let input = match granularity {
            AtlasGranularity::Chunk => AtlasInput::Chunks(corpus.assignments),
            AtlasGranularity::File => AtlasInput::Files(aggregate_to_files(&corpus.assignments)),
        };
        self.build_atlas(repo_id, input)
    }

    pub fn build_atlas(&self, repo_id: &str, input: AtlasInput) -> Result<AtlasPack> {
        AtlasBuilder::new(self.config.similarity_threshold, self.config.k_sim)
            .build(repo_id, input)
            .context("Atlas construction failed")
    }
}
