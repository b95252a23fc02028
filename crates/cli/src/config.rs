use anyhow::{bail, Context, Result};
use atlas_summarizer::SummarizerOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_QDRANT_URL: &str = "ATLAS_QDRANT_URL";
pub const ENV_QDRANT_API_KEY: &str = "ATLAS_QDRANT_API_KEY";
pub const ENV_GENERATOR_URL: &str = "ATLAS_GENERATOR_URL";
pub const ENV_GENERATOR_MODEL: &str = "ATLAS_GENERATOR_MODEL";
pub const ENV_GENERATOR_API_KEY: &str = "ATLAS_GENERATOR_API_KEY";

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";
pub const DEFAULT_GENERATOR_MODEL: &str = "gpt-4o-mini";
pub const COLLECTION_PLACEHOLDER: &str = "{repo_id}";

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`. Unset disables summarization.
    pub url: Option<String>,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            url: None,
            model: DEFAULT_GENERATOR_MODEL.to_string(),
            api_key: None,
        }
    }
}

/// Every tunable of one pipeline run.
///
/// Resolution order: defaults, then the TOML file, then environment, then CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub qdrant_url: String,
    #[serde(skip_serializing)]
    pub qdrant_api_key: Option<String>,
    /// Collection name; `{repo_id}` is substituted.
    pub collection_template: String,
    pub scroll_limit: usize,
    pub n_max: usize,
    pub k: usize,
    pub seed: u64,
    pub n_labels: usize,
    pub n_min: usize,
    pub max_snippet_chars: usize,
    pub max_attempts: u32,
    pub temperature: f32,
    pub cluster_max_tokens: u32,
    pub repo_max_tokens: u32,
    pub similarity_threshold: f32,
    pub k_sim: usize,
    pub generation_timeout_secs: u64,
    pub concurrency: usize,
    pub persist_cluster_ids: bool,
    pub generator: GeneratorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let summarizer = SummarizerOptions::default();
        Self {
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            qdrant_api_key: None,
            collection_template: format!("repo_{COLLECTION_PLACEHOLDER}"),
            scroll_limit: 3000,
            n_max: 1000,
            k: 10,
            seed: atlas_cluster::DEFAULT_SEED,
            n_labels: 6,
            n_min: 3,
            max_snippet_chars: summarizer.max_snippet_chars,
            max_attempts: summarizer.max_attempts,
            temperature: summarizer.temperature,
            cluster_max_tokens: summarizer.cluster_max_tokens,
            repo_max_tokens: summarizer.repo_max_tokens,
            similarity_threshold: atlas_graph::DEFAULT_SIMILARITY_THRESHOLD,
            k_sim: atlas_graph::DEFAULT_K_SIM,
            generation_timeout_secs: 60,
            concurrency: 4,
            persist_cluster_ids: true,
            generator: GeneratorConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults merged with an optional TOML file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(Into::into)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Override endpoint settings from `lookup`; empty values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = lookup(ENV_QDRANT_URL) {
            self.qdrant_url = url;
        }
        if let Some(key) = lookup(ENV_QDRANT_API_KEY) {
            self.qdrant_api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_GENERATOR_URL) {
            self.generator.url = Some(url);
        }
        if let Some(model) = lookup(ENV_GENERATOR_MODEL) {
            self.generator.model = model;
        }
        if let Some(key) = lookup(ENV_GENERATOR_API_KEY) {
            self.generator.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            bail!("k must be at least 1");
        }
        if self.n_max == 0 {
            bail!("n_max must be at least 1");
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            bail!(
                "similarity_threshold must lie in [-1, 1], got {}",
                self.similarity_threshold
            );
        }
        if !self.collection_template.contains(COLLECTION_PLACEHOLDER) {
            bail!("collection_template must contain {COLLECTION_PLACEHOLDER}");
        }
        Ok(())
    }

    pub fn collection_name(&self, repo_id: &str) -> String {
        self.collection_template.replace(COLLECTION_PLACEHOLDER, repo_id)
    }

    pub fn generation_timeout(&self) -> Option<Duration> {
        (self.generation_timeout_secs > 0).then(|| Duration::from_secs(self.generation_timeout_secs))
    }

    pub fn summarizer_options(&self) -> SummarizerOptions {
        SummarizerOptions {
            max_snippet_chars: self.max_snippet_chars,
            max_attempts: self.max_attempts,
            temperature: self.temperature,
            cluster_max_tokens: self.cluster_max_tokens,
            repo_max_tokens: self.repo_max_tokens,
            timeout: self.generation_timeout(),
        }
    }
}
