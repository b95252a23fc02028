use crate::error::{Result, SummarizerError};
use crate::generator::{GenerationRequest, TextGenerator};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_SNIPPET_CHARS: usize = 600;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_CLUSTER_MAX_TOKENS: u32 = 512;
pub const DEFAULT_REPO_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct SummarizerOptions {
    pub max_snippet_chars: usize,
    /// Total generation calls per cluster, first attempt included.
    pub max_attempts: u32,
    pub temperature: f32,
    pub cluster_max_tokens: u32,
    pub repo_max_tokens: u32,
    /// Per-call bound; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for SummarizerOptions {
    fn default() -> Self {
        Self {
            max_snippet_chars: DEFAULT_MAX_SNIPPET_CHARS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            temperature: DEFAULT_TEMPERATURE,
            cluster_max_tokens: DEFAULT_CLUSTER_MAX_TOKENS,
            repo_max_tokens: DEFAULT_REPO_MAX_TOKENS,
            timeout: None,
        }
    }
}

/// Cluster and repository summarization over a shared generator.
///
/// Cheap to clone; clones share the generator.
#[derive(Clone)]
pub struct GroundedSummarizer {
    generator: Arc<dyn TextGenerator>,
    options: SummarizerOptions,
}

impl GroundedSummarizer {
    pub fn new(generator: Arc<dyn TextGenerator>, options: SummarizerOptions) -> Self {
        Self { generator, options }
    }

    pub fn options(&self) -> &SummarizerOptions {
        &self.options
    }

    pub(crate) async fn generate(&self, prompt: String, max_tokens: u32) -> Result<String> {
        let request = GenerationRequest {
            prompt,
            temperature: self.options.temperature,
            max_tokens,
        };
        let raw = match self.options.timeout {
            Some(limit) => tokio::time::timeout(limit, self.generator.generate(&request))
                .await
                .map_err(|_| SummarizerError::Timeout {
                    secs: limit.as_secs(),
                })??,
            None => self.generator.generate(&request).await?,
        };
        log::debug!("Raw generation output ({} chars): {raw}", raw.len());
        Ok(raw)
    }
}

impl std::fmt::Debug for GroundedSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroundedSummarizer")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
