//! Grounded summaries of clustered code.
//!
//! Every generated statement must be backed by the evidence handed to the
//! generator: a cluster summary may only cite the cluster's representative
//! files, and a repository summary is built only from cluster summaries and
//! corpus metrics.
//!
//! Generation is behind [`TextGenerator`]; prompts, output cleanup, the
//! hallucination guard and the retry state machine live here.
//!
//! Bad model output is data, not an error: it ends up as a [`ClusterFailure`]
//! or as `error`/`raw_output` on the [`RepoSummary`]. Only collaborator
//! failures (transport, timeout) surface as [`SummarizerError`].
//!
//! [`ClusterFailure`]: atlas_protocol::ClusterFailure
//! [`RepoSummary`]: atlas_protocol::RepoSummary

mod batch;
mod cluster;
mod engine;
mod error;
mod generator;
mod grounding;
mod parse;
mod prompt;
mod repo;

pub use batch::ClusterBatch;
pub use cluster::{ClusterOutcome, SummaryState};
pub use engine::{
    GroundedSummarizer, SummarizerOptions, DEFAULT_CLUSTER_MAX_TOKENS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_SNIPPET_CHARS, DEFAULT_REPO_MAX_TOKENS, DEFAULT_TEMPERATURE,
};
pub use error::{Result, SummarizerError};
pub use generator::{GenerationRequest, ScriptedGenerator, TextGenerator};
pub use grounding::{is_grounded, path_tokens, strip_tokens, ungrounded_tokens};
pub use parse::{clean_output, parse_cluster_summary, parse_repo_overview, OutputDefect};
pub use prompt::{cluster_prompt, repo_prompt, truncate_chars, TRUNCATION_MARKER};
pub use repo::NO_CLUSTERS_ERROR;
