//! Output records shared by the Repo Atlas crates.
//!
//! Everything here is plain nested data meant to be serialized as-is by
//! downstream consumers (CLI, HTTP layers). Generation-facing structures keep
//! their field names stable because the same names appear in prompts.

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod atlas;

pub use atlas::{AtlasEdge, AtlasGranularity, AtlasNode, AtlasPack, AtlasStats, EdgeKind};

pub const REPO_SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Grounded summary of one cluster (or of the pooled `misc` bucket).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct ClusterSummary {
    /// Cluster key: the numeric label, or `misc`.
    pub cluster_id: String,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub key_files: Vec<String>,
    #[serde(default)]
    pub notable_symbols: Vec<String>,
}

/// A cluster whose generation never produced a valid, grounded summary.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct ClusterFailure {
    pub cluster_id: String,
    pub error: String,
    /// Last raw generation output, kept verbatim for debugging.
    pub raw_output: String,
    pub attempts: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, JsonSchema)]
pub struct RepoMetrics {
    /// Points that survived preprocessing.
    pub points: usize,
    /// Summarized groups (clusters above the size floor, plus `misc` when present).
    pub clusters: usize,
    pub files: usize,
    pub top_dirs: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, JsonSchema)]
pub struct RepoSection {
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, JsonSchema)]
pub struct RepoOverview {
    pub title: String,
    pub overview: String,
    #[serde(default)]
    pub sections: Vec<RepoSection>,
}

impl RepoOverview {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.overview.is_empty() && self.sections.is_empty()
    }
}

/// Whole-repository summary.
///
/// Always structurally valid: when generation fails the overview stays empty
/// and `error`/`raw_output` explain why.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct RepoSummary {
    pub repo_id: String,
    pub content_hash: String,
    pub metrics: RepoMetrics,
    #[serde(default)]
    pub repo_summary: RepoOverview,
    #[serde(default)]
    pub clusters: Vec<ClusterSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_clusters: Vec<ClusterFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

impl RepoSummary {
    /// Skeleton with no generated content.
    #[must_use]
    pub fn empty(repo_id: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            content_hash: content_hash.into(),
            metrics: RepoMetrics::default(),
            repo_summary: RepoOverview::default(),
            clusters: Vec::new(),
            failed_clusters: Vec::new(),
            error: None,
            raw_output: None,
        }
    }

    /// No repository-level error and no failed clusters.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.failed_clusters.is_empty()
    }
}

/// JSON Schemas for every record a consumer may receive.
pub fn output_schemas() -> Result<serde_json::Value> {
    Ok(serde_json::json!({
        "schema_version": REPO_SUMMARY_SCHEMA_VERSION,
        "repo_summary": serde_json::to_value(schemars::schema_for!(RepoSummary))?,
        "atlas_pack": serde_json::to_value(schemars::schema_for!(AtlasPack))?,
    }))
}

pub fn serialize_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        serde_json::to_string_pretty(value).map_err(Into::into)
    } else {
        serde_json::to_string(value).map_err(Into::into)
    }
}
